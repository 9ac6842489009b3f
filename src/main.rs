use anyhow::Result;
use clap::Parser;
use guildscribe::{
    app,
    cli::{
        handle_events_command, handle_portfolio_command, handle_record_command,
        handle_recordings_command, handle_task_command, ApiClient, Cli, CliCommand,
    },
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = if cli.verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let command = match cli.command {
        None | Some(CliCommand::Serve) => return app::run_service().await,
        Some(CliCommand::Version) => {
            println!("guildscribe {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Some(command) => command,
    };

    let client = ApiClient::from_cli(cli.url)?;
    match command {
        CliCommand::Events(args) => handle_events_command(&client, args).await,
        CliCommand::Record(args) => handle_record_command(&client, args).await,
        CliCommand::Recordings(args) => handle_recordings_command(&client, args).await,
        CliCommand::Portfolios(args) => handle_portfolio_command(&client, args).await,
        CliCommand::Tasks(args) => handle_task_command(&client, args).await,
        CliCommand::Serve | CliCommand::Version => Ok(()),
    }
}
