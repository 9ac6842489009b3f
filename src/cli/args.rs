use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "guildscribe")]
#[command(about = "Records scheduled guild voice meetings and tracks portfolio tasks", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Base URL of the running service (default: from config)
    #[arg(long, global = true)]
    pub url: Option<String>,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Run the bot service (default)
    Serve,
    /// Print version information
    Version,
    /// List a guild's scheduled events
    Events(EventsCliArgs),
    /// Start or stop a recording manually
    Record(RecordCliArgs),
    /// List committed or live recordings
    Recordings(RecordingsCliArgs),
    /// Manage portfolios
    Portfolios(PortfolioCliArgs),
    /// Manage tasks
    Tasks(TaskCliArgs),
}

#[derive(ClapArgs, Debug)]
pub struct EventsCliArgs {
    /// Guild ID
    pub guild: String,
    #[arg(long, default_value = "1")]
    pub page: usize,
    #[arg(long, default_value = "10")]
    pub per_page: usize,
}

#[derive(ClapArgs, Debug)]
pub struct RecordCliArgs {
    #[command(subcommand)]
    pub command: RecordCommand,
}

#[derive(Subcommand, Debug)]
pub enum RecordCommand {
    /// Start recording an event in its voice channel
    Start {
        /// Guild ID
        guild: String,
        /// Scheduled event ID
        event: String,
    },
    /// Stop the guild's recording and save it
    Stop {
        /// Guild ID
        guild: String,
    },
}

#[derive(ClapArgs, Debug)]
pub struct RecordingsCliArgs {
    /// Show live sessions instead of saved records
    #[arg(long)]
    pub active: bool,
}

#[derive(ClapArgs, Debug)]
pub struct PortfolioCliArgs {
    #[command(subcommand)]
    pub command: PortfolioCommand,
}

#[derive(Subcommand, Debug)]
pub enum PortfolioCommand {
    /// List portfolios
    List,
    /// Create a portfolio
    Create {
        name: String,
        /// Channel that receives task notices and reminders
        #[arg(long)]
        channel: String,
    },
}

#[derive(ClapArgs, Debug)]
pub struct TaskCliArgs {
    #[command(subcommand)]
    pub command: TaskCommand,
}

#[derive(Subcommand, Debug)]
pub enum TaskCommand {
    /// List tasks grouped by status
    List {
        #[arg(long)]
        portfolio: Option<i64>,
        #[arg(long)]
        status: Option<String>,
        #[arg(long, default_value = "1")]
        page: usize,
        #[arg(long, default_value = "10")]
        per_page: usize,
    },
    /// Create a task
    Create {
        #[arg(long)]
        portfolio: i64,
        #[arg(long)]
        title: String,
        /// DD/MM/YYYY HH:MM or DD/MM/YYYY (time defaults to 00:00)
        #[arg(long)]
        deadline: String,
        #[arg(long, default_value = "Low")]
        priority: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Show one task
    Show { id: i64 },
    /// Change a task's status
    Status {
        id: i64,
        /// Not Started, In Progress, Completed or Cancelled
        status: String,
    },
    /// Delete a task
    Delete { id: i64 },
}
