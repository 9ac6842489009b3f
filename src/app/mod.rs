use crate::api::{ApiServer, AppState};
use crate::config::{Config, TOKEN_ENV};
use crate::db::Db;
use crate::discord::DiscordClient;
use crate::global;
use crate::reconciler::Reconciler;
use crate::recorder::{
    CommandAudioTransport, Encoder, EventRecorder, RecordStore, SessionRegistry,
};
use crate::reminder::DeadlineReminder;
use crate::tasks::TaskService;
use anyhow::{bail, Result};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub async fn run_service() -> Result<()> {
    info!("Starting guildscribe service");

    let config = Config::load()?;
    if config.discord.token.trim().is_empty() {
        bail!(
            "No bot token configured. Set {} or discord.token in {:?}",
            TOKEN_ENV,
            global::config_file()?
        );
    }

    let discord = Arc::new(DiscordClient::from_config(&config.discord)?);
    let offset = config.recorder.display_offset()?;

    let encoder = Encoder::from_config(&config.encoder);
    if !encoder.is_available() {
        warn!(
            "Encoder '{}' not found in PATH; recordings will fail until it is installed",
            encoder.program()
        );
    }

    let mut recorder = EventRecorder::new(
        Arc::new(SessionRegistry::new()),
        Arc::new(CommandAudioTransport::from_config(&config.transport)),
        discord.clone(),
        encoder,
        RecordStore::new(config.recorder.recordings_dir()?, offset),
    )
    .with_connect_timeout(config.recorder.connect_timeout());
    if let Some(dir) = &config.recorder.temp_dir {
        recorder = recorder.with_temp_dir(dir.clone());
    }
    let recorder = Arc::new(recorder);

    match recorder.store().recover_pending().await {
        Ok(report) if !report.failed.is_empty() => warn!(
            "{} pending meeting record(s) could not be recovered",
            report.failed.len()
        ),
        Ok(_) => {}
        Err(e) => warn!("Pending record recovery failed: {}", e),
    }

    let db = Db::open_default()?;
    let tasks = Arc::new(TaskService::new(db.clone(), discord.clone()));

    let cancel = CancellationToken::new();
    let mut loops = JoinSet::new();

    let reconciler = Arc::new(Reconciler::new(
        discord.clone(),
        discord.clone(),
        recorder.clone(),
        &config.recorder,
    ));
    loops.spawn(reconciler.run(cancel.clone()));

    if config.reminder.enabled {
        let reminder = Arc::new(DeadlineReminder::new(
            db,
            discord.clone(),
            &config.reminder,
            offset,
        ));
        loops.spawn(reminder.run(cancel.clone()));
    } else {
        info!("Deadline reminders disabled");
    }

    let api_server = ApiServer::new(
        AppState {
            recorder: recorder.clone(),
            calendar: discord,
            tasks,
            fetch_timeout: config.recorder.fetch_timeout(),
        },
        &config.api,
    );
    let api_cancel = cancel.clone();
    loops.spawn(async move {
        if let Err(e) = api_server.start(api_cancel.clone()).await {
            error!("API server failed: {:#}", e);
            api_cancel.cancel();
        }
    });

    info!("guildscribe is ready!");
    info!("Manage it with: guildscribe --help");

    tokio::select! {
        _ = shutdown_signal() => info!("Shutdown requested"),
        _ = cancel.cancelled() => warn!("A service component stopped, shutting down"),
    }
    cancel.cancel();

    while let Some(joined) = loops.join_next().await {
        if let Err(e) = joined {
            error!("Service task panicked: {}", e);
        }
    }

    for (guild, outcome) in recorder.end_all().await {
        match outcome {
            Ok(report) if report.is_clean() => {
                info!("Saved in-progress recording for guild {}", guild)
            }
            Ok(report) => warn!(
                "Recording for guild {} saved with problems: encoder={:?} persistence={:?}",
                guild, report.encoder_error, report.persistence_error
            ),
            Err(e) => error!("Failed to finish recording for guild {}: {}", guild, e),
        }
    }

    info!("guildscribe stopped");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
