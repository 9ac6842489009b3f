//! Periodic reconciliation of calendar events against live recordings.
//!
//! Each tick lists the bot's guilds, fetches every guild's events in its own
//! task, and starts or stops recordings for events entering their window.

use anyhow::Result;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::calendar::{CalendarEvent, CalendarSource, EventId, EventStatus, GuildDirectory, GuildId};
use crate::config::RecorderConfig;
use crate::recorder::EventRecorder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Noop,
    Start,
    Stop,
}

/// What a single event calls for, given the guild's current state.
///
/// Events without an end time never stop automatically.
pub fn decide(
    event: &CalendarEvent,
    now: DateTime<Utc>,
    has_session: bool,
    window: ChronoDuration,
) -> Decision {
    let within = |at: DateTime<Utc>| {
        let delta = at - now;
        delta >= ChronoDuration::zero() && delta <= window
    };

    match event.status {
        EventStatus::Scheduled
            if !has_session && event.voice_channel().is_some() && within(event.start_time) =>
        {
            Decision::Start
        }
        EventStatus::Active if has_session && event.end_time.is_some_and(within) => Decision::Stop,
        _ => Decision::Noop,
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct TickReport {
    pub guilds: usize,
    pub started: Vec<(GuildId, EventId)>,
    pub stopped: Vec<(GuildId, EventId)>,
    pub failed_guilds: Vec<GuildId>,
}

#[derive(Default)]
struct GuildOutcome {
    started: Vec<EventId>,
    stopped: Vec<EventId>,
}

pub struct Reconciler {
    calendar: Arc<dyn CalendarSource>,
    directory: Arc<dyn GuildDirectory>,
    recorder: Arc<EventRecorder>,
    interval: Duration,
    window: ChronoDuration,
    fetch_timeout: Duration,
}

impl Reconciler {
    pub fn new(
        calendar: Arc<dyn CalendarSource>,
        directory: Arc<dyn GuildDirectory>,
        recorder: Arc<EventRecorder>,
        config: &RecorderConfig,
    ) -> Self {
        Self {
            calendar,
            directory,
            recorder,
            interval: config.poll_interval(),
            window: config.window(),
            fetch_timeout: config.fetch_timeout(),
        }
    }

    /// Run one reconciliation pass at `now`.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickReport> {
        let guilds = tokio::time::timeout(self.fetch_timeout, self.directory.guilds())
            .await
            .map_err(|_| {
                anyhow::anyhow!(
                    "guild listing timed out after {}s",
                    self.fetch_timeout.as_secs()
                )
            })??;
        let mut report = TickReport {
            guilds: guilds.len(),
            ..Default::default()
        };

        let mut tasks = JoinSet::new();
        for guild in guilds {
            let calendar = self.calendar.clone();
            let recorder = self.recorder.clone();
            let window = self.window;
            let fetch_timeout = self.fetch_timeout;
            tasks.spawn(async move {
                let outcome =
                    reconcile_guild(calendar, recorder, guild, now, window, fetch_timeout).await;
                (guild, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((guild, Ok(outcome))) => {
                    report
                        .started
                        .extend(outcome.started.into_iter().map(|e| (guild, e)));
                    report
                        .stopped
                        .extend(outcome.stopped.into_iter().map(|e| (guild, e)));
                }
                Ok((guild, Err(e))) => {
                    warn!("Reconciliation failed for guild {}: {:#}", guild, e);
                    report.failed_guilds.push(guild);
                }
                Err(e) => error!("Reconciliation task panicked: {}", e),
            }
        }

        report.failed_guilds.sort();
        Ok(report)
    }

    /// Tick every interval until `cancel` fires.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!(
            "Starting event reconciliation (interval={}s, window={}s)",
            self.interval.as_secs(),
            self.window.num_seconds()
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            // A tick in flight is never dropped; shutdown waits for it.
            match self.tick(Utc::now()).await {
                Ok(report) => debug!(
                    "Reconciled {} guild(s): {} started, {} stopped, {} failed",
                    report.guilds,
                    report.started.len(),
                    report.stopped.len(),
                    report.failed_guilds.len()
                ),
                Err(e) => warn!("Failed to list guilds: {:#}", e),
            }
        }

        info!("Event reconciliation stopped");
    }
}

async fn reconcile_guild(
    calendar: Arc<dyn CalendarSource>,
    recorder: Arc<EventRecorder>,
    guild: GuildId,
    now: DateTime<Utc>,
    window: ChronoDuration,
    fetch_timeout: Duration,
) -> Result<GuildOutcome> {
    let mut events = tokio::time::timeout(fetch_timeout, calendar.fetch_events(guild))
        .await
        .map_err(|_| anyhow::anyhow!("event fetch timed out after {}s", fetch_timeout.as_secs()))??;

    // Stops before starts so a meeting ending as the next one begins hands over the guild.
    events.sort_by_key(|e| (e.status != EventStatus::Active, e.start_time));

    let mut outcome = GuildOutcome::default();
    for event in events {
        let has_session = recorder.is_recording(guild).await;
        match decide(&event, now, has_session, window) {
            Decision::Noop => {}
            Decision::Start => {
                let event_id = event.id;
                let name = event.name.clone();
                match recorder.begin(guild, event).await {
                    Ok(_) => outcome.started.push(event_id),
                    Err(e) if e.is_noop() => debug!("Guild {}: {}", guild, e),
                    Err(e) => error!(
                        "Failed to start recording for event {} in guild {}: {}",
                        name, guild, e
                    ),
                }
            }
            Decision::Stop => match recorder.end(guild).await {
                Ok(_) => outcome.stopped.push(event.id),
                Err(e) if e.is_noop() => debug!("Guild {}: {}", guild, e),
                Err(e) => error!(
                    "Failed to stop recording for event {} in guild {}: {}",
                    event.name, guild, e
                ),
            },
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::fixtures::{event, voice_channel};
    use crate::calendar::testing::{HangingDirectory, StaticCalendar, StaticDirectory};
    use crate::calendar::ChannelKind;
    use crate::notify::testing::RecordingNotifier;
    use crate::recorder::transport::testing::FakeTransport;
    use crate::recorder::writer::testing::{sh_encoder, COPY_SCRIPT, SLOW_COPY_SCRIPT};
    use crate::recorder::{RecordStatus, RecordStore, SessionRegistry};
    use chrono::FixedOffset;

    fn window() -> ChronoDuration {
        ChronoDuration::seconds(60)
    }

    #[test]
    fn test_start_window_boundaries() {
        let now = Utc::now();
        let soon = event(1, "Standup", EventStatus::Scheduled, now + ChronoDuration::seconds(45));
        let later = event(2, "Standup", EventStatus::Scheduled, now + ChronoDuration::seconds(90));
        let past = event(3, "Standup", EventStatus::Scheduled, now - ChronoDuration::seconds(5));

        assert_eq!(decide(&soon, now, false, window()), Decision::Start);
        assert_eq!(decide(&later, now, false, window()), Decision::Noop);
        assert_eq!(decide(&past, now, false, window()), Decision::Noop);
        assert_eq!(decide(&soon, now, true, window()), Decision::Noop);
    }

    #[test]
    fn test_start_requires_voice_channel() {
        let now = Utc::now();
        let mut e = event(1, "Town hall", EventStatus::Scheduled, now + ChronoDuration::seconds(10));
        e.channel.as_mut().unwrap().kind = ChannelKind::Stage;
        assert_eq!(decide(&e, now, false, window()), Decision::Noop);
    }

    #[test]
    fn test_stop_window_and_missing_end_time() {
        let now = Utc::now();
        let mut e = event(1, "Standup", EventStatus::Active, now - ChronoDuration::minutes(30));
        assert_eq!(decide(&e, now, true, window()), Decision::Noop);

        e.end_time = Some(now + ChronoDuration::seconds(30));
        assert_eq!(decide(&e, now, true, window()), Decision::Stop);
        assert_eq!(decide(&e, now, false, window()), Decision::Noop);

        e.end_time = Some(now + ChronoDuration::minutes(5));
        assert_eq!(decide(&e, now, true, window()), Decision::Noop);
    }

    #[test]
    fn test_finished_events_are_ignored() {
        let now = Utc::now();
        for status in [EventStatus::Completed, EventStatus::Cancelled] {
            let mut e = event(1, "Standup", status, now + ChronoDuration::seconds(10));
            e.end_time = Some(now + ChronoDuration::seconds(20));
            assert_eq!(decide(&e, now, false, window()), Decision::Noop);
            assert_eq!(decide(&e, now, true, window()), Decision::Noop);
        }
    }

    struct Setup {
        reconciler: Reconciler,
        calendar: Arc<StaticCalendar>,
        recorder: Arc<EventRecorder>,
        _temp: tempfile::TempDir,
    }

    fn setup(calendar: StaticCalendar, guilds: Vec<GuildId>) -> Setup {
        setup_with(calendar, Arc::new(StaticDirectory(guilds)), COPY_SCRIPT)
    }

    fn setup_with(
        calendar: StaticCalendar,
        directory: Arc<dyn GuildDirectory>,
        script: &str,
    ) -> Setup {
        let temp = tempfile::tempdir().unwrap();
        let calendar = Arc::new(calendar);
        let recorder = Arc::new(
            EventRecorder::new(
                Arc::new(SessionRegistry::new()),
                Arc::new(FakeTransport::with_pcm(vec![3; 1024])),
                Arc::new(RecordingNotifier::default()),
                sh_encoder(script, Duration::from_secs(10)),
                RecordStore::new(temp.path().join("recordings"), FixedOffset::east_opt(0).unwrap()),
            )
            .with_temp_dir(temp.path().join("tmp")),
        );
        let config = RecorderConfig {
            fetch_timeout_seconds: 1,
            ..Default::default()
        };
        let reconciler = Reconciler::new(
            calendar.clone(),
            directory,
            recorder.clone(),
            &config,
        );
        Setup {
            reconciler,
            calendar,
            recorder,
            _temp: temp,
        }
    }

    fn in_guild(mut e: CalendarEvent, guild: u64) -> CalendarEvent {
        e.guild_id = GuildId(guild);
        e
    }

    #[tokio::test]
    async fn test_standup_is_started_then_stopped() {
        let s = setup(StaticCalendar::default(), vec![GuildId(1)]);
        let t0 = Utc::now();

        let mut standup = event(7, "Standup", EventStatus::Scheduled, t0 + ChronoDuration::seconds(30));
        standup.end_time = Some(t0 + ChronoDuration::minutes(15));
        standup.channel = Some(voice_channel(10, Some("Engineering")));
        s.calendar.set(GuildId(1), vec![standup.clone()]);

        let report = s.reconciler.tick(t0).await.unwrap();
        assert_eq!(report.started, vec![(GuildId(1), EventId(7))]);
        assert!(s.recorder.is_recording(GuildId(1)).await);

        // Second tick while still scheduled changes nothing.
        let report = s.reconciler.tick(t0).await.unwrap();
        assert!(report.started.is_empty());

        standup.status = EventStatus::Active;
        s.calendar.set(GuildId(1), vec![standup]);
        let near_end = t0 + ChronoDuration::minutes(14) + ChronoDuration::seconds(30);
        let report = s.reconciler.tick(near_end).await.unwrap();
        assert_eq!(report.stopped, vec![(GuildId(1), EventId(7))]);
        assert!(!s.recorder.is_recording(GuildId(1)).await);

        let records = s.recorder.store().list().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].portfolio_id, "Engineering");
    }

    #[tokio::test]
    async fn test_event_without_end_time_keeps_recording() {
        let s = setup(StaticCalendar::default(), vec![GuildId(1)]);
        let t0 = Utc::now();
        let mut e = event(8, "Open call", EventStatus::Scheduled, t0 + ChronoDuration::seconds(10));
        s.calendar.set(GuildId(1), vec![e.clone()]);
        s.reconciler.tick(t0).await.unwrap();

        e.status = EventStatus::Active;
        s.calendar.set(GuildId(1), vec![e]);
        for hours in 1..4 {
            let report = s.reconciler.tick(t0 + ChronoDuration::hours(hours)).await.unwrap();
            assert!(report.stopped.is_empty());
        }
        assert!(s.recorder.is_recording(GuildId(1)).await);

        s.recorder.end(GuildId(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_failing_guild_does_not_block_others() {
        let calendar = StaticCalendar {
            failing: vec![GuildId(2)],
            hanging: vec![GuildId(3)],
            ..Default::default()
        };
        let s = setup(calendar, vec![GuildId(1), GuildId(2), GuildId(3)]);
        let t0 = Utc::now();
        s.calendar.set(
            GuildId(1),
            vec![in_guild(event(9, "Sync", EventStatus::Scheduled, t0 + ChronoDuration::seconds(5)), 1)],
        );

        let report = s.reconciler.tick(t0).await.unwrap();
        assert_eq!(report.guilds, 3);
        assert_eq!(report.started, vec![(GuildId(1), EventId(9))]);
        assert_eq!(report.failed_guilds, vec![GuildId(2), GuildId(3)]);

        s.recorder.end_all().await;
    }

    #[tokio::test]
    async fn test_two_guilds_record_independently() {
        let s = setup(StaticCalendar::default(), vec![GuildId(1), GuildId(2)]);
        let t0 = Utc::now();
        let start = t0 + ChronoDuration::seconds(20);
        s.calendar.set(GuildId(1), vec![in_guild(event(1, "A", EventStatus::Scheduled, start), 1)]);
        s.calendar.set(GuildId(2), vec![in_guild(event(2, "B", EventStatus::Scheduled, start), 2)]);

        let report = s.reconciler.tick(t0).await.unwrap();
        assert_eq!(report.started.len(), 2);
        assert_eq!(s.recorder.active().await.len(), 2);

        s.recorder.end(GuildId(1)).await.unwrap();
        assert!(s.recorder.is_recording(GuildId(2)).await);
        s.recorder.end(GuildId(2)).await.unwrap();
    }

    #[tokio::test]
    async fn test_back_to_back_meetings_hand_over() {
        let s = setup(StaticCalendar::default(), vec![GuildId(1)]);
        let t0 = Utc::now();

        let mut first = event(1, "First", EventStatus::Scheduled, t0 + ChronoDuration::seconds(10));
        first.end_time = Some(t0 + ChronoDuration::minutes(30));
        s.calendar.set(GuildId(1), vec![first.clone()]);
        s.reconciler.tick(t0).await.unwrap();

        let handover = t0 + ChronoDuration::minutes(29) + ChronoDuration::seconds(30);
        first.status = EventStatus::Active;
        let second = event(2, "Second", EventStatus::Scheduled, handover + ChronoDuration::seconds(40));
        s.calendar.set(GuildId(1), vec![second, first]);

        let report = s.reconciler.tick(handover).await.unwrap();
        assert_eq!(report.stopped, vec![(GuildId(1), EventId(1))]);
        assert_eq!(report.started, vec![(GuildId(1), EventId(2))]);

        let active = s.recorder.active().await;
        assert_eq!(active[0].event_id, EventId(2));
        s.recorder.end_all().await;
    }

    #[tokio::test]
    async fn test_run_exits_on_cancel() {
        let s = setup(StaticCalendar::default(), vec![]);
        let reconciler = Arc::new(s.reconciler);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(reconciler.run(cancel.clone()));

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("loop stops after cancel")
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancel_during_stop_still_commits_recording() {
        let s = setup_with(
            StaticCalendar::default(),
            Arc::new(StaticDirectory(vec![GuildId(1)])),
            SLOW_COPY_SCRIPT,
        );
        let mut retro = event(4, "Retro", EventStatus::Active, Utc::now());
        s.recorder.begin(GuildId(1), retro.clone()).await.unwrap();

        retro.end_time = Some(Utc::now() + ChronoDuration::seconds(30));
        s.calendar.set(GuildId(1), vec![retro]);

        let recorder = s.recorder.clone();
        let tmp_dir = s._temp.path().join("tmp");
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(Arc::new(s.reconciler).run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(300)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("loop stops once the stop finishes")
            .unwrap();

        assert!(recorder.end_all().await.is_empty());
        let records = recorder.store().list().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, RecordStatus::Finalized);
        assert!(std::path::Path::new(&records[0].recording_file_link).exists());
        assert_eq!(std::fs::read_dir(&tmp_dir).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_hanging_guild_listing_times_out() {
        let s = setup_with(StaticCalendar::default(), Arc::new(HangingDirectory), COPY_SCRIPT);

        let tick = tokio::time::timeout(Duration::from_secs(5), s.reconciler.tick(Utc::now()))
            .await
            .expect("tick is bounded by the fetch timeout");
        let err = tick.unwrap_err();
        assert!(err.to_string().contains("timed out"), "{err:#}");
    }
}
