//! Daily reminders for tasks due tomorrow.
//!
//! Checked on a fixed interval; reminders only go out during the configured
//! local hour and at most once per task per day.

use anyhow::Result;
use chrono::{DateTime, Days, FixedOffset, NaiveDate, Timelike, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ReminderConfig;
use crate::db::{Db, PortfolioRepository, TaskRepository};
use crate::notify::Notifier;
use crate::tasks::reminder_notice;

struct Reminded {
    date: NaiveDate,
    tasks: HashSet<i64>,
}

pub struct DeadlineReminder {
    db: Db,
    notifier: Arc<dyn Notifier>,
    hour: u32,
    interval: Duration,
    offset: FixedOffset,
    reminded: Mutex<Reminded>,
}

impl DeadlineReminder {
    pub fn new(
        db: Db,
        notifier: Arc<dyn Notifier>,
        config: &ReminderConfig,
        offset: FixedOffset,
    ) -> Self {
        Self {
            db,
            notifier,
            hour: config.hour,
            interval: Duration::from_secs(config.interval_seconds.max(1)),
            offset,
            reminded: Mutex::new(Reminded {
                date: NaiveDate::MIN,
                tasks: HashSet::new(),
            }),
        }
    }

    /// Send any reminders due at `now`. Returns the ids reminded by this call.
    pub async fn check(&self, now: DateTime<Utc>) -> Result<Vec<i64>> {
        let local = now.with_timezone(&self.offset);
        let today = local.date_naive();

        let mut reminded = self.reminded.lock().await;
        if reminded.date != today {
            reminded.date = today;
            reminded.tasks.clear();
        }

        if local.hour() != self.hour {
            return Ok(Vec::new());
        }

        let Some(tomorrow) = today.checked_add_days(Days::new(1)) else {
            return Ok(Vec::new());
        };
        let (Some(from), Some(to)) = (
            tomorrow.and_hms_opt(0, 0, 0),
            tomorrow
                .checked_add_days(Days::new(1))
                .and_then(|d| d.and_hms_opt(0, 0, 0)),
        ) else {
            return Ok(Vec::new());
        };

        let (due, portfolios) = self.db.with(|conn| {
            Ok((
                TaskRepository::open_due_between(conn, from, to)?,
                PortfolioRepository::list(conn)?,
            ))
        })?;

        let mut sent = Vec::new();
        for task in due {
            if reminded.tasks.contains(&task.id) {
                continue;
            }
            let Some(portfolio) = portfolios.iter().find(|p| p.id == task.portfolio_id) else {
                debug!("Task {} has no portfolio, skipping reminder", task.id);
                continue;
            };

            match self
                .notifier
                .send(portfolio.channel_id, &reminder_notice(&task, portfolio))
                .await
            {
                Ok(()) => {
                    reminded.tasks.insert(task.id);
                    sent.push(task.id);
                }
                Err(e) => warn!("Reminder for task {} failed: {}", task.id, e),
            }
        }

        if !sent.is_empty() {
            info!("Sent {} deadline reminder(s)", sent.len());
        }
        Ok(sent)
    }

    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!(
            "Starting deadline reminders (hour={}, interval={}s)",
            self.hour,
            self.interval.as_secs()
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if let Err(e) = self.check(Utc::now()).await {
                warn!("Deadline reminder check failed: {:#}", e);
            }
        }

        info!("Deadline reminders stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::ChannelId;
    use crate::notify::testing::RecordingNotifier;
    use crate::tasks::{NewTask, Priority, TaskService, TaskStatus};
    use chrono::TimeZone;

    struct Fixture {
        reminder: DeadlineReminder,
        service: TaskService,
        notifier: Arc<RecordingNotifier>,
    }

    fn fixture(offset_hours: i32) -> Fixture {
        let db = Db::open_in_memory().unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        let offset = FixedOffset::east_opt(offset_hours * 3600).unwrap();
        Fixture {
            reminder: DeadlineReminder::new(
                db.clone(),
                notifier.clone(),
                &ReminderConfig::default(),
                offset,
            ),
            service: TaskService::new(db, Arc::new(crate::notify::LogNotifier)),
            notifier,
        }
    }

    async fn add_task(service: &TaskService, portfolio: i64, title: &str, deadline: &str) -> i64 {
        service
            .create_task(NewTask {
                portfolio_id: portfolio,
                title: title.to_string(),
                deadline: deadline.to_string(),
                priority: Priority::Low,
                description: String::new(),
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_reminds_tasks_due_tomorrow_once() {
        let f = fixture(0);
        let p = f.service.create_portfolio("IT", ChannelId(40)).unwrap();
        let due = add_task(&f.service, p.id, "Renew cert", "06/03/2024 15:00").await;
        add_task(&f.service, p.id, "Later", "08/03/2024 15:00").await;
        let closed = add_task(&f.service, p.id, "Done", "06/03/2024 10:00").await;
        f.service.update_status(closed, TaskStatus::Completed).await.unwrap();

        let nine = Utc.with_ymd_and_hms(2024, 3, 5, 9, 10, 0).unwrap();
        assert_eq!(f.reminder.check(nine).await.unwrap(), vec![due]);
        assert!(f.reminder.check(nine).await.unwrap().is_empty());

        let sent = f.notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, ChannelId(40));
        assert!(sent[0].1.contains("06/03/2024 15:00"));
    }

    #[tokio::test]
    async fn test_outside_reminder_hour_sends_nothing() {
        let f = fixture(0);
        let p = f.service.create_portfolio("IT", ChannelId(40)).unwrap();
        add_task(&f.service, p.id, "Renew cert", "06/03/2024").await;

        let ten = Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap();
        assert!(f.reminder.check(ten).await.unwrap().is_empty());
        assert!(f.notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_uses_local_offset_for_hour_and_date() {
        let f = fixture(8);
        let p = f.service.create_portfolio("IT", ChannelId(40)).unwrap();
        let due = add_task(&f.service, p.id, "Standup notes", "06/03/2024 00:00").await;

        // 01:00 UTC is 09:00 at +08:00 on the 5th.
        let utc = Utc.with_ymd_and_hms(2024, 3, 5, 1, 0, 0).unwrap();
        assert_eq!(f.reminder.check(utc).await.unwrap(), vec![due]);
    }

    #[tokio::test]
    async fn test_reminded_set_resets_next_day() {
        let f = fixture(0);
        let p = f.service.create_portfolio("IT", ChannelId(40)).unwrap();
        add_task(&f.service, p.id, "a", "06/03/2024 12:00").await;
        let b = add_task(&f.service, p.id, "b", "07/03/2024 12:00").await;

        f.reminder
            .check(Utc.with_ymd_and_hms(2024, 3, 5, 9, 0, 0).unwrap())
            .await
            .unwrap();
        let next = f
            .reminder
            .check(Utc.with_ymd_and_hms(2024, 3, 6, 9, 0, 0).unwrap())
            .await
            .unwrap();
        assert_eq!(next, vec![b]);
    }
}
