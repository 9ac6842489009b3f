//! Best-effort chat notifications.
//!
//! Delivery failures are logged and swallowed; they never change the outcome
//! of the operation that triggered them.

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::calendar::{CalendarEvent, ChannelId};

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, channel: ChannelId, content: &str) -> Result<()>;
}

/// Notifier that only logs. Used when no chat backend is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, channel: ChannelId, content: &str) -> Result<()> {
        debug!("notification for channel {}: {}", channel, content);
        Ok(())
    }
}

/// Post to the first text channel in the event's category that accepts the message.
/// Returns whether any channel took it.
pub async fn notify_event(notifier: &dyn Notifier, event: &CalendarEvent, content: &str) -> bool {
    let Some(category) = event.category() else {
        debug!("Event {} has no category, skipping notification", event.id);
        return false;
    };

    for channel in &category.text_channels {
        match notifier.send(*channel, content).await {
            Ok(()) => return true,
            Err(e) => warn!("Notification to channel {} failed: {}", channel, e),
        }
    }

    false
}

pub fn recording_started(event: &CalendarEvent) -> String {
    format!("📢 Automatic recording started: **{}**", event.name)
}

pub fn recording_finished(event: &CalendarEvent) -> String {
    format!("✅ Automatic recording finished: **{}**", event.name)
}
