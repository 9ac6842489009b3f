//! Scheduled calendar events as seen by the recorder.
//!
//! The recorder never mutates events; it only reads them through a
//! [`CalendarSource`]. Timestamps are always UTC.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! snowflake {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(into = "String", try_from = "String")]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse().map($name)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0.to_string()
            }
        }

        impl TryFrom<String> for $name {
            type Error = std::num::ParseIntError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                s.parse()
            }
        }
    };
}

snowflake!(
    /// A guild (community server) identifier.
    GuildId
);
snowflake!(
    /// A channel or channel-category identifier.
    ChannelId
);
snowflake!(
    /// A scheduled event identifier.
    EventId
);

/// Lifecycle of a scheduled event. Moves forward only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Scheduled,
    Active,
    Completed,
    Cancelled,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Display order used when grouping events.
    pub const ALL: [EventStatus; 4] = [
        EventStatus::Active,
        EventStatus::Scheduled,
        EventStatus::Completed,
        EventStatus::Cancelled,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Voice,
    Stage,
    Text,
    Other,
}

/// The category a channel sits in, with the text channels that can carry notices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRef {
    pub id: ChannelId,
    pub name: String,
    #[serde(default)]
    pub text_channels: Vec<ChannelId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRef {
    pub id: ChannelId,
    pub name: String,
    pub kind: ChannelKind,
    pub category: Option<CategoryRef>,
}

impl ChannelRef {
    /// Only plain voice channels are recorded.
    pub fn is_voice(&self) -> bool {
        self.kind == ChannelKind::Voice
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: EventId,
    pub guild_id: GuildId,
    pub name: String,
    pub status: EventStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub channel: Option<ChannelRef>,
    pub description: Option<String>,
}

impl CalendarEvent {
    /// The associated channel, if it can be recorded.
    pub fn voice_channel(&self) -> Option<&ChannelRef> {
        self.channel.as_ref().filter(|c| c.is_voice())
    }

    pub fn category(&self) -> Option<&CategoryRef> {
        self.channel.as_ref().and_then(|c| c.category.as_ref())
    }
}

/// Read access to a guild's scheduled events.
#[async_trait]
pub trait CalendarSource: Send + Sync {
    async fn fetch_events(&self, guild: GuildId) -> Result<Vec<CalendarEvent>>;

    async fn fetch_event(&self, guild: GuildId, event: EventId) -> Result<Option<CalendarEvent>>;
}

/// The set of guilds the bot belongs to.
#[async_trait]
pub trait GuildDirectory: Send + Sync {
    async fn guilds(&self) -> Result<Vec<GuildId>>;
}

/// Events grouped by status in [`EventStatus::ALL`] order, then by start time.
pub fn group_by_status(events: &[CalendarEvent]) -> Vec<(EventStatus, Vec<CalendarEvent>)> {
    EventStatus::ALL
        .iter()
        .filter_map(|status| {
            let mut group: Vec<CalendarEvent> = events
                .iter()
                .filter(|e| e.status == *status)
                .cloned()
                .collect();
            if group.is_empty() {
                return None;
            }
            group.sort_by_key(|e| e.start_time);
            Some((*status, group))
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn voice_channel(id: u64, category: Option<&str>) -> ChannelRef {
        ChannelRef {
            id: ChannelId(id),
            name: format!("voice-{id}"),
            kind: ChannelKind::Voice,
            category: category.map(|name| CategoryRef {
                id: ChannelId(id + 1000),
                name: name.to_string(),
                text_channels: vec![ChannelId(id + 2000)],
            }),
        }
    }

    pub fn event(id: u64, name: &str, status: EventStatus, start: DateTime<Utc>) -> CalendarEvent {
        CalendarEvent {
            id: EventId(id),
            guild_id: GuildId(1),
            name: name.to_string(),
            status,
            start_time: start,
            end_time: None,
            channel: Some(voice_channel(10, None)),
            description: None,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Calendar backed by a map. Guilds in `failing` error out; guilds in
    /// `hanging` never answer.
    #[derive(Default)]
    pub struct StaticCalendar {
        pub events: Mutex<HashMap<GuildId, Vec<CalendarEvent>>>,
        pub failing: Vec<GuildId>,
        pub hanging: Vec<GuildId>,
    }

    impl StaticCalendar {
        pub fn set(&self, guild: GuildId, events: Vec<CalendarEvent>) {
            self.events.lock().unwrap().insert(guild, events);
        }
    }

    #[async_trait]
    impl CalendarSource for StaticCalendar {
        async fn fetch_events(&self, guild: GuildId) -> Result<Vec<CalendarEvent>> {
            if self.failing.contains(&guild) {
                anyhow::bail!("503 from calendar");
            }
            if self.hanging.contains(&guild) {
                std::future::pending::<()>().await;
            }
            Ok(self.events.lock().unwrap().get(&guild).cloned().unwrap_or_default())
        }

        async fn fetch_event(&self, guild: GuildId, event: EventId) -> Result<Option<CalendarEvent>> {
            Ok(self
                .fetch_events(guild)
                .await?
                .into_iter()
                .find(|e| e.id == event))
        }
    }

    /// Directory whose guild listing never answers.
    pub struct HangingDirectory;

    #[async_trait]
    impl GuildDirectory for HangingDirectory {
        async fn guilds(&self) -> Result<Vec<GuildId>> {
            std::future::pending().await
        }
    }

    pub struct StaticDirectory(pub Vec<GuildId>);

    #[async_trait]
    impl GuildDirectory for StaticDirectory {
        async fn guilds(&self) -> Result<Vec<GuildId>> {
            Ok(self.0.clone())
        }
    }
}
