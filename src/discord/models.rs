//! Wire types for the Discord REST API and their mapping onto calendar types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::calendar::{CalendarEvent, CategoryRef, ChannelId, ChannelKind, ChannelRef, EventStatus};

pub const CHANNEL_TEXT: u8 = 0;
pub const CHANNEL_VOICE: u8 = 2;
pub const CHANNEL_CATEGORY: u8 = 4;
pub const CHANNEL_STAGE: u8 = 13;

#[derive(Debug, Clone, Deserialize)]
pub struct PartialGuild {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Channel {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub position: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduledEvent {
    pub id: String,
    pub guild_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub scheduled_start_time: DateTime<Utc>,
    #[serde(default)]
    pub scheduled_end_time: Option<DateTime<Utc>>,
    pub status: u8,
    #[serde(default)]
    pub channel_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateMessage<'a> {
    pub content: &'a str,
}

pub fn event_status(code: u8) -> Option<EventStatus> {
    match code {
        1 => Some(EventStatus::Scheduled),
        2 => Some(EventStatus::Active),
        3 => Some(EventStatus::Completed),
        4 => Some(EventStatus::Cancelled),
        _ => None,
    }
}

fn channel_kind(code: u8) -> ChannelKind {
    match code {
        CHANNEL_VOICE => ChannelKind::Voice,
        CHANNEL_STAGE => ChannelKind::Stage,
        CHANNEL_TEXT => ChannelKind::Text,
        _ => ChannelKind::Other,
    }
}

fn channel_id(raw: &str) -> Option<ChannelId> {
    raw.parse().ok()
}

/// Resolve a channel together with its category and the category's text channels.
pub fn channel_ref(id: &str, channels: &[Channel]) -> Option<ChannelRef> {
    let channel = channels.iter().find(|c| c.id == id)?;

    let category = channel
        .parent_id
        .as_deref()
        .and_then(|parent| {
            channels
                .iter()
                .find(|c| c.id == parent && c.kind == CHANNEL_CATEGORY)
        })
        .and_then(|parent| {
            let mut texts: Vec<&Channel> = channels
                .iter()
                .filter(|c| c.kind == CHANNEL_TEXT && c.parent_id.as_deref() == Some(&parent.id))
                .collect();
            texts.sort_by_key(|c| c.position);

            Some(CategoryRef {
                id: channel_id(&parent.id)?,
                name: parent.name.clone().unwrap_or_default(),
                text_channels: texts.iter().filter_map(|c| channel_id(&c.id)).collect(),
            })
        });

    Some(ChannelRef {
        id: channel_id(&channel.id)?,
        name: channel.name.clone().unwrap_or_default(),
        kind: channel_kind(channel.kind),
        category,
    })
}

/// Map a scheduled event. Events with unknown ids or status codes yield `None`.
pub fn calendar_event(event: ScheduledEvent, channels: &[Channel]) -> Option<CalendarEvent> {
    let channel = event
        .channel_id
        .as_deref()
        .and_then(|id| channel_ref(id, channels));

    Some(CalendarEvent {
        id: event.id.parse().ok()?,
        guild_id: event.guild_id.parse().ok()?,
        name: event.name,
        status: event_status(event.status)?,
        start_time: event.scheduled_start_time,
        end_time: event.scheduled_end_time,
        channel,
        description: event.description.filter(|d| !d.is_empty()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::{EventId, GuildId};

    fn channels() -> Vec<Channel> {
        serde_json::from_str(
            r#"[
                {"id": "100", "type": 4, "name": "Engineering", "position": 0},
                {"id": "101", "type": 2, "name": "standup", "parent_id": "100", "position": 2},
                {"id": "103", "type": 0, "name": "eng-chat", "parent_id": "100", "position": 5},
                {"id": "102", "type": 0, "name": "eng-notices", "parent_id": "100", "position": 1},
                {"id": "200", "type": 13, "name": "stage", "position": 9},
                {"id": "300", "type": 0, "name": "general", "position": 0}
            ]"#,
        )
        .unwrap()
    }

    #[test]
    fn test_channel_ref_resolves_category_texts_in_order() {
        let channel = channel_ref("101", &channels()).unwrap();
        assert_eq!(channel.kind, ChannelKind::Voice);
        let category = channel.category.unwrap();
        assert_eq!(category.name, "Engineering");
        assert_eq!(category.text_channels, vec![ChannelId(102), ChannelId(103)]);

        let stage = channel_ref("200", &channels()).unwrap();
        assert_eq!(stage.kind, ChannelKind::Stage);
        assert!(stage.category.is_none());

        assert!(channel_ref("999", &channels()).is_none());
    }

    #[test]
    fn test_scheduled_event_maps_to_calendar_event() {
        let raw: ScheduledEvent = serde_json::from_str(
            r#"{
                "id": "555",
                "guild_id": "1",
                "name": "Standup",
                "description": "portfolio_id: ENG-7",
                "scheduled_start_time": "2024-03-05T09:00:00+00:00",
                "scheduled_end_time": "2024-03-05T09:15:00.000000+00:00",
                "status": 1,
                "channel_id": "101",
                "entity_type": 2
            }"#,
        )
        .unwrap();

        let event = calendar_event(raw, &channels()).unwrap();
        assert_eq!(event.id, EventId(555));
        assert_eq!(event.guild_id, GuildId(1));
        assert_eq!(event.status, EventStatus::Scheduled);
        assert!(event.voice_channel().is_some());
        assert_eq!(
            event.end_time.unwrap() - event.start_time,
            chrono::Duration::minutes(15)
        );
    }

    #[test]
    fn test_external_event_has_no_channel() {
        let raw: ScheduledEvent = serde_json::from_str(
            r#"{
                "id": "9",
                "guild_id": "1",
                "name": "Offsite",
                "description": "",
                "scheduled_start_time": "2024-03-05T09:00:00Z",
                "status": 2,
                "channel_id": null
            }"#,
        )
        .unwrap();

        let event = calendar_event(raw, &channels()).unwrap();
        assert_eq!(event.status, EventStatus::Active);
        assert!(event.channel.is_none());
        assert!(event.description.is_none());
        assert!(event.end_time.is_none());
    }

    #[test]
    fn test_unknown_status_is_skipped() {
        assert_eq!(event_status(3), Some(EventStatus::Completed));
        assert_eq!(event_status(4), Some(EventStatus::Cancelled));
        assert_eq!(event_status(7), None);
    }
}
