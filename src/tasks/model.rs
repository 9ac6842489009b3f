use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::TaskError;
use crate::calendar::ChannelId;

/// Storage and display format for deadlines.
pub const DEADLINE_DISPLAY: &str = "%d/%m/%Y %H:%M";
pub(crate) const DEADLINE_STORAGE: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TaskStatus {
    #[default]
    #[serde(rename = "Not Started")]
    NotStarted,
    #[serde(rename = "In Progress")]
    InProgress,
    Completed,
    Cancelled,
}

impl TaskStatus {
    /// Display order for grouped listings.
    pub const ALL: [TaskStatus; 4] = [
        TaskStatus::NotStarted,
        TaskStatus::InProgress,
        TaskStatus::Completed,
        TaskStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "Not Started",
            Self::InProgress => "In Progress",
            Self::Completed => "Completed",
            Self::Cancelled => "Cancelled",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Self::NotStarted => "⏳",
            Self::InProgress => "▶️",
            Self::Completed => "✅",
            Self::Cancelled => "❌",
        }
    }

    /// Completed and cancelled tasks get no reminders.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|status| {
                status.as_str().eq_ignore_ascii_case(wanted)
                    || status.as_str().replace(' ', "_").eq_ignore_ascii_case(wanted)
            })
            .ok_or_else(|| TaskError::InvalidStatus(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Priority {
    #[default]
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(TaskError::InvalidPriority(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Portfolio {
    pub id: i64,
    pub name: String,
    /// Channel that receives task notices and reminders.
    pub channel_id: ChannelId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub priority: Priority,
    pub deadline: NaiveDateTime,
    pub portfolio_id: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl Task {
    pub fn deadline_display(&self) -> String {
        self.deadline.format(DEADLINE_DISPLAY).to_string()
    }
}

/// Fields accepted when creating a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
    pub portfolio_id: i64,
    pub title: String,
    /// `DD/MM/YYYY HH:MM` or `DD/MM/YYYY`.
    pub deadline: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub description: String,
}

/// Parse a user-entered deadline. A bare date means midnight.
pub fn parse_deadline(raw: &str) -> Result<NaiveDateTime, TaskError> {
    let raw = raw.trim();
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, DEADLINE_DISPLAY) {
        return Ok(dt);
    }
    chrono::NaiveDate::parse_from_str(raw, "%d/%m/%Y")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .ok_or_else(|| TaskError::InvalidDeadline(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_parse_deadline_formats() {
        let with_time = parse_deadline("05/03/2024 14:30").unwrap();
        assert_eq!(
            with_time,
            NaiveDate::from_ymd_opt(2024, 3, 5)
                .unwrap()
                .and_hms_opt(14, 30, 0)
                .unwrap()
        );

        let date_only = parse_deadline(" 05/03/2024 ").unwrap();
        assert_eq!(date_only.format("%H:%M").to_string(), "00:00");

        assert!(matches!(
            parse_deadline("2024-03-05"),
            Err(TaskError::InvalidDeadline(_))
        ));
        assert!(parse_deadline("31/02/2024").is_err());
    }

    #[test]
    fn test_status_parsing_and_serde() {
        assert_eq!("in progress".parse::<TaskStatus>().unwrap(), TaskStatus::InProgress);
        assert_eq!("Not_Started".parse::<TaskStatus>().unwrap(), TaskStatus::NotStarted);
        assert!("done".parse::<TaskStatus>().is_err());

        let json = serde_json::to_string(&TaskStatus::NotStarted).unwrap();
        assert_eq!(json, "\"Not Started\"");
        assert!(TaskStatus::Cancelled.is_closed());
        assert!(!TaskStatus::InProgress.is_closed());
    }

    #[test]
    fn test_priority_defaults_to_low() {
        let task: NewTask = serde_json::from_str(
            r#"{"portfolio_id": 1, "title": "Ship it", "deadline": "01/01/2025"}"#,
        )
        .unwrap();
        assert_eq!(task.priority, Priority::Low);
        assert_eq!("HIGH".parse::<Priority>().unwrap(), Priority::High);
    }
}
