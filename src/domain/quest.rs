use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Progress of a quest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl QuestStatus {
    /// The value stored in the `status` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestStatus::Pending => "pending",
            QuestStatus::InProgress => "in_progress",
            QuestStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for QuestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown quest status: {0}")]
pub struct QuestStatusParseError(pub String);

impl FromStr for QuestStatus {
    type Err = QuestStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(QuestStatus::Pending),
            "in_progress" => Ok(QuestStatus::InProgress),
            "completed" => Ok(QuestStatus::Completed),
            other => Err(QuestStatusParseError(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quest {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: QuestStatus,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A quest to create. New quests always start as `pending`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewQuest {
    pub title: String,
    pub description: String,
    pub user_id: String,
}

/// Partial update; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<QuestStatus>,
}

impl QuestUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.status.is_none()
    }
}

/// Listing criteria. All present fields must match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestFilter {
    pub status: Option<QuestStatus>,
    /// Case-insensitive substring of title or description.
    pub search: Option<String>,
    pub user_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&QuestStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");

        let parsed: QuestStatus = serde_json::from_str("\"completed\"").unwrap();
        assert_eq!(parsed, QuestStatus::Completed);
    }

    #[test]
    fn test_status_from_str() {
        assert_eq!("pending".parse::<QuestStatus>().unwrap(), QuestStatus::Pending);
        assert_eq!(
            "in_progress".parse::<QuestStatus>().unwrap(),
            QuestStatus::InProgress
        );
        assert!("In Progress".parse::<QuestStatus>().is_err());
    }

    #[test]
    fn test_default_status_is_pending() {
        assert_eq!(QuestStatus::default(), QuestStatus::Pending);
    }

    #[test]
    fn test_quest_json_uses_camel_case() {
        let quest = Quest {
            id: "q1".to_string(),
            title: "Slay".to_string(),
            description: "the dragon".to_string(),
            status: QuestStatus::Pending,
            user_id: "u1".to_string(),
            created_at: crate::domain::from_unix_secs(0),
            updated_at: crate::domain::from_unix_secs(0),
        };
        let value = serde_json::to_value(&quest).unwrap();
        assert_eq!(value["userId"], "u1");
        assert_eq!(value["status"], "pending");
    }
}
