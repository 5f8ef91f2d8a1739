//! Domain types for the quest tracker schema.
//!
//! - `User` / `NewUser` / `UserUpdate`
//! - `Quest` / `NewQuest` / `QuestUpdate` / `QuestFilter`
//! - `QuestStatus`

pub mod quest;
pub mod user;

pub use quest::{NewQuest, Quest, QuestFilter, QuestStatus, QuestStatusParseError, QuestUpdate};
pub use user::{NewUser, User, UserUpdate};

use chrono::{DateTime, Utc};

/// Convert stored unix seconds to a UTC timestamp.
pub(crate) fn from_unix_secs(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}
