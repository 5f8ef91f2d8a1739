pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod scheduler;

pub use config::{Config, ConfigError};
pub use db::{
    init_db, CheckpointOutcome, Database, PragmaReport, PragmaSettings, Repository,
    SerializerStats, WriteHandle, WriteSerializer,
};
pub use domain::{NewQuest, NewUser, Quest, QuestFilter, QuestStatus, QuestUpdate, User, UserUpdate};
pub use error::StoreError;
pub use scheduler::{MaintenanceSchedule, MaintenanceScheduler};
