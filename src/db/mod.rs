//! Database module for SQLite operations.
//!
//! This module provides:
//! - Connection setup with WAL pragmas (`connection`)
//! - The single-writer job queue (`writer`)
//! - Checkpoint, statistics and snapshot helpers (`maintenance`)
//! - Schema migrations and the repository layer

pub mod connection;
pub mod maintenance;
pub mod migrations;
pub mod repo;
pub mod writer;

pub use connection::{Database, PragmaReport, PragmaSettings};
pub use maintenance::CheckpointOutcome;
pub use migrations::{init_db, run_migrations};
pub use repo::Repository;
pub use writer::{SerializerStats, WriteHandle, WriteSerializer};
