//! quest-store: opens the quest database and keeps it tidy.
//!
//! # Usage
//!
//! ```bash
//! quest-store                   # run periodic maintenance until Ctrl+C
//! quest-store checkpoint        # one WAL checkpoint(TRUNCATE), prints the result
//! quest-store analyze           # refresh query planner statistics
//! quest-store snapshot <path>   # write a point-in-time copy to <path>
//! ```
//!
//! Configuration comes from the environment (`DATABASE_URL`,
//! `CHECKPOINT_INTERVAL_SECS`, ...). `RUST_LOG` controls log output.

use quest_store::{
    config::Config, db::init_db, Database, MaintenanceSchedule, MaintenanceScheduler,
};
use std::path::PathBuf;
use tokio::sync::watch;

enum Command {
    Run,
    Checkpoint,
    Analyze,
    Snapshot(PathBuf),
}

fn parse_command(args: &[String]) -> Option<Command> {
    match args {
        [] => Some(Command::Run),
        [cmd] if cmd == "run" => Some(Command::Run),
        [cmd] if cmd == "checkpoint" => Some(Command::Checkpoint),
        [cmd] if cmd == "analyze" => Some(Command::Analyze),
        [cmd, path] if cmd == "snapshot" => Some(Command::Snapshot(PathBuf::from(path))),
        _ => None,
    }
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match parse_command(&args) {
        Some(cmd) => cmd,
        None => {
            eprintln!("Usage: quest-store [run | checkpoint | analyze | snapshot <path>]");
            std::process::exit(2);
        }
    };

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // A store that failed to configure must not be used.
    let db = match init_db(&config).await {
        Ok(db) => db,
        Err(e) => {
            eprintln!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };

    let code = match command {
        Command::Run => {
            run(db.clone(), MaintenanceSchedule::from(&config)).await;
            0
        }
        Command::Checkpoint => match db.try_checkpoint_and_truncate().await {
            Ok(outcome) => {
                println!("{}", serde_json::to_string(&outcome).unwrap_or_default());
                0
            }
            Err(e) => {
                eprintln!("{}", e);
                1
            }
        },
        Command::Analyze => match db.try_refresh_statistics().await {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("{}", e);
                1
            }
        },
        Command::Snapshot(path) => match db.export_snapshot(&path).await {
            Ok(()) => {
                println!("{}", path.display());
                0
            }
            Err(e) => {
                eprintln!("{}", e);
                1
            }
        },
    };

    db.close().await;
    std::process::exit(code);
}

async fn run(db: Database, schedule: MaintenanceSchedule) {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = MaintenanceScheduler::spawn(db.clone(), schedule, shutdown_rx);

    tracing::info!("quest-store running, press Ctrl+C to stop");
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
    }
    tracing::info!("Shutdown requested");

    let _ = shutdown_tx.send(true);
    scheduler.join().await;

    // Leave a self-contained database file behind.
    db.checkpoint_and_truncate().await;
    tracing::info!("quest-store shutdown complete");
}
