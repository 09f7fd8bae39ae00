mod models;
mod repository;
mod seeders;

pub use models::*;
pub use repository::{AssessmentRepository, BookingRepository, SqliteStore};
pub use seeders::seed_builtin_assessments;

use anyhow::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

pub type DbPool = SqlitePool;

/// Message raised by the booking overlap triggers
pub const OVERLAP_GUARD_MESSAGE: &str = "booking overlaps an existing booking";

/// Returns true when a storage error came from the booking overlap triggers
pub fn is_overlap_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.message().contains(OVERLAP_GUARD_MESSAGE),
        _ => false,
    }
}

/// Execute a SQL migration file, properly handling comments
async fn execute_sql(pool: &SqlitePool, sql: &str) -> Result<()> {
    for statement in split_statements(sql) {
        sqlx::query(&statement).execute(pool).await?;
    }
    Ok(())
}

/// Split a migration file into statements. Comment lines are dropped first
/// so a ';' inside a comment never ends a statement.
fn split_statements(sql: &str) -> Vec<String> {
    let cleaned: String = sql
        .lines()
        .filter(|line| !line.trim().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n");
    cleaned
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub async fn init(data_dir: &Path) -> Result<DbPool> {
    let db_path = data_dir.join("mindhaven.db");
    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    info!("Initializing database at {}", db_path.display());

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await?;

    // Enable WAL mode for better concurrency
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&pool)
        .await?;

    prepare(&pool).await?;

    info!("Database initialized successfully");
    Ok(pool)
}

/// Open a private in-memory database with the full schema applied.
///
/// A single connection is kept so every query sees the same database.
pub async fn init_memory() -> Result<DbPool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    prepare(&pool).await?;
    Ok(pool)
}

async fn prepare(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;
    run_migrations(pool).await?;
    seed_builtin_assessments(pool).await?;
    Ok(())
}

async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    info!("Running database migrations...");

    // Migration 001: Initial schema
    execute_sql(pool, include_str!("../../migrations/001_initial.sql")).await?;

    // Migration 002: Booking overlap guard. Trigger bodies contain ';', so
    // the file is sent as a single batch instead of being split.
    let has_guard: Option<(String,)> = sqlx::query_as(
        "SELECT name FROM sqlite_master WHERE type='trigger' AND name='bookings_no_overlap_insert'",
    )
    .fetch_optional(pool)
    .await?;
    if has_guard.is_none() {
        sqlx::raw_sql(include_str!("../../migrations/002_booking_overlap_guard.sql"))
            .execute(pool)
            .await?;
    }

    info!("Migrations complete");
    Ok(())
}
