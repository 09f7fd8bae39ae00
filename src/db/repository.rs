//! Storage seams used by the availability checker and the assessment scorer.
//!
//! Both routines receive one of these traits explicitly so they can run
//! against SQLite in production and against in-memory doubles in tests.

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::SqlitePool;

use super::models::{Assessment, Booking, BookingStatus};

#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Bookings of `consultant_id` with `day_start <= date < day_end`
    /// whose status is not in `exclude_statuses`.
    async fn find_bookings_for_consultant_on_date(
        &self,
        consultant_id: &str,
        day_start: NaiveDate,
        day_end: NaiveDate,
        exclude_statuses: &[BookingStatus],
    ) -> Result<Vec<Booking>, sqlx::Error>;
}

#[async_trait]
pub trait AssessmentRepository: Send + Sync {
    async fn find_assessment_by_id(&self, id: &str) -> Result<Option<Assessment>, sqlx::Error>;
}

/// SQLite-backed implementation of the repository traits
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl BookingRepository for SqliteStore {
    async fn find_bookings_for_consultant_on_date(
        &self,
        consultant_id: &str,
        day_start: NaiveDate,
        day_end: NaiveDate,
        exclude_statuses: &[BookingStatus],
    ) -> Result<Vec<Booking>, sqlx::Error> {
        Booking::list_for_consultant_between(
            &self.pool,
            consultant_id,
            day_start,
            day_end,
            exclude_statuses,
        )
        .await
    }
}

#[async_trait]
impl AssessmentRepository for SqliteStore {
    async fn find_assessment_by_id(&self, id: &str) -> Result<Option<Assessment>, sqlx::Error> {
        Assessment::get_by_id(&self.pool, id).await
    }
}
