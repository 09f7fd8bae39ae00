pub mod api;
pub mod config;
pub mod db;
pub mod engine;

pub use db::DbPool;

use config::Config;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use crate::api::rate_limit::RateLimiter;
use crate::db::{AssessmentRepository, BookingRepository, SqliteStore};

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    /// Booking lookups used by the availability checker
    pub bookings: Arc<dyn BookingRepository>,
    /// Assessment lookups used when scoring submissions
    pub assessments: Arc<dyn AssessmentRepository>,
    pub rate_limiter: Arc<RateLimiter>,
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    /// State backed by SQLite for every repository
    pub fn new(config: Config, db: DbPool) -> Self {
        let store = Arc::new(SqliteStore::new(db.clone()));
        Self::with_repositories(config, db, store.clone(), store)
    }

    pub fn with_repositories(
        config: Config,
        db: DbPool,
        bookings: Arc<dyn BookingRepository>,
        assessments: Arc<dyn AssessmentRepository>,
    ) -> Self {
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
        Self {
            config,
            db,
            bookings,
            assessments,
            rate_limiter,
            metrics_handle: None,
        }
    }

    /// Set the Prometheus metrics handle
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }
}
