//! Prometheus metrics endpoint and HTTP request tracking middleware.
//!
//! Besides per-request counters this records booking and assessment activity,
//! and refreshes a few table-count gauges each time `/metrics` is scraped.

use axum::{
    body::Body,
    extract::{MatchedPath, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::time::Instant;

use crate::AppState;

pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";
pub const BOOKINGS_CREATED_TOTAL: &str = "bookings_created_total";
pub const BOOKING_CONFLICTS_TOTAL: &str = "booking_conflicts_total";
pub const ASSESSMENTS_SUBMITTED_TOTAL: &str = "assessments_submitted_total";
pub const USERS_TOTAL: &str = "users_total";
pub const ACTIVE_CONSULTANTS: &str = "active_consultants";

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// Only one recorder can be installed per process.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    describe_counter!(HTTP_REQUESTS_TOTAL, "Total number of HTTP requests received");
    describe_histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );
    describe_counter!(BOOKINGS_CREATED_TOTAL, "Total number of bookings created");
    describe_counter!(
        BOOKING_CONFLICTS_TOTAL,
        "Booking requests rejected because the slot was taken, by stage (check/guard)"
    );
    describe_counter!(
        ASSESSMENTS_SUBMITTED_TOTAL,
        "Total number of scored assessment submissions by severity"
    );
    describe_gauge!(USERS_TOTAL, "Total number of registered users");
    describe_gauge!(ACTIVE_CONSULTANTS, "Number of active consultant profiles");

    Ok(handle)
}

/// GET /metrics - Prometheus text format, no authentication.
pub async fn metrics_endpoint(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    update_gauge_metrics(&state).await;

    match state.metrics_handle.as_ref() {
        Some(h) => (StatusCode::OK, h.render()),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Metrics not initialized".to_string(),
        ),
    }
}

async fn update_gauge_metrics(state: &AppState) {
    if let Ok(count) = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
        .fetch_one(&state.db)
        .await
    {
        gauge!(USERS_TOTAL).set(count as f64);
    }

    if let Ok(count) =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM consultants WHERE is_active = 1")
            .fetch_one(&state.db)
            .await
    {
        gauge!(ACTIVE_CONSULTANTS).set(count as f64);
    }
}

/// Records `http_requests_total` (method, path, status) and
/// `http_request_duration_seconds` (method, path).
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();

    // Matched route template keeps ids out of the label set
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|mp| mp.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let method = request.method().to_string();

    let response = next.run(request).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(HTTP_REQUESTS_TOTAL, "method" => method.clone(), "path" => path.clone(), "status" => status).increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "path" => path).record(duration);

    response
}

pub fn record_booking_created() {
    counter!(BOOKINGS_CREATED_TOTAL).increment(1);
}

/// `stage` is `check` when the availability check refused the slot and
/// `guard` when the storage guard caught a concurrent insert.
pub fn record_booking_conflict(stage: &'static str) {
    counter!(BOOKING_CONFLICTS_TOTAL, "stage" => stage).increment(1);
}

pub fn record_assessment_submitted(severity: &str) {
    counter!(ASSESSMENTS_SUBMITTED_TOTAL, "severity" => severity.to_string()).increment(1);
}
