pub mod assessments;
pub mod auth;
pub mod bookings;
pub mod consultants;
pub mod error;
pub mod metrics;
pub mod rate_limit;
pub mod users;
mod validation;

use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method,
    },
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Credential endpoints share the stricter auth budget
    let credential_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_auth,
        ));

    let auth_routes = Router::new()
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me))
        .merge(credential_routes);

    let api_routes = Router::new()
        // Users
        .route("/users", get(users::list_users))
        .route(
            "/users/:id",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        )
        // Consultants
        .route(
            "/consultants",
            get(consultants::list_consultants).post(consultants::create_consultant),
        )
        .route(
            "/consultants/:id",
            get(consultants::get_consultant).put(consultants::update_consultant),
        )
        .route(
            "/consultants/:id/availability",
            get(consultants::check_availability),
        )
        .route(
            "/consultants/:id/bookings",
            get(consultants::list_consultant_bookings),
        )
        // Bookings
        .route(
            "/bookings",
            get(bookings::list_bookings).post(bookings::create_booking),
        )
        .route("/bookings/:id", get(bookings::get_booking))
        .route("/bookings/:id/status", put(bookings::update_booking_status))
        .route("/bookings/:id/cancel", post(bookings::cancel_booking))
        .route("/bookings/:id/pay", post(bookings::pay_booking))
        // Assessments
        .route(
            "/assessments",
            get(assessments::list_assessments).post(assessments::create_assessment),
        )
        .route("/assessments/results", get(assessments::list_results))
        .route("/assessments/results/:id", get(assessments::get_result))
        .route(
            "/assessments/:id",
            get(assessments::get_assessment)
                .put(assessments::update_assessment)
                .delete(assessments::delete_assessment),
        )
        .route("/assessments/:id/submit", post(assessments::submit_assessment))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_api,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics::metrics_endpoint))
        .nest("/api/auth", auth_routes)
        .nest("/api", api_routes)
        .layer(middleware::from_fn(metrics::metrics_middleware))
        .layer(cors_layer(&state.config.server))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    let allow_origin = if origins.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static("x-api-key"),
        ])
        .max_age(Duration::from_secs(60 * 60))
}

async fn health_check() -> &'static str {
    "OK"
}
