//! Consultant profile and availability endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use tracing::info;

use crate::db::{
    AvailabilityQuery, AvailabilityResponse, Booking, Consultant, ConsultantResponse,
    CreateConsultantRequest, DayQuery, Role, UpdateConsultantRequest, User, DATE_FORMAT,
};
use crate::engine::availability::{day_bounds, is_slot_available, parse_day};
use crate::AppState;

use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{validate_optional_text, validate_text, validate_time_range, validate_uuid};

fn validate_hourly_rate(rate: i64) -> Result<(), String> {
    if rate < 0 {
        return Err("Hourly rate cannot be negative".to_string());
    }
    Ok(())
}

fn validate_create_request(req: &CreateConsultantRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors.check("title", validate_text(&req.title, "Title", 100));
    errors.check("specialization", validate_text(&req.specialization, "Specialization", 100));
    errors.check("bio", validate_optional_text(&req.bio, "Bio", 2000));
    errors.check("hourly_rate", validate_hourly_rate(req.hourly_rate));
    errors.finish()
}

fn validate_update_request(req: &UpdateConsultantRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Some(ref title) = req.title {
        errors.check("title", validate_text(title, "Title", 100));
    }
    if let Some(ref specialization) = req.specialization {
        errors.check("specialization", validate_text(specialization, "Specialization", 100));
    }
    errors.check("bio", validate_optional_text(&req.bio, "Bio", 2000));
    if let Some(rate) = req.hourly_rate {
        errors.check("hourly_rate", validate_hourly_rate(rate));
    }
    errors.finish()
}

async fn load_consultant(state: &AppState, id: &str) -> Result<Consultant, ApiError> {
    Consultant::get_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Consultant not found"))
}

fn require_owner_or_admin(user: &User, consultant: &Consultant) -> Result<(), ApiError> {
    if consultant.user_id == user.id || user.is_admin() {
        Ok(())
    } else {
        Err(ApiError::forbidden("Only the consultant or an admin can do this"))
    }
}

/// GET /api/consultants - active consultants; admins also see inactive ones
pub async fn list_consultants(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<Vec<ConsultantResponse>>, ApiError> {
    let consultants = Consultant::list(&state.db, user.is_admin()).await?;
    Ok(Json(consultants.into_iter().map(Into::into).collect()))
}

/// GET /api/consultants/:id
pub async fn get_consultant(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ConsultantResponse>, ApiError> {
    Ok(Json(load_consultant(&state, &id).await?.into()))
}

/// POST /api/consultants
pub async fn create_consultant(
    State(state): State<Arc<AppState>>,
    user: User,
    Json(req): Json<CreateConsultantRequest>,
) -> Result<(StatusCode, Json<ConsultantResponse>), ApiError> {
    validate_create_request(&req)?;

    let owner_id = match (user.role(), req.user_id.as_deref()) {
        (Role::Admin, Some(target)) => {
            validate_uuid(target, "user_id")
                .map_err(|e| ApiError::validation_field("user_id", e))?;
            let target_user = User::get_by_id(&state.db, target)
                .await?
                .ok_or_else(|| ApiError::validation_field("user_id", "User not found"))?;
            if target_user.role() != Role::Consultant {
                return Err(ApiError::validation_field(
                    "user_id",
                    "Profiles can only be created for consultant accounts",
                ));
            }
            target_user.id
        }
        (Role::Admin, None) => {
            return Err(ApiError::validation_field(
                "user_id",
                "Admins must name the consultant account",
            ))
        }
        (Role::Consultant, None) => user.id.clone(),
        (Role::Consultant, Some(target)) if target == user.id => user.id.clone(),
        _ => {
            return Err(ApiError::forbidden(
                "Only consultant accounts can create their own profile",
            ))
        }
    };

    if Consultant::get_by_user_id(&state.db, &owner_id).await?.is_some() {
        return Err(ApiError::conflict("This account already has a consultant profile"));
    }

    let consultant = Consultant::create(&state.db, &owner_id, &req).await?;
    info!(consultant_id = %consultant.id, user_id = %owner_id, "Consultant profile created");

    Ok((StatusCode::CREATED, Json(consultant.into())))
}

/// PUT /api/consultants/:id
pub async fn update_consultant(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
    Json(req): Json<UpdateConsultantRequest>,
) -> Result<Json<ConsultantResponse>, ApiError> {
    validate_update_request(&req)?;
    let consultant = load_consultant(&state, &id).await?;
    require_owner_or_admin(&user, &consultant)?;

    let updated = Consultant::update(&state.db, &id, &req).await?;
    Ok(Json(updated.into()))
}

/// GET /api/consultants/:id/availability?date=&start_time=&end_time=
pub async fn check_availability(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<AvailabilityResponse>, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors.check("time", validate_time_range(&query.start_time, &query.end_time));
    let day = parse_day(&query.date);
    if let Err(ref e) = day {
        errors.add("date", e.to_string());
    }
    errors.finish()?;
    let day = day?;

    let consultant = load_consultant(&state, &id).await?;
    let available = consultant.active()
        && is_slot_available(
            state.bookings.as_ref(),
            &consultant.id,
            day,
            &query.start_time,
            &query.end_time,
        )
        .await?;

    Ok(Json(AvailabilityResponse {
        consultant_id: consultant.id,
        date: day.format(DATE_FORMAT).to_string(),
        start_time: query.start_time,
        end_time: query.end_time,
        available,
    }))
}

/// GET /api/consultants/:id/bookings?date= - the consultant's schedule for a day
pub async fn list_consultant_bookings(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
    Query(query): Query<DayQuery>,
) -> Result<Json<Vec<Booking>>, ApiError> {
    let consultant = load_consultant(&state, &id).await?;
    require_owner_or_admin(&user, &consultant)?;

    let (day_start, day_end) = day_bounds(parse_day(&query.date)?)?;
    let bookings =
        Booking::list_for_consultant_between(&state.db, &consultant.id, day_start, day_end, &[])
            .await?;

    Ok(Json(bookings))
}
