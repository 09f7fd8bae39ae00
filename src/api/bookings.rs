//! Booking endpoints: create with availability check, list, status changes, payment.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::db::{
    is_overlap_violation, Booking, BookingStatus, Consultant, CreateBookingRequest, NewBooking,
    PaymentStatus, Role, UpdateBookingStatusRequest, User,
};
use crate::engine::availability::{is_slot_available, parse_day};
use crate::AppState;

use super::auth::require_account;
use super::error::{ApiError, ValidationErrorBuilder};
use super::metrics::{record_booking_conflict, record_booking_created};
use super::validation::{validate_optional_text, validate_time_range};

const SLOT_TAKEN: &str = "The requested time slot is no longer available";

/// Who is looking at a booking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Party {
    Client,
    Consultant,
    Admin,
}

async fn load_booking(state: &AppState, id: &str) -> Result<Booking, ApiError> {
    Booking::get_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Booking not found"))
}

fn changed_concurrently() -> ApiError {
    ApiError::conflict("Booking was changed by another request, reload and try again")
}

/// The caller's relation to a booking, or 404 when they have none.
/// Unrelated callers get 404 so booking ids do not leak.
async fn party_to(state: &AppState, user: &User, booking: &Booking) -> Result<Party, ApiError> {
    if user.is_admin() {
        return Ok(Party::Admin);
    }
    if booking.user_id == user.id {
        return Ok(Party::Client);
    }
    if user.role() == Role::Consultant {
        if let Some(profile) = Consultant::get_by_user_id(&state.db, &user.id).await? {
            if profile.id == booking.consultant_id {
                return Ok(Party::Consultant);
            }
        }
    }
    Err(ApiError::not_found("Booking not found"))
}

/// POST /api/bookings
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    user: User,
    Json(req): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<Booking>), ApiError> {
    require_account(&user)?;

    let mut errors = ValidationErrorBuilder::new();
    if req.consultant_id.trim().is_empty() {
        errors.add("consultant_id", "Consultant is required");
    }
    errors.check("time", validate_time_range(&req.start_time, &req.end_time));
    errors.check("notes", validate_optional_text(&req.notes, "Notes", 1000));
    let day = parse_day(&req.date);
    if let Err(ref e) = day {
        errors.add("date", e.to_string());
    }
    errors.finish()?;
    let day = day?;

    let consultant = Consultant::get_by_id(&state.db, &req.consultant_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Consultant not found"))?;
    if !consultant.active() {
        return Err(ApiError::bad_request("This consultant is not taking bookings"));
    }
    if consultant.user_id == user.id {
        return Err(ApiError::bad_request("You cannot book a session with yourself"));
    }

    let available = is_slot_available(
        state.bookings.as_ref(),
        &consultant.id,
        day,
        &req.start_time,
        &req.end_time,
    )
    .await?;
    if !available {
        record_booking_conflict("check");
        return Err(ApiError::conflict(SLOT_TAKEN));
    }

    let new = NewBooking {
        user_id: user.id.clone(),
        consultant_id: consultant.id.clone(),
        date: day,
        start_time: req.start_time,
        end_time: req.end_time,
        notes: req.notes,
    };

    let booking = match Booking::create(&state.db, &new).await {
        Ok(booking) => booking,
        Err(e) if is_overlap_violation(&e) => {
            warn!(
                consultant_id = %consultant.id,
                date = %day,
                "Concurrent booking caught by overlap guard"
            );
            record_booking_conflict("guard");
            return Err(ApiError::conflict(SLOT_TAKEN));
        }
        Err(e) => return Err(e.into()),
    };

    record_booking_created();
    info!(
        booking_id = %booking.id,
        consultant_id = %booking.consultant_id,
        user_id = %booking.user_id,
        date = %booking.date,
        start_time = %booking.start_time,
        end_time = %booking.end_time,
        "Booking created"
    );

    Ok((StatusCode::CREATED, Json(booking)))
}

/// GET /api/bookings - own bookings; consultants also see bookings with them, admins see all
pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<Vec<Booking>>, ApiError> {
    if user.is_admin() {
        return Ok(Json(Booking::list_all(&state.db).await?));
    }

    let bookings = match Consultant::get_by_user_id(&state.db, &user.id).await? {
        Some(profile) => {
            Booking::list_for_user_or_consultant(&state.db, &user.id, &profile.id).await?
        }
        None => Booking::list_for_user(&state.db, &user.id).await?,
    };

    Ok(Json(bookings))
}

/// GET /api/bookings/:id
pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> Result<Json<Booking>, ApiError> {
    let booking = load_booking(&state, &id).await?;
    party_to(&state, &user, &booking).await?;
    Ok(Json(booking))
}

async fn transition(
    state: &AppState,
    user: &User,
    id: &str,
    next: BookingStatus,
) -> Result<Booking, ApiError> {
    let booking = load_booking(state, id).await?;
    let party = party_to(state, user, &booking).await?;

    // Clients may only cancel; confirming and completing belong to the consultant
    if party == Party::Client && next != BookingStatus::Cancelled {
        return Err(ApiError::forbidden(format!(
            "Only the consultant can mark a booking {}",
            next
        )));
    }

    let current = booking.status();
    if !current.can_transition_to(next) {
        return Err(ApiError::bad_request(format!(
            "Cannot change a {} booking to {}",
            current, next
        )));
    }

    let payment = if next == BookingStatus::Cancelled {
        booking.payment_status().on_cancel()
    } else {
        booking.payment_status()
    };

    let updated = Booking::set_status(&state.db, &booking, next, payment)
        .await?
        .ok_or_else(changed_concurrently)?;
    info!(
        booking_id = %id,
        from = %current,
        to = %next,
        payment_status = %payment,
        changed_by = %user.id,
        "Booking status changed"
    );

    Ok(updated)
}

/// PUT /api/bookings/:id/status
pub async fn update_booking_status(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
    Json(req): Json<UpdateBookingStatusRequest>,
) -> Result<Json<Booking>, ApiError> {
    let next = BookingStatus::from_str(&req.status).ok_or_else(|| {
        ApiError::validation_field(
            "status",
            "Status must be one of: pending, confirmed, cancelled, completed",
        )
    })?;

    Ok(Json(transition(&state, &user, &id, next).await?))
}

/// POST /api/bookings/:id/cancel
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> Result<Json<Booking>, ApiError> {
    Ok(Json(
        transition(&state, &user, &id, BookingStatus::Cancelled).await?,
    ))
}

/// POST /api/bookings/:id/pay - record payment for a booking by its client.
///
/// No payment provider is involved; this only moves `payment_status` to paid.
pub async fn pay_booking(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> Result<Json<Booking>, ApiError> {
    let booking = load_booking(&state, &id).await?;
    if party_to(&state, &user, &booking).await? != Party::Client {
        return Err(ApiError::forbidden("Only the client can pay for a booking"));
    }
    if booking.status().is_terminal() {
        return Err(ApiError::bad_request(format!(
            "Cannot pay for a {} booking",
            booking.status()
        )));
    }
    if booking.payment_status() != PaymentStatus::Pending {
        return Err(ApiError::conflict(format!(
            "Booking payment is already {}",
            booking.payment_status()
        )));
    }

    let updated = Booking::set_status(&state.db, &booking, booking.status(), PaymentStatus::Paid)
        .await?
        .ok_or_else(changed_concurrently)?;
    info!(booking_id = %id, user_id = %user.id, "Booking paid");

    Ok(Json(updated))
}
