//! User account endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use tracing::info;

use crate::db::{UpdateUserRequest, User, UserResponse};
use crate::AppState;

use super::auth::{hash_password, require_admin};
use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{validate_name, validate_password};

fn require_self_or_admin(user: &User, id: &str) -> Result<(), ApiError> {
    if user.id == id || user.is_admin() {
        Ok(())
    } else {
        Err(ApiError::forbidden("You can only access your own account"))
    }
}

/// GET /api/users (admin)
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    require_admin(&user)?;
    let users = User::list(&state.db).await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

/// GET /api/users/:id
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> Result<Json<UserResponse>, ApiError> {
    require_self_or_admin(&user, &id)?;
    let found = User::get_by_id(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(found.into()))
}

/// PUT /api/users/:id
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    require_self_or_admin(&user, &id)?;

    let mut errors = ValidationErrorBuilder::new();
    if let Some(ref name) = req.name {
        errors.check("name", validate_name(name));
    }
    if let Some(ref password) = req.password {
        errors.check("password", validate_password(password));
    }
    errors.finish()?;

    if User::get_by_id(&state.db, &id).await?.is_none() {
        return Err(ApiError::not_found("User not found"));
    }

    let password_hash = match req.password {
        Some(ref password) => Some(
            hash_password(password)
                .map_err(|e| ApiError::internal(format!("Failed to hash password: {}", e)))?,
        ),
        None => None,
    };

    let updated = User::update(
        &state.db,
        &id,
        req.name.as_deref().map(str::trim),
        password_hash.as_deref(),
    )
    .await?;

    if password_hash.is_some() {
        // Changing the password signs out every other device
        sqlx::query("DELETE FROM sessions WHERE user_id = ?")
            .bind(&id)
            .execute(&state.db)
            .await?;
        info!(user_id = %id, "Password changed, sessions revoked");
    }

    Ok(Json(updated.into()))
}

/// DELETE /api/users/:id (admin)
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    require_admin(&user)?;
    if user.id == id {
        return Err(ApiError::bad_request("You cannot delete your own account"));
    }

    if !User::delete(&state.db, &id).await? {
        return Err(ApiError::not_found("User not found"));
    }

    info!(user_id = %id, deleted_by = %user.id, "User deleted");
    Ok(StatusCode::NO_CONTENT)
}
