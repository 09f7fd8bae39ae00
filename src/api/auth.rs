use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, State},
    http::{request::Parts, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::Response,
    Json,
};
use rand::Rng;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::info;

use crate::config::Config;
use crate::db::{LoginRequest, LoginResponse, RegisterRequest, Role, Session, User, UserResponse};
use crate::AppState;

use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{validate_email, validate_name, validate_password};

/// Id of the synthetic admin used for admin-token requests. It has no row in
/// `users`, so it cannot own bookings, records or assessments.
pub const SYSTEM_USER_ID: &str = "system";

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2.hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Generate a random token
fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();
    hex::encode(bytes)
}

/// Hash a token for storage
fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Create a login session and return its plaintext token
pub async fn create_session(
    db: &SqlitePool,
    user_id: &str,
    ttl_days: i64,
) -> Result<String, ApiError> {
    let token = generate_token();
    let expires_at = chrono::Utc::now()
        .checked_add_signed(chrono::Duration::days(ttl_days))
        .ok_or_else(|| ApiError::internal("Session expiry out of range"))?
        .to_rfc3339();
    let now = chrono::Utc::now().to_rfc3339();

    sqlx::query(
        "INSERT INTO sessions (id, user_id, token_hash, expires_at, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(hash_token(&token))
    .bind(&expires_at)
    .bind(&now)
    .execute(db)
    .await?;

    Ok(token)
}

/// Extract the token from request headers
fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(auth_header) = headers.get("Authorization").and_then(|h| h.to_str().ok()) {
        if let Some(token) = auth_header.strip_prefix("Bearer ") {
            return Some(token.trim().to_string());
        }
    }

    headers
        .get("X-API-Key")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string())
}

fn system_user() -> User {
    let now = chrono::Utc::now().to_rfc3339();
    User {
        id: SYSTEM_USER_ID.to_string(),
        email: "system@mindhaven.local".to_string(),
        password_hash: String::new(),
        name: "System Admin".to_string(),
        role: Role::Admin.as_str().to_string(),
        created_at: now.clone(),
        updated_at: now,
    }
}

/// Resolve the user behind a token: the configured admin token or a live session
pub async fn get_current_user(
    pool: &SqlitePool,
    config: &Config,
    token: &str,
) -> Result<User, ApiError> {
    // Constant-time comparison against the admin token
    let admin_token = config.auth.admin_token.as_bytes();
    let provided = token.as_bytes();
    if admin_token.len() == provided.len() && bool::from(admin_token.ct_eq(provided)) {
        return Ok(system_user());
    }

    let now = chrono::Utc::now().to_rfc3339();
    let session: Option<Session> =
        sqlx::query_as("SELECT * FROM sessions WHERE token_hash = ? AND expires_at > ?")
            .bind(hash_token(token))
            .bind(&now)
            .fetch_optional(pool)
            .await?;

    let session = session.ok_or_else(|| ApiError::unauthorized("Invalid or expired token"))?;

    User::get_by_id(pool, &session.user_id)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired token"))
}

/// Auth middleware: resolves the caller and stores it in request extensions
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_token(request.headers())
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;
    let user = get_current_user(&state.db, &state.config, &token).await?;
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Extractor for the authenticated user
#[async_trait]
impl FromRequestParts<Arc<AppState>> for User {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<User>() {
            return Ok(user.clone());
        }
        let token = extract_token(&parts.headers)
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;
        get_current_user(&state.db, &state.config, &token).await
    }
}

pub fn require_admin(user: &User) -> Result<(), ApiError> {
    if user.is_admin() {
        Ok(())
    } else {
        Err(ApiError::forbidden("Admin access required"))
    }
}

/// Reject the synthetic admin where a stored account is needed
pub fn require_account(user: &User) -> Result<(), ApiError> {
    if user.id == SYSTEM_USER_ID {
        Err(ApiError::forbidden("This action requires a user account"))
    } else {
        Ok(())
    }
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<LoginResponse>), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors.check("email", validate_email(&request.email));
    errors.check("password", validate_password(&request.password));
    errors.check("name", validate_name(&request.name));

    let role = match request.role.as_deref() {
        None => Role::User,
        Some(r) => match Role::from_str(r) {
            Some(Role::Admin) | None => {
                errors.add("role", "Role must be 'user' or 'consultant'");
                Role::User
            }
            Some(role) => role,
        },
    };
    errors.finish()?;

    let email = request.email.trim().to_lowercase();
    if User::get_by_email(&state.db, &email).await?.is_some() {
        return Err(ApiError::conflict("An account with this email already exists"));
    }

    let password_hash = hash_password(&request.password)
        .map_err(|e| ApiError::internal(format!("Failed to hash password: {}", e)))?;
    let user = User::create(&state.db, &email, &password_hash, request.name.trim(), role).await?;

    info!(user_id = %user.id, role = %role, "Registered new account");

    let token = create_session(&state.db, &user.id, state.config.auth.session_ttl_days).await?;
    Ok((
        StatusCode::CREATED,
        Json(LoginResponse {
            token,
            user: UserResponse::from(user),
        }),
    ))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let email = request.email.trim().to_lowercase();
    let user = User::get_by_email(&state.db, &email)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid credentials"))?;

    if !verify_password(&request.password, &user.password_hash) {
        return Err(ApiError::unauthorized("Invalid credentials"));
    }

    let token = create_session(&state.db, &user.id, state.config.auth.session_ttl_days).await?;

    Ok(Json(LoginResponse {
        token,
        user: UserResponse::from(user),
    }))
}

/// POST /api/auth/logout - revokes the session the request was made with
pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let token = extract_token(&headers)
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    sqlx::query("DELETE FROM sessions WHERE token_hash = ?")
        .bind(hash_token(&token))
        .execute(&state.db)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/auth/me
pub async fn me(user: User) -> Json<UserResponse> {
    Json(UserResponse::from(user))
}

/// Ensure the configured admin account exists. Does nothing without a
/// configured password.
pub async fn ensure_admin_user(
    db: &SqlitePool,
    email: &str,
    password: Option<&str>,
) -> anyhow::Result<()> {
    let Some(password) = password else {
        return Ok(());
    };

    let email = email.trim().to_lowercase();
    if User::get_by_email(db, &email).await?.is_some() {
        return Ok(());
    }

    let password_hash =
        hash_password(password).map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?;
    User::create(db, &email, &password_hash, "Administrator", Role::Admin).await?;

    info!("Created admin account {}", email);
    Ok(())
}
