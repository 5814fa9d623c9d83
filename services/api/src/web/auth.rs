//! services/api/src/web/auth.rs
//!
//! Authentication endpoints: demo login, registration and login. Each
//! successful login issues a session token from the session store.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use listings_core::{deadline, NewUser, ServiceError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::{IntoParams, ToSchema};

use crate::error::ApiError;
use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

/// The two roles a caller can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum UserType {
    Client,
    Moderator,
}

impl UserType {
    pub fn is_admin(self) -> bool {
        matches!(self, UserType::Moderator)
    }
}

#[derive(Deserialize, IntoParams)]
pub struct DummyLoginQuery {
    pub user_type: UserType,
}

#[derive(Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub user_type: UserType,
}

impl RegisterRequest {
    fn validate(&self) -> Result<(), ApiError> {
        validate_email(&self.email)?;
        if !(6..=50).contains(&self.password.chars().count()) {
            return Err(ApiError::bad_request("password must be 6 to 50 characters"));
        }
        Ok(())
    }
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Serialize, ToSchema)]
pub struct RegisterResponse {
    pub user_id: String,
}

fn validate_email(email: &str) -> Result<(), ApiError> {
    let well_formed = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && !domain.is_empty());
    if !well_formed || email.len() > 100 {
        return Err(ApiError::bad_request("a valid email of at most 100 characters is required"));
    }
    Ok(())
}

//=========================================================================================
// Handlers
//=========================================================================================

/// GET /dummyLogin - Issue an anonymous session for the given role
#[utoipa::path(
    get,
    path = "/dummyLogin",
    params(DummyLoginQuery),
    responses(
        (status = 200, description = "Session issued", body = TokenResponse),
        (status = 400, description = "Unknown user type"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn dummy_login_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DummyLoginQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .sessions
        .create_session("", query.user_type.is_admin())
        .await?;
    Ok(Json(TokenResponse {
        token: session.token_id,
    }))
}

/// POST /register - Create a new user account
#[utoipa::path(
    post,
    path = "/register",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "User created successfully", body = RegisterResponse),
        (status = 400, description = "Invalid request"),
        (status = 409, description = "Email already registered"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;

    // 1. Hash the password
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| {
            error!("Failed to hash password: {:?}", e);
            ApiError::Internal("failed to hash password".to_string())
        })?
        .to_string();

    // 2. Create user in database; the insert completes even if the client goes away
    let db = state.db.clone();
    let new_user = NewUser {
        email: req.email,
        password_hash,
        is_admin: req.user_type.is_admin(),
    };
    let user = deadline::detached(state.config.db_timeout, "create_user", async move {
        db.create_user(new_user).await
    })
    .await?;
    info!(user_id = %user.id, admin = user.is_admin, "user registered");

    Ok((StatusCode::OK, Json(RegisterResponse { user_id: user.id })))
}

/// POST /login - Login with existing account
#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = TokenResponse),
        (status = 401, description = "Wrong password"),
        (status = 404, description = "User not found"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_email(&req.email)?;

    // 1. Get user by email
    let creds = deadline::within(
        state.config.db_timeout,
        "get_user_by_email",
        state.db.get_user_by_email(&req.email),
    )
    .await?;

    // 2. Verify password
    let parsed_hash = PasswordHash::new(&creds.password_hash).map_err(|e| {
        error!("Failed to parse password hash: {:?}", e);
        ApiError::Internal("stored password hash is malformed".to_string())
    })?;
    let valid = Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .is_ok();
    if !valid {
        return Err(ServiceError::Unauthorized.into());
    }

    // 3. Issue the session
    let session = state
        .sessions
        .create_session(&creds.user.id, creds.user.is_admin)
        .await?;
    Ok(Json(TokenResponse {
        token: session.token_id,
    }))
}
