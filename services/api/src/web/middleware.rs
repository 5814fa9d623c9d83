//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use listings_core::ServiceError;
use std::sync::Arc;
use tracing::debug;

use crate::error::ApiError;
use crate::web::state::AppState;

/// Middleware that resolves the bearer session token into `SessionClaims`.
///
/// If valid, inserts the claims into request extensions for handlers to use.
/// A missing, unknown or expired token is 401; a session store failure is 500.
pub async fn require_session(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    // 1. Extract the token from the Authorization header
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(ServiceError::Unauthorized)?;

    // 2. Resolve it; a miss and a backend failure are different outcomes
    let claims = match state.sessions.get_session(token).await? {
        Some(claims) => claims,
        None => {
            debug!("Rejected request with unknown or expired session");
            return Err(ServiceError::Unauthorized.into());
        }
    };

    // 3. Insert the claims into request extensions
    req.extensions_mut().insert(claims);

    // 4. Continue to the handler
    Ok(next.run(req).await)
}
