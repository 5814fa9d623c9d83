pub mod auth;
pub mod middleware;
pub mod rest;
pub mod state;

pub use middleware::require_session;
pub use state::AppState;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use auth::{dummy_login_handler, login_handler, register_handler};
use rest::{
    create_flat_handler, create_house_handler, health_handler, list_house_flats_handler,
    update_flat_handler,
};

/// Builds the API router: public account routes plus session-protected
/// house and flat routes.
pub fn router(app_state: Arc<AppState>) -> Router {
    let cors = match app_state.config.cors_origin.clone() {
        Some(origin) => CorsLayer::new()
            .allow_origin(AllowOrigin::exact(origin))
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any),
        None => CorsLayer::permissive(),
    };

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(health_handler))
        .route("/dummyLogin", get(dummy_login_handler))
        .route("/register", post(register_handler))
        .route("/login", post(login_handler));

    // Protected routes (session required)
    let protected_routes = Router::new()
        .route("/house/create", post(create_house_handler))
        .route("/house/{id}", get(list_house_flats_handler))
        .route("/flat/create", post(create_flat_handler))
        .route("/flat/update", post(update_flat_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_session,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}
