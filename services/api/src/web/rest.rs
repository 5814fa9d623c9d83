//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the house and flat endpoints and the master
//! definition for the OpenAPI specification.

use crate::error::ApiError;
use crate::web::auth::{LoginRequest, RegisterRequest, RegisterResponse, TokenResponse, UserType};
use crate::web::state::AppState;
use axum::{
    extract::{Path, State},
    response::{IntoResponse, Json},
    Extension,
};
use chrono::{DateTime, Utc};
use listings_core::{Flat, FlatUpdate, Home, ModerationStatus, NewFlat, SessionClaims};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, ToSchema};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        health_handler,
        crate::web::auth::dummy_login_handler,
        crate::web::auth::register_handler,
        crate::web::auth::login_handler,
        create_house_handler,
        list_house_flats_handler,
        create_flat_handler,
        update_flat_handler,
    ),
    components(
        schemas(
            UserType, RegisterRequest, RegisterResponse, LoginRequest, TokenResponse,
            CreateHouseRequest, HouseResponse, HouseEnvelope,
            CreateFlatRequest, UpdateFlatRequest, FlatResponse, FlatEnvelope, FlatsEnvelope,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "Listings API", description = "Houses, flats and their moderation.")
    )
)]
pub struct ApiDoc;

/// Registers the `bearer` scheme referenced by the protected paths.
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct CreateHouseRequest {
    pub address: String,
    pub year: i32,
    #[serde(default)]
    pub developer: String,
}

impl CreateHouseRequest {
    fn validate(&self) -> Result<(), ApiError> {
        let address_len = self.address.chars().count();
        if address_len == 0 || address_len > 120 {
            return Err(ApiError::bad_request("address must be 1 to 120 characters"));
        }
        if self.year < 1 {
            return Err(ApiError::bad_request("year must be positive"));
        }
        if self.developer.chars().count() > 30 {
            return Err(ApiError::bad_request("developer must be at most 30 characters"));
        }
        Ok(())
    }
}

#[derive(Serialize, ToSchema)]
pub struct HouseResponse {
    pub id: i64,
    pub address: String,
    pub year: i32,
    pub developer: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Home> for HouseResponse {
    fn from(home: Home) -> Self {
        Self {
            id: home.id,
            address: home.address,
            year: home.year,
            developer: home.developer,
            created_at: home.created_at,
            updated_at: home.updated_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct HouseEnvelope {
    pub house: HouseResponse,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateFlatRequest {
    pub house_id: i64,
    /// The flat number within the house.
    pub id: i32,
    pub price: i64,
    pub rooms: i32,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateFlatRequest {
    pub house_id: i64,
    pub id: i32,
    pub price: i64,
    pub rooms: i32,
    /// One of `created`, `on_moderation`, `approved`, `declined`.
    pub status: String,
}

fn validate_flat_fields(house_id: i64, number: i32, price: i64, rooms: i32) -> Result<(), ApiError> {
    if house_id < 1 || number < 1 || price < 1 || rooms < 1 {
        return Err(ApiError::bad_request(
            "house_id, id, price and rooms must all be positive",
        ));
    }
    Ok(())
}

#[derive(Serialize, ToSchema)]
pub struct FlatResponse {
    pub id: i32,
    pub house_id: i64,
    pub price: i64,
    pub rooms: i32,
    pub status: String,
}

impl From<Flat> for FlatResponse {
    fn from(flat: Flat) -> Self {
        Self {
            id: flat.number,
            house_id: flat.home_id,
            price: flat.price,
            rooms: flat.rooms,
            status: flat.status.to_string(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct FlatEnvelope {
    pub flat: FlatResponse,
}

#[derive(Serialize, ToSchema)]
pub struct FlatsEnvelope {
    pub flats: Vec<FlatResponse>,
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Liveness probe.
#[utoipa::path(get, path = "/health", responses((status = 200, description = "Service is up")))]
pub async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Register a house. Moderators only; the caller becomes the house reviewer.
#[utoipa::path(
    post,
    path = "/house/create",
    request_body = CreateHouseRequest,
    responses(
        (status = 200, description = "House created", body = HouseEnvelope),
        (status = 400, description = "Invalid request"),
        (status = 401, description = "Missing or expired session"),
        (status = 403, description = "Caller is not a moderator"),
        (status = 500, description = "Internal server error")
    ),
    security(("bearer" = []))
)]
pub async fn create_house_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<SessionClaims>,
    Json(req): Json<CreateHouseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;
    let home = state
        .listings
        .create_home(&caller, req.address, req.year, req.developer)
        .await?;
    Ok(Json(HouseEnvelope { house: home.into() }))
}

/// List the flats of a house.
///
/// Moderators see every flat, and listing moves freshly created flats into
/// moderation. Clients see approved flats only.
#[utoipa::path(
    get,
    path = "/house/{id}",
    params(("id" = i64, Path, description = "House id")),
    responses(
        (status = 200, description = "Flats of the house", body = FlatsEnvelope),
        (status = 401, description = "Missing or expired session"),
        (status = 404, description = "House not found"),
        (status = 500, description = "Internal server error")
    ),
    security(("bearer" = []))
)]
pub async fn list_house_flats_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<SessionClaims>,
    Path(house_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let flats = state.listings.list_units(house_id, &caller).await?;
    Ok(Json(FlatsEnvelope {
        flats: flats.into_iter().map(FlatResponse::from).collect(),
    }))
}

/// Add a flat to a house. Any authenticated caller may do this.
#[utoipa::path(
    post,
    path = "/flat/create",
    request_body = CreateFlatRequest,
    responses(
        (status = 200, description = "Flat created", body = FlatEnvelope),
        (status = 400, description = "Invalid request"),
        (status = 401, description = "Missing or expired session"),
        (status = 404, description = "House not found"),
        (status = 409, description = "Flat number already used in this house"),
        (status = 500, description = "Internal server error")
    ),
    security(("bearer" = []))
)]
pub async fn create_flat_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<SessionClaims>,
    Json(req): Json<CreateFlatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_flat_fields(req.house_id, req.id, req.price, req.rooms)?;
    let flat = state
        .listings
        .create_flat(
            &caller,
            NewFlat {
                home_id: req.house_id,
                number: req.id,
                price: req.price,
                rooms: req.rooms,
            },
        )
        .await?;
    Ok(Json(FlatEnvelope { flat: flat.into() }))
}

/// Change a flat's price, rooms and moderation status. Only the house reviewer
/// may do this.
#[utoipa::path(
    post,
    path = "/flat/update",
    request_body = UpdateFlatRequest,
    responses(
        (status = 200, description = "Flat updated", body = FlatEnvelope),
        (status = 400, description = "Invalid request"),
        (status = 401, description = "Missing or expired session"),
        (status = 403, description = "Caller is not the house reviewer"),
        (status = 404, description = "House or flat not found"),
        (status = 500, description = "Internal server error")
    ),
    security(("bearer" = []))
)]
pub async fn update_flat_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<SessionClaims>,
    Json(req): Json<UpdateFlatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_flat_fields(req.house_id, req.id, req.price, req.rooms)?;
    let status = req.status.parse::<ModerationStatus>()?;
    let flat = state
        .listings
        .update_flat(
            &caller,
            FlatUpdate {
                home_id: req.house_id,
                number: req.id,
                price: req.price,
                rooms: req.rooms,
                status,
            },
        )
        .await?;
    Ok(Json(FlatEnvelope { flat: flat.into() }))
}
