//! services/api/src/lib.rs
//!
//! The HTTP listings service: adapters for PostgreSQL and Redis, the axum
//! web layer, configuration and the service-wide error type.

pub mod adapters;
pub mod config;
pub mod error;
pub mod web;
