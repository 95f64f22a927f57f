//! Web server module for the publish endpoints.
//!
//! This module provides a thin HTTP layer that:
//! - Accepts `Color` and `Shape` JSON payloads
//! - Hands them to the publisher with the matching routing key
//! - Returns as soon as the send has been issued
//!
//! Broker confirms and returns are observed out of band.

pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub use handlers::{
    health, publish_color, publish_shape, AppState, HealthResponse, MessageResponse,
    COLOR_PUBLISHED, SHAPE_PUBLISHED,
};

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/publish/color", post(publish_color))
        .route("/publish/shape", post(publish_shape))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
