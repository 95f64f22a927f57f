//! Publish endpoint handlers.
//!
//! Each handler only hands the deserialized payload to the publisher and
//! answers. A 200 means the send was issued, not that the broker stored or
//! routed the message; confirms and returns are handled by the observer task.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::broker::{Publisher, Topology};
use crate::error::PublishError;
use crate::models::{Color, Shape};

/// Body returned by `POST /publish/color`.
pub const COLOR_PUBLISHED: &str = "Message Color published successfully";

/// Message returned by `POST /publish/shape`.
pub const SHAPE_PUBLISHED: &str = "Message Shape published successfully";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub topology: Arc<Topology>,
    pub publisher: Publisher,
}

impl AppState {
    pub fn new(topology: Arc<Topology>, publisher: Publisher) -> Self {
        Self {
            topology,
            publisher,
        }
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Publish Endpoints
// =============================================================================

/// `{"message": "..."}` response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

fn publish_failed(e: PublishError) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(MessageResponse {
            message: e.to_string(),
        }),
    )
        .into_response()
}

/// Publish a color to the exchange under the color routing key.
pub async fn publish_color(State(state): State<AppState>, Json(color): Json<Color>) -> Response {
    info!(name = %color.name, code = %color.code, "color_publish_received");

    if let Err(e) = state
        .publisher
        .publish(
            &state.topology.exchange,
            &state.topology.color_routing_key,
            &color,
        )
        .await
    {
        error!(error = %e, "color_publish_failed");
        return publish_failed(e);
    }

    (StatusCode::OK, COLOR_PUBLISHED).into_response()
}

/// Publish a shape to the exchange under the shape routing key.
pub async fn publish_shape(State(state): State<AppState>, Json(shape): Json<Shape>) -> Response {
    info!(name = %shape.name, sides = shape.sides, "shape_publish_received");

    if let Err(e) = state
        .publisher
        .publish(
            &state.topology.exchange,
            &state.topology.shape_routing_key,
            &shape,
        )
        .await
    {
        error!(error = %e, "shape_publish_failed");
        return publish_failed(e);
    }

    (
        StatusCode::OK,
        Json(MessageResponse {
            message: SHAPE_PUBLISHED.to_string(),
        }),
    )
        .into_response()
}
