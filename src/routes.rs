//! Static routes answered by the gateway itself.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::server::AppState;

const OPTS_ALLOW_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS";
const OPTS_ALLOW_HEADERS: &str = "Origin, Content-Length, Content-Type";

/// Body of every gateway-generated response: `{"message": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonMessage {
    pub message: String,
}

impl JsonMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// `GET /`
pub async fn welcome(State(state): State<Arc<AppState>>) -> Json<JsonMessage> {
    Json(JsonMessage::new(format!("Welcome to the {}", state.config.app_name)))
}

/// `OPTIONS /opts`
pub async fn opts() -> impl IntoResponse {
    (
        StatusCode::NO_CONTENT,
        [
            (header::ACCESS_CONTROL_ALLOW_METHODS, OPTS_ALLOW_METHODS),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, OPTS_ALLOW_HEADERS),
        ],
    )
}

/// Fallback for unknown routes and unsupported methods.
pub async fn not_found(State(state): State<Arc<AppState>>) -> Response {
    route_not_found(&state.config.app_name)
}

#[must_use]
pub fn route_not_found(app_name: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(JsonMessage::new(format!(
            "Method or route not found in: {app_name}"
        ))),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn not_found_names_the_app() {
        let response = route_not_found("Gateway");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let msg: JsonMessage = serde_json::from_slice(&body).unwrap();
        assert_eq!(msg.message, "Method or route not found in: Gateway");
    }

    #[tokio::test]
    async fn opts_has_no_body() {
        let response = opts().await.into_response();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_METHODS],
            OPTS_ALLOW_METHODS
        );
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_HEADERS],
            OPTS_ALLOW_HEADERS
        );
    }
}
