//! REST API endpoints.
//!
//! All endpoints are read-only views over the store.
//!
//! # Error Handling
//!
//! Endpoints return structured JSON errors via [`AppError`]. Unknown devices
//! map to 404; corrupt histories and storage failures map to 500.
//!
//! # Example
//!
//! ```ignore
//! use sparkline_service::api;
//!
//! let app = api::router().with_state(state);
//! ```

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use sparkline_types::History;

use crate::state::AppState;

/// Create the API router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/devices", get(list_devices))
        .route("/api/devices/{id}/history", get(get_history))
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Health check endpoint.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: OffsetDateTime::now_utc(),
    })
}

/// List enrolled device ids.
async fn list_devices(State(state): State<Arc<AppState>>) -> Result<Json<Vec<String>>, AppError> {
    Ok(Json(state.store.devices()?))
}

/// Order of history entries in the response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryOrder {
    /// Store order (insertion order).
    #[default]
    Stored,
    /// Numeric timestamp order.
    Chronological,
}

/// Query parameters for the history endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub order: HistoryOrder,
}

/// Full history of one device, keyed by timestamp text.
async fn get_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<History>, AppError> {
    let history = state.store.collect(&id)?;

    Ok(Json(match query.order {
        HistoryOrder::Stored => history,
        HistoryOrder::Chronological => history.chronological(),
    }))
}

/// API error type.
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    Store(sparkline_store::Error),
}

impl From<sparkline_store::Error> for AppError {
    fn from(e: sparkline_store::Error) -> Self {
        match e {
            sparkline_store::Error::DeviceNotFound(_) => AppError::NotFound(e.to_string()),
            e => AppError::Store(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Store(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use sparkline_types::Observation;
    use tower::ServiceExt;

    use crate::config::Config;

    const BAT0: &str = "/org/freedesktop/UPower/devices/battery_BAT0";
    const BAT0_ENCODED: &str = "%2Forg%2Ffreedesktop%2FUPower%2Fdevices%2Fbattery_BAT0";

    fn create_test_state() -> Arc<AppState> {
        let store = sparkline_store::Store::open_in_memory().unwrap();
        AppState::new(store, Config::default())
    }

    async fn get(state: Arc<AppState>, uri: &str) -> axum::response::Response {
        router()
            .with_state(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn response_body(response: axum::response::Response) -> String {
        let body = response.into_body();
        let bytes = body.collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let response = get(create_test_state(), "/api/health").await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = response_body(response).await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();

        assert_eq!(json["status"], "ok");
        assert!(json["version"].is_string());
        assert!(json["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_list_devices() {
        let state = create_test_state();
        let response = get(Arc::clone(&state), "/api/devices").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response_body(response).await, "[]");

        state.store.enroll(BAT0).unwrap();
        state.store.enroll("BAT1").unwrap();

        let response = get(state, "/api/devices").await;
        let json: serde_json::Value =
            serde_json::from_str(&response_body(response).await).unwrap();
        assert_eq!(json, serde_json::json!([BAT0, "BAT1"]));
    }

    #[tokio::test]
    async fn test_history_in_store_order() {
        let state = create_test_state();
        state.store.enroll(BAT0).unwrap();
        for (ts, pct) in [(1001, 87.0), (1000, 87.5), (999, 88.0)] {
            state
                .store
                .record_observation(BAT0, ts, &Observation::new(pct, -3.2))
                .unwrap();
        }

        let response = get(state, &format!("/api/devices/{}/history", BAT0_ENCODED)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = response_body(response).await;
        assert!(body.find("\"1001\"").unwrap() < body.find("\"1000\"").unwrap());
        assert!(body.find("\"1000\"").unwrap() < body.find("\"999\"").unwrap());

        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["1000"]["percentage"], 87.5);
        assert_eq!(json["1000"]["energy_rate"], -3.2);
    }

    #[tokio::test]
    async fn test_history_chronological() {
        let state = create_test_state();
        state.store.enroll("BAT0").unwrap();
        for ts in [1001, 1000, 999] {
            state
                .store
                .record_observation("BAT0", ts, &Observation::new(50.0, 0.0))
                .unwrap();
        }

        let response = get(state, "/api/devices/BAT0/history?order=chronological").await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = response_body(response).await;
        assert!(body.find("\"999\"").unwrap() < body.find("\"1000\"").unwrap());
        assert!(body.find("\"1000\"").unwrap() < body.find("\"1001\"").unwrap());
    }

    #[tokio::test]
    async fn test_history_bad_order() {
        let state = create_test_state();
        state.store.enroll("BAT0").unwrap();

        let response = get(state, "/api/devices/BAT0/history?order=sideways").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_history_unknown_device() {
        let response = get(create_test_state(), "/api/devices/nonexistent/history").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let json: serde_json::Value =
            serde_json::from_str(&response_body(response).await).unwrap();
        assert!(json["error"].as_str().unwrap().contains("nonexistent"));
    }

    #[tokio::test]
    async fn test_history_corrupt_record() {
        let state = create_test_state();
        state
            .store
            .write(|txn| {
                let partition = txn.ensure_partition("BAT0")?;
                let child = txn.create_child(&partition, "1000")?;
                txn.put(&child, "percent", "garbage")?;
                txn.put(&child, "energyRate", "0")?;
                Ok(())
            })
            .unwrap();

        let response = get(state, "/api/devices/BAT0/history").await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let json: serde_json::Value =
            serde_json::from_str(&response_body(response).await).unwrap();
        assert!(json["error"].as_str().unwrap().contains("1000"));
    }
}
