use std::net::SocketAddr;
use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::extract::Path;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::monitor::Dashboard;

/// Response for the /v1/ping endpoint
#[derive(Serialize)]
struct PingResponse {
    status: String,
}

/// Response for the /v1/info endpoint
#[derive(Serialize)]
struct InfoResponse {
    version: String,
    hostname: String,
    devices: usize,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    version: &'static str,
    dashboard: Arc<ArcSwap<Dashboard>>,
}

/// Handler for GET /v1/ping
#[tracing::instrument]
async fn ping() -> impl IntoResponse {
    tracing::debug!("Handling /v1/ping request");
    (
        StatusCode::OK,
        Json(PingResponse {
            status: "ok".to_string(),
        }),
    )
}

/// Handler for GET /v1/info
#[tracing::instrument(skip(state))]
async fn info(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    tracing::debug!("Handling /v1/info request");

    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());

    (
        StatusCode::OK,
        Json(InfoResponse {
            version: state.version.to_string(),
            hostname,
            devices: state.dashboard.load().devices.len(),
        }),
    )
}

/// Handler for GET /v1/devices
#[tracing::instrument(skip(state))]
async fn devices(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let dashboard = state.dashboard.load_full();
    (StatusCode::OK, Json(dashboard.as_ref().clone()))
}

/// Handler for GET /v1/devices/:device_id
#[tracing::instrument(skip(state))]
async fn device(State(state): State<Arc<AppState>>, Path(device_id): Path<String>) -> Response {
    let dashboard = state.dashboard.load();
    match dashboard.device(&device_id) {
        Some(status) => (StatusCode::OK, Json(status.clone())).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Unknown device: {}", device_id),
            }),
        )
            .into_response(),
    }
}

/// Create the API router with all endpoints
fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/ping", get(ping))
        .route("/v1/info", get(info))
        .route("/v1/devices", get(devices))
        .route("/v1/devices/:device_id", get(device))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP API server
///
/// Serves the monitor's dashboard until `shutdown` is cancelled.
pub async fn serve(
    listen: String,
    port: u16,
    dashboard: Arc<ArcSwap<Dashboard>>,
    shutdown: CancellationToken,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let version = env!("CARGO_PKG_VERSION");

    let state = Arc::new(AppState { version, dashboard });
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", listen, port).parse()?;
    tracing::info!("Starting HTTP API server on {}", addr);

    let listener = TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            tracing::info!("HTTP API server shutting down gracefully");
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use chrono::Utc;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::model::Device;
    use crate::model::Reading;
    use crate::monitor::LatestReadingMap;

    fn router() -> Router {
        let now = Utc::now();
        let devices = vec![
            Device::new("spicebox-01")
                .with_name("Cumin")
                .with_min_quantity(10.0)
                .with_max_capacity(200.0),
            Device::new("spicebox-02"),
        ];
        let mut latest = LatestReadingMap::new();
        latest.insert(
            "spicebox-01".to_string(),
            Reading::new("spicebox-01", 8.0, now),
        );

        let dashboard = Arc::new(ArcSwap::from_pointee(Dashboard::build(
            &devices, &latest, now,
        )));
        create_router(Arc::new(AppState {
            version: "test",
            dashboard,
        }))
    }

    async fn get_json(uri: &str) -> (StatusCode, Value) {
        let response = router()
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_ping() {
        let (status, body) = get_json("/v1/ping").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_info_counts_devices() {
        let (status, body) = get_json("/v1/info").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["version"], "test");
        assert_eq!(body["devices"], 2);
    }

    #[tokio::test]
    async fn test_devices() {
        let (status, body) = get_json("/v1/devices").await;
        assert_eq!(status, StatusCode::OK);

        let devices = body["devices"].as_array().unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0]["below_minimum"], true);
        assert_eq!(devices[0]["gauge"]["percent"], 4);
        assert!(devices[1]["reading"].is_null());
    }

    #[tokio::test]
    async fn test_device_by_id() {
        let (status, body) = get_json("/v1/devices/spicebox-01").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["device"]["container_name"], "Cumin");
        assert_eq!(body["reading"]["weight_g"], 8.0);

        let (status, body) = get_json("/v1/devices/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Unknown device: nope");
    }
}
