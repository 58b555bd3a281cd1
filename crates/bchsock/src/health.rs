use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use bchsock_relay::metrics::encode_metrics;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub feed_connected: bool,
}

/// Shared state for health endpoints
#[derive(Clone)]
pub struct HealthState {
    pub feed_connected: Arc<AtomicBool>,
}

impl HealthState {
    pub fn new(feed_connected: Arc<AtomicBool>) -> Self {
        Self { feed_connected }
    }
}

/// Always 200 while the process is serving
async fn health(State(state): State<HealthState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        feed_connected: state.feed_connected.load(Ordering::SeqCst),
    })
}

/// 200 only once the upstream feed is subscribed
async fn ready(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let connected = state.feed_connected.load(Ordering::SeqCst);
    let status_code = if connected {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(HealthResponse {
            status: if connected { "ready" } else { "not_ready" },
            feed_connected: connected,
        }),
    )
}

async fn metrics() -> (StatusCode, String) {
    match encode_metrics() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

pub fn create_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Serve health and metrics until `shutdown` flips to true.
pub async fn run_server(
    addr: SocketAddr,
    state: HealthState,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "health/metrics server listening");
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn create_test_state(connected: bool) -> HealthState {
        HealthState::new(Arc::new(AtomicBool::new(connected)))
    }

    async fn get_status(app: Router, uri: &str) -> StatusCode {
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_health_returns_ok() {
        let app = create_router(create_test_state(false));
        assert_eq!(get_status(app, "/health").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_ready_when_connected() {
        let app = create_router(create_test_state(true));
        assert_eq!(get_status(app, "/ready").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_ready_when_disconnected() {
        let app = create_router(create_test_state(false));
        assert_eq!(
            get_status(app, "/ready").await,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        bchsock_relay::metrics::inc_control_message("health-test");
        let app = create_router(create_test_state(true));

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("bchsock_control_messages_total"));
    }

    #[tokio::test]
    async fn test_ready_body() {
        let app = create_router(create_test_state(false));
        let response = app
            .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["status"], "not_ready");
        assert_eq!(value["feed_connected"], false);
    }
}
