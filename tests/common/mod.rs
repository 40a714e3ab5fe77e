//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use axum::http::{header::CONTENT_TYPE, HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;

use http_service::config::{ServiceConfig, TransportConfig, WorkerConfig};
use http_service::transport::Multiplexer;
use http_service::HttpService;

/// Size of the `/big` response body.
#[allow(dead_code)]
pub const BIG_BODY_LEN: usize = 256 * 1024;

/// Start a mock backend on its own runtime thread and return its address.
///
/// Routes:
/// - `GET /hello` → fixed text
/// - `POST /echo` → request body
/// - `POST /content-type` → the request's content type
/// - `GET /missing` → 404
/// - `GET /slow` → fixed text after 200ms
/// - `GET /big` → `BIG_BODY_LEN` bytes of `x`
#[allow(dead_code)]
pub fn start_mock_backend() -> SocketAddr {
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async move {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            tx.send(listener.local_addr().unwrap()).unwrap();
            axum::serve(listener, router()).await.unwrap();
        });
    });

    rx.recv_timeout(Duration::from_secs(5))
        .expect("mock backend did not start")
}

fn router() -> Router {
    Router::new()
        .route("/hello", get(|| async { "Hello from backend" }))
        .route("/echo", post(|body: String| async move { body }))
        .route(
            "/content-type",
            post(|headers: HeaderMap| async move {
                headers
                    .get(CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("")
                    .to_string()
            }),
        )
        .route(
            "/missing",
            get(|| async { (StatusCode::NOT_FOUND, "no such thing") }),
        )
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                "finally"
            }),
        )
        .route("/big", get(|| async { "x".repeat(BIG_BODY_LEN) }))
}

/// Worker settings with a short idle pause so tests stay fast.
#[allow(dead_code)]
pub fn fast_worker() -> WorkerConfig {
    WorkerConfig {
        idle_sleep_ms: 5,
        ..WorkerConfig::default()
    }
}

/// Service on the reqwest transport, ignoring proxy environment variables.
#[allow(dead_code)]
pub fn http_service() -> HttpService {
    let config = ServiceConfig {
        worker: fast_worker(),
        transport: TransportConfig {
            system_proxy: false,
            ..TransportConfig::default()
        },
        ..ServiceConfig::default()
    };
    HttpService::new(config).unwrap()
}

/// Service on an arbitrary transport.
#[allow(dead_code)]
pub fn service_with<M: Multiplexer + 'static>(mux: M) -> HttpService {
    HttpService::with_transport(&fast_worker(), mux).unwrap()
}
