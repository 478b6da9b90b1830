// src/test_utils/mock_registry_server.rs
use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

/// What the server answers for one path
#[derive(Debug, Clone)]
pub enum MockResponse {
    Json(Value),
    Bytes(Vec<u8>),
    Status(u16),
    /// 303 with the given Location
    SeeOther(String),
}

impl IntoResponse for MockResponse {
    fn into_response(self) -> Response {
        match self {
            MockResponse::Json(value) => (StatusCode::OK, Json(value)).into_response(),
            MockResponse::Bytes(bytes) => (StatusCode::OK, bytes).into_response(),
            MockResponse::Status(status) => StatusCode::from_u16(status)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
                .into_response(),
            MockResponse::SeeOther(location) => {
                (StatusCode::SEE_OTHER, [(header::LOCATION, location)]).into_response()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub path: String,
    pub authorization: Option<String>,
}

#[derive(Clone, Default)]
struct MockServerState {
    routes: Arc<Mutex<HashMap<String, VecDeque<MockResponse>>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

async fn registry_handler(State(state): State<MockServerState>, request: Request) -> Response {
    let path = request.uri().path().to_string();
    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    log::debug!("Mock registry received GET {}", path);
    state.requests.lock().unwrap().push(RecordedRequest {
        path: path.clone(),
        authorization,
    });

    // The last queued response for a path keeps being served
    let response = {
        let mut routes = state.routes.lock().unwrap();
        match routes.get_mut(&path) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        }
    };

    match response {
        Some(response) => response.into_response(),
        None => {
            log::warn!("Mock registry has no response for {}", path);
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

pub struct MockRegistryServer {
    addr: SocketAddr,
    shutdown_tx: tokio::sync::oneshot::Sender<()>,
    state: MockServerState,
}

impl MockRegistryServer {
    pub async fn start() -> Self {
        let state = MockServerState::default();
        let app = Router::new()
            .fallback(registry_handler)
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap_or_else(|e| {
            panic!("Failed to bind mock registry to 127.0.0.1:0. Error: {}", e);
        });
        let addr = listener.local_addr().unwrap();
        log::info!("Mock registry listening on {}", addr);

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap_or_else(|e| {
                    log::error!("Mock registry error: {}", e);
                });
        });

        MockRegistryServer {
            addr,
            shutdown_tx,
            state,
        }
    }

    pub fn address(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address(), path)
    }

    /// Queue `response` for `path`
    pub fn respond(&self, path: &str, response: MockResponse) {
        self.state
            .routes
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(response);
    }

    /// Service index at `/v3/index.json` advertising `/reg/` and `/flat/`
    pub fn serve_service_index(&self) -> String {
        self.serve_service_index_with(vec![
            json!({"@id": self.url("/reg/"), "@type": "RegistrationsBaseUrl/3.6.0"}),
            json!({"@id": self.url("/flat/"), "@type": "PackageBaseAddress/3.0.0"}),
        ])
    }

    pub fn serve_service_index_with(&self, resources: Vec<Value>) -> String {
        self.respond(
            "/v3/index.json",
            MockResponse::Json(json!({ "version": "3.0.0", "resources": resources })),
        );
        self.url("/v3/index.json")
    }

    /// Registration document for `name` listing `(version, listed)` in one page
    pub fn serve_registration(&self, name: &str, entries: &[(&str, bool)]) {
        let items: Vec<Value> = entries
            .iter()
            .map(|(version, listed)| {
                json!({ "catalogEntry": { "listed": listed, "version": version } })
            })
            .collect();
        self.respond(
            &format!("/reg/{}/index.json", name.to_lowercase()),
            MockResponse::Json(json!({ "items": [{ "items": items }] })),
        );
    }

    /// Path a package archive is fetched from under `/flat/`
    pub fn package_path(name: &str, version: &str) -> String {
        let name = name.to_lowercase();
        let version = version.to_lowercase();
        format!("/flat/{}/{}/{}.{}.nupkg", name, version, name, version)
    }

    pub fn get_requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn requests_for(&self, path: &str) -> Vec<RecordedRequest> {
        self.get_requests()
            .into_iter()
            .filter(|request| request.path == path)
            .collect()
    }

    pub fn request_count(&self) -> usize {
        self.state.requests.lock().unwrap().len()
    }

    pub async fn shutdown(self) {
        if self.shutdown_tx.send(()).is_err() {
            log::warn!("Mock registry shutdown signal already sent or receiver dropped.");
        }
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
    }
}
