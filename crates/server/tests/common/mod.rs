//! Common test utilities for API testing with mocks.
//!
//! This module provides a test fixture that creates an in-process server
//! backed by an in-memory registry and mock media tools, so every endpoint
//! can be exercised without ffmpeg or poppler installed.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use mediahub_core::{
    asset::{AssetRegistry, NewAsset, SqliteAssetRegistry},
    config::{Config, DatabaseConfig, StorageConfig},
    status::{create_status_outbox, RegistryStatusSink},
    testing::{write_png, write_source, MockDocumentInspector, MockEncoder},
    Asset, RetryConfig,
};
use mediahub_server::state::{AppState, Services};

/// Test fixture for API testing with mock dependencies.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_register() {
///     let fixture = TestFixture::new();
///     fixture.write_upload("a1", "image/png");
///
///     let response = fixture.post("/api/v1/assets", json!({
///         "path": "uploads/a1",
///         "mimeType": "image/png",
///         "size": 1024
///     })).await;
///
///     assert_eq!(response.status, 201);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    pub state: Arc<AppState>,
    pub registry: Arc<SqliteAssetRegistry>,
    /// Mock encoder - fail tiers, slow passes down, inspect captured frames
    pub encoder: MockEncoder,
    pub inspector: MockDocumentInspector,
    pub storage: StorageConfig,
    /// Temporary directory for storage roots and the database
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let storage = StorageConfig::under(temp_dir.path());

        let mut config = Config::default();
        config.server.port = 0; // Not used for in-process testing
        config.database = DatabaseConfig {
            path: temp_dir.path().join("test.db"),
        };
        config.storage = storage.clone();
        config.dispatcher.retry = RetryConfig::immediate(3);

        let registry = Arc::new(
            SqliteAssetRegistry::new(&config.database.path).expect("Failed to create registry"),
        );
        let encoder = MockEncoder::new();
        let inspector = MockDocumentInspector::new(4, Some("Terms and conditions"));

        let (outbox, writer) = create_status_outbox(
            Arc::new(RegistryStatusSink::new(registry.clone())),
            100,
            RetryConfig::immediate(3),
        );
        tokio::spawn(writer.run());

        let state = Arc::new(
            AppState::new(
                config,
                Services {
                    registry: registry.clone(),
                    encoder: Arc::new(encoder.clone()),
                    prober: Arc::new(encoder.clone()),
                    inspector: Arc::new(inspector.clone()),
                    outbox,
                },
            )
            .expect("Failed to build app state"),
        );

        let router = mediahub_server::api::create_router(state.clone());

        Self {
            router,
            state,
            registry,
            encoder,
            inspector,
            storage,
            temp_dir,
        }
    }

    /// Writes a file under the uploads root and returns its stored path.
    pub fn write_upload(&self, name: &str, mime_type: &str) -> String {
        let stored = format!("uploads/{}", name);
        let file = self.storage.resolve_upload(&stored).expect("stored path under uploads");
        if mime_type.starts_with("image/") {
            write_png(&file, 640, 360);
        } else {
            write_source(&file);
        }
        stored
    }

    /// Creates a record directly in the registry, without dispatching stages.
    pub fn create_asset(&self, name: &str, mime_type: &str) -> Asset {
        let path = self.write_upload(name, mime_type);
        self.registry
            .create(NewAsset::new(path, mime_type, 1024))
            .expect("Failed to create asset")
    }

    /// Polls `GET /api/v1/assets/{id}` until `check` accepts the body.
    pub async fn wait_for_asset(&self, id: i64, check: impl Fn(&Value) -> bool) -> Value {
        let path = format!("/api/v1/assets/{}", id);
        for _ in 0..400 {
            let response = self.get(&path).await;
            if response.status == StatusCode::OK && check(&response.body) {
                return response.body;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("asset {} never reached the expected state", id);
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    /// Send a request and return the raw text body.
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder().uri(path).body(Body::empty()).unwrap();
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}
