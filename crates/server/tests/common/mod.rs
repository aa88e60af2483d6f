//! Common test utilities for driving the server in-process.
//!
//! The fixture wires a complete engine (file-backed ledger, mock synthesis
//! and post-processing collaborators) behind the real axum router, so tests
//! exercise the same code paths as production requests.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use hibiki_core::{
    config::{
        AudioConfig, AuthConfig, Config, EngineConfig, LedgerConfig, OutputConfig, ServerConfig,
        SourceConfig, SynthesisConfig,
    },
    create_authenticator, create_ledger_system,
    testing::{fixture_source, MockProcessor, MockSynthesizer},
    AudioProcessor, AuthMethod, JsonLedgerStore, LedgerHandle, Orchestrator, ProgressBroadcaster,
    Synthesizer,
};

use hibiki_server::api::create_router;
use hibiki_server::state::AppState;

/// Test fixture wrapping the full server over mock collaborators.
pub struct TestFixture {
    /// The axum router for in-process requests
    pub router: Router,
    /// Mock synthesizer - inject failures and latency
    pub synthesizer: Arc<MockSynthesizer>,
    /// Mock processor - writes artifacts to the temp output dir
    pub processor: Arc<MockProcessor>,
    /// Direct ledger access for assertions
    pub ledger: LedgerHandle,
    /// Artifact output directory
    pub output_dir: PathBuf,
    /// Temp directory holding the ledger document and artifacts
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    /// Create a fixture with six pending jobs.
    pub async fn new() -> Self {
        Self::with_jobs(6).await
    }

    /// Create a fixture seeded with the given number of jobs.
    pub async fn with_jobs(count: usize) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let ledger_path = temp_dir.path().join("run.json");
        let output_dir = temp_dir.path().join("wavs");

        let config = Config {
            auth: AuthConfig {
                method: AuthMethod::None,
                api_key: None,
            },
            synthesis: SynthesisConfig {
                url: "http://localhost:9880".to_string(),
                timeout_secs: 5,
            },
            engine: EngineConfig {
                post_job_delay_ms: 0,
                ..EngineConfig::default()
            },
            ledger: LedgerConfig {
                path: ledger_path.clone(),
            },
            source: SourceConfig::default(),
            output: OutputConfig {
                dir: output_dir.clone(),
            },
            audio: AudioConfig::default(),
            server: ServerConfig::default(),
        };

        let authenticator = create_authenticator(&config.auth).expect("Failed to create authenticator");

        let broadcaster = ProgressBroadcaster::default();
        let store = Arc::new(JsonLedgerStore::new(&ledger_path));
        let (ledger, writer) = create_ledger_system(store, broadcaster.clone(), 64);
        tokio::spawn(writer.run());

        if count > 0 {
            ledger
                .initialize_from(&fixture_source(count))
                .await
                .expect("Failed to initialize ledger");
        }

        let synthesizer = Arc::new(MockSynthesizer::new());
        let processor = Arc::new(MockProcessor::new());

        let orchestrator = Arc::new(Orchestrator::new(
            config.engine.clone(),
            output_dir.clone(),
            ledger.clone(),
            Arc::clone(&synthesizer) as Arc<dyn Synthesizer>,
            Arc::clone(&processor) as Arc<dyn AudioProcessor>,
            broadcaster,
        ));

        let state = Arc::new(AppState::new(config, authenticator, orchestrator));
        let router = create_router(state);

        Self {
            router,
            synthesizer,
            processor,
            ledger,
            output_dir,
            temp_dir,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a POST request with no body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None).await
    }

    /// Send a GET request and return the raw body text.
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();

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
        (status, String::from_utf8_lossy(&body_bytes).to_string())
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

    /// Poll the status endpoint until the run reaches a terminal status.
    pub async fn wait_for_terminal(&self) -> Value {
        let start = std::time::Instant::now();
        loop {
            let response = self.get("/api/run/status").await;
            assert_eq!(response.status, StatusCode::OK);
            let running = response.body["running"].as_bool().unwrap_or(false);
            let status = response.body["status"].as_str().unwrap_or("");
            if !running && matches!(status, "completed" | "stopped") {
                return response.body;
            }
            if start.elapsed() > Duration::from_secs(5) {
                panic!("run did not reach a terminal status; last status: {status}");
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Poll the status endpoint until the given predicate holds.
    pub async fn wait_for_status<F>(&self, mut predicate: F) -> Value
    where
        F: FnMut(&Value) -> bool,
    {
        let start = std::time::Instant::now();
        loop {
            let response = self.get("/api/run/status").await;
            if predicate(&response.body) {
                return response.body;
            }
            if start.elapsed() > Duration::from_secs(5) {
                panic!(
                    "status predicate never held; last: {}",
                    serde_json::to_string_pretty(&response.body).unwrap_or_default()
                );
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Path of the artifact for a given job id.
    pub fn artifact(&self, id: u64) -> PathBuf {
        self.output_dir.join(format!("{id:04}.wav"))
    }
}
