use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hibiki_core::{
    create_authenticator, create_ledger_system, load_config, validate_config, AudioProcessor,
    HttpSynthesizer, JsonLedgerStore, Orchestrator, ProgressBroadcaster, Synthesizer, WavProcessor,
};

use hibiki_server::api::create_router;
use hibiki_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Buffer size for the ledger command channel
const LEDGER_BUFFER_SIZE: usize = 256;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting hibiki {}", VERSION);

    // Determine config path
    let config_path = std::env::var("HIBIKI_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Auth method: {:?}", config.auth.method);
    info!("Ledger path: {:?}", config.ledger.path);
    info!("Artifact directory: {:?}", config.output.dir);

    // Create authenticator
    let authenticator = create_authenticator(&config.auth).context("Failed to create authenticator")?;
    info!("Using authenticator: {}", authenticator.method_name());

    // Create the event broadcaster shared by the ledger writer and observers
    let broadcaster = ProgressBroadcaster::default();

    // Create the ledger system over the durable JSON document
    let store = Arc::new(JsonLedgerStore::new(&config.ledger.path));
    let (ledger, writer) = create_ledger_system(store, broadcaster.clone(), LEDGER_BUFFER_SIZE);
    let writer_handle = tokio::spawn(writer.run());

    // Seed jobs from the source script on first boot
    let snapshot = ledger
        .snapshot()
        .await
        .context("Ledger writer failed before startup completed")?;
    if snapshot.total == 0 {
        match tokio::fs::read_to_string(&config.source.path).await {
            Ok(content) => {
                let report = ledger
                    .initialize_from(&content)
                    .await
                    .context("Failed to initialize ledger from source script")?;
                info!(
                    jobs = report.jobs_created,
                    skipped = report.lines_skipped,
                    "Ledger initialized from {:?}",
                    config.source.path
                );
            }
            Err(e) => {
                warn!(
                    "Source script {:?} not readable ({}); starting with an empty ledger",
                    config.source.path, e
                );
            }
        }
    } else {
        info!(jobs = snapshot.total, "Ledger document loaded");
    }

    // Create synthesis and post-processing collaborators
    let synthesizer =
        Arc::new(HttpSynthesizer::new(config.synthesis.clone())) as Arc<dyn Synthesizer>;
    let processor = Arc::new(WavProcessor::new(config.audio.clone())) as Arc<dyn AudioProcessor>;
    info!("Synthesis endpoint: {}", config.synthesis.url);

    // Create the generation orchestrator
    let orchestrator = Arc::new(Orchestrator::new(
        config.engine.clone(),
        config.output.dir.clone(),
        ledger.clone(),
        synthesizer,
        processor,
        broadcaster.clone(),
    ));

    // Create app state
    let state = Arc::new(AppState::new(
        config.clone(),
        authenticator,
        Arc::clone(&orchestrator),
    ));

    // Create router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");

    // Ask any active run to stop; in-flight jobs finish their current step
    if orchestrator.stop().await.is_ok() {
        info!("Requested stop of the active generation run");
    }

    // Drop all holders of LedgerHandle so the writer's channel closes.
    // The orchestrator keeps a handle clone, so it must go first.
    drop(orchestrator);
    drop(ledger);

    // Wait for the writer to finish persisting remaining updates
    let _ = writer_handle.await;
    info!("Ledger writer stopped");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
