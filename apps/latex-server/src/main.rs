//! LaTeX compilation server
//!
//! Renders built-in or directory-provided LaTeX templates with caller data
//! and compiles them to PDF with an external TeX engine. Provides REST API
//! endpoints for:
//!
//! - PDF compilation (binary response)
//! - Rendering to base64 JSON
//! - Template listing
//! - Health and pool status
//!
//! ## Architecture
//!
//! Handlers are thin wrappers around [`latex_engine::Coordinator`], which
//! bounds concurrent compiler processes, runs each request in a throwaway
//! workspace and classifies failures.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use clap::Parser;
use latex_engine::{Coordinator, EngineConfig, LatexCompiler};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod api;
mod error;

use api::{handle_compile, handle_health, handle_list_templates, handle_render};

/// Command-line arguments for the LaTeX server
#[derive(Parser, Debug)]
#[command(name = "latex-server")]
#[command(about = "Render LaTeX templates to PDF over HTTP")]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "3000")]
    port: u16,

    /// Host address to bind to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Compiler processes allowed at once
    #[arg(long, env = "MAX_CONCURRENT_COMPILATIONS", default_value = "2")]
    max_concurrent_compilations: usize,

    /// Time limit for all passes of one request, in seconds
    #[arg(long, env = "COMPILATION_TIMEOUT_SECONDS", default_value = "30")]
    compilation_timeout_seconds: u64,

    /// Maximum compiler passes per request
    #[arg(long, env = "MAX_COMPILER_PASSES", default_value = "3")]
    max_compiler_passes: u32,

    /// Requests allowed to wait for a slot before new ones get 503
    #[arg(long, env = "QUEUE_DEPTH_LIMIT", default_value = "16")]
    queue_depth_limit: usize,

    /// How long a queued request waits for a slot, in seconds
    #[arg(long, env = "QUEUE_WAIT_TIMEOUT_SECONDS", default_value = "30")]
    queue_wait_timeout_seconds: u64,

    /// TeX engine executable
    #[arg(long, env = "LATEX_COMPILER", default_value = "pdflatex")]
    compiler: String,

    /// Parent directory for per-request workspaces
    #[arg(long, env = "LATEX_WORKSPACE_ROOT")]
    workspace_root: Option<PathBuf>,

    /// Directory of `<name>.tex` templates overlaying the built-in ones
    #[arg(long, env = "LATEX_TEMPLATE_DIR")]
    template_dir: Option<PathBuf>,

    /// Reject `{"raw": ...}` bindings
    #[arg(long, env = "DISABLE_RAW_BINDINGS")]
    disable_raw_bindings: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "JSON_LOGS")]
    json_logs: bool,
}

impl Args {
    fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_concurrent_compilations: self.max_concurrent_compilations,
            compilation_timeout_seconds: self.compilation_timeout_seconds,
            max_compiler_passes: self.max_compiler_passes,
            queue_depth_limit: self.queue_depth_limit,
            queue_wait_timeout_seconds: self.queue_wait_timeout_seconds,
            compiler_program: self.compiler.clone(),
            workspace_root: self.workspace_root.clone(),
            template_dir: self.template_dir.clone(),
            allow_raw_bindings: !self.disable_raw_bindings,
            ..EngineConfig::default()
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
}

impl AppState {
    pub fn new(coordinator: Coordinator) -> Self {
        Self {
            coordinator: Arc::new(coordinator),
        }
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    // Configure CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(handle_health))
        // API endpoints
        .route("/api/templates", get(handle_list_templates))
        .route("/api/compile", post(handle_compile))
        .route("/api/render", post(handle_render))
        // Apply middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn init_logging(verbose: bool, json: bool) {
    let log_level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::from_default_env().add_directive(log_level.into());

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    init_logging(args.verbose, args.json_logs);

    info!("Starting LaTeX server on {}:{}", args.host, args.port);

    let config = args.engine_config();
    let coordinator = Coordinator::from_config(config.clone())?;
    if !coordinator.compiler().is_available() {
        warn!(
            compiler = %config.compiler_program,
            "compiler not found on PATH; compilations will fail until it is installed"
        );
    }

    let app = router(AppState::new(coordinator));

    // Start server
    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Server listening on http://{}", addr);
    info!(
        "Compilation slots: {}, queue depth: {}, timeout: {}s, passes: {}",
        config.max_concurrent_compilations,
        config.queue_depth_limit,
        config.compilation_timeout_seconds,
        config.max_compiler_passes
    );

    axum::serve(listener, app).await?;

    Ok(())
}
