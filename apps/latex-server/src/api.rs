//! API handlers for the LaTeX server
//!
//! Provides REST endpoints for:
//! - PDF compilation
//! - Rendering to base64 JSON
//! - Template listing
//! - Health

use axum::{
    extract::{rejection::JsonRejection, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use latex_engine::{
    CompileRequest, CompileResult, CompiledDocument, Diagnostic, PoolStats, TemplateInfo,
};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::ServerError;
use crate::AppState;

/// Warning count header on PDF responses
pub const WARNINGS_HEADER: &str = "x-latex-warnings";

/// Compiler pass count header on PDF responses
pub const PASSES_HEADER: &str = "x-latex-passes";

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub compiler: CompilerStatus,
    pub pool: PoolStats,
}

#[derive(Serialize)]
pub struct CompilerStatus {
    pub program: String,
    pub available: bool,
}

/// Handler: GET /health
pub async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let compiler = state.coordinator.compiler();
    let available = compiler.is_available();

    Json(HealthResponse {
        status: if available { "healthy" } else { "degraded" },
        service: "latex-server",
        version: env!("CARGO_PKG_VERSION"),
        compiler: CompilerStatus {
            program: compiler.name().to_string(),
            available,
        },
        pool: state.coordinator.pool_stats(),
    })
}

/// Template list response
#[derive(Serialize)]
pub struct TemplateListResponse {
    pub success: bool,
    pub templates: Vec<TemplateInfo>,
    pub count: usize,
}

/// Handler: GET /api/templates
pub async fn handle_list_templates(State(state): State<AppState>) -> Json<TemplateListResponse> {
    let templates = state.coordinator.templates().await;
    let count = templates.len();

    Json(TemplateListResponse {
        success: true,
        templates,
        count,
    })
}

/// Render response
#[derive(Serialize)]
pub struct RenderApiResponse {
    pub success: bool,
    /// Base64-encoded PDF
    pub data: String,
    /// MIME type of output
    pub mime_type: &'static str,
    /// Number of pages, when the PDF could be parsed
    pub page_count: Option<usize>,
    /// Compiler passes that ran
    pub passes: u32,
    /// Non-fatal diagnostics
    pub warnings: Vec<Diagnostic>,
}

/// Handler: POST /api/compile
///
/// Responds with the PDF itself.
pub async fn handle_compile(
    State(state): State<AppState>,
    payload: Result<Json<CompileRequest>, JsonRejection>,
) -> Result<Response, ServerError> {
    let Json(req) = payload?;
    let template = req.template.clone();

    let document = compile(&state, req).await?;

    let headers = [
        (header::CONTENT_TYPE, "application/pdf".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("inline; filename=\"{}.pdf\"", template),
        ),
        (
            header::HeaderName::from_static(WARNINGS_HEADER),
            document.warnings.len().to_string(),
        ),
        (
            header::HeaderName::from_static(PASSES_HEADER),
            document.passes.to_string(),
        ),
    ];

    Ok((headers, document.pdf).into_response())
}

/// Handler: POST /api/render
///
/// Same input as `/api/compile`; the PDF is returned base64-encoded in JSON.
pub async fn handle_render(
    State(state): State<AppState>,
    payload: Result<Json<CompileRequest>, JsonRejection>,
) -> Result<Json<RenderApiResponse>, ServerError> {
    let Json(req) = payload?;

    let document = compile(&state, req).await?;

    Ok(Json(RenderApiResponse {
        success: true,
        data: STANDARD.encode(&document.pdf),
        mime_type: "application/pdf",
        page_count: document.page_count,
        passes: document.passes,
        warnings: document.warnings,
    }))
}

async fn compile(state: &AppState, req: CompileRequest) -> Result<CompiledDocument, ServerError> {
    info!("Compile request: template={}", req.template);
    debug!("Inputs: {:?}", req.inputs.keys().collect::<Vec<_>>());

    match state.coordinator.compile(req).await {
        CompileResult::Success(document) => Ok(document),
        CompileResult::Failure(failure) => Err(failure.into()),
    }
}

impl From<JsonRejection> for ServerError {
    fn from(rejection: JsonRejection) -> Self {
        ServerError::InvalidRequest(rejection.body_text())
    }
}
