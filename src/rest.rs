/*!
sheetsql REST API Server

Accepts spreadsheet uploads and answers questions about them.

## Usage

```bash
sheetsql-rest --host 127.0.0.1 --port 8000 --data-dir ./data
```

## Endpoints

- `POST /upload` - Upload a CSV or workbook (multipart field `file`), creating a session
- `POST /ask` - Ask a question about a session's data
- `GET /sessions/:id/tables` - List the tables of a session
- `GET /health` - Health check
- `GET /version` - Version information
*/

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sheetsql::agent::{Agent, ChatAgent};
use sheetsql::config::{load_dotenv, AgentArgs, StorageArgs};
use sheetsql::query::DEFAULT_TOP_K;
use sheetsql::source::SUPPORTED_EXTENSIONS;
use sheetsql::{
    AskOutcome, FsSessionRegistry, Ingestor, QueryService, SessionId, SessionRegistry,
    SheetSqlError, VERSION,
};

/// CLI arguments for the REST API server
#[derive(Parser)]
#[command(name = "sheetsql-rest")]
#[command(about = "sheetsql REST API Server")]
#[command(version = VERSION)]
struct Cli {
    /// Host address to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind to
    #[arg(long, default_value = "8000")]
    port: u16,

    /// CORS allowed origins (comma-separated)
    #[arg(long, default_value = "*")]
    cors_origin: String,

    /// Maximum accepted upload size in bytes
    #[arg(long, default_value = "52428800")]
    max_upload_bytes: usize,

    #[command(flatten)]
    storage: StorageArgs,

    #[command(flatten)]
    agent: AgentArgs,
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    ingestor: Arc<Ingestor>,
    query: Arc<QueryService>,
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for /ask endpoint
#[derive(Debug, Deserialize)]
struct AskRequest {
    session_id: String,
    question: String,
    #[serde(default = "default_top_k")]
    top_k: usize,
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

/// Response of /upload
#[derive(Debug, Serialize)]
struct UploadResponse {
    session_id: String,
    tables: Vec<String>,
    message: String,
}

/// Response of /sessions/:id/tables
#[derive(Debug, Serialize)]
struct TablesResponse {
    session_id: String,
    tables: Vec<String>,
}

/// Error API response
#[derive(Debug, Serialize)]
struct ApiError {
    status: String,
    error: ErrorDetails,
}

#[derive(Debug, Serialize)]
struct ErrorDetails {
    message: String,
    #[serde(rename = "type")]
    error_type: String,
}

/// Health check response
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

/// Version response
#[derive(Debug, Serialize)]
struct VersionResponse {
    version: String,
    features: Vec<String>,
}

// ============================================================================
// Error Handling
// ============================================================================

/// Custom error type for API responses
struct ApiErrorResponse {
    status: StatusCode,
    error: ApiError,
}

impl IntoResponse for ApiErrorResponse {
    fn into_response(self) -> Response {
        let json = Json(self.error);
        (self.status, json).into_response()
    }
}

impl From<SheetSqlError> for ApiErrorResponse {
    fn from(err: SheetSqlError) -> Self {
        let (status, error_type) = match &err {
            SheetSqlError::MissingFile(_) => (StatusCode::BAD_REQUEST, "MissingFile"),
            SheetSqlError::UnsupportedFormat(_) => (StatusCode::BAD_REQUEST, "UnsupportedFormat"),
            SheetSqlError::SessionNotFound(_) => (StatusCode::NOT_FOUND, "SessionNotFound"),
            SheetSqlError::IngestionFailure(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "IngestionFailure")
            }
            SheetSqlError::AgentExecutionFailure(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "AgentExecutionFailure")
            }
            SheetSqlError::ReaderError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "ReaderError"),
            SheetSqlError::InternalError(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "InternalError")
            }
        };

        if status.is_server_error() {
            warn!("Request failed: {}", err);
        }

        ApiErrorResponse {
            status,
            error: ApiError {
                status: "error".to_string(),
                error: ErrorDetails {
                    message: err.to_string(),
                    error_type: error_type.to_string(),
                },
            },
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Run blocking work (file parsing, SQLite, agent HTTP) off the async runtime
async fn blocking<T, F>(work: F) -> Result<T, SheetSqlError>
where
    F: FnOnce() -> Result<T, SheetSqlError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| SheetSqlError::InternalError(format!("Worker task failed: {}", e)))?
}

/// Pull the `file` field out of a multipart body
async fn read_upload(mut multipart: Multipart) -> Result<(String, Vec<u8>), SheetSqlError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| SheetSqlError::MissingFile(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| SheetSqlError::MissingFile(format!("Failed to read upload: {}", e)))?;
        return Ok((filename, bytes.to_vec()));
    }

    Err(SheetSqlError::MissingFile("No file provided in field 'file'".to_string()))
}

fn cors_layer(cors_origin: &str) -> CorsLayer {
    if cors_origin == "*" {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(vec![header::CONTENT_TYPE])
    } else {
        let origins: Vec<_> = cors_origin
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(vec![header::CONTENT_TYPE])
    }
}

fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/upload", post(upload_handler))
        .route("/ask", post(ask_handler))
        .route("/sessions/:id/tables", get(tables_handler))
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

// ============================================================================
// Handler Functions
// ============================================================================

/// POST /upload - Ingest a file into a new session
async fn upload_handler(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiErrorResponse> {
    let (filename, bytes) = read_upload(multipart).await?;
    info!("Received upload '{}' ({} bytes)", filename, bytes.len());

    let session_id = SessionId::generate();
    let ingestor = Arc::clone(&state.ingestor);
    let report = blocking(move || ingestor.ingest(&session_id, &filename, &bytes)).await?;

    Ok(Json(UploadResponse {
        session_id: report.session_id.to_string(),
        tables: report.tables,
        message: "Files processed into SQLite DB.".to_string(),
    }))
}

/// POST /ask - Answer a question about a session
async fn ask_handler(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AskOutcome>, ApiErrorResponse> {
    info!(
        "Question for session {}: {} chars, top_k={}",
        request.session_id,
        request.question.len(),
        request.top_k
    );

    let query = Arc::clone(&state.query);
    let outcome = blocking(move || {
        query.ask(&request.session_id, &request.question, request.top_k)
    })
    .await?;

    Ok(Json(outcome))
}

/// GET /sessions/:id/tables - List a session's tables
async fn tables_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<TablesResponse>, ApiErrorResponse> {
    let query = Arc::clone(&state.query);
    let id = session_id.clone();
    let tables = blocking(move || query.tables(&id)).await?;

    Ok(Json(TablesResponse { session_id, tables }))
}

/// GET /health - Health check
async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: VERSION.to_string(),
    })
}

/// GET /version - Version information
async fn version_handler() -> Json<VersionResponse> {
    Json(VersionResponse {
        version: VERSION.to_string(),
        features: SUPPORTED_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
    })
}

/// Root handler
async fn root_handler() -> &'static str {
    "sheetsql REST API Server - See /health for status"
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env first, so it can also set RUST_LOG
    let env_file = load_dotenv();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sheetsql_rest=info,sheetsql=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Some(path) = &env_file {
        info!("Loaded environment from {}", path.display());
    }

    // Parse CLI arguments
    let cli = Cli::parse();

    let layout = cli.storage.layout();
    layout.ensure_dirs()?;
    info!(
        "Storing uploads in {} and databases in {}",
        layout.upload_dir.display(),
        layout.db_dir.display()
    );

    let agent_config = cli.agent.agent_config();
    if agent_config.api_key.is_none() {
        warn!("No LLM API key configured; requests are sent without authorization");
    }
    info!(
        "Using model {} at {}",
        agent_config.model, agent_config.base_url
    );

    let registry: Arc<dyn SessionRegistry> = Arc::new(FsSessionRegistry::new(&layout.db_dir));
    let agent: Arc<dyn Agent> = Arc::new(ChatAgent::new(agent_config));
    let state = AppState {
        ingestor: Arc::new(Ingestor::new(layout, Arc::clone(&registry))),
        query: Arc::new(QueryService::new(registry, agent)),
    };

    let app = router(state, cli.max_upload_bytes)
        .layer(cors_layer(&cli.cors_origin))
        .layer(tower_http::trace::TraceLayer::new_for_http());

    // Parse bind address
    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port).parse()?;

    info!("Starting sheetsql REST API server on {}", addr);
    info!("API documentation:");
    info!("  POST /upload               - Upload CSV or workbook");
    info!("  POST /ask                  - Ask a question");
    info!("  GET  /sessions/:id/tables  - List session tables");
    info!("  GET  /health               - Health check");
    info!("  GET  /version              - Version info");

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use sheetsql::agent::{ScriptedAgent, ScriptedCall, QUERY_TOOL};
    use sheetsql::config::StorageLayout;
    use tower::util::ServiceExt;

    const BOUNDARY: &str = "sheetsql-test-boundary";

    fn create_test_app(tmp: &tempfile::TempDir, agent: ScriptedAgent) -> Router {
        let layout = StorageLayout::under(tmp.path());
        layout.ensure_dirs().unwrap();
        let registry: Arc<dyn SessionRegistry> = Arc::new(FsSessionRegistry::new(&layout.db_dir));
        let state = AppState {
            ingestor: Arc::new(Ingestor::new(layout, Arc::clone(&registry))),
            query: Arc::new(QueryService::new(registry, Arc::new(agent))),
        };
        router(state, 1024 * 1024)
    }

    fn upload_request(field: &str, filename: &str, content: &[u8]) -> Request<Body> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/upload")
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn ask_request(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/ask")
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    async fn upload_sales(app: &Router) -> String {
        let response = app
            .clone()
            .oneshot(upload_request(
                "file",
                "2024 Sales.csv",
                b"region,amount\nUS,10\nEU,20\nAPAC,5\n",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        json_body(response).await["session_id"]
            .as_str()
            .unwrap()
            .to_string()
    }

    fn count_files(dir: &std::path::Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[tokio::test]
    async fn test_upload_csv() {
        let tmp = tempfile::tempdir().unwrap();
        let app = create_test_app(&tmp, ScriptedAgent::default());

        let response = app
            .oneshot(upload_request("file", "2024 Sales.csv", b"region,amount\nUS,10\n"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = json_body(response).await;
        assert_eq!(json["tables"], serde_json::json!(["t_2024_sales"]));
        assert_eq!(json["message"], "Files processed into SQLite DB.");
        assert_eq!(json["session_id"].as_str().unwrap().len(), 32);
    }

    #[tokio::test]
    async fn test_upload_unsupported_format() {
        let tmp = tempfile::tempdir().unwrap();
        let app = create_test_app(&tmp, ScriptedAgent::default());

        let response = app
            .oneshot(upload_request("file", "notes.txt", b"hello"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let json = json_body(response).await;
        assert_eq!(json["status"], "error");
        assert_eq!(json["error"]["type"], "UnsupportedFormat");
        assert_eq!(count_files(&tmp.path().join("uploads")), 0);
        assert_eq!(count_files(&tmp.path().join("databases")), 0);
    }

    #[tokio::test]
    async fn test_upload_ods_is_unsupported() {
        let tmp = tempfile::tempdir().unwrap();
        let app = create_test_app(&tmp, ScriptedAgent::default());

        let response = app
            .oneshot(upload_request("file", "data.ods", b"hello"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let json = json_body(response).await;
        assert_eq!(json["error"]["type"], "UnsupportedFormat");
        assert_eq!(count_files(&tmp.path().join("uploads")), 0);
        assert_eq!(count_files(&tmp.path().join("databases")), 0);
    }

    #[tokio::test]
    async fn test_upload_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let app = create_test_app(&tmp, ScriptedAgent::default());

        let response = app
            .oneshot(upload_request("attachment", "data.csv", b"a\n1\n"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let json = json_body(response).await;
        assert_eq!(json["error"]["type"], "MissingFile");
    }

    #[tokio::test]
    async fn test_upload_malformed_csv() {
        let tmp = tempfile::tempdir().unwrap();
        let app = create_test_app(&tmp, ScriptedAgent::default());

        let response = app
            .oneshot(upload_request("file", "empty.csv", b""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let json = json_body(response).await;
        assert_eq!(json["error"]["type"], "IngestionFailure");
        assert!(json["error"]["message"]
            .as_str()
            .unwrap()
            .starts_with("Error processing file:"));
        assert_eq!(count_files(&tmp.path().join("uploads")), 0);
        assert_eq!(count_files(&tmp.path().join("databases")), 0);
    }

    #[tokio::test]
    async fn test_ask() {
        let tmp = tempfile::tempdir().unwrap();
        let agent = ScriptedAgent::new(
            vec![ScriptedCall::new(
                QUERY_TOOL,
                "SELECT region, amount FROM t_2024_sales ORDER BY amount DESC LIMIT 2",
            )],
            "EU sold the most.",
        );
        let app = create_test_app(&tmp, agent);
        let session_id = upload_sales(&app).await;

        let response = app
            .oneshot(ask_request(serde_json::json!({
                "session_id": session_id,
                "question": "Which region sold the most?"
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = json_body(response).await;
        assert_eq!(json["answer"], "EU sold the most.");
        assert_eq!(
            json["sql_queries"],
            serde_json::json!([
                "SELECT region, amount FROM t_2024_sales ORDER BY amount DESC LIMIT 2"
            ])
        );
        assert_eq!(
            json["rows"],
            serde_json::json!([
                {"col_1": "EU", "col_2": 20},
                {"col_1": "US", "col_2": 10}
            ])
        );
        assert_eq!(
            json["raw_agent_output"]["input"],
            "Which region sold the most?"
        );
    }

    #[tokio::test]
    async fn test_ask_unknown_session() {
        let tmp = tempfile::tempdir().unwrap();
        let app = create_test_app(&tmp, ScriptedAgent::default());

        let response = app
            .oneshot(ask_request(serde_json::json!({
                "session_id": SessionId::generate().to_string(),
                "question": "anything?",
                "top_k": 3
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let json = json_body(response).await;
        assert_eq!(json["error"]["type"], "SessionNotFound");
    }

    #[tokio::test]
    async fn test_ask_agent_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let app = create_test_app(&tmp, ScriptedAgent::failing("model offline"));
        let session_id = upload_sales(&app).await;

        let response = app
            .oneshot(ask_request(serde_json::json!({
                "session_id": session_id,
                "question": "anything?"
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let json = json_body(response).await;
        assert_eq!(json["error"]["type"], "AgentExecutionFailure");
    }

    #[tokio::test]
    async fn test_session_tables() {
        let tmp = tempfile::tempdir().unwrap();
        let app = create_test_app(&tmp, ScriptedAgent::default());
        let session_id = upload_sales(&app).await;

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/sessions/{}/tables", session_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["tables"], serde_json::json!(["t_2024_sales"]));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/sessions/not-a-session/tables")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let tmp = tempfile::tempdir().unwrap();
        let app = create_test_app(&tmp, ScriptedAgent::default());

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = json_body(response).await;
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["version"], VERSION);
    }

    #[tokio::test]
    async fn test_version_endpoint() {
        let tmp = tempfile::tempdir().unwrap();
        let app = create_test_app(&tmp, ScriptedAgent::default());

        let response = app
            .oneshot(Request::builder().uri("/version").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = json_body(response).await;
        assert_eq!(json["version"], VERSION);
        assert_eq!(json["features"], serde_json::json!(["csv", "xls", "xlsx"]));
    }

    #[tokio::test]
    async fn test_root_endpoint() {
        let tmp = tempfile::tempdir().unwrap();
        let app = create_test_app(&tmp, ScriptedAgent::default());

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(String::from_utf8_lossy(&body).starts_with("sheetsql REST API Server"));
    }
}
