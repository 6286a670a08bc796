use axum::{
    body::Bytes,
    extract::{Request, State},
    http::{
        header::{
            ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
            ACCESS_CONTROL_ALLOW_ORIGIN,
        },
        HeaderValue, StatusCode,
    },
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, MethodRouter},
    Json, Router,
};
use psync_core::{AppConfig, ChannelConnector, TransferItem};
use psync_scan::ScanRequest;
use psync_transfer::transfer::{TransferEngine, TransferOptions};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct ApiService {
    pub config: Arc<AppConfig>,
    pub connector: Arc<dyn ChannelConnector>,
}

impl ApiService {
    pub fn new(config: AppConfig, connector: Arc<dyn ChannelConnector>) -> Self {
        Self {
            config: Arc::new(config),
            connector,
        }
    }

    pub async fn start_server(
        self: Arc<Self>,
        addr: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        info!("Starting pushsync API server on http://{}", addr);
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("pushsync API server listening on {}", listener.local_addr()?);
        self.serve(listener).await?;
        Ok(())
    }

    pub async fn serve(self: Arc<Self>, listener: tokio::net::TcpListener) -> std::io::Result<()> {
        axum::serve(listener, self.create_router()).await
    }

    pub fn create_router(self: Arc<Self>) -> Router {
        let api = Router::new()
            .route("/api/scan", api_route(post(scan_files)))
            .route("/api/transfer", api_route(post(transfer_files)))
            .layer(middleware::from_fn_with_state(self.clone(), cors));

        Router::new()
            .route("/health", get(health_check))
            .merge(api)
            .with_state(self)
    }
}

/// POST handler plus the preflight and 405 responses every API route shares.
fn api_route(
    handler: MethodRouter<Arc<ApiService>>,
) -> MethodRouter<Arc<ApiService>> {
    handler
        .options(preflight)
        .fallback(method_not_allowed)
}

// ── Middleware ───────────────────────────────────────────────────────

async fn cors(State(api): State<Arc<ApiService>>, request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    match HeaderValue::from_str(&api.config.server.allowed_origin) {
        Ok(origin) => {
            headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
        }
        Err(e) => warn!("allowedOrigin is not a valid header value: {}", e),
    }
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST, OPTIONS"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    response
}

async fn preflight() -> StatusCode {
    StatusCode::OK
}

async fn method_not_allowed() -> Response {
    (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed").into_response()
}

fn bad_request() -> Response {
    (StatusCode::BAD_REQUEST, "Invalid request body").into_response()
}

fn internal_error(message: String) -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
}

// ── Handlers ─────────────────────────────────────────────────────────

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "pushsync",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn scan_files(body: Bytes) -> Response {
    let request: ScanRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!("Rejected scan request: {}", e);
            return bad_request();
        }
    };
    info!(
        directories = request.directories.len(),
        days = request.effective_days(),
        "scan requested"
    );
    match tokio::task::spawn_blocking(move || psync_scan::scan(&request)).await {
        Ok(files) => Json(files).into_response(),
        Err(e) => {
            error!("Scan task failed: {}", e);
            internal_error(format!("Failed to scan directories: {}", e))
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    #[serde(default)]
    pub files: Vec<TransferItem>,
    #[serde(default)]
    pub is_dev_environment: bool,
    #[serde(default)]
    pub base_remote_path: String,
}

async fn transfer_files(State(api): State<Arc<ApiService>>, body: Bytes) -> Response {
    let request: TransferRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!("Rejected transfer request: {}", e);
            return bad_request();
        }
    };
    let request_id = Uuid::new_v4();
    info!(
        %request_id,
        files = request.files.len(),
        dev = request.is_dev_environment,
        base = %request.base_remote_path,
        "transfer requested"
    );

    let channel = match api.connector.connect().await {
        Ok(channel) => channel,
        Err(e) => {
            error!(%request_id, "Failed to create SSH client: {}", e);
            return internal_error(format!("Failed to create SSH client: {}", e));
        }
    };

    let options = TransferOptions {
        item_timeout: api.config.ssh.transfer_timeout(),
    };
    let outcome = TransferEngine::negotiate(channel.as_ref(), options)
        .await
        .transfer_all(&request.files)
        .await;
    if let Err(e) = channel.close().await {
        warn!(%request_id, "Closing SSH connection: {}", e);
    }

    match outcome {
        Ok(summary) => {
            info!(
                %request_id,
                mode = %summary.mode,
                files = summary.files,
                bytes = summary.bytes,
                "transfer complete"
            );
            StatusCode::OK.into_response()
        }
        Err(e) => {
            let item = e.item.clone().unwrap_or_default();
            error!(%request_id, "Failed to transfer file {}: {}", item, e);
            internal_error(format!("Failed to transfer file {}: {}", item, e))
        }
    }
}
