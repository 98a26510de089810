use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{Response, StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use bytes::Bytes;
use futures::StreamExt;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::client::HttpTransport;
use crate::config::AssistConfig;
use crate::diagnostics::{self, preview};
use crate::error::{AssistError, Result};
use crate::streaming::tee;
use crate::transport::{AssistTransport, ByteStream};

const PROMPT_PREVIEW: usize = 160;

pub struct RelayState {
    pub transport: Arc<dyn AssistTransport>,
    pub config: AssistConfig,
}

pub fn router(state: Arc<RelayState>) -> Router {
    Router::new()
        .route("/api/assist", post(handle_assist).get(health))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

/// Forward a request body upstream and stream the reply back unchanged,
/// mirroring it to the diagnostics consumer on the side.
pub async fn handle_assist(State(state): State<Arc<RelayState>>, body: Bytes) -> Response<Body> {
    let request_id = Uuid::new_v4();

    // A body that is not JSON is forwarded as an empty object
    let body = match serde_json::from_slice::<Value>(&body) {
        Ok(value) => {
            log_request(&request_id, &value);
            body
        }
        Err(e) => {
            debug!(%request_id, error = %e, "Request body is not JSON");
            Bytes::from_static(b"{}")
        }
    };

    let upstream = match state.transport.send(body).await {
        Ok(response) => response,
        Err(e) => {
            error!(%request_id, "{} request failed: {}", state.transport.name(), e);
            return (StatusCode::BAD_GATEWAY, e.to_string()).into_response();
        }
    };

    let status = StatusCode::from_u16(upstream.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let content_type = upstream
        .content_type
        .clone()
        .unwrap_or_else(|| "text/event-stream".to_string());

    let Some(stream) = upstream.body else {
        error!(%request_id, status = upstream.status, "Upstream returned no body");
        return (StatusCode::BAD_GATEWAY, AssistError::MissingBody.to_string()).into_response();
    };

    info!(%request_id, status = upstream.status, "Relaying upstream stream");

    let client: ByteStream = if state.config.session.diagnostics {
        let (client, mirror) = tee(stream, state.config.session.tee_capacity);
        tokio::spawn(async move {
            let report = diagnostics::mirror(mirror).await;
            debug!(%request_id, frames = report.frames, "Relay mirror finished");
        });
        Box::pin(client)
    } else {
        stream
    };

    let client = client.map(|chunk| chunk.map_err(|e| std::io::Error::other(e.to_string())));

    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CACHE_CONTROL, "no-cache, no-transform")
        .header(header::CONNECTION, "keep-alive")
        .body(Body::from_stream(client))
        .unwrap_or_else(|e| {
            error!(%request_id, "Failed to build relay response: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        })
}

fn log_request(request_id: &Uuid, value: &Value) {
    let field = |pointer: &str| value.pointer(pointer).and_then(Value::as_str).unwrap_or("-");
    let prompt = field("/query/prompt");

    info!(
        %request_id,
        query_id = field("/query/id"),
        prompt_len = prompt.len(),
        prompt = %preview(prompt, PROMPT_PREVIEW),
        processor_id = field("/session/processor_id"),
        activity_id = field("/session/activity_id"),
        "Assist request"
    );
}

/// Run the relay until ctrl-c.
pub async fn serve(config: AssistConfig) -> Result<()> {
    let transport = HttpTransport::new(config.upstream.clone())?;
    info!("Relaying to {}", transport.endpoint());

    let state = Arc::new(RelayState {
        transport: Arc::new(transport),
        config: config.clone(),
    });

    let listener = TcpListener::bind(&config.server.listen_addr).await?;
    info!("Listening on {}", config.server.listen_addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down");
        })
        .await?;

    Ok(())
}
