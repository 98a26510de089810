use bytes::Bytes;
use futures::TryStreamExt;
use reqwest::{Client, StatusCode, header};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::UpstreamConfig;
use crate::error::{AssistError, Result};
use crate::transport::{AssistTransport, ByteStream, ResponseFuture, UpstreamResponse};

/// Posts requests to the assistant endpoint over HTTP and streams the reply
pub struct HttpTransport {
    client: Client,
    config: UpstreamConfig,
}

impl HttpTransport {
    pub fn new(config: UpstreamConfig) -> Result<Self> {
        // No overall timeout: a stream may legitimately stay open for minutes
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| {
                AssistError::InternalError(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self { client, config })
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }
}

impl AssistTransport for HttpTransport {
    fn send(&self, body: Bytes) -> ResponseFuture {
        let url = self.config.endpoint.clone();
        let client = self.client.clone();

        Box::pin(async move { Self::send_impl(url, body, client).await })
    }

    fn name(&self) -> &str {
        "http"
    }
}

impl HttpTransport {
    async fn send_impl(url: String, body: Bytes, client: Client) -> Result<UpstreamResponse> {
        info!("Assist: Sending {} bytes to: {}", body.len(), url);

        let response = client
            .post(&url)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "text/event-stream")
            .body(body)
            .send()
            .await
            .map_err(|e| AssistError::Transport(format!("Assist request failed: {}", e)))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        info!("Assist upstream responded with status: {}", status);
        debug!(content_type = ?content_type, "Upstream response headers");

        let body = if status == StatusCode::NO_CONTENT {
            None
        } else {
            let stream = response.bytes_stream().map_err(AssistError::from);
            Some(Box::pin(stream) as ByteStream)
        };

        Ok(UpstreamResponse {
            status: status.as_u16(),
            content_type,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_construction() {
        let transport = HttpTransport::new(UpstreamConfig::default()).unwrap();
        assert_eq!(transport.name(), "http");
        assert_eq!(transport.endpoint(), "http://localhost:8000/assist");
    }
}
