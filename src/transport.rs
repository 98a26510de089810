use bytes::Bytes;
use futures::Stream;
use std::future::Future;
use std::pin::Pin;

use crate::error::{AssistError, Result};

/// Type alias for a response body delivered as byte chunks
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Type alias for the future returned by [`AssistTransport::send`]
pub type ResponseFuture = Pin<Box<dyn Future<Output = Result<UpstreamResponse>> + Send>>;

/// What the engine needs from an HTTP response
pub struct UpstreamResponse {
    pub status: u16,
    pub content_type: Option<String>,
    /// `None` when the response carried no body
    pub body: Option<ByteStream>,
}

impl UpstreamResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The body of a successful response.
    pub fn into_body(self) -> Result<ByteStream> {
        if !self.is_success() {
            return Err(AssistError::UpstreamStatus(self.status));
        }
        self.body.ok_or(AssistError::MissingBody)
    }
}

/// Trait for clients that deliver an assistant request and hand back the
/// streaming response
pub trait AssistTransport: Send + Sync {
    /// Post a JSON request body
    ///
    /// # Arguments
    /// * `body` - The serialized request
    ///
    /// # Returns
    /// The response status and its unread body. Non-success statuses are
    /// returned, not turned into errors.
    fn send(&self, body: Bytes) -> ResponseFuture;

    /// Get the transport name for logging
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, body: bool) -> UpstreamResponse {
        UpstreamResponse {
            status,
            content_type: None,
            body: body.then(|| Box::pin(futures::stream::empty()) as ByteStream),
        }
    }

    #[test]
    fn test_into_body() {
        assert!(response(200, true).into_body().is_ok());
        assert!(matches!(
            response(500, true).into_body(),
            Err(AssistError::UpstreamStatus(500))
        ));
        assert!(matches!(
            response(200, false).into_body(),
            Err(AssistError::MissingBody)
        ));
    }
}
