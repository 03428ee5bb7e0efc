//! Operation dispatcher: runs one decoded operation and classifies the outcome

use std::time::{Duration, Instant};

use relay_core::{OperationKind, OperationRequest, OperationResult, DISCOVER_BODY};
use reqwest::Client;
use tracing::{debug, warn};

use crate::error::{OperationError, Result, ServerError};
use crate::metrics;

/// Executes relay operations
///
/// Holds one outbound HTTP client for the whole process. The client carries the
/// configured timeout, which bounds `GET` and `POST` end to end. File
/// operations have no timeout.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    http: Client,
}

impl Dispatcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServerError::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { http })
    }

    /// Decode a raw request body and run it
    ///
    /// Undecodable or incomplete requests come back as `BadRequest` with no
    /// side effect.
    pub async fn dispatch(&self, raw: &[u8]) -> OperationResult {
        match OperationRequest::parse(raw) {
            Ok(request) => self.handle(&request).await,
            Err(e) => {
                warn!(error = %e, "Dropping malformed operation request");
                metrics::record_rejected(metrics::REJECT_MALFORMED);
                OperationResult::bad_request()
            }
        }
    }

    /// Run a decoded request, converting any failure into a result status
    pub async fn handle(&self, request: &OperationRequest) -> OperationResult {
        let started = Instant::now();

        let result = match self.execute(request).await {
            Ok(body) => OperationResult::ok(body),
            Err(e) => {
                warn!(op = %request.kind, error = %e, "Operation failed");
                OperationResult {
                    status: e.status(),
                    body: None,
                }
            }
        };

        metrics::record_operation(request.kind, result.status, started.elapsed());
        debug!(
            op = %request.kind,
            status = result.status.as_str(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Operation complete"
        );

        result
    }

    /// Run a decoded request, returning the success body or a tagged error
    pub async fn execute(
        &self,
        request: &OperationRequest,
    ) -> std::result::Result<Option<Vec<u8>>, OperationError> {
        request.validate()?;

        match request.kind {
            OperationKind::Get => self.remote_get(request.location()?).await.map(Some),
            OperationKind::Post => {
                let body = request.body.clone().unwrap_or_default();
                self.remote_post(request.location()?, body).await.map(Some)
            }
            OperationKind::Read => read_file(request.location()?).await.map(Some),
            OperationKind::Write => {
                let body = request.body.as_deref().unwrap_or_default();
                write_file(request.location()?, body).await.map(|()| None)
            }
            OperationKind::Discover => Ok(Some(DISCOVER_BODY.to_vec())),
        }
    }

    async fn remote_get(&self, url: &str) -> std::result::Result<Vec<u8>, OperationError> {
        debug!(url, "Relaying GET");
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| OperationError::upstream(url, e))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| OperationError::upstream(url, e))?;
        Ok(bytes.to_vec())
    }

    async fn remote_post(
        &self,
        url: &str,
        body: String,
    ) -> std::result::Result<Vec<u8>, OperationError> {
        debug!(url, len = body.len(), "Relaying POST");
        let response = self
            .http
            .post(url)
            .body(body)
            .send()
            .await
            .map_err(|e| OperationError::upstream(url, e))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| OperationError::upstream(url, e))?;
        Ok(bytes.to_vec())
    }
}

async fn read_file(path: &str) -> std::result::Result<Vec<u8>, OperationError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| OperationError::file(path, e))?;
    Ok(content.into_bytes())
}

async fn write_file(path: &str, body: &str) -> std::result::Result<(), OperationError> {
    tokio::fs::write(path, body)
        .await
        .map_err(|e| OperationError::file(path, e))
}
