//! Relay client: finds the relay's port and sends operations through it

use std::time::Duration;

use relay_core::{OperationRequest, DISCOVER_BODY};
use reqwest::header::ORIGIN;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;

use crate::error::{ClientError, Result};

/// Upper bound on a single DISCOVER probe
pub const DISCOVER_TIMEOUT: Duration = Duration::from_secs(1);

/// Client for a relay on localhost
///
/// Every request carries the configured `Origin`, which must be in the relay's
/// allow-list or the relay will not answer.
pub struct RelayClient {
    http: Client,
    origin: String,
    host: String,
    port: Option<u16>,
}

impl RelayClient {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            origin: origin.into(),
            host: "localhost".to_string(),
            port: None,
        }
    }

    /// Skip discovery and talk to a known port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Host the relay listens on, `localhost` by default
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    fn url(&self, port: u16) -> String {
        format!("http://{}:{}", self.host, port)
    }

    /// Whether a relay answers DISCOVER on `port`
    pub async fn probe(&self, port: u16) -> bool {
        let response = self
            .http
            .post(self.url(port))
            .header(ORIGIN, &self.origin)
            .timeout(DISCOVER_TIMEOUT)
            .json(&OperationRequest::discover())
            .send()
            .await;

        let Ok(response) = response else {
            return false;
        };
        if response.status() != StatusCode::OK {
            return false;
        }
        match response.json::<serde_json::Value>().await {
            Ok(body) => body.get("discover").is_some(),
            Err(_) => false,
        }
    }

    /// Probe candidate ports in order and remember the first relay found
    pub async fn discover(&mut self, candidates: &[u16]) -> Result<u16> {
        for &port in candidates {
            if self.probe(port).await {
                tracing::info!(port, "Relay found");
                self.port = Some(port);
                return Ok(port);
            }
            tracing::debug!(port, "No relay on port");
        }

        self.port = None;
        Err(ClientError::NotDiscovered {
            tried: candidates.to_vec(),
        })
    }

    /// Send an operation and return the response body
    pub async fn send(&self, request: &OperationRequest) -> Result<Vec<u8>> {
        let port = self.port.ok_or(ClientError::NoPort)?;

        let response = self
            .http
            .post(self.url(port))
            .header(ORIGIN, &self.origin)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ClientError::Relay {
                status: response.status().as_u16(),
            });
        }

        Ok(response.bytes().await?.to_vec())
    }

    /// Liveness check against the current port
    pub async fn ping(&self) -> Result<bool> {
        let body = self.send(&OperationRequest::discover()).await?;
        Ok(body == DISCOVER_BODY)
    }

    pub async fn get(&self, url: &str) -> Result<Vec<u8>> {
        self.send(&OperationRequest::get(url)).await
    }

    pub async fn post(&self, url: &str, body: &str) -> Result<Vec<u8>> {
        self.send(&OperationRequest::post(url, body)).await
    }

    pub async fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.send(&OperationRequest::read(path)).await
    }

    /// Read a file and decode it as JSON
    pub async fn read_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let body = self.read(path).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    pub async fn write(&self, path: &str, data: &str) -> Result<()> {
        self.send(&OperationRequest::write(path, data)).await?;
        Ok(())
    }

    /// Serialize `value` as JSON and write it to `path`
    pub async fn write_json<T: serde::Serialize>(&self, path: &str, value: &T) -> Result<()> {
        let data = serde_json::to_string(value)?;
        self.write(path, &data).await
    }
}
