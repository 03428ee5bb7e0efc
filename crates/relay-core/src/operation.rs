//! Operation envelope exchanged between the browser page and the relay

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Error;

/// Body returned for a `DISCOVER` operation
pub const DISCOVER_BODY: &[u8] = br#"{"discover": 1}"#;

/// Operation type carried in the `type` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationKind {
    /// Outbound HTTP GET to `location`
    Get,
    /// Outbound HTTP POST of `body` to `location`
    Post,
    /// Read the file at `location`
    Read,
    /// Overwrite the file at `location` with `body`
    Write,
    /// Liveness probe, no location
    Discover,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Get => "GET",
            OperationKind::Post => "POST",
            OperationKind::Read => "READ",
            OperationKind::Write => "WRITE",
            OperationKind::Discover => "DISCOVER",
        }
    }

    /// Whether the operation needs a `location`
    pub fn requires_location(&self) -> bool {
        !matches!(self, OperationKind::Discover)
    }

    /// Whether the operation needs a `body`
    pub fn requires_body(&self) -> bool {
        matches!(self, OperationKind::Write)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single operation request, decoded from one inbound POST body
///
/// `location` is a URL for `GET`/`POST` and a filesystem path for
/// `READ`/`WRITE`. Older pages send it as `url`, which is accepted too.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRequest {
    #[serde(rename = "type")]
    pub kind: OperationKind,
    #[serde(default, alias = "url", skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl OperationRequest {
    pub fn new(kind: OperationKind) -> Self {
        Self {
            kind,
            location: None,
            body: None,
        }
    }

    pub fn discover() -> Self {
        Self::new(OperationKind::Discover)
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(OperationKind::Get).with_location(url)
    }

    pub fn post(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(OperationKind::Post)
            .with_location(url)
            .with_body(body)
    }

    pub fn read(path: impl Into<String>) -> Self {
        Self::new(OperationKind::Read).with_location(path)
    }

    pub fn write(path: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(OperationKind::Write)
            .with_location(path)
            .with_body(body)
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Decode and validate a raw request body
    ///
    /// Only `type` is decoded for `DISCOVER`; whatever else the envelope
    /// carries is ignored.
    pub fn parse(raw: &[u8]) -> crate::Result<Self> {
        let envelope: Envelope = serde_json::from_slice(raw).map_err(malformed)?;
        if envelope.kind == OperationKind::Discover {
            return Ok(Self::discover());
        }

        let request: Self = serde_json::from_slice(raw).map_err(malformed)?;
        request.validate()?;
        Ok(request)
    }

    /// Check that the fields required by `kind` are present
    pub fn validate(&self) -> crate::Result<()> {
        if self.kind.requires_location() && self.location.is_none() {
            return Err(Error::MissingField {
                kind: self.kind,
                field: "location",
            });
        }
        if self.kind.requires_body() && self.body.is_none() {
            return Err(Error::MissingField {
                kind: self.kind,
                field: "body",
            });
        }
        Ok(())
    }

    /// Location for kinds that require one
    pub fn location(&self) -> crate::Result<&str> {
        self.location.as_deref().ok_or(Error::MissingField {
            kind: self.kind,
            field: "location",
        })
    }
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: OperationKind,
}

fn malformed(e: serde_json::Error) -> Error {
    Error::MalformedRequest(e.to_string())
}

/// Outcome class of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationStatus {
    Ok,
    NotFound,
    BadRequest,
}

impl OperationStatus {
    /// HTTP status code used when the result is written back
    pub fn http_code(&self) -> u16 {
        match self {
            OperationStatus::Ok => 200,
            OperationStatus::NotFound | OperationStatus::BadRequest => 404,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Ok => "ok",
            OperationStatus::NotFound => "not_found",
            OperationStatus::BadRequest => "bad_request",
        }
    }
}

/// Result of running one operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationResult {
    pub status: OperationStatus,
    pub body: Option<Vec<u8>>,
}

impl OperationResult {
    pub fn ok(body: Option<Vec<u8>>) -> Self {
        Self {
            status: OperationStatus::Ok,
            body,
        }
    }

    pub fn not_found() -> Self {
        Self {
            status: OperationStatus::NotFound,
            body: None,
        }
    }

    pub fn bad_request() -> Self {
        Self {
            status: OperationStatus::BadRequest,
            body: None,
        }
    }

    pub fn discovered() -> Self {
        Self::ok(Some(DISCOVER_BODY.to_vec()))
    }

    pub fn is_ok(&self) -> bool {
        self.status == OperationStatus::Ok
    }
}
