//! relay-core: Settings, port negotiation and protocol types for localrelay
//!
//! localrelay is a loopback-only daemon that performs network and filesystem
//! operations on behalf of a browser page. The page is bound by CORS, the
//! relay is not, so the relay acts for it:
//!
//! - Remote `GET` / `POST` against devices on the local network
//! - Local file `READ` / `WRITE`
//! - `DISCOVER` liveness probes, used by pages to find the relay's port
//!
//! # Trust Model
//!
//! | Caller property | Checked |
//! |-----------------|---------|
//! | `Origin` header in allow-list | **YES** - exact string match |
//! | Caller identity / credentials | NO |
//! | Target URL or path | NO - any location the relay user can reach |
//!
//! The relay only ever binds to loopback. Anything beyond origin allow-listing
//! (authentication, TLS, rate limiting) is out of scope.
//!
//! This crate holds the pieces that do not touch HTTP: the persisted
//! [`Settings`], the [`choose_port`] allocator, the [`AllowedOrigins`] set and
//! the [`OperationRequest`] / [`OperationResult`] envelope types.

mod error;
mod operation;
mod origin;
mod ports;
mod settings;

pub use error::Error;
pub use operation::{
    OperationKind, OperationRequest, OperationResult, OperationStatus, DISCOVER_BODY,
};
pub use origin::{is_allowed, AllowedOrigins};
pub use ports::{choose_port, is_port_in_use, PortChoice, PROBE_TIMEOUT};
pub use settings::{Settings, SettingsStore, MAX_LOAD_ATTEMPTS, SETTINGS_SECTION};

pub type Result<T> = std::result::Result<T, Error>;

/// Built-in setting defaults, applied to any key missing from the store
pub mod defaults {
    /// Preferred listening ports, highest priority first
    pub const PORTS: [u16; 5] = [8080, 57923, 54782, 63342, 50124];

    /// Outbound request timeout in seconds
    pub const TIMEOUT_SECS: u64 = 4;

    /// Origins allowed to use the relay
    pub const ORIGINS: [&str; 2] = ["null", "lkamols@github.io/powercells"];
}
