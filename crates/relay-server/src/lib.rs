//! relay-server: Loopback relay for browser pages
//!
//! Accepts CORS-checked operation requests on localhost, runs them through the
//! [`Dispatcher`] and writes the result back with the caller's origin echoed in
//! `Access-Control-Allow-Origin`.

pub mod dispatch;
pub mod error;
pub mod metrics;
pub mod server;
pub mod startup;

pub use dispatch::Dispatcher;
pub use error::{Dropped, OperationError, ServerError};
pub use server::{Relay, RelayConfig, RelayServer, MAX_BODY_BYTES};
pub use startup::{plan_startup, StartupPlan};
