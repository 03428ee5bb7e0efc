//! relay-client: Talk to a localrelay instance
//!
//! The relay's port is not fixed, so a client starts by probing candidate
//! ports with `DISCOVER` and then sends operations to whichever one answered.

pub mod client;
pub mod error;

pub use client::{RelayClient, DISCOVER_TIMEOUT};
pub use error::{ClientError, Result};
