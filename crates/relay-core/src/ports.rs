//! Listening port negotiation
//!
//! Pages cannot know which port the relay ended up on, so the relay tries to
//! stay on the same port across restarts. Selection is two-phase:
//!
//! 1. Probe the preferred ports in order with a loopback connect. The first one
//!    nobody answers on wins.
//! 2. If every preferred port is taken, bind port 0, take whatever the OS
//!    hands out and append it to the list so the next run prefers it.

use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::time::Duration;

use crate::error::Error;

/// Upper bound on a single loopback connect probe
pub const PROBE_TIMEOUT: Duration = Duration::from_millis(200);

/// Outcome of port selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortChoice {
    /// Port to bind
    pub port: u16,
    /// Preferred list, with `port` appended if it was newly allocated
    pub ports: Vec<u16>,
    /// True when `port` came from the OS and the settings must be saved
    pub newly_allocated: bool,
}

/// Whether something accepts connections on `127.0.0.1:port`
pub fn is_port_in_use(port: u16) -> bool {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    TcpStream::connect_timeout(&addr, PROBE_TIMEOUT).is_ok()
}

/// Pick the first free preferred port, falling back to an OS-assigned one
///
/// Earlier entries win ties. Port 0 entries are skipped.
pub fn choose_port(preferred: &[u16]) -> crate::Result<PortChoice> {
    for &port in preferred.iter().filter(|&&p| p != 0) {
        if is_port_in_use(port) {
            tracing::debug!(port, "Preferred port in use");
            continue;
        }
        tracing::info!(port, "Using preferred port");
        return Ok(PortChoice {
            port,
            ports: preferred.to_vec(),
            newly_allocated: false,
        });
    }

    let port = allocate_ephemeral()?;
    let mut ports = preferred.to_vec();
    ports.push(port);

    tracing::info!(
        port,
        tried = preferred.len(),
        "All preferred ports in use, allocated ephemeral port"
    );

    Ok(PortChoice {
        port,
        ports,
        newly_allocated: true,
    })
}

fn allocate_ephemeral() -> crate::Result<u16> {
    let listener =
        TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).map_err(Error::NoPortAvailable)?;
    let port = listener.local_addr().map_err(Error::NoPortAvailable)?.port();
    Ok(port)
}
