//! Startup sequence: settings, port choice, runtime configuration
//!
//! Everything here runs before the listener accepts its first connection. Any
//! error is fatal.

use relay_core::{choose_port, PortChoice, Settings, SettingsStore};
use tracing::info;

use crate::error::Result;
use crate::server::RelayConfig;

/// Settings and port resolved at startup
#[derive(Debug, Clone)]
pub struct StartupPlan {
    pub settings: Settings,
    pub port: PortChoice,
    pub config: RelayConfig,
}

/// Load and repair settings, pick a port and persist any changes
///
/// Defaults are merged into the stored settings and written back. If the port
/// had to come from the OS, the extended preferred list is saved as well, so
/// the next run tries it first among free ports.
pub fn plan_startup(store: &SettingsStore) -> Result<StartupPlan> {
    let mut settings = store.load()?;
    if settings.fill_defaults() {
        info!(path = %store.path().display(), "Filled missing settings with defaults");
    }
    store.save(&settings)?;

    let port = choose_port(&settings.ports()?)?;
    if port.newly_allocated {
        settings.set_ports(&port.ports);
        store.save(&settings)?;
        info!(port = port.port, "Recorded newly allocated port in settings");
    }

    let config = RelayConfig::from_settings(&settings, port.port)?;

    Ok(StartupPlan {
        settings,
        port,
        config,
    })
}
