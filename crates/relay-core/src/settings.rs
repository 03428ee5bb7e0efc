//! Persisted relay settings
//!
//! Settings live in a JSON file under a single `settings` section whose values
//! are all strings:
//!
//! ```text
//! {
//!   "settings": {
//!     "origins": "null,lkamols@github.io/powercells",
//!     "ports": "8080,57923,54782,63342,50124",
//!     "timeout": "4"
//!   }
//! }
//! ```
//!
//! Other top-level sections are left untouched on save.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::error::Error;
use crate::origin::AllowedOrigins;

/// Name of the section holding relay settings
pub const SETTINGS_SECTION: &str = "settings";

/// Bound on create-and-retry cycles when the store or section is missing
pub const MAX_LOAD_ATTEMPTS: usize = 10;

#[derive(Debug, Default, Serialize, Deserialize)]
struct SettingsDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    settings: Option<BTreeMap<String, String>>,
    #[serde(flatten)]
    other: serde_json::Map<String, serde_json::Value>,
}

/// Key-value relay settings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    values: BTreeMap<String, String>,
}

impl Settings {
    pub const PORTS: &'static str = "ports";
    pub const TIMEOUT: &'static str = "timeout";
    pub const ORIGINS: &'static str = "origins";

    pub fn new() -> Self {
        Self::default()
    }

    /// Settings with every key set to its default
    pub fn with_defaults() -> Self {
        let mut settings = Self::new();
        settings.fill_defaults();
        settings
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Set every absent key to its built-in default
    ///
    /// Existing values are never overwritten. Returns true if anything was
    /// filled in.
    pub fn fill_defaults(&mut self) -> bool {
        let mut filled = false;
        for (key, value) in default_values() {
            if !self.values.contains_key(key) {
                tracing::debug!(key, value = %value, "Filling default setting");
                self.values.insert(key.to_string(), value);
                filled = true;
            }
        }
        filled
    }

    /// Preferred ports, highest priority first
    pub fn ports(&self) -> crate::Result<Vec<u16>> {
        match self.get(Self::PORTS) {
            Some(raw) => split_list(raw)
                .map(|item| {
                    item.parse::<u16>()
                        .map_err(|e| invalid(Self::PORTS, raw, e.to_string()))
                })
                .collect(),
            None => Ok(defaults::PORTS.to_vec()),
        }
    }

    pub fn set_ports(&mut self, ports: &[u16]) {
        let joined = ports
            .iter()
            .map(u16::to_string)
            .collect::<Vec<_>>()
            .join(",");
        self.set(Self::PORTS, joined);
    }

    /// Outbound request timeout
    pub fn timeout(&self) -> crate::Result<Duration> {
        let Some(raw) = self.get(Self::TIMEOUT) else {
            return Ok(Duration::from_secs(defaults::TIMEOUT_SECS));
        };
        let secs = raw
            .trim()
            .parse::<u64>()
            .map_err(|e| invalid(Self::TIMEOUT, raw, e.to_string()))?;
        if secs == 0 {
            return Err(invalid(Self::TIMEOUT, raw, "must be at least 1 second".into()));
        }
        Ok(Duration::from_secs(secs))
    }

    /// Origins allowed to use the relay
    pub fn origins(&self) -> AllowedOrigins {
        match self.get(Self::ORIGINS) {
            Some(raw) => split_list(raw).collect(),
            None => defaults::ORIGINS.iter().copied().collect(),
        }
    }
}

fn default_values() -> [(&'static str, String); 3] {
    let ports = defaults::PORTS
        .iter()
        .map(u16::to_string)
        .collect::<Vec<_>>()
        .join(",");
    [
        (Settings::PORTS, ports),
        (Settings::TIMEOUT, defaults::TIMEOUT_SECS.to_string()),
        (Settings::ORIGINS, defaults::ORIGINS.join(",")),
    ]
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|item| !item.is_empty())
}

fn invalid(key: &str, value: &str, reason: String) -> Error {
    Error::InvalidSetting {
        key: key.to_string(),
        value: value.to_string(),
        reason,
    }
}

/// File-backed settings store
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load settings, creating the file or section if missing
    ///
    /// A missing file or section is replaced by an empty one and the read is
    /// retried, up to [`MAX_LOAD_ATTEMPTS`] times.
    pub fn load(&self) -> crate::Result<Settings> {
        load_with_retry(self)
    }

    /// Write the full settings mapping back, replacing the previous section
    pub fn save(&self, settings: &Settings) -> crate::Result<()> {
        let mut document = self.read_document()?;
        document.settings = Some(settings.values.clone());
        self.write_document(&document)?;
        tracing::debug!(path = %self.path.display(), "Settings saved");
        Ok(())
    }
}

/// Storage for the whole settings document
trait DocumentIo {
    fn location(&self) -> &Path;
    fn read_document(&self) -> crate::Result<SettingsDocument>;
    fn write_document(&self, document: &SettingsDocument) -> crate::Result<()>;
}

impl DocumentIo for SettingsStore {
    fn location(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> crate::Result<SettingsDocument> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(SettingsDocument::default())
            }
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(SettingsDocument::default());
        }
        Ok(serde_json::from_str(&content)?)
    }

    fn write_document(&self, document: &SettingsDocument) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(document)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

fn load_with_retry(io: &impl DocumentIo) -> crate::Result<Settings> {
    let path = io.location();
    for attempt in 1..=MAX_LOAD_ATTEMPTS {
        let mut document = io.read_document()?;
        if let Some(values) = document.settings {
            tracing::debug!(path = %path.display(), keys = values.len(), "Settings loaded");
            return Ok(Settings { values });
        }

        tracing::warn!(
            path = %path.display(),
            attempt,
            "Settings section missing, creating an empty one"
        );
        document.settings = Some(BTreeMap::new());
        io.write_document(&document)?;
    }

    Err(Error::SettingsUnavailable {
        path: path.to_path_buf(),
        attempts: MAX_LOAD_ATTEMPTS,
    })
}
