//! Identity of this processing stage, written into every message's
//! process log.

use chrono::Utc;
use geoconfirm_message_models::ProvenanceStamp;

/// Name, version, and host of the stage doing the processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Agent {
    /// Stage name.
    pub name: String,
    /// Stage version.
    pub version: String,
    /// Host the stage runs on.
    pub hostname: String,
}

impl Agent {
    /// This crate's name and version on the current host.
    ///
    /// Falls back to `"unknown"` when the OS does not report a hostname.
    #[must_use]
    pub fn current() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            hostname: sysinfo::System::host_name().unwrap_or_else(|| "unknown".to_string()),
        }
    }

    /// A fresh stamp timestamped now.
    #[must_use]
    pub fn stamp(&self) -> ProvenanceStamp {
        ProvenanceStamp {
            agent_name: self.name.clone(),
            agent_version: self.version.clone(),
            processed_at: Utc::now(),
            hostname: self.hostname.clone(),
        }
    }
}
