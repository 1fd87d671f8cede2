//! Persisted key-value state: currently just the last-used endpoint URL,
//! so the UI can restart a session without retyping it.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredSettings {
    pub last_endpoint_url: Option<String>,
}

impl StoredSettings {
    /// Load from `path`, falling back to defaults for a missing or
    /// unreadable file.
    pub fn load_or_default(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("creating settings directory")?;
        }
        let contents = serde_json::to_string_pretty(self).context("encoding settings")?;
        fs::write(path, contents).context("writing settings file")?;
        Ok(())
    }
}
