// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persisted settings and mute state:
//! `settings.json`, `repo_state.json`, `authors.json`, and a small
//! `recent_locations.json` feeding `get_recent_locations`. Every write goes
//! through a write-tempfile-then-rename idiom, so a crash mid-write never
//! leaves a partial file behind.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::Settings;
use crate::error::DaemonError;

const MAX_RECENT_LOCATIONS: usize = 20;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RepoPersisted {
    #[serde(default)]
    pub muted: bool,
    #[serde(default)]
    pub collapsed: bool,
}

/// Handles to the three small JSON files the core's settings/mute commands
/// mutate, rooted at `<data_root>`.
pub struct SettingsStore {
    settings_path: PathBuf,
    repo_state_path: PathBuf,
    authors_path: PathBuf,
    recent_locations_path: PathBuf,
}

impl SettingsStore {
    pub fn new(data_root: &Path) -> Self {
        Self {
            settings_path: data_root.join("settings.json"),
            repo_state_path: data_root.join("repo_state.json"),
            authors_path: data_root.join("authors.json"),
            recent_locations_path: data_root.join("recent_locations.json"),
        }
    }

    pub fn load_settings(&self) -> Settings {
        read_json(&self.settings_path).unwrap_or_default()
    }

    pub fn save_settings(&self, settings: &Settings) -> Result<(), DaemonError> {
        write_json(&self.settings_path, settings)
    }

    pub fn load_repo_state(&self) -> HashMap<String, RepoPersisted> {
        read_json(&self.repo_state_path).unwrap_or_default()
    }

    pub fn save_repo_state(&self, state: &HashMap<String, RepoPersisted>) -> Result<(), DaemonError> {
        write_json(&self.repo_state_path, state)
    }

    pub fn load_authors(&self) -> HashMap<String, bool> {
        read_json(&self.authors_path).unwrap_or_default()
    }

    pub fn save_authors(&self, state: &HashMap<String, bool>) -> Result<(), DaemonError> {
        write_json(&self.authors_path, state)
    }

    pub fn load_recent_locations(&self) -> Vec<String> {
        read_json(&self.recent_locations_path).unwrap_or_default()
    }

    /// Moves `location` to the front of the recent-locations list, capped at
    /// [`MAX_RECENT_LOCATIONS`], and persists the result.
    pub fn record_location(&self, location: &str) -> Result<Vec<String>, DaemonError> {
        let mut locations = self.load_recent_locations();
        locations.retain(|l| l != location);
        locations.insert(0, location.to_owned());
        locations.truncate(MAX_RECENT_LOCATIONS);
        write_json(&self.recent_locations_path, &locations)?;
        Ok(locations)
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Option<T> {
    let contents = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&contents) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring malformed persisted file");
            None
        }
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), DaemonError> {
    let json = serde_json::to_string_pretty(value).map_err(|e| DaemonError::fatal(format!("serializing {}: {e}", path.display())))?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).map_err(|e| DaemonError::permanent(format!("writing {}: {e}", tmp.display())))?;
    std::fs::rename(&tmp, path).map_err(|e| DaemonError::permanent(format!("renaming {}: {e}", tmp.display())))?;
    Ok(())
}
