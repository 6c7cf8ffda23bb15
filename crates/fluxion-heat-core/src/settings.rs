// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of FluxION.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Key-value settings port.
//!
//! The engine persists its learned state as JSON snapshots, one value per
//! entity. Stores only deal with strings; typed (de)serialization happens in
//! [`load_json`] and [`save_json`] so that a corrupt value never reaches the
//! decision logic as a parse error.

use anyhow::{Context, Result};
use fluxion_heat_types::Zone;
use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::HeatError;

/// Default path for the file-backed settings store
pub const DEFAULT_SETTINGS_PATH: &str = "./data/heat_settings.json";

/// Synchronous key-value store for engine state
pub trait SettingsStore: Send + Sync + fmt::Debug {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: String) -> Result<()>;
}

/// Read and decode a JSON value; absent and malformed values both yield `None`
pub fn load_json<T: DeserializeOwned>(store: &dyn SettingsStore, key: &str) -> Option<T> {
    let raw = store.get(key)?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key, error = %e, "Ignoring malformed stored setting");
            None
        }
    }
}

/// Encode a value as JSON and write it as one snapshot
pub fn save_json<T: Serialize>(
    store: &dyn SettingsStore,
    key: &str,
    value: &T,
) -> crate::error::Result<()> {
    let json = serde_json::to_string(value)
        .map_err(|e| HeatError::Persistence(format!("failed to serialize {key}: {e}")))?;
    store
        .set(key, json)
        .map_err(|e| HeatError::Persistence(format!("failed to write {key}: {e:#}")))?;
    debug!(key, "Persisted setting");
    Ok(())
}

/// Settings keys of one device
#[derive(Debug, Clone)]
pub struct SettingsKeys {
    prefix: String,
}

impl SettingsKeys {
    pub fn new(device_id: &str) -> Self {
        Self {
            prefix: device_id.to_owned(),
        }
    }

    pub fn cop_range(&self) -> String {
        format!("{}.cop_range", self.prefix)
    }

    pub fn thermal_characteristics(&self) -> String {
        format!("{}.thermal_characteristics", self.prefix)
    }

    pub fn thermal_samples(&self) -> String {
        format!("{}.thermal_samples", self.prefix)
    }

    pub fn last_applied_target(&self, zone: Zone) -> String {
        format!("{}.{}.last_applied_target", self.prefix, zone.key())
    }

    pub fn last_setpoint_change_ms(&self, zone: Zone) -> String {
        format!("{}.{}.last_setpoint_change_ms", self.prefix, zone.key())
    }

    pub fn occupied(&self) -> String {
        format!("{}.occupied", self.prefix)
    }
}

/// In-memory store, used by tests and the simulator
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    values: RwLock<BTreeMap<String, String>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: String) -> Result<()> {
        self.values.write().insert(key.to_owned(), value);
        Ok(())
    }
}

/// Store persisting all keys into one JSON file
///
/// Every write rewrites the whole file through a temp file and rename, so a
/// crash never leaves a torn file behind.
#[derive(Debug)]
pub struct JsonFileSettingsStore {
    path: PathBuf,
    values: RwLock<BTreeMap<String, String>>,
}

impl JsonFileSettingsStore {
    /// Open the store, starting empty when the file is missing or corrupt
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<BTreeMap<String, String>>(&contents) {
                Ok(values) => {
                    info!(
                        "Loaded {} settings from {}",
                        values.len(),
                        path.display()
                    );
                    values
                }
                Err(e) => {
                    warn!(
                        "Settings file {} is malformed ({e}), starting empty",
                        path.display()
                    );
                    BTreeMap::new()
                }
            },
            Err(_) => {
                info!(
                    "Settings file not found at {}, starting empty",
                    path.display()
                );
                BTreeMap::new()
            }
        };

        Self {
            path,
            values: RwLock::new(values),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, values: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(values).context("Failed to serialize settings")?;

        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, &json)
            .with_context(|| format!("Failed to write temp file {}", temp_path.display()))?;
        fs::rename(&temp_path, &self.path)
            .with_context(|| format!("Failed to rename temp file to {}", self.path.display()))?;
        Ok(())
    }
}

impl SettingsStore for JsonFileSettingsStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: String) -> Result<()> {
        let mut values = self.values.write();
        let previous = values.insert(key.to_owned(), value);
        if let Err(e) = self.flush(&values) {
            // Keep memory and disk consistent
            match previous {
                Some(old) => values.insert(key.to_owned(), old),
                None => values.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }
}
