use std::sync::Arc;

use kiln_core::config::PathsConfig;
use kiln_store::SettingsStore;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument};

use crate::cache::{CachedValue, SettingsCache};
use crate::error::Result;

/// Keys of the settings table.
pub mod keys {
    pub const JOB_QUEUEING: &str = "JOB_QUEUEING";
    pub const TRAINING_FOLDER: &str = "TRAINING_FOLDER";
    pub const DATASETS_FOLDER: &str = "DATASETS_FOLDER";
    pub const HF_TOKEN: &str = "HF_TOKEN";
    pub const DATA_ROOT: &str = "DATA_ROOT";
}

/// Values used when a settings row is absent or empty.
#[derive(Debug, Clone)]
pub struct SettingsDefaults {
    pub training_folder: String,
    pub datasets_folder: String,
    pub data_root: String,
}

impl From<&PathsConfig> for SettingsDefaults {
    fn from(paths: &PathsConfig) -> Self {
        Self {
            training_folder: paths.training_folder(),
            datasets_folder: paths.datasets_folder(),
            data_root: paths.data_root(),
        }
    }
}

/// Body of the settings write endpoint. Absent fields are not written.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsUpdate {
    #[serde(rename = "HF_TOKEN", default)]
    pub hf_token: Option<String>,
    #[serde(rename = "TRAINING_FOLDER", default)]
    pub training_folder: Option<String>,
    #[serde(rename = "DATASETS_FOLDER", default)]
    pub datasets_folder: Option<String>,
    #[serde(rename = "JOB_QUEUEING", default)]
    pub job_queueing: Option<bool>,
}

/// Typed, cached access to persisted settings.
pub struct Settings {
    store: Arc<dyn SettingsStore>,
    cache: Arc<SettingsCache>,
    defaults: SettingsDefaults,
}

impl Settings {
    pub fn new(
        store: Arc<dyn SettingsStore>,
        cache: Arc<SettingsCache>,
        defaults: SettingsDefaults,
    ) -> Self {
        Self {
            store,
            cache,
            defaults,
        }
    }

    pub fn cache(&self) -> &SettingsCache {
        &self.cache
    }

    /// Whether the queue worker may promote jobs. Defaults to `false`.
    pub fn job_queueing(&self) -> Result<bool> {
        if let Some(CachedValue::Flag(enabled)) = self.cache.get(keys::JOB_QUEUEING) {
            return Ok(enabled);
        }
        let generation = self.cache.generation();
        let enabled = match self.store.get_setting(keys::JOB_QUEUEING)? {
            Some(v) if !v.is_empty() => v == "true",
            _ => false,
        };
        self.cache
            .set_if_current(keys::JOB_QUEUEING, CachedValue::Flag(enabled), generation);
        Ok(enabled)
    }

    pub fn training_folder(&self) -> Result<String> {
        self.text(keys::TRAINING_FOLDER, &self.defaults.training_folder)
    }

    pub fn datasets_folder(&self) -> Result<String> {
        self.text(keys::DATASETS_FOLDER, &self.defaults.datasets_folder)
    }

    pub fn hf_token(&self) -> Result<String> {
        self.text(keys::HF_TOKEN, "")
    }

    pub fn data_root(&self) -> Result<String> {
        self.text(keys::DATA_ROOT, &self.defaults.data_root)
    }

    /// Cache, then store, then default; the resolved value is cached.
    fn text(&self, key: &str, default: &str) -> Result<String> {
        if let Some(CachedValue::Text(value)) = self.cache.get(key) {
            return Ok(value);
        }
        let generation = self.cache.generation();
        let value = match self.store.get_setting(key)? {
            Some(v) if !v.is_empty() => v,
            _ => default.to_string(),
        };
        if self
            .cache
            .set_if_current(key, CachedValue::Text(value.clone()), generation)
        {
            debug!(key, "settings cache populated");
        }
        Ok(value)
    }

    /// All stored settings as a JSON object, read straight from the store.
    ///
    /// Folder defaults are filled in and `JOB_QUEUEING` is a boolean.
    pub fn snapshot(&self) -> Result<Value> {
        let mut obj: Map<String, Value> = self
            .store
            .list_settings()?
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect();

        for (key, default) in [
            (keys::TRAINING_FOLDER, &self.defaults.training_folder),
            (keys::DATASETS_FOLDER, &self.defaults.datasets_folder),
        ] {
            let missing = obj
                .get(key)
                .and_then(Value::as_str)
                .map_or(true, str::is_empty);
            if missing {
                obj.insert(key.to_string(), Value::String(default.clone()));
            }
        }

        let queueing = obj.get(keys::JOB_QUEUEING).and_then(Value::as_str) == Some("true");
        obj.insert(keys::JOB_QUEUEING.to_string(), Value::Bool(queueing));

        Ok(Value::Object(obj))
    }

    /// Persist the given fields, then flush the cache.
    #[instrument(skip_all)]
    pub fn update(&self, update: &SettingsUpdate) -> Result<()> {
        let result = self.write(update);
        // Flush even on failure: earlier rows may already be committed.
        self.cache.flush_all();
        result?;
        info!("settings updated");
        Ok(())
    }

    fn write(&self, update: &SettingsUpdate) -> Result<()> {
        if let Some(ref token) = update.hf_token {
            self.store.upsert_setting(keys::HF_TOKEN, token)?;
        }
        if let Some(ref folder) = update.training_folder {
            self.store.upsert_setting(keys::TRAINING_FOLDER, folder)?;
        }
        if let Some(ref folder) = update.datasets_folder {
            self.store.upsert_setting(keys::DATASETS_FOLDER, folder)?;
        }
        if let Some(enabled) = update.job_queueing {
            let value = if enabled { "true" } else { "false" };
            self.store.upsert_setting(keys::JOB_QUEUEING, value)?;
        }
        Ok(())
    }
}
