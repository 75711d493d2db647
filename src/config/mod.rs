//! Configuration system (layered: code > env > config file).
//!
//! Values are addressed by `(section, key)` pairs, mirroring the TOML layout:
//!
//! ```toml
//! [local_llm]
//! model_name = "qwen2.5-7b-instruct"
//! lmstudio_url = "http://localhost:1234/v1"
//! ```

pub mod local_llm;

pub use local_llm::LocalLlmConfig;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use tracing::debug;

use crate::error::{BridgeError, Result};

/// Section holding the local model settings.
pub const LOCAL_LLM_SECTION: &str = "local_llm";

/// Environment variables that override config file entries.
const ENV_MAPPINGS: [(&str, &str, &str); 3] = [
    ("LOCAL_LLM_MODEL_NAME", LOCAL_LLM_SECTION, "model_name"),
    (
        "LOCAL_LLM_FUNCTION_CALLING_MODEL_NAME",
        LOCAL_LLM_SECTION,
        "function_calling_model_name",
    ),
    ("LMSTUDIO_BASE_URL", LOCAL_LLM_SECTION, "lmstudio_url"),
];

/// Source of configuration values keyed by section and key.
pub trait ConfigStore: Send + Sync {
    /// Look up a value. `Ok(None)` means the key is absent.
    fn get(&self, section: &str, key: &str) -> Result<Option<String>>;

    /// Look up a value, falling back to `default` when absent or empty.
    fn get_or(&self, section: &str, key: &str, default: &str) -> Result<String> {
        Ok(self
            .get(section, key)?
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| default.to_string()))
    }
}

/// In-memory layered settings, loaded from TOML and the environment.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    file: toml::Table,
    overrides: BTreeMap<(String, String), String>,
}

impl Settings {
    /// Empty settings; every lookup falls back to its default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse settings from a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let file: toml::Table = toml::from_str(contents)?;
        Ok(Self {
            file,
            overrides: BTreeMap::new(),
        })
    }

    /// Load settings from a TOML file. A missing file yields empty settings.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::new());
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Default config file location (`<config dir>/lmbridge/config.toml`).
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "lmbridge").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load the default config file, then apply environment overrides.
    pub fn from_env() -> Result<Self> {
        let settings = match Self::default_path() {
            Some(path) => Self::load(&path)?,
            None => Self::new(),
        };
        Ok(settings.with_env())
    }

    /// Apply environment overrides (loads `.env` if present).
    pub fn with_env(mut self) -> Self {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        for (env_var, section, key) in &ENV_MAPPINGS {
            if let Ok(value) = std::env::var(env_var) {
                self.set(section, key, value);
            }
        }
        self
    }

    /// Set a value in code; takes precedence over file entries.
    pub fn set(&mut self, section: &str, key: &str, value: impl Into<String>) {
        self.overrides
            .insert((section.to_string(), key.to_string()), value.into());
    }

    fn file_value(&self, section: &str, key: &str) -> Result<Option<String>> {
        let Some(table) = self.file.get(section) else {
            return Ok(None);
        };
        let table = table.as_table().ok_or_else(|| {
            BridgeError::Configuration(format!("[{section}] is not a table"))
        })?;
        match table.get(key) {
            None => Ok(None),
            Some(toml::Value::String(s)) => Ok(Some(s.clone())),
            Some(toml::Value::Integer(i)) => Ok(Some(i.to_string())),
            Some(toml::Value::Float(f)) => Ok(Some(f.to_string())),
            Some(toml::Value::Boolean(b)) => Ok(Some(b.to_string())),
            Some(toml::Value::Datetime(d)) => Ok(Some(d.to_string())),
            Some(other) => Err(BridgeError::Configuration(format!(
                "{section}.{key} must be a scalar, found {}",
                other.type_str()
            ))),
        }
    }
}

impl ConfigStore for Settings {
    fn get(&self, section: &str, key: &str) -> Result<Option<String>> {
        if let Some(value) = self
            .overrides
            .get(&(section.to_string(), key.to_string()))
        {
            return Ok(Some(value.clone()));
        }
        self.file_value(section, key)
    }
}
