//! Generator configuration loading and validation
//!
//! Configuration is read from a JSON or TOML file (chosen by extension) or
//! built in code. Required keys are checked as soon as the configuration is
//! loaded, so a missing key fails before any pipeline work starts.
//!
//! ```toml
//! device = "detect"
//! dtype = "detect"
//! model = "llama"
//! model_path = "./models/tinyllama"
//! save_folder = "./outputs"
//! save_gen_stats = true
//! gen_data_file_path = "./outputs/gen_data.jsonl"
//!
//! [params]
//! prompt = "Once upon a time"
//! max_new_tokens = 64
//! ```

use crate::device::{DTypeSetting, DeviceSetting};
use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Keys every configuration must carry
pub const REQUIRED_KEYS: &[&str] = &["device", "dtype", "model", "model_path", "save_folder"];

/// Settings for one generator instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Compute device, or `detect`
    pub device: DeviceSetting,

    /// Numeric precision, or `detect`
    pub dtype: DTypeSetting,

    /// Registry name of the generator to use
    pub model: String,

    /// Location of the model weights
    pub model_path: PathBuf,

    /// Directory artifacts are written to
    pub save_folder: PathBuf,

    /// Whether `generate` persists the generation record
    #[serde(default)]
    pub save_gen_stats: bool,

    /// File generation records are appended to
    #[serde(default)]
    pub gen_data_file_path: Option<PathBuf>,

    /// Model-specific parameters
    #[serde(default)]
    pub params: Map<String, Value>,
}

fn table_str<'a>(table: &'a Map<String, Value>, key: &str) -> Result<&'a str> {
    table
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Config(format!("'{}' must be a string", key)))
}

impl GeneratorConfig {
    /// Create a config with detected device/dtype and no persisted stats
    pub fn new(
        model: impl Into<String>,
        model_path: impl Into<PathBuf>,
        save_folder: impl Into<PathBuf>,
    ) -> Self {
        Self {
            device: DeviceSetting::Detect,
            dtype: DTypeSetting::Detect,
            model: model.into(),
            model_path: model_path.into(),
            save_folder: save_folder.into(),
            save_gen_stats: false,
            gen_data_file_path: None,
            params: Map::new(),
        }
    }

    /// Load config from a `.json` or `.toml` file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml(&content),
            Some("json") => Self::from_json(&content),
            other => Err(Error::Config(format!(
                "Unsupported config format {:?}; expected .json or .toml",
                other.unwrap_or("")
            ))),
        }
    }

    /// Parse config from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: Value = serde_json::from_str(json)?;
        Self::from_value(raw)
    }

    /// Parse config from a TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let raw: Value = toml::from_str(toml_str)?;
        Self::from_value(raw)
    }

    /// Build config from an untyped mapping, checking required keys first
    pub fn from_value(raw: Value) -> Result<Self> {
        let table = raw
            .as_object()
            .ok_or_else(|| Error::Config("configuration must be a key-value table".to_string()))?;

        if let Some(key) = REQUIRED_KEYS.iter().find(|key| !table.contains_key(**key)) {
            return Err(Error::missing_key(key));
        }

        // Surface unknown device/dtype names as their own error variants
        table_str(table, "device")?.parse::<DeviceSetting>()?;
        table_str(table, "dtype")?.parse::<DTypeSetting>()?;

        let config: GeneratorConfig = serde_json::from_value(raw)
            .map_err(|e| Error::Config(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;

        Ok(config)
    }

    /// Check cross-field requirements
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(Error::Config("'model' must not be empty".to_string()));
        }
        if self.save_gen_stats && self.gen_data_file_path.is_none() {
            return Err(Error::missing_key("gen_data_file_path"));
        }
        Ok(())
    }

    pub fn with_device(mut self, device: DeviceSetting) -> Self {
        self.device = device;
        self
    }

    pub fn with_dtype(mut self, dtype: DTypeSetting) -> Self {
        self.dtype = dtype;
        self
    }

    /// Persist generation records to `path` after every run
    pub fn with_gen_stats(mut self, path: impl Into<PathBuf>) -> Self {
        self.save_gen_stats = true;
        self.gen_data_file_path = Some(path.into());
        self
    }

    /// Set one model-specific parameter
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Read one model-specific parameter, `None` when absent
    pub fn param<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.params
            .get(key)
            .map(|value| {
                serde_json::from_value(value.clone())
                    .map_err(|e| Error::Config(format!("Invalid value for '{}': {}", key, e)))
            })
            .transpose()
    }

    /// Deserialize all model-specific parameters into a typed struct
    pub fn params_as<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(Value::Object(self.params.clone()))
            .map_err(|e| Error::Config(format!("Invalid params for '{}': {}", self.model, e)))
    }
}
