//! Error types for genrun-rs

use thiserror::Error;

/// Result type alias for genrun operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while configuring or running a generator
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error during file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error (config files, model params, records)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error (config files)
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Image encoding error while saving an artifact
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Error raised by the inference backend
    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),

    /// Missing or invalid configuration key
    #[error("Config error: {0}")]
    Config(String),

    /// Dtype name not present in the known-type table
    #[error("Unsupported dtype: {0}")]
    UnsupportedDType(String),

    /// Device string that does not name a supported device
    #[error("Unsupported device: {0}")]
    UnsupportedDevice(String),

    /// No generator registered under this name
    #[error("Unknown model: {0}")]
    UnknownModel(String),

    /// Tokenizer error
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    /// Lifecycle step invoked out of order
    #[error("Lifecycle error: {0}")]
    Lifecycle(String),

    /// Seed bit-size outside 1..=64
    #[error("Invalid seed size: {0} (expected 1..=64 bits)")]
    InvalidSeedSize(u32),

    /// Generation error
    #[error("Generation error: {0}")]
    Generation(String),
}

impl Error {
    /// Shorthand for a missing required configuration key
    pub fn missing_key(key: &str) -> Self {
        Error::Config(format!("missing required key '{}'", key))
    }
}
