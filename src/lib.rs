//! genrun-rs: lifecycle scaffold for generative-model inference runs
//!
//! Every generator follows the same template: resolve the device and
//! precision, build the model pipeline, run it under a timer, save the
//! artifact with a timestamped filename, and record what happened. Model
//! specifics live behind the [`Generator`] trait; the sequence itself lives
//! in [`GenerationRunner`]. Inference is delegated to candle.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         genrun-rs                            │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌───────────────┐  ┌──────────────────┐  ┌───────────────┐  │
//! │  │ ModelRegistry │─►│ GenerationRunner │─►│ GenerationRec │  │
//! │  │ (name → ctor) │  │ (create/run/save)│  │ (JSONL stats) │  │
//! │  └───────────────┘  └────────┬─────────┘  └───────────────┘  │
//! │                              │ Generator trait               │
//! │  ┌───────────────┐  ┌────────▼─────────┐                     │
//! │  │ ResolvedSet.  │─►│ TextGenerator    │                     │
//! │  │ (device/dtype)│  │ (candle llama)   │                     │
//! │  └───────────────┘  └──────────────────┘                     │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod device;
pub mod error;
pub mod generator;
pub mod models;
pub mod record;

// Re-exports
pub use config::GeneratorConfig;
pub use device::{DType, Device, HardwareProbe, ResolvedSettings};
pub use error::{Error, Result};
pub use generator::{create_random_seed, Artifact, GenerationRunner, Generator, ModelRegistry, Stage};
pub use models::TextGenerator;
pub use record::{GenerationRecord, RunStatus};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
