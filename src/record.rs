//! Per-run generation records
//!
//! A [`GenerationRecord`] accumulates metadata about one run: timing and
//! outcome of the pipeline call, where the artifact was saved, and which
//! model/device/dtype produced it. Generators append their own fields
//! through [`GenerationRecord::insert_extra`]. Records are persisted as one
//! JSON object per line.

use crate::{Error, Result};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Outcome of the timed pipeline call
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Pipeline has not run yet
    #[default]
    Pending,
    /// Pipeline returned an artifact
    Success,
    /// Pipeline returned an error or unwound
    Failed(String),
}

/// Metadata about one generation run
#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerationRecord {
    /// Wall-clock time of the pipeline call
    #[serde(serialize_with = "serialize_secs")]
    pub total_generation_time: Option<Duration>,
    pub status: RunStatus,
    /// Save time, `YYYYMMDDHHMMSS`
    pub timestamp: Option<String>,
    pub filename: Option<String>,
    pub gen_data_file_path: Option<PathBuf>,
    pub model: Option<String>,
    pub device: Option<String>,
    pub dtype: Option<String>,
    /// Model-specific statistics
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn serialize_secs<S: Serializer>(
    duration: &Option<Duration>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match duration {
        Some(d) => serializer.serialize_some(&d.as_secs_f64()),
        None => serializer.serialize_none(),
    }
}

impl GenerationRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a model-specific field
    pub fn insert_extra(&mut self, key: impl Into<String>, value: impl Serialize) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.extra.insert(key.into(), value);
        Ok(())
    }

    /// Append this record as a JSON line to `gen_data_file_path`
    pub fn save_data(&self) -> Result<()> {
        let path = self
            .gen_data_file_path
            .as_ref()
            .ok_or_else(|| Error::missing_key("gen_data_file_path"))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(&line)?;

        info!("Generation record appended to {:?}", path);
        Ok(())
    }
}

/// Scoped timer over the pipeline call
///
/// Duration and status are written into the record when the timer drops,
/// on every exit path. A timer dropped without [`RunTimer::succeed`] or
/// [`RunTimer::fail`] (an early return or a panic) records a failure.
pub struct RunTimer<'a> {
    record: &'a mut GenerationRecord,
    start: Instant,
    outcome: Option<RunStatus>,
}

impl<'a> RunTimer<'a> {
    /// Start timing into `record`
    pub fn start(record: &'a mut GenerationRecord) -> Self {
        record.status = RunStatus::Pending;
        Self {
            record,
            start: Instant::now(),
            outcome: None,
        }
    }

    pub fn succeed(mut self) {
        self.outcome = Some(RunStatus::Success);
    }

    pub fn fail(mut self, message: impl Into<String>) {
        self.outcome = Some(RunStatus::Failed(message.into()));
    }

    /// Record the outcome of `result`
    pub fn finish<T>(self, result: &Result<T>) {
        match result {
            Ok(_) => self.succeed(),
            Err(e) => self.fail(e.to_string()),
        }
    }
}

impl Drop for RunTimer<'_> {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let status = self
            .outcome
            .take()
            .unwrap_or_else(|| RunStatus::Failed("pipeline call did not complete".to_string()));

        match &status {
            RunStatus::Failed(message) => warn!("Pipeline failed after {:.3?}: {}", elapsed, message),
            _ => debug!("Pipeline finished in {:.3?}", elapsed),
        }

        self.record.total_generation_time = Some(elapsed);
        self.record.status = status;
    }
}
