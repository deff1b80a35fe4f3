//! Orchestrates the fixed generation sequence around a [`Generator`]

use super::{Artifact, Generator};
use crate::config::GeneratorConfig;
use crate::device::{HardwareProbe, ResolvedSettings, SystemProbe};
use crate::record::{GenerationRecord, RunTimer};
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Save timestamp format, e.g. `20250131235959`
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Lifecycle position of a runner
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Created,
    PipelineReady,
    Executed,
    Saved,
    StatsSaved,
    Done,
}

/// Drives one generator through create → run → save → record
///
/// The runner owns the generator, its configuration, the resolved
/// device/dtype, the produced artifact and the generation record. One
/// runner serves one run; parallel runs each get their own.
pub struct GenerationRunner<G = Box<dyn Generator>> {
    config: GeneratorConfig,
    generator: G,
    probe: Box<dyn HardwareProbe>,
    settings: Option<ResolvedSettings>,
    record: GenerationRecord,
    output: Option<Artifact>,
    save_timestamp: Option<String>,
    saved_path: Option<PathBuf>,
    stage: Stage,
}

impl<G: Generator> GenerationRunner<G> {
    /// Wrap a generator built from `config`
    pub fn new(config: GeneratorConfig, generator: G) -> Self {
        Self {
            config,
            generator,
            probe: Box::new(SystemProbe),
            settings: None,
            record: GenerationRecord::new(),
            output: None,
            save_timestamp: None,
            saved_path: None,
            stage: Stage::Created,
        }
    }

    /// Replace the hardware probe used by device detection
    pub fn with_probe(mut self, probe: impl HardwareProbe + 'static) -> Self {
        self.probe = Box::new(probe);
        self
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    pub fn record(&self) -> &GenerationRecord {
        &self.record
    }

    pub fn output(&self) -> Option<&Artifact> {
        self.output.as_ref()
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Resolved device/dtype, once detection has run
    pub fn settings(&self) -> Option<ResolvedSettings> {
        self.settings
    }

    /// Path of the last saved artifact
    pub fn saved_path(&self) -> Option<&Path> {
        self.saved_path.as_deref()
    }

    /// Resolve device and dtype from configuration and hardware
    pub fn detect_device_and_dtype(&mut self) -> ResolvedSettings {
        let settings =
            ResolvedSettings::resolve(self.config.device, self.config.dtype, self.probe.as_ref());
        self.settings = Some(settings);
        settings
    }

    /// Load the pipeline, resolving device/dtype first if needed
    pub fn create_pipeline(&mut self) -> Result<()> {
        self.expect_stage(Stage::Created, "create_pipeline")?;

        let settings = match self.settings {
            Some(settings) => settings,
            None => self.detect_device_and_dtype(),
        };

        info!(
            "Creating pipeline for '{}' from {:?}",
            self.config.model, self.config.model_path
        );
        self.generator.create_pipeline(&settings)?;
        self.stage = Stage::PipelineReady;
        Ok(())
    }

    /// Run the pipeline, recording duration and outcome on every exit path
    pub fn run_pipeline(&mut self) -> Result<()> {
        self.expect_stage(Stage::PipelineReady, "run_pipeline")?;

        let timer = RunTimer::start(&mut self.record);
        let result = self.generator.run_pipeline_impl();
        timer.finish(&result);

        let artifact = result?;
        info!(
            "Pipeline produced {} artifact in {:.3?}",
            artifact.extension(),
            self.record.total_generation_time.unwrap_or_default()
        );

        self.output = Some(artifact);
        self.stage = Stage::Executed;
        Ok(())
    }

    /// Write the artifact to `<save_folder>/<YYYYMMDDHHMMSS>.<ext>`
    ///
    /// The artifact stays in the runner, so a failed save can be retried.
    pub fn save(&mut self) -> Result<PathBuf> {
        let artifact = self
            .output
            .as_ref()
            .ok_or_else(|| out_of_order("save", self.stage))?;

        let timestamp = chrono::Local::now().format(TIMESTAMP_FORMAT).to_string();
        let file_name = format!("{}.{}", timestamp, artifact.extension());
        let save_path = self.config.save_folder.join(&file_name);

        std::fs::create_dir_all(&self.config.save_folder)?;
        artifact.save(&save_path)?;
        info!("Saved artifact to {:?}", save_path);

        self.save_timestamp = Some(timestamp);
        self.saved_path = Some(save_path.clone());
        self.stage = self.stage.max(Stage::Saved);
        Ok(save_path)
    }

    /// Fill the record from configuration, resolved settings and the save step
    pub fn complete_generation_record(&mut self) -> Result<()> {
        let (Some(timestamp), Some(saved_path), Some(settings)) =
            (&self.save_timestamp, &self.saved_path, self.settings)
        else {
            return Err(out_of_order("complete_generation_record", self.stage));
        };

        let record = &mut self.record;
        record.gen_data_file_path = self.config.gen_data_file_path.clone();
        record.filename = saved_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
        record.timestamp = Some(timestamp.clone());
        record.model = Some(self.config.model.clone());
        record.device = Some(settings.device.to_string());
        record.dtype = Some(settings.dtype.name().to_string());

        self.generator.complete_generation_record_impl(record)?;
        debug!("Generation record completed: {:?}", record);
        Ok(())
    }

    /// Complete the record and append it to the data file
    pub fn save_gen_stats(&mut self) -> Result<()> {
        self.complete_generation_record()?;
        self.record.save_data()?;
        self.stage = self.stage.max(Stage::StatsSaved);
        Ok(())
    }

    /// Run the whole sequence; any failing step aborts the rest
    pub fn generate(&mut self) -> Result<PathBuf> {
        self.create_pipeline()?;
        self.run_pipeline()?;
        let path = self.save()?;

        if self.config.save_gen_stats {
            self.save_gen_stats()?;
        } else {
            self.complete_generation_record()?;
        }

        self.stage = Stage::Done;
        Ok(path)
    }

    fn expect_stage(&self, expected: Stage, op: &str) -> Result<()> {
        if self.stage == expected {
            Ok(())
        } else {
            Err(out_of_order(op, self.stage))
        }
    }
}

fn out_of_order(op: &str, stage: Stage) -> Error {
    Error::Lifecycle(format!("{} is not valid at stage {:?}", op, stage))
}
