//! Generation lifecycle
//!
//! Every generator runs the same fixed sequence:
//!
//! ```text
//! Created ─► PipelineReady ─► Executed ─► Saved ─► [StatsSaved] ─► Done
//!   create_pipeline   run_pipeline    save     save_gen_stats
//! ```
//!
//! A concrete model implements [`Generator`] (load the pipeline, run it,
//! add its own record fields). [`GenerationRunner`] owns the sequence and
//! the cross-cutting work: device/dtype resolution, timing, saving the
//! artifact and filling in the [`GenerationRecord`](crate::GenerationRecord).

mod registry;
mod runner;

pub use registry::{GeneratorFactory, ModelRegistry};
pub use runner::{GenerationRunner, Stage};

use crate::device::ResolvedSettings;
use crate::record::GenerationRecord;
use crate::{Error, Result};
use rand::Rng;
use std::path::Path;

/// Output of a pipeline run
#[derive(Debug, Clone)]
pub enum Artifact {
    /// Generated image, saved as PNG
    Image(image::DynamicImage),
    /// Generated text, saved as UTF-8
    Text(String),
}

impl Artifact {
    /// File extension used when saving
    pub fn extension(&self) -> &'static str {
        match self {
            Artifact::Image(_) => "png",
            Artifact::Text(_) => "txt",
        }
    }

    /// Write the artifact to `path`
    pub fn save(&self, path: &Path) -> Result<()> {
        match self {
            Artifact::Image(image) => image.save_with_format(path, image::ImageFormat::Png)?,
            Artifact::Text(text) => std::fs::write(path, text)?,
        }
        Ok(())
    }
}

/// Model-specific steps of the generation lifecycle
pub trait Generator {
    /// Load the model onto the resolved device with the resolved dtype
    fn create_pipeline(&mut self, settings: &ResolvedSettings) -> Result<()>;

    /// Run inference on the loaded pipeline
    fn run_pipeline_impl(&mut self) -> Result<Artifact>;

    /// Add model-specific statistics to the record
    fn complete_generation_record_impl(&self, _record: &mut GenerationRecord) -> Result<()> {
        Ok(())
    }
}

impl<G: Generator + ?Sized> Generator for Box<G> {
    fn create_pipeline(&mut self, settings: &ResolvedSettings) -> Result<()> {
        (**self).create_pipeline(settings)
    }

    fn run_pipeline_impl(&mut self) -> Result<Artifact> {
        (**self).run_pipeline_impl()
    }

    fn complete_generation_record_impl(&self, record: &mut GenerationRecord) -> Result<()> {
        (**self).complete_generation_record_impl(record)
    }
}

/// Random seed uniformly drawn from `[0, 2^size - 1]`
///
/// `size` is a bit count and must be in `1..=64`.
pub fn create_random_seed(size: u32) -> Result<u64> {
    if size == 0 || size > 64 {
        return Err(Error::InvalidSeedSize(size));
    }
    let max = u64::MAX >> (64 - size);
    Ok(rand::rng().random_range(0..=max))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_within_range() {
        for size in [1u32, 2, 7, 16, 32, 63] {
            let max = (1u64 << size) - 1;
            for _ in 0..200 {
                assert!(create_random_seed(size).unwrap() <= max);
            }
        }
        // full range is accepted
        create_random_seed(64).unwrap();
    }

    #[test]
    fn test_one_bit_seed() {
        let mut seen = [false; 2];
        for _ in 0..500 {
            let seed = create_random_seed(1).unwrap();
            assert!(seed <= 1);
            seen[seed as usize] = true;
        }
        assert!(seen[0] && seen[1]);
    }

    #[test]
    fn test_invalid_seed_size() {
        assert!(matches!(create_random_seed(0), Err(Error::InvalidSeedSize(0))));
        assert!(matches!(create_random_seed(65), Err(Error::InvalidSeedSize(65))));
    }

    #[test]
    fn test_artifact_extension_and_save() {
        let dir = tempfile::tempdir().unwrap();

        let text = Artifact::Text("hello".to_string());
        assert_eq!(text.extension(), "txt");
        let path = dir.path().join("out.txt");
        text.save(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");

        let image = Artifact::Image(image::DynamicImage::new_rgb8(2, 2));
        assert_eq!(image.extension(), "png");
        let path = dir.path().join("out.png");
        image.save(&path).unwrap();
        assert!(image::open(&path).is_ok());
    }
}
