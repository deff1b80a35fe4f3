//! Llama-family text generation backed by candle

use super::PromptTokenizer;
use crate::config::GeneratorConfig;
use crate::device::ResolvedSettings;
use crate::generator::{create_random_seed, Artifact, Generator};
use crate::record::GenerationRecord;
use crate::{Error, Result};
use candle_core::Tensor;
use candle_nn::VarBuilder;
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::llama::{Cache, Config, Llama, LlamaConfig};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Model-specific `params` for the text generator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextParams {
    /// Prompt to continue
    pub prompt: String,

    /// Maximum number of tokens to generate
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: usize,

    /// Temperature for sampling (0.0 = greedy)
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Top-p (nucleus) sampling threshold
    #[serde(default = "default_top_p")]
    pub top_p: f64,

    /// Repetition penalty (1.0 = disabled)
    #[serde(default = "default_repetition_penalty")]
    pub repetition_penalty: f32,

    /// Window of recent tokens the repetition penalty looks at
    #[serde(default = "default_repeat_last_n")]
    pub repeat_last_n: usize,

    /// Sampling seed; drawn at random when absent
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_max_new_tokens() -> usize {
    256
}
fn default_temperature() -> f64 {
    0.7
}
fn default_top_p() -> f64 {
    0.9
}
fn default_repetition_penalty() -> f32 {
    1.1
}
fn default_repeat_last_n() -> usize {
    64
}

impl TextParams {
    fn validate(&self) -> Result<()> {
        if self.prompt.is_empty() {
            return Err(Error::Config("'prompt' must not be empty".to_string()));
        }
        if self.max_new_tokens == 0 {
            return Err(Error::Config("'max_new_tokens' must be positive".to_string()));
        }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(Error::Config(format!("'top_p' out of range: {}", self.top_p)));
        }
        if self.temperature < 0.0 {
            return Err(Error::Config(format!(
                "'temperature' must not be negative: {}",
                self.temperature
            )));
        }
        Ok(())
    }
}

/// Loaded model, tokenizer and the device they live on
struct TextPipeline {
    model: Llama,
    config: Config,
    tokenizer: PromptTokenizer,
    device: candle_core::Device,
    dtype: candle_core::DType,
}

/// Figures from the last pipeline call, reported in the record
#[derive(Debug, Clone, Copy)]
struct RunStats {
    prompt_tokens: usize,
    tokens_generated: usize,
    elapsed: Duration,
}

/// Generator continuing a prompt with a Llama-family model
pub struct TextGenerator {
    model_path: PathBuf,
    params: TextParams,
    seed: u64,
    pipeline: Option<TextPipeline>,
    last_run: Option<RunStats>,
}

/// Registry constructor
pub(super) fn build(config: &GeneratorConfig) -> Result<Box<dyn Generator>> {
    Ok(Box::new(TextGenerator::from_config(config)?))
}

impl TextGenerator {
    /// Registry name
    pub const NAME: &'static str = "llama";

    /// Parse and validate model params; the model itself loads in `create_pipeline`
    pub fn from_config(config: &GeneratorConfig) -> Result<Self> {
        let params: TextParams = config.params_as()?;
        params.validate()?;

        let seed = match params.seed {
            Some(seed) => seed,
            None => create_random_seed(32)?,
        };
        debug!("Text generator seed: {}", seed);

        Ok(Self {
            model_path: config.model_path.clone(),
            params,
            seed,
            pipeline: None,
            last_run: None,
        })
    }

    pub fn params(&self) -> &TextParams {
        &self.params
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    fn logits_processor(&self) -> LogitsProcessor {
        let temperature = (self.params.temperature > 1e-6).then_some(self.params.temperature);
        let top_p = (self.params.top_p < 1.0).then_some(self.params.top_p);
        LogitsProcessor::new(self.seed, temperature, top_p)
    }
}

/// All `*.safetensors` files in a model directory, sorted
fn safetensors_files(model_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(model_dir)
        .map_err(|e| Error::Config(format!("Cannot read model_path {:?}: {}", model_dir, e)))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().map_or(false, |ext| ext == "safetensors"))
        .collect();

    files.sort();
    if files.is_empty() {
        return Err(Error::Config(format!(
            "No safetensors files found in {:?}",
            model_dir
        )));
    }
    Ok(files)
}

fn load_llama_config(model_dir: &Path) -> Result<Config> {
    let config_path = model_dir.join("config.json");
    let raw = std::fs::read(&config_path)
        .map_err(|e| Error::Config(format!("Failed to read config.json: {}", e)))?;
    let config: LlamaConfig = serde_json::from_slice(&raw)
        .map_err(|e| Error::Config(format!("Failed to parse config.json: {}", e)))?;
    Ok(config.into_config(false))
}

impl Generator for TextGenerator {
    fn create_pipeline(&mut self, settings: &ResolvedSettings) -> Result<()> {
        let model_dir = self.model_path.as_path();
        let config = load_llama_config(model_dir)?;
        let tokenizer = PromptTokenizer::from_dir(model_dir)?;
        let files = safetensors_files(model_dir)?;
        info!("Loading {} safetensors files from {:?}", files.len(), model_dir);

        let device = settings.device.to_candle()?;
        let dtype = settings.dtype.to_candle();
        // SAFETY: weights are memory-mapped read-only and not modified while mapped
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&files, dtype, &device)? };
        let model = Llama::load(vb, &config)?;
        info!(
            "Llama loaded: {} layers, hidden_size={}, on {} as {}",
            config.num_hidden_layers, config.hidden_size, settings.device, settings.dtype
        );

        self.pipeline = Some(TextPipeline {
            model,
            config,
            tokenizer,
            device,
            dtype,
        });
        Ok(())
    }

    fn run_pipeline_impl(&mut self) -> Result<Artifact> {
        let mut logits_processor = self.logits_processor();
        let params = &self.params;
        let pipeline = self
            .pipeline
            .as_ref()
            .ok_or_else(|| Error::Lifecycle("text pipeline has not been created".to_string()))?;

        let start = Instant::now();
        let mut cache = Cache::new(true, pipeline.dtype, &pipeline.config, &pipeline.device)?;
        let mut tokens = pipeline.tokenizer.encode(&params.prompt)?;
        let prompt_tokens = tokens.len();
        let eos = pipeline.tokenizer.eos_token_id();
        info!(
            "Generating up to {} tokens from a {}-token prompt",
            params.max_new_tokens, prompt_tokens
        );

        let pb = ProgressBar::new(params.max_new_tokens as u64);
        pb.set_style(
            ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} tokens")
                .map_err(|e| Error::Generation(e.to_string()))?,
        );

        let mut index_pos = 0;
        for step in 0..params.max_new_tokens {
            let context_size = if step > 0 { 1 } else { tokens.len() };
            let context = &tokens[tokens.len().saturating_sub(context_size)..];
            let input = Tensor::new(context, &pipeline.device)?.unsqueeze(0)?;
            let logits = pipeline.model.forward(&input, index_pos, &mut cache)?.squeeze(0)?;
            index_pos += context.len();

            let logits = if params.repetition_penalty == 1.0 {
                logits
            } else {
                let start_at = tokens.len().saturating_sub(params.repeat_last_n);
                candle_transformers::utils::apply_repeat_penalty(
                    &logits,
                    params.repetition_penalty,
                    &tokens[start_at..],
                )?
            };

            let next_token = logits_processor.sample(&logits)?;
            pb.inc(1);
            if Some(next_token) == eos {
                break;
            }
            tokens.push(next_token);
        }
        pb.finish_and_clear();

        let stats = RunStats {
            prompt_tokens,
            tokens_generated: tokens.len() - prompt_tokens,
            elapsed: start.elapsed(),
        };
        debug!("Text generation stats: {:?}", stats);
        self.last_run = Some(stats);

        let text = pipeline.tokenizer.decode(&tokens)?;
        Ok(Artifact::Text(text))
    }

    fn complete_generation_record_impl(&self, record: &mut GenerationRecord) -> Result<()> {
        record.insert_extra("prompt", &self.params.prompt)?;
        record.insert_extra("seed", self.seed)?;
        record.insert_extra("temperature", self.params.temperature)?;
        record.insert_extra("top_p", self.params.top_p)?;
        record.insert_extra("max_new_tokens", self.params.max_new_tokens)?;

        if let Some(stats) = self.last_run {
            let secs = stats.elapsed.as_secs_f64();
            let tokens_per_second = if secs > 0.0 {
                stats.tokens_generated as f64 / secs
            } else {
                0.0
            };
            record.insert_extra("prompt_tokens", stats.prompt_tokens)?;
            record.insert_extra("tokens_generated", stats.tokens_generated)?;
            record.insert_extra("tokens_per_second", tokens_per_second)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DType, Device};

    fn config() -> GeneratorConfig {
        GeneratorConfig::new(TextGenerator::NAME, "/nonexistent/model", "/tmp/out")
    }

    #[test]
    fn test_params_defaults() {
        let generator = TextGenerator::from_config(&config().with_param("prompt", "Hello")).unwrap();
        let params = generator.params();
        assert_eq!(params.max_new_tokens, 256);
        assert_eq!(params.repeat_last_n, 64);
        assert!(generator.seed() <= u32::MAX as u64);
    }

    #[test]
    fn test_explicit_seed_kept() {
        let generator = TextGenerator::from_config(
            &config().with_param("prompt", "Hello").with_param("seed", 1234),
        )
        .unwrap();
        assert_eq!(generator.seed(), 1234);
    }

    #[test]
    fn test_missing_prompt_fails_at_construction() {
        let err = TextGenerator::from_config(&config()).err().unwrap();
        assert!(err.to_string().contains("prompt"), "{}", err);
    }

    #[test]
    fn test_invalid_params() {
        let cfg = config().with_param("prompt", "Hi").with_param("top_p", 1.5);
        assert!(TextGenerator::from_config(&cfg).is_err());

        let cfg = config().with_param("prompt", "Hi").with_param("max_new_tokens", 0);
        assert!(TextGenerator::from_config(&cfg).is_err());
    }

    #[test]
    fn test_run_before_create() {
        let mut generator = TextGenerator::from_config(&config().with_param("prompt", "Hi")).unwrap();
        assert!(matches!(generator.run_pipeline_impl(), Err(Error::Lifecycle(_))));
    }

    #[test]
    fn test_create_pipeline_without_model_files() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = GeneratorConfig::new(TextGenerator::NAME, dir.path(), "/tmp/out")
            .with_param("prompt", "Hi");
        let mut generator = TextGenerator::from_config(&cfg).unwrap();
        let settings = ResolvedSettings {
            device: Device::Cpu,
            dtype: DType::F32,
        };

        let err = generator.create_pipeline(&settings).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_record_fields_without_run() {
        let generator = TextGenerator::from_config(
            &config().with_param("prompt", "Hi").with_param("seed", 7),
        )
        .unwrap();
        let mut record = GenerationRecord::new();
        generator.complete_generation_record_impl(&mut record).unwrap();

        assert_eq!(record.extra["prompt"], "Hi");
        assert_eq!(record.extra["seed"], 7);
        assert!(!record.extra.contains_key("tokens_generated"));
    }
}
