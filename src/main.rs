//! genrun CLI: run configured generators and inspect device selection

use clap::{Parser, Subcommand};
use genrun_rs::device::{DTypeSetting, DeviceSetting, SystemProbe};
use genrun_rs::{create_random_seed, Error, GeneratorConfig, ModelRegistry, ResolvedSettings, Result};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "genrun")]
#[command(about = "Run generative-model pipelines and record per-run statistics", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a generator described by a config file
    Run {
        /// Path to a .json or .toml config file
        #[arg(short, long)]
        config: PathBuf,

        /// Override the configured device ("detect", "cpu", "cuda:0", ...)
        #[arg(long, env = "GENRUN_DEVICE")]
        device: Option<DeviceSetting>,

        /// Override the configured dtype ("detect", "float32", "bfloat16", ...)
        #[arg(long, env = "GENRUN_DTYPE")]
        dtype: Option<DTypeSetting>,

        /// Override the configured save folder
        #[arg(long, env = "GENRUN_SAVE_FOLDER")]
        save_folder: Option<PathBuf>,

        /// Set a model parameter (KEY=VALUE, VALUE parsed as JSON when possible)
        #[arg(short, long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,
    },

    /// Show the device and dtype a run would use
    Detect {
        #[arg(long, default_value = "detect")]
        device: DeviceSetting,

        #[arg(long, default_value = "detect")]
        dtype: DTypeSetting,
    },

    /// List registered generators
    Models,

    /// Print a random seed
    Seed {
        /// Bit size of the seed range (1-64)
        #[arg(long, default_value = "32")]
        bits: u32,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("genrun_rs=info,genrun=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            device,
            dtype,
            save_folder,
            params,
        } => {
            run_generator(config, device, dtype, save_folder, &params)?;
        }

        Commands::Detect { device, dtype } => {
            let settings = ResolvedSettings::resolve(device, dtype, &SystemProbe);
            println!("device: {}", settings.device);
            println!("dtype:  {}", settings.dtype);
        }

        Commands::Models => {
            let registry = ModelRegistry::with_builtin();
            println!("Registered generators:");
            for name in registry.names() {
                println!("  {}", name);
            }
        }

        Commands::Seed { bits } => {
            println!("{}", create_random_seed(bits)?);
        }
    }

    Ok(())
}

fn run_generator(
    config_path: PathBuf,
    device: Option<DeviceSetting>,
    dtype: Option<DTypeSetting>,
    save_folder: Option<PathBuf>,
    params: &[String],
) -> Result<()> {
    let mut config = GeneratorConfig::from_file(&config_path)?;
    if let Some(device) = device {
        config.device = device;
    }
    if let Some(dtype) = dtype {
        config.dtype = dtype;
    }
    if let Some(save_folder) = save_folder {
        config.save_folder = save_folder;
    }
    for param in params {
        let (key, value) = parse_param(param)?;
        config.params.insert(key, value);
    }

    info!("Running '{}' from {:?}", config.model, config_path);

    let registry = ModelRegistry::with_builtin();
    let mut runner = registry.runner(config)?;
    let saved = runner.generate()?;

    println!("Saved: {}", saved.display());
    println!("{}", serde_json::to_string_pretty(runner.record())?);

    Ok(())
}

fn parse_param(raw: &str) -> Result<(String, serde_json::Value)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| Error::Config(format!("expected KEY=VALUE, got '{}'", raw)))?;
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.trim().to_string(), value))
}
