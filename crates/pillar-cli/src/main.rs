mod config;
mod pipeline;
mod synthetic;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use config::ContrastCliOverrides;
use pipeline::ForwardArgs;
use synthetic::SceneSpec;

/// pillar-detect: collaborative PointPillar detector with a BEV contrastive objective.
#[derive(Parser)]
#[command(name = "pillar-detect", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one forward pass over a seeded synthetic collaborative scene.
    Forward {
        /// Path to detector config TOML file. Library defaults when omitted.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Weights saved by `init` (path without the `.mpk` extension).
        #[arg(long)]
        weights: Option<PathBuf>,
        /// Compute the contrastive loss (iterative-training mode).
        #[arg(long)]
        iterative: bool,
        /// Agents per collaborative sample, comma separated.
        #[arg(long, value_delimiter = ',', default_values_t = vec![2, 1])]
        record_len: Vec<usize>,
        /// Non-empty pillars per agent.
        #[arg(long, default_value_t = 64)]
        pillars: usize,
        /// Maximum points per pillar.
        #[arg(long, default_value_t = 8)]
        max_points: usize,
        /// Valid ground-truth boxes per sample.
        #[arg(long, default_value_t = 6)]
        gt_boxes: usize,
        /// Noisy boxes per sample.
        #[arg(long, default_value_t = 12)]
        noisy_boxes: usize,
        /// Scene RNG seed.
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Override the contrastive temperature.
        #[arg(long)]
        temperature: Option<f64>,
        /// Override the contrastive loss weight.
        #[arg(long)]
        loss_weight: Option<f64>,
        /// Write the JSON summary here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Initialize detector weights from config and save them.
    Init {
        /// Path to detector config TOML file. Library defaults when omitted.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Output path; `.mpk` weights and `.json` config are written next to it.
        #[arg(long)]
        output: PathBuf,
    },
    /// Print the effective merged configuration.
    ShowConfig {
        /// Path to detector config TOML file. Library defaults when omitted.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Override the contrastive temperature.
        #[arg(long)]
        temperature: Option<f64>,
        /// Override the contrastive loss weight.
        #[arg(long)]
        loss_weight: Option<f64>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Forward {
            config,
            weights,
            iterative,
            record_len,
            pillars,
            max_points,
            gt_boxes,
            noisy_boxes,
            seed,
            temperature,
            loss_weight,
            output,
        } => {
            pipeline::run_forward(ForwardArgs {
                config,
                weights,
                iterative,
                scene: SceneSpec {
                    record_len,
                    pillars_per_agent: pillars,
                    max_points,
                    gt_boxes,
                    noisy_boxes,
                    seed,
                },
                overrides: ContrastCliOverrides {
                    temperature,
                    loss_weight,
                },
                output,
            })?;
        }
        Command::Init { config, output } => pipeline::run_init(config.as_deref(), &output)?,
        Command::ShowConfig {
            config,
            temperature,
            loss_weight,
        } => {
            pipeline::run_show_config(
                config.as_deref(),
                ContrastCliOverrides {
                    temperature,
                    loss_weight,
                },
            )?;
        }
    }

    Ok(())
}
