//! Subcommand implementations.

use std::path::{Path, PathBuf};

use burn::backend::ndarray::NdArray;
use burn::module::Module;
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::ElementConversion;
use pillar_detector::{PointPillarIntermediate, PointPillarIntermediateConfig};
use serde::Serialize;

use crate::config::{build_detector_config, load_or_default, ContrastCliOverrides};
use crate::synthetic::{generate, SceneSpec};

pub type CliBackend = NdArray<f32>;

/// Arguments for the `forward` subcommand.
#[derive(Debug)]
pub struct ForwardArgs {
    pub config: Option<PathBuf>,
    pub weights: Option<PathBuf>,
    pub iterative: bool,
    pub scene: SceneSpec,
    pub overrides: ContrastCliOverrides,
    pub output: Option<PathBuf>,
}

/// JSON summary of one forward pass.
#[derive(Debug, Serialize)]
pub struct ForwardSummary {
    pub mode: &'static str,
    pub samples: usize,
    pub agents: usize,
    pub pillars: usize,
    pub grid: [usize; 2],
    pub psm_shape: [usize; 4],
    pub rm_shape: [usize; 4],
    pub contrast_loss: f32,
}

fn load_config(path: Option<&Path>, overrides: ContrastCliOverrides) -> anyhow::Result<PointPillarIntermediateConfig> {
    let toml = load_or_default(path)?;
    Ok(build_detector_config(&toml, overrides))
}

/// Build a detector and optionally load saved weights over it.
pub fn load_model(
    config: &PointPillarIntermediateConfig,
    weights: Option<&Path>,
    device: &<CliBackend as Backend>::Device,
) -> anyhow::Result<PointPillarIntermediate<CliBackend>> {
    let model = config.init::<CliBackend>(device)?;
    let Some(path) = weights else {
        return Ok(model);
    };
    let model = model
        .load_file(path, &NamedMpkFileRecorder::<FullPrecisionSettings>::new(), device)
        .map_err(|e| anyhow::anyhow!("Failed to load weights from {}: {e}", path.display()))?;
    tracing::info!(path = %path.display(), "Loaded detector weights");
    Ok(model)
}

/// Run one forward pass over a synthetic scene.
pub fn run_forward(args: ForwardArgs) -> anyhow::Result<ForwardSummary> {
    let config = load_config(args.config.as_deref(), args.overrides)?;
    let device = Default::default();
    let model = load_model(&config, args.weights.as_deref(), &device)?;

    let scene = generate::<CliBackend>(&args.scene, &config, &device);
    let pillars = scene.pillars();
    let input = scene.into_input(args.iterative);
    let agents = input.num_agents();
    let samples = input.record_len.len();

    let output = model.forward(input)?;
    let contrast_loss: f32 = output.out_contrast_loss.into_scalar().elem();
    let (nx, ny) = model.grid_size();

    let summary = ForwardSummary {
        mode: if args.iterative { "iterative" } else { "standard" },
        samples,
        agents,
        pillars,
        grid: [ny, nx],
        psm_shape: output.psm.dims(),
        rm_shape: output.rm.dims(),
        contrast_loss,
    };
    tracing::info!(
        mode = summary.mode,
        samples,
        agents,
        pillars,
        contrast_loss,
        "Forward pass complete"
    );

    let json = serde_json::to_string_pretty(&summary)?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, &json)?;
            tracing::info!(path = %path.display(), "Wrote forward summary");
        }
        None => println!("{json}"),
    }
    Ok(summary)
}

/// Initialize weights from config and save them next to the merged config.
///
/// Writes `<output>.mpk` and `<output>.json`.
pub fn run_init(config_path: Option<&Path>, output: &Path) -> anyhow::Result<()> {
    let config = load_config(config_path, ContrastCliOverrides::default())?;
    let device = Default::default();
    let model = config.init::<CliBackend>(&device)?;
    let params = model.num_params();

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    model
        .save_file(output, &NamedMpkFileRecorder::<FullPrecisionSettings>::new())
        .map_err(|e| anyhow::anyhow!("Failed to save weights to {}: {e}", output.display()))?;

    let config_out = output.with_extension("json");
    std::fs::write(&config_out, serde_json::to_string_pretty(&config)?)?;

    tracing::info!(
        weights = %output.display(),
        config = %config_out.display(),
        params,
        "Saved initialized detector"
    );
    Ok(())
}

/// Print the effective merged configuration as JSON.
pub fn run_show_config(config_path: Option<&Path>, overrides: ContrastCliOverrides) -> anyhow::Result<String> {
    let config = load_config(config_path, overrides)?;
    let json = serde_json::to_string_pretty(&config)?;
    println!("{json}");
    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL_TOML: &str = r#"
[model]
lidar_range = [-8.0, -8.0, -3.0, 8.0, 8.0, 1.0]
voxel_size = [0.5, 0.5, 4.0]
layer_nums = [1, 1, 1]
num_filters = [16, 32, 64]
"#;

    fn small_config_file(dir: &Path) -> PathBuf {
        let path = dir.join("small.toml");
        std::fs::write(&path, SMALL_TOML).unwrap();
        path
    }

    fn small_scene() -> SceneSpec {
        SceneSpec {
            pillars_per_agent: 16,
            max_points: 4,
            ..SceneSpec::default()
        }
    }

    #[test]
    fn test_forward_standard_summary() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("summary.json");
        let summary = run_forward(ForwardArgs {
            config: Some(small_config_file(dir.path())),
            weights: None,
            iterative: false,
            scene: small_scene(),
            overrides: ContrastCliOverrides::default(),
            output: Some(out.clone()),
        })
        .unwrap();

        assert_eq!(summary.mode, "standard");
        assert_eq!(summary.samples, 2);
        assert_eq!(summary.agents, 3);
        assert_eq!(summary.pillars, 48);
        assert_eq!(summary.grid, [32, 32]);
        assert_eq!(summary.psm_shape, [2, 2, 16, 16]);
        assert_eq!(summary.rm_shape, [2, 14, 16, 16]);
        assert_eq!(summary.contrast_loss, 0.0);

        let written: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(out).unwrap()).unwrap();
        assert_eq!(written["mode"], "standard");
    }

    #[test]
    fn test_forward_iterative_reports_loss() {
        let dir = tempfile::tempdir().unwrap();
        let summary = run_forward(ForwardArgs {
            config: Some(small_config_file(dir.path())),
            weights: None,
            iterative: true,
            scene: small_scene(),
            overrides: ContrastCliOverrides::default(),
            output: Some(dir.path().join("summary.json")),
        })
        .unwrap();

        assert_eq!(summary.mode, "iterative");
        assert!(summary.contrast_loss.is_finite());
        assert!(summary.contrast_loss > 0.0);
    }

    #[test]
    fn test_init_then_load_weights() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = small_config_file(dir.path());
        let weights = dir.path().join("ckpt").join("detector");
        run_init(Some(&config_path), &weights).unwrap();

        assert!(weights.with_extension("mpk").exists());
        assert!(weights.with_extension("json").exists());

        let config = load_config(Some(&config_path), ContrastCliOverrides::default()).unwrap();
        let device = Default::default();
        let model = load_model(&config, Some(&weights), &device).unwrap();
        assert_eq!(model.grid_size(), (32, 32));
    }

    #[test]
    fn test_load_missing_weights_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(Some(&small_config_file(dir.path())), ContrastCliOverrides::default()).unwrap();
        let device = Default::default();
        let err = load_model(&config, Some(&dir.path().join("absent")), &device).unwrap_err();
        assert!(err.to_string().contains("Failed to load weights"));
    }

    #[test]
    fn test_show_config_merges_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let overrides = ContrastCliOverrides {
            temperature: Some(0.2),
            loss_weight: None,
        };
        let json = run_show_config(Some(&small_config_file(dir.path())), overrides).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["contrast"]["temperature"], 0.2);
        assert_eq!(value["backbone"]["layer_nums"], serde_json::json!([1, 1, 1]));
    }
}
