//! TOML config loading for the detector CLI.
//!
//! Reads `configs/point_pillar_intermediate.toml`, which has optional
//! `[model]` and `[contrast]` sections, and merges it over the library
//! defaults. CLI flags are applied last.

use std::path::Path;

use anyhow::Context;
use bev_contrast::ContrastConfig;
use pillar_detector::PointPillarIntermediateConfig;
use serde::Deserialize;

/// Top-level structure matching `configs/point_pillar_intermediate.toml`.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DetectorToml {
    #[serde(default)]
    pub model: ModelOverrides,
    #[serde(default)]
    pub contrast: ContrastOverrides,
}

/// Optional overrides for `PointPillarIntermediateConfig`.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelOverrides {
    pub lidar_range: Option<[f32; 6]>,
    pub voxel_size: Option<[f32; 3]>,
    pub anchor_number: Option<usize>,
    /// Output width of the pillar encoder.
    pub pillar_filters: Option<usize>,
    pub layer_nums: Option<Vec<usize>>,
    pub layer_strides: Option<Vec<usize>>,
    pub num_filters: Option<Vec<usize>>,
    pub upsample_strides: Option<Vec<usize>>,
    pub num_upsample_filter: Option<Vec<usize>>,
}

/// Optional overrides for `ContrastConfig`.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContrastOverrides {
    pub feature_dim: Option<usize>,
    pub temperature: Option<f64>,
    pub fallback_loss: Option<f64>,
    pub loss_weight: Option<f64>,
    pub band_low: Option<f64>,
    pub band_high: Option<f64>,
    pub max_noisy_boxes: Option<usize>,
}

/// Contrastive settings that can also be given on the command line.
#[derive(Debug, Default, Clone, Copy)]
pub struct ContrastCliOverrides {
    pub temperature: Option<f64>,
    pub loss_weight: Option<f64>,
}

/// Load and deserialize a `DetectorToml` from a TOML file.
pub fn load_detector_toml(path: &Path) -> anyhow::Result<DetectorToml> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let config: DetectorToml =
        toml::from_str(&contents).with_context(|| format!("Invalid config {}", path.display()))?;
    tracing::info!(path = %path.display(), "Loaded detector config");
    Ok(config)
}

/// Load the TOML at `path`, or use empty overrides when no path is given.
pub fn load_or_default(path: Option<&Path>) -> anyhow::Result<DetectorToml> {
    match path {
        Some(path) => load_detector_toml(path),
        None => {
            tracing::info!("No config file given, using library defaults");
            Ok(DetectorToml::default())
        }
    }
}

/// Build the detector config.
///
/// Priority chain: library defaults < TOML values < CLI flags.
pub fn build_detector_config(toml: &DetectorToml, cli: ContrastCliOverrides) -> PointPillarIntermediateConfig {
    let model = &toml.model;
    let mut config = PointPillarIntermediateConfig::new();

    if let Some(range) = model.lidar_range {
        config.lidar_range = range;
    }
    if let Some(voxel) = model.voxel_size {
        config.voxel_size = voxel;
    }
    if let Some(n) = model.anchor_number {
        config.anchor_number = n;
    }
    if let Some(n) = model.pillar_filters {
        config.pillar_vfe.num_filters = n;
    }
    if let Some(v) = &model.layer_nums {
        config.backbone.layer_nums = v.clone();
    }
    if let Some(v) = &model.layer_strides {
        config.backbone.layer_strides = v.clone();
    }
    if let Some(v) = &model.num_filters {
        config.backbone.num_filters = v.clone();
    }
    if let Some(v) = &model.upsample_strides {
        config.backbone.upsample_strides = v.clone();
    }
    if let Some(v) = &model.num_upsample_filter {
        config.backbone.num_upsample_filter = v.clone();
    }

    config.contrast = build_contrast_config(&toml.contrast, cli);
    config
}

fn build_contrast_config(overrides: &ContrastOverrides, cli: ContrastCliOverrides) -> ContrastConfig {
    let mut config = ContrastConfig::new();

    if let Some(n) = overrides.feature_dim {
        config.feature_dim = n;
    }
    if let Some(t) = overrides.temperature {
        config.temperature = t;
    }
    if let Some(v) = overrides.fallback_loss {
        config.fallback_loss = v;
    }
    if let Some(w) = overrides.loss_weight {
        config.loss_weight = w;
    }
    if let Some(v) = overrides.band_low {
        config.band_low = v;
    }
    if let Some(v) = overrides.band_high {
        config.band_high = v;
    }
    if let Some(n) = overrides.max_noisy_boxes {
        config.max_noisy_boxes = n;
    }

    if let Some(t) = cli.temperature {
        config.temperature = t;
    }
    if let Some(w) = cli.loss_weight {
        config.loss_weight = w;
    }
    config
}
