//! Foreground/background feature pools for one batch element.

use burn::prelude::*;

use crate::config::ContrastConfig;
use crate::sampler::NormalizedBevMap;
use crate::types::{Box3d, ContrastError, PointCloudRange};

/// Feature vectors sampled at confident objects and at ambiguous candidates.
#[derive(Debug, Clone)]
pub struct FeaturePools<B: Backend> {
    /// Vectors at valid ground-truth box centers.
    pub foreground: Vec<Tensor<B, 1>>,
    /// Vectors at noisy boxes whose confidence falls inside the band.
    pub background: Vec<Tensor<B, 1>>,
}

impl<B: Backend> FeaturePools<B> {
    pub fn is_degenerate(&self) -> bool {
        self.foreground.is_empty() || self.background.is_empty()
    }
}

/// True when `confidence` lies strictly inside `(band_low, band_high)`.
pub fn in_background_band(confidence: f32, config: &ContrastConfig) -> bool {
    // Compared at box precision so a stored 0.2 sits on the boundary.
    confidence > config.band_low as f32 && confidence < config.band_high as f32
}

/// Build both pools for one batch element from its `(C, H, W)` feature map.
///
/// Foreground takes every ground-truth box whose `mask` flag is set.
/// Background scans at most `config.max_noisy_boxes` noisy boxes and keeps
/// those with confidence strictly inside the band.
pub fn build_pools<B: Backend>(
    map: Tensor<B, 3>,
    gt_boxes: &[Box3d],
    mask: &[bool],
    noisy_boxes: &[Box3d],
    range: &PointCloudRange,
    config: &ContrastConfig,
) -> Result<FeaturePools<B>, ContrastError> {
    let [channels, _, _] = map.dims();
    if channels != config.feature_dim {
        return Err(ContrastError::FeatureDim {
            expected: config.feature_dim,
            actual: channels,
        });
    }
    if mask.len() != gt_boxes.len() {
        return Err(ContrastError::MaskLength {
            mask: mask.len(),
            boxes: gt_boxes.len(),
        });
    }

    let map = NormalizedBevMap::new(map);

    let mut foreground = Vec::new();
    for (bbox, _) in gt_boxes.iter().zip(mask).filter(|(_, valid)| **valid) {
        foreground.push(map.sample_box(bbox, range)?);
    }

    let mut background = Vec::new();
    for (index, bbox) in noisy_boxes.iter().take(config.max_noisy_boxes).enumerate() {
        let confidence = bbox
            .confidence
            .ok_or(ContrastError::MissingConfidence { index })?;
        if in_background_band(confidence, config) {
            background.push(map.sample_box(bbox, range)?);
        }
    }

    tracing::debug!(
        foreground = foreground.len(),
        background = background.len(),
        scanned = noisy_boxes.len().min(config.max_noisy_boxes),
        "Built contrastive feature pools"
    );

    Ok(FeaturePools {
        foreground,
        background,
    })
}
