//! Batch-level contrastive objective over a `(B, C, H, W)` BEV feature map.

use burn::prelude::*;

use crate::config::ContrastConfig;
use crate::loss::{aggregate_batch_loss, pairwise_contrastive_loss};
use crate::pool::build_pools;
use crate::types::{Box3d, ContrastError, PointCloudRange};

/// Boxes for one training batch, already validated and read to the host.
#[derive(Debug, Clone, Default)]
pub struct ContrastTargets {
    /// Ground-truth boxes per batch element.
    pub gt_boxes: Vec<Vec<Box3d>>,
    /// Validity flag per ground-truth box.
    pub gt_mask: Vec<Vec<bool>>,
    /// Synthetic boxes with confidence per batch element.
    pub noisy_boxes: Vec<Vec<Box3d>>,
}

impl ContrastTargets {
    /// Number of batch elements, taken from the noisy boxes.
    pub fn batch_size(&self) -> usize {
        self.noisy_boxes.len()
    }

    fn validate(&self, feature_batch: usize) -> Result<(), ContrastError> {
        let expected = self.batch_size();
        for (what, actual) in [
            ("gt_boxes", self.gt_boxes.len()),
            ("gt_mask", self.gt_mask.len()),
            ("spatial_features", feature_batch),
        ] {
            if actual != expected {
                return Err(ContrastError::BatchMismatch {
                    what,
                    expected,
                    actual,
                });
            }
        }
        Ok(())
    }
}

/// Weighted batch-average contrastive loss, shape `[1]`.
///
/// Builds pools per batch element, scores each element with
/// [`pairwise_contrastive_loss`], then applies [`aggregate_batch_loss`].
pub fn contrastive_objective<B: Backend>(
    spatial_features: Tensor<B, 4>,
    targets: &ContrastTargets,
    range: &PointCloudRange,
    config: &ContrastConfig,
) -> Result<Tensor<B, 1>, ContrastError> {
    let [batch, channels, height, width] = spatial_features.dims();
    targets.validate(batch)?;
    let device = spatial_features.device();

    let mut losses = Vec::with_capacity(batch);
    for b in 0..batch {
        let map = spatial_features
            .clone()
            .narrow(0, b, 1)
            .reshape([channels, height, width]);
        let pools = build_pools(
            map,
            &targets.gt_boxes[b],
            &targets.gt_mask[b],
            &targets.noisy_boxes[b],
            range,
            config,
        )?;
        losses.push(pairwise_contrastive_loss(&pools, config, &device));
    }

    Ok(aggregate_batch_loss(losses, config, &device))
}
