//! Typed forward-pass input and output records.

use bev_contrast::{boxes_from_tensor, mask_from_tensor, ContrastTargets};
use burn::prelude::*;

use crate::error::DetectorError;

/// Voxelized point clouds of every agent in the batch.
#[derive(Debug, Clone)]
pub struct ProcessedLidar<B: Backend> {
    /// `(P, T, 4)` points per pillar, zero padded to `T`.
    pub voxel_features: Tensor<B, 3>,
    /// `(P, 4)` pillar coordinates `[agent, z, y, x]`.
    pub voxel_coords: Tensor<B, 2, Int>,
    /// `(P,)` real point count per pillar.
    pub voxel_num_points: Tensor<B, 1, Int>,
}

impl<B: Backend> ProcessedLidar<B> {
    fn check(&self) -> Result<(), DetectorError> {
        let [pillars, _, point_features] = self.voxel_features.dims();
        let [coord_rows, coord_cols] = self.voxel_coords.dims();
        let [counts] = self.voxel_num_points.dims();
        if point_features < 3 {
            return Err(DetectorError::Shape(format!(
                "voxel_features needs at least xyz per point, got {point_features} features"
            )));
        }
        if coord_cols != 4 || coord_rows != pillars || counts != pillars {
            return Err(DetectorError::Shape(format!(
                "{pillars} pillars but voxel_coords is {coord_rows}x{coord_cols} and voxel_num_points has {counts}"
            )));
        }
        Ok(())
    }
}

/// One forward call.
///
/// `object_bbx_mask` and `object_bbx_center_noise` are required when
/// `iterative_training` is set and ignored otherwise.
#[derive(Debug, Clone)]
pub struct DetectorInput<B: Backend> {
    pub processed_lidar: ProcessedLidar<B>,
    /// Agents per collaborative sample; sums to the number of agents in `voxel_coords`.
    pub record_len: Vec<usize>,
    pub iterative_training: bool,
    /// `(B, M, 7)` ground-truth boxes.
    pub object_bbx_center: Tensor<B, 3>,
    /// `(B, M)` validity flags, 1 = valid.
    pub object_bbx_mask: Option<Tensor<B, 2>>,
    /// `(B, K, 8)` synthetic boxes with confidence at index 7.
    pub object_bbx_center_noise: Option<Tensor<B, 3>>,
}

impl<B: Backend> DetectorInput<B> {
    /// Input for a standard (non-contrastive) forward pass.
    pub fn standard(
        processed_lidar: ProcessedLidar<B>,
        record_len: Vec<usize>,
        object_bbx_center: Tensor<B, 3>,
    ) -> Self {
        Self {
            processed_lidar,
            record_len,
            iterative_training: false,
            object_bbx_center,
            object_bbx_mask: None,
            object_bbx_center_noise: None,
        }
    }

    /// Input for an iterative-training forward pass.
    pub fn iterative(
        processed_lidar: ProcessedLidar<B>,
        record_len: Vec<usize>,
        object_bbx_center: Tensor<B, 3>,
        object_bbx_mask: Tensor<B, 2>,
        object_bbx_center_noise: Tensor<B, 3>,
    ) -> Self {
        Self {
            processed_lidar,
            record_len,
            iterative_training: true,
            object_bbx_center,
            object_bbx_mask: Some(object_bbx_mask),
            object_bbx_center_noise: Some(object_bbx_center_noise),
        }
    }

    /// Total agents described by `record_len`.
    pub fn num_agents(&self) -> usize {
        self.record_len.iter().sum()
    }

    /// Validate the record and read the contrastive targets to the host.
    ///
    /// Returns `None` in standard mode. In iterative mode every required
    /// field must be present and shape-consistent.
    pub fn validate(&self) -> Result<Option<ContrastTargets>, DetectorError> {
        self.processed_lidar.check()?;
        if self.record_len.is_empty() || self.record_len.contains(&0) {
            return Err(DetectorError::Shape(format!(
                "record_len must list at least one agent per sample, got {:?}",
                self.record_len
            )));
        }
        if !self.iterative_training {
            return Ok(None);
        }

        let mask = self
            .object_bbx_mask
            .clone()
            .ok_or(DetectorError::MissingField("object_bbx_mask"))?;
        let noise = self
            .object_bbx_center_noise
            .clone()
            .ok_or(DetectorError::MissingField("object_bbx_center_noise"))?;

        let [gt_batch, gt_count, _] = self.object_bbx_center.dims();
        let [mask_batch, mask_count] = mask.dims();
        if (mask_batch, mask_count) != (gt_batch, gt_count) {
            return Err(DetectorError::Shape(format!(
                "object_bbx_mask is {mask_batch}x{mask_count}, object_bbx_center is {gt_batch}x{gt_count}"
            )));
        }

        Ok(Some(ContrastTargets {
            gt_boxes: boxes_from_tensor(self.object_bbx_center.clone(), 7)?,
            gt_mask: mask_from_tensor(mask)?,
            noisy_boxes: boxes_from_tensor(noise, 8)?,
        }))
    }
}

/// Detector outputs.
#[derive(Debug, Clone)]
pub struct DetectorOutput<B: Backend> {
    /// `(samples, anchors, H, W)` classification logits.
    pub psm: Tensor<B, 4>,
    /// `(samples, 7 * anchors, H, W)` box regression.
    pub rm: Tensor<B, 4>,
    /// Weighted batch contrastive loss, shape `[1]`; zero in standard mode.
    pub out_contrast_loss: Tensor<B, 1>,
}
