use bev_contrast::{contrastive_objective, ContrastConfig, PointCloudRange};
use burn::module::Ignored;
use burn::prelude::*;

use crate::error::DetectorError;
use crate::input::{DetectorInput, DetectorOutput, ProcessedLidar};
use crate::model::{AttBevBackbone, AttBevBackboneConfig, DetectionHeads, PillarVfe, PillarVfeConfig, PointPillarScatter};

/// Configuration for the intermediate-fusion PointPillar detector.
#[derive(Config, Debug)]
pub struct PointPillarIntermediateConfig {
    /// Metric range `[x_min, y_min, z_min, x_max, y_max, z_max]` covered by the BEV grid.
    #[config(default = "[-140.8, -38.4, -3.0, 140.8, 38.4, 1.0]")]
    pub lidar_range: [f32; 6],
    /// Pillar size in metres.
    #[config(default = "[0.4, 0.4, 4.0]")]
    pub voxel_size: [f32; 3],
    /// Anchors per BEV cell.
    #[config(default = 2)]
    pub anchor_number: usize,
    #[config(default = "PillarVfeConfig::new()")]
    pub pillar_vfe: PillarVfeConfig,
    #[config(default = "AttBevBackboneConfig::new()")]
    pub backbone: AttBevBackboneConfig,
    #[config(default = "ContrastConfig::new()")]
    pub contrast: ContrastConfig,
}

impl PointPillarIntermediateConfig {
    /// Build the detector, validating the range and backbone layout.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<PointPillarIntermediate<B>, DetectorError> {
        let range = PointCloudRange::from_array(self.lidar_range)?;
        if self.voxel_size.iter().any(|&v| v <= 0.0) {
            return Err(DetectorError::Shape(format!(
                "voxel_size must be positive, got {:?}",
                self.voxel_size
            )));
        }
        self.contrast.validate();

        let (nx, ny) = PointPillarScatter::grid_size(self.lidar_range, self.voxel_size);
        let backbone_out = self.backbone.output_channels();
        if backbone_out != self.contrast.feature_dim {
            tracing::warn!(
                backbone_out,
                feature_dim = self.contrast.feature_dim,
                "backbone width differs from the contrastive feature dimension; iterative training will fail"
            );
        }

        tracing::info!(
            nx,
            ny,
            backbone_out,
            anchors = self.anchor_number,
            "Initialized PointPillar intermediate-fusion detector"
        );

        Ok(PointPillarIntermediate {
            pillar_vfe: self.pillar_vfe.init(self.voxel_size, self.lidar_range, device),
            scatter: PointPillarScatter::new(self.pillar_vfe.num_filters, nx, ny),
            backbone: self.backbone.init(self.pillar_vfe.num_filters, device)?,
            heads: DetectionHeads::new(backbone_out, self.anchor_number, device),
            range: Ignored(range),
            contrast: Ignored(self.contrast.clone()),
        })
    }
}

/// Collaborative PointPillar detector with an optional contrastive objective.
#[derive(Module, Debug)]
pub struct PointPillarIntermediate<B: Backend> {
    pillar_vfe: PillarVfe<B>,
    scatter: PointPillarScatter,
    backbone: AttBevBackbone<B>,
    heads: DetectionHeads<B>,
    range: Ignored<PointCloudRange>,
    contrast: Ignored<ContrastConfig>,
}

impl<B: Backend> PointPillarIntermediate<B> {
    /// Fused `(samples, C, H, W)` BEV features for the given pillars.
    pub fn spatial_features(
        &self,
        lidar: &ProcessedLidar<B>,
        record_len: &[usize],
    ) -> Result<Tensor<B, 4>, DetectorError> {
        let agents: usize = record_len.iter().sum();
        let pillar_features = self.pillar_vfe.forward(
            lidar.voxel_features.clone(),
            lidar.voxel_num_points.clone(),
            lidar.voxel_coords.clone(),
        );
        let canvas = self
            .scatter
            .forward(pillar_features, lidar.voxel_coords.clone(), agents)?;
        Ok(self.backbone.forward(canvas, record_len))
    }

    /// Forward pass.
    ///
    /// In iterative-training mode the contrastive targets are validated
    /// before any feature extraction runs.
    pub fn forward(&self, input: DetectorInput<B>) -> Result<DetectorOutput<B>, DetectorError> {
        let targets = input.validate()?;
        let spatial = self.spatial_features(&input.processed_lidar, &input.record_len)?;
        let device = spatial.device();

        let out_contrast_loss = match targets {
            Some(targets) => {
                let loss = contrastive_objective(spatial.clone(), &targets, &self.range.0, &self.contrast.0)?;
                tracing::debug!(batch = targets.batch_size(), "Computed contrastive loss");
                loss
            }
            None => Tensor::zeros([1], &device),
        };

        let (psm, rm) = self.heads.forward(spatial);
        Ok(DetectorOutput {
            psm,
            rm,
            out_contrast_loss,
        })
    }

    pub fn range(&self) -> &PointCloudRange {
        &self.range.0
    }

    pub fn contrast_config(&self) -> &ContrastConfig {
        &self.contrast.0
    }

    /// BEV grid as `(nx, ny)` before the backbone.
    pub fn grid_size(&self) -> (usize, usize) {
        (self.scatter.nx(), self.scatter.ny())
    }
}
