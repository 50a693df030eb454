//! Seeded synthetic collaborative scenes for smoke-testing the detector.

use burn::prelude::*;
use burn::tensor::TensorData;
use pillar_detector::model::PointPillarScatter;
use pillar_detector::{DetectorInput, PointPillarIntermediateConfig, ProcessedLidar};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Shape of a generated scene.
#[derive(Debug, Clone)]
pub struct SceneSpec {
    /// Agents per collaborative sample.
    pub record_len: Vec<usize>,
    pub pillars_per_agent: usize,
    pub max_points: usize,
    /// Valid ground-truth boxes per sample; two zero padding rows follow.
    pub gt_boxes: usize,
    pub noisy_boxes: usize,
    pub seed: u64,
}

impl Default for SceneSpec {
    fn default() -> Self {
        Self {
            record_len: vec![2, 1],
            pillars_per_agent: 64,
            max_points: 8,
            gt_boxes: 6,
            noisy_boxes: 12,
            seed: 42,
        }
    }
}

/// Generated tensors, before being packed into a `DetectorInput`.
#[derive(Debug, Clone)]
pub struct SyntheticScene<B: Backend> {
    pub lidar: ProcessedLidar<B>,
    pub record_len: Vec<usize>,
    /// `(samples, gt_boxes + 2, 7)`.
    pub gt_boxes: Tensor<B, 3>,
    /// `(samples, gt_boxes + 2)`.
    pub gt_mask: Tensor<B, 2>,
    /// `(samples, noisy_boxes, 8)`, confidence uniform in `[0, 1)`.
    pub noisy_boxes: Tensor<B, 3>,
}

impl<B: Backend> SyntheticScene<B> {
    pub fn pillars(&self) -> usize {
        self.lidar.voxel_features.dims()[0]
    }

    pub fn into_input(self, iterative: bool) -> DetectorInput<B> {
        if iterative {
            DetectorInput::iterative(
                self.lidar,
                self.record_len,
                self.gt_boxes,
                self.gt_mask,
                self.noisy_boxes,
            )
        } else {
            DetectorInput::standard(self.lidar, self.record_len, self.gt_boxes)
        }
    }
}

const GT_PADDING: usize = 2;

/// Generate a scene that fits the grid and range of `config`.
pub fn generate<B: Backend>(
    spec: &SceneSpec,
    config: &PointPillarIntermediateConfig,
    device: &B::Device,
) -> SyntheticScene<B> {
    let mut rng = StdRng::seed_from_u64(spec.seed);
    let range = config.lidar_range;
    let voxel = config.voxel_size;
    let (nx, ny) = PointPillarScatter::grid_size(range, voxel);
    let point_features = config.pillar_vfe.num_point_features;
    let max_points = spec.max_points.max(1);
    let per_agent = spec.pillars_per_agent.clamp(1, nx * ny);
    let agents: usize = spec.record_len.iter().sum();

    let mut features = Vec::new();
    let mut coords = Vec::new();
    let mut counts = Vec::new();
    for agent in 0..agents {
        for cell in rand::seq::index::sample(&mut rng, nx * ny, per_agent) {
            let (y, x) = (cell / nx, cell % nx);
            let n = rng.gen_range(1..=max_points);
            for p in 0..max_points {
                for f in 0..point_features {
                    let v = if p >= n {
                        0.0
                    } else {
                        match f {
                            0 => range[0] + (x as f32 + rng.gen::<f32>()) * voxel[0],
                            1 => range[1] + (y as f32 + rng.gen::<f32>()) * voxel[1],
                            2 => rng.gen_range(range[2]..range[5]),
                            _ => rng.gen::<f32>(),
                        }
                    };
                    features.push(v);
                }
            }
            coords.extend_from_slice(&[agent as i64, 0, y as i64, x as i64]);
            counts.push(n as i64);
        }
    }
    let pillars = counts.len();

    let samples = spec.record_len.len();
    let gt_rows = spec.gt_boxes + GT_PADDING;
    let mut gt = Vec::with_capacity(samples * gt_rows * 7);
    let mut mask = Vec::with_capacity(samples * gt_rows);
    let mut noisy = Vec::with_capacity(samples * spec.noisy_boxes * 8);
    for _ in 0..samples {
        for row in 0..gt_rows {
            if row < spec.gt_boxes {
                gt.extend_from_slice(&random_box(&mut rng, range, voxel));
                mask.push(1.0);
            } else {
                gt.extend_from_slice(&[0.0; 7]);
                mask.push(0.0);
            }
        }
        for _ in 0..spec.noisy_boxes {
            noisy.extend_from_slice(&random_box(&mut rng, range, voxel));
            noisy.push(rng.gen::<f32>());
        }
    }

    tracing::debug!(agents, pillars, samples, seed = spec.seed, "Generated synthetic scene");

    SyntheticScene {
        lidar: ProcessedLidar {
            voxel_features: Tensor::from_data(TensorData::new(features, [pillars, max_points, point_features]), device),
            voxel_coords: Tensor::from_data(TensorData::new(coords, [pillars, 4]), device),
            voxel_num_points: Tensor::from_data(TensorData::new(counts, [pillars]), device),
        },
        record_len: spec.record_len.clone(),
        gt_boxes: Tensor::from_data(TensorData::new(gt, [samples, gt_rows, 7]), device),
        gt_mask: Tensor::from_data(TensorData::new(mask, [samples, gt_rows]), device),
        noisy_boxes: Tensor::from_data(TensorData::new(noisy, [samples, spec.noisy_boxes, 8]), device),
    }
}

/// Car-sized box whose center stays at least one pillar inside the range.
fn random_box(rng: &mut StdRng, range: [f32; 6], voxel: [f32; 3]) -> [f32; 7] {
    [
        rng.gen_range(range[0] + voxel[0]..range[3] - voxel[0]),
        rng.gen_range(range[1] + voxel[1]..range[4] - voxel[1]),
        rng.gen_range(-1.8..-0.8),
        rng.gen_range(1.4..1.8),
        rng.gen_range(1.6..2.0),
        rng.gen_range(3.8..4.8),
        rng.gen_range(-std::f32::consts::PI..std::f32::consts::PI),
    ]
}
