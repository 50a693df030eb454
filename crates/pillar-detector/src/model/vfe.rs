use burn::module::Ignored;
use burn::nn::{BatchNorm, BatchNormConfig, Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::relu;

/// Configuration for the pillar feature encoder.
///
/// Each point is decorated to 10 features `[x, y, z, i, dx_c, dy_c, dz_c,
/// dx_p, dy_p, dz_p]` (offsets to the pillar's point mean and to its
/// geometric center) before a Linear -> BatchNorm -> ReLU layer and a max
/// over the points of the pillar.
#[derive(Config, Debug)]
pub struct PillarVfeConfig {
    /// Output feature width per pillar.
    #[config(default = 64)]
    pub num_filters: usize,
    /// Raw features per point (x, y, z, intensity).
    #[config(default = 4)]
    pub num_point_features: usize,
}

/// Pillar feature net with a single PFN layer.
#[derive(Module, Debug)]
pub struct PillarVfe<B: Backend> {
    linear: Linear<B>,
    norm: BatchNorm<B, 1>,
    voxel_size: Ignored<[f32; 3]>,
    offset: Ignored<[f32; 3]>,
}

impl PillarVfeConfig {
    /// Initialize for the given voxel size and `[x_min, y_min, z_min, ...]` range.
    pub fn init<B: Backend>(
        &self,
        voxel_size: [f32; 3],
        lidar_range: [f32; 6],
        device: &B::Device,
    ) -> PillarVfe<B> {
        let in_features = self.num_point_features + 6;
        let offset = [
            voxel_size[0] / 2.0 + lidar_range[0],
            voxel_size[1] / 2.0 + lidar_range[1],
            voxel_size[2] / 2.0 + lidar_range[2],
        ];
        PillarVfe {
            linear: LinearConfig::new(in_features, self.num_filters)
                .with_bias(false)
                .init(device),
            norm: BatchNormConfig::new(self.num_filters).init(device),
            voxel_size: Ignored(voxel_size),
            offset: Ignored(offset),
        }
    }
}

impl<B: Backend> PillarVfe<B> {
    /// Encode pillars.
    ///
    /// - `voxel_features`: `(P, T, 4)` padded points per pillar
    /// - `voxel_num_points`: `(P,)` real points per pillar
    /// - `voxel_coords`: `(P, 4)` as `[agent, z, y, x]`
    ///
    /// Returns `(P, num_filters)`.
    pub fn forward(
        &self,
        voxel_features: Tensor<B, 3>,
        voxel_num_points: Tensor<B, 1, Int>,
        voxel_coords: Tensor<B, 2, Int>,
    ) -> Tensor<B, 2> {
        let [pillars, max_points, _] = voxel_features.dims();
        let device = voxel_features.device();

        // Zero the padded point slots before any statistic is taken.
        let slots = Tensor::<B, 1, Int>::arange(0..max_points as i64, &device)
            .reshape([1, max_points])
            .repeat_dim(0, pillars);
        let limits = voxel_num_points.clone().reshape([pillars, 1]).repeat_dim(1, max_points);
        let mask = slots.lower(limits).float().reshape([pillars, max_points, 1]);
        let voxel_features = voxel_features * mask.clone();

        let xyz = voxel_features.clone().narrow(2, 0, 3); // (P, T, 3)
        let counts = voxel_num_points.float().reshape([pillars, 1, 1]);
        let mean = xyz.clone().sum_dim(1) / counts.clamp_min(1.0); // (P, 1, 3)
        let f_cluster = xyz.clone() - mean;

        let coords = voxel_coords.float(); // (P, 4)
        let center_axis = |column: usize, axis: usize| {
            coords
                .clone()
                .narrow(1, column, 1)
                .mul_scalar(self.voxel_size.0[axis])
                .add_scalar(self.offset.0[axis])
        };
        let centers = Tensor::cat(vec![center_axis(3, 0), center_axis(2, 1), center_axis(1, 2)], 1)
            .reshape([pillars, 1, 3]);
        let f_center = xyz - centers;

        let features = Tensor::cat(vec![voxel_features, f_cluster, f_center], 2); // (P, T, 10)
        let features = features * mask;

        let x = self.linear.forward(features); // (P, T, F)
        let x = self.norm.forward(x.swap_dims(1, 2)).swap_dims(1, 2);
        let x = relu(x);

        // Max over points on the last axis; ndarray autodiff only supports that for max_dim.
        let [_, _, filters] = x.dims();
        x.swap_dims(1, 2).max_dim(2).reshape([pillars, filters])
    }
}
