//! Feature extraction from a dense `(C, H, W)` BEV map.
//!
//! Vectors are taken from the channel-wise L2-normalized map, so every
//! sampled feature has unit norm (or is zero where the map is zero).

use burn::prelude::*;

use crate::projection::{project_center, PixelIndex};
use crate::types::{Box3d, ContrastError, PointCloudRange};

/// Lower bound on the per-location norm, matching `F.normalize`'s default.
pub const NORM_EPS: f64 = 1e-12;

/// L2-normalize a `(C, H, W)` map across the channel axis at every location.
pub fn l2_normalize_channels<B: Backend>(map: Tensor<B, 3>) -> Tensor<B, 3> {
    let norm = map
        .clone()
        .powf_scalar(2.0)
        .sum_dim(0)
        .sqrt()
        .clamp_min(NORM_EPS); // (1, H, W)
    map / norm
}

/// Normalize `map` and return the `C`-length vector at `index`.
///
/// Renormalizes the full map on every call. Use [`NormalizedBevMap`] when
/// sampling many locations from the same map.
pub fn sample_feature<B: Backend>(
    map: Tensor<B, 3>,
    index: PixelIndex,
) -> Result<Tensor<B, 1>, ContrastError> {
    NormalizedBevMap::new(map).sample(index)
}

/// A BEV map normalized once, then sampled by pixel index or box center.
#[derive(Debug, Clone)]
pub struct NormalizedBevMap<B: Backend> {
    map: Tensor<B, 3>,
}

impl<B: Backend> NormalizedBevMap<B> {
    pub fn new(map: Tensor<B, 3>) -> Self {
        Self {
            map: l2_normalize_channels(map),
        }
    }

    /// `(channels, height, width)` of the underlying map.
    pub fn dims(&self) -> [usize; 3] {
        self.map.dims()
    }

    /// Feature vector at `map[:, row, col]`.
    pub fn sample(&self, index: PixelIndex) -> Result<Tensor<B, 1>, ContrastError> {
        let [channels, height, width] = self.map.dims();
        if index.row >= height || index.col >= width {
            return Err(ContrastError::OutOfBounds {
                row: index.row as i64,
                col: index.col as i64,
                height,
                width,
            });
        }
        Ok(self
            .map
            .clone()
            .slice([0..channels, index.row..index.row + 1, index.col..index.col + 1])
            .reshape([channels]))
    }

    /// Project the box center into this map and sample there.
    pub fn sample_box(
        &self,
        bbox: &Box3d,
        range: &PointCloudRange,
    ) -> Result<Tensor<B, 1>, ContrastError> {
        let [_, height, width] = self.map.dims();
        let index = project_center(bbox, range, height, width)?;
        self.sample(index)
    }
}
