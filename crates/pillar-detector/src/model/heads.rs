use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::prelude::*;

/// 1x1 classification and regression heads over the fused BEV map.
///
/// `psm` has one channel per anchor; `rm` has 7 box parameters per anchor.
#[derive(Module, Debug)]
pub struct DetectionHeads<B: Backend> {
    cls_head: Conv2d<B>,
    reg_head: Conv2d<B>,
}

impl<B: Backend> DetectionHeads<B> {
    pub fn new(in_channels: usize, anchor_number: usize, device: &B::Device) -> Self {
        Self {
            cls_head: Conv2dConfig::new([in_channels, anchor_number], [1, 1]).init(device),
            reg_head: Conv2dConfig::new([in_channels, 7 * anchor_number], [1, 1]).init(device),
        }
    }

    /// Returns `(psm, rm)`.
    pub fn forward(&self, spatial_features: Tensor<B, 4>) -> (Tensor<B, 4>, Tensor<B, 4>) {
        let psm = self.cls_head.forward(spatial_features.clone());
        let rm = self.reg_head.forward(spatial_features);
        (psm, rm)
    }
}
