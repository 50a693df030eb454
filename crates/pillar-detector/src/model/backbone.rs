use burn::nn::conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, PaddingConfig2d};
use burn::prelude::*;
use burn::tensor::activation::{relu, softmax};

use crate::error::DetectorError;

/// Configuration for the multi-scale BEV backbone with attention fusion.
///
/// ```text
/// (agents, C_in, H, W)
///   -> block_i: conv3x3(stride s_i) + (layer_nums[i] x conv3x3), BN + ReLU each
///   -> attention fusion over the agents of each sample (ego row kept)
///   -> deconv(upsample_strides[i]) + BN + ReLU
///   -> concat over scales -> (samples, sum(num_upsample_filter), H / s_0, W / s_0)
/// ```
#[derive(Config, Debug)]
pub struct AttBevBackboneConfig {
    /// Extra 3x3 conv layers after the strided conv of each block.
    #[config(default = "vec![3, 5, 8]")]
    pub layer_nums: Vec<usize>,
    /// Stride of the first conv in each block.
    #[config(default = "vec![2, 2, 2]")]
    pub layer_strides: Vec<usize>,
    /// Output channels of each block.
    #[config(default = "vec![64, 128, 256]")]
    pub num_filters: Vec<usize>,
    /// Transposed-conv stride that brings each block back to the first block's resolution.
    #[config(default = "vec![1, 2, 4]")]
    pub upsample_strides: Vec<usize>,
    /// Output channels of each upsampling branch.
    #[config(default = "vec![128, 128, 128]")]
    pub num_upsample_filter: Vec<usize>,
}

impl AttBevBackboneConfig {
    /// Channel width of the concatenated output.
    pub fn output_channels(&self) -> usize {
        self.num_upsample_filter.iter().sum()
    }

    fn check(&self) -> Result<(), DetectorError> {
        let n = self.layer_nums.len();
        let lens = [
            self.layer_strides.len(),
            self.num_filters.len(),
            self.upsample_strides.len(),
            self.num_upsample_filter.len(),
        ];
        if n == 0 || lens.iter().any(|&l| l != n) {
            return Err(DetectorError::Shape(format!(
                "backbone lists must be non-empty and equally long, got layer_nums={n} and {lens:?}"
            )));
        }
        if self.layer_strides.iter().chain(&self.upsample_strides).any(|&s| s == 0) {
            return Err(DetectorError::Shape("backbone strides must be positive".into()));
        }
        Ok(())
    }

    /// Initialize for `input_channels` scattered pillar features.
    pub fn init<B: Backend>(
        &self,
        input_channels: usize,
        device: &B::Device,
    ) -> Result<AttBevBackbone<B>, DetectorError> {
        self.check()?;

        let mut blocks = Vec::with_capacity(self.layer_nums.len());
        let mut deblocks = Vec::with_capacity(self.layer_nums.len());
        let mut in_channels = input_channels;
        for i in 0..self.layer_nums.len() {
            let out = self.num_filters[i];
            let mut layers = vec![ConvBnRelu::new(in_channels, out, 3, self.layer_strides[i], device)];
            for _ in 0..self.layer_nums[i] {
                layers.push(ConvBnRelu::new(out, out, 3, 1, device));
            }
            blocks.push(DownBlock { layers });
            deblocks.push(UpBlock::new(out, self.num_upsample_filter[i], self.upsample_strides[i], device));
            in_channels = out;
        }

        Ok(AttBevBackbone { blocks, deblocks })
    }
}

#[derive(Module, Debug)]
pub struct ConvBnRelu<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
}

impl<B: Backend> ConvBnRelu<B> {
    fn new(in_channels: usize, out_channels: usize, kernel: usize, stride: usize, device: &B::Device) -> Self {
        let padding = kernel / 2;
        Self {
            conv: Conv2dConfig::new([in_channels, out_channels], [kernel, kernel])
                .with_stride([stride, stride])
                .with_padding(PaddingConfig2d::Explicit(padding, padding))
                .with_bias(false)
                .init(device),
            bn: BatchNormConfig::new(out_channels).init(device),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        relu(self.bn.forward(self.conv.forward(x)))
    }
}

#[derive(Module, Debug)]
pub struct DownBlock<B: Backend> {
    layers: Vec<ConvBnRelu<B>>,
}

impl<B: Backend> DownBlock<B> {
    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.layers.iter().fold(x, |x, layer| layer.forward(x))
    }
}

#[derive(Module, Debug)]
pub struct UpBlock<B: Backend> {
    deconv: ConvTranspose2d<B>,
    bn: BatchNorm<B, 2>,
}

impl<B: Backend> UpBlock<B> {
    fn new(in_channels: usize, out_channels: usize, stride: usize, device: &B::Device) -> Self {
        Self {
            deconv: ConvTranspose2dConfig::new([in_channels, out_channels], [stride, stride])
                .with_stride([stride, stride])
                .with_bias(false)
                .init(device),
            bn: BatchNormConfig::new(out_channels).init(device),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        relu(self.bn.forward(self.deconv.forward(x)))
    }
}

/// Fuse the agents of each collaborative sample with per-cell scaled
/// dot-product attention and keep the ego (first) agent's row.
///
/// `x`: `(agents, C, H, W)` with agents grouped by `record_len`.
/// Returns `(record_len.len(), C, H, W)`.
pub fn attention_fusion<B: Backend>(x: Tensor<B, 4>, record_len: &[usize]) -> Tensor<B, 4> {
    let [_, channels, height, width] = x.dims();
    let cells = height * width;
    let scale = (channels as f64).sqrt();

    let mut fused = Vec::with_capacity(record_len.len());
    let mut start = 0;
    for &agents in record_len {
        let group = x
            .clone()
            .narrow(0, start, agents)
            .reshape([agents, channels, cells])
            .permute([2, 0, 1]); // (HW, N, C)
        start += agents;

        let score = group.clone().matmul(group.clone().swap_dims(1, 2)).div_scalar(scale); // (HW, N, N)
        let context = softmax(score, 2).matmul(group); // (HW, N, C)
        let ego = context
            .narrow(1, 0, 1)
            .reshape([cells, channels])
            .swap_dims(0, 1)
            .reshape([1, channels, height, width]);
        fused.push(ego);
    }
    Tensor::cat(fused, 0)
}

/// Multi-scale BEV backbone with per-scale attention fusion across agents.
#[derive(Module, Debug)]
pub struct AttBevBackbone<B: Backend> {
    blocks: Vec<DownBlock<B>>,
    deblocks: Vec<UpBlock<B>>,
}

impl<B: Backend> AttBevBackbone<B> {
    /// `spatial_features`: `(agents, C_in, H, W)`; returns the fused
    /// `(samples, C_out, H', W')` map.
    pub fn forward(&self, spatial_features: Tensor<B, 4>, record_len: &[usize]) -> Tensor<B, 4> {
        let mut x = spatial_features;
        let mut ups = Vec::with_capacity(self.blocks.len());
        for (block, deblock) in self.blocks.iter().zip(&self.deblocks) {
            x = block.forward(x);
            let fused = attention_fusion(x.clone(), record_len);
            ups.push(deblock.forward(fused));
        }
        Tensor::cat(ups, 1)
    }
}
