use burn::prelude::*;

/// Constants of the BEV contrastive objective.
///
/// Defaults match the usual training setup: 384-dim features
/// (3 backbone scales x 128 channels), temperature 0.07, background band
/// `(0.2, 0.8)`, at most 100 noisy boxes scanned per sample, a 0.1 fallback
/// for samples without usable pairs and a 0.1 weight on the batch average.
#[derive(Config, Debug)]
pub struct ContrastConfig {
    /// Channel count of the spatial feature map being sampled.
    #[config(default = 384)]
    pub feature_dim: usize,
    /// Logits are divided by this value before cross-entropy.
    #[config(default = 0.07)]
    pub temperature: f64,
    /// Per-sample loss when either pool yields no off-self pairs.
    #[config(default = 0.1)]
    pub fallback_loss: f64,
    /// Multiplier applied to the batch-averaged contrastive loss.
    #[config(default = 0.1)]
    pub loss_weight: f64,
    /// Exclusive lower bound of the background confidence band.
    #[config(default = 0.2)]
    pub band_low: f64,
    /// Exclusive upper bound of the background confidence band.
    #[config(default = 0.8)]
    pub band_high: f64,
    /// Noisy boxes scanned per batch element.
    #[config(default = 100)]
    pub max_noisy_boxes: usize,
}

impl ContrastConfig {
    /// Log a warning for settings that make the objective meaningless.
    pub fn validate(&self) {
        if self.temperature <= 0.0 {
            tracing::warn!(
                temperature = self.temperature,
                "non-positive contrastive temperature; logits will be inverted or infinite"
            );
        }
        if self.band_low >= self.band_high {
            tracing::warn!(
                band_low = self.band_low,
                band_high = self.band_high,
                "empty background confidence band; every sample will use the fallback loss"
            );
        }
    }
}
