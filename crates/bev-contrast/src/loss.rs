//! Temperature-scaled cross-entropy over foreground/background pairs.
//!
//! Per batch element: mine pairs in both pools, truncate both pair sets to
//! the shorter row count, stack foreground above background into
//! `query = [pos_fg; pos_bg]` and `key = [neg_fg; neg_bg]`, then score
//! `query . key^T / temperature` with target class `i` for row `i`.
//!
//! Row `i`'s target column holds the mined *negative* partner of row `i`,
//! which is the reference training behavior and is kept as is.

use burn::nn::loss::CrossEntropyLossConfig;
use burn::prelude::*;

use crate::config::ContrastConfig;
use crate::pairing::{mine_pairs, PairMatrices};
use crate::pool::FeaturePools;

/// Truncate both pair sets to `min(rows(fg), rows(bg))`.
pub fn align_pairs<B: Backend>(
    foreground: PairMatrices<B>,
    background: PairMatrices<B>,
) -> (PairMatrices<B>, PairMatrices<B>) {
    let rows = foreground.rows().min(background.rows());
    if foreground.rows() != background.rows() {
        tracing::trace!(
            foreground = foreground.rows(),
            background = background.rows(),
            kept = rows,
            "Truncating contrastive pairs"
        );
    }
    (foreground.truncate(rows), background.truncate(rows))
}

/// Scaled similarity logits `(2n, 2n)` for aligned pair sets of `n` rows each.
pub fn similarity_logits<B: Backend>(
    foreground: PairMatrices<B>,
    background: PairMatrices<B>,
    temperature: f64,
) -> Tensor<B, 2> {
    let query = Tensor::cat(vec![foreground.positive, background.positive], 0);
    let key = Tensor::cat(vec![foreground.negative, background.negative], 0);
    query.matmul(key.transpose()).div_scalar(temperature)
}

/// Contrastive loss of one batch element, shape `[1]`.
///
/// Returns `config.fallback_loss` when either pool has fewer than two
/// vectors, since no off-self pair exists there.
pub fn pairwise_contrastive_loss<B: Backend>(
    pools: &FeaturePools<B>,
    config: &ContrastConfig,
    device: &B::Device,
) -> Tensor<B, 1> {
    let fallback = || Tensor::<B, 1>::from_floats([config.fallback_loss as f32], device);

    let (Some(foreground), Some(background)) =
        (mine_pairs(&pools.foreground), mine_pairs(&pools.background))
    else {
        tracing::debug!(
            foreground = pools.foreground.len(),
            background = pools.background.len(),
            fallback = config.fallback_loss,
            "No usable contrastive pairs"
        );
        return fallback();
    };

    let (foreground, background) = align_pairs(foreground, background);
    let logits = similarity_logits(foreground, background, config.temperature);
    let n = logits.dims()[0];
    let labels = Tensor::<B, 1, Int>::arange(0..n as i64, device);

    CrossEntropyLossConfig::new()
        .init(device)
        .forward(logits, labels)
}

/// Batch aggregation: `sum(losses) / batch_size * loss_weight`, shape `[1]`.
///
/// An empty batch contributes zero.
pub fn aggregate_batch_loss<B: Backend>(
    losses: Vec<Tensor<B, 1>>,
    config: &ContrastConfig,
    device: &B::Device,
) -> Tensor<B, 1> {
    if losses.is_empty() {
        return Tensor::zeros([1], device);
    }
    let batch = losses.len() as f64;
    Tensor::cat(losses, 0)
        .sum()
        .div_scalar(batch)
        .mul_scalar(config.loss_weight)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;
    use burn::backend::Autodiff;
    use burn::tensor::{Distribution, TensorData};

    type TestBackend = NdArray<f32>;
    type TestAutodiffBackend = Autodiff<NdArray<f32>>;

    fn vecs(rows: &[[f32; 2]]) -> Vec<Tensor<TestBackend, 1>> {
        let device = Default::default();
        rows.iter()
            .map(|r| Tensor::from_data(TensorData::from(*r), &device))
            .collect()
    }

    fn pools(fg: &[[f32; 2]], bg: &[[f32; 2]]) -> FeaturePools<TestBackend> {
        FeaturePools {
            foreground: vecs(fg),
            background: vecs(bg),
        }
    }

    fn scalar(t: Tensor<TestBackend, 1>) -> f32 {
        t.into_scalar().elem()
    }

    fn matrix(rows: usize, fill: f32) -> Tensor<TestBackend, 2> {
        Tensor::full([rows, 4], fill, &Default::default())
    }

    /// Reference cross-entropy with labels 0..n, computed in f64.
    fn expected_loss(query: &[[f32; 2]], key: &[[f32; 2]], temperature: f64) -> f64 {
        let n = query.len();
        let mut total = 0.0;
        for i in 0..n {
            let logits: Vec<f64> = key
                .iter()
                .map(|k| (query[i][0] * k[0] + query[i][1] * k[1]) as f64 / temperature)
                .collect();
            let max = logits.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let lse = logits.iter().map(|l| (l - max).exp()).sum::<f64>().ln() + max;
            total += lse - logits[i];
        }
        total / n as f64
    }

    #[test]
    fn test_empty_background_uses_fallback() {
        let device = Default::default();
        let loss = pairwise_contrastive_loss(&pools(&[[1.0, 0.0], [0.0, 1.0]], &[]), &ContrastConfig::new(), &device);
        assert_eq!(loss.dims(), [1]);
        assert!((scalar(loss) - 0.1).abs() < 1e-7);
    }

    #[test]
    fn test_empty_foreground_uses_fallback() {
        let device = Default::default();
        let loss = pairwise_contrastive_loss(&pools(&[], &[[1.0, 0.0], [0.0, 1.0]]), &ContrastConfig::new(), &device);
        assert!((scalar(loss) - 0.1).abs() < 1e-7);
    }

    #[test]
    fn test_single_vector_pool_uses_fallback() {
        let device = Default::default();
        let cfg = ContrastConfig::new();
        let loss = pairwise_contrastive_loss(&pools(&[[1.0, 0.0]], &[[1.0, 0.0], [0.0, 1.0]]), &cfg, &device);
        assert!((scalar(loss) - 0.1).abs() < 1e-7);
        let loss = pairwise_contrastive_loss(&pools(&[[1.0, 0.0], [0.0, 1.0]], &[[0.0, 1.0]]), &cfg, &device);
        assert!((scalar(loss) - 0.1).abs() < 1e-7);
    }

    #[test]
    fn test_fallback_is_configurable() {
        let device = Default::default();
        let cfg = ContrastConfig::new().with_fallback_loss(0.25);
        let loss = pairwise_contrastive_loss(&pools(&[], &[]), &cfg, &device);
        assert!((scalar(loss) - 0.25).abs() < 1e-7);
    }

    #[test]
    fn test_logit_diagonal_is_scaled_shifted_dot_product() {
        let s = std::f32::consts::FRAC_1_SQRT_2;
        let (a, b) = ([1.0_f32, 0.0], [0.6_f32, 0.8]);
        let (c, d) = ([s, s], [s, -s]);
        let p = pools(&[a, b], &[c, d]);

        let fg = mine_pairs(&p.foreground).unwrap();
        let bg = mine_pairs(&p.background).unwrap();
        let (fg, bg) = align_pairs(fg, bg);
        let logits = similarity_logits(fg, bg, 0.07);
        assert_eq!(logits.dims(), [4, 4]);

        let values: Vec<f32> = logits.into_data().to_vec().unwrap();
        let dot = |u: [f32; 2], v: [f32; 2]| (u[0] * v[0] + u[1] * v[1]) / 0.07;
        // key rows are the rolled pools: [b, a, d, c]
        let expected_diag = [dot(a, b), dot(b, a), dot(c, d), dot(d, c)];
        for (i, expected) in expected_diag.iter().enumerate() {
            let got = values[i * 4 + i];
            assert!((got - expected).abs() < 1e-4, "diag[{i}] = {got}, expected {expected}");
        }
    }

    #[test]
    fn test_loss_matches_reference_cross_entropy() {
        let device = Default::default();
        let (a, b, c) = ([1.0_f32, 0.0], [0.6_f32, 0.8], [0.0_f32, 1.0]);
        let (d, e) = ([0.8_f32, 0.6], [-1.0_f32, 0.0]);
        let cfg = ContrastConfig::new();

        let loss = scalar(pairwise_contrastive_loss(&pools(&[a, b, c], &[d, e]), &cfg, &device));

        // fg has 6 pair rows, bg has 2; both truncate to 2.
        // fg: pos [a, b], neg = roll1 of [a, b, c] -> [c, a]; bg: pos [d, e], neg [e, d].
        let query = [a, b, d, e];
        let key = [c, a, e, d];
        let expected = expected_loss(&query, &key, 0.07);
        assert!(
            (loss as f64 - expected).abs() < 1e-3 * expected.max(1.0),
            "loss {loss}, expected {expected}"
        );
    }

    #[test]
    fn test_truncation_is_noop_for_equal_sizes() {
        let fg = PairMatrices { positive: matrix(6, 1.0), negative: matrix(6, 2.0) };
        let bg = PairMatrices { positive: matrix(6, 3.0), negative: matrix(6, 4.0) };
        let (fg, bg) = align_pairs(fg, bg);
        assert_eq!(fg.rows(), 6);
        assert_eq!(bg.rows(), 6);
    }

    #[test]
    fn test_truncation_to_smaller_pair_set() {
        let fg = PairMatrices { positive: matrix(10, 1.0), negative: matrix(10, 2.0) };
        let bg = PairMatrices { positive: matrix(4, 3.0), negative: matrix(4, 4.0) };
        let (fg, bg) = align_pairs(fg, bg);
        assert_eq!(fg.positive.dims(), [4, 4]);
        assert_eq!(fg.negative.dims(), [4, 4]);
        assert_eq!(bg.positive.dims(), [4, 4]);
        assert_eq!(bg.negative.dims(), [4, 4]);

        let logits = similarity_logits(fg, bg, 0.07);
        assert_eq!(logits.dims(), [8, 8]);
    }

    #[test]
    fn test_aggregate_two_fallbacks() {
        let device = Default::default();
        let cfg = ContrastConfig::new();
        let losses = vec![
            Tensor::<TestBackend, 1>::from_floats([0.1], &device),
            Tensor::<TestBackend, 1>::from_floats([0.1], &device),
        ];
        let total = scalar(aggregate_batch_loss(losses, &cfg, &device));
        assert!((total - 0.01).abs() < 1e-7, "got {total}");
    }

    #[test]
    fn test_aggregate_empty_batch_is_zero() {
        let device = Default::default();
        let total = scalar(aggregate_batch_loss::<TestBackend>(vec![], &ContrastConfig::new(), &device));
        assert_eq!(total, 0.0);
    }

    #[test]
    fn test_gradient_reaches_pool_vectors() {
        let device = Default::default();
        let fg: Vec<Tensor<TestAutodiffBackend, 1>> = (0..3)
            .map(|_| Tensor::random([8], Distribution::Normal(0.0, 1.0), &device).require_grad())
            .collect();
        let bg: Vec<Tensor<TestAutodiffBackend, 1>> = (0..3)
            .map(|_| Tensor::random([8], Distribution::Normal(0.0, 1.0), &device))
            .collect();
        let pools = FeaturePools { foreground: fg.clone(), background: bg };

        let loss = pairwise_contrastive_loss(&pools, &ContrastConfig::new(), &device);
        let grads = loss.backward();

        let grad = fg[0].grad(&grads).expect("foreground vector should have gradient");
        let grad_sum: f32 = grad.abs().sum().into_scalar().elem();
        assert!(grad_sum > 0.0, "gradient not flowing to pooled features");
    }
}
