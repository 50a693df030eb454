//! In-batch negative mining by circular shifts.
//!
//! For a pool of `N` vectors the positive matrix tiles the pool `N - 1`
//! times and the negative matrix concatenates the pool rolled by
//! `1, 2, ..., N - 1` rows. Row `k * N + i` therefore pairs vector `i` with
//! vector `(i - k - 1) mod N`, which covers every ordered pair of distinct
//! pool members exactly once and never pairs a vector with itself.

use burn::prelude::*;

/// Row-aligned positive/negative matrices, both `(N * (N - 1), C)`.
#[derive(Debug, Clone)]
pub struct PairMatrices<B: Backend> {
    pub positive: Tensor<B, 2>,
    pub negative: Tensor<B, 2>,
}

impl<B: Backend> PairMatrices<B> {
    pub fn rows(&self) -> usize {
        self.positive.dims()[0]
    }

    /// Keep the first `rows` pairs of both matrices (no-op if already shorter).
    pub fn truncate(self, rows: usize) -> Self {
        let keep = rows.min(self.rows());
        if keep == self.rows() {
            return self;
        }
        Self {
            positive: self.positive.narrow(0, 0, keep),
            negative: self.negative.narrow(0, 0, keep),
        }
    }
}

/// Circularly shift rows downward by `shift`: the last `shift` rows wrap to the top.
pub fn roll_rows<B: Backend>(x: Tensor<B, 2>, shift: usize) -> Tensor<B, 2> {
    let n = x.dims()[0];
    if n == 0 {
        return x;
    }
    let shift = shift % n;
    if shift == 0 {
        return x;
    }
    Tensor::cat(vec![x.clone().narrow(0, n - shift, shift), x.narrow(0, 0, n - shift)], 0)
}

/// Build the pair matrices for `pool`, or `None` when fewer than two vectors
/// leave no off-self pair.
pub fn mine_pairs<B: Backend>(pool: &[Tensor<B, 1>]) -> Option<PairMatrices<B>> {
    let n = pool.len();
    if n < 2 {
        return None;
    }
    let stacked: Tensor<B, 2> = Tensor::stack(pool.to_vec(), 0); // (N, C)

    let positive = Tensor::cat(vec![stacked.clone(); n - 1], 0);

    let mut shifted = stacked;
    let mut negatives = Vec::with_capacity(n - 1);
    for _ in 0..n - 1 {
        shifted = roll_rows(shifted, 1);
        negatives.push(shifted.clone());
    }
    let negative = Tensor::cat(negatives, 0);

    Some(PairMatrices { positive, negative })
}
