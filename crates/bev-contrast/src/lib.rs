//! Contrastive representation objective on BEV feature maps.
//!
//! Samples L2-normalized feature vectors at projected box centers, splits
//! them into foreground (ground truth) and background (ambiguous synthetic
//! boxes) pools, mines in-pool negatives by circular shifts and scores the
//! result with a temperature-scaled cross-entropy.

pub mod config;
pub mod loss;
pub mod objective;
pub mod pairing;
pub mod pool;
pub mod projection;
pub mod sampler;
pub mod types;

pub use config::ContrastConfig;
pub use loss::{aggregate_batch_loss, align_pairs, pairwise_contrastive_loss, similarity_logits};
pub use objective::{contrastive_objective, ContrastTargets};
pub use pairing::{mine_pairs, roll_rows, PairMatrices};
pub use pool::{build_pools, in_background_band, FeaturePools};
pub use projection::{project_center, PixelIndex};
pub use sampler::{l2_normalize_channels, sample_feature, NormalizedBevMap};
pub use types::{boxes_from_tensor, mask_from_tensor, Box3d, ContrastError, PointCloudRange};
