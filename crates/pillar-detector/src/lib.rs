//! Intermediate-fusion PointPillar detector for collaborative perception.
//!
//! Pillars from every agent are encoded, scattered to a BEV canvas, fused
//! per collaborative sample by an attention backbone and decoded by 1x1
//! heads. In iterative-training mode the fused map also feeds the
//! contrastive objective from `bev-contrast`.

pub mod detector;
pub mod error;
pub mod input;
pub mod model;

pub use detector::{PointPillarIntermediate, PointPillarIntermediateConfig};
pub use error::DetectorError;
pub use input::{DetectorInput, DetectorOutput, ProcessedLidar};
