//! Spatial feature provider (pillar encoder, scatter, attention backbone)
//! and the 1x1 detection heads.

pub mod backbone;
pub mod heads;
pub mod scatter;
pub mod vfe;

pub use backbone::{attention_fusion, AttBevBackbone, AttBevBackboneConfig};
pub use heads::DetectionHeads;
pub use scatter::PointPillarScatter;
pub use vfe::{PillarVfe, PillarVfeConfig};
