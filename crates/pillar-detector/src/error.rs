use bev_contrast::ContrastError;

/// Errors raised by the detector forward pass.
#[derive(Debug, thiserror::Error)]
pub enum DetectorError {
    /// A field required by iterative training was not supplied.
    #[error("missing required field `{0}` for iterative training")]
    MissingField(&'static str),

    /// `record_len` does not describe the agents present in `voxel_coords`.
    #[error("record_len covers {covered} agents but voxel_coords reference agent {agent}")]
    RecordLen { covered: usize, agent: i64 },

    /// An input tensor has an unexpected shape.
    #[error("invalid input shape: {0}")]
    Shape(String),

    /// Tensor data could not be read back to the host.
    #[error("tensor data: {0}")]
    TensorData(String),

    /// Failure inside the contrastive objective.
    #[error(transparent)]
    Contrast(#[from] ContrastError),
}
