use burn::prelude::*;
use serde::{Deserialize, Serialize};

/// Errors raised while projecting boxes, sampling features or assembling pools.
#[derive(Debug, thiserror::Error)]
pub enum ContrastError {
    /// A box center projected outside the spatial feature map.
    #[error("projected index (row {row}, col {col}) outside {height}x{width} feature map")]
    OutOfBounds {
        row: i64,
        col: i64,
        height: usize,
        width: usize,
    },

    /// The point-cloud range has a non-positive extent on some axis.
    #[error("invalid point-cloud range: {0}")]
    InvalidRange(String),

    /// A noisy box lacks the confidence field at index 7.
    #[error("noisy box {index} has no confidence field")]
    MissingConfidence { index: usize },

    /// A box tensor has fewer fields per row than required.
    #[error("box tensor has {actual} fields per box, expected at least {expected}")]
    BoxFields { expected: usize, actual: usize },

    /// The validity mask does not cover the ground-truth boxes one-to-one.
    #[error("mask has {mask} entries for {boxes} ground-truth boxes")]
    MaskLength { mask: usize, boxes: usize },

    /// The feature map channel count differs from the configured feature dimension.
    #[error("feature map has {actual} channels, expected {expected}")]
    FeatureDim { expected: usize, actual: usize },

    /// Batch dimensions of the inputs disagree.
    #[error("batch size mismatch: {what} has {actual}, expected {expected}")]
    BatchMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Tensor data could not be read back to the host.
    #[error("tensor data: {0}")]
    TensorData(String),
}

/// A 3D box in LiDAR metric coordinates.
///
/// Ground-truth boxes carry no confidence. Synthetic (noisy) boxes carry a
/// soft positive/negative score in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Box3d {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub h: f32,
    pub w: f32,
    pub l: f32,
    pub yaw: f32,
    #[serde(default)]
    pub confidence: Option<f32>,
}

impl Box3d {
    /// Ground-truth box centered at `(x, y)` with unit extent.
    pub fn at(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            z: 0.0,
            h: 1.0,
            w: 1.0,
            l: 1.0,
            yaw: 0.0,
            confidence: None,
        }
    }

    /// Same box with a confidence score attached.
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Build a box from one row of a box tensor: `[x, y, z, h, w, l, yaw, (conf), ...]`.
    pub fn from_row(row: &[f32]) -> Result<Self, ContrastError> {
        if row.len() < 7 {
            return Err(ContrastError::BoxFields {
                expected: 7,
                actual: row.len(),
            });
        }
        Ok(Self {
            x: row[0],
            y: row[1],
            z: row[2],
            h: row[3],
            w: row[4],
            l: row[5],
            yaw: row[6],
            confidence: row.get(7).copied(),
        })
    }
}

/// Metric extent covered by the BEV feature map:
/// `[x_min, y_min, z_min, x_max, y_max, z_max]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointCloudRange {
    pub x_min: f32,
    pub y_min: f32,
    pub z_min: f32,
    pub x_max: f32,
    pub y_max: f32,
    pub z_max: f32,
}

impl PointCloudRange {
    /// Build and validate a range from the flat six-value layout.
    pub fn from_array(r: [f32; 6]) -> Result<Self, ContrastError> {
        let range = Self {
            x_min: r[0],
            y_min: r[1],
            z_min: r[2],
            x_max: r[3],
            y_max: r[4],
            z_max: r[5],
        };
        range.validate()?;
        Ok(range)
    }

    pub fn to_array(&self) -> [f32; 6] {
        [
            self.x_min, self.y_min, self.z_min, self.x_max, self.y_max, self.z_max,
        ]
    }

    pub fn validate(&self) -> Result<(), ContrastError> {
        for (axis, lo, hi) in [
            ("x", self.x_min, self.x_max),
            ("y", self.y_min, self.y_max),
            ("z", self.z_min, self.z_max),
        ] {
            if !(hi > lo) {
                return Err(ContrastError::InvalidRange(format!(
                    "{axis}_max ({hi}) must exceed {axis}_min ({lo})"
                )));
            }
        }
        Ok(())
    }

    pub fn width_m(&self) -> f32 {
        self.x_max - self.x_min
    }

    pub fn height_m(&self) -> f32 {
        self.y_max - self.y_min
    }
}

/// Read a `(batch, boxes, fields)` tensor back into per-batch box lists.
///
/// Requires at least `min_fields` values per box.
pub fn boxes_from_tensor<B: Backend>(
    boxes: Tensor<B, 3>,
    min_fields: usize,
) -> Result<Vec<Vec<Box3d>>, ContrastError> {
    let [batch, count, fields] = boxes.dims();
    if fields < min_fields.max(7) {
        return Err(ContrastError::BoxFields {
            expected: min_fields.max(7),
            actual: fields,
        });
    }
    let values: Vec<f32> = boxes
        .into_data()
        .convert::<f32>()
        .to_vec()
        .map_err(|e| ContrastError::TensorData(format!("{e:?}")))?;

    let mut out = Vec::with_capacity(batch);
    for b in 0..batch {
        let mut row_boxes = Vec::with_capacity(count);
        for i in 0..count {
            let start = (b * count + i) * fields;
            row_boxes.push(Box3d::from_row(&values[start..start + fields])?);
        }
        out.push(row_boxes);
    }
    Ok(out)
}

/// Read a `(batch, boxes)` validity mask; entries equal to 1 are valid.
pub fn mask_from_tensor<B: Backend>(mask: Tensor<B, 2>) -> Result<Vec<Vec<bool>>, ContrastError> {
    let [batch, count] = mask.dims();
    let values: Vec<f32> = mask
        .into_data()
        .convert::<f32>()
        .to_vec()
        .map_err(|e| ContrastError::TensorData(format!("{e:?}")))?;
    Ok((0..batch)
        .map(|b| values[b * count..(b + 1) * count].iter().map(|&v| v == 1.0).collect())
        .collect())
}
