//! Box-center to BEV pixel projection.
//!
//! The feature map covers the point-cloud range linearly: column grows with
//! `x`, row grows with `y`. Indices outside the map are rejected with
//! [`ContrastError::OutOfBounds`] rather than clamped.

use crate::types::{Box3d, ContrastError, PointCloudRange};

/// Integer location in a `(C, H, W)` feature map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelIndex {
    pub row: usize,
    pub col: usize,
}

/// Project a box center into the `height x width` grid spanned by `range`.
///
/// ```text
/// col = floor((x - x_min) / (x_max - x_min) * W)
/// row = floor((y - y_min) / (y_max - y_min) * H)
/// ```
pub fn project_center(
    bbox: &Box3d,
    range: &PointCloudRange,
    height: usize,
    width: usize,
) -> Result<PixelIndex, ContrastError> {
    let col = ((bbox.x - range.x_min) / range.width_m() * width as f32).floor();
    let row = ((bbox.y - range.y_min) / range.height_m() * height as f32).floor();

    // NaN fails both comparisons and lands in the error branch.
    let in_bounds = |v: f32, limit: usize| v >= 0.0 && v < limit as f32;
    if !(in_bounds(row, height) && in_bounds(col, width)) {
        return Err(ContrastError::OutOfBounds {
            row: row as i64,
            col: col as i64,
            height,
            width,
        });
    }

    Ok(PixelIndex {
        row: row as usize,
        col: col as usize,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range_140m() -> PointCloudRange {
        PointCloudRange::from_array([-70.0, -70.0, -3.0, 70.0, 70.0, 1.0]).unwrap()
    }

    #[test]
    fn test_origin_maps_to_center() {
        let idx = project_center(&Box3d::at(0.0, 0.0), &range_140m(), 128, 128).unwrap();
        assert_eq!(idx, PixelIndex { row: 64, col: 64 });
    }

    #[test]
    fn test_floor_not_round() {
        // (10 + 70) / 140 * 128 = 73.14
        let idx = project_center(&Box3d::at(10.0, 10.0), &range_140m(), 128, 128).unwrap();
        assert_eq!(idx, PixelIndex { row: 73, col: 73 });
    }

    #[test]
    fn test_axes_are_independent() {
        let range = PointCloudRange::from_array([0.0, 0.0, -3.0, 100.0, 50.0, 1.0]).unwrap();
        // col from x over W=200, row from y over H=100
        let idx = project_center(&Box3d::at(25.0, 40.0), &range, 100, 200).unwrap();
        assert_eq!(idx, PixelIndex { row: 80, col: 50 });
    }

    #[test]
    fn test_min_corner_is_first_cell() {
        let idx = project_center(&Box3d::at(-70.0, -70.0), &range_140m(), 128, 128).unwrap();
        assert_eq!(idx, PixelIndex { row: 0, col: 0 });
    }

    #[test]
    fn test_max_edge_is_out_of_bounds() {
        let err = project_center(&Box3d::at(70.0, 0.0), &range_140m(), 128, 128).unwrap_err();
        match err {
            ContrastError::OutOfBounds { row, col, .. } => {
                assert_eq!(row, 64);
                assert_eq!(col, 128);
            }
            other => panic!("expected OutOfBounds, got {other:?}"),
        }
    }

    #[test]
    fn test_negative_side_is_out_of_bounds() {
        let err = project_center(&Box3d::at(0.0, -70.5), &range_140m(), 128, 128).unwrap_err();
        assert!(matches!(err, ContrastError::OutOfBounds { row: -1, .. }));
    }

    #[test]
    fn test_nan_center_is_rejected() {
        let err = project_center(&Box3d::at(f32::NAN, 0.0), &range_140m(), 128, 128).unwrap_err();
        assert!(matches!(err, ContrastError::OutOfBounds { .. }));
    }
}
