use burn::prelude::*;
use burn::tensor::TensorData;

use crate::error::DetectorError;

/// Scatters per-pillar features onto a dense BEV canvas.
///
/// Pillar `p` with coordinates `[agent, z, y, x]` lands at flat position
/// `z + y * nx + x` of its agent's `(C, ny * nx)` canvas; cells without a
/// pillar stay zero.
#[derive(Module, Clone, Debug)]
pub struct PointPillarScatter {
    num_features: usize,
    nx: usize,
    ny: usize,
}

impl PointPillarScatter {
    pub fn new(num_features: usize, nx: usize, ny: usize) -> Self {
        Self {
            num_features,
            nx,
            ny,
        }
    }

    /// Grid size derived from a metric range and voxel size, as `(nx, ny)`.
    pub fn grid_size(lidar_range: [f32; 6], voxel_size: [f32; 3]) -> (usize, usize) {
        let nx = ((lidar_range[3] - lidar_range[0]) / voxel_size[0]).round() as usize;
        let ny = ((lidar_range[4] - lidar_range[1]) / voxel_size[1]).round() as usize;
        (nx, ny)
    }

    pub fn nx(&self) -> usize {
        self.nx
    }

    pub fn ny(&self) -> usize {
        self.ny
    }

    /// `pillar_features`: `(P, C)`, `voxel_coords`: `(P, 4)`. Returns `(agents, C, ny, nx)`.
    pub fn forward<B: Backend>(
        &self,
        pillar_features: Tensor<B, 2>,
        voxel_coords: Tensor<B, 2, Int>,
        agents: usize,
    ) -> Result<Tensor<B, 4>, DetectorError> {
        let [pillars, channels] = pillar_features.dims();
        if channels != self.num_features {
            return Err(DetectorError::Shape(format!(
                "pillar features have {channels} channels, scatter expects {}",
                self.num_features
            )));
        }
        let device = pillar_features.device();
        let coords: Vec<i64> = voxel_coords
            .into_data()
            .convert::<i64>()
            .to_vec()
            .map_err(|e| DetectorError::TensorData(format!("{e:?}")))?;

        let cells = self.nx * self.ny;
        let mut rows: Vec<Vec<i64>> = vec![Vec::new(); agents];
        let mut flat: Vec<Vec<i64>> = vec![Vec::new(); agents];
        for p in 0..pillars {
            let c = &coords[p * 4..p * 4 + 4];
            let agent = c[0];
            if agent < 0 || agent as usize >= agents {
                return Err(DetectorError::RecordLen {
                    covered: agents,
                    agent,
                });
            }
            let index = c[1] + c[2] * self.nx as i64 + c[3];
            if index < 0 || index as usize >= cells {
                return Err(DetectorError::Shape(format!(
                    "pillar {p} at (z={}, y={}, x={}) outside {}x{} grid",
                    c[1], c[2], c[3], self.ny, self.nx
                )));
            }
            rows[agent as usize].push(p as i64);
            flat[agent as usize].push(index);
        }

        let mut canvases = Vec::with_capacity(agents);
        for (rows, flat) in rows.into_iter().zip(flat) {
            let canvas = Tensor::<B, 2>::zeros([self.num_features, cells], &device);
            let canvas = if rows.is_empty() {
                canvas
            } else {
                let n = rows.len();
                let selected = pillar_features
                    .clone()
                    .select(0, Tensor::from_data(TensorData::new(rows, [n]), &device))
                    .swap_dims(0, 1); // (C, n)
                canvas.select_assign(1, Tensor::from_data(TensorData::new(flat, [n]), &device), selected)
            };
            canvases.push(canvas.reshape([self.num_features, self.ny, self.nx]));
        }

        tracing::trace!(pillars, agents, nx = self.nx, ny = self.ny, "Scattered pillars");
        Ok(Tensor::stack(canvases, 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_grid_size() {
        let (nx, ny) = PointPillarScatter::grid_size([-140.8, -38.4, -3.0, 140.8, 38.4, 1.0], [0.4, 0.4, 4.0]);
        assert_eq!((nx, ny), (704, 192));
    }

    #[test]
    fn test_pillars_land_in_their_cells() {
        let device = Default::default();
        let scatter = PointPillarScatter::new(2, 4, 3);
        let features = Tensor::<TestBackend, 2>::from_data(
            TensorData::from([[1.0_f32, 10.0], [2.0, 20.0], [3.0, 30.0]]),
            &device,
        );
        let coords = Tensor::<TestBackend, 2, Int>::from_data(
            TensorData::from([[0_i64, 0, 1, 2], [1, 0, 0, 0], [0, 0, 2, 3]]),
            &device,
        );

        let canvas = scatter.forward(features, coords, 2).unwrap();
        assert_eq!(canvas.dims(), [2, 2, 3, 4]);

        let values: Vec<f32> = canvas.into_data().to_vec().unwrap();
        // index = ((agent * C + c) * ny + y) * nx + x
        let at = |a: usize, c: usize, y: usize, x: usize| values[((a * 2 + c) * 3 + y) * 4 + x];
        assert_eq!(at(0, 0, 1, 2), 1.0);
        assert_eq!(at(0, 1, 1, 2), 10.0);
        assert_eq!(at(0, 1, 2, 3), 30.0);
        assert_eq!(at(1, 0, 0, 0), 2.0);
        assert_eq!(at(1, 1, 0, 0), 20.0);
        let total: f32 = values.iter().sum();
        assert_eq!(total, 66.0);
    }

    #[test]
    fn test_agent_without_pillars_is_empty() {
        let device = Default::default();
        let scatter = PointPillarScatter::new(2, 2, 2);
        let features = Tensor::<TestBackend, 2>::ones([1, 2], &device);
        let coords = Tensor::<TestBackend, 2, Int>::from_data(TensorData::from([[0_i64, 0, 0, 1]]), &device);

        let canvas = scatter.forward(features, coords, 3).unwrap();
        assert_eq!(canvas.dims(), [3, 2, 2, 2]);
        let tail: f32 = canvas.narrow(0, 1, 2).sum().into_scalar().elem();
        assert_eq!(tail, 0.0);
    }

    #[test]
    fn test_unknown_agent_is_rejected() {
        let device = Default::default();
        let scatter = PointPillarScatter::new(2, 2, 2);
        let features = Tensor::<TestBackend, 2>::ones([1, 2], &device);
        let coords = Tensor::<TestBackend, 2, Int>::from_data(TensorData::from([[4_i64, 0, 0, 0]]), &device);

        let err = scatter.forward(features, coords, 2).unwrap_err();
        assert!(matches!(err, DetectorError::RecordLen { covered: 2, agent: 4 }));
    }

    #[test]
    fn test_cell_outside_grid_is_rejected() {
        let device = Default::default();
        let scatter = PointPillarScatter::new(2, 2, 2);
        let features = Tensor::<TestBackend, 2>::ones([1, 2], &device);
        let coords = Tensor::<TestBackend, 2, Int>::from_data(TensorData::from([[0_i64, 0, 5, 0]]), &device);

        assert!(matches!(scatter.forward(features, coords, 1), Err(DetectorError::Shape(_))));
    }
}
