//! Uniform bucket grid for fixed-radius neighbour queries.
//!
//! Points are bucketed by a counting sort (counts, prefix-sum starts, sorted
//! indices) so a query only visits the 3x3x3 block of cells around it.

use particle_common::Vec3;

/// Upper bound on cells along one axis. Cells grow past the requested size
/// when the points span more than this many of them.
const MAX_CELLS_PER_AXIS: f64 = 64.0;

pub struct SpatialGrid {
    cell_size: f64,
    inv_cell_size: f64,
    grid_dims: [usize; 3],
    /// Number of points in each grid cell.
    cell_counts: Vec<u32>,
    /// Start index in `cell_point_indices` for each grid cell (prefix sum).
    cell_starts: Vec<u32>,
    /// Point indices sorted by grid cell.
    cell_point_indices: Vec<u32>,
    points: Vec<Vec3>,
}

impl SpatialGrid {
    /// Buckets `points` (physical units, non-negative) into cells of at
    /// least `cell_size`, with at most `MAX_CELLS_PER_AXIS` cells per axis.
    pub fn build(points: Vec<Vec3>, cell_size: f64) -> Self {
        let extent = points.iter().fold(Vec3::zero(), |acc, p| {
            Vec3::new(acc.x.max(p.x), acc.y.max(p.y), acc.z.max(p.z))
        });
        let floor = extent.x.max(extent.y).max(extent.z) / MAX_CELLS_PER_AXIS;
        let cell_size = if cell_size.is_finite() { cell_size.max(floor) } else { floor };
        let cell_size = if cell_size > 1e-9 { cell_size } else { 1.0 };
        let inv_cell_size = 1.0 / cell_size;

        let grid_dims = [
            (extent.x * inv_cell_size).floor() as usize + 1,
            (extent.y * inv_cell_size).floor() as usize + 1,
            (extent.z * inv_cell_size).floor() as usize + 1,
        ];
        let num_cells = grid_dims[0] * grid_dims[1] * grid_dims[2];

        let mut grid = SpatialGrid {
            cell_size,
            inv_cell_size,
            grid_dims,
            cell_counts: vec![0; num_cells],
            cell_starts: vec![0; num_cells],
            cell_point_indices: vec![0; points.len()],
            points,
        };

        // Phase 1: count points per cell.
        let cell_of: Vec<usize> = grid.points.iter().map(|&p| grid.cell_index(p)).collect();
        for &cell in &cell_of {
            grid.cell_counts[cell] += 1;
        }

        // Phase 2: prefix sum for cell start indices.
        let mut total = 0;
        for (start, &count) in grid.cell_starts.iter_mut().zip(&grid.cell_counts) {
            *start = total;
            total += count;
        }

        // Phase 3: scatter point indices; ascending within each cell.
        let mut offsets = vec![0u32; num_cells];
        for (idx, &cell) in cell_of.iter().enumerate() {
            let write = (grid.cell_starts[cell] + offsets[cell]) as usize;
            grid.cell_point_indices[write] = idx as u32;
            offsets[cell] += 1;
        }
        grid
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    fn cell_coords(&self, p: Vec3) -> [usize; 3] {
        let c = |v: f64, dim: usize| ((v.max(0.0) * self.inv_cell_size).floor() as usize).min(dim - 1);
        [
            c(p.x, self.grid_dims[0]),
            c(p.y, self.grid_dims[1]),
            c(p.z, self.grid_dims[2]),
        ]
    }

    fn cell_index(&self, p: Vec3) -> usize {
        let [x, y, z] = self.cell_coords(p);
        (z * self.grid_dims[1] + y) * self.grid_dims[0] + x
    }

    /// Indices of all points strictly closer than `max_dist` to point `idx`,
    /// excluding `idx` itself, in ascending order.
    pub fn neighbors_within(&self, idx: usize, max_dist: f64) -> Vec<usize> {
        let pos = self.points[idx];
        let max_dist_sq = max_dist * max_dist;
        let center = self.cell_coords(pos);
        let reach = (max_dist * self.inv_cell_size).ceil().max(1.0) as usize;

        let span = |c: usize, dim: usize| c.saturating_sub(reach)..=(c + reach).min(dim - 1);
        let mut found = Vec::new();
        for gz in span(center[2], self.grid_dims[2]) {
            for gy in span(center[1], self.grid_dims[1]) {
                for gx in span(center[0], self.grid_dims[0]) {
                    let cell = (gz * self.grid_dims[1] + gy) * self.grid_dims[0] + gx;
                    let start = self.cell_starts[cell] as usize;
                    let end = start + self.cell_counts[cell] as usize;
                    for &neighbor in &self.cell_point_indices[start..end] {
                        let neighbor = neighbor as usize;
                        // Don't compare a point to itself
                        if neighbor == idx {
                            continue;
                        }
                        if pos.distance_squared(self.points[neighbor]) < max_dist_sq {
                            found.push(neighbor);
                        }
                    }
                }
            }
        }
        found.sort_unstable();
        found
    }
}
