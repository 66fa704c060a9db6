//! Per-object ground-truth statistics of a rendered timepoint.

use crate::render::{RenderedObject, RenderedTimepoint};
use crate::surface::SurfaceMesh;
use particle_common::{ParameterSet, Vec3};
use serde::Serialize;

/// Mean and standard error of the mean.
///
/// Uses the sample standard deviation (n - 1); both the deviation and the
/// error are 0 for fewer than two values.
pub fn mean_std_err(values: &[f64]) -> (f64, f64) {
    let n = values.len();
    if n == 0 {
        return (0.0, 0.0);
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    if n < 2 {
        return (mean, 0.0);
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    (mean, variance.sqrt() / (n as f64).sqrt())
}

/// One row of the per-timepoint object statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectStatistics {
    pub timepoint: usize,
    pub timestamp: f64,
    pub id: u32,
    pub com_x: f64,
    pub com_y: f64,
    pub com_z: f64,
    pub com_x_um: f64,
    pub com_y_um: f64,
    pub com_z_um: f64,
    /// Realized voxel count.
    pub volume: usize,
    pub volume_um3: f64,
    pub requested_size: u32,
    pub mean_intensity: f64,
    pub intensity_std_err: f64,
    /// Mean distance to every other object at this timepoint.
    pub mean_distance_um: f64,
    pub distance_std_err: f64,
}

/// Position of one object relative to the cell surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurfaceStatistics {
    pub timepoint: usize,
    pub id: u32,
    pub com_x: f64,
    pub com_y: f64,
    pub com_z: f64,
    pub distance_to_surface_um: f64,
    pub distance_to_cell_center_um: f64,
    pub com_inside: bool,
    /// Share (0..=1) of the object's voxels inside the surface.
    pub fraction_inside: f64,
}

pub fn object_statistics(params: &ParameterSet, rendered: &RenderedTimepoint) -> Vec<ObjectStatistics> {
    let um = params.voxel_size_um;
    let coms_um: Vec<Vec3> = rendered.objects.iter().map(|o| o.center_of_mass.mul_elem(um)).collect();
    let timestamp = rendered.timepoint as f64 * params.time_difference;

    rendered
        .objects
        .iter()
        .enumerate()
        .map(|(i, obj)| {
            let intensities: Vec<f64> = obj.intensities.iter().map(|&v| v as f64).collect();
            let (mean_intensity, intensity_std_err) = mean_std_err(&intensities);
            let distances: Vec<f64> = coms_um
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != i)
                .map(|(_, other)| other.distance(coms_um[i]))
                .collect();
            let (mean_distance_um, distance_std_err) = mean_std_err(&distances);
            let com = obj.center_of_mass;
            ObjectStatistics {
                timepoint: rendered.timepoint,
                timestamp,
                id: obj.id,
                com_x: com.x,
                com_y: com.y,
                com_z: com.z,
                com_x_um: coms_um[i].x,
                com_y_um: coms_um[i].y,
                com_z_um: coms_um[i].z,
                volume: obj.realized_size(),
                volume_um3: obj.realized_size() as f64 * params.voxel_volume_um3(),
                requested_size: obj.requested_size,
                mean_intensity,
                intensity_std_err,
                mean_distance_um,
                distance_std_err,
            }
        })
        .collect()
}

pub fn surface_statistics(
    params: &ParameterSet,
    mesh: &SurfaceMesh,
    rendered: &RenderedTimepoint,
) -> Vec<SurfaceStatistics> {
    let um = params.voxel_size_um;
    let cell_center = Vec3::from_array(params.cell_center);
    rendered
        .objects
        .iter()
        .map(|obj| surface_entry(rendered.timepoint, obj, mesh, um, cell_center))
        .collect()
}

fn surface_entry(
    timepoint: usize,
    obj: &RenderedObject,
    mesh: &SurfaceMesh,
    um: [f64; 3],
    cell_center: Vec3,
) -> SurfaceStatistics {
    let com = obj.center_of_mass;
    let nearest = mesh.closest_point(mesh.to_physical(com)).div_elem(mesh.spacing());
    let inside_count = obj
        .voxels
        .iter()
        .filter(|&&[x, y, z]| mesh.contains(mesh.to_physical(Vec3::new(x as f64, y as f64, z as f64))))
        .count();
    let fraction_inside = if obj.voxels.is_empty() { 0.0 } else { inside_count as f64 / obj.voxels.len() as f64 };

    SurfaceStatistics {
        timepoint,
        id: obj.id,
        com_x: com.x,
        com_y: com.y,
        com_z: com.z,
        distance_to_surface_um: (com - nearest).mul_elem(um).length(),
        distance_to_cell_center_um: (com - cell_center).mul_elem(um).length(),
        com_inside: mesh.contains(mesh.to_physical(com)),
        fraction_inside,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::tests::cube_mesh;
    use crate::volume::Volume;
    use approx::assert_relative_eq;
    use particle_common::SimulationConfig;

    fn object(id: u32, com: Vec3, voxels: Vec<[usize; 3]>, intensities: Vec<u8>) -> RenderedObject {
        RenderedObject {
            id,
            requested_size: voxels.len() as u32,
            intensity: 100,
            nominal_position: com,
            center_of_mass: com,
            voxels,
            intensities,
        }
    }

    fn params() -> ParameterSet {
        let mut params = SimulationConfig::default().parameter_set();
        params.voxel_size_um = [0.5, 0.5, 2.0];
        params.time_difference = 10.0;
        params.cell_center = [0.0, 0.0, 0.0];
        params
    }

    #[test]
    fn mean_and_standard_error() {
        let (mean, err) = mean_std_err(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_relative_eq!(mean, 5.0);
        // sample sd = sqrt(32/7)
        assert_relative_eq!(err, (32.0f64 / 7.0).sqrt() / 8.0f64.sqrt(), epsilon = 1e-12);
        assert_eq!(mean_std_err(&[3.0]), (3.0, 0.0));
        assert_eq!(mean_std_err(&[]), (0.0, 0.0));
    }

    #[test]
    fn distances_are_in_micrometres() {
        let rendered = RenderedTimepoint {
            timepoint: 2,
            volume: Volume::zeros([8, 8, 8]),
            objects: vec![
                object(1, Vec3::new(0.0, 0.0, 0.0), vec![[0, 0, 0]], vec![100]),
                object(2, Vec3::new(0.0, 0.0, 3.0), vec![[0, 0, 3], [1, 0, 3]], vec![100, 120]),
            ],
        };
        let stats = object_statistics(&params(), &rendered);
        assert_eq!(stats.len(), 2);
        assert_relative_eq!(stats[0].mean_distance_um, 6.0);
        assert_relative_eq!(stats[1].volume_um3, 1.0);
        assert_relative_eq!(stats[1].mean_intensity, 110.0);
        assert_relative_eq!(stats[1].com_z_um, 6.0);
        assert_relative_eq!(stats[0].timestamp, 20.0);
    }

    #[test]
    fn surface_relations() {
        let mesh = cube_mesh(0.0, 10.0);
        let rendered = RenderedTimepoint {
            timepoint: 0,
            volume: Volume::zeros([16, 16, 16]),
            objects: vec![object(
                1,
                Vec3::new(9.0, 9.0, 9.0),
                vec![[9, 9, 9], [12, 9, 9]],
                vec![100, 100],
            )],
        };
        let mut params = params();
        params.voxel_size_um = [1.0, 1.0, 1.0];
        let stats = surface_statistics(&params, &mesh, &rendered);
        let s = &stats[0];
        assert!(s.com_inside);
        assert_relative_eq!(s.fraction_inside, 0.5);
        assert_relative_eq!(s.distance_to_surface_um, 3.0f64.sqrt());
        assert_relative_eq!(s.distance_to_cell_center_um, (243.0f64).sqrt());
    }
}
