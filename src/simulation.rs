use crate::cache::VolumeCache;
use crate::cluster::ClusterMerger;
use crate::error::{Result, SimulationError};
use crate::generator::ObjectGenerator;
use crate::movement::{MovementEngine, ValueBounds};
use crate::placement::{CellRegion, Placement};
use crate::render::{RenderedTimepoint, VolumeRenderer};
use crate::source::{read_object_source, SourceObject};
use crate::stats::{object_statistics, surface_statistics, ObjectStatistics, SurfaceStatistics};
use crate::surface::SurfaceMesh;
use crate::tracks::assemble_tracks;
use log::{debug, info, warn};
use particle_common::{ClusterMergeEvent, ObjectState, ParameterSet, PlacementMode, Track, Vec3};
use rand::prelude::*;
use rayon::prelude::*;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Data supplied from outside the engine, loaded once per run.
#[derive(Debug, Clone, Default)]
pub struct ExternalInputs {
    /// Per-object sizes and intensities for timepoint 0.
    pub objects: Option<Vec<SourceObject>>,
    pub surface: Option<SurfaceMesh>,
}

impl ExternalInputs {
    /// Loads exactly the inputs the parameters ask for.
    pub fn load(params: &ParameterSet) -> Result<Self> {
        let objects = match &params.object_source {
            Some(path) => Some(read_object_source(path)?),
            None => None,
        };
        let surface = match &params.surface_mesh {
            Some(path) => {
                let mesh = SurfaceMesh::from_json_file(path)?;
                info!("Loaded surface mesh with {} triangles from {}", mesh.triangle_count(), path.display());
                Some(mesh)
            }
            None if params.needs_surface() => return Err(SimulationError::MissingSurface),
            None => None,
        };
        Ok(ExternalInputs { objects, surface })
    }
}

/// The complete, clustered object history of one run.
///
/// Snapshots are immutable once generated and sorted by id.
#[derive(Debug, Clone)]
pub struct TimeSeries {
    pub snapshots: Vec<Vec<ObjectState>>,
    pub merges: Vec<ClusterMergeEvent>,
    pub tracks: Vec<Track>,
    pub targets: Vec<Vec3>,
    pub cell_region: CellRegion,
}

impl TimeSeries {
    /// Places the first timepoint, moves it through every later one, then
    /// clusters and assembles tracks.
    pub fn generate<R: Rng>(params: &ParameterSet, inputs: &ExternalInputs, rng: &mut R) -> Result<Self> {
        params.validate()?;
        if params.object_source.is_some() && inputs.objects.is_none() {
            return Err(SimulationError::MissingObjectSource);
        }

        let cell_region = CellRegion::random(params.dims, rng);
        let placement = match params.placement {
            PlacementMode::InsideCell => Placement::InsideCell(&cell_region),
            PlacementMode::NearSurface { sigma } => {
                let mesh = inputs.surface.as_ref().ok_or(SimulationError::MissingSurface)?;
                Placement::NearSurface { mesh, sigma, dims: params.dims }
            }
        };
        debug!("Cell region major axis {:.1}", cell_region.major_axis());

        let generator = ObjectGenerator::new(params, placement);
        let targets = generator.target_points(rng)?;
        let initial = generator.initial_objects(inputs.objects.as_deref(), rng)?;

        let source_sizes = inputs.objects.iter().flatten().map(|o| o.size);
        let bounds = ValueBounds::from_params(params).including_sizes(source_sizes);

        let engine = MovementEngine::new(params, &targets, bounds);
        let mut series = Vec::with_capacity(params.timepoints);
        series.push(initial);
        for t in 1..params.timepoints {
            let next = engine.advance(&series[t - 1], rng);
            series.push(next);
        }

        let (snapshots, merges) = match params.clustering {
            Some(cluster) => ClusterMerger::new(cluster, params.spacing, params.dims, bounds).merge(series, rng),
            None => {
                for snapshot in series.iter_mut() {
                    snapshot.sort_by_key(|o| o.id);
                }
                (series, Vec::new())
            }
        };
        let tracks = assemble_tracks(&snapshots, &merges, params.time_difference);

        info!(
            "Generated {} timepoints: {} objects at start, {} at end, {} merges, {} tracks",
            snapshots.len(),
            snapshots.first().map_or(0, Vec::len),
            snapshots.last().map_or(0, Vec::len),
            merges.len(),
            tracks.len()
        );
        Ok(TimeSeries { snapshots, merges, tracks, targets, cell_region })
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn snapshot(&self, timepoint: usize) -> Option<&[ObjectState]> {
        self.snapshots.get(timepoint).map(Vec::as_slice)
    }
}

/// A generated run plus on-demand, cached rendering of its timepoints.
pub struct ParticleSimulation {
    params: ParameterSet,
    inputs: ExternalInputs,
    seed: u64,
    series: TimeSeries,
    renderer: VolumeRenderer,
    cache: Mutex<VolumeCache<RenderedTimepoint>>,
    prerendered: AtomicBool,
}

impl ParticleSimulation {
    /// Validates the inputs and generates the whole time series.
    ///
    /// Without a configured seed one is drawn and logged so the run can be replayed.
    pub fn new(params: ParameterSet, inputs: ExternalInputs) -> Result<Self> {
        let seed = match params.seed {
            Some(seed) => seed,
            None => {
                let seed: u64 = rand::rng().random();
                info!("No seed configured; using {}", seed);
                seed
            }
        };
        let mut rng = StdRng::seed_from_u64(seed);
        let series = TimeSeries::generate(&params, &inputs, &mut rng)?;
        let renderer = VolumeRenderer::new(params.dims, params.noise);
        let cache = Mutex::new(VolumeCache::new(params.cache_capacity));

        Ok(ParticleSimulation {
            params,
            inputs,
            seed,
            series,
            renderer,
            cache,
            prerendered: AtomicBool::new(false),
        })
    }

    pub fn params(&self) -> &ParameterSet {
        &self.params
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn series(&self) -> &TimeSeries {
        &self.series
    }

    pub fn tracks(&self) -> &[Track] {
        &self.series.tracks
    }

    pub fn merges(&self) -> &[ClusterMergeEvent] {
        &self.series.merges
    }

    pub fn surface(&self) -> Option<&SurfaceMesh> {
        self.inputs.surface.as_ref()
    }

    pub fn timepoint_count(&self) -> usize {
        self.series.len()
    }

    /// Timepoints currently held by the cache, ascending.
    pub fn cached_timepoints(&self) -> Vec<usize> {
        self.lock_cache().timepoints()
    }

    /// Rendered volume of `timepoint`, from the cache when possible.
    ///
    /// With create-all enabled the first request also renders the leading
    /// `min(capacity, timepoints)` timepoints, leaving the requested one for last.
    pub fn volume(&self, timepoint: usize) -> Result<Arc<RenderedTimepoint>> {
        self.check_timepoint(timepoint)?;
        if let Some(hit) = self.lock_cache().get(timepoint) {
            return Ok(hit);
        }

        if self.params.create_all && self.params.cache_capacity > 0 && !self.prerendered.swap(true, Ordering::SeqCst) {
            self.prerender(timepoint);
        }

        let rendered = self.render_timepoint(timepoint);
        Ok(self.lock_cache().put(timepoint, rendered))
    }

    /// Renders every timepoint in parallel, calling `progress` after each one.
    ///
    /// Every volume stays alive in the returned vector regardless of the cache
    /// capacity; use [`Self::render_range`] to bound peak memory.
    pub fn render_all<F>(&self, progress: F) -> Vec<Arc<RenderedTimepoint>>
    where
        F: Fn(usize) + Sync,
    {
        info!("Rendering {} timepoints on {} threads", self.series.len(), rayon::current_num_threads());
        self.render_range(0..self.series.len(), progress)
    }

    /// Renders `timepoints` in parallel, returned in timepoint order. The end
    /// is clipped to the series length.
    pub fn render_range<F>(&self, timepoints: Range<usize>, progress: F) -> Vec<Arc<RenderedTimepoint>>
    where
        F: Fn(usize) + Sync,
    {
        let end = timepoints.end.min(self.series.len());
        (timepoints.start.min(end)..end)
            .into_par_iter()
            .map(|t| {
                let cached = self.lock_cache().get(t);
                let rendered = match cached {
                    Some(hit) => hit,
                    None => {
                        let rendered = self.render_timepoint(t);
                        self.lock_cache().put(t, rendered)
                    }
                };
                progress(t);
                rendered
            })
            .collect()
    }

    /// Timepoints rendered per batch by a driver that streams its output.
    pub fn render_batch_size(&self) -> usize {
        self.params.cache_capacity.max(rayon::current_num_threads()).max(1)
    }

    pub fn statistics(&self, timepoint: usize) -> Result<Vec<ObjectStatistics>> {
        let rendered = self.volume(timepoint)?;
        Ok(object_statistics(&self.params, &rendered))
    }

    /// Surface relations of every object; `None` without a surface mesh.
    pub fn surface_statistics(&self, timepoint: usize) -> Result<Option<Vec<SurfaceStatistics>>> {
        let Some(mesh) = self.inputs.surface.as_ref() else {
            return Ok(None);
        };
        let rendered = self.volume(timepoint)?;
        Ok(Some(surface_statistics(&self.params, mesh, &rendered)))
    }

    fn check_timepoint(&self, timepoint: usize) -> Result<()> {
        if timepoint >= self.series.len() {
            return Err(SimulationError::TimepointOutOfRange { timepoint, count: self.series.len() });
        }
        Ok(())
    }

    fn prerender(&self, requested: usize) {
        let count = self.params.cache_capacity.min(self.series.len());
        let pending: Vec<usize> = (0..count)
            .filter(|&t| t != requested && !self.lock_cache().contains(t))
            .collect();
        debug!("Pre-rendering timepoints {:?}", pending);
        let rendered: Vec<(usize, RenderedTimepoint)> =
            pending.into_par_iter().map(|t| (t, self.render_timepoint(t))).collect();
        let mut cache = self.lock_cache();
        for (t, volume) in rendered {
            cache.put(t, volume);
        }
    }

    // Each timepoint has its own stream so the result does not depend on render order.
    fn render_timepoint(&self, timepoint: usize) -> RenderedTimepoint {
        let mut rng = StdRng::seed_from_u64(timepoint_seed(self.seed, timepoint));
        self.renderer.render(timepoint, &self.series.snapshots[timepoint], &mut rng)
    }

    fn lock_cache(&self) -> MutexGuard<'_, VolumeCache<RenderedTimepoint>> {
        self.cache.lock().unwrap_or_else(|poisoned| {
            warn!("Volume cache lock was poisoned; continuing with its contents");
            PoisonError::into_inner(poisoned)
        })
    }
}

fn timepoint_seed(seed: u64, timepoint: usize) -> u64 {
    seed ^ (timepoint as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

#[cfg(test)]
mod tests {
    use super::*;
    use particle_common::SimulationConfig;

    fn params() -> ParameterSet {
        let mut config = SimulationConfig::default();
        config.dimensions.x = 48;
        config.dimensions.y = 48;
        config.dimensions.z = 12;
        config.dimensions.time = 4;
        config.objects.number_of_objects_start = 6;
        config.objects.number_of_objects_end = 6;
        config.caching.cache_amount = 2;
        config.seed = Some(11);
        config.parameter_set()
    }

    #[test]
    fn out_of_range_timepoint_is_an_error() {
        let sim = ParticleSimulation::new(params(), ExternalInputs::default()).unwrap();
        assert!(matches!(sim.volume(4), Err(SimulationError::TimepointOutOfRange { timepoint: 4, count: 4 })));
    }

    #[test]
    fn render_order_does_not_matter() {
        let a = ParticleSimulation::new(params(), ExternalInputs::default()).unwrap();
        let b = ParticleSimulation::new(params(), ExternalInputs::default()).unwrap();
        let from_a = a.volume(3).unwrap();
        let all_b = b.render_all(|_| {});
        assert_eq!(from_a.volume, all_b[3].volume);
    }

    #[test]
    fn ranges_render_in_timepoint_order() {
        let a = ParticleSimulation::new(params(), ExternalInputs::default()).unwrap();
        let b = ParticleSimulation::new(params(), ExternalInputs::default()).unwrap();
        let all = a.render_all(|_| {});

        let mut batched = Vec::new();
        let step = 3;
        for start in (0..b.timepoint_count()).step_by(step) {
            let batch = b.render_range(start..start + step, |_| {});
            assert!(batch.len() <= step);
            batched.extend(batch);
        }
        assert_eq!(batched.len(), all.len());
        for (x, y) in batched.iter().zip(&all) {
            assert_eq!(x.timepoint, y.timepoint);
            assert_eq!(x.volume, y.volume);
        }
        assert!(b.render_range(2..99, |_| {}).iter().map(|r| r.timepoint).eq(2..4));
        assert!(b.render_range(7..9, |_| {}).is_empty());
        assert!(b.render_batch_size() >= 2);
    }

    #[test]
    fn cache_respects_capacity() {
        let sim = ParticleSimulation::new(params(), ExternalInputs::default()).unwrap();
        sim.render_all(|_| {});
        assert!(sim.cached_timepoints().len() <= 2);
    }

    #[test]
    fn seeds_differ_per_timepoint() {
        assert_ne!(timepoint_seed(7, 0), timepoint_seed(7, 1));
    }

    #[test]
    fn missing_surface_is_fatal() {
        let mut params = params();
        params.placement = PlacementMode::NearSurface { sigma: 5.0 };
        let err = ParticleSimulation::new(params, ExternalInputs::default());
        assert!(matches!(err, Err(SimulationError::MissingSurface)));
    }
}
