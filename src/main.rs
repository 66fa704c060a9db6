use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use particle_common::SimulationConfig;
use particle_simulation::stats::{object_statistics, surface_statistics};
use particle_simulation::{ExternalInputs, ParticleSimulation, RenderedTimepoint};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Generates a synthetic particle time series with ground-truth tracks.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Simulation configuration (TOML).
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Overrides the seed from the configuration.
    #[arg(short, long)]
    seed: Option<u64>,

    /// Directory the output files are written to.
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,
}

fn main() -> Result<()> {
    // Initialize the logger
    env_logger::init();
    let args = Args::parse();

    info!("Starting particle simulation...");

    // --- Load Configuration ---
    let config = SimulationConfig::load(&args.config)?;
    let mut params = config.parameter_set();
    if args.seed.is_some() {
        params.seed = args.seed;
    }
    debug!("Simulation Parameters: {:#?}", params);

    // --- Generate ---
    let start_time = Instant::now();
    let inputs = ExternalInputs::load(&params).context("Failed to load external inputs")?;
    let sim = ParticleSimulation::new(params, inputs).context("Failed to generate the time series")?;
    info!(
        "Generated {} timepoints in {:.3} s (seed {})",
        sim.timepoint_count(),
        start_time.elapsed().as_secs_f64(),
        sim.seed()
    );

    // --- Render and save output batch by batch ---
    std::fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("Failed to create output directory '{}'", args.output_dir.display()))?;
    let base = args.output_dir.join(&config.output.base_filename);

    let mut statistics = if config.output.save_statistics {
        Some(StatisticsWriters::create(&sim, &base)?)
    } else {
        info!("Skipping statistics as per config.");
        None
    };

    let bar = ProgressBar::new(sim.timepoint_count() as u64);
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} timepoints")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    let batch = sim.render_batch_size();
    let mut volumes_saved = 0;
    for start in (0..sim.timepoint_count()).step_by(batch) {
        let rendered = sim.render_range(start..start + batch, |_| bar.inc(1));
        if let Some(writers) = statistics.as_mut() {
            writers.write(&sim, &rendered)?;
        }
        if config.output.save_volumes {
            volumes_saved += write_volumes(&rendered, &base)?;
        }
    }
    bar.finish_and_clear();
    info!("Rendered {} volumes in {:.3} s", sim.timepoint_count(), start_time.elapsed().as_secs_f64());

    if let Some(writers) = statistics {
        writers.finish()?;
    }
    if config.output.save_volumes {
        if volumes_saved == 0 {
            warn!("No volumes to save.");
        } else {
            info!("Saved {} raw volumes (8-bit, x fastest)", volumes_saved);
        }
    }

    if config.output.save_tracks {
        write_json(&with_suffix(&base, "_tracks.json"), sim.tracks())?;
        write_json(&with_suffix(&base, "_merges.json"), sim.merges())?;
    } else {
        info!("Skipping tracks as per config.");
    }

    info!("Simulation Complete.");
    Ok(())
}

fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut name = base.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

struct StatisticsWriters {
    objects: (PathBuf, csv::Writer<File>),
    surface: Option<(PathBuf, csv::Writer<File>)>,
}

impl StatisticsWriters {
    fn create(sim: &ParticleSimulation, base: &Path) -> Result<Self> {
        let objects = csv_writer(with_suffix(base, "_statistics.csv"))?;
        let surface = match sim.surface() {
            Some(_) => Some(csv_writer(with_suffix(base, "_surface.csv"))?),
            None => None,
        };
        Ok(StatisticsWriters { objects, surface })
    }

    fn write(&mut self, sim: &ParticleSimulation, rendered: &[Arc<RenderedTimepoint>]) -> Result<()> {
        for timepoint in rendered {
            for row in object_statistics(sim.params(), timepoint) {
                self.objects.1.serialize(row)?;
            }
        }
        if let (Some((_, writer)), Some(mesh)) = (self.surface.as_mut(), sim.surface()) {
            for timepoint in rendered {
                for row in surface_statistics(sim.params(), mesh, timepoint) {
                    writer.serialize(row)?;
                }
            }
        }
        Ok(())
    }

    fn finish(self) -> Result<()> {
        for (path, mut writer) in std::iter::once(self.objects).chain(self.surface) {
            writer.flush()?;
            info!("Statistics saved to {}", path.display());
        }
        Ok(())
    }
}

fn csv_writer(path: PathBuf) -> Result<(PathBuf, csv::Writer<File>)> {
    let writer = csv::Writer::from_path(&path)
        .with_context(|| format!("Failed to create statistics file '{}'", path.display()))?;
    Ok((path, writer))
}

fn write_json<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create '{}'", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()?;
    info!("Saved {}", path.display());
    Ok(())
}

fn write_volumes(rendered: &[Arc<RenderedTimepoint>], base: &Path) -> Result<usize> {
    for timepoint in rendered {
        let [x, y, z] = timepoint.volume.dims();
        let path = with_suffix(base, &format!("_t{:03}_{}x{}x{}.raw", timepoint.timepoint, x, y, z));
        std::fs::write(&path, timepoint.volume.as_slice())
            .with_context(|| format!("Failed to write volume '{}'", path.display()))?;
    }
    Ok(rendered.len())
}
