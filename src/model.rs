/*
Copyright 2022 Jakub Lewandowski

This file is part of Trajectory Interpolation Grids (TIG).

Trajectory Interpolation Grids (TIG) is a free software: you can redistribute it and/or modify
it under the terms of the GNU General Public License as published by
the Free Software Foundation; either version 3 of the License, or
(at your option) any later version.

Trajectory Interpolation Grids (TIG) is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
GNU General Public License for more details.

You should have received a copy of the GNU General Public License
along with Trajectory Interpolation Grids (TIG). If not, see https://www.gnu.org/licenses/.
*/

//! Module containing the actual model code.
//!
//! The model runs a group of ranks, each on its own worker thread,
//! that together behave like the processes of a distributed host model.
//! Every rank owns a part of the globe and a share of the parcels.
//! At every step the ranks load new winds into their accessors and
//! advance their parcels with a fourth-order Runge-Kutta scheme, exchanging
//! sample points with the ranks that own them. Positions of all parcels,
//! with the winds and static fields sampled along the way, are collected on
//! the main thread and written to `output/trajectories.csv`.
//!
//! Built with the `mpi` feature, the ranks are MPI processes instead and
//! each one writes its own `output/trajectories_rank<N>.csv`.

pub mod configuration;
pub mod distributed;
pub mod grid;
pub mod interop;
pub mod interpolation;
pub mod output;
pub mod synthetic;
pub mod trajectory;


use crate::{
    constants::SECONDS_PER_DAY,
    errors::{AccessorError, ModelError, TrajectoryError},
    model::{
        configuration::{Config, Grid},
        distributed::{AccessorSettings, Calendar, MetAccessor, PointExchange},
        output::{Parcels, Samples, TrajectoryLog},
        synthetic::{level_indices, solid_body, Tile},
    },
    Float, ALLOCATOR,
};
use log::{debug, info};
use std::{fs, path::Path, sync::mpsc::Sender};

#[cfg(not(feature = "mpi"))]
use crate::model::distributed::ChannelExchange;
#[cfg(not(feature = "mpi"))]
use indicatif::{ProgressBar, ProgressStyle};
#[cfg(not(feature = "mpi"))]
use log::error;
#[cfg(not(feature = "mpi"))]
use rayon::{ThreadPool, ThreadPoolBuilder};
#[cfg(not(feature = "mpi"))]
use std::sync::{mpsc, Arc};

/// Fractional model level, loaded once and sampled along the trajectories.
const MODEL_LEVEL: &str = "model_level";
/// Pressure of the lowest model level in hPa.
const SURFACE_PRESSURE: &str = "surface_pressure_2D";

/// Messages sent by ranks to the main thread.
#[derive(Debug)]
#[cfg_attr(feature = "mpi", allow(dead_code))]
enum RankEvent {
    /// Rank finished a timestep.
    Step,
    /// Rank finished the simulation.
    Finished(usize, Result<TrajectoryLog, ModelError>),
}

/// Main model function, responsible for all simulation steps.
///
/// It reads the provided configuration, deploys ranks onto the threadpool
/// and collects their trajectories.
#[cfg(not(feature = "mpi"))]
pub fn main() -> Result<(), ModelError> {
    info!("Preparing the model core");

    // prepare all prerequisites for running the model
    prepare_output_dir()?;

    let model_core = Core::new()?;

    let ranks = model_core.config.partition.ranks;
    let steps = model_core.config.datetime.steps;
    let config = Arc::new(model_core.config);

    info!("Deploying {} ranks with {} parcels", ranks, config.parcels.len());

    // set progress bar for simulated timesteps of all ranks
    let steps_bar = ProgressBar::new((ranks * steps) as u64);
    steps_bar.set_style(
        ProgressStyle::default_bar()
            .template("{prefix} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}")
            .progress_chars("#>-"),
    );
    steps_bar.set_prefix("Simulated steps");

    // deploy ranks on to the threadpool
    let (tx, rx) = mpsc::channel();

    for exchange in ChannelExchange::group(ranks) {
        let tx = tx.clone();
        let config = Arc::clone(&config);

        model_core.threadpool.spawn(move || {
            let rank = exchange.rank();
            let result = run_rank(exchange, &config, &tx);

            // main thread only stops listening after an error was reported
            let _ = tx.send(RankEvent::Finished(rank, result));
        });
    }

    drop(tx);

    let mut trajectories = TrajectoryLog::new();
    let mut finished = vec![false; ranks];
    let mut failure = None;

    while finished.iter().any(|done| !done) {
        let event = match rx.recv() {
            Ok(event) => event,
            Err(_) => {
                let lost = finished.iter().position(|done| !done).unwrap_or(0);
                return Err(ModelError::LostRank(lost));
            }
        };

        match event {
            RankEvent::Step => steps_bar.inc(1),
            RankEvent::Finished(rank, Ok(log)) => {
                debug!("Rank {} finished with {} points", rank, log.points().len());
                finished[rank] = true;
                trajectories.extend(log);
            }
            RankEvent::Finished(rank, Err(err)) => {
                error!("Rank {} stopped due to an error: {}", rank, err);
                // this is neccessary to make sure that all error messages
                // are fully written to stdout before the progress bar updates
                println!();
                finished[rank] = true;
                failure.get_or_insert(err);
            }
        }
    }

    if let Some(err) = failure {
        steps_bar.abandon_with_message("Simulation failed");
        return Err(err);
    }

    steps_bar.finish_with_message("All ranks finished");
    info!("Writing output");

    trajectories.sort();
    trajectories.save(Path::new("./output/trajectories.csv"))?;

    Ok(())
}

/// Main model function of an MPI run.
///
/// Every process hosts one rank and writes the trajectories of its own
/// parcels to `output/trajectories_rank<N>.csv`.
#[cfg(feature = "mpi")]
pub fn main() -> Result<(), ModelError> {
    use crate::model::distributed::MpiExchange;
    use mpi::traits::*;
    use std::sync::mpsc;

    let universe = mpi::initialize().ok_or(ModelError::Mpi("MPI has already been initialised"))?;
    let world = universe.world();
    let rank = world.rank() as usize;

    // only the root touches the output directory, the others wait for its verdict
    let mut ready: i32 = 1;
    if rank == 0 {
        info!("Preparing the model core");

        if let Err(err) = prepare_output_dir() {
            log::error!("{}", err);
            ready = 0;
        }
    }

    world.process_at_rank(0).broadcast_into(&mut ready);
    if ready == 0 {
        return Err(ModelError::FaultyOutput("Output directory could not be prepared"));
    }

    let config = read_config()?;

    if world.size() as usize != config.partition.ranks {
        return Err(ModelError::Mpi("Number of processes differs from partition.ranks"));
    }

    if rank == 0 {
        info!("Running {} ranks with {} parcels", config.partition.ranks, config.parcels.len());
    }

    let (tx, rx) = mpsc::channel();
    let mut trajectories = run_rank(MpiExchange::new(world), &config, &tx)?;
    drop(tx);

    debug!("Rank {} simulated {} steps", rank, rx.iter().count());

    trajectories.sort();
    trajectories.save(Path::new(&format!("./output/trajectories_rank{}.csv", rank)))?;

    Ok(())
}

/// Structure containing model parameters.
#[cfg(not(feature = "mpi"))]
#[derive(Debug)]
pub struct Core {
    pub config: Config,
    pub threadpool: ThreadPool,
}

#[cfg(not(feature = "mpi"))]
impl Core {
    /// Model [`Core`] constructor.
    ///
    /// Before the simulation can start (and to run it safely),
    /// configuration provided by the user must be loaded and checked.
    pub fn new() -> Result<Self, ModelError> {
        let config = read_config()?;

        debug!("Setting up ThreadPool");
        let threadpool = ThreadPoolBuilder::new()
            .num_threads(config.resources.threads as usize)
            .stack_size(2 * 1024 * 1024)
            .build()?;

        Ok(Core { config, threadpool })
    }
}

/// Loads `config.yaml` and caps the memory of the process.
fn read_config() -> Result<Config, ModelError> {
    debug!("Reading configuration from config.yaml");
    let config = Config::new_from_file(Path::new("config.yaml"))?;

    debug!("Setting memory limit");
    ALLOCATOR
        .set_limit(config.resources.memory * 1024 * 1024)
        .map_err(|_| ModelError::MemoryLimit)?;

    Ok(config)
}

/// Makes sure that `./output/` exists and holds no results of previous runs,
/// so they are never overwritten.
fn prepare_output_dir() -> Result<(), ModelError> {
    debug!("Checking and setting output directory");

    let out_path = Path::new("./output/");

    if out_path.is_dir() {
        if out_path.read_dir()?.next().is_none() {
            debug!("Output directory exists but is empty so continuing");
        } else {
            return Err(ModelError::FaultyOutput(
                "Output directory exists and is not empty",
            ));
        }
    } else {
        debug!("Output directory does not exist so creating a new one");
        fs::create_dir(out_path)?;
    }

    Ok(())
}

/// Parcels `[start, end)` released by `rank`.
fn parcel_share(parcels: usize, ranks: usize, rank: usize) -> (usize, usize) {
    (rank * parcels / ranks, (rank + 1) * parcels / ranks)
}

/// Sets up the accessor of a single rank of the synthetic `grid`.
fn rank_accessor<E: PointExchange>(
    exchange: E,
    grid: &Grid,
    ranks: usize,
    settings: AccessorSettings,
    calendar: Calendar,
    ctime: &str,
) -> Result<(MetAccessor<E>, Tile), AccessorError> {
    let tile = Tile::for_rank(grid, ranks, exchange.rank())?;
    let owners = synthetic::cell_owners(grid, ranks);

    let accessor = match &tile {
        Tile::LatLon { lons, lats } => interop::init_latlon(
            exchange,
            &owners,
            (grid.nlons, grid.nlats),
            grid.model_levels,
            lons,
            lats,
            &grid.eta,
            calendar,
            ctime,
            settings,
        )?,
        Tile::Cubed { face, lons, lats } => {
            let last = grid.cube_resolution - 1;
            interop::init_cubed(
                exchange,
                &owners,
                grid.cube_resolution,
                *face,
                (0, last),
                (0, last),
                grid.model_levels,
                lons,
                lats,
                &grid.eta,
                calendar,
                ctime,
                settings,
            )?
        }
    };

    Ok((accessor, tile))
}

/// Moves the parcels that are still active by `dt` days from `ctime`.
///
/// Collective, also on ranks without active parcels.
fn advance<E: PointExchange>(
    met: &MetAccessor<E>,
    ctime: &str,
    dt: Float,
    parcels: &mut Parcels,
) -> Result<(), TrajectoryError> {
    let active: Vec<usize> = (0..parcels.len()).filter(|&n| !parcels.stopped[n]).collect();
    let pick = |values: &[Float]| -> Vec<Float> { active.iter().map(|&n| values[n]).collect() };

    let mut lons = pick(&parcels.lons);
    let mut lats = pick(&parcels.lats);
    let mut levels = pick(&parcels.levels);

    let stopped = interop::rk4_advance(met, ctime, dt, &mut lons, &mut lats, &mut levels)?;

    for (p, &n) in active.iter().enumerate() {
        parcels.lons[n] = lons[p];
        parcels.lats[n] = lats[p];
        parcels.levels[n] = levels[p];
        parcels.stopped[n] = stopped[p];
    }

    Ok(())
}

/// Winds at `ctime` and the static fields loaded at `fixed`, at every parcel.
fn sample_parcels<E: PointExchange>(
    met: &MetAccessor<E>,
    fixed: &str,
    ctime: &str,
    parcels: &Parcels,
) -> Result<Samples, AccessorError> {
    let (lons, lats, levels) = (&parcels.lons, &parcels.lats, &parcels.levels);
    let (u, v, omega) = interop::get_uvw(met, ctime, lons, lats, levels)?;

    Ok(Samples {
        u,
        v,
        omega,
        model_level: interop::get_data(met, fixed, MODEL_LEVEL, lons, lats, levels)?,
        surface_pressure: interop::get_data_2d(met, fixed, SURFACE_PRESSURE, lons, lats)?,
    })
}

/// Simulates all steps on one rank and returns trajectories of its parcels.
fn run_rank<E: PointExchange>(
    exchange: E,
    config: &Config,
    events: &Sender<RankEvent>,
) -> Result<TrajectoryLog, ModelError> {
    let rank = exchange.rank();
    let calendar = Calendar::new(config.datetime.start);
    let dt = config.datetime.timestep / SECONDS_PER_DAY;
    let model_levels = config.grid.model_levels;

    let start = calendar.time_to_cal(0.0)?;
    let settings = config.interpolation.accessor_settings();
    let (mut met, tile) = rank_accessor(
        exchange,
        &config.grid,
        config.partition.ranks,
        settings,
        calendar,
        &start,
    )?;

    let nodes = tile.nodes();
    let columns = solid_body(&config.wind, &nodes, model_levels);
    interop::update_fields(&mut met, &start, &columns.u, &columns.v, &columns.w, &columns.p)?;

    // static fields stay valid at the start time for the whole run
    interop::set_data(&mut met, &start, MODEL_LEVEL, &level_indices(nodes.len(), model_levels))?;
    interop::set_sfc_data(&mut met, &start, SURFACE_PRESSURE, &columns.surface_pressure(nodes.len()))?;

    let (first, last) = parcel_share(config.parcels.len(), config.partition.ranks, rank);
    let released = &config.parcels[first..last];
    debug!("Rank {} releases parcels {}..{}", rank, first, last);

    let mut parcels = Parcels {
        first,
        lons: released.iter().map(|parcel| parcel.lon).collect(),
        lats: released.iter().map(|parcel| parcel.lat).collect(),
        levels: released.iter().map(|parcel| parcel.level).collect(),
        stopped: vec![false; released.len()],
    };

    let mut trajectories = TrajectoryLog::new();
    let samples = sample_parcels(&met, &start, &start, &parcels)?;
    trajectories.record(calendar.time_to_date(0.0)?, &parcels, &samples);

    for step in 0..config.datetime.steps {
        let time = step as Float * dt;
        let next = time + dt;
        let ctime = calendar.time_to_cal(time)?;
        let next_ctime = calendar.time_to_cal(next)?;

        // winds must bracket the whole step before parcels move
        interop::update_fields(&mut met, &next_ctime, &columns.u, &columns.v, &columns.w, &columns.p)?;

        advance(&met, &ctime, dt, &mut parcels)?;

        let samples = sample_parcels(&met, &start, &next_ctime, &parcels)?;
        trajectories.record(calendar.time_to_date(next)?, &parcels, &samples);

        // a closed channel only means that the main thread gave up
        let _ = events.send(RankEvent::Step);
    }

    let stopped = parcels.stopped.iter().filter(|flag| **flag).count();
    if stopped > 0 {
        info!("Rank {} stopped {} parcels without winds", rank, stopped);
    }

    Ok(trajectories)
}

#[cfg(test)]
mod tests {
    use super::{parcel_share, run_rank, RankEvent};
    use crate::model::configuration::Config;
    use crate::model::distributed::ChannelExchange;
    use crate::model::output::TrajectoryPoint;
    use float_cmp::approx_eq;
    use std::sync::mpsc;
    use std::thread;

    const CONFIG: &str = "
grid:
  nlons: 36
  nlats: 19
  model_levels: 5
  eta: [900.0, 700.0, 500.0, 300.0]
partition:
  ranks: 2
wind:
  equator_speed: 10.0
datetime:
  start: 2021-01-01T00:00:00
  timestep: 3600.0
  steps: 6
parcels:
  - { lon: 0.0, lat: 0.0, level: 500.0 }
  - { lon: 100.0, lat: 45.0, level: 700.0 }
  - { lon: 200.0, lat: -30.0, level: 800.0 }
resources:
  threads: 2
";

    #[test]
    fn shares_cover_all_parcels() {
        assert_eq!(parcel_share(3, 2, 0), (0, 1));
        assert_eq!(parcel_share(3, 2, 1), (1, 3));
        assert_eq!(parcel_share(1, 3, 0), (0, 0));
        assert_eq!(parcel_share(1, 3, 2), (0, 1));
    }

    fn run_group(config: &Config) -> (Vec<TrajectoryPoint>, usize) {
        let (tx, rx) = mpsc::channel();

        let handles: Vec<_> = ChannelExchange::group(config.partition.ranks)
            .into_iter()
            .map(|exchange| {
                let config = config.clone();
                let tx = tx.clone();
                thread::spawn(move || run_rank(exchange, &config, &tx))
            })
            .collect();

        let mut points = Vec::new();
        for handle in handles {
            let log = handle.join().unwrap().unwrap();
            points.extend_from_slice(log.points());
        }

        drop(tx);
        let steps = rx.iter().filter(|event| matches!(event, RankEvent::Step)).count();

        (points, steps)
    }

    fn equator_end(points: &[TrajectoryPoint]) -> TrajectoryPoint {
        *points.iter().filter(|point| point.parcel == 0).last().unwrap()
    }

    // six hours of 10 m/s along the equator
    fn expected_lon() -> f64 {
        (6.0 * 3600.0 * 10.0 / 1000.0 / 6371.0_f64).to_degrees()
    }

    #[test]
    fn ranks_follow_rotation() {
        let config = Config::new_from_slice(CONFIG.as_bytes()).unwrap();
        let (points, steps) = run_group(&config);

        assert_eq!(steps, 12);
        assert_eq!(points.len(), 3 * 7);
        assert!(points.iter().all(|point| !point.stopped));

        let end = equator_end(&points);
        assert!(approx_eq!(f64, end.lon, expected_lon(), epsilon = 1e-6));
        assert!(approx_eq!(f64, end.lat, 0.0, epsilon = 1e-9));
        assert!(approx_eq!(f64, end.level, 500.0, epsilon = 1e-9));

        // samples travel with the parcel, 500 hPa sits at 2.22 of five levels spanning 1000-100 hPa
        assert!(end.u > 9.8 && end.u < 10.0 + 1e-9);
        assert!(approx_eq!(f64, end.omega, 0.0, epsilon = 1e-12));
        assert!(approx_eq!(f64, end.surface_pressure, 1000.0, epsilon = 1e-9));
        assert!(approx_eq!(f64, end.model_level, 500.0 / 225.0, epsilon = 1e-9));
    }

    #[test]
    fn served_run_matches_local_run() {
        let local = Config::new_from_slice(CONFIG.as_bytes()).unwrap();
        let served = CONFIG.replace("wind:", "interpolation:\n  gridpoint_server: true\nwind:");
        let served = Config::new_from_slice(served.as_bytes()).unwrap();

        let (a, _) = run_group(&local);
        let (b, _) = run_group(&served);

        assert_eq!(a.len(), b.len());
        for (a, b) in a.iter().zip(&b) {
            assert_eq!((a.parcel, a.datetime), (b.parcel, b.datetime));
            assert!(approx_eq!(f64, a.lon, b.lon, epsilon = 1e-12));
            assert!(approx_eq!(f64, a.lat, b.lat, epsilon = 1e-12));
            assert!(approx_eq!(f64, a.u, b.u, epsilon = 1e-12));
            assert!(approx_eq!(f64, a.model_level, b.model_level, epsilon = 1e-12));
        }
    }

    #[test]
    fn cube_ranks_follow_rotation() {
        let yaml = CONFIG
            .replace("nlats: 19", "nlats: 19\n  topology: Cubed\n  cube_resolution: 4")
            .replace("ranks: 2", "ranks: 6")
            .replace("threads: 2", "threads: 6");
        let config = Config::new_from_slice(yaml.as_bytes()).unwrap();
        let (points, steps) = run_group(&config);

        assert_eq!(steps, 36);
        assert_eq!(points.len(), 3 * 7);
        assert!(points.iter().all(|point| !point.stopped));

        // face nodes sit off the equator, where the rotation is slower
        let end = equator_end(&points);
        assert!(end.lon < expected_lon() + 1e-9);
        assert!(end.lon > 0.95 * expected_lon());
        assert!(approx_eq!(f64, end.lat, 0.0, epsilon = 1e-6));
        assert!(approx_eq!(f64, end.surface_pressure, 1000.0, epsilon = 1e-9));
        assert!(approx_eq!(f64, end.model_level, 500.0 / 225.0, epsilon = 1e-9));
    }
}
