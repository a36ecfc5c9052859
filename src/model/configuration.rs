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

//! Module responsible for parsing and checking the configuration file.
//!
//! The configuration file uses [YAML](https://en.wikipedia.org/wiki/YAML)
//! and `serde` to enforce strong typing and automatic type checking.
//!
//! The structures and their fields in this module directly correspond to
//! the fields inside `config.yaml` so you can check this documentation
//! for more details how to set the config file.

use crate::constants::{DEFAULT_FILL_VALUE, DEFAULT_WFCTR};
use crate::errors::ConfigError;
use crate::model::distributed::{AccessorSettings, TimePolicy};
use crate::model::interpolation::{BilinearHinterp, VerticalScheme, Vinterp, Weighting};
use crate::Float;
use chrono::NaiveDateTime;
use serde::Deserialize;
use std::{fs, path::Path};

/// Horizontal grid topology of the simulated model.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Deserialize)]
pub enum Topology {
    /// Global regular grid split into latitude bands.
    LatLon,
    /// Cubed sphere with one face per rank.
    Cubed,
}

/// Fields describing the global grid of the host model.
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct Grid {
    /// _(Optional)_ Defaults to `LatLon`.
    #[serde(default = "Grid::default_topology")]
    pub topology: Topology,

    /// Number of longitudes of the global lat-lon grid.
    ///
    /// Cannot be less than `4` for the `LatLon` topology.
    #[serde(default)]
    pub nlons: usize,

    /// Number of latitudes of the global lat-lon grid, poles included.
    ///
    /// Cannot be less than `3` for the `LatLon` topology.
    #[serde(default)]
    pub nlats: usize,

    /// Cells along each edge of a cube face.
    ///
    /// Cannot be less than `2` for the `Cubed` topology.
    #[serde(default)]
    pub cube_resolution: usize,

    /// Number of model levels in the raw columns.
    ///
    /// Cannot be less than `2`.
    pub model_levels: usize,

    /// Pressure levels (in hPa) on which winds are interpolated.
    ///
    /// Must be strictly monotonic and positive.
    pub eta: Vec<Float>,
}

impl Grid {
    fn default_topology() -> Topology {
        Topology::LatLon
    }

    pub fn check_bounds(&self) -> Result<(), ConfigError> {
        match self.topology {
            Topology::LatLon => {
                if self.nlons < 4 || self.nlats < 3 {
                    return Err(ConfigError::OutOfBounds(
                        "Lat-lon grid needs at least 4 longitudes and 3 latitudes",
                    ));
                }
            }
            Topology::Cubed => {
                if self.cube_resolution < 2 {
                    return Err(ConfigError::OutOfBounds(
                        "Cube resolution cannot be less than 2",
                    ));
                }
            }
        }

        if self.model_levels < 2 {
            return Err(ConfigError::OutOfBounds(
                "Number of model levels cannot be less than 2",
            ));
        }

        if self.eta.is_empty() || self.eta.iter().any(|level| !(level.is_finite() && *level > 0.0)) {
            return Err(ConfigError::OutOfBounds(
                "Interpolation levels must be positive pressures",
            ));
        }

        let increasing = self.eta.windows(2).all(|pair| pair[0] < pair[1]);
        let decreasing = self.eta.windows(2).all(|pair| pair[0] > pair[1]);

        if !(increasing || decreasing) {
            return Err(ConfigError::OutOfBounds(
                "Interpolation levels must be strictly monotonic",
            ));
        }

        Ok(())
    }
}

/// Fields describing how the globe is split between ranks.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Deserialize)]
pub struct Partition {
    /// Number of simulated ranks.
    ///
    /// Cannot be less than `1`. Must be `6` for the `Cubed` topology
    /// and cannot exceed the number of latitudes for `LatLon`.
    pub ranks: usize,
}

impl Partition {
    pub fn check_bounds(&self, grid: &Grid) -> Result<(), ConfigError> {
        if self.ranks < 1 {
            return Err(ConfigError::OutOfBounds("Number of ranks cannot be less than 1"));
        }

        match grid.topology {
            Topology::LatLon if self.ranks > grid.nlats => Err(ConfigError::OutOfBounds(
                "Every rank needs at least one latitude row",
            )),
            Topology::Cubed if self.ranks != 6 => Err(ConfigError::OutOfBounds(
                "Cubed sphere runs need exactly one rank per face",
            )),
            _ => Ok(()),
        }
    }
}

/// _(Optional)_ Fields choosing interpolation methods.
#[derive(Copy, Clone, PartialEq, Debug, Deserialize)]
pub struct Interpolation {
    /// _(Optional)_ Rotate wind vectors into a common frame near the poles.
    ///
    /// Defaults to `true`.
    #[serde(default = "Interpolation::default_conformal")]
    pub conformal: bool,

    /// _(Optional)_ `GreatCircle` (default) or `Planar`.
    #[serde(default = "Interpolation::default_weighting")]
    pub weighting: Weighting,

    /// _(Optional)_ `Linear` (default) or `LogLinear`.
    #[serde(default = "Interpolation::default_vertical")]
    pub vertical: VerticalScheme,

    /// _(Optional)_ Handling of times outside the loaded snapshots,
    /// `Extrapolate` (default) or `Clamp`.
    #[serde(default)]
    pub time_policy: TimePolicy,

    /// _(Optional)_ Marker of missing values. Defaults to `1.0e15`.
    #[serde(default = "Interpolation::default_fill_value")]
    pub fill_value: Float,

    /// _(Optional)_ Factor converting input pressure and vertical velocity
    /// to the units of interpolation levels. Defaults to `0.01` (Pa to hPa).
    #[serde(default = "Interpolation::default_wfctr")]
    pub wfctr: Float,

    /// _(Optional)_ Publish every loaded field on an in-memory gridpoint
    /// server and fetch interpolation corners through it in batches.
    ///
    /// Defaults to `false`, corners are then read from local arrays.
    #[serde(default)]
    pub gridpoint_server: bool,
}

impl Interpolation {
    fn default_conformal() -> bool {
        true
    }

    fn default_weighting() -> Weighting {
        Weighting::GreatCircle
    }

    fn default_vertical() -> VerticalScheme {
        VerticalScheme::Linear
    }

    fn default_fill_value() -> Float {
        DEFAULT_FILL_VALUE
    }

    fn default_wfctr() -> Float {
        DEFAULT_WFCTR
    }

    pub fn check_bounds(&self) -> Result<(), ConfigError> {
        if !self.fill_value.is_finite() {
            return Err(ConfigError::OutOfBounds("Fill value must be a finite number"));
        }

        if !(self.wfctr.is_finite() && self.wfctr > 0.0) {
            return Err(ConfigError::OutOfBounds(
                "Pressure conversion factor must be positive",
            ));
        }

        Ok(())
    }

    pub fn accessor_settings(&self) -> AccessorSettings {
        let hinterp = BilinearHinterp::new(self.conformal, self.weighting);

        AccessorSettings {
            hinterp: if self.gridpoint_server { hinterp } else { hinterp.local() },
            vinterp: Vinterp::new(self.vertical),
            time_policy: self.time_policy,
            wfctr: self.wfctr,
            fill_value: self.fill_value,
        }
    }
}

impl Default for Interpolation {
    fn default() -> Self {
        Interpolation {
            conformal: Interpolation::default_conformal(),
            weighting: Interpolation::default_weighting(),
            vertical: Interpolation::default_vertical(),
            time_policy: TimePolicy::default(),
            fill_value: Interpolation::default_fill_value(),
            wfctr: Interpolation::default_wfctr(),
            gridpoint_server: false,
        }
    }
}

/// Fields of the idealised atmosphere fed to the ranks.
#[derive(Copy, Clone, PartialEq, Debug, Deserialize)]
pub struct Wind {
    /// Zonal wind (in m/s) at the equator of a solid-body rotation.
    ///
    /// Must meet the condition: `|equator_speed| < 200`
    pub equator_speed: Float,

    /// _(Optional)_ Uniform vertical velocity in Pa/s. Defaults to `0`.
    #[serde(default)]
    pub omega: Float,

    /// _(Optional)_ Pressure (in hPa) of the lowest model level. Defaults to `1000`.
    #[serde(default = "Wind::default_surface_pressure")]
    pub surface_pressure: Float,

    /// _(Optional)_ Pressure (in hPa) of the highest model level. Defaults to `100`.
    #[serde(default = "Wind::default_top_pressure")]
    pub top_pressure: Float,
}

impl Wind {
    fn default_surface_pressure() -> Float {
        1000.0
    }

    fn default_top_pressure() -> Float {
        100.0
    }

    pub fn check_bounds(&self) -> Result<(), ConfigError> {
        if !(self.equator_speed.abs() < 200.0) {
            return Err(ConfigError::OutOfBounds("Equatorial wind speed is too high"));
        }

        if !self.omega.is_finite() {
            return Err(ConfigError::OutOfBounds("Vertical velocity must be a finite number"));
        }

        if !(self.top_pressure > 0.0 && self.top_pressure < self.surface_pressure) {
            return Err(ConfigError::OutOfBounds(
                "Top pressure must be positive and below the surface pressure",
            ));
        }

        Ok(())
    }
}

/// Fields with information about time used by model.
#[derive(Clone, PartialEq, PartialOrd, Debug, Deserialize)]
pub struct DateTime {
    /// Start datetime for the model, also the epoch of model time.
    pub start: NaiveDateTime,

    /// Timestep (in seconds) used by the model.
    ///
    /// Cannot be less than `1`.
    pub timestep: Float,

    /// Number of timesteps to simulate.
    ///
    /// Cannot be less than `1`.
    pub steps: usize,
}

impl DateTime {
    pub fn check_bounds(&self) -> Result<(), ConfigError> {
        if !(self.timestep >= 1.0) {
            return Err(ConfigError::OutOfBounds("Timestep cannot be smaller than 1 s"));
        }

        if self.steps < 1 {
            return Err(ConfigError::OutOfBounds("Number of steps cannot be less than 1"));
        }

        Ok(())
    }
}

/// Starting position of a single parcel.
#[derive(Copy, Clone, PartialEq, PartialOrd, Debug, Deserialize)]
pub struct ParcelStart {
    /// Longitude in degrees.
    pub lon: Float,

    /// Latitude in degrees, `-90 <= lat <= 90`.
    pub lat: Float,

    /// Pressure level in hPa.
    pub level: Float,
}

impl ParcelStart {
    pub fn check_bounds(&self) -> Result<(), ConfigError> {
        if !self.lon.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(ConfigError::OutOfBounds("Parcel position is not on the globe"));
        }

        if !(self.level.is_finite() && self.level > 0.0) {
            return Err(ConfigError::OutOfBounds("Parcel level must be a positive pressure"));
        }

        Ok(())
    }
}

/// _(Optional)_ Fields with information about
/// resources available for model.
#[derive(Clone, PartialEq, PartialOrd, Debug, Deserialize)]
pub struct Resources {
    /// _(Optional)_ Thread count used by the model.
    /// Every rank runs on its own worker, so it cannot be less
    /// than the number of ranks.
    ///
    /// Defaults to `1`.
    #[serde(default = "Resources::default_threads")]
    pub threads: u16,

    /// _(Optional)_ Heap memory limit for the model in MB.
    /// Useful for enabling meaningful Out-of-memory error messages.
    ///
    /// Cannot be less than `128`. Defaults to whole addressable-space.
    #[serde(default = "Resources::default_memory")]
    pub memory: usize,
}

impl Resources {
    fn default_threads() -> u16 {
        1
    }

    fn default_memory() -> usize {
        usize::MAX / (1024 * 1024)
    }

    /// Checks if thread count and memory limit are
    /// above limits.
    pub fn check_bounds(&self, partition: &Partition) -> Result<(), ConfigError> {
        // under MPI every process hosts a single rank
        if cfg!(not(feature = "mpi")) && usize::from(self.threads) < partition.ranks.max(1) {
            return Err(ConfigError::OutOfBounds(
                "Available threads cannot be less than the number of ranks",
            ));
        }

        if self.memory < 128 {
            return Err(ConfigError::OutOfBounds(
                "Available memory cannot be less than 128 MB",
            ));
        }

        Ok(())
    }
}

impl Default for Resources {
    fn default() -> Self {
        Resources {
            threads: Resources::default_threads(),
            memory: Resources::default_memory(),
        }
    }
}

/// Main config structure representing the fields in
/// configuration file.
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct Config {
    pub grid: Grid,

    pub partition: Partition,

    #[serde(default)]
    pub interpolation: Interpolation,

    pub wind: Wind,

    pub datetime: DateTime,

    pub parcels: Vec<ParcelStart>,

    #[serde(default)]
    pub resources: Resources,
}

impl Config {
    /// Config structure constructor, responsible for
    /// deserializing configuration and checking it.
    pub fn new_from_file(file_path: &Path) -> Result<Config, ConfigError> {
        let data = fs::read(file_path)?;
        Config::new_from_slice(data.as_slice())
    }

    pub fn new_from_slice(data: &[u8]) -> Result<Config, ConfigError> {
        let config: Config = serde_yaml::from_slice(data)?;
        config.check_bounds()?;

        Ok(config)
    }

    fn check_bounds(&self) -> Result<(), ConfigError> {
        self.grid.check_bounds()?;
        self.partition.check_bounds(&self.grid)?;
        self.interpolation.check_bounds()?;
        self.wind.check_bounds()?;
        self.datetime.check_bounds()?;
        self.resources.check_bounds(&self.partition)?;

        if self.parcels.is_empty() {
            return Err(ConfigError::OutOfBounds("At least one parcel must be released"));
        }

        for parcel in &self.parcels {
            parcel.check_bounds()?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Config, Topology};
    use crate::errors::ConfigError;
    use crate::model::distributed::TimePolicy;
    use crate::model::grid::Fetch;
    use crate::model::interpolation::Weighting;

    const SAMPLE: &str = "
grid:
  nlons: 72
  nlats: 37
  model_levels: 10
  eta: [900.0, 700.0, 500.0, 300.0]
partition:
  ranks: 3
interpolation:
  weighting: Planar
  time_policy: Clamp
wind:
  equator_speed: 20.0
datetime:
  start: 2021-01-01T00:00:00
  timestep: 3600.0
  steps: 24
parcels:
  - { lon: 0.0, lat: 45.0, level: 500.0 }
resources:
  threads: 4
";

    #[test]
    fn sample_with_defaults() {
        let config = Config::new_from_slice(SAMPLE.as_bytes()).unwrap();

        assert_eq!(config.grid.topology, Topology::LatLon);
        assert_eq!(config.partition.ranks, 3);
        assert_eq!(config.interpolation.weighting, Weighting::Planar);
        assert_eq!(config.interpolation.time_policy, TimePolicy::Clamp);
        assert!(config.interpolation.conformal);
        assert_eq!(config.wind.surface_pressure, 1000.0);
        assert_eq!(config.parcels.len(), 1);

        let settings = config.interpolation.accessor_settings();
        assert_eq!(settings.fill_value, 1.0e15);
        assert_eq!(settings.wfctr, 0.01);
        assert_eq!(settings.hinterp.fetch, Fetch::Local);

        let served = SAMPLE.replace("time_policy: Clamp", "time_policy: Clamp\n  gridpoint_server: true");
        let config = Config::new_from_slice(served.as_bytes()).unwrap();
        assert_eq!(config.interpolation.accessor_settings().hinterp.fetch, Fetch::Auto);
    }

    fn rejected(from: &str, to: &str) -> bool {
        matches!(
            Config::new_from_slice(SAMPLE.replace(from, to).as_bytes()),
            Err(ConfigError::OutOfBounds(_))
        )
    }

    #[test]
    fn bounds() {
        assert!(rejected("ranks: 3", "ranks: 5"));
        assert!(rejected("ranks: 3", "ranks: 40"));
        assert!(rejected("eta: [900.0, 700.0, 500.0, 300.0]", "eta: [900.0, 300.0, 500.0]"));
        assert!(rejected("timestep: 3600.0", "timestep: 0.5"));
        assert!(rejected("lat: 45.0", "lat: 95.0"));
        assert!(rejected("equator_speed: 20.0", "equator_speed: 250.0"));
        assert!(rejected("nlats: 37", "nlats: 37\n  topology: Cubed"));
    }
}
