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

//! Entry points for a hosting model.
//!
//! Times cross this boundary as calendar strings. Arrays are parallel,
//! one element per point, and local fields are `(level, lat, lon)` ordered.

use crate::errors::{AccessorError, TrajectoryError};
use crate::model::distributed::{
    AccessorSettings, Calendar, Geometry, MetAccessor, PartitionMap, PointExchange,
};
use crate::model::grid::{CubedSphereGrid, Horizontal, LatLonGrid, WrapMode};
use crate::model::trajectory::{PlanetNav, RungeKutta4};
use crate::Float;
use log::debug;

/// Accessor for a rank holding a band of a global lat-lon grid.
///
/// `cell_to_rank` is the row-major `(lat, lon)` ownership table of the
/// global grid; `lons` and `lats` are the local axes including halo.
#[allow(clippy::too_many_arguments)]
pub fn init_latlon<E: PointExchange>(
    exchange: E,
    cell_to_rank: &[usize],
    (nlons_global, nlats_global): (usize, usize),
    model_levels: usize,
    lons: &[Float],
    lats: &[Float],
    eta: &[Float],
    calendar: Calendar,
    ctime: &str,
    settings: AccessorSettings,
) -> Result<MetAccessor<E>, AccessorError> {
    let partition = PartitionMap::latlon(nlons_global, nlats_global, cell_to_rank)?;
    let grid = LatLonGrid::new(lons.to_vec(), lats.to_vec(), WrapMode::Detect)?;

    let geometry = Geometry {
        horizontal: Horizontal::LatLon(grid),
        model_levels,
        eta: eta.to_vec(),
    };

    MetAccessor::new(exchange, partition, geometry, calendar, ctime, settings)
}

/// Accessor for a rank holding one tile of a cubed-sphere face.
///
/// `cell_to_rank` has `6 * im` rows (faces stacked) of `im` cells; the
/// local coordinate arrays hold one value per node, halo included.
#[allow(clippy::too_many_arguments)]
pub fn init_cubed<E: PointExchange>(
    exchange: E,
    cell_to_rank: &[usize],
    im: usize,
    face: usize,
    i_range: (usize, usize),
    j_range: (usize, usize),
    model_levels: usize,
    lons: &[Float],
    lats: &[Float],
    eta: &[Float],
    calendar: Calendar,
    ctime: &str,
    settings: AccessorSettings,
) -> Result<MetAccessor<E>, AccessorError> {
    let partition = PartitionMap::cubed(im, cell_to_rank)?;
    let grid = CubedSphereGrid::new(im, face, i_range, j_range, lons.to_vec(), lats.to_vec())?;

    let geometry = Geometry {
        horizontal: Horizontal::Cubed(grid),
        model_levels,
        eta: eta.to_vec(),
    };

    MetAccessor::new(exchange, partition, geometry, calendar, ctime, settings)
}

pub fn update_fields<E: PointExchange>(
    handle: &mut MetAccessor<E>,
    ctime: &str,
    u: &[Float],
    v: &[Float],
    w: &[Float],
    p: &[Float],
) -> Result<(), AccessorError> {
    handle.update_fields(ctime, u, v, w, p)
}

pub fn set_data<E: PointExchange>(
    handle: &mut MetAccessor<E>,
    ctime: &str,
    quantity: &str,
    values: &[Float],
) -> Result<(), AccessorError> {
    handle.set_data(ctime, quantity, values)
}

pub fn set_sfc_data<E: PointExchange>(
    handle: &mut MetAccessor<E>,
    ctime: &str,
    quantity: &str,
    values: &[Float],
) -> Result<(), AccessorError> {
    handle.set_sfc_data(ctime, quantity, values)
}

pub fn get_data<E: PointExchange>(
    handle: &MetAccessor<E>,
    ctime: &str,
    quantity: &str,
    lons: &[Float],
    lats: &[Float],
    levs: &[Float],
) -> Result<Vec<Float>, AccessorError> {
    handle.get_data(ctime, quantity, lons, lats, levs)
}

pub fn get_data_2d<E: PointExchange>(
    handle: &MetAccessor<E>,
    ctime: &str,
    quantity: &str,
    lons: &[Float],
    lats: &[Float],
) -> Result<Vec<Float>, AccessorError> {
    handle.get_data_2d(ctime, quantity, lons, lats)
}

pub fn get_uvw<E: PointExchange>(
    handle: &MetAccessor<E>,
    ctime: &str,
    lons: &[Float],
    lats: &[Float],
    levs: &[Float],
) -> Result<(Vec<Float>, Vec<Float>, Vec<Float>), AccessorError> {
    let time = handle.cal_to_time(ctime)?;
    handle.get_uvw(time, lons, lats, levs)
}

/// Advances parcels in place by `dt` days from `ctime`.
///
/// Returns a flag per parcel, set where the parcel could not be moved.
pub fn rk4_advance<E: PointExchange>(
    handle: &MetAccessor<E>,
    ctime: &str,
    dt: Float,
    lons: &mut [Float],
    lats: &mut [Float],
    levs: &mut [Float],
) -> Result<Vec<bool>, TrajectoryError> {
    let time = handle.cal_to_time(ctime)?;
    let mut flags = vec![false; lons.len()];

    RungeKutta4::new(PlanetNav::default()).go_batch(lons, lats, levs, &mut flags, time, handle, dt)?;

    debug!(
        "Rank {} advanced {} of {} parcels from {}",
        handle.rank(),
        flags.iter().filter(|flag| !**flag).count(),
        flags.len(),
        ctime
    );

    Ok(flags)
}
