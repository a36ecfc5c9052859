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

//! Module containing constants used by the model.

use crate::Float;

/// Mean radius of the Earth sphere (km) used for parcel navigation.
pub const EARTH_RADIUS_KM: Float = 6371.0;

/// Number of seconds in one day of model time.
pub const SECONDS_PER_DAY: Float = 86_400.0;

/// Latitude (in degrees) poleward of which vector components
/// are rotated into a common frame before averaging.
pub const NEAR_POLE: Float = 88.0;

/// Default sentinel marking missing samples.
pub const DEFAULT_FILL_VALUE: Float = 1.0e15;

/// Default factor applied to raw vertical velocity and pressure (Pa -> hPa).
pub const DEFAULT_WFCTR: Float = 0.01;

/// Longitudes and latitudes of two grids closer than this (in degrees)
/// are considered equal.
pub const COORD_TOLERANCE: Float = 0.001;

/// Query latitudes this close (in degrees) beyond the outermost
/// latitude row are still bracketed by that row.
pub const LAT_EDGE_TOLERANCE: Float = 0.0001;

/// Maximum difference (in days) between a field time and a request time
/// that is not reported as mismatch.
pub const TIME_TOLERANCE: Float = 1.0e-8;

/// Rotation of the cubed-sphere panels against Greenwich (10 degrees in radians).
#[allow(clippy::excessive_precision)]
pub const CUBE_LON_SHIFT: Float = 0.174_532_925_199_433;

/// Half of the panel angular width, `atan(1/sqrt(2))`.
#[allow(clippy::excessive_precision)]
pub const CUBE_ALPHA: Float = 0.615_479_708_670_387;

/// Tolerance used to decide on which cube face a point lies.
pub const CUBE_FACE_TOLERANCE: Float = 1.0e-6;
