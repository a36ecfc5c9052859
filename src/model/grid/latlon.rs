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

//! Regular latitude-longitude topology.
//!
//! Axes are one-dimensional and monotonic in either direction.
//! Grids covering the whole globe wrap around in longitude, so
//! bracketing across the seam uses a virtual index `nlons` (or `-1`)
//! pointing back at the first (last) column shifted by a full circle.

use super::bisection::find_left_closest;
use super::{CellCorners, GridTopology};
use crate::constants::{COORD_TOLERANCE, LAT_EDGE_TOLERANCE};
use crate::errors::{GridError, SearchError};
use crate::Float;

/// How the longitudinal wrapping of the grid is determined.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum WrapMode {
    /// Guess from the longitude spacing.
    Detect,
    Wrap,
    NoWrap,
}

#[derive(Clone, PartialEq, Debug)]
pub struct LatLonGrid {
    lons: Vec<Float>,
    lats: Vec<Float>,
    lon_dir: i8,
    lat_dir: i8,
    wraps: bool,
}

impl LatLonGrid {
    /// Builds the topology from longitude and latitude axes.
    ///
    /// Longitudes after the first one are brought into the
    /// full circle starting at the first longitude.
    pub fn new(lons: Vec<Float>, lats: Vec<Float>, mode: WrapMode) -> Result<Self, GridError> {
        if lons.len() < 2 || lats.len() < 2 {
            return Err(GridError::BadDataRequest(
                "lat-lon axes need at least two points each",
            ));
        }

        if lons.iter().chain(lats.iter()).any(|v| !v.is_finite()) {
            return Err(GridError::BadDataRequest("axis values must be finite"));
        }

        if lats.iter().any(|lat| lat.abs() > 90.0 + LAT_EDGE_TOLERANCE) {
            return Err(GridError::BadDataRequest("latitudes must lie within [-90, 90]"));
        }

        let lon_dir = if lons[1] > lons[0] { 1 } else { -1 };
        let lat_dir = if lats[1] > lats[0] { 1 } else { -1 };

        let mut grid = LatLonGrid {
            lons,
            lats,
            lon_dir,
            lat_dir,
            wraps: false,
        };

        for i in 1..grid.lons.len() {
            grid.lons[i] = grid.wrap_longitude(grid.lons[i]);
        }

        if !is_monotonic(&grid.lons) || !is_monotonic(&grid.lats) {
            return Err(GridError::BadDataRequest("axes must be strictly monotonic"));
        }

        grid.wraps = match mode {
            WrapMode::Wrap => true,
            WrapMode::NoWrap => false,
            WrapMode::Detect => grid.detect_wraps(),
        };

        Ok(grid)
    }

    /// Global grid with regularly spaced longitudes starting at 0
    /// and latitudes from pole to pole.
    pub fn global(nlons: usize, nlats: usize) -> Result<Self, GridError> {
        if nlons < 2 || nlats < 2 {
            return Err(GridError::BadDataRequest("global grid needs at least 2x2 points"));
        }

        let dlon = 360.0 / nlons as Float;
        let dlat = 180.0 / (nlats - 1) as Float;

        let lons = (0..nlons).map(|i| i as Float * dlon).collect();
        let lats = (0..nlats).map(|j| -90.0 + j as Float * dlat).collect();

        LatLonGrid::new(lons, lats, WrapMode::Wrap)
    }

    fn detect_wraps(&self) -> bool {
        let n = self.lons.len();
        let dlon = self.lons[1] - self.lons[0];

        let past_end = if dlon > 0.0 {
            self.lons[n - 1] + dlon - 360.0
        } else {
            self.lons[n - 1] + dlon + 360.0
        };

        (past_end - self.lons[0]).abs() < (dlon / 4.0).abs()
    }

    pub fn longitudes(&self) -> &[Float] {
        &self.lons
    }

    pub fn latitudes(&self) -> &[Float] {
        &self.lats
    }

    pub fn lon_dir(&self) -> i8 {
        self.lon_dir
    }

    pub fn lat_dir(&self) -> i8 {
        self.lat_dir
    }

    /// Brings a (finite) longitude into `[lons[0], lons[0]+360)`,
    /// or `(lons[0]-360, lons[0]]` for decreasing longitudes.
    fn wrap_longitude(&self, lon: Float) -> Float {
        let start = self.lons[0];

        if self.lon_dir > 0 {
            let end = start + 360.0;
            if lon >= start && lon < end {
                return lon;
            }

            let mut lon = start + (lon - start).rem_euclid(360.0);
            for _ in 0..4 {
                if lon < start {
                    lon += 360.0;
                } else if lon >= end {
                    lon -= 360.0;
                } else {
                    return lon;
                }
            }
            start
        } else {
            let end = start - 360.0;
            if lon <= start && lon > end {
                return lon;
            }

            let mut lon = start - (start - lon).rem_euclid(360.0);
            for _ in 0..4 {
                if lon > start {
                    lon -= 360.0;
                } else if lon <= end {
                    lon += 360.0;
                } else {
                    return lon;
                }
            }
            start
        }
    }

    /// Longitude index brought into the valid range for wrapping grids.
    pub fn iwrap(&self, i: isize) -> Result<usize, GridError> {
        let n = self.lons.len() as isize;

        if self.wraps {
            Ok(i.rem_euclid(n) as usize)
        } else if (0..n).contains(&i) {
            Ok(i as usize)
        } else {
            Err(GridError::BadDataIndex)
        }
    }

    /// Longitude of the (possibly virtual) column `i`.
    pub fn longitude(&self, i: isize) -> Result<Float, GridError> {
        let n = self.lons.len() as isize;
        let base = self.lons[self.iwrap(i)?];
        let turns = i.div_euclid(n) as Float;

        Ok(base + turns * 360.0 * Float::from(self.lon_dir))
    }

    pub fn latitude(&self, j: usize) -> Result<Float, GridError> {
        self.lats
            .get(j)
            .copied()
            .ok_or(GridError::BadDataRequest("latitude index out of range"))
    }

    /// Pair of column indices bracketing the (wrapped) longitude.
    pub fn lonindex(&self, lon: Float) -> Result<(isize, isize), GridError> {
        let lon = self.wrap(lon)?;
        let n = self.lons.len();

        match find_left_closest(&self.lons, &lon) {
            Ok(i) if i < n - 1 => Ok((i as isize, i as isize + 1)),
            Ok(i) => {
                if lon == self.lons[i] {
                    Ok((i as isize - 1, i as isize))
                } else if self.wraps {
                    Ok((i as isize, i as isize + 1))
                } else {
                    Err(GridError::BadDataIndex)
                }
            }
            Err(SearchError::OutOfBounds) if self.wraps => Ok((n as isize - 1, n as isize)),
            Err(err) => Err(err.into()),
        }
    }

    /// Pair of row indices bracketing the latitude.
    pub fn latindex(&self, lat: Float) -> Result<(usize, usize), GridError> {
        let n = self.lats.len();

        match find_left_closest(&self.lats, &lat) {
            Ok(j) if j < n - 1 => Ok((j, j + 1)),
            Ok(_) => Ok((n - 2, n - 1)),
            Err(SearchError::OutOfBounds) => {
                if (lat - self.lats[0]).abs() <= LAT_EDGE_TOLERANCE {
                    Ok((0, 1))
                } else if (lat - self.lats[n - 1]).abs() <= LAT_EDGE_TOLERANCE {
                    Ok((n - 2, n - 1))
                } else {
                    Err(GridError::BadDataIndex)
                }
            }
            Err(err) => Err(err.into()),
        }
    }
}

impl GridTopology for LatLonGrid {
    fn dims(&self) -> (usize, usize) {
        (self.lons.len(), self.lats.len())
    }

    fn wraps(&self) -> bool {
        self.wraps
    }

    fn wrap(&self, lon: Float) -> Result<Float, GridError> {
        if !lon.is_finite() {
            return Err(GridError::BadDataIndex);
        }

        Ok(self.wrap_longitude(lon))
    }

    fn iwrap(&self, i: isize) -> Result<usize, GridError> {
        LatLonGrid::iwrap(self, i)
    }

    fn node(&self, i: usize, j: usize) -> Result<(Float, Float), GridError> {
        let lon = self
            .lons
            .get(i)
            .copied()
            .ok_or(GridError::BadDataRequest("longitude index out of range"))?;

        Ok((lon, self.latitude(j)?))
    }

    fn corners(&self, lon: Float, lat: Float) -> Result<CellCorners, GridError> {
        if !lat.is_finite() {
            return Err(GridError::BadDataIndex);
        }

        let lon = self.wrap(lon)?;
        let (i1, i2) = self.lonindex(lon)?;
        let (j1, j2) = self.latindex(lat)?;

        let (ci1, ci2) = (self.iwrap(i1)?, self.iwrap(i2)?);
        let (lon1, lon2) = (self.longitude(i1)?, self.longitude(i2)?);
        let (lat1, lat2) = (self.lats[j1], self.lats[j2]);

        Ok(CellCorners {
            lon,
            lat,
            nodes: [(ci1, j1), (ci1, j2), (ci2, j1), (ci2, j2)],
            lons: [lon1, lon1, lon2, lon2],
            lats: [lat1, lat2, lat1, lat2],
        })
    }

    fn horizontally_compatible(&self, other: &Self) -> bool {
        axes_match(&self.lons, &other.lons) && axes_match(&self.lats, &other.lats)
    }
}

fn is_monotonic(axis: &[Float]) -> bool {
    let increasing = axis.windows(2).all(|w| w[1] > w[0]);
    let decreasing = axis.windows(2).all(|w| w[1] < w[0]);

    increasing || decreasing
}

fn axes_match(a: &[Float], b: &[Float]) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .zip(b.iter())
            .all(|(x, y)| (x - y).abs() <= COORD_TOLERANCE)
}
