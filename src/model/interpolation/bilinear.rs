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

//! Bilinear horizontal interpolation.
//!
//! Corner values are blended with inverse great-circle distance
//! weights by default, which behaves the same on lat-lon and
//! cubed-sphere grids and does not degrade near the poles.
//! The classic planar (lon, lat) bilinear formula is available
//! for regular lat-lon grids.

use super::{HorizontalSampler, VerticalSampler};
use crate::constants::NEAR_POLE;
use crate::errors::{GridError, InterpolationError};
use crate::model::grid::{
    CellCorners, Compat, Fetch, Field3D, FieldSfc, GridTopology, Horizontal,
};
#[cfg(test)]
use crate::model::grid::{LatLonGrid, WrapMode};
use crate::Float;
use log::debug;
use nalgebra::{Rotation2, Vector2};
use serde::Deserialize;

/// Distances below this (in radians) count as hitting the node.
const NODE_HIT: Float = 1.0e-12;

#[derive(Copy, Clone, PartialEq, Eq, Debug, Deserialize)]
pub enum Weighting {
    GreatCircle,
    Planar,
}

#[derive(Copy, Clone, PartialEq, Debug)]
pub struct BilinearHinterp {
    /// Rotate vector corners into a common frame near the poles.
    pub conformal: bool,
    pub weighting: Weighting,
    pub fetch: Fetch,
}

impl Default for BilinearHinterp {
    fn default() -> Self {
        BilinearHinterp {
            conformal: false,
            weighting: Weighting::GreatCircle,
            fetch: Fetch::Auto,
        }
    }
}

impl BilinearHinterp {
    pub fn new(conformal: bool, weighting: Weighting) -> Self {
        BilinearHinterp {
            conformal,
            weighting,
            fetch: Fetch::Auto,
        }
    }

    /// Same interpolator reading only local samples.
    pub fn local(self) -> Self {
        BilinearHinterp {
            fetch: Fetch::Local,
            ..self
        }
    }

    fn weigh(&self, horizontal: &Horizontal, corners: &CellCorners, vals: &[Float]) -> Float {
        match (self.weighting, horizontal) {
            (Weighting::Planar, Horizontal::LatLon(_)) => planar_weigh(corners, vals),
            _ => great_circle_weigh(corners, vals),
        }
    }

    /// Rotates corner vectors into the east/north frame of the query meridian.
    ///
    /// Close to a pole local frames turn with longitude, by `+dlon`
    /// around the north pole and by `-dlon` around the south pole.
    fn conform(&self, corners: &CellCorners, xvals: &mut [Float], yvals: &mut [Float]) {
        if !self.conformal || corners.lat.abs() < NEAR_POLE {
            return;
        }

        let hemisphere = corners.lat.signum();

        for n in 0..4 {
            let dlon = (corners.lons[n] - corners.lon).to_radians();
            let rotated = Rotation2::new(hemisphere * dlon) * Vector2::new(xvals[n], yvals[n]);

            xvals[n] = rotated.x;
            yvals[n] = rotated.y;
        }
    }

    fn corner_indices(grid: &Field3D, corners: &CellCorners, k: usize) -> Result<[usize; 4], GridError> {
        let mut indices = [0; 4];

        for (n, &(i, j)) in corners.nodes.iter().enumerate() {
            indices[n] = grid.join_index(i as isize, j, k)?;
        }

        Ok(indices)
    }

    /// Corner indices of all levels of the column, level by level.
    fn column_indices(grid: &Field3D, corners: &CellCorners) -> Result<Vec<usize>, GridError> {
        let (_, _, nz) = grid.dims();
        let mut indices = Vec::with_capacity(4 * nz);

        for k in 0..nz {
            indices.extend_from_slice(&BilinearHinterp::corner_indices(grid, corners, k)?);
        }

        Ok(indices)
    }

    fn blend(&self, grid: &Field3D, corners: &CellCorners, vals: &[Float]) -> Float {
        let bad = grid.fill_value();

        if vals.iter().any(|&v| v == bad) {
            bad
        } else {
            self.weigh(grid.horizontal(), corners, vals)
        }
    }

    fn blend_vector(
        &self,
        xgrid: &Field3D,
        ygrid: &Field3D,
        corners: &CellCorners,
        xvals: &[Float],
        yvals: &[Float],
    ) -> (Float, Float) {
        let bad = (xgrid.fill_value(), ygrid.fill_value());
        self.blend_pair(xgrid.horizontal(), bad, corners, xvals, yvals)
    }

    /// Conformed and weighted pair of corner vectors, `bad` if any corner is missing.
    fn blend_pair(
        &self,
        horizontal: &Horizontal,
        bad: (Float, Float),
        corners: &CellCorners,
        xvals: &[Float],
        yvals: &[Float],
    ) -> (Float, Float) {
        let (xbad, ybad) = bad;

        if xvals.iter().any(|&v| v == xbad) || yvals.iter().any(|&v| v == ybad) {
            return bad;
        }

        let mut xs = [xvals[0], xvals[1], xvals[2], xvals[3]];
        let mut ys = [yvals[0], yvals[1], yvals[2], yvals[3]];
        self.conform(corners, &mut xs, &mut ys);

        (self.weigh(horizontal, corners, &xs), self.weigh(horizontal, corners, &ys))
    }

    fn sfc_corner_indices(grid: &FieldSfc, corners: &CellCorners) -> Result<[usize; 4], GridError> {
        let mut indices = [0; 4];

        for (n, &(i, j)) in corners.nodes.iter().enumerate() {
            indices[n] = grid.join_index(i as isize, j)?;
        }

        Ok(indices)
    }

    /// Splits paired corner values back into one result per point.
    fn unpack_pairs<F>(
        all_corners: &[Option<CellCorners>],
        xvals: &[Float],
        yvals: &[Float],
        bad: (Float, Float),
        blend: F,
    ) -> (Vec<Float>, Vec<Float>)
    where
        F: Fn(&CellCorners, &[Float], &[Float]) -> (Float, Float),
    {
        let mut xchunks = xvals.chunks_exact(4);
        let mut ychunks = yvals.chunks_exact(4);

        all_corners
            .iter()
            .map(|corners| {
                let vals = corners.and_then(|_| xchunks.next().zip(ychunks.next()));

                match (corners, vals) {
                    (Some(corners), Some((xs, ys))) => blend(corners, xs, ys),
                    _ => bad,
                }
            })
            .unzip()
    }

    /// Corners of every point, `None` where the point cannot be bracketed.
    fn all_corners(horizontal: &Horizontal, lons: &[Float], lats: &[Float]) -> Vec<Option<CellCorners>> {
        lons.iter()
            .zip(lats.iter())
            .map(|(&lon, &lat)| match horizontal.corners(lon, lat) {
                Ok(corners) => Some(corners),
                Err(err) => {
                    debug!("Point ({}, {}) cannot be bracketed: {}", lon, lat, err);
                    None
                }
            })
            .collect()
    }

    fn check_vector_pair(xgrid: &Field3D, ygrid: &Field3D) -> Result<(), InterpolationError> {
        if xgrid.compatible(ygrid, Compat::ALL) {
            Ok(())
        } else {
            Err(GridError::IncompatibleGrids.into())
        }
    }
}

// Regridding serves offline checks of whole fields and is not used by runs.
#[cfg(test)]
impl BilinearHinterp {
    /// Resamples a lat-lon field onto new horizontal axes, level by level.
    pub fn regrid(&self, input: &Field3D, lons: &[Float], lats: &[Float]) -> Result<Field3D, InterpolationError> {
        if !matches!(input.horizontal(), Horizontal::LatLon(_)) {
            return Err(GridError::BadDataRequest("only lat-lon fields can be regridded").into());
        }

        let grid = LatLonGrid::new(lons.to_vec(), lats.to_vec(), WrapMode::Detect)?;
        let (plons, plats) = node_coordinates(lons, lats);

        let (_, _, nz) = input.dims();
        let mut data = Vec::with_capacity(plons.len() * nz);

        for k in 0..nz {
            data.extend(self.calc_batch(&plons, &plats, input, k)?);
        }

        Ok(Field3D::with_data(
            input.meta.clone(),
            Horizontal::LatLon(grid),
            input.levels().to_vec(),
            data,
        )?)
    }

    pub fn regrid_sfc(&self, input: &FieldSfc, lons: &[Float], lats: &[Float]) -> Result<FieldSfc, InterpolationError> {
        if !matches!(input.horizontal(), Horizontal::LatLon(_)) {
            return Err(GridError::BadDataRequest("only lat-lon fields can be regridded").into());
        }

        let grid = LatLonGrid::new(lons.to_vec(), lats.to_vec(), WrapMode::Detect)?;
        let (plons, plats) = node_coordinates(lons, lats);
        let data = self.calc_sfc_batch(&plons, &plats, input)?;

        Ok(FieldSfc::with_data(input.meta.clone(), Horizontal::LatLon(grid), data)?)
    }
}

impl HorizontalSampler for BilinearHinterp {
    fn calc(&self, lon: Float, lat: Float, grid: &Field3D, k: usize) -> Result<Float, InterpolationError> {
        let corners = grid.horizontal().corners(lon, lat)?;
        let indices = BilinearHinterp::corner_indices(grid, &corners, k)?;
        let vals = grid.gridpoints(&indices, self.fetch)?;

        Ok(self.blend(grid, &corners, &vals))
    }

    fn calc_batch(
        &self,
        lons: &[Float],
        lats: &[Float],
        grid: &Field3D,
        k: usize,
    ) -> Result<Vec<Float>, InterpolationError> {
        if lons.len() != lats.len() {
            return Err(InterpolationError::LengthMismatch);
        }

        grid.level(k)?;
        let all_corners = BilinearHinterp::all_corners(grid.horizontal(), lons, lats);

        let mut indices = Vec::with_capacity(4 * lons.len());
        for corners in all_corners.iter().flatten() {
            indices.extend_from_slice(&BilinearHinterp::corner_indices(grid, corners, k)?);
        }

        let vals = grid.gridpoints(&indices, self.fetch)?;
        let mut chunks = vals.chunks_exact(4);

        Ok(all_corners
            .iter()
            .map(|corners| match (corners, corners.and_then(|_| chunks.next())) {
                (Some(corners), Some(vals)) => self.blend(grid, corners, vals),
                _ => grid.fill_value(),
            })
            .collect())
    }

    fn calc_sfc(&self, lon: Float, lat: Float, grid: &FieldSfc) -> Result<Float, InterpolationError> {
        let corners = grid.horizontal().corners(lon, lat)?;
        let indices = BilinearHinterp::sfc_corner_indices(grid, &corners)?;
        let vals = grid.gridpoints(&indices, self.fetch)?;
        let bad = grid.fill_value();

        if vals.iter().any(|&v| v == bad) {
            Ok(bad)
        } else {
            Ok(self.weigh(grid.horizontal(), &corners, &vals))
        }
    }

    fn calc_sfc_batch(
        &self,
        lons: &[Float],
        lats: &[Float],
        grid: &FieldSfc,
    ) -> Result<Vec<Float>, InterpolationError> {
        if lons.len() != lats.len() {
            return Err(InterpolationError::LengthMismatch);
        }

        let bad = grid.fill_value();
        let all_corners = BilinearHinterp::all_corners(grid.horizontal(), lons, lats);

        let mut indices = Vec::with_capacity(4 * lons.len());
        for corners in all_corners.iter().flatten() {
            indices.extend_from_slice(&BilinearHinterp::sfc_corner_indices(grid, corners)?);
        }

        let vals = grid.gridpoints(&indices, self.fetch)?;
        let mut chunks = vals.chunks_exact(4);

        Ok(all_corners
            .iter()
            .map(|corners| match (corners, corners.and_then(|_| chunks.next())) {
                (Some(corners), Some(vals)) if vals.iter().all(|&v| v != bad) => {
                    self.weigh(grid.horizontal(), corners, vals)
                }
                _ => bad,
            })
            .collect())
    }

    fn calc_vector(
        &self,
        lon: Float,
        lat: Float,
        xgrid: &Field3D,
        ygrid: &Field3D,
        k: usize,
    ) -> Result<(Float, Float), InterpolationError> {
        BilinearHinterp::check_vector_pair(xgrid, ygrid)?;

        let corners = xgrid.horizontal().corners(lon, lat)?;
        let indices = BilinearHinterp::corner_indices(xgrid, &corners, k)?;
        let xvals = xgrid.gridpoints(&indices, self.fetch)?;
        let yvals = ygrid.gridpoints(&indices, self.fetch)?;

        Ok(self.blend_vector(xgrid, ygrid, &corners, &xvals, &yvals))
    }

    fn calc_vector_batch(
        &self,
        lons: &[Float],
        lats: &[Float],
        xgrid: &Field3D,
        ygrid: &Field3D,
        k: usize,
    ) -> Result<(Vec<Float>, Vec<Float>), InterpolationError> {
        if lons.len() != lats.len() {
            return Err(InterpolationError::LengthMismatch);
        }

        BilinearHinterp::check_vector_pair(xgrid, ygrid)?;
        xgrid.level(k)?;

        let all_corners = BilinearHinterp::all_corners(xgrid.horizontal(), lons, lats);

        let mut indices = Vec::with_capacity(4 * lons.len());
        for corners in all_corners.iter().flatten() {
            indices.extend_from_slice(&BilinearHinterp::corner_indices(xgrid, corners, k)?);
        }

        let xvals = xgrid.gridpoints(&indices, self.fetch)?;
        let yvals = ygrid.gridpoints(&indices, self.fetch)?;
        let bad = (xgrid.fill_value(), ygrid.fill_value());

        Ok(BilinearHinterp::unpack_pairs(
            &all_corners,
            &xvals,
            &yvals,
            bad,
            |corners, xs, ys| self.blend_vector(xgrid, ygrid, corners, xs, ys),
        ))
    }

    fn calc_sfc_vector(
        &self,
        lon: Float,
        lat: Float,
        xgrid: &FieldSfc,
        ygrid: &FieldSfc,
    ) -> Result<(Float, Float), InterpolationError> {
        if !xgrid.compatible(ygrid, Compat::ALL) {
            return Err(GridError::IncompatibleGrids.into());
        }

        let corners = xgrid.horizontal().corners(lon, lat)?;
        let indices = BilinearHinterp::sfc_corner_indices(xgrid, &corners)?;
        let xvals = xgrid.gridpoints(&indices, self.fetch)?;
        let yvals = ygrid.gridpoints(&indices, self.fetch)?;
        let bad = (xgrid.fill_value(), ygrid.fill_value());

        Ok(self.blend_pair(xgrid.horizontal(), bad, &corners, &xvals, &yvals))
    }

    fn calc_sfc_vector_batch(
        &self,
        lons: &[Float],
        lats: &[Float],
        xgrid: &FieldSfc,
        ygrid: &FieldSfc,
    ) -> Result<(Vec<Float>, Vec<Float>), InterpolationError> {
        if lons.len() != lats.len() {
            return Err(InterpolationError::LengthMismatch);
        }

        if !xgrid.compatible(ygrid, Compat::ALL) {
            return Err(GridError::IncompatibleGrids.into());
        }

        let all_corners = BilinearHinterp::all_corners(xgrid.horizontal(), lons, lats);

        let mut indices = Vec::with_capacity(4 * lons.len());
        for corners in all_corners.iter().flatten() {
            indices.extend_from_slice(&BilinearHinterp::sfc_corner_indices(xgrid, corners)?);
        }

        let xvals = xgrid.gridpoints(&indices, self.fetch)?;
        let yvals = ygrid.gridpoints(&indices, self.fetch)?;
        let bad = (xgrid.fill_value(), ygrid.fill_value());
        let horizontal = xgrid.horizontal();

        Ok(BilinearHinterp::unpack_pairs(
            &all_corners,
            &xvals,
            &yvals,
            bad,
            |corners, xs, ys| self.blend_pair(horizontal, bad, corners, xs, ys),
        ))
    }

    fn vinterp(
        &self,
        lon: Float,
        lat: Float,
        z: Float,
        grid: &Field3D,
        vin: &dyn VerticalSampler,
    ) -> Result<Float, InterpolationError> {
        let corners = grid.horizontal().corners(lon, lat)?;
        let indices = BilinearHinterp::column_indices(grid, &corners)?;
        let vals = grid.gridpoints(&indices, self.fetch)?;

        let profile: Vec<Float> = vals
            .chunks_exact(4)
            .map(|level| self.blend(grid, &corners, level))
            .collect();

        vin.profile(grid.levels(), &profile, z, grid.fill_value())
    }

    fn vinterp_batch(
        &self,
        lons: &[Float],
        lats: &[Float],
        zs: &[Float],
        grid: &Field3D,
        vin: &dyn VerticalSampler,
    ) -> Result<Vec<Float>, InterpolationError> {
        if lons.len() != lats.len() || lons.len() != zs.len() {
            return Err(InterpolationError::LengthMismatch);
        }

        let (_, _, nz) = grid.dims();
        let bad = grid.fill_value();
        let all_corners = BilinearHinterp::all_corners(grid.horizontal(), lons, lats);

        let mut indices = Vec::with_capacity(4 * nz * lons.len());
        for corners in all_corners.iter().flatten() {
            indices.extend(BilinearHinterp::column_indices(grid, corners)?);
        }

        let vals = grid.gridpoints(&indices, self.fetch)?;
        let mut columns = vals.chunks_exact(4 * nz.max(1));

        let mut results = Vec::with_capacity(lons.len());
        for (corners, &z) in all_corners.iter().zip(zs.iter()) {
            let value = match (corners, corners.and_then(|_| columns.next())) {
                (Some(corners), Some(column)) => {
                    let profile: Vec<Float> = column
                        .chunks_exact(4)
                        .map(|level| self.blend(grid, corners, level))
                        .collect();

                    vin.profile(grid.levels(), &profile, z, bad).unwrap_or_else(|err| {
                        debug!("Profile cannot be interpolated to {}: {}", z, err);
                        bad
                    })
                }
                _ => bad,
            };

            results.push(value);
        }

        Ok(results)
    }

    fn vinterp_vector(
        &self,
        lon: Float,
        lat: Float,
        z: Float,
        xgrid: &Field3D,
        ygrid: &Field3D,
        vin: &dyn VerticalSampler,
    ) -> Result<(Float, Float), InterpolationError> {
        BilinearHinterp::check_vector_pair(xgrid, ygrid)?;

        let corners = xgrid.horizontal().corners(lon, lat)?;
        let indices = BilinearHinterp::column_indices(xgrid, &corners)?;
        let xvals = xgrid.gridpoints(&indices, self.fetch)?;
        let yvals = ygrid.gridpoints(&indices, self.fetch)?;

        let (xprofile, yprofile): (Vec<Float>, Vec<Float>) = xvals
            .chunks_exact(4)
            .zip(yvals.chunks_exact(4))
            .map(|(xs, ys)| self.blend_vector(xgrid, ygrid, &corners, xs, ys))
            .unzip();

        Ok((
            vin.profile(xgrid.levels(), &xprofile, z, xgrid.fill_value())?,
            vin.profile(ygrid.levels(), &yprofile, z, ygrid.fill_value())?,
        ))
    }

    fn vinterp_vector_batch(
        &self,
        lons: &[Float],
        lats: &[Float],
        zs: &[Float],
        xgrid: &Field3D,
        ygrid: &Field3D,
        vin: &dyn VerticalSampler,
    ) -> Result<(Vec<Float>, Vec<Float>), InterpolationError> {
        if lons.len() != lats.len() || lons.len() != zs.len() {
            return Err(InterpolationError::LengthMismatch);
        }

        BilinearHinterp::check_vector_pair(xgrid, ygrid)?;

        let (_, _, nz) = xgrid.dims();
        let (xbad, ybad) = (xgrid.fill_value(), ygrid.fill_value());
        let all_corners = BilinearHinterp::all_corners(xgrid.horizontal(), lons, lats);

        let mut indices = Vec::with_capacity(4 * nz * lons.len());
        for corners in all_corners.iter().flatten() {
            indices.extend(BilinearHinterp::column_indices(xgrid, corners)?);
        }

        let xvals = xgrid.gridpoints(&indices, self.fetch)?;
        let yvals = ygrid.gridpoints(&indices, self.fetch)?;
        let mut xcolumns = xvals.chunks_exact(4 * nz.max(1));
        let mut ycolumns = yvals.chunks_exact(4 * nz.max(1));

        let mut xresults = Vec::with_capacity(lons.len());
        let mut yresults = Vec::with_capacity(lons.len());

        for (corners, &z) in all_corners.iter().zip(zs.iter()) {
            let columns = corners.and_then(|_| xcolumns.next().zip(ycolumns.next()));

            let (x, y) = match (corners, columns) {
                (Some(corners), Some((xcolumn, ycolumn))) => {
                    let (xprofile, yprofile): (Vec<Float>, Vec<Float>) = xcolumn
                        .chunks_exact(4)
                        .zip(ycolumn.chunks_exact(4))
                        .map(|(xs, ys)| self.blend_vector(xgrid, ygrid, corners, xs, ys))
                        .unzip();

                    let x = vin.profile(xgrid.levels(), &xprofile, z, xbad);
                    let y = vin.profile(ygrid.levels(), &yprofile, z, ybad);

                    match (x, y) {
                        (Ok(x), Ok(y)) => (x, y),
                        _ => {
                            debug!("Vector profile cannot be interpolated to {}", z);
                            (xbad, ybad)
                        }
                    }
                }
                _ => (xbad, ybad),
            };

            xresults.push(x);
            yresults.push(y);
        }

        Ok((xresults, yresults))
    }
}

/// Flattened coordinates of all nodes of a lon/lat axis pair, lat-major.
#[cfg(test)]
fn node_coordinates(lons: &[Float], lats: &[Float]) -> (Vec<Float>, Vec<Float>) {
    let mut plons = Vec::with_capacity(lons.len() * lats.len());
    let mut plats = Vec::with_capacity(lons.len() * lats.len());

    for &lat in lats {
        for &lon in lons {
            plons.push(lon);
            plats.push(lat);
        }
    }

    (plons, plats)
}

/// Central angle between two points, exactly zero for identical points.
pub fn great_circle_distance(lon1: Float, lat1: Float, lon2: Float, lat2: Float) -> Float {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let dlambda = (lon2 - lon1).to_radians();

    let (sin1, cos1) = phi1.sin_cos();
    let (sin2, cos2) = phi2.sin_cos();
    let (sin_dl, cos_dl) = dlambda.sin_cos();

    let num = (cos2 * sin_dl).hypot(cos1 * sin2 - sin1 * cos2 * cos_dl);
    let den = sin1 * sin2 + cos1 * cos2 * cos_dl;

    num.atan2(den)
}

/// Inverse-distance blend; a corner hit exactly returns its own value.
fn great_circle_weigh(corners: &CellCorners, vals: &[Float]) -> Float {
    let mut weights = [0.0; 4];

    for n in 0..4 {
        let dist = great_circle_distance(corners.lon, corners.lat, corners.lons[n], corners.lats[n]);

        if dist < NODE_HIT {
            return vals[n];
        }

        weights[n] = 1.0 / dist;
    }

    let total: Float = weights.iter().sum();

    weights
        .iter()
        .zip(vals.iter())
        .map(|(w, v)| w * v)
        .sum::<Float>()
        / total
}

fn planar_weigh(corners: &CellCorners, vals: &[Float]) -> Float {
    let (lon1, lon2) = (corners.lons[0], corners.lons[2]);
    let (lat1, lat2) = (corners.lats[0], corners.lats[1]);
    let (d11, d21, d12, d22) = (vals[0], vals[1], vals[2], vals[3]);

    let mut span = lon2 - lon1;
    if span > 180.0 && lon2 > lon1 {
        span -= 360.0;
    }
    if span < -180.0 && lon2 < lon1 {
        span += 360.0;
    }

    let mut offset = corners.lon - lon1;
    if offset > 180.0 && lon2 > lon1 {
        offset -= 360.0;
    }
    if offset < -180.0 && lon2 < lon1 {
        offset += 360.0;
    }

    let fx = offset / span;
    let fy = (corners.lat - lat1) / (lat2 - lat1);

    (d22 - d12 - d21 + d11) * fx * fy + (d21 - d11) * fy + (d12 - d11) * fx + d11
}

#[cfg(test)]
mod tests {
    use super::{great_circle_distance, BilinearHinterp, Weighting};
    use crate::model::grid::cubed::node_coords;
    use crate::model::grid::{
        CubedSphereGrid, Field3D, FieldMeta, FieldSfc, GridTopology, Horizontal, LatLonGrid, MemoryServer,
        WrapMode,
    };
    use crate::model::interpolation::{HorizontalSampler, VerticalScheme, Vinterp};
    use crate::Float;
    use float_cmp::approx_eq;
    use std::sync::Arc;

    fn scenario_values() -> Vec<Float> {
        let mut data = Vec::new();
        for j in 0..4 {
            for i in 0..4 {
                data.push((i + 10 * j) as Float);
            }
        }
        data
    }

    fn scenario_field() -> Field3D {
        let grid = Horizontal::from(LatLonGrid::global(4, 4).unwrap());
        Field3D::with_data(FieldMeta::new("Q", "1"), grid, vec![0.0], scenario_values()).unwrap()
    }

    #[test]
    fn identical_points_have_zero_distance() {
        assert_eq!(great_circle_distance(123.4, -56.7, 123.4, -56.7), 0.0);
        assert!(approx_eq!(
            Float,
            great_circle_distance(0.0, 0.0, 90.0, 0.0),
            std::f64::consts::FRAC_PI_2,
            epsilon = 1e-12
        ));
    }

    #[test]
    fn scenario_point_between_corners() {
        let field = scenario_field();
        let hinterp = BilinearHinterp::default();
        let value = hinterp.calc(45.0, 0.0, &field, 0).unwrap();

        assert!(value > 10.0 && value < 21.0);
        // all four corners are equally far away
        assert!(approx_eq!(Float, value, 15.5, epsilon = 1e-9));

        let closer = hinterp.calc(20.0, 20.0, &field, 0).unwrap();
        let planar = BilinearHinterp::new(false, Weighting::Planar).calc(45.0, 0.0, &field, 0).unwrap();
        assert!((closer - 20.0).abs() < (closer - 11.0).abs());
        assert!(approx_eq!(Float, planar, 15.5, epsilon = 1e-9));
    }

    #[test]
    fn wrapped_longitude_gives_same_result() {
        let field = scenario_field();
        let hinterp = BilinearHinterp::default();

        let a = hinterp.calc(370.0, 12.0, &field, 0).unwrap();
        let b = hinterp.calc(10.0, 12.0, &field, 0).unwrap();
        assert!(approx_eq!(Float, a, b, epsilon = 1e-12));

        let seam = hinterp.calc(315.0, 0.0, &field, 0).unwrap();
        assert!(seam > 10.0 && seam < 23.0);
    }

    #[test]
    fn exact_corner_latlon() {
        let field = scenario_field();
        let hinterp = BilinearHinterp::default();

        for (lon, lat, expected) in [(90.0, -30.0, 11.0), (180.0, 30.0, 22.0), (270.0, 30.0, 23.0)] {
            let value = hinterp.calc(lon, lat, &field, 0).unwrap();
            assert!(approx_eq!(Float, value, expected, epsilon = 1e-9));
        }
    }

    #[test]
    fn exact_corner_cubed() {
        let im = 6;
        let tile = CubedSphereGrid::tile(im, 3, (0, 5), (0, 5)).unwrap();
        let (nlons, nlats) = tile.dims();
        let data = (0..nlons * nlats).map(|v| v as Float).collect();
        let grid = Horizontal::from(tile);
        let field = Field3D::with_data(FieldMeta::new("Q", "1"), grid, vec![0.0], data).unwrap();

        let hinterp = BilinearHinterp::default();
        let (lon, lat) = node_coords(im, 3, 2, 4).unwrap();
        let value = hinterp.calc(lon, lat, &field, 0).unwrap();

        // global cell (2, 4) is local node (3, 5)
        assert!(approx_eq!(Float, value, (5 * nlons + 3) as Float, epsilon = 1e-6));
    }

    #[test]
    fn fill_propagates() {
        let mut field = scenario_field();
        let bad = field.fill_value();
        *field.value_mut(1, 2, 0).unwrap() = bad;

        let hinterp = BilinearHinterp::default();
        assert_eq!(hinterp.calc(45.0, 0.0, &field, 0).unwrap(), bad);
        assert_ne!(hinterp.calc(135.0, -60.0, &field, 0).unwrap(), bad);

        let batch = hinterp.calc_batch(&[45.0, 135.0], &[0.0, -60.0], &field, 0).unwrap();
        assert_eq!(batch[0], bad);
        assert_ne!(batch[1], bad);
    }

    #[test]
    fn batch_matches_single_points_in_one_fetch() {
        let mut field = scenario_field();
        let mut server = MemoryServer::new();
        server.publish("Q", scenario_values());
        let server = Arc::new(server);
        field.set_server(server.clone());

        let hinterp = BilinearHinterp::default();
        let lons = [10.0, 100.0, 200.0, 300.0, 45.0];
        let lats = [-80.0, -10.0, 0.0, 45.0, 95.0];

        let batch = hinterp.calc_batch(&lons, &lats, &field, 0).unwrap();
        assert_eq!(server.round_trips(), 1);

        for n in 0..4 {
            let single = hinterp.local().calc(lons[n], lats[n], &field, 0).unwrap();
            assert!(approx_eq!(Float, batch[n], single, epsilon = 1e-12));
        }

        // latitude beyond the pole cannot be bracketed
        assert_eq!(batch[4], field.fill_value());
    }

    #[test]
    fn surface_matches_level() {
        let field = scenario_field();
        let sfc = field.extract_sfc(0).unwrap();
        let hinterp = BilinearHinterp::default();

        let a = hinterp.calc_sfc(123.0, 17.0, &sfc).unwrap();
        let b = hinterp.calc(123.0, 17.0, &field, 0).unwrap();
        assert!(approx_eq!(Float, a, b, epsilon = 1e-12));

        let empty = FieldSfc::new(FieldMeta::new("Q", "1"), field.horizontal().clone());
        assert!(hinterp.calc_sfc(0.0, 0.0, &empty).is_err());
    }

    /// Uniform flow across a pole, `sign` is +1 for the north pole
    /// and -1 for the south pole.
    fn cross_polar_flow(lats: &[Float], sign: Float) -> (Field3D, Field3D) {
        let lons: Vec<Float> = (0..36).map(|i| i as Float * 10.0).collect();
        let grid = Horizontal::from(LatLonGrid::new(lons.clone(), lats.to_vec(), WrapMode::Detect).unwrap());

        let mut udata = Vec::new();
        let mut vdata = Vec::new();
        for _ in lats {
            for lon in &lons {
                let lam = lon.to_radians();
                udata.push(-10.0 * lam.sin());
                vdata.push(-sign * 10.0 * lam.cos());
            }
        }

        let u = Field3D::with_data(FieldMeta::new("U", "m/s"), grid.clone(), vec![0.0], udata).unwrap();
        let v = Field3D::with_data(FieldMeta::new("V", "m/s"), grid, vec![0.0], vdata).unwrap();

        (u, v)
    }

    #[test]
    fn conformal_rotation_near_poles() {
        let conformal = BilinearHinterp::new(true, Weighting::GreatCircle);
        let lam = Float::to_radians(45.0);

        let (u, v) = cross_polar_flow(&[85.0, 87.0, 89.0, 90.0], 1.0);
        let (cu, cv) = conformal.calc_vector(45.0, 89.5, &u, &v, 0).unwrap();
        assert!(approx_eq!(Float, cu, -10.0 * lam.sin(), epsilon = 1e-9));
        assert!(approx_eq!(Float, cv, -10.0 * lam.cos(), epsilon = 1e-9));

        let (u, v) = cross_polar_flow(&[-90.0, -89.0, -87.0, -85.0], -1.0);
        let (cu, cv) = conformal.calc_vector(45.0, -89.5, &u, &v, 0).unwrap();
        assert!(approx_eq!(Float, cu, -10.0 * lam.sin(), epsilon = 1e-9));
        assert!(approx_eq!(Float, cv, 10.0 * lam.cos(), epsilon = 1e-9));

        // away from the pole no rotation is applied
        let (pu, _) = conformal.calc_vector(45.0, -86.0, &u, &v, 0).unwrap();
        let (nu, _) = BilinearHinterp::default().calc_vector(45.0, -86.0, &u, &v, 0).unwrap();
        assert_eq!(pu, nu);
    }

    #[test]
    fn vector_batch_matches_single_points() {
        let (u, v) = cross_polar_flow(&[85.0, 87.0, 89.0, 90.0], 1.0);
        let conformal = BilinearHinterp::new(true, Weighting::GreatCircle);
        let lons = [45.0, 123.0, 300.0, 10.0];
        let lats = [89.5, 86.0, 88.0, 91.0];

        let (us, vs) = conformal.calc_vector_batch(&lons, &lats, &u, &v, 0).unwrap();
        assert_eq!((us.len(), vs.len()), (4, 4));

        for n in 0..3 {
            let (su, sv) = conformal.calc_vector(lons[n], lats[n], &u, &v, 0).unwrap();
            assert!(approx_eq!(Float, us[n], su, epsilon = 1e-12));
            assert!(approx_eq!(Float, vs[n], sv, epsilon = 1e-12));
        }

        assert_eq!((us[3], vs[3]), (u.fill_value(), v.fill_value()));
        assert!(conformal.calc_vector_batch(&lons, &lats[..2], &u, &v, 0).is_err());
    }

    #[test]
    fn surface_vectors_across_south_pole() {
        let (u, v) = cross_polar_flow(&[-90.0, -89.0, -87.0, -85.0], -1.0);
        let mut usfc = u.extract_sfc(0).unwrap();
        let mut vsfc = v.extract_sfc(0).unwrap();

        let mut server = MemoryServer::new();
        server.publish("U", u.data().unwrap().iter().copied().collect());
        server.publish("V", v.data().unwrap().iter().copied().collect());
        let server = Arc::new(server);
        usfc.set_server(server.clone());
        vsfc.set_server(server.clone());

        let conformal = BilinearHinterp::new(true, Weighting::GreatCircle);
        let lam = Float::to_radians(45.0);

        let (su, sv) = conformal.calc_sfc_vector(45.0, -89.5, &usfc, &vsfc).unwrap();
        assert!(approx_eq!(Float, su, -10.0 * lam.sin(), epsilon = 1e-9));
        assert!(approx_eq!(Float, sv, 10.0 * lam.cos(), epsilon = 1e-9));
        assert_eq!(server.round_trips(), 2);

        let lons = [45.0, 200.0, 0.0];
        let lats = [-89.5, -86.0, -95.0];
        let (us, vs) = conformal.calc_sfc_vector_batch(&lons, &lats, &usfc, &vsfc).unwrap();
        assert_eq!(server.round_trips(), 4);
        assert!(approx_eq!(Float, us[0], su, epsilon = 1e-12));
        assert!(approx_eq!(Float, vs[0], sv, epsilon = 1e-12));

        let (u1, v1) = conformal.calc_vector(200.0, -86.0, &u, &v, 0).unwrap();
        assert!(approx_eq!(Float, us[1], u1, epsilon = 1e-12));
        assert!(approx_eq!(Float, vs[1], v1, epsilon = 1e-12));
        assert_eq!((us[2], vs[2]), (usfc.fill_value(), vsfc.fill_value()));

        // one missing corner spoils both components
        let bad = vsfc.fill_value();
        *vsfc.value_mut(4, 1).unwrap() = bad;
        let (mu, mv) = conformal.local().calc_sfc_vector(45.0, -89.5, &usfc, &vsfc).unwrap();
        assert_eq!((mu, mv), (usfc.fill_value(), bad));

        let other = scenario_field().extract_sfc(0).unwrap();
        assert!(conformal.calc_sfc_vector(45.0, -89.5, &usfc, &other).is_err());
    }

    #[test]
    fn vertical_profile_interpolation() {
        let grid = Horizontal::from(LatLonGrid::global(4, 4).unwrap());
        let levels = vec![1000.0, 500.0, 100.0];
        let mut data = Vec::new();
        for k in 0..3 {
            data.extend(scenario_values().iter().map(|v| v + 100.0 * k as Float));
        }
        let field = Field3D::with_data(FieldMeta::new("Q", "1"), grid, levels, data).unwrap();

        let hinterp = BilinearHinterp::default();
        let vin = Vinterp::new(VerticalScheme::Linear);

        let value = hinterp.vinterp(45.0, 0.0, 750.0, &field, &vin).unwrap();
        assert!(approx_eq!(Float, value, 65.5, epsilon = 1e-9));

        let batch = hinterp
            .vinterp_batch(&[45.0, 45.0], &[0.0, 0.0], &[750.0, 50.0], &field, &vin)
            .unwrap();
        assert!(approx_eq!(Float, batch[0], 65.5, epsilon = 1e-9));
        assert_eq!(batch[1], field.fill_value());
    }

    #[test]
    fn regrid_onto_finer_axes() {
        let field = scenario_field();
        let hinterp = BilinearHinterp::default();
        let lons: Vec<Float> = (0..8).map(|i| i as Float * 45.0).collect();
        let lats = vec![-90.0, -30.0, 0.0, 30.0, 90.0];

        let regridded = hinterp.regrid(&field, &lons, &lats).unwrap();

        assert_eq!(regridded.dims(), (8, 5, 1));
        assert!(approx_eq!(Float, regridded.value(2, 1, 0).unwrap(), 11.0, epsilon = 1e-9));
        assert!(approx_eq!(Float, regridded.value(1, 2, 0).unwrap(), 15.5, epsilon = 1e-9));
    }

    #[test]
    fn regrid_surface_keeps_nodes() {
        let sfc = scenario_field().extract_sfc(0).unwrap();
        let hinterp = BilinearHinterp::default();
        let lons = vec![0.0, 90.0, 180.0, 270.0];
        let lats = vec![-30.0, 0.0, 30.0];

        let regridded = hinterp.regrid_sfc(&sfc, &lons, &lats).unwrap();

        assert_eq!(regridded.dims(), (4, 3));
        // shared nodes are copied, the equator row is interpolated
        assert!(approx_eq!(Float, regridded.value(1, 0).unwrap(), 11.0, epsilon = 1e-9));
        assert!(approx_eq!(Float, regridded.value(3, 2).unwrap(), 23.0, epsilon = 1e-9));

        let equator = regridded.value(2, 1).unwrap();
        assert!(equator > 12.0 && equator < 23.0);
        assert!(approx_eq!(Float, equator, hinterp.calc_sfc(180.0, 0.0, &sfc).unwrap(), epsilon = 1e-12));

        let cube = CubedSphereGrid::tile(2, 1, (0, 1), (0, 1)).unwrap();
        let (nlons, nlats) = cube.dims();
        let cube_sfc = FieldSfc::prefilled(FieldMeta::new("Q", "1"), Horizontal::from(cube), 1.0);
        assert_eq!((nlons, nlats), (4, 4));
        assert!(hinterp.regrid_sfc(&cube_sfc, &lons, &lats).is_err());
    }
}
