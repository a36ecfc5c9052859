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

//! Sampling of gridded fields at arbitrary locations.
//!
//! Horizontal samplers work on the four nodes bracketing a point,
//! vertical samplers on single columns. Every sampler returns the
//! field's fill value where the surrounding data is missing.

pub mod bilinear;
pub mod vertical;

pub use bilinear::{BilinearHinterp, Weighting};
pub use vertical::{VerticalScheme, Vinterp};

use crate::errors::InterpolationError;
use crate::model::grid::{Field3D, FieldSfc};
use crate::Float;

pub trait HorizontalSampler {
    /// Value of level `k` of the field at one point.
    fn calc(&self, lon: Float, lat: Float, grid: &Field3D, k: usize) -> Result<Float, InterpolationError>;

    fn calc_batch(
        &self,
        lons: &[Float],
        lats: &[Float],
        grid: &Field3D,
        k: usize,
    ) -> Result<Vec<Float>, InterpolationError>;

    fn calc_sfc(&self, lon: Float, lat: Float, grid: &FieldSfc) -> Result<Float, InterpolationError>;

    fn calc_sfc_batch(
        &self,
        lons: &[Float],
        lats: &[Float],
        grid: &FieldSfc,
    ) -> Result<Vec<Float>, InterpolationError>;

    /// Both components of a vector field on level `k`.
    fn calc_vector(
        &self,
        lon: Float,
        lat: Float,
        xgrid: &Field3D,
        ygrid: &Field3D,
        k: usize,
    ) -> Result<(Float, Float), InterpolationError>;

    fn calc_vector_batch(
        &self,
        lons: &[Float],
        lats: &[Float],
        xgrid: &Field3D,
        ygrid: &Field3D,
        k: usize,
    ) -> Result<(Vec<Float>, Vec<Float>), InterpolationError>;

    /// Both components of a surface vector field, such as 10 m winds.
    fn calc_sfc_vector(
        &self,
        lon: Float,
        lat: Float,
        xgrid: &FieldSfc,
        ygrid: &FieldSfc,
    ) -> Result<(Float, Float), InterpolationError>;

    fn calc_sfc_vector_batch(
        &self,
        lons: &[Float],
        lats: &[Float],
        xgrid: &FieldSfc,
        ygrid: &FieldSfc,
    ) -> Result<(Vec<Float>, Vec<Float>), InterpolationError>;

    /// Horizontally interpolated profile handed to the vertical sampler.
    fn vinterp(
        &self,
        lon: Float,
        lat: Float,
        z: Float,
        grid: &Field3D,
        vin: &dyn VerticalSampler,
    ) -> Result<Float, InterpolationError>;

    fn vinterp_batch(
        &self,
        lons: &[Float],
        lats: &[Float],
        zs: &[Float],
        grid: &Field3D,
        vin: &dyn VerticalSampler,
    ) -> Result<Vec<Float>, InterpolationError>;

    fn vinterp_vector(
        &self,
        lon: Float,
        lat: Float,
        z: Float,
        xgrid: &Field3D,
        ygrid: &Field3D,
        vin: &dyn VerticalSampler,
    ) -> Result<(Float, Float), InterpolationError>;

    fn vinterp_vector_batch(
        &self,
        lons: &[Float],
        lats: &[Float],
        zs: &[Float],
        xgrid: &Field3D,
        ygrid: &Field3D,
        vin: &dyn VerticalSampler,
    ) -> Result<(Vec<Float>, Vec<Float>), InterpolationError>;
}

pub trait VerticalSampler {
    /// Interpolates a single profile given on coordinates `zs` to `z`.
    fn profile(&self, zs: &[Float], vals: &[Float], z: Float, bad: Float) -> Result<Float, InterpolationError>;

    /// Moves `grid` onto the vertical levels of `vgrid`, whose samples
    /// hold the old vertical coordinate at each new level.
    fn re_profile(&self, grid: &Field3D, vgrid: &Field3D) -> Result<Field3D, InterpolationError>;

    /// Swaps the roles of the samples and the vertical coordinate.
    fn invert(&self, newlevels: &[Float], grid: &Field3D) -> Result<Field3D, InterpolationError>;
}
