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

//! Interpolation along vertical columns.
//!
//! Columns may contain missing samples in both the data and the
//! coordinate; bad points are skipped while looking for the two
//! levels that bracket the requested coordinate.

use super::VerticalSampler;
use crate::errors::{GridError, InterpolationError};
use crate::model::grid::{Compat, Field3D, FieldSfc};
use crate::Float;
use ndarray::{s, Array3};
use serde::Deserialize;

#[derive(Copy, Clone, PartialEq, Eq, Debug, Deserialize)]
pub enum VerticalScheme {
    Linear,
    /// Linear in the logarithm of the coordinate (e.g. pressure).
    LogLinear,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Vinterp {
    pub scheme: VerticalScheme,
}

impl Default for Vinterp {
    fn default() -> Self {
        Vinterp {
            scheme: VerticalScheme::Linear,
        }
    }
}

impl Vinterp {
    pub fn new(scheme: VerticalScheme) -> Self {
        Vinterp { scheme }
    }

    fn minicalc(&self, z: Float, z1: Float, z2: Float, d1: Float, d2: Float) -> Option<Float> {
        let (z, z1, z2) = match self.scheme {
            VerticalScheme::Linear => (z, z1, z2),
            VerticalScheme::LogLinear => {
                if z <= 0.0 || z1 <= 0.0 || z2 <= 0.0 {
                    return None;
                }
                (z.ln(), z1.ln(), z2.ln())
            }
        };

        Some((z - z1) / (z2 - z1) * (d2 - d1) + d1)
    }

    /// Direction of a coordinate column: `+1` when it grows with index,
    /// `-1` when it falls, `0` when fewer than two good points exist.
    ///
    /// Only the two topmost good points are compared, so leading
    /// non-monotonic data at the bottom of the column is ignored.
    pub fn get_direction(profile: &[Float], vbad: Float) -> i8 {
        let n = profile.len();
        if n < 2 {
            return 0;
        }

        let upper = match (1..n).rev().find(|&k| profile[k] != vbad) {
            Some(k) => k,
            None => return 0,
        };
        let upperz = profile[upper];

        match (0..upper)
            .rev()
            .map(|k| profile[k])
            .find(|&z| z != vbad && z != upperz)
        {
            Some(lowerz) if lowerz < upperz => 1,
            Some(_) => -1,
            None => 0,
        }
    }

    /// Interpolates `data` given on `coords` to `z`.
    ///
    /// `bad` marks missing data, `vbad` missing coordinates. The lower
    /// bracket is the topmost good point on the near side of `z` (the
    /// very top level never serves as one), the upper bracket the next
    /// good point above it on the far side.
    pub fn interp(&self, data: &[Float], coords: &[Float], z: Float, bad: Float, vbad: Float, dir: i8) -> Float {
        let n = coords.len();

        if n < 2 || data.len() != n || dir == 0 || !z.is_finite() {
            return bad;
        }

        let good = |k: usize| coords[k] != vbad && data[k] != bad;
        let near_side = |c: Float| if dir > 0 { c <= z } else { c >= z };
        let far_side = |c: Float| if dir > 0 { c >= z } else { c <= z };

        let lower = match (0..n - 1).rev().find(|&k| good(k) && near_side(coords[k])) {
            Some(k) => k,
            None => return bad,
        };
        let lowerz = coords[lower];

        let upper = match (lower + 1..n).find(|&k| good(k) && coords[k] != lowerz && far_side(coords[k])) {
            Some(k) => k,
            None => return bad,
        };

        self.minicalc(z, lowerz, coords[upper], data[lower], data[upper])
            .filter(|v| v.is_finite())
            .unwrap_or(bad)
    }

    /// Value of the column at node `(i, j)` at coordinate `z`.
    pub fn calc(&self, z: Float, grid: &Field3D, i: usize, j: usize) -> Result<Float, InterpolationError> {
        let column = grid.profile(i, j)?;
        self.profile(grid.levels(), &column, z, grid.fill_value())
    }

    /// Moves `grid` onto the levels `zs` of the coordinate given by the
    /// samples of `vgrid`, which shares the vertical axis of `grid`.
    pub fn re_profile_onto(&self, zs: &[Float], grid: &Field3D, vgrid: &Field3D) -> Result<Field3D, InterpolationError> {
        if !grid.compatible(vgrid, Compat::ALL) {
            return Err(GridError::IncompatibleGrids.into());
        }

        let (bad, vbad) = (grid.fill_value(), vgrid.fill_value());
        let data = grid.data().ok_or(GridError::NoData)?;
        let vdata = vgrid.data().ok_or(GridError::NoData)?;

        let mut result = grid.with_levels(zs.to_vec(), &vgrid.meta.quantity, &vgrid.meta.units);
        result.meta.mks_vscale = vgrid.meta.mks_scale;
        result.meta.mks_voffset = vgrid.meta.mks_offset;

        let (nlons, nlats, _) = grid.dims();
        let mut out = Array3::from_elem((zs.len(), nlats, nlons), bad);
        let mut dir = 0;

        for j in 0..nlats {
            for i in 0..nlons {
                let column = data.slice(s![.., j, i]).to_vec();
                let vcolumn = vdata.slice(s![.., j, i]).to_vec();

                if dir == 0 {
                    dir = Vinterp::get_direction(&vcolumn, vbad);
                }

                for (k, &z) in zs.iter().enumerate() {
                    out[(k, j, i)] = self.interp(&column, &vcolumn, z, bad, vbad, dir);
                }
            }
        }

        result.load(out.into_raw_vec())?;
        Ok(result)
    }

    /// Iso-surface of `grid` where the coordinate field `vgrid` equals `z`.
    pub fn surface_at(&self, z: Float, grid: &Field3D, vgrid: &Field3D) -> Result<FieldSfc, InterpolationError> {
        if !grid.compatible(vgrid, Compat::ALL) {
            return Err(GridError::IncompatibleGrids.into());
        }

        let (bad, vbad) = (grid.fill_value(), vgrid.fill_value());
        let data = grid.data().ok_or(GridError::NoData)?;
        let vdata = vgrid.data().ok_or(GridError::NoData)?;

        let mut result = grid.extract_sfc(0)?;
        result.meta.surface = Some(format!("{}: {} {}", vgrid.meta.quantity, z, vgrid.meta.units));

        let (nlons, nlats, _) = grid.dims();
        let out = result.data_mut()?;
        let mut dir = 0;

        for j in 0..nlats {
            for i in 0..nlons {
                let column = data.slice(s![.., j, i]).to_vec();
                let vcolumn = vdata.slice(s![.., j, i]).to_vec();

                if dir == 0 {
                    dir = Vinterp::get_direction(&vcolumn, vbad);
                }

                out[(j, i)] = self.interp(&column, &vcolumn, z, bad, vbad, dir);
            }
        }

        Ok(result)
    }

    /// Samples `grid` at the per-column coordinate values of `vsfc`.
    pub fn surface(&self, grid: &Field3D, vsfc: &FieldSfc) -> Result<FieldSfc, InterpolationError> {
        if !grid.compatible_sfc(vsfc, Compat::HORIZ | Compat::TIME) {
            return Err(GridError::IncompatibleGrids.into());
        }

        let (bad, vbad) = (grid.fill_value(), vsfc.fill_value());
        let data = grid.data().ok_or(GridError::NoData)?;
        let levels = grid.levels();
        let dir = Vinterp::get_direction(levels, vbad);

        let mut result = grid.extract_sfc(0)?;
        result.meta.surface = vsfc.meta.surface.clone();

        let (nlons, nlats, _) = grid.dims();
        let out = result.data_mut()?;

        for j in 0..nlats {
            for i in 0..nlons {
                let z = vsfc.value(i, j)?;
                let column = data.slice(s![.., j, i]).to_vec();

                out[(j, i)] = if z == vbad {
                    bad
                } else {
                    self.interp(&column, levels, z, bad, vbad, dir)
                };
            }
        }

        Ok(result)
    }
}

/// Coordinate value just beyond the end of the axis, used where
/// no coordinate sentinel exists.
fn extrapolated_sentinel(levels: &[Float]) -> Float {
    let n = levels.len();

    if levels[0] < levels[1] {
        2.0 * levels[n - 1] - levels[n - 2]
    } else {
        2.0 * levels[0] - levels[1]
    }
}

impl VerticalSampler for Vinterp {
    fn profile(&self, zs: &[Float], vals: &[Float], z: Float, bad: Float) -> Result<Float, InterpolationError> {
        let n = zs.len();

        if n != vals.len() || n < 2 {
            return Err(InterpolationError::ProfileSize);
        }

        let dir = if zs[0] < zs[1] { 1 } else { -1 };
        let vbad = extrapolated_sentinel(zs);

        Ok(self.interp(vals, zs, z, bad, vbad, dir))
    }

    fn re_profile(&self, grid: &Field3D, vgrid: &Field3D) -> Result<Field3D, InterpolationError> {
        if !grid.compatible(vgrid, Compat::HORIZ | Compat::TIME) {
            return Err(GridError::IncompatibleGrids.into());
        }

        let oldlevels = grid.levels();
        if oldlevels.len() < 2 {
            return Err(InterpolationError::BadLevels);
        }

        let (bad, vbad) = (grid.fill_value(), vgrid.fill_value());
        let dir = if oldlevels[1] > oldlevels[0] { 1 } else { -1 };
        let xbad = extrapolated_sentinel(oldlevels);

        let data = grid.data().ok_or(GridError::NoData)?;
        let vdata = vgrid.data().ok_or(GridError::NoData)?;

        let mut result = vgrid.duplicate_empty();
        result.meta.quantity = grid.meta.quantity.clone();
        result.meta.units = grid.meta.units.clone();
        result.meta.mks_scale = grid.meta.mks_scale;
        result.meta.mks_offset = grid.meta.mks_offset;
        result.meta.fill_value = bad;

        let (nlons, nlats, nz) = vgrid.dims();
        let mut out = Array3::from_elem((nz, nlats, nlons), bad);

        for j in 0..nlats {
            for i in 0..nlons {
                let column = data.slice(s![.., j, i]).to_vec();

                for k in 0..nz {
                    let z = vdata[(k, j, i)];

                    if z != vbad {
                        out[(k, j, i)] = self.interp(&column, oldlevels, z, bad, xbad, dir);
                    }
                }
            }
        }

        result.load(out.into_raw_vec())?;
        Ok(result)
    }

    fn invert(&self, newlevels: &[Float], grid: &Field3D) -> Result<Field3D, InterpolationError> {
        let oldlevels = grid.levels();
        if oldlevels.len() < 2 || newlevels.is_empty() {
            return Err(InterpolationError::BadLevels);
        }

        let bad = grid.fill_value();
        let xbad = if bad == 0.0 {
            extrapolated_sentinel(oldlevels)
        } else {
            bad
        };

        let data = grid.data().ok_or(GridError::NoData)?;

        let mut meta = grid.meta.clone();
        meta.quantity = grid.meta.vquantity.clone();
        meta.units = grid.meta.vunits.clone();
        meta.mks_scale = grid.meta.mks_vscale;
        meta.mks_offset = grid.meta.mks_voffset;
        meta.vquantity = grid.meta.quantity.clone();
        meta.vunits = grid.meta.units.clone();
        meta.mks_vscale = grid.meta.mks_scale;
        meta.mks_voffset = grid.meta.mks_offset;
        meta.fill_value = xbad;

        let mut result = Field3D::new(meta, grid.horizontal().clone(), newlevels.to_vec());

        let (nlons, nlats, _) = grid.dims();
        let mut out = Array3::from_elem((newlevels.len(), nlats, nlons), xbad);
        let mut dir = 0;

        for j in 0..nlats {
            for i in 0..nlons {
                let column = data.slice(s![.., j, i]).to_vec();

                if dir == 0 {
                    dir = Vinterp::get_direction(&column, bad);
                }

                for (k, &z) in newlevels.iter().enumerate() {
                    out[(k, j, i)] = self.interp(oldlevels, &column, z, xbad, bad, dir);
                }
            }
        }

        result.load(out.into_raw_vec())?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::{VerticalScheme, Vinterp};
    use crate::errors::InterpolationError;
    use crate::model::grid::{Field3D, FieldMeta, FieldSfc, Horizontal, LatLonGrid};
    use crate::model::interpolation::VerticalSampler;
    use crate::Float;
    use float_cmp::approx_eq;

    const BAD: Float = 1.0e15;

    fn grid() -> Horizontal {
        Horizontal::from(LatLonGrid::global(4, 3).unwrap())
    }

    /// Pressure on four model levels, identical in every column.
    fn pressure() -> Field3D {
        let meta = FieldMeta::new("air_pressure", "hPa").with_vertical("model_level", "1");
        let column = [1000.0, 800.0, 500.0, 200.0];

        let mut data = Vec::new();
        for p in column {
            data.extend(std::iter::repeat(p).take(12));
        }

        Field3D::with_data(meta, grid(), vec![0.0, 1.0, 2.0, 3.0], data).unwrap()
    }

    #[test]
    fn direction_detection() {
        assert_eq!(Vinterp::get_direction(&[1.0, 2.0, 3.0], BAD), 1);
        assert_eq!(Vinterp::get_direction(&[1000.0, 850.0, 500.0], BAD), -1);
        assert_eq!(Vinterp::get_direction(&[3.0, 2.0, BAD], BAD), -1);
        assert_eq!(Vinterp::get_direction(&[BAD, 5.0, BAD], BAD), 0);
        assert_eq!(Vinterp::get_direction(&[7.0], BAD), 0);

        // non-monotonic data at the bottom of the column is ignored
        assert_eq!(Vinterp::get_direction(&[5.0, 1.0, 2.0, 3.0], BAD), 1);
    }

    #[test]
    fn linear_profile() {
        let vin = Vinterp::default();
        let zs = [0.0, 1.0, 2.0, 3.0];
        let vals = [10.0, 20.0, 40.0, 80.0];

        assert!(approx_eq!(Float, vin.profile(&zs, &vals, 1.5, BAD).unwrap(), 30.0));
        assert!(approx_eq!(Float, vin.profile(&zs, &vals, 3.0, BAD).unwrap(), 80.0));
        assert!(approx_eq!(Float, vin.profile(&zs, &vals, 0.0, BAD).unwrap(), 10.0));
        assert_eq!(vin.profile(&zs, &vals, 3.5, BAD).unwrap(), BAD);
        assert_eq!(vin.profile(&zs, &vals, -0.5, BAD).unwrap(), BAD);

        assert_eq!(vin.profile(&zs, &vals[..3], 1.0, BAD), Err(InterpolationError::ProfileSize));
        assert_eq!(vin.profile(&zs[..1], &vals[..1], 0.0, BAD), Err(InterpolationError::ProfileSize));
    }

    #[test]
    fn bad_points_are_skipped() {
        let vin = Vinterp::default();
        let zs = [0.0, 1.0, 2.0, 3.0];
        let vals = [10.0, BAD, 40.0, 80.0];

        assert!(approx_eq!(Float, vin.profile(&zs, &vals, 1.0, BAD).unwrap(), 25.0));
    }

    #[test]
    fn log_linear_profile() {
        let vin = Vinterp::new(VerticalScheme::LogLinear);
        let zs = [1000.0, 100.0, 10.0];
        let vals = [0.0, 1.0, 2.0];

        let value = vin.profile(&zs, &vals, Float::sqrt(1000.0 * 100.0), BAD).unwrap();
        assert!(approx_eq!(Float, value, 0.5, epsilon = 1e-12));
        assert_eq!(vin.profile(&zs, &vals, -5.0, BAD).unwrap(), BAD);
    }

    #[test]
    fn invert_and_re_profile() {
        let vin = Vinterp::default();
        let p = pressure();
        let eta = [900.0, 650.0, 350.0];

        let vertical = vin.invert(&eta, &p).unwrap();
        assert_eq!(vertical.meta.quantity, "model_level");
        assert_eq!(vertical.meta.vquantity, "air_pressure");
        assert_eq!(vertical.levels(), &eta);
        assert!(approx_eq!(Float, vertical.value(2, 1, 0).unwrap(), 0.5, epsilon = 1e-12));
        assert!(approx_eq!(Float, vertical.value(0, 2, 1).unwrap(), 1.5, epsilon = 1e-12));
        assert!(approx_eq!(Float, vertical.value(3, 0, 2).unwrap(), 2.5, epsilon = 1e-12));

        // a quantity linear in model level re-profiles linearly in pressure
        let meta = FieldMeta::new("U", "m/s").with_vertical("model_level", "1");
        let mut data = Vec::new();
        for k in 0..4 {
            data.extend(std::iter::repeat(10.0 * k as Float).take(12));
        }
        let u = Field3D::with_data(meta, grid(), vec![0.0, 1.0, 2.0, 3.0], data).unwrap();

        let on_eta = vin.re_profile(&u, &vertical).unwrap();
        assert_eq!(on_eta.meta.quantity, "U");
        assert_eq!(on_eta.meta.vquantity, "air_pressure");
        assert!(approx_eq!(Float, on_eta.value(1, 1, 0).unwrap(), 5.0, epsilon = 1e-12));
        assert!(approx_eq!(Float, on_eta.value(1, 1, 2).unwrap(), 25.0, epsilon = 1e-12));
    }

    #[test]
    fn inversion_outside_column_is_fill() {
        let vin = Vinterp::default();
        let vertical = vin.invert(&[1100.0, 100.0], &pressure()).unwrap();

        assert_eq!(vertical.value(0, 0, 0).unwrap(), vertical.fill_value());
        assert_eq!(vertical.value(0, 0, 1).unwrap(), vertical.fill_value());
    }

    #[test]
    fn re_profile_onto_levels() {
        let vin = Vinterp::default();
        let p = pressure();
        let level = p.generate_vertical();

        // model level expressed on pressure surfaces
        let on_p = vin.re_profile_onto(&[900.0, 350.0], &level, &p).unwrap();
        assert_eq!(on_p.meta.vquantity, "air_pressure");
        assert!(approx_eq!(Float, on_p.value(0, 0, 0).unwrap(), 0.5, epsilon = 1e-12));
        assert!(approx_eq!(Float, on_p.value(3, 2, 1).unwrap(), 2.5, epsilon = 1e-12));
    }

    #[test]
    fn iso_surfaces() {
        let vin = Vinterp::default();
        let p = pressure();
        let level = p.generate_vertical();

        let sfc = vin.surface_at(650.0, &level, &p).unwrap();
        assert_eq!(sfc.meta.surface.as_deref(), Some("air_pressure: 650 hPa"));
        assert!(approx_eq!(Float, sfc.value(1, 1).unwrap(), 1.5, epsilon = 1e-12));

        let mut heights = FieldSfc::prefilled(FieldMeta::new("model_level", "1"), grid(), 2.5);
        *heights.value_mut(0, 0).unwrap() = heights.fill_value();
        heights.meta.surface = Some("halfway".to_string());

        let sampled = vin.surface(&p, &heights).unwrap();
        assert_eq!(sampled.meta.surface.as_deref(), Some("halfway"));
        assert!(approx_eq!(Float, sampled.value(2, 1).unwrap(), 350.0, epsilon = 1e-12));
        assert_eq!(sampled.value(0, 0).unwrap(), p.fill_value());
    }
}
