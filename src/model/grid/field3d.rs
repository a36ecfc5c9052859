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

//! Three-dimensional gridded field.

use super::{Compat, FieldMeta, FieldSfc, Fetch, GridTopology, GridpointServer, Horizontal};
use crate::constants::COORD_TOLERANCE;
use crate::errors::GridError;
use crate::Float;
use log::debug;
use ndarray::{Array2, Array3, Axis};
use std::sync::Arc;

/// Scalar samples on a horizontal grid and a set of vertical levels.
///
/// Data is stored as `(level, lat, lon)`, so the flat index of a sample
/// is `(k * nlats + j) * nlons + i`. A field may exist without data;
/// every data access then fails with [`GridError::NoData`].
#[derive(Clone, Debug)]
pub struct Field3D {
    pub meta: FieldMeta,
    horizontal: Horizontal,
    levels: Vec<Float>,
    data: Option<Array3<Float>>,
    server: Option<Arc<dyn GridpointServer>>,
}

impl Field3D {
    pub fn new(meta: FieldMeta, horizontal: Horizontal, levels: Vec<Float>) -> Self {
        Field3D {
            meta,
            horizontal,
            levels,
            data: None,
            server: None,
        }
    }

    pub fn with_data(
        meta: FieldMeta,
        horizontal: Horizontal,
        levels: Vec<Float>,
        data: Vec<Float>,
    ) -> Result<Self, GridError> {
        let mut field = Field3D::new(meta, horizontal, levels);
        field.load(data)?;
        Ok(field)
    }

    /// Field with every sample set to `value`.
    pub fn prefilled(meta: FieldMeta, horizontal: Horizontal, levels: Vec<Float>, value: Float) -> Self {
        let (nlons, nlats) = horizontal.dims();
        let nz = levels.len();

        let mut field = Field3D::new(meta, horizontal, levels);
        field.data = Some(Array3::from_elem((nz, nlats, nlons), value));
        field
    }

    /// Loads samples for the existing geometry, replacing any previous data.
    pub fn load(&mut self, data: Vec<Float>) -> Result<(), GridError> {
        let (nlons, nlats, nz) = self.dims();

        if data.len() != nlons * nlats * nz {
            return Err(GridError::IncompatibleCoords);
        }

        let data = Array3::from_shape_vec((nz, nlats, nlons), data)
            .map_err(|_| GridError::IncompatibleCoords)?;
        self.data = Some(data);

        Ok(())
    }

    pub fn clear(&mut self) {
        self.data = None;
    }

    pub fn set_server(&mut self, server: Arc<dyn GridpointServer>) {
        self.server = Some(server);
    }

    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    pub fn data(&self) -> Option<&Array3<Float>> {
        self.data.as_ref()
    }

    pub fn horizontal(&self) -> &Horizontal {
        &self.horizontal
    }

    pub fn fill_value(&self) -> Float {
        self.meta.fill_value
    }

    /// (nlons, nlats, nlevels)
    pub fn dims(&self) -> (usize, usize, usize) {
        let (nlons, nlats) = self.horizontal.dims();
        (nlons, nlats, self.levels.len())
    }

    pub fn levels(&self) -> &[Float] {
        &self.levels
    }

    pub fn level(&self, k: usize) -> Result<Float, GridError> {
        self.levels
            .get(k)
            .copied()
            .ok_or(GridError::BadDataRequest("level index out of range"))
    }

    /// Flat index of a sample; `i` may be a virtual wrap-around index.
    pub fn join_index(&self, i: isize, j: usize, k: usize) -> Result<usize, GridError> {
        let (nlons, nlats, nz) = self.dims();
        let i = self.horizontal.iwrap(i)?;

        if j >= nlats || k >= nz {
            return Err(GridError::BadDataRequest("sample index out of range"));
        }

        Ok((k * nlats + j) * nlons + i)
    }

    pub fn split_index(&self, idx: usize) -> Result<(usize, usize, usize), GridError> {
        let (nlons, nlats, nz) = self.dims();

        if idx >= nlons * nlats * nz {
            return Err(GridError::BadDataRequest("flat index out of range"));
        }

        Ok((idx % nlons, (idx / nlons) % nlats, idx / (nlons * nlats)))
    }

    fn array(&self) -> Result<&Array3<Float>, GridError> {
        self.data.as_ref().ok_or(GridError::NoData)
    }

    pub fn value(&self, i: usize, j: usize, k: usize) -> Result<Float, GridError> {
        self.array()?
            .get((k, j, i))
            .copied()
            .ok_or(GridError::BadDataRequest("sample index out of range"))
    }

    pub fn value_at(&self, idx: usize) -> Result<Float, GridError> {
        let data = self.array()?;
        let (i, j, k) = self.split_index(idx)?;

        Ok(data[(k, j, i)])
    }

    pub fn value_mut(&mut self, i: usize, j: usize, k: usize) -> Result<&mut Float, GridError> {
        self.data
            .as_mut()
            .ok_or(GridError::NoData)?
            .get_mut((k, j, i))
            .ok_or(GridError::BadDataRequest("sample index out of range"))
    }

    pub fn values(&self, indices: &[usize]) -> Result<Vec<Float>, GridError> {
        indices.iter().map(|&idx| self.value_at(idx)).collect()
    }

    /// Batch read of samples at flat indices.
    ///
    /// With an attached server and `Fetch::Auto` the whole batch
    /// is one server request.
    pub fn gridpoints(&self, indices: &[usize], fetch: Fetch) -> Result<Vec<Float>, GridError> {
        match (&self.server, fetch) {
            (Some(server), Fetch::Auto) => {
                debug!("Fetching {} gridpoints of {} from server", indices.len(), self.meta.quantity);
                let values = server.fetch(&self.meta.quantity, indices)?;

                if values.len() != indices.len() {
                    return Err(GridError::Server(format!(
                        "asked for {} values, got {}",
                        indices.len(),
                        values.len()
                    )));
                }

                Ok(values)
            }
            _ => self.values(indices),
        }
    }

    /// All levels of the column at node `(i, j)`.
    pub fn profile(&self, i: usize, j: usize) -> Result<Vec<Float>, GridError> {
        let data = self.array()?;
        let (nlons, nlats, _) = self.dims();

        if i >= nlons || j >= nlats {
            return Err(GridError::BadDataRequest("column index out of range"));
        }

        Ok(data.slice(ndarray::s![.., j, i]).to_vec())
    }

    pub fn compatible(&self, other: &Field3D, flags: Compat) -> bool {
        if flags.contains(Compat::HORIZ) && !self.horizontal.horizontally_compatible(&other.horizontal) {
            return false;
        }

        if flags.contains(Compat::VERT) && !self.vertically_compatible(other) {
            return false;
        }

        if flags.contains(Compat::TIME) && !self.meta.same_time(&other.meta) {
            return false;
        }

        true
    }

    fn vertically_compatible(&self, other: &Field3D) -> bool {
        self.meta.vquantity == other.meta.vquantity
            && self.meta.vunits == other.meta.vunits
            && self.levels.len() == other.levels.len()
            && self
                .levels
                .iter()
                .zip(other.levels.iter())
                .all(|(a, b)| (a - b).abs() <= COORD_TOLERANCE * a.abs().max(1.0))
    }

    /// Surfaces have no vertical axis, so asking for vertical
    /// compatibility always fails.
    pub fn compatible_sfc(&self, sfc: &FieldSfc, flags: Compat) -> bool {
        if flags.contains(Compat::VERT) {
            return false;
        }

        if flags.contains(Compat::HORIZ) && !self.horizontal.horizontally_compatible(sfc.horizontal()) {
            return false;
        }

        !(flags.contains(Compat::TIME) && !self.meta.same_time(&sfc.meta))
    }

    /// Same quantity in the same units on the same grid at the same time.
    pub fn match_field(&self, other: &Field3D) -> bool {
        self.meta.quantity == other.meta.quantity
            && self.meta.units == other.meta.units
            && self.compatible(other, Compat::ALL)
    }

    /// Copy of the geometry and metadata without data.
    pub fn duplicate_empty(&self) -> Field3D {
        Field3D {
            meta: self.meta.clone(),
            horizontal: self.horizontal.clone(),
            levels: self.levels.clone(),
            data: None,
            server: self.server.clone(),
        }
    }

    /// Empty field on the same horizontal grid with another vertical axis.
    pub fn with_levels(&self, levels: Vec<Float>, vquantity: &str, vunits: &str) -> Field3D {
        let meta = self.meta.clone().with_vertical(vquantity, vunits);
        Field3D::new(meta, self.horizontal.clone(), levels)
    }

    /// Level `k` as a surface field.
    pub fn extract_sfc(&self, k: usize) -> Result<FieldSfc, GridError> {
        let data = self.array()?;
        let level = self.level(k)?;

        let mut meta = self.meta.clone();
        meta.surface = Some(format!(
            "{} {} {} surface",
            level, self.meta.vunits, self.meta.vquantity
        ));

        let values: Array2<Float> = data.index_axis(Axis(0), k).to_owned();
        FieldSfc::from_array(meta, self.horizontal.clone(), values)
    }

    /// Overwrites level `k` with a surface field, converting units.
    pub fn replace_level(&mut self, sfc: &FieldSfc, k: usize) -> Result<(), GridError> {
        if !self.compatible_sfc(sfc, Compat::HORIZ | Compat::TIME) {
            return Err(GridError::IncompatibleGrids);
        }

        self.level(k)?;
        let source = sfc.array()?;
        let meta = self.meta.clone();

        let data = self.data.as_mut().ok_or(GridError::NoData)?;
        let mut level = data.index_axis_mut(Axis(0), k);

        level.zip_mut_with(source, |dst, &src| {
            *dst = if src == sfc.meta.fill_value {
                meta.fill_value
            } else {
                meta.convert_from(&sfc.meta, src)
            };
        });

        Ok(())
    }

    /// Re-expresses the samples in other units.
    pub fn transform(&mut self, units: &str, mks_scale: Float, mks_offset: Float) -> Result<(), GridError> {
        let mut target = self.meta.clone();
        target.units = units.to_string();
        target.mks_scale = mks_scale;
        target.mks_offset = mks_offset;

        let source = self.meta.clone();
        let data = self.data.as_mut().ok_or(GridError::NoData)?;

        data.mapv_inplace(|v| {
            if v == source.fill_value {
                v
            } else {
                target.convert_from(&source, v)
            }
        });

        self.meta = target;
        Ok(())
    }

    /// Field whose samples are the vertical coordinate of each point.
    pub fn generate_vertical(&self) -> Field3D {
        let (nlons, nlats, nz) = self.dims();

        let mut meta = self.meta.clone();
        meta.quantity = self.meta.vquantity.clone();
        meta.units = self.meta.vunits.clone();
        meta.mks_scale = self.meta.mks_vscale;
        meta.mks_offset = self.meta.mks_voffset;

        let levels = &self.levels;
        let data = Array3::from_shape_fn((nz, nlats, nlons), |(k, _, _)| levels[k]);

        Field3D {
            meta,
            horizontal: self.horizontal.clone(),
            levels: self.levels.clone(),
            data: Some(data),
            server: None,
        }
    }

    pub(crate) fn data_mut(&mut self) -> Result<&mut Array3<Float>, GridError> {
        self.data.as_mut().ok_or(GridError::NoData)
    }
}

#[cfg(test)]
mod tests {
    use super::Field3D;
    use crate::errors::GridError;
    use crate::model::grid::{
        Compat, FieldMeta, FieldSfc, Fetch, Horizontal, LatLonGrid, MemoryServer,
    };
    use crate::Float;
    use float_cmp::approx_eq;
    use std::sync::Arc;

    fn sample_field() -> Field3D {
        let grid = Horizontal::from(LatLonGrid::global(4, 3).unwrap());
        let meta = FieldMeta::new("T", "K").with_vertical("air_pressure", "hPa");
        let data = (0..36).map(|v| v as Float).collect();

        Field3D::with_data(meta, grid, vec![1000.0, 500.0, 100.0], data).unwrap()
    }

    #[test]
    fn index_bijection() {
        let field = sample_field();

        for idx in 0..36 {
            let (i, j, k) = field.split_index(idx).unwrap();
            assert_eq!(field.join_index(i as isize, j, k).unwrap(), idx);
        }

        assert_eq!(field.join_index(4, 1, 2).unwrap(), field.join_index(0, 1, 2).unwrap());
        assert_eq!(field.join_index(-1, 0, 0).unwrap(), 3);
        assert!(field.split_index(36).is_err());
    }

    #[test]
    fn data_access_and_failures() {
        let mut field = sample_field();

        assert!(approx_eq!(Float, field.value(1, 2, 1).unwrap(), 21.0));
        assert!(matches!(field.value(4, 0, 0), Err(GridError::BadDataRequest(_))));

        *field.value_mut(1, 2, 1).unwrap() = -5.0;
        assert!(approx_eq!(Float, field.value_at(21).unwrap(), -5.0));

        assert_eq!(field.load(vec![0.0; 35]), Err(GridError::IncompatibleCoords));

        field.clear();
        assert_eq!(field.value(0, 0, 0), Err(GridError::NoData));
    }

    #[test]
    fn gridpoints_use_one_round_trip() {
        let mut field = sample_field();

        let mut server = MemoryServer::new();
        server.publish("T", (0..36).map(|v| 2.0 * v as Float).collect());
        let server = Arc::new(server);
        field.set_server(server.clone());

        let indices = [0, 5, 17, 35];
        let remote = field.gridpoints(&indices, Fetch::Auto).unwrap();
        let local = field.gridpoints(&indices, Fetch::Local).unwrap();

        assert_eq!(server.round_trips(), 1);
        assert_eq!(remote, vec![0.0, 10.0, 34.0, 70.0]);
        assert_eq!(local, vec![0.0, 5.0, 17.0, 35.0]);
    }

    #[test]
    fn level_surface_round_trip_with_units() {
        let mut field = sample_field();
        let sfc = field.extract_sfc(1).unwrap();

        assert_eq!(sfc.meta.surface.as_deref(), Some("500 hPa air_pressure surface"));
        assert!(field.compatible_sfc(&sfc, Compat::HORIZ | Compat::TIME));
        assert!(!field.compatible_sfc(&sfc, Compat::VERT));

        let mut celsius = sfc.clone();
        celsius.transform("C", 1.0, 273.15).unwrap();
        *celsius.value_mut(0, 0).unwrap() = celsius.fill_value();

        field.replace_level(&celsius, 2).unwrap();

        assert_eq!(field.value(0, 0, 2).unwrap(), field.fill_value());
        assert!(approx_eq!(Float, field.value(1, 0, 2).unwrap(), 13.0, epsilon = 1e-9));
    }

    #[test]
    fn incompatible_level_replacement() {
        let mut field = sample_field();
        let grid = Horizontal::from(LatLonGrid::global(4, 4).unwrap());
        let other = FieldSfc::prefilled(FieldMeta::new("T", "K"), grid, 1.0);

        assert_eq!(field.replace_level(&other, 0), Err(GridError::IncompatibleGrids));
    }

    #[test]
    fn vertical_compatibility() {
        let field = sample_field();
        let same = field.duplicate_empty();
        let other = field.with_levels(vec![1.0, 2.0, 3.0], "eta", "1");

        assert!(field.compatible(&same, Compat::ALL));
        assert!(field.match_field(&same));
        assert!(field.compatible(&other, Compat::HORIZ | Compat::TIME));
        assert!(!field.compatible(&other, Compat::VERT));

        let vertical = field.generate_vertical();
        assert_eq!(vertical.meta.quantity, "air_pressure");
        assert_eq!(vertical.profile(2, 1).unwrap(), vec![1000.0, 500.0, 100.0]);
    }
}
