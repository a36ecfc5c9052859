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

//! Two-dimensional (single surface) gridded field.

use super::{Compat, FieldMeta, Fetch, GridTopology, GridpointServer, Horizontal};
use crate::errors::GridError;
use crate::Float;
use ndarray::Array2;
use std::sync::Arc;

/// Scalar samples on a horizontal grid, stored as `(lat, lon)`.
#[derive(Clone, Debug)]
pub struct FieldSfc {
    pub meta: FieldMeta,
    horizontal: Horizontal,
    data: Option<Array2<Float>>,
    server: Option<Arc<dyn GridpointServer>>,
}

impl FieldSfc {
    pub fn new(meta: FieldMeta, horizontal: Horizontal) -> Self {
        FieldSfc {
            meta,
            horizontal,
            data: None,
            server: None,
        }
    }

    pub fn with_data(meta: FieldMeta, horizontal: Horizontal, data: Vec<Float>) -> Result<Self, GridError> {
        let mut field = FieldSfc::new(meta, horizontal);
        field.load(data)?;
        Ok(field)
    }

    pub(super) fn from_array(
        meta: FieldMeta,
        horizontal: Horizontal,
        data: Array2<Float>,
    ) -> Result<Self, GridError> {
        let (nlons, nlats) = horizontal.dims();

        if data.dim() != (nlats, nlons) {
            return Err(GridError::IncompatibleCoords);
        }

        Ok(FieldSfc {
            meta,
            horizontal,
            data: Some(data),
            server: None,
        })
    }

    pub fn prefilled(meta: FieldMeta, horizontal: Horizontal, value: Float) -> Self {
        let (nlons, nlats) = horizontal.dims();
        let data = Array2::from_elem((nlats, nlons), value);

        FieldSfc {
            meta,
            horizontal,
            data: Some(data),
            server: None,
        }
    }

    pub fn load(&mut self, data: Vec<Float>) -> Result<(), GridError> {
        let (nlons, nlats) = self.dims();

        if data.len() != nlons * nlats {
            return Err(GridError::IncompatibleCoords);
        }

        let data =
            Array2::from_shape_vec((nlats, nlons), data).map_err(|_| GridError::IncompatibleCoords)?;
        self.data = Some(data);

        Ok(())
    }

    pub fn set_server(&mut self, server: Arc<dyn GridpointServer>) {
        self.server = Some(server);
    }

    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    pub fn horizontal(&self) -> &Horizontal {
        &self.horizontal
    }

    pub fn fill_value(&self) -> Float {
        self.meta.fill_value
    }

    /// (nlons, nlats)
    pub fn dims(&self) -> (usize, usize) {
        self.horizontal.dims()
    }

    pub fn join_index(&self, i: isize, j: usize) -> Result<usize, GridError> {
        let (nlons, nlats) = self.dims();
        let i = self.horizontal.iwrap(i)?;

        if j >= nlats {
            return Err(GridError::BadDataRequest("sample index out of range"));
        }

        Ok(j * nlons + i)
    }

    pub fn split_index(&self, idx: usize) -> Result<(usize, usize), GridError> {
        let (nlons, nlats) = self.dims();

        if idx >= nlons * nlats {
            return Err(GridError::BadDataRequest("flat index out of range"));
        }

        Ok((idx % nlons, idx / nlons))
    }

    pub(crate) fn array(&self) -> Result<&Array2<Float>, GridError> {
        self.data.as_ref().ok_or(GridError::NoData)
    }

    pub fn value(&self, i: usize, j: usize) -> Result<Float, GridError> {
        self.array()?
            .get((j, i))
            .copied()
            .ok_or(GridError::BadDataRequest("sample index out of range"))
    }

    pub fn value_at(&self, idx: usize) -> Result<Float, GridError> {
        let data = self.array()?;
        let (i, j) = self.split_index(idx)?;

        Ok(data[(j, i)])
    }

    pub fn value_mut(&mut self, i: usize, j: usize) -> Result<&mut Float, GridError> {
        self.data
            .as_mut()
            .ok_or(GridError::NoData)?
            .get_mut((j, i))
            .ok_or(GridError::BadDataRequest("sample index out of range"))
    }

    pub fn values(&self, indices: &[usize]) -> Result<Vec<Float>, GridError> {
        indices.iter().map(|&idx| self.value_at(idx)).collect()
    }

    pub fn gridpoints(&self, indices: &[usize], fetch: Fetch) -> Result<Vec<Float>, GridError> {
        match (&self.server, fetch) {
            (Some(server), Fetch::Auto) => {
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

    /// Vertical compatibility has no meaning for surfaces and is ignored.
    pub fn compatible(&self, other: &FieldSfc, flags: Compat) -> bool {
        if flags.contains(Compat::HORIZ) && !self.horizontal.horizontally_compatible(&other.horizontal) {
            return false;
        }

        !(flags.contains(Compat::TIME) && !self.meta.same_time(&other.meta))
    }

    pub fn match_field(&self, other: &FieldSfc) -> bool {
        self.meta.quantity == other.meta.quantity
            && self.meta.units == other.meta.units
            && self.meta.surface == other.meta.surface
            && self.compatible(other, Compat::ALL)
    }

    pub fn duplicate_empty(&self) -> FieldSfc {
        FieldSfc {
            meta: self.meta.clone(),
            horizontal: self.horizontal.clone(),
            data: None,
            server: self.server.clone(),
        }
    }

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

    pub(crate) fn data_mut(&mut self) -> Result<&mut Array2<Float>, GridError> {
        self.data.as_mut().ok_or(GridError::NoData)
    }
}

#[cfg(test)]
mod tests {
    use super::FieldSfc;
    use crate::errors::GridError;
    use crate::model::grid::{Compat, FieldMeta, Horizontal, LatLonGrid};
    use crate::Float;
    use float_cmp::approx_eq;

    fn scenario_field() -> FieldSfc {
        let grid = Horizontal::from(LatLonGrid::global(4, 4).unwrap());
        let mut data = Vec::new();

        for j in 0..4 {
            for i in 0..4 {
                data.push((i + 10 * j) as Float);
            }
        }

        FieldSfc::with_data(FieldMeta::new("Q", "1"), grid, data).unwrap()
    }

    #[test]
    fn index_bijection() {
        let field = scenario_field();

        for idx in 0..16 {
            let (i, j) = field.split_index(idx).unwrap();
            assert_eq!(field.join_index(i as isize, j).unwrap(), idx);
            assert!(approx_eq!(Float, field.value_at(idx).unwrap(), (i + 10 * j) as Float));
        }

        assert_eq!(field.join_index(4, 3).unwrap(), 12);
    }

    #[test]
    fn transform_keeps_fill() {
        let mut field = scenario_field();
        *field.value_mut(2, 2).unwrap() = field.fill_value();

        field.transform("%", 0.01, 0.0).unwrap();

        assert!(approx_eq!(Float, field.value(1, 1).unwrap(), 1100.0, epsilon = 1e-9));
        assert_eq!(field.value(2, 2).unwrap(), field.fill_value());
        assert_eq!(field.meta.units, "%");
    }

    #[test]
    fn compatibility() {
        let field = scenario_field();
        let mut later = field.clone();
        later.meta.time = 1.5;

        assert!(field.match_field(&field.clone()));
        assert!(field.compatible(&later, Compat::HORIZ));
        assert!(!field.compatible(&later, Compat::TIME));
        assert!(!field.duplicate_empty().has_data());
        assert_eq!(field.duplicate_empty().value(0, 0), Err(GridError::NoData));
    }
}
