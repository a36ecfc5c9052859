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

//! Gridded fields and the horizontal topologies they live on.
//!
//! Samples are stored densely in (level, lat, lon) order and missing
//! data is always marked with the field's fill value.

mod bisection;
pub mod cubed;
mod field3d;
pub mod latlon;
mod server;
mod surface;

pub use cubed::CubedSphereGrid;
pub use field3d::Field3D;
pub use latlon::{LatLonGrid, WrapMode};
pub use server::{GridpointServer, MemoryServer};
pub use surface::FieldSfc;

use crate::constants::{DEFAULT_FILL_VALUE, TIME_TOLERANCE};
use crate::errors::GridError;
use crate::Float;
use std::ops::BitOr;

/// Four grid nodes bracketing a query point, ordered
/// (i1,j1), (i1,j2), (i2,j1), (i2,j2), with their coordinates.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct CellCorners {
    pub lon: Float,
    pub lat: Float,
    pub nodes: [(usize, usize); 4],
    pub lons: [Float; 4],
    pub lats: [Float; 4],
}

/// Index arithmetic shared by the horizontal topologies.
pub trait GridTopology {
    /// Number of (longitude, latitude) nodes.
    fn dims(&self) -> (usize, usize);

    /// Whether the grid wraps around the globe in longitude.
    fn wraps(&self) -> bool;

    /// Brings a longitude into the coordinate range of the grid.
    fn wrap(&self, lon: Float) -> Result<Float, GridError>;

    /// Brings a (possibly virtual) longitude index into the valid range.
    fn iwrap(&self, i: isize) -> Result<usize, GridError>;

    /// Longitude and latitude of the node.
    fn node(&self, i: usize, j: usize) -> Result<(Float, Float), GridError>;

    fn corners(&self, lon: Float, lat: Float) -> Result<CellCorners, GridError>;

    fn horizontally_compatible(&self, other: &Self) -> bool;
}

#[derive(Clone, PartialEq, Debug)]
pub enum Horizontal {
    LatLon(LatLonGrid),
    Cubed(CubedSphereGrid),
}

impl GridTopology for Horizontal {
    fn dims(&self) -> (usize, usize) {
        match self {
            Horizontal::LatLon(grid) => grid.dims(),
            Horizontal::Cubed(grid) => grid.dims(),
        }
    }

    fn wraps(&self) -> bool {
        match self {
            Horizontal::LatLon(grid) => grid.wraps(),
            Horizontal::Cubed(grid) => grid.wraps(),
        }
    }

    fn wrap(&self, lon: Float) -> Result<Float, GridError> {
        match self {
            Horizontal::LatLon(grid) => grid.wrap(lon),
            Horizontal::Cubed(grid) => grid.wrap(lon),
        }
    }

    fn iwrap(&self, i: isize) -> Result<usize, GridError> {
        match self {
            Horizontal::LatLon(grid) => GridTopology::iwrap(grid, i),
            Horizontal::Cubed(grid) => grid.iwrap(i),
        }
    }

    fn node(&self, i: usize, j: usize) -> Result<(Float, Float), GridError> {
        match self {
            Horizontal::LatLon(grid) => grid.node(i, j),
            Horizontal::Cubed(grid) => grid.node(i, j),
        }
    }

    fn corners(&self, lon: Float, lat: Float) -> Result<CellCorners, GridError> {
        match self {
            Horizontal::LatLon(grid) => grid.corners(lon, lat),
            Horizontal::Cubed(grid) => grid.corners(lon, lat),
        }
    }

    fn horizontally_compatible(&self, other: &Self) -> bool {
        match (self, other) {
            (Horizontal::LatLon(a), Horizontal::LatLon(b)) => a.horizontally_compatible(b),
            (Horizontal::Cubed(a), Horizontal::Cubed(b)) => a.horizontally_compatible(b),
            _ => false,
        }
    }
}

impl From<LatLonGrid> for Horizontal {
    fn from(grid: LatLonGrid) -> Self {
        Horizontal::LatLon(grid)
    }
}

impl From<CubedSphereGrid> for Horizontal {
    fn from(grid: CubedSphereGrid) -> Self {
        Horizontal::Cubed(grid)
    }
}

/// Set of aspects checked by `compatible()`.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Compat(u8);

impl Compat {
    pub const HORIZ: Compat = Compat(0b001);
    pub const VERT: Compat = Compat(0b010);
    pub const TIME: Compat = Compat(0b100);
    pub const ALL: Compat = Compat(0b111);

    pub fn contains(self, other: Compat) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Compat {
    type Output = Compat;

    fn bitor(self, rhs: Compat) -> Compat {
        Compat(self.0 | rhs.0)
    }
}

/// Whether samples are read from the local array or may go
/// through an attached gridpoint server.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Fetch {
    Local,
    Auto,
}

/// Physical description of a field.
///
/// Values convert to MKS units as `value * mks_scale + mks_offset`,
/// vertical coordinates likewise with the `mks_v*` pair.
#[derive(Clone, PartialEq, Debug)]
pub struct FieldMeta {
    pub quantity: String,
    pub units: String,
    pub mks_scale: Float,
    pub mks_offset: Float,
    pub vquantity: String,
    pub vunits: String,
    pub mks_vscale: Float,
    pub mks_voffset: Float,
    pub fill_value: Float,
    /// Valid time in model days.
    pub time: Float,
    /// Calendar form of the valid time.
    pub ctime: String,
    pub surface: Option<String>,
}

impl Default for FieldMeta {
    fn default() -> Self {
        FieldMeta {
            quantity: String::new(),
            units: String::new(),
            mks_scale: 1.0,
            mks_offset: 0.0,
            vquantity: String::new(),
            vunits: String::new(),
            mks_vscale: 1.0,
            mks_voffset: 0.0,
            fill_value: DEFAULT_FILL_VALUE,
            time: 0.0,
            ctime: String::new(),
            surface: None,
        }
    }
}

impl FieldMeta {
    pub fn new(quantity: &str, units: &str) -> Self {
        FieldMeta {
            quantity: quantity.to_string(),
            units: units.to_string(),
            ..Default::default()
        }
    }

    pub fn with_vertical(mut self, vquantity: &str, vunits: &str) -> Self {
        self.vquantity = vquantity.to_string();
        self.vunits = vunits.to_string();
        self
    }

    pub fn with_time(mut self, time: Float, ctime: &str) -> Self {
        self.time = time;
        self.ctime = ctime.to_string();
        self
    }

    pub fn with_fill(mut self, fill_value: Float) -> Self {
        self.fill_value = fill_value;
        self
    }

    pub fn same_time(&self, other: &FieldMeta) -> bool {
        (self.time - other.time).abs() < TIME_TOLERANCE
    }

    /// Converts a non-fill value from `source` units to the units of `self`.
    pub(crate) fn convert_from(&self, source: &FieldMeta, value: Float) -> Float {
        let mks = value * source.mks_scale + source.mks_offset;
        (mks - self.mks_offset) / self.mks_scale
    }
}

#[cfg(test)]
mod tests {
    use super::{Compat, FieldMeta, GridTopology, Horizontal, LatLonGrid};
    use crate::model::grid::CubedSphereGrid;
    use crate::Float;
    use float_cmp::approx_eq;

    #[test]
    fn compat_flags() {
        let flags = Compat::HORIZ | Compat::TIME;

        assert!(flags.contains(Compat::HORIZ));
        assert!(flags.contains(Compat::TIME));
        assert!(!flags.contains(Compat::VERT));
        assert!(Compat::ALL.contains(flags));
    }

    #[test]
    fn topology_variants_are_not_compatible() {
        let latlon = Horizontal::from(LatLonGrid::global(4, 4).unwrap());
        let cubed = Horizontal::from(CubedSphereGrid::tile(4, 1, (0, 3), (0, 3)).unwrap());

        assert!(latlon.horizontally_compatible(&latlon.clone()));
        assert!(!latlon.horizontally_compatible(&cubed));
        assert_eq!(cubed.dims(), (6, 6));
    }

    #[test]
    fn unit_conversion() {
        let hpa = FieldMeta {
            mks_scale: 100.0,
            ..FieldMeta::new("air_pressure", "hPa")
        };
        let pa = FieldMeta::new("air_pressure", "Pa");

        assert!(approx_eq!(Float, hpa.convert_from(&pa, 85000.0), 850.0));
        assert!(approx_eq!(Float, pa.convert_from(&hpa, 500.0), 50000.0));
    }
}
