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

//! Static assignment of global grid cells to ranks.

use crate::errors::AccessorError;
use crate::model::grid::cubed::latlonindex;
use crate::Float;
use ndarray::Array2;

/// Maps a point to the global cell that owns it.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum CellLocator {
    /// Regular global grid, cells centred on the nodes.
    LatLon { nlons: usize, nlats: usize },
    /// Cubed sphere, faces stacked along the rows.
    Cubed { im: usize },
}

impl CellLocator {
    /// Table dimensions (rows, cols) the locator indexes into.
    pub fn table_dims(&self) -> (usize, usize) {
        match *self {
            CellLocator::LatLon { nlons, nlats } => (nlats, nlons),
            CellLocator::Cubed { im } => (6 * im, im),
        }
    }

    /// (row, col) of the owning cell, `None` for points without one.
    pub fn cell(&self, lon: Float, lat: Float) -> Option<(usize, usize)> {
        if !lon.is_finite() || !lat.is_finite() {
            return None;
        }

        match *self {
            CellLocator::LatLon { nlons, nlats } => {
                if nlons == 0 || nlats < 2 {
                    return None;
                }

                let dlon = 360.0 / nlons as Float;
                let dlat = 180.0 / (nlats - 1) as Float;

                let col = ((lon + dlon / 2.0) / dlon).floor().rem_euclid(nlons as Float) as usize;
                let row = ((lat + 90.0 + dlat / 2.0) / dlat).floor();

                if row < 0.0 || row >= nlats as Float {
                    return None;
                }

                // rem_euclid may round up to nlons for tiny negative inputs
                Some((row as usize, col % nlons))
            }
            CellLocator::Cubed { im } => {
                let (face, di, dj) = latlonindex(im, lat, lon)?;
                Some(((face - 1) * im + dj / 2, di / 2))
            }
        }
    }
}

/// Cell-to-rank table, fixed for the lifetime of an accessor.
#[derive(Clone, PartialEq, Debug)]
pub struct PartitionMap {
    table: Array2<usize>,
    locator: CellLocator,
}

impl PartitionMap {
    /// Builds the map from a row-major table of owning ranks.
    pub fn new(locator: CellLocator, cell_to_rank: &[usize]) -> Result<Self, AccessorError> {
        let (rows, cols) = locator.table_dims();

        if rows == 0 || cols == 0 {
            return Err(AccessorError::BadInit("partition table has no cells"));
        }

        let table = Array2::from_shape_vec((rows, cols), cell_to_rank.to_vec())
            .map_err(|_| AccessorError::BadInit("partition table size does not match global grid"))?;

        Ok(PartitionMap { table, locator })
    }

    pub fn latlon(nlons: usize, nlats: usize, cell_to_rank: &[usize]) -> Result<Self, AccessorError> {
        PartitionMap::new(CellLocator::LatLon { nlons, nlats }, cell_to_rank)
    }

    pub fn cubed(im: usize, cell_to_rank: &[usize]) -> Result<Self, AccessorError> {
        PartitionMap::new(CellLocator::Cubed { im }, cell_to_rank)
    }

    pub fn locator(&self) -> CellLocator {
        self.locator
    }

    /// Highest rank id present in the table.
    pub fn max_rank(&self) -> usize {
        self.table.iter().copied().max().unwrap_or(0)
    }

    pub fn rank_of_cell(&self, row: usize, col: usize) -> Option<usize> {
        self.table.get((row, col)).copied()
    }

    pub fn owner(&self, lon: Float, lat: Float) -> Option<usize> {
        let (row, col) = self.locator.cell(lon, lat)?;
        self.rank_of_cell(row, col)
    }
}

#[cfg(test)]
mod tests {
    use super::{CellLocator, PartitionMap};
    use crate::model::grid::cubed::node_coords;
    use crate::Float;

    #[test]
    fn latlon_cells_are_centred_on_nodes() {
        let locator = CellLocator::LatLon { nlons: 4, nlats: 5 };

        assert_eq!(locator.cell(0.0, 0.0), Some((2, 0)));
        assert_eq!(locator.cell(44.0, -90.0), Some((0, 0)));
        assert_eq!(locator.cell(46.0, 90.0), Some((4, 1)));
        assert_eq!(locator.cell(350.0, 30.0), Some((3, 0)));
        assert_eq!(locator.cell(-10.0, 30.0), Some((3, 0)));
        assert_eq!(locator.cell(370.0, 30.0), locator.cell(10.0, 30.0));
        assert_eq!(locator.cell(0.0, 120.0), None);
        assert_eq!(locator.cell(Float::NAN, 0.0), None);
    }

    #[test]
    fn table_lookup() {
        // two bands: southern rows on rank 0, northern rows on rank 1
        let table: Vec<usize> = (0..5).flat_map(|row| vec![usize::from(row >= 3); 4]).collect();
        let map = PartitionMap::latlon(4, 5, &table).unwrap();

        assert_eq!(map.max_rank(), 1);
        assert_eq!(map.owner(100.0, -60.0), Some(0));
        assert_eq!(map.owner(100.0, 60.0), Some(1));
        assert_eq!(map.owner(100.0, 95.0), None);

        assert!(PartitionMap::latlon(4, 5, &table[..19]).is_err());
    }

    #[test]
    fn cubed_rows_include_face_offset() {
        let im = 4;
        let table: Vec<usize> = (0..6 * im * im).map(|cell| cell / (im * im)).collect();
        let map = PartitionMap::cubed(im, &table).unwrap();

        for face in 1..=6 {
            let (lon, lat) = node_coords(im, face, 1, 2).unwrap();

            assert_eq!(map.locator().cell(lon, lat), Some(((face - 1) * im + 2, 1)));
            assert_eq!(map.owner(lon, lat), Some(face - 1));
        }
    }
}
