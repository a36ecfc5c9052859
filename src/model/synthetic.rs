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

//! Idealised atmosphere handed to the ranks when no host model is attached.
//!
//! Every rank receives its share of a global grid (a latitude band or a
//! whole cube face, both with a one-node halo) filled with a solid-body
//! rotation and a uniform vertical velocity. Model levels are spread
//! linearly in pressure between the surface and the top.

use crate::errors::GridError;
use crate::model::configuration::{Grid, Topology, Wind};
use crate::model::grid::cubed::node_coords;
use crate::Float;

/// Local part of the global grid owned by a rank.
#[derive(Clone, PartialEq, Debug)]
pub enum Tile {
    LatLon {
        /// Longitude axis, full circle.
        lons: Vec<Float>,
        /// Latitude axis of the band and its halo rows.
        lats: Vec<Float>,
    },
    Cubed {
        face: usize,
        /// Node longitudes, halo included, `j` major.
        lons: Vec<Float>,
        /// Node latitudes, halo included, `j` major.
        lats: Vec<Float>,
    },
}

impl Tile {
    /// Builds the tile of `rank` out of `ranks`.
    pub fn for_rank(grid: &Grid, ranks: usize, rank: usize) -> Result<Self, GridError> {
        match grid.topology {
            Topology::LatLon => Ok(latlon_band(grid.nlons, grid.nlats, ranks, rank)),
            Topology::Cubed => cube_face(grid.cube_resolution, rank + 1),
        }
    }

    /// Horizontal node positions in the order of field values.
    pub fn nodes(&self) -> Vec<(Float, Float)> {
        match self {
            Tile::LatLon { lons, lats } => lats
                .iter()
                .flat_map(|&lat| lons.iter().map(move |&lon| (lon, lat)))
                .collect(),
            Tile::Cubed { lons, lats, .. } => lons.iter().copied().zip(lats.iter().copied()).collect(),
        }
    }
}

/// Rows `[start, end)` of the global lat-lon grid assigned to `rank`.
pub fn band_rows(nlats: usize, ranks: usize, rank: usize) -> (usize, usize) {
    (rank * nlats / ranks, (rank + 1) * nlats / ranks)
}

/// Global lat-lon axes, longitudes from 0 and latitudes from the south pole.
pub fn global_axes(nlons: usize, nlats: usize) -> (Vec<Float>, Vec<Float>) {
    let dlon = 360.0 / nlons as Float;
    let dlat = 180.0 / (nlats - 1) as Float;

    let lons = (0..nlons).map(|i| i as Float * dlon).collect();
    let lats = (0..nlats).map(|j| -90.0 + j as Float * dlat).collect();

    (lons, lats)
}

fn latlon_band(nlons: usize, nlats: usize, ranks: usize, rank: usize) -> Tile {
    let (lons, global_lats) = global_axes(nlons, nlats);
    let (start, end) = band_rows(nlats, ranks, rank);

    let first = start.saturating_sub(1);
    let last = end.min(nlats - 1);

    Tile::LatLon {
        lons,
        lats: global_lats[first..=last].to_vec(),
    }
}

fn cube_face(im: usize, face: usize) -> Result<Tile, GridError> {
    let mut lons = Vec::with_capacity((im + 2) * (im + 2));
    let mut lats = Vec::with_capacity((im + 2) * (im + 2));

    for j in -1..=im as isize {
        for i in -1..=im as isize {
            let (lon, lat) = node_coords(im, face, i, j)?;
            lons.push(lon);
            lats.push(lat);
        }
    }

    Ok(Tile::Cubed { face, lons, lats })
}

/// Row-major ownership table of the global grid cells.
pub fn cell_owners(grid: &Grid, ranks: usize) -> Vec<usize> {
    match grid.topology {
        Topology::LatLon => (0..grid.nlats)
            .flat_map(|row| {
                let owner = (0..ranks)
                    .find(|&rank| row < band_rows(grid.nlats, ranks, rank).1)
                    .unwrap_or(ranks - 1);
                std::iter::repeat(owner).take(grid.nlons)
            })
            .collect(),
        Topology::Cubed => {
            let im = grid.cube_resolution;
            (0..6 * im * im).map(|cell| cell / (im * im)).collect()
        }
    }
}

/// Raw model-level columns in the units the host model provides.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct Columns {
    /// Eastward wind in m/s.
    pub u: Vec<Float>,
    /// Northward wind in m/s.
    pub v: Vec<Float>,
    /// Vertical velocity in Pa/s.
    pub w: Vec<Float>,
    /// Pressure in Pa.
    pub p: Vec<Float>,
}

impl Columns {
    /// Pressure of the lowest model level at each of `nodes` nodes, in hPa.
    pub fn surface_pressure(&self, nodes: usize) -> Vec<Float> {
        self.p.iter().take(nodes).map(|p| p / 100.0).collect()
    }
}

/// Index of its model level at every node, level by level.
pub fn level_indices(nodes: usize, model_levels: usize) -> Vec<Float> {
    (0..model_levels)
        .flat_map(|level| std::iter::repeat(level as Float).take(nodes))
        .collect()
}

/// Solid-body rotation sampled at `nodes` on every model level.
pub fn solid_body(wind: &Wind, nodes: &[(Float, Float)], model_levels: usize) -> Columns {
    let size = nodes.len() * model_levels;
    let mut columns = Columns {
        u: Vec::with_capacity(size),
        v: vec![0.0; size],
        w: vec![wind.omega; size],
        p: Vec::with_capacity(size),
    };

    let dp = (wind.surface_pressure - wind.top_pressure) / (model_levels - 1) as Float;

    for level in 0..model_levels {
        let pressure = (wind.surface_pressure - level as Float * dp) * 100.0;

        for &(_, lat) in nodes {
            columns.u.push(wind.equator_speed * lat.to_radians().cos());
            columns.p.push(pressure);
        }
    }

    columns
}

#[cfg(test)]
mod tests {
    use super::{band_rows, cell_owners, level_indices, solid_body, Tile};
    use crate::model::configuration::{Grid, Topology, Wind};
    use float_cmp::approx_eq;

    fn grid(topology: Topology) -> Grid {
        Grid {
            topology,
            nlons: 8,
            nlats: 7,
            cube_resolution: 2,
            model_levels: 3,
            eta: vec![900.0, 500.0],
        }
    }

    #[test]
    fn bands_cover_globe() {
        let ranks = 3;
        let mut next = 0;

        for rank in 0..ranks {
            let (start, end) = band_rows(7, ranks, rank);
            assert_eq!(start, next);
            assert!(end > start);
            next = end;
        }

        assert_eq!(next, 7);

        let owners = cell_owners(&grid(Topology::LatLon), ranks);
        assert_eq!(owners.len(), 56);
        assert_eq!(owners[0], 0);
        assert_eq!(owners[3 * 8], 1);
        assert_eq!(owners[55], 2);
    }

    #[test]
    fn band_tile_has_halo() {
        let tile = Tile::for_rank(&grid(Topology::LatLon), 3, 1).unwrap();

        match &tile {
            Tile::LatLon { lons, lats } => {
                assert_eq!(lons.len(), 8);
                assert_eq!(lats, &vec![-60.0, -30.0, 0.0, 30.0]);
            }
            Tile::Cubed { .. } => panic!("expected a lat-lon tile"),
        }

        assert_eq!(tile.nodes().len(), 32);
        assert_eq!(tile.nodes()[9], (45.0, -30.0));
    }

    #[test]
    fn face_tile_and_owners() {
        let tile = Tile::for_rank(&grid(Topology::Cubed), 6, 4).unwrap();

        match &tile {
            Tile::Cubed { face, lons, .. } => {
                assert_eq!(*face, 5);
                assert_eq!(lons.len(), 16);
            }
            Tile::LatLon { .. } => panic!("expected a cubed tile"),
        }

        let owners = cell_owners(&grid(Topology::Cubed), 6);
        assert_eq!(owners.len(), 24);
        assert_eq!(owners[3], 0);
        assert_eq!(owners[4], 1);
        assert_eq!(owners[23], 5);
    }

    #[test]
    fn rotation_columns() {
        let wind = Wind {
            equator_speed: 20.0,
            omega: -0.5,
            surface_pressure: 1000.0,
            top_pressure: 200.0,
        };

        let columns = solid_body(&wind, &[(0.0, 0.0), (10.0, 60.0)], 3);

        assert_eq!(columns.u.len(), 6);
        assert!(approx_eq!(f64, columns.u[1], 10.0, epsilon = 1e-9));
        assert!(approx_eq!(f64, columns.u[2], 20.0, epsilon = 1e-9));
        assert_eq!(columns.v, vec![0.0; 6]);
        assert_eq!(columns.w, vec![-0.5; 6]);
        assert_eq!(columns.p, vec![100_000.0, 100_000.0, 60_000.0, 60_000.0, 20_000.0, 20_000.0]);
        assert_eq!(columns.surface_pressure(2), vec![1000.0, 1000.0]);
        assert_eq!(level_indices(2, 3), vec![0.0, 0.0, 1.0, 1.0, 2.0, 2.0]);
    }
}
