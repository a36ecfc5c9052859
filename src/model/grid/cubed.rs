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

//! Cubed-sphere topology of a single rank's tile.
//!
//! A tile covers cells `i_start..=i_end` and `j_start..=j_end` (0-based,
//! within one face of `im` x `im` cells) plus a one-cell halo on every
//! side, so local index 0 is the halo and `nlons = i_end - i_start + 3`.
//! Node coordinates are stored row by row at `j * nlons + i`.

use nalgebra::Vector3;

use super::{CellCorners, GridTopology};
use crate::constants::{COORD_TOLERANCE, CUBE_ALPHA, CUBE_FACE_TOLERANCE, CUBE_LON_SHIFT};
use crate::errors::GridError;
use crate::Float;

#[derive(Clone, PartialEq, Debug)]
pub struct CubedSphereGrid {
    im: usize,
    face: usize,
    i_start: usize,
    i_end: usize,
    j_start: usize,
    j_end: usize,
    nlons: usize,
    nlats: usize,
    lons: Vec<Float>,
    lats: Vec<Float>,
}

impl CubedSphereGrid {
    /// Tile with explicitly given node coordinates (halo included).
    pub fn new(
        im: usize,
        face: usize,
        (i_start, i_end): (usize, usize),
        (j_start, j_end): (usize, usize),
        lons: Vec<Float>,
        lats: Vec<Float>,
    ) -> Result<Self, GridError> {
        if im == 0 || !(1..=6).contains(&face) {
            return Err(GridError::BadDataRequest("cube resolution or face is invalid"));
        }

        if i_start > i_end || j_start > j_end || i_end >= im || j_end >= im {
            return Err(GridError::BadDataRequest("tile index ranges are invalid"));
        }

        let nlons = i_end - i_start + 3;
        let nlats = j_end - j_start + 3;

        if lons.len() != nlons * nlats || lats.len() != nlons * nlats {
            return Err(GridError::IncompatibleCoords);
        }

        let lons = lons.into_iter().map(normalize_lon).collect();

        Ok(CubedSphereGrid {
            im,
            face,
            i_start,
            i_end,
            j_start,
            j_end,
            nlons,
            nlats,
            lons,
            lats,
        })
    }

    /// Tile whose node coordinates are generated from the cube geometry.
    pub fn tile(
        im: usize,
        face: usize,
        i_range: (usize, usize),
        j_range: (usize, usize),
    ) -> Result<Self, GridError> {
        let nlons = i_range.1.saturating_sub(i_range.0) + 3;
        let nlats = j_range.1.saturating_sub(j_range.0) + 3;

        let mut lons = Vec::with_capacity(nlons * nlats);
        let mut lats = Vec::with_capacity(nlons * nlats);

        for j in 0..nlats {
            for i in 0..nlons {
                let ci = i_range.0 as isize + i as isize - 1;
                let cj = j_range.0 as isize + j as isize - 1;
                let (lon, lat) = node_coords(im, face, ci, cj)?;
                lons.push(lon);
                lats.push(lat);
            }
        }

        CubedSphereGrid::new(im, face, i_range, j_range, lons, lats)
    }

    pub fn im(&self) -> usize {
        self.im
    }

    pub fn face(&self) -> usize {
        self.face
    }

    pub fn i_range(&self) -> (usize, usize) {
        (self.i_start, self.i_end)
    }

    pub fn j_range(&self) -> (usize, usize) {
        (self.j_start, self.j_end)
    }

    pub fn longitudes(&self) -> &[Float] {
        &self.lons
    }

    pub fn latitudes(&self) -> &[Float] {
        &self.lats
    }

    fn local_index(&self, doubled: usize, start: usize, n: usize) -> Result<usize, GridError> {
        let i1 = ((doubled + 1) / 2) as isize - start as isize;

        if i1 < 0 || i1 as usize + 1 >= n {
            return Err(GridError::BadDataRequest("point lies outside the tile"));
        }

        Ok(i1 as usize)
    }
}

impl GridTopology for CubedSphereGrid {
    fn dims(&self) -> (usize, usize) {
        (self.nlons, self.nlats)
    }

    fn wraps(&self) -> bool {
        false
    }

    fn wrap(&self, lon: Float) -> Result<Float, GridError> {
        if !lon.is_finite() {
            return Err(GridError::BadDataIndex);
        }

        Ok(normalize_lon(lon))
    }

    fn iwrap(&self, i: isize) -> Result<usize, GridError> {
        if (0..self.nlons as isize).contains(&i) {
            Ok(i as usize)
        } else {
            Err(GridError::BadDataIndex)
        }
    }

    fn node(&self, i: usize, j: usize) -> Result<(Float, Float), GridError> {
        if i >= self.nlons || j >= self.nlats {
            return Err(GridError::BadDataRequest("node index out of range"));
        }

        let pos = j * self.nlons + i;
        Ok((self.lons[pos], self.lats[pos]))
    }

    fn corners(&self, lon: Float, lat: Float) -> Result<CellCorners, GridError> {
        if !lat.is_finite() {
            return Err(GridError::BadDataIndex);
        }

        let lon = self.wrap(lon)?;
        let (face, di, dj) = latlonindex(self.im, lat, lon).ok_or(GridError::BadDataIndex)?;

        if face != self.face {
            return Err(GridError::BadDataRequest("point lies on a different cube face"));
        }

        let i1 = self.local_index(di, self.i_start, self.nlons)?;
        let j1 = self.local_index(dj, self.j_start, self.nlats)?;
        let (i2, j2) = (i1 + 1, j1 + 1);

        let nodes = [(i1, j1), (i1, j2), (i2, j1), (i2, j2)];
        let mut lons = [0.0; 4];
        let mut lats = [0.0; 4];

        for (n, &(i, j)) in nodes.iter().enumerate() {
            let (node_lon, node_lat) = self.node(i, j)?;
            lons[n] = node_lon;
            lats[n] = node_lat;
        }

        Ok(CellCorners {
            lon,
            lat,
            nodes,
            lons,
            lats,
        })
    }

    fn horizontally_compatible(&self, other: &Self) -> bool {
        self.im == other.im
            && self.face == other.face
            && self.i_range() == other.i_range()
            && self.j_range() == other.j_range()
            && self
                .lons
                .iter()
                .zip(other.lons.iter())
                .chain(self.lats.iter().zip(other.lats.iter()))
                .all(|(a, b)| (a - b).abs() <= COORD_TOLERANCE)
    }
}

/// Finds the cube face containing the point and the doubled
/// (half-cell resolution) indices of the point within that face.
///
/// Faces are numbered 1 to 6.
pub fn latlonindex(im: usize, lat: Float, lon: Float) -> Option<(usize, usize, usize)> {
    if im == 0 || !lat.is_finite() || !lon.is_finite() {
        return None;
    }

    let lon = lon.to_radians() + CUBE_LON_SHIFT;
    let lat = lat.to_radians();

    let point = Vector3::new(lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin());
    let point = point / point.amax();
    let (x, y, z) = (point.x, point.y, point.z);

    let on = |v: Float, side: Float| (v - side).abs() <= CUBE_FACE_TOLERANCE;

    let (face, a, b) = if on(x, 1.0) {
        (1, y, z)
    } else if on(y, 1.0) {
        (2, -x, z)
    } else if on(z, 1.0) {
        (3, -x, -y)
    } else if on(x, -1.0) {
        (4, -z, -y)
    } else if on(y, -1.0) {
        (5, -z, x)
    } else if on(z, -1.0) {
        (6, y, x)
    } else {
        return None;
    };

    Some((face, angle_to_index(im, a), angle_to_index(im, b)))
}

fn angle_to_index(im: usize, v: Float) -> usize {
    let dalpha = CUBE_ALPHA / im as Float;
    let index = (((v / Float::sqrt(2.0)).atan() + CUBE_ALPHA) / dalpha).floor();

    index.clamp(0.0, (2 * im - 1) as Float) as usize
}

/// Longitude (in `[0, 360)`) and latitude of the centre of cell `(ci, cj)`
/// on the given face. Indices just outside `0..im` give halo positions.
pub fn node_coords(im: usize, face: usize, ci: isize, cj: isize) -> Result<(Float, Float), GridError> {
    if im == 0 {
        return Err(GridError::BadDataRequest("cube resolution must be positive"));
    }

    let dalpha = 2.0 * CUBE_ALPHA / im as Float;
    let sqrt2 = Float::sqrt(2.0);
    let a = sqrt2 * (-CUBE_ALPHA + (ci as Float + 0.5) * dalpha).tan();
    let b = sqrt2 * (-CUBE_ALPHA + (cj as Float + 0.5) * dalpha).tan();

    let point = match face {
        1 => Vector3::new(1.0, a, b),
        2 => Vector3::new(-a, 1.0, b),
        3 => Vector3::new(-a, -b, 1.0),
        4 => Vector3::new(-1.0, -b, -a),
        5 => Vector3::new(b, -1.0, -a),
        6 => Vector3::new(b, a, -1.0),
        _ => return Err(GridError::BadDataRequest("cube faces are numbered 1 to 6")),
    };

    let lon = (point.y.atan2(point.x) - CUBE_LON_SHIFT).to_degrees();
    let lat = point.z.atan2(point.x.hypot(point.y)).to_degrees();

    Ok((normalize_lon(lon), lat))
}

fn normalize_lon(lon: Float) -> Float {
    let lon = lon.rem_euclid(360.0);

    // rem_euclid rounds up to the modulus for tiny negative inputs
    if lon >= 360.0 {
        0.0
    } else {
        lon
    }
}

#[cfg(test)]
mod tests {
    use super::{latlonindex, node_coords, CubedSphereGrid};
    use crate::model::grid::GridTopology;
    use crate::Float;
    use float_cmp::approx_eq;

    #[test]
    fn cell_centres_map_back_to_their_cells() {
        let im = 6;

        for face in 1..=6 {
            for ci in 0..im as isize {
                for cj in 0..im as isize {
                    let (lon, lat) = node_coords(im, face, ci, cj).unwrap();
                    let (f, di, dj) = latlonindex(im, lat, lon).unwrap();

                    assert_eq!(f, face);
                    assert_eq!(di / 2, ci as usize);
                    assert_eq!(dj / 2, cj as usize);
                }
            }
        }
    }

    #[test]
    fn poles_and_equator_faces() {
        assert_eq!(latlonindex(4, 90.0, 0.0).unwrap().0, 3);
        assert_eq!(latlonindex(4, -90.0, 0.0).unwrap().0, 6);
        assert_eq!(latlonindex(4, 0.0, 0.0).unwrap().0, 1);
        assert_eq!(latlonindex(4, 0.0, 90.0).unwrap().0, 2);
        assert_eq!(latlonindex(4, 0.0, 180.0).unwrap().0, 4);
        assert_eq!(latlonindex(4, 0.0, 270.0).unwrap().0, 5);
        assert!(latlonindex(4, Float::NAN, 0.0).is_none());
    }

    #[test]
    fn tile_dimensions_include_halo() {
        let tile = CubedSphereGrid::tile(8, 1, (2, 5), (0, 7)).unwrap();

        assert_eq!(tile.dims(), (6, 10));
        assert!(!tile.wraps());
        assert!(tile.longitudes().iter().all(|lon| (0.0..360.0).contains(lon)));
    }

    #[test]
    fn corners_at_cell_centre() {
        let im = 8;
        let tile = CubedSphereGrid::tile(im, 2, (0, 7), (0, 7)).unwrap();
        let (lon, lat) = node_coords(im, 2, 3, 4).unwrap();
        let corners = tile.corners(lon, lat).unwrap();

        // centre of global cell (3, 4) is local node (4, 5)
        assert!(corners.nodes.contains(&(4, 5)));

        let hit = corners.nodes.iter().position(|&n| n == (4, 5)).unwrap();
        assert!(approx_eq!(Float, corners.lons[hit], lon, epsilon = 1e-9));
        assert!(approx_eq!(Float, corners.lats[hit], lat, epsilon = 1e-9));
    }

    #[test]
    fn other_face_is_rejected() {
        let tile = CubedSphereGrid::tile(4, 1, (0, 3), (0, 3)).unwrap();
        assert!(tile.corners(180.0, 0.0).is_err());
    }

    #[test]
    fn coordinate_count_is_checked() {
        let result = CubedSphereGrid::new(4, 1, (0, 1), (0, 1), vec![0.0; 3], vec![0.0; 3]);
        assert!(result.is_err());
    }
}
