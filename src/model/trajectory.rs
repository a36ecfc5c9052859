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

//! Parcel advection through the sampled wind field.

mod runge_kutta;

pub use runge_kutta::RungeKutta4;

use crate::constants::EARTH_RADIUS_KM;
use crate::errors::TrajectoryError;
use crate::model::distributed::{MetAccessor, PointExchange};
use crate::model::interpolation::bilinear::great_circle_distance;
use crate::Float;

/// Source of winds along parcel paths.
///
/// Implementations backed by distributed fields make every call a
/// collective one, so all ranks must sample the same number of times.
pub trait WindSampler {
    /// Horizontal winds in m/s and vertical velocity in coordinate units
    /// per second at model time `time` (days).
    fn sample_winds(
        &self,
        time: Float,
        lons: &[Float],
        lats: &[Float],
        zs: &[Float],
    ) -> Result<(Vec<Float>, Vec<Float>, Vec<Float>), TrajectoryError>;

    /// Marker of winds that could not be sampled.
    fn fill_value(&self) -> Float;
}

impl<E: PointExchange> WindSampler for MetAccessor<E> {
    fn sample_winds(
        &self,
        time: Float,
        lons: &[Float],
        lats: &[Float],
        zs: &[Float],
    ) -> Result<(Vec<Float>, Vec<Float>, Vec<Float>), TrajectoryError> {
        Ok(self.get_uvw(time, lons, lats, zs)?)
    }

    fn fill_value(&self) -> Float {
        self.settings().fill_value
    }
}

/// Navigation on a spherical planet, positions in degrees.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct PlanetNav {
    radius: Float,
    wrap_limit: Float,
}

impl Default for PlanetNav {
    fn default() -> Self {
        PlanetNav {
            radius: EARTH_RADIUS_KM,
            wrap_limit: -180.0,
        }
    }
}

impl PlanetNav {
    /// Planet with `radius` in km, longitudes kept in `[wrap_limit, wrap_limit + 360)`.
    pub fn new(radius: Float, wrap_limit: Float) -> Self {
        PlanetNav { radius, wrap_limit }
    }

    pub fn radius(&self) -> Float {
        self.radius
    }

    pub fn wrap(&self, lon: Float) -> Float {
        if !lon.is_finite() {
            return lon;
        }

        let wrapped = (lon - self.wrap_limit).rem_euclid(360.0) + self.wrap_limit;

        if wrapped >= self.wrap_limit + 360.0 {
            self.wrap_limit
        } else {
            wrapped
        }
    }

    pub fn check_pos(&self, lon: Float, lat: Float) -> Result<(), TrajectoryError> {
        if !lon.is_finite() || !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(TrajectoryError::BadLocation);
        }

        Ok(())
    }

    /// Moves a position by `factor` times the given increments in degrees.
    ///
    /// Crossing a pole reflects the latitude and turns the longitude by 180°.
    /// Non-finite increments leave the position unchanged.
    pub fn deltapos(
        &self,
        lon: Float,
        lat: Float,
        dlon: Float,
        dlat: Float,
        factor: Float,
    ) -> Result<(Float, Float), TrajectoryError> {
        if !dlon.is_finite() || !dlat.is_finite() {
            return Ok((lon, lat));
        }

        let mut lon = lon;
        let mut lat = lat + dlat * factor;

        if lat > 90.0 {
            lat = 180.0 - lat;
            lon += 180.0;
        } else if lat < -90.0 {
            lat = -180.0 - lat;
            lon += 180.0;
        }

        self.check_pos(lon, lat)
            .map_err(|_| TrajectoryError::BadIncrement)?;

        Ok((self.wrap(lon + dlon * factor), lat))
    }

    /// Great-circle distance in km.
    pub fn distance(&self, lon1: Float, lat1: Float, lon2: Float, lat2: Float) -> Float {
        self.radius * great_circle_distance(lon1, lat1, lon2, lat2)
    }
}

#[cfg(test)]
mod tests {
    use super::PlanetNav;
    use crate::errors::TrajectoryError;
    use float_cmp::approx_eq;
    use std::f64::consts::PI;

    #[test]
    fn wrapping() {
        let nav = PlanetNav::default();

        assert!(approx_eq!(f64, nav.wrap(190.0), -170.0));
        assert!(approx_eq!(f64, nav.wrap(-180.0), -180.0));
        assert!(approx_eq!(f64, nav.wrap(180.0), -180.0));
        assert!(approx_eq!(f64, nav.wrap(nav.wrap(725.0)), nav.wrap(725.0)));
        assert!(approx_eq!(f64, PlanetNav::new(6371.0, 0.0).wrap(-10.0), 350.0));
    }

    #[test]
    fn pole_crossing() {
        let nav = PlanetNav::default();

        let (lon, lat) = nav.deltapos(10.0, 89.0, 0.0, 2.0, 1.0).unwrap();
        assert!(approx_eq!(f64, lat, 89.0, epsilon = 1e-12));
        assert!(approx_eq!(f64, lon, -170.0, epsilon = 1e-12));

        let (lon, lat) = nav.deltapos(0.0, -88.0, 4.0, -6.0, 0.5).unwrap();
        assert!(approx_eq!(f64, lat, -89.0, epsilon = 1e-12));
        assert!(approx_eq!(f64, lon, -178.0, epsilon = 1e-12));

        assert_eq!(
            nav.deltapos(0.0, 0.0, 0.0, 400.0, 1.0).unwrap_err().to_string(),
            TrajectoryError::BadIncrement.to_string()
        );
    }

    #[test]
    fn missing_increment_keeps_position() {
        let nav = PlanetNav::default();
        assert_eq!(nav.deltapos(5.0, 5.0, f64::NAN, 1.0, 1.0).unwrap(), (5.0, 5.0));
    }

    #[test]
    fn quarter_of_equator() {
        let nav = PlanetNav::default();
        assert!(approx_eq!(f64, nav.distance(0.0, 0.0, 90.0, 0.0), 6371.0 * PI / 2.0, epsilon = 1e-9));
        assert!(approx_eq!(f64, nav.distance(30.0, 89.0, 30.0, 89.0), 0.0));
    }
}
