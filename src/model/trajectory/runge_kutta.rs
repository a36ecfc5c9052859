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

//! Fourth-order Runge-Kutta advection of parcels on the sphere.

use super::{PlanetNav, WindSampler};
use crate::constants::SECONDS_PER_DAY;
use crate::errors::TrajectoryError;
use crate::Float;
use log::{debug, warn};

/// Fraction of the timestep at which each stage samples the winds.
const STAGE_TIMES: [Float; 4] = [0.0, 0.5, 0.5, 1.0];
const STAGE_WEIGHTS: [Float; 4] = [1.0, 2.0, 2.0, 1.0];

#[derive(Copy, Clone, Debug, Default)]
pub struct RungeKutta4 {
    nav: PlanetNav,
}

impl RungeKutta4 {
    pub fn new(nav: PlanetNav) -> Self {
        RungeKutta4 { nav }
    }

    pub fn nav(&self) -> &PlanetNav {
        &self.nav
    }

    /// Displacement in degrees (and vertical units) over `dt` seconds from
    /// `(lon, lat)` with winds in m/s. The zonal step uses the latitude
    /// half way along the meridional step.
    fn increment(
        &self,
        (lon, lat): (Float, Float),
        (u, v, w): (Float, Float, Float),
        dt: Float,
    ) -> Result<(Float, Float, Float), TrajectoryError> {
        let radius = self.nav.radius();
        let dlat = (dt * v / 1000.0 / radius).to_degrees();

        let (_, midlat) = self.nav.deltapos(lon, lat, 0.0, dlat, 0.5)?;
        let dlon = if midlat.abs() == 90.0 {
            0.0
        } else {
            (dt * u / 1000.0 / radius / midlat.to_radians().cos()).to_degrees()
        };

        Ok((dlon, dlat, dt * w))
    }

    /// Advances a single parcel by `dt` days starting at model time `time`.
    pub fn go<W: WindSampler>(
        &self,
        position: (Float, Float, Float),
        time: Float,
        winds: &W,
        dt: Float,
    ) -> Result<(Float, Float, Float), TrajectoryError> {
        let (mut lons, mut lats, mut zs) = ([position.0], [position.1], [position.2]);
        let mut flags = [false];

        self.go_batch(&mut lons, &mut lats, &mut zs, &mut flags, time, winds, dt)?;

        if flags[0] {
            return Err(TrajectoryError::MissingWinds);
        }

        Ok((lons[0], lats[0], zs[0]))
    }

    /// Advances every unflagged parcel in place by `dt` days.
    ///
    /// Parcels whose winds are missing at any stage, or whose increment
    /// leaves the planet, are flagged and left where they were. Each stage
    /// samples the winds once for all active parcels, also when none are left.
    #[allow(clippy::too_many_arguments)]
    pub fn go_batch<W: WindSampler>(
        &self,
        lons: &mut [Float],
        lats: &mut [Float],
        zs: &mut [Float],
        flags: &mut [bool],
        time: Float,
        winds: &W,
        dt: Float,
    ) -> Result<(), TrajectoryError> {
        let n = lons.len();
        if lats.len() != n || zs.len() != n || flags.len() != n {
            return Err(TrajectoryError::LengthMismatch);
        }

        let active: Vec<usize> = (0..n).filter(|&i| !flags[i]).collect();
        let start: Vec<(Float, Float, Float)> = active.iter().map(|&i| (lons[i], lats[i], zs[i])).collect();

        let dt_seconds = dt * SECONDS_PER_DAY;
        let fill = winds.fill_value();
        let usable = |value: Float| value.is_finite() && value != fill;

        let mut valid = vec![true; active.len()];
        let mut sums = vec![(0.0, 0.0, 0.0); active.len()];
        let mut stage_lons: Vec<Float> = start.iter().map(|p| p.0).collect();
        let mut stage_lats: Vec<Float> = start.iter().map(|p| p.1).collect();
        let mut stage_zs: Vec<Float> = start.iter().map(|p| p.2).collect();

        for stage in 0..4 {
            let (us, vs, ws) = winds.sample_winds(
                time + STAGE_TIMES[stage] * dt,
                &stage_lons,
                &stage_lats,
                &stage_zs,
            )?;

            for p in 0..active.len() {
                if !valid[p] {
                    continue;
                }

                let (u, v, w) = (us[p], vs[p], ws[p]);
                let (lon, lat, z) = start[p];

                if !(usable(u) && usable(v) && usable(w)) {
                    debug!("Parcel {} has no winds at stage {}", active[p], stage + 1);
                    valid[p] = false;
                    continue;
                }

                let step = self
                    .increment((lon, lat), (u, v, w), dt_seconds)
                    .and_then(|(dlon, dlat, dz)| {
                        let weight = STAGE_WEIGHTS[stage];
                        sums[p].0 += weight * dlon;
                        sums[p].1 += weight * dlat;
                        sums[p].2 += weight * dz;

                        match STAGE_TIMES.get(stage + 1) {
                            Some(&factor) => {
                                let (next_lon, next_lat) = self.nav.deltapos(lon, lat, dlon, dlat, factor)?;
                                Ok((next_lon, next_lat, z + dz * factor))
                            }
                            None => Ok((lon, lat, z)),
                        }
                    });

                match step {
                    Ok((next_lon, next_lat, next_z)) => {
                        stage_lons[p] = next_lon;
                        stage_lats[p] = next_lat;
                        stage_zs[p] = next_z;
                    }
                    Err(err) => {
                        warn!("Parcel {} cannot be advanced: {}", active[p], err);
                        valid[p] = false;
                    }
                }
            }
        }

        for (p, &i) in active.iter().enumerate() {
            let (lon, lat, z) = start[p];
            let (dlon, dlat, dz) = (sums[p].0 / 6.0, sums[p].1 / 6.0, sums[p].2 / 6.0);

            let moved = if valid[p] {
                self.nav.deltapos(lon, lat, dlon, dlat, 1.0).ok()
            } else {
                None
            };

            match moved {
                Some((new_lon, new_lat)) => {
                    lons[i] = new_lon;
                    lats[i] = new_lat;
                    zs[i] = z + dz;
                }
                None => flags[i] = true,
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::RungeKutta4;
    use crate::constants::DEFAULT_FILL_VALUE;
    use crate::errors::TrajectoryError;
    use crate::model::trajectory::WindSampler;
    use crate::Float;
    use float_cmp::approx_eq;
    use std::cell::Cell;

    /// Same wind everywhere, fill poleward of `cutoff` latitude.
    struct UniformWind {
        u: Float,
        v: Float,
        w: Float,
        cutoff: Float,
        calls: Cell<usize>,
    }

    impl UniformWind {
        fn new(u: Float, v: Float, w: Float) -> Self {
            UniformWind {
                u,
                v,
                w,
                cutoff: 90.0,
                calls: Cell::new(0),
            }
        }
    }

    impl WindSampler for UniformWind {
        fn sample_winds(
            &self,
            _time: Float,
            lons: &[Float],
            lats: &[Float],
            _zs: &[Float],
        ) -> Result<(Vec<Float>, Vec<Float>, Vec<Float>), TrajectoryError> {
            self.calls.set(self.calls.get() + 1);

            let pick = |value: Float| -> Vec<Float> {
                lats.iter()
                    .map(|lat| if lat.abs() > self.cutoff { DEFAULT_FILL_VALUE } else { value })
                    .collect()
            };

            assert_eq!(lons.len(), lats.len());
            Ok((pick(self.u), pick(self.v), pick(self.w)))
        }

        fn fill_value(&self) -> Float {
            DEFAULT_FILL_VALUE
        }
    }

    fn degrees_per_day(speed: Float) -> Float {
        (86_400.0 * speed / 1000.0 / 6371.0).to_degrees()
    }

    #[test]
    fn zonal_wind_along_equator() {
        let winds = UniformWind::new(10.0, 0.0, 0.0);
        let (lon, lat, z) = RungeKutta4::default().go((0.0, 0.0, 500.0), 0.0, &winds, 1.0).unwrap();

        assert!(approx_eq!(f64, lon, degrees_per_day(10.0), epsilon = 1e-9));
        assert!(approx_eq!(f64, lat, 0.0, epsilon = 1e-12));
        assert!(approx_eq!(f64, z, 500.0));
        assert_eq!(winds.calls.get(), 4);
    }

    #[test]
    fn meridional_and_vertical_motion() {
        let winds = UniformWind::new(0.0, 10.0, -0.001);
        let (lon, lat, z) = RungeKutta4::default().go((100.0, 10.0, 500.0), 0.0, &winds, 0.5).unwrap();

        assert!(approx_eq!(f64, lon, 100.0, epsilon = 1e-12));
        assert!(approx_eq!(f64, lat, 10.0 + 0.5 * degrees_per_day(10.0), epsilon = 1e-9));
        assert!(approx_eq!(f64, z, 500.0 - 43.2, epsilon = 1e-9));
    }

    #[test]
    fn crosses_date_line() {
        let winds = UniformWind::new(20.0, 0.0, 0.0);
        let (lon, _, _) = RungeKutta4::default().go((179.0, 0.0, 0.0), 0.0, &winds, 0.25).unwrap();

        assert!(approx_eq!(f64, lon, 179.0 + 0.25 * degrees_per_day(20.0) - 360.0, epsilon = 1e-9));
    }

    #[test]
    fn batch_flags() {
        let mut winds = UniformWind::new(10.0, 0.0, 0.0);
        winds.cutoff = 60.0;

        let mut lons = [0.0, 0.0, 0.0];
        let mut lats = [0.0, 70.0, 10.0];
        let mut zs = [1.0, 1.0, 1.0];
        let mut flags = [false, false, true];

        RungeKutta4::default()
            .go_batch(&mut lons, &mut lats, &mut zs, &mut flags, 0.0, &winds, 1.0)
            .unwrap();

        assert_eq!(flags, [false, true, true]);
        assert!(approx_eq!(f64, lons[0], degrees_per_day(10.0), epsilon = 1e-9));
        assert_eq!((lons[1], lats[1]), (0.0, 70.0));
        assert_eq!((lons[2], lats[2]), (0.0, 10.0));
    }

    #[test]
    fn all_stages_run_without_parcels() {
        let winds = UniformWind::new(10.0, 0.0, 0.0);
        let mut flags = [true];

        RungeKutta4::default()
            .go_batch(&mut [0.0], &mut [0.0], &mut [0.0], &mut flags, 0.0, &winds, 1.0)
            .unwrap();

        assert_eq!(winds.calls.get(), 4);
        assert!(RungeKutta4::default()
            .go_batch(&mut [0.0], &mut [0.0, 1.0], &mut [0.0], &mut flags, 0.0, &winds, 1.0)
            .is_err());
    }

    #[test]
    fn missing_winds_for_single_parcel() {
        let mut winds = UniformWind::new(10.0, 0.0, 0.0);
        winds.cutoff = 0.0;

        let result = RungeKutta4::default().go((0.0, 45.0, 0.0), 0.0, &winds, 1.0);
        assert!(matches!(result, Err(TrajectoryError::MissingWinds)));
    }
}
