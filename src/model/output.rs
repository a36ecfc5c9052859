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

//! CSV log of parcel positions and the winds met along the way.

use crate::Float;
use chrono::NaiveDateTime;
use std::path::Path;

/// Parcels released by one rank, numbered from `first`.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct Parcels {
    pub first: usize,
    pub lons: Vec<Float>,
    pub lats: Vec<Float>,
    pub levels: Vec<Float>,
    /// Set once a parcel could not be advanced; it is not moved again.
    pub stopped: Vec<bool>,
}

impl Parcels {
    pub fn len(&self) -> usize {
        self.lons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lons.is_empty()
    }
}

/// Fields sampled at the parcel positions, one value per parcel.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct Samples {
    pub u: Vec<Float>,
    pub v: Vec<Float>,
    pub omega: Vec<Float>,
    /// Fractional model level at the parcel pressure.
    pub model_level: Vec<Float>,
    pub surface_pressure: Vec<Float>,
}

#[derive(Copy, Clone, PartialEq, Debug)]
pub struct TrajectoryPoint {
    pub parcel: usize,
    pub datetime: NaiveDateTime,
    pub lon: Float,
    pub lat: Float,
    pub level: Float,
    pub u: Float,
    pub v: Float,
    pub omega: Float,
    pub model_level: Float,
    pub surface_pressure: Float,
    /// Parcel stopped being advanced at or before this point.
    pub stopped: bool,
}

/// Positions of all parcels, in the order they were recorded.
#[derive(Clone, Debug, Default)]
pub struct TrajectoryLog {
    points: Vec<TrajectoryPoint>,
}

impl TrajectoryLog {
    pub fn new() -> Self {
        TrajectoryLog::default()
    }

    /// Records one step of `parcels`; samples missing for a parcel are NaN.
    pub fn record(&mut self, datetime: NaiveDateTime, parcels: &Parcels, samples: &Samples) {
        let sample = |values: &[Float], n: usize| values.get(n).copied().unwrap_or(Float::NAN);

        let step = (0..parcels.len()).map(|n| TrajectoryPoint {
            parcel: parcels.first + n,
            datetime,
            lon: parcels.lons[n],
            lat: parcels.lats[n],
            level: parcels.levels[n],
            u: sample(&samples.u, n),
            v: sample(&samples.v, n),
            omega: sample(&samples.omega, n),
            model_level: sample(&samples.model_level, n),
            surface_pressure: sample(&samples.surface_pressure, n),
            stopped: parcels.stopped.get(n).copied().unwrap_or(false),
        });

        self.points.extend(step);
    }

    pub fn extend(&mut self, other: TrajectoryLog) {
        self.points.extend(other.points);
    }

    pub fn points(&self) -> &[TrajectoryPoint] {
        &self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Orders points by parcel, then by time.
    pub fn sort(&mut self) {
        self.points
            .sort_by(|a, b| a.parcel.cmp(&b.parcel).then(a.datetime.cmp(&b.datetime)));
    }

    pub fn save(&self, out_path: &Path) -> Result<(), csv::Error> {
        let mut out_file = csv::Writer::from_path(out_path)?;
        self.write_to(&mut out_file)?;
        out_file.flush()?;

        Ok(())
    }

    fn write_to<W: std::io::Write>(&self, out_file: &mut csv::Writer<W>) -> Result<(), csv::Error> {
        out_file.write_record(&[
            "parcel",
            "dateTime",
            "longitude",
            "latitude",
            "level",
            "u",
            "v",
            "omega",
            "modelLevel",
            "surfacePressure",
            "stopped",
        ])?;

        for point in &self.points {
            out_file.write_record(&[
                point.parcel.to_string(),
                point.datetime.format("%Y-%m-%dT%H:%M:%S").to_string(),
                point.lon.to_string(),
                point.lat.to_string(),
                point.level.to_string(),
                point.u.to_string(),
                point.v.to_string(),
                point.omega.to_string(),
                point.model_level.to_string(),
                point.surface_pressure.to_string(),
                point.stopped.to_string(),
            ])?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Parcels, Samples, TrajectoryLog};
    use chrono::NaiveDateTime;

    fn parcel(lon: f64, stopped: bool) -> Parcels {
        Parcels {
            first: 3,
            lons: vec![lon],
            lats: vec![2.0],
            levels: vec![500.0],
            stopped: vec![stopped],
        }
    }

    #[test]
    fn csv_layout() {
        let t0 = NaiveDateTime::parse_from_str("2021-01-01T00:00:00", "%Y-%m-%dT%H:%M:%S").unwrap();
        let t1 = NaiveDateTime::parse_from_str("2021-01-01T01:00:00", "%Y-%m-%dT%H:%M:%S").unwrap();

        let samples = Samples {
            u: vec![10.0],
            v: vec![-1.5],
            omega: vec![0.0],
            model_level: vec![2.5],
            surface_pressure: vec![1000.0],
        };

        let mut log = TrajectoryLog::new();
        log.record(t1, &parcel(1.5, true), &Samples::default());
        log.record(t0, &parcel(1.0, false), &samples);
        log.sort();

        let mut writer = csv::Writer::from_writer(vec![]);
        log.write_to(&mut writer).unwrap();
        let text = String::from_utf8(writer.into_inner().unwrap()).unwrap();

        assert_eq!(
            text,
            "parcel,dateTime,longitude,latitude,level,u,v,omega,modelLevel,surfacePressure,stopped\n\
             3,2021-01-01T00:00:00,1,2,500,10,-1.5,0,2.5,1000,false\n\
             3,2021-01-01T01:00:00,1.5,2,500,NaN,NaN,NaN,NaN,NaN,true\n"
        );
    }
}
