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

use crate::constants::SECONDS_PER_DAY;
use crate::errors::CalendarError;
use crate::Float;
use chrono::{Duration, NaiveDateTime};

const OUTPUT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
const INPUT_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Translates calendar strings to model time (days since an epoch) and back.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Calendar {
    epoch: NaiveDateTime,
}

impl Calendar {
    pub fn new(epoch: NaiveDateTime) -> Self {
        Calendar { epoch }
    }

    pub fn starting_at(epoch: &str) -> Result<Self, CalendarError> {
        Ok(Calendar::new(parse(epoch)?))
    }

    pub fn epoch(&self) -> NaiveDateTime {
        self.epoch
    }

    pub fn cal_to_time(&self, date: &str) -> Result<Float, CalendarError> {
        let elapsed = parse(date)? - self.epoch;

        // milliseconds keep the day fraction exact for whole seconds
        Ok(elapsed.num_milliseconds() as Float / (SECONDS_PER_DAY * 1000.0))
    }

    pub fn time_to_cal(&self, time: Float) -> Result<String, CalendarError> {
        Ok(self.time_to_date(time)?.format(OUTPUT_FORMAT).to_string())
    }

    pub fn time_to_date(&self, time: Float) -> Result<NaiveDateTime, CalendarError> {
        let millis = time * SECONDS_PER_DAY * 1000.0;

        if !millis.is_finite() || millis.abs() >= i64::MAX as Float {
            return Err(CalendarError::OutOfRange(time));
        }

        self.epoch
            .checked_add_signed(Duration::milliseconds(millis.round() as i64))
            .ok_or(CalendarError::OutOfRange(time))
    }
}

/// Accepts ISO-like dates with `T` or a space between date and time.
pub fn parse(date: &str) -> Result<NaiveDateTime, CalendarError> {
    let date = date.trim();

    let parsed = INPUT_FORMATS[1..]
        .iter()
        .fold(NaiveDateTime::parse_from_str(date, INPUT_FORMATS[0]), |parsed, format| {
            parsed.or_else(|_| NaiveDateTime::parse_from_str(date, format))
        })?;

    Ok(parsed)
}
