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

use crate::Float;
use log::warn;
use serde::Deserialize;
use std::mem;

/// Older and newer state of the same quantity.
#[derive(Clone, Debug)]
pub struct SnapshotPair<T> {
    t0: T,
    t1: T,
}

impl<T: Clone> SnapshotPair<T> {
    /// Both slots start from the same state.
    pub fn new(initial: T) -> Self {
        SnapshotPair {
            t0: initial.clone(),
            t1: initial,
        }
    }
}

impl<T> SnapshotPair<T> {
    /// The current newer state becomes the older one.
    pub fn rotate(&mut self, newer: T) {
        self.t0 = mem::replace(&mut self.t1, newer);
    }

    pub fn older(&self) -> &T {
        &self.t0
    }

    pub fn newer(&self) -> &T {
        &self.t1
    }
}

/// What to do with query times outside the snapshot bracket.
#[derive(Deserialize, Copy, Clone, PartialEq, Eq, Debug)]
pub enum TimePolicy {
    /// Extend the linear trend, with a warning.
    Extrapolate,
    /// Use the nearest snapshot time.
    Clamp,
}

impl Default for TimePolicy {
    fn default() -> Self {
        TimePolicy::Extrapolate
    }
}

impl TimePolicy {
    pub fn resolve(self, time: Float, t0: Float, t1: Float) -> Float {
        let (lo, hi) = if t0 <= t1 { (t0, t1) } else { (t1, t0) };

        if (lo..=hi).contains(&time) {
            return time;
        }

        match self {
            TimePolicy::Extrapolate => {
                warn!("Time {} lies outside snapshots [{}, {}], extrapolating", time, lo, hi);
                time
            }
            TimePolicy::Clamp => time.clamp(lo, hi),
        }
    }
}

/// Linear blend of the two snapshot values at `time`.
///
/// Equal snapshot times give the newer value. A fill on either side gives fill.
pub fn blend(v0: Float, v1: Float, t0: Float, t1: Float, time: Float, fill_value: Float) -> Float {
    if v0 == fill_value || v1 == fill_value {
        return fill_value;
    }

    if t1 == t0 {
        return v1;
    }

    v0 * (t1 - time) / (t1 - t0) + v1 * (time - t0) / (t1 - t0)
}

#[cfg(test)]
mod tests {
    use super::{blend, SnapshotPair, TimePolicy};
    use float_cmp::approx_eq;

    #[test]
    fn rotation_keeps_previous_newer() {
        let mut pair = SnapshotPair::new(1);
        pair.rotate(2);
        pair.rotate(3);

        assert_eq!(*pair.older(), 2);
        assert_eq!(*pair.newer(), 3);
    }

    #[test]
    fn linear_in_time() {
        assert!(approx_eq!(f64, blend(10.0, 20.0, 0.0, 1.0, 0.0, 1e15), 10.0));
        assert!(approx_eq!(f64, blend(10.0, 20.0, 0.0, 1.0, 0.25, 1e15), 12.5));
        assert!(approx_eq!(f64, blend(10.0, 20.0, 0.0, 1.0, 1.0, 1e15), 20.0));
        assert!(approx_eq!(f64, blend(10.0, 20.0, 0.0, 1.0, 1.5, 1e15), 25.0));
        assert!(approx_eq!(f64, blend(10.0, 20.0, 2.0, 2.0, 7.0, 1e15), 20.0));
        assert!(approx_eq!(f64, blend(1e15, 20.0, 0.0, 1.0, 0.5, 1e15), 1e15));
    }

    #[test]
    fn policies() {
        assert!(approx_eq!(f64, TimePolicy::Clamp.resolve(1.5, 0.0, 1.0), 1.0));
        assert!(approx_eq!(f64, TimePolicy::Clamp.resolve(-0.5, 0.0, 1.0), 0.0));
        assert!(approx_eq!(f64, TimePolicy::Clamp.resolve(0.5, 0.0, 1.0), 0.5));
        assert!(approx_eq!(f64, TimePolicy::Extrapolate.resolve(1.5, 0.0, 1.0), 1.5));
    }
}
