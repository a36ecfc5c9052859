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

//! Remote source of gridpoint samples.
//!
//! A field with an attached server fetches whole batches of
//! samples in a single request instead of reading them one by one.

use crate::errors::GridError;
use crate::Float;
use rustc_hash::FxHashMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};

pub trait GridpointServer: Debug + Send + Sync {
    /// Returns the samples of `quantity` at flat indices, in request order.
    fn fetch(&self, quantity: &str, indices: &[usize]) -> Result<Vec<Float>, GridError>;
}

/// Server holding complete fields in memory and counting requests.
#[derive(Debug, Default)]
pub struct MemoryServer {
    fields: FxHashMap<String, Vec<Float>>,
    round_trips: AtomicUsize,
}

impl MemoryServer {
    pub fn new() -> Self {
        MemoryServer::default()
    }

    pub fn publish(&mut self, quantity: &str, values: Vec<Float>) {
        self.fields.insert(quantity.to_string(), values);
    }

    pub fn round_trips(&self) -> usize {
        self.round_trips.load(Ordering::Relaxed)
    }
}

impl GridpointServer for MemoryServer {
    fn fetch(&self, quantity: &str, indices: &[usize]) -> Result<Vec<Float>, GridError> {
        self.round_trips.fetch_add(1, Ordering::Relaxed);

        let values = self
            .fields
            .get(quantity)
            .ok_or_else(|| GridError::Server(format!("quantity {} is not served", quantity)))?;

        indices
            .iter()
            .map(|&idx| {
                values
                    .get(idx)
                    .copied()
                    .ok_or(GridError::BadDataRequest("served index out of range"))
            })
            .collect()
    }
}
