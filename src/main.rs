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

//! Trajectory Interpolation Grids (TIG) provides meteorological fields
//! to Lagrangian trajectory calculations running inside a distributed
//! atmospheric model.
//!
//! Every rank of the model holds only its own part of the globe, on a
//! regular latitude-longitude grid or on a cubed sphere. TIG routes each
//! requested point to the rank owning it, interpolates winds and other
//! fields there and sends the results back, so trajectories can be
//! integrated with the same fourth-order Runge-Kutta scheme regardless
//! of how the globe is split.
//!
//! The executable runs a self-contained simulation of such a model
//! configured in `config.yaml` and writes parcel trajectories to `output/`.

mod constants;
mod errors;
mod model;

use cap::Cap;
use env_logger::Env;
use log::{error, info};
use std::alloc;

type Float = f64;

/// Global allocator used by the model.
///
/// Use of static global allocator allows for capping the memory to the limit set by user
/// in configuration file and in effect provide better [OOM error](https://en.wikipedia.org/wiki/Out_of_memory) handling.
#[global_allocator]
static ALLOCATOR: Cap<alloc::System> = Cap::new(alloc::System, usize::MAX);

/// The main program function.
/// Prepares the runtime environment and calls the [`model::main`].
///
/// To provide meaningful and high-quality error messages the `env_logger`
/// needs to be initiated before any log messages are possible to occur.
fn main() {
    #[cfg(not(feature = "debug"))]
    let logger_env = Env::new().filter_or("TIG_LOG_LEVEL", "info");

    #[cfg(feature = "debug")]
    let logger_env = Env::new().filter_or("TIG_LOG_LEVEL", "debug");

    env_logger::Builder::from_env(logger_env)
        .format_timestamp_millis()
        .init();

    match model::main() {
        Ok(_) => info!("Model execution finished. Check the output directory and log."),
        Err(err) => error!("Model execution failed with error: {}", err),
    }
}
