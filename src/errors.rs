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

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Error while reading config.yaml: {0}")]
    Config(#[from] ConfigError),

    #[error("Error while creating ThreadPool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Error while setting up rank: {0}")]
    Accessor(#[from] AccessorError),

    #[error("Error while advancing parcels: {0}")]
    Trajectory(#[from] TrajectoryError),

    #[error("Error while converting model time: {0}")]
    Calendar(#[from] CalendarError),

    #[error("Memory limit is below the memory already in use")]
    MemoryLimit,

    #[error("Error while writing output: {0}")]
    Output(#[from] csv::Error),

    #[error("Error while handling output directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("Output is faulty: {0}")]
    FaultyOutput(&'static str),

    #[error("Rank {0} did not report its result")]
    LostRank(usize),

    #[error("MPI run cannot proceed: {0}")]
    Mpi(&'static str),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot open config.yaml: {0}")]
    CantOpenFile(#[from] std::io::Error),

    #[error("Cannot deserialize config.yaml: {0}")]
    CantDeserialize(#[from] serde_yaml::Error),

    #[error("Configuration component is out of bounds {0}")]
    OutOfBounds(&'static str),
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchError {
    #[error("Array in which the search was conducted is empty")]
    EmptyArray,

    #[error("Searched value is out of array bounds")]
    OutOfBounds,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GridError {
    #[error("Grid has no data loaded")]
    NoData,

    #[error("Bad data request: {0}")]
    BadDataRequest(&'static str),

    #[error("Index cannot be computed for the requested coordinate")]
    BadDataIndex,

    #[error("Loaded data does not match grid coordinates")]
    IncompatibleCoords,

    #[error("Grids are not compatible")]
    IncompatibleGrids,

    #[error("Axis search failed: {0}")]
    Search(#[from] SearchError),

    #[error("Gridpoint server failed: {0}")]
    Server(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InterpolationError {
    #[error("Grid error during interpolation: {0}")]
    Grid(#[from] GridError),

    #[error("Profile and coordinate sizes differ or are too short")]
    ProfileSize,

    #[error("Vertical levels are missing or unusable")]
    BadLevels,

    #[error("Direction of vertical coordinate cannot be determined")]
    NoDirection,

    #[error("Coordinate arrays have different lengths")]
    LengthMismatch,

    #[error("No field named {0} has been loaded")]
    NoField(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExchangeError {
    #[error("Rank {0} has disconnected from the exchange")]
    Disconnected(usize),

    #[error("Buffer size does not match declared counts")]
    SizeMismatch,

    #[error("Destination rank {0} does not exist")]
    RankOutOfRange(usize),

    #[error("Message of {0} values exceeds the MPI count range")]
    CountOverflow(usize),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalendarError {
    #[error("Cannot parse calendar string: {0}")]
    Parse(#[from] chrono::ParseError),

    #[error("Model time {0} cannot be expressed as a calendar date")]
    OutOfRange(f64),
}

#[derive(Error, Debug)]
pub enum AccessorError {
    #[error("Accessor cannot be initialised: {0}")]
    BadInit(&'static str),

    #[error("No vertical coordinate has been loaded yet")]
    NoVertical,

    #[error("Grid error: {0}")]
    Grid(#[from] GridError),

    #[error("Interpolation error: {0}")]
    Interpolation(#[from] InterpolationError),

    #[error("Exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    #[error("Calendar error: {0}")]
    Calendar(#[from] CalendarError),
}

#[derive(Error, Debug)]
pub enum TrajectoryError {
    #[error("Winds cannot be sampled: {0}")]
    Accessor(#[from] AccessorError),

    #[error("Parcel position is not on the planet")]
    BadLocation,

    #[error("Parcel increment leads outside of the planet")]
    BadIncrement,

    #[error("Parcel arrays have different lengths")]
    LengthMismatch,

    #[error("Winds are missing along the parcel path")]
    MissingWinds,
}
