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

//! Meteorological fields spread over a group of ranks.
//!
//! Each rank holds the fields for its own part of the globe. Queries are
//! routed to the rank owning each point's cell, interpolated there and
//! sent back, so every query method is a collective call.

pub mod calendar;
pub mod exchange;
pub mod partition;
pub mod snapshot;

pub use calendar::Calendar;
pub use exchange::{ChannelExchange, LocalExchange, PointExchange, RoutingPlan};
#[cfg(feature = "mpi")]
pub use exchange::MpiExchange;
pub use partition::{CellLocator, PartitionMap};
pub use snapshot::{blend, SnapshotPair, TimePolicy};

use crate::constants::{DEFAULT_FILL_VALUE, DEFAULT_WFCTR, TIME_TOLERANCE};
use crate::errors::{AccessorError, InterpolationError};
use crate::model::grid::{Fetch, Field3D, FieldMeta, FieldSfc, GridTopology, Horizontal, MemoryServer};
use crate::model::interpolation::{BilinearHinterp, HorizontalSampler, VerticalSampler, Vinterp};
use crate::Float;
use log::{debug, info, warn};
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Interpolation and unit choices, identical on every rank.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct AccessorSettings {
    pub hinterp: BilinearHinterp,
    pub vinterp: Vinterp,
    pub time_policy: TimePolicy,
    /// Factor applied to vertical velocity and pressure on load (Pa to hPa).
    pub wfctr: Float,
    pub fill_value: Float,
}

impl Default for AccessorSettings {
    fn default() -> Self {
        AccessorSettings {
            hinterp: BilinearHinterp::default().local(),
            vinterp: Vinterp::default(),
            time_policy: TimePolicy::default(),
            wfctr: DEFAULT_WFCTR,
            fill_value: DEFAULT_FILL_VALUE,
        }
    }
}

/// Local grid of one rank.
#[derive(Clone, Debug)]
pub struct Geometry {
    pub horizontal: Horizontal,
    /// Number of model levels in the raw input columns.
    pub model_levels: usize,
    /// Working vertical coordinate (pressure in hPa) the winds are re-profiled onto.
    pub eta: Vec<Float>,
}

/// Wind components valid at one time.
#[derive(Clone, Debug)]
pub struct Winds {
    pub u: Field3D,
    pub v: Field3D,
    pub w: Field3D,
    /// Server the components are fetched through, if any.
    pub server: Option<Arc<MemoryServer>>,
}

impl Winds {
    fn new(mut u: Field3D, mut v: Field3D, mut w: Field3D, fetch: Fetch) -> Self {
        let server = serve(fetch, &mut [&mut u, &mut v, &mut w]);
        Winds { u, v, w, server }
    }

    pub fn time(&self) -> Float {
        self.u.meta.time
    }
}

#[derive(Debug)]
pub struct MetAccessor<E: PointExchange> {
    exchange: E,
    partition: PartitionMap,
    calendar: Calendar,
    horizontal: Horizontal,
    model_levels: Vec<Float>,
    eta: Vec<Float>,
    settings: AccessorSettings,
    winds: SnapshotPair<Winds>,
    vertical: Option<Field3D>,
    fields: FxHashMap<String, Field3D>,
    last_field: Option<String>,
    surface: FieldSfc,
}

impl<E: PointExchange> MetAccessor<E> {
    /// Both wind snapshots start as calm air valid at `ctime`.
    pub fn new(
        exchange: E,
        partition: PartitionMap,
        geometry: Geometry,
        calendar: Calendar,
        ctime: &str,
        settings: AccessorSettings,
    ) -> Result<Self, AccessorError> {
        if partition.max_rank() >= exchange.size() {
            return Err(AccessorError::BadInit(
                "partition table names ranks outside the exchange group",
            ));
        }

        let same_topology = match (partition.locator(), &geometry.horizontal) {
            (CellLocator::LatLon { .. }, Horizontal::LatLon(_)) => true,
            (CellLocator::Cubed { im }, Horizontal::Cubed(grid)) => grid.im() == im,
            _ => false,
        };

        if !same_topology {
            return Err(AccessorError::BadInit("partition and local grid topologies differ"));
        }

        if geometry.model_levels < 2 || geometry.eta.is_empty() {
            return Err(AccessorError::BadInit("vertical coordinates are too short"));
        }

        let time = calendar.cal_to_time(ctime)?;
        let fill = settings.fill_value;

        let calm = |quantity: &str, units: &str| {
            Field3D::prefilled(
                FieldMeta::new(quantity, units)
                    .with_vertical("air_pressure", "hPa")
                    .with_time(time, ctime)
                    .with_fill(fill),
                geometry.horizontal.clone(),
                geometry.eta.clone(),
                0.0,
            )
        };

        let winds = Winds::new(
            calm("U", "m/s"),
            calm("V", "m/s"),
            calm("OMEGA", "hPa/s"),
            settings.hinterp.fetch,
        );

        let surface = FieldSfc::new(
            FieldMeta::new("", "").with_time(time, ctime).with_fill(fill),
            geometry.horizontal.clone(),
        );

        debug!(
            "Rank {} of {} holds a {:?} grid with {} model levels",
            exchange.rank(),
            exchange.size(),
            geometry.horizontal.dims(),
            geometry.model_levels
        );

        Ok(MetAccessor {
            exchange,
            partition,
            calendar,
            horizontal: geometry.horizontal,
            model_levels: (0..geometry.model_levels).map(|k| k as Float).collect(),
            eta: geometry.eta,
            settings,
            winds: SnapshotPair::new(winds),
            vertical: None,
            fields: FxHashMap::default(),
            last_field: None,
            surface,
        })
    }

    pub fn rank(&self) -> usize {
        self.exchange.rank()
    }

    pub fn exchange(&self) -> &E {
        &self.exchange
    }

    pub fn calendar(&self) -> &Calendar {
        &self.calendar
    }

    pub fn settings(&self) -> &AccessorSettings {
        &self.settings
    }

    pub fn winds(&self) -> &SnapshotPair<Winds> {
        &self.winds
    }

    /// Model level index at each working level, from the latest update.
    pub fn vertical(&self) -> Option<&Field3D> {
        self.vertical.as_ref()
    }

    pub fn field(&self, quantity: &str) -> Option<&Field3D> {
        self.fields.get(quantity)
    }

    pub fn surface(&self) -> &FieldSfc {
        &self.surface
    }

    pub fn cal_to_time(&self, ctime: &str) -> Result<Float, AccessorError> {
        Ok(self.calendar.cal_to_time(ctime)?)
    }

    fn raw_field(
        &self,
        meta: FieldMeta,
        values: Vec<Float>,
        factor: Float,
    ) -> Result<Field3D, AccessorError> {
        let fill = meta.fill_value;
        let values = values
            .into_iter()
            .map(|value| if value == fill { fill } else { value * factor })
            .collect();

        Ok(Field3D::with_data(
            meta.with_vertical("model_level", "1"),
            self.horizontal.clone(),
            self.model_levels.clone(),
            values,
        )?)
    }

    /// Replaces the newer wind snapshot; the previous one becomes the older.
    ///
    /// Inputs are full local columns on model levels, `(level, lat, lon)`
    /// ordered: winds in m/s, vertical velocity and pressure in Pa/s and Pa.
    pub fn update_fields(
        &mut self,
        ctime: &str,
        u: &[Float],
        v: &[Float],
        w: &[Float],
        p: &[Float],
    ) -> Result<(), AccessorError> {
        let time = self.calendar.cal_to_time(ctime)?;
        let fill = self.settings.fill_value;
        let wfctr = self.settings.wfctr;
        let meta = |quantity: &str, units: &str, mks_scale: Float| FieldMeta {
            mks_scale,
            ..FieldMeta::new(quantity, units).with_time(time, ctime).with_fill(fill)
        };

        let raw_u = self.raw_field(meta("U", "m/s", 1.0), u.to_vec(), 1.0)?;
        let raw_v = self.raw_field(meta("V", "m/s", 1.0), v.to_vec(), 1.0)?;
        let raw_w = self.raw_field(meta("OMEGA", "hPa/s", 100.0), w.to_vec(), wfctr)?;
        let raw_p = self.raw_field(meta("air_pressure", "hPa", 100.0), p.to_vec(), wfctr)?;

        let vin = &self.settings.vinterp;
        let vertical = vin.invert(&self.eta, &raw_p)?;

        let winds = Winds::new(
            vin.re_profile(&raw_u, &vertical)?,
            vin.re_profile(&raw_v, &vertical)?,
            vin.re_profile(&raw_w, &vertical)?,
            self.settings.hinterp.fetch,
        );

        if let Some(server) = &self.winds.older().server {
            debug!(
                "Rank {} retires winds valid at {} after {} server requests",
                self.rank(),
                self.winds.older().u.meta.ctime,
                server.round_trips()
            );
        }

        self.winds.rotate(winds);
        self.vertical = Some(vertical);

        info!("Rank {} loaded winds valid at {}", self.rank(), ctime);

        Ok(())
    }

    /// Loads a named field on model levels and re-profiles it onto the
    /// current working levels. Names containing `_2D` go to the surface slot.
    pub fn set_data(&mut self, ctime: &str, quantity: &str, values: &[Float]) -> Result<(), AccessorError> {
        if quantity.contains("_2D") {
            return self.set_sfc_data(ctime, quantity, values);
        }

        let time = self.calendar.cal_to_time(ctime)?;
        let vertical = self.vertical.as_ref().ok_or(AccessorError::NoVertical)?;

        // the raw field borrows the time of the vertical coordinate it is re-profiled with
        let meta = FieldMeta::new(quantity, "")
            .with_time(vertical.meta.time, &vertical.meta.ctime)
            .with_fill(self.settings.fill_value);

        let raw = self.raw_field(meta, values.to_vec(), 1.0)?;
        let mut field = self.settings.vinterp.re_profile(&raw, vertical)?;
        field.meta.time = time;
        field.meta.ctime = ctime.to_string();
        serve(self.settings.hinterp.fetch, &mut [&mut field]);

        debug!("Rank {} loaded {} valid at {}", self.rank(), quantity, ctime);

        self.fields.insert(quantity.to_string(), field);
        self.last_field = Some(quantity.to_string());

        Ok(())
    }

    pub fn set_sfc_data(&mut self, ctime: &str, quantity: &str, values: &[Float]) -> Result<(), AccessorError> {
        let time = self.calendar.cal_to_time(ctime)?;
        let meta = FieldMeta::new(quantity, "")
            .with_time(time, ctime)
            .with_fill(self.settings.fill_value);

        let mut surface = FieldSfc::with_data(meta, self.horizontal.clone(), values.to_vec())?;

        if self.settings.hinterp.fetch == Fetch::Auto {
            let mut server = MemoryServer::new();
            server.publish(quantity, values.to_vec());
            surface.set_server(Arc::new(server));
        }

        self.surface = surface;

        debug!("Rank {} loaded surface {} valid at {}", self.rank(), quantity, ctime);

        Ok(())
    }

    fn check_meta(&self, meta: &FieldMeta, quantity: &str, time: Float) {
        if meta.quantity != quantity {
            warn!("Requested {} but rank {} holds {}", quantity, self.rank(), meta.quantity);
        }

        if (meta.time - time).abs() >= TIME_TOLERANCE {
            warn!(
                "Requested {} at {} but rank {} holds it at {}",
                quantity,
                time,
                self.rank(),
                meta.time
            );
        }
    }

    fn named_field(&self, quantity: &str) -> Option<&Field3D> {
        self.fields.get(quantity).or_else(|| {
            let fallback = self.last_field.as_ref().and_then(|name| self.fields.get(name));

            if fallback.is_some() {
                warn!("No field named {}, using the last one loaded", quantity);
            }

            fallback
        })
    }

    /// Owning rank of every point, `None` where no cell owns it.
    pub fn owners(&self, lons: &[Float], lats: &[Float]) -> Vec<Option<usize>> {
        lons.iter()
            .zip(lats)
            .map(|(&lon, &lat)| {
                let owner = self.partition.owner(lon, lat);

                if owner.is_none() {
                    debug!("No rank owns ({}, {}), its result will be fill", lon, lat);
                }

                owner
            })
            .collect()
    }

    /// Routes the coordinate columns to their owners, evaluates `N` result
    /// columns there and returns them in the caller's order.
    fn query<const N: usize, F>(&self, columns: &[&[Float]], evaluate: F) -> Result<[Vec<Float>; N], AccessorError>
    where
        F: FnOnce(&[Vec<Float>]) -> [Vec<Float>; N],
    {
        let n = columns.first().map_or(0, |column| column.len());

        if columns.len() < 2 || columns.iter().any(|column| column.len() != n) {
            return Err(InterpolationError::LengthMismatch.into());
        }

        let owners = self.owners(columns[0], columns[1]);
        let plan = RoutingPlan::new(&self.exchange, &owners)?;
        let local = self.exchange.scatter_points(&plan, columns)?;

        let results = evaluate(&local);

        let mut gathered: [Vec<Float>; N] = std::array::from_fn(|_| Vec::new());
        for (slot, result) in gathered.iter_mut().zip(results.iter()) {
            *slot = self
                .exchange
                .gather_results(&plan, result, self.settings.fill_value)?;
        }

        Ok(gathered)
    }

    fn or_fill<T>(&self, result: Result<T, InterpolationError>, fill: impl FnOnce() -> T) -> T {
        result.unwrap_or_else(|err| {
            warn!("Rank {} cannot interpolate its points: {}", self.rank(), err);
            fill()
        })
    }

    fn sample_winds(&self, winds: &Winds, lons: &[Float], lats: &[Float], zs: &[Float]) -> [Vec<Float>; 3] {
        let fill = self.settings.fill_value;
        let hin = &self.settings.hinterp;
        let vin = &self.settings.vinterp;

        let (u, v) = self.or_fill(
            hin.vinterp_vector_batch(lons, lats, zs, &winds.u, &winds.v, vin),
            || (vec![fill; lons.len()], vec![fill; lons.len()]),
        );
        let w = self.or_fill(hin.vinterp_batch(lons, lats, zs, &winds.w, vin), || {
            vec![fill; lons.len()]
        });

        [u, v, w]
    }

    /// Wind components at model time `time`, blended between the two snapshots.
    ///
    /// Collective: every rank must call it, possibly with no points.
    pub fn get_uvw(
        &self,
        time: Float,
        lons: &[Float],
        lats: &[Float],
        zs: &[Float],
    ) -> Result<(Vec<Float>, Vec<Float>, Vec<Float>), AccessorError> {
        let (older, newer) = (self.winds.older(), self.winds.newer());
        let (t0, t1) = (older.time(), newer.time());
        let time = self.settings.time_policy.resolve(time, t0, t1);
        let fill = self.settings.fill_value;

        let [u, v, w] = self.query(&[lons, lats, zs], |local| {
            let at_t0 = self.sample_winds(older, &local[0], &local[1], &local[2]);
            let at_t1 = self.sample_winds(newer, &local[0], &local[1], &local[2]);

            let mut blended: [Vec<Float>; 3] = Default::default();
            for (out, (c0, c1)) in blended.iter_mut().zip(at_t0.iter().zip(at_t1.iter())) {
                *out = c0
                    .iter()
                    .zip(c1)
                    .map(|(&v0, &v1)| blend(v0, v1, t0, t1, time, fill))
                    .collect();
            }

            blended
        })?;

        Ok((u, v, w))
    }

    /// Named 3-D field at calendar time `ctime`. Collective.
    pub fn get_data(
        &self,
        ctime: &str,
        quantity: &str,
        lons: &[Float],
        lats: &[Float],
        zs: &[Float],
    ) -> Result<Vec<Float>, AccessorError> {
        let time = self.calendar.cal_to_time(ctime)?;
        let fill = self.settings.fill_value;
        let field = self.named_field(quantity);

        if let Some(field) = field {
            self.check_meta(&field.meta, quantity, time);
        }

        let [values] = self.query(&[lons, lats, zs], |local| {
            let n = local[0].len();
            let values = match field {
                Some(field) => self.or_fill(
                    self.settings.hinterp.vinterp_batch(
                        &local[0],
                        &local[1],
                        &local[2],
                        field,
                        &self.settings.vinterp,
                    ),
                    || vec![fill; n],
                ),
                None => self.or_fill(Err(InterpolationError::NoField(quantity.to_string())), || {
                    vec![fill; n]
                }),
            };

            [values]
        })?;

        Ok(values)
    }

    /// Surface field at calendar time `ctime`. Collective.
    pub fn get_data_2d(
        &self,
        ctime: &str,
        quantity: &str,
        lons: &[Float],
        lats: &[Float],
    ) -> Result<Vec<Float>, AccessorError> {
        let time = self.calendar.cal_to_time(ctime)?;
        let fill = self.settings.fill_value;

        if self.surface.has_data() {
            self.check_meta(&self.surface.meta, quantity, time);
        }

        let [values] = self.query(&[lons, lats], |local| {
            let n = local[0].len();
            [self.or_fill(
                self.settings.hinterp.calc_sfc_batch(&local[0], &local[1], &self.surface),
                || vec![fill; n],
            )]
        })?;

        Ok(values)
    }
}

/// Publishes the fields on a fresh gridpoint server and attaches it,
/// when the interpolator fetches through one.
fn serve(fetch: Fetch, fields: &mut [&mut Field3D]) -> Option<Arc<MemoryServer>> {
    if fetch != Fetch::Auto {
        return None;
    }

    let mut server = MemoryServer::new();
    for field in fields.iter() {
        if let Some(data) = field.data() {
            server.publish(&field.meta.quantity, data.iter().copied().collect());
        }
    }

    let server = Arc::new(server);
    for field in fields.iter_mut() {
        field.set_server(server.clone());
    }

    Some(server)
}
