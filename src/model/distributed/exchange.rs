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

//! Collective point exchange between ranks.
//!
//! Every query routes points to the rank owning them, evaluates them
//! there and sends the results back in the caller's order. All ranks must
//! enter each collective in the same sequence, even with zero points.

use crate::errors::ExchangeError;
use crate::Float;
use log::debug;
use std::sync::mpsc::{channel, Receiver, Sender};

#[cfg(feature = "mpi")]
mod world;

#[cfg(feature = "mpi")]
pub use world::MpiExchange;

/// Transport used by the distributed accessor.
pub trait PointExchange {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    /// Sends `counts[r]` to rank `r` and returns the count every rank sent here.
    fn all_to_all_counts(&self, counts: &[usize]) -> Result<Vec<usize>, ExchangeError>;

    /// Sends consecutive blocks of `send` (sized by `counts_send`) to each
    /// rank and concatenates the blocks received (sized by `counts_recv`).
    fn all_to_all_values(
        &self,
        send: &[Float],
        counts_send: &[usize],
        counts_recv: &[usize],
    ) -> Result<Vec<Float>, ExchangeError>;

    /// Ships every coordinate column to the owning ranks.
    fn scatter_points(
        &self,
        plan: &RoutingPlan,
        columns: &[&[Float]],
    ) -> Result<Vec<Vec<Float>>, ExchangeError> {
        columns
            .iter()
            .map(|column| {
                let packed = plan.pack(column)?;
                self.all_to_all_values(&packed, &plan.counts_send, &plan.counts_recv)
            })
            .collect()
    }

    /// Returns locally computed results to the ranks that asked for them
    /// and restores the caller's point order.
    fn gather_results(
        &self,
        plan: &RoutingPlan,
        results: &[Float],
        fill_value: Float,
    ) -> Result<Vec<Float>, ExchangeError> {
        let received = self.all_to_all_values(results, &plan.counts_recv, &plan.counts_send)?;
        plan.unpack(&received, fill_value)
    }
}

/// Where each point of one query travels and where its answer comes back.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct RoutingPlan {
    pub counts_send: Vec<usize>,
    pub counts_recv: Vec<usize>,
    positions: Vec<Option<usize>>,
}

impl RoutingPlan {
    /// Collective. `owners[i]` is the rank owning point `i`, `None` when no rank does.
    pub fn new<E: PointExchange + ?Sized>(
        exchange: &E,
        owners: &[Option<usize>],
    ) -> Result<Self, ExchangeError> {
        let size = exchange.size();
        let mut counts_send = vec![0; size];

        for &rank in owners.iter().flatten() {
            if rank >= size {
                return Err(ExchangeError::RankOutOfRange(rank));
            }
            counts_send[rank] += 1;
        }

        let counts_recv = exchange.all_to_all_counts(&counts_send)?;

        let mut next = displacements(&counts_send);
        let positions = owners
            .iter()
            .map(|owner| {
                owner.map(|rank| {
                    let pos = next[rank];
                    next[rank] += 1;
                    pos
                })
            })
            .collect();

        debug!(
            "Rank {} routes {} points out and evaluates {} points",
            exchange.rank(),
            counts_send.iter().sum::<usize>(),
            counts_recv.iter().sum::<usize>()
        );

        Ok(RoutingPlan {
            counts_send,
            counts_recv,
            positions,
        })
    }

    pub fn points(&self) -> usize {
        self.positions.len()
    }

    pub fn total_send(&self) -> usize {
        self.counts_send.iter().sum()
    }

    pub fn total_recv(&self) -> usize {
        self.counts_recv.iter().sum()
    }

    /// Orders caller values by destination rank. Unowned points are dropped.
    pub fn pack(&self, values: &[Float]) -> Result<Vec<Float>, ExchangeError> {
        if values.len() != self.positions.len() {
            return Err(ExchangeError::SizeMismatch);
        }

        let mut packed = vec![0.0; self.total_send()];

        for (value, pos) in values.iter().zip(&self.positions) {
            if let Some(pos) = *pos {
                packed[pos] = *value;
            }
        }

        Ok(packed)
    }

    /// Inverse of [`pack`](Self::pack). Unowned points get `fill_value`.
    pub fn unpack(&self, received: &[Float], fill_value: Float) -> Result<Vec<Float>, ExchangeError> {
        if received.len() != self.total_send() {
            return Err(ExchangeError::SizeMismatch);
        }

        Ok(self
            .positions
            .iter()
            .map(|pos| pos.map_or(fill_value, |pos| received[pos]))
            .collect())
    }
}

fn displacements(counts: &[usize]) -> Vec<usize> {
    counts
        .iter()
        .scan(0, |offset, &count| {
            let start = *offset;
            *offset += count;
            Some(start)
        })
        .collect()
}

fn split_blocks<'a>(
    values: &'a [Float],
    counts: &[usize],
) -> Result<Vec<&'a [Float]>, ExchangeError> {
    if counts.iter().sum::<usize>() != values.len() {
        return Err(ExchangeError::SizeMismatch);
    }

    let mut rest = values;
    let mut blocks = Vec::with_capacity(counts.len());

    for &count in counts {
        let (block, tail) = rest.split_at(count);
        blocks.push(block);
        rest = tail;
    }

    Ok(blocks)
}

/// Single-rank exchange: every point is local.
#[derive(Copy, Clone, Default, Debug)]
pub struct LocalExchange;

impl PointExchange for LocalExchange {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn all_to_all_counts(&self, counts: &[usize]) -> Result<Vec<usize>, ExchangeError> {
        if counts.len() != 1 {
            return Err(ExchangeError::SizeMismatch);
        }
        Ok(counts.to_vec())
    }

    fn all_to_all_values(
        &self,
        send: &[Float],
        counts_send: &[usize],
        counts_recv: &[usize],
    ) -> Result<Vec<Float>, ExchangeError> {
        if counts_send.len() != 1 || counts_send != counts_recv || counts_send[0] != send.len() {
            return Err(ExchangeError::SizeMismatch);
        }
        Ok(send.to_vec())
    }
}

#[derive(Debug)]
enum Message {
    Counts(usize),
    Values(Vec<Float>),
}

/// In-process group of ranks connected by channels, one per ordered rank pair.
///
/// Stands in for an MPI communicator in threaded runs and tests.
/// Each member is moved to its own thread. Sends never block, so a
/// collective completes once every member has entered it.
#[derive(Debug)]
pub struct ChannelExchange {
    rank: usize,
    senders: Vec<Sender<Message>>,
    receivers: Vec<Receiver<Message>>,
}

impl ChannelExchange {
    pub fn group(size: usize) -> Vec<ChannelExchange> {
        let mut senders: Vec<Vec<Sender<Message>>> = (0..size).map(|_| Vec::with_capacity(size)).collect();
        let mut receivers: Vec<Vec<Receiver<Message>>> =
            (0..size).map(|_| Vec::with_capacity(size)).collect();

        for from in senders.iter_mut() {
            for to in receivers.iter_mut() {
                let (tx, rx) = channel();
                from.push(tx);
                to.push(rx);
            }
        }

        senders
            .into_iter()
            .zip(receivers)
            .enumerate()
            .map(|(rank, (senders, receivers))| ChannelExchange {
                rank,
                senders,
                receivers,
            })
            .collect()
    }

    fn send(&self, to: usize, message: Message) -> Result<(), ExchangeError> {
        self.senders[to]
            .send(message)
            .map_err(|_| ExchangeError::Disconnected(to))
    }

    fn receive(&self, from: usize) -> Result<Message, ExchangeError> {
        self.receivers[from]
            .recv()
            .map_err(|_| ExchangeError::Disconnected(from))
    }
}

impl PointExchange for ChannelExchange {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.senders.len()
    }

    fn all_to_all_counts(&self, counts: &[usize]) -> Result<Vec<usize>, ExchangeError> {
        if counts.len() != self.size() {
            return Err(ExchangeError::SizeMismatch);
        }

        for (to, &count) in counts.iter().enumerate() {
            self.send(to, Message::Counts(count))?;
        }

        (0..self.size())
            .map(|from| match self.receive(from)? {
                Message::Counts(count) => Ok(count),
                Message::Values(_) => Err(ExchangeError::SizeMismatch),
            })
            .collect()
    }

    fn all_to_all_values(
        &self,
        send: &[Float],
        counts_send: &[usize],
        counts_recv: &[usize],
    ) -> Result<Vec<Float>, ExchangeError> {
        if counts_send.len() != self.size() || counts_recv.len() != self.size() {
            return Err(ExchangeError::SizeMismatch);
        }

        for (to, block) in split_blocks(send, counts_send)?.into_iter().enumerate() {
            self.send(to, Message::Values(block.to_vec()))?;
        }

        let mut received = Vec::with_capacity(counts_recv.iter().sum());

        for (from, &expected) in counts_recv.iter().enumerate() {
            match self.receive(from)? {
                Message::Values(block) if block.len() == expected => received.extend(block),
                _ => return Err(ExchangeError::SizeMismatch),
            }
        }

        Ok(received)
    }
}

#[cfg(test)]
mod tests {
    use super::{displacements, ChannelExchange, LocalExchange, PointExchange, RoutingPlan};
    use crate::errors::ExchangeError;
    use crate::Float;
    use std::thread;

    #[test]
    fn prefix_sums() {
        assert_eq!(displacements(&[2, 0, 3]), vec![0, 2, 2]);
        assert!(displacements(&[]).is_empty());
    }

    #[test]
    fn local_plan_round_trip() {
        let owners = [Some(0), None, Some(0)];
        let plan = RoutingPlan::new(&LocalExchange, &owners).unwrap();

        assert_eq!(plan.total_send(), 2);
        assert_eq!(plan.total_recv(), 2);

        let sent = LocalExchange.scatter_points(&plan, &[&[1.0, 2.0, 3.0]]).unwrap();
        assert_eq!(sent, vec![vec![1.0, 3.0]]);

        let doubled: Vec<Float> = sent[0].iter().map(|v| v * 2.0).collect();
        let back = LocalExchange.gather_results(&plan, &doubled, -1.0).unwrap();
        assert_eq!(back, vec![2.0, -1.0, 6.0]);
    }

    #[test]
    fn rank_outside_group() {
        let result = RoutingPlan::new(&LocalExchange, &[Some(1)]);
        assert_eq!(result, Err(ExchangeError::RankOutOfRange(1)));
    }

    #[test]
    fn channel_group_routes_to_owner() {
        // every point is owned by rank (value mod 3); owners add 100 * rank
        let handles: Vec<_> = ChannelExchange::group(3)
            .into_iter()
            .map(|exchange| {
                thread::spawn(move || {
                    let rank = exchange.rank();
                    let values: Vec<Float> = (0..5).map(|i| (i + rank) as Float).collect();
                    let owners: Vec<Option<usize>> =
                        values.iter().map(|v| Some(*v as usize % 3)).collect();

                    let plan = RoutingPlan::new(&exchange, &owners).unwrap();
                    let local = exchange.scatter_points(&plan, &[&values]).unwrap();

                    assert!(local[0].iter().all(|v| *v as usize % 3 == rank));

                    let results: Vec<Float> =
                        local[0].iter().map(|v| v + 100.0 * rank as Float).collect();
                    let back = exchange.gather_results(&plan, &results, -1.0).unwrap();

                    (values, back)
                })
            })
            .collect();

        for handle in handles {
            let (values, back) = handle.join().unwrap();

            for (v, b) in values.iter().zip(back) {
                assert_eq!(b, v + 100.0 * (*v as usize % 3) as Float);
            }
        }
    }

    #[test]
    fn empty_queries_still_complete() {
        let handles: Vec<_> = ChannelExchange::group(2)
            .into_iter()
            .map(|exchange| {
                thread::spawn(move || {
                    let plan = RoutingPlan::new(&exchange, &[]).unwrap();
                    let local = exchange.scatter_points(&plan, &[&[], &[]]).unwrap();
                    let back = exchange.gather_results(&plan, &[], 0.0).unwrap();
                    (local, back)
                })
            })
            .collect();

        for handle in handles {
            let (local, back) = handle.join().unwrap();
            assert_eq!(local, vec![Vec::<Float>::new(), Vec::new()]);
            assert!(back.is_empty());
        }
    }
}
