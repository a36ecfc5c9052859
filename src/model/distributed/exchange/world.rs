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

//! Point exchange between the processes of an MPI communicator.

use super::{displacements, PointExchange};
use crate::errors::ExchangeError;
use crate::Float;
use mpi::datatype::{Partition, PartitionMut};
use mpi::topology::SimpleCommunicator;
use mpi::traits::*;
use mpi::Count;

/// One rank per MPI process; collectives map directly onto `MPI_Alltoall`
/// and `MPI_Alltoallv`.
pub struct MpiExchange {
    world: SimpleCommunicator,
}

impl MpiExchange {
    pub fn new(world: SimpleCommunicator) -> Self {
        MpiExchange { world }
    }
}

fn to_counts(values: &[usize]) -> Result<Vec<Count>, ExchangeError> {
    values
        .iter()
        .map(|&value| Count::try_from(value).map_err(|_| ExchangeError::CountOverflow(value)))
        .collect()
}

impl PointExchange for MpiExchange {
    fn rank(&self) -> usize {
        self.world.rank() as usize
    }

    fn size(&self) -> usize {
        self.world.size() as usize
    }

    fn all_to_all_counts(&self, counts: &[usize]) -> Result<Vec<usize>, ExchangeError> {
        if counts.len() != self.size() {
            return Err(ExchangeError::SizeMismatch);
        }

        let send = to_counts(counts)?;
        let mut recv: Vec<Count> = vec![0; send.len()];
        self.world.all_to_all_into(&send[..], &mut recv[..]);

        recv.into_iter()
            .map(|count| usize::try_from(count).map_err(|_| ExchangeError::SizeMismatch))
            .collect()
    }

    fn all_to_all_values(
        &self,
        send: &[Float],
        counts_send: &[usize],
        counts_recv: &[usize],
    ) -> Result<Vec<Float>, ExchangeError> {
        if counts_send.len() != self.size()
            || counts_recv.len() != self.size()
            || counts_send.iter().sum::<usize>() != send.len()
        {
            return Err(ExchangeError::SizeMismatch);
        }

        let send_counts = to_counts(counts_send)?;
        let send_displs = to_counts(&displacements(counts_send))?;
        let recv_counts = to_counts(counts_recv)?;
        let recv_displs = to_counts(&displacements(counts_recv))?;

        let mut received = vec![0.0; counts_recv.iter().sum()];

        {
            let outgoing = Partition::new(send, &send_counts[..], &send_displs[..]);
            let mut incoming = PartitionMut::new(&mut received[..], &recv_counts[..], &recv_displs[..]);
            self.world.all_to_all_varcount_into(&outgoing, &mut incoming);
        }

        Ok(received)
    }
}

#[cfg(test)]
mod tests {
    use super::MpiExchange;
    use crate::model::distributed::exchange::{PointExchange, RoutingPlan};
    use crate::Float;

    // holds for any number of processes, a plain test run is a world of one
    #[test]
    fn world_routes_to_owner() {
        let universe = mpi::initialize().unwrap();
        let exchange = MpiExchange::new(universe.world());
        let (rank, size) = (exchange.rank(), exchange.size());

        let counts = exchange.all_to_all_counts(&vec![rank + 1; size]).unwrap();
        assert_eq!(counts, (1..=size).collect::<Vec<usize>>());

        let values: Vec<Float> = (0..7).map(|i| (i + rank) as Float).collect();
        let owners: Vec<Option<usize>> = values
            .iter()
            .enumerate()
            .map(|(i, v)| if i == 3 { None } else { Some(*v as usize % size) })
            .collect();

        let plan = RoutingPlan::new(&exchange, &owners).unwrap();
        let local = exchange.scatter_points(&plan, &[&values]).unwrap();
        assert!(local[0].iter().all(|v| *v as usize % size == rank));

        let results: Vec<Float> = local[0].iter().map(|v| v + 100.0 * rank as Float).collect();
        let back = exchange.gather_results(&plan, &results, -1.0).unwrap();

        for (i, (v, b)) in values.iter().zip(back).enumerate() {
            let expected = if i == 3 { -1.0 } else { v + 100.0 * (*v as usize % size) as Float };
            assert_eq!(b, expected);
        }

        assert!(exchange.all_to_all_counts(&[]).is_err());
    }
}
