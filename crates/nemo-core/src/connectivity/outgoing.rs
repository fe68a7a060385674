//! Outgoing index: for each `(source, delay)` pair, which partitions hold a
//! target of that row. Built once at finalize by scanning the forward
//! matrix, so the scatter stage can skip partitions a source has no
//! synapses reaching through a given delay.

use std::collections::BTreeSet;

use crate::connectivity::forward::ForwardConnectivityMatrix;
use crate::mapper::{LocalId, Mapper};

/// Dense `source * max_delay + (delay-1)` indexed table of partition sets.
#[derive(Debug, Clone)]
pub struct OutgoingIndex {
    max_delay: u32,
    partitions: Vec<Vec<u32>>,
}

impl OutgoingIndex {
    /// Scan every row of `fcm` and record which partitions (per `mapper`)
    /// each `(source, delay)` pair reaches.
    pub fn build(fcm: &ForwardConnectivityMatrix, mapper: &Mapper) -> Self {
        let max_delay = fcm.max_delay();
        let neuron_count = fcm.neuron_count();
        let mut partitions = vec![Vec::new(); (neuron_count as usize) * (max_delay as usize)];

        for source in 0..neuron_count {
            for delay in 1..=max_delay {
                let idx = (source as usize) * (max_delay as usize) + (delay as usize - 1);
                let row = fcm
                    .get_row(LocalId::new(source), delay)
                    .expect("source/delay within finalized bounds");
                let mut set = BTreeSet::new();
                for terminal in row {
                    set.insert(terminal.target.partition(mapper.partition_size()));
                }
                partitions[idx] = set.into_iter().collect();
            }
        }

        Self {
            max_delay,
            partitions,
        }
    }

    /// Partitions reached by `source` at exactly `delay` cycles, in
    /// ascending order with no duplicates. Empty if that row has no
    /// synapses.
    pub fn partitions_for(&self, source: LocalId, delay: u32) -> &[u32] {
        if delay == 0 || delay > self.max_delay {
            return &[];
        }
        let idx = (source.index() as usize) * (self.max_delay as usize) + (delay as usize - 1);
        self.partitions
            .get(idx)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::forward::ForwardConnectivityMatrixBuilder;
    use crate::fixed::FixedPointFormat;

    fn mapper_with(n: u32, partition_size: u32) -> Mapper {
        let mut m = Mapper::new(partition_size).unwrap();
        for i in 0..n as u64 {
            m.insert(crate::mapper::GlobalId::new(i)).unwrap();
        }
        m
    }

    #[test]
    fn empty_network_has_no_reached_partitions() {
        let b = ForwardConnectivityMatrixBuilder::new();
        let fmt = FixedPointFormat::for_max_abs_weight(1.0);
        let fcm = b.finalize(8, 4, fmt).unwrap();
        let mapper = mapper_with(8, 4);
        let index = OutgoingIndex::build(&fcm, &mapper);
        assert!(index.partitions_for(LocalId::new(0), 1).is_empty());
    }

    #[test]
    fn reached_partitions_match_targets() {
        let mut b = ForwardConnectivityMatrixBuilder::new();
        // partition_size = 2: targets 0,1 in partition 0; 2,3 in partition 1.
        b.set_row(
            LocalId::new(0),
            1,
            &[
                (LocalId::new(0), 1.0, false),
                (LocalId::new(3), 1.0, false),
            ],
        )
        .unwrap();
        let fmt = FixedPointFormat::for_max_abs_weight(1.0);
        let fcm = b.finalize(4, 4, fmt).unwrap();
        let mapper = mapper_with(4, 2);
        let index = OutgoingIndex::build(&fcm, &mapper);
        assert_eq!(index.partitions_for(LocalId::new(0), 1), &[0, 1]);
        assert!(index.partitions_for(LocalId::new(0), 2).is_empty());
    }

    #[test]
    fn out_of_range_delay_returns_empty_slice() {
        let b = ForwardConnectivityMatrixBuilder::new();
        let fmt = FixedPointFormat::for_max_abs_weight(1.0);
        let fcm = b.finalize(4, 4, fmt).unwrap();
        let mapper = mapper_with(4, 2);
        let index = OutgoingIndex::build(&fcm, &mapper);
        assert!(index.partitions_for(LocalId::new(0), 0).is_empty());
        assert!(index.partitions_for(LocalId::new(0), 99).is_empty());
    }
}
