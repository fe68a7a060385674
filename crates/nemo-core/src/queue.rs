//! Incoming spike queue: a ring of per-cycle bins, one per possible delay.
//! Cycle `c` writes arriving spike-group references into bin
//! `(c + delay) mod max_delay`; cycle `c` reads and clears bin
//! `c mod max_delay` before advancing.
//!
//! A bin holds references, not resolved current contributions: the gather
//! stage streams the live forward row for each entry at the moment it is
//! due, so a weight changed by `applyStdp` between scatter and gather is
//! picked up by any delivery still in flight.

use smallvec::SmallVec;

use crate::error::{NemoError, Result};
use crate::mapper::LocalId;

const INLINE_BIN: usize = 8;

/// One pending spike-group delivery, written by the scatter stage and
/// consumed by the gather stage exactly `delay` cycles later. Resolving
/// this into actual current contributions means re-reading
/// `source`'s forward row at delay `delay` at gather time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpikeGroup {
    /// Presynaptic local neuron index that fired.
    pub source: LocalId,
    /// Synaptic delay in cycles between the firing and this delivery.
    pub delay: u32,
}

/// Ring of `max_delay` per-cycle bins. Bin capacity is sized once at
/// construction from an expected number of distinct firing sources per
/// cycle; writes past that capacity are a `BufferOverflow`, not a silent
/// grow, so a misconfigured network fails fast instead of degrading into
/// unbounded allocation under load.
#[derive(Debug, Clone)]
pub struct IncomingQueue {
    max_delay: u32,
    capacity_per_bin: usize,
    bins: Vec<SmallVec<[SpikeGroup; INLINE_BIN]>>,
}

impl IncomingQueue {
    /// Build an empty queue with `max_delay` bins, each able to hold
    /// `capacity_per_bin` spike groups before overflowing.
    pub fn new(max_delay: u32, capacity_per_bin: usize) -> Result<Self> {
        if max_delay == 0 || max_delay > 64 {
            return Err(NemoError::invalid_input("max_delay must be in 1..=64"));
        }
        if capacity_per_bin == 0 {
            return Err(NemoError::invalid_input("capacity_per_bin must be > 0"));
        }
        Ok(Self {
            max_delay,
            capacity_per_bin,
            bins: vec![SmallVec::new(); max_delay as usize],
        })
    }

    /// Configured number of bins (equal to the network's max delay).
    pub const fn max_delay(&self) -> u32 {
        self.max_delay
    }

    /// Schedule a delivery from `source` at `delay` cycles after
    /// `current_cycle`.
    pub fn schedule(&mut self, current_cycle: u64, delay: u32, source: LocalId) -> Result<()> {
        if delay == 0 || delay > self.max_delay {
            return Err(NemoError::invalid_input(format!(
                "delay {delay} out of range 1..={}",
                self.max_delay
            )));
        }
        let bin_index = ((current_cycle + delay as u64) % self.max_delay as u64) as usize;
        let bin = &mut self.bins[bin_index];
        if bin.len() >= self.capacity_per_bin {
            return Err(NemoError::buffer_overflow(format!(
                "incoming queue bin {bin_index} exceeded capacity {}",
                self.capacity_per_bin
            )));
        }
        bin.push(SpikeGroup { source, delay });
        Ok(())
    }

    /// Drain and clear the bin due at `current_cycle`, returning its spike
    /// groups. Reading the same cycle twice returns an empty slice the
    /// second time, matching a ring's single-pass consumption.
    pub fn drain_due(&mut self, current_cycle: u64) -> SmallVec<[SpikeGroup; INLINE_BIN]> {
        let bin_index = (current_cycle % self.max_delay as u64) as usize;
        core::mem::take(&mut self.bins[bin_index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_max_delay_rejected() {
        assert!(IncomingQueue::new(0, 8).is_err());
    }

    #[test]
    fn spike_group_lands_in_the_right_bin() {
        let mut q = IncomingQueue::new(4, 8).unwrap();
        q.schedule(0, 3, LocalId::new(5)).unwrap();
        // current_cycle=0, delay=3 -> bin 3
        let due_early = q.drain_due(2);
        assert!(due_early.is_empty());
        let due = q.drain_due(3);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].source, LocalId::new(5));
        assert_eq!(due[0].delay, 3);
    }

    #[test]
    fn ring_wraps_around() {
        let mut q = IncomingQueue::new(4, 8).unwrap();
        // current_cycle=3, delay=2 -> (3+2) mod 4 = 1
        q.schedule(3, 2, LocalId::new(1)).unwrap();
        let due = q.drain_due(5); // 5 mod 4 = 1
        assert_eq!(due.len(), 1);
    }

    #[test]
    fn draining_twice_is_empty_the_second_time() {
        let mut q = IncomingQueue::new(4, 8).unwrap();
        q.schedule(0, 1, LocalId::new(0)).unwrap();
        assert_eq!(q.drain_due(1).len(), 1);
        assert!(q.drain_due(1).is_empty());
    }

    #[test]
    fn overflow_past_capacity_is_reported() {
        let mut q = IncomingQueue::new(4, 2).unwrap();
        q.schedule(0, 1, LocalId::new(0)).unwrap();
        q.schedule(0, 1, LocalId::new(1)).unwrap();
        assert!(q.schedule(0, 1, LocalId::new(2)).is_err());
    }

    #[test]
    fn out_of_range_delay_rejected() {
        let mut q = IncomingQueue::new(4, 8).unwrap();
        assert!(q.schedule(0, 0, LocalId::new(0)).is_err());
        assert!(q.schedule(0, 5, LocalId::new(0)).is_err());
    }
}
