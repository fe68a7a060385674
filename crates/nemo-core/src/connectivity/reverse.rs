//! Reverse connectivity matrix (RCM): for every target neuron, the plastic
//! synapses that feed it, addressed back into the forward matrix so STDP can
//! update weights in place.

use std::collections::BTreeMap;

use smallvec::SmallVec;

use crate::error::{NemoError, Result};
use crate::mapper::LocalId;

const INLINE_ROW: usize = 4;

/// One plastic synapse as seen from its postsynaptic side: which presynaptic
/// neuron and delay it came from, its address in the forward matrix (so a
/// weight update can be applied without a search), and the accumulator STDP
/// deposits potentiation/depression into before a commit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReverseEntry {
    /// Presynaptic local neuron index.
    pub source: LocalId,
    /// Synaptic delay in cycles.
    pub delay: u32,
    /// Offset of this synapse's `Terminal` within its forward row, so the
    /// weight can be written back without re-scanning the row.
    pub forward_address: usize,
    /// Pending weight delta accumulated since the last `applyStdp`, as a
    /// float (small deltas would underflow fixed point before they could
    /// accumulate across several spike pairs).
    pub weight_delta: f32,
}

/// Builder for a [`ReverseConnectivityMatrix`], populated alongside the
/// forward matrix builder as plastic synapses are inserted.
#[derive(Debug, Default)]
pub struct ReverseConnectivityMatrixBuilder {
    by_target: BTreeMap<u32, Vec<ReverseEntry>>,
}

impl ReverseConnectivityMatrixBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one plastic synapse feeding `target`.
    pub fn add_entry(
        &mut self,
        target: LocalId,
        source: LocalId,
        delay: u32,
        forward_address: usize,
    ) {
        self.by_target.entry(target.index()).or_default().push(ReverseEntry {
            source,
            delay,
            forward_address,
            weight_delta: 0.0,
        });
    }

    /// Finalize into a dense, target-indexed matrix.
    pub fn finalize(self, neuron_count: u32) -> Result<ReverseConnectivityMatrix> {
        let mut rows: Vec<SmallVec<[ReverseEntry; INLINE_ROW]>> =
            vec![SmallVec::new(); neuron_count as usize];
        for (target, entries) in self.by_target {
            if target >= neuron_count {
                return Err(NemoError::invalid_input(format!(
                    "target {target} out of range for neuron_count {neuron_count}"
                )));
            }
            rows[target as usize] = entries.into();
        }
        Ok(ReverseConnectivityMatrix {
            neuron_count,
            rows,
        })
    }
}

/// Finalized reverse connectivity matrix. The STDP engine reads a target's
/// row to find which plastic synapses to credit after that target fires,
/// and `apply_stdp` walks every row once per reward application to flush
/// accumulated deltas into the forward matrix.
#[derive(Debug, Clone)]
pub struct ReverseConnectivityMatrix {
    neuron_count: u32,
    rows: Vec<SmallVec<[ReverseEntry; INLINE_ROW]>>,
}

impl ReverseConnectivityMatrix {
    /// Number of neurons addressable as a `target`.
    pub const fn neuron_count(&self) -> u32 {
        self.neuron_count
    }

    /// True if this matrix has no plastic synapses at all — a network whose
    /// `STDPEngine` was never configured builds an empty matrix and
    /// `apply_stdp`/`accumulate` calls against it fail with `Unsupported`.
    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(|row| row.is_empty())
    }

    /// Plastic synapses feeding `target`, in insertion order.
    pub fn row(&self, target: LocalId) -> Result<&[ReverseEntry]> {
        self.rows
            .get(target.index() as usize)
            .map(|row| row.as_slice())
            .ok_or_else(|| NemoError::logic(format!("target {} out of range", target.index())))
    }

    /// Mutable access to a target's row, used to deposit STDP deltas.
    pub fn row_mut(&mut self, target: LocalId) -> Result<&mut [ReverseEntry]> {
        self.rows
            .get_mut(target.index() as usize)
            .map(|row| row.as_mut_slice())
            .ok_or_else(|| NemoError::logic(format!("target {} out of range", target.index())))
    }

    /// Accumulate a weight delta for one plastic synapse, identified by its
    /// position within `target`'s row.
    pub fn accumulate(&mut self, target: LocalId, row_index: usize, delta: f32) -> Result<()> {
        let row = self.row_mut(target)?;
        let entry = row
            .get_mut(row_index)
            .ok_or_else(|| NemoError::logic("reverse row index out of range"))?;
        entry.weight_delta += delta;
        Ok(())
    }

    /// Drain every row's accumulated deltas, handing each `(target,
    /// ReverseEntry)` pair to `apply` so the caller can fold it into the
    /// forward matrix, then zero the accumulator.
    pub fn drain_deltas(&mut self, mut apply: impl FnMut(LocalId, &ReverseEntry)) {
        for (target_idx, row) in self.rows.iter_mut().enumerate() {
            let target = LocalId::new(target_idx as u32);
            for entry in row.iter_mut() {
                if entry.weight_delta != 0.0 {
                    apply(target, entry);
                    entry.weight_delta = 0.0;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_matrix_reports_empty() {
        let b = ReverseConnectivityMatrixBuilder::new();
        let rcm = b.finalize(4).unwrap();
        assert!(rcm.is_empty());
    }

    #[test]
    fn accumulate_and_drain_round_trip() {
        let mut b = ReverseConnectivityMatrixBuilder::new();
        b.add_entry(LocalId::new(2), LocalId::new(0), 1, 0);
        b.add_entry(LocalId::new(2), LocalId::new(1), 3, 2);
        let mut rcm = b.finalize(4).unwrap();
        assert!(!rcm.is_empty());

        rcm.accumulate(LocalId::new(2), 0, 0.5).unwrap();
        rcm.accumulate(LocalId::new(2), 0, 0.25).unwrap();
        rcm.accumulate(LocalId::new(2), 1, -0.1).unwrap();

        let mut seen = Vec::new();
        rcm.drain_deltas(|target, entry| {
            seen.push((target, entry.source, entry.weight_delta));
        });
        seen.sort_by_key(|(_, source, _)| source.index());
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].1, LocalId::new(0));
        assert!((seen[0].2 - 0.75).abs() < 1e-6);
        assert_eq!(seen[1].1, LocalId::new(1));
        assert!((seen[1].2 - (-0.1)).abs() < 1e-6);

        // Deltas are cleared after drain.
        let mut seen_again = Vec::new();
        rcm.drain_deltas(|target, entry| seen_again.push((target, entry.weight_delta)));
        assert!(seen_again.is_empty());
    }

    #[test]
    fn out_of_range_target_at_finalize_fails() {
        let mut b = ReverseConnectivityMatrixBuilder::new();
        b.add_entry(LocalId::new(5), LocalId::new(0), 1, 0);
        assert!(b.finalize(4).is_err());
    }
}
