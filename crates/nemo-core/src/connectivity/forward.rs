//! Forward connectivity matrix (FCM): for every `(source, delay)` pair, a
//! contiguous row of `{target, weight}` terminals.

use std::collections::BTreeMap;

use smallvec::SmallVec;

use crate::error::{NemoError, Result};
use crate::fixed::{Fixed, FixedPointFormat};
use crate::mapper::LocalId;

/// A single `{target, weight}` entry in a forward row. Deliberately just
/// these two fields — plastic/static auxiliary data lives in a parallel
/// array alongside the row so the hot gather-stage scan stays compact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Terminal {
    /// Postsynaptic local neuron index.
    pub target: LocalId,
    /// Synaptic weight in fixed point.
    pub weight: Fixed,
}

/// Typical row width; most delay slots for most sources are empty or hold a
/// handful of terminals, so rows are inlined up to this many entries before
/// spilling to the heap.
const INLINE_ROW: usize = 4;

type Row = SmallVec<[Terminal; INLINE_ROW]>;

/// Builder for a [`ForwardConnectivityMatrix`]. Mirrors the "lazy
/// accumulate, then finalize into flat arrays" pattern: rows are collected keyed by `(source, delay)` and only
/// materialized into the dense `source * max_delay + (delay-1)` layout on
/// [`Self::finalize`].
#[derive(Debug, Default)]
pub struct ForwardConnectivityMatrixBuilder {
    rows: BTreeMap<(u32, u32), (Vec<(LocalId, f32)>, Vec<bool>)>,
    max_abs_weight: f32,
}

impl ForwardConnectivityMatrixBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a complete row for `(source, delay)`. Fails if `delay == 0`
    /// or if this `(source, delay)` pair was already set.
    pub fn set_row(
        &mut self,
        source: LocalId,
        delay: u32,
        terminals: &[(LocalId, f32, bool)],
    ) -> Result<()> {
        if delay == 0 {
            return Err(NemoError::invalid_input("delay must be >= 1"));
        }
        let key = (source.index(), delay);
        if self.rows.contains_key(&key) {
            return Err(NemoError::invalid_input(format!(
                "row already set for source {} delay {}",
                source.index(),
                delay
            )));
        }
        let mut targets = Vec::with_capacity(terminals.len());
        let mut plastic = Vec::with_capacity(terminals.len());
        for &(target, weight, is_plastic) in terminals {
            self.max_abs_weight = self.max_abs_weight.max(weight.abs());
            targets.push((target, weight));
            plastic.push(is_plastic);
        }
        self.rows.insert(key, (targets, plastic));
        Ok(())
    }

    /// Largest absolute weight inserted so far (used to derive the
    /// fixed-point format if the caller does not override it).
    pub fn max_abs_weight(&self) -> f32 {
        self.max_abs_weight
    }

    /// Finalize into a dense `neuron_count x max_delay` matrix.
    pub fn finalize(
        self,
        neuron_count: u32,
        max_delay: u32,
        format: FixedPointFormat,
    ) -> Result<ForwardConnectivityMatrix> {
        if max_delay == 0 || max_delay > 64 {
            return Err(NemoError::invalid_input("max_delay must be in 1..=64"));
        }
        let slots = (neuron_count as usize) * (max_delay as usize);
        let mut rows: Vec<Row> = vec![Row::new(); slots];
        let mut plastic_flags: Vec<SmallVec<[bool; INLINE_ROW]>> = vec![SmallVec::new(); slots];

        for ((source, delay), (terminals, plastic)) in self.rows {
            if source >= neuron_count {
                return Err(NemoError::invalid_input(format!(
                    "source {source} out of range for neuron_count {neuron_count}"
                )));
            }
            if delay > max_delay {
                return Err(NemoError::invalid_input(format!(
                    "delay {delay} exceeds max_delay {max_delay}"
                )));
            }
            let idx = (source as usize) * (max_delay as usize) + (delay as usize - 1);
            let row: Row = terminals
.into_iter()
.map(|(target, weight)| Terminal {
                    target,
                    weight: format.from_f32(weight),
                })
.collect();
            rows[idx] = row;
            plastic_flags[idx] = plastic.into();
        }

        Ok(ForwardConnectivityMatrix {
            neuron_count,
            max_delay,
            format,
            rows,
            plastic_flags,
        })
    }
}

/// Finalized, immutable forward connectivity matrix. Read by the gather
/// stage every cycle; never mutated after [`ForwardConnectivityMatrixBuilder::finalize`]
/// except for the in-place weight updates STDP applies through the
/// forward address the reverse matrix stores.
#[derive(Debug, Clone)]
pub struct ForwardConnectivityMatrix {
    neuron_count: u32,
    max_delay: u32,
    format: FixedPointFormat,
    rows: Vec<Row>,
    plastic_flags: Vec<SmallVec<[bool; INLINE_ROW]>>,
}

impl ForwardConnectivityMatrix {
    /// Fixed-point format used for every weight in this matrix.
    pub const fn format(&self) -> FixedPointFormat {
        self.format
    }

    /// Configured maximum delay (rows exist for `1..=max_delay`).
    pub const fn max_delay(&self) -> u32 {
        self.max_delay
    }

    /// Number of neurons addressable as a `source`.
    pub const fn neuron_count(&self) -> u32 {
        self.neuron_count
    }

    fn index(&self, source: LocalId, delay: u32) -> Result<usize> {
        if source.index() >= self.neuron_count {
            return Err(NemoError::logic(format!(
                "source {} out of range",
                source.index()
            )));
        }
        if delay == 0 || delay > self.max_delay {
            return Err(NemoError::logic(format!(
                "delay {delay} out of range 1..={}",
                self.max_delay
            )));
        }
        Ok((source.index() as usize) * (self.max_delay as usize) + (delay as usize - 1))
    }

    /// O(1) lookup of the row for `(source, delay)`. An absent row is
    /// represented as a length-0 slice.
    pub fn get_row(&self, source: LocalId, delay: u32) -> Result<&[Terminal]> {
        let idx = self.index(source, delay)?;
        Ok(&self.rows[idx])
    }

    /// Mutable access to a row's weights, used by STDP's `forwardAddress`
    /// indirection.
    pub fn get_row_mut(&mut self, source: LocalId, delay: u32) -> Result<&mut [Terminal]> {
        let idx = self.index(source, delay)?;
        Ok(&mut self.rows[idx])
    }

    /// Parallel arrays over every synapse with `source` as its presynaptic
    /// neuron, in the order rows/terminals were inserted. Weights are converted back to float.
    pub fn get_synapses(
        &self,
        source: LocalId,
    ) -> Result<(Vec<LocalId>, Vec<u32>, Vec<f32>, Vec<bool>)> {
        if source.index() >= self.neuron_count {
            return Err(NemoError::invalid_input(format!(
                "source {} out of range",
                source.index()
            )));
        }
        let mut targets = Vec::new();
        let mut delays = Vec::new();
        let mut weights = Vec::new();
        let mut plastic = Vec::new();
        for delay in 1..=self.max_delay {
            let idx = self.index(source, delay)?;
            let row = &self.rows[idx];
            let flags = &self.plastic_flags[idx];
            for (terminal, &is_plastic) in row.iter().zip(flags.iter()) {
                targets.push(terminal.target);
                delays.push(delay);
                weights.push(self.format.to_f32(terminal.weight));
                plastic.push(is_plastic);
            }
        }
        Ok((targets, delays, weights, plastic))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_delay_rejected() {
        let mut b = ForwardConnectivityMatrixBuilder::new();
        let err = b.set_row(LocalId::new(0), 0, &[(LocalId::new(1), 1.0, false)]);
        assert!(err.is_err());
    }

    #[test]
    fn double_insertion_rejected() {
        let mut b = ForwardConnectivityMatrixBuilder::new();
        b.set_row(LocalId::new(0), 1, &[(LocalId::new(1), 1.0, false)])
.unwrap();
        let err = b.set_row(LocalId::new(0), 1, &[(LocalId::new(2), 1.0, false)]);
        assert!(err.is_err());
    }

    #[test]
    fn absent_row_is_empty() {
        let b = ForwardConnectivityMatrixBuilder::new();
        let fmt = FixedPointFormat::for_max_abs_weight(1.0);
        let fcm = b.finalize(4, 8, fmt).unwrap();
        let row = fcm.get_row(LocalId::new(0), 3).unwrap();
        assert!(row.is_empty());
    }

    #[test]
    fn row_order_is_insertion_order() {
        let mut b = ForwardConnectivityMatrixBuilder::new();
        b.set_row(
            LocalId::new(0),
            1,
            &[
                (LocalId::new(3), 1.0, false),
                (LocalId::new(1), 2.0, true),
                (LocalId::new(2), 3.0, false),
            ],
        )
.unwrap();
        let fmt = FixedPointFormat::for_max_abs_weight(3.0);
        let fcm = b.finalize(4, 8, fmt).unwrap();
        let (targets, delays, weights, plastic) = fcm.get_synapses(LocalId::new(0)).unwrap();
        assert_eq!(targets, vec![LocalId::new(3), LocalId::new(1), LocalId::new(2)]);
        assert_eq!(delays, vec![1, 1, 1]);
        assert_eq!(plastic, vec![false, true, false]);
        for (got, want) in weights.iter().zip([1.0, 2.0, 3.0]) {
            assert!((got - want).abs() < 0.01);
        }
    }

    #[test]
    fn out_of_range_delay_at_finalize_fails() {
        let mut b = ForwardConnectivityMatrixBuilder::new();
        b.set_row(LocalId::new(0), 65, &[(LocalId::new(1), 1.0, false)])
.unwrap();
        let fmt = FixedPointFormat::for_max_abs_weight(1.0);
        assert!(b.finalize(4, 64, fmt).is_err());
    }
}
