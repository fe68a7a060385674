//! Network construction: accumulate neurons and synapses, then finalize
//! into the immutable connectivity a [`crate::pipeline::CyclePipeline`]
//! drives cycle by cycle.

use std::collections::{BTreeMap, HashSet};

use crate::connectivity::forward::{ForwardConnectivityMatrix, ForwardConnectivityMatrixBuilder};
use crate::connectivity::outgoing::OutgoingIndex;
use crate::connectivity::reverse::{ReverseConnectivityMatrix, ReverseConnectivityMatrixBuilder};
use crate::error::{NemoError, Result};
use crate::fixed::FixedPointFormat;
use crate::mapper::{GlobalId, LocalId, Mapper};
use crate::neuron::{NeuronParams, NeuronState};

/// Configuration fixed at construction and unchanged for the life of a
/// finalized network.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NetworkConfig {
    /// Longest synaptic delay any synapse in this network may use.
    pub max_delay: u32,
    /// Neurons per partition, for locality-grouped target iteration.
    pub partition_size: u32,
    /// Multiplier applied to a source's average outgoing row width to size
    /// each incoming-queue bin; defaults to 0.1 headroom over the expected
    /// simultaneous fan-in.
    pub size_multiplier: f32,
    /// Explicit fractional-bit override, bypassing the
    /// largest-absolute-weight derivation rule.
    pub fbits_override: Option<u32>,
}

impl NetworkConfig {
    /// Build a configuration, validating `max_delay` and `partition_size`.
    pub fn new(max_delay: u32, partition_size: u32) -> Result<Self> {
        if max_delay == 0 || max_delay > 64 {
            return Err(NemoError::invalid_input("max_delay must be in 1..=64"));
        }
        if partition_size == 0 {
            return Err(NemoError::invalid_input("partition_size must be > 0"));
        }
        Ok(Self {
            max_delay,
            partition_size,
            size_multiplier: 0.1,
            fbits_override: None,
        })
    }

    /// Override the incoming-queue bin sizing multiplier.
    pub fn with_size_multiplier(mut self, size_multiplier: f32) -> Self {
        self.size_multiplier = size_multiplier;
        self
    }

    /// Force a specific fractional-bit count instead of deriving one from
    /// the largest inserted weight.
    pub fn with_fbits_override(mut self, fbits: u32) -> Self {
        self.fbits_override = Some(fbits);
        self
    }
}

/// Accumulates neurons and synapses before the irreversible transition into
/// a finalized, immutable [`Network`].
pub struct NetworkBuilder {
    config: NetworkConfig,
    mapper: Mapper,
    neuron_params: Vec<NeuronParams>,
    initial_states: Vec<NeuronState>,
    fcm: ForwardConnectivityMatrixBuilder,
    seen_synapses: HashSet<(u32, u32, u32)>,
    pending_rows: BTreeMap<(u32, u32), Vec<(LocalId, f32, bool)>>,
}

impl NetworkBuilder {
    /// Start an empty builder.
    pub fn new(config: NetworkConfig) -> Result<Self> {
        Ok(Self {
            mapper: Mapper::new(config.partition_size)?,
            config,
            neuron_params: Vec::new(),
            initial_states: Vec::new(),
            fcm: ForwardConnectivityMatrixBuilder::new(),
            seen_synapses: HashSet::new(),
            pending_rows: BTreeMap::new(),
        })
    }

    /// Add a neuron, assigning it the next dense local index.
    pub fn add_neuron(
        &mut self,
        global: GlobalId,
        params: NeuronParams,
        initial_state: NeuronState,
    ) -> Result<LocalId> {
        let local = self.mapper.insert(global)?;
        debug_assert_eq!(local.index() as usize, self.neuron_params.len());
        self.neuron_params.push(params);
        self.initial_states.push(initial_state);
        Ok(local)
    }

    /// Add a synapse. `delay` must be in `1..=config.max_delay`; the exact
    /// `(source, target, delay)` triple may only be inserted once.
    pub fn add_synapse(
        &mut self,
        source: GlobalId,
        target: GlobalId,
        delay: u32,
        weight: f32,
        plastic: bool,
    ) -> Result<()> {
        if delay == 0 || delay > self.config.max_delay {
            return Err(NemoError::invalid_input(format!(
                "delay {delay} out of range 1..={}",
                self.config.max_delay
            )));
        }
        let source_local = self.mapper.to_local(source)?;
        let target_local = self.mapper.to_local(target)?;
        let key = (source_local.index(), target_local.index(), delay);
        if !self.seen_synapses.insert(key) {
            return Err(NemoError::invalid_input(format!(
                "duplicate synapse {}->{} at delay {delay}",
                source_local.index(),
                target_local.index()
            )));
        }
        self.pending_rows
            .entry((source_local.index(), delay))
            .or_default()
            .push((target_local, weight, plastic));
        Ok(())
    }

    /// Materialize every accumulated row and synapse into an immutable
    /// [`Network`]. Consumes the builder: there is no path back to a
    /// mutable state afterward.
    pub fn finalize(mut self) -> Result<Network> {
        let neuron_count = self.mapper.len() as u32;
        let max_abs_weight = self
            .pending_rows
            .values()
            .flat_map(|row| row.iter().map(|(_, w, _)| w.abs()))
            .fold(0.0f32, f32::max);
        let format = match self.config.fbits_override {
            Some(fbits) => FixedPointFormat::with_fbits(fbits),
            None => FixedPointFormat::for_max_abs_weight(max_abs_weight as f64),
        };

        let mut rcm_builder = ReverseConnectivityMatrixBuilder::new();
        for (&(source, delay), terminals) in &self.pending_rows {
            let row: Vec<(LocalId, f32, bool)> = terminals.clone();
            self.fcm.set_row(LocalId::new(source), delay, &row)?;
            for (forward_address, &(target, _, plastic)) in row.iter().enumerate() {
                if plastic {
                    rcm_builder.add_entry(target, LocalId::new(source), delay, forward_address);
                }
            }
        }

        let fcm = self.fcm.finalize(neuron_count, self.config.max_delay, format)?;
        let rcm = rcm_builder.finalize(neuron_count)?;
        let outgoing = OutgoingIndex::build(&fcm, &self.mapper);

        Ok(Network {
            config: self.config,
            mapper: self.mapper,
            neuron_params: self.neuron_params,
            initial_states: self.initial_states,
            fcm,
            rcm,
            outgoing,
        })
    }
}

/// Finalized, immutable network: connectivity and per-neuron parameters
/// ready to be driven by a [`crate::pipeline::CyclePipeline`].
#[derive(Debug, Clone)]
pub struct Network {
    config: NetworkConfig,
    mapper: Mapper,
    neuron_params: Vec<NeuronParams>,
    initial_states: Vec<NeuronState>,
    fcm: ForwardConnectivityMatrix,
    rcm: ReverseConnectivityMatrix,
    outgoing: OutgoingIndex,
}

impl Network {
    /// Number of neurons in this network.
    pub fn neuron_count(&self) -> u32 {
        self.mapper.len() as u32
    }

    /// The configuration this network was finalized with.
    pub const fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// The global/local identifier mapping.
    pub const fn mapper(&self) -> &Mapper {
        &self.mapper
    }

    /// Validated per-neuron parameters, indexed by local id.
    pub fn neuron_params(&self, local: LocalId) -> Result<&NeuronParams> {
        self.neuron_params
            .get(local.index() as usize)
            .ok_or_else(|| NemoError::logic(format!("local id {} out of range", local.index())))
    }

    /// Each neuron's state as configured at construction, before any
    /// cycles have run.
    pub fn initial_states(&self) -> &[NeuronState] {
        &self.initial_states
    }

    /// Every neuron's parameters, indexed by local id.
    pub fn all_neuron_params(&self) -> &[NeuronParams] {
        &self.neuron_params
    }

    /// Forward connectivity matrix.
    pub const fn fcm(&self) -> &ForwardConnectivityMatrix {
        &self.fcm
    }

    /// Mutable access to the forward connectivity matrix, used to apply
    /// STDP weight updates.
    pub fn fcm_mut(&mut self) -> &mut ForwardConnectivityMatrix {
        &mut self.fcm
    }

    /// Reverse connectivity matrix.
    pub const fn rcm(&self) -> &ReverseConnectivityMatrix {
        &self.rcm
    }

    /// Mutable access to the reverse connectivity matrix, used to
    /// accumulate and drain STDP deltas.
    pub fn rcm_mut(&mut self) -> &mut ReverseConnectivityMatrix {
        &mut self.rcm
    }

    /// Outgoing partition index.
    pub const fn outgoing(&self) -> &OutgoingIndex {
        &self.outgoing
    }

    /// Whether this network has any plastic synapses at all; a network with
    /// none rejects `applyStdp` with `Unsupported`.
    pub fn has_plasticity(&self) -> bool {
        !self.rcm.is_empty()
    }

    /// Parallel arrays describing every synapse sourced at `source`.
    pub fn synapses_from(&self, source: LocalId) -> Result<(Vec<LocalId>, Vec<u32>, Vec<f32>, Vec<bool>)> {
        self.fcm.get_synapses(source)
    }
}
