//! Cycle-driven simulation core for large spiking neural networks built from
//! Izhikevich point neurons, conductance-delayed synapses, and
//! spike-timing-dependent plasticity.
//!
//! This crate covers only the simulation core: constructing a network's
//! connectivity, stepping it one millisecond cycle at a time, and applying
//! plasticity updates. Network *distribution* across hosts, persistence
//! formats, and random-number-stream construction are left to callers.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod connectivity;
pub mod error;
pub mod firing;
pub mod fixed;
pub mod mapper;
pub mod network;
pub mod neuron;
pub mod pipeline;
pub mod queue;
pub mod stdp;

pub use connectivity::{ForwardConnectivityMatrix, OutgoingIndex, ReverseConnectivityMatrix, Terminal};
pub use error::{NemoError, Result};
pub use fixed::{Fixed, FixedPointFormat};
pub use firing::RecentFiringRing;
pub use mapper::{GlobalId, LocalId, Mapper};
pub use network::{Network, NetworkBuilder, NetworkConfig};
pub use neuron::{NeuronParams, NeuronState, RngState};
pub use pipeline::CyclePipeline;
pub use queue::IncomingQueue;
pub use stdp::{STDPEngine, STDPFunction};

/// Crate version for compatibility checking by embedders.
pub const CORE_VERSION: u32 = 1;

/// Length, in milliseconds, of one simulation cycle. Fixed by the
/// Izhikevich integrator's four 0.25ms Euler sub-steps.
pub const CYCLE_DURATION_MS: u32 = 1;
