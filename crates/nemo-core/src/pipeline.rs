//! The per-cycle simulation loop: gather pending current, add noise,
//! integrate, reset fired neurons, update firing history, scatter new
//! spikes into the incoming queue, accumulate STDP credit, and commit.

use std::time::{Duration, Instant};

use crate::error::{NemoError, Result};
use crate::fixed::Fixed;
use crate::firing::RecentFiringRing;
use crate::mapper::LocalId;
use crate::neuron::{integrate, reset_after_fire, sample_noise, NeuronState};
use crate::network::Network;
use crate::queue::IncomingQueue;
use crate::stdp::STDPEngine;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Drives a finalized [`Network`] one millisecond cycle at a time.
pub struct CyclePipeline {
    network: Network,
    states: Vec<NeuronState>,
    firing: RecentFiringRing,
    queue: IncomingQueue,
    stdp: STDPEngine,
    cycle: u64,
    wall_start: Instant,
}

impl CyclePipeline {
    /// Build a pipeline over `network`, starting every neuron at its
    /// configured initial state. Incoming-queue bin capacity is derived
    /// from the network's configured size multiplier.
    pub fn new(network: Network, stdp: STDPEngine) -> Result<Self> {
        let neuron_count = network.neuron_count();
        let states = network.initial_states().to_vec();
        let firing = RecentFiringRing::new(neuron_count);
        let capacity_per_bin = ((neuron_count as f32 * network.config().size_multiplier).ceil()
            as usize)
            .max(1);
        let queue = IncomingQueue::new(network.config().max_delay, capacity_per_bin)?;
        Ok(Self {
            network,
            states,
            firing,
            queue,
            stdp,
            cycle: 0,
            wall_start: Instant::now(),
        })
    }

    /// The network this pipeline is driving.
    pub const fn network(&self) -> &Network {
        &self.network
    }

    /// Current cycle counter (cycles elapsed since construction or the last
    /// `reset_timer`... the cycle counter itself never resets).
    pub const fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Advance the simulation by exactly one millisecond cycle.
    /// `external_firings` are neurons forced to fire this cycle regardless
    /// of their integrated membrane potential (e.g. injected stimuli).
    /// Returns every neuron that fired this cycle, natural or external.
    pub fn step(&mut self, external_firings: &[LocalId]) -> Result<Vec<LocalId>> {
        let neuron_count = self.network.neuron_count() as usize;
        let format = self.network.fcm().format();

        // 1. gather: drain the bin due this cycle and stream each entry's
        // live forward row into a per-neuron current accumulator using
        // saturating fixed-point addition, so the result does not depend on
        // the order spike groups were scattered in. Streaming the row here
        // rather than at scatter time means a weight changed by apply_stdp
        // while a spike is still in flight is picked up by this delivery.
        let mut currents = vec![Fixed::ZERO; neuron_count];
        let due = self.queue.drain_due(self.cycle);
        for group in &due {
            let row = self.network.fcm().get_row(group.source, group.delay)?;
            for terminal in row {
                let idx = terminal.target.index() as usize;
                let (sum, _overflowed) = format.saturating_add(currents[idx], terminal.weight);
                currents[idx] = sum;
            }
        }

        // 2. noise + 3. integrate, per neuron.
        let params = self.network.all_neuron_params();
        let fired_flags: Vec<bool> = {
            #[cfg(feature = "parallel")]
            {
                self.states
                    .par_iter_mut()
                    .zip(params.par_iter())
                    .zip(currents.par_iter())
                    .map(|((state, p), &current)| {
                        let noise = sample_noise(p, state);
                        let drive = format.to_f32(current) + noise;
                        integrate(p, state, drive).fired
                    })
                    .collect()
            }
            #[cfg(not(feature = "parallel"))]
            {
                self.states
                    .iter_mut()
                    .zip(params.iter())
                    .zip(currents.iter())
                    .map(|((state, p), &current)| {
                        let noise = sample_noise(p, state);
                        let drive = format.to_f32(current) + noise;
                        integrate(p, state, drive).fired
                    })
                    .collect()
            }
        };

        // 4. reset neurons that crossed threshold.
        for (i, &fired) in fired_flags.iter().enumerate() {
            if fired {
                reset_after_fire(&params[i], &mut self.states[i]);
            }
        }

        // The observable firing set is natural firing unioned with
        // externally injected firing; external firings do not trigger a
        // membrane reset since the neuron never actually integrated past
        // threshold.
        let mut observed = fired_flags.clone();
        for &ext in external_firings {
            observed[ext.index() as usize] = true;
        }

        // 5. updateHistory.
        for i in 0..neuron_count {
            self.firing.record(LocalId::new(i as u32), fired_flags[i]);
        }
        for &ext in external_firings {
            self.firing.union_external(ext, true);
        }

        // 6. scatter: every observed-fired neuron enqueues one spike-group
        // reference per delay it has synapses for; the terminals themselves
        // are resolved later, at gather time.
        let max_delay = self.network.fcm().max_delay();
        for i in 0..neuron_count {
            if !observed[i] {
                continue;
            }
            let source = LocalId::new(i as u32);
            for delay in 1..=max_delay {
                if self.network.outgoing().partitions_for(source, delay).is_empty() {
                    continue;
                }
                self.queue.schedule(self.cycle, delay, source)?;
            }
        }

        // 7. STDP accumulate: this reads the write buffer (so STDP sees the
        // just-written history), not the read buffer, and must therefore
        // run before the commit below. Every neuron is checked as a
        // potential target, since the post-fire window fires its credit
        // several cycles after the actual post-synaptic spike.
        if self.network.has_plasticity() && self.stdp.is_enabled() {
            for i in 0..neuron_count {
                let target = LocalId::new(i as u32);
                self.stdp
                    .accumulate(target, self.network.rcm_mut(), &self.firing);
            }
        }

        // 8. commit: promote this cycle's firing history and advance time.
        self.firing.commit();
        self.cycle = self
            .cycle
            .checked_add(1)
            .ok_or(NemoError::Overflow)?;

        Ok((0..neuron_count)
            .filter(|&i| observed[i])
            .map(|i| LocalId::new(i as u32))
            .collect())
    }

    /// Apply accumulated STDP deltas, scaled by `reward`, into the forward
    /// matrix's weights, clamping each updated weight into its bound:
    /// `[0, max_weight]` for an excitatory synapse (non-negative weight),
    /// `[min_weight, 0]` for an inhibitory one. Fails with `Unsupported` if
    /// this network has no plastic synapses or no `STDPFunction` was
    /// configured.
    pub fn apply_stdp(&mut self, reward: f32) -> Result<()> {
        if !self.network.has_plasticity() || !self.stdp.is_enabled() {
            return Err(NemoError::unsupported(
                "STDP requires plastic synapses and a configured function",
            ));
        }
        let (min_weight, max_weight) = self
            .stdp
            .weight_bounds()
            .expect("is_enabled() implies a configured function");
        let mut updates = Vec::new();
        self.network.rcm_mut().drain_deltas(|_target, entry| {
            updates.push((entry.source, entry.delay, entry.forward_address, entry.weight_delta));
        });
        let format = self.network.fcm().format();
        for (source, delay, forward_address, delta) in updates {
            let row = self.network.fcm_mut().get_row_mut(source, delay)?;
            if let Some(terminal) = row.get_mut(forward_address) {
                let updated = format.from_f32(format.to_f32(terminal.weight) + delta * reward);
                let (floor, ceiling) = if terminal.weight.raw() >= 0 {
                    (Fixed::ZERO, format.from_f32(max_weight))
                } else {
                    (format.from_f32(min_weight), Fixed::ZERO)
                };
                terminal.weight = format.clamp(updated, floor, ceiling);
            }
        }
        Ok(())
    }

    /// This cycle's recent-firing word for one neuron.
    pub fn read_firing(&self, neuron: LocalId) -> u64 {
        self.firing.read_word(neuron)
    }

    /// Parallel arrays describing every synapse sourced at `source`.
    pub fn synapses_from(&self, source: LocalId) -> Result<(Vec<LocalId>, Vec<u32>, Vec<f32>, Vec<bool>)> {
        self.network.synapses_from(source)
    }

    /// Simulated time elapsed, in milliseconds (one cycle is one
    /// millisecond by construction).
    pub const fn elapsed_simulation_ms(&self) -> u64 {
        self.cycle
    }

    /// Real (wall-clock) time elapsed since construction or the last
    /// `reset_timer`.
    pub fn elapsed_wallclock(&self) -> Duration {
        self.wall_start.elapsed()
    }

    /// Restart the wall-clock timer without touching the cycle counter.
    pub fn reset_timer(&mut self) {
        self.wall_start = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::GlobalId;
    use crate::network::{NetworkBuilder, NetworkConfig};
    use crate::neuron::NeuronParams;
    use crate::stdp::{STDPEngine, STDPFunction};

    fn quiet_params() -> NeuronParams {
        NeuronParams::new(0.02, 0.2, -65.0, 8.0, 0.0).unwrap()
    }

    fn ring(n: u32, delay: u32, weight: f32) -> Network {
        let config = NetworkConfig::new(delay.max(1), 4).unwrap();
        let mut builder = NetworkBuilder::new(config).unwrap();
        let ids: Vec<GlobalId> = (0..n as u64).map(GlobalId::new).collect();
        for &g in &ids {
            builder
                .add_neuron(g, quiet_params(), NeuronState::new(-14.0, -65.0, g.0 + 1))
                .unwrap();
        }
        for i in 0..n as usize {
            builder
                .add_synapse(ids[i], ids[(i + 1) % n as usize], delay, weight, false)
                .unwrap();
        }
        builder.finalize().unwrap()
    }

    #[test]
    fn quiescent_ring_never_fires() {
        let network = ring(4, 1, 5.0);
        let mut pipeline = CyclePipeline::new(network, STDPEngine::disabled()).unwrap();
        for _ in 0..50 {
            let fired = pipeline.step(&[]).unwrap();
            assert!(fired.is_empty());
        }
        assert_eq!(pipeline.elapsed_simulation_ms(), 50);
    }

    #[test]
    fn external_firing_propagates_around_the_ring_with_delay() {
        let network = ring(3, 1, 1000.0);
        let mut pipeline = CyclePipeline::new(network, STDPEngine::disabled()).unwrap();
        let fired0 = pipeline.step(&[LocalId::new(0)]).unwrap();
        assert_eq!(fired0, vec![LocalId::new(0)]);
        // Neuron 0's spike arrives at neuron 1 after one cycle of delay,
        // driving it over threshold on the following step.
        let fired1 = pipeline.step(&[]).unwrap();
        assert_eq!(fired1, vec![LocalId::new(1)]);
    }

    #[test]
    fn repeated_runs_from_the_same_seed_are_identical() {
        let run = |noisy: bool| {
            let config = NetworkConfig::new(1, 4).unwrap();
            let mut builder = NetworkBuilder::new(config).unwrap();
            let sigma = if noisy { 2.0 } else { 0.0 };
            let params = NeuronParams::new(0.02, 0.2, -65.0, 8.0, sigma).unwrap();
            let g = GlobalId::new(0);
            builder
                .add_neuron(g, params, NeuronState::new(-14.0, -65.0, 1234))
                .unwrap();
            let network = builder.finalize().unwrap();
            let mut pipeline = CyclePipeline::new(network, STDPEngine::disabled()).unwrap();
            let mut trace = Vec::new();
            for _ in 0..20 {
                trace.push(pipeline.step(&[]).unwrap());
            }
            trace
        };
        assert_eq!(run(true), run(true));
        assert_eq!(run(false), run(false));
    }

    #[test]
    fn apply_stdp_without_plasticity_is_unsupported() {
        let network = ring(2, 1, 1.0);
        let mut pipeline = CyclePipeline::new(network, STDPEngine::disabled()).unwrap();
        assert!(pipeline.apply_stdp(1.0).is_err());
    }

    #[test]
    fn plastic_synapse_weight_changes_after_apply_stdp() {
        let config = NetworkConfig::new(1, 4).unwrap();
        let mut builder = NetworkBuilder::new(config).unwrap();
        let a = GlobalId::new(0);
        let b = GlobalId::new(1);
        builder
            .add_neuron(a, quiet_params(), NeuronState::new(-14.0, -65.0, 1))
            .unwrap();
        builder
            .add_neuron(b, quiet_params(), NeuronState::new(-14.0, -65.0, 2))
            .unwrap();
        builder.add_synapse(a, b, 1, 2.0, true).unwrap();
        let network = builder.finalize().unwrap();

        let function =
            STDPFunction::from_tables(vec![1.0, 0.5], vec![-1.0, -0.5], -10.0, 10.0);
        let mut pipeline = CyclePipeline::new(network, STDPEngine::new(function)).unwrap();

        // a fires at cycle 0, its spike (delay 1) arrives exactly when b
        // fires at cycle 1 -> dt=0 -> postfire[0]. The post_fire_window is
        // 2 cycles, so two more quiet cycles let the window mature.
        pipeline.step(&[LocalId::new(0)]).unwrap();
        pipeline.step(&[LocalId::new(1)]).unwrap();
        pipeline.step(&[]).unwrap();
        pipeline.step(&[]).unwrap();
        pipeline.apply_stdp(1.0).unwrap();

        let (_, _, weights, _) = pipeline.synapses_from(LocalId::new(0)).unwrap();
        assert!((weights[0] - 1.0).abs() < 1e-2, "expected 2.0 + postfire[0], got {}", weights[0]);
    }
}
