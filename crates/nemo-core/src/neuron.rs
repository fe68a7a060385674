//! Izhikevich point-neuron model: parameters, state, per-neuron RNG, and the
//! four-sub-step early-terminating integrator.

use crate::error::{NemoError, Result};

/// Euler sub-step size used by the integrator; four sub-steps per
/// millisecond cycle.
const SUB_STEP: f32 = 0.25;
const SUB_STEPS_PER_CYCLE: u32 = 4;

/// Firing threshold for the Izhikevich model (mV).
const FIRING_THRESHOLD: f32 = 30.0;

/// Immutable per-neuron parameters, fixed after finalization.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NeuronParams {
    /// Recovery time scale.
    pub a: f32,
    /// Sensitivity of recovery to sub-threshold fluctuations.
    pub b: f32,
    /// Post-spike reset value for `v`.
    pub c: f32,
    /// Post-spike increment for `u`.
    pub d: f32,
    /// Thalamic noise standard deviation; 0 disables noise for this neuron.
    pub sigma: f32,
}

impl NeuronParams {
    /// Validate and build a parameter set. `sigma` must be non-negative.
    pub fn new(a: f32, b: f32, c: f32, d: f32, sigma: f32) -> Result<Self> {
        if sigma < 0.0 {
            return Err(NemoError::invalid_input(format!(
                "sigma must be >= 0, got {sigma}"
            )));
        }
        Ok(Self { a, b, c, d, sigma })
    }
}

/// A small, portable, per-neuron PRNG stream (splitmix64), advanced
/// deterministically regardless of thread or worker-pool scheduling. The
/// state is a single scalar, not a full `rand` RNG struct, so that
/// `NeuronState` stays a flat, copyable record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RngState(pub u64);

impl RngState {
    /// Seed a stream. A seed of 0 is remapped away from the fixed point of
    /// splitmix64 at 0 so every neuron actually produces a non-degenerate
    /// stream.
    pub const fn seeded(seed: u64) -> Self {
        Self(if seed == 0 { 0x9E3779B97F4A7C15 } else { seed })
    }

    /// Advance the stream and return the next raw 64-bit output.
    fn next_u64(&mut self) -> u64 {
        self.0 = self.0.wrapping_add(0x9E3779B97F4A7C15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
        z ^ (z >> 31)
    }

    /// Uniform sample in `[0, 1)`.
    fn next_uniform(&mut self) -> f64 {
        // Use the top 53 bits for a full-precision f64 in [0, 1).
        (self.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// One standard-normal sample via the Box-Muller transform.
    pub fn next_gaussian(&mut self) -> f32 {
        let u1 = self.next_uniform().max(f64::MIN_POSITIVE);
        let u2 = self.next_uniform();
        let r = (-2.0 * u1.ln()).sqrt();
        let theta = core::f64::consts::TAU * u2;
        (r * theta.cos()) as f32
    }
}

/// Mutable per-neuron state: membrane potential, recovery variable, and RNG
/// stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NeuronState {
    /// Membrane potential (mV).
    pub v: f32,
    /// Recovery variable.
    pub u: f32,
    /// Per-neuron RNG stream.
    pub rng: RngState,
}

impl NeuronState {
    /// Build an initial state.
    pub const fn new(u: f32, v: f32, rng_seed: u64) -> Self {
        Self {
            v,
            u,
            rng: RngState::seeded(rng_seed),
        }
    }
}

/// Outcome of integrating one neuron for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntegrationResult {
    /// Whether the neuron crossed threshold this cycle (before reset).
    pub fired: bool,
}

/// Integrate one neuron for one millisecond cycle: up to four 0.25ms Euler
/// sub-steps of the Izhikevich ODE, freezing `v`/`u` the sub-step a firing
/// is detected. `input_current` is the already
/// gathered + noise-added drive for this neuron, in float.
///
/// Does not perform the post-fire reset (`v ← c`, `u ← u + d`); that is a
/// separate step so callers can inspect pre-reset
/// state (e.g. for recording) before it happens.
pub fn integrate(params: &NeuronParams, state: &mut NeuronState, input_current: f32) -> IntegrationResult {
    for _ in 0..SUB_STEPS_PER_CYCLE {
        let v = state.v;
        let u = state.u;
        let dv = 0.04 * v * v + 5.0 * v + 140.0 - u + input_current;
        let du = params.a * (params.b * v - u);
        state.v += SUB_STEP * dv;
        state.u += SUB_STEP * du;

        if state.v >= FIRING_THRESHOLD {
            return IntegrationResult { fired: true };
        }
    }
    IntegrationResult { fired: false }
}

/// Apply the post-fire reset.
pub fn reset_after_fire(params: &NeuronParams, state: &mut NeuronState) {
    state.v = params.c;
    state.u += params.d;
}

/// Draw this cycle's thalamic noise contribution for a neuron. Returns 0 without touching the RNG stream when
/// `sigma == 0`, so determinism does not depend on RNG state for
/// noiseless neurons.
pub fn sample_noise(params: &NeuronParams, state: &mut NeuronState) -> f32 {
    if params.sigma == 0.0 {
        0.0
    } else {
        params.sigma * state.rng.next_gaussian()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_params() -> NeuronParams {
        NeuronParams::new(0.02, 0.2, -65.0, 8.0, 0.0).unwrap()
    }

    #[test]
    fn negative_sigma_rejected() {
        assert!(NeuronParams::new(0.02, 0.2, -65.0, 8.0, -1.0).is_err());
    }

    #[test]
    fn zero_sigma_never_touches_rng() {
        let params = quiet_params();
        let mut state = NeuronState::new(-14.0, -65.0, 42);
        let rng_before = state.rng;
        let _ = sample_noise(&params, &mut state);
        assert_eq!(state.rng, rng_before);
    }

    #[test]
    fn nonzero_sigma_advances_rng_and_is_reproducible() {
        let params = NeuronParams::new(0.02, 0.2, -65.0, 8.0, 1.0).unwrap();
        let mut s1 = NeuronState::new(-14.0, -65.0, 7);
        let mut s2 = NeuronState::new(-14.0, -65.0, 7);
        let n1 = sample_noise(&params, &mut s1);
        let n2 = sample_noise(&params, &mut s2);
        assert_eq!(n1, n2);
        assert_ne!(s1.rng, NeuronState::new(-14.0, -65.0, 7).rng);
    }

    #[test]
    fn quiescent_neuron_does_not_fire() {
        let params = quiet_params();
        let mut state = NeuronState::new(-14.0, -70.0, 1);
        let result = integrate(&params, &mut state, 0.0);
        assert!(!result.fired);
    }

    #[test]
    fn strong_current_causes_firing_within_one_cycle() {
        let params = quiet_params();
        let mut state = NeuronState::new(-14.0, -70.0, 1);
        let result = integrate(&params, &mut state, 1000.0);
        assert!(result.fired);
    }

    #[test]
    fn reset_applies_c_and_d() {
        let params = quiet_params();
        let mut state = NeuronState::new(-14.0, 35.0, 1);
        reset_after_fire(&params, &mut state);
        assert_eq!(state.v, params.c);
        assert_eq!(state.u, -14.0 + params.d);
    }

    #[test]
    fn integration_freezes_on_the_firing_substep() {
        // A current just strong enough to cross threshold on the first
        // sub-step; v must not be advanced past that.
        let params = quiet_params();
        let mut state = NeuronState::new(-14.0, 29.9, 1);
        let result = integrate(&params, &mut state, 0.0);
        assert!(result.fired);
        // v stops at whatever the first sub-step produced, not a further one.
        assert!(state.v >= FIRING_THRESHOLD);
    }
}
