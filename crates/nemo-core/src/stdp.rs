//! Spike-timing-dependent plasticity: a sampled weight-delta table looked up
//! against recent-firing history with bit tricks instead of timestamp
//! arithmetic.
//!
//! A plastic synapse's weight delta depends on how many cycles separate a
//! presynaptic arrival from the postsynaptic firing it is paired against.
//! Since [`crate::firing::RecentFiringRing`] already encodes "fired k cycles
//! ago" as bit `k` of a 64-bit word, finding the nearest paired spike is a
//! handful of `trailing_zeros`/`leading_zeros` calls away rather than a scan
//! over timestamps.

use crate::connectivity::reverse::ReverseConnectivityMatrix;
use crate::firing::RecentFiringRing;
use crate::mapper::LocalId;

/// Largest combined `prefire.len() + postfire.len()` this engine accepts.
/// One short of the full 64-bit width: bit 0 of an aligned word is never
/// assigned to either side (an arrival landing in the very same cycle as
/// evaluation hasn't had a chance to register yet), so only 63 bit
/// positions are ever addressed by a window lookup.
pub const MAX_COMBINED_WINDOW: u32 = 63;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Pre,
    Post,
}

/// A sampled STDP weight-delta function plus the weight bounds an
/// `applyStdp` flush clamps into. `prefire[i]` is the delta applied when a
/// presynaptic arrival preceded the postsynaptic firing by `i + 1` cycles;
/// `postfire[i]` is the delta applied when the arrival landed `i` cycles
/// at-or-after the postsynaptic firing (so `postfire[0]` is a simultaneous
/// arrival). Table entries may be any sign — a positive entry potentiates,
/// a negative one depresses, and a zero entry is simply skipped over by the
/// window search.
#[derive(Debug, Clone)]
pub struct STDPFunction {
    prefire: Vec<f32>,
    postfire: Vec<f32>,
    pre_fire_window: u32,
    post_fire_window: u32,
    potentiation_mask: u64,
    depression_mask: u64,
    min_weight: f32,
    max_weight: f32,
}

impl STDPFunction {
    /// Build a function from explicit sampled tables and the weight bounds
    /// `applyStdp` clamps into (`min_weight` for inhibitory synapses,
    /// `max_weight` for excitatory ones; every plastic synapse is clamped at
    /// zero on the side matching its own sign). `prefire.len() + postfire.len()`
    /// longer than [`MAX_COMBINED_WINDOW`] is truncated, prefire first.
    pub fn from_tables(
        mut prefire: Vec<f32>,
        mut postfire: Vec<f32>,
        min_weight: f32,
        max_weight: f32,
    ) -> Self {
        if prefire.len() as u32 > MAX_COMBINED_WINDOW {
            prefire.truncate(MAX_COMBINED_WINDOW as usize);
        }
        let remaining = MAX_COMBINED_WINDOW - prefire.len() as u32;
        if postfire.len() as u32 > remaining {
            postfire.truncate(remaining as usize);
        }

        let pre_fire_window = prefire.len() as u32;
        let post_fire_window = postfire.len() as u32;
        let mut potentiation_mask = 0u64;
        let mut depression_mask = 0u64;

        // Post-fire table entry i sits at aligned bit (post_fire_window - i),
        // occupying bits [1, post_fire_window].
        for (i, &v) in postfire.iter().enumerate() {
            let j = post_fire_window - i as u32;
            if v > 0.0 {
                potentiation_mask |= 1u64 << j;
            } else if v < 0.0 {
                depression_mask |= 1u64 << j;
            }
        }
        // Pre-fire table entry i sits at aligned bit (post_fire_window + 1 + i),
        // occupying bits [post_fire_window + 1, post_fire_window + pre_fire_window].
        for (i, &v) in prefire.iter().enumerate() {
            let j = post_fire_window + 1 + i as u32;
            if j < 64 {
                if v > 0.0 {
                    potentiation_mask |= 1u64 << j;
                } else if v < 0.0 {
                    depression_mask |= 1u64 << j;
                }
            }
        }

        Self {
            prefire,
            postfire,
            pre_fire_window,
            post_fire_window,
            potentiation_mask,
            depression_mask,
            min_weight,
            max_weight,
        }
    }

    /// A standard exponential-decay STDP curve, sampled at integer cycle
    /// offsets: `a_plus * exp(-(i+1) / tau_plus)` for the prefire
    /// (potentiating) side and `-a_minus * exp(-i / tau_minus)` for the
    /// postfire (depressing) side, each for `i` in `0..window`.
    pub fn exponential(
        window: u32,
        a_plus: f32,
        tau_plus: f32,
        a_minus: f32,
        tau_minus: f32,
        min_weight: f32,
        max_weight: f32,
    ) -> Self {
        let window = window.min(MAX_COMBINED_WINDOW / 2);
        let prefire: Vec<f32> = (0..window)
            .map(|i| a_plus * (-((i + 1) as f32) / tau_plus).exp())
            .collect();
        let postfire: Vec<f32> = (0..window)
            .map(|i| -a_minus * (-(i as f32) / tau_minus).exp())
            .collect();
        Self::from_tables(prefire, postfire, min_weight, max_weight)
    }

    /// Cycles of separation this function's pre-fire side covers.
    pub const fn pre_fire_window(&self) -> u32 {
        self.pre_fire_window
    }

    /// Cycles of separation this function's post-fire side covers.
    pub const fn post_fire_window(&self) -> u32 {
        self.post_fire_window
    }

    /// The `(min_weight, max_weight)` bounds an `applyStdp` flush clamps
    /// into.
    pub const fn weight_bounds(&self) -> (f32, f32) {
        (self.min_weight, self.max_weight)
    }

    /// Find the nearest live (sign-masked) bit either side of the post-fire
    /// pivot in `aligned`, returning which side won and the table index to
    /// look up. Ties (pre-fire and post-fire candidates equidistant from the
    /// pivot) apply no update, matching a symmetric tie having no preferred
    /// direction.
    fn nearest(&self, aligned: u64) -> Option<(Side, usize)> {
        let live = self.potentiation_mask | self.depression_mask;
        let masked = aligned & live;
        if masked == 0 {
            return None;
        }

        let w = self.post_fire_window;
        let post_region_mask = if w == 0 { 0 } else { ((1u64 << w) - 1) << 1 };
        let post_bits = masked & post_region_mask;
        let post_candidate = if post_bits != 0 {
            let j = 63 - post_bits.leading_zeros();
            Some(w - j)
        } else {
            None
        };

        let pre_start = w + 1;
        let pre_region_mask = if self.pre_fire_window == 0 || pre_start >= 64 {
            0
        } else {
            let width = self.pre_fire_window.min(64 - pre_start);
            ((1u64 << width) - 1) << pre_start
        };
        let pre_bits = masked & pre_region_mask;
        let pre_candidate = if pre_bits != 0 {
            let j = pre_bits.trailing_zeros();
            Some(j - pre_start)
        } else {
            None
        };

        match (post_candidate, pre_candidate) {
            // d_post is already a cycle count from the pivot. d_pre is a
            // table index, one less than its cycle count (prefire[0] means
            // "1 cycle before"), so it needs +1 to compare on equal footing.
            (Some(d_post), Some(d_pre)) => match d_post.cmp(&(d_pre + 1)) {
                std::cmp::Ordering::Less => Some((Side::Post, d_post as usize)),
                std::cmp::Ordering::Greater => Some((Side::Pre, d_pre as usize)),
                std::cmp::Ordering::Equal => None,
            },
            (Some(d), None) => Some((Side::Post, d as usize)),
            (None, Some(d)) => Some((Side::Pre, d as usize)),
            (None, None) => None,
        }
    }

    fn delta_at(&self, side: Side, index: usize) -> Option<f32> {
        match side {
            Side::Post => self.postfire.get(index).copied(),
            Side::Pre => self.prefire.get(index).copied(),
        }
    }
}

/// Applies an [`STDPFunction`] against recent-firing history to accumulate
/// weight deltas into a [`ReverseConnectivityMatrix`]. Holds no per-neuron
/// state itself; all of that lives in the firing ring and the matrix.
#[derive(Debug, Clone)]
pub struct STDPEngine {
    function: Option<STDPFunction>,
}

impl STDPEngine {
    /// Build an engine driven by `function`.
    pub fn new(function: STDPFunction) -> Self {
        Self {
            function: Some(function),
        }
    }

    /// An engine with no configured function. Every accumulate call against
    /// it is a no-op, matching a network that never enabled plasticity.
    pub fn disabled() -> Self {
        Self { function: None }
    }

    /// True if this engine has a function configured.
    pub fn is_enabled(&self) -> bool {
        self.function.is_some()
    }

    /// The `(min_weight, max_weight)` bounds configured on this engine's
    /// function, or `None` if it is disabled.
    pub fn weight_bounds(&self) -> Option<(f32, f32)> {
        self.function.as_ref().map(STDPFunction::weight_bounds)
    }

    /// Evaluate `target` for an STDP credit. Only does anything on the
    /// cycle `target`'s write-buffer firing bit at `post_fire_window` is
    /// set — i.e. the cycle on which `target`'s firing `post_fire_window`
    /// cycles ago has finally accumulated enough surrounding context (both
    /// the arrivals that preceded it and the ones that followed) to be
    /// scored. For each plastic synapse feeding `target`, the presynaptic
    /// neuron's write-buffer word is shifted right by the synapse delay to
    /// align it onto the same cycle frame as `target`'s own history, then
    /// scored against the nearest prefire/postfire table entry.
    pub fn accumulate(
        &self,
        target: LocalId,
        rcm: &mut ReverseConnectivityMatrix,
        firing: &RecentFiringRing,
    ) {
        let Some(function) = &self.function else {
            return;
        };
        let w = function.post_fire_window;
        if w >= 64 || firing.write_word(target) & (1u64 << w) == 0 {
            return;
        }
        let Ok(row) = rcm.row(target) else {
            return;
        };
        let deltas: Vec<(usize, f32)> = row
            .iter()
            .enumerate()
            .filter_map(|(i, entry)| {
                let source_word = firing.write_word(entry.source);
                let aligned = source_word.checked_shr(entry.delay).unwrap_or(0);
                let (side, index) = function.nearest(aligned)?;
                let delta = function.delta_at(side, index)?;
                Some((i, delta))
            })
            .collect();
        for (i, delta) in deltas {
            let _ = rcm.accumulate(target, i, delta);
        }
    }
}
