//! Error taxonomy for the simulation core.

use thiserror::Error;

/// Result type for all core operations.
pub type Result<T> = core::result::Result<T, NemoError>;

/// Errors the simulation core can raise.
///
/// Success is represented as `Result::Ok` and has no variant here;
/// everything else maps one-to-one onto a variant so a CLI front-end can
/// translate it into a process exit code.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NemoError {
    /// A caller supplied an out-of-range or already-used identifier,
    /// duplicate insertion, or otherwise malformed argument.
    #[error("invalid input: {reason}")]
    InvalidInput {
        /// Description of what was invalid.
        reason: String,
    },

    /// A bounded buffer (e.g. an incoming-queue bin) could not accept more
    /// entries than it was sized for at finalization.
    #[error("buffer overflow: {reason}")]
    BufferOverflow {
        /// Description of which buffer and by how much.
        reason: String,
    },

    /// A buffer was read past the point it had data for.
    #[error("buffer underflow: {reason}")]
    BufferUnderflow {
        /// Description of the empty read.
        reason: String,
    },

    /// An internal shape/pitch invariant was violated — a defect in the
    /// caller's use of the API (e.g. querying before `finalize()`) rather
    /// than bad data.
    #[error("logic error: {reason}")]
    Logic {
        /// Description of the violated invariant.
        reason: String,
    },

    /// A host allocation failed.
    #[error("allocation error: {reason}")]
    AllocationError {
        /// Description of the failed allocation.
        reason: String,
    },

    /// The requested operation is not supported on this backend/configuration
    /// (e.g. `applyStdp` when no `STDPFunction` was configured).
    #[error("unsupported: {reason}")]
    Unsupported {
        /// Description of what is unsupported and why.
        reason: String,
    },

    /// The simulation's monotonic cycle counter would wrap.
    #[error("cycle counter overflow")]
    Overflow,

    /// A fallback bucket for conditions that do not fit the other variants.
    #[error("unknown error: {reason}")]
    Unknown {
        /// Free-form description.
        reason: String,
    },
}

impl NemoError {
    /// Build an `InvalidInput` error.
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    /// Build a `BufferOverflow` error.
    pub fn buffer_overflow(reason: impl Into<String>) -> Self {
        Self::BufferOverflow {
            reason: reason.into(),
        }
    }

    /// Build a `BufferUnderflow` error.
    pub fn buffer_underflow(reason: impl Into<String>) -> Self {
        Self::BufferUnderflow {
            reason: reason.into(),
        }
    }

    /// Build a `Logic` error.
    pub fn logic(reason: impl Into<String>) -> Self {
        Self::Logic {
            reason: reason.into(),
        }
    }

    /// Build an `Unsupported` error.
    pub fn unsupported(reason: impl Into<String>) -> Self {
        Self::Unsupported {
            reason: reason.into(),
        }
    }

    /// Numeric exit code for a CLI front-end: `OK` (the `Ok` variant of the
    /// caller's `Result`) maps to 0 elsewhere; every `NemoError` variant maps
    /// to a distinct non-zero code.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidInput { .. } => 1,
            Self::BufferOverflow { .. } => 2,
            Self::BufferUnderflow { .. } => 3,
            Self::Logic { .. } => 4,
            Self::AllocationError { .. } => 5,
            Self::Unsupported { .. } => 6,
            Self::Overflow => 7,
            Self::Unknown { .. } => 255,
        }
    }
}
