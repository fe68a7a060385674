//! Forward and reverse connectivity matrices, and the outgoing index built
//! from them.

pub mod forward;
pub mod outgoing;
pub mod reverse;

pub use forward::{ForwardConnectivityMatrix, Terminal};
pub use outgoing::OutgoingIndex;
pub use reverse::{ReverseConnectivityMatrix, ReverseEntry};
