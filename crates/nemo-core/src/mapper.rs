//! Bijection between dense local neuron indices and sparse user-facing
//! global indices, grouped into fixed-size partitions for cache/kernel
//! locality.

use std::collections::HashMap;

use crate::error::{NemoError, Result};

/// A dense, zero-based local neuron index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LocalId(pub u32);

impl LocalId {
    /// Build a local id from a raw index.
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// The raw index.
    pub const fn index(self) -> u32 {
        self.0
    }

    /// Which fixed-size partition this local index belongs to.
    pub const fn partition(self, partition_size: u32) -> u32 {
        self.0 / partition_size
    }
}

/// A sparse, caller-chosen global neuron index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GlobalId(pub u64);

impl GlobalId {
    /// Build a global id from a raw value.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// Bijective mapping between local and global neuron indices.
///
/// Local indices are assigned densely in insertion order; this is what lets
/// the rest of the core address neurons and FCM/RCM rows with a plain
/// `usize`/`u32` instead of hashing on every access.
#[derive(Debug, Clone, Default)]
pub struct Mapper {
    local_to_global: Vec<GlobalId>,
    global_to_local: HashMap<GlobalId, LocalId>,
    partition_size: u32,
}

impl Mapper {
    /// Create an empty mapper with the given partition size (must be > 0).
    pub fn new(partition_size: u32) -> Result<Self> {
        if partition_size == 0 {
            return Err(NemoError::invalid_input("partition_size must be > 0"));
        }
        Ok(Self {
            local_to_global: Vec::new(),
            global_to_local: HashMap::new(),
            partition_size,
        })
    }

    /// Insert a new global id, assigning it the next dense local index.
    /// Fails if the global id was already inserted.
    pub fn insert(&mut self, global: GlobalId) -> Result<LocalId> {
        if self.global_to_local.contains_key(&global) {
            return Err(NemoError::invalid_input(format!(
                "global id {} already mapped",
                global.0
            )));
        }
        let local = LocalId::new(self.local_to_global.len() as u32);
        self.local_to_global.push(global);
        self.global_to_local.insert(global, local);
        Ok(local)
    }

    /// Number of neurons currently mapped.
    pub fn len(&self) -> usize {
        self.local_to_global.len()
    }

    /// True if no neurons have been mapped yet.
    pub fn is_empty(&self) -> bool {
        self.local_to_global.is_empty()
    }

    /// Resolve a local index to its global id.
    pub fn to_global(&self, local: LocalId) -> Result<GlobalId> {
        self.local_to_global
.get(local.0 as usize)
.copied()
.ok_or_else(|| NemoError::invalid_input(format!("local id {} out of range", local.0)))
    }

    /// Resolve a global id to its local index.
    pub fn to_local(&self, global: GlobalId) -> Result<LocalId> {
        self.global_to_local
.get(&global)
.copied()
.ok_or_else(|| NemoError::invalid_input(format!("unknown global id {}", global.0)))
    }

    /// True if `local` is a currently-valid local index.
    pub fn is_valid_local(&self, local: LocalId) -> bool {
        (local.0 as usize) < self.local_to_global.len()
    }

    /// The configured partition size.
    pub const fn partition_size(&self) -> u32 {
        self.partition_size
    }

    /// Number of partitions needed to cover all mapped neurons.
    pub fn partition_count(&self) -> u32 {
        if self.local_to_global.is_empty() {
            0
        } else {
            ((self.local_to_global.len() as u32) + self.partition_size - 1) / self.partition_size
        }
    }

    /// The contiguous local-index range `[start, end)` for a given partition.
    pub fn partition_range(&self, partition: u32) -> core::ops::Range<u32> {
        let start = partition * self.partition_size;
        let end = (start + self.partition_size).min(self.local_to_global.len() as u32);
        start..end.max(start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_assigns_dense_indices() {
        let mut m = Mapper::new(4).unwrap();
        let a = m.insert(GlobalId::new(100)).unwrap();
        let b = m.insert(GlobalId::new(7)).unwrap();
        assert_eq!(a, LocalId::new(0));
        assert_eq!(b, LocalId::new(1));
        assert_eq!(m.to_global(a).unwrap(), GlobalId::new(100));
        assert_eq!(m.to_local(GlobalId::new(7)).unwrap(), b);
    }

    #[test]
    fn duplicate_global_id_fails() {
        let mut m = Mapper::new(4).unwrap();
        m.insert(GlobalId::new(1)).unwrap();
        assert!(m.insert(GlobalId::new(1)).is_err());
    }

    #[test]
    fn unknown_ids_fail() {
        let m = Mapper::new(4).unwrap();
        assert!(m.to_global(LocalId::new(0)).is_err());
        assert!(m.to_local(GlobalId::new(9)).is_err());
    }

    #[test]
    fn partitions_cover_all_neurons() {
        let mut m = Mapper::new(4).unwrap();
        for i in 0..10u64 {
            m.insert(GlobalId::new(i)).unwrap();
        }
        assert_eq!(m.partition_count(), 3); // 4 + 4 + 2
        assert_eq!(m.partition_range(0), 0..4);
        assert_eq!(m.partition_range(1), 4..8);
        assert_eq!(m.partition_range(2), 8..10);
    }

    #[test]
    fn zero_partition_size_rejected() {
        assert!(Mapper::new(0).is_err());
    }
}
