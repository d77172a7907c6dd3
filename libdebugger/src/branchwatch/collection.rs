use std::collections::HashMap;

use libppcisa::{Address, Word};

/// Identity of a branch occurrence shape. Two executions of the same branch
/// instruction that land on different destinations are different keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BranchKey {
    pub origin: Address,
    pub destination: Address,
    pub instruction: Word,
}

impl BranchKey {
    pub const fn new(origin: Address, destination: Address, instruction: Word) -> Self {
        Self {
            origin,
            destination,
            instruction,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HitCounters {
    pub total_hits: usize,
    /// Baseline for "hit since last isolation". While blacklisting, any non-zero
    /// value marks the entry as excluded.
    pub hits_snapshot: usize,
}

impl HitCounters {
    pub fn recent_hits(&self) -> usize {
        self.total_hits.saturating_sub(self.hits_snapshot)
    }

    pub fn is_blacklisted(&self) -> bool {
        self.hits_snapshot != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Partition {
    pub is_virtual: bool,
    pub taken: bool,
}

impl Partition {
    pub const VIRTUAL_TAKEN: Self = Self::new(true, true);
    pub const VIRTUAL_NOT_TAKEN: Self = Self::new(true, false);
    pub const PHYSICAL_TAKEN: Self = Self::new(false, true);
    pub const PHYSICAL_NOT_TAKEN: Self = Self::new(false, false);

    pub const ALL: [Self; 4] = [
        Self::VIRTUAL_TAKEN,
        Self::VIRTUAL_NOT_TAKEN,
        Self::PHYSICAL_TAKEN,
        Self::PHYSICAL_NOT_TAKEN,
    ];

    pub const fn new(is_virtual: bool, taken: bool) -> Self {
        Self { is_virtual, taken }
    }

    const fn index(self) -> usize {
        (!self.is_virtual as usize) << 1 | !self.taken as usize
    }
}

pub type CollectionPartition = HashMap<BranchKey, HitCounters>;

#[derive(Debug, Clone, Default)]
pub struct Collection {
    partitions: [CollectionPartition; 4],
}

impl Collection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hot path. Allocates only the first time a key is seen.
    #[inline]
    pub fn hit(&mut self, partition: Partition, key: BranchKey) {
        let counters = self.partitions[partition.index()].entry(key).or_default();
        counters.total_hits = counters.total_hits.saturating_add(1);
    }

    /// Inserts unless the key already exists. Returns whether it was inserted.
    pub fn try_insert(&mut self, partition: Partition, key: BranchKey, counters: HitCounters) -> bool {
        let map = &mut self.partitions[partition.index()];

        if map.contains_key(&key) {
            return false;
        }

        map.insert(key, counters);
        true
    }

    pub fn get(&self, partition: Partition, key: &BranchKey) -> Option<&HitCounters> {
        self.partitions[partition.index()].get(key)
    }

    pub fn get_mut(&mut self, partition: Partition, key: &BranchKey) -> Option<&mut HitCounters> {
        self.partitions[partition.index()].get_mut(key)
    }

    pub fn partition(&self, partition: Partition) -> &CollectionPartition {
        &self.partitions[partition.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Partition, &BranchKey, &HitCounters)> {
        Partition::ALL.into_iter().flat_map(move |partition| {
            self.partition(partition)
                .iter()
                .map(move |(key, counters)| (partition, key, counters))
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Partition, &BranchKey, &mut HitCounters)> {
        Partition::ALL
            .into_iter()
            .zip(self.partitions.iter_mut())
            .flat_map(|(partition, map)| {
                map.iter_mut()
                    .map(move |(key, counters)| (partition, key, counters))
            })
    }

    pub fn len(&self) -> usize {
        self.partitions.iter().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.iter().all(HashMap::is_empty)
    }

    pub fn clear(&mut self) {
        self.partitions.iter_mut().for_each(HashMap::clear);
    }
}
