use std::fmt::Display;

use collection::{BranchKey, Collection, HitCounters, Partition};
use libppcisa::{Address, Word};
use log::{debug, info, warn};
use selection::{Inspection, Selection, SelectionEntry};

use crate::system::{AddressSpace, CoreState, Cpu, CpuThreadGuard, Mmu};

pub mod collection;
pub mod filter;
pub mod selection;
pub mod snapshot;

#[cfg(test)]
mod tests;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Entries are only tagged in place; there is no candidate list yet.
    #[default]
    Blacklist,
    /// Only the selection is filtered from here on. Left only through `clear`.
    Reduction,
}

impl Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Blacklist => "blacklist",
            Self::Reduction => "reduction",
        })
    }
}

/// Entry point for whatever executes branches. Called on the CPU thread, so
/// implementations must not lock and should not allocate on repeat hits.
pub trait BranchSink {
    fn on_branch(
        &mut self,
        origin: Address,
        destination: Address,
        instruction: Word,
        is_virtual: bool,
        taken: bool,
    );
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OverwriteCheck {
    Was,
    Not,
}

#[derive(Debug, Default)]
pub struct BranchWatch {
    collection: Collection,
    selection: Selection,
    blacklist_size: usize,
    phase: Phase,
    recording_active: bool,
}

impl BranchWatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one executed branch. Never fails.
    #[inline]
    pub fn record_branch(
        &mut self,
        origin: Address,
        destination: Address,
        instruction: Word,
        is_virtual: bool,
        taken: bool,
    ) {
        self.collection.hit(
            Partition::new(is_virtual, taken),
            BranchKey::new(origin, destination, instruction),
        );
    }

    pub fn clear<S>(&mut self, _guard: &CpuThreadGuard<'_, S>)
    where
        S: ?Sized,
    {
        self.reset();
    }

    pub fn set_recording_active<S>(&mut self, _guard: &CpuThreadGuard<'_, S>, active: bool)
    where
        S: ?Sized,
    {
        self.recording_active = active;
    }

    pub fn is_recording_active(&self) -> bool {
        self.recording_active
    }

    pub fn isolate_has_executed<S>(&mut self, _guard: &CpuThreadGuard<'_, S>)
    where
        S: ?Sized,
    {
        match self.phase {
            Phase::Blacklist => {
                self.selection
                    .reserve(self.collection.len().saturating_sub(self.blacklist_size));

                for (partition, key, counters) in self.collection.iter_mut() {
                    if counters.hits_snapshot == 0 {
                        self.selection.push(SelectionEntry::new(partition, *key));
                        counters.hits_snapshot = counters.total_hits;
                    }
                }

                self.phase = Phase::Reduction;
                info!(
                    "Branch watch reduction started with {} candidates",
                    self.selection.len()
                );
            }
            Phase::Reduction => self.reduce(|counters| counters.total_hits != counters.hits_snapshot),
        }
    }

    pub fn isolate_not_executed<S>(&mut self, _guard: &CpuThreadGuard<'_, S>)
    where
        S: ?Sized,
    {
        match self.phase {
            Phase::Blacklist => {
                for (_, _, counters) in self.collection.iter_mut() {
                    if counters.hits_snapshot == 0 {
                        counters.hits_snapshot = counters.total_hits.max(1);
                        self.blacklist_size += 1;
                    }
                }

                debug!("Branch watch blacklist grew to {}", self.blacklist_size);
            }
            Phase::Reduction => self.reduce(|counters| counters.total_hits == counters.hits_snapshot),
        }
    }

    pub fn isolate_was_overwritten<S>(&mut self, guard: &CpuThreadGuard<'_, S>)
    where
        S: Cpu + Mmu + ?Sized,
    {
        self.isolate_overwritten(guard.system(), OverwriteCheck::Was);
    }

    pub fn isolate_not_overwritten<S>(&mut self, guard: &CpuThreadGuard<'_, S>)
    where
        S: Cpu + Mmu + ?Sized,
    {
        self.isolate_overwritten(guard.system(), OverwriteCheck::Not);
    }

    /// Starts a new "recent hits" baseline. Only meaningful in the reduction phase.
    pub fn update_hits_snapshot(&mut self) {
        if self.phase != Phase::Reduction {
            return;
        }

        for entry in &self.selection {
            if let Some(counters) = self.collection.get_mut(entry.partition(), &entry.key) {
                counters.hits_snapshot = counters.total_hits;
            }
        }
    }

    pub fn clear_selection_inspection(&mut self) {
        for entry in &mut self.selection {
            entry.inspection = Inspection::empty();
        }
    }

    /// Returns `false` when `index` is outside the selection.
    pub fn set_selected_inspected(&mut self, index: usize, inspection: Inspection) -> bool {
        match self.selection.get_mut(index) {
            Some(entry) => {
                entry.inspection |= inspection;
                true
            }
            None => false,
        }
    }

    pub fn selection(&self) -> &[SelectionEntry] {
        &self.selection
    }

    pub fn selection_entry(&self, index: usize) -> Option<(&SelectionEntry, &HitCounters)> {
        let entry = self.selection.get(index)?;
        let counters = self.collection.get(entry.partition(), &entry.key)?;
        Some((entry, counters))
    }

    pub fn counters(&self, partition: Partition, key: &BranchKey) -> Option<&HitCounters> {
        self.collection.get(partition, key)
    }

    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    pub fn collection_size(&self) -> usize {
        self.collection.len()
    }

    pub fn blacklist_size(&self) -> usize {
        self.blacklist_size
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// A reduction with nothing left can't be told apart from a fresh blacklist on load.
    pub fn can_save(&self) -> bool {
        !(self.phase == Phase::Reduction && self.selection.is_empty())
    }

    fn reset(&mut self) {
        self.selection.clear();
        self.collection.clear();
        self.phase = Phase::Blacklist;
        self.blacklist_size = 0;
    }

    /// Keeps the selection entries for which `keep` holds and moves their baseline up.
    fn reduce<F>(&mut self, keep: F)
    where
        F: Fn(&HitCounters) -> bool,
    {
        let collection = &mut self.collection;
        let before = self.selection.len();

        self.selection.retain(|entry| {
            let Some(counters) = collection.get_mut(entry.partition(), &entry.key) else {
                return false;
            };

            if !keep(counters) {
                return false;
            }

            counters.hits_snapshot = counters.total_hits;
            true
        });

        debug!(
            "Branch watch selection reduced from {} to {}",
            before,
            self.selection.len()
        );
    }

    fn isolate_overwritten<S>(&mut self, system: &S, check: OverwriteCheck)
    where
        S: Cpu + Mmu + ?Sized,
    {
        if system.state() == CoreState::Uninitialized {
            warn!("Overwrite isolation needs a running core; ignoring");
            return;
        }

        // `true` when the entry is excluded from (or dropped out of) the candidates.
        let excluded = |key: &BranchKey, is_virtual: bool| -> Option<bool> {
            let current = system.try_read_instruction(key.origin, AddressSpace::of(is_virtual))?;
            let unchanged = current == key.instruction;

            Some(match check {
                OverwriteCheck::Was => unchanged,
                OverwriteCheck::Not => !unchanged,
            })
        };

        match self.phase {
            Phase::Blacklist => {
                for (partition, key, counters) in self.collection.iter_mut() {
                    if counters.hits_snapshot != 0 {
                        continue;
                    }

                    if excluded(key, partition.is_virtual) == Some(true) {
                        counters.hits_snapshot = counters.total_hits.max(1);
                        self.blacklist_size += 1;
                    }
                }

                debug!("Branch watch blacklist grew to {}", self.blacklist_size);
            }
            Phase::Reduction => {
                // Unreadable memory keeps its entries.
                self.selection
                    .retain(|entry| excluded(&entry.key, entry.is_virtual) != Some(true));
            }
        }
    }
}

impl BranchSink for BranchWatch {
    #[inline]
    fn on_branch(
        &mut self,
        origin: Address,
        destination: Address,
        instruction: Word,
        is_virtual: bool,
        taken: bool,
    ) {
        if self.recording_active {
            self.record_branch(origin, destination, instruction, is_virtual, taken);
        }
    }
}
