use std::fmt::Display;

use libppcisa::{branch::BranchKind, Address};

use super::{collection::HitCounters, selection::SelectionEntry, BranchWatch, Phase};

/// Narrows what gets shown without touching the selection itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionFilter {
    pub kinds: Vec<BranchKind>,
    pub virtual_only: bool,
    pub physical_only: bool,
    pub taken_only: bool,
    pub not_taken_only: bool,
    pub conditional_only: bool,
    pub unconditional_only: bool,
    pub origin_min: Option<Address>,
    pub origin_max: Option<Address>,
    pub destination_min: Option<Address>,
    pub destination_max: Option<Address>,
}

impl Default for SelectionFilter {
    fn default() -> Self {
        Self {
            kinds: BranchKind::ALL.to_vec(),
            virtual_only: false,
            physical_only: false,
            taken_only: false,
            not_taken_only: false,
            conditional_only: false,
            unconditional_only: false,
            origin_min: None,
            origin_max: None,
            destination_min: None,
            destination_max: None,
        }
    }
}

impl SelectionFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_kinds<I>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = BranchKind>,
    {
        self.kinds = kinds.into_iter().collect();
        self
    }

    pub fn with_origin_range(mut self, min: Option<Address>, max: Option<Address>) -> Self {
        self.origin_min = min;
        self.origin_max = max;
        self
    }

    pub fn with_destination_range(mut self, min: Option<Address>, max: Option<Address>) -> Self {
        self.destination_min = min;
        self.destination_max = max;
        self
    }

    pub fn matches(&self, entry: &SelectionEntry) -> bool {
        let key = &entry.key;

        // Entries that don't decode as branches are only filtered by the other rules.
        let kind_ok = BranchKind::decode(key.instruction).map_or(true, |kind| self.kinds.contains(&kind));
        let conditional = BranchKind::is_conditional(key.instruction);

        kind_ok
            && !(self.virtual_only && !entry.is_virtual)
            && !(self.physical_only && entry.is_virtual)
            && !(self.taken_only && !entry.taken)
            && !(self.not_taken_only && entry.taken)
            && !(self.conditional_only && !conditional)
            && !(self.unconditional_only && conditional)
            && in_range(key.origin, self.origin_min, self.origin_max)
            && in_range(key.destination, self.destination_min, self.destination_max)
    }
}

fn in_range(address: Address, min: Option<Address>, max: Option<Address>) -> bool {
    min.map_or(true, |min| address >= min) && max.map_or(true, |max| address <= max)
}

/// One-line summary of where the narrowing stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Blacklist {
        candidates: usize,
        excluded: usize,
    },
    Reduction {
        candidates: usize,
        filtered: usize,
    },
}

impl Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::Blacklist {
                candidates,
                excluded: 0,
            } => write!(f, "Candidates: {}", candidates),
            Self::Blacklist {
                candidates,
                excluded,
            } => write!(
                f,
                "Candidates: {} | Excluded: {} | Remaining: {}",
                candidates,
                excluded,
                candidates.saturating_sub(excluded)
            ),
            Self::Reduction { candidates: 0, .. } => f.write_str("Zero candidates remaining."),
            Self::Reduction {
                candidates,
                filtered,
            } => write!(
                f,
                "Candidates: {} | Filtered: {} | Remaining: {}",
                candidates,
                filtered,
                candidates.saturating_sub(filtered)
            ),
        }
    }
}

impl BranchWatch {
    pub fn filtered_selection<'a>(
        &'a self,
        filter: &'a SelectionFilter,
    ) -> impl Iterator<Item = (usize, &'a SelectionEntry, &'a HitCounters)> + 'a {
        self.selection
            .iter()
            .enumerate()
            .filter(|(_, entry)| filter.matches(entry))
            .filter_map(|(index, entry)| {
                let counters = self.collection.get(entry.partition(), &entry.key)?;
                Some((index, entry, counters))
            })
    }

    pub fn status(&self, filter: &SelectionFilter) -> Status {
        match self.phase {
            Phase::Blacklist => Status::Blacklist {
                candidates: self.collection.len(),
                excluded: self.blacklist_size,
            },
            Phase::Reduction => Status::Reduction {
                candidates: self.selection.len(),
                filtered: self.selection.len() - self.filtered_selection(filter).count(),
            },
        }
    }
}
