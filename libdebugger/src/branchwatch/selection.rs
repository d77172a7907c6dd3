use bitflags::bitflags;

use super::collection::{BranchKey, Partition};

bitflags! {
    /// What the user already did to an entry while inspecting it.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Inspection: u8 {
        const SET_ORIGIN_NOP = 1 << 0;
        const SET_DESTIN_BLR = 1 << 1;
        const SET_ORIGIN_SYMBOL_BLR = 1 << 2;
        const SET_DESTIN_SYMBOL_BLR = 1 << 3;
    }
}

/// One candidate. Refers to its collection entry through the partition and key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionEntry {
    pub key: BranchKey,
    pub is_virtual: bool,
    pub taken: bool,
    pub inspection: Inspection,
}

impl SelectionEntry {
    pub fn new(partition: Partition, key: BranchKey) -> Self {
        Self {
            key,
            is_virtual: partition.is_virtual,
            taken: partition.taken,
            inspection: Inspection::empty(),
        }
    }

    pub fn with_inspection(mut self, inspection: Inspection) -> Self {
        self.inspection = inspection;
        self
    }

    pub fn partition(&self) -> Partition {
        Partition::new(self.is_virtual, self.taken)
    }
}

pub type Selection = Vec<SelectionEntry>;
