use std::{fmt::Display, str::FromStr};

use bitflags::bitflags;
use libppcisa::{instruction::InstructionAttributes, Address, Register};

use output::TraceOutput;
use tracked::TrackedSet;

mod logic;
pub mod output;
pub mod replay;
pub mod session;
pub mod tracked;
pub mod tracer;

#[cfg(test)]
mod tests;

/// How an instruction relates to the tracked values. Ordered by how interesting
/// the hit is, so stop thresholds compare directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HitType {
    Skip,
    /// The tracked value was destroyed.
    Overwrite,
    Moved,
    LoadStore,
    /// A tracked value was used as an address.
    Pointer,
    /// Read without being changed.
    Passive,
    /// Used to compute something new.
    Active,
    /// Partially changed in place.
    Updated,
    /// Nothing is tracked anymore.
    Stop,
}

impl HitType {
    pub const ALL: [Self; 9] = [
        Self::Skip,
        Self::Overwrite,
        Self::Moved,
        Self::LoadStore,
        Self::Pointer,
        Self::Passive,
        Self::Active,
        Self::Updated,
        Self::Stop,
    ];

    pub fn is_hit(&self) -> bool {
        !matches!(self, Self::Skip | Self::Stop)
    }

    pub fn filter_flag(&self) -> HitFilter {
        match self {
            Self::Skip | Self::Stop => HitFilter::empty(),
            Self::Overwrite => HitFilter::OVERWRITE,
            Self::Moved => HitFilter::MOVED,
            Self::LoadStore => HitFilter::LOADSTORE,
            Self::Pointer => HitFilter::POINTER,
            Self::Passive => HitFilter::PASSIVE,
            Self::Active => HitFilter::ACTIVE,
            Self::Updated => HitFilter::UPDATED,
        }
    }
}

impl Display for HitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Skip => "skip",
            Self::Overwrite => "overwrite",
            Self::Moved => "moved",
            Self::LoadStore => "loadstore",
            Self::Pointer => "pointer",
            Self::Passive => "passive",
            Self::Active => "active",
            Self::Updated => "updated",
            Self::Stop => "stop",
        })
    }
}

impl FromStr for HitType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.to_ascii_lowercase();

        Self::ALL
            .into_iter()
            .find(|hit| hit.to_string() == lowered)
            .ok_or_else(|| format!("Unknown hit type '{}'", s))
    }
}

bitflags! {
    /// Which hit types a log replay reports.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct HitFilter: u32 {
        const OVERWRITE = 1 << 0;
        const MOVED = 1 << 1;
        const LOADSTORE = 1 << 2;
        const POINTER = 1 << 3;
        const PASSIVE = 1 << 4;
        const ACTIVE = 1 << 5;
        const UPDATED = 1 << 6;
    }
}

impl Default for HitFilter {
    fn default() -> Self {
        Self::all()
    }
}

impl HitFilter {
    pub fn reports(&self, hit: HitType) -> bool {
        hit.is_hit() && self.contains(hit.filter_flag())
    }
}

impl HitFilter {
    /// Flags a user picking `hit` wants to see. Asking for active hits also
    /// brings in partial updates.
    pub fn selecting(hit: HitType) -> Self {
        match hit {
            HitType::Active => Self::ACTIVE | Self::UPDATED,
            hit => hit.filter_flag(),
        }
    }
}

impl FromIterator<HitType> for HitFilter {
    fn from_iter<T: IntoIterator<Item = HitType>>(iter: T) -> Self {
        iter.into_iter()
            .fold(Self::empty(), |filter, hit| filter | Self::selecting(hit))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

/// Follows values through instructions one at a time, updating what it
/// tracks as the values move.
#[derive(Debug, Clone, Default)]
pub struct CodeTrace {
    tracked: TrackedSet,
}

impl CodeTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tracked(tracked: TrackedSet) -> Self {
        Self { tracked }
    }

    pub fn track_register(&mut self, register: Register) {
        self.tracked.add_register(register);
    }

    /// Tracks the four bytes of the word at `address`.
    pub fn track_memory(&mut self, address: Address) {
        self.tracked = std::mem::take(&mut self.tracked).with_memory_word(address);
    }

    pub fn tracked(&self) -> &TrackedSet {
        &self.tracked
    }

    pub fn into_tracked(self) -> TrackedSet {
        self.tracked
    }

    pub fn classify(&mut self, output: &TraceOutput, first_hit: bool, direction: Direction) -> HitType {
        classify(
            &output.instruction,
            output.memory_target,
            &mut self.tracked,
            first_hit,
            direction,
        )
    }

    /// Like `classify`, also reporting the instruction's registers that were
    /// tracked before or after it.
    pub fn classify_with_registers(
        &mut self,
        output: &TraceOutput,
        first_hit: bool,
        direction: Direction,
    ) -> (HitType, Vec<Register>) {
        if self.tracked.is_empty() {
            return (HitType::Stop, Vec::new());
        }

        let Some(instruction) = output.attributes() else {
            return (HitType::Skip, Vec::new());
        };

        let tracked_before: Vec<Register> = instruction
            .registers()
            .filter(|register| self.tracked.has_register(*register))
            .collect();

        let hit = logic::classify(&mut self.tracked, &instruction, first_hit, direction);

        let mut registers = Vec::new();
        for register in instruction.registers() {
            let involved =
                tracked_before.contains(&register) || self.tracked.has_register(register);

            if involved && !registers.contains(&register) {
                registers.push(register);
            }
        }

        (hit, registers)
    }
}

/// Classifies a single line of disassembly against `tracked`.
pub fn classify(
    instruction: &str,
    memory_target: Option<Address>,
    tracked: &mut TrackedSet,
    first_hit: bool,
    direction: Direction,
) -> HitType {
    if tracked.is_empty() {
        return HitType::Stop;
    }

    match InstructionAttributes::parse(instruction, memory_target) {
        Some(instruction) => logic::classify(tracked, &instruction, first_hit, direction),
        None => HitType::Skip,
    }
}
