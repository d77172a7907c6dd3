use std::fmt::Display;

use crate::Word;

const OPCODE_BC: Word = 16;
const OPCODE_B: Word = 18;
const OPCODE_XL: Word = 19;

const SUBOP_BCLR: Word = 16;
const SUBOP_BCCTR: Word = 528;

// BO = 1z1zz ignores both the condition and the counter.
const BO_ALWAYS_MASK: Word = 0b10100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BranchKind {
    B,
    Bl,
    Bc,
    Bcl,
    Blr,
    Blrl,
    Bclr,
    Bclrl,
    Bctr,
    Bctrl,
    Bcctr,
    Bcctrl,
}

impl BranchKind {
    pub const ALL: [Self; 12] = [
        Self::B,
        Self::Bl,
        Self::Bc,
        Self::Bcl,
        Self::Blr,
        Self::Blrl,
        Self::Bclr,
        Self::Bclrl,
        Self::Bctr,
        Self::Bctrl,
        Self::Bcctr,
        Self::Bcctrl,
    ];

    /// Decodes raw instruction bits. Anything that isn't a branch gives `None`.
    pub fn decode(instruction: Word) -> Option<Self> {
        let opcode = instruction >> 26;
        let link = instruction & 1 != 0;
        let bo = (instruction >> 21) & 0x1F;
        let subop = (instruction >> 1) & 0x3FF;
        let always = bo & BO_ALWAYS_MASK == BO_ALWAYS_MASK;

        let (plain, linked) = match (opcode, subop) {
            (OPCODE_B, _) => (Self::B, Self::Bl),
            (OPCODE_BC, _) => (Self::Bc, Self::Bcl),
            (OPCODE_XL, SUBOP_BCLR) if always => (Self::Blr, Self::Blrl),
            (OPCODE_XL, SUBOP_BCLR) => (Self::Bclr, Self::Bclrl),
            (OPCODE_XL, SUBOP_BCCTR) if always => (Self::Bctr, Self::Bctrl),
            (OPCODE_XL, SUBOP_BCCTR) => (Self::Bcctr, Self::Bcctrl),
            _ => return None,
        };

        Some(if link { linked } else { plain })
    }

    pub fn is_conditional(instruction: Word) -> bool {
        let bo = (instruction >> 21) & 0x1F;

        match Self::decode(instruction) {
            Some(Self::Bc | Self::Bcl) => bo & BO_ALWAYS_MASK != BO_ALWAYS_MASK,
            Some(Self::Bclr | Self::Bclrl | Self::Bcctr | Self::Bcctrl) => true,
            _ => false,
        }
    }

    pub fn saves_link(&self) -> bool {
        matches!(
            self,
            Self::Bl | Self::Bcl | Self::Blrl | Self::Bclrl | Self::Bctrl | Self::Bcctrl
        )
    }
}

impl Display for BranchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::B => "b",
            Self::Bl => "bl",
            Self::Bc => "bc",
            Self::Bcl => "bcl",
            Self::Blr => "blr",
            Self::Blrl => "blrl",
            Self::Bclr => "bclr",
            Self::Bclrl => "bclrl",
            Self::Bctr => "bctr",
            Self::Bctrl => "bctrl",
            Self::Bcctr => "bcctr",
            Self::Bcctrl => "bcctrl",
        })
    }
}

impl std::str::FromStr for BranchKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.to_string() == s)
            .ok_or_else(|| format!("Unknown branch kind '{}'", s))
    }
}
