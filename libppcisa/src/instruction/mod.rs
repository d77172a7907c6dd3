use mnemonic::MnemonicClass;

use crate::{Address, Register};

pub mod mnemonic;


/// Breakdown of one line of disassembly. Derived on demand from the text, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionAttributes {
    pub mnemonic: String,
    pub class: MnemonicClass,

    /// Left-most register operand. For stores this is the value being stored.
    pub target: Option<Register>,
    /// Every other register operand, including address bases and indexes.
    pub sources: Vec<Register>,

    pub memory_target: Option<Address>,
    pub memory_width: u32,

    pub is_load: bool,
    pub is_store: bool,
}

impl InstructionAttributes {
    /// Returns `None` for empty text. Tokens that aren't registers are ignored, so
    /// garbage text just yields attributes without a target.
    pub fn parse(text: &str, memory_target: Option<Address>) -> Option<Self> {
        let mut tokens = tokenize(text);
        let mnemonic = tokens.next()?.to_ascii_lowercase();

        let mut registers = tokens.filter_map(Register::parse);
        let target = registers.next();
        let sources = registers.collect();

        let class = MnemonicClass::of(&mnemonic);

        Some(Self {
            memory_width: mnemonic::access_width(&mnemonic),
            is_load: class == MnemonicClass::Load,
            is_store: class == MnemonicClass::Store,
            mnemonic,
            class,
            target,
            sources,
            memory_target,
        })
    }

    pub fn registers(&self) -> impl Iterator<Item = Register> + '_ {
        self.target.iter().chain(self.sources.iter()).copied()
    }

    /// Every byte address the memory access touches.
    pub fn memory_range(&self) -> impl Iterator<Item = Address> {
        let width = self.memory_target.map_or(0, |_| self.memory_width);
        let base = self.memory_target.unwrap_or(0);

        (0..width).map(move |offset| base.wrapping_add(offset))
    }
}

/// Every register named in a line of disassembly, aliases translated, in order of appearance.
pub fn registers_in(text: &str) -> Vec<Register> {
    tokenize(text).skip(1).filter_map(Register::parse).collect()
}

pub fn mnemonic_of(text: &str) -> Option<&str> {
    tokenize(text).next()
}

fn tokenize(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| c.is_whitespace() || matches!(c, ',' | '(' | ')'))
        .filter(|token| !token.is_empty())
}
