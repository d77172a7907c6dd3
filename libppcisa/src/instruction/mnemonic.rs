use std::cmp::Reverse;

use lazy_static::lazy_static;

lazy_static! {
    // Matching is by prefix, so plain "l" also claims "li" and "lis". Longest prefix wins.
    static ref MNEMONIC_PREFIXES: Vec<(&'static str, MnemonicClass)> = {
        let mut table = vec![
            ("b", MnemonicClass::Branch),
            ("dc", MnemonicClass::CacheControl),
            ("ic", MnemonicClass::CacheControl),
            ("cmp", MnemonicClass::Compare),
            ("fcmp", MnemonicClass::Compare),
            ("ps_cmp", MnemonicClass::Compare),
            ("mf", MnemonicClass::FromSpecial),
            ("mt", MnemonicClass::ToSpecial),
            ("mr", MnemonicClass::Move),
            ("fmr", MnemonicClass::Move),
            ("ps_mr", MnemonicClass::Move),
            ("rlwimi", MnemonicClass::PartialUpdate),
            ("inslwi", MnemonicClass::PartialUpdate),
            ("insrwi", MnemonicClass::PartialUpdate),
            ("l", MnemonicClass::Load),
            ("psq_l", MnemonicClass::Load),
            ("st", MnemonicClass::Store),
            ("psq_st", MnemonicClass::Store),
        ];

        table.sort_by_key(|(prefix, _)| Reverse(prefix.len()));
        table
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MnemonicClass {
    Branch,
    CacheControl,
    Compare,

    /// `mf*`: the target register receives a special-purpose register.
    FromSpecial,
    /// `mt*`: a register is copied out to a special-purpose register.
    ToSpecial,

    Move,
    /// Only part of the target register is replaced (bit inserts).
    PartialUpdate,

    Load,
    Store,

    /// Arithmetic, logic and everything else that computes into its target.
    Other,
}

impl MnemonicClass {
    pub fn of(mnemonic: &str) -> Self {
        MNEMONIC_PREFIXES
            .iter()
            .find(|(prefix, _)| mnemonic.starts_with(prefix))
            .map(|(_, class)| *class)
            .unwrap_or(Self::Other)
    }

    pub fn is_load_store(&self) -> bool {
        matches!(self, Self::Load | Self::Store)
    }
}

/// Bytes touched by a memory access, guessed from the mnemonic. Word-sized
/// accesses are the default.
pub fn access_width(mnemonic: &str) -> u32 {
    let op: String = mnemonic.chars().take(4).collect();

    if op.contains('b') {
        1
    } else if op.contains('h') {
        2
    } else if op.contains('d') || op.contains('p') {
        8
    } else {
        4
    }
}
