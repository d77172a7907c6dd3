use std::{collections::BTreeSet, fmt::Display};

use libppcisa::{Address, Register, BYTES_PER_WORD};

/// What a trace session is currently following. Memory is tracked per byte.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackedSet {
    pub registers: BTreeSet<Register>,
    pub memory: BTreeSet<Address>,
}

impl TrackedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_register(mut self, register: Register) -> Self {
        self.registers.insert(register);
        self
    }

    pub fn with_memory_word(mut self, address: Address) -> Self {
        self.add_memory((0..BYTES_PER_WORD as Address).map(|offset| address.wrapping_add(offset)));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.registers.is_empty() && self.memory.is_empty()
    }

    pub fn has_register(&self, register: Register) -> bool {
        self.registers.contains(&register)
    }

    pub fn add_register(&mut self, register: Register) {
        self.registers.insert(register);
    }

    pub fn remove_register(&mut self, register: Register) {
        self.registers.remove(&register);
    }

    pub fn add_registers<I>(&mut self, registers: I)
    where
        I: IntoIterator<Item = Register>,
    {
        self.registers.extend(registers);
    }

    pub fn overlaps<I>(&self, bytes: I) -> bool
    where
        I: IntoIterator<Item = Address>,
    {
        bytes.into_iter().any(|byte| self.memory.contains(&byte))
    }

    pub fn add_memory<I>(&mut self, bytes: I)
    where
        I: IntoIterator<Item = Address>,
    {
        self.memory.extend(bytes);
    }

    pub fn remove_memory<I>(&mut self, bytes: I)
    where
        I: IntoIterator<Item = Address>,
    {
        for byte in bytes {
            self.memory.remove(&byte);
        }
    }

    /// Start addresses of the tracked memory, with runs of up to four adjacent
    /// bytes folded into one entry.
    pub fn memory_words(&self) -> Vec<Address> {
        let mut words = Vec::new();
        let mut bytes = self.memory.iter().copied().peekable();

        while let Some(start) = bytes.next() {
            words.push(start);

            for offset in 1..BYTES_PER_WORD as Address {
                if bytes.next_if_eq(&start.wrapping_add(offset)).is_none() {
                    break;
                }
            }
        }

        words
    }
}

impl Display for TrackedSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registers: Vec<_> = self.registers.iter().map(Register::to_string).collect();
        let memory: Vec<_> = self
            .memory_words()
            .into_iter()
            .map(|address| format!("{:#x}", address))
            .collect();

        write!(
            f,
            "Registers: {}\nMemory: {}",
            registers.join(", "),
            memory.join(", ")
        )
    }
}
