use std::{
    fmt::Display,
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
    str::FromStr,
};

use anyhow::Context;
use libppcisa::{
    instruction::{mnemonic::MnemonicClass, mnemonic_of, registers_in, InstructionAttributes},
    Address, Register,
};
use log::debug;
use thiserror::Error;

use crate::system::{Cpu, Disassembler};

const NO_MEMORY_TARGET: &str = "-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterValue {
    pub register: Register,
    pub value: u64,
}

/// One executed instruction as seen right before it ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceOutput {
    pub address: Address,
    pub instruction: String,
    pub memory_target: Option<Address>,
    pub regdata: Vec<RegisterValue>,
}

impl TraceOutput {
    pub fn new<T>(address: Address, instruction: T) -> Self
    where
        T: Into<String>,
    {
        Self {
            address,
            instruction: instruction.into(),
            memory_target: None,
            regdata: Vec::new(),
        }
    }

    pub fn with_memory_target(mut self, memory_target: Address) -> Self {
        self.memory_target = Some(memory_target);
        self
    }

    /// Snapshots the instruction at the current pc, its memory operand and the
    /// values of every register it names.
    pub fn capture<S>(system: &S) -> Self
    where
        S: Cpu + Disassembler + ?Sized,
    {
        let address = system.pc();
        let instruction = system.disassemble(address);

        let memory_target = mnemonic_of(&instruction)
            .map(|mnemonic| MnemonicClass::of(&mnemonic.to_ascii_lowercase()))
            .filter(MnemonicClass::is_load_store)
            .and_then(|_| system.memory_operand_address(&instruction));

        let mut registers = registers_in(&instruction);
        registers.sort();
        registers.dedup();

        let regdata = registers
            .into_iter()
            .filter_map(|register| {
                Some(RegisterValue {
                    register,
                    value: system.register_value(register)?,
                })
            })
            .collect();

        Self {
            address,
            instruction,
            memory_target,
            regdata,
        }
    }

    pub fn attributes(&self) -> Option<InstructionAttributes> {
        InstructionAttributes::parse(&self.instruction, self.memory_target)
    }
}

impl Display for TraceOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:08x} ", self.address)?;

        match self.memory_target {
            Some(target) => write!(f, "{:08x}", target)?,
            None => f.write_str(NO_MEMORY_TARGET)?,
        }

        write!(f, " {}", self.instruction)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TraceLineError {
    #[error("Missing {0}")]
    Missing(&'static str),

    #[error("Bad hex value '{0}'")]
    BadHex(String),
}

impl FromStr for TraceOutput {
    type Err = TraceLineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (address, rest) = s
            .trim_start()
            .split_once(' ')
            .ok_or(TraceLineError::Missing("memory target"))?;
        let (memory_target, instruction) = rest
            .trim_start()
            .split_once(' ')
            .ok_or(TraceLineError::Missing("instruction"))?;

        let parse_hex = |text: &str| {
            Address::from_str_radix(text, 16).map_err(|_| TraceLineError::BadHex(text.to_string()))
        };

        let memory_target = match memory_target {
            NO_MEMORY_TARGET => None,
            target => Some(parse_hex(target)?),
        };

        Ok(Self {
            address: parse_hex(address)?,
            instruction: instruction.trim().to_string(),
            memory_target,
            regdata: Vec::new(),
        })
    }
}

#[derive(Debug, Error)]
pub enum TraceLogError {
    #[error("Line {line}: {source}")]
    Malformed {
        line: usize,
        #[source]
        source: TraceLineError,
    },

    #[error("Log holds more than {0} instructions")]
    Overflow(usize),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Bounded, append-only record of executed instructions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceLog {
    entries: Vec<TraceOutput>,
    capacity: usize,
}

impl TraceLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity,
        }
    }

    /// Allocates the whole log up front so recording doesn't reallocate.
    pub fn reserve(&mut self) {
        self.entries
            .reserve(self.capacity.saturating_sub(self.entries.len()));
    }

    /// Returns `false` and drops `output` once the log is full.
    pub fn push(&mut self, output: TraceOutput) -> bool {
        if self.is_full() {
            return false;
        }

        self.entries.push(output);
        true
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn get(&self, index: usize) -> Option<&TraceOutput> {
        self.entries.get(index)
    }

    pub fn entries(&self) -> &[TraceOutput] {
        &self.entries
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &TraceOutput> {
        self.entries.iter()
    }

    pub fn find_first(&self, address: Address) -> Option<usize> {
        self.entries.iter().position(|output| output.address == address)
    }

    pub fn find_last(&self, address: Address) -> Option<usize> {
        self.entries.iter().rposition(|output| output.address == address)
    }

    pub fn write_to<W>(&self, writer: &mut W) -> std::io::Result<()>
    where
        W: Write,
    {
        for output in &self.entries {
            writeln!(writer, "{}", output)?;
        }

        writer.flush()
    }

    pub fn read_from<R>(reader: R, capacity: usize) -> Result<Self, TraceLogError>
    where
        R: BufRead,
    {
        let mut log = Self::new(capacity);

        for (number, line) in reader.lines().enumerate() {
            let line = line?;

            if line.trim().is_empty() {
                continue;
            }

            let output = line.parse().map_err(|source| TraceLogError::Malformed {
                line: number + 1,
                source,
            })?;

            if !log.push(output) {
                return Err(TraceLogError::Overflow(capacity));
            }
        }

        debug!("Read {} trace log lines", log.len());
        Ok(log)
    }

    pub fn write_to_path<P>(&self, path: P) -> anyhow::Result<()>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("Failed to create trace log '{}'", path.display()))?;

        self.write_to(&mut BufWriter::new(file))
            .with_context(|| format!("Failed to write trace log '{}'", path.display()))
    }

    pub fn read_from_path<P>(path: P, capacity: usize) -> anyhow::Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open trace log '{}'", path.display()))?;

        Self::read_from(BufReader::new(file), capacity)
            .with_context(|| format!("Failed to read trace log '{}'", path.display()))
    }
}

impl std::ops::Index<usize> for TraceLog {
    type Output = TraceOutput;

    fn index(&self, index: usize) -> &Self::Output {
        &self.entries[index]
    }
}
