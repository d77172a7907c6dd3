use std::collections::HashMap;

use libppcisa::{Address, Register, Word};

use crate::system::{AddressSpace, CoreState, Cpu, Disassembler, Mmu};

#[derive(Debug, Clone, Default)]
pub struct ScriptedInstruction {
    pub text: String,
    pub memory_target: Option<Address>,
    /// Where the pc goes after stepping. Falls through when unset.
    pub next: Option<Address>,
    /// How many more times `next` is followed. Unlimited when unset.
    pub repeats: Option<usize>,
}

/// Small stand-in for a paused emulator core. Stepping just follows the scripted
/// control flow; nothing is really executed.
#[derive(Debug, Clone)]
pub struct ScriptedSystem {
    pub state: CoreState,
    pub pc: Address,
    pub program: HashMap<Address, ScriptedInstruction>,
    pub words: HashMap<Address, Word>,
    pub registers: HashMap<Register, u64>,
    pub steps: usize,
}

impl ScriptedSystem {
    pub fn new(pc: Address) -> Self {
        Self {
            state: CoreState::Paused,
            pc,
            program: HashMap::new(),
            words: HashMap::new(),
            registers: HashMap::new(),
            steps: 0,
        }
    }

    /// Lays `lines` out one word apart starting at `base`.
    pub fn with_program(mut self, base: Address, lines: &[&str]) -> Self {
        for (index, text) in lines.iter().enumerate() {
            self.program.insert(
                base + 4 * index as Address,
                ScriptedInstruction {
                    text: text.to_string(),
                    ..Default::default()
                },
            );
        }

        self
    }

    pub fn with_memory_target(mut self, address: Address, target: Address) -> Self {
        self.program.entry(address).or_default().memory_target = Some(target);
        self
    }

    /// Jumps back `times` times, then falls through.
    pub fn with_loop(mut self, address: Address, destination: Address, times: usize) -> Self {
        let instruction = self.program.entry(address).or_default();
        instruction.next = Some(destination);
        instruction.repeats = Some(times);
        self
    }

    pub fn with_word(mut self, address: Address, word: Word) -> Self {
        self.words.insert(address, word);
        self
    }

    pub fn with_register(mut self, register: Register, value: u64) -> Self {
        self.registers.insert(register, value);
        self
    }

    pub fn with_state(mut self, state: CoreState) -> Self {
        self.state = state;
        self
    }
}

impl Cpu for ScriptedSystem {
    fn state(&self) -> CoreState {
        self.state
    }

    fn pc(&self) -> Address {
        self.pc
    }

    fn single_step(&mut self) {
        let next = match self.program.get_mut(&self.pc) {
            Some(ScriptedInstruction {
                next: Some(destination),
                repeats: Some(repeats),
                ..
            }) => {
                if *repeats == 0 {
                    None
                } else {
                    *repeats -= 1;
                    Some(*destination)
                }
            }
            Some(instruction) => instruction.next,
            None => None,
        };

        self.pc = next.unwrap_or(self.pc.wrapping_add(4));
        self.steps += 1;
    }

    fn register_value(&self, register: Register) -> Option<u64> {
        Some(self.registers.get(&register).copied().unwrap_or_default())
    }
}

impl Mmu for ScriptedSystem {
    fn try_read_instruction(&self, address: Address, _space: AddressSpace) -> Option<Word> {
        self.words.get(&address).copied()
    }
}

impl Disassembler for ScriptedSystem {
    fn disassemble(&self, address: Address) -> String {
        self.program
            .get(&address)
            .map(|instruction| instruction.text.clone())
            .unwrap_or_else(|| "nop".to_string())
    }

    fn memory_operand_address(&self, _instruction: &str) -> Option<Address> {
        self.program
            .get(&self.pc)
            .and_then(|instruction| instruction.memory_target)
    }
}
