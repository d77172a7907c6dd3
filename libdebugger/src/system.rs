use libppcisa::{Address, Register, Word};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreState {
    Uninitialized,
    Paused,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressSpace {
    Virtual,
    Physical,
}

impl AddressSpace {
    pub fn of(is_virtual: bool) -> Self {
        if is_virtual {
            Self::Virtual
        } else {
            Self::Physical
        }
    }
}

pub trait Cpu {
    fn state(&self) -> CoreState;

    fn pc(&self) -> Address;

    /// Executes exactly one instruction. Only meaningful while paused.
    fn single_step(&mut self);

    /// Raw register contents. FPRs and paired singles report the bits of ps0.
    fn register_value(&self, register: Register) -> Option<u64>;

    fn is_stepping(&self) -> bool {
        self.state() == CoreState::Paused
    }
}

pub trait Mmu {
    fn try_read_instruction(&self, address: Address, space: AddressSpace) -> Option<Word>;
}

pub trait Disassembler {
    fn disassemble(&self, address: Address) -> String;

    /// Effective address of the memory operand in `instruction`, evaluated against the
    /// current register state.
    fn memory_operand_address(&self, instruction: &str) -> Option<Address>;
}

pub trait System: Cpu + Mmu + Disassembler {}

impl<T> System for T where T: Cpu + Mmu + Disassembler + ?Sized {}

/// Proof that the CPU thread is paused and the holder has exclusive access to it.
/// Nothing in this crate locks; every operation borrows one of these instead.
pub struct CpuThreadGuard<'a, S>
where
    S: ?Sized,
{
    system: &'a mut S,
}

impl<'a, S> CpuThreadGuard<'a, S>
where
    S: ?Sized,
{
    pub fn new(system: &'a mut S) -> Self {
        Self { system }
    }

    pub fn system(&self) -> &S {
        &*self.system
    }

    pub fn system_mut(&mut self) -> &mut S {
        &mut *self.system
    }
}
