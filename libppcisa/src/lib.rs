pub mod branch;
pub mod instruction;
pub mod register;

pub use register::Register;

pub type Word = u32;
pub type Address = u32;

pub const BYTES_PER_WORD: usize = 4;

/// Big-endian, like the Gekko bus.
pub fn word_to_bytes(word: Word) -> [u8; BYTES_PER_WORD] {
    word.to_be_bytes()
}

pub fn bytes_to_word(bytes: [u8; BYTES_PER_WORD]) -> Word {
    Word::from_be_bytes(bytes)
}
