use libdebugger::{
    branchwatch::{collection::HitCounters, selection::SelectionEntry},
    codetrace::{output::TraceOutput, replay::TraceResult},
};
use libppcisa::{branch::BranchKind, Address, Register};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Bad address '{0}', expected up to 8 hex digits")]
    BadAddress(String),
}

/// Accepts hex with or without a `0x` prefix.
pub fn parse_address(arg: &str) -> Result<Address, CommandError> {
    let digits = arg
        .strip_prefix("0x")
        .or_else(|| arg.strip_prefix("0X"))
        .unwrap_or(arg);

    Address::from_str_radix(digits, 16).map_err(|_| CommandError::BadAddress(arg.to_string()))
}

pub fn format_candidate(index: usize, entry: &SelectionEntry, counters: &HitCounters) -> String {
    let kind = BranchKind::decode(entry.key.instruction)
        .map(|kind| kind.to_string())
        .unwrap_or_else(|| "?".to_string());

    format!(
        "{:>5}  {:08x} -> {:08x}  {:08x} {:<7} {:<9} {:<8} {:>10} {:>8}",
        index,
        entry.key.origin,
        entry.key.destination,
        entry.key.instruction,
        kind,
        if entry.taken { "taken" } else { "not taken" },
        if entry.is_virtual { "virtual" } else { "physical" },
        counters.total_hits,
        counters.recent_hits(),
    )
}

pub fn format_hit(result: &TraceResult, output: &TraceOutput) -> String {
    let registers: Vec<_> = result.registers.iter().map(Register::to_string).collect();
    let memory = output
        .memory_target
        .map(|target| format!("{:08x}", target))
        .unwrap_or_default();

    format!(
        "#{:<6} {:08x}  {:<9} {:<28} {:<8} {}",
        result.index + 1,
        output.address,
        result.hit,
        output.instruction,
        memory,
        registers.join(", "),
    )
}
