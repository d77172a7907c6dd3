use libppcisa::{
    instruction::{mnemonic::MnemonicClass, InstructionAttributes},
    Register,
};

use super::{tracked::TrackedSet, Direction, HitType};

/// Which operands of one instruction touch the tracked set.
struct Matches {
    target: Register,
    target_hit: bool,
    source_hit: bool,
    memory_hit: bool,
}

pub(super) fn classify(
    tracked: &mut TrackedSet,
    instruction: &InstructionAttributes,
    first_hit: bool,
    direction: Direction,
) -> HitType {
    if tracked.is_empty() {
        return HitType::Stop;
    }

    let memory_hit =
        instruction.memory_target.is_some() && tracked.overlaps(instruction.memory_range());

    if tracked.registers.is_empty() && !memory_hit {
        return HitType::Skip;
    }

    let Some(target) = instruction.target else {
        return HitType::Skip;
    };

    let matches = Matches {
        target,
        target_hit: tracked.has_register(target),
        source_hit: instruction
            .sources
            .iter()
            .any(|source| tracked.has_register(*source)),
        memory_hit,
    };

    if !matches.target_hit && !matches.source_hit && !matches.memory_hit {
        return HitType::Skip;
    }

    match instruction.class {
        MnemonicClass::FromSpecial => {
            if !matches.target_hit {
                return HitType::Skip;
            }

            if direction == Direction::Backward || !first_hit {
                tracked.remove_register(target);
            }

            return HitType::Overwrite;
        }
        MnemonicClass::ToSpecial => return HitType::Moved,
        MnemonicClass::CacheControl => return HitType::Skip,
        MnemonicClass::Compare => return HitType::Passive,
        class if class.is_load_store() && matches.source_hit && !matches.target_hit => {
            return HitType::Pointer
        }
        _ => {}
    }

    match direction {
        Direction::Forward => forward(tracked, instruction, &matches, first_hit),
        Direction::Backward => backward(tracked, instruction, &matches),
    }
}

/// Execution order. Losing a target on the very first hit is ignored, since the
/// user most likely meant to follow the value from that point on.
fn forward(
    tracked: &mut TrackedSet,
    instruction: &InstructionAttributes,
    matches: &Matches,
    first_hit: bool,
) -> HitType {
    let target = matches.target;

    match instruction.class {
        MnemonicClass::Store => {
            if matches.target_hit {
                if !matches.memory_hit && !first_hit {
                    tracked.add_memory(instruction.memory_range());
                }

                HitType::LoadStore
            } else if matches.memory_hit {
                if !first_hit {
                    tracked.remove_memory(instruction.memory_range());
                }

                HitType::Overwrite
            } else {
                HitType::Skip
            }
        }
        MnemonicClass::Load => {
            if matches.memory_hit {
                tracked.add_register(target);
                HitType::LoadStore
            } else if matches.target_hit {
                if !first_hit {
                    tracked.remove_register(target);
                }

                HitType::Overwrite
            } else {
                HitType::Skip
            }
        }
        MnemonicClass::PartialUpdate => {
            if matches.target_hit {
                HitType::Updated
            } else if matches.source_hit {
                tracked.add_register(target);
                HitType::Active
            } else {
                HitType::Skip
            }
        }
        class => {
            if matches.source_hit {
                tracked.add_register(target);

                if class == MnemonicClass::Move {
                    HitType::Moved
                } else {
                    HitType::Active
                }
            } else if matches.target_hit {
                if !first_hit {
                    tracked.remove_register(target);
                }

                HitType::Overwrite
            } else {
                HitType::Skip
            }
        }
    }
}

/// Reverse execution order: follows a value back to where it came from.
fn backward(
    tracked: &mut TrackedSet,
    instruction: &InstructionAttributes,
    matches: &Matches,
) -> HitType {
    let target = matches.target;

    match instruction.class {
        MnemonicClass::Store => {
            if matches.memory_hit {
                tracked.remove_memory(instruction.memory_range());
                tracked.add_register(target);
                HitType::LoadStore
            } else if matches.target_hit {
                tracked.remove_register(target);
                tracked.add_memory(instruction.memory_range());
                HitType::LoadStore
            } else {
                HitType::Skip
            }
        }
        MnemonicClass::Load => {
            if matches.target_hit {
                tracked.remove_register(target);
                tracked.add_memory(instruction.memory_range());
                HitType::LoadStore
            } else if matches.memory_hit {
                HitType::Passive
            } else {
                HitType::Skip
            }
        }
        class => {
            if !matches.target_hit {
                return if matches.source_hit {
                    HitType::Passive
                } else {
                    HitType::Skip
                };
            }

            if !matches.source_hit {
                tracked.remove_register(target);
            }

            tracked.add_registers(instruction.sources.iter().copied());

            match class {
                MnemonicClass::Move => HitType::Moved,
                MnemonicClass::PartialUpdate => HitType::Updated,
                _ => HitType::Active,
            }
        }
    }
}
