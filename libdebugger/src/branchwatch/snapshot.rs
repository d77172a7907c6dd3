use std::{
    collections::HashSet,
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
};

use anyhow::Context;
use libppcisa::{Address, Word};
use log::{debug, warn};
use thiserror::Error;

use super::{
    collection::{BranchKey, HitCounters, Partition},
    selection::{Inspection, SelectionEntry},
    BranchWatch, Phase,
};
use crate::system::CpuThreadGuard;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("A reduction with no candidates left can't be saved")]
    NothingToSave,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Packed per-record flags. Stored as a plain integer so the layout never
/// depends on the compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SnapshotMetadata(pub u64);

impl SnapshotMetadata {
    const IS_VIRTUAL_OFFSET: u32 = 0;
    const TAKEN_OFFSET: u32 = 1;
    const IS_SELECTED_OFFSET: u32 = 2;
    const INSPECTION_OFFSET: u32 = 3;
    const INSPECTION_MASK: u64 = 0b1111;

    pub fn new(partition: Partition, is_selected: bool, inspection: Inspection) -> Self {
        Self(
            (partition.is_virtual as u64) << Self::IS_VIRTUAL_OFFSET
                | (partition.taken as u64) << Self::TAKEN_OFFSET
                | (is_selected as u64) << Self::IS_SELECTED_OFFSET
                | (inspection.bits() as u64 & Self::INSPECTION_MASK) << Self::INSPECTION_OFFSET,
        )
    }

    pub fn partition(&self) -> Partition {
        Partition::new(
            self.bit(Self::IS_VIRTUAL_OFFSET),
            self.bit(Self::TAKEN_OFFSET),
        )
    }

    pub fn is_selected(&self) -> bool {
        self.bit(Self::IS_SELECTED_OFFSET)
    }

    pub fn inspection(&self) -> Inspection {
        Inspection::from_bits_truncate(
            ((self.0 >> Self::INSPECTION_OFFSET) & Self::INSPECTION_MASK) as u8,
        )
    }

    fn bit(&self, offset: u32) -> bool {
        (self.0 >> offset) & 1 != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Record {
    key: BranchKey,
    counters: HitCounters,
    metadata: SnapshotMetadata,
}

impl Record {
    fn write_to<W>(&self, writer: &mut W) -> std::io::Result<()>
    where
        W: Write,
    {
        writeln!(
            writer,
            "{:08x} {:08x} {:08x} {} {} {:x}",
            self.key.origin,
            self.key.destination,
            self.key.instruction,
            self.counters.total_hits,
            self.counters.hits_snapshot,
            self.metadata.0,
        )
    }

    fn parse(line: &str) -> Option<Self> {
        let mut fields = line.split_whitespace();

        let origin = Address::from_str_radix(fields.next()?, 16).ok()?;
        let destination = Address::from_str_radix(fields.next()?, 16).ok()?;
        let instruction = Word::from_str_radix(fields.next()?, 16).ok()?;
        let total_hits: usize = fields.next()?.parse().ok()?;
        let hits_snapshot: usize = fields.next()?.parse().ok()?;
        let metadata = u64::from_str_radix(fields.next()?, 16).ok()?;

        if fields.next().is_some() {
            return None;
        }

        // Entries only exist once hit, and the baseline never runs ahead of the total.
        if total_hits == 0 || hits_snapshot > total_hits {
            return None;
        }

        Some(Self {
            key: BranchKey::new(origin, destination, instruction),
            counters: HitCounters {
                total_hits,
                hits_snapshot,
            },
            metadata: SnapshotMetadata(metadata),
        })
    }
}

impl BranchWatch {
    /// Writes one record per collection entry. Selected entries come first, in
    /// selection order, so loading gives the same selection back.
    pub fn save<S, W>(&self, _guard: &CpuThreadGuard<'_, S>, writer: &mut W) -> Result<(), SnapshotError>
    where
        S: ?Sized,
        W: Write,
    {
        if !self.can_save() {
            return Err(SnapshotError::NothingToSave);
        }

        let selected = self.selection.iter().filter_map(|entry| {
            let counters = self.collection.get(entry.partition(), &entry.key)?;
            Some(Record {
                key: entry.key,
                counters: *counters,
                metadata: SnapshotMetadata::new(entry.partition(), true, entry.inspection),
            })
        });

        let selected_keys: HashSet<(Partition, BranchKey)> = self
            .selection
            .iter()
            .map(|entry| (entry.partition(), entry.key))
            .collect();

        let unselected = self
            .collection
            .iter()
            .filter(|(partition, key, _)| !selected_keys.contains(&(*partition, **key)))
            .map(|(partition, key, counters)| Record {
                key: *key,
                counters: *counters,
                metadata: SnapshotMetadata::new(partition, false, Inspection::empty()),
            });

        let mut count = 0usize;
        for record in selected.chain(unselected) {
            record.write_to(writer)?;
            count += 1;
        }

        writer.flush()?;
        debug!("Saved {} branch watch records", count);

        Ok(())
    }

    /// Replaces the current state with the records read from `reader`. Parsing
    /// stops quietly at the first malformed or unreadable line, keeping what was
    /// read before it.
    pub fn load<S, R>(&mut self, guard: &CpuThreadGuard<'_, S>, reader: R) -> Result<(), SnapshotError>
    where
        S: ?Sized,
        R: BufRead,
    {
        self.clear(guard);

        for (number, line) in reader.lines().enumerate() {
            // Unreadable text ends the load like any other malformed record.
            let Ok(line) = line else {
                warn!("Stopped reading branch watch snapshot at unreadable line {}", number + 1);
                break;
            };

            if line.trim().is_empty() {
                continue;
            }

            let Some(record) = Record::parse(&line) else {
                warn!("Stopped reading branch watch snapshot at malformed line {}", number + 1);
                break;
            };

            let partition = record.metadata.partition();

            if !self.collection.try_insert(partition, record.key, record.counters) {
                continue;
            }

            if record.metadata.is_selected() {
                self.selection.push(
                    SelectionEntry::new(partition, record.key)
                        .with_inspection(record.metadata.inspection()),
                );
            } else if record.counters.hits_snapshot != 0 {
                self.blacklist_size += 1;
            }
        }

        if !self.selection.is_empty() {
            self.phase = Phase::Reduction;
        }

        debug!(
            "Loaded {} branch watch records, {} selected",
            self.collection.len(),
            self.selection.len()
        );

        Ok(())
    }

    pub fn save_to_path<S, P>(&self, guard: &CpuThreadGuard<'_, S>, path: P) -> anyhow::Result<()>
    where
        S: ?Sized,
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("Failed to create snapshot '{}'", path.display()))?;

        self.save(guard, &mut BufWriter::new(file))
            .with_context(|| format!("Failed to save snapshot '{}'", path.display()))
    }

    pub fn load_from_path<S, P>(&mut self, guard: &CpuThreadGuard<'_, S>, path: P) -> anyhow::Result<()>
    where
        S: ?Sized,
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open snapshot '{}'", path.display()))?;

        self.load(guard, BufReader::new(file))
            .with_context(|| format!("Failed to load snapshot '{}'", path.display()))
    }
}
