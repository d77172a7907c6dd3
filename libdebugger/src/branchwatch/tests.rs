use std::io::Cursor;

use libppcisa::branch::BranchKind;

use crate::{
    system::{CoreState, CpuThreadGuard},
    testing::ScriptedSystem,
};

use super::{
    collection::{BranchKey, Partition},
    filter::{SelectionFilter, Status},
    selection::Inspection,
    snapshot::SnapshotError,
    BranchSink, BranchWatch, Phase,
};

const BL: u32 = 0x4800_0011;
const BLR: u32 = 0x4E80_0020;
const BEQ: u32 = 0x4182_0008;

fn key(origin: u32, destination: u32, instruction: u32) -> BranchKey {
    BranchKey::new(origin, destination, instruction)
}

#[test]
fn first_hit_creates_entry() {
    let mut watch = BranchWatch::new();
    watch.record_branch(0x8000, 0x8010, BL, true, true);

    assert_eq!(watch.collection_size(), 1);

    let counters = watch
        .counters(Partition::VIRTUAL_TAKEN, &key(0x8000, 0x8010, BL))
        .expect("Entry was not created");
    assert_eq!(counters.total_hits, 1);
    assert_eq!(counters.hits_snapshot, 0);
}

#[test]
fn same_site_in_other_partitions_is_counted_apart() {
    let mut watch = BranchWatch::new();
    watch.record_branch(0x8000, 0x8010, BEQ, true, true);
    watch.record_branch(0x8000, 0x8010, BEQ, true, false);
    watch.record_branch(0x8000, 0x8010, BEQ, false, true);
    watch.record_branch(0x8000, 0x8010, BEQ, true, true);

    assert_eq!(watch.collection_size(), 3);
    assert_eq!(
        watch
            .counters(Partition::VIRTUAL_TAKEN, &key(0x8000, 0x8010, BEQ))
            .map(|counters| counters.total_hits),
        Some(2)
    );
}

#[test]
fn has_executed_starts_reduction() {
    let mut system = ScriptedSystem::new(0);
    let guard = CpuThreadGuard::new(&mut system);

    let mut watch = BranchWatch::new();
    watch.record_branch(0x8000, 0x8010, BL, true, true);
    watch.isolate_has_executed(&guard);

    assert_eq!(watch.phase(), Phase::Reduction);
    assert_eq!(watch.blacklist_size(), 0);
    assert_eq!(watch.selection().len(), 1);
    assert_eq!(watch.selection()[0].key, key(0x8000, 0x8010, BL));
    assert!(watch.selection()[0].is_virtual && watch.selection()[0].taken);
}

#[test]
fn hits_snapshot_never_passes_total_hits() {
    let mut system = ScriptedSystem::new(0);
    let guard = CpuThreadGuard::new(&mut system);

    let mut watch = BranchWatch::new();
    for _ in 0..3 {
        watch.record_branch(0x8000, 0x8010, BL, true, true);
    }
    watch.isolate_has_executed(&guard);
    watch.record_branch(0x8000, 0x8010, BL, true, true);

    for (_, _, counters) in watch.collection().iter() {
        assert!(counters.hits_snapshot <= counters.total_hits);
        assert_eq!(counters.recent_hits(), 1);
    }
}

#[test]
fn blacklist_then_isolate_partitions_collection() {
    let mut system = ScriptedSystem::new(0);
    let guard = CpuThreadGuard::new(&mut system);

    let mut watch = BranchWatch::new();
    watch.record_branch(0x8000, 0x8010, BL, true, true);
    watch.record_branch(0x8100, 0x8110, BL, true, true);
    watch.isolate_not_executed(&guard);

    assert_eq!(watch.phase(), Phase::Blacklist);
    assert_eq!(watch.blacklist_size(), 2);

    // Blacklisted sites stay excluded even when they run again.
    watch.record_branch(0x8000, 0x8010, BL, true, true);
    watch.record_branch(0x8200, 0x8300, BLR, false, true);
    watch.isolate_has_executed(&guard);

    assert_eq!(watch.phase(), Phase::Reduction);
    assert_eq!(watch.selection().len(), 1);
    assert_eq!(watch.selection()[0].key, key(0x8200, 0x8300, BLR));
    assert_eq!(
        watch.selection().len() + watch.blacklist_size(),
        watch.collection_size()
    );
}

#[test]
fn reduction_keeps_matching_entries_only() {
    let mut system = ScriptedSystem::new(0);
    let guard = CpuThreadGuard::new(&mut system);

    let mut watch = BranchWatch::new();
    watch.record_branch(0x8000, 0x8010, BL, true, true);
    watch.record_branch(0x8100, 0x8110, BL, true, true);
    watch.isolate_has_executed(&guard);

    watch.record_branch(0x8000, 0x8010, BL, true, true);
    watch.isolate_has_executed(&guard);
    assert_eq!(watch.selection().len(), 1);
    assert_eq!(watch.selection()[0].key.origin, 0x8000);

    // Nothing ran since, so the survivor counts as "not executed".
    watch.isolate_not_executed(&guard);
    assert_eq!(watch.selection().len(), 1);

    watch.record_branch(0x8000, 0x8010, BL, true, true);
    watch.isolate_not_executed(&guard);
    assert!(watch.selection().is_empty());
    assert_eq!(watch.phase(), Phase::Reduction);
    assert!(!watch.can_save());
}

#[test]
fn update_hits_snapshot_only_in_reduction() {
    let mut system = ScriptedSystem::new(0);
    let guard = CpuThreadGuard::new(&mut system);

    let mut watch = BranchWatch::new();
    watch.record_branch(0x8000, 0x8010, BL, true, true);
    watch.update_hits_snapshot();

    let key = key(0x8000, 0x8010, BL);
    assert_eq!(
        watch.counters(Partition::VIRTUAL_TAKEN, &key).map(|c| c.hits_snapshot),
        Some(0)
    );

    watch.isolate_has_executed(&guard);
    watch.record_branch(0x8000, 0x8010, BL, true, true);
    watch.update_hits_snapshot();

    let counters = watch.counters(Partition::VIRTUAL_TAKEN, &key).copied();
    assert_eq!(counters.map(|c| (c.total_hits, c.hits_snapshot)), Some((2, 2)));
}

#[test]
fn inspection_flags_accumulate_and_clear() {
    let mut system = ScriptedSystem::new(0);
    let guard = CpuThreadGuard::new(&mut system);

    let mut watch = BranchWatch::new();
    watch.record_branch(0x8000, 0x8010, BL, true, true);
    watch.isolate_has_executed(&guard);

    assert!(watch.set_selected_inspected(0, Inspection::SET_ORIGIN_NOP));
    assert!(watch.set_selected_inspected(0, Inspection::SET_DESTIN_BLR));
    assert!(!watch.set_selected_inspected(1, Inspection::SET_ORIGIN_NOP));
    assert_eq!(
        watch.selection()[0].inspection,
        Inspection::SET_ORIGIN_NOP | Inspection::SET_DESTIN_BLR
    );

    watch.clear_selection_inspection();
    let once = watch.selection().to_vec();
    watch.clear_selection_inspection();

    assert_eq!(watch.selection(), once.as_slice());
    assert!(once[0].inspection.is_empty());
}

#[test]
fn was_overwritten_excludes_unchanged_code_while_blacklisting() {
    let mut system = ScriptedSystem::new(0)
        .with_word(0x8000, BL)
        .with_word(0x8100, 0x6000_0000);
    let guard = CpuThreadGuard::new(&mut system);

    let mut watch = BranchWatch::new();
    watch.record_branch(0x8000, 0x8010, BL, true, true);
    watch.record_branch(0x8100, 0x8110, BL, true, true);
    // Unreadable origin.
    watch.record_branch(0x8200, 0x8210, BL, true, true);

    watch.isolate_was_overwritten(&guard);
    assert_eq!(watch.phase(), Phase::Blacklist);
    assert_eq!(watch.blacklist_size(), 1);

    watch.isolate_has_executed(&guard);
    let mut origins: Vec<_> = watch.selection().iter().map(|entry| entry.key.origin).collect();
    origins.sort();
    assert_eq!(origins, [0x8100, 0x8200]);
}

#[test]
fn not_overwritten_drops_patched_code_while_reducing() {
    let mut system = ScriptedSystem::new(0)
        .with_word(0x8000, BL)
        .with_word(0x8100, 0x6000_0000);
    let guard = CpuThreadGuard::new(&mut system);

    let mut watch = BranchWatch::new();
    watch.record_branch(0x8000, 0x8010, BL, true, true);
    watch.record_branch(0x8100, 0x8110, BL, true, true);
    watch.record_branch(0x8200, 0x8210, BL, true, true);
    watch.isolate_has_executed(&guard);

    watch.isolate_not_overwritten(&guard);

    let mut origins: Vec<_> = watch.selection().iter().map(|entry| entry.key.origin).collect();
    origins.sort();
    assert_eq!(origins, [0x8000, 0x8200]);
}

#[test]
fn overwrite_checks_need_an_initialized_core() {
    let mut system = ScriptedSystem::new(0)
        .with_word(0x8000, BL)
        .with_state(CoreState::Uninitialized);
    let guard = CpuThreadGuard::new(&mut system);

    let mut watch = BranchWatch::new();
    watch.record_branch(0x8000, 0x8010, BL, true, true);
    watch.isolate_was_overwritten(&guard);

    assert_eq!(watch.blacklist_size(), 0);
}

#[test]
fn clear_resets_everything() {
    let mut system = ScriptedSystem::new(0);
    let guard = CpuThreadGuard::new(&mut system);

    let mut watch = BranchWatch::new();
    watch.record_branch(0x8000, 0x8010, BL, true, true);
    watch.isolate_not_executed(&guard);
    watch.isolate_has_executed(&guard);
    watch.clear(&guard);

    assert_eq!(watch.collection_size(), 0);
    assert!(watch.selection().is_empty());
    assert_eq!(watch.blacklist_size(), 0);
    assert_eq!(watch.phase(), Phase::Blacklist);
}

#[test]
fn sink_respects_recording_flag() {
    let mut system = ScriptedSystem::new(0);
    let guard = CpuThreadGuard::new(&mut system);

    let mut watch = BranchWatch::new();
    watch.on_branch(0x8000, 0x8010, BL, true, true);
    assert_eq!(watch.collection_size(), 0);

    watch.set_recording_active(&guard, true);
    watch.on_branch(0x8000, 0x8010, BL, true, true);
    assert!(watch.is_recording_active());
    assert_eq!(watch.collection_size(), 1);
}

#[test]
fn save_then_load_gives_same_state() -> anyhow::Result<()> {
    let mut system = ScriptedSystem::new(0);
    let guard = CpuThreadGuard::new(&mut system);

    let mut watch = BranchWatch::new();
    watch.record_branch(0x8000, 0x8010, BL, true, true);
    watch.record_branch(0x8100, 0x8110, BEQ, false, false);
    watch.isolate_not_executed(&guard);
    for origin in [0x8300, 0x8200, 0x8400] {
        watch.record_branch(origin, origin + 0x40, BLR, true, true);
    }
    watch.isolate_has_executed(&guard);
    watch.record_branch(0x8200, 0x8240, BLR, true, true);
    watch.set_selected_inspected(1, Inspection::SET_ORIGIN_SYMBOL_BLR);

    let mut saved = Vec::new();
    watch.save(&guard, &mut saved)?;

    let mut loaded = BranchWatch::new();
    loaded.load(&guard, Cursor::new(saved))?;

    assert_eq!(loaded.phase(), watch.phase());
    assert_eq!(loaded.collection_size(), watch.collection_size());
    assert_eq!(loaded.blacklist_size(), watch.blacklist_size());
    assert_eq!(loaded.selection(), watch.selection());

    for (partition, key, counters) in watch.collection().iter() {
        assert_eq!(loaded.counters(partition, key), Some(counters));
    }

    Ok(())
}

#[test]
fn loading_infers_reduction_from_selected_records() -> anyhow::Result<()> {
    let mut system = ScriptedSystem::new(0);
    let guard = CpuThreadGuard::new(&mut system);

    let mut watch = BranchWatch::new();
    watch.record_branch(0x8000, 0x8010, BL, true, true);
    watch.isolate_has_executed(&guard);
    watch.record_branch(0x8100, 0x8110, BL, true, true);

    let mut saved = Vec::new();
    watch.save(&guard, &mut saved)?;

    let mut loaded = BranchWatch::new();
    loaded.load(&guard, Cursor::new(saved))?;

    assert_eq!(loaded.collection_size(), 2);
    assert_eq!(loaded.selection().len(), 1);
    assert_eq!(loaded.phase(), Phase::Reduction);

    Ok(())
}

#[test]
fn record_lines_use_fixed_layout() -> anyhow::Result<()> {
    let mut system = ScriptedSystem::new(0);
    let guard = CpuThreadGuard::new(&mut system);

    let mut watch = BranchWatch::new();
    watch.record_branch(0x8000_3100, 0x8000_3200, BL, false, true);
    watch.isolate_has_executed(&guard);
    watch.set_selected_inspected(0, Inspection::SET_DESTIN_BLR);

    let mut saved = Vec::new();
    watch.save(&guard, &mut saved)?;

    // taken | selected | SET_DESTIN_BLR << 3
    assert_eq!(String::from_utf8(saved)?, "80003100 80003200 48000011 1 1 16\n");

    Ok(())
}

#[test]
fn empty_reduction_cannot_be_saved() {
    let mut system = ScriptedSystem::new(0);
    let guard = CpuThreadGuard::new(&mut system);

    let mut watch = BranchWatch::new();
    watch.record_branch(0x8000, 0x8010, BL, true, true);
    watch.isolate_has_executed(&guard);
    watch.isolate_not_executed(&guard);
    watch.record_branch(0x8000, 0x8010, BL, true, true);
    watch.isolate_not_executed(&guard);

    let mut saved = Vec::new();
    assert!(matches!(
        watch.save(&guard, &mut saved),
        Err(SnapshotError::NothingToSave)
    ));
    assert!(saved.is_empty());
}

#[test]
fn malformed_lines_end_loading_quietly() -> anyhow::Result<()> {
    let mut system = ScriptedSystem::new(0);
    let guard = CpuThreadGuard::new(&mut system);

    let snapshot = "\
00008000 00008010 48000011 3 0 3
00008000 00008010 48000011 9 9 3

00008100 00008110 48000011 1 1 2
this is not a record
00008200 00008210 48000011 1 0 3
";

    let mut watch = BranchWatch::new();
    watch.record_branch(0x9000, 0x9010, BL, true, true);
    watch.load(&guard, Cursor::new(snapshot))?;

    assert_eq!(watch.collection_size(), 2);
    assert_eq!(watch.blacklist_size(), 1);
    assert_eq!(watch.phase(), Phase::Blacklist);
    assert_eq!(
        watch
            .counters(Partition::VIRTUAL_TAKEN, &key(0x8000, 0x8010, BL))
            .map(|counters| counters.total_hits),
        Some(3)
    );

    Ok(())
}

#[test]
fn unreadable_line_ends_loading_quietly() -> anyhow::Result<()> {
    let mut system = ScriptedSystem::new(0);
    let guard = CpuThreadGuard::new(&mut system);

    let mut snapshot = b"00008000 00008010 48000011 3 0 7\n".to_vec();
    snapshot.extend_from_slice(b"\xff\xfe garbage\n");
    snapshot.extend_from_slice(b"00008100 00008110 48000011 1 0 7\n");

    let mut watch = BranchWatch::new();
    watch.load(&guard, Cursor::new(snapshot))?;

    assert_eq!(watch.collection_size(), 1);
    assert_eq!(watch.selection().len(), 1);
    assert_eq!(watch.phase(), Phase::Reduction);

    Ok(())
}

#[test]
fn counters_ahead_of_their_total_are_malformed() -> anyhow::Result<()> {
    let mut system = ScriptedSystem::new(0);
    let guard = CpuThreadGuard::new(&mut system);

    let snapshot = "\
00008000 00008010 48000011 2 1 3
00008100 00008110 48000011 1 5 3
00008200 00008210 48000011 4 0 3
";

    let mut watch = BranchWatch::new();
    watch.load(&guard, Cursor::new(snapshot))?;

    assert_eq!(watch.collection_size(), 1);
    assert_eq!(watch.blacklist_size(), 1);

    let never_hit = "00008000 00008010 48000011 0 0 3\n";
    watch.load(&guard, Cursor::new(never_hit))?;
    assert_eq!(watch.collection_size(), 0);

    for (_, _, counters) in watch.collection().iter() {
        assert!(counters.hits_snapshot <= counters.total_hits);
    }

    Ok(())
}

#[test]
fn status_line_follows_phase() {
    let mut system = ScriptedSystem::new(0);
    let guard = CpuThreadGuard::new(&mut system);
    let filter = SelectionFilter::new();

    let mut watch = BranchWatch::new();
    watch.record_branch(0x8000, 0x8010, BL, true, true);
    watch.record_branch(0x8100, 0x8110, BEQ, true, false);
    assert_eq!(watch.status(&filter).to_string(), "Candidates: 2");

    watch.isolate_not_executed(&guard);
    watch.record_branch(0x8200, 0x8210, BLR, true, true);
    assert_eq!(
        watch.status(&filter).to_string(),
        "Candidates: 3 | Excluded: 2 | Remaining: 1"
    );

    watch.isolate_has_executed(&guard);
    let only_calls = SelectionFilter::new().with_kinds([BranchKind::Bl]);
    assert_eq!(
        watch.status(&only_calls),
        Status::Reduction {
            candidates: 1,
            filtered: 1
        }
    );

    watch.record_branch(0x8200, 0x8210, BLR, true, true);
    watch.isolate_not_executed(&guard);
    assert_eq!(watch.status(&filter).to_string(), "Zero candidates remaining.");
}

#[test]
fn filter_narrows_what_is_listed() {
    let mut system = ScriptedSystem::new(0);
    let guard = CpuThreadGuard::new(&mut system);

    let mut watch = BranchWatch::new();
    watch.record_branch(0x8000, 0x8010, BL, true, true);
    watch.record_branch(0x8100, 0x8110, BEQ, true, false);
    watch.record_branch(0x9000, 0x8010, BLR, false, true);
    watch.isolate_has_executed(&guard);

    let conditional = SelectionFilter {
        conditional_only: true,
        ..SelectionFilter::new()
    };
    let listed: Vec<_> = watch
        .filtered_selection(&conditional)
        .map(|(_, entry, _)| entry.key.origin)
        .collect();
    assert_eq!(listed, [0x8100]);

    let by_origin = SelectionFilter::new().with_origin_range(Some(0x8080), None);
    assert_eq!(watch.filtered_selection(&by_origin).count(), 2);

    let physical_taken = SelectionFilter {
        physical_only: true,
        taken_only: true,
        ..SelectionFilter::new()
    };
    let listed: Vec<_> = watch
        .filtered_selection(&physical_taken)
        .map(|(_, entry, _)| entry.key.origin)
        .collect();
    assert_eq!(listed, [0x9000]);
}
