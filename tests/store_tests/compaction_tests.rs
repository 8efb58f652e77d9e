//! Tests for Store::compact
//!
//! These tests verify:
//! - Values are unchanged by compaction
//! - Exactly one record per key survives
//! - Keys shadowed by the active segment are dropped
//! - Both compaction orders keep the newest value
//! - Writes keep working after compaction
//! - Output is written aside and skipped when segment ids run out
//! - A failed commit leaves the original segments in place
//! - A failed install keeps every key readable and is finished later

use std::collections::HashSet;
use std::fs;

use hashkv::compaction::Compactor;
use hashkv::config::CompactionOrder;
use serde_json::json;

use crate::common::{
    records_on_disk, reopen, setup_temp_store, setup_temp_store_with, total_records,
    SMALL_SEGMENT,
};

/// Key 5 written into three consecutive closed segments, then key 0 written
/// into the active segment
fn write_key_five_three_times(store: &hashkv::Store) {
    for round in 0..3i64 {
        store.put(5, json!({"v": round})).unwrap();
        for i in 0..3 {
            let key = round * 3 + i;
            let key = if key >= 5 { key + 1 } else { key };
            store.put(key, json!({"v": round})).unwrap();
        }
    }
    store.put(0, json!({"v": 9})).unwrap();
}

#[test]
fn test_compact_without_closed_segments_is_skipped() {
    let (_temp, store) = setup_temp_store();
    store.put(1, json!(1)).unwrap();

    let stats = store.compact().unwrap();

    assert!(stats.skipped);
    assert_eq!(stats.segments_in, 0);
    assert_eq!(store.get(1).unwrap(), json!(1));
}

#[test]
fn test_compact_keeps_single_record_per_key() {
    let (_temp, store) = setup_temp_store();
    write_key_five_three_times(&store);

    assert_eq!(store.stats().closed_segment_ids, vec![0, 1, 2]);
    assert_eq!(records_on_disk(&store, 5), 3);

    let stats = store.compact().unwrap();

    assert!(!stats.skipped);
    assert_eq!(stats.segments_in, 3);
    assert_eq!(stats.records_in, 12);
    // Key 5 twice and key 0 (shadowed by the active segment) dropped
    assert_eq!(stats.records_out, 9);
    assert_eq!(stats.records_dropped(), 3);
    assert_eq!(stats.bytes_saved(), 30);

    assert_eq!(records_on_disk(&store, 5), 1);
    assert_eq!(store.get(5).unwrap(), json!({"v": 2}));
    assert_eq!(store.get(0).unwrap(), json!({"v": 9}));
}

#[test]
fn test_compact_preserves_all_values() {
    let (_temp, store) = setup_temp_store();
    for round in 0..5 {
        for key in 0..8 {
            store.put(key, json!({"v": round})).unwrap();
        }
    }
    let before: Vec<_> = (0..8).map(|key| store.get(key).unwrap()).collect();

    store.compact().unwrap();

    let after: Vec<_> = (0..8).map(|key| store.get(key).unwrap()).collect();
    assert_eq!(before, after);
}

#[test]
fn test_compact_disk_records_equal_distinct_keys() {
    let (_temp, store) = setup_temp_store();
    for round in 0..6 {
        for key in 0..7 {
            store.put(key, json!({"v": round})).unwrap();
        }
    }

    store.compact().unwrap();

    assert_eq!(total_records(&store), store.len());
    for key in 0..7 {
        assert_eq!(records_on_disk(&store, key), 1);
    }
}

#[test]
fn test_compact_output_respects_bound() {
    let (_temp, store) = setup_temp_store();
    for round in 0..4 {
        for key in 0..9 {
            store.put(key, json!({"v": round})).unwrap();
        }
    }

    store.compact().unwrap();

    let stats = store.stats();
    assert!(stats.closed_segment_ids.iter().all(|&id| id < stats.active_segment_id));
    for id in stats.closed_segment_ids {
        assert!(store.segments().segment_size(id).unwrap() <= SMALL_SEGMENT);
    }
}

#[test]
fn test_compact_removes_retired_segments() {
    let (_temp, store) = setup_temp_store();
    write_key_five_three_times(&store);

    store.compact().unwrap();

    let stats = store.stats();
    let mut on_disk = store.segments().list_segment_ids().unwrap();
    assert_eq!(on_disk.pop(), Some(stats.active_segment_id));
    assert_eq!(on_disk, stats.closed_segment_ids);
    assert!(store.segments().list_compact_ids().unwrap().is_empty());
}

#[test]
fn test_compact_oldest_first_keeps_newest_value() {
    let (_temp, store) = setup_temp_store_with(SMALL_SEGMENT, CompactionOrder::OldestFirst);
    write_key_five_three_times(&store);

    store.compact().unwrap();

    assert_eq!(records_on_disk(&store, 5), 1);
    assert_eq!(store.get(5).unwrap(), json!({"v": 2}));
    assert_eq!(store.get(0).unwrap(), json!({"v": 9}));
}

#[test]
fn test_compact_twice_is_stable() {
    let (_temp, store) = setup_temp_store();
    write_key_five_three_times(&store);

    store.compact().unwrap();
    let layout = store.stats();
    let second = store.compact().unwrap();

    assert_eq!(second.records_dropped(), 0);
    assert_eq!(store.stats().key_count, layout.key_count);
    assert_eq!(store.get(5).unwrap(), json!({"v": 2}));
}

#[test]
fn test_writes_after_compaction() {
    let (_temp, store) = setup_temp_store();
    write_key_five_three_times(&store);
    store.compact().unwrap();

    for key in 0..10 {
        store.put(key, json!({"v": 7})).unwrap();
    }
    store.compact().unwrap();

    for key in 0..10 {
        assert_eq!(store.get(key).unwrap(), json!({"v": 7}));
    }
    assert_eq!(total_records(&store), store.len());
}

// =============================================================================
// Compactor Tests
// =============================================================================

fn closed_tables(store: &hashkv::Store) -> hashkv::index::ClosedTables {
    let segments = store.segments();
    store
        .stats()
        .closed_segment_ids
        .into_iter()
        .map(|id| {
            let scan = segments.scan(id).unwrap();
            let table = scan.records.iter().map(|r| (r.record.key, r.offset)).collect();
            let closed = hashkv::index::ClosedTable {
                size: scan.file_len,
                table,
            };
            (id, std::sync::Arc::new(closed))
        })
        .collect()
}

#[test]
fn test_compactor_skips_when_ids_run_out() {
    let (_temp, store) = setup_temp_store();
    for key in 0..10 {
        store.put(key, json!({"v": key})).unwrap();
    }
    let inputs = closed_tables(&store);
    let compactor = Compactor::new(store.segments(), SMALL_SEGMENT, CompactionOrder::NewestFirst);

    // Eight distinct keys need two output segments
    let output = compactor.write_output(&inputs, &HashSet::new(), 1).unwrap();

    assert!(output.is_none());
    assert!(store.segments().list_compact_ids().unwrap().is_empty());
    assert_eq!(store.get(0).unwrap(), json!({"v": 0}));
}

#[test]
fn test_compactor_writes_output_aside() {
    let (_temp, store) = setup_temp_store();
    write_key_five_three_times(&store);
    let inputs = closed_tables(&store);
    let compactor = Compactor::new(store.segments(), SMALL_SEGMENT, CompactionOrder::NewestFirst);

    let output = compactor
        .write_output(&inputs, &HashSet::from([0]), 3)
        .unwrap()
        .unwrap();

    assert_eq!(output.segment_ids(), vec![0, 1, 2]);
    assert_eq!(store.segments().list_compact_ids().unwrap(), vec![0, 1, 2]);
    // Originals untouched until install
    assert_eq!(records_on_disk(&store, 5), 3);

    compactor.discard();
    assert!(store.segments().list_compact_ids().unwrap().is_empty());
}

// =============================================================================
// Failed Compaction Tests
// =============================================================================

#[test]
fn test_failed_commit_keeps_original_segments() {
    let (temp, store) = setup_temp_store();
    write_key_five_three_times(&store);
    let before: Vec<_> = (0..10).map(|key| store.get(key).unwrap()).collect();

    // The metadata temp file cannot be created over a directory
    let blocker = temp.path().join("closed_index.meta.tmp");
    fs::create_dir(&blocker).unwrap();

    assert!(store.compact().is_err());

    assert_eq!(store.stats().closed_segment_ids, vec![0, 1, 2]);
    assert_eq!(records_on_disk(&store, 5), 3);
    assert!(store.segments().list_compact_ids().unwrap().is_empty());
    for key in 0..10 {
        assert_eq!(store.get(key).unwrap(), before[key as usize]);
    }

    fs::remove_dir(&blocker).unwrap();
    drop(store);

    let store = reopen(&temp);
    for key in 0..10 {
        assert_eq!(store.get(key).unwrap(), before[key as usize]);
    }

    let stats = store.compact().unwrap();
    assert!(!stats.skipped);
    assert_eq!(records_on_disk(&store, 5), 1);
    for key in 0..10 {
        assert_eq!(store.get(key).unwrap(), before[key as usize]);
    }
}

/// Leaves a committed compaction whose third output (id 2) cannot be renamed
/// because a non-empty directory sits at its final path
///
/// Afterwards keys 0..=9 all hold `{"v": 3}`, the closed set is `{0, 1, 2}`
/// and the active segment is 10.
fn compact_with_blocked_install(store: &hashkv::Store) -> std::path::PathBuf {
    for round in 0..3 {
        for key in 0..10 {
            store.put(key, json!({"v": round})).unwrap();
        }
    }
    // Outputs 0 and 1 replace closed 0..=6; ids 2..=6 are freed
    store.compact().unwrap();
    assert_eq!(store.stats().closed_segment_ids, vec![0, 1]);

    for key in 0..10 {
        store.put(key, json!({"v": 3})).unwrap();
    }
    store.put(0, json!({"v": 3})).unwrap();
    assert_eq!(store.stats().closed_segment_ids, vec![0, 1, 7, 8, 9]);
    assert_eq!(store.stats().active_segment_id, 10);

    // Nine survivors need outputs 0, 1 and 2
    let blocker = store.segments().segment_path(2);
    fs::create_dir(&blocker).unwrap();
    fs::write(blocker.join("keep"), b"x").unwrap();

    assert!(store.compact().is_err());
    assert_eq!(store.stats().closed_segment_ids, vec![0, 1, 2]);
    blocker
}

#[test]
fn test_failed_install_keeps_keys_readable() {
    let (_temp, store) = setup_temp_store();
    compact_with_blocked_install(&store);

    assert_eq!(store.segments().list_compact_ids().unwrap(), vec![2]);
    for key in 0..10 {
        assert_eq!(store.get(key).unwrap(), json!({"v": 3}), "key {}", key);
    }
}

#[test]
fn test_failed_install_retried_by_next_compaction() {
    let (_temp, store) = setup_temp_store();
    let blocker = compact_with_blocked_install(&store);

    // Still blocked: the retry fails without touching the data
    assert!(store.compact().is_err());
    assert_eq!(store.get(1).unwrap(), json!({"v": 3}));

    fs::remove_dir_all(&blocker).unwrap();
    let stats = store.compact().unwrap();

    assert!(!stats.skipped);
    assert!(store.segments().list_compact_ids().unwrap().is_empty());
    assert_eq!(store.segments().list_segment_ids().unwrap(), vec![0, 1, 2, 10]);
    for key in 0..10 {
        assert_eq!(store.get(key).unwrap(), json!({"v": 3}), "key {}", key);
    }
    assert_eq!(total_records(&store), 10);
}

#[test]
fn test_failed_install_finished_on_reopen_after_rotation() {
    let (temp, store) = setup_temp_store();
    let blocker = compact_with_blocked_install(&store);

    // Rotations save the closed snapshot while the install is still pending
    for v in 4..9 {
        store.put(0, json!({"v": v})).unwrap();
    }
    assert_eq!(store.stats().closed_segment_ids, vec![0, 1, 2, 10]);
    drop(store);

    fs::remove_dir_all(&blocker).unwrap();
    let store = reopen(&temp);

    assert!(store.recovery_report().compaction_rolled_forward);
    assert!(store.segments().list_compact_ids().unwrap().is_empty());
    assert_eq!(store.get(0).unwrap(), json!({"v": 8}));
    for key in 1..10 {
        assert_eq!(store.get(key).unwrap(), json!({"v": 3}), "key {}", key);
    }
}

#[test]
fn test_failed_install_finished_by_close() {
    let (temp, store) = setup_temp_store();
    let blocker = compact_with_blocked_install(&store);

    fs::remove_dir_all(&blocker).unwrap();
    store.close().unwrap();

    let store = reopen(&temp);
    assert!(!store.recovery_report().compaction_rolled_forward);
    assert_eq!(store.segments().list_segment_ids().unwrap(), vec![0, 1, 2, 10]);
    for key in 0..10 {
        assert_eq!(store.get(key).unwrap(), json!({"v": 3}), "key {}", key);
    }
}
