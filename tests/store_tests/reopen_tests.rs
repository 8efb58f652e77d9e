//! Tests for reopening a Store
//!
//! These tests verify:
//! - Clean close restores state from metadata without replay
//! - An unclean shutdown replays only the active segment
//! - Lost metadata falls back to a full replay
//! - Compacted state survives reopen
//! - A torn final record is dropped on reopen

use std::fs::{self, OpenOptions};
use std::io::Write;

use hashkv::persistence::RecoverySource;
use serde_json::json;

use crate::common::{reopen, setup_temp_store, total_records};

#[test]
fn test_reopen_after_close_uses_metadata() {
    let (temp, store) = setup_temp_store();
    for key in 0..10 {
        store.put(key, json!({"v": key})).unwrap();
    }
    store.close().unwrap();

    let store = reopen(&temp);

    let report = store.recovery_report();
    assert_eq!(report.closed_source, RecoverySource::Metadata);
    assert_eq!(report.active_source, RecoverySource::Metadata);
    assert_eq!(report.records_replayed, 0);
    for key in 0..10 {
        assert_eq!(store.get(key).unwrap(), json!({"v": key}));
    }
}

#[test]
fn test_reopen_without_close_replays_active_segment() {
    let (temp, store) = setup_temp_store();
    for key in 0..10 {
        store.put(key, json!({"v": key})).unwrap();
    }
    drop(store);

    let store = reopen(&temp);

    let report = store.recovery_report();
    assert_eq!(report.closed_source, RecoverySource::Metadata);
    assert_eq!(report.active_source, RecoverySource::Replay);
    assert_eq!(report.records_replayed, 2);
    assert_eq!(store.get(9).unwrap(), json!({"v": 9}));
    assert_eq!(store.len(), 10);
}

#[test]
fn test_reopen_with_lost_metadata_replays_everything() {
    let (temp, store) = setup_temp_store();
    for key in 0..10 {
        store.put(key, json!({"v": key})).unwrap();
    }
    store.close().unwrap();
    fs::remove_file(temp.path().join("closed_index.meta")).unwrap();
    fs::remove_file(temp.path().join("active_index.meta")).unwrap();

    let store = reopen(&temp);

    let report = store.recovery_report();
    assert_eq!(report.closed_source, RecoverySource::Replay);
    assert_eq!(report.records_replayed, 10);
    for key in 0..10 {
        assert_eq!(store.get(key).unwrap(), json!({"v": key}));
    }
}

#[test]
fn test_reopen_continues_active_segment() {
    let (temp, store) = setup_temp_store();
    for key in 0..9 {
        store.put(key, json!({"v": key})).unwrap();
    }
    store.close().unwrap();

    let store = reopen(&temp);
    store.put(9, json!({"v": 9})).unwrap();

    let stats = store.stats();
    assert_eq!(stats.active_segment_id, 2);
    assert_eq!(stats.active_segment_size, 20);
    assert_eq!(store.get(8).unwrap(), json!({"v": 8}));
}

#[test]
fn test_reopen_after_compaction() {
    let (temp, store) = setup_temp_store();
    for round in 0..4 {
        for key in 0..6 {
            store.put(key, json!({"v": round})).unwrap();
        }
    }
    store.compact().unwrap();
    let layout = store.stats();
    drop(store);

    let store = reopen(&temp);

    assert_eq!(store.recovery_report().closed_source, RecoverySource::Metadata);
    assert_eq!(store.stats(), layout);
    for key in 0..6 {
        assert_eq!(store.get(key).unwrap(), json!({"v": 3}));
    }
    assert_eq!(total_records(&store), store.len());
}

#[test]
fn test_reopen_drops_torn_record() {
    let (temp, store) = setup_temp_store();
    for key in 0..6 {
        store.put(key, json!({"v": key})).unwrap();
    }
    drop(store);

    let active = temp.path().join("segs").join("seg1");
    let mut file = OpenOptions::new().append(true).open(&active).unwrap();
    file.write_all(b"6,{\"v\"").unwrap();
    drop(file);

    let store = reopen(&temp);

    assert_eq!(store.recovery_report().torn_bytes_truncated, 6);
    assert_eq!(store.stats().active_segment_size, 20);
    store.put(6, json!({"v": 6})).unwrap();
    assert_eq!(store.get(6).unwrap(), json!({"v": 6}));
    assert_eq!(store.get(5).unwrap(), json!({"v": 5}));
}
