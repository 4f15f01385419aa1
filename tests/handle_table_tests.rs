#![allow(clippy::unwrap_used)]

use cftpfs::fs::handles::{HandleTable, OpenIntent};
use cftpfs::fs::staging::StagingDir;
use cftpfs::fs::MAX_HANDLES;

fn write_intent() -> OpenIntent {
    OpenIntent {
        write: true,
        create: false,
        truncate: false,
    }
}

#[test]
fn allocate_creates_an_empty_staging_file() {
    let tmp = tempfile::tempdir().unwrap();
    let staging = StagingDir::create_in(tmp.path()).unwrap();
    let table = HandleTable::new();
    let (fh, handle) = table.allocate(&staging, "/a.txt", write_intent()).unwrap();
    assert!(handle.staging.exists());
    assert_eq!(std::fs::metadata(&handle.staging).unwrap().len(), 0);
    assert_eq!(handle.path, "/a.txt");
    assert_eq!(fh, 0, "first allocation takes the first slot");
}

#[test]
fn release_deletes_staging_and_frees_the_slot() {
    let tmp = tempfile::tempdir().unwrap();
    let staging = StagingDir::create_in(tmp.path()).unwrap();
    let table = HandleTable::new();
    let (fh, handle) = table.allocate(&staging, "/a.txt", write_intent()).unwrap();
    let staging_path = handle.staging.clone();
    drop(handle);

    table.release(fh);
    assert!(!staging_path.exists(), "staging file must be deleted");
    assert!(table.get(fh).is_none(), "slot must be vacant");

    let (reused, _) = table.allocate(&staging, "/b.txt", write_intent()).unwrap();
    assert_eq!(reused, fh, "freed slot must be reusable");
}

#[test]
fn get_of_unknown_or_out_of_range_ids_is_none() {
    let table = HandleTable::new();
    assert!(table.get(0).is_none());
    assert!(table.get(MAX_HANDLES as u64).is_none());
    assert!(table.get(u64::MAX).is_none());
}

#[test]
fn release_of_unknown_or_out_of_range_ids_is_a_noop() {
    let table = HandleTable::new();
    table.release(0);
    table.release(MAX_HANDLES as u64 + 7);
    table.release(u64::MAX);
}

#[test]
fn table_exhaustion_fails_the_next_allocation() {
    let tmp = tempfile::tempdir().unwrap();
    let staging = StagingDir::create_in(tmp.path()).unwrap();
    let table = HandleTable::new();

    let mut handles = Vec::with_capacity(MAX_HANDLES);
    for i in 0..MAX_HANDLES {
        let (fh, _) = table
            .allocate(&staging, &format!("/f{i}"), write_intent())
            .unwrap();
        handles.push(fh);
    }

    assert!(
        table.allocate(&staging, "/overflow", write_intent()).is_err(),
        "allocation past MAX_HANDLES must fail"
    );

    // Freeing any slot makes allocation possible again, at that slot.
    table.release(handles[17]);
    let (fh, _) = table.allocate(&staging, "/again", write_intent()).unwrap();
    assert_eq!(fh, handles[17]);
}

#[test]
fn handle_state_tracks_dirty_and_new_flags() {
    let tmp = tempfile::tempdir().unwrap();
    let staging = StagingDir::create_in(tmp.path()).unwrap();
    let table = HandleTable::new();
    let (_, handle) = table.allocate(&staging, "/a.txt", write_intent()).unwrap();

    {
        let state = handle.state();
        assert!(!state.dirty);
        assert!(!state.is_new);
    }
    handle.state().dirty = true;
    assert!(handle.state().dirty);
}
