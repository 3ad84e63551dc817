//! Restart behavior against the filesystem backend: reductions short-circuit
//! replay, lost reductions fall back to full replay, and two independent
//! constructions over the same store always agree.

use std::fs::OpenOptions;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use caudex_engine::process::{ConcatProcess, Process};
use caudex_engine::{EngineError, PersistentProcess, StoreBoundProcess};
use caudex_hash::Digest;
use caudex_store::{FsStore, MemStore, StoreReader, StoreWriter};
use tempfile::TempDir;

/// Concat process that counts live event applications, so a test can tell
/// whether rehydration replayed or restored from a reduction.
#[derive(Debug, Default, Clone)]
struct CountingProcess {
    inner: ConcatProcess,
    applied: Arc<AtomicUsize>,
}

impl CountingProcess {
    fn applied(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.applied)
    }
}

impl Process for CountingProcess {
    fn apply_event(&mut self, event: &str) -> anyhow::Result<String> {
        self.applied.fetch_add(1, Ordering::SeqCst);
        self.inner.apply_event(event)
    }

    fn serialized_state(&self) -> anyhow::Result<String> {
        self.inner.serialized_state()
    }

    fn restore_state(&mut self, state: &str) -> anyhow::Result<()> {
        self.inner.restore_state(state)
    }
}

fn seeded_fs_store(root: &TempDir) -> FsStore {
    let store = FsStore::open(root.path()).expect("open store");
    let bound = StoreBoundProcess::open(ConcatProcess::new(), store.clone()).expect("open");
    bound.apply_event("a").expect("apply");
    bound.apply_event("b").expect("apply");
    store
}

#[test]
fn restart_restores_from_the_head_reduction_without_replay() {
    let root = TempDir::new().expect("tempdir");
    let store = seeded_fs_store(&root);
    let before = StoreBoundProcess::open(ConcatProcess::new(), store.clone())
        .expect("open")
        .engine()
        .current_reduction()
        .expect("reduction");

    let process = CountingProcess::default();
    let applied = process.applied();
    let engine =
        PersistentProcess::rehydrate(process, &FsStore::open(root.path()).expect("reopen"))
            .expect("rehydrate");

    assert_eq!(applied.load(Ordering::SeqCst), 0);
    assert_eq!(engine.current_reduction().expect("reduction"), before);
}

#[test]
fn restart_without_reductions_replays_the_whole_chain() {
    let root = TempDir::new().expect("tempdir");
    let store = seeded_fs_store(&root);
    let head = PersistentProcess::rehydrate(ConcatProcess::new(), &store)
        .expect("rehydrate")
        .last_state_hash()
        .expect("head");

    std::fs::remove_dir_all(root.path().join("reductions")).expect("drop reductions");

    let process = CountingProcess::default();
    let applied = process.applied();
    let engine =
        PersistentProcess::rehydrate(process, &FsStore::open(root.path()).expect("reopen"))
            .expect("rehydrate");

    assert_eq!(applied.load(Ordering::SeqCst), 2);
    assert_eq!(engine.last_state_hash().expect("head"), head);
    assert_eq!(engine.serialized_state().expect("state"), "ab");
}

#[test]
fn independent_constructions_agree_on_head_and_state() {
    let store = MemStore::new();
    {
        let bound = StoreBoundProcess::open(ConcatProcess::new(), store.clone()).expect("open");
        bound.apply_events(&["a".into(), "b".into()]).expect("apply");
        bound.set_serialized_state("mid").expect("set state");
        bound.apply_event("c").expect("apply");
    }

    for _ in 0..2 {
        let first = PersistentProcess::rehydrate(ConcatProcess::new(), &store).expect("first");
        let second = PersistentProcess::rehydrate(ConcatProcess::new(), &store).expect("second");
        assert_eq!(
            first.last_state_hash().expect("head"),
            second.last_state_hash().expect("head")
        );
        assert_eq!(
            first.serialized_state().expect("state"),
            second.serialized_state().expect("state")
        );
        assert_eq!(first.serialized_state().expect("state"), "midc");
        // Second pass: same store with every reduction gone.
        store.clear_reductions();
    }
}

#[test]
fn missing_genesis_and_reductions_fail_with_chain_incomplete() {
    let mut store = MemStore::new();
    let sealed =
        caudex_engine::CompositionRecord::events(Digest::of_bytes(b"lost"), vec!["x".into()])
            .seal()
            .expect("seal");
    store.append_record(&sealed.bytes).expect("append");

    match StoreBoundProcess::open(ConcatProcess::new(), store) {
        Err(EngineError::ChainIncomplete(head)) => assert_eq!(head, sealed.hash),
        Ok(_) => panic!("rehydration must fail"),
        Err(other) => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn torn_tail_append_rolls_back_to_the_previous_head() {
    let root = TempDir::new().expect("tempdir");
    let store = seeded_fs_store(&root);
    let records: Vec<Vec<u8>> = store
        .records_rev()
        .expect("records")
        .collect::<Result<_, _>>()
        .expect("iterate");
    let first_hash = Digest::of_bytes(records.last().expect("genesis"));

    // Chop one byte off the log tail, as a crash mid-append would.
    let log_path = root.path().join("records.log");
    let len = std::fs::metadata(&log_path).expect("metadata").len();
    OpenOptions::new()
        .write(true)
        .open(&log_path)
        .expect("open log")
        .set_len(len - 1)
        .expect("truncate");

    let engine = PersistentProcess::rehydrate(
        ConcatProcess::new(),
        &FsStore::open(root.path()).expect("reopen"),
    )
    .expect("rehydrate");
    assert_eq!(engine.last_state_hash().expect("head"), first_hash);
    assert_eq!(engine.serialized_state().expect("state"), "a");
}
