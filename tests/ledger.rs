use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use assert_matches::assert_matches;

use snp_genotype_resolver::error::ResolverError;
use snp_genotype_resolver::temp::TempLedger;

fn counting(ledger: &TempLedger, counter: &Arc<AtomicUsize>, name: &str) {
    let seen = Arc::clone(counter);
    ledger.register(PathBuf::from(name), move || {
        seen.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
}

#[test]
fn release_all_runs_each_action_once_after_failed_acquire() {
    let root = tempfile::tempdir().unwrap();
    let missing_root = root.path().join("does-not-exist");
    let ledger = TempLedger::new(Some(missing_root));
    let counter = Arc::new(AtomicUsize::new(0));

    counting(&ledger, &counter, "first");
    counting(&ledger, &counter, "second");
    let err = ledger.acquire().unwrap_err();
    assert_matches!(err, ResolverError::Filesystem(_));

    assert_eq!(ledger.release_all().unwrap(), 2);
    assert_eq!(counter.load(Ordering::SeqCst), 2);
    assert_eq!(ledger.release_all().unwrap(), 0);
    assert_eq!(counter.load(Ordering::SeqCst), 2);

    drop(ledger);
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[test]
fn release_all_removes_acquired_directories() {
    let root = tempfile::tempdir().unwrap();
    let ledger = TempLedger::new(Some(root.path().to_path_buf()));
    let first = ledger.acquire().unwrap();
    let second = ledger.acquire().unwrap();
    std::fs::write(first.path().join("data.txt"), b"x").unwrap();
    assert_ne!(first.path(), second.path());
    assert_eq!(ledger.len(), 2);

    assert_eq!(ledger.release_all().unwrap(), 2);
    assert!(!first.path().exists());
    assert!(!second.path().exists());
    assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
}

#[test]
fn single_release_leaves_other_handles() {
    let root = tempfile::tempdir().unwrap();
    let ledger = TempLedger::new(Some(root.path().to_path_buf()));
    let first = ledger.acquire().unwrap();
    let second = ledger.acquire().unwrap();

    assert!(ledger.release(&first).unwrap());
    assert!(!first.path().exists());
    assert!(second.path().exists());
    assert_eq!(ledger.release_all().unwrap(), 1);
}

#[test]
fn separate_ledgers_do_not_release_each_other() {
    let root = tempfile::tempdir().unwrap();
    let run_a = TempLedger::new(Some(root.path().to_path_buf()));
    let run_b = TempLedger::new(Some(root.path().to_path_buf()));
    let kept = run_b.acquire().unwrap();
    run_a.acquire().unwrap();

    run_a.release_all().unwrap();
    assert!(kept.path().exists());
}

#[test]
fn concurrent_acquisitions_are_all_tracked() {
    let root = tempfile::tempdir().unwrap();
    let ledger = TempLedger::new(Some(root.path().to_path_buf()));
    std::thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| ledger.acquire().unwrap());
        }
    });
    assert_eq!(ledger.len(), 8);
    assert_eq!(ledger.release_all().unwrap(), 8);
}
