#![allow(missing_docs)]

use std::fs;

use nestore::{LockFile, Nestore, NestoreError, Value, dict};

#[test]
fn test_write_fails_fast_while_sentinel_exists() -> nestore::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("busy.nst");
    Nestore::write(&path, dict([("a", 1)]))?;

    let sentinel = LockFile::sentinel_path(&path);
    assert_eq!(sentinel, dir.path().join("busy.lock"));
    fs::write(&sentinel, b"")?;
    assert!(LockFile::is_locked(&path));

    let err = Nestore::write(&path, dict([("a", 2)])).expect_err("lock is held");
    assert!(matches!(&err, NestoreError::LockHeld(p) if *p == sentinel));
    assert!(err.is_lock_held());
    assert!(matches!(
        Nestore::delete(&path, "a"),
        Err(NestoreError::LockHeld(_))
    ));

    // Someone else's sentinel is never removed.
    assert!(sentinel.exists());

    // Reads do not lock.
    assert_eq!(Nestore::read(&path, "a")?["a"], Value::Int(1));

    fs::remove_file(&sentinel)?;
    Nestore::write(&path, dict([("a", 2)]))?;
    assert_eq!(Nestore::read(&path, "a")?["a"], Value::Int(2));
    Ok(())
}

#[test]
fn test_sentinel_removed_after_success_and_failure() -> nestore::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("cycle.nst");

    Nestore::write(&path, dict([("a", 1)]))?;
    assert!(!LockFile::is_locked(&path));

    Nestore::delete(&path, "a")?;
    assert!(!LockFile::is_locked(&path));

    assert!(Nestore::delete(&path, "a").is_err());
    assert!(!LockFile::is_locked(&path));

    let ragged = Value::List(vec![Value::from(vec![1, 2]), Value::from(3)]);
    assert!(Nestore::write(&path, dict([("bad", ragged)])).is_err());
    assert!(!LockFile::is_locked(&path));
    Ok(())
}

#[test]
fn test_guard_is_exclusive_and_released_on_drop() -> nestore::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("guard.nst");

    {
        let guard = LockFile::acquire(&path)?;
        assert!(guard.sentinel().exists());
        assert!(LockFile::acquire(&path).is_err_and(|e| e.is_lock_held()));
    }
    assert!(!LockFile::is_locked(&path));

    let guard = LockFile::acquire(&path)?;
    guard.release()?;
    assert!(!LockFile::is_locked(&path));
    Ok(())
}

/// Concurrent writers on one container: every call either lands or reports
/// `LockHeld`, and the file stays readable.
#[test]
fn test_concurrent_writers() -> nestore::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("race.nst");
    Nestore::write(&path, dict([("seed", 0)]))?;

    let results: Vec<nestore::Result<_>> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let path = &path;
                s.spawn(move || Nestore::write(path, dict([(format!("k{i}"), Value::from(i))])))
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("writer thread panicked"))
            .collect()
    });

    let landed = results.iter().filter(|r| r.is_ok()).count();
    assert!(landed >= 1);
    for r in &results {
        if let Err(e) = r {
            assert!(e.is_lock_held(), "unexpected error: {e}");
        }
    }

    let keys = Nestore::list_keys(&path)?;
    assert!(keys.contains("seed"));
    assert_eq!(keys.len(), landed + 1);
    assert!(!LockFile::is_locked(&path));
    Ok(())
}
