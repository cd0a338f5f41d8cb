//! Contract tests for the policy store.

use std::path::Path;
use std::sync::Arc;

use kodachrome_core::{MemoryUpload, PolicyStore, SequenceNames, StoreConfig, StoreError};

fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn store_with(dir: &Path, names: Arc<SequenceNames>) -> PolicyStore {
    let config = StoreConfig::new(dir.join("policies"), [".kinfer"]).unwrap();
    PolicyStore::new(config, names).unwrap()
}

/// Test: each valid save creates exactly one new file named after the nickname
#[tokio::test]
async fn test_save_creates_exactly_one_file_per_upload() {
    let dir = tempfile::tempdir().unwrap();
    let names = Arc::new(SequenceNames::new(["agile_hopper", "brave_curie", "calm_knuth"]));
    let store = store_with(dir.path(), names);

    let mut seen = Vec::new();
    for (i, body) in [b"one".as_slice(), b"two", b"three"].iter().enumerate() {
        let before = files_in(store.store_dir()).len();
        let mut upload = MemoryUpload::new(format!("policy_{i}.kinfer"), body.to_vec());
        let saved = store.save(&mut upload).await.expect("save failed");

        assert_eq!(files_in(store.store_dir()).len(), before + 1);
        assert!(saved.path.exists(), "saved file should exist");
        assert_eq!(std::fs::read(&saved.path).unwrap(), *body);
        assert!(!seen.contains(&saved.nickname), "nickname reused");
        seen.push(saved.nickname);
    }

    assert_eq!(
        files_in(store.store_dir()),
        vec!["agile_hopper.kinfer", "brave_curie.kinfer", "calm_knuth.kinfer"]
    );
}

/// Test: disallowed extensions are rejected before any name is drawn
#[tokio::test]
async fn test_disallowed_extension_performs_no_write() {
    let dir = tempfile::tempdir().unwrap();
    let names = Arc::new(SequenceNames::new(["agile_hopper"]));
    let store = store_with(dir.path(), Arc::clone(&names));

    for filename in ["policy.onnx", "policy.kinfer.zip", "policy", "kinfer"] {
        let mut upload = MemoryUpload::new(filename, b"payload".to_vec());
        let err = store.save(&mut upload).await.unwrap_err();
        assert!(
            matches!(err, StoreError::InvalidFileType { .. }),
            "{filename}: expected InvalidFileType, got {err:?}"
        );
    }

    assert!(files_in(store.store_dir()).is_empty());
    assert_eq!(names.calls(), 0, "no nickname should be drawn for invalid uploads");
}

/// Test: 100 consecutive collisions end in NameExhaustion without writing
#[tokio::test]
async fn test_name_exhaustion_after_100_collisions() {
    let dir = tempfile::tempdir().unwrap();
    let names = Arc::new(SequenceNames::new(["taken_turing"]));
    let store = store_with(dir.path(), Arc::clone(&names));
    std::fs::write(store.path_for("taken_turing", ".kinfer"), b"existing").unwrap();

    let mut upload = MemoryUpload::new("policy.kinfer", b"new".to_vec());
    match store.save(&mut upload).await {
        Err(StoreError::NameExhaustion { attempts }) => assert_eq!(attempts, 100),
        other => panic!("expected NameExhaustion, got {other:?}"),
    }

    assert_eq!(names.calls(), 100);
    assert_eq!(files_in(store.store_dir()), vec!["taken_turing.kinfer"]);
    assert_eq!(
        std::fs::read(store.path_for("taken_turing", ".kinfer")).unwrap(),
        b"existing"
    );
}

/// Test: a name freed up on the last attempt is still used
#[tokio::test]
async fn test_last_attempt_can_succeed() {
    let dir = tempfile::tempdir().unwrap();
    let mut sequence = vec!["taken_turing"; 99];
    sequence.push("free_lovelace");
    let names = Arc::new(SequenceNames::new(sequence));
    let store = store_with(dir.path(), Arc::clone(&names));
    std::fs::write(store.path_for("taken_turing", ".kinfer"), b"existing").unwrap();

    let mut upload = MemoryUpload::new("policy.kinfer", b"new".to_vec());
    let saved = store.save(&mut upload).await.expect("save failed");

    assert_eq!(saved.nickname, "free_lovelace");
    assert_eq!(names.calls(), 100);
}

/// Test: the store directory is created on construction
#[test]
fn test_store_creates_directory() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("a").join("b");
    let config = StoreConfig::new(&nested, [".kinfer"]).unwrap();
    let _store = PolicyStore::new(config, Arc::new(SequenceNames::new(["x"]))).unwrap();
    assert!(nested.is_dir());
}
