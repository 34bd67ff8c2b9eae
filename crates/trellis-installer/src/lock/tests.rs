//! Unit tests for lock file persistence.

use camino::Utf8PathBuf;
use rstest::{fixture, rstest};
use tempfile::TempDir;

use super::*;

#[fixture]
fn temp() -> (TempDir, Utf8PathBuf) {
    let dir = TempDir::new().expect("temp dir");
    let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 temp dir");
    (dir, path)
}

#[rstest]
fn missing_lock_file_loads_empty(temp: (TempDir, Utf8PathBuf)) {
    let lock = LockFile::load(temp.1.join("lock.json")).expect("load");
    assert!(lock.is_empty());
}

#[rstest]
fn saved_records_reload_in_name_order(temp: (TempDir, Utf8PathBuf)) {
    let path = temp.1.join("state").join("lock.json");
    let mut lock = LockFile::load(&path).expect("load");
    lock.upsert(InstalledRecord::now("zeta", "2.0.0", "https://r.test"));
    lock.upsert(InstalledRecord::now("alpha", "1.0.0", "https://r.test"));
    lock.save().expect("save");

    let reloaded = LockFile::load(&path).expect("reload");
    let names: Vec<&str> = reloaded.records().map(InstalledRecord::name).collect();
    assert_eq!(names, vec!["alpha", "zeta"]);
    assert_eq!(reloaded.get("zeta").map(InstalledRecord::version), Some("2.0.0"));
}

#[rstest]
fn lock_document_has_generated_at_and_extensions(temp: (TempDir, Utf8PathBuf)) {
    let path = temp.1.join("lock.json");
    let mut lock = LockFile::load(&path).expect("load");
    lock.upsert(InstalledRecord::now("alpha", "1.0.0", "https://r.test"));
    lock.save().expect("save");

    let raw: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&path).expect("read")).expect("json");
    assert!(raw.get("generated_at").and_then(serde_json::Value::as_str).is_some());
    let first = raw
        .get("extensions")
        .and_then(|value| value.get(0))
        .expect("one extension");
    for field in ["name", "version", "registry_url", "installed_at"] {
        assert!(first.get(field).is_some(), "missing field {field}");
    }
}

#[rstest]
fn upsert_replaces_and_returns_previous(temp: (TempDir, Utf8PathBuf)) {
    let mut lock = LockFile::load(temp.1.join("lock.json")).expect("load");
    assert!(lock.upsert(InstalledRecord::now("a", "1.0", "u")).is_none());
    let previous = lock
        .upsert(InstalledRecord::now("a", "2.0", "u"))
        .expect("previous record");
    assert_eq!(previous.version(), "1.0");
    assert_eq!(lock.len(), 1);
}

#[rstest]
fn malformed_lock_file_is_rejected(temp: (TempDir, Utf8PathBuf)) {
    let path = temp.1.join("lock.json");
    std::fs::write(&path, b"{ not json").expect("write");
    let err = LockFile::load(&path).expect_err("malformed lock must fail");
    assert!(matches!(err, InstallError::LockFile { .. }));
}

#[rstest]
fn manifest_round_trips_through_extension_dir(temp: (TempDir, Utf8PathBuf)) {
    let record = InstalledRecord::now("alpha", "1.0.0", "https://r.test");
    record.write_manifest(&temp.1).expect("write manifest");
    let read = InstalledRecord::read_manifest(&temp.1).expect("read manifest");
    assert_eq!(read, record);
}

#[rstest]
fn matches_requires_registry_url() {
    let record = InstalledRecord::now("a", "1.0", "https://one.test");
    assert!(record.matches("a", "1.0", "https://one.test"));
    assert!(!record.matches("a", "1.0", "https://two.test"));
    assert!(!record.matches("a", "1.1", "https://one.test"));
}
