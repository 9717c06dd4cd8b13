//! Filesystem source round trips against a temporary directory.

use flate2::write::GzEncoder;
use flate2::Compression;
use meshcfg_event::schema::mocks;
use meshcfg_event::{Accumulator, Event, Kind, Source};
use meshcfg_source::{FsOptions, FsSource, ReloadReport};
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

fn mock_yaml(name: &str, key: &str) -> String {
    format!(
        "apiVersion: test.istio.io/v1\nkind: MockConfig\nmetadata:\n  name: {}\n  namespace: ns\nspec:\n  key: \"{}\"\n",
        name, key
    )
}

fn write_gz(path: &Path, text: &str) {
    let file = std::fs::File::create(path).unwrap();
    let mut enc = GzEncoder::new(file, Compression::default());
    enc.write_all(text.as_bytes()).unwrap();
    enc.finish().unwrap();
}

fn summary(events: &[Event]) -> Vec<(Kind, String)> {
    events
        .iter()
        .map(|e| match &e.resource {
            Some(r) => (e.kind, r.full_name().to_string()),
            None => (e.kind, e.source.name().to_string()),
        })
        .collect()
}

fn options() -> FsOptions {
    FsOptions {
        reload_on_signal: false,
        ..FsOptions::default()
    }
}

#[tokio::test]
async fn test_start_loads_then_full_sync() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("a.yaml"), mock_yaml("a", "1")).unwrap();
    std::fs::create_dir(dir.path().join("nested")).unwrap();
    std::fs::write(dir.path().join("nested/b.yml"), mock_yaml("b", "2")).unwrap();
    std::fs::write(dir.path().join("ignored.json"), "{}").unwrap();

    let src = FsSource::new(dir.path(), mocks(), options());
    let acc = Accumulator::new();
    src.dispatch(acc.clone());
    src.start();
    src.start();

    assert_eq!(
        summary(&acc.events()),
        vec![
            (Kind::Added, "ns/a".to_string()),
            (Kind::Added, "ns/b".to_string()),
            (Kind::FullSync, "mock".to_string()),
        ]
    );
    src.stop();
}

#[tokio::test]
async fn test_reload_round_trip() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("a.yaml"), mock_yaml("a", "1")).unwrap();
    std::fs::write(dir.path().join("b.yaml"), mock_yaml("b", "2")).unwrap();

    let src = FsSource::new(dir.path(), mocks(), options());
    let acc = Accumulator::new();
    src.dispatch(acc.clone());
    src.start();
    acc.clear();

    std::fs::remove_file(dir.path().join("b.yaml")).unwrap();
    write_gz(&dir.path().join("c.yaml.gz"), &mock_yaml("c", "3"));

    let report = src.reload().unwrap();
    assert_eq!(
        report,
        ReloadReport {
            applied: 2,
            failed: 0,
            removed: 1,
        }
    );

    // a.yaml is unchanged; c.yaml.gz is walked before the removal pass.
    assert_eq!(
        summary(&acc.events()),
        vec![
            (Kind::Added, "ns/c".to_string()),
            (Kind::Deleted, "ns/b".to_string()),
        ]
    );
    src.stop();
}

#[tokio::test]
async fn test_renamed_file_keeps_resource() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("b.yaml"), mock_yaml("r", "1")).unwrap();

    let src = FsSource::new(dir.path(), mocks(), options());
    let acc = Accumulator::new();
    src.dispatch(acc.clone());
    src.start();
    acc.clear();

    std::fs::rename(dir.path().join("b.yaml"), dir.path().join("c.yaml")).unwrap();
    let report = src.reload().unwrap();
    assert_eq!(report.applied, 1);
    assert!(acc.is_empty(), "unexpected events: {:?}", summary(&acc.events()));
    assert_eq!(src.store().resources().len(), 1);

    // The new name owns the resource now; deleting it retracts the resource.
    std::fs::remove_file(dir.path().join("c.yaml")).unwrap();
    src.reload().unwrap();
    assert_eq!(summary(&acc.events()), vec![(Kind::Deleted, "ns/r".to_string())]);
    assert!(src.store().resources().is_empty());
    src.stop();
}

#[tokio::test]
async fn test_renamed_and_edited_file_updates() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("c.yaml"), mock_yaml("r", "1")).unwrap();

    let src = FsSource::new(dir.path(), mocks(), options());
    let acc = Accumulator::new();
    src.dispatch(acc.clone());
    src.start();
    acc.clear();

    std::fs::remove_file(dir.path().join("c.yaml")).unwrap();
    std::fs::write(dir.path().join("a.yaml"), mock_yaml("r", "2")).unwrap();
    src.reload().unwrap();
    assert_eq!(summary(&acc.events()), vec![(Kind::Updated, "ns/r".to_string())]);
    assert_eq!(src.store().resources()[0].body["key"], "2");
    src.stop();
}

#[tokio::test]
async fn test_walk_failure_keeps_previous_state() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("config");
    std::fs::create_dir(&root).unwrap();
    std::fs::write(root.join("a.yaml"), mock_yaml("a", "1")).unwrap();

    let src = FsSource::new(&root, mocks(), options());
    let acc = Accumulator::new();
    src.dispatch(acc.clone());
    src.start();
    acc.clear();

    std::fs::remove_dir_all(&root).unwrap();
    assert!(src.reload().is_err());
    assert!(acc.is_empty());
    let held: Vec<String> = src
        .store()
        .resources()
        .iter()
        .map(|r| r.full_name().to_string())
        .collect();
    assert_eq!(held, vec!["ns/a".to_string()]);
    src.stop();
}

#[tokio::test]
async fn test_broken_file_is_retracted() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("a.yaml");
    std::fs::write(&path, mock_yaml("a", "1")).unwrap();

    let src = FsSource::new(dir.path(), mocks(), options());
    let acc = Accumulator::new();
    src.dispatch(acc.clone());
    src.start();
    acc.clear();

    std::fs::write(&path, "key: [unterminated\n").unwrap();
    let report = src.reload().unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(summary(&acc.events()), vec![(Kind::Deleted, "ns/a".to_string())]);
    src.stop();
}

#[tokio::test]
async fn test_trigger_runs_reload() {
    let dir = TempDir::new().unwrap();
    let src = FsSource::new(dir.path(), mocks(), options());
    let acc = Accumulator::new();
    src.dispatch(acc.clone());
    assert!(!src.trigger("before start"));

    src.start();
    assert!(acc.wait_for(1, Duration::from_secs(1)).await);

    std::fs::write(dir.path().join("a.yaml"), mock_yaml("a", "1")).unwrap();
    assert!(src.trigger("test"));
    assert!(acc.wait_for(2, Duration::from_secs(5)).await);
    assert_eq!(summary(&acc.events())[1], (Kind::Added, "ns/a".to_string()));
    src.stop();
}

#[tokio::test]
async fn test_watch_config_files() {
    let dir = TempDir::new().unwrap();
    let src = FsSource::new(
        dir.path(),
        mocks(),
        FsOptions {
            watch_config_files: true,
            ..options()
        },
    );
    let acc = Accumulator::new();
    src.dispatch(acc.clone());
    src.start();

    std::fs::write(dir.path().join("a.yaml"), mock_yaml("a", "1")).unwrap();
    assert!(acc.wait_for(2, Duration::from_secs(10)).await);
    assert!(acc
        .events()
        .iter()
        .any(|e| e.kind == Kind::Added && e.resource.is_some()));
    src.stop();
}

#[tokio::test]
async fn test_stop_is_idempotent_and_restartable() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("a.yaml"), mock_yaml("a", "1")).unwrap();

    let src = FsSource::new(dir.path(), mocks(), options());
    let acc = Accumulator::new();
    src.dispatch(acc.clone());
    src.start();
    src.stop();
    src.stop();
    assert!(!src.is_running());
    assert!(src.store().resources().is_empty());
    assert!(!src.trigger("stopped"));

    acc.clear();
    src.start();
    assert_eq!(
        summary(&acc.events()),
        vec![
            (Kind::Added, "ns/a".to_string()),
            (Kind::FullSync, "mock".to_string()),
        ]
    );
    src.stop();
}
