//! Atomic Publish Tests
//!
//! 1. A committed stage replaces the destination in full
//! 2. An interrupted stage (dropped before rename) leaves the destination as it was
//! 3. No temp artifact is ever visible under the destination's name
//! 4. Appending keeps the previous bytes as an exact prefix

use crate::universe::publish::{
    publish_appended_lines, publish_bytes, publish_gzip_json, publish_json_pretty, GzipStagedFile,
    StagedFile,
};
use crate::universe::test_support::{read_gz_json, read_gz_lines};
use serde_json::json;
use std::fs;
use std::io::Write;

fn dir_entries(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn test_publish_replaces_content_and_creates_parent() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("reports/nested/out.json");

    publish_bytes(&dest, b"first").unwrap();
    publish_bytes(&dest, b"second, longer than before").unwrap();

    assert_eq!(fs::read(&dest).unwrap(), b"second, longer than before");
    assert_eq!(dir_entries(dest.parent().unwrap()), vec!["out.json"]);
}

#[test]
fn test_interrupted_stage_leaves_destination_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("registry.ndjson");
    publish_bytes(&dest, b"previous content\n").unwrap();

    let temp_path = {
        let mut staged = StagedFile::create(&dest).unwrap();
        staged.write_all(b"half of the new con").unwrap();
        let temp = staged.temp_path().to_path_buf();
        assert_ne!(temp, dest);
        assert_eq!(temp.parent(), dest.parent());
        // Mid-write, readers still see the previous artifact.
        assert_eq!(fs::read(&dest).unwrap(), b"previous content\n");
        temp
        // dropped here without commit
    };

    assert_eq!(fs::read(&dest).unwrap(), b"previous content\n");
    assert!(!temp_path.exists());
    assert_eq!(dir_entries(dir.path()), vec!["registry.ndjson"]);
}

#[test]
fn test_interrupted_stage_for_new_destination_creates_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("index.json.gz");
    {
        let mut staged = GzipStagedFile::create(&dest).unwrap();
        staged.write_all(b"{\"partial\":").unwrap();
    }
    assert!(!dest.exists());
    assert!(dir_entries(dir.path()).is_empty());
}

#[test]
fn test_gzip_stage_round_trips_lines() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("rows.ndjson.gz");
    let mut staged = GzipStagedFile::create(&dest).unwrap();
    writeln!(staged, "{{\"a\":1}}").unwrap();
    writeln!(staged, "{{\"a\":2}}").unwrap();
    staged.commit().unwrap();

    assert_eq!(read_gz_lines(&dest), vec!["{\"a\":1}", "{\"a\":2}"]);
}

#[test]
fn test_json_helpers() {
    let dir = tempfile::tempdir().unwrap();
    let pretty = dir.path().join("report.json");
    let packed = dir.path().join("index.json.gz");
    let doc = json!({"schema": "x", "count": 2});

    publish_json_pretty(&pretty, &doc).unwrap();
    publish_gzip_json(&packed, &doc).unwrap();

    let text = fs::read_to_string(&pretty).unwrap();
    assert!(text.ends_with("}\n"));
    assert!(text.contains("\n  \"schema\""));
    assert_eq!(read_gz_json(&packed), doc);
}

#[test]
fn test_appended_lines_keep_previous_bytes_as_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("ledgers/dropout_ledger.ndjson");

    publish_appended_lines(&dest, &["one".to_string(), "two".to_string()]).unwrap();
    let before = fs::read(&dest).unwrap();
    assert_eq!(before, b"one\ntwo\n");

    publish_appended_lines(&dest, &["three".to_string()]).unwrap();
    let after = fs::read(&dest).unwrap();
    assert!(after.starts_with(&before));
    assert_eq!(after, b"one\ntwo\nthree\n");

    publish_appended_lines(&dest, &[]).unwrap();
    assert_eq!(fs::read(&dest).unwrap(), after);
}

#[test]
fn test_append_terminates_unfinished_last_line() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("dropout_ledger.ndjson");
    fs::write(&dest, b"{\"a\":1}").unwrap();

    publish_appended_lines(&dest, &["{\"b\":2}".to_string()]).unwrap();
    let after = fs::read_to_string(&dest).unwrap();
    assert_eq!(after, "{\"a\":1}\n{\"b\":2}\n");
    assert_eq!(after.lines().count(), 2);

    // Nothing to append: the file is left byte-identical.
    fs::write(&dest, b"{\"a\":1}").unwrap();
    publish_appended_lines(&dest, &[]).unwrap();
    assert_eq!(fs::read(&dest).unwrap(), b"{\"a\":1}");
}
