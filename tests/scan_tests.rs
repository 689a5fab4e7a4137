//! End-to-end scan tests over real directory trees.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use dupfind::cli::{Cli, Commands, ScanArgs};
use dupfind::duplicates::{DuplicateFinder, FinderConfig, RunResult, ScanReport};
use dupfind::error::ExitCode;
use dupfind::scanner::{HashAlgorithm, Hasher};
use tempfile::TempDir;

fn write(root: &Path, rel: &str, content: &str) -> PathBuf {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, content).unwrap();
    path
}

fn scan(root: &Path, config: FinderConfig) -> ScanReport {
    match DuplicateFinder::new(config).run(root) {
        RunResult::Completed(report) => report,
        RunResult::Cancelled(cause) => panic!("Scan cancelled: {}", cause),
    }
}

fn membership(report: &ScanReport) -> BTreeSet<BTreeSet<PathBuf>> {
    report
        .groups
        .iter()
        .map(|g| g.paths.iter().cloned().collect())
        .collect()
}

fn scan_args(args: &[&str]) -> ScanArgs {
    let mut argv = vec!["dupfind", "scan"];
    argv.extend_from_slice(args);
    let Commands::Scan(args) = Cli::try_parse_from(argv).unwrap().command;
    args
}

#[test]
fn test_reference_scenario() {
    let dir = TempDir::new().unwrap();
    let one = write(dir.path(), "a/1.txt", "x");
    let two = write(dir.path(), "a/b/2.txt", "x");
    let three = write(dir.path(), "c/3.txt", "y");

    let report = scan(dir.path(), FinderConfig::default().with_workers(4));

    assert_eq!(report.groups.len(), 1);
    let expected: BTreeSet<PathBuf> = [one, two].into_iter().collect();
    assert_eq!(report.groups[0].paths.iter().cloned().collect::<BTreeSet<_>>(), expected);
    assert!(!report.groups[0].contains(&three));

    let summary = &report.summary;
    assert_eq!(summary.files_submitted, 3);
    assert_eq!(summary.files_hashed, 3);
    assert_eq!(summary.dirs_walked, 4);
    assert_eq!(summary.duplicate_groups, 1);
    assert_eq!(summary.duplicate_files, 1);
    assert_eq!(summary.unique_files, 1);
    assert_eq!(summary.pending_dirs, 0);
    assert_eq!(summary.outstanding_files, 0);
    assert!(!summary.is_partial());
}

#[test]
fn test_md5_digest_matches_known_value() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a/1.txt", "x");
    write(dir.path(), "a/b/2.txt", "x");

    let report = scan(
        dir.path(),
        FinderConfig::default().with_algorithm(HashAlgorithm::Md5),
    );
    let map = report.to_map();
    assert!(map.contains_key("9dd4e461268c8034f5c8564e155c67a6"));
}

#[test]
fn test_differing_content_never_grouped() {
    let dir = TempDir::new().unwrap();
    for i in 0..20 {
        write(dir.path(), &format!("d{}/f{i}", i % 3), &format!("content {i}"));
    }
    let report = scan(dir.path(), FinderConfig::default());
    assert!(report.groups.is_empty());
    assert_eq!(report.exit_code(), ExitCode::NoDuplicates);
}

#[test]
fn test_scan_is_idempotent() {
    let dir = TempDir::new().unwrap();
    for i in 0..60 {
        let content = format!("bucket {}", i % 7);
        write(dir.path(), &format!("l{}/m{}/file{i}.bin", i % 4, i % 5), &content);
    }

    let config = FinderConfig::default().with_workers(6).with_queue_capacity(3);
    let first = scan(dir.path(), config.clone());
    let second = scan(dir.path(), config);

    assert_eq!(first.groups.len(), 7);
    assert_eq!(membership(&first), membership(&second));
    let digests: Vec<_> = first.groups.iter().map(|g| g.digest).collect();
    let again: Vec<_> = second.groups.iter().map(|g| g.digest).collect();
    assert_eq!(digests, again);
}

#[test]
fn test_empty_files_group_unless_skipped() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "e1", "");
    write(dir.path(), "sub/e2", "");
    write(dir.path(), "data", "payload");

    let report = scan(dir.path(), FinderConfig::default());
    assert_eq!(report.groups.len(), 1);
    assert_eq!(report.groups[0].digest, Hasher::new().hash_bytes(b""));

    let mut config = FinderConfig::default();
    config.walker.skip_empty = true;
    let report = scan(dir.path(), config);
    assert!(report.groups.is_empty());
    assert_eq!(report.summary.files_submitted, 1);
}

#[test]
fn test_rendezvous_queue_and_single_worker() {
    let dir = TempDir::new().unwrap();
    for i in 0..30 {
        write(dir.path(), &format!("x{}/y{i}", i % 6), &format!("{}", i % 2));
    }
    let report = scan(
        dir.path(),
        FinderConfig::default()
            .with_workers(1)
            .with_walk_threads(1)
            .with_queue_capacity(0),
    );
    assert_eq!(report.groups.len(), 2);
    assert_eq!(report.summary.files_hashed, 30);
}

#[test]
fn test_run_scan_text_output() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a/1.txt", "x");
    write(dir.path(), "a/b/2.txt", "x");
    write(dir.path(), "c/3.txt", "y");

    let root = dir.path().to_string_lossy().into_owned();
    let args = scan_args(&[&root, "--algorithm", "md5", "--workers", "2"]);
    let mut out = Vec::new();
    let code = dupfind::run_scan(&args, &mut out).unwrap();

    assert_eq!(code, ExitCode::Success);
    let text = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("9dd4e461268c8034f5c8564e155c67a6: ["));
    assert!(lines[0].contains("1.txt"));
    assert!(lines[0].contains("2.txt"));
    assert!(!lines[0].contains("3.txt"));
}

#[test]
fn test_run_scan_json_output() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "p", "same");
    write(dir.path(), "q", "same");

    let root = dir.path().to_string_lossy().into_owned();
    let args = scan_args(&[&root, "--output", "json"]);
    let mut out = Vec::new();
    dupfind::run_scan(&args, &mut out).unwrap();

    let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(value["duplicates"].as_array().unwrap().len(), 1);
    assert_eq!(value["duplicates"][0]["paths"].as_array().unwrap().len(), 2);
    assert_eq!(value["summary"]["files_hashed"], 2);
    assert_eq!(value["summary"]["exit_code_name"], "DF000");
}

#[test]
fn test_run_scan_missing_root_is_error() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("missing").to_string_lossy().into_owned();
    let args = scan_args(&[&missing]);
    let err = dupfind::run_scan(&args, &mut Vec::new()).unwrap_err();

    let failure = err
        .downcast_ref::<dupfind::error::ScanFailure>()
        .expect("scan failure");
    assert!(matches!(
        failure,
        dupfind::error::ScanFailure::RootUnreadable { .. }
    ));
    assert_eq!(failure.exit_code(), ExitCode::GeneralError);
}
