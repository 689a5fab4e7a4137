use proptest::prelude::*;
use dupfind::duplicates::{DuplicateFinder, DuplicateIndex, FinderConfig, GroupUpdate};
use dupfind::scanner::{ContentHasher, HashAlgorithm, Hasher};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

proptest! {
    #[test]
    fn test_hash_determinism(content in prop::collection::vec(any::<u8>(), 0..20_000)) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.bin");
        fs::write(&path, &content).unwrap();

        for algorithm in [HashAlgorithm::Blake3, HashAlgorithm::Md5] {
            let hasher = Hasher::with_algorithm(algorithm);
            let from_file = hasher.hash(&path).unwrap();
            let from_reader = hasher.hash_reader(Cursor::new(&content)).unwrap();
            prop_assert_eq!(from_file, from_reader.digest);
            prop_assert_eq!(from_file, hasher.hash_bytes(&content));
            prop_assert_eq!(from_reader.len, content.len() as u64);
        }
    }

    #[test]
    fn test_index_invariants(ops in prop::collection::vec((0u8..6, 0u8..12), 0..80)) {
        let hasher = Hasher::new();
        let index = DuplicateIndex::new();
        let mut expected: BTreeMap<u8, BTreeSet<u8>> = BTreeMap::new();
        let mut promotions: HashSet<u8> = HashSet::new();

        for (content, path) in ops {
            let digest = hasher.hash_bytes(&[content]);
            let update = index.observe(digest, Path::new(&format!("/p{path}")));
            let members = expected.entry(content).or_default();
            let fresh = members.insert(path);

            match update {
                GroupUpdate::NoMatch => {
                    prop_assert!(fresh && members.len() == 1);
                }
                GroupUpdate::NewGroup { .. } => {
                    prop_assert!(fresh && members.len() == 2);
                    // The promotion happens exactly once per digest
                    prop_assert!(promotions.insert(content));
                }
                GroupUpdate::AppendedToGroup => {
                    prop_assert!(fresh && members.len() > 2);
                }
                GroupUpdate::AlreadyRecorded => {
                    prop_assert!(!fresh);
                }
            }
        }

        let groups = index.groups();
        let expected_groups: Vec<_> = expected.values().filter(|m| m.len() >= 2).collect();
        prop_assert_eq!(groups.len(), expected_groups.len());
        prop_assert_eq!(index.len(), expected.len());
        prop_assert_eq!(index.unique_count(), expected.len() - expected_groups.len());

        for group in &groups {
            // No path appears twice within a group
            let unique: HashSet<&PathBuf> = group.paths.iter().collect();
            prop_assert_eq!(unique.len(), group.paths.len());
            prop_assert!(group.paths.len() >= 2);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn test_scan_groups_match_content(
        files in prop::collection::vec((0u8..4, 0u8..4), 1..40),
        workers in 1usize..6,
        capacity in 0usize..5,
    ) {
        let dir = TempDir::new().unwrap();
        let mut by_content: BTreeMap<u8, BTreeSet<PathBuf>> = BTreeMap::new();
        for (i, (subdir, content)) in files.iter().enumerate() {
            let parent = dir.path().join(format!("s{subdir}"));
            fs::create_dir_all(&parent).unwrap();
            let path = parent.join(format!("f{i}"));
            fs::write(&path, [*content]).unwrap();
            by_content.entry(*content).or_default().insert(path);
        }

        let config = FinderConfig::default()
            .with_workers(workers)
            .with_queue_capacity(capacity);
        let report = DuplicateFinder::new(config).run(dir.path()).into_result().unwrap();

        let actual: BTreeSet<BTreeSet<PathBuf>> = report
            .groups
            .iter()
            .map(|g| g.paths.iter().cloned().collect())
            .collect();
        let expected: BTreeSet<BTreeSet<PathBuf>> = by_content
            .into_values()
            .filter(|paths| paths.len() >= 2)
            .collect();

        prop_assert_eq!(actual, expected);
        prop_assert_eq!(report.summary.files_hashed, files.len());
        prop_assert_eq!(report.summary.outstanding_files, 0);
    }
}
