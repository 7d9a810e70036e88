//! Property-based testing for snapsum
//!
//! The comparator and the duplicate engine must not depend on the order in
//! which files are handed to them, and every path must be accounted for.

use ::snapsum::*;
use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

/// Files keyed by path index, valued by (content id, mtime offset)
type Tree = BTreeMap<usize, (u8, i64)>;

fn tree_strategy() -> impl Strategy<Value = Tree> {
    prop::collection::btree_map(0usize..12, (0u8..4, 0i64..3), 0..12)
}

fn mode_strategy() -> impl Strategy<Value = HashMode> {
    prop_oneof![
        Just(HashMode::None),
        Just(HashMode::SmallBlock),
        Just(HashMode::Full),
    ]
}

fn file(path: usize, content: u8, mtime: i64, mode: HashMode) -> FileState {
    let digest = format!("{:064x}", content);
    let file_hash = match mode {
        HashMode::None => FileHash::default(),
        HashMode::SmallBlock => FileHash {
            small_block: Some(digest),
            ..Default::default()
        },
        HashMode::MediumBlock => FileHash {
            small_block: Some(digest.clone()),
            medium_block: Some(digest),
            ..Default::default()
        },
        HashMode::Full => FileHash {
            small_block: Some(digest.clone()),
            medium_block: Some(digest.clone()),
            full: Some(digest),
        },
    };
    FileState {
        path: PathBuf::from(format!("d{}/f{:02}", path % 3, path)),
        length: 10 + u64::from(content),
        last_modified: Utc.timestamp_opt(1_600_000_000 + mtime, 0).unwrap(),
        attributes: Attributes::default(),
        file_hash,
        modification: None,
        to_remove: false,
    }
}

fn build_state(tree: &Tree, mode: HashMode) -> State {
    let files = tree
        .iter()
        .map(|(&path, &(content, mtime))| file(path, content, mtime, mode))
        .collect();
    State::new("prop", mode, files)
}

fn shuffled(state: &State, seed: u64) -> State {
    let mut state = state.clone();
    state.file_states.shuffle(&mut StdRng::seed_from_u64(seed));
    state
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Comparing permuted inputs yields the same classification
    #[test]
    fn comparison_ignores_input_order(
        previous in tree_strategy(),
        current in tree_strategy(),
        mode in mode_strategy(),
        seed in any::<u64>(),
    ) {
        let previous = build_state(&previous, mode);
        let current = build_state(&current, mode);

        let sorted = compare(Some(&previous), current.clone());
        let permuted = compare(
            Some(&shuffled(&previous, seed)),
            shuffled(&current, seed.wrapping_add(1)),
        );

        prop_assert_eq!(&sorted.counts, &permuted.counts);
        prop_assert_eq!(&sorted.differences, &permuted.differences);
        prop_assert_eq!(&sorted.current.file_states, &permuted.current.file_states);
    }

    /// Every path lands in exactly one category and renames consume each
    /// vanished file at most once
    #[test]
    fn comparison_covers_every_path(
        previous_tree in tree_strategy(),
        current_tree in tree_strategy(),
        mode in mode_strategy(),
    ) {
        let previous = build_state(&previous_tree, mode);
        let current = build_state(&current_tree, mode);
        let result = compare(Some(&previous), current);
        let counts = result.counts;

        prop_assert_eq!(counts.total(), current_tree.len() + counts.deleted);

        let union: HashSet<usize> = previous_tree.keys().chain(current_tree.keys()).copied().collect();
        prop_assert_eq!(counts.total() + counts.renamed, union.len());

        let rename_sources: Vec<&PathBuf> = result
            .differences
            .iter()
            .filter(|d| d.modification() == Some(Modification::Renamed))
            .filter_map(|d| d.previous.as_ref().map(|p| &p.path))
            .collect();
        let distinct: HashSet<&PathBuf> = rename_sources.iter().copied().collect();
        prop_assert_eq!(distinct.len(), rename_sources.len());
        for source in rename_sources {
            prop_assert!(result.current.file(source).is_none());
        }
    }

    /// A state compared with itself is clean
    #[test]
    fn self_comparison_is_clean(tree in tree_strategy(), mode in mode_strategy()) {
        let state = build_state(&tree, mode);
        let result = compare(Some(&state), state.clone());
        prop_assert!(result.is_clean());
        prop_assert_eq!(result.counts.unchanged, tree.len());
    }

    /// Duplicate sets come out identical whatever the file order
    #[test]
    fn duplicates_ignore_input_order(
        tree in tree_strategy(),
        mode in prop_oneof![Just(HashMode::SmallBlock), Just(HashMode::Full)],
        seed in any::<u64>(),
    ) {
        let state = build_state(&tree, mode);
        let sorted = find_duplicates(&state).unwrap();
        let permuted = find_duplicates(&shuffled(&state, seed)).unwrap();

        prop_assert_eq!(&sorted.sets, &permuted.sets);
        prop_assert_eq!(sorted.total_wasted_space, permuted.total_wasted_space);
        prop_assert!(sorted
            .sets
            .windows(2)
            .all(|w| w[0].wasted_space() >= w[1].wasted_space()));

        let grouped: usize = sorted.sets.iter().map(|s| s.files.len()).sum();
        prop_assert_eq!(sorted.duplicated_files_count, grouped - sorted.sets.len());
    }
}
