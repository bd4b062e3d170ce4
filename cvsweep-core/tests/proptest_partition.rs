//! Property-based tests for fold partitioning and configuration sampling.

use proptest::prelude::*;

use cvsweep_core::Label;
use cvsweep_core::data::class_counts;
use cvsweep_core::evaluation::partition;
use cvsweep_core::training::reproducibility::{RngStream, SeedManager};
use cvsweep_core::training::sweep::{Domain, SearchSpace, sample};
use std::collections::BTreeMap;

/// Class sizes of at least `k`, expanded into a shuffled-looking label vector.
fn labels_strategy() -> impl Strategy<Value = (Vec<Label>, usize)> {
    (2usize..7).prop_flat_map(|k| {
        prop::collection::vec(k..(k + 25), 1..5).prop_map(move |sizes| {
            let mut labels = Vec::new();
            let longest = sizes.iter().copied().max().unwrap_or(0);
            // Interleave classes so indices of one class are not contiguous.
            for i in 0..longest {
                for (class, &size) in sizes.iter().enumerate() {
                    if i < size {
                        labels.push(Label::Int(class as i64));
                    }
                }
            }
            (labels, k)
        })
    })
}

// --- Partition properties ---

proptest! {
    #[test]
    fn folds_cover_every_index_exactly_once((labels, k) in labels_strategy(), seed in any::<u64>()) {
        let folds = partition(&labels, k, seed).unwrap();
        let mut seen = vec![0u32; labels.len()];
        for fold in folds.folds() {
            prop_assert!(!fold.is_empty());
            for &index in fold {
                seen[index] += 1;
            }
        }
        prop_assert!(seen.iter().all(|&n| n == 1));
    }

    #[test]
    fn per_class_fold_counts_differ_by_at_most_one((labels, k) in labels_strategy(), seed in any::<u64>()) {
        let folds = partition(&labels, k, seed).unwrap();
        let mut per_class: BTreeMap<Label, Vec<usize>> = BTreeMap::new();
        for fold in folds.folds() {
            let fold_labels: Vec<Label> = fold.iter().map(|&i| labels[i].clone()).collect();
            let counts = class_counts(&fold_labels);
            for class in class_counts(&labels).keys() {
                per_class
                    .entry(class.clone())
                    .or_default()
                    .push(counts.get(class).copied().unwrap_or(0));
            }
        }
        for counts in per_class.values() {
            let min = counts.iter().min().copied().unwrap_or(0);
            let max = counts.iter().max().copied().unwrap_or(0);
            prop_assert!(max - min <= 1, "{:?}", counts);
        }

        let sizes: Vec<usize> = folds.folds().iter().map(Vec::len).collect();
        let min = sizes.iter().min().copied().unwrap_or(0);
        let max = sizes.iter().max().copied().unwrap_or(0);
        prop_assert!(max - min <= 1, "{:?}", sizes);
    }

    #[test]
    fn partition_is_a_pure_function((labels, k) in labels_strategy(), seed in any::<u64>()) {
        let a = partition(&labels, k, seed).unwrap();
        let b = partition(&labels, k, seed).unwrap();
        prop_assert_eq!(a.fingerprint(), b.fingerprint());
        prop_assert_eq!(a, b);
    }
}

// --- Sampler properties ---

proptest! {
    #[test]
    fn samples_stay_inside_their_domains(
        seed in any::<u64>(),
        lo in -100.0f64..100.0,
        width in 0.0f64..50.0,
        ilo in -20i64..20,
        iwidth in 0i64..10,
    ) {
        let space = SearchSpace::new()
            .with("alpha", Domain::Uniform { min: lo, max: lo + width })
            .with("c", Domain::LogUniform { min: 1e-3, max: 1e3 })
            .with("depth", Domain::IntUniform { min: ilo, max: ilo + iwidth })
            .categorical("kernel", ["linear", "rbf"]);
        let mut rng = SeedManager::new(seed).rng(RngStream::Sampler);
        for _ in 0..8 {
            let config = sample(&space, &mut rng);
            let alpha = config.get("alpha").and_then(|v| v.as_f64()).unwrap();
            prop_assert!(alpha >= lo && alpha <= lo + width);
            let c = config.get("c").and_then(|v| v.as_f64()).unwrap();
            prop_assert!((1e-3..=1e3).contains(&c));
            let depth = config.get("depth").and_then(|v| v.as_i64()).unwrap();
            prop_assert!(depth >= ilo && depth <= ilo + iwidth);
            let kernel = config.get("kernel").and_then(|v| v.as_str()).unwrap();
            prop_assert!(kernel == "linear" || kernel == "rbf");
        }
    }
}
