//! Stratified k-fold partitioning.
//!
//! ## Invariants
//!
//! * Output is a pure function of `(labels, k, seed)`: the generator is
//!   `ChaCha8Rng`, whose stream is fixed across platforms and releases.
//! * Folds are disjoint, non-empty and cover every index exactly once.
//! * For every class, per-fold counts differ by at most one; so do fold sizes.

use crate::data::{Label, class_counts};
use crate::error::SweepError;
use crate::training::reproducibility::{RngStream, SeedManager, fingerprint_folds};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A partition of sample indices into `k` validation folds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldAssignment {
    k: usize,
    seed: u64,
    n_samples: usize,
    folds: Vec<Vec<usize>>,
    fingerprint: String,
}

impl FoldAssignment {
    pub fn k(&self) -> usize {
        self.k
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    /// SHA-256 digest of the fold layout.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn folds(&self) -> &[Vec<usize>] {
        &self.folds
    }

    /// Indices of fold `i`, ascending.
    pub fn fold(&self, i: usize) -> &[usize] {
        &self.folds[i]
    }

    /// Held-out indices when fold `i` is the validation fold.
    pub fn test_indices(&self, i: usize) -> &[usize] {
        self.fold(i)
    }

    /// Every index outside fold `i`, ascending.
    pub fn train_indices(&self, i: usize) -> Vec<usize> {
        let mut in_fold = vec![false; self.n_samples];
        for &index in &self.folds[i] {
            in_fold[index] = true;
        }
        (0..self.n_samples).filter(|&idx| !in_fold[idx]).collect()
    }

    /// Fold number of every sample.
    pub fn fold_of_each_sample(&self) -> Vec<usize> {
        let mut owner = vec![0; self.n_samples];
        for (fold, indices) in self.folds.iter().enumerate() {
            for &index in indices {
                owner[index] = fold;
            }
        }
        owner
    }
}

/// Split `labels` into `k` stratified folds.
///
/// Each class is shuffled, `count / k` of its samples go to every fold, and the
/// `count % k` leftovers are dealt round-robin over a seed-derived fold order.
/// The dealing cursor carries over from one class to the next so that fold
/// sizes stay balanced too.
pub fn partition(labels: &[Label], k: usize, seed: u64) -> Result<FoldAssignment, SweepError> {
    if labels.is_empty() {
        return Err(SweepError::invalid_input("cannot partition an empty label set"));
    }
    if k < 2 {
        return Err(SweepError::invalid_input(format!(
            "fold count must be at least 2, got {k}"
        )));
    }

    let counts = class_counts(labels);
    if let Some((label, &count)) = counts.iter().min_by_key(|(_, count)| **count) {
        if count < k {
            return Err(SweepError::InsufficientSamples {
                k,
                label: label.clone(),
                count,
            });
        }
    }

    let mut members: BTreeMap<&Label, Vec<usize>> = BTreeMap::new();
    for (index, label) in labels.iter().enumerate() {
        members.entry(label).or_default().push(index);
    }

    let mut rng = SeedManager::new(seed).rng(RngStream::Partition);
    let mut fold_order: Vec<usize> = (0..k).collect();
    fold_order.shuffle(&mut rng);

    let mut folds: Vec<Vec<usize>> = vec![Vec::with_capacity(labels.len() / k + 1); k];
    let mut cursor = 0;
    for indices in members.values_mut() {
        indices.shuffle(&mut rng);
        let even = indices.len() / k * k;
        for (position, &index) in indices.iter().enumerate() {
            let fold = if position < even {
                position % k
            } else {
                let fold = fold_order[cursor % k];
                cursor += 1;
                fold
            };
            folds[fold].push(index);
        }
    }
    for fold in &mut folds {
        fold.sort_unstable();
    }

    tracing::debug!(
        k,
        seed,
        n_samples = labels.len(),
        classes = counts.len(),
        "Built stratified folds"
    );

    let fingerprint = fingerprint_folds(&folds);
    Ok(FoldAssignment {
        k,
        seed,
        n_samples: labels.len(),
        folds,
        fingerprint,
    })
}
