//! Seeded stratified train/test partitioning.
//!
//! Strata are visited in sorted label order and each stratum is shuffled with
//! one `ChaCha8Rng` seeded from the caller's seed, so identical inputs always
//! produce identical partitions. Per stratum of size `n`:
//!
//! - `n == 1`: the row goes to train.
//! - `n >= 2`: the nearest whole count, `round(n * test_fraction)`, goes to
//!   test, capped at `n - 1` so train keeps at least one row. Small strata
//!   at small fractions may place nothing in test.

use crate::error::{PipelineError, Result};
use kheper_protocol::StratumCount;
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;

/// Datasets whose rows can be picked out by position.
pub trait RowSelect: Sized {
    fn row_count(&self) -> usize;
    fn select_rows(&self, indices: &[usize]) -> Self;
}

/// Row positions of each side, ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
    strata: Vec<StratumCount>,
}

impl SplitIndices {
    pub fn strata(&self) -> &[StratumCount] {
        &self.strata
    }
}

fn stratum_test_count(n: usize, test_fraction: f64) -> usize {
    if n < 2 {
        return 0;
    }
    let k = (n as f64 * test_fraction).round() as usize;
    k.min(n - 1)
}

pub fn split<S: AsRef<str>>(labels: &[S], test_fraction: f64, seed: u64) -> Result<SplitIndices> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(PipelineError::invalid_input(format!(
            "test_fraction must lie strictly between 0 and 1, got {test_fraction}"
        )));
    }
    if labels.is_empty() {
        return Err(PipelineError::insufficient_data(
            "Cannot split an empty dataset",
        ));
    }

    let mut strata: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (i, label) in labels.iter().enumerate() {
        strata.entry(label.as_ref()).or_default().push(i);
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(labels.len());
    let mut test = Vec::new();
    let mut counts = Vec::with_capacity(strata.len());
    for (label, mut members) in strata {
        let k = stratum_test_count(members.len(), test_fraction);
        members.shuffle(&mut rng);
        test.extend_from_slice(&members[..k]);
        train.extend_from_slice(&members[k..]);
        if members.len() == 1 {
            log::debug!("Stratum '{label}' has a single member; assigned to train");
        }
        counts.push(StratumCount {
            label: label.to_string(),
            total: members.len(),
            test: k,
        });
    }

    if test.is_empty() {
        return Err(PipelineError::insufficient_data(format!(
            "No row rounds into test across {} stratum label(s) at fraction {test_fraction}",
            counts.len()
        )));
    }
    train.sort_unstable();
    test.sort_unstable();
    log::info!(
        "Stratified split over {} strata: {} train / {} test (fraction {test_fraction}, seed {seed})",
        counts.len(),
        train.len(),
        test.len()
    );
    Ok(SplitIndices {
        train,
        test,
        strata: counts,
    })
}

/// Splits `dataset` by `labels` (one per row) into `(train, test, indices)`.
pub fn split_rows<T: RowSelect, S: AsRef<str>>(
    dataset: &T,
    labels: &[S],
    test_fraction: f64,
    seed: u64,
) -> Result<(T, T, SplitIndices)> {
    if labels.len() != dataset.row_count() {
        return Err(PipelineError::schema(format!(
            "Got {} stratification labels for {} rows",
            labels.len(),
            dataset.row_count()
        )));
    }
    let indices = split(labels, test_fraction, seed)?;
    let train = dataset.select_rows(&indices.train);
    let test = dataset.select_rows(&indices.test);
    Ok((train, test, indices))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use std::collections::HashSet;

    fn labels(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn union_is_exact_and_sides_disjoint() {
        let y = labels(&["A", "A", "A", "B", "B", "C", "C", "C", "C", "D"]);
        for seed in 0..20 {
            let s = split(&y, 0.3, seed).unwrap();
            let train: HashSet<_> = s.train.iter().copied().collect();
            let test: HashSet<_> = s.test.iter().copied().collect();
            assert!(train.is_disjoint(&test));
            assert_eq!(train.len() + test.len(), y.len());
            let mut all = s.train.clone();
            all.extend(&s.test);
            all.sort_unstable();
            assert_eq!(all, (0..y.len()).collect::<Vec<_>>());
        }
    }

    #[test]
    fn stratum_proportion_within_one_row() {
        let mut y = Vec::new();
        for (label, n) in [("A", 2), ("B", 7), ("C", 20), ("D", 33)] {
            y.extend(std::iter::repeat_n(label.to_string(), n));
        }
        for fraction in [0.15, 0.25, 0.5, 0.8] {
            let s = split(&y, fraction, 123).unwrap();
            for stratum in s.strata() {
                let expected = stratum.total as f64 * fraction;
                assert!(
                    (stratum.test as f64 - expected).abs() < 1.0,
                    "{} at {fraction}: {} of {}",
                    stratum.label,
                    stratum.test,
                    stratum.total
                );
                let in_test = s.test.iter().filter(|&&i| y[i] == stratum.label).count();
                assert_eq!(in_test, stratum.test);
            }
        }
    }

    #[test]
    fn small_strata_round_to_nearest_count() {
        let mut y = vec!["A".to_string(); 2];
        y.extend(std::iter::repeat_n("B".to_string(), 10));
        let s = split(&y, 0.15, 123).unwrap();
        let counts = s
            .strata()
            .iter()
            .map(|c| (c.label.as_str(), c.total, c.test))
            .collect::<Vec<_>>();
        assert_eq!(counts, vec![("A", 2, 0), ("B", 10, 2)]);
        assert!(s.train.contains(&0) && s.train.contains(&1));
    }

    #[test]
    fn large_fraction_keeps_one_train_row() {
        let y = labels(&["A", "A"]);
        let s = split(&y, 0.9, 5).unwrap();
        assert_eq!((s.train.len(), s.test.len()), (1, 1));
    }

    #[test]
    fn same_seed_same_partition() {
        let y = labels(&["A", "B", "A", "B", "A", "B", "C", "C", "C"]);
        assert_eq!(split(&y, 0.4, 42).unwrap(), split(&y, 0.4, 42).unwrap());
    }

    #[test]
    fn perturbation_example_places_each_label_on_both_sides() {
        let y = labels(&["A", "A", "A", "B", "B", "DMSO", "DMSO"]);
        let s = split(&y, 0.5, 7).unwrap();
        for label in ["A", "B", "DMSO"] {
            assert!(s.train.iter().any(|&i| y[i] == label), "{label} missing from train");
            assert!(s.test.iter().any(|&i| y[i] == label), "{label} missing from test");
        }
        let a = s.strata().iter().find(|c| c.label == "A").unwrap();
        assert_eq!((a.total, a.test), (3, 2));
    }

    #[test]
    fn single_member_stratum_goes_to_train() {
        let y = labels(&["A", "A", "A", "A", "solo"]);
        for seed in 0..10 {
            let s = split(&y, 0.5, seed).unwrap();
            assert!(s.train.contains(&4));
            assert!(!s.test.contains(&4));
        }
    }

    #[test]
    fn all_singletons_is_insufficient_data() {
        let y = labels(&["A", "B", "C"]);
        let err = split(&y, 0.5, 1).unwrap_err();
        assert_eq!(err.code, ErrorCode::InsufficientData);
    }

    #[test]
    fn pairs_rounding_to_zero_are_insufficient_data() {
        let y = labels(&["A", "A", "B", "B"]);
        let err = split(&y, 0.15, 123).unwrap_err();
        assert_eq!(err.code, ErrorCode::InsufficientData);
    }

    #[test]
    fn empty_dataset_is_insufficient_data() {
        let y: Vec<String> = Vec::new();
        assert_eq!(split(&y, 0.5, 1).unwrap_err().code, ErrorCode::InsufficientData);
    }

    #[test]
    fn rejects_fraction_outside_unit_interval() {
        let y = labels(&["A", "A"]);
        for fraction in [0.0, 1.0, -0.1, f64::NAN] {
            assert_eq!(split(&y, fraction, 1).unwrap_err().code, ErrorCode::InvalidInput);
        }
    }

    #[test]
    fn split_rows_checks_label_length() {
        let table = crate::table::Table::new(
            vec!["x".to_string()],
            vec![vec!["1".to_string()], vec!["2".to_string()]],
        )
        .unwrap();
        let err = split_rows(&table, &labels(&["A"]), 0.5, 1).unwrap_err();
        assert_eq!(err.code, ErrorCode::Schema);
    }

    #[test]
    fn split_rows_materialises_both_sides() {
        let table = crate::table::Table::new(
            vec!["id".to_string()],
            ["r0", "r1", "r2", "r3"]
                .iter()
                .map(|s| vec![s.to_string()])
                .collect(),
        )
        .unwrap();
        let (train, test, idx) =
            split_rows(&table, &labels(&["A", "A", "B", "B"]), 0.5, 3).unwrap();
        assert_eq!(train.len(), 2);
        assert_eq!(test.len(), 2);
        let test_ids = test.column_values("id").unwrap();
        let expected = idx.test.iter().map(|&i| format!("r{i}")).collect::<Vec<_>>();
        assert_eq!(test_ids, expected);
    }
}
