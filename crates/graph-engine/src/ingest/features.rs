//! Feature column selection and per-column normalization.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Bumped whenever the meaning of a [`FeaturePolicy`] changes.
pub const FEATURE_POLICY_VERSION: u32 = 1;

/// Guards the division for zero-variance columns.
pub const NORM_EPSILON: f64 = 1e-8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnPredicate {
    Contains(String),
    Prefix(String),
    Exact(String),
}

impl ColumnPredicate {
    pub fn matches(&self, column: &str) -> bool {
        match self {
            ColumnPredicate::Contains(s) => column.contains(s.as_str()),
            ColumnPredicate::Prefix(s) => column.starts_with(s.as_str()),
            ColumnPredicate::Exact(s) => column == s,
        }
    }
}

/// Which of the candidate columns (everything except id, time step and
/// class) become node features.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeaturePolicy {
    AllColumns,
    /// Columns matching any predicate, in source order. When nothing
    /// matches, the first `fallback_first_k` candidates are used instead.
    Matching {
        predicates: Vec<ColumnPredicate>,
        fallback_first_k: usize,
    },
    FirstK(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSelection {
    /// Indices into the candidate list.
    pub columns: Vec<usize>,
    pub used_fallback: bool,
}

impl FeaturePolicy {
    pub fn select(&self, candidates: &[&str]) -> FeatureSelection {
        match self {
            FeaturePolicy::AllColumns => FeatureSelection {
                columns: (0..candidates.len()).collect(),
                used_fallback: false,
            },
            FeaturePolicy::FirstK(k) => FeatureSelection {
                columns: (0..candidates.len().min(*k)).collect(),
                used_fallback: false,
            },
            FeaturePolicy::Matching {
                predicates,
                fallback_first_k,
            } => {
                let columns: Vec<usize> = candidates
                    .iter()
                    .enumerate()
                    .filter(|(_, name)| predicates.iter().any(|p| p.matches(name)))
                    .map(|(i, _)| i)
                    .collect();
                if columns.is_empty() {
                    FeatureSelection {
                        columns: (0..candidates.len().min(*fallback_first_k)).collect(),
                        used_fallback: true,
                    }
                } else {
                    FeatureSelection {
                        columns,
                        used_fallback: false,
                    }
                }
            }
        }
    }
}

/// Parse one raw cell. Empty, unparseable and non-finite cells impute to
/// 0.0; the flag tells whether that happened.
pub fn parse_cell(raw: &str) -> (f32, bool) {
    match raw.trim().parse::<f64>() {
        Ok(v) => {
            let v = v as f32;
            if v.is_finite() {
                (v, false)
            } else {
                (0.0, true)
            }
        }
        Err(_) => (0.0, true),
    }
}

/// Standardize every column in place: `(x - mean) / (std + eps)` with the
/// sample standard deviation, then zero any non-finite result.
///
/// Expects already-imputed input. A constant column comes out as exactly 0.0.
pub fn normalize_columns(x: &mut Array2<f32>) {
    for mut column in x.columns_mut() {
        let n = column.len();
        if n == 0 {
            continue;
        }

        let first = column[0];
        let constant = column.iter().all(|&v| v == first);
        let mean = if constant {
            first as f64
        } else {
            column.iter().map(|&v| v as f64).sum::<f64>() / n as f64
        };
        let std = if n > 1 {
            let ss: f64 = column.iter().map(|&v| (v as f64 - mean).powi(2)).sum();
            (ss / (n - 1) as f64).sqrt()
        } else {
            f64::NAN
        };

        for v in column.iter_mut() {
            let z = ((*v as f64 - mean) / (std + NORM_EPSILON)) as f32;
            *v = if z.is_finite() { z } else { 0.0 };
        }
    }
}
