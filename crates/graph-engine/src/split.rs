use crate::error::{BuildError, Result};
use crate::properties::is_labeled;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// Absorbs float error in `n * frac` (0.7 * 10 = 6.999...).
const FRACTION_TOLERANCE: f64 = 1e-9;

/// Train/val/test masks over one entity, plus the cutoffs that produced them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporalSplit {
    pub train_mask: Vec<bool>,
    pub val_mask: Vec<bool>,
    pub test_mask: Vec<bool>,
    pub train_time_end: u32,
    pub val_time_end: u32,
}

impl TemporalSplit {
    pub fn train_count(&self) -> usize {
        count(&self.train_mask)
    }

    pub fn val_count(&self) -> usize {
        count(&self.val_mask)
    }

    pub fn test_count(&self) -> usize {
        count(&self.test_mask)
    }
}

fn count(mask: &[bool]) -> usize {
    mask.iter().filter(|&&m| m).count()
}

/// Splits by time-step boundaries computed over the distinct time steps, so
/// a crowded step cannot skew the cutoffs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemporalSplitter {
    train_frac: f64,
    val_frac: f64,
}

impl TemporalSplitter {
    pub fn new(train_frac: f64, val_frac: f64) -> Result<Self> {
        let in_unit = |f: f64| (0.0..=1.0).contains(&f);
        if !in_unit(train_frac) || !in_unit(val_frac) {
            return Err(BuildError::InvalidConfig(format!(
                "split fractions must lie in [0, 1], got train={train_frac} val={val_frac}"
            )));
        }
        if train_frac + val_frac > 1.0 + FRACTION_TOLERANCE {
            return Err(BuildError::InvalidConfig(format!(
                "train_frac + val_frac must not exceed 1, got {}",
                train_frac + val_frac
            )));
        }
        Ok(Self {
            train_frac,
            val_frac,
        })
    }

    pub fn split(&self, timestamps: &[u32], labels: &[i8]) -> Result<TemporalSplit> {
        if timestamps.len() != labels.len() {
            return Err(BuildError::Integrity(format!(
                "{} timestamps but {} labels",
                timestamps.len(),
                labels.len()
            )));
        }

        let distinct: Vec<u32> = timestamps
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if distinct.is_empty() {
            return Ok(TemporalSplit {
                train_mask: Vec::new(),
                val_mask: Vec::new(),
                test_mask: Vec::new(),
                train_time_end: 0,
                val_time_end: 0,
            });
        }

        let n = distinct.len();
        let boundary = |frac: f64| {
            let end = (n as f64 * frac + FRACTION_TOLERANCE).floor() as usize;
            distinct[end.clamp(1, n) - 1]
        };
        let train_time_end = boundary(self.train_frac);
        let val_time_end = boundary(self.train_frac + self.val_frac);

        let mut split = TemporalSplit {
            train_mask: vec![false; timestamps.len()],
            val_mask: vec![false; timestamps.len()],
            test_mask: vec![false; timestamps.len()],
            train_time_end,
            val_time_end,
        };
        for (i, (&t, &label)) in timestamps.iter().zip(labels).enumerate() {
            if !is_labeled(label) {
                continue;
            }
            if t <= train_time_end {
                split.train_mask[i] = true;
            } else if t <= val_time_end {
                split.val_mask[i] = true;
            } else {
                split.test_mask[i] = true;
            }
        }
        Ok(split)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_fractions_above_one() {
        assert!(TemporalSplitter::new(0.8, 0.3).is_err());
        assert!(TemporalSplitter::new(-0.1, 0.3).is_err());
        assert!(TemporalSplitter::new(0.7, 0.3).is_ok());
    }

    #[test]
    fn unlabeled_nodes_are_in_no_mask() {
        let split = TemporalSplitter::new(0.5, 0.25)
            .unwrap()
            .split(&[1, 2, 3, 4], &[1, -1, 0, -1])
            .unwrap();
        assert_eq!(split.train_mask, vec![true, false, false, false]);
        assert_eq!(split.val_mask, vec![false, false, true, false]);
        assert_eq!(split.test_mask, vec![false; 4]);
    }

    #[test]
    fn cutoffs_follow_distinct_steps_not_rows() {
        // step 1 holds most rows; cutoffs must not move because of it
        let ts = [1, 1, 1, 1, 1, 1, 2, 3, 4, 5];
        let labels = [0; 10];
        let split = TemporalSplitter::new(0.6, 0.2).unwrap().split(&ts, &labels).unwrap();
        assert_eq!(split.train_time_end, 3);
        assert_eq!(split.val_time_end, 4);
    }

    #[test]
    fn zero_train_fraction_keeps_first_step() {
        let split = TemporalSplitter::new(0.0, 0.5).unwrap().split(&[1, 2, 3, 4], &[0; 4]).unwrap();
        assert_eq!(split.train_time_end, 1);
        assert_eq!(split.val_time_end, 2);
    }
}
