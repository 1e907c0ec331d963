//! Batch sizing for rolling mutations.

use helmsman_core::config::RollingConfig;
use serde::{Deserialize, Serialize};

use crate::error::{RolloutError, RolloutResult};

/// How a fleet of `total_units` is split into sequential batches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchPlan {
    pub total_units: u32,
    pub batch_size_percentage: u32,
    pub error_tolerance_percentage: u32,
    /// Units per batch; only the last batch may be smaller.
    pub batch_size: u32,
    /// Unit count of each batch, in execution order.
    pub batches: Vec<u32>,
    /// Failed units tolerated before the run aborts.
    pub error_budget: u32,
}

impl BatchPlan {
    pub fn new(
        total_units: u32,
        batch_size_percentage: u32,
        error_tolerance_percentage: u32,
    ) -> RolloutResult<Self> {
        if !(1..=100).contains(&batch_size_percentage) {
            return Err(RolloutError::InvalidPlan(format!(
                "batch size percentage must be 1-100, got {batch_size_percentage}"
            )));
        }
        if error_tolerance_percentage > 100 {
            return Err(RolloutError::InvalidPlan(format!(
                "error tolerance percentage must be 0-100, got {error_tolerance_percentage}"
            )));
        }

        let total = u64::from(total_units);
        // Both results are bounded by total_units.
        let batch_size =
            (total * u64::from(batch_size_percentage)).div_ceil(100).max(1) as u32;
        let error_budget = (total * u64::from(error_tolerance_percentage) / 100) as u32;

        let mut batches = Vec::with_capacity(total_units.div_ceil(batch_size) as usize);
        let mut remaining = total_units;
        while remaining > 0 {
            let size = batch_size.min(remaining);
            batches.push(size);
            remaining -= size;
        }

        Ok(Self {
            total_units,
            batch_size_percentage,
            error_tolerance_percentage,
            batch_size,
            batches,
            error_budget,
        })
    }

    pub fn from_config(total_units: u32, rolling: &RollingConfig) -> RolloutResult<Self> {
        Self::new(
            total_units,
            rolling.batch_size_percentage,
            rolling.error_tolerance_percentage,
        )
    }

    pub fn num_batches(&self) -> usize {
        self.batches.len()
    }

    /// Split `units` into the planned batches.
    pub fn split<'a, T>(&self, units: &'a [T]) -> RolloutResult<Vec<&'a [T]>> {
        if units.len() != self.total_units as usize {
            return Err(RolloutError::UnitCountMismatch {
                planned: self.total_units,
                given: units.len(),
            });
        }
        let mut out = Vec::with_capacity(self.batches.len());
        let mut start = 0usize;
        for &size in &self.batches {
            let end = start + size as usize;
            out.push(&units[start..end]);
            start = end;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn twenty_three_units_ten_percent() {
        let plan = BatchPlan::new(23, 10, 5).unwrap();
        assert_eq!(plan.batch_size, 3);
        assert_eq!(plan.num_batches(), 8);
        assert_eq!(plan.batches.last(), Some(&2));
        assert_eq!(plan.batches.iter().sum::<u32>(), 23);
        assert_eq!(plan.error_budget, 1);
    }

    #[test]
    fn tiny_percentage_still_moves_one_unit() {
        let plan = BatchPlan::new(5, 1, 0).unwrap();
        assert_eq!(plan.batch_size, 1);
        assert_eq!(plan.batches, vec![1; 5]);
        assert_eq!(plan.error_budget, 0);
    }

    #[test]
    fn full_percentage_is_one_batch() {
        let plan = BatchPlan::new(7, 100, 100).unwrap();
        assert_eq!(plan.batches, vec![7]);
        assert_eq!(plan.error_budget, 7);
    }

    #[test]
    fn empty_fleet_has_no_batches() {
        let plan = BatchPlan::new(0, 25, 10).unwrap();
        assert_eq!(plan.batch_size, 1);
        assert!(plan.batches.is_empty());
        assert_eq!(plan.error_budget, 0);
    }

    #[test]
    fn percentages_out_of_range_rejected() {
        assert!(matches!(
            BatchPlan::new(10, 0, 0),
            Err(RolloutError::InvalidPlan(_))
        ));
        assert!(matches!(
            BatchPlan::new(10, 101, 0),
            Err(RolloutError::InvalidPlan(_))
        ));
        assert!(matches!(
            BatchPlan::new(10, 50, 101),
            Err(RolloutError::InvalidPlan(_))
        ));
    }

    #[test]
    fn split_follows_batches() {
        let units: Vec<String> = (0..5).map(|i| format!("i-{i}")).collect();
        let plan = BatchPlan::new(5, 40, 0).unwrap();
        let batches = plan.split(&units).unwrap();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0], &units[0..2]);
        assert_eq!(batches[2], &units[4..5]);

        assert!(matches!(
            plan.split(&units[..4]),
            Err(RolloutError::UnitCountMismatch { planned: 5, given: 4 })
        ));
    }

    #[test]
    fn from_config_uses_rolling_section() {
        let rolling = RollingConfig {
            batch_size_percentage: 50,
            error_tolerance_percentage: 20,
            canary_percent: None,
        };
        let plan = BatchPlan::from_config(10, &rolling).unwrap();
        assert_eq!(plan.batches, vec![5, 5]);
        assert_eq!(plan.error_budget, 2);
    }
}
