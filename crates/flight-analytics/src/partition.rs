//! Seeded random partitioning of a plan into named subsets.

use crate::error::{AnalyticsError, Result};
use crate::plan::{col, lit, Expr, QueryPlan};
use std::collections::HashSet;

/// Tolerance on the weight sum.
const WEIGHT_TOLERANCE: f64 = 1e-9;

/// Splits a plan into disjoint subsets by a seeded hash of each row.
///
/// A row's draw depends only on its column values and the seed, so the same
/// input and seed always produce the same membership, and identical rows
/// always land together.
#[derive(Debug, Clone, PartialEq)]
pub struct Partitioner {
    seed: u64,
    weights: Vec<(String, f64)>,
}

impl Partitioner {
    /// Weights must be positive, uniquely named and sum to 1.
    pub fn new(seed: u64, weights: &[(&str, f64)]) -> Result<Self> {
        if weights.is_empty() {
            return Err(AnalyticsError::InvalidPartition(
                "at least one subset is required".to_string(),
            ));
        }
        let mut names = HashSet::new();
        for (name, weight) in weights {
            if name.is_empty() || !names.insert(*name) {
                return Err(AnalyticsError::InvalidPartition(format!(
                    "subset names must be unique and non-empty, got '{name}'"
                )));
            }
            if !weight.is_finite() || *weight <= 0.0 {
                return Err(AnalyticsError::InvalidPartition(format!(
                    "weight for '{name}' must be positive, got {weight}"
                )));
            }
        }
        let total: f64 = weights.iter().map(|(_, w)| w).sum();
        if (total - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(AnalyticsError::InvalidPartition(format!(
                "weights sum to {total}, expected 1"
            )));
        }
        Ok(Self {
            seed,
            weights: weights
                .iter()
                .map(|(n, w)| ((*n).to_string(), *w))
                .collect(),
        })
    }

    /// Two-way `train`/`valid` split.
    pub fn train_valid(seed: u64, train: f64) -> Result<Self> {
        Self::new(seed, &[("train", train), ("valid", 1.0 - train)])
    }

    /// Hash seed.
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    /// Subset names and weights, in split order.
    pub fn weights(&self) -> &[(String, f64)] {
        &self.weights
    }

    /// One lazy plan per subset, in weight order.
    pub fn split(&self, plan: &QueryPlan) -> Result<Partitions> {
        let draw = Expr::UnitHash {
            seed: self.seed,
            args: plan.columns().iter().map(|c| col(c)).collect(),
        };

        let mut subsets = Vec::with_capacity(self.weights.len());
        let mut lower = 0.0;
        let last = self.weights.len() - 1;
        for (i, (name, weight)) in self.weights.iter().enumerate() {
            let upper = lower + weight;
            // The last subset takes everything above its lower bound so
            // rounding in the cumulative sum cannot drop rows.
            let predicate = if i == last {
                draw.clone().ge(lit(lower))
            } else {
                draw.clone().ge(lit(lower)).and(draw.clone().lt(lit(upper)))
            };
            subsets.push((name.clone(), plan.clone().filter(predicate)?));
            lower = upper;
        }
        Ok(Partitions { subsets })
    }
}

/// Named subsets produced by [`Partitioner::split`].
#[derive(Debug, Clone)]
pub struct Partitions {
    subsets: Vec<(String, QueryPlan)>,
}

impl Partitions {
    /// Subset plan by name.
    pub fn get(&self, name: &str) -> Option<&QueryPlan> {
        self.subsets
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, plan)| plan)
    }

    /// Subset plan, or [`AnalyticsError::InvalidPartition`] if it is not defined.
    pub fn subset(&self, name: &str) -> Result<&QueryPlan> {
        self.get(name).ok_or_else(|| {
            AnalyticsError::InvalidPartition(format!("no subset named '{name}'"))
        })
    }

    /// Subsets in weight order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &QueryPlan)> {
        self.subsets.iter().map(|(n, p)| (n.as_str(), p))
    }

    /// Number of subsets.
    pub fn len(&self) -> usize {
        self.subsets.len()
    }

    /// Whether no subsets are defined.
    pub fn is_empty(&self) -> bool {
        self.subsets.is_empty()
    }
}
