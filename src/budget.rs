//! Compute budgeter. Value-threaded: every allocation returns a new
//! `ComputeBudgeter` rather than mutating shared state in place.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::types::{ComputeBudget, DifficultyLevel};

#[derive(Debug, Clone, Copy)]
pub struct CustomAllocationOptions {
    pub use_prm: bool,
    pub use_search: bool,
    pub max_refinements: u32,
    pub search_iterations: u32,
}

impl Default for CustomAllocationOptions {
    fn default() -> Self {
        Self {
            use_prm: false,
            use_search: false,
            max_refinements: 0,
            search_iterations: 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct UsageStats {
    pub used_budget: f64,
    pub allocation_count: u32,
    pub average_cost: f64,
}

/// Either a bounded total or an unbounded remaining-budget report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RemainingBudget {
    Unbounded,
    Bounded(f64),
}

#[derive(Debug, Clone)]
pub struct ComputeBudgeter {
    global_limit: Option<f64>,
    used_budget: f64,
    allocation_count: u32,
    level_budgets: HashMap<String, ComputeBudget>,
    custom_budgets: HashMap<String, ComputeBudget>,
}

impl ComputeBudgeter {
    pub fn new() -> Self {
        let mut level_budgets = HashMap::new();
        level_budgets.insert("easy".to_string(), ComputeBudget::easy());
        level_budgets.insert("medium".to_string(), ComputeBudget::medium());
        level_budgets.insert("hard".to_string(), ComputeBudget::hard());
        Self {
            global_limit: None,
            used_budget: 0.0,
            allocation_count: 0,
            level_budgets,
            custom_budgets: HashMap::new(),
        }
    }

    pub fn with_global_limit(mut self, global_limit: f64) -> Self {
        self.global_limit = Some(global_limit);
        self
    }

    /// Override the canonical preset for a level.
    pub fn with_level_budget(mut self, level: DifficultyLevel, budget: ComputeBudget) -> Self {
        self.level_budgets.insert(level.as_str().to_string(), budget);
        self
    }

    pub fn used_budget(&self) -> f64 {
        self.used_budget
    }

    pub fn allocation_count(&self) -> u32 {
        self.allocation_count
    }

    /// `custom_allocation(budgeter, N, options)` — builds and registers a
    /// named custom budget without consuming the limit; `N≤0` fails with
    /// `invalid_num_candidates`.
    pub fn custom_allocation(
        &self,
        name: impl Into<String>,
        num_candidates: i64,
        options: CustomAllocationOptions,
    ) -> Result<Self> {
        if num_candidates <= 0 {
            return Err(Error::InvalidNumCandidates(num_candidates));
        }
        let budget = ComputeBudget::new(num_candidates as u32)?
            .with_prm(options.use_prm)
            .with_search(options.use_search, options.search_iterations)
            .with_max_refinements(options.max_refinements);
        let mut next = self.clone();
        next.custom_budgets.insert(name.into(), budget);
        Ok(next)
    }

    fn resolve(&self, level_or_tag: &str) -> Result<ComputeBudget> {
        if let Some(b) = self.level_budgets.get(level_or_tag) {
            return Ok(*b);
        }
        if let Some(b) = self.custom_budgets.get(level_or_tag) {
            return Ok(*b);
        }
        Err(Error::UnknownLevel(level_or_tag.to_string()))
    }

    /// `allocate(budgeter, DifficultyEstimate | level_tag)` — resolves the
    /// tag to a `ComputeBudget` and attempts to admit its cost against the
    /// global limit. On success returns `(budget, budgeter')`; on failure
    /// the budgeter is returned unchanged alongside `budget_exhausted`.
    pub fn allocate(&self, level_or_tag: &str) -> Result<(ComputeBudget, Self)> {
        let budget = self.resolve(level_or_tag)?;
        self.admit(budget)
    }

    pub fn allocate_level(&self, level: DifficultyLevel) -> Result<(ComputeBudget, Self)> {
        self.allocate(level.as_str())
    }

    fn admit(&self, budget: ComputeBudget) -> Result<(ComputeBudget, Self)> {
        let cost = budget.cost();
        if let Some(limit) = self.global_limit {
            if self.used_budget + cost > limit {
                return Err(Error::budget_exhausted("compute_budget"));
            }
        }
        let mut next = self.clone();
        next.used_budget += cost;
        next.allocation_count += 1;
        Ok((budget, next))
    }

    pub fn check_budget(&self, cost: f64) -> bool {
        match self.global_limit {
            Some(limit) => self.used_budget + cost <= limit,
            None => true,
        }
    }

    pub fn remaining_budget(&self) -> RemainingBudget {
        match self.global_limit {
            Some(limit) => RemainingBudget::Bounded(limit - self.used_budget),
            None => RemainingBudget::Unbounded,
        }
    }

    pub fn budget_exhausted(&self) -> bool {
        matches!(self.remaining_budget(), RemainingBudget::Bounded(r) if r <= 0.0)
    }

    /// Track externally-incurred usage (e.g. a generator that reported a
    /// cost out of band) without going through `allocate`.
    pub fn track_usage(&self, cost: f64) -> Self {
        let mut next = self.clone();
        next.used_budget += cost;
        next.allocation_count += 1;
        next
    }

    pub fn reset_budget(&self) -> Self {
        let mut next = self.clone();
        next.used_budget = 0.0;
        next.allocation_count = 0;
        next
    }

    pub fn get_usage_stats(&self) -> UsageStats {
        let average_cost = if self.allocation_count == 0 {
            0.0
        } else {
            self.used_budget / self.allocation_count as f64
        };
        UsageStats {
            used_budget: self.used_budget,
            allocation_count: self.allocation_count,
            average_cost,
        }
    }
}

impl Default for ComputeBudgeter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_by_canonical_level() {
        let budgeter = ComputeBudgeter::new().with_global_limit(100.0);
        let (budget, next) = budgeter.allocate_level(DifficultyLevel::Hard).unwrap();
        assert_eq!(budget.num_candidates, 10);
        assert!(budget.use_prm && budget.use_search);
        assert_eq!(budget.search_iterations, 50);
        assert!((budget.cost() - 17.5).abs() < 1e-9);
        assert_eq!(next.allocation_count(), 1);
    }

    #[test]
    fn unknown_level_tag_fails() {
        let budgeter = ComputeBudgeter::new();
        assert!(matches!(budgeter.allocate("nonsense"), Err(Error::UnknownLevel(_))));
    }

    #[test]
    fn custom_allocation_rejects_non_positive_n() {
        let budgeter = ComputeBudgeter::new();
        let result = budgeter.custom_allocation("my-tag", 0, CustomAllocationOptions::default());
        assert!(matches!(result, Err(Error::InvalidNumCandidates(0))));
    }

    #[test]
    fn budget_exhaustion_leaves_state_unchanged() {
        let budgeter = ComputeBudgeter::new().with_global_limit(5.0);
        let (_, budgeter) = budgeter.allocate_level(DifficultyLevel::Easy).unwrap(); // cost 3.0
        let before = budgeter.used_budget();
        let result = budgeter.allocate_level(DifficultyLevel::Hard); // cost 17.5
        assert!(matches!(result, Err(Error::BudgetExhausted { .. })));
        assert_eq!(budgeter.used_budget(), before);
        assert_eq!(budgeter.remaining_budget(), RemainingBudget::Bounded(2.0));
    }

    #[test]
    fn unbounded_budgeter_always_admits() {
        let budgeter = ComputeBudgeter::new();
        let (_, budgeter) = budgeter.allocate_level(DifficultyLevel::Hard).unwrap();
        assert_eq!(budgeter.remaining_budget(), RemainingBudget::Unbounded);
    }

    #[test]
    fn average_cost_is_zero_with_no_allocations() {
        let budgeter = ComputeBudgeter::new();
        assert_eq!(budgeter.get_usage_stats().average_cost, 0.0);
    }

    #[test]
    fn reset_budget_clears_usage() {
        let budgeter = ComputeBudgeter::new().with_global_limit(100.0);
        let (_, budgeter) = budgeter.allocate_level(DifficultyLevel::Medium).unwrap();
        let reset = budgeter.reset_budget();
        assert_eq!(reset.used_budget(), 0.0);
        assert_eq!(reset.allocation_count(), 0);
    }

    proptest::proptest! {
        #[test]
        fn successful_allocations_never_exceed_global_limit(
            limit in 10.0f64..200.0,
            costs in proptest::collection::vec(1u32..20, 1..10),
        ) {
            let mut budgeter = ComputeBudgeter::new().with_global_limit(limit);
            let mut total = 0.0;
            for n in costs {
                match budgeter.custom_allocation("tag", n as i64, CustomAllocationOptions::default()) {
                    Ok(with_custom) => {
                        match with_custom.allocate("tag") {
                            Ok((budget, next)) => {
                                total += budget.cost();
                                budgeter = next;
                            }
                            Err(_) => {}
                        }
                    }
                    Err(_) => {}
                }
            }
            proptest::prop_assert!(total <= limit + 1e-9);
            proptest::prop_assert!(budgeter.used_budget() <= limit + 1e-9);
        }
    }
}
