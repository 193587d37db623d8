use serde::{Deserialize, Serialize};

const ENABLE_LOGS: bool = true;

use crate::log_warn;

/// Annual per-person emissions compatible with a 2°C pathway.
pub const ANNUAL_BUDGET_KG: f64 = 2300.0;
pub const DEFAULT_DAILY_BUDGET_KG: f64 = ANNUAL_BUDGET_KG / 365.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BudgetStatus {
    pub daily_budget_kg: f64,
    pub used_kg: f64,
    pub remaining_kg: f64,
    pub percentage_used: f64,
    pub exceeded: bool,
}

/// Compare cumulative usage with a daily budget. Stateless; the caller owns
/// the running total.
pub fn status(used_kg: f64, daily_budget_kg: Option<f64>) -> BudgetStatus {
    let daily_budget_kg = match daily_budget_kg {
        Some(budget) if budget.is_finite() && budget > 0.0 => budget,
        Some(budget) => {
            log_warn!(
                "invalid daily carbon budget {budget}kg, using default {DEFAULT_DAILY_BUDGET_KG:.3}kg"
            );
            DEFAULT_DAILY_BUDGET_KG
        }
        None => DEFAULT_DAILY_BUDGET_KG,
    };

    BudgetStatus {
        daily_budget_kg,
        used_kg,
        remaining_kg: (daily_budget_kg - used_kg).max(0.0),
        percentage_used: used_kg / daily_budget_kg * 100.0,
        exceeded: used_kg > daily_budget_kg,
    }
}
