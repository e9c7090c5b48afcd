//! Kitchen consolidation.
//!
//! Folds a set of in-production orders into per-dish production counts
//! (`dish_totals`) and per-dish-and-portion special counts
//! (`special_totals`). The fold starts from empty maps on every call and
//! reads nothing but its arguments, so recomputing after a refresh is just
//! calling it again.
//!
//! Keys are used exactly as written in menu text and carts: `"Poulet"` and
//! `"poulet "` are two different lines.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;
use uuid::Uuid;

use crate::formula::{self, FormulaDefinitions};
use crate::market_list::{compute_market_list, MarketList};
use crate::orders::{normalize, OrderFilter, OrderKind, OrderRecord};
use crate::special_cart;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidationStats {
    pub formula_orders: usize,
    pub special_orders: usize,
    pub ignored_orders: usize,
    /// Orders whose details could not be repaired and used a fallback.
    pub degraded_details: usize,
}

impl ConsolidationStats {
    fn merge(self, other: Self) -> Self {
        Self {
            formula_orders: self.formula_orders + other.formula_orders,
            special_orders: self.special_orders + other.special_orders,
            ignored_orders: self.ignored_orders + other.ignored_orders,
            degraded_details: self.degraded_details + other.degraded_details,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Consolidation {
    pub dish_totals: BTreeMap<String, i64>,
    pub special_totals: BTreeMap<String, i64>,
    pub stats: ConsolidationStats,
}

impl Consolidation {
    /// Fold one order in.
    pub fn absorb(mut self, order: &OrderRecord, definitions: &FormulaDefinitions) -> Self {
        let Some(normalized) = normalize(order) else {
            self.stats.ignored_orders += 1;
            return self;
        };
        if normalized.degraded {
            self.stats.degraded_details += 1;
        }

        match normalized.kind {
            OrderKind::FormulaMenu => {
                self.stats.formula_orders += 1;
                for line in formula::resolve(&normalized.details, definitions) {
                    add_count(&mut self.dish_totals, line.name, i64::from(line.quantity));
                }
            }
            OrderKind::SpecialCart => {
                self.stats.special_orders += 1;
                for line in special_cart::aggregate(&normalized.details) {
                    add_count(&mut self.special_totals, line.key, line.quantity);
                }
            }
            OrderKind::Other(_) => self.stats.ignored_orders += 1,
        }
        self
    }

    /// Add another result's counts key by key.
    pub fn merge(mut self, other: Self) -> Self {
        for (name, qty) in other.dish_totals {
            add_count(&mut self.dish_totals, name, qty);
        }
        for (key, qty) in other.special_totals {
            add_count(&mut self.special_totals, key, qty);
        }
        self.stats = self.stats.merge(other.stats);
        self
    }

    pub fn market_list(&self) -> MarketList {
        compute_market_list(&self.dish_totals, &self.special_totals)
    }
}

/// Counts come from upstream JSON and saturate instead of overflowing.
fn add_count(totals: &mut BTreeMap<String, i64>, key: String, qty: i64) {
    let total = totals.entry(key).or_insert(0);
    *total = total.saturating_add(qty);
}

/// Consolidate `orders`, which the caller has already filtered by status,
/// date and business unit.
pub fn consolidate(orders: &[OrderRecord], definitions: &FormulaDefinitions) -> Consolidation {
    let result = orders
        .iter()
        .fold(Consolidation::default(), |acc, order| acc.absorb(order, definitions));

    info!(
        orders = orders.len(),
        formula_orders = result.stats.formula_orders,
        special_orders = result.stats.special_orders,
        ignored_orders = result.stats.ignored_orders,
        degraded_details = result.stats.degraded_details,
        dishes = result.dish_totals.len(),
        specials = result.special_totals.len(),
        "consolidation computed"
    );
    result
}

/// A consolidation run as handed to the kitchen: counts, market list, the
/// selection it covers and an identifier printed on paper copies.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidationReport {
    pub report_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub filter: OrderFilter,
    #[serde(flatten)]
    pub consolidation: Consolidation,
    pub market_list: MarketList,
}

impl ConsolidationReport {
    pub fn new(consolidation: Consolidation, filter: OrderFilter) -> Self {
        Self {
            report_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            market_list: consolidation.market_list(),
            filter,
            consolidation,
        }
    }

    /// First 8 hex digits of the report id.
    pub fn short_id(&self) -> String {
        self.report_id.simple().to_string()[..8].to_string()
    }
}
