//! Pricing and savings boundaries
//!
//! Price lookup tables and savings math live outside the engine; these
//! traits are the seam. The static implementations back the scanner and
//! the tests.

use crate::models::{CandidateShape, GeneralAction, ScheduleWindow, Shape};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Hours in the billing month the flat savings model assumes
const HOURS_PER_MONTH: f64 = 730.0;

/// Per-customer purchase context
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PurchaseContext {
    pub customer: String,
    pub region: String,
    pub os: String,
}

/// Attaches prices to candidate shapes; a shape without a known price is
/// silently left unpriced.
pub trait PricingSource: Send + Sync {
    fn add_price(&self, candidates: &mut [CandidateShape], context: &PurchaseContext);

    /// Hourly price of a single shape, if known
    fn price_of(&self, shape_name: &str, context: &PurchaseContext) -> Option<f64>;
}

/// Estimated monthly saving attached to a recommendation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SavingsRecord {
    pub monthly: f64,
}

/// Computes the savings figure for a chosen set of general actions
pub trait SavingsCalculator: Send + Sync {
    fn calculate(
        &self,
        general_actions: &[GeneralAction],
        current_shape: &Shape,
        recommended_shapes: &[CandidateShape],
        schedule: &[ScheduleWindow],
        context: &PurchaseContext,
    ) -> Option<SavingsRecord>;
}

/// Name-keyed hourly price table
#[derive(Debug, Default)]
pub struct StaticPricing {
    prices: HashMap<String, f64>,
}

impl StaticPricing {
    pub fn new(prices: HashMap<String, f64>) -> Self {
        Self { prices }
    }
}

impl PricingSource for StaticPricing {
    fn add_price(&self, candidates: &mut [CandidateShape], _context: &PurchaseContext) {
        for candidate in candidates {
            if let Some(price) = self.prices.get(&candidate.shape.name) {
                candidate.price = Some(*price);
            }
        }
    }

    fn price_of(&self, shape_name: &str, _context: &PurchaseContext) -> Option<f64> {
        self.prices.get(shape_name).copied()
    }
}

/// Flat savings model: shutdown saves the full bill, a schedule saves
/// the off-window share, a resize saves the price delta to the cheapest
/// recommended shape.
pub struct FlatSavings<P> {
    pricing: P,
}

impl<P: PricingSource> FlatSavings<P> {
    pub fn new(pricing: P) -> Self {
        Self { pricing }
    }

    fn weekly_on_hours(schedule: &[ScheduleWindow]) -> f64 {
        schedule
            .iter()
            .map(|w| {
                let minutes = window_minutes(w);
                minutes / 60.0 * w.weekdays.len() as f64
            })
            .sum()
    }
}

fn parse_minutes(hhmm: &str) -> Option<f64> {
    let (h, m) = hhmm.split_once(':')?;
    let hours: f64 = h.parse().ok()?;
    let minutes: f64 = m.parse().ok()?;
    Some(hours * 60.0 + minutes)
}

/// Minutes covered by one window; a "00:00" stop closes at end of day
fn window_minutes(window: &ScheduleWindow) -> f64 {
    let start = parse_minutes(&window.start).unwrap_or(0.0);
    let stop = match parse_minutes(&window.stop) {
        Some(m) if m > start => m,
        _ => 24.0 * 60.0,
    };
    stop - start
}

impl<P: PricingSource> SavingsCalculator for FlatSavings<P> {
    fn calculate(
        &self,
        general_actions: &[GeneralAction],
        current_shape: &Shape,
        recommended_shapes: &[CandidateShape],
        schedule: &[ScheduleWindow],
        context: &PurchaseContext,
    ) -> Option<SavingsRecord> {
        let current_price = self.pricing.price_of(&current_shape.name, context)?;
        let current_monthly = current_price * HOURS_PER_MONTH;

        for action in general_actions {
            match action {
                GeneralAction::Shutdown => {
                    return Some(SavingsRecord {
                        monthly: current_monthly,
                    });
                }
                GeneralAction::Schedule => {
                    let on_share =
                        (Self::weekly_on_hours(schedule) / (7.0 * 24.0)).clamp(0.0, 1.0);
                    return Some(SavingsRecord {
                        monthly: current_monthly * (1.0 - on_share),
                    });
                }
                GeneralAction::ScaleDown
                | GeneralAction::ScaleUp
                | GeneralAction::ChangeShape
                | GeneralAction::Split => {
                    let cheapest = recommended_shapes
                        .iter()
                        .filter_map(|c| c.price)
                        .fold(f64::INFINITY, f64::min);
                    if cheapest.is_finite() {
                        return Some(SavingsRecord {
                            monthly: (current_price - cheapest) * HOURS_PER_MONTH,
                        });
                    }
                }
                GeneralAction::Empty | GeneralAction::Error => {}
            }
        }
        None
    }
}
