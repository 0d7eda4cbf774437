//! Time-to-event pricing.
//!
//! Prices are a pure function of the base price, the event start time and
//! "now": the active tier is the one with the largest day threshold not
//! exceeding the whole days left before the event.

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::Event;

const SECONDS_PER_DAY: i64 = 86_400;

/// Largest tolerated gap between a client-acknowledged price and the current
/// price, in currency units.
pub const PRICE_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PricingError {
    #[error("Pricing table must contain at least one tier")]
    EmptyTable,

    #[error("Pricing tiers must have strictly descending thresholds ending at 0 days")]
    UnorderedThresholds,

    #[error("Pricing multipliers must not decrease as the event approaches")]
    DecreasingMultiplier,

    #[error("Malformed pricing tier '{0}', expected <days>:<multiplier>")]
    Malformed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingTier {
    pub min_days: i64,
    pub multiplier: Decimal,
}

impl PricingTier {
    pub fn new(min_days: i64, multiplier: Decimal) -> Self {
        Self {
            min_days,
            multiplier,
        }
    }
}

/// One row of the pricing timeline projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub start_date: DateTime<Utc>,
    pub days_before_event: i64,
    pub price_multiplier: Decimal,
    pub price: Decimal,
    pub percentage_increase: Decimal,
}

/// Cost breakdown for buying `number_of_tickets` at the current price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub base_price_per_ticket: Decimal,
    pub current_price_per_ticket: Decimal,
    pub number_of_tickets: u32,
    pub total_cost: Decimal,
    pub days_until_event: i64,
    pub price_multiplier: Decimal,
    pub premium_over_base: Decimal,
    pub pricing_timeline: Vec<TimelineEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPricing {
    pub event_id: Uuid,
    pub event_name: String,
    pub event_start_time: DateTime<Utc>,
    pub base_price: Decimal,
    pub current_price: Decimal,
    pub days_until_event: i64,
    pub current_multiplier: Decimal,
    pub pricing_timeline: Vec<TimelineEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricingEngine {
    // Sorted by `min_days`, furthest first.
    tiers: Vec<PricingTier>,
}

impl Default for PricingEngine {
    fn default() -> Self {
        Self {
            tiers: vec![
                PricingTier::new(28, Decimal::new(100, 2)),
                PricingTier::new(21, Decimal::new(125, 2)),
                PricingTier::new(14, Decimal::new(150, 2)),
                PricingTier::new(7, Decimal::new(175, 2)),
                PricingTier::new(0, Decimal::new(200, 2)),
            ],
        }
    }
}

impl PricingEngine {
    /// Builds an engine from a custom tier table, given furthest tier first.
    pub fn new(tiers: Vec<PricingTier>) -> Result<Self, PricingError> {
        let last = tiers.last().ok_or(PricingError::EmptyTable)?;
        if last.min_days != 0 {
            return Err(PricingError::UnorderedThresholds);
        }

        for pair in tiers.windows(2) {
            if pair[0].min_days <= pair[1].min_days {
                return Err(PricingError::UnorderedThresholds);
            }
            if pair[0].multiplier > pair[1].multiplier {
                return Err(PricingError::DecreasingMultiplier);
            }
        }

        Ok(Self { tiers })
    }

    pub fn tiers(&self) -> &[PricingTier] {
        &self.tiers
    }

    /// Renders the table in the format [`FromStr`] accepts.
    pub fn describe(&self) -> String {
        self.tiers
            .iter()
            .map(|tier| format!("{}:{}", tier.min_days, tier.multiplier))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Whole days from `now` until `start_time`, rounded toward negative
    /// infinity so an event that started an hour ago is at day -1.
    pub fn days_until(start_time: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
        (start_time - now).num_seconds().div_euclid(SECONDS_PER_DAY)
    }

    /// Negative day counts fall through to the nearest (highest) tier.
    pub fn multiplier(&self, days_until_event: i64) -> Decimal {
        self.tiers
            .iter()
            .find(|tier| days_until_event >= tier.min_days)
            .or_else(|| self.tiers.last())
            .map(|tier| tier.multiplier)
            .unwrap_or(Decimal::ONE)
    }

    pub fn price(&self, base_price: Decimal, start_time: DateTime<Utc>, now: DateTime<Utc>) -> Decimal {
        let days = Self::days_until(start_time, now);
        (base_price * self.multiplier(days)).round_dp(2)
    }

    pub fn timeline(
        &self,
        base_price: Decimal,
        start_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Vec<TimelineEntry> {
        let mut timeline: Vec<TimelineEntry> = self
            .tiers
            .iter()
            .map(|tier| {
                let tier_start = start_time - Duration::days(tier.min_days);
                TimelineEntry {
                    start_date: tier_start.max(now),
                    days_before_event: tier.min_days,
                    price_multiplier: tier.multiplier,
                    price: (base_price * tier.multiplier).round_dp(2),
                    percentage_increase: ((tier.multiplier - Decimal::ONE) * Decimal::ONE_HUNDRED)
                        .round_dp(0),
                }
            })
            .collect();

        timeline.sort_by(|a, b| b.days_before_event.cmp(&a.days_before_event));
        timeline
    }

    pub fn quote(
        &self,
        base_price: Decimal,
        start_time: DateTime<Utc>,
        number_of_tickets: u32,
        now: DateTime<Utc>,
    ) -> PriceQuote {
        let days = Self::days_until(start_time, now).max(0);
        let current = self.price(base_price, start_time, now);
        let tickets = Decimal::from(number_of_tickets);
        let total_cost = (current * tickets).round_dp(2);

        let premium_over_base = if current > base_price {
            (total_cost - base_price * tickets).round_dp(2)
        } else {
            Decimal::ZERO
        };

        PriceQuote {
            base_price_per_ticket: base_price,
            current_price_per_ticket: current,
            number_of_tickets,
            total_cost,
            days_until_event: days,
            price_multiplier: self.multiplier(days),
            premium_over_base,
            pricing_timeline: self.timeline(base_price, start_time, now),
        }
    }

    pub fn event_pricing(&self, event: &Event, now: DateTime<Utc>) -> EventPricing {
        let days = Self::days_until(event.start_time, now).max(0);

        EventPricing {
            event_id: event.id,
            event_name: event.name.clone(),
            event_start_time: event.start_time,
            base_price: event.base_price,
            current_price: self.price(event.base_price, event.start_time, now),
            days_until_event: days,
            current_multiplier: self.multiplier(days),
            pricing_timeline: self.timeline(event.base_price, event.start_time, now),
        }
    }
}

/// Parses `28:1.00,21:1.25,...`, furthest tier first.
impl FromStr for PricingEngine {
    type Err = PricingError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let tiers = raw
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| {
                let (days, multiplier) = part
                    .split_once(':')
                    .ok_or_else(|| PricingError::Malformed(part.to_string()))?;
                let days = days
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| PricingError::Malformed(part.to_string()))?;
                let multiplier = multiplier
                    .trim()
                    .parse::<Decimal>()
                    .map_err(|_| PricingError::Malformed(part.to_string()))?;
                Ok(PricingTier::new(days, multiplier))
            })
            .collect::<Result<Vec<_>, PricingError>>()?;

        Self::new(tiers)
    }
}

/// True when the acknowledged price is within [`PRICE_TOLERANCE`] of `current`.
pub fn price_matches(current: Decimal, acknowledged: Decimal) -> bool {
    (current - acknowledged).abs() <= PRICE_TOLERANCE
}
