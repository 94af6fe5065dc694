//! Consumption tax rate lookup.
//!
//! Consumption tax (消費税) rates change on fixed dates.  The schedule
//! is a list of periods, each effective from its start date until the
//! next one begins.

use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::TaxError;
use crate::money::Rate;

/// Which consumption tax rate a sale falls under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumptionCategory {
    /// Everything not eligible for the reduced rate.
    #[default]
    Standard,
    /// Reduced rate for food and newspapers (軽減税率).
    Reduced,
}

impl FromStr for ConsumptionCategory {
    type Err = TaxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(ConsumptionCategory::Standard),
            "reduced" => Ok(ConsumptionCategory::Reduced),
            other => Err(TaxError::invalid_input(
                "category",
                other,
                "expected `standard` or `reduced`",
            )),
        }
    }
}

/// Rates in force from `effective_from` until the next period starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumptionRatePeriod {
    /// First day the rates apply.
    pub effective_from: NaiveDate,
    /// Combined national and local standard rate.
    pub standard: Rate,
    /// Combined reduced rate; equal to `standard` before reduced rates existed.
    pub reduced: Rate,
}

/// Rate periods sorted by start date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ConsumptionRatePeriod>", into = "Vec<ConsumptionRatePeriod>")]
pub struct ConsumptionSchedule(Vec<ConsumptionRatePeriod>);

/// The rate that applies on a date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumptionTaxRate {
    pub rate: Rate,
    pub category: ConsumptionCategory,
    /// Start of the period the rate was taken from.
    pub applicable_from: NaiveDate,
    pub target_date: NaiveDate,
}

impl ConsumptionSchedule {
    pub fn new(mut periods: Vec<ConsumptionRatePeriod>) -> Result<Self, TaxError> {
        if periods.is_empty() {
            return Err(TaxError::Configuration(
                "consumption tax schedule must not be empty".into(),
            ));
        }
        periods.sort_by_key(|p| p.effective_from);
        if periods
            .windows(2)
            .any(|pair| pair[0].effective_from == pair[1].effective_from)
        {
            return Err(TaxError::Configuration(
                "two consumption tax periods start on the same date".into(),
            ));
        }
        Ok(ConsumptionSchedule(periods))
    }

    /// Rate in force on `date`: the latest period starting on or before
    /// it.  Dates before the first period get the first period's rate.
    pub fn rate_on(&self, date: NaiveDate, category: ConsumptionCategory) -> ConsumptionTaxRate {
        let period = self
            .0
            .iter()
            .rev()
            .find(|p| p.effective_from <= date)
            .unwrap_or(&self.0[0]);
        let rate = match category {
            ConsumptionCategory::Standard => period.standard,
            ConsumptionCategory::Reduced => period.reduced,
        };
        ConsumptionTaxRate {
            rate,
            category,
            applicable_from: period.effective_from,
            target_date: date,
        }
    }
}

impl Default for ConsumptionSchedule {
    fn default() -> Self {
        let periods = [
            ((1997, 4, 1), 50_000, 50_000),
            ((2014, 4, 1), 80_000, 80_000),
            ((2019, 10, 1), 100_000, 80_000),
        ]
        .into_iter()
        .filter_map(|((y, m, d), standard, reduced)| {
            NaiveDate::from_ymd_opt(y, m, d).map(|effective_from| ConsumptionRatePeriod {
                effective_from,
                standard: Rate::from_ppm(standard),
                reduced: Rate::from_ppm(reduced),
            })
        })
        .collect();
        ConsumptionSchedule(periods)
    }
}

impl TryFrom<Vec<ConsumptionRatePeriod>> for ConsumptionSchedule {
    type Error = TaxError;

    fn try_from(periods: Vec<ConsumptionRatePeriod>) -> Result<Self, Self::Error> {
        ConsumptionSchedule::new(periods)
    }
}

impl From<ConsumptionSchedule> for Vec<ConsumptionRatePeriod> {
    fn from(schedule: ConsumptionSchedule) -> Self {
        schedule.0
    }
}

/// Parse an ISO `YYYY-MM-DD` date.
pub fn parse_date(value: &str) -> Result<NaiveDate, TaxError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| TaxError::invalid_input("date", value, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    #[test]
    fn current_rates() {
        let schedule = ConsumptionSchedule::default();
        let standard = schedule.rate_on(date("2025-06-01"), ConsumptionCategory::Standard);
        assert_eq!(standard.rate, Rate::from_ppm(100_000));
        assert_eq!(standard.applicable_from, date("2019-10-01"));

        let reduced = schedule.rate_on(date("2025-06-01"), ConsumptionCategory::Reduced);
        assert_eq!(reduced.rate, Rate::from_ppm(80_000));
    }

    #[test]
    fn change_date_belongs_to_new_period() {
        let schedule = ConsumptionSchedule::default();
        assert_eq!(
            schedule.rate_on(date("2019-09-30"), ConsumptionCategory::Standard).rate,
            Rate::from_ppm(80_000)
        );
        assert_eq!(
            schedule.rate_on(date("2019-10-01"), ConsumptionCategory::Standard).rate,
            Rate::from_ppm(100_000)
        );
    }

    #[test]
    fn dates_before_schedule_use_first_period() {
        let rate = ConsumptionSchedule::default().rate_on(date("1990-01-01"), ConsumptionCategory::Standard);
        assert_eq!(rate.rate, Rate::from_ppm(50_000));
        assert_eq!(rate.applicable_from, date("1997-04-01"));
    }

    #[test]
    fn rejects_unknown_category_and_bad_dates() {
        assert!("luxury".parse::<ConsumptionCategory>().is_err());
        assert!(parse_date("2025/01/01").is_err());
    }
}
