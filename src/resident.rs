//! Personal resident tax (住民税).
//!
//! Resident tax has an income-based levy (所得割), proportional to
//! taxable income, and a flat per-capita levy (均等割), each split
//! between the prefecture and the municipality.  Rates are looked up
//! per prefecture with a fallback to the default rates.
//!
//! Taxable income at or below the exemption threshold of the year is
//! exempt.  The exemption is an explicit branch: with the default rates
//! it waives the per-capita levy too, so the total is exactly zero.

use std::sync::Arc;

use crate::config::{ResidentRates, TaxConfig};
use crate::error::{ensure_non_negative, TaxError};
use crate::models::{LevyComponents, ResidentTaxInput, ResidentTaxResult};
use crate::money::RoundingPolicy;
use crate::tax::TaxCalculator;

/// Personal resident tax (住民税): the flat income levy plus the per
/// capita levy, reduced by the adjustment credit.
#[derive(Debug, Clone)]
pub struct ResidentTaxEngine {
    config: Arc<TaxConfig>,
}

impl ResidentTaxEngine {
    pub fn new(config: Arc<TaxConfig>) -> Self {
        ResidentTaxEngine { config }
    }

    pub fn calculate(&self, input: &ResidentTaxInput, tax_year: i32) -> Result<ResidentTaxResult, TaxError> {
        ensure_non_negative("taxable_income", input.taxable_income)?;
        let tables = self.config.year(tax_year, "resident tax rate")?;
        let resolved = tables.resident.lookup(&input.prefecture, "resident tax");
        let rates = resolved.value;

        let exempt = input.taxable_income <= tables.resident_exemption_threshold;
        let (prefectural, municipal) = if exempt {
            exempt_levies(rates)
        } else {
            levies(rates, input.taxable_income, self.config.policy.rounding)
        };

        let income_levy = prefectural.income_based + municipal.income_based;
        let per_capita_levy = prefectural.per_capita + municipal.per_capita;
        let total = prefectural.total + municipal.total;

        tracing::debug!(
            tax_year,
            prefecture = %input.prefecture,
            taxable_income = input.taxable_income,
            exempt,
            total,
            "resident tax calculated"
        );

        Ok(ResidentTaxResult {
            tax_year,
            taxable_income: input.taxable_income,
            prefecture: input.prefecture.clone(),
            prefectural,
            municipal,
            income_levy,
            per_capita_levy,
            total,
            exemption_applied: exempt,
            prefecture_fallback: resolved.fallback,
        })
    }
}

fn levies(rates: &ResidentRates, taxable_income: i64, rounding: RoundingPolicy) -> (LevyComponents, LevyComponents) {
    let component = |rate, per_capita| {
        let income_based = rounding.apply(taxable_income, rate);
        LevyComponents {
            income_based,
            per_capita,
            total: income_based + per_capita,
        }
    };
    (
        component(rates.prefectural_rate, rates.prefectural_per_capita),
        component(rates.municipal_rate, rates.municipal_per_capita),
    )
}

fn exempt_levies(rates: &ResidentRates) -> (LevyComponents, LevyComponents) {
    if rates.waive_per_capita_on_exemption {
        return (LevyComponents::default(), LevyComponents::default());
    }
    let per_capita_only = |per_capita| LevyComponents {
        income_based: 0,
        per_capita,
        total: per_capita,
    };
    (
        per_capita_only(rates.prefectural_per_capita),
        per_capita_only(rates.municipal_per_capita),
    )
}

impl TaxCalculator for ResidentTaxEngine {
    type Input = ResidentTaxInput;
    type Output = ResidentTaxResult;

    fn name(&self) -> &str {
        "resident_tax"
    }

    fn calculate(&self, input: &ResidentTaxInput, tax_year: i32) -> Result<ResidentTaxResult, TaxError> {
        ResidentTaxEngine::calculate(self, input, tax_year)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> TaxConfig {
        TaxConfig::japan_default().unwrap()
    }

    fn input(taxable_income: i64, prefecture: &str) -> ResidentTaxInput {
        ResidentTaxInput {
            taxable_income,
            prefecture: prefecture.to_string(),
        }
    }

    #[test]
    fn standard_calculation() {
        let engine = ResidentTaxEngine::new(Arc::new(config()));
        let result = engine.calculate(&input(3_080_000, "東京都"), 2025).unwrap();
        assert_eq!(result.prefectural.income_based, 123_200);
        assert_eq!(result.municipal.income_based, 184_800);
        assert_eq!(result.income_levy, 308_000);
        assert_eq!(result.per_capita_levy, 5_000);
        assert_eq!(result.total, 313_000);
        assert!(!result.exemption_applied);
        assert!(!result.prefecture_fallback);
    }

    #[test]
    fn at_threshold_total_is_exactly_zero() {
        let config = config();
        let threshold = config.years[&2025].resident_exemption_threshold;
        let engine = ResidentTaxEngine::new(Arc::new(config));
        let result = engine.calculate(&input(threshold, "東京都"), 2025).unwrap();
        assert!(result.exemption_applied);
        assert_eq!(result.income_levy, 0);
        assert_eq!(result.per_capita_levy, 0);
        assert_eq!(result.total, 0);
    }

    #[test]
    fn just_above_threshold_charges_per_capita_levy() {
        let mut config = config();
        // One yen of taxable income gives a sub-yen income levy.
        config.years.get_mut(&2025).unwrap().resident_exemption_threshold = 0;
        let engine = ResidentTaxEngine::new(Arc::new(config));
        let result = engine.calculate(&input(1, "東京都"), 2025).unwrap();
        assert!(!result.exemption_applied);
        assert_eq!(result.income_levy, 0);
        assert_eq!(result.per_capita_levy, 5_000);
        assert_eq!(result.total, 5_000);
    }

    #[test]
    fn just_above_default_threshold() {
        let config = config();
        let threshold = config.years[&2025].resident_exemption_threshold;
        let engine = ResidentTaxEngine::new(Arc::new(config));
        let result = engine.calculate(&input(threshold + 1, "東京都"), 2025).unwrap();
        assert!(!result.exemption_applied);
        assert_eq!(result.per_capita_levy, 5_000);
        assert_eq!(result.total, result.income_levy + 5_000);
    }

    #[test]
    fn per_capita_can_survive_exemption_when_configured() {
        let mut config = config();
        config
            .years
            .get_mut(&2025)
            .unwrap()
            .resident
            .default
            .waive_per_capita_on_exemption = false;
        let engine = ResidentTaxEngine::new(Arc::new(config));
        let result = engine.calculate(&input(0, "北海道"), 2025).unwrap();
        assert!(result.exemption_applied);
        assert!(result.prefecture_fallback);
        assert_eq!(result.income_levy, 0);
        assert_eq!(result.total, 5_000);
    }

    #[test]
    fn unknown_prefecture_uses_default_rates() {
        let engine = ResidentTaxEngine::new(Arc::new(config()));
        let known = engine.calculate(&input(4_000_000, "大阪府"), 2025).unwrap();
        let unknown = engine.calculate(&input(4_000_000, "鳥取県"), 2025).unwrap();
        assert!(unknown.prefecture_fallback);
        assert_eq!(known.total, unknown.total);
    }

    #[test]
    fn errors() {
        let engine = ResidentTaxEngine::new(Arc::new(config()));
        assert!(matches!(
            engine.calculate(&input(-1, "東京都"), 2025),
            Err(TaxError::InvalidInput { .. })
        ));
        assert!(matches!(
            engine.calculate(&input(1_000_000, "東京都"), 2022),
            Err(TaxError::UnsupportedTaxYear { year: 2022, .. })
        ));
    }
}
