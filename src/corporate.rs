//! Corporate tax (法人税) and the local taxes derived from it.
//!
//! The calculation runs in a fixed order, each step consuming only the
//! outputs of earlier steps:
//!
//! 1. taxable income from accounting profit and the adjustment items
//! 2. company classification (pluggable [`CompanyClassifier`])
//! 3. corporate tax base, split at the reduced-rate ceiling for small
//!    companies
//! 4. local corporate tax on the pre-credit base
//! 5. credits, capped at the base
//! 6. corporate tax after credits
//! 7. final corporate tax after interim and prepaid amounts, floored at
//!    zero
//! 8. business tax from the prefecture's bracket table
//! 9. special business tax as a share of business tax
//! 10. corporate resident tax: per-capita levy by capital, and a levy on
//!     the post-credit corporate tax
//! 11. local tax total
//! 12. total payment
//! 13. effective rate against accounting profit
//!
//! Every intermediate figure is whole yen.

use std::sync::Arc;

use crate::adjustment::{AdjustmentKind, AdjustmentLedger, EstimateProvider};
use crate::bracket::ProgressiveTaxEvaluator;
use crate::classification::{Classification, ClassificationInput, CompanyClassifier};
use crate::config::{CorporateRates, TaxConfig};
use crate::error::{ensure_non_negative, TaxError};
use crate::models::{CorporateTaxInput, CorporateTaxResult};
use crate::money::{percent_of, RoundingPolicy, Yen};
use crate::tax::TaxCalculator;

/// Calculates corporate tax against a configuration snapshot.
///
/// The classifier and estimate provider default to the ones named in the
/// configuration's policy and can be replaced with
/// [`with_classifier`](Self::with_classifier) and
/// [`with_estimate_provider`](Self::with_estimate_provider).
#[derive(Debug, Clone)]
pub struct CorporateTaxEngine {
    config: Arc<TaxConfig>,
    classifier: Arc<dyn CompanyClassifier>,
    estimates: Arc<dyn EstimateProvider>,
    evaluator: ProgressiveTaxEvaluator,
}

impl CorporateTaxEngine {
    pub fn new(config: Arc<TaxConfig>) -> Self {
        let policy = config.policy;
        CorporateTaxEngine {
            classifier: policy.classifier.classifier(),
            estimates: policy.estimates.provider(),
            evaluator: ProgressiveTaxEvaluator::new(policy.rounding),
            config,
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn CompanyClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_estimate_provider(mut self, estimates: Arc<dyn EstimateProvider>) -> Self {
        self.estimates = estimates;
        self
    }

    pub fn calculate(&self, input: &CorporateTaxInput, tax_year: i32) -> Result<CorporateTaxResult, TaxError> {
        validate(input)?;
        let tables = self.config.year(tax_year, "corporate tax rate")?;
        let rates = &tables.corporate;
        let rounding = self.config.policy.rounding;
        let profit = input.accounting_profit;

        // 1. taxable income
        let mut ledger = AdjustmentLedger::new();
        let additions = match &input.additions {
            Some(items) => items.clone(),
            None => self.estimates.additions(profit)?,
        };
        ledger.extend(AdjustmentKind::Addition, additions)?;
        let deductions = match &input.deductions {
            Some(items) => items.clone(),
            None => self.estimates.deductions(profit)?,
        };
        ledger.extend(AdjustmentKind::Deduction, deductions)?;

        let total_additions = ledger.total_additions();
        let total_deductions = ledger.total_deductions();
        let taxable_income = profit
            .saturating_add(total_additions)
            .saturating_sub(total_deductions)
            .max(0);

        // 2. classification
        let classification = self.classifier.classify(&ClassificationInput {
            capital: input.capital,
            taxable_income,
            reduced_rate_ceiling: rates.reduced_rate_ceiling,
            tax_year,
            is_foreign_corporation: input.is_foreign_corporation,
        });

        // 3-4. base and local corporate tax
        let corporate_tax_base = corporate_tax_base(rates, classification, taxable_income, rounding);
        let local_corporate_tax = rounding.apply(corporate_tax_base, rates.local_corporate_tax_rate);

        // 5-7. credits and final national tax
        let credits = match &input.credits {
            Some(items) => items.clone(),
            None => self.estimates.credits(corporate_tax_base)?,
        };
        ledger.extend(AdjustmentKind::Credit, credits)?;
        let requested_credits = ledger.total_credits();
        let total_credits = requested_credits.min(corporate_tax_base);
        let excess_credits = requested_credits - total_credits;
        if excess_credits > 0 {
            tracing::warn!(
                requested_credits,
                corporate_tax_base,
                excess_credits,
                "tax credits exceed the corporate tax base; the excess is discarded"
            );
        }
        let corporate_tax_after_credits = corporate_tax_base - total_credits;
        let final_corporate_tax = corporate_tax_after_credits
            .saturating_sub(input.interim_payments)
            .saturating_sub(input.prepaid_taxes)
            .max(0);

        // 8-9. business taxes
        let business_table = tables.business_tax.lookup(&input.prefecture, "business tax");
        let business_tax = if classification.reduced_rate_applicable || !classification.class.is_small() {
            self.evaluator.evaluate(taxable_income, business_table.value)?
        } else {
            // Small companies without the reduced rate pay the top tier on
            // all of their income.
            rounding.apply(taxable_income, business_table.value.top_rate())
        };
        let special_business_tax = rounding.apply(business_tax, rates.special_business_tax_ratio);

        // 10-11. corporate resident tax
        let resident = tables
            .corporate_resident
            .lookup(&input.prefecture, "corporate resident tax");
        let resident_tax_equal = resident.value.per_capita.levy_for(input.capital);
        let resident_tax_income = rounding.apply(corporate_tax_after_credits, resident.value.income_rate);
        let local_tax_total = resident_tax_equal + resident_tax_income + business_tax + special_business_tax;

        // 12-13. totals
        let total_tax_payment = final_corporate_tax + local_corporate_tax + local_tax_total;
        let effective_rate = percent_of(total_tax_payment, profit);

        let used_estimates = ledger.has_estimates();
        let (addition_items, deduction_items, credit_items) = ledger.into_parts();

        tracing::debug!(
            tax_year,
            prefecture = %input.prefecture,
            classifier = self.classifier.name(),
            class = ?classification.class,
            taxable_income,
            corporate_tax_base,
            final_corporate_tax,
            local_tax_total,
            total_tax_payment,
            "corporate tax calculated"
        );

        Ok(CorporateTaxResult {
            tax_year,
            prefecture: input.prefecture.clone(),
            capital: input.capital,
            classification: classification.class,
            reduced_rate_applicable: classification.reduced_rate_applicable,
            accounting_profit: profit,
            addition_items,
            deduction_items,
            total_additions,
            total_deductions,
            taxable_income,
            corporate_tax_base,
            local_corporate_tax,
            national_tax_total: corporate_tax_base + local_corporate_tax,
            credit_items,
            requested_credits,
            total_credits,
            excess_credits,
            corporate_tax_after_credits,
            interim_payments: input.interim_payments,
            prepaid_taxes: input.prepaid_taxes,
            final_corporate_tax,
            resident_tax_equal,
            resident_tax_income,
            business_tax,
            special_business_tax,
            local_tax_total,
            total_tax_payment,
            effective_rate,
            used_estimates,
            prefecture_fallback: business_table.fallback || resident.fallback,
        })
    }
}

fn validate(input: &CorporateTaxInput) -> Result<(), TaxError> {
    ensure_non_negative("accounting_profit", input.accounting_profit)?;
    ensure_non_negative("capital", input.capital)?;
    ensure_non_negative("interim_payments", input.interim_payments)?;
    ensure_non_negative("prepaid_taxes", input.prepaid_taxes)
}

/// Corporate tax before credits.  With the reduced rate, income up to the
/// ceiling is taxed at the reduced rate and the rest at the standard
/// rate; otherwise all of it is taxed at the standard rate.  The two
/// segments are summed exactly and rounded once.
fn corporate_tax_base(
    rates: &CorporateRates,
    classification: Classification,
    taxable_income: Yen,
    rounding: RoundingPolicy,
) -> Yen {
    let exact = if classification.reduced_rate_applicable {
        let reduced_part = taxable_income.min(rates.reduced_rate_ceiling);
        rates.reduced_rate.apply(reduced_part) + rates.standard_rate.apply(taxable_income - reduced_part)
    } else {
        rates.standard_rate.apply(taxable_income)
    };
    rounding.to_yen(exact)
}

impl TaxCalculator for CorporateTaxEngine {
    type Input = CorporateTaxInput;
    type Output = CorporateTaxResult;

    fn name(&self) -> &str {
        "corporate_tax"
    }

    fn calculate(&self, input: &CorporateTaxInput, tax_year: i32) -> Result<CorporateTaxResult, TaxError> {
        CorporateTaxEngine::calculate(self, input, tax_year)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adjustment::{AdjustmentItem, EstimatePolicy, NoEstimates, RequireExplicitItems};
    use crate::classification::{CapitalAndIncomeClassifier, CompanyClass};
    use crate::config::PolicySettings;
    use proptest::prelude::*;

    fn config() -> Arc<TaxConfig> {
        Arc::new(TaxConfig::japan_default().unwrap())
    }

    fn engine() -> CorporateTaxEngine {
        CorporateTaxEngine::new(config())
    }

    fn scenario_a() -> CorporateTaxInput {
        CorporateTaxInput {
            additions: Some(vec![AdjustmentItem::addition("交際費損金不算入額", 1_500_000)]),
            deductions: Some(vec![AdjustmentItem::deduction("受取配当金益金不算入額", 5_000_000)]),
            credits: Some(vec![AdjustmentItem::credit("研究開発税制", 500_000)]),
            interim_payments: 1_200_000,
            prepaid_taxes: 300_000,
            ..CorporateTaxInput::new(30_000_000, 80_000_000)
        }
    }

    fn explicit(profit: Yen, capital: Yen) -> CorporateTaxInput {
        CorporateTaxInput {
            additions: Some(Vec::new()),
            deductions: Some(Vec::new()),
            credits: Some(Vec::new()),
            ..CorporateTaxInput::new(profit, capital)
        }
    }

    #[test]
    fn small_company_scenario() {
        let result = engine().calculate(&scenario_a(), 2025).unwrap();
        assert_eq!(result.classification, CompanyClass::Small);
        assert!(result.reduced_rate_applicable);
        assert_eq!(result.taxable_income, 26_500_000);
        assert_eq!(result.corporate_tax_base, 5_492_000);
        assert_eq!(result.local_corporate_tax, 565_676);
        assert_eq!(result.national_tax_total, 6_057_676);
        assert_eq!(result.total_credits, 500_000);
        assert_eq!(result.excess_credits, 0);
        assert_eq!(result.corporate_tax_after_credits, 4_992_000);
        assert_eq!(result.final_corporate_tax, 3_492_000);
        assert_eq!(result.business_tax, 1_759_500);
        assert_eq!(result.special_business_tax, 651_015);
        assert_eq!(result.resident_tax_equal, 180_000);
        assert_eq!(result.resident_tax_income, 349_440);
        assert_eq!(result.local_tax_total, 2_939_955);
        assert_eq!(result.total_tax_payment, 6_997_631);
        assert_eq!(result.effective_rate, 23.33);
        assert!(!result.used_estimates);
        assert!(!result.prefecture_fallback);
    }

    #[test]
    fn large_company_pays_standard_rate_on_everything() {
        let result = engine().calculate(&explicit(20_000_000, 200_000_000), 2025).unwrap();
        assert_eq!(result.classification, CompanyClass::Large);
        assert!(!result.reduced_rate_applicable);
        assert_eq!(result.corporate_tax_base, 4_640_000);
        // Large companies still go through the business tax tiers.
        assert_eq!(result.business_tax, 148_000 + 224_000 + 900_000);
        assert_eq!(result.resident_tax_equal, 180_000);
    }

    #[test]
    fn local_corporate_tax_uses_pre_credit_base_and_resident_levy_post_credit() {
        let mut input = explicit(10_000_000, 10_000_000);
        input.credits = Some(vec![AdjustmentItem::credit("外国税額控除", 1_000_000)]);
        let result = engine().calculate(&input, 2025).unwrap();
        // 8,000,000 × 15% + 2,000,000 × 23.2%
        assert_eq!(result.corporate_tax_base, 1_664_000);
        assert_eq!(result.local_corporate_tax, 171_392);
        assert_eq!(result.corporate_tax_after_credits, 664_000);
        assert_eq!(result.resident_tax_income, 46_480);
    }

    #[test]
    fn credits_are_capped_at_the_base() {
        let mut input = explicit(1_000_000, 10_000_000);
        input.credits = Some(vec![AdjustmentItem::credit("外国税額控除", 5_000_000)]);
        let result = engine().calculate(&input, 2025).unwrap();
        assert_eq!(result.corporate_tax_base, 150_000);
        assert_eq!(result.requested_credits, 5_000_000);
        assert_eq!(result.total_credits, 150_000);
        assert_eq!(result.excess_credits, 4_850_000);
        assert_eq!(result.corporate_tax_after_credits, 0);
        assert_eq!(result.resident_tax_income, 0);
    }

    #[test]
    fn missing_items_are_estimated_and_flagged() {
        let result = engine()
            .calculate(&CorporateTaxInput::new(10_000_000, 50_000_000), 2025)
            .unwrap();
        assert!(result.used_estimates);
        assert_eq!(result.total_additions, 190_000);
        assert_eq!(result.total_deductions, 10_000);
        assert_eq!(result.taxable_income, 10_180_000);
        assert_eq!(result.corporate_tax_base, 1_705_760);
        assert_eq!(result.total_credits, 34_115);
        assert!(result.credit_items.iter().all(|item| item.is_defaulted));
        assert_eq!(result.resident_tax_equal, 70_000);
    }

    #[test]
    fn explicit_items_are_never_estimated() {
        let result = engine()
            .calculate(&explicit(10_000_000, 50_000_000), 2025)
            .unwrap();
        assert!(!result.used_estimates);
        assert_eq!(result.taxable_income, 10_000_000);
        assert!(result.addition_items.is_empty());
    }

    #[test]
    fn estimate_providers_can_be_swapped() {
        let input = CorporateTaxInput::new(10_000_000, 50_000_000);
        let disabled = engine()
            .with_estimate_provider(Arc::new(NoEstimates))
            .calculate(&input, 2025)
            .unwrap();
        assert!(!disabled.used_estimates);
        assert_eq!(disabled.taxable_income, 10_000_000);

        let strict = engine().with_estimate_provider(Arc::new(RequireExplicitItems));
        assert!(matches!(
            strict.calculate(&input, 2025),
            Err(TaxError::InvalidInput { ref field, .. }) if field == "additions"
        ));
        assert!(strict.calculate(&explicit(10_000_000, 50_000_000), 2025).is_ok());
    }

    #[test]
    fn estimate_policy_comes_from_configuration() {
        let config = TaxConfig::japan_default().unwrap().with_policy(PolicySettings {
            estimates: EstimatePolicy::Strict,
            ..PolicySettings::default()
        });
        let engine = CorporateTaxEngine::new(Arc::new(config));
        assert!(engine
            .calculate(&CorporateTaxInput::new(10_000_000, 50_000_000), 2025)
            .is_err());
    }

    #[test]
    fn capital_and_income_classifier_is_taxed_like_small() {
        let by_capital = engine().calculate(&scenario_a(), 2025).unwrap();
        let by_income = engine()
            .with_classifier(Arc::new(CapitalAndIncomeClassifier))
            .calculate(&scenario_a(), 2025)
            .unwrap();
        assert_eq!(by_income.classification, CompanyClass::SmallHigh);
        assert_eq!(by_income.corporate_tax_base, by_capital.corporate_tax_base);
        assert_eq!(by_income.business_tax, by_capital.business_tax);
        assert_eq!(by_income.total_tax_payment, by_capital.total_tax_payment);
    }

    #[test]
    fn foreign_corporation_loses_the_reduced_rate() {
        let mut input = explicit(10_000_000, 30_000_000);
        input.is_foreign_corporation = true;
        let result = engine().calculate(&input, 2025).unwrap();
        assert_eq!(result.classification, CompanyClass::Small);
        assert!(!result.reduced_rate_applicable);
        assert_eq!(result.corporate_tax_base, 2_320_000);
        assert_eq!(result.business_tax, 750_000);
    }

    #[test]
    fn unknown_prefecture_falls_back_to_default_tables() {
        let mut input = scenario_a();
        input.prefecture = "沖縄県".to_string();
        let result = engine().calculate(&input, 2025).unwrap();
        assert!(result.prefecture_fallback);
        assert_eq!(result.business_tax, 1_759_500);
    }

    #[test]
    fn zero_profit_has_zero_effective_rate() {
        let result = engine().calculate(&explicit(0, 10_000_000), 2025).unwrap();
        assert_eq!(result.taxable_income, 0);
        assert_eq!(result.effective_rate, 0.0);
        assert_eq!(result.total_tax_payment, 70_000);
    }

    #[test]
    fn rejects_bad_inputs() {
        let engine = engine();
        assert!(matches!(
            engine.calculate(&explicit(-1, 10_000_000), 2025),
            Err(TaxError::InvalidInput { ref field, .. }) if field == "accounting_profit"
        ));
        let mut negative_item = explicit(1_000_000, 10_000_000);
        negative_item.deductions = Some(vec![AdjustmentItem::deduction("繰越欠損金控除額", -5)]);
        assert!(matches!(
            engine.calculate(&negative_item, 2025),
            Err(TaxError::InvalidInput { .. })
        ));
        assert!(matches!(
            engine.calculate(&scenario_a(), 2021),
            Err(TaxError::UnsupportedTaxYear { year: 2021, .. })
        ));
    }

    proptest! {
        #[test]
        fn applied_credits_never_exceed_the_base(
            profit in 0i64..2_000_000_000,
            credit in 0i64..2_000_000_000,
        ) {
            let mut input = explicit(profit, 50_000_000);
            input.credits = Some(vec![AdjustmentItem::credit("研究開発税制", credit)]);
            let result = engine().calculate(&input, 2025).unwrap();
            prop_assert!(result.total_credits <= result.corporate_tax_base);
            if credit >= result.corporate_tax_base {
                prop_assert_eq!(result.total_credits, result.corporate_tax_base);
            }
            prop_assert_eq!(result.total_credits + result.excess_credits, credit);
        }

        #[test]
        fn final_corporate_tax_is_never_negative(
            profit in 0i64..1_000_000_000,
            interim in 0i64..500_000_000,
            prepaid in 0i64..500_000_000,
        ) {
            let mut input = explicit(profit, 80_000_000);
            input.interim_payments = interim;
            input.prepaid_taxes = prepaid;
            let result = engine().calculate(&input, 2025).unwrap();
            prop_assert!(result.final_corporate_tax >= 0);
            prop_assert!(result.final_corporate_tax <= result.corporate_tax_after_credits);
        }
    }
}
