//! Personal income tax (所得税).
//!
//! Gross employment income is reduced by the employment income
//! deduction and the personal deductions to give taxable income, which
//! is then taxed progressively with the bracket table of the year.

use std::sync::Arc;

use crate::bracket::ProgressiveTaxEvaluator;
use crate::config::TaxConfig;
use crate::error::{ensure_non_negative, TaxError};
use crate::models::{DeductionsApplied, IncomeTaxInput, IncomeTaxResult};
use crate::money::{percent_of, Rate, RoundingPolicy, Yen};
use crate::tax::TaxCalculator;

/// Deduction per dependent (扶養控除).
pub const DEPENDENT_DEDUCTION: Yen = 380_000;

/// Employment income deduction (給与所得控除) for a gross salary.
///
/// | gross income              | deduction              |
/// |---------------------------|------------------------|
/// | up to 1,625,000           | 550,000                |
/// | up to 1,800,000           | 40% − 100,000          |
/// | up to 3,600,000           | 30% + 80,000           |
/// | up to 6,600,000           | 20% + 440,000          |
/// | up to 8,500,000           | 10% + 1,100,000        |
/// | above 8,500,000           | 1,950,000              |
pub fn employment_income_deduction(gross_income: Yen) -> Yen {
    let share = |ppm: u32| RoundingPolicy::Truncate.apply(gross_income, Rate::from_ppm(ppm));
    match gross_income {
        ..=1_625_000 => 550_000,
        ..=1_800_000 => share(400_000) - 100_000,
        ..=3_600_000 => share(300_000) + 80_000,
        ..=6_600_000 => share(200_000) + 440_000,
        ..=8_500_000 => share(100_000) + 1_100_000,
        _ => 1_950_000,
    }
}

/// Calculates personal income tax against a configuration snapshot.
#[derive(Debug, Clone)]
pub struct IncomeTaxEngine {
    config: Arc<TaxConfig>,
    evaluator: ProgressiveTaxEvaluator,
}

impl IncomeTaxEngine {
    pub fn new(config: Arc<TaxConfig>) -> Self {
        let evaluator = ProgressiveTaxEvaluator::new(config.policy.rounding);
        IncomeTaxEngine { config, evaluator }
    }

    pub fn calculate(&self, input: &IncomeTaxInput, tax_year: i32) -> Result<IncomeTaxResult, TaxError> {
        validate(input)?;
        let table = &self
            .config
            .year(tax_year, "income tax bracket")?
            .income_tax_brackets;

        let employment_income = input
            .employment_income_deduction
            .unwrap_or_else(|| employment_income_deduction(input.gross_income));
        let dependent = DEPENDENT_DEDUCTION.saturating_mul(Yen::from(input.dependents_count));

        let parts = [
            input.basic_deduction,
            employment_income,
            dependent,
            input.spouse_deduction,
            input.social_insurance_deduction,
            input.life_insurance_deduction,
            input.earthquake_insurance_deduction,
            input.medical_deduction,
            input.donation_deduction,
        ];
        let total = parts.iter().fold(0, |acc: Yen, d| acc.saturating_add(*d));

        let taxable_income = (input.gross_income - total).max(0);
        let income_tax = self.evaluator.evaluate(taxable_income, table)?;

        tracing::debug!(
            tax_year,
            gross_income = input.gross_income,
            total_deductions = total,
            taxable_income,
            income_tax,
            "income tax calculated"
        );

        Ok(IncomeTaxResult {
            tax_year,
            gross_income: input.gross_income,
            taxable_income,
            income_tax,
            effective_rate: percent_of(income_tax, input.gross_income),
            marginal_rate: table.marginal_rate(taxable_income).as_percent(),
            deductions_applied: DeductionsApplied {
                basic: input.basic_deduction,
                employment_income,
                dependent,
                spouse: input.spouse_deduction,
                social_insurance: input.social_insurance_deduction,
                life_insurance: input.life_insurance_deduction,
                earthquake_insurance: input.earthquake_insurance_deduction,
                medical: input.medical_deduction,
                donation: input.donation_deduction,
                total,
            },
        })
    }
}

fn validate(input: &IncomeTaxInput) -> Result<(), TaxError> {
    ensure_non_negative("gross_income", input.gross_income)?;
    ensure_non_negative("basic_deduction", input.basic_deduction)?;
    if let Some(deduction) = input.employment_income_deduction {
        ensure_non_negative("employment_income_deduction", deduction)?;
    }
    ensure_non_negative("spouse_deduction", input.spouse_deduction)?;
    ensure_non_negative("social_insurance_deduction", input.social_insurance_deduction)?;
    ensure_non_negative("life_insurance_deduction", input.life_insurance_deduction)?;
    ensure_non_negative("earthquake_insurance_deduction", input.earthquake_insurance_deduction)?;
    ensure_non_negative("medical_deduction", input.medical_deduction)?;
    ensure_non_negative("donation_deduction", input.donation_deduction)
}

impl TaxCalculator for IncomeTaxEngine {
    type Input = IncomeTaxInput;
    type Output = IncomeTaxResult;

    fn name(&self) -> &str {
        "income_tax"
    }

    fn calculate(&self, input: &IncomeTaxInput, tax_year: i32) -> Result<IncomeTaxResult, TaxError> {
        IncomeTaxEngine::calculate(self, input, tax_year)
    }
}
