//! Combined personal tax for one year: income tax, then resident tax on
//! the same taxable income.

use std::sync::Arc;

use crate::config::TaxConfig;
use crate::error::TaxError;
use crate::income::IncomeTaxEngine;
use crate::models::{PersonalTaxInput, PersonalTaxResult, ResidentTaxInput};
use crate::resident::ResidentTaxEngine;
use crate::tax::TaxCalculator;

#[derive(Debug, Clone)]
pub struct PersonalTaxCalculator {
    income: IncomeTaxEngine,
    resident: ResidentTaxEngine,
}

impl PersonalTaxCalculator {
    pub fn new(config: Arc<TaxConfig>) -> Self {
        PersonalTaxCalculator {
            income: IncomeTaxEngine::new(Arc::clone(&config)),
            resident: ResidentTaxEngine::new(config),
        }
    }

    pub fn calculate(&self, input: &PersonalTaxInput, tax_year: i32) -> Result<PersonalTaxResult, TaxError> {
        let income = self.income.calculate(&input.income, tax_year)?;
        let resident = self.resident.calculate(
            &ResidentTaxInput {
                taxable_income: income.taxable_income,
                prefecture: input.prefecture.clone(),
            },
            tax_year,
        )?;

        Ok(PersonalTaxResult {
            tax_year,
            gross_income: income.gross_income,
            taxable_income: income.taxable_income,
            income_tax: income.income_tax,
            resident_tax: resident.total,
            total_tax: income.income_tax + resident.total,
            effective_rate: income.effective_rate,
            deductions_applied: income.deductions_applied,
            prefecture: input.prefecture.clone(),
        })
    }
}

impl TaxCalculator for PersonalTaxCalculator {
    type Input = PersonalTaxInput;
    type Output = PersonalTaxResult;

    fn name(&self) -> &str {
        "personal_tax"
    }

    fn calculate(&self, input: &PersonalTaxInput, tax_year: i32) -> Result<PersonalTaxResult, TaxError> {
        PersonalTaxCalculator::calculate(self, input, tax_year)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IncomeTaxInput;

    fn input(gross_income: i64) -> PersonalTaxInput {
        PersonalTaxInput {
            income: IncomeTaxInput::new(gross_income),
            prefecture: "東京都".to_string(),
        }
    }

    #[test]
    fn income_and_resident_tax_share_taxable_income() {
        let calc = PersonalTaxCalculator::new(Arc::new(TaxConfig::japan_default().unwrap()));
        let result = calc.calculate(&input(5_000_000), 2025).unwrap();
        assert_eq!(result.taxable_income, 3_080_000);
        assert_eq!(result.income_tax, 210_500);
        assert_eq!(result.resident_tax, 313_000);
        assert_eq!(result.total_tax, 523_500);
        assert_eq!(result.effective_rate, 4.21);
    }

    #[test]
    fn low_income_is_exempt_from_resident_tax() {
        let calc = PersonalTaxCalculator::new(Arc::new(TaxConfig::japan_default().unwrap()));
        let result = calc.calculate(&input(1_000_000), 2025).unwrap();
        assert_eq!(result.taxable_income, 0);
        assert_eq!(result.total_tax, 0);
    }

    #[test]
    fn income_errors_propagate() {
        let calc = PersonalTaxCalculator::new(Arc::new(TaxConfig::japan_default().unwrap()));
        assert!(matches!(
            calc.calculate(&input(-1), 2025),
            Err(TaxError::InvalidInput { .. })
        ));
    }
}
