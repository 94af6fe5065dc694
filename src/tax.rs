//! Tax calculator trait.
//!
//! The `tax` module defines the seam between the individual engines
//! and the code that drives them.  Each engine (income, resident,
//! corporate, and the combined personal calculation) implements
//! [`TaxCalculator`] for its own input and result types, which lets the
//! multi-year simulator run any of them one year at a time.

use crate::error::TaxError;
use crate::models::{CorporateTaxResult, IncomeTaxResult, PersonalTaxResult, ResidentTaxResult};
use crate::money::Yen;

/// A calculation that can be run for a given tax year.
///
/// Tax calculators must be thread‑safe (`Send + Sync`) because the
/// simulator may invoke them concurrently across multiple threads.
/// Implementations must be pure: the same input, year and configuration
/// snapshot always give the same result.
pub trait TaxCalculator: Send + Sync {
    type Input: Sync;
    type Output: Send + YearFigures;

    /// Short name used in log events (e.g. `"corporate_tax"`).
    fn name(&self) -> &str;

    fn calculate(&self, input: &Self::Input, tax_year: i32) -> Result<Self::Output, TaxError>;
}

/// Headline figures of a single-year result, used for aggregation.
pub trait YearFigures {
    /// The income the tax was levied on (gross income, accounting profit).
    fn income(&self) -> Yen;
    fn total_tax(&self) -> Yen;
    fn effective_rate(&self) -> f64;
}

impl YearFigures for IncomeTaxResult {
    fn income(&self) -> Yen {
        self.gross_income
    }

    fn total_tax(&self) -> Yen {
        self.income_tax
    }

    fn effective_rate(&self) -> f64 {
        self.effective_rate
    }
}

impl YearFigures for ResidentTaxResult {
    fn income(&self) -> Yen {
        self.taxable_income
    }

    fn total_tax(&self) -> Yen {
        self.total
    }

    fn effective_rate(&self) -> f64 {
        crate::money::percent_of(self.total, self.taxable_income)
    }
}

impl YearFigures for PersonalTaxResult {
    fn income(&self) -> Yen {
        self.gross_income
    }

    fn total_tax(&self) -> Yen {
        self.total_tax
    }

    fn effective_rate(&self) -> f64 {
        self.effective_rate
    }
}

impl YearFigures for CorporateTaxResult {
    fn income(&self) -> Yen {
        self.accounting_profit
    }

    fn total_tax(&self) -> Yen {
        self.total_tax_payment
    }

    fn effective_rate(&self) -> f64 {
        self.effective_rate
    }
}
