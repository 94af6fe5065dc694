//! Data models for the tax engine.
//!
//! The `models` module defines the serialisable input and result
//! records of every calculation.  Inputs are the already-validated
//! parameter structs handed in by an outer layer; results are immutable
//! snapshots of every intermediate and final figure, created once per
//! call and owned by the caller.  All amounts are whole yen.

use serde::{Deserialize, Serialize};

use crate::adjustment::AdjustmentItem;
use crate::classification::CompanyClass;
use crate::money::Yen;

/// Prefecture assumed when a request does not name one.
pub const DEFAULT_PREFECTURE: &str = "東京都";

/// Basic deduction (基礎控除) assumed when a request does not give one.
pub const DEFAULT_BASIC_DEDUCTION: Yen = 480_000;

fn default_prefecture() -> String {
    DEFAULT_PREFECTURE.to_string()
}

fn default_basic_deduction() -> Yen {
    DEFAULT_BASIC_DEDUCTION
}

fn default_capital() -> Yen {
    50_000_000
}

/// Input to the personal income tax calculation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomeTaxInput {
    /// Annual gross employment income.
    pub gross_income: Yen,
    #[serde(default = "default_basic_deduction")]
    pub basic_deduction: Yen,
    /// Employment income deduction (給与所得控除).  Derived from gross
    /// income when omitted.
    #[serde(default)]
    pub employment_income_deduction: Option<Yen>,
    /// Number of dependents; each is worth a fixed deduction.
    #[serde(default)]
    pub dependents_count: u32,
    #[serde(default)]
    pub spouse_deduction: Yen,
    #[serde(default)]
    pub social_insurance_deduction: Yen,
    #[serde(default)]
    pub life_insurance_deduction: Yen,
    #[serde(default)]
    pub earthquake_insurance_deduction: Yen,
    #[serde(default)]
    pub medical_deduction: Yen,
    #[serde(default)]
    pub donation_deduction: Yen,
}

impl IncomeTaxInput {
    /// An input with only gross income set and every deduction at its
    /// default.
    pub fn new(gross_income: Yen) -> Self {
        IncomeTaxInput {
            gross_income,
            basic_deduction: DEFAULT_BASIC_DEDUCTION,
            employment_income_deduction: None,
            dependents_count: 0,
            spouse_deduction: 0,
            social_insurance_deduction: 0,
            life_insurance_deduction: 0,
            earthquake_insurance_deduction: 0,
            medical_deduction: 0,
            donation_deduction: 0,
        }
    }
}

/// Itemised deductions applied to gross income.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeductionsApplied {
    pub basic: Yen,
    pub employment_income: Yen,
    pub dependent: Yen,
    pub spouse: Yen,
    pub social_insurance: Yen,
    pub life_insurance: Yen,
    pub earthquake_insurance: Yen,
    pub medical: Yen,
    pub donation: Yen,
    pub total: Yen,
}

/// Result of a personal income tax calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomeTaxResult {
    pub tax_year: i32,
    pub gross_income: Yen,
    pub taxable_income: Yen,
    pub income_tax: Yen,
    /// Income tax as a percentage of gross income.
    pub effective_rate: f64,
    /// Rate of the bracket containing taxable income, as a percentage.
    pub marginal_rate: f64,
    pub deductions_applied: DeductionsApplied,
}

/// Input to the personal resident tax calculation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResidentTaxInput {
    pub taxable_income: Yen,
    #[serde(default = "default_prefecture")]
    pub prefecture: String,
}

/// The two components levied by one tier of local government.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LevyComponents {
    /// Income-based levy (所得割).
    pub income_based: Yen,
    /// Per-capita levy (均等割).
    pub per_capita: Yen,
    pub total: Yen,
}

/// Result of a personal resident tax calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResidentTaxResult {
    pub tax_year: i32,
    pub taxable_income: Yen,
    pub prefecture: String,
    pub prefectural: LevyComponents,
    pub municipal: LevyComponents,
    pub income_levy: Yen,
    pub per_capita_levy: Yen,
    pub total: Yen,
    /// True when taxable income was at or below the exemption threshold.
    pub exemption_applied: bool,
    /// True when the prefecture had no dedicated rates.
    pub prefecture_fallback: bool,
}

/// Input to the combined personal calculation (income + resident tax).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonalTaxInput {
    #[serde(flatten)]
    pub income: IncomeTaxInput,
    #[serde(default = "default_prefecture")]
    pub prefecture: String,
}

/// Income and resident tax for one year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalTaxResult {
    pub tax_year: i32,
    pub gross_income: Yen,
    pub taxable_income: Yen,
    pub income_tax: Yen,
    pub resident_tax: Yen,
    pub total_tax: Yen,
    /// Income tax alone as a percentage of gross income.
    pub effective_rate: f64,
    pub deductions_applied: DeductionsApplied,
    pub prefecture: String,
}

/// Input to the corporate tax calculation.
///
/// Each adjustment list may be left out, in which case the configured
/// estimate provider decides what happens (estimate, treat as empty, or
/// reject).  An explicitly empty list is taken at face value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorporateTaxInput {
    /// Net profit for the period as booked (当期純利益).
    pub accounting_profit: Yen,
    /// Paid-in capital.
    #[serde(default = "default_capital")]
    pub capital: Yen,
    #[serde(default = "default_prefecture")]
    pub prefecture: String,
    #[serde(default)]
    pub additions: Option<Vec<AdjustmentItem>>,
    #[serde(default)]
    pub deductions: Option<Vec<AdjustmentItem>>,
    #[serde(default)]
    pub credits: Option<Vec<AdjustmentItem>>,
    /// Corporate tax already paid at the interim filing.
    #[serde(default)]
    pub interim_payments: Yen,
    /// Corporate tax prepaid or withheld.
    #[serde(default)]
    pub prepaid_taxes: Yen,
    #[serde(default)]
    pub is_foreign_corporation: bool,
}

impl CorporateTaxInput {
    pub fn new(accounting_profit: Yen, capital: Yen) -> Self {
        CorporateTaxInput {
            accounting_profit,
            capital,
            prefecture: DEFAULT_PREFECTURE.to_string(),
            additions: None,
            deductions: None,
            credits: None,
            interim_payments: 0,
            prepaid_taxes: 0,
            is_foreign_corporation: false,
        }
    }
}

/// Every intermediate and final figure of a corporate tax calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorporateTaxResult {
    pub tax_year: i32,
    pub prefecture: String,
    pub capital: Yen,
    pub classification: CompanyClass,
    pub reduced_rate_applicable: bool,

    pub accounting_profit: Yen,
    pub addition_items: Vec<AdjustmentItem>,
    pub deduction_items: Vec<AdjustmentItem>,
    pub total_additions: Yen,
    pub total_deductions: Yen,
    pub taxable_income: Yen,

    /// Corporate tax before credits (法人税額).
    pub corporate_tax_base: Yen,
    /// Local corporate tax (地方法人税), computed on the pre-credit base.
    pub local_corporate_tax: Yen,
    pub national_tax_total: Yen,

    pub credit_items: Vec<AdjustmentItem>,
    /// Credits requested by the items, before the cap.
    pub requested_credits: Yen,
    /// Credits applied; never more than the corporate tax base.
    pub total_credits: Yen,
    /// Requested credits that did not fit under the base.  Reported
    /// only; they are not carried to another year.
    pub excess_credits: Yen,
    pub corporate_tax_after_credits: Yen,

    pub interim_payments: Yen,
    pub prepaid_taxes: Yen,
    pub final_corporate_tax: Yen,

    /// Per-capita levy of the corporate resident tax (均等割).
    pub resident_tax_equal: Yen,
    /// Corporate-tax-based levy (法人税割), on the post-credit tax.
    pub resident_tax_income: Yen,
    pub business_tax: Yen,
    pub special_business_tax: Yen,
    pub local_tax_total: Yen,

    pub total_tax_payment: Yen,
    /// Total payment as a percentage of accounting profit.
    pub effective_rate: f64,
    /// True when any estimated adjustment item was used.
    pub used_estimates: bool,
    /// True when the prefecture had no dedicated tables.
    pub prefecture_fallback: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn income_input_defaults() {
        let input: IncomeTaxInput = serde_json::from_value(json!({"gross_income": 5000000})).unwrap();
        assert_eq!(input, IncomeTaxInput::new(5_000_000));
    }

    #[test]
    fn corporate_input_distinguishes_missing_from_empty() {
        let input: CorporateTaxInput = serde_json::from_value(json!({
            "accounting_profit": 30000000,
            "additions": [],
        }))
        .unwrap();
        assert_eq!(input.additions, Some(Vec::new()));
        assert_eq!(input.deductions, None);
        assert_eq!(input.capital, 50_000_000);
        assert_eq!(input.prefecture, DEFAULT_PREFECTURE);
    }

    #[test]
    fn personal_input_flattens_income_fields() {
        let input: PersonalTaxInput = serde_json::from_value(json!({
            "gross_income": 6000000,
            "dependents_count": 2,
            "prefecture": "大阪府",
        }))
        .unwrap();
        assert_eq!(input.income.dependents_count, 2);
        assert_eq!(input.prefecture, "大阪府");
    }
}
