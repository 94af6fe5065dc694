//! Company classification strategies.
//!
//! Two classification rules are in use for corporate tax: one looks at
//! paid-in capital only, the other also looks at taxable income to flag
//! small companies whose income exceeds the reduced-rate ceiling.  Both
//! are implementations of [`CompanyClassifier`]; which one an engine
//! uses is chosen by configuration ([`ClassifierKind`]) or injected
//! directly.

use std::fmt::Debug;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::money::Yen;

/// Companies with paid-in capital above this amount are large.
pub const LARGE_COMPANY_CAPITAL: Yen = 100_000_000;

/// Foreign corporations with at least this much capital lose the
/// reduced rate from [`REDUCED_RATE_RESTRICTION_YEAR`].
const FOREIGN_CORPORATION_CAPITAL_LIMIT: Yen = 10_000_000;
const REDUCED_RATE_RESTRICTION_YEAR: i32 = 2022;

/// Size class of a company.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompanyClass {
    /// Capital of 100,000,000 yen or less.
    Small,
    /// A small company whose taxable income exceeds the reduced-rate
    /// ceiling.  Only produced by [`CapitalAndIncomeClassifier`]; it is
    /// taxed exactly like [`CompanyClass::Small`] (the reduced rate still
    /// applies to income up to the ceiling).  Rule sets that tax this class
    /// flat at the standard rate are not followed here.
    SmallHigh,
    /// Capital above 100,000,000 yen.
    Large,
}

impl CompanyClass {
    pub fn is_small(self) -> bool {
        !matches!(self, CompanyClass::Large)
    }
}

/// Facts a classifier may look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassificationInput {
    pub capital: Yen,
    pub taxable_income: Yen,
    /// Income up to which the reduced corporate rate applies.
    pub reduced_rate_ceiling: Yen,
    pub tax_year: i32,
    pub is_foreign_corporation: bool,
}

/// Outcome of classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub class: CompanyClass,
    /// Whether the reduced corporate rate (and the lower business tax
    /// tiers) may be applied.  Always false for large companies.
    pub reduced_rate_applicable: bool,
}

/// Decides the size class of a company.
///
/// Classifiers must be thread‑safe because engines are shared across
/// threads by the multi-year simulator.
pub trait CompanyClassifier: Send + Sync + Debug {
    fn name(&self) -> &str;
    fn classify(&self, input: &ClassificationInput) -> Classification;
}

/// Classifies on capital alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct CapitalOnlyClassifier;

impl CompanyClassifier for CapitalOnlyClassifier {
    fn name(&self) -> &str {
        "capital_only"
    }

    fn classify(&self, input: &ClassificationInput) -> Classification {
        let class = if input.capital > LARGE_COMPANY_CAPITAL {
            CompanyClass::Large
        } else {
            CompanyClass::Small
        };
        Classification {
            class,
            reduced_rate_applicable: reduced_rate_applicable(class, input),
        }
    }
}

/// Classifies on capital, then splits small companies on taxable income.
#[derive(Debug, Clone, Copy, Default)]
pub struct CapitalAndIncomeClassifier;

impl CompanyClassifier for CapitalAndIncomeClassifier {
    fn name(&self) -> &str {
        "capital_and_income"
    }

    fn classify(&self, input: &ClassificationInput) -> Classification {
        let class = if input.capital > LARGE_COMPANY_CAPITAL {
            CompanyClass::Large
        } else if input.taxable_income > input.reduced_rate_ceiling {
            CompanyClass::SmallHigh
        } else {
            CompanyClass::Small
        };
        Classification {
            class,
            reduced_rate_applicable: reduced_rate_applicable(class, input),
        }
    }
}

fn reduced_rate_applicable(class: CompanyClass, input: &ClassificationInput) -> bool {
    if !class.is_small() {
        return false;
    }
    !(input.tax_year >= REDUCED_RATE_RESTRICTION_YEAR
        && input.is_foreign_corporation
        && input.capital >= FOREIGN_CORPORATION_CAPITAL_LIMIT)
}

/// Configuration selector for the built-in classifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierKind {
    #[default]
    CapitalOnly,
    CapitalAndIncome,
}

impl ClassifierKind {
    pub fn classifier(self) -> Arc<dyn CompanyClassifier> {
        match self {
            ClassifierKind::CapitalOnly => Arc::new(CapitalOnlyClassifier),
            ClassifierKind::CapitalAndIncome => Arc::new(CapitalAndIncomeClassifier),
        }
    }
}
