//! Bracket tables and progressive tax evaluation.
//!
//! A [`BracketTable`] is an ordered, contiguous list of [`TaxBracket`]s
//! covering `[0, ∞)`.  Each bracket covers the half-open range
//! `(lower_bound, upper_bound]` (the first one also includes 0), so an
//! amount exactly on a published boundary belongs to the bracket whose
//! upper bound equals it, as in the statutory quick-reference tables.
//!
//! Tables are validated when they are built or deserialised.  Part of
//! that validation is that every bracket's cumulative deduction equals
//! the value implied by the brackets below it, which is what makes the
//! segment sum and the closed form `rate × amount − deduction` agree at
//! every amount.

use serde::{Deserialize, Serialize};

use crate::error::{ensure_non_negative, TaxError};
use crate::money::{Micros, Rate, RoundingPolicy, Yen};

/// One bracket of a progressive table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxBracket {
    /// Exclusive lower bound (inclusive for the first bracket, which
    /// always starts at 0).
    pub lower_bound: Yen,
    /// Inclusive upper bound; `None` for the open-ended final bracket.
    pub upper_bound: Option<Yen>,
    /// Marginal rate applied to the part of the amount in this bracket.
    pub rate: Rate,
    /// Quick-calculation deduction: tax for an amount `I` in this
    /// bracket is `rate × I − cumulative_deduction`.
    pub cumulative_deduction: Yen,
}

/// Bracket as written in configuration files.  The cumulative deduction
/// may be omitted, in which case it is derived from the brackets below.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BracketSpec {
    /// Where the bracket starts; equals the previous bracket's upper bound.
    pub lower_bound: Yen,
    /// Inclusive upper edge; absent for the open top bracket.
    #[serde(default)]
    pub upper_bound: Option<Yen>,
    /// Marginal rate within the bracket.
    pub rate: Rate,
    /// Quick-calculation deduction, derived when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cumulative_deduction: Option<Yen>,
}

/// A validated progressive bracket table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<BracketSpec>", into = "Vec<BracketSpec>")]
pub struct BracketTable {
    brackets: Vec<TaxBracket>,
}

impl BracketTable {
    /// Build a table from fully specified brackets.  Fails if any
    /// structural invariant is violated or a stated deduction disagrees
    /// with the one implied by the lower brackets.
    pub fn new(brackets: Vec<TaxBracket>) -> Result<Self, TaxError> {
        let specs = brackets
            .into_iter()
            .map(|b| BracketSpec {
                lower_bound: b.lower_bound,
                upper_bound: b.upper_bound,
                rate: b.rate,
                cumulative_deduction: Some(b.cumulative_deduction),
            })
            .collect();
        Self::from_specs(specs)
    }

    /// Build a table from upper bounds and rates alone; lower bounds and
    /// deductions are derived.  The last tier must be open-ended.
    pub fn from_tiers(tiers: &[(Option<Yen>, Rate)]) -> Result<Self, TaxError> {
        let mut lower = 0;
        let mut specs = Vec::with_capacity(tiers.len());
        for &(upper, rate) in tiers {
            specs.push(BracketSpec {
                lower_bound: lower,
                upper_bound: upper,
                rate,
                cumulative_deduction: None,
            });
            lower = upper.unwrap_or(lower);
        }
        Self::from_specs(specs)
    }

    pub fn from_specs(specs: Vec<BracketSpec>) -> Result<Self, TaxError> {
        if specs.is_empty() {
            return Err(TaxError::Configuration(
                "bracket table must contain at least one bracket".into(),
            ));
        }
        if specs[0].lower_bound != 0 {
            return Err(TaxError::Configuration(format!(
                "first bracket must start at 0, found {}",
                specs[0].lower_bound
            )));
        }

        let last = specs.len() - 1;
        let mut brackets: Vec<TaxBracket> = Vec::with_capacity(specs.len());
        let mut deduction = Micros::ZERO;
        for (i, spec) in specs.into_iter().enumerate() {
            match spec.upper_bound {
                Some(upper) if upper <= spec.lower_bound => {
                    return Err(TaxError::Configuration(format!(
                        "bracket {i} is empty or inverted ({}..={upper})",
                        spec.lower_bound
                    )));
                }
                Some(_) if i == last => {
                    return Err(TaxError::Configuration(
                        "final bracket must be open-ended".into(),
                    ));
                }
                None if i != last => {
                    return Err(TaxError::Configuration(format!(
                        "bracket {i} is open-ended but is not the final bracket"
                    )));
                }
                _ => {}
            }

            if let Some(prev) = brackets.last() {
                // Contiguity: this bracket starts where the previous one ends.
                if prev.upper_bound != Some(spec.lower_bound) {
                    return Err(TaxError::Configuration(format!(
                        "bracket {i} starts at {} but the previous bracket ends at {:?}",
                        spec.lower_bound, prev.upper_bound
                    )));
                }
                deduction = deduction + spec.rate.apply(spec.lower_bound)
                    - prev.rate.apply(spec.lower_bound);
            }

            if !deduction.is_whole() {
                return Err(TaxError::Configuration(format!(
                    "bracket {i} implies a fractional cumulative deduction ({})",
                    deduction.as_f64()
                )));
            }
            let implied = deduction.floor_yen();
            if let Some(stated) = spec.cumulative_deduction {
                if stated != implied {
                    return Err(TaxError::Configuration(format!(
                        "bracket {i} states a cumulative deduction of {stated} but the lower brackets imply {implied}"
                    )));
                }
            }

            brackets.push(TaxBracket {
                lower_bound: spec.lower_bound,
                upper_bound: spec.upper_bound,
                rate: spec.rate,
                cumulative_deduction: implied,
            });
        }

        Ok(BracketTable { brackets })
    }

    /// Brackets in ascending order of lower bound.
    pub fn brackets(&self) -> &[TaxBracket] {
        &self.brackets
    }

    /// The bracket containing `amount`.
    pub fn bracket_for(&self, amount: Yen) -> &TaxBracket {
        self.brackets
            .iter()
            .find(|b| b.upper_bound.map_or(true, |upper| amount <= upper))
            .unwrap_or_else(|| &self.brackets[self.brackets.len() - 1])
    }

    pub fn marginal_rate(&self, amount: Yen) -> Rate {
        self.bracket_for(amount).rate
    }

    /// Rate of the open-ended final bracket.
    pub fn top_rate(&self) -> Rate {
        self.brackets[self.brackets.len() - 1].rate
    }

    /// Exact progressive tax by summing each bracket's segment.
    pub fn evaluate_exact(&self, amount: Yen) -> Result<Micros, TaxError> {
        ensure_non_negative("amount", amount)?;
        let mut tax = Micros::ZERO;
        for bracket in &self.brackets {
            if amount <= bracket.lower_bound {
                break;
            }
            let top = bracket.upper_bound.map_or(amount, |upper| amount.min(upper));
            tax += bracket.rate.apply(top - bracket.lower_bound);
        }
        Ok(tax)
    }

    /// Exact progressive tax by the quick-calculation formula.
    pub fn closed_form_exact(&self, amount: Yen) -> Result<Micros, TaxError> {
        ensure_non_negative("amount", amount)?;
        let bracket = self.bracket_for(amount);
        Ok(bracket.rate.apply(amount) - Micros::from_yen(bracket.cumulative_deduction))
    }
}

impl TryFrom<Vec<BracketSpec>> for BracketTable {
    type Error = TaxError;

    fn try_from(specs: Vec<BracketSpec>) -> Result<Self, Self::Error> {
        BracketTable::from_specs(specs)
    }
}

impl From<BracketTable> for Vec<BracketSpec> {
    fn from(table: BracketTable) -> Self {
        table
            .brackets
            .into_iter()
            .map(|b| BracketSpec {
                lower_bound: b.lower_bound,
                upper_bound: b.upper_bound,
                rate: b.rate,
                cumulative_deduction: Some(b.cumulative_deduction),
            })
            .collect()
    }
}

/// Evaluates progressive tax against a table and reduces the exact
/// result to whole yen once, at the end.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgressiveTaxEvaluator {
    rounding: RoundingPolicy,
}

impl ProgressiveTaxEvaluator {
    pub fn new(rounding: RoundingPolicy) -> Self {
        ProgressiveTaxEvaluator { rounding }
    }

    pub fn evaluate(&self, amount: Yen, table: &BracketTable) -> Result<Yen, TaxError> {
        Ok(self.rounding.to_yen(table.evaluate_exact(amount)?))
    }

    pub fn evaluate_closed_form(&self, amount: Yen, table: &BracketTable) -> Result<Yen, TaxError> {
        Ok(self.rounding.to_yen(table.closed_form_exact(amount)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn income_table() -> BracketTable {
        BracketTable::from_tiers(&[
            (Some(1_950_000), Rate::from_ppm(50_000)),
            (Some(3_300_000), Rate::from_ppm(100_000)),
            (Some(6_950_000), Rate::from_ppm(200_000)),
            (Some(9_000_000), Rate::from_ppm(230_000)),
            (Some(18_000_000), Rate::from_ppm(330_000)),
            (Some(40_000_000), Rate::from_ppm(400_000)),
            (None, Rate::from_ppm(450_000)),
        ])
        .unwrap()
    }

    fn business_table() -> BracketTable {
        BracketTable::from_tiers(&[
            (Some(4_000_000), Rate::from_ppm(37_000)),
            (Some(8_000_000), Rate::from_ppm(56_000)),
            (None, Rate::from_ppm(75_000)),
        ])
        .unwrap()
    }

    #[test]
    fn derived_deductions_match_published_table() {
        let deductions: Vec<Yen> = income_table()
            .brackets()
            .iter()
            .map(|b| b.cumulative_deduction)
            .collect();
        assert_eq!(
            deductions,
            vec![0, 97_500, 427_500, 636_000, 1_536_000, 2_796_000, 4_796_000]
        );
    }

    #[test]
    fn boundary_belongs_to_lower_bracket() {
        let table = income_table();
        assert_eq!(table.marginal_rate(1_950_000), Rate::from_ppm(50_000));
        assert_eq!(table.marginal_rate(1_950_001), Rate::from_ppm(100_000));
        let evaluator = ProgressiveTaxEvaluator::default();
        assert_eq!(evaluator.evaluate(1_950_000, &table).unwrap(), 97_500);
        assert_eq!(evaluator.evaluate_closed_form(1_950_000, &table).unwrap(), 97_500);
    }

    #[test]
    fn closed_form_agrees_at_every_boundary() {
        for table in [income_table(), business_table()] {
            for bound in table.brackets().iter().filter_map(|b| b.upper_bound) {
                for amount in [bound, bound + 1] {
                    assert_eq!(
                        table.evaluate_exact(amount).unwrap(),
                        table.closed_form_exact(amount).unwrap(),
                        "amount {amount}"
                    );
                }
            }
        }
    }

    #[test]
    fn scenario_income_tax_value() {
        let evaluator = ProgressiveTaxEvaluator::default();
        assert_eq!(evaluator.evaluate(3_080_000, &income_table()).unwrap(), 210_500);
    }

    #[test]
    fn business_tax_tiers() {
        let evaluator = ProgressiveTaxEvaluator::default();
        // 148,000 + 224,000 + 18,500,000 × 7.5%
        assert_eq!(evaluator.evaluate(26_500_000, &business_table()).unwrap(), 1_759_500);
    }

    #[test]
    fn evaluate_zero_and_negative() {
        let evaluator = ProgressiveTaxEvaluator::default();
        assert_eq!(evaluator.evaluate(0, &income_table()).unwrap(), 0);
        assert!(matches!(
            evaluator.evaluate(-1, &income_table()),
            Err(TaxError::InvalidInput { .. })
        ));
    }

    #[test]
    fn truncation_happens_once_at_the_end() {
        // Two segments each worth 0.5 yen: per-segment truncation would give 0.
        let table = BracketTable::from_tiers(&[
            (Some(10), Rate::from_ppm(50_000)),
            (None, Rate::from_ppm(50_000)),
        ])
        .unwrap();
        let evaluator = ProgressiveTaxEvaluator::new(RoundingPolicy::Truncate);
        assert_eq!(evaluator.evaluate(20, &table).unwrap(), 1);
        assert_eq!(evaluator.evaluate(30, &table).unwrap(), 1);
        let half_up = ProgressiveTaxEvaluator::new(RoundingPolicy::RoundHalfUp);
        assert_eq!(half_up.evaluate(30, &table).unwrap(), 2);
    }

    #[test]
    fn rejects_gap_between_brackets() {
        let err = BracketTable::from_specs(vec![
            BracketSpec {
                lower_bound: 0,
                upper_bound: Some(100),
                rate: Rate::from_ppm(50_000),
                cumulative_deduction: None,
            },
            BracketSpec {
                lower_bound: 101,
                upper_bound: None,
                rate: Rate::from_ppm(100_000),
                cumulative_deduction: None,
            },
        ])
        .unwrap_err();
        assert!(matches!(err, TaxError::Configuration(_)));
    }

    #[test]
    fn rejects_table_without_open_final_bracket() {
        let err = BracketTable::from_tiers(&[(Some(100), Rate::from_ppm(50_000))]).unwrap_err();
        assert!(matches!(err, TaxError::Configuration(_)));
    }

    #[test]
    fn rejects_inconsistent_stated_deduction() {
        let err = BracketTable::new(vec![
            TaxBracket {
                lower_bound: 0,
                upper_bound: Some(1_950_000),
                rate: Rate::from_ppm(50_000),
                cumulative_deduction: 0,
            },
            TaxBracket {
                lower_bound: 1_950_000,
                upper_bound: None,
                rate: Rate::from_ppm(100_000),
                cumulative_deduction: 90_000,
            },
        ])
        .unwrap_err();
        assert!(matches!(err, TaxError::Configuration(_)));
    }

    #[test]
    fn deserialises_and_validates() {
        let table: BracketTable = serde_json::from_value(serde_json::json!([
            {"lower_bound": 0, "upper_bound": 4000000, "rate": 0.037},
            {"lower_bound": 4000000, "upper_bound": 8000000, "rate": 0.056},
            {"lower_bound": 8000000, "rate": 0.075}
        ]))
        .unwrap();
        assert_eq!(table, business_table());

        let broken = serde_json::from_value::<BracketTable>(serde_json::json!([
            {"lower_bound": 0, "upper_bound": 4000000, "rate": 0.037}
        ]));
        assert!(broken.is_err());
    }

    proptest! {
        #[test]
        fn segment_sum_equals_closed_form(amount in 0i64..100_000_000_000) {
            for table in [income_table(), business_table()] {
                prop_assert_eq!(
                    table.evaluate_exact(amount).unwrap(),
                    table.closed_form_exact(amount).unwrap()
                );
            }
        }

        #[test]
        fn evaluate_is_monotonic(a in 0i64..60_000_000, delta in 0i64..5_000_000) {
            let evaluator = ProgressiveTaxEvaluator::default();
            let table = income_table();
            prop_assert!(
                evaluator.evaluate(a, &table).unwrap() <= evaluator.evaluate(a + delta, &table).unwrap()
            );
        }
    }
}
