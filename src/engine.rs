//! Multi-year simulation engine.
//!
//! The `engine` module runs one [`TaxCalculator`] over a sequence of
//! per-year inputs, with `year = start_year + index`.  Years are
//! independent of each other, so the calls run in parallel on the
//! [`rayon`] thread pool; results are collected in input order
//! regardless of which year finishes first.
//!
//! What happens when a year fails (typically because no tables exist
//! for it) is decided by [`YearErrorPolicy`].

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::TaxConfig;
use crate::error::TaxError;
use crate::money::{percent_of, round2, Yen};
use crate::tax::{TaxCalculator, YearFigures};

/// How the simulator reacts to a year whose calculation fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum YearErrorPolicy {
    /// Fail the whole simulation with the error of the earliest failing
    /// year.
    #[default]
    Abort,
    /// Record the error for that year and carry on.
    Continue,
}

/// Result of one simulated year.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum YearOutcome<T> {
    Computed { year: i32, result: T },
    Failed { year: i32, error: TaxError },
}

impl<T> YearOutcome<T> {
    pub fn year(&self) -> i32 {
        match self {
            YearOutcome::Computed { year, .. } | YearOutcome::Failed { year, .. } => *year,
        }
    }

    pub fn result(&self) -> Option<&T> {
        match self {
            YearOutcome::Computed { result, .. } => Some(result),
            YearOutcome::Failed { .. } => None,
        }
    }
}

/// Aggregate figures over the computed years.  Failed years contribute
/// nothing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationSummary {
    pub years: usize,
    pub start_year: i32,
    pub end_year: i32,
    pub years_computed: usize,
    pub years_failed: usize,
    pub total_income: Yen,
    pub total_tax: Yen,
    /// Mean of the per-year effective rates, two decimals.
    pub average_effective_rate: f64,
    /// Total tax as a percentage of total income, two decimals.
    pub overall_effective_rate: f64,
}

/// Outcome of a simulation: one entry per requested year, in order, plus
/// totals over the years that computed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationResult<T> {
    pub calculator: String,
    pub per_year: Vec<YearOutcome<T>>,
    pub summary: SimulationSummary,
}

/// Drives a calculator across consecutive tax years.
#[derive(Debug, Clone, Copy, Default)]
pub struct MultiYearSimulator {
    policy: YearErrorPolicy,
}

impl MultiYearSimulator {
    pub fn new(policy: YearErrorPolicy) -> Self {
        MultiYearSimulator { policy }
    }

    /// A simulator following the configuration's `on_year_error` policy.
    pub fn from_config(config: &TaxConfig) -> Self {
        Self::new(config.policy.on_year_error)
    }

    pub fn policy(&self) -> YearErrorPolicy {
        self.policy
    }

    pub fn simulate<C: TaxCalculator>(
        &self,
        calculator: &C,
        inputs: &[C::Input],
        start_year: i32,
    ) -> Result<SimulationResult<C::Output>, TaxError> {
        if inputs.is_empty() {
            return Err(TaxError::invalid_input(
                "years",
                0,
                "at least one year is required",
            ));
        }
        let end_year = i32::try_from(inputs.len() - 1)
            .ok()
            .and_then(|span| start_year.checked_add(span))
            .ok_or_else(|| {
                TaxError::invalid_input("years", inputs.len(), "simulation runs past the last representable year")
            })?;

        // Indexed parallel iterators collect in input order.
        let outcomes: Vec<(i32, Result<C::Output, TaxError>)> = inputs
            .par_iter()
            .enumerate()
            .map(|(index, input)| {
                let year = start_year + index as i32;
                (year, calculator.calculate(input, year))
            })
            .collect();

        let mut per_year = Vec::with_capacity(outcomes.len());
        for (year, outcome) in outcomes {
            match outcome {
                Ok(result) => per_year.push(YearOutcome::Computed { year, result }),
                Err(error) => {
                    tracing::warn!(
                        calculator = calculator.name(),
                        year,
                        error = %error,
                        policy = ?self.policy,
                        "simulated year failed"
                    );
                    if self.policy == YearErrorPolicy::Abort {
                        return Err(error);
                    }
                    per_year.push(YearOutcome::Failed { year, error });
                }
            }
        }

        let summary = summarise(&per_year, start_year, end_year)?;
        tracing::info!(
            calculator = calculator.name(),
            start_year,
            end_year,
            years_computed = summary.years_computed,
            years_failed = summary.years_failed,
            total_tax = summary.total_tax,
            "simulation completed"
        );

        Ok(SimulationResult {
            calculator: calculator.name().to_string(),
            per_year,
            summary,
        })
    }
}

/// Sum a per-year figure, failing rather than wrapping when the total
/// does not fit in [`Yen`].
fn checked_total<T>(computed: &[&T], field: &str, figure: impl Fn(&T) -> Yen) -> Result<Yen, TaxError> {
    computed
        .iter()
        .try_fold(0, |acc: Yen, r| acc.checked_add(figure(*r)))
        .ok_or_else(|| {
            TaxError::invalid_input(
                field,
                "<overflow>",
                "total over the simulated years exceeds the representable amount",
            )
        })
}

fn summarise<T: YearFigures>(
    per_year: &[YearOutcome<T>],
    start_year: i32,
    end_year: i32,
) -> Result<SimulationSummary, TaxError> {
    let computed: Vec<&T> = per_year.iter().filter_map(YearOutcome::result).collect();
    let total_income = checked_total(&computed, "total_income", T::income)?;
    let total_tax = checked_total(&computed, "total_tax", T::total_tax)?;
    let average_effective_rate = if computed.is_empty() {
        0.0
    } else {
        round2(computed.iter().map(|r| r.effective_rate()).sum::<f64>() / computed.len() as f64)
    };

    Ok(SimulationSummary {
        years: per_year.len(),
        start_year,
        end_year,
        years_computed: computed.len(),
        years_failed: per_year.len() - computed.len(),
        total_income,
        total_tax,
        average_effective_rate,
        overall_effective_rate: percent_of(total_tax, total_income),
    })
}
