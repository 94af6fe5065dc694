//! Error types for the tax engine.
//!
//! Every calculation either returns a complete result record or one of
//! the errors below; partial results are never produced.  Errors carry
//! enough context (the field, the offending value) for a caller-facing
//! message.

use serde::Serialize;
use thiserror::Error;

/// Errors produced by the calculation engines and the configuration
/// layer.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxError {
    /// A numeric input was negative or otherwise malformed.
    #[error("invalid input for `{field}` ({value}): {reason}")]
    InvalidInput {
        /// Name of the offending input field.
        field: String,
        /// The rejected value, rendered for display.
        value: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// No table or rate data is registered for the requested year.
    #[error("tax year {year} is not supported: no {table} data")]
    UnsupportedTaxYear {
        /// The requested tax year.
        year: i32,
        /// Which table was missing (e.g. `"income tax bracket"`).
        table: String,
    },

    /// The prefecture has no dedicated table.  The engines never return
    /// this; they fall back to the default table and log it instead.
    #[error("prefecture `{prefecture}` has no dedicated rate table")]
    UnsupportedPrefecture {
        /// The prefecture name as supplied by the caller.
        prefecture: String,
    },

    /// Tax tables failed a structural check while being loaded.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl TaxError {
    /// Shorthand for [`TaxError::InvalidInput`].
    pub fn invalid_input(
        field: impl Into<String>,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        TaxError::InvalidInput {
            field: field.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    /// No table covers `year`; `table` names the table that was looked up.
    pub fn unsupported_year(year: i32, table: impl Into<String>) -> Self {
        TaxError::UnsupportedTaxYear {
            year,
            table: table.into(),
        }
    }
}

/// Reject a negative yen amount for the named field.
pub(crate) fn ensure_non_negative(field: &str, amount: i64) -> Result<(), TaxError> {
    if amount < 0 {
        return Err(TaxError::invalid_input(
            field,
            amount,
            "amount must not be negative",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_input_message_names_field_and_value() {
        let err = TaxError::invalid_input("accounting_profit", -5, "amount must not be negative");
        assert_eq!(
            err.to_string(),
            "invalid input for `accounting_profit` (-5): amount must not be negative"
        );
    }

    #[test]
    fn ensure_non_negative_accepts_zero() {
        assert!(ensure_non_negative("gross_income", 0).is_ok());
        assert!(matches!(
            ensure_non_negative("gross_income", -1),
            Err(TaxError::InvalidInput { .. })
        ));
    }

    #[test]
    fn unsupported_year_names_the_missing_table() {
        let err = TaxError::unsupported_year(2030, "income tax bracket");
        assert_eq!(err.to_string(), "tax year 2030 is not supported: no income tax bracket data");
    }
}
