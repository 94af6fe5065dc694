//! Japanese tax engine library crate.
//!
//! This crate computes Japanese personal income tax, personal resident
//! tax and corporate tax (with local corporate tax, business tax,
//! special business tax and corporate resident tax) from structured
//! inputs, and runs any of those calculations over consecutive years.
//! Calculations are pure functions of their input and an immutable
//! [`config::TaxConfig`] snapshot, so engines can be shared freely
//! across threads.
//!
//! ```no_run
//! use std::sync::Arc;
//! use jp_tax_engine::config::TaxConfig;
//! use jp_tax_engine::income::IncomeTaxEngine;
//! use jp_tax_engine::models::IncomeTaxInput;
//!
//! # fn main() -> Result<(), jp_tax_engine::error::TaxError> {
//! let config = Arc::new(TaxConfig::japan_default()?);
//! let result = IncomeTaxEngine::new(config).calculate(&IncomeTaxInput::new(5_000_000), 2025)?;
//! assert_eq!(result.income_tax, 210_500);
//! # Ok(())
//! # }
//! ```

pub mod adjustment;
pub mod bracket;
pub mod classification;
pub mod config;
pub mod consumption;
pub mod corporate;
pub mod engine;
pub mod error;
pub mod income;
pub mod models;
pub mod money;
pub mod personal;
pub mod resident;
pub mod tax;

pub use config::{ConfigHandle, TaxConfig};
pub use corporate::CorporateTaxEngine;
pub use engine::{MultiYearSimulator, YearErrorPolicy};
pub use error::TaxError;
pub use income::IncomeTaxEngine;
pub use personal::PersonalTaxCalculator;
pub use resident::ResidentTaxEngine;
pub use tax::TaxCalculator;
