//! Tax tables and policy configuration.
//!
//! All rates, brackets and policy switches live in one immutable
//! [`TaxConfig`] value.  It is built (and validated) once, then shared
//! by `Arc` with every engine.  Tables are versioned by tax year; each
//! year is stored as its own JSON file under `tax_tables/`, and the
//! files for the supported years are embedded into the library.
//!
//! Reconfiguration goes through [`ConfigHandle`], which swaps whole
//! snapshots: a reader holds either the old configuration or the new
//! one, never a mixture.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::adjustment::EstimatePolicy;
use crate::bracket::BracketTable;
use crate::classification::ClassifierKind;
use crate::consumption::{ConsumptionCategory, ConsumptionSchedule};
use crate::engine::YearErrorPolicy;
use crate::error::TaxError;
use crate::money::{Rate, RoundingPolicy, Yen};

const BUILTIN_YEARS: &[(i32, &str)] = &[
    (2023, include_str!("../tax_tables/2023.json")),
    (2024, include_str!("../tax_tables/2024.json")),
    (2025, include_str!("../tax_tables/2025.json")),
];

/// Policy switches that are not tax law.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySettings {
    pub rounding: RoundingPolicy,
    pub classifier: ClassifierKind,
    pub estimates: EstimatePolicy,
    pub on_year_error: YearErrorPolicy,
}

/// A per-prefecture table with a mandatory default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct PrefectureTable<T> {
    pub default: T,
    #[serde(default)]
    pub prefectures: BTreeMap<String, T>,
}

/// A value resolved from a [`PrefectureTable`].
#[derive(Debug, Clone, Copy)]
pub struct Resolved<'a, T> {
    pub value: &'a T,
    /// True when the prefecture had no entry and the default was used.
    pub fallback: bool,
}

impl<T> PrefectureTable<T> {
    /// Look up `prefecture`, degrading to the default entry.  A fallback
    /// is logged but never fails the calculation.
    pub fn lookup(&self, prefecture: &str, table: &str) -> Resolved<'_, T> {
        match self.prefectures.get(prefecture) {
            Some(value) => Resolved {
                value,
                fallback: false,
            },
            None => {
                let err = TaxError::UnsupportedPrefecture {
                    prefecture: prefecture.to_string(),
                };
                tracing::warn!(error = %err, table, "falling back to the default table");
                Resolved {
                    value: &self.default,
                    fallback: true,
                }
            }
        }
    }

    /// Prefectures with a dedicated entry, in name order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.prefectures.keys().map(String::as_str)
    }

    fn entries(&self) -> impl Iterator<Item = (&str, &T)> {
        std::iter::once(("default", &self.default))
            .chain(self.prefectures.iter().map(|(name, value)| (name.as_str(), value)))
    }
}

/// National corporate tax rates for one year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorporateRates {
    /// Reduced rate for small companies on income up to the ceiling.
    pub reduced_rate: Rate,
    /// Standard rate (large companies, and small-company income above
    /// the ceiling).
    pub standard_rate: Rate,
    pub reduced_rate_ceiling: Yen,
    /// Local corporate tax as a share of the pre-credit corporate tax.
    pub local_corporate_tax_rate: Rate,
    /// Special business tax as a share of business tax.
    pub special_business_tax_ratio: Rate,
}

/// Personal resident tax rates of one prefecture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResidentRates {
    pub prefectural_rate: Rate,
    pub municipal_rate: Rate,
    pub prefectural_per_capita: Yen,
    pub municipal_per_capita: Yen,
    /// Whether the per-capita levy is waived together with the
    /// income-based levy for incomes under the exemption threshold.
    #[serde(default = "waive_by_default")]
    pub waive_per_capita_on_exemption: bool,
}

fn waive_by_default() -> bool {
    true
}

/// One tier of a capital-keyed per-capita levy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapitalTier {
    /// Inclusive capital ceiling; `None` for the final tier.
    #[serde(default)]
    pub up_to: Option<Yen>,
    pub levy: Yen,
}

/// Ascending capital tiers ending with an open tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<CapitalTier>", into = "Vec<CapitalTier>")]
pub struct CapitalTiers(Vec<CapitalTier>);

impl CapitalTiers {
    pub fn new(tiers: Vec<CapitalTier>) -> Result<Self, TaxError> {
        let Some(last) = tiers.last() else {
            return Err(TaxError::Configuration("capital tiers must not be empty".into()));
        };
        if last.up_to.is_some() {
            return Err(TaxError::Configuration("final capital tier must be open-ended".into()));
        }
        let mut previous: Option<Yen> = None;
        for (i, tier) in tiers.iter().enumerate() {
            if tier.levy < 0 {
                return Err(TaxError::Configuration(format!("capital tier {i} has a negative levy")));
            }
            if i + 1 < tiers.len() {
                let Some(ceiling) = tier.up_to else {
                    return Err(TaxError::Configuration(format!(
                        "capital tier {i} is open-ended but is not the final tier"
                    )));
                };
                if previous.is_some_and(|p| ceiling <= p) {
                    return Err(TaxError::Configuration(format!(
                        "capital tier {i} is not above the previous tier"
                    )));
                }
                previous = Some(ceiling);
            }
        }
        Ok(CapitalTiers(tiers))
    }

    /// Levy for a company with the given capital.
    pub fn levy_for(&self, capital: Yen) -> Yen {
        self.0
            .iter()
            .find(|tier| tier.up_to.map_or(true, |ceiling| capital <= ceiling))
            .map_or(0, |tier| tier.levy)
    }
}

impl TryFrom<Vec<CapitalTier>> for CapitalTiers {
    type Error = TaxError;

    fn try_from(tiers: Vec<CapitalTier>) -> Result<Self, Self::Error> {
        CapitalTiers::new(tiers)
    }
}

impl From<CapitalTiers> for Vec<CapitalTier> {
    fn from(tiers: CapitalTiers) -> Self {
        tiers.0
    }
}

/// Corporate resident tax rates of one prefecture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorporateResidentRates {
    /// Per-capita levy (均等割) by capital.
    pub per_capita: CapitalTiers,
    /// Levy on the post-credit corporate tax (法人税割).
    pub income_rate: Rate,
}

/// Every table for one tax year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearTables {
    pub tax_year: i32,
    pub income_tax_brackets: BracketTable,
    pub corporate: CorporateRates,
    pub business_tax: PrefectureTable<BracketTable>,
    pub resident: PrefectureTable<ResidentRates>,
    /// Taxable income at or below which personal resident tax is exempt.
    pub resident_exemption_threshold: Yen,
    pub corporate_resident: PrefectureTable<CorporateResidentRates>,
}

/// Overview of the tables configured for one tax year.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaxYearInfo {
    pub tax_year: i32,
    pub income_tax_bracket_count: usize,
    pub top_income_tax_rate: Rate,
    pub corporate: CorporateRates,
    pub resident_exemption_threshold: Yen,
    /// Consumption tax rates in force on 1 January of the year.
    pub consumption_standard_rate: Rate,
    pub consumption_reduced_rate: Rate,
    /// Prefectures with a dedicated table of any kind.  Every other
    /// prefecture is taxed at the default rates.
    pub prefectures: Vec<String>,
}

impl YearTables {
    /// Union of the prefectures named by the business tax, resident tax
    /// and corporate resident tax tables.
    pub fn prefectures(&self) -> Vec<String> {
        self.business_tax
            .names()
            .chain(self.resident.names())
            .chain(self.corporate_resident.names())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    fn validate(&self) -> Result<(), TaxError> {
        let year = self.tax_year;
        if self.corporate.reduced_rate_ceiling < 0 {
            return Err(TaxError::Configuration(format!(
                "{year}: reduced-rate ceiling must not be negative"
            )));
        }
        if self.resident_exemption_threshold < 0 {
            return Err(TaxError::Configuration(format!(
                "{year}: resident exemption threshold must not be negative"
            )));
        }
        for (prefecture, rates) in self.resident.entries() {
            if rates.prefectural_per_capita < 0 || rates.municipal_per_capita < 0 {
                return Err(TaxError::Configuration(format!(
                    "{year}: per-capita levy for {prefecture} must not be negative"
                )));
            }
        }
        Ok(())
    }
}

/// The complete, validated configuration snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxConfig {
    #[serde(default)]
    pub policy: PolicySettings,
    pub years: BTreeMap<i32, YearTables>,
    #[serde(default)]
    pub consumption: ConsumptionSchedule,
}

impl TaxConfig {
    /// Assemble a configuration from per-year tables.  Duplicate years
    /// and structurally invalid tables are rejected.
    pub fn from_parts(policy: PolicySettings, tables: Vec<YearTables>) -> Result<Self, TaxError> {
        let mut years = BTreeMap::new();
        for table in tables {
            let year = table.tax_year;
            if years.insert(year, table).is_some() {
                return Err(TaxError::Configuration(format!(
                    "tax year {year} is defined more than once"
                )));
            }
        }
        let config = TaxConfig {
            policy,
            years,
            consumption: ConsumptionSchedule::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Built-in Japanese tables for tax years 2023 to 2025 with default
    /// policy.
    pub fn japan_default() -> Result<Self, TaxError> {
        let tables = BUILTIN_YEARS
            .iter()
            .map(|(year, json)| {
                serde_json::from_str::<YearTables>(json).map_err(|e| {
                    TaxError::Configuration(format!("built-in tables for {year}: {e}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_parts(PolicySettings::default(), tables)
    }

    /// Parse a whole configuration document and validate it.
    pub fn from_json_str(json: &str) -> Result<Self, TaxError> {
        let config: TaxConfig =
            serde_json::from_str(json).map_err(|e| TaxError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_policy(mut self, policy: PolicySettings) -> Self {
        self.policy = policy;
        self
    }

    pub fn validate(&self) -> Result<(), TaxError> {
        if self.years.is_empty() {
            return Err(TaxError::Configuration("no tax years configured".into()));
        }
        for (year, tables) in &self.years {
            if *year != tables.tax_year {
                return Err(TaxError::Configuration(format!(
                    "tables keyed as {year} declare tax year {}",
                    tables.tax_year
                )));
            }
            tables.validate()?;
        }
        Ok(())
    }

    /// Tables for `year`, or [`TaxError::UnsupportedTaxYear`] naming the
    /// table the caller needed.
    pub fn year(&self, year: i32, table: &str) -> Result<&YearTables, TaxError> {
        self.years
            .get(&year)
            .ok_or_else(|| TaxError::unsupported_year(year, table))
    }

    pub fn supported_years(&self) -> impl Iterator<Item = i32> + '_ {
        self.years.keys().copied()
    }

    /// Summarise the tables for `year`.
    pub fn year_info(&self, year: i32) -> Result<TaxYearInfo, TaxError> {
        let tables = self.year(year, "tax year")?;
        let new_year = NaiveDate::from_ymd_opt(year, 1, 1)
            .ok_or_else(|| TaxError::invalid_input("tax_year", year, "not a calendar year"))?;
        let brackets = tables.income_tax_brackets.brackets();
        Ok(TaxYearInfo {
            tax_year: year,
            income_tax_bracket_count: brackets.len(),
            top_income_tax_rate: brackets.last().map(|b| b.rate).unwrap_or_default(),
            corporate: tables.corporate.clone(),
            resident_exemption_threshold: tables.resident_exemption_threshold,
            consumption_standard_rate: self.consumption.rate_on(new_year, ConsumptionCategory::Standard).rate,
            consumption_reduced_rate: self.consumption.rate_on(new_year, ConsumptionCategory::Reduced).rate,
            prefectures: tables.prefectures(),
        })
    }
}

/// Parse a single year file.
pub fn load_year_tables_file(path: &Path) -> Result<YearTables> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("reading tax tables {}", path.display()))?;
    let tables: YearTables = serde_json::from_str(&data)
        .with_context(|| format!("parsing tax tables {}", path.display()))?;
    tables
        .validate()
        .with_context(|| format!("validating tax tables {}", path.display()))?;
    Ok(tables)
}

/// Load every `.json` year file in a directory, ordered by tax year.
///
/// Unlike a best-effort scan, any file that fails to parse or validate
/// aborts the load: a configuration error must surface at start-up, not
/// as a missing year at call time.
pub fn load_year_tables_from_dir(path: &Path) -> Result<Vec<YearTables>> {
    let mut tables = Vec::new();
    let entries = std::fs::read_dir(path)
        .with_context(|| format!("listing tax table directory {}", path.display()))?;
    for entry in entries {
        let entry = entry?;
        let file = entry.path();
        if entry.file_type()?.is_file() && file.extension().is_some_and(|ext| ext == "json") {
            tables.push(load_year_tables_file(&file)?);
        }
    }
    tables.sort_by_key(|t| t.tax_year);
    Ok(tables)
}

/// Build a configuration from a directory of year files.
pub fn load_config_from_dir(path: &Path, policy: PolicySettings) -> Result<TaxConfig> {
    let tables = load_year_tables_from_dir(path)?;
    let config = TaxConfig::from_parts(policy, tables)
        .with_context(|| format!("assembling configuration from {}", path.display()))?;
    tracing::info!(
        path = %path.display(),
        years = ?config.supported_years().collect::<Vec<_>>(),
        "loaded tax tables"
    );
    Ok(config)
}

/// Shared, swappable access to the current configuration snapshot.
#[derive(Debug)]
pub struct ConfigHandle {
    current: RwLock<Arc<TaxConfig>>,
}

impl ConfigHandle {
    pub fn new(config: TaxConfig) -> Result<Self, TaxError> {
        config.validate()?;
        Ok(ConfigHandle {
            current: RwLock::new(Arc::new(config)),
        })
    }

    /// The snapshot in force right now.  Holding it keeps it alive even
    /// if it is replaced meanwhile.
    pub fn snapshot(&self) -> Arc<TaxConfig> {
        self.current.read().clone()
    }

    /// Validate `config` and install it, returning the previous snapshot.
    /// An invalid configuration leaves the current one in place.
    pub fn replace(&self, config: TaxConfig) -> Result<Arc<TaxConfig>, TaxError> {
        config.validate()?;
        let next = Arc::new(config);
        let previous = std::mem::replace(&mut *self.current.write(), next);
        tracing::info!("tax configuration replaced");
        Ok(previous)
    }
}
