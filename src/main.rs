//! Entry point for the Japanese tax engine binary.
//!
//! Most subcommands run one calculation from a JSON request file; the
//! rest describe the configured tables.  Output is JSON on stdout.  Tax tables are the built-in
//! ones unless a directory of year files is given with `--tables-dir`
//! (or the `JPTAX_TABLES_DIR` environment variable).  Log output goes to
//! stderr so that stdout stays machine-readable.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use jp_tax_engine::adjustment::EstimatePolicy;
use jp_tax_engine::classification::ClassifierKind;
use jp_tax_engine::config::{load_config_from_dir, PolicySettings, TaxConfig};
use jp_tax_engine::consumption::{parse_date, ConsumptionCategory};
use jp_tax_engine::corporate::CorporateTaxEngine;
use jp_tax_engine::engine::{MultiYearSimulator, YearErrorPolicy};
use jp_tax_engine::income::IncomeTaxEngine;
use jp_tax_engine::models::{CorporateTaxInput, IncomeTaxInput, PersonalTaxInput, ResidentTaxInput};
use jp_tax_engine::money::RoundingPolicy;
use jp_tax_engine::personal::PersonalTaxCalculator;
use jp_tax_engine::resident::ResidentTaxEngine;

const DEFAULT_TAX_YEAR: i32 = 2025;

#[derive(Parser, Debug)]
#[command(name = "jp_tax_engine")]
#[command(about = "Japanese income, resident and corporate tax calculator")]
struct Args {
    #[command(subcommand)]
    tool: Tool,

    /// Directory of per-year tax table files (replaces the built-in tables)
    #[arg(long, env = "JPTAX_TABLES_DIR", global = true)]
    tables_dir: Option<PathBuf>,

    /// Rounding policy (truncate, round_half_up, none)
    #[arg(long, global = true, value_parser = parse_setting::<RoundingPolicy>)]
    rounding: Option<RoundingPolicy>,

    /// Company classifier (capital_only, capital_and_income)
    #[arg(long, global = true, value_parser = parse_setting::<ClassifierKind>)]
    classifier: Option<ClassifierKind>,

    /// Handling of missing adjustment items (percentage_of_profit, disabled, strict)
    #[arg(long, global = true, value_parser = parse_setting::<EstimatePolicy>)]
    estimates: Option<EstimatePolicy>,

    /// What a simulation does when a year fails (abort, continue)
    #[arg(long, global = true, value_parser = parse_setting::<YearErrorPolicy>)]
    on_year_error: Option<YearErrorPolicy>,

    /// Log level (debug, info, warn, error); `RUST_LOG` takes precedence
    #[arg(short, long, default_value = "warn", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Tool {
    /// Personal income tax for one year
    IncomeTax { request: PathBuf },
    /// Personal resident tax for one year
    ResidentTax { request: PathBuf },
    /// Corporate tax and the local taxes derived from it for one year
    CorporateTax { request: PathBuf },
    /// Income and resident tax over consecutive years
    SimulateIncome { request: PathBuf },
    /// Corporate tax over consecutive years
    SimulateCorporate { request: PathBuf },
    /// Consumption tax rate in force on a date (YYYY-MM-DD)
    ConsumptionRate {
        date: String,
        /// standard or reduced
        #[arg(long, default_value = "standard")]
        category: String,
    },
    /// Overview of the configured tables, for one year or every year
    TaxYearInfo {
        #[arg(long)]
        year: Option<i32>,
    },
    /// Prefectures with dedicated rate tables in a tax year
    SupportedPrefectures {
        #[arg(long, default_value_t = DEFAULT_TAX_YEAR)]
        year: i32,
    },
}

/// A single-year request: the engine input plus the tax year.
#[derive(Debug, Deserialize)]
struct YearRequest<T> {
    #[serde(default = "default_tax_year")]
    tax_year: i32,
    #[serde(flatten)]
    input: T,
}

fn default_tax_year() -> i32 {
    DEFAULT_TAX_YEAR
}

/// A simulation request: one input per year, starting at `start_year`.
#[derive(Debug, Deserialize)]
struct SimulationRequest<T> {
    start_year: i32,
    years: Vec<T>,
}

fn parse_setting<T: DeserializeOwned>(value: &str) -> Result<T, String> {
    serde_json::from_value(serde_json::Value::String(value.to_string())).map_err(|e| e.to_string())
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_request<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("reading request {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing request {}", path.display()))
}

fn load_config(args: &Args) -> Result<TaxConfig> {
    let config = match &args.tables_dir {
        Some(dir) => load_config_from_dir(dir, PolicySettings::default())?,
        None => TaxConfig::japan_default()?,
    };
    let mut policy = config.policy;
    if let Some(rounding) = args.rounding {
        policy.rounding = rounding;
    }
    if let Some(classifier) = args.classifier {
        policy.classifier = classifier;
    }
    if let Some(estimates) = args.estimates {
        policy.estimates = estimates;
    }
    if let Some(on_year_error) = args.on_year_error {
        policy.on_year_error = on_year_error;
    }
    Ok(config.with_policy(policy))
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

fn run(args: &Args) -> Result<String> {
    let config = Arc::new(load_config(args)?);
    match &args.tool {
        Tool::IncomeTax { request } => {
            let req: YearRequest<IncomeTaxInput> = read_request(request)?;
            to_json(&IncomeTaxEngine::new(config).calculate(&req.input, req.tax_year)?)
        }
        Tool::ResidentTax { request } => {
            let req: YearRequest<ResidentTaxInput> = read_request(request)?;
            to_json(&ResidentTaxEngine::new(config).calculate(&req.input, req.tax_year)?)
        }
        Tool::CorporateTax { request } => {
            let req: YearRequest<CorporateTaxInput> = read_request(request)?;
            to_json(&CorporateTaxEngine::new(config).calculate(&req.input, req.tax_year)?)
        }
        Tool::SimulateIncome { request } => {
            let req: SimulationRequest<PersonalTaxInput> = read_request(request)?;
            let simulator = MultiYearSimulator::from_config(&config);
            let calculator = PersonalTaxCalculator::new(config);
            to_json(&simulator.simulate(&calculator, &req.years, req.start_year)?)
        }
        Tool::SimulateCorporate { request } => {
            let req: SimulationRequest<CorporateTaxInput> = read_request(request)?;
            let simulator = MultiYearSimulator::from_config(&config);
            let engine = CorporateTaxEngine::new(config);
            to_json(&simulator.simulate(&engine, &req.years, req.start_year)?)
        }
        Tool::ConsumptionRate { date, category } => {
            let category: ConsumptionCategory = category.parse()?;
            to_json(&config.consumption.rate_on(parse_date(date)?, category))
        }
        Tool::TaxYearInfo { year: Some(year) } => to_json(&config.year_info(*year)?),
        Tool::TaxYearInfo { year: None } => {
            let years = config
                .supported_years()
                .map(|year| config.year_info(year))
                .collect::<Result<Vec<_>, _>>()?;
            to_json(&years)
        }
        Tool::SupportedPrefectures { year } => {
            let prefectures = config.year(*year, "prefecture")?.prefectures();
            to_json(&serde_json::json!({
                "tax_year": year,
                "prefectures": prefectures,
                "others": "taxed at the default rates",
            }))
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args.log_level);

    match run(&args) {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            let message = format!("{err:#}");
            tracing::error!(error = %message, "calculation failed");
            println!("{}", serde_json::json!({ "error": message }));
            ExitCode::FAILURE
        }
    }
}
