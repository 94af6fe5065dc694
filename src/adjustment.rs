//! Corporate tax adjustment items.
//!
//! Taxable income is derived from accounting profit through additions
//! (expenses not deductible, income not booked) and deductions (income
//! excluded, allowances granted), and the corporate tax base is then
//! reduced by tax credits.  The [`AdjustmentLedger`] holds these items
//! for one calculation.
//!
//! When the caller supplies no items an [`EstimateProvider`] may fill
//! them in.  The built-in [`PercentageOfProfitEstimator`] guesses amounts
//! as fixed shares of profit; this is a convenience, not a computation
//! required by law, so every item it produces is flagged with
//! `is_defaulted = true` and a warning is logged.

use std::fmt::Debug;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::TaxError;
use crate::money::{Rate, RoundingPolicy, Yen};

/// Which side of the computation an item belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentKind {
    /// Added to accounting profit (加算).
    Addition,
    /// Subtracted from accounting profit (減算).
    Deduction,
    /// Subtracted from the corporate tax base (税額控除).
    Credit,
}

impl AdjustmentKind {
    fn field(self) -> &'static str {
        match self {
            AdjustmentKind::Addition => "additions",
            AdjustmentKind::Deduction => "deductions",
            AdjustmentKind::Credit => "credits",
        }
    }
}

/// A single named adjustment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentItem {
    pub kind: AdjustmentKind,
    pub name: String,
    /// Non-negative amount in yen.
    pub amount: Yen,
    #[serde(default)]
    pub description: String,
    /// Schedule of the corporate tax return the item is reported on.
    #[serde(default)]
    pub legal_reference: String,
    /// True when the amount was estimated rather than supplied.
    #[serde(default)]
    pub is_defaulted: bool,
}

impl AdjustmentItem {
    pub fn new(kind: AdjustmentKind, name: impl Into<String>, amount: Yen) -> Self {
        AdjustmentItem {
            kind,
            name: name.into(),
            amount,
            description: String::new(),
            legal_reference: String::new(),
            is_defaulted: false,
        }
    }

    pub fn addition(name: impl Into<String>, amount: Yen) -> Self {
        Self::new(AdjustmentKind::Addition, name, amount)
    }

    pub fn deduction(name: impl Into<String>, amount: Yen) -> Self {
        Self::new(AdjustmentKind::Deduction, name, amount)
    }

    pub fn credit(name: impl Into<String>, amount: Yen) -> Self {
        Self::new(AdjustmentKind::Credit, name, amount)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_legal_reference(mut self, reference: impl Into<String>) -> Self {
        self.legal_reference = reference.into();
        self
    }
}

/// Additions, deductions and credits for one calculation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentLedger {
    additions: Vec<AdjustmentItem>,
    deductions: Vec<AdjustmentItem>,
    credits: Vec<AdjustmentItem>,
}

impl AdjustmentLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an item, routing it by its kind.  Negative amounts are
    /// rejected.
    pub fn push(&mut self, item: AdjustmentItem) -> Result<(), TaxError> {
        if item.amount < 0 {
            return Err(TaxError::invalid_input(
                format!("{}.{}", item.kind.field(), item.name),
                item.amount,
                "adjustment amounts must not be negative",
            ));
        }
        match item.kind {
            AdjustmentKind::Addition => self.additions.push(item),
            AdjustmentKind::Deduction => self.deductions.push(item),
            AdjustmentKind::Credit => self.credits.push(item),
        }
        Ok(())
    }

    /// Record every item, checking that each one is of the `expected`
    /// kind (a credit passed as an addition is a caller error).
    pub fn extend(
        &mut self,
        expected: AdjustmentKind,
        items: impl IntoIterator<Item = AdjustmentItem>,
    ) -> Result<(), TaxError> {
        for item in items {
            if item.kind != expected {
                return Err(TaxError::invalid_input(
                    expected.field(),
                    &item.name,
                    format!("item is tagged {:?}", item.kind),
                ));
            }
            self.push(item)?;
        }
        Ok(())
    }

    pub fn additions(&self) -> &[AdjustmentItem] {
        &self.additions
    }

    pub fn deductions(&self) -> &[AdjustmentItem] {
        &self.deductions
    }

    pub fn credits(&self) -> &[AdjustmentItem] {
        &self.credits
    }

    pub fn total_additions(&self) -> Yen {
        total(&self.additions)
    }

    pub fn total_deductions(&self) -> Yen {
        total(&self.deductions)
    }

    pub fn total_credits(&self) -> Yen {
        total(&self.credits)
    }

    /// True when any recorded item was estimated.
    pub fn has_estimates(&self) -> bool {
        self.additions
            .iter()
            .chain(&self.deductions)
            .chain(&self.credits)
            .any(|item| item.is_defaulted)
    }

    pub fn into_parts(self) -> (Vec<AdjustmentItem>, Vec<AdjustmentItem>, Vec<AdjustmentItem>) {
        (self.additions, self.deductions, self.credits)
    }
}

fn total(items: &[AdjustmentItem]) -> Yen {
    items.iter().fold(0, |acc: Yen, item| acc.saturating_add(item.amount))
}

/// Supplies adjustment items when the caller leaves them out.
///
/// Additions and deductions are estimated from accounting profit,
/// credits from the pre-credit corporate tax base.
pub trait EstimateProvider: Send + Sync + Debug {
    fn name(&self) -> &str;
    fn additions(&self, accounting_profit: Yen) -> Result<Vec<AdjustmentItem>, TaxError>;
    fn deductions(&self, accounting_profit: Yen) -> Result<Vec<AdjustmentItem>, TaxError>;
    fn credits(&self, corporate_tax_base: Yen) -> Result<Vec<AdjustmentItem>, TaxError>;
}

/// (name, share in ppm, description, schedule)
type EstimateRow = (&'static str, u32, &'static str, &'static str);

const ADDITION_ESTIMATES: &[EstimateRow] = &[
    ("寄附金損金不算入額", 1_000, "限度額超過分", "別表四・十四"),
    ("交際費損金不算入額", 2_000, "限度超過分", "別表四・十五"),
    ("過大役員給与", 0, "定期同額給与・事前確定給与の要件外部分", "別表四"),
    ("過大支払利息", 0, "過大部分は損金不算入", "別表四"),
    ("減価償却超過額", 5_000, "会計＞税法償却額の場合", "別表四・十六"),
    ("引当金繰入超過額", 0, "会計計上が税法限度を超えた部分", "別表四"),
    ("受取配当金益金算入額", 1_000, "損益計算書に計上された全額", "別表四・六"),
    ("留保金課税対象額", 0, "同族会社留保所得に対する加算課税", "別表三"),
    ("法人税・住民税・事業税", 10_000, "本税自体は損金不算入", "別表五（二）"),
];

const DEDUCTION_ESTIMATES: &[EstimateRow] = &[
    ("受取配当金益金不算入額", 1_000, "法人間配当の益金不算入", "別表四・六"),
    ("減価償却不足額", 0, "会計＜税法償却額の場合", "別表四・十六"),
    ("繰延資産償却不足額", 0, "税法認容額との差額", "別表四"),
    ("特別償却費", 0, "特例償却", "別表四・九・十六"),
    ("引当金・準備金繰入認容額", 0, "税法上認められる部分", "別表四"),
    ("繰越欠損金控除額", 0, "青色申告法人の赤字控除", "別表四・七"),
    ("災害損失金控除額", 0, "災害損失の繰越控除", "別表七"),
    ("グループ法人譲渡益繰延", 0, "グループ内資産移転の益金繰延", "別表二十"),
];

const CREDIT_ESTIMATES: &[EstimateRow] = &[
    ("研究開発税制（試験研究費控除）", 20_000, "研究開発費に応じた税額控除", "別表十"),
    ("中小企業投資促進税制", 0, "特定設備投資に伴う税額控除", "別表九"),
    ("所得拡大促進税制", 0, "給与総額増加に応じた控除", "別表九"),
    ("外国税額控除", 0, "国外で課税された税額を控除", "別表八"),
    ("エネルギー環境投資促進税制", 0, "環境関連設備投資の控除", "別表九"),
    ("情報基盤強化税制", 0, "IT投資に伴う控除", "別表九"),
    ("中小企業者特別控除", 0, "租税特別措置法に基づく控除", "別表十一"),
];

/// Estimates each item as a fixed share of profit (or, for credits, of
/// the corporate tax base).  Fractions of a yen are truncated.
#[derive(Debug, Clone, Copy, Default)]
pub struct PercentageOfProfitEstimator;

impl PercentageOfProfitEstimator {
    fn build(kind: AdjustmentKind, rows: &[EstimateRow], basis: Yen) -> Vec<AdjustmentItem> {
        let items: Vec<AdjustmentItem> = rows
            .iter()
            .map(|&(name, share, description, reference)| AdjustmentItem {
                kind,
                name: name.to_string(),
                amount: RoundingPolicy::Truncate.apply(basis, Rate::from_ppm(share)),
                description: description.to_string(),
                legal_reference: reference.to_string(),
                is_defaulted: true,
            })
            .collect();
        tracing::warn!(
            kind = ?kind,
            basis,
            estimated_total = total(&items),
            "no {} supplied; using percentage-of-profit estimates",
            kind.field()
        );
        items
    }
}

impl EstimateProvider for PercentageOfProfitEstimator {
    fn name(&self) -> &str {
        "percentage_of_profit"
    }

    fn additions(&self, accounting_profit: Yen) -> Result<Vec<AdjustmentItem>, TaxError> {
        Ok(Self::build(AdjustmentKind::Addition, ADDITION_ESTIMATES, accounting_profit))
    }

    fn deductions(&self, accounting_profit: Yen) -> Result<Vec<AdjustmentItem>, TaxError> {
        Ok(Self::build(AdjustmentKind::Deduction, DEDUCTION_ESTIMATES, accounting_profit))
    }

    fn credits(&self, corporate_tax_base: Yen) -> Result<Vec<AdjustmentItem>, TaxError> {
        Ok(Self::build(AdjustmentKind::Credit, CREDIT_ESTIMATES, corporate_tax_base))
    }
}

/// Treats missing items as "none".
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEstimates;

impl EstimateProvider for NoEstimates {
    fn name(&self) -> &str {
        "disabled"
    }

    fn additions(&self, _accounting_profit: Yen) -> Result<Vec<AdjustmentItem>, TaxError> {
        Ok(Vec::new())
    }

    fn deductions(&self, _accounting_profit: Yen) -> Result<Vec<AdjustmentItem>, TaxError> {
        Ok(Vec::new())
    }

    fn credits(&self, _corporate_tax_base: Yen) -> Result<Vec<AdjustmentItem>, TaxError> {
        Ok(Vec::new())
    }
}

/// Refuses to calculate when any item list is missing.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequireExplicitItems;

impl RequireExplicitItems {
    fn missing(kind: AdjustmentKind) -> TaxError {
        TaxError::invalid_input(
            kind.field(),
            "<missing>",
            "adjustment items must be supplied when estimates are not allowed",
        )
    }
}

impl EstimateProvider for RequireExplicitItems {
    fn name(&self) -> &str {
        "strict"
    }

    fn additions(&self, _accounting_profit: Yen) -> Result<Vec<AdjustmentItem>, TaxError> {
        Err(Self::missing(AdjustmentKind::Addition))
    }

    fn deductions(&self, _accounting_profit: Yen) -> Result<Vec<AdjustmentItem>, TaxError> {
        Err(Self::missing(AdjustmentKind::Deduction))
    }

    fn credits(&self, _corporate_tax_base: Yen) -> Result<Vec<AdjustmentItem>, TaxError> {
        Err(Self::missing(AdjustmentKind::Credit))
    }
}

/// Configuration selector for the built-in estimate providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatePolicy {
    #[default]
    PercentageOfProfit,
    Disabled,
    Strict,
}

impl EstimatePolicy {
    pub fn provider(self) -> Arc<dyn EstimateProvider> {
        match self {
            EstimatePolicy::PercentageOfProfit => Arc::new(PercentageOfProfitEstimator),
            EstimatePolicy::Disabled => Arc::new(NoEstimates),
            EstimatePolicy::Strict => Arc::new(RequireExplicitItems),
        }
    }
}
