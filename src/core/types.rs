use serde::Serialize;

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "mode", content = "value")]
pub enum MarketModel {
    /// Market sentiment on a 0..=100 scale.
    Sentiment(f64),
    /// Unitless multiplier on the baseline loss probabilities.
    Volatility(f64),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationParameters {
    pub initial_investment: f64,
    pub investment_years: u32,
    pub savings_annual_rate: f64,
    pub stock_market_annual_rate: f64,
    pub inflation_annual_rate: f64,
    pub market_model: MarketModel,
    pub monthly_contribution: f64,
}

impl SimulationParameters {
    pub fn total_months(&self) -> u32 {
        self.investment_years.saturating_mul(12)
    }

    pub fn total_contributed(&self) -> f64 {
        self.initial_investment + self.monthly_contribution * 12.0 * self.investment_years as f64
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConditionTag {
    TenPercent,
    ThirtyPercent,
    BlackSwan,
    DailyFluctuation,
    SmallDip,
    Correction,
    Crash,
    SmallRally,
    StrongRally,
    BullRun,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum Severity {
    Fixed { factor: f64 },
    /// Drawn each month as `base + U(0, spread)`.
    Jittered { base: f64, spread: f64 },
}

impl Severity {
    pub fn expected(self) -> f64 {
        match self {
            Severity::Fixed { factor } => factor,
            Severity::Jittered { base, spread } => base + spread / 2.0,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketConditionEvent {
    pub tag: ConditionTag,
    pub probability: f64,
    pub severity: Severity,
    pub duration_months: u32,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConditionMode {
    /// Events only apply inside the "on" half of a `2 x duration` cycle.
    DutyCycle,
    /// Every event rolls every month.
    Independent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketConditionSet {
    pub mode: ConditionMode,
    pub events: Vec<MarketConditionEvent>,
}

impl MarketConditionSet {
    pub fn get(&self, tag: ConditionTag) -> Option<&MarketConditionEvent> {
        self.events.iter().find(|event| event.tag == tag)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalPricePoint {
    pub timestamp: i64,
    pub close: f64,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearlyAnchor {
    pub year: u32,
    pub timestamp: i64,
    pub value: f64,
    pub cumulative_investment: f64,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodReturn {
    pub timestamp: i64,
    /// Fractional change against the previous sample.
    pub change: f64,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearEndSnapshot {
    pub year: u32,
    pub savings_account_balance: f64,
    pub equity_balance_stochastic: f64,
    pub equity_balance_historical: f64,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationSummary {
    pub final_savings_value: f64,
    pub final_stochastic_equity_value: f64,
    pub final_historical_equity_value: f64,
    pub total_contributed: f64,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnBreakdown {
    pub final_value: f64,
    pub profit: f64,
    pub return_pct: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    pub yearly_data: Vec<YearEndSnapshot>,
    pub summary: SimulationSummary,
}
