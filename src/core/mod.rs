mod conditions;
mod engine;
mod error;
mod history;
mod summary;
mod types;

pub use conditions::{build_conditions, in_duty_window};
pub use engine::{
    historical_scale_factor, monthly_inflation_factor, run_projection, run_projection_with_rng,
    savings_growth_factor,
};
pub use error::ArchiveError;
pub use history::{HistoricalReturnSeries, QuoteArchive, SECONDS_PER_YEAR};
pub use summary::{SummaryBreakdown, profit_and_return_pct, summarize};
pub use types::{
    ConditionMode, ConditionTag, HistoricalPricePoint, MarketConditionEvent, MarketConditionSet,
    MarketModel, PeriodReturn, ReturnBreakdown, Severity, SimulationParameters, SimulationResult,
    SimulationSummary, YearEndSnapshot, YearlyAnchor,
};
