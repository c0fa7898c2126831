use serde::Serialize;

use super::types::{ReturnBreakdown, SimulationParameters, SimulationSummary, YearEndSnapshot};

pub fn summarize(params: &SimulationParameters, snapshots: &[YearEndSnapshot]) -> SimulationSummary {
    let (savings, stochastic, historical) = snapshots.last().map_or(
        (
            params.initial_investment,
            params.initial_investment,
            params.initial_investment,
        ),
        |last| {
            (
                last.savings_account_balance,
                last.equity_balance_stochastic,
                last.equity_balance_historical,
            )
        },
    );

    SimulationSummary {
        final_savings_value: savings,
        final_stochastic_equity_value: stochastic,
        final_historical_equity_value: historical,
        total_contributed: params.total_contributed(),
    }
}

pub fn profit_and_return_pct(final_value: f64, total_contributed: f64) -> (f64, f64) {
    let profit = final_value - total_contributed;
    if total_contributed == 0.0 {
        return (profit, 0.0);
    }
    (profit, profit / total_contributed * 100.0)
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryBreakdown {
    pub savings_account: ReturnBreakdown,
    pub equity_stochastic: ReturnBreakdown,
    pub equity_historical: ReturnBreakdown,
}

impl SimulationSummary {
    pub fn breakdown(&self) -> SummaryBreakdown {
        let line = |final_value: f64| {
            let (profit, return_pct) = profit_and_return_pct(final_value, self.total_contributed);
            ReturnBreakdown {
                final_value,
                profit,
                return_pct,
            }
        };

        SummaryBreakdown {
            savings_account: line(self.final_savings_value),
            equity_stochastic: line(self.final_stochastic_equity_value),
            equity_historical: line(self.final_historical_equity_value),
        }
    }
}
