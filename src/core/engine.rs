use rand::Rng;
use tracing::debug;

use super::conditions::build_conditions;
use super::history::HistoricalReturnSeries;
use super::summary::summarize;
use super::types::{
    MarketConditionSet, MarketModel, SimulationParameters, SimulationResult, YearEndSnapshot,
    YearlyAnchor,
};

const SENTIMENT_RATE_JITTER: (f64, f64) = (0.9, 1.1);
const SENTIMENT_NOISE: f64 = 0.025;
const SHARP_MOVE_PROBABILITY: f64 = 0.15;
const SHARP_MOVE_RANGE: (f64, f64) = (0.85, 1.15);

#[derive(Debug)]
struct Balances {
    savings: f64,
    equity: f64,
}

pub fn run_projection(
    params: &SimulationParameters,
    history: &HistoricalReturnSeries,
) -> SimulationResult {
    let mut rng = rand::rng();
    let result = run_projection_with_rng(params, history, &mut rng);
    debug!(
        years = params.investment_years,
        final_savings = result.summary.final_savings_value,
        final_equity = result.summary.final_stochastic_equity_value,
        final_historical = result.summary.final_historical_equity_value,
        "projection finished"
    );
    result
}

pub fn run_projection_with_rng<R: Rng + ?Sized>(
    params: &SimulationParameters,
    history: &HistoricalReturnSeries,
    rng: &mut R,
) -> SimulationResult {
    let conditions = build_conditions(params.market_model);
    let anchors = history.anchors_for_horizon(params.investment_years, params.monthly_contribution);
    let scale = historical_scale_factor(params.initial_investment, &anchors);

    let inflation_factor = monthly_inflation_factor(params.inflation_annual_rate);
    let savings_growth = savings_growth_factor(params.savings_annual_rate, params.inflation_annual_rate);
    let base_equity_rate = params.stock_market_annual_rate / 100.0 / 12.0;

    let mut balances = Balances {
        savings: params.initial_investment,
        equity: params.initial_investment,
    };
    let mut yearly_data = Vec::with_capacity(params.investment_years as usize + 1);
    yearly_data.push(YearEndSnapshot {
        year: 0,
        savings_account_balance: params.initial_investment,
        equity_balance_stochastic: params.initial_investment,
        equity_balance_historical: params.initial_investment,
    });

    let total_months = params.total_months();
    for month in 0..total_months {
        balances.savings += params.monthly_contribution;
        balances.equity += params.monthly_contribution;

        balances.savings *= savings_growth;

        let equity_rate =
            sample_equity_rate(base_equity_rate, params.market_model, &conditions, month, rng);
        balances.equity *= (1.0 + equity_rate) / inflation_factor;

        if month % 12 == 11 || month + 1 == total_months {
            let year = (month as f64 / 12.0).round() as u32;
            yearly_data.push(YearEndSnapshot {
                year,
                savings_account_balance: balances.savings.round(),
                equity_balance_stochastic: balances.equity.round(),
                equity_balance_historical: historical_balance(&anchors, year, scale).round(),
            });
        }
    }

    let summary = summarize(params, &yearly_data);
    SimulationResult {
        yearly_data,
        summary,
    }
}

fn sample_equity_rate<R: Rng + ?Sized>(
    base_rate: f64,
    model: MarketModel,
    conditions: &MarketConditionSet,
    month: u32,
    rng: &mut R,
) -> f64 {
    match model {
        MarketModel::Volatility(_) => base_rate * conditions.monthly_multiplier(month, rng),
        MarketModel::Sentiment(_) => {
            let (low, high) = SENTIMENT_RATE_JITTER;
            let mut rate = base_rate * rng.random_range(low..high);
            rate *= conditions.monthly_multiplier(month, rng);
            rate += rng.random_range(-SENTIMENT_NOISE..SENTIMENT_NOISE);
            if rng.random_bool(SHARP_MOVE_PROBABILITY) {
                let (low, high) = SHARP_MOVE_RANGE;
                rate *= rng.random_range(low..high);
            }
            rate
        }
    }
}

pub fn monthly_inflation_factor(inflation_annual_rate: f64) -> f64 {
    (1.0 + inflation_annual_rate / 100.0).powf(1.0 / 12.0)
}

pub fn savings_growth_factor(savings_annual_rate: f64, inflation_annual_rate: f64) -> f64 {
    (1.0 + savings_annual_rate / 100.0 / 12.0) / monthly_inflation_factor(inflation_annual_rate)
}

pub fn historical_scale_factor(initial_investment: f64, anchors: &[YearlyAnchor]) -> f64 {
    match anchors.first() {
        Some(reference) if reference.value != 0.0 => initial_investment / reference.value,
        _ => 0.0,
    }
}

fn historical_balance(anchors: &[YearlyAnchor], year: u32, scale: f64) -> f64 {
    anchors
        .get(year as usize)
        .or_else(|| anchors.last())
        .map_or(0.0, |anchor| anchor.value * scale + anchor.cumulative_investment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::history::{QuoteArchive, SECONDS_PER_YEAR};
    use proptest::prelude::{any, prop_assert, prop_assert_eq, proptest};
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    const EPS: f64 = 1e-9;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn assert_approx_tol(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}, tolerance {tol}"
        );
    }

    fn sample_params() -> SimulationParameters {
        SimulationParameters {
            initial_investment: 10_000.0,
            investment_years: 5,
            savings_annual_rate: 5.0,
            stock_market_annual_rate: 10.0,
            inflation_annual_rate: 2.0,
            market_model: MarketModel::Volatility(1.0),
            monthly_contribution: 100.0,
        }
    }

    // `prices` oldest first, one sample every 365 days
    fn yearly_series(prices: &[f64]) -> HistoricalReturnSeries {
        let start = 946_684_800;
        let archive = QuoteArchive {
            timestamps: (0..prices.len())
                .rev()
                .map(|i| start + i as i64 * SECONDS_PER_YEAR)
                .collect(),
            closing_prices: prices.iter().rev().copied().map(Some).collect(),
        };
        HistoricalReturnSeries::load(archive).expect("valid archive")
    }

    fn flat_series() -> HistoricalReturnSeries {
        yearly_series(&[100.0; 40])
    }

    fn closed_form(initial: f64, contribution: f64, growth: f64, months: u32) -> f64 {
        let n = months as i32;
        let compounded = initial * growth.powi(n);
        if (growth - 1.0).abs() < 1e-15 {
            return compounded + contribution * months as f64;
        }
        compounded + contribution * growth * (growth.powi(n) - 1.0) / (growth - 1.0)
    }

    #[test]
    fn zero_horizon_produces_only_the_starting_snapshot() {
        let mut params = sample_params();
        params.investment_years = 0;
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let result = run_projection_with_rng(&params, &flat_series(), &mut rng);
        assert_eq!(result.yearly_data.len(), 1);
        let start = result.yearly_data[0];
        assert_eq!(start.year, 0);
        assert_approx(start.savings_account_balance, 10_000.0);
        assert_approx(start.equity_balance_stochastic, 10_000.0);
        assert_approx(start.equity_balance_historical, 10_000.0);
        assert_approx(result.summary.total_contributed, 10_000.0);
        assert_approx(result.summary.final_historical_equity_value, 10_000.0);
    }

    #[test]
    fn oracle_savings_path_matches_closed_form() {
        // 10k, 5y, 5% savings, 2% inflation, 100/month
        let params = sample_params();
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let result = run_projection_with_rng(&params, &flat_series(), &mut rng);

        let growth = (1.0 + 5.0 / 1200.0) / 1.02_f64.powf(1.0 / 12.0);
        for snapshot in &result.yearly_data[1..] {
            let expected = closed_form(10_000.0, 100.0, growth, snapshot.year * 12);
            assert_approx_tol(snapshot.savings_account_balance, expected, 1.0);
        }
        let final_expected = closed_form(10_000.0, 100.0, growth, 60);
        assert_approx_tol(result.summary.final_savings_value, final_expected, 1.0);
    }

    #[test]
    fn zero_volatility_equity_is_plain_compounding() {
        let mut params = sample_params();
        params.market_model = MarketModel::Volatility(0.0);
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let result = run_projection_with_rng(&params, &flat_series(), &mut rng);

        let growth = (1.0 + 10.0 / 1200.0) / 1.02_f64.powf(1.0 / 12.0);
        let expected = closed_form(10_000.0, 100.0, growth, 60);
        assert_approx_tol(result.summary.final_stochastic_equity_value, expected, 1.0);
    }

    #[test]
    fn savings_path_does_not_depend_on_randomness() {
        let mut params = sample_params();
        params.market_model = MarketModel::Sentiment(35.0);
        params.investment_years = 12;

        let mut rng_a = ChaCha8Rng::seed_from_u64(1);
        let mut rng_b = ChaCha8Rng::seed_from_u64(2);
        let a = run_projection_with_rng(&params, &flat_series(), &mut rng_a);
        let b = run_projection_with_rng(&params, &flat_series(), &mut rng_b);

        assert_eq!(a.yearly_data.len(), b.yearly_data.len());
        for (left, right) in a.yearly_data.iter().zip(&b.yearly_data) {
            assert_eq!(left.year, right.year);
            assert_approx(left.savings_account_balance, right.savings_account_balance);
            assert_approx(left.equity_balance_historical, right.equity_balance_historical);
        }
    }

    #[test]
    fn fixed_seed_reruns_are_identical() {
        let mut params = sample_params();
        params.market_model = MarketModel::Sentiment(60.0);
        params.investment_years = 20;

        let mut rng_a = ChaCha8Rng::seed_from_u64(77);
        let mut rng_b = ChaCha8Rng::seed_from_u64(77);
        let a = run_projection_with_rng(&params, &flat_series(), &mut rng_a);
        let b = run_projection_with_rng(&params, &flat_series(), &mut rng_b);
        for (left, right) in a.yearly_data.iter().zip(&b.yearly_data) {
            assert_approx(left.equity_balance_stochastic, right.equity_balance_stochastic);
        }
    }

    #[test]
    fn oracle_sentiment_equity_path_replays_every_draw() {
        let mut params = sample_params();
        params.market_model = MarketModel::Sentiment(40.0);
        params.investment_years = 3;

        let mut rng = ChaCha8Rng::seed_from_u64(21);
        let result = run_projection_with_rng(&params, &flat_series(), &mut rng);

        // Same stream, same draw order: jitter, shocks, noise, sharp move.
        let conditions = build_conditions(params.market_model);
        let deflator = monthly_inflation_factor(params.inflation_annual_rate);
        let base_rate = params.stock_market_annual_rate / 100.0 / 12.0;
        let mut oracle = ChaCha8Rng::seed_from_u64(21);
        let mut equity = 10_000.0;
        let mut expected = vec![10_000.0];
        for month in 0..36 {
            equity += 100.0;
            let mut rate = base_rate * oracle.random_range(0.9..1.1);
            rate *= conditions.monthly_multiplier(month, &mut oracle);
            rate += oracle.random_range(-0.025..0.025);
            if oracle.random_bool(0.15) {
                rate *= oracle.random_range(0.85..1.15);
            }
            equity *= (1.0 + rate) / deflator;
            if month % 12 == 11 {
                expected.push(equity.round());
            }
        }

        let actual: Vec<f64> = result
            .yearly_data
            .iter()
            .map(|s| s.equity_balance_stochastic)
            .collect();
        assert_eq!(actual, expected);
    }

    #[test]
    fn sentiment_noise_moves_equity_even_at_zero_growth() {
        let mut params = sample_params();
        params.stock_market_annual_rate = 0.0;
        params.monthly_contribution = 0.0;
        params.investment_years = 5;
        let deflated: Vec<f64> = (0..=5)
            .map(|year| (10_000.0 / 1.02_f64.powi(year)).round())
            .collect();

        params.market_model = MarketModel::Volatility(0.0);
        let mut rng = ChaCha8Rng::seed_from_u64(13);
        let flat = run_projection_with_rng(&params, &flat_series(), &mut rng);
        for (snapshot, expected) in flat.yearly_data[1..].iter().zip(&deflated[1..]) {
            assert_approx_tol(snapshot.equity_balance_stochastic, *expected, 1.0);
        }

        params.market_model = MarketModel::Sentiment(50.0);
        let mut rng = ChaCha8Rng::seed_from_u64(13);
        let noisy = run_projection_with_rng(&params, &flat_series(), &mut rng);
        let moved = noisy.yearly_data[1..]
            .iter()
            .zip(&deflated[1..])
            .any(|(snapshot, expected)| (snapshot.equity_balance_stochastic - expected).abs() > 1.0);
        assert!(moved, "sentiment mode should add noise to a zero rate");
    }

    #[test]
    fn historical_replay_scales_anchor_prices_to_initial_investment() {
        let series = yearly_series(&[50.0, 80.0, 100.0, 90.0, 120.0, 150.0, 200.0]);
        let mut params = sample_params();
        params.investment_years = 3;
        params.initial_investment = 1_000.0;
        params.monthly_contribution = 10.0;

        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let result = run_projection_with_rng(&params, &series, &mut rng);

        // Anchors for 3 years: 90, 120, 150, 200; scale = 1000 / 90
        let scale = 1_000.0 / 90.0;
        let expected = [
            1_000.0,
            (120.0 * scale + 120.0_f64).round(),
            (150.0 * scale + 240.0_f64).round(),
            (200.0 * scale + 360.0_f64).round(),
        ];
        assert_eq!(result.yearly_data.len(), 4);
        for (snapshot, expected) in result.yearly_data.iter().zip(expected) {
            assert_approx(snapshot.equity_balance_historical, expected);
        }
        assert_approx(result.summary.final_historical_equity_value, expected[3]);
    }

    #[test]
    fn short_archive_saturates_instead_of_failing() {
        let series = yearly_series(&[100.0, 150.0]);
        let mut params = sample_params();
        params.investment_years = 10;
        params.monthly_contribution = 0.0;

        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let result = run_projection_with_rng(&params, &series, &mut rng);

        assert_eq!(result.yearly_data.len(), 11);
        for snapshot in &result.yearly_data[..10] {
            assert_approx(snapshot.equity_balance_historical, 10_000.0);
        }
        assert_approx(result.yearly_data[10].equity_balance_historical, 15_000.0);
    }

    #[test]
    fn zero_reference_price_and_zero_investment_are_guarded() {
        let series = yearly_series(&[0.0, 10.0, 20.0]);
        let mut params = sample_params();
        params.investment_years = 2;
        params.monthly_contribution = 0.0;
        let mut rng = ChaCha8Rng::seed_from_u64(8);

        let result = run_projection_with_rng(&params, &series, &mut rng);
        // anchors 0, 10, 20: the reference price is zero so only contributions count
        assert_approx(historical_scale_factor(10_000.0, &series.anchors_for_horizon(2, 0.0)), 0.0);
        assert!(result.yearly_data.iter().all(|s| s.equity_balance_historical.is_finite()));

        params.initial_investment = 0.0;
        params.investment_years = 0;
        let result = run_projection_with_rng(&params, &flat_series(), &mut rng);
        assert_approx(result.summary.total_contributed, 0.0);
    }

    #[test]
    fn inflation_and_savings_factors_follow_their_formulas() {
        assert!(monthly_inflation_factor(2.0) > 1.0);
        assert_approx(monthly_inflation_factor(0.0), 1.0);
        assert!(monthly_inflation_factor(-1.0) < 1.0);

        let expected = (1.0 + 4.0 / 1200.0) / monthly_inflation_factor(3.0);
        assert_eq!(savings_growth_factor(4.0, 3.0), expected);
    }

    #[test]
    fn run_projection_uses_fresh_randomness_but_same_shape() {
        let mut params = sample_params();
        params.market_model = MarketModel::Sentiment(50.0);
        let series = flat_series();

        let a = run_projection(&params, &series);
        let b = run_projection(&params, &series);
        assert_eq!(a.yearly_data.len(), 6);
        assert_eq!(b.yearly_data.len(), 6);
        assert_approx(a.summary.final_savings_value, b.summary.final_savings_value);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(32))]

        #[test]
        fn prop_projection_is_well_formed(
            seed in any::<u64>(),
            years in 0u32..40,
            initial in 0u32..500_000,
            contribution in 0u32..5_000,
            savings_bp in 0u32..1_000,
            stock_bp in -500i32..2_500,
            inflation_bp in 0u32..1_000,
            sentiment in 0u32..=100,
            volatility_tenths in 0u32..50,
            use_sentiment in any::<bool>()
        ) {
            let params = SimulationParameters {
                initial_investment: initial as f64,
                investment_years: years,
                savings_annual_rate: savings_bp as f64 / 100.0,
                stock_market_annual_rate: stock_bp as f64 / 100.0,
                inflation_annual_rate: inflation_bp as f64 / 100.0,
                market_model: if use_sentiment {
                    MarketModel::Sentiment(sentiment as f64)
                } else {
                    MarketModel::Volatility(volatility_tenths as f64 / 10.0)
                },
                monthly_contribution: contribution as f64,
            };
            let series = HistoricalReturnSeries::bundled().expect("bundled archive");
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let result = run_projection_with_rng(&params, &series, &mut rng);

            prop_assert_eq!(result.yearly_data.len(), years as usize + 1);
            for (index, snapshot) in result.yearly_data.iter().enumerate() {
                prop_assert_eq!(snapshot.year, index as u32);
                prop_assert!(snapshot.savings_account_balance.is_finite());
                prop_assert!(snapshot.equity_balance_stochastic.is_finite());
                prop_assert!(snapshot.equity_balance_historical.is_finite());
            }
            prop_assert!(result.yearly_data[0].equity_balance_historical == initial as f64);
            prop_assert!(
                result.summary.total_contributed
                    == initial as f64 + contribution as f64 * 12.0 * years as f64
            );
        }
    }
}
