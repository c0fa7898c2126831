use axum::{
    Router,
    extract::{Json, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use clap::Parser;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::core::{
    ArchiveError, HistoricalReturnSeries, MarketConditionSet, MarketModel, PeriodReturn,
    SimulationParameters, SimulationResult, SummaryBreakdown, build_conditions, run_projection,
    run_projection_with_rng,
};
use crate::session::{DEFAULT_QUIET_WINDOW, Debouncer, SessionOutcome};

const MAX_INVESTMENT_YEARS: u32 = 100;
const DEFAULT_VOLATILITY_FACTOR: f64 = 1.0;

#[derive(Debug, thiserror::Error)]
pub enum ParameterError {
    #[error("--{flag} {requirement}")]
    OutOfRange {
        flag: &'static str,
        requirement: &'static str,
    },

    #[error("--market-sentiment and --volatility-factor cannot both be set")]
    ConflictingMarketModel,
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Parameters(#[from] ParameterError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("HTTP server on {addr} stopped: {source}")]
    Serve {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("failed to encode result: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "nestegg",
    about = "Savings account vs. stock index projection with a historical replay"
)]
struct Cli {
    #[arg(long, default_value_t = 10_000.0, help = "Starting capital")]
    initial_investment: f64,
    #[arg(long, default_value_t = 5, help = "Projection horizon in whole years")]
    investment_years: u32,
    #[arg(long, default_value_t = 5.0, help = "Savings account annual rate in percent")]
    savings_rate: f64,
    #[arg(
        long,
        default_value_t = 10.0,
        help = "Expected stock market annual growth in percent"
    )]
    stock_market_rate: f64,
    #[arg(long, default_value_t = 2.0, help = "Annual inflation in percent")]
    inflation_rate: f64,
    #[arg(
        long,
        conflicts_with = "volatility_factor",
        help = "Market sentiment 0-100; selects the sentiment shock model"
    )]
    market_sentiment: Option<f64>,
    #[arg(
        long,
        help = "Loss probability multiplier; selects the duty-cycle shock model (default 1.0)"
    )]
    volatility_factor: Option<f64>,
    #[arg(long, default_value_t = 100.0, help = "Amount added every month")]
    monthly_contribution: f64,
    #[arg(long, help = "Chart-format JSON quotes archive; defaults to the bundled index")]
    archive: Option<PathBuf>,
    #[arg(long, help = "Seed for a reproducible run")]
    seed: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SimulatePayload {
    initial_investment: Option<f64>,
    investment_years: Option<u32>,
    savings_rate: Option<f64>,
    stock_market_rate: Option<f64>,
    inflation_rate: Option<f64>,
    #[serde(alias = "marketStatus")]
    market_sentiment: Option<f64>,
    volatility_factor: Option<f64>,
    #[serde(alias = "monthlyTopUp")]
    monthly_contribution: Option<f64>,
    seed: Option<u64>,
}

#[derive(Debug)]
struct ApiRequest {
    parameters: SimulationParameters,
    seed: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ConditionsQuery {
    #[serde(alias = "marketStatus")]
    market_sentiment: Option<f64>,
    volatility_factor: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ReturnsQuery {
    years: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulateResponse<'a> {
    parameters: &'a SimulationParameters,
    #[serde(flatten)]
    result: &'a SimulationResult,
    breakdown: SummaryBreakdown,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse<'a> {
    #[serde(flatten)]
    outcome: &'a SessionOutcome,
    breakdown: SummaryBreakdown,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AcceptedResponse {
    generation: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReturnsResponse {
    years: u32,
    returns: Vec<PeriodReturn>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn resolve_market_model(
    market_sentiment: Option<f64>,
    volatility_factor: Option<f64>,
) -> Result<MarketModel, ParameterError> {
    match (market_sentiment, volatility_factor) {
        (Some(_), Some(_)) => Err(ParameterError::ConflictingMarketModel),
        (Some(sentiment), None) => {
            if !(0.0..=100.0).contains(&sentiment) {
                return Err(ParameterError::OutOfRange {
                    flag: "market-sentiment",
                    requirement: "must be between 0 and 100",
                });
            }
            Ok(MarketModel::Sentiment(sentiment))
        }
        (None, Some(factor)) => {
            if !factor.is_finite() || factor < 0.0 {
                return Err(ParameterError::OutOfRange {
                    flag: "volatility-factor",
                    requirement: "must be >= 0",
                });
            }
            Ok(MarketModel::Volatility(factor))
        }
        (None, None) => Ok(MarketModel::Volatility(DEFAULT_VOLATILITY_FACTOR)),
    }
}

fn build_parameters(cli: &Cli) -> Result<SimulationParameters, ParameterError> {
    if !cli.initial_investment.is_finite() || cli.initial_investment < 0.0 {
        return Err(ParameterError::OutOfRange {
            flag: "initial-investment",
            requirement: "must be >= 0",
        });
    }

    if cli.investment_years > MAX_INVESTMENT_YEARS {
        return Err(ParameterError::OutOfRange {
            flag: "investment-years",
            requirement: "must be <= 100",
        });
    }

    if !cli.monthly_contribution.is_finite() || cli.monthly_contribution < 0.0 {
        return Err(ParameterError::OutOfRange {
            flag: "monthly-contribution",
            requirement: "must be >= 0",
        });
    }

    for (flag, rate) in [
        ("savings-rate", cli.savings_rate),
        ("stock-market-rate", cli.stock_market_rate),
        ("inflation-rate", cli.inflation_rate),
    ] {
        if !rate.is_finite() || rate <= -100.0 {
            return Err(ParameterError::OutOfRange {
                flag,
                requirement: "must be a rate above -100 percent",
            });
        }
    }

    Ok(SimulationParameters {
        initial_investment: cli.initial_investment,
        investment_years: cli.investment_years,
        savings_annual_rate: cli.savings_rate,
        stock_market_annual_rate: cli.stock_market_rate,
        inflation_annual_rate: cli.inflation_rate,
        market_model: resolve_market_model(cli.market_sentiment, cli.volatility_factor)?,
        monthly_contribution: cli.monthly_contribution,
    })
}

fn default_cli_for_api() -> Cli {
    Cli {
        initial_investment: 10_000.0,
        investment_years: 5,
        savings_rate: 5.0,
        stock_market_rate: 10.0,
        inflation_rate: 2.0,
        market_sentiment: None,
        volatility_factor: None,
        monthly_contribution: 100.0,
        archive: None,
        seed: None,
    }
}

#[cfg(test)]
fn api_request_from_json(json: &str) -> Result<ApiRequest, String> {
    let payload = serde_json::from_str::<SimulatePayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    api_request_from_payload(payload).map_err(|e| e.to_string())
}

fn api_request_from_payload(payload: SimulatePayload) -> Result<ApiRequest, ParameterError> {
    let mut cli = default_cli_for_api();

    if let Some(v) = payload.initial_investment {
        cli.initial_investment = v;
    }
    if let Some(v) = payload.investment_years {
        cli.investment_years = v;
    }
    if let Some(v) = payload.savings_rate {
        cli.savings_rate = v;
    }
    if let Some(v) = payload.stock_market_rate {
        cli.stock_market_rate = v;
    }
    if let Some(v) = payload.inflation_rate {
        cli.inflation_rate = v;
    }
    if let Some(v) = payload.market_sentiment {
        cli.market_sentiment = Some(v);
    }
    if let Some(v) = payload.volatility_factor {
        cli.volatility_factor = Some(v);
    }
    if let Some(v) = payload.monthly_contribution {
        cli.monthly_contribution = v;
    }

    Ok(ApiRequest {
        parameters: build_parameters(&cli)?,
        seed: payload.seed,
    })
}

fn simulate(
    parameters: &SimulationParameters,
    history: &HistoricalReturnSeries,
    seed: Option<u64>,
) -> SimulationResult {
    match seed {
        Some(seed) => {
            let mut rng = StdRng::seed_from_u64(seed);
            run_projection_with_rng(parameters, history, &mut rng)
        }
        None => run_projection(parameters, history),
    }
}

fn build_simulate_response<'a>(
    parameters: &'a SimulationParameters,
    result: &'a SimulationResult,
) -> SimulateResponse<'a> {
    SimulateResponse {
        parameters,
        result,
        breakdown: result.summary.breakdown(),
    }
}

pub fn load_history(path: Option<&Path>) -> Result<HistoricalReturnSeries, CliError> {
    let series = match path {
        Some(path) => {
            let json = std::fs::read_to_string(path).map_err(|source| CliError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            HistoricalReturnSeries::from_chart_json(&json)?
        }
        None => HistoricalReturnSeries::bundled()?,
    };
    info!(
        points = series.points().len(),
        source = %path.map_or_else(|| "bundled".to_string(), |p| p.display().to_string()),
        "historical archive loaded"
    );
    Ok(series)
}

pub fn run_cli<I, T>(args: I) -> Result<String, CliError>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    let parameters = build_parameters(&cli)?;
    let history = load_history(cli.archive.as_deref())?;
    let result = simulate(&parameters, &history, cli.seed);
    let response = build_simulate_response(&parameters, &result);
    Ok(serde_json::to_string_pretty(&response)?)
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub quiet_window: Duration,
    pub archive: Option<PathBuf>,
}

impl ServerConfig {
    pub const ARCHIVE_ENV: &'static str = "PROJECTION_ARCHIVE";
    pub const DEBOUNCE_ENV: &'static str = "PROJECTION_DEBOUNCE_MS";

    pub fn from_env(port: u16) -> Self {
        let quiet_window = std::env::var(Self::DEBOUNCE_ENV)
            .ok()
            .and_then(|raw| raw.parse::<u64>().ok())
            .map_or(DEFAULT_QUIET_WINDOW, |ms| {
                Duration::from_millis(ms.clamp(500, 1_000))
            });
        let archive = std::env::var_os(Self::ARCHIVE_ENV).map(PathBuf::from);

        Self {
            port,
            quiet_window,
            archive,
        }
    }
}

#[derive(Clone)]
struct AppState {
    history: Arc<HistoricalReturnSeries>,
    session: Arc<Debouncer>,
}

pub async fn run_http_server(config: ServerConfig) -> Result<(), CliError> {
    let history = Arc::new(load_history(config.archive.as_deref())?);
    let session = Arc::new(Debouncer::spawn(config.quiet_window, Arc::clone(&history)));
    let app = router(AppState { history, session });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = bind_listener(addr).await?;
    info!(
        %addr,
        quiet_window_ms = config.quiet_window.as_millis() as u64,
        "projection HTTP API listening"
    );

    axum::serve(listener, app)
        .await
        .map_err(|source| CliError::Serve { addr, source })
}

async fn bind_listener(addr: SocketAddr) -> Result<TcpListener, CliError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| CliError::Bind { addr, source })
}

fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/simulate",
            get(simulate_get_handler).post(simulate_post_handler),
        )
        .route("/api/parameters", post(parameters_handler))
        .route("/api/result", get(result_handler))
        .route("/api/returns", get(returns_handler))
        .route("/api/conditions", get(conditions_handler))
        .fallback(not_found_handler)
        .with_state(state)
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn simulate_get_handler(
    State(state): State<AppState>,
    Query(payload): Query<SimulatePayload>,
) -> Response {
    simulate_handler_impl(&state, payload)
}

async fn simulate_post_handler(
    State(state): State<AppState>,
    Json(payload): Json<SimulatePayload>,
) -> Response {
    simulate_handler_impl(&state, payload)
}

fn simulate_handler_impl(state: &AppState, payload: SimulatePayload) -> Response {
    let request = match api_request_from_payload(payload) {
        Ok(request) => request,
        Err(err) => return error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    };

    let result = simulate(&request.parameters, &state.history, request.seed);
    json_response(
        StatusCode::OK,
        build_simulate_response(&request.parameters, &result),
    )
}

async fn parameters_handler(
    State(state): State<AppState>,
    Json(payload): Json<SimulatePayload>,
) -> Response {
    let request = match api_request_from_payload(payload) {
        Ok(request) => request,
        Err(err) => return error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    };
    if request.seed.is_some() {
        warn!("seed is ignored for debounced parameter changes");
    }

    let generation = state.session.submit(request.parameters);
    json_response(StatusCode::ACCEPTED, AcceptedResponse { generation })
}

async fn result_handler(State(state): State<AppState>) -> Response {
    match state.session.latest() {
        Some(outcome) => json_response(
            StatusCode::OK,
            SessionResponse {
                breakdown: outcome.result.summary.breakdown(),
                outcome: &outcome,
            },
        ),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn returns_handler(
    State(state): State<AppState>,
    Query(query): Query<ReturnsQuery>,
) -> Response {
    let years = query.years.unwrap_or(default_cli_for_api().investment_years);
    json_response(
        StatusCode::OK,
        ReturnsResponse {
            years,
            returns: state.history.period_returns(years),
        },
    )
}

async fn conditions_handler(Query(query): Query<ConditionsQuery>) -> Response {
    match resolve_market_model(query.market_sentiment, query.volatility_factor) {
        Ok(model) => json_response(StatusCode::OK, conditions_for(model)),
        Err(err) => error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    }
}

fn conditions_for(model: MarketModel) -> MarketConditionSet {
    build_conditions(model)
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    (status, Json(body)).into_response()
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}
