use serde::Deserialize;
use tracing::debug;

use super::error::ArchiveError;
use super::types::{HistoricalPricePoint, PeriodReturn, YearlyAnchor};

const BUNDLED_ARCHIVE: &str = include_str!("../../data/ixic_history.json");

/// Anchor spacing is a flat 365 days, not a calendar year.
pub const SECONDS_PER_YEAR: i64 = 365 * 24 * 3600;

/// A pre-fetched quote series as parallel arrays, newest sample first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuoteArchive {
    pub timestamps: Vec<i64>,
    pub closing_prices: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct ChartDocument {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    #[serde(default)]
    result: Vec<ChartSeries>,
}

#[derive(Debug, Deserialize)]
struct ChartSeries {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

impl QuoteArchive {
    pub fn from_chart_json(json: &str) -> Result<Self, ArchiveError> {
        let document: ChartDocument = serde_json::from_str(json)?;
        let series = document
            .chart
            .result
            .into_iter()
            .next()
            .ok_or(ArchiveError::MissingSeries)?;
        let quote = series
            .indicators
            .quote
            .into_iter()
            .next()
            .ok_or(ArchiveError::MissingSeries)?;

        Ok(Self {
            timestamps: series.timestamp,
            closing_prices: quote.close,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalReturnSeries {
    points: Vec<HistoricalPricePoint>,
}

impl HistoricalReturnSeries {
    pub fn load(archive: QuoteArchive) -> Result<Self, ArchiveError> {
        let QuoteArchive {
            timestamps,
            closing_prices,
        } = archive;

        if timestamps.len() != closing_prices.len() {
            return Err(ArchiveError::LengthMismatch {
                timestamps: timestamps.len(),
                prices: closing_prices.len(),
            });
        }

        // Reverse both arrays together; gaps (null or non-finite closes) drop
        // their timestamp too.
        let points: Vec<HistoricalPricePoint> = timestamps
            .into_iter()
            .zip(closing_prices)
            .rev()
            .filter_map(|(timestamp, close)| match close {
                Some(close) if close.is_finite() => Some(HistoricalPricePoint { timestamp, close }),
                _ => None,
            })
            .collect();

        if points.is_empty() {
            return Err(ArchiveError::Empty);
        }

        if let Some(pair) = points.windows(2).find(|w| w[1].timestamp < w[0].timestamp) {
            return Err(ArchiveError::OutOfOrder {
                timestamp: pair[1].timestamp,
            });
        }

        debug!(
            points = points.len(),
            oldest = points[0].timestamp,
            latest = points[points.len() - 1].timestamp,
            "loaded historical quote series"
        );

        Ok(Self { points })
    }

    pub fn from_chart_json(json: &str) -> Result<Self, ArchiveError> {
        Self::load(QuoteArchive::from_chart_json(json)?)
    }

    pub fn bundled() -> Result<Self, ArchiveError> {
        Self::from_chart_json(BUNDLED_ARCHIVE)
    }

    pub fn points(&self) -> &[HistoricalPricePoint] {
        &self.points
    }

    pub fn latest(&self) -> Option<&HistoricalPricePoint> {
        self.points.last()
    }

    /// Yearly reference prices for a horizon, ascending by year. Anchor `k`
    /// is the last sample at or before `latest - (years - k) * 365d`, so
    /// anchor 0 is the oldest price and the scale reference for the replay.
    /// Horizons longer than the archive saturate at the oldest sample.
    pub fn anchors_for_horizon(&self, years: u32, monthly_contribution: f64) -> Vec<YearlyAnchor> {
        let Some(latest) = self.points.last() else {
            return Vec::new();
        };

        // Targets are visited newest first so the cursor only moves backward.
        let mut cursor = self.points.len() - 1;
        let mut selected = Vec::with_capacity(years as usize + 1);
        for offset in 0..=years {
            let target = latest.timestamp - i64::from(offset) * SECONDS_PER_YEAR;
            while cursor > 0 && self.points[cursor].timestamp > target {
                cursor -= 1;
            }
            selected.push(self.points[cursor]);
        }
        selected.reverse();

        selected
            .into_iter()
            .enumerate()
            .map(|(year, point)| YearlyAnchor {
                year: year as u32,
                timestamp: point.timestamp,
                value: point.close,
                cumulative_investment: monthly_contribution * 12.0 * year as f64,
            })
            .collect()
    }

    /// Changes between consecutive samples, at the archive's own spacing.
    pub fn period_returns(&self, years: u32) -> Vec<PeriodReturn> {
        let Some(latest) = self.points.last() else {
            return Vec::new();
        };
        let cutoff = latest.timestamp - i64::from(years) * SECONDS_PER_YEAR;

        let mut returns = Vec::new();
        let mut previous: Option<f64> = None;
        for point in &self.points {
            let change = match previous {
                Some(prev) if prev != 0.0 => (point.close - prev) / prev,
                _ => 0.0,
            };
            previous = Some(point.close);
            if point.timestamp >= cutoff {
                returns.push(PeriodReturn {
                    timestamp: point.timestamp,
                    change,
                });
            }
        }
        returns
    }
}
