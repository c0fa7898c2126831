use rand::Rng;

use super::types::{
    ConditionMode, ConditionTag, MarketConditionEvent, MarketConditionSet, MarketModel, Severity,
};

pub fn build_conditions(model: MarketModel) -> MarketConditionSet {
    match model {
        MarketModel::Volatility(factor) => volatility_conditions(factor),
        MarketModel::Sentiment(sentiment) => sentiment_conditions(sentiment),
    }
}

fn volatility_conditions(factor: f64) -> MarketConditionSet {
    let factor = factor.max(0.0);
    let event = |tag, base_probability: f64, factor_value, duration_months| MarketConditionEvent {
        tag,
        probability: (base_probability * factor).clamp(0.0, 1.0),
        severity: Severity::Fixed {
            factor: factor_value,
        },
        duration_months,
    };

    MarketConditionSet {
        mode: ConditionMode::DutyCycle,
        events: vec![
            event(ConditionTag::TenPercent, 0.30, 0.9, 4),
            event(ConditionTag::ThirtyPercent, 0.05, 0.7, 12),
            event(ConditionTag::BlackSwan, 0.01, 0.5, 24),
        ],
    }
}

fn sentiment_conditions(sentiment: f64) -> MarketConditionSet {
    let bullish = (sentiment / 100.0).clamp(0.0, 1.0);
    let bearish = 1.0 - bullish;

    let dip = |tag, probability: f64, depth: f64, duration_months| MarketConditionEvent {
        tag,
        probability: probability * bearish,
        severity: Severity::Fixed {
            factor: 1.0 - depth * bearish,
        },
        duration_months,
    };
    let rally = |tag, probability: f64, lift: f64, duration_months| MarketConditionEvent {
        tag,
        probability: probability * bullish,
        severity: Severity::Fixed {
            factor: 1.0 + lift * bullish,
        },
        duration_months,
    };

    MarketConditionSet {
        mode: ConditionMode::Independent,
        events: vec![
            MarketConditionEvent {
                tag: ConditionTag::DailyFluctuation,
                probability: 1.0,
                severity: Severity::Jittered {
                    base: 0.95,
                    spread: 0.10,
                },
                duration_months: 1,
            },
            dip(ConditionTag::SmallDip, 0.70, 0.20, 1),
            dip(ConditionTag::Correction, 0.20, 0.40, 3),
            dip(ConditionTag::Crash, 0.05, 0.60, 6),
            rally(ConditionTag::SmallRally, 0.70, 0.20, 1),
            rally(ConditionTag::StrongRally, 0.20, 0.40, 3),
            rally(ConditionTag::BullRun, 0.05, 0.60, 6),
        ],
    }
}

/// True while `month` sits in the first `duration` months of each
/// `2 * duration` cycle.
pub fn in_duty_window(month: u32, duration_months: u32) -> bool {
    if duration_months == 0 {
        return false;
    }
    month % (duration_months * 2) < duration_months
}

impl MarketConditionSet {
    pub fn monthly_multiplier<R: Rng + ?Sized>(&self, month: u32, rng: &mut R) -> f64 {
        let mut multiplier = 1.0;
        for event in &self.events {
            // Rolled every month, gate open or not.
            let rolled = rng.random::<f64>() < event.probability;
            let gated = match self.mode {
                ConditionMode::DutyCycle => in_duty_window(month, event.duration_months),
                ConditionMode::Independent => true,
            };
            if rolled && gated {
                multiplier *= sample_severity(event.severity, rng);
            }
        }
        multiplier
    }
}

fn sample_severity<R: Rng + ?Sized>(severity: Severity, rng: &mut R) -> f64 {
    match severity {
        Severity::Fixed { factor } => factor,
        Severity::Jittered { base, spread } => base + spread * rng.random::<f64>(),
    }
}
