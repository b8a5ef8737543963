use crate::data::PriceSeries;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Placeholder shown for any metric that could not be computed.
pub const NOT_AVAILABLE: &str = "N/A";

// ──────────────────────────────────────────────────────────────────────────────
// Chart scaling
// ──────────────────────────────────────────────────────────────────────────────

/// Multiplier applied to every close of a holding with allocation `percent`.
pub fn scale_factor(percent: f64) -> f64 {
    1.0 + percent / 100.0
}

/// `close * (1 + percent / 100)` for every point.
///
/// This is a flat vertical scale of the raw price curve. It does not use the
/// starting amount and is not a portfolio value.
pub fn scale_series(series: &PriceSeries, percent: f64) -> Vec<(DateTime<Utc>, f64)> {
    let factor = scale_factor(percent);
    series.points.iter().map(|p| (p.date, p.close * factor)).collect()
}

/// `((last / first) - 1) * 100` over a scaled series.
pub fn percent_change(scaled: &[(DateTime<Utc>, f64)]) -> Option<f64> {
    let (_, first) = scaled.first()?;
    let (_, last) = scaled.last()?;
    if *first == 0.0 {
        return None;
    }
    let change = (last / first - 1.0) * 100.0;
    change.is_finite().then_some(change)
}

// ──────────────────────────────────────────────────────────────────────────────
// Point-in-time metrics
// ──────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum MetricsUnavailable {
    #[error("no price data for the selected dates")]
    EmptySeries,
    #[error("start price is zero")]
    ZeroStartPrice,
    #[error("price data is not a finite number")]
    NonFinite,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HoldingMetrics {
    pub allocated_amount: f64,
    pub start_price: f64,
    pub current_price: f64,
    pub shares_owned: f64,
    pub monetary_return: f64,
    pub percent_gain_loss: f64,
}

impl HoldingMetrics {
    /// Metrics for `percent` of `starting_amount` invested at the first close
    /// of `series` and valued at its last close.
    pub fn compute(
        series: &PriceSeries,
        percent: f64,
        starting_amount: f64,
    ) -> Result<Self, MetricsUnavailable> {
        let (Some(first), Some(last)) = (series.first(), series.last()) else {
            return Err(MetricsUnavailable::EmptySeries);
        };
        let start_price = first.close;
        let current_price = last.close;

        if start_price == 0.0 {
            return Err(MetricsUnavailable::ZeroStartPrice);
        }

        let allocated_amount = starting_amount * (percent / 100.0);
        let shares_owned = allocated_amount / start_price;
        let monetary_return = shares_owned * current_price - allocated_amount;
        let percent_gain_loss = (current_price / start_price - 1.0) * 100.0;

        let metrics = Self {
            allocated_amount,
            start_price,
            current_price,
            shares_owned,
            monetary_return,
            percent_gain_loss,
        };
        if metrics.all_finite() {
            Ok(metrics)
        } else {
            Err(MetricsUnavailable::NonFinite)
        }
    }

    fn all_finite(&self) -> bool {
        [
            self.allocated_amount,
            self.start_price,
            self.current_price,
            self.shares_owned,
            self.monetary_return,
            self.percent_gain_loss,
        ]
        .iter()
        .all(|v| v.is_finite())
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// Display
// ──────────────────────────────────────────────────────────────────────────────

pub fn format_price(value: f64) -> String {
    format!("${:.2}", value)
}

pub fn format_shares(value: f64) -> String {
    format!("{:.2}", value)
}

/// `+$100.00` for gains, `$-5.00` for losses.
pub fn format_return(value: f64) -> String {
    let sign = if value >= 0.0 { "+" } else { "" };
    format!("{}${:.2}", sign, value)
}

/// `+50.00%` / `-3.10%`.
pub fn format_gain_loss(value: f64) -> String {
    let sign = if value >= 0.0 { "+" } else { "" };
    format!("{}{:.2}%", sign, value)
}

/// Text for the five read-only fields of a details row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetricsText {
    pub start_price: String,
    pub current_price: String,
    pub shares_owned: String,
    pub monetary_return: String,
    pub percent_gain_loss: String,
}

impl MetricsText {
    pub fn not_available() -> Self {
        Self {
            start_price: NOT_AVAILABLE.to_string(),
            current_price: NOT_AVAILABLE.to_string(),
            shares_owned: NOT_AVAILABLE.to_string(),
            monetary_return: NOT_AVAILABLE.to_string(),
            percent_gain_loss: NOT_AVAILABLE.to_string(),
        }
    }
}

impl From<&HoldingMetrics> for MetricsText {
    fn from(m: &HoldingMetrics) -> Self {
        Self {
            start_price: format_price(m.start_price),
            current_price: format_price(m.current_price),
            shares_owned: format_shares(m.shares_owned),
            monetary_return: format_return(m.monetary_return),
            percent_gain_loss: format_gain_loss(m.percent_gain_loss),
        }
    }
}
