use crate::data::MarketDataProvider;
use crate::error::DetailsError;
use crate::performance::{HoldingMetrics, MetricsText, MetricsUnavailable};
use crate::portfolio::{DateRange, Holding};
use chrono::NaiveDate;
use tracing::{info, warn};

/// One row of the details panel.
#[derive(Clone, Debug, PartialEq)]
pub struct DetailRow {
    pub symbol: String,
    pub percent: f64,
    /// `Err` when the row could not be fetched at all; `Ok(Err(_))` when the
    /// data came back but metrics are not available.
    pub outcome: Result<Result<HoldingMetrics, MetricsUnavailable>, DetailsError>,
}

impl DetailRow {
    pub fn text(&self) -> MetricsText {
        match &self.outcome {
            Ok(Ok(metrics)) => MetricsText::from(metrics),
            _ => MetricsText::not_available(),
        }
    }

    pub fn error(&self) -> Option<&DetailsError> {
        self.outcome.as_ref().err()
    }
}

/// User-facing message for a failed row.
pub fn error_message(symbol: &str, err: &DetailsError) -> String {
    format!("An error occurred while fetching data for {}: {}", symbol, err)
}

/// Fetches `[start, end)` for every holding and computes its metrics.
///
/// A failure for one symbol is captured in its row; the other rows are still
/// computed.
pub async fn compute_details(
    provider: &dyn MarketDataProvider,
    holdings: &[Holding],
    start_date: &str,
    end_date: &str,
    starting_amount: f64,
    today: NaiveDate,
) -> Vec<DetailRow> {
    let range = DateRange::parse(start_date, end_date).and_then(|r| r.resolve(today));
    let mut rows = Vec::with_capacity(holdings.len());

    for holding in holdings {
        let outcome = match &range {
            Ok((start, end)) => provider
                .fetch_range(&holding.symbol, *start, *end)
                .await
                .map(|series| HoldingMetrics::compute(&series, holding.percent, starting_amount))
                .map_err(DetailsError::from),
            Err(e) => Err(DetailsError::from(e.clone())),
        };

        match &outcome {
            Ok(Ok(m)) => info!(
                "{}: start={:.2} current={:.2} shares={:.4} return={:.2} gain={:.2}%",
                holding.symbol, m.start_price, m.current_price, m.shares_owned, m.monetary_return, m.percent_gain_loss
            ),
            Ok(Err(reason)) => info!("{}: metrics not available ({})", holding.symbol, reason),
            Err(e) => warn!("Details fetch failed for {}: {}", holding.symbol, e),
        }

        rows.push(DetailRow {
            symbol: holding.symbol.clone(),
            percent: holding.percent,
            outcome,
        });
    }

    rows
}
