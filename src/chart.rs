use crate::data::{self, MarketDataProvider, Timeframe};
use crate::error::ChartError;
use crate::performance;
use crate::portfolio::{self, Holding};
use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info, warn};

pub const CHART_TITLE: &str = "Portfolio Stocks Performance";
pub const X_AXIS_LABEL: &str = "Date";
pub const Y_AXIS_LABEL: &str = "Adjusted Close (based on % allocation)";
pub const START_MARKER_LABEL: &str = "Start Date";
pub const NO_VALID_DATA_WARNING: &str = "No valid data available for any stock.";

/// One plotted line.
#[derive(Clone, Debug, PartialEq)]
pub struct ChartLine {
    pub symbol: String,
    pub percent: f64,
    pub label: String,
    pub points: Vec<(DateTime<Utc>, f64)>,
    /// Change between first and last scaled value; logged, not drawn.
    pub percent_change: Option<f64>,
}

/// Everything the renderer needs for one redraw.
#[derive(Clone, Debug, PartialEq)]
pub struct ChartView {
    pub timeframe: Timeframe,
    pub lines: Vec<ChartLine>,
    pub start_marker: NaiveDate,
    /// Set when not a single holding produced data.
    pub no_valid_data: bool,
}

pub fn line_label(symbol: &str, percent: f64) -> String {
    let sign = if percent > 0.0 { "+" } else { "" };
    format!("{} ({}{}%)", symbol, sign, percent)
}

/// Fetches every plottable holding for `timeframe` and scales it.
///
/// An unparseable start date aborts before anything is fetched. Holdings with
/// a zero allocation are never plotted. Symbols that fail validation or
/// fetching are logged and skipped.
pub async fn build_chart(
    provider: &dyn MarketDataProvider,
    holdings: &[Holding],
    timeframe: Timeframe,
    start_date: &str,
) -> Result<ChartView, ChartError> {
    let start_marker =
        portfolio::parse_date(start_date).map_err(|_| ChartError::InvalidStartDate(start_date.to_string()))?;

    let mut lines = Vec::new();

    for holding in holdings {
        let symbol = holding.symbol.trim();

        if holding.percent <= 0.0 {
            debug!("Stock: {} - Not included (Percentage is 0)", symbol);
            continue;
        }

        if !data::is_valid_symbol(provider, symbol).await {
            continue;
        }

        let series = match provider.fetch_period(symbol, timeframe).await {
            Ok(series) => series,
            Err(e) => {
                warn!(
                    "An error occurred during data download for {}: {}. Skipping this stock.",
                    symbol, e
                );
                continue;
            }
        };

        if series.is_empty() {
            info!("No {} data for {}; not plotted", timeframe, symbol);
            continue;
        }

        let points = performance::scale_series(&series, holding.percent);
        let percent_change = performance::percent_change(&points);
        debug!(
            "Stock: {} points={} factor={} change={:?}",
            symbol,
            points.len(),
            performance::scale_factor(holding.percent),
            percent_change
        );

        lines.push(ChartLine {
            symbol: symbol.to_string(),
            percent: holding.percent,
            label: line_label(symbol, holding.percent),
            points,
            percent_change,
        });
    }

    let no_valid_data = lines.is_empty();
    if no_valid_data {
        warn!("No valid data available for any stock ({} holdings)", holdings.len());
    }

    Ok(ChartView {
        timeframe,
        lines,
        start_marker,
        no_valid_data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::testing::StaticProvider;
    use crate::error::FetchError;

    fn holding(symbol: &str, percent: f64) -> Holding {
        Holding {
            symbol: symbol.to_string(),
            percent,
        }
    }

    #[test]
    fn labels() {
        assert_eq!(line_label("AAPL", 20.0), "AAPL (+20%)");
        assert_eq!(line_label("AAPL", 12.5), "AAPL (+12.5%)");
    }

    #[tokio::test]
    async fn zero_allocation_is_never_plotted_or_fetched() {
        let provider = StaticProvider::new()
            .with_closes("AAPL", &[100.0, 110.0])
            .with_closes("MSFT", &[200.0, 210.0]);
        let holdings = [holding("AAPL", 0.0), holding("MSFT", 10.0)];

        let view = build_chart(&provider, &holdings, Timeframe::OneMonth, "2020-01-01")
            .await
            .unwrap();

        assert_eq!(view.lines.len(), 1);
        assert_eq!(view.lines[0].symbol, "MSFT");
        assert_eq!(provider.call_count("period:1d:AAPL"), 0);
        assert_eq!(provider.call_count("period:1mo:AAPL"), 0);
    }

    #[tokio::test]
    async fn scaled_points_follow_allocation() {
        let provider = StaticProvider::new().with_closes("AAPL", &[100.0, 150.0]);
        let view = build_chart(&provider, &[holding("AAPL", 20.0)], Timeframe::OneYear, "2020-01-01")
            .await
            .unwrap();

        let ys: Vec<f64> = view.lines[0].points.iter().map(|(_, y)| *y).collect();
        assert_eq!(ys, vec![100.0 * 1.2, 150.0 * 1.2]);
        assert_eq!(view.lines[0].label, "AAPL (+20%)");
        assert!((view.lines[0].percent_change.unwrap() - 50.0).abs() < 1e-9);
        assert_eq!(provider.call_count("period:1y:AAPL"), 1);
    }

    #[tokio::test]
    async fn invalid_symbol_is_skipped() {
        let provider = StaticProvider::new().with_closes("AAPL", &[100.0, 101.0]);
        let holdings = [holding("NOPE", 50.0), holding("AAPL", 20.0)];

        let view = build_chart(&provider, &holdings, Timeframe::OneMonth, "2020-01-01")
            .await
            .unwrap();

        assert_eq!(view.lines.len(), 1);
        assert_eq!(view.lines[0].symbol, "AAPL");
        assert!(!view.no_valid_data);
        // Failed validation means no period fetch.
        assert_eq!(provider.call_count("period:1mo:NOPE"), 0);
    }

    #[tokio::test]
    async fn all_empty_sets_single_flag() {
        let provider = StaticProvider::new()
            .with_closes("AAPL", &[])
            .with_closes("MSFT", &[])
            .with_error("TSLA", FetchError::Network("timeout".into()));
        let holdings = [holding("AAPL", 10.0), holding("MSFT", 10.0), holding("TSLA", 10.0)];

        let view = build_chart(&provider, &holdings, Timeframe::FiveDays, "2020-01-01")
            .await
            .unwrap();

        assert!(view.lines.is_empty());
        assert!(view.no_valid_data);
    }

    #[tokio::test]
    async fn empty_portfolio_has_no_valid_data() {
        let provider = StaticProvider::new();
        let view = build_chart(&provider, &[], Timeframe::OneMonth, "2021-06-30").await.unwrap();
        assert!(view.no_valid_data);
        assert_eq!(view.start_marker, NaiveDate::from_ymd_opt(2021, 6, 30).unwrap());
    }

    #[tokio::test]
    async fn bad_start_date_aborts_before_fetching() {
        let provider = StaticProvider::new().with_closes("AAPL", &[1.0]);
        let result = build_chart(&provider, &[holding("AAPL", 20.0)], Timeframe::OneMonth, "01/01/2020").await;

        assert_eq!(result, Err(ChartError::InvalidStartDate("01/01/2020".into())));
        assert_eq!(provider.call_count(""), 0);
    }
}
