use crate::app::Session;
use crate::chart::{self, ChartView};
use crate::data::MarketDataProvider;
use crate::details::{self, DetailRow};
use crate::performance::NOT_AVAILABLE;
use anyhow::Result;
use chrono::NaiveDate;
use std::fmt::Write as _;
use tracing::info;

/// Runs the details and chart pipelines once and renders them as text.
pub async fn run_report(provider: &dyn MarketDataProvider, session: &Session, today: NaiveDate) -> Result<String> {
    info!(
        "Report for {} holding(s), {} .. {}, amount {}",
        session.portfolio.len(),
        session.start_date,
        session.end_date,
        session.starting_amount
    );

    let holdings = session.portfolio.holdings();
    let rows = details::compute_details(
        provider,
        holdings,
        &session.start_date,
        &session.end_date,
        session.starting_amount,
        today,
    )
    .await;
    let chart = chart::build_chart(provider, holdings, session.timeframe, &session.start_date).await;

    let mut out = render_details(session, &rows)?;
    out.push('\n');
    match chart {
        Ok(view) => out.push_str(&render_chart_summary(&view)?),
        Err(e) => writeln!(out, "Chart: {}", e)?,
    }
    Ok(out)
}

fn render_details(session: &Session, rows: &[DetailRow]) -> Result<String> {
    let mut out = String::new();
    writeln!(
        out,
        "Portfolio Details ({} to {}, starting amount {:.2})",
        session.start_date, session.end_date, session.starting_amount
    )?;
    writeln!(
        out,
        "{:<10} {:>7} {:>12} {:>12} {:>10} {:>12} {:>14}",
        "Stock", "%", "Start Price", "Current", "P/L%", "Shares", "Return"
    )?;

    for row in rows {
        let text = row.text();
        writeln!(
            out,
            "{:<10} {:>7} {:>12} {:>12} {:>10} {:>12} {:>14}",
            row.symbol,
            row.percent,
            text.start_price,
            text.current_price,
            text.percent_gain_loss,
            text.shares_owned,
            text.monetary_return
        )?;
        if let Some(err) = row.error() {
            writeln!(out, "  ! {}", details::error_message(&row.symbol, err))?;
        }
    }
    Ok(out)
}

fn render_chart_summary(view: &ChartView) -> Result<String> {
    let mut out = String::new();
    writeln!(out, "{} ({}), start marker {}", chart::CHART_TITLE, view.timeframe, view.start_marker)?;
    if view.no_valid_data {
        writeln!(out, "  {}", chart::NO_VALID_DATA_WARNING)?;
    }
    for line in &view.lines {
        let first = line.points.first().map(|(_, y)| format!("{:.2}", y));
        let last = line.points.last().map(|(_, y)| format!("{:.2}", y));
        let change = line
            .percent_change
            .map(|c| format!("{:+.2}%", c))
            .unwrap_or_else(|| NOT_AVAILABLE.to_string());
        writeln!(
            out,
            "  {:<20} points={:<5} first={:<10} last={:<10} change={}",
            line.label,
            line.points.len(),
            first.as_deref().unwrap_or(NOT_AVAILABLE),
            last.as_deref().unwrap_or(NOT_AVAILABLE),
            change
        )?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::testing::StaticProvider;

    #[tokio::test]
    async fn report_lists_rows_and_lines() {
        let provider = StaticProvider::new()
            .with_closes("AAPL", &[100.0, 150.0])
            .with_closes("ZERO", &[10.0, 12.0]);
        let mut session = Session::default();
        session.portfolio.add_holding("AAPL", "20").unwrap();
        session.portfolio.add_holding("ZERO", "0").unwrap();
        session.portfolio.add_holding("GONE", "10").unwrap();

        let today = NaiveDate::from_ymd_opt(2024, 5, 17).unwrap();
        let out = run_report(&provider, &session, today).await.unwrap();

        assert!(out.contains("+$100.00"));
        assert!(out.contains("+50.00%"));
        assert!(out.contains("An error occurred while fetching data for GONE"));
        assert!(out.contains("AAPL (+20%)"));
        assert!(!out.contains("ZERO (+0%)"));
        assert!(out.contains("change=+50.00%"));
    }

    #[tokio::test]
    async fn report_shows_chart_abort() {
        let provider = StaticProvider::new();
        let session = Session {
            start_date: "bogus".into(),
            ..Session::default()
        };
        let today = NaiveDate::from_ymd_opt(2024, 5, 17).unwrap();
        let out = run_report(&provider, &session, today).await.unwrap();
        assert!(out.contains("Chart: Invalid start date format. Please use YYYY-MM-DD."));
    }
}
