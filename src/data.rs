use crate::config::{self, DataProviderMode, Settings};
use crate::error::{FetchError, InputError};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveTime, Utc, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Relative lookback period used by the chart.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Timeframe {
    OneDay,
    FiveDays,
    #[default]
    OneMonth,
    ThreeMonths,
    SixMonths,
    OneYear,
    TwoYears,
    FiveYears,
    TenYears,
    YearToDate,
    Max,
}

impl Timeframe {
    pub const ALL: [Timeframe; 11] = [
        Timeframe::OneDay,
        Timeframe::FiveDays,
        Timeframe::OneMonth,
        Timeframe::ThreeMonths,
        Timeframe::SixMonths,
        Timeframe::OneYear,
        Timeframe::TwoYears,
        Timeframe::FiveYears,
        Timeframe::TenYears,
        Timeframe::YearToDate,
        Timeframe::Max,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OneDay => "1d",
            Self::FiveDays => "5d",
            Self::OneMonth => "1mo",
            Self::ThreeMonths => "3mo",
            Self::SixMonths => "6mo",
            Self::OneYear => "1y",
            Self::TwoYears => "2y",
            Self::FiveYears => "5y",
            Self::TenYears => "10y",
            Self::YearToDate => "ytd",
            Self::Max => "max",
        }
    }

    /// First calendar day covered by this timeframe when it ends on `today`.
    pub fn start_from(self, today: NaiveDate) -> NaiveDate {
        let months_back = |n: u32| today.checked_sub_months(Months::new(n)).unwrap_or(NaiveDate::MIN);
        match self {
            Self::OneDay => today - Duration::days(1),
            Self::FiveDays => today - Duration::days(7),
            Self::OneMonth => months_back(1),
            Self::ThreeMonths => months_back(3),
            Self::SixMonths => months_back(6),
            Self::OneYear => months_back(12),
            Self::TwoYears => months_back(24),
            Self::FiveYears => months_back(60),
            Self::TenYears => months_back(120),
            Self::YearToDate => NaiveDate::from_ymd_opt(today.year(), 1, 1).unwrap_or(today),
            Self::Max => SYNTHETIC_EPOCH,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|tf| tf.as_str() == wanted)
            .ok_or_else(|| InputError::UnknownTimeframe(s.to_string()))
    }
}

/// One daily close.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PricePoint {
    pub date: DateTime<Utc>,
    pub close: f64,
}

/// Daily closing prices for one symbol, ascending by date. May be empty.
#[derive(Clone, Debug, PartialEq)]
pub struct PriceSeries {
    pub symbol: String,
    pub points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn new(symbol: &str, mut points: Vec<PricePoint>) -> Self {
        points.sort_by_key(|p| p.date);
        Self {
            symbol: symbol.to_string(),
            points,
        }
    }

    pub fn empty(symbol: &str) -> Self {
        Self::new(symbol, Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn first(&self) -> Option<&PricePoint> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&PricePoint> {
        self.points.last()
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// Provider Trait
// ──────────────────────────────────────────────────────────────────────────────

/// Source of historical daily closes.
///
/// Both fetch modes return an empty series when the provider has nothing for
/// the request, and an error when the request itself failed.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Closes for a lookback period ending now (chart mode).
    async fn fetch_period(&self, symbol: &str, timeframe: Timeframe) -> Result<PriceSeries, FetchError>;

    /// Closes for `[start, end)` (details mode).
    async fn fetch_range(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceSeries, FetchError>;
}

pub fn build_provider(settings: &Settings) -> Arc<dyn MarketDataProvider> {
    info!("Using market data provider: {}", settings.provider.as_str());
    match settings.provider {
        DataProviderMode::Yfinance => Arc::new(YahooProvider::new(settings)),
        DataProviderMode::Synthetic => Arc::new(SyntheticProvider),
    }
}

/// Checks that the provider answers for `symbol` with a one-day history.
pub async fn validate_symbol(provider: &dyn MarketDataProvider, symbol: &str) -> Result<(), FetchError> {
    provider.fetch_period(symbol, Timeframe::OneDay).await.map(|_| ())
}

/// Same as [`validate_symbol`], logging the failure instead of returning it.
pub async fn is_valid_symbol(provider: &dyn MarketDataProvider, symbol: &str) -> bool {
    match validate_symbol(provider, symbol).await {
        Ok(()) => true,
        Err(e) => {
            warn!("Validation failed for stock symbol {}: {}", symbol, e);
            false
        }
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// Yahoo Finance
// ──────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct YahooChartResponse {
    chart: YahooChart,
}

#[derive(Deserialize, Debug)]
struct YahooChart {
    result: Option<Vec<YahooResult>>,
    error: Option<YahooError>,
}

#[derive(Deserialize, Debug)]
struct YahooError {
    code: String,
    description: Option<String>,
}

#[derive(Deserialize, Debug)]
struct YahooResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: YahooIndicators,
}

#[derive(Deserialize, Debug)]
struct YahooIndicators {
    #[serde(default)]
    quote: Vec<YahooQuote>,
}

#[derive(Deserialize, Debug)]
struct YahooQuote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

const YAHOO: &str = "Yahoo Finance";

pub struct YahooProvider {
    client: reqwest::Client,
    base_url: String,
    timeout: std::time::Duration,
    attempts: usize,
}

impl YahooProvider {
    pub fn new(settings: &Settings) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: settings.yahoo_base_url.clone(),
            timeout: settings.fetch_timeout,
            attempts: settings.fetch_attempts.max(1),
        }
    }

    async fn fetch_chart(&self, symbol: &str, query: &[(&str, String)]) -> Result<PriceSeries, FetchError> {
        let url = chart_url(&self.base_url, symbol)?;
        let series = with_retries(symbol, self.attempts, config::FETCH_RETRY_DELAY, || {
            self.fetch_chart_once(&url, symbol, query)
        })
        .await?;
        debug!("Fetched {} closes for {} from {}", series.len(), symbol, YAHOO);
        Ok(series)
    }

    async fn fetch_chart_once(
        &self,
        url: &reqwest::Url,
        symbol: &str,
        query: &[(&str, String)],
    ) -> Result<PriceSeries, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .query(query)
            .header("User-Agent", config::USER_AGENT)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        chart_outcome(symbol, status, &body)
    }
}

/// `{base}/v8/finance/chart/{symbol}` with the symbol escaped as one path segment.
fn chart_url(base_url: &str, symbol: &str) -> Result<reqwest::Url, FetchError> {
    let mut url =
        reqwest::Url::parse(base_url).map_err(|e| FetchError::InvalidUrl(format!("{}: {}", base_url, e)))?;
    url.path_segments_mut()
        .map_err(|_| FetchError::InvalidUrl(base_url.to_string()))?
        .pop_if_empty()
        .extend(["v8", "finance", "chart", symbol]);
    Ok(url)
}

/// Maps an HTTP answer to a series or an error.
///
/// A `chart.error` in the body wins over the status code; otherwise a
/// non-success status is a `Status` error whatever the body holds.
fn chart_outcome(symbol: &str, status: reqwest::StatusCode, body: &str) -> Result<PriceSeries, FetchError> {
    let status_error = || FetchError::Status {
        provider: YAHOO.to_string(),
        symbol: symbol.to_string(),
        status: status.as_u16(),
    };

    match serde_json::from_str::<YahooChartResponse>(body) {
        Ok(parsed) if status.is_success() || parsed.chart.error.is_some() => series_from_chart(symbol, parsed),
        Ok(_) => Err(status_error()),
        Err(_) if !status.is_success() => Err(status_error()),
        Err(e) => Err(FetchError::Malformed {
            symbol: symbol.to_string(),
            message: e.to_string(),
        }),
    }
}

/// Runs `fetch` up to `attempts` times. Only network and HTTP status
/// failures are retried.
async fn with_retries<F, Fut>(
    symbol: &str,
    attempts: usize,
    delay: std::time::Duration,
    mut fetch: F,
) -> Result<PriceSeries, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<PriceSeries, FetchError>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match fetch().await {
            Err(e @ (FetchError::Network(_) | FetchError::Status { .. })) if attempt < attempts => {
                warn!("Failed to fetch data for {} (attempt {}/{}): {}", symbol, attempt, attempts, e);
                tokio::time::sleep(delay).await;
            }
            outcome => return outcome,
        }
    }
}

#[async_trait]
impl MarketDataProvider for YahooProvider {
    fn name(&self) -> &str {
        YAHOO
    }

    async fn fetch_period(&self, symbol: &str, timeframe: Timeframe) -> Result<PriceSeries, FetchError> {
        let query = [
            ("range", timeframe.as_str().to_string()),
            ("interval", "1d".to_string()),
        ];
        self.fetch_chart(symbol, &query).await
    }

    async fn fetch_range(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceSeries, FetchError> {
        let query = [
            ("period1", midnight_utc(start).to_string()),
            ("period2", midnight_utc(end).to_string()),
            ("interval", "1d".to_string()),
        ];
        self.fetch_chart(symbol, &query).await
    }
}

fn midnight_utc(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp()
}

fn series_from_chart(symbol: &str, response: YahooChartResponse) -> Result<PriceSeries, FetchError> {
    if let Some(err) = response.chart.error {
        return Err(FetchError::Provider {
            provider: YAHOO.to_string(),
            symbol: symbol.to_string(),
            message: match err.description {
                Some(desc) => format!("{}: {}", err.code, desc),
                None => err.code,
            },
        });
    }

    let Some(result) = response.chart.result.and_then(|r| r.into_iter().next()) else {
        return Ok(PriceSeries::empty(symbol));
    };
    let Some(quote) = result.indicators.quote.into_iter().next() else {
        return Ok(PriceSeries::empty(symbol));
    };

    let points = result
        .timestamp
        .iter()
        .zip(quote.close.iter())
        .filter_map(|(&ts, close)| {
            let close = (*close)?;
            if !close.is_finite() {
                return None;
            }
            let date = DateTime::<Utc>::from_timestamp(ts, 0)?;
            Some(PricePoint { date, close })
        })
        .collect();

    Ok(PriceSeries::new(symbol, points))
}

// ──────────────────────────────────────────────────────────────────────────────
// Synthetic (offline) provider
// ──────────────────────────────────────────────────────────────────────────────

const SYNTHETIC_EPOCH: NaiveDate = match NaiveDate::from_ymd_opt(1990, 1, 1) {
    Some(d) => d,
    None => NaiveDate::MIN,
};

/// Deterministic random-walk prices seeded by the symbol. Useful without
/// network access; the same symbol and day always give the same close.
pub struct SyntheticProvider;

impl SyntheticProvider {
    fn check_symbol(symbol: &str) -> Result<(), FetchError> {
        let ok = !symbol.is_empty()
            && symbol.len() <= 10
            && symbol
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || matches!(c, '.' | '-' | '^' | '='));
        if ok {
            Ok(())
        } else {
            Err(FetchError::UnknownSymbol(symbol.to_string()))
        }
    }

    fn seed(symbol: &str) -> u64 {
        // FNV-1a
        symbol.bytes().fold(0xcbf2_9ce4_8422_2325_u64, |h, b| {
            (h ^ b as u64).wrapping_mul(0x0000_0100_0000_01b3)
        })
    }

    /// Weekday closes in `[start, end)`.
    fn walk(symbol: &str, start: NaiveDate, end: NaiveDate) -> PriceSeries {
        let mut rng = StdRng::seed_from_u64(Self::seed(symbol));
        let mut price: f64 = rng.gen_range(20.0..400.0);
        let mut points = Vec::new();
        let mut day = SYNTHETIC_EPOCH;

        while day < end {
            if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
                let change_pct: f64 = rng.gen_range(-0.02..0.021);
                price = (price * (1.0 + change_pct)).max(0.01);
                if day >= start {
                    points.push(PricePoint {
                        date: day.and_time(NaiveTime::MIN).and_utc(),
                        close: price,
                    });
                }
            }
            day += Duration::days(1);
        }

        PriceSeries::new(symbol, points)
    }
}

#[async_trait]
impl MarketDataProvider for SyntheticProvider {
    fn name(&self) -> &str {
        "Synthetic"
    }

    async fn fetch_period(&self, symbol: &str, timeframe: Timeframe) -> Result<PriceSeries, FetchError> {
        Self::check_symbol(symbol)?;
        let today = Utc::now().date_naive();
        let mut series = Self::walk(symbol, timeframe.start_from(today) - Duration::days(7), today + Duration::days(1));
        let keep = match timeframe {
            Timeframe::OneDay => Some(1),
            Timeframe::FiveDays => Some(5),
            _ => None,
        };
        match keep {
            Some(n) => {
                let skip = series.points.len().saturating_sub(n);
                series.points.drain(..skip);
            }
            None => {
                let start = timeframe.start_from(today);
                series.points.retain(|p| p.date.date_naive() >= start);
            }
        }
        Ok(series)
    }

    async fn fetch_range(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceSeries, FetchError> {
        Self::check_symbol(symbol)?;
        // Nothing exists past today; also keeps the walk bounded.
        let end = end.min(Utc::now().date_naive() + Duration::days(1));
        Ok(Self::walk(symbol, start, end))
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// Test support
// ──────────────────────────────────────────────────────────────────────────────


#[cfg(test)]
mod tests {
    use super::testing::StaticProvider;
    use super::*;

    fn parse(json: &str) -> YahooChartResponse {
        serde_json::from_str(json).expect("valid chart json")
    }

    #[test]
    fn timeframe_parses_all_keywords() {
        for tf in Timeframe::ALL {
            assert_eq!(tf.as_str().parse::<Timeframe>(), Ok(tf));
        }
        assert_eq!(" YTD ".parse::<Timeframe>(), Ok(Timeframe::YearToDate));
        assert!("2w".parse::<Timeframe>().is_err());
        assert_eq!(Timeframe::default(), Timeframe::OneMonth);
    }

    #[test]
    fn timeframe_start_dates() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        assert_eq!(Timeframe::OneMonth.start_from(today), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert_eq!(Timeframe::YearToDate.start_from(today), NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(Timeframe::OneYear.start_from(today), NaiveDate::from_ymd_opt(2023, 3, 31).unwrap());
    }

    #[test]
    fn chart_json_keeps_non_null_closes() {
        let resp = parse(
            r#"{"chart":{"result":[{"meta":{"symbol":"AAPL"},
                "timestamp":[1577975400,1578061800,1578321000],
                "indicators":{"quote":[{"open":[1,2,3],"close":[75.09,null,74.95]}]}}],
                "error":null}}"#,
        );
        let series = series_from_chart("AAPL", resp).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.first().unwrap().close, 75.09);
        assert_eq!(series.last().unwrap().close, 74.95);
        assert!(series.first().unwrap().date < series.last().unwrap().date);
    }

    #[test]
    fn chart_json_error_object_is_provider_error() {
        let resp = parse(
            r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#,
        );
        match series_from_chart("NOPE", resp) {
            Err(FetchError::Provider { symbol, message, .. }) => {
                assert_eq!(symbol, "NOPE");
                assert!(message.starts_with("Not Found"));
            }
            other => panic!("expected provider error, got {:?}", other),
        }
    }

    #[test]
    fn chart_json_without_timestamps_is_empty() {
        let resp = parse(r#"{"chart":{"result":[{"indicators":{"quote":[{}]}}],"error":null}}"#);
        assert!(series_from_chart("AAPL", resp).unwrap().is_empty());

        let resp = parse(r#"{"chart":{"result":[],"error":null}}"#);
        assert!(series_from_chart("AAPL", resp).unwrap().is_empty());
    }

    #[test]
    fn chart_outcome_maps_status_and_body() {
        use reqwest::StatusCode;

        let no_result = r#"{"chart":{"result":null,"error":null}}"#;
        assert_eq!(
            chart_outcome("AAPL", StatusCode::NOT_FOUND, no_result),
            Err(FetchError::Status {
                provider: YAHOO.to_string(),
                symbol: "AAPL".into(),
                status: 404,
            })
        );
        assert!(matches!(
            chart_outcome("AAPL", StatusCode::INTERNAL_SERVER_ERROR, "<html>oops</html>"),
            Err(FetchError::Status { status: 500, .. })
        ));
        assert!(matches!(
            chart_outcome("AAPL", StatusCode::OK, "<html>oops</html>"),
            Err(FetchError::Malformed { .. })
        ));

        let not_found = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found"}}}"#;
        assert!(matches!(
            chart_outcome("NOPE", StatusCode::NOT_FOUND, not_found),
            Err(FetchError::Provider { .. })
        ));

        let ok = r#"{"chart":{"result":[{"timestamp":[1577975400],"indicators":{"quote":[{"close":[75.09]}]}}],"error":null}}"#;
        assert_eq!(chart_outcome("AAPL", StatusCode::OK, ok).unwrap().len(), 1);
    }

    #[test]
    fn chart_url_keeps_symbol_in_one_segment() {
        let url = chart_url("https://query1.finance.yahoo.com", "A/B?x=1").unwrap();
        assert_eq!(url.as_str(), "https://query1.finance.yahoo.com/v8/finance/chart/A%2FB%3Fx=1");
        assert_eq!(url.query(), None);

        let url = chart_url("http://127.0.0.1:8080/", "MSFT").unwrap();
        assert_eq!(url.path(), "/v8/finance/chart/MSFT");

        assert!(matches!(chart_url("not a url", "AAPL"), Err(FetchError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn retries_only_network_and_status_failures() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::time::Duration as StdDuration;

        let calls = AtomicUsize::new(0);
        let out = with_retries("AAPL", 3, StdDuration::ZERO, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(FetchError::Status {
                    provider: YAHOO.to_string(),
                    symbol: "AAPL".into(),
                    status: 503,
                })
            }
        })
        .await;
        assert!(matches!(out, Err(FetchError::Status { status: 503, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let calls = AtomicUsize::new(0);
        let out = with_retries("NOPE", 3, StdDuration::ZERO, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(FetchError::Provider {
                    provider: YAHOO.to_string(),
                    symbol: "NOPE".into(),
                    message: "Not Found".into(),
                })
            }
        })
        .await;
        assert!(matches!(out, Err(FetchError::Provider { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let calls = AtomicUsize::new(0);
        let out = with_retries("AAPL", 3, StdDuration::ZERO, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            let answer = if n == 0 {
                Err(FetchError::Network("connection reset".into()))
            } else {
                Ok(PriceSeries::empty("AAPL"))
            };
            async move { answer }
        })
        .await;
        assert_eq!(out, Ok(PriceSeries::empty("AAPL")));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn synthetic_range_stops_at_today() {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let series = SyntheticProvider.fetch_range("AAPL", start, NaiveDate::MAX).await.unwrap();
        let today = Utc::now().date_naive();
        assert!(series.last().unwrap().date.date_naive() <= today);
    }

    #[tokio::test]
    async fn synthetic_is_deterministic_and_skips_weekends() {
        let provider = SyntheticProvider;
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2020, 2, 1).unwrap();

        let a = provider.fetch_range("AAPL", start, end).await.unwrap();
        let b = provider.fetch_range("AAPL", start, end).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 23);
        assert!(a.points.iter().all(|p| !matches!(p.date.weekday(), Weekday::Sat | Weekday::Sun)));
        assert!(a.points.iter().all(|p| p.date.date_naive() < end));
    }

    #[tokio::test]
    async fn synthetic_rejects_garbage_symbols() {
        let provider = SyntheticProvider;
        assert!(matches!(
            provider.fetch_period("not a ticker", Timeframe::OneDay).await,
            Err(FetchError::UnknownSymbol(_))
        ));
        assert!(is_valid_symbol(&provider, "MSFT").await);
        assert!(!is_valid_symbol(&provider, "bad symbol").await);
    }

    #[tokio::test]
    async fn synthetic_short_periods_are_trimmed() {
        let provider = SyntheticProvider;
        assert_eq!(provider.fetch_period("SPY", Timeframe::OneDay).await.unwrap().len(), 1);
        assert_eq!(provider.fetch_period("SPY", Timeframe::FiveDays).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn validation_makes_one_call_each_time() {
        let provider = StaticProvider::new().with_closes("AAPL", &[1.0]);
        assert!(is_valid_symbol(&provider, "AAPL").await);
        assert!(is_valid_symbol(&provider, "AAPL").await);
        assert!(!is_valid_symbol(&provider, "ZZZZ").await);
        assert_eq!(provider.call_count("period:1d:"), 3);
    }
}
