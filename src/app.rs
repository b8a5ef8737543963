use crate::chart::{self, ChartView, NO_VALID_DATA_WARNING};
use crate::config::{DEFAULT_END_DATE, DEFAULT_STARTING_AMOUNT, DEFAULT_START_DATE};
use crate::data::{MarketDataProvider, Timeframe};
use crate::details::{self, DetailRow};
use crate::error::{ChartError, InputError};
use crate::portfolio::{self, Portfolio};
use chrono::{Local, NaiveDate};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Everything the user has entered. Lives for the whole process.
#[derive(Clone, Debug, PartialEq)]
pub struct Session {
    pub portfolio: Portfolio,
    pub timeframe: Timeframe,
    pub start_date: String,
    pub end_date: String,
    pub starting_amount: f64,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            portfolio: Portfolio::new(),
            timeframe: Timeframe::default(),
            start_date: DEFAULT_START_DATE.to_string(),
            end_date: DEFAULT_END_DATE.to_string(),
            starting_amount: DEFAULT_STARTING_AMOUNT,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DialogKind {
    Info,
    Warning,
    Error,
}

/// A blocking message for the user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dialog {
    pub kind: DialogKind,
    pub title: String,
    pub message: String,
}

impl Dialog {
    fn new(kind: DialogKind, message: impl Into<String>) -> Self {
        let title = match kind {
            DialogKind::Info => "Info",
            DialogKind::Warning => "Warning",
            DialogKind::Error => "Error",
        };
        Self {
            kind,
            title: title.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ChartState {
    Empty,
    Loading,
    Ready(ChartView),
}

#[derive(Clone, Debug, PartialEq)]
pub enum DetailsState {
    Idle,
    Loading,
    Ready(Vec<DetailRow>),
}

struct PendingTask<T> {
    handle: JoinHandle<()>,
    rx: mpsc::Receiver<T>,
}

impl<T: Send + 'static> PendingTask<T> {
    fn spawn<F>(fut: F) -> Self
    where
        F: std::future::Future<Output = T> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(1);
        let handle = tokio::spawn(async move {
            let result = fut.await;
            let _ = tx.send(result).await;
        });
        Self { handle, rx }
    }

    /// `Ok(Some)` when finished, `Ok(None)` while running, `Err` if the task
    /// went away without answering.
    fn poll(&mut self) -> Result<Option<T>, ()> {
        match self.rx.try_recv() {
            Ok(value) => Ok(Some(value)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(()),
        }
    }

    fn cancel(self) {
        self.handle.abort();
    }
}

/// Session owner and controller. UI events come in through the methods
/// below; fetches run as tokio tasks and are collected by [`App::tick`].
pub struct App {
    pub session: Session,
    pub chart: ChartState,
    pub details: DetailsState,
    pub details_open: bool,
    dialogs: VecDeque<Dialog>,
    provider: Arc<dyn MarketDataProvider>,
    chart_task: Option<PendingTask<Result<ChartView, ChartError>>>,
    details_task: Option<PendingTask<Vec<DetailRow>>>,
}

impl App {
    pub fn new(provider: Arc<dyn MarketDataProvider>, session: Session) -> Self {
        Self {
            session,
            chart: ChartState::Empty,
            details: DetailsState::Idle,
            details_open: false,
            dialogs: VecDeque::new(),
            provider,
            chart_task: None,
            details_task: None,
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    // ── Dialogs ──

    pub fn current_dialog(&self) -> Option<&Dialog> {
        self.dialogs.front()
    }

    pub fn dismiss_dialog(&mut self) {
        self.dialogs.pop_front();
    }

    #[cfg(test)]
    pub fn dialogs(&self) -> impl Iterator<Item = &Dialog> {
        self.dialogs.iter()
    }

    fn show(&mut self, kind: DialogKind, message: impl Into<String>) {
        let dialog = Dialog::new(kind, message);
        debug!("Dialog {:?}: {}", dialog.kind, dialog.message);
        self.dialogs.push_back(dialog);
    }

    fn show_input_error(&mut self, err: &InputError) {
        match err {
            InputError::EmptySymbol => {}
            InputError::DuplicateSymbol(_) => self.show(DialogKind::Info, err.to_string()),
            _ => self.show(DialogKind::Error, err.to_string()),
        }
    }

    // ── Portfolio ──

    /// First step of adding a stock. Returns the normalised symbol when the
    /// percentage prompt should follow.
    pub fn check_new_symbol(&mut self, symbol: &str) -> Option<String> {
        let symbol = portfolio::normalize_symbol(symbol);
        if symbol.is_empty() {
            return None;
        }
        if self.session.portfolio.contains(&symbol) {
            self.show_input_error(&InputError::DuplicateSymbol(symbol));
            return None;
        }
        Some(symbol)
    }

    pub fn add_holding(&mut self, symbol: &str, percent: &str) -> bool {
        match self.session.portfolio.add_holding(symbol, percent) {
            Ok(holding) => {
                info!("Added {} at {}%", holding.symbol, holding.percent);
                self.portfolio_changed();
                true
            }
            Err(e) => {
                self.show_input_error(&e);
                false
            }
        }
    }

    pub fn remove_holding(&mut self, symbol: &str) {
        if self.session.portfolio.remove_holding(symbol) {
            info!("Removed {}", symbol);
            self.portfolio_changed();
        }
    }

    pub fn set_percent(&mut self, symbol: &str, percent: &str) -> bool {
        match self.session.portfolio.set_percent(symbol, percent) {
            Ok(value) => {
                info!("Set {} to {}%", symbol, value);
                self.portfolio_changed();
                true
            }
            Err(e) => {
                self.show_input_error(&e);
                false
            }
        }
    }

    fn portfolio_changed(&mut self) {
        self.request_chart();
        self.refresh_details_if_open();
    }

    // ── Top bar fields ──

    pub fn set_timeframe(&mut self, timeframe: Timeframe) {
        self.session.timeframe = timeframe;
        self.request_chart();
    }

    pub fn commit_start_date(&mut self, text: &str) {
        self.session.start_date = text.trim().to_string();
        self.refresh_details_if_open();
    }

    /// Stores the end date, turning `now` into today's date.
    pub fn commit_end_date(&mut self, text: &str, today: NaiveDate) {
        self.session.end_date = portfolio::resolve_now(text, today).unwrap_or_else(|| text.trim().to_string());
        self.refresh_details_if_open();
    }

    /// Rejects anything that is not a finite number, keeping the old amount.
    pub fn commit_starting_amount(&mut self, text: &str) -> bool {
        match text.trim().parse::<f64>() {
            Ok(value) if value.is_finite() => {
                self.session.starting_amount = value;
                self.refresh_details_if_open();
                true
            }
            _ => {
                self.show(DialogKind::Error, InputError::InvalidAmount(text.to_string()).to_string());
                false
            }
        }
    }

    // ── Details window ──

    pub fn open_details(&mut self) {
        self.details_open = true;
        self.request_details();
    }

    pub fn close_details(&mut self) {
        self.details_open = false;
        if let Some(task) = self.details_task.take() {
            task.cancel();
        }
        self.details = DetailsState::Idle;
    }

    fn refresh_details_if_open(&mut self) {
        if self.details_open {
            self.request_details();
        }
    }

    // ── Background work ──

    pub fn is_busy(&self) -> bool {
        self.chart_task.is_some() || self.details_task.is_some()
    }

    /// Starts a chart rebuild, cancelling one still in flight.
    pub fn request_chart(&mut self) {
        if let Some(task) = self.chart_task.take() {
            debug!("Cancelling superseded chart request");
            task.cancel();
        }

        let provider = self.provider.clone();
        let holdings = self.session.portfolio.holdings().to_vec();
        let timeframe = self.session.timeframe;
        let start_date = self.session.start_date.clone();

        self.chart = ChartState::Loading;
        self.chart_task = Some(PendingTask::spawn(async move {
            chart::build_chart(provider.as_ref(), &holdings, timeframe, &start_date).await
        }));
    }

    /// Starts a details refresh, cancelling one still in flight.
    pub fn request_details(&mut self) {
        if let Some(task) = self.details_task.take() {
            debug!("Cancelling superseded details request");
            task.cancel();
        }

        let provider = self.provider.clone();
        let holdings = self.session.portfolio.holdings().to_vec();
        let start_date = self.session.start_date.clone();
        let end_date = self.session.end_date.clone();
        let amount = self.session.starting_amount;
        let today = Local::now().date_naive();

        self.details = DetailsState::Loading;
        self.details_task = Some(PendingTask::spawn(async move {
            details::compute_details(provider.as_ref(), &holdings, &start_date, &end_date, amount, today).await
        }));
    }

    /// Collects finished background work. Call once per frame.
    pub fn tick(&mut self) {
        if let Some(task) = &mut self.chart_task {
            match task.poll() {
                Ok(Some(result)) => {
                    self.chart_task = None;
                    self.finish_chart(result);
                }
                Ok(None) => {}
                Err(()) => {
                    error!("Chart task ended without a result");
                    self.chart_task = None;
                    self.chart = ChartState::Empty;
                }
            }
        }

        if let Some(task) = &mut self.details_task {
            match task.poll() {
                Ok(Some(rows)) => {
                    self.details_task = None;
                    self.finish_details(rows);
                }
                Ok(None) => {}
                Err(()) => {
                    error!("Details task ended without a result");
                    self.details_task = None;
                    self.details = DetailsState::Idle;
                }
            }
        }
    }

    fn finish_chart(&mut self, result: Result<ChartView, ChartError>) {
        match result {
            Ok(view) => {
                if view.no_valid_data {
                    self.show(DialogKind::Warning, NO_VALID_DATA_WARNING);
                }
                info!("Chart ready: {} line(s), timeframe {}", view.lines.len(), view.timeframe);
                self.chart = ChartState::Ready(view);
            }
            Err(e) => {
                self.show(DialogKind::Error, e.to_string());
                self.chart = ChartState::Empty;
            }
        }
    }

    fn finish_details(&mut self, rows: Vec<DetailRow>) {
        for row in &rows {
            if let Some(err) = row.error() {
                self.show(DialogKind::Error, details::error_message(&row.symbol, err));
            }
        }
        self.details = DetailsState::Ready(rows);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::testing::StaticProvider;
    use crate::error::FetchError;
    use std::time::Duration;

    fn app_with(provider: StaticProvider) -> (App, Arc<StaticProvider>) {
        let provider = Arc::new(provider);
        let app = App::new(provider.clone(), Session::default());
        (app, provider)
    }

    async fn settle(app: &mut App) {
        for _ in 0..500 {
            app.tick();
            if !app.is_busy() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("background work did not finish");
    }

    fn kinds(app: &App) -> Vec<DialogKind> {
        app.dialogs().map(|d| d.kind).collect()
    }

    #[test]
    fn session_defaults() {
        let s = Session::default();
        assert_eq!(s.timeframe, Timeframe::OneMonth);
        assert_eq!(s.start_date, "2020-01-01");
        assert_eq!(s.end_date, "2020-02-01");
        assert_eq!(s.starting_amount, 1000.0);
        assert!(s.portfolio.is_empty());
    }

    #[tokio::test]
    async fn adding_a_holding_redraws_the_chart() {
        let (mut app, _) = app_with(StaticProvider::new().with_closes("AAPL", &[100.0, 110.0]));

        assert!(app.add_holding("aapl", "20"));
        assert_eq!(app.chart, ChartState::Loading);
        settle(&mut app).await;

        match &app.chart {
            ChartState::Ready(view) => assert_eq!(view.lines[0].label, "AAPL (+20%)"),
            other => panic!("unexpected chart state {:?}", other),
        }
        assert!(app.current_dialog().is_none());
    }

    #[tokio::test]
    async fn duplicate_symbol_is_reported_as_info() {
        let (mut app, _) = app_with(StaticProvider::new().with_closes("AAPL", &[1.0]));
        app.add_holding("AAPL", "20");
        settle(&mut app).await;

        assert_eq!(app.check_new_symbol(" aapl "), None);
        assert!(!app.add_holding("AAPL", "30"));
        assert_eq!(kinds(&app), vec![DialogKind::Info, DialogKind::Info]);
        assert_eq!(app.current_dialog().unwrap().message, "Stock 'AAPL' already in the portfolio.");
        assert_eq!(app.session.portfolio.len(), 1);
        assert!(!app.is_busy());
    }

    #[tokio::test]
    async fn bad_percent_shows_error_without_refresh() {
        let (mut app, _) = app_with(StaticProvider::new());
        assert_eq!(app.check_new_symbol("MSFT"), Some("MSFT".to_string()));
        assert!(!app.add_holding("MSFT", "150"));
        assert!(!app.add_holding("MSFT", "lots"));

        assert!(app.session.portfolio.is_empty());
        assert!(!app.is_busy());
        let messages: Vec<_> = app.dialogs().map(|d| d.message.clone()).collect();
        assert_eq!(
            messages,
            vec![
                "Percentage must be between 0 and 100.".to_string(),
                "Invalid percentage. Please enter a valid number.".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn cancelled_prompt_is_silent() {
        let (mut app, _) = app_with(StaticProvider::new());
        assert_eq!(app.check_new_symbol("   "), None);
        assert!(app.current_dialog().is_none());
    }

    #[tokio::test]
    async fn removing_absent_symbol_does_nothing() {
        let (mut app, provider) = app_with(StaticProvider::new());
        app.remove_holding("AAPL");
        assert!(!app.is_busy());
        assert_eq!(provider.call_count(""), 0);
        assert_eq!(app.chart, ChartState::Empty);
    }

    #[tokio::test]
    async fn all_invalid_gives_one_warning() {
        let (mut app, _) = app_with(StaticProvider::new());
        app.session.portfolio.add_holding("AAA", "10").unwrap();
        app.session.portfolio.add_holding("BBB", "10").unwrap();
        app.session.portfolio.add_holding("CCC", "10").unwrap();

        app.set_timeframe(Timeframe::SixMonths);
        settle(&mut app).await;

        assert_eq!(kinds(&app), vec![DialogKind::Warning]);
        assert_eq!(app.current_dialog().unwrap().message, NO_VALID_DATA_WARNING);
        app.dismiss_dialog();
        assert!(app.current_dialog().is_none());
    }

    #[tokio::test]
    async fn invalid_start_date_aborts_redraw() {
        let (mut app, _) = app_with(StaticProvider::new().with_closes("AAPL", &[1.0, 2.0]));
        app.session.portfolio.add_holding("AAPL", "20").unwrap();
        app.commit_start_date("Jan 1st");
        app.set_timeframe(Timeframe::OneYear);
        settle(&mut app).await;

        assert_eq!(app.chart, ChartState::Empty);
        assert_eq!(
            app.current_dialog().unwrap().message,
            "Invalid start date format. Please use YYYY-MM-DD."
        );
    }

    #[tokio::test]
    async fn newer_chart_request_cancels_older() {
        let provider = StaticProvider::new()
            .with_closes("AAPL", &[1.0, 2.0])
            .with_delay(Duration::from_millis(20));
        let (mut app, provider) = app_with(provider);
        app.session.portfolio.add_holding("AAPL", "20").unwrap();

        app.set_timeframe(Timeframe::OneYear);
        app.set_timeframe(Timeframe::FiveYears);
        settle(&mut app).await;

        assert_eq!(provider.call_count("period:1y:"), 0);
        assert_eq!(provider.call_count("period:5y:AAPL"), 1);
        match &app.chart {
            ChartState::Ready(view) => assert_eq!(view.timeframe, Timeframe::FiveYears),
            other => panic!("unexpected chart state {:?}", other),
        }
    }

    #[tokio::test]
    async fn details_errors_are_reported_per_symbol() {
        let provider = StaticProvider::new()
            .with_closes("AAPL", &[100.0, 150.0])
            .with_error("BAD1", FetchError::Network("down".into()))
            .with_error("BAD2", FetchError::Network("down".into()));
        let (mut app, _) = app_with(provider);
        for (s, p) in [("BAD1", "10"), ("AAPL", "20"), ("BAD2", "10")] {
            app.session.portfolio.add_holding(s, p).unwrap();
        }

        app.open_details();
        settle(&mut app).await;

        assert_eq!(kinds(&app), vec![DialogKind::Error, DialogKind::Error]);
        assert!(app.current_dialog().unwrap().message.contains("BAD1"));
        match &app.details {
            DetailsState::Ready(rows) => {
                assert_eq!(rows.len(), 3);
                assert_eq!(rows[1].text().percent_gain_loss, "+50.00%");
            }
            other => panic!("unexpected details state {:?}", other),
        }
    }

    #[tokio::test]
    async fn field_commits_refresh_open_details() {
        let (mut app, provider) = app_with(StaticProvider::new().with_closes("AAPL", &[100.0, 150.0]));
        app.session.portfolio.add_holding("AAPL", "20").unwrap();

        app.commit_starting_amount("2000");
        assert!(!app.is_busy(), "closed details window should not refresh");

        app.open_details();
        settle(&mut app).await;
        app.commit_end_date("now", NaiveDate::from_ymd_opt(2024, 5, 17).unwrap());
        assert_eq!(app.session.end_date, "2024-05-17");
        settle(&mut app).await;

        assert_eq!(provider.call_count("range:2020-01-01:2024-05-17:AAPL"), 1);
        match &app.details {
            DetailsState::Ready(rows) => assert_eq!(rows[0].text().monetary_return, "+$200.00"),
            other => panic!("unexpected details state {:?}", other),
        }
    }

    #[tokio::test]
    async fn invalid_amount_keeps_previous_value() {
        let (mut app, _) = app_with(StaticProvider::new());
        assert!(!app.commit_starting_amount("a lot"));
        assert_eq!(app.session.starting_amount, 1000.0);
        assert_eq!(kinds(&app), vec![DialogKind::Error]);
    }

    #[tokio::test]
    async fn editing_percent_redraws() {
        let (mut app, provider) = app_with(StaticProvider::new().with_closes("AAPL", &[10.0]));
        app.session.portfolio.add_holding("AAPL", "0").unwrap();

        assert!(app.set_percent("AAPL", "25"));
        settle(&mut app).await;
        assert_eq!(provider.call_count("period:1mo:AAPL"), 1);

        assert!(!app.set_percent("AAPL", "-5"));
        assert_eq!(app.session.portfolio.get("AAPL").unwrap().percent, 25.0);
    }
}
