use thiserror::Error;

/// Rejected user input. Nothing is mutated when one of these is returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InputError {
    #[error("Invalid date '{0}'. Please use YYYY-MM-DD.")]
    InvalidDate(String),

    #[error("Start date {start} is after end date {end}.")]
    StartAfterEnd { start: String, end: String },

    #[error("Invalid percentage. Please enter a valid number.")]
    InvalidNumber(String),

    #[error("Percentage must be between 0 and 100.")]
    PercentOutOfRange(f64),

    #[error("Stock '{0}' already in the portfolio.")]
    DuplicateSymbol(String),

    #[error("Stock symbol must not be empty.")]
    EmptySymbol,

    #[error("Stock '{0}' is not in the portfolio.")]
    UnknownHolding(String),

    #[error("Invalid starting amount '{0}'. Please enter a valid number.")]
    InvalidAmount(String),

    #[error("Unknown timeframe '{0}'. Expected one of 1d, 5d, 1mo, 3mo, 6mo, 1y, 2y, 5y, 10y, ytd, max.")]
    UnknownTimeframe(String),

    #[error("Invalid holding '{0}'. Expected SYMBOL=PERCENT.")]
    MalformedHolding(String),
}

/// Failure talking to a market data provider.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP {status} from {provider} for {symbol}")]
    Status {
        provider: String,
        symbol: String,
        status: u16,
    },

    #[error("{provider} error for {symbol}: {message}")]
    Provider {
        provider: String,
        symbol: String,
        message: String,
    },

    #[error("Malformed response for {symbol}: {message}")]
    Malformed { symbol: String, message: String },

    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("Invalid request URL: {0}")]
    InvalidUrl(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        // reqwest errors embed the full URL; keep the path, drop the query.
        let msg = e.to_string();
        let sanitized = match msg.find('?') {
            Some(idx) => format!("{}?<query redacted>", &msg[..idx]),
            None => msg,
        };
        FetchError::Network(sanitized)
    }
}

/// Aborts a chart redraw.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChartError {
    #[error("Invalid start date format. Please use YYYY-MM-DD.")]
    InvalidStartDate(String),
}

/// Per-symbol failure while filling the details panel.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DetailsError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}
