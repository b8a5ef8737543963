use crate::config::{DATE_FORMAT, END_DATE_NOW};
use crate::error::InputError;
use chrono::NaiveDate;
use std::fmt;

// ──────────────────────────────────────────────────────────────────────────────
// Holdings
// ──────────────────────────────────────────────────────────────────────────────

/// One portfolio entry.
#[derive(Clone, Debug, PartialEq)]
pub struct Holding {
    pub symbol: String,
    /// Allocation in percent, 0–100.
    pub percent: f64,
}

/// Ordered set of holdings with unique symbols.
///
/// Allocations are not required to sum to 100.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Portfolio {
    holdings: Vec<Holding>,
}

pub fn normalize_symbol(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Parses a user-typed allocation. Accepts any finite number in [0, 100].
pub fn parse_percent(raw: &str) -> Result<f64, InputError> {
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| InputError::InvalidNumber(raw.to_string()))?;
    if !value.is_finite() {
        return Err(InputError::InvalidNumber(raw.to_string()));
    }
    if !(0.0..=100.0).contains(&value) {
        return Err(InputError::PercentOutOfRange(value));
    }
    Ok(value)
}

impl Portfolio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn holdings(&self) -> &[Holding] {
        &self.holdings
    }

    pub fn len(&self) -> usize {
        self.holdings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.holdings.is_empty()
    }

    pub fn contains(&self, symbol: &str) -> bool {
        let symbol = normalize_symbol(symbol);
        self.holdings.iter().any(|h| h.symbol == symbol)
    }

    pub fn get(&self, symbol: &str) -> Option<&Holding> {
        let symbol = normalize_symbol(symbol);
        self.holdings.iter().find(|h| h.symbol == symbol)
    }

    /// Appends a holding. The portfolio is left untouched on any error.
    pub fn add_holding(&mut self, symbol: &str, percent: &str) -> Result<&Holding, InputError> {
        let symbol = normalize_symbol(symbol);
        if symbol.is_empty() {
            return Err(InputError::EmptySymbol);
        }
        if self.contains(&symbol) {
            return Err(InputError::DuplicateSymbol(symbol));
        }
        let percent = parse_percent(percent)?;

        self.holdings.push(Holding { symbol, percent });
        Ok(&self.holdings[self.holdings.len() - 1])
    }

    /// Removes `symbol` if present. Returns whether anything was removed.
    pub fn remove_holding(&mut self, symbol: &str) -> bool {
        let symbol = normalize_symbol(symbol);
        let before = self.holdings.len();
        self.holdings.retain(|h| h.symbol != symbol);
        self.holdings.len() != before
    }

    /// Changes the allocation of an existing holding.
    pub fn set_percent(&mut self, symbol: &str, percent: &str) -> Result<f64, InputError> {
        let symbol = normalize_symbol(symbol);
        let percent = parse_percent(percent)?;
        let holding = self
            .holdings
            .iter_mut()
            .find(|h| h.symbol == symbol)
            .ok_or(InputError::UnknownHolding(symbol))?;
        holding.percent = percent;
        Ok(percent)
    }
}

/// Parses `SYMBOL=PERCENT` as given on the command line.
pub fn parse_holding_arg(raw: &str) -> Result<(String, String), InputError> {
    match raw.split_once('=') {
        Some((symbol, percent)) if !symbol.trim().is_empty() => {
            Ok((normalize_symbol(symbol), percent.trim().to_string()))
        }
        _ => Err(InputError::MalformedHolding(raw.to_string())),
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// Date Range
// ──────────────────────────────────────────────────────────────────────────────

pub fn parse_date(raw: &str) -> Result<NaiveDate, InputError> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).map_err(|_| InputError::InvalidDate(raw.to_string()))
}

pub fn is_now(raw: &str) -> bool {
    raw.trim().eq_ignore_ascii_case(END_DATE_NOW)
}

/// Replacement text for the end-date field once it loses focus: `now`
/// becomes today's date, anything else is left alone.
pub fn resolve_now(raw: &str, today: NaiveDate) -> Option<String> {
    is_now(raw).then(|| today.format(DATE_FORMAT).to_string())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndDate {
    Date(NaiveDate),
    Now,
}

impl EndDate {
    pub fn parse(raw: &str) -> Result<Self, InputError> {
        if is_now(raw) {
            Ok(Self::Now)
        } else {
            parse_date(raw).map(Self::Date)
        }
    }

    pub fn resolve(self, today: NaiveDate) -> NaiveDate {
        match self {
            Self::Date(d) => d,
            Self::Now => today,
        }
    }
}

impl fmt::Display for EndDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
            Self::Now => f.write_str(END_DATE_NOW),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: EndDate,
}

impl DateRange {
    pub fn parse(start: &str, end: &str) -> Result<Self, InputError> {
        Ok(Self {
            start: parse_date(start)?,
            end: EndDate::parse(end)?,
        })
    }

    /// Concrete `(start, end)` for `today`, checking `start <= end`.
    pub fn resolve(&self, today: NaiveDate) -> Result<(NaiveDate, NaiveDate), InputError> {
        let end = self.end.resolve(today);
        if self.start > end {
            return Err(InputError::StartAfterEnd {
                start: self.start.format(DATE_FORMAT).to_string(),
                end: end.format(DATE_FORMAT).to_string(),
            });
        }
        Ok((self.start, end))
    }
}
