use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

/// One trading day for one ticker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub ticker: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// A raw row as it comes out of the loader, before undefined values are
/// filtered away.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceRecord {
    pub date: Option<NaiveDate>,
    pub ticker: Option<String>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
}

impl From<PriceBar> for PriceRecord {
    fn from(bar: PriceBar) -> Self {
        Self {
            date: Some(bar.date),
            ticker: Some(bar.ticker),
            open: Some(bar.open),
            high: Some(bar.high),
            low: Some(bar.low),
            close: Some(bar.close),
            volume: Some(bar.volume),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub rows_read: usize,
    pub rows_kept: usize,
    pub undefined_dates: usize,
    pub missing_values: usize,
}

/// Per-ticker price series, each sorted ascending by date. Tickers keep the
/// order in which they first appeared in the input.
#[derive(Debug, Clone, Default)]
pub struct PriceBook {
    order: Vec<String>,
    series: HashMap<String, Vec<PriceBar>>,
    summary: LoadSummary,
}

impl PriceBook {
    pub fn load(path: &Path) -> Result<Self> {
        let frame = LazyCsvReader::new(path)
            .has_header(true)
            .with_infer_schema_length(None)
            .with_ignore_errors(true)
            .finish()
            .with_context(|| format!("Failed to initialize CSV reader for {}", path.display()))?
            .collect()
            .with_context(|| format!("Failed to collect price data from {}", path.display()))?;

        let dates = string_column(&frame, "Date")?;
        let tickers = string_column(&frame, "Ticker")?;
        let open = float_column(&frame, "Open")?;
        let high = float_column(&frame, "High")?;
        let low = float_column(&frame, "Low")?;
        let close = float_column(&frame, "Close")?;
        let volume = float_column(&frame, "Volume")?;

        let records = (0..frame.height()).map(|i| PriceRecord {
            date: dates[i].as_deref().and_then(parse_date),
            ticker: tickers[i].clone(),
            open: open[i],
            high: high[i],
            low: low[i],
            close: close[i],
            volume: volume[i],
        });
        let book = Self::from_records(records);

        let summary = book.summary();
        if summary.undefined_dates > 0 {
            warn!(
                rows = summary.undefined_dates,
                path = %path.display(),
                "Dropped rows with unparseable dates"
            );
        }
        if summary.missing_values > 0 {
            warn!(
                rows = summary.missing_values,
                path = %path.display(),
                "Dropped rows with missing ticker, price or volume"
            );
        }
        info!(
            rows = summary.rows_kept,
            tickers = book.tickers().len(),
            path = %path.display(),
            "Loaded price data"
        );
        Ok(book)
    }

    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = PriceRecord>,
    {
        let mut book = Self::default();
        for record in records {
            book.summary.rows_read += 1;
            let Some(date) = record.date else {
                book.summary.undefined_dates += 1;
                continue;
            };
            let (Some(ticker), Some(open), Some(high), Some(low), Some(close), Some(volume)) = (
                record.ticker,
                record.open,
                record.high,
                record.low,
                record.close,
                record.volume,
            ) else {
                book.summary.missing_values += 1;
                continue;
            };
            let ticker = ticker.trim().to_string();
            if ticker.is_empty()
                || ![open, high, low, close, volume]
                    .iter()
                    .all(|value| value.is_finite())
            {
                book.summary.missing_values += 1;
                continue;
            }

            book.summary.rows_kept += 1;
            let bar = PriceBar {
                date,
                ticker,
                open,
                high,
                low,
                close,
                volume,
            };
            match book.series.get_mut(&bar.ticker) {
                Some(bars) => bars.push(bar),
                None => {
                    book.order.push(bar.ticker.clone());
                    book.series.insert(bar.ticker.clone(), vec![bar]);
                }
            }
        }
        for bars in book.series.values_mut() {
            bars.sort_by_key(|bar| bar.date);
        }
        book
    }

    pub fn from_bars<I>(bars: I) -> Self
    where
        I: IntoIterator<Item = PriceBar>,
    {
        Self::from_records(bars.into_iter().map(PriceRecord::from))
    }

    pub fn tickers(&self) -> &[String] {
        &self.order
    }

    pub fn bars(&self, ticker: &str) -> Option<&[PriceBar]> {
        self.series.get(ticker).map(Vec::as_slice)
    }

    pub fn summary(&self) -> LoadSummary {
        self.summary
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%d-%m-%Y", "%d/%m/%Y", "%d.%m.%Y", "%Y/%m/%d",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%d-%m-%Y %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
];

/// Parses a calendar date, reading ambiguous numeric forms day-first.
/// Returns `None` for anything unrecognised so the row can be dropped.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Some(date) = DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
    {
        return Some(date);
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.date_naive());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|dt| dt.date())
}

fn resolve_column<'a>(frame: &'a DataFrame, name: &str) -> Result<&'a Series> {
    frame
        .column(name)
        .or_else(|_| frame.column(&name.to_ascii_lowercase()))
        .with_context(|| format!("Missing required column {name}"))
}

fn string_column(frame: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let series = resolve_column(frame, name)?
        .cast(&DataType::String)
        .with_context(|| format!("Column {name} cannot be read as text"))?;
    let values = series
        .str()
        .with_context(|| format!("Column {name} must be text"))?
        .into_iter()
        .map(|value| value.map(str::to_string))
        .collect();
    Ok(values)
}

fn float_column(frame: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let series = resolve_column(frame, name)?
        .cast(&DataType::Float64)
        .with_context(|| format!("Column {name} must be numeric"))?;
    let values = series
        .f64()
        .with_context(|| format!("Column {name} must be float"))?
        .into_iter()
        .collect();
    Ok(values)
}
