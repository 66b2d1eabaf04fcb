/*!
 * # Feature Engineering
 *
 * Turns a product's daily sales history into the feature rows used to train
 * the demand forecasting model.
 *
 * Each row carries calendar features for its own date plus lag and rolling
 * statistics over the preceding observations:
 *
 * | feature          | meaning                                      |
 * |------------------|----------------------------------------------|
 * | `day_of_week`    | 0 (Monday) through 6 (Sunday)                |
 * | `day_of_month`   | 1 through 31                                 |
 * | `month`          | 1 through 12                                 |
 * | `lag_1`          | quantity one observation earlier             |
 * | `lag_7`          | quantity seven observations earlier          |
 * | `rolling_mean_7` | mean of the 7 quantities ending at this row  |
 *
 * Lags are positional: the series is assumed (not verified) to be daily.
 */

use chrono::{DateTime, Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::forecasting::ForecastFailure;

/// Window length shared by `lag_7` and `rolling_mean_7`.
pub const WINDOW: usize = 7;

/// Number of model features per row.
pub const FEATURE_COUNT: usize = 6;

/// Feature names in the column order of [`FeatureRow::to_vector`].
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "day_of_week",
    "day_of_month",
    "month",
    "lag_1",
    "lag_7",
    "rolling_mean_7",
];

/// One observed day of sales for a product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricalRecord {
    pub date: NaiveDate,
    pub quantity: u64,
}

impl HistoricalRecord {
    pub fn new(date: NaiveDate, quantity: u64) -> Self {
        Self { date, quantity }
    }
}

/// Model input derived from one position of the history
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureRow {
    pub date: NaiveDate,
    pub day_of_week: u32,
    pub day_of_month: u32,
    pub month: u32,
    pub lag_1: f64,
    pub lag_7: f64,
    pub rolling_mean_7: f64,
    /// Observed quantity on `date`, the training target
    pub quantity: f64,
}

impl FeatureRow {
    /// Build the feature row for a date with explicitly supplied lag statistics.
    pub fn for_date(
        date: NaiveDate,
        lag_1: f64,
        lag_7: f64,
        rolling_mean_7: f64,
        quantity: f64,
    ) -> Self {
        Self {
            date,
            day_of_week: date.weekday().num_days_from_monday(),
            day_of_month: date.day(),
            month: date.month(),
            lag_1,
            lag_7,
            rolling_mean_7,
            quantity,
        }
    }

    pub fn to_vector(&self) -> [f64; FEATURE_COUNT] {
        [
            f64::from(self.day_of_week),
            f64::from(self.day_of_month),
            f64::from(self.month),
            self.lag_1,
            self.lag_7,
            self.rolling_mean_7,
        ]
    }
}

/// Sort a history ascending by date. The sort is stable, so duplicate dates
/// keep their submission order.
pub fn sort_history(history: &mut [HistoricalRecord]) {
    history.sort_by_key(|record| record.date);
}

/// Derive feature rows from a date-sorted history.
///
/// Positions without a full 7-observation look-back are invalid and left
/// out, so the first [`WINDOW`] records never yield a row.
pub fn derive_features(history: &[HistoricalRecord]) -> Vec<FeatureRow> {
    if history.len() <= WINDOW {
        return Vec::new();
    }

    let quantities: Vec<f64> = history.iter().map(|r| r.quantity as f64).collect();
    let mut rows = Vec::with_capacity(history.len() - WINDOW);
    let mut window_sum: f64 = quantities[..WINDOW].iter().sum();

    for idx in WINDOW..history.len() {
        window_sum += quantities[idx] - quantities[idx - WINDOW];
        rows.push(FeatureRow::for_date(
            history[idx].date,
            quantities[idx - 1],
            quantities[idx - WINDOW],
            window_sum / WINDOW as f64,
            quantities[idx],
        ));
    }

    rows
}

/// Lag statistics taken from the tail of the training frame.
///
/// Every forecast day reuses these observed values rather than feeding
/// predictions back in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TailStatistics {
    pub lag_1: f64,
    pub lag_7: f64,
    pub rolling_mean_7: f64,
}

impl TailStatistics {
    /// Compute tail statistics over the quantities of the valid feature rows.
    ///
    /// `lag_7` is the seventh value from the end of the frame; with fewer
    /// than seven rows it degrades to the last value.
    pub fn from_rows(rows: &[FeatureRow]) -> Option<Self> {
        let last = rows.last()?.quantity;
        let lag_7 = if rows.len() >= WINDOW {
            rows[rows.len() - WINDOW].quantity
        } else {
            last
        };
        let tail = &rows[rows.len().saturating_sub(WINDOW)..];
        let rolling_mean_7 = tail.iter().map(|r| r.quantity).sum::<f64>() / tail.len() as f64;

        Some(Self {
            lag_1: last,
            lag_7,
            rolling_mean_7,
        })
    }

    /// Feature vector for a future date using these tail statistics
    pub fn features_for(&self, date: NaiveDate) -> [f64; FEATURE_COUNT] {
        FeatureRow::for_date(date, self.lag_1, self.lag_7, self.rolling_mean_7, 0.0).to_vector()
    }
}

/// Parse a caller-supplied history into typed records.
///
/// Each element must be an object with a `date` (ISO `YYYY-MM-DD` or an
/// RFC 3339 timestamp) and a non-negative integral `quantity` (a JSON
/// number or numeric string). The first offending element aborts parsing.
pub fn parse_history(raw: &[Value]) -> Result<Vec<HistoricalRecord>, ForecastFailure> {
    raw.iter()
        .enumerate()
        .map(|(index, value)| {
            parse_record(value).map_err(|reason| ForecastFailure::MalformedRecord { index, reason })
        })
        .collect()
}

fn parse_record(value: &Value) -> Result<HistoricalRecord, String> {
    let object = value
        .as_object()
        .ok_or_else(|| "record is not an object".to_string())?;

    let date = match object.get("date") {
        Some(Value::String(raw)) => parse_date(raw)?,
        Some(other) => return Err(format!("date must be a string, got {other}")),
        None => return Err("missing date".to_string()),
    };

    let quantity = match object.get("quantity") {
        Some(value) => parse_quantity(value)?,
        None => return Err("missing quantity".to_string()),
    };

    Ok(HistoricalRecord { date, quantity })
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    let trimmed = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(date);
    }
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(timestamp.date_naive());
    }
    if let Ok(timestamp) = chrono::NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S") {
        return Ok(timestamp.date());
    }
    Err(format!("unparsable date '{raw}'"))
}

fn parse_quantity(value: &Value) -> Result<u64, String> {
    let number = match value {
        Value::Number(n) => {
            if let Some(q) = n.as_u64() {
                return Ok(q);
            }
            n.as_f64()
                .ok_or_else(|| format!("quantity {n} is not representable"))?
        }
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("quantity '{s}' is not numeric"))?,
        other => return Err(format!("quantity must be numeric, got {other}")),
    };

    if !number.is_finite() || number < 0.0 || number.fract() != 0.0 {
        return Err(format!("quantity {number} is not a non-negative integer"));
    }
    Ok(number as u64)
}
