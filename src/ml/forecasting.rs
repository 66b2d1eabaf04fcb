/*!
 * # Sales Forecasting
 *
 * Per-product demand forecasting from recent daily sales.
 *
 * A forecast takes one of two paths:
 *
 * - **Model path**: derive lag/rolling features from the history, fit a
 *   seeded random forest, and predict each day of the horizon starting the
 *   day after the last observed date.
 * - **Fallback path**: a randomised level around a base of 5–19 units per
 *   day, starting the day after `today`.
 *
 * The model path reports failures as a [`ModelOutcome`] instead of erroring
 * out; [`Forecaster::forecast`] turns every failure into a fallback forecast,
 * so callers always receive a full horizon.
 *
 * The forecaster is stateless. Each call fits and discards its own model and
 * does no logging or I/O; randomness and the current date are passed in.
 */

use chrono::{Days, NaiveDate};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;
use utoipa::ToSchema;

use super::features::{self, HistoricalRecord, TailStatistics};
use super::random_forest::{ForestError, RandomForestConfig, RandomForestRegressor};

/// Upper bound for model-path confidence
pub const MODEL_CONFIDENCE_CAP: f64 = 0.95;
/// Confidence attached to every fallback forecast
pub const FALLBACK_CONFIDENCE: f64 = 0.7;
/// Half-open range the fallback base level is drawn from
pub const FALLBACK_BASE_RANGE: std::ops::Range<u64> = 5..20;
/// Standard deviation of the multiplicative fallback noise
pub const FALLBACK_NOISE_STD_DEV: f64 = 0.2;

/// Which path produced a forecast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    RandomForest,
    Fallback,
}

impl ModelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::RandomForest => "random_forest",
            ModelKind::Fallback => "fallback",
        }
    }
}

/// Forecast for a single day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DailyForecast {
    pub date: NaiveDate,
    pub predicted_sales: u64,
    pub confidence: f64,
    pub model_used: ModelKind,
    pub is_fallback: bool,
}

/// Date-ordered forecasts covering consecutive days
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PredictionResult {
    forecasts: BTreeMap<NaiveDate, DailyForecast>,
}

impl PredictionResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, forecast: DailyForecast) {
        self.forecasts.insert(forecast.date, forecast);
    }

    pub fn len(&self) -> usize {
        self.forecasts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forecasts.is_empty()
    }

    pub fn get(&self, date: &NaiveDate) -> Option<&DailyForecast> {
        self.forecasts.get(date)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DailyForecast> {
        self.forecasts.values()
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.forecasts.keys().copied()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.forecasts.keys().next().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.forecasts.keys().next_back().copied()
    }

    /// True when every entry came from the fallback heuristic
    pub fn is_fallback(&self) -> bool {
        !self.is_empty() && self.iter().all(|f| f.is_fallback)
    }

    pub fn into_inner(self) -> BTreeMap<NaiveDate, DailyForecast> {
        self.forecasts
    }
}

impl<'a> IntoIterator for &'a PredictionResult {
    type Item = (&'a NaiveDate, &'a DailyForecast);
    type IntoIter = std::collections::btree_map::Iter<'a, NaiveDate, DailyForecast>;

    fn into_iter(self) -> Self::IntoIter {
        self.forecasts.iter()
    }
}

/// Why the model path could not produce a forecast
#[derive(Debug, Error, PartialEq)]
pub enum ForecastFailure {
    #[error("insufficient history: {records} records, at least {required} required")]
    InsufficientHistory { records: usize, required: usize },

    #[error("insufficient history: {rows} valid feature rows, at least {required} required")]
    InsufficientFeatureRows { rows: usize, required: usize },

    #[error("malformed record at position {index}: {reason}")]
    MalformedRecord { index: usize, reason: String },

    #[error("model fitting failed: {0}")]
    FittingFailure(#[from] ForestError),
}

impl ForecastFailure {
    /// Stable label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            ForecastFailure::InsufficientHistory { .. }
            | ForecastFailure::InsufficientFeatureRows { .. } => "insufficient_history",
            ForecastFailure::MalformedRecord { .. } => "malformed_record",
            ForecastFailure::FittingFailure(_) => "fitting_failure",
        }
    }
}

/// Result of attempting the model path
#[derive(Debug, PartialEq)]
pub enum ModelOutcome {
    Success(PredictionResult),
    Failure(ForecastFailure),
}

impl ModelOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ModelOutcome::Success(_))
    }
}

impl From<Result<PredictionResult, ForecastFailure>> for ModelOutcome {
    fn from(result: Result<PredictionResult, ForecastFailure>) -> Self {
        match result {
            Ok(predictions) => ModelOutcome::Success(predictions),
            Err(failure) => ModelOutcome::Failure(failure),
        }
    }
}

/// A finished forecast, with the reason when it came from the fallback path
#[derive(Debug)]
pub struct ForecastReport {
    pub predictions: PredictionResult,
    pub fallback_reason: Option<ForecastFailure>,
}

impl ForecastReport {
    pub fn model_kind(&self) -> ModelKind {
        if self.fallback_reason.is_some() {
            ModelKind::Fallback
        } else {
            ModelKind::RandomForest
        }
    }
}

/// Forecaster configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastConfig {
    /// Raw records required before the model path is attempted
    pub min_history_records: usize,
    /// Valid feature rows required to fit the model
    pub min_feature_rows: usize,
    pub forest: RandomForestConfig,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            min_history_records: 7,
            min_feature_rows: 14,
            forest: RandomForestConfig::default(),
        }
    }
}

/// Per-product sales forecaster
#[derive(Debug, Clone, Default)]
pub struct Forecaster {
    config: ForecastConfig,
}

impl Forecaster {
    pub fn new(config: ForecastConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    /// Forecast `period_days` days from a typed history.
    ///
    /// Never fails: short histories and model-path failures produce a
    /// fallback forecast anchored at `today`.
    pub fn forecast<R: Rng + ?Sized>(
        &self,
        history: &[HistoricalRecord],
        period_days: u32,
        today: NaiveDate,
        rng: &mut R,
    ) -> ForecastReport {
        if history.len() < self.config.min_history_records {
            return self.degrade(
                ForecastFailure::InsufficientHistory {
                    records: history.len(),
                    required: self.config.min_history_records,
                },
                period_days,
                today,
                rng,
            );
        }

        match self.model_forecast(history, period_days) {
            ModelOutcome::Success(predictions) => ForecastReport {
                predictions,
                fallback_reason: None,
            },
            ModelOutcome::Failure(failure) => self.degrade(failure, period_days, today, rng),
        }
    }

    /// Forecast from caller-supplied JSON records.
    ///
    /// The record count is checked before parsing, so a short history falls
    /// back even if it is also malformed.
    pub fn forecast_raw<R: Rng + ?Sized>(
        &self,
        raw: &[Value],
        period_days: u32,
        today: NaiveDate,
        rng: &mut R,
    ) -> ForecastReport {
        if raw.len() < self.config.min_history_records {
            return self.degrade(
                ForecastFailure::InsufficientHistory {
                    records: raw.len(),
                    required: self.config.min_history_records,
                },
                period_days,
                today,
                rng,
            );
        }

        match features::parse_history(raw) {
            Ok(history) => self.forecast(&history, period_days, today, rng),
            Err(failure) => self.degrade(failure, period_days, today, rng),
        }
    }

    /// Attempt the model path only.
    pub fn model_forecast(&self, history: &[HistoricalRecord], period_days: u32) -> ModelOutcome {
        self.try_model_forecast(history, period_days).into()
    }

    fn try_model_forecast(
        &self,
        history: &[HistoricalRecord],
        period_days: u32,
    ) -> Result<PredictionResult, ForecastFailure> {
        let mut sorted = history.to_vec();
        features::sort_history(&mut sorted);

        let rows = features::derive_features(&sorted);
        if rows.len() < self.config.min_feature_rows {
            return Err(ForecastFailure::InsufficientFeatureRows {
                rows: rows.len(),
                required: self.config.min_feature_rows,
            });
        }

        let x: Vec<Vec<f64>> = rows.iter().map(|row| row.to_vector().to_vec()).collect();
        let y: Vec<f64> = rows.iter().map(|row| row.quantity).collect();

        let mut model = RandomForestRegressor::new(self.config.forest.clone());
        model.fit(&x, &y)?;

        let score = model.score(&x, &y)?;
        let confidence = model_confidence(score);

        let tail = TailStatistics::from_rows(&rows).ok_or(ForestError::EmptyTrainingSet)?;
        let last_date = rows
            .last()
            .map(|row| row.date)
            .ok_or(ForestError::EmptyTrainingSet)?;

        let mut predictions = PredictionResult::new();
        for offset in 1..=u64::from(period_days) {
            let date = last_date.checked_add_days(Days::new(offset)).ok_or_else(|| {
                ForecastFailure::MalformedRecord {
                    index: sorted.len() - 1,
                    reason: format!("forecast horizon past {last_date} is out of range"),
                }
            })?;

            let predicted = model.predict_one(&tail.features_for(date))?;
            predictions.insert(DailyForecast {
                date,
                predicted_sales: clamp_to_units(predicted),
                confidence,
                model_used: ModelKind::RandomForest,
                is_fallback: false,
            });
        }

        Ok(predictions)
    }

    /// Randomised forecast used when the model path is unavailable.
    pub fn fallback_forecast<R: Rng + ?Sized>(
        &self,
        period_days: u32,
        today: NaiveDate,
        rng: &mut R,
    ) -> PredictionResult {
        let base = rng.gen_range(FALLBACK_BASE_RANGE) as f64;
        let mut predictions = PredictionResult::new();

        for offset in 1..=u64::from(period_days) {
            let Some(date) = today.checked_add_days(Days::new(offset)) else {
                break;
            };
            let noise: f64 = StandardNormal.sample(rng);
            let predicted = base * (1.0 + noise * FALLBACK_NOISE_STD_DEV);

            predictions.insert(DailyForecast {
                date,
                predicted_sales: clamp_to_units(predicted),
                confidence: FALLBACK_CONFIDENCE,
                model_used: ModelKind::Fallback,
                is_fallback: true,
            });
        }

        predictions
    }

    fn degrade<R: Rng + ?Sized>(
        &self,
        failure: ForecastFailure,
        period_days: u32,
        today: NaiveDate,
        rng: &mut R,
    ) -> ForecastReport {
        ForecastReport {
            predictions: self.fallback_forecast(period_days, today, rng),
            fallback_reason: Some(failure),
        }
    }
}

/// In-sample R² as a confidence: capped at the model ceiling, floored at zero.
fn model_confidence(score: f64) -> f64 {
    if score.is_finite() {
        score.clamp(0.0, MODEL_CONFIDENCE_CAP)
    } else {
        0.0
    }
}

/// Clamp at zero and round half away from zero to whole units.
fn clamp_to_units(value: f64) -> u64 {
    if value.is_finite() {
        value.max(0.0).round() as u64
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rand::{rngs::StdRng, SeedableRng};
    use rstest::rstest;
    use serde_json::json;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn daily(start: NaiveDate, quantities: impl IntoIterator<Item = u64>) -> Vec<HistoricalRecord> {
        quantities
            .into_iter()
            .enumerate()
            .map(|(i, q)| HistoricalRecord::new(start + Days::new(i as u64), q))
            .collect()
    }

    fn quick_forecaster() -> Forecaster {
        Forecaster::new(ForecastConfig {
            forest: RandomForestConfig {
                n_estimators: 20,
                ..Default::default()
            },
            ..Default::default()
        })
    }

    fn today() -> NaiveDate {
        day(2024, 6, 1)
    }

    fn assert_consecutive(result: &PredictionResult, first: NaiveDate, len: u32) {
        assert_eq!(result.len(), len as usize);
        let expected: Vec<NaiveDate> = (1..=u64::from(len))
            .map(|i| first.checked_add_days(Days::new(i - 1)).unwrap())
            .collect();
        assert_eq!(result.dates().collect::<Vec<_>>(), expected);
    }

    #[test]
    fn constant_history_takes_the_model_path() {
        let history = daily(day(2024, 3, 1), std::iter::repeat(9).take(21));
        let forecaster = quick_forecaster();
        let mut rng = StdRng::seed_from_u64(1);

        let report = forecaster.forecast(&history, 10, today(), &mut rng);

        assert!(report.fallback_reason.is_none());
        assert_eq!(report.model_kind(), ModelKind::RandomForest);
        assert_consecutive(&report.predictions, day(2024, 3, 22), 10);
        for forecast in report.predictions.iter() {
            assert_eq!(forecast.predicted_sales, 9);
            assert_eq!(forecast.confidence, MODEL_CONFIDENCE_CAP);
            assert_eq!(forecast.model_used, ModelKind::RandomForest);
            assert!(!forecast.is_fallback);
        }
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(6)]
    fn short_histories_fall_back(#[case] records: usize) {
        let history = daily(day(2024, 3, 1), std::iter::repeat(4).take(records));
        let mut rng = StdRng::seed_from_u64(7);

        let report = quick_forecaster().forecast(&history, 5, today(), &mut rng);

        assert_matches!(
            report.fallback_reason,
            Some(ForecastFailure::InsufficientHistory { required: 7, .. })
        );
        assert!(report.predictions.is_fallback());
        assert_consecutive(&report.predictions, day(2024, 6, 2), 5);
    }

    #[test]
    fn too_few_feature_rows_fall_back() {
        // 20 records leave 13 valid rows
        let history = daily(day(2024, 3, 1), 1..=20);
        let mut rng = StdRng::seed_from_u64(7);

        let report = quick_forecaster().forecast(&history, 3, today(), &mut rng);

        assert_eq!(
            report.fallback_reason,
            Some(ForecastFailure::InsufficientFeatureRows {
                rows: 13,
                required: 14
            })
        );
        assert_consecutive(&report.predictions, day(2024, 6, 2), 3);
    }

    #[test]
    fn model_outcome_is_an_explicit_branch() {
        let forecaster = quick_forecaster();
        let short = daily(day(2024, 3, 1), 1..=10);
        assert_matches!(
            forecaster.model_forecast(&short, 3),
            ModelOutcome::Failure(ForecastFailure::InsufficientFeatureRows { rows: 3, .. })
        );

        let enough = daily(day(2024, 3, 1), (0..30).map(|i| 10 + i % 4));
        let outcome = forecaster.model_forecast(&enough, 3);
        assert!(outcome.is_success());
    }

    #[test]
    fn unsorted_history_is_sorted_before_fitting() {
        let mut history = daily(day(2024, 1, 1), std::iter::repeat(5).take(21));
        history.reverse();

        let outcome = quick_forecaster().model_forecast(&history, 2);
        let ModelOutcome::Success(predictions) = outcome else {
            panic!("expected model forecast");
        };
        assert_eq!(predictions.first_date(), Some(day(2024, 1, 22)));
        assert_eq!(predictions.last_date(), Some(day(2024, 1, 23)));
    }

    #[test]
    fn model_confidence_never_exceeds_cap_or_drops_below_zero() {
        let noisy = daily(
            day(2024, 1, 1),
            (0..60u64).map(|i| (i * 7919 % 23) + if i % 7 == 5 { 30 } else { 0 }),
        );
        let ModelOutcome::Success(predictions) = quick_forecaster().model_forecast(&noisy, 14)
        else {
            panic!("expected model forecast");
        };

        for forecast in predictions.iter() {
            assert!(forecast.confidence <= MODEL_CONFIDENCE_CAP);
            assert!(forecast.confidence >= 0.0);
        }
    }

    #[rstest]
    #[case(-0.4, 0.0)]
    #[case(f64::NAN, 0.0)]
    #[case(f64::NEG_INFINITY, 0.0)]
    #[case(0.0, 0.0)]
    #[case(0.5, 0.5)]
    #[case(0.95, 0.95)]
    #[case(0.99, 0.95)]
    fn confidence_is_floored_and_capped(#[case] score: f64, #[case] expected: f64) {
        assert_eq!(model_confidence(score), expected);
    }

    #[test]
    fn empty_fallback_horizon_is_still_labelled_fallback() {
        let mut rng = StdRng::seed_from_u64(7);
        let report = quick_forecaster().forecast(&[], 0, today(), &mut rng);

        assert!(report.predictions.is_empty());
        assert_matches!(
            report.fallback_reason,
            Some(ForecastFailure::InsufficientHistory { records: 0, .. })
        );
        assert_eq!(report.model_kind(), ModelKind::Fallback);
    }

    #[test]
    fn confidence_is_shared_across_the_horizon() {
        let history = daily(day(2024, 1, 1), (0..40).map(|i| 20 + (i % 7) * 3));
        let ModelOutcome::Success(predictions) = quick_forecaster().model_forecast(&history, 3)
        else {
            panic!("expected model forecast");
        };
        let confidences: Vec<f64> = predictions.iter().map(|f| f.confidence).collect();
        assert!(confidences.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn fallback_respects_bounds() {
        let forecaster = quick_forecaster();
        let mut rng = StdRng::seed_from_u64(99);
        let predictions = forecaster.fallback_forecast(30, today(), &mut rng);

        assert_consecutive(&predictions, day(2024, 6, 2), 30);
        for forecast in predictions.iter() {
            assert_eq!(forecast.confidence, FALLBACK_CONFIDENCE);
            assert_eq!(forecast.model_used, ModelKind::Fallback);
            assert!(forecast.is_fallback);
        }
    }

    #[test]
    fn fixed_seed_makes_fallback_reproducible() {
        let forecaster = quick_forecaster();
        let a = forecaster.fallback_forecast(12, today(), &mut StdRng::seed_from_u64(5));
        let b = forecaster.fallback_forecast(12, today(), &mut StdRng::seed_from_u64(5));
        assert_eq!(a, b);
    }

    #[test]
    fn model_path_is_deterministic() {
        let history = daily(day(2024, 1, 1), (0..35).map(|i| 3 + (i * 5) % 11));
        let forecaster = quick_forecaster();
        let a = forecaster.forecast(&history, 7, today(), &mut StdRng::seed_from_u64(1));
        let b = forecaster.forecast(&history, 7, today(), &mut StdRng::seed_from_u64(2));
        assert_eq!(a.predictions, b.predictions);
    }

    #[test]
    fn malformed_raw_records_fall_back() {
        let mut raw: Vec<Value> = (1..=21)
            .map(|d| json!({"date": format!("2024-01-{d:02}"), "quantity": 5}))
            .collect();
        raw[4] = json!({"date": "not-a-date", "quantity": 5});

        let report =
            quick_forecaster().forecast_raw(&raw, 4, today(), &mut StdRng::seed_from_u64(3));

        assert_matches!(
            report.fallback_reason,
            Some(ForecastFailure::MalformedRecord { index: 4, .. })
        );
        assert_eq!(report.model_kind(), ModelKind::Fallback);
        assert_consecutive(&report.predictions, day(2024, 6, 2), 4);
    }

    #[test]
    fn well_formed_raw_records_use_the_model() {
        let raw: Vec<Value> = (1..=21)
            .map(|d| json!({"date": format!("2024-01-{d:02}"), "quantity": 8}))
            .collect();

        let report =
            quick_forecaster().forecast_raw(&raw, 2, today(), &mut StdRng::seed_from_u64(3));

        assert!(report.fallback_reason.is_none());
        assert_consecutive(&report.predictions, day(2024, 1, 22), 2);
        assert!(report.predictions.iter().all(|f| f.predicted_sales == 8));
    }

    #[test]
    fn fitting_errors_fall_back() {
        let forecaster = Forecaster::new(ForecastConfig {
            forest: RandomForestConfig {
                n_estimators: 0,
                ..Default::default()
            },
            ..Default::default()
        });
        let history = daily(day(2024, 1, 1), std::iter::repeat(3).take(21));

        let report = forecaster.forecast(&history, 2, today(), &mut StdRng::seed_from_u64(3));

        assert_matches!(
            report.fallback_reason,
            Some(ForecastFailure::FittingFailure(ForestError::InvalidParameter(_)))
        );
        assert_eq!(report.fallback_reason.as_ref().map(|f| f.kind()), Some("fitting_failure"));
    }

    #[test]
    fn zero_day_horizon_is_empty() {
        let mut rng = StdRng::seed_from_u64(3);
        let report = quick_forecaster().forecast(&[], 0, today(), &mut rng);
        assert!(report.predictions.is_empty());
    }

    #[test]
    fn serializes_as_date_keyed_map() {
        let mut result = PredictionResult::new();
        result.insert(DailyForecast {
            date: day(2024, 6, 2),
            predicted_sales: 11,
            confidence: 0.7,
            model_used: ModelKind::Fallback,
            is_fallback: true,
        });

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["2024-06-02"]["predicted_sales"], 11);
        assert_eq!(value["2024-06-02"]["model_used"], "fallback");

        let back: PredictionResult = serde_json::from_value(value).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn clamps_negative_and_non_finite_predictions() {
        assert_eq!(clamp_to_units(-3.2), 0);
        assert_eq!(clamp_to_units(2.5), 3);
        assert_eq!(clamp_to_units(2.49), 2);
        assert_eq!(clamp_to_units(f64::NAN), 0);
    }
}
