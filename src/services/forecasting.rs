use chrono::{DateTime, NaiveDate, Utc};
use metrics::{counter, histogram};
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use slog::{o, Logger};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::instrument;
use utoipa::ToSchema;

use crate::cache::CacheBackend;
use crate::config::CacheConfig;
use crate::errors::ServiceError;
use crate::ml::{ForecastReport, Forecaster, PredictionResult};

/// Raw per-product histories keyed by the product id's decimal string.
pub type HistoricalData = HashMap<String, Vec<Value>>;

/// Forecasts for a batch of products, as returned and cached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PredictionBatch {
    pub success: bool,
    /// product id -> date -> daily forecast
    #[schema(value_type = Object)]
    pub predictions: BTreeMap<i64, PredictionResult>,
    pub generated_at: DateTime<Utc>,
    pub period_days: u32,
}

/// Cache key of the batch generated on `date`
pub fn cache_key(prefix: &str, date: NaiveDate) -> String {
    format!("{}:{}", prefix, date.format("%Y%m%d"))
}

/// Runs the forecaster over request batches and caches the result.
#[derive(Clone)]
pub struct ForecastingService {
    forecaster: Arc<Forecaster>,
    cache: Arc<dyn CacheBackend>,
    cache_ttl: Duration,
    key_prefix: String,
    fallback_seed: Option<u64>,
    logger: Logger,
}

impl ForecastingService {
    pub fn new(
        forecaster: Arc<Forecaster>,
        cache: Arc<dyn CacheBackend>,
        cache_config: &CacheConfig,
        fallback_seed: Option<u64>,
        logger: Logger,
    ) -> Self {
        Self {
            forecaster,
            cache,
            cache_ttl: cache_config.ttl(),
            key_prefix: cache_config.key_prefix.clone(),
            fallback_seed,
            logger: logger.new(o!("component" => "forecasting")),
        }
    }

    /// Forecast every requested product and cache the batch under today's key.
    ///
    /// Products absent from `historical_data` are forecast from an empty
    /// history. Forecasting itself never fails; only the cache write can.
    #[instrument(skip(self, product_ids, historical_data), fields(products = product_ids.len()))]
    pub async fn predict_sales(
        &self,
        product_ids: Vec<i64>,
        period_days: u32,
        historical_data: HistoricalData,
    ) -> Result<PredictionBatch, ServiceError> {
        slog::info!(
            self.logger,
            "Generating sales predictions";
            "products" => product_ids.len(),
            "period_days" => period_days,
        );

        let started = Instant::now();
        let generated_at = Utc::now();
        let today = generated_at.date_naive();
        let forecaster = Arc::clone(&self.forecaster);
        let seed = self.fallback_seed;

        let reports = tokio::task::spawn_blocking(move || {
            let mut rng = match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            product_ids
                .into_iter()
                .map(|product_id| {
                    let history = historical_data
                        .get(&product_id.to_string())
                        .map(Vec::as_slice)
                        .unwrap_or(&[]);
                    let report = forecaster.forecast_raw(history, period_days, today, &mut rng);
                    (product_id, report)
                })
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|e| ServiceError::PredictionFailed(e.to_string()))?;

        let mut predictions = BTreeMap::new();
        for (product_id, report) in reports {
            self.record_outcome(product_id, &report, today);
            predictions.insert(product_id, report.predictions);
        }

        let batch = PredictionBatch {
            success: true,
            predictions,
            generated_at,
            period_days,
        };

        self.store(&batch, today).await?;
        histogram!(
            "forecast.batch.duration_seconds",
            started.elapsed().as_secs_f64()
        );

        Ok(batch)
    }

    /// The batch cached for `date`, if any
    #[instrument(skip(self))]
    pub async fn cached_predictions(
        &self,
        date: NaiveDate,
    ) -> Result<Option<PredictionBatch>, ServiceError> {
        let key = cache_key(&self.key_prefix, date);
        match self.cache.get(&key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn store(&self, batch: &PredictionBatch, date: NaiveDate) -> Result<(), ServiceError> {
        let key = cache_key(&self.key_prefix, date);
        let payload = serde_json::to_string(batch)?;
        self.cache
            .set(&key, &payload, Some(self.cache_ttl))
            .await
            .map_err(|e| {
                slog::error!(self.logger, "Failed to cache predictions"; "key" => &key, "error" => e.to_string());
                ServiceError::from(e)
            })
    }

    fn record_outcome(&self, product_id: i64, report: &ForecastReport, today: NaiveDate) {
        match &report.fallback_reason {
            Some(reason) => {
                counter!("forecast.products", 1, "path" => "fallback");
                slog::warn!(
                    self.logger,
                    "Using fallback forecast";
                    "product_id" => product_id,
                    "kind" => reason.kind(),
                    "reason" => reason.to_string(),
                );
            }
            None => {
                counter!("forecast.products", 1, "path" => "model");
                // Model dates continue from the last observation, not from today.
                if let Some(first) = report.predictions.first_date() {
                    if starts_before_today(first, today) {
                        slog::warn!(
                            self.logger,
                            "Forecast starts before today; history is stale";
                            "product_id" => product_id,
                            "first_date" => first.to_string(),
                        );
                    }
                }
            }
        }
    }
}

/// History ending yesterday or later yields a forecast starting no earlier than today.
fn starts_before_today(first_forecast: NaiveDate, today: NaiveDate) -> bool {
    first_forecast < today
}
