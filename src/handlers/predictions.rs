use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use utoipa::ToSchema;
use validator::Validate;

use crate::errors::ServiceError;
use crate::services::forecasting::PredictionBatch;
use crate::AppState;

/// Forecast request for a batch of products
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[schema(example = json!({
    "product_ids": [1, 2],
    "period_days": 7,
    "historical_data": {
        "1": [{"date": "2024-01-01", "quantity": 12}, {"date": "2024-01-02", "quantity": 9}]
    }
}))]
pub struct PredictionRequest {
    pub product_ids: Vec<i64>,

    /// Number of days to forecast
    #[validate(range(min = 1, max = 365))]
    pub period_days: u32,

    /// Daily sales per product, keyed by product id. Each record is
    /// `{"date": "YYYY-MM-DD", "quantity": n}`; malformed records send
    /// that product to the fallback forecast.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub historical_data: HashMap<String, Vec<Value>>,
}

/// Forecast sales for each requested product
#[utoipa::path(
    post,
    path = "/predict/sales",
    tag = "Predictions",
    request_body = PredictionRequest,
    responses(
        (status = 200, description = "Forecasts generated and cached", body = PredictionBatch,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 500, description = "Prediction failed", body = crate::errors::ErrorResponse),
    )
)]
pub async fn predict_sales(
    State(state): State<AppState>,
    payload: Result<Json<PredictionRequest>, JsonRejection>,
) -> Result<Json<PredictionBatch>, ServiceError> {
    let Json(request) = payload.map_err(|rejection| ServiceError::BadRequest(rejection.body_text()))?;
    request.validate()?;

    tracing::info!(
        products = request.product_ids.len(),
        period_days = request.period_days,
        "Generating sales predictions"
    );

    let batch = state
        .forecasting
        .predict_sales(
            request.product_ids,
            request.period_days,
            request.historical_data,
        )
        .await?;

    Ok(Json(batch))
}

/// Today's cached forecast batch
#[utoipa::path(
    get,
    path = "/predict/sales/cached",
    tag = "Predictions",
    responses(
        (status = 200, description = "Cached batch for today", body = PredictionBatch),
        (status = 404, description = "Nothing cached today", body = crate::errors::ErrorResponse),
        (status = 500, description = "Cache unavailable", body = crate::errors::ErrorResponse),
    )
)]
pub async fn cached_predictions(
    State(state): State<AppState>,
) -> Result<Json<PredictionBatch>, ServiceError> {
    let today = Utc::now().date_naive();
    state
        .forecasting
        .cached_predictions(today)
        .await?
        .map(Json)
        .ok_or_else(|| ServiceError::NotFound(format!("no cached predictions for {today}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn period_days_bounds_are_validated() {
        let mut request: PredictionRequest = serde_json::from_value(json!({
            "product_ids": [1],
            "period_days": 0,
        }))
        .unwrap();
        assert!(request.validate().is_err());

        request.period_days = 365;
        assert!(request.validate().is_ok());

        request.period_days = 366;
        assert!(request.validate().is_err());
    }

    #[test]
    fn historical_data_defaults_to_empty() {
        let request: PredictionRequest =
            serde_json::from_value(json!({"product_ids": [], "period_days": 3})).unwrap();
        assert!(request.historical_data.is_empty());
    }
}
