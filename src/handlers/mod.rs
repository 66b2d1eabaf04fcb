//! HTTP handlers for the forecasting, recommendation and segmentation endpoints.

pub mod predictions;
pub mod recommendations;
pub mod segmentation;

use axum::{
    routing::{get, post},
    Router,
};

use crate::AppState;

/// Routes for the analytics endpoints
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/predict/sales", post(predictions::predict_sales))
        .route("/predict/sales/cached", get(predictions::cached_predictions))
        .route(
            "/recommendations/products",
            get(recommendations::product_recommendations),
        )
        .route(
            "/segmentation/customers",
            get(segmentation::customer_segments),
        )
}
