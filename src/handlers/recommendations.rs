use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::ml::recommendations::{generate_product_recommendations, ProductRecommendation};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RecommendationsResponse {
    pub success: bool,
    pub recommendations: Vec<ProductRecommendation>,
    pub generated_at: DateTime<Utc>,
}

/// Product recommendations
#[utoipa::path(
    get,
    path = "/recommendations/products",
    tag = "Recommendations",
    responses(
        (status = 200, description = "Recommended products", body = RecommendationsResponse),
    )
)]
pub async fn product_recommendations() -> Json<RecommendationsResponse> {
    Json(RecommendationsResponse {
        success: true,
        recommendations: generate_product_recommendations(),
        generated_at: Utc::now(),
    })
}
