use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::ml::segmentation::{generate_customer_segments, CustomerSegment};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SegmentationResponse {
    pub success: bool,
    pub segments: Vec<CustomerSegment>,
    pub generated_at: DateTime<Utc>,
}

/// Customer segments
#[utoipa::path(
    get,
    path = "/segmentation/customers",
    tag = "Segmentation",
    responses(
        (status = 200, description = "Customer segments", body = SegmentationResponse),
    )
)]
pub async fn customer_segments() -> Json<SegmentationResponse> {
    Json(SegmentationResponse {
        success: true,
        segments: generate_customer_segments(),
        generated_at: Utc::now(),
    })
}
