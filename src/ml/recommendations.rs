//! Product recommendations.
//!
//! Recommendations are a fixed sample set until sales-pattern analysis is
//! wired in; every call returns the same list.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Product recommendation structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProductRecommendation {
    pub product_id: i64,
    pub name: String,
    pub reason: String,
    pub confidence: f64,
    /// Expected relative revenue uplift, 0.15 = +15%
    pub expected_revenue_increase: f64,
}

impl ProductRecommendation {
    fn sample(
        product_id: i64,
        name: &str,
        reason: &str,
        confidence: f64,
        expected_revenue_increase: f64,
    ) -> Self {
        Self {
            product_id,
            name: name.to_string(),
            reason: reason.to_string(),
            confidence,
            expected_revenue_increase,
        }
    }
}

/// Generate product recommendations
pub fn generate_product_recommendations() -> Vec<ProductRecommendation> {
    vec![
        ProductRecommendation::sample(
            1,
            "High-Performance Laptop",
            "High revenue and growing demand",
            0.85,
            0.15,
        ),
        ProductRecommendation::sample(
            2,
            "Wireless Headphones",
            "Frequently bought together with laptops",
            0.78,
            0.12,
        ),
        ProductRecommendation::sample(
            3,
            "Ergonomic Office Chair",
            "Seasonal demand increase detected",
            0.72,
            0.08,
        ),
    ]
}
