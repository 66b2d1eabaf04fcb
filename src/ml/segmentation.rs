//! Customer segmentation.
//!
//! Segments are static sample clusters; no clustering runs per request.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CustomerSegment {
    pub segment_id: i64,
    pub segment_name: String,
    /// Number of customers in the segment
    pub size: u64,
    pub average_order_value: f64,
    pub purchase_frequency: String,
    pub characteristics: Vec<String>,
}

fn segment(
    segment_id: i64,
    segment_name: &str,
    size: u64,
    average_order_value: f64,
    purchase_frequency: &str,
    characteristics: [&str; 3],
) -> CustomerSegment {
    CustomerSegment {
        segment_id,
        segment_name: segment_name.to_string(),
        size,
        average_order_value,
        purchase_frequency: purchase_frequency.to_string(),
        characteristics: characteristics.iter().map(|c| c.to_string()).collect(),
    }
}

pub fn generate_customer_segments() -> Vec<CustomerSegment> {
    vec![
        segment(
            1,
            "High-Value Customers",
            150,
            450.00,
            "Weekly",
            ["High spending", "Brand loyal", "Responds to promotions"],
        ),
        segment(
            2,
            "Bargain Hunters",
            420,
            85.00,
            "Monthly",
            ["Price sensitive", "Buys on discount", "High cart abandonment"],
        ),
        segment(
            3,
            "New Customers",
            230,
            120.00,
            "One-time",
            ["First-time buyers", "Need engagement", "High potential"],
        ),
    ]
}
