/*!
 * # Machine Learning Module
 *
 * Forecasting, recommendation and segmentation capabilities for the
 * ShopIntelli AI service.
 *
 * Only forecasting does real work: each request fits a fresh random forest
 * per product. Recommendations and segments are static sample data.
 */

/// Lag/rolling feature derivation from daily sales history
pub mod features;

/// Per-product sales forecaster with model and fallback paths
pub mod forecasting;

/// Seeded random forest regressor
pub mod random_forest;

/// Product recommendations (sample data)
pub mod recommendations;

/// Customer segments (sample data)
pub mod segmentation;

pub use features::HistoricalRecord;
pub use forecasting::{
    DailyForecast, ForecastConfig, ForecastFailure, ForecastReport, Forecaster, ModelKind,
    ModelOutcome, PredictionResult,
};
pub use random_forest::{RandomForestConfig, RandomForestRegressor};
