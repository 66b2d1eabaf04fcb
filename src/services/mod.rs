// Analytics services
pub mod forecasting;

pub use forecasting::ForecastingService;
