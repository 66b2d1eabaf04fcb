//! ShopIntelli AI service library
//!
//! Sales forecasting, product recommendations and customer segmentation
//! served over HTTP.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod cache;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod health;
pub mod logging;
pub mod middleware_helpers;
pub mod ml;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::Router;
use slog::Logger;
use std::sync::Arc;
use tower_http::timeout::TimeoutLayer;

use crate::cache::CacheBackend;
use crate::config::AppConfig;
use crate::ml::Forecaster;
use crate::services::forecasting::ForecastingService;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub cache: Arc<dyn CacheBackend>,
    pub forecasting: ForecastingService,
}

impl AppState {
    /// Wire the forecasting service from configuration
    pub fn new(config: AppConfig, cache: Arc<dyn CacheBackend>, logger: Logger) -> Self {
        let forecaster = Arc::new(Forecaster::new(config.forecast.forecast_config()));
        let forecasting = ForecastingService::new(
            forecaster,
            Arc::clone(&cache),
            &config.cache,
            config.forecast.fallback_seed,
            logger,
        );
        Self {
            config: Arc::new(config),
            cache,
            forecasting,
        }
    }
}

/// Full application router with tracing, timeout, access log and request ids.
///
/// CORS and compression are left to the binary.
pub fn app_router(state: AppState, logger: Logger) -> Router {
    let logging_state = Arc::new(logging::LoggingState::new(logger));
    let timeout = state.config.request_timeout();

    Router::new()
        .merge(health::health_routes())
        .merge(handlers::api_routes())
        .with_state(state)
        .merge(openapi::swagger_ui())
        .layer(tracing::configure_http_tracing())
        .layer(TimeoutLayer::new(timeout))
        .layer(axum::middleware::from_fn_with_state(
            logging_state,
            logging::logging_middleware,
        ))
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id_middleware,
        ))
}
