#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{HeaderMap, Method, Request, StatusCode},
    Router,
};
use chrono::NaiveDate;
use serde_json::{json, Value};
use shopintelli_ai::{
    app_router,
    cache::{CacheBackend, CacheError, InMemoryCache},
    config::{AppConfig, CacheConfig, ForecastSettings},
    logging::discard_logger,
    AppState,
};
use tower::ServiceExt;

/// Fallback seed used by every test application
pub const TEST_FALLBACK_SEED: u64 = 11;

/// Cache backend whose every operation fails, standing in for an unreachable Redis.
pub struct UnavailableCache;

fn refused() -> CacheError {
    CacheError::OperationFailed("connection refused".into())
}

#[async_trait::async_trait]
impl CacheBackend for UnavailableCache {
    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Err(refused())
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Option<Duration>) -> Result<(), CacheError> {
        Err(refused())
    }

    async fn delete(&self, _key: &str) -> Result<(), CacheError> {
        Err(refused())
    }

    async fn exists(&self, _key: &str) -> Result<bool, CacheError> {
        Err(refused())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Err(refused())
    }

    fn backend_name(&self) -> &'static str {
        "unavailable"
    }
}

/// Decoded response of a test request
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

/// Helper harness wrapping the full application router over a test cache.
pub struct TestApp {
    router: Router,
    pub state: AppState,
}

impl TestApp {
    /// Application backed by a fresh in-memory cache
    pub fn new() -> Self {
        Self::with_cache(Arc::new(InMemoryCache::new()))
    }

    pub fn with_cache(cache: Arc<dyn CacheBackend>) -> Self {
        let config = AppConfig {
            cache: CacheConfig {
                backend: "in-memory".to_string(),
                ..CacheConfig::default()
            },
            forecast: ForecastSettings {
                fallback_seed: Some(TEST_FALLBACK_SEED),
                ..ForecastSettings::default()
            },
            ..AppConfig::default()
        };
        let state = AppState::new(config, cache, discard_logger());
        let router = app_router(state.clone(), discard_logger());
        Self { router, state }
    }

    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> TestResponse {
        self.request_with_headers(method, uri, body, &[]).await
    }

    pub async fn request_with_headers(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
            }
            None => Body::empty(),
        };

        let request = builder.body(body).expect("failed to build request");
        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request");

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("failed to read response body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };

        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> TestResponse {
        self.request(Method::POST, uri, Some(body)).await
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        self.request(Method::GET, uri, None).await
    }
}

/// `days` consecutive daily records starting at `start`, all with `quantity`
pub fn constant_history(start: NaiveDate, days: usize, quantity: u64) -> Vec<Value> {
    (0..days)
        .map(|i| {
            let date = start + chrono::Duration::days(i as i64);
            json!({"date": date.format("%Y-%m-%d").to_string(), "quantity": quantity})
        })
        .collect()
}

/// Weekly-seasonal daily records starting at `start`
pub fn seasonal_history(start: NaiveDate, days: usize) -> Vec<Value> {
    const WEEK: [u64; 7] = [8, 10, 12, 15, 20, 25, 18];
    (0..days)
        .map(|i| {
            let date = start + chrono::Duration::days(i as i64);
            json!({"date": date.format("%Y-%m-%d").to_string(), "quantity": WEEK[i % 7]})
        })
        .collect()
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}
