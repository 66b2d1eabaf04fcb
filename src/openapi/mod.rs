use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "ShopIntelli AI Service",
        version = "1.0.0",
        description = r#"
# ShopIntelli AI Service

Sales forecasting, product recommendations and customer segmentation for the
ShopIntelli e-commerce platform.

## Forecasting

`POST /predict/sales` fits a random forest per product on the supplied daily
history. Products with fewer than 7 records, too few usable rows, or malformed
records receive a heuristic fallback forecast instead (`is_fallback: true`,
confidence 0.7). The batch is cached for the day and can be re-read from
`GET /predict/sales/cached`.

## Error Handling

Errors share one body format:

```json
{
  "error": "Bad Request",
  "message": "Validation error: period_days: range",
  "request_id": "9b7c...",
  "timestamp": "2024-01-01T00:00:00Z"
}
```
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8001", description = "Local development")
    ),
    tags(
        (name = "Health", description = "Liveness and dependency checks"),
        (name = "Predictions", description = "Per-product sales forecasts"),
        (name = "Recommendations", description = "Product recommendations"),
        (name = "Segmentation", description = "Customer segments"),
    ),
    paths(
        crate::health::root,
        crate::health::health_check,
        crate::handlers::predictions::predict_sales,
        crate::handlers::predictions::cached_predictions,
        crate::handlers::recommendations::product_recommendations,
        crate::handlers::segmentation::customer_segments,
    ),
    components(
        schemas(
            crate::errors::ErrorResponse,
            crate::health::RootResponse,
            crate::health::HealthResponse,
            crate::health::ServiceStatuses,
            crate::handlers::predictions::PredictionRequest,
            crate::services::forecasting::PredictionBatch,
            crate::ml::DailyForecast,
            crate::ml::ModelKind,
            crate::handlers::recommendations::RecommendationsResponse,
            crate::ml::recommendations::ProductRecommendation,
            crate::handlers::segmentation::SegmentationResponse,
            crate::ml::segmentation::CustomerSegment,
        )
    )
)]
pub struct ApiDoc;

/// Swagger UI serving the generated document at `/api-docs/openapi.json`
pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
