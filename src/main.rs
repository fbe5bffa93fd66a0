mod config;
mod http;
mod llm;
mod media;
mod metrics;
mod models;
mod moderation;
mod social;
mod store;
mod validation;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use config::Settings;
use llm::{MistralClient, MistralConfig};
use media::{CloudinaryConfig, MediaUploader};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use models::{AnalyzePostRequest, AnalyzePostResponse, ApiError, ProductInput, ProductRecord};
use serde_json::{Value, json};
use social::InstagramClient;
use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Instant};
use store::{ProductStore, StoreError};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!(target = "catalog.api", "server crashed: {err}");
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenvy::dotenv().ok();
    init_tracing();

    let settings = Settings::from_env()?;
    let mongo = mongodb::Client::with_uri_str(&settings.mongodb_url).await?;
    let uploader = MediaUploader::new(CloudinaryConfig {
        cloud_name: settings.cloudinary_cloud_name.clone(),
        api_key: settings.cloudinary_api_key.clone(),
        api_secret: settings.cloudinary_secret.clone(),
    });
    let store = ProductStore::new(&mongo, &settings.mongodb_db_name, uploader.clone());
    let llm = Arc::new(MistralClient::new(MistralConfig {
        base_url: settings.mistral_base_url.clone(),
        api_key: settings.mistral_api_key.clone(),
    }));
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("prom recorder");

    let state = AppState {
        store,
        uploader,
        llm,
        instagram: InstagramClient::new(),
        media_root: PathBuf::from(&settings.media_dir),
        openapi: Arc::new(load_openapi()),
        prometheus_handle,
    };

    let app = router(state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(8000);
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    info!(target = "catalog.api", "listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

#[derive(Clone)]
struct AppState {
    store: ProductStore,
    uploader: MediaUploader,
    llm: Arc<MistralClient>,
    instagram: InstagramClient,
    media_root: PathBuf,
    openapi: Arc<Value>,
    prometheus_handle: PrometheusHandle,
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/openapi.json", get(openapi_json))
        .route("/docs", get(swagger_ui))
        .route("/api/products", post(create_product).get(list_products))
        .route(
            "/api/products/{id}",
            get(retrieve_product)
                .put(update_product)
                .delete(remove_product),
        )
        .route(
            "/social/analyze-instagram-post/",
            post(analyze_instagram_post),
        )
        .with_state(state)
        .layer(cors_layer_from_env())
        .layer(TraceLayer::new_for_http())
        .layer(axum::extract::DefaultBodyLimit::max(body_limit_from_env()))
}

/// Liveness probe.
///
/// - Method: `GET`
/// - Path: `/`
async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

/// Create a product.
///
/// - Method: `POST`
/// - Path: `/api/products`
/// - Body: product fields; `image` may be an inline data-URI image
///
/// The write is gated by the validation judge and the moderation
/// endpoint before the store is touched. Returns the new id as a JSON
/// string.
async fn create_product(
    State(state): State<AppState>,
    Json(product): Json<ProductInput>,
) -> Result<Json<String>, AppError> {
    metrics::inc_requests("/api/products");
    let fields =
        serde_json::to_value(&product).map_err(|err| AppError::Internal(err.to_string()))?;

    let started = Instant::now();
    let verdict = validation::check_product(&state.llm, &fields).await;
    metrics::upstream_elapsed("validation", started.elapsed().as_millis());
    if !verdict.validated {
        let reason = verdict
            .error
            .unwrap_or_else(|| "Invalid product details.".to_string());
        return Err(AppError::BadRequest(format!(
            "Product validation failed. Reason: {reason}"
        )));
    }

    let started = Instant::now();
    screen_or_warn(&state, &fields, "create").await?;
    metrics::upstream_elapsed("moderation", started.elapsed().as_millis());

    let id = state
        .store
        .create(product)
        .await
        .map_err(|_| AppError::Internal("Failed to add product.".to_string()))?;
    Ok(Json(id))
}

/// List all products. Empty catalog reads as 404.
async fn list_products(
    State(state): State<AppState>,
) -> Result<Json<Vec<ProductRecord>>, AppError> {
    metrics::inc_requests("/api/products");
    let products = state.store.list().await;
    if products.is_empty() {
        return Err(AppError::NotFound("No products found.".to_string()));
    }
    Ok(Json(products))
}

async fn retrieve_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ProductRecord>, AppError> {
    let product = state.store.get(&id).await?;
    Ok(Json(product))
}

/// Full replace of every stored field for the given id.
async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(product): Json<ProductInput>,
) -> Result<Json<ProductRecord>, AppError> {
    state.store.update(&id, &product).await?;
    Ok(Json(ProductRecord { id, product }))
}

/// Delete a product. The response body is the remaining product list,
/// not a confirmation of the deleted item.
async fn remove_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ProductRecord>>, AppError> {
    let remaining = state.store.delete(&id).await?;
    Ok(Json(remaining))
}

/// Analyze an Instagram post.
///
/// - Method: `POST`
/// - Path: `/social/analyze-instagram-post/`
/// - Body: `{"url": "https://www.instagram.com/p/<code>/"}`
///
/// Ingests the post into a request-scoped scratch directory, mirrors its
/// images through the media host, runs the two-call attribute
/// extraction, and moderates the result before returning it.
async fn analyze_instagram_post(
    State(state): State<AppState>,
    Json(payload): Json<AnalyzePostRequest>,
) -> Result<Response, AppError> {
    metrics::inc_requests("/social/analyze-instagram-post/");
    let scratch = state
        .media_root
        .join(uuid::Uuid::new_v4().simple().to_string());

    let ingested = state
        .instagram
        .ingest(&payload.url, &scratch, &state.uploader)
        .await
        .map_err(|err| {
            warn!(target = "catalog.api", error = %err, "instagram_ingest_failed");
            AppError::BadRequest("Could not process Instagram post. Please check the URL.".into())
        })?;

    if ingested.media_urls.is_empty() {
        return Err(AppError::BadRequest(
            "No media URLs found for analysis.".into(),
        ));
    }

    let started = Instant::now();
    let analysis = social::analyze_post(&state.llm, &ingested.media_urls, &ingested.caption)
        .await
        .map_err(|err| {
            warn!(target = "catalog.api", error = %err, "post_analysis_failed");
            AppError::Internal("Failed to analyze image using Mistral API.".into())
        })?;
    metrics::upstream_elapsed("attribute_extraction", started.elapsed().as_millis());

    if analysis
        .description
        .trim()
        .eq_ignore_ascii_case("inappropriate image")
    {
        return Ok(Json(json!({"message": "Inappropriate image"})).into_response());
    }

    let attributes: Value = match analysis.attributes.first_content() {
        Some(content) => serde_json::from_str(content)
            .map_err(|_| AppError::Internal("Failed to parse attributes content.".into()))?,
        None => json!({}),
    };

    screen_or_warn(&state, &attributes, "analyze").await?;

    Ok(Json(AnalyzePostResponse {
        image: analysis.image,
        attributes,
    })
    .into_response())
}

/// Moderation gate shared by the write paths. A flagged verdict rejects
/// the request; an unavailable moderation upstream is logged and the
/// request proceeds unflagged.
async fn screen_or_warn(
    state: &AppState,
    content: &Value,
    route: &'static str,
) -> Result<(), AppError> {
    match moderation::screen_content(&state.llm, content).await {
        Ok(verdict) if verdict.inappropriate => Err(AppError::BadRequest(
            "Product validation failed. Reason: Inappropriate Content".into(),
        )),
        Ok(_) => Ok(()),
        Err(err) => {
            warn!(target = "catalog.api", route, error = %err, "moderation_unavailable");
            Ok(())
        }
    }
}

async fn openapi_json(State(state): State<AppState>) -> Json<Value> {
    Json((*state.openapi).clone())
}

async fn swagger_ui() -> axum::http::Response<String> {
    let html = r#"<!doctype html>
<html>
<head>
  <meta charset='utf-8'/>
  <title>Catalog API Docs</title>
  <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css" />
</head>
<body>
  <div id="swagger-ui"></div>
  <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
  <script>
    window.onload = () => {
      window.ui = SwaggerUIBundle({ url: '/openapi.json', dom_id: '#swagger-ui' });
    };
  </script>
</body>
</html>"#;
    axum::http::Response::builder()
        .header("Content-Type", "text/html; charset=utf-8")
        .body(html.to_string())
        .unwrap()
}

async fn metrics_endpoint(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
) -> axum::http::Response<String> {
    if let Ok(secret) = std::env::var("METRICS_KEY") {
        let presented = headers
            .get("X-Metrics-Key")
            .and_then(|value| value.to_str().ok())
            .unwrap_or("");
        if presented != secret {
            return axum::http::Response::builder()
                .status(StatusCode::UNAUTHORIZED)
                .body("unauthorized".into())
                .unwrap();
        }
    }
    let body = state.prometheus_handle.render();
    axum::http::Response::builder()
        .header("Content-Type", "text/plain; version=0.0.4")
        .body(body)
        .unwrap()
}

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl From<StoreError> for AppError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::InvalidId => AppError::BadRequest("Invalid product ID format.".into()),
            StoreError::NotFound => AppError::NotFound("Product not found.".into()),
            StoreError::Backend(detail) => AppError::Internal(detail),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, detail) = match self {
            AppError::BadRequest(detail) => (StatusCode::BAD_REQUEST, "bad_request", detail),
            AppError::NotFound(detail) => (StatusCode::NOT_FOUND, "not_found", detail),
            AppError::Internal(detail) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", detail)
            }
        };
        let payload = ApiError {
            error: code.to_string(),
            detail: Some(detail),
        };
        (status, Json(payload)).into_response()
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let _ = fmt().with_env_filter(filter).try_init();
}

fn load_openapi() -> Value {
    serde_yaml::from_str(include_str!("../docs/openapi.yaml"))
        .unwrap_or(json!({"openapi": "3.0.3"}))
}

fn cors_layer_from_env() -> CorsLayer {
    let origins = std::env::var("CORS_ALLOWED_ORIGINS").unwrap_or_else(|_| "*".to_string());
    if origins.trim() == "*" {
        return CorsLayer::new()
            .allow_headers(Any)
            .allow_methods(Any)
            .allow_origin(Any);
    }
    let parsed = origins
        .split(',')
        .filter_map(|origin| origin.trim().parse::<axum::http::HeaderValue>().ok())
        .collect::<Vec<_>>();
    CorsLayer::new()
        .allow_headers(Any)
        .allow_methods(Any)
        .allow_origin(AllowOrigin::list(parsed))
}

fn body_limit_from_env() -> usize {
    std::env::var("REQUEST_MAX_BYTES")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(8 * 1024 * 1024)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn test_state() -> AppState {
        let mongo = mongodb::Client::with_uri_str("mongodb://127.0.0.1:27017")
            .await
            .expect("client");
        let uploader = MediaUploader::new(CloudinaryConfig {
            cloud_name: "demo".into(),
            api_key: "key".into(),
            api_secret: "secret".into(),
        });
        AppState {
            store: ProductStore::new(&mongo, "catalog_test", uploader.clone()),
            uploader,
            llm: Arc::new(MistralClient::new(MistralConfig {
                base_url: "http://127.0.0.1:9".into(),
                api_key: "test".into(),
            })),
            instagram: InstagramClient::new(),
            media_root: PathBuf::from("media"),
            openapi: Arc::new(json!({"openapi": "3.0.3"})),
            prometheus_handle: PrometheusBuilder::new().build_recorder().handle(),
        }
    }

    #[tokio::test]
    async fn health_route_reports_ok() {
        let app = router(test_state().await);
        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let value: Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(value, json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn malformed_product_id_is_a_client_error() {
        let app = router(test_state().await);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/products/not-a-real-id")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let value: Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(value["detail"], "Invalid product ID format.");
    }

    #[tokio::test]
    async fn malformed_id_on_delete_is_a_client_error() {
        let app = router(test_state().await);
        let response = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/products/123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn openapi_document_is_served() {
        let app = router(test_state().await);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/openapi.json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }
}
