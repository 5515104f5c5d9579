//! API routes.

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method};
use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers::analyze::{analyze_audio, analyze_region, analyze_video};
use crate::handlers::audio::{censor_audio, suggest_replacements};
use crate::handlers::edits::{blur_object, replace_generative};
use crate::handlers::health;
use crate::handlers::status::{delete_job, download_video, get_preview_frame, get_status};
use crate::handlers::upload::upload_video;
use crate::metrics::metrics_middleware;
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let api_routes = Router::new()
        .route("/upload", post(upload_video))
        .route("/status/:id", get(get_status))
        .route("/preview/:id/frame/:index", get(get_preview_frame))
        .route("/download/:id", get(download_video))
        .route("/analyze-video/:id", post(analyze_video))
        .route("/analyze-audio/:id", post(analyze_audio))
        .route("/analyze-region/:id", post(analyze_region))
        .route("/blur-object", post(blur_object))
        .route("/replace-generative", post(replace_generative))
        .route("/censor-audio", post(censor_audio))
        .route("/suggest-replacements/:id", post(suggest_replacements))
        .route("/:id", delete(delete_job));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health));

    // Metrics endpoint (if enabled)
    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config.cors_origins))
        .layer(DefaultBodyLimit::max(state.config.max_body_size))
        .with_state(state)
}

/// Build the CORS layer from the configured origin list.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any);

    if origins.iter().any(|o| o == "*") {
        layer.allow_origin(Any)
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        layer.allow_origin(AllowOrigin::list(parsed))
    }
}
