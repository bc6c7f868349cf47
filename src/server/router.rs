use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::server::handlers::{health, query};
use crate::state::AppState;

/// Creates the application router: banner, health/status probes and the
/// streaming query endpoint, wrapped in CORS and request tracing.
pub fn router(state: Arc<AppState>) -> Router {
    let cors_layer = build_cors_layer(&state.config.server.cors_allowed_origins);

    let api = Router::new()
        .route("/health", get(health::health))
        .route("/status", get(health::get_status))
        .route("/query", post(query::query))
        .layer(cors_layer);

    Router::new()
        .route("/", get(health::root))
        .nest("/api", api)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let origins = origins
        .iter()
        .map(|origin| origin.trim())
        .filter(|origin| !origin.is_empty())
        .collect::<Vec<_>>();

    let allow_origin = if origins.is_empty() || origins.contains(&"*") {
        AllowOrigin::from(Any)
    } else {
        let list = origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(err) => {
                    tracing::warn!("Ignoring invalid CORS origin '{}': {}", origin, err);
                    None
                }
            })
            .collect::<Vec<_>>();
        AllowOrigin::list(list)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::ACCEPT, header::CONTENT_TYPE])
}

