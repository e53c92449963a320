//! HTTP exposition

use crate::app::App;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use indexmap::IndexMap;
use prometheus::proto::MetricFamily;
use prometheus::{Encoder, TextEncoder};
use rmx_core::{CollectContext, Error, MetricSink, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::Instrument;

pub fn router(app: Arc<App>) -> Router {
    Router::new()
        .route(&app.config.server.metrics_path, get(metrics))
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/stats", get(stats))
        .route("/", get(index))
        .with_state(app)
}

/// Bind the configured address and serve until the app's shutdown token fires
pub async fn serve(app: Arc<App>) -> Result<()> {
    let address = app.config.server.address.clone();
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|e| Error::server(&address, e.to_string()))?;
    serve_on(listener, app).await
}

pub async fn serve_on(listener: TcpListener, app: Arc<App>) -> Result<()> {
    let address = listener
        .local_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| app.config.server.address.clone());
    tracing::info!(address = %address, metrics_path = %app.config.server.metrics_path, "Listening");

    let shutdown = app.shutdown.clone();
    axum::serve(listener, router(app))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| Error::server(address, e.to_string()))
}

/// Run a collection pass and encode it with the exporter's own metrics
pub async fn metrics(State(app): State<Arc<App>>) -> Response {
    let ctx = CollectContext::with_timeout(app.config.server.scrape_timeout());
    let sink = MetricSink::new();

    let span = rmx_utils::scrape_span(app.registry.len());
    if let Err(e) = app.registry.collect_all(&ctx, &sink).instrument(span).await {
        // Still serve whatever was collected, plus the diagnostics
        tracing::warn!(error = %e, "Collection pass failed");
    }

    let mut families = sink.take_families();
    families.extend(app.metrics.gather());
    let families = merge_families(families);

    let encoder = TextEncoder::new();
    let mut body = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut body) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response();
    }

    ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response()
}

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

pub async fn ready(State(app): State<Arc<App>>) -> impl IntoResponse {
    if app.shutdown.is_cancelled() {
        return (StatusCode::SERVICE_UNAVAILABLE, "shutting down");
    }
    if app.registry.is_ready(app.config.collectors.error_threshold) {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

pub async fn stats(State(app): State<Arc<App>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "collectors": app.registry.stats(),
        "caches": app.caches.stats(),
        "cardinality": app.optimizer.stats(),
    }))
}

pub async fn index(State(app): State<Arc<App>>) -> Html<String> {
    let path = &app.config.server.metrics_path;
    Html(format!(
        "<html><head><title>rmx</title></head><body><h1>rmx</h1>\
         <p><a href=\"{path}\">Metrics</a></p><p><a href=\"/stats\">Stats</a></p></body></html>"
    ))
}

/// Combine families sharing a name and drop empty ones, sorted by name
fn merge_families(families: Vec<MetricFamily>) -> Vec<MetricFamily> {
    let mut merged: IndexMap<String, MetricFamily> = IndexMap::new();
    for family in families {
        if family.get_metric().is_empty() {
            continue;
        }
        match merged.get_mut(family.get_name()) {
            Some(existing) => {
                for metric in family.get_metric() {
                    existing.mut_metric().push(metric.clone());
                }
            }
            None => {
                merged.insert(family.get_name().to_string(), family);
            }
        }
    }
    merged.sort_keys();
    merged.into_values().collect()
}
