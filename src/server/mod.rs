use crate::exporter::Exporter;
use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

const METRICS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

#[derive(Clone)]
pub struct AppState {
    exporter: Arc<Exporter>,
    telemetry_path: String,
}

/// Router with the landing page at `/` and the metrics endpoint at the
/// configured telemetry path.
pub fn build_router(exporter: Arc<Exporter>, telemetry_path: &str) -> Router {
    let state = AppState {
        exporter,
        telemetry_path: telemetry_path.to_string(),
    };
    Router::new()
        .route("/", get(landing))
        .route(telemetry_path, get(metrics))
        .with_state(state)
}

/// Bind and serve until the shutdown future resolves. A bind failure is the
/// one startup error that is fatal to the process.
pub async fn serve(
    listen_address: &str,
    telemetry_path: &str,
    exporter: Arc<Exporter>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let app = build_router(exporter, telemetry_path);

    let listener = TcpListener::bind(listen_address)
        .await
        .with_context(|| format!("Failed to bind {}", listen_address))?;
    info!(
        "Listening on {}, metrics at {}",
        listen_address, telemetry_path
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server error")?;

    Ok(())
}

async fn landing(State(state): State<AppState>) -> Html<String> {
    Html(landing_page(&state.telemetry_path))
}

/// Each scrape runs one collection pass; a scrape arriving mid-pass waits
/// on the exporter's pass lock.
async fn metrics(State(state): State<AppState>) -> Response {
    match state.exporter.render().await {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, METRICS_CONTENT_TYPE)],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Error rendering metrics: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("error rendering metrics: {}", e),
            )
                .into_response()
        }
    }
}

fn landing_page(telemetry_path: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8">
    <title>Beanstalkd Exporter</title>
  </head>
  <body>
    <h1>Beanstalkd Exporter</h1>
    <p><a href='{}'>Metrics</a></p>
  </body>
</html>
"#,
        telemetry_path
    )
}
