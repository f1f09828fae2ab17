//! HTTP endpoint serving the Prometheus scrape.

use axum::{
    Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::MetricsConfig;
use crate::error::Result;
use crate::exporter::SharedExporter;

/// Create the metrics router.
pub fn router(exporter: SharedExporter) -> Router {
    Router::new()
        .route("/metrics", get(scrape))
        .with_state(exporter)
}

/// A failed collection is reported as a failed scrape, never as a partial one.
async fn scrape(State(exporter): State<SharedExporter>) -> Response {
    match exporter.render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, exporter.content_type())],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Metrics scrape failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Serve `/metrics` on the configured address until `cancel` fires.
pub async fn serve(
    config: &MetricsConfig,
    exporter: SharedExporter,
    cancel: CancellationToken,
) -> Result<()> {
    let addr = config.socket_addr()?;
    let listener = TcpListener::bind(addr).await?;
    serve_with_listener(listener, exporter, cancel).await
}

/// Serve `/metrics` on an already bound listener until `cancel` fires.
pub async fn serve_with_listener(
    listener: TcpListener,
    exporter: SharedExporter,
    cancel: CancellationToken,
) -> Result<()> {
    let addr = listener.local_addr()?;
    info!(address = %addr, "Metrics endpoint listening");

    axum::serve(listener, router(exporter))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;

    info!("Metrics endpoint stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    use crate::error::MetricsError;
    use crate::global::Metrics;
    use crate::source::PipelineState;
    use crate::status::ItemStatus;

    fn exporter(state: Arc<PipelineState>) -> SharedExporter {
        Metrics::new(&MetricsConfig::default(), state, Instant::now())
            .unwrap()
            .exporter()
    }

    async fn http_get(addr: std::net::SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_serve_over_tcp_until_cancelled() {
        let state = Arc::new(PipelineState::new());
        state.items().set_status("a", ItemStatus::Waiting);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let server = tokio::spawn(serve_with_listener(
            listener,
            exporter(state),
            cancel.clone(),
        ));

        let response = http_get(addr, "/metrics").await;
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("unpackerr_gauges{name=\"waiting\"} 1"));

        cancel.cancel();
        assert!(server.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_serve_returns_when_cancelled() {
        let config = MetricsConfig {
            listen_address: "127.0.0.1:0".to_string(),
            ..Default::default()
        };
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = serve(&config, exporter(Arc::new(PipelineState::new())), cancel).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_serve_rejects_bad_address() {
        let config = MetricsConfig {
            listen_address: "metrics.local".to_string(),
            ..Default::default()
        };

        let err = serve(
            &config,
            exporter(Arc::new(PipelineState::new())),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, MetricsError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_serve_reports_bind_failure() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = MetricsConfig {
            listen_address: taken.local_addr().unwrap().to_string(),
            ..Default::default()
        };

        let err = serve(
            &config,
            exporter(Arc::new(PipelineState::new())),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, MetricsError::Io(_)));
    }
}
