//! HTTP front-end exposing the orchestrator.
//!
//! Routes:
//! - `POST /v1/prepare-image` `{"program", "path"}` → `{}`
//! - `POST /v1/create-instance` `{"program"}` → `{"instanceId"}`
//! - `POST /v1/delete-instance` `{"instanceId"}` → `{}`

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::Request;
use axum::routing::post;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, info_span};
use uuid::Uuid;

use crate::base_image::BaseImageOpener;
use crate::orchestrator::Orchestrator;
use crate::provider::ProviderFactory;

pub mod handlers;

pub use handlers::{
    CreateInstanceRequest, CreateInstanceResponse, DeleteInstanceRequest, Empty,
    PrepareImageRequest,
};

/// Errors raised while binding or serving.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Raised when the listen address cannot be bound.
    #[error("failed to listen on {addr}: {source}")]
    Bind {
        /// Requested listen address.
        addr: String,
        /// Operating system error.
        #[source]
        source: std::io::Error,
    },
    /// Raised when the server stops with an I/O error.
    #[error("server failed: {0}")]
    Serve(#[source] std::io::Error),
}

/// Builds the router serving `orchestrator`.
pub fn router<O, F>(orchestrator: Arc<Orchestrator<O, F>>) -> Router
where
    O: BaseImageOpener + Clone + 'static,
    F: ProviderFactory + 'static,
{
    Router::new()
        .route("/v1/prepare-image", post(handlers::prepare_image::<O, F>))
        .route("/v1/create-instance", post(handlers::create_instance::<O, F>))
        .route("/v1/delete-instance", post(handlers::delete_instance::<O, F>))
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
            info_span!(
                "request",
                id = %Uuid::new_v4(),
                method = %request.method(),
                uri = %request.uri(),
            )
        }))
        .with_state(orchestrator)
}

/// Binds `listen_addr` and serves `app` until the process exits.
///
/// # Errors
///
/// Returns [`ServerError::Bind`] when the address cannot be bound and
/// [`ServerError::Serve`] when serving fails.
pub async fn start(listen_addr: &str, app: Router) -> Result<(), ServerError> {
    let listener = TcpListener::bind(listen_addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: listen_addr.to_owned(),
            source,
        })?;
    let local = listener
        .local_addr()
        .map_err(|source| ServerError::Bind {
            addr: listen_addr.to_owned(),
            source,
        })?;
    info!("listening at {local}");

    axum::serve(listener, app).await.map_err(ServerError::Serve)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigFactory, ServiceConfig};
    use crate::provider::ProviderRegistry;
    use crate::test_support::{MemoryImage, MemoryImageOpener, ProviderStep, RecordingProvider};
    use axum::http::{Method, StatusCode};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn app(provider: &RecordingProvider) -> Router {
        let service = ServiceConfig {
            platform: String::from("aws"),
            ..ServiceConfig::default()
        };
        let configs =
            Arc::new(ConfigFactory::new(&service).unwrap_or_else(|err| panic!("factory: {err}")));
        let image = MemoryImage::new()
            .with_file("/app", b"app", 0o755)
            .with_args(&["/app"]);
        let orchestrator = Orchestrator::new(
            configs,
            MemoryImageOpener::single("/base.tar", image),
            ProviderRegistry::new().register("aws", Arc::new(provider.clone())),
        );
        router(Arc::new(orchestrator))
    }

    async fn post_json(app: Router, path: &str, body: &Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap_or_else(|err| panic!("request: {err}"));
        let response = app
            .oneshot(request)
            .await
            .unwrap_or_else(|err| panic!("oneshot: {err}"));
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap_or_else(|err| panic!("body: {err}"));
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn create_returns_instance_id() {
        let provider = RecordingProvider::new();
        let (status, body) = post_json(
            app(&provider),
            "/v1/create-instance",
            &json!({"program": "my-app-1"}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"instanceId": "amy-app-1"}));
    }

    #[tokio::test]
    async fn create_failure_returns_empty_instance_id() {
        let provider = RecordingProvider::failing_at(ProviderStep::CreateInstance);
        let (status, body) = post_json(
            app(&provider),
            "/v1/create-instance",
            &json!({"program": "my-app-1"}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"instanceId": ""}));
    }

    #[tokio::test]
    async fn prepare_failure_still_returns_empty_object() {
        let provider = RecordingProvider::new();
        let (status, body) = post_json(
            app(&provider),
            "/v1/prepare-image",
            &json!({"program": "my-app-1", "path": "/missing.tar"}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({}));
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn prepare_runs_build_and_publish() {
        let provider = RecordingProvider::new();
        let (status, body) = post_json(
            app(&provider),
            "/v1/prepare-image",
            &json!({"program": "my-app-1", "path": "/base.tar"}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({}));
        assert_eq!(provider.steps(), vec![ProviderStep::Build, ProviderStep::Publish]);
    }

    #[tokio::test]
    async fn delete_uses_instance_id_field() {
        let provider = RecordingProvider::new();
        let (status, body) = post_json(
            app(&provider),
            "/v1/delete-instance",
            &json!({"instanceId": "my-app-1"}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({}));
        let calls = provider.calls();
        let target = calls.first().and_then(|call| call.target.clone());
        assert_eq!(target.as_deref(), Some("amy-app-1"));
    }

    #[tokio::test]
    async fn malformed_body_is_rejected() {
        let provider = RecordingProvider::new();
        let (status, _) = post_json(app(&provider), "/v1/create-instance", &json!({"name": 1})).await;

        assert!(status.is_client_error());
        assert!(provider.calls().is_empty());
    }
}
