//! Request handlers for the three orchestrator operations.
//!
//! Failures are logged and never returned to the caller: prepare and delete
//! always answer with an empty object, create answers with an empty
//! instance id.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::base_image::BaseImageOpener;
use crate::orchestrator::Orchestrator;
use crate::provider::ProviderFactory;

/// Body of `POST /v1/prepare-image`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct PrepareImageRequest {
    /// Program identifier.
    pub program: String,
    /// Base image archive path on the service host.
    pub path: Utf8PathBuf,
}

/// Body of `POST /v1/create-instance`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct CreateInstanceRequest {
    /// Program identifier.
    pub program: String,
}

/// Response of `POST /v1/create-instance`.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInstanceResponse {
    /// Name of the created instance, empty on failure.
    pub instance_id: String,
}

/// Body of `POST /v1/delete-instance`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteInstanceRequest {
    /// Instance identifier returned by create.
    pub instance_id: String,
}

/// Empty response body.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Empty {}

/// `POST /v1/prepare-image`
pub async fn prepare_image<O, F>(
    State(orchestrator): State<Arc<Orchestrator<O, F>>>,
    Json(req): Json<PrepareImageRequest>,
) -> Json<Empty>
where
    O: BaseImageOpener + Clone + 'static,
    F: ProviderFactory + 'static,
{
    info!("preparing program image \"{}:{}\"", req.program, req.path);
    match orchestrator
        .prepare_program_image(&req.program, &req.path)
        .await
    {
        Ok(()) => info!(program = %req.program, "prepared program image"),
        Err(err) => error!(program = %req.program, error = %err, "failed to prepare program image"),
    }
    Json(Empty {})
}

/// `POST /v1/create-instance`
pub async fn create_instance<O, F>(
    State(orchestrator): State<Arc<Orchestrator<O, F>>>,
    Json(req): Json<CreateInstanceRequest>,
) -> Json<CreateInstanceResponse>
where
    O: BaseImageOpener + Clone + 'static,
    F: ProviderFactory + 'static,
{
    let instance_id = match orchestrator.create_instance(&req.program).await {
        Ok(instance) => {
            info!(program = %req.program, instance = %instance, "created instance for program");
            instance
        }
        Err(err) => {
            error!(program = %req.program, error = %err, "failed to create instance for program");
            String::new()
        }
    };
    Json(CreateInstanceResponse { instance_id })
}

/// `POST /v1/delete-instance`
pub async fn delete_instance<O, F>(
    State(orchestrator): State<Arc<Orchestrator<O, F>>>,
    Json(req): Json<DeleteInstanceRequest>,
) -> Json<Empty>
where
    O: BaseImageOpener + Clone + 'static,
    F: ProviderFactory + 'static,
{
    match orchestrator.delete_instance(&req.instance_id).await {
        Ok(()) => info!(instance = %req.instance_id, "deleted instance"),
        Err(err) => error!(instance = %req.instance_id, error = %err, "failed to delete instance"),
    }
    Json(Empty {})
}
