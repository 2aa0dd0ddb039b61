//! Image preparation and instance lifecycle orchestration.
//!
//! The orchestrator ties the name sanitizer, the configuration factory, the
//! base image reader and a provider together into the three public
//! operations. Temporary resources are owned by guards, so every exit path
//! releases them; no step is retried.

use std::collections::BTreeMap;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::base_image::{BaseImage, BaseImageError, BaseImageOpener};
use crate::config::ConfigFactory;
use crate::naming::image_name_for_program;
use crate::provider::{ProviderError, ProviderFactory, ProviderHandle};
use crate::workspace::{self, ArtifactGuard, OutputFile, Workspace, WorkspaceError};

const IMAGE_ROOT: &str = "/";

/// Errors surfaced by orchestrator operations.
///
/// Each variant is scoped to one request and never terminates the process.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Raised when a temporary directory or file cannot be created.
    #[error("failed to prepare temporary workspace: {0}")]
    Workspace(#[source] WorkspaceError),
    /// Raised when the base image archive cannot be opened.
    #[error("failed to read base image {path}: {source}")]
    ReadBaseImage {
        /// Base image path supplied by the caller.
        path: Utf8PathBuf,
        /// Reader error.
        #[source]
        source: BaseImageError,
    },
    /// Raised when copying the base image tree fails.
    #[error("failed to copy base image files: {0}")]
    Copy(#[source] WorkspaceError),
    /// Raised when the base image tree nests too deeply.
    #[error("base image directory {path} exceeds the maximum depth of {limit}")]
    TooDeep {
        /// Image directory where the limit was hit.
        path: String,
        /// Depth limit.
        limit: usize,
    },
    /// Raised when the base image has an empty argument vector.
    #[error("base image {path} doesn't have arguments; can't set the program entry point")]
    MissingEntryPoint {
        /// Base image path supplied by the caller.
        path: Utf8PathBuf,
    },
    /// Raised when no provider serves the configured platform.
    #[error("no provider available: {0}")]
    ProviderUnavailable(#[source] ProviderError),
    /// Raised when the provider fails to build the image.
    #[error("failed to build image {image}: {source}")]
    Build {
        /// Image name.
        image: String,
        /// Provider error.
        #[source]
        source: ProviderError,
    },
    /// Raised when the provider fails to publish the image.
    #[error("failed to publish image {image}: {source}")]
    Publish {
        /// Image name.
        image: String,
        /// Provider error.
        #[source]
        source: ProviderError,
    },
    /// Raised when the provider fails to create the instance.
    #[error("failed to create instance {instance}: {source}")]
    CreateInstance {
        /// Instance name.
        instance: String,
        /// Provider error.
        #[source]
        source: ProviderError,
    },
    /// Raised when the provider fails to delete the instance.
    #[error("failed to delete instance {instance}: {source}")]
    DeleteInstance {
        /// Instance name.
        instance: String,
        /// Provider error.
        #[source]
        source: ProviderError,
    },
    /// Raised when the blocking extraction task is cancelled or panics.
    #[error("base image extraction was interrupted: {0}")]
    Interrupted(String),
}

impl OrchestratorError {
    fn from_copy(err: WorkspaceError) -> Self {
        match err {
            WorkspaceError::TooDeep { path, limit } => Self::TooDeep { path, limit },
            other => Self::Copy(other),
        }
    }
}

/// Base image contents extracted into a workspace.
struct Extracted {
    workspace: Workspace,
    args: Vec<String>,
    env: BTreeMap<String, String>,
}

/// Runs image preparation and instance lifecycle operations.
#[derive(Debug)]
pub struct Orchestrator<O, F> {
    configs: Arc<ConfigFactory>,
    opener: O,
    providers: F,
}

impl<O, F> Orchestrator<O, F>
where
    O: BaseImageOpener + Clone + 'static,
    F: ProviderFactory,
{
    /// Creates an orchestrator sharing the startup configuration factory.
    #[must_use]
    pub const fn new(configs: Arc<ConfigFactory>, opener: O, providers: F) -> Self {
        Self {
            configs,
            opener,
            providers,
        }
    }

    /// Builds an image for `program` from the base image at `base_image`
    /// and publishes it.
    ///
    /// The workspace directory, the reserved output file, and the build
    /// artifact are removed before this returns, whatever the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError`] when the base image cannot be read or
    /// copied, has no entry point, or when the provider is unavailable or
    /// fails to build or publish. No publish is attempted after a failed
    /// build.
    pub async fn prepare_program_image(
        &self,
        program: &str,
        base_image: &Utf8Path,
    ) -> Result<(), OrchestratorError> {
        let image_name = image_name_for_program(program);

        let opener = self.opener.clone();
        let archive = base_image.to_path_buf();
        let extracted = tokio::task::spawn_blocking(move || extract(&opener, &archive))
            .await
            .map_err(|err| OrchestratorError::Interrupted(err.to_string()))??;
        let workspace_root = extracted.workspace.root().to_path_buf();

        let mut config = self.configs.new_config(&image_name);
        config.add_dir(workspace_root.clone());

        config.args = extracted.args;
        let Some(entry_point) = config.args.first() else {
            return Err(OrchestratorError::MissingEntryPoint {
                path: base_image.to_path_buf(),
            });
        };
        let program_path = workspace::resolve_entry_point(&workspace_root, entry_point);
        if let Err(err) = workspace::mark_executable(&program_path) {
            warn!(path = %program_path, error = %err, "failed to mark entry point executable");
        }
        config.program = program_path.to_string();
        config.program_path = program_path.into_string();

        config.import_env(extracted.env);

        let output = OutputFile::reserve(&image_name).map_err(OrchestratorError::Workspace)?;
        config.cloud_config.image_name.clone_from(&image_name);
        config.run_config.image_name = output.path().to_string();

        let handle = ProviderHandle::new(&self.providers, config)
            .map_err(OrchestratorError::ProviderUnavailable)?;

        let artifact = ArtifactGuard::new(handle.build_image().await.map_err(|source| {
            OrchestratorError::Build {
                image: image_name.clone(),
                source,
            }
        })?);
        info!(image = %image_name, artifact = %artifact.path(), "built new image");

        handle
            .publish_image(artifact.path())
            .await
            .map_err(|source| OrchestratorError::Publish {
                image: image_name.clone(),
                source,
            })?;

        drop(artifact);
        drop(output);
        if let Err(err) = extracted.workspace.close() {
            warn!(path = %workspace_root, error = %err, "failed to remove workspace");
        }
        Ok(())
    }

    /// Creates an instance of the image prepared for `program` and returns
    /// its name.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::ProviderUnavailable`] or
    /// [`OrchestratorError::CreateInstance`].
    pub async fn create_instance(&self, program: &str) -> Result<String, OrchestratorError> {
        let name = image_name_for_program(program);

        let mut config = self.configs.new_config(&name);
        config.cloud_config.image_name.clone_from(&name);
        config.run_config.instance_name.clone_from(&name);
        config.run_config.kernel.clone_from(&config.nanos_version);
        let platform = config.cloud_config.platform.clone();

        let handle = ProviderHandle::new(&self.providers, config)
            .map_err(OrchestratorError::ProviderUnavailable)?;
        handle
            .create_instance()
            .await
            .map_err(|source| OrchestratorError::CreateInstance {
                instance: name.clone(),
                source,
            })?;

        info!(instance = %name, platform = %platform, "created instance");
        Ok(name)
    }

    /// Deletes the instance identified by `instance_id`.
    ///
    /// The identifier is sanitized like a program name, so passing the
    /// program used for [`Self::create_instance`] targets the same instance.
    /// The name returned by create is sanitized again and gains a second
    /// prefix character.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::ProviderUnavailable`] or
    /// [`OrchestratorError::DeleteInstance`].
    pub async fn delete_instance(&self, instance_id: &str) -> Result<(), OrchestratorError> {
        let name = image_name_for_program(instance_id);

        let mut config = self.configs.new_config(&name);
        config.cloud_config.image_name.clone_from(&name);
        config.run_config.instance_name.clone_from(&name);
        let platform = config.cloud_config.platform.clone();

        let handle = ProviderHandle::new(&self.providers, config)
            .map_err(OrchestratorError::ProviderUnavailable)?;
        info!(instance = %name, platform = %platform, "deleting instance");
        handle
            .delete_instance(&name)
            .await
            .map_err(|source| OrchestratorError::DeleteInstance {
                instance: name.clone(),
                source,
            })?;

        info!(instance = %name, platform = %platform, "deleted instance");
        Ok(())
    }
}

fn extract<O>(opener: &O, base_image: &Utf8Path) -> Result<Extracted, OrchestratorError>
where
    O: BaseImageOpener,
{
    let workspace = Workspace::create().map_err(OrchestratorError::Workspace)?;
    debug!(path = %workspace.root(), "created workspace");

    let image = opener
        .open(base_image)
        .map_err(|source| OrchestratorError::ReadBaseImage {
            path: base_image.to_path_buf(),
            source,
        })?;
    workspace::copy_all(&image, IMAGE_ROOT, workspace.root())
        .map_err(OrchestratorError::from_copy)?;

    Ok(Extracted {
        args: image.args().to_vec(),
        env: image.env().clone(),
        workspace,
    })
}
