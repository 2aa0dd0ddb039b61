//! Cloud provider abstraction used by the orchestrator.
//!
//! A [`Provider`] builds and publishes images and manages instances for one
//! platform. Providers are looked up by platform identifier through a
//! [`ProviderFactory`]; the [`ProviderRegistry`] is the production factory.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

use crate::command::{CommandError, ProcessCommandRunner};
use crate::image_config::ImageConfig;

mod ops;

pub use ops::OpsProvider;

/// Boxed future returned by provider operations.
pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ProviderError>> + Send + 'a>>;

/// Platforms served by the image builder backend.
pub const SUPPORTED_PLATFORMS: [&str; 2] = ["gcp", "aws"];

/// Errors raised by providers and provider lookup.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ProviderError {
    /// Raised when no provider is registered for the platform.
    #[error("unsupported platform '{0}'")]
    UnsupportedPlatform(String),
    /// Raised when the builder configuration file cannot be written.
    #[error("failed to write builder configuration: {0}")]
    Config(String),
    /// Raised when the builder command cannot be started.
    #[error(transparent)]
    Command(#[from] CommandError),
    /// Raised when the builder command exits unsuccessfully.
    #[error("`{command}` exited with status {status}: {stderr}")]
    CommandFailed {
        /// Command line that failed.
        command: String,
        /// Exit status, or `unknown`.
        status: String,
        /// Captured standard error.
        stderr: String,
    },
    /// Raised when a blocking task is cancelled or panics.
    #[error("provider task failed: {0}")]
    Task(String),
}

/// Request context handed to every provider operation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProviderContext {
    config: ImageConfig,
}

impl ProviderContext {
    /// Wraps a composed configuration.
    #[must_use]
    pub const fn new(config: ImageConfig) -> Self {
        Self { config }
    }

    /// The composed configuration for this request.
    #[must_use]
    pub const fn config(&self) -> &ImageConfig {
        &self.config
    }

    /// Platform identifier of the configuration.
    #[must_use]
    pub fn platform(&self) -> &str {
        &self.config.cloud_config.platform
    }
}

/// Operations a cloud backend must provide.
pub trait Provider: Send + Sync {
    /// Builds an image locally and returns the artifact path.
    fn build_image<'a>(&'a self, ctx: &'a ProviderContext) -> ProviderFuture<'a, Utf8PathBuf>;

    /// Publishes a built artifact to the cloud.
    fn publish_image<'a>(
        &'a self,
        ctx: &'a ProviderContext,
        artifact: &'a Utf8Path,
    ) -> ProviderFuture<'a, ()>;

    /// Creates an instance from the configured image.
    fn create_instance<'a>(&'a self, ctx: &'a ProviderContext) -> ProviderFuture<'a, ()>;

    /// Deletes the instance called `name`.
    fn delete_instance<'a>(&'a self, ctx: &'a ProviderContext, name: &'a str)
    -> ProviderFuture<'a, ()>;
}

/// Resolves providers by platform identifier.
pub trait ProviderFactory: Send + Sync {
    /// Returns the provider serving `platform`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::UnsupportedPlatform`] when no provider is
    /// known for `platform`.
    fn provider(&self, platform: &str) -> Result<Arc<dyn Provider>, ProviderError>;
}

/// A provider bound to one request context.
pub struct ProviderHandle {
    provider: Arc<dyn Provider>,
    context: ProviderContext,
}

impl fmt::Debug for ProviderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderHandle")
            .field("platform", &self.context.platform())
            .finish_non_exhaustive()
    }
}

impl ProviderHandle {
    /// Resolves the provider for the configuration's platform.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::UnsupportedPlatform`] when `factory` has no
    /// provider for the platform.
    pub fn new<F>(factory: &F, config: ImageConfig) -> Result<Self, ProviderError>
    where
        F: ProviderFactory + ?Sized,
    {
        let provider = factory.provider(&config.cloud_config.platform)?;
        Ok(Self {
            provider,
            context: ProviderContext::new(config),
        })
    }

    /// Request context bound to this handle.
    #[must_use]
    pub const fn context(&self) -> &ProviderContext {
        &self.context
    }

    /// Builds the image described by the context.
    ///
    /// # Errors
    ///
    /// Propagates the provider's [`ProviderError`].
    pub async fn build_image(&self) -> Result<Utf8PathBuf, ProviderError> {
        self.provider.build_image(&self.context).await
    }

    /// Publishes `artifact`.
    ///
    /// # Errors
    ///
    /// Propagates the provider's [`ProviderError`].
    pub async fn publish_image(&self, artifact: &Utf8Path) -> Result<(), ProviderError> {
        self.provider.publish_image(&self.context, artifact).await
    }

    /// Creates the configured instance.
    ///
    /// # Errors
    ///
    /// Propagates the provider's [`ProviderError`].
    pub async fn create_instance(&self) -> Result<(), ProviderError> {
        self.provider.create_instance(&self.context).await
    }

    /// Deletes the instance called `name`.
    ///
    /// # Errors
    ///
    /// Propagates the provider's [`ProviderError`].
    pub async fn delete_instance(&self, name: &str) -> Result<(), ProviderError> {
        self.provider.delete_instance(&self.context, name).await
    }
}

/// Provider lookup table keyed by platform identifier.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn Provider>>,
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("platforms", &self.providers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ProviderRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry serving every supported platform through the image builder
    /// at `builder_bin`.
    #[must_use]
    pub fn with_builder(builder_bin: &str) -> Self {
        let provider: Arc<dyn Provider> =
            Arc::new(OpsProvider::new(ProcessCommandRunner, builder_bin));
        SUPPORTED_PLATFORMS
            .iter()
            .fold(Self::new(), |registry, platform| {
                registry.register(platform, Arc::clone(&provider))
            })
    }

    /// Registers `provider` for `platform`, replacing any previous entry.
    #[must_use]
    pub fn register(mut self, platform: &str, provider: Arc<dyn Provider>) -> Self {
        self.providers.insert(platform.to_owned(), provider);
        self
    }

    /// Registered platform identifiers.
    pub fn platforms(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }
}

impl ProviderFactory for ProviderRegistry {
    fn provider(&self, platform: &str) -> Result<Arc<dyn Provider>, ProviderError> {
        self.providers
            .get(platform)
            .cloned()
            .ok_or_else(|| ProviderError::UnsupportedPlatform(platform.to_owned()))
    }
}
