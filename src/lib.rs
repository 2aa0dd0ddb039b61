//! Core library for the orca image preparation service.
//!
//! The crate turns a base image archive plus a program identifier into a
//! published cloud image, and creates or deletes instances running that
//! image. The cloud-specific work is delegated to a pluggable provider,
//! selected by the platform named in the service configuration.

pub mod base_image;
pub mod command;
pub mod config;
pub mod image_config;
pub mod logging;
pub mod naming;
pub mod orchestrator;
pub mod provider;
pub mod server;
pub mod test_support;
pub mod workspace;

pub use base_image::{BaseImage, BaseImageError, BaseImageOpener, DirEntry, TarBaseImage, TarImageOpener};
pub use command::{CommandError, CommandOutput, CommandRunner, ProcessCommandRunner};
pub use config::{ConfigError, ConfigFactory, ConfigSource, Platform, ServiceConfig};
pub use image_config::{CloudConfig, ImageConfig, KERNEL_VERSION_ENV, RunConfig};
pub use naming::image_name_for_program;
pub use orchestrator::{Orchestrator, OrchestratorError};
pub use provider::{
    OpsProvider, Provider, ProviderContext, ProviderError, ProviderFactory, ProviderHandle,
    ProviderRegistry,
};
pub use workspace::WorkspaceError;
