//! Composition of per-request configurations.

use tracing::debug;

use super::flags::{FlagSet, MergeContainer};
use super::{ConfigError, Platform, ServiceConfig};
use crate::image_config::ImageConfig;

/// Produces an independent [`ImageConfig`] for every request.
///
/// The builder flag defaults, platform seeding, and `[flags]` overrides are
/// merged once when the factory is built; a failure there is a startup
/// error. Afterwards the factory is immutable and can be shared freely.
#[derive(Clone, Debug)]
pub struct ConfigFactory {
    template: ImageConfig,
    platform: Platform,
}

impl ConfigFactory {
    /// Builds the factory from the service configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the platform is unusable, a flag override
    /// is invalid, or the defaults fail to merge.
    pub fn new(service: &ServiceConfig) -> Result<Self, ConfigError> {
        let platform = Platform::load(service)?;

        let mut flags = FlagSet::new();
        MergeContainer::persist_all(&mut flags);
        platform.seed_flags(&mut flags)?;
        for (name, value) in &service.flags {
            flags.set_value(name, value.clone())?;
        }

        let container = MergeContainer::from_flags(&flags)?;
        let mut template = ImageConfig::default();
        container.merge(&mut template)?;

        Ok(Self { template, platform })
    }

    /// Returns the active platform.
    #[must_use]
    pub const fn platform(&self) -> &Platform {
        &self.platform
    }

    /// Returns a fresh configuration for `program`.
    ///
    /// The program is not used for lookups yet; every program receives the
    /// same defaults.
    #[must_use]
    pub fn new_config(&self, program: &str) -> ImageConfig {
        debug!(program, platform = self.platform.id(), "composing configuration");
        let mut config = self.template.clone();
        self.platform.finalize(&mut config);
        config
    }
}
