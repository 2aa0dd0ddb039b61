//! Cloud platform variants and their configuration rules.

use super::flags::{self, FlagError, FlagSet};
use super::{ConfigError, GcpSection, ServiceConfig};
use crate::image_config::ImageConfig;

const GCP: &str = "gcp";
const AWS: &str = "aws";
const AZURE: &str = "azure";

/// Google Cloud settings loaded from the `[gcp]` table.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct GcpSettings {
    /// Bucket images are uploaded through.
    pub bucket: String,
    /// Project owning images and instances.
    pub project_id: String,
    /// Zone instances run in.
    pub zone: String,
}

impl GcpSettings {
    fn load(section: &GcpSection) -> Self {
        Self {
            bucket: section.bucket.trim().to_owned(),
            project_id: section.project_id.trim().to_owned(),
            zone: section.zone.trim().to_owned(),
        }
    }
}

/// Active cloud platform, selected once at startup.
///
/// Each variant knows which builder flags to seed, how to finish a composed
/// configuration, and which settings to load. Adding a backend means adding
/// a variant here and an entry in the provider registry.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Platform {
    /// Google Cloud Platform.
    Gcp(GcpSettings),
    /// Amazon Web Services.
    Aws,
}

impl Platform {
    /// Selects and loads the platform named by the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingPlatform`] when no platform is set,
    /// [`ConfigError::UnsupportedPlatform`] for platforms that are known but
    /// not implemented, and [`ConfigError::UnknownPlatform`] otherwise.
    pub fn load(config: &ServiceConfig) -> Result<Self, ConfigError> {
        match config.platform.trim() {
            "" => Err(ConfigError::MissingPlatform),
            GCP => Ok(Self::Gcp(GcpSettings::load(&config.gcp))),
            AWS => Ok(Self::Aws),
            AZURE => Err(ConfigError::UnsupportedPlatform(AZURE.to_owned())),
            other => Err(ConfigError::UnknownPlatform(other.to_owned())),
        }
    }

    /// Platform identifier understood by the provider registry.
    #[must_use]
    pub const fn id(&self) -> &'static str {
        match self {
            Self::Gcp(_) => GCP,
            Self::Aws => AWS,
        }
    }

    /// Seeds platform-specific builder flag values.
    ///
    /// # Errors
    ///
    /// Returns [`FlagError`] when a seeded flag has not been declared.
    pub fn seed_flags(&self, flags: &mut FlagSet) -> Result<(), FlagError> {
        flags.set(flags::TARGET_CLOUD, self.id())?;
        if let Self::Gcp(settings) = self {
            flags.set(flags::PROJECT_ID, &settings.project_id)?;
            flags.set(flags::ZONE, &settings.zone)?;
        }
        Ok(())
    }

    /// Applies last adjustments to a composed configuration.
    ///
    /// The bucket has no builder flag, so the Google Cloud variant assigns
    /// it here.
    pub fn finalize(&self, config: &mut ImageConfig) {
        match self {
            Self::Gcp(settings) => {
                config.cloud_config.bucket_name.clone_from(&settings.bucket);
            }
            Self::Aws => {}
        }
    }
}
