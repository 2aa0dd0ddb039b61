//! Process-wide configuration and per-request configuration composition.
//!
//! The service configuration is a TOML file named `config`, discovered once
//! at startup (see [`ConfigSource`]). It selects the active cloud platform
//! and may override the defaults of the command-line-style flags that seed
//! every composed [`ImageConfig`](crate::ImageConfig). The
//! [`ConfigFactory`] turns those defaults into an independent configuration
//! per request.

use std::collections::BTreeMap;

use camino::Utf8PathBuf;
use serde::Deserialize;
use thiserror::Error;

mod factory;
pub mod flags;
mod platform;
mod source;

pub use factory::ConfigFactory;
pub use flags::{FlagError, FlagSet, FlagValue, MergeError};
pub use platform::{GcpSettings, Platform};
pub use source::{CONFIG_ENV_VAR, CONFIG_FILE_NAME, ConfigSource};

/// Default external image builder binary.
pub const DEFAULT_BUILDER_BIN: &str = "ops";

/// Settings read from the service configuration file.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
pub struct ServiceConfig {
    /// Platform selector (`gcp` or `aws`).
    #[serde(default)]
    pub platform: String,
    /// Google Cloud settings, used when `platform = "gcp"`.
    #[serde(default)]
    pub gcp: GcpSection,
    /// Image builder settings.
    #[serde(default)]
    pub provider: ProviderSection,
    /// Overrides for the default values of the builder flags.
    #[serde(default)]
    pub flags: BTreeMap<String, FlagValue>,
}

/// The `[gcp]` table of the service configuration.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
pub struct GcpSection {
    /// Bucket used to upload images.
    #[serde(default)]
    pub bucket: String,
    /// Project owning images and instances.
    #[serde(default)]
    pub project_id: String,
    /// Zone instances are created in.
    #[serde(default)]
    pub zone: String,
}

/// The `[provider]` table of the service configuration.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct ProviderSection {
    /// External image builder binary.
    #[serde(default = "default_builder_bin")]
    pub builder_bin: String,
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            builder_bin: default_builder_bin(),
        }
    }
}

fn default_builder_bin() -> String {
    DEFAULT_BUILDER_BIN.to_owned()
}

impl ServiceConfig {
    /// Loads the service configuration from the first file found by `source`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] when no candidate exists, and
    /// [`ConfigError::Io`] or [`ConfigError::Parse`] when the file cannot be
    /// read or parsed.
    pub fn load(source: &ConfigSource) -> Result<Self, ConfigError> {
        let path = source.locate()?;
        let contents = source::read_file(&path)?;
        Self::parse(&path, &contents)
    }

    /// Parses configuration text read from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the content is not valid TOML or
    /// does not match the expected structure.
    pub fn parse(path: &camino::Utf8Path, contents: &str) -> Result<Self, ConfigError> {
        ortho_config::toml::from_str(contents).map_err(|err| ConfigError::Parse {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
    }
}

/// Errors raised while loading configuration or preparing the defaults.
///
/// All of these are fatal at startup.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Raised when none of the candidate files exist.
    #[error("no configuration file found (searched: {searched})")]
    NotFound {
        /// Candidate paths, comma separated.
        searched: String,
    },
    /// Raised when file system access fails.
    #[error("failed to access {path}: {message}")]
    Io {
        /// Path that could not be accessed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when the configuration file cannot be parsed.
    #[error("failed to parse {path}: {message}")]
    Parse {
        /// Path that could not be parsed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when the `platform` key is absent or empty.
    #[error("missing platform: set `platform` in the configuration file")]
    MissingPlatform,
    /// Raised when the platform is not known at all.
    #[error("unknown platform '{0}'")]
    UnknownPlatform(String),
    /// Raised when the platform is known but not implemented.
    #[error("platform '{0}' is not supported at the moment")]
    UnsupportedPlatform(String),
    /// Raised when a builder flag cannot be declared or set.
    #[error("invalid builder flag: {0}")]
    Flag(#[from] FlagError),
    /// Raised when the builder defaults cannot be merged.
    #[error("failed to compose default configuration: {0}")]
    Merge(#[from] MergeError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn path() -> Utf8PathBuf {
        Utf8PathBuf::from("/etc/orca/config")
    }

    #[test]
    fn parses_full_configuration() {
        let contents = r#"
platform = "gcp"

[gcp]
bucket = "images"
project_id = "proj-1"
zone = "europe-west1-b"

[provider]
builder_bin = "/usr/local/bin/ops"

[flags]
nightly = true
nanos-version = "0.1.50"
envs = ["A=1", "B=2"]
"#;
        let config = ServiceConfig::parse(&path(), contents)
            .unwrap_or_else(|err| panic!("parse config: {err}"));

        assert_eq!(config.platform, "gcp");
        assert_eq!(config.gcp.bucket, "images");
        assert_eq!(config.gcp.project_id, "proj-1");
        assert_eq!(config.provider.builder_bin, "/usr/local/bin/ops");
        assert_eq!(config.flags.get("nightly"), Some(&FlagValue::Bool(true)));
        assert_eq!(
            config.flags.get("envs"),
            Some(&FlagValue::List(vec![String::from("A=1"), String::from("B=2")]))
        );
    }

    #[test]
    fn defaults_builder_bin() {
        let config = ServiceConfig::parse(&path(), "platform = \"aws\"")
            .unwrap_or_else(|err| panic!("parse config: {err}"));

        assert_eq!(config.provider.builder_bin, DEFAULT_BUILDER_BIN);
        assert!(config.flags.is_empty());
    }

    #[rstest]
    #[case("platform = ")]
    #[case("platform = 3")]
    #[case("[gcp\nbucket = 1")]
    fn rejects_malformed_content(#[case] contents: &str) {
        let err = ServiceConfig::parse(&path(), contents).expect_err("parse should fail");

        assert!(matches!(err, ConfigError::Parse { ref path, .. } if path.as_str() == "/etc/orca/config"));
    }
}
