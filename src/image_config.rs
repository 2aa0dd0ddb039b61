//! Per-request image configuration consumed by providers.
//!
//! The layout mirrors the JSON configuration accepted by the external image
//! builder, so the struct serialises with PascalCase keys and can be handed
//! to the builder verbatim.

use std::collections::BTreeMap;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// Environment variable that pins the kernel version of a base image.
pub const KERNEL_VERSION_ENV: &str = "NANOS_VERSION";

/// Fully composed configuration for one orchestrator call.
///
/// A fresh value is produced by the configuration factory for every call and
/// is never shared between calls.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ImageConfig {
    /// Host directories bundled into the image.
    pub dirs: Vec<Utf8PathBuf>,
    /// Argument vector; the first entry is the entry point.
    pub args: Vec<String>,
    /// Environment variables baked into the image.
    pub env: BTreeMap<String, String>,
    /// Host path of the entry-point executable.
    pub program: String,
    /// Same as `program`; kept separately because the builder reads both.
    pub program_path: String,
    /// Kernel version hint.
    pub nanos_version: String,
    /// Whether nightly kernel builds are used.
    pub nightly: bool,
    /// Root directory used when resolving libraries for the image.
    pub target_root: String,
    /// Package name used instead of a bare program, if any.
    pub package: String,
    /// Whether `package` refers to a locally built package.
    pub local_package: bool,
    /// Cloud target settings.
    pub cloud_config: CloudConfig,
    /// Build and run settings.
    pub run_config: RunConfig,
}

/// Cloud target portion of an [`ImageConfig`].
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CloudConfig {
    /// Platform identifier (for example `gcp`).
    pub platform: String,
    /// Cloud project identifier.
    #[serde(rename = "ProjectID")]
    pub project_id: String,
    /// Availability zone.
    pub zone: String,
    /// Storage bucket the image is uploaded through.
    pub bucket_name: String,
    /// Name of the published cloud image.
    pub image_name: String,
}

/// Build output and instance settings of an [`ImageConfig`].
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct RunConfig {
    /// Local path the built image is written to.
    pub image_name: String,
    /// Name of the instance to create or delete.
    pub instance_name: String,
    /// Kernel reference used when booting the instance.
    pub kernel: String,
    /// Emit debug output from the builder.
    pub show_debug: bool,
    /// Emit warnings from the builder.
    pub show_warnings: bool,
    /// Emit errors from the builder.
    pub show_errors: bool,
}

impl ImageConfig {
    /// Adds `dir` to the bundled directories unless already present.
    pub fn add_dir(&mut self, dir: impl Into<Utf8PathBuf>) {
        let path = dir.into();
        if !self.dirs.contains(&path) {
            self.dirs.push(path);
        }
    }

    /// Copies environment variables into the configuration.
    ///
    /// When the kernel version variable is present its value also becomes the
    /// kernel version hint.
    pub fn import_env<I, K, V>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (raw_key, raw_value) in vars {
            let (name, value) = (raw_key.into(), raw_value.into());
            if name == KERNEL_VERSION_ENV {
                self.nanos_version.clone_from(&value);
            }
            self.env.insert(name, value);
        }
    }

    /// Overlays the non-empty fields of `other` onto `self`.
    ///
    /// Used when a JSON base configuration file is merged in; collections are
    /// extended rather than replaced.
    pub fn overlay(&mut self, other: Self) {
        fn take(slot: &mut String, value: String) {
            if !value.is_empty() {
                *slot = value;
            }
        }

        for dir in other.dirs {
            self.add_dir(dir);
        }
        self.args.extend(other.args);
        self.env.extend(other.env);
        take(&mut self.program, other.program);
        take(&mut self.program_path, other.program_path);
        take(&mut self.nanos_version, other.nanos_version);
        take(&mut self.target_root, other.target_root);
        take(&mut self.package, other.package);
        self.nightly |= other.nightly;
        self.local_package |= other.local_package;

        take(&mut self.cloud_config.platform, other.cloud_config.platform);
        take(
            &mut self.cloud_config.project_id,
            other.cloud_config.project_id,
        );
        take(&mut self.cloud_config.zone, other.cloud_config.zone);
        take(
            &mut self.cloud_config.bucket_name,
            other.cloud_config.bucket_name,
        );
        take(
            &mut self.cloud_config.image_name,
            other.cloud_config.image_name,
        );

        take(&mut self.run_config.image_name, other.run_config.image_name);
        take(
            &mut self.run_config.instance_name,
            other.run_config.instance_name,
        );
        take(&mut self.run_config.kernel, other.run_config.kernel);
        self.run_config.show_debug |= other.run_config.show_debug;
        self.run_config.show_warnings |= other.run_config.show_warnings;
        self.run_config.show_errors |= other.run_config.show_errors;
    }
}
