//! Command-line-style flags that seed every composed configuration.
//!
//! The image builder groups its options into flag sets (global options,
//! kernel version selection, provider target, and so on). The service has no
//! command line for them, so each group is declared on a [`FlagSet`] with its
//! defaults, optionally seeded by the active platform and the `[flags]` table
//! of the service configuration, and finally merged into an
//! [`ImageConfig`] in a fixed order by [`MergeContainer`].

use std::collections::BTreeMap;

use camino::Utf8PathBuf;
use serde::Deserialize;
use thiserror::Error;

use crate::image_config::ImageConfig;

/// Path to a JSON base configuration merged before every other group.
pub const CONFIG: &str = "config";
/// Emit builder debug output.
pub const SHOW_DEBUG: &str = "show-debug";
/// Emit builder warnings.
pub const SHOW_WARNINGS: &str = "show-warnings";
/// Emit builder errors.
pub const SHOW_ERRORS: &str = "show-errors";
/// Use nightly kernel builds.
pub const NIGHTLY: &str = "nightly";
/// Kernel version to build against.
pub const NANOS_VERSION: &str = "nanos-version";
/// Local output path of the built image.
pub const IMAGE_NAME: &str = "imagename";
/// Root directory used to resolve libraries.
pub const TARGET_ROOT: &str = "target-root";
/// Extra program arguments.
pub const ARGS: &str = "args";
/// Extra environment entries in `KEY=VALUE` form.
pub const ENVS: &str = "envs";
/// Cloud platform the image targets.
pub const TARGET_CLOUD: &str = "target-cloud";
/// Cloud project identifier.
pub const PROJECT_ID: &str = "projectid";
/// Cloud availability zone.
pub const ZONE: &str = "zone";
/// Package used instead of a bare program.
pub const PACKAGE: &str = "package";
/// Whether the package is built locally.
pub const LOCAL: &str = "local";

const DEFAULT_TARGET_CLOUD: &str = "onprem";

/// Value held by a flag.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(untagged)]
pub enum FlagValue {
    /// Boolean switch.
    Bool(bool),
    /// Free-form text.
    Text(String),
    /// List of strings.
    List(Vec<String>),
}

impl FlagValue {
    const fn kind(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Text(_) => "string",
            Self::List(_) => "list",
        }
    }
}

/// Errors raised while declaring, setting, or reading flags.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum FlagError {
    /// Raised when a flag was never declared.
    #[error("unknown flag '{0}'")]
    Unknown(String),
    /// Raised when a value does not match the declared flag type.
    #[error("flag '{name}' expects a {expected} value, got {actual}")]
    TypeMismatch {
        /// Flag name.
        name: String,
        /// Declared type.
        expected: &'static str,
        /// Type of the rejected value.
        actual: &'static str,
    },
    /// Raised when text cannot be parsed as a boolean.
    #[error("flag '{name}' expects true or false, got '{value}'")]
    InvalidBool {
        /// Flag name.
        name: String,
        /// Rejected text.
        value: String,
    },
}

/// Set of declared flags and their current values.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FlagSet {
    values: BTreeMap<String, FlagValue>,
}

impl FlagSet {
    /// Creates an empty flag set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a boolean flag.
    pub fn define_bool(&mut self, name: &str, default: bool) {
        self.values
            .insert(name.to_owned(), FlagValue::Bool(default));
    }

    /// Declares a text flag.
    pub fn define_text(&mut self, name: &str, default: &str) {
        self.values
            .insert(name.to_owned(), FlagValue::Text(default.to_owned()));
    }

    /// Declares a list flag with no entries.
    pub fn define_list(&mut self, name: &str) {
        self.values
            .insert(name.to_owned(), FlagValue::List(Vec::new()));
    }

    /// Returns `true` when `name` has been declared.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Sets a flag from its textual form, as a command line would.
    ///
    /// Booleans accept `true`/`false`; lists are comma separated.
    ///
    /// # Errors
    ///
    /// Returns [`FlagError::Unknown`] for undeclared flags and
    /// [`FlagError::InvalidBool`] for malformed booleans.
    pub fn set(&mut self, name: &str, raw: &str) -> Result<(), FlagError> {
        let slot = self
            .values
            .get_mut(name)
            .ok_or_else(|| FlagError::Unknown(name.to_owned()))?;
        *slot = match slot {
            FlagValue::Bool(_) => FlagValue::Bool(raw.trim().parse().map_err(|_| {
                FlagError::InvalidBool {
                    name: name.to_owned(),
                    value: raw.to_owned(),
                }
            })?),
            FlagValue::Text(_) => FlagValue::Text(raw.to_owned()),
            FlagValue::List(_) => FlagValue::List(
                raw.split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(str::to_owned)
                    .collect(),
            ),
        };
        Ok(())
    }

    /// Replaces a flag with a typed value.
    ///
    /// # Errors
    ///
    /// Returns [`FlagError::Unknown`] for undeclared flags and
    /// [`FlagError::TypeMismatch`] when the value type differs from the
    /// declaration.
    pub fn set_value(&mut self, name: &str, value: FlagValue) -> Result<(), FlagError> {
        let slot = self
            .values
            .get_mut(name)
            .ok_or_else(|| FlagError::Unknown(name.to_owned()))?;
        if std::mem::discriminant(slot) != std::mem::discriminant(&value) {
            return Err(FlagError::TypeMismatch {
                name: name.to_owned(),
                expected: slot.kind(),
                actual: value.kind(),
            });
        }
        *slot = value;
        Ok(())
    }

    fn get(&self, name: &str) -> Result<&FlagValue, FlagError> {
        self.values
            .get(name)
            .ok_or_else(|| FlagError::Unknown(name.to_owned()))
    }

    fn mismatch(name: &str, expected: &'static str, value: &FlagValue) -> FlagError {
        FlagError::TypeMismatch {
            name: name.to_owned(),
            expected,
            actual: value.kind(),
        }
    }

    /// Reads a boolean flag.
    ///
    /// # Errors
    ///
    /// Returns [`FlagError`] when the flag is undeclared or not a boolean.
    pub fn bool(&self, name: &str) -> Result<bool, FlagError> {
        match self.get(name)? {
            FlagValue::Bool(value) => Ok(*value),
            other => Err(Self::mismatch(name, "bool", other)),
        }
    }

    /// Reads a text flag.
    ///
    /// # Errors
    ///
    /// Returns [`FlagError`] when the flag is undeclared or not text.
    pub fn text(&self, name: &str) -> Result<String, FlagError> {
        match self.get(name)? {
            FlagValue::Text(value) => Ok(value.clone()),
            other => Err(Self::mismatch(name, "string", other)),
        }
    }

    /// Reads a list flag.
    ///
    /// # Errors
    ///
    /// Returns [`FlagError`] when the flag is undeclared or not a list.
    pub fn list(&self, name: &str) -> Result<Vec<String>, FlagError> {
        match self.get(name)? {
            FlagValue::List(value) => Ok(value.clone()),
            other => Err(Self::mismatch(name, "list", other)),
        }
    }
}

/// Errors raised while merging flag groups into a configuration.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum MergeError {
    /// Raised when the JSON base configuration cannot be used.
    #[error("base configuration {path}: {message}")]
    ConfigFile {
        /// Path named by the `config` flag.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when an `envs` entry is not of the form `KEY=VALUE`.
    #[error("environment entry '{0}' must look like KEY=VALUE")]
    InvalidEnv(String),
}

/// A group of related flags merged into a configuration as a unit.
pub trait FlagGroup: Send + Sync {
    /// Declares the group's flags and defaults on `flags`.
    fn persist(flags: &mut FlagSet)
    where
        Self: Sized;

    /// Reads the group's current values from `flags`.
    ///
    /// # Errors
    ///
    /// Returns [`FlagError`] when a flag is missing or has the wrong type.
    fn from_flags(flags: &FlagSet) -> Result<Self, FlagError>
    where
        Self: Sized;

    /// Applies the group to `config`.
    ///
    /// # Errors
    ///
    /// Returns [`MergeError`] when a value cannot be applied.
    fn merge(&self, config: &mut ImageConfig) -> Result<(), MergeError>;
}

/// `config` flag: optional JSON base configuration.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConfigCommandFlags {
    config_file: String,
}

impl FlagGroup for ConfigCommandFlags {
    fn persist(flags: &mut FlagSet) {
        flags.define_text(CONFIG, "");
    }

    fn from_flags(flags: &FlagSet) -> Result<Self, FlagError> {
        Ok(Self {
            config_file: flags.text(CONFIG)?,
        })
    }

    fn merge(&self, config: &mut ImageConfig) -> Result<(), MergeError> {
        if self.config_file.trim().is_empty() {
            return Ok(());
        }
        let path = Utf8PathBuf::from(self.config_file.trim());
        let contents = super::source::read_file(&path).map_err(|err| MergeError::ConfigFile {
            path: path.clone(),
            message: err.to_string(),
        })?;
        let base: ImageConfig =
            serde_json::from_str(&contents).map_err(|err| MergeError::ConfigFile {
                path,
                message: err.to_string(),
            })?;
        config.overlay(base);
        Ok(())
    }
}

/// Output verbosity switches.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GlobalCommandFlags {
    show_debug: bool,
    show_warnings: bool,
    show_errors: bool,
}

impl FlagGroup for GlobalCommandFlags {
    fn persist(flags: &mut FlagSet) {
        flags.define_bool(SHOW_DEBUG, false);
        flags.define_bool(SHOW_WARNINGS, false);
        flags.define_bool(SHOW_ERRORS, false);
    }

    fn from_flags(flags: &FlagSet) -> Result<Self, FlagError> {
        Ok(Self {
            show_debug: flags.bool(SHOW_DEBUG)?,
            show_warnings: flags.bool(SHOW_WARNINGS)?,
            show_errors: flags.bool(SHOW_ERRORS)?,
        })
    }

    fn merge(&self, config: &mut ImageConfig) -> Result<(), MergeError> {
        config.run_config.show_debug = self.show_debug;
        config.run_config.show_warnings = self.show_warnings;
        config.run_config.show_errors = self.show_errors;
        Ok(())
    }
}

/// Nightly kernel selection.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NightlyCommandFlags {
    nightly: bool,
}

impl FlagGroup for NightlyCommandFlags {
    fn persist(flags: &mut FlagSet) {
        flags.define_bool(NIGHTLY, false);
    }

    fn from_flags(flags: &FlagSet) -> Result<Self, FlagError> {
        Ok(Self {
            nightly: flags.bool(NIGHTLY)?,
        })
    }

    fn merge(&self, config: &mut ImageConfig) -> Result<(), MergeError> {
        config.nightly = self.nightly;
        Ok(())
    }
}

/// Kernel version selection.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KernelVersionFlags {
    nanos_version: String,
}

impl FlagGroup for KernelVersionFlags {
    fn persist(flags: &mut FlagSet) {
        flags.define_text(NANOS_VERSION, "");
    }

    fn from_flags(flags: &FlagSet) -> Result<Self, FlagError> {
        Ok(Self {
            nanos_version: flags.text(NANOS_VERSION)?,
        })
    }

    fn merge(&self, config: &mut ImageConfig) -> Result<(), MergeError> {
        if !self.nanos_version.is_empty() {
            config.nanos_version.clone_from(&self.nanos_version);
        }
        Ok(())
    }
}

/// Image build options.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BuildImageFlags {
    image_name: String,
    target_root: String,
    args: Vec<String>,
    envs: Vec<String>,
}

impl FlagGroup for BuildImageFlags {
    fn persist(flags: &mut FlagSet) {
        flags.define_text(IMAGE_NAME, "");
        flags.define_text(TARGET_ROOT, "");
        flags.define_list(ARGS);
        flags.define_list(ENVS);
    }

    fn from_flags(flags: &FlagSet) -> Result<Self, FlagError> {
        Ok(Self {
            image_name: flags.text(IMAGE_NAME)?,
            target_root: flags.text(TARGET_ROOT)?,
            args: flags.list(ARGS)?,
            envs: flags.list(ENVS)?,
        })
    }

    fn merge(&self, config: &mut ImageConfig) -> Result<(), MergeError> {
        let mut vars = Vec::with_capacity(self.envs.len());
        for entry in &self.envs {
            let (key, value) = entry
                .split_once('=')
                .filter(|(key, _)| !key.trim().is_empty())
                .ok_or_else(|| MergeError::InvalidEnv(entry.clone()))?;
            vars.push((key.trim().to_owned(), value.to_owned()));
        }

        if !self.image_name.is_empty() {
            config.run_config.image_name.clone_from(&self.image_name);
        }
        if !self.target_root.is_empty() {
            config.target_root.clone_from(&self.target_root);
        }
        config.args.extend(self.args.iter().cloned());
        config.import_env(vars);
        Ok(())
    }
}

/// Cloud provider target.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProviderCommandFlags {
    target_cloud: String,
    project_id: String,
    zone: String,
}

impl FlagGroup for ProviderCommandFlags {
    fn persist(flags: &mut FlagSet) {
        flags.define_text(TARGET_CLOUD, DEFAULT_TARGET_CLOUD);
        flags.define_text(PROJECT_ID, "");
        flags.define_text(ZONE, "");
    }

    fn from_flags(flags: &FlagSet) -> Result<Self, FlagError> {
        Ok(Self {
            target_cloud: flags.text(TARGET_CLOUD)?,
            project_id: flags.text(PROJECT_ID)?,
            zone: flags.text(ZONE)?,
        })
    }

    fn merge(&self, config: &mut ImageConfig) -> Result<(), MergeError> {
        config.cloud_config.platform.clone_from(&self.target_cloud);
        if !self.project_id.is_empty() {
            config.cloud_config.project_id.clone_from(&self.project_id);
        }
        if !self.zone.is_empty() {
            config.cloud_config.zone.clone_from(&self.zone);
        }
        Ok(())
    }
}

/// Package selection.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PackageFlags {
    package: String,
    local: bool,
}

impl FlagGroup for PackageFlags {
    fn persist(flags: &mut FlagSet) {
        flags.define_text(PACKAGE, "");
        flags.define_bool(LOCAL, false);
    }

    fn from_flags(flags: &FlagSet) -> Result<Self, FlagError> {
        Ok(Self {
            package: flags.text(PACKAGE)?,
            local: flags.bool(LOCAL)?,
        })
    }

    fn merge(&self, config: &mut ImageConfig) -> Result<(), MergeError> {
        if !self.package.is_empty() {
            config.package.clone_from(&self.package);
        }
        config.local_package = self.local;
        Ok(())
    }
}

/// Flag groups merged in their fixed order.
pub struct MergeContainer {
    groups: Vec<Box<dyn FlagGroup>>,
}

impl MergeContainer {
    /// Declares every group's flags on `flags`.
    pub fn persist_all(flags: &mut FlagSet) {
        ConfigCommandFlags::persist(flags);
        GlobalCommandFlags::persist(flags);
        NightlyCommandFlags::persist(flags);
        KernelVersionFlags::persist(flags);
        BuildImageFlags::persist(flags);
        ProviderCommandFlags::persist(flags);
        PackageFlags::persist(flags);
    }

    /// Reads every group from `flags`, in merge order.
    ///
    /// # Errors
    ///
    /// Returns [`FlagError`] when a group's flags are missing or mistyped.
    pub fn from_flags(flags: &FlagSet) -> Result<Self, FlagError> {
        let groups: Vec<Box<dyn FlagGroup>> = vec![
            Box::new(ConfigCommandFlags::from_flags(flags)?),
            Box::new(GlobalCommandFlags::from_flags(flags)?),
            Box::new(NightlyCommandFlags::from_flags(flags)?),
            Box::new(KernelVersionFlags::from_flags(flags)?),
            Box::new(BuildImageFlags::from_flags(flags)?),
            Box::new(ProviderCommandFlags::from_flags(flags)?),
            Box::new(PackageFlags::from_flags(flags)?),
        ];
        Ok(Self { groups })
    }

    /// Merges every group into `config`, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns the first [`MergeError`] raised by a group.
    pub fn merge(&self, config: &mut ImageConfig) -> Result<(), MergeError> {
        for group in &self.groups {
            group.merge(config)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for MergeContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergeContainer")
            .field("groups", &self.groups.len())
            .finish()
    }
}
