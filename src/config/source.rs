//! Discovery of the service configuration file.

use std::io;
use std::path::PathBuf;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};

use super::ConfigError;

const APP_NAME: &str = "orca";

/// Name of the configuration file in every searched directory.
pub const CONFIG_FILE_NAME: &str = "config";

/// Environment variable naming an explicit configuration file; read by the
/// binary's `--config` flag.
pub const CONFIG_ENV_VAR: &str = "ORCA_CONFIG_PATH";

/// Ordered list of candidate configuration files; the first existing one wins.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConfigSource {
    candidates: Vec<Utf8PathBuf>,
}

impl ConfigSource {
    /// Builds the standard search order: system-wide, user config directory,
    /// user home, then the current directory.
    #[must_use]
    pub fn standard() -> Self {
        Self::standard_with_home(home_dir())
    }

    fn standard_with_home(home: Option<Utf8PathBuf>) -> Self {
        let mut candidates = vec![Utf8PathBuf::from("/etc").join(APP_NAME).join(CONFIG_FILE_NAME)];
        if let Some(home_path) = home {
            candidates.push(home_path.join(".config").join(APP_NAME).join(CONFIG_FILE_NAME));
            candidates.push(home_path.join(format!(".{APP_NAME}")).join(CONFIG_FILE_NAME));
        }
        candidates.push(Utf8PathBuf::from(".").join(CONFIG_FILE_NAME));
        Self { candidates }
    }

    /// Uses a single explicit configuration file.
    #[must_use]
    pub fn explicit(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            candidates: vec![path.into()],
        }
    }

    /// Uses a caller-provided candidate list.
    #[must_use]
    pub const fn with_candidates(candidates: Vec<Utf8PathBuf>) -> Self {
        Self { candidates }
    }

    /// Returns the candidates in search order.
    #[must_use]
    pub fn candidates(&self) -> &[Utf8PathBuf] {
        &self.candidates
    }

    /// Returns the first candidate that exists.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] when no candidate exists, or
    /// [`ConfigError::Io`] when existence cannot be determined.
    pub fn locate(&self) -> Result<Utf8PathBuf, ConfigError> {
        for candidate in &self.candidates {
            if path_exists(candidate)? {
                return Ok(candidate.clone());
            }
        }

        Err(ConfigError::NotFound {
            searched: self
                .candidates
                .iter()
                .map(|candidate| candidate.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        })
    }
}

fn home_dir() -> Option<Utf8PathBuf> {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
}

fn split(path: &Utf8Path) -> Result<(&Utf8Path, &str), ConfigError> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    let file_name = path.file_name().ok_or_else(|| ConfigError::Io {
        path: path.to_path_buf(),
        message: String::from("configuration file path is missing a filename"),
    })?;
    Ok((parent, file_name))
}

fn path_exists(path: &Utf8Path) -> Result<bool, ConfigError> {
    let (parent, file_name) = split(path)?;

    match Dir::open_ambient_dir(parent, ambient_authority()) {
        Ok(dir) => dir.try_exists(file_name).map_err(|err| ConfigError::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        }),
        Err(err) if matches!(err.kind(), io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied) => {
            Ok(false)
        }
        Err(err) => Err(ConfigError::Io {
            path: parent.to_path_buf(),
            message: err.to_string(),
        }),
    }
}

/// Reads a whole file relative to its parent directory handle.
pub(crate) fn read_file(path: &Utf8Path) -> Result<String, ConfigError> {
    let (parent, file_name) = split(path)?;

    let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(|err| ConfigError::Io {
        path: parent.to_path_buf(),
        message: err.to_string(),
    })?;

    dir.read_to_string(file_name).map_err(|err| ConfigError::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}
