//! Scoped temporary resources used while preparing an image.
//!
//! Every resource here is removed when dropped, so early returns cannot
//! leak files into the system temporary directory.

use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use tempfile::{NamedTempFile, TempDir};
use thiserror::Error;
use tracing::warn;

use crate::base_image::{BaseImage, BaseImageError};

/// Prefix of every temporary workspace directory.
pub const WORKSPACE_PREFIX: &str = "orca-";

/// Maximum directory nesting copied out of a base image.
pub const MAX_COPY_DEPTH: usize = 64;

const EXECUTABLE_MODE: u32 = 0o755;

/// Errors raised while creating or filling a workspace.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum WorkspaceError {
    /// Raised when a temporary path cannot be created.
    #[error("failed to create temporary {kind}: {message}")]
    Create {
        /// Kind of resource (`directory` or `file`).
        kind: &'static str,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when the temporary path is not valid UTF-8.
    #[error("temporary path is not valid UTF-8: {0}")]
    NonUtf8Path(String),
    /// Raised when a directory cannot be created inside the workspace.
    #[error("failed to create directory {path}: {message}")]
    CreateDir {
        /// Directory that could not be created.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when reading or copying from the base image fails.
    #[error("failed to copy from base image: {0}")]
    Image(#[from] BaseImageError),
    /// Raised when the base image nests deeper than [`MAX_COPY_DEPTH`].
    #[error("base image directory {path} exceeds the maximum depth of {limit}")]
    TooDeep {
        /// Image directory where the limit was hit.
        path: String,
        /// Configured depth limit.
        limit: usize,
    },
}

/// Temporary directory holding the extracted base image tree.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
    root: Utf8PathBuf,
}

impl Workspace {
    /// Creates a fresh, uniquely named workspace directory.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::Create`] when the directory cannot be
    /// created.
    pub fn create() -> Result<Self, WorkspaceError> {
        let dir = tempfile::Builder::new()
            .prefix(WORKSPACE_PREFIX)
            .tempdir()
            .map_err(|err| WorkspaceError::Create {
                kind: "directory",
                message: err.to_string(),
            })?;
        let root = utf8(dir.path())?;
        Ok(Self { dir, root })
    }

    /// Workspace root.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Removes the workspace now, reporting failures instead of ignoring
    /// them as the drop path does.
    ///
    /// # Errors
    ///
    /// Returns the I/O error raised while deleting the tree.
    pub fn close(self) -> io::Result<()> {
        self.dir.close()
    }
}

/// Temporary file reserved for the build output.
#[derive(Debug)]
pub struct OutputFile {
    file: NamedTempFile,
    path: Utf8PathBuf,
}

impl OutputFile {
    /// Reserves a uniquely named file whose name starts with `prefix`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::Create`] when the file cannot be created.
    pub fn reserve(prefix: &str) -> Result<Self, WorkspaceError> {
        let file = tempfile::Builder::new()
            .prefix(prefix)
            .tempfile()
            .map_err(|err| WorkspaceError::Create {
                kind: "file",
                message: err.to_string(),
            })?;
        let path = utf8(file.path())?;
        Ok(Self { file, path })
    }

    /// Path of the reserved file.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Deletes the file now.
    ///
    /// # Errors
    ///
    /// Returns the I/O error raised while deleting the file.
    pub fn close(self) -> io::Result<()> {
        self.file.close()
    }
}

/// Removes a build artifact when dropped.
#[derive(Debug)]
pub struct ArtifactGuard {
    path: Utf8PathBuf,
}

impl ArtifactGuard {
    /// Takes ownership of the artifact at `path`.
    #[must_use]
    pub const fn new(path: Utf8PathBuf) -> Self {
        Self { path }
    }

    /// Artifact path.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

impl Drop for ArtifactGuard {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => warn!(path = %self.path, error = %err, "failed to remove build artifact"),
        }
    }
}

fn utf8(path: &std::path::Path) -> Result<Utf8PathBuf, WorkspaceError> {
    Utf8PathBuf::from_path_buf(path.to_path_buf())
        .map_err(|raw| WorkspaceError::NonUtf8Path(raw.display().to_string()))
}

/// Copies the tree under `source` in `image` into `dest`.
///
/// Directories are created before their contents and file modes are
/// preserved. The first failing entry aborts the copy.
///
/// # Errors
///
/// Returns [`WorkspaceError`] when listing, copying, or creating a directory
/// fails, or when the tree nests deeper than [`MAX_COPY_DEPTH`].
pub fn copy_all<I>(image: &I, source: &str, dest: &Utf8Path) -> Result<(), WorkspaceError>
where
    I: BaseImage + ?Sized,
{
    copy_tree(image, source, dest, 0)
}

fn copy_tree<I>(image: &I, source: &str, dest: &Utf8Path, depth: usize) -> Result<(), WorkspaceError>
where
    I: BaseImage + ?Sized,
{
    if depth >= MAX_COPY_DEPTH {
        return Err(WorkspaceError::TooDeep {
            path: source.to_owned(),
            limit: MAX_COPY_DEPTH,
        });
    }

    for entry in image.read_dir(source)? {
        let child_source = join_image_path(source, &entry.name);
        let child_dest = dest.join(&entry.name);
        if entry.is_dir {
            fs::create_dir_all(&child_dest).map_err(|err| WorkspaceError::CreateDir {
                path: child_dest.clone(),
                message: err.to_string(),
            })?;
            copy_tree(image, &child_source, &child_dest, depth + 1)?;
        } else {
            image.copy_file(&child_source, &child_dest, true)?;
        }
    }
    Ok(())
}

fn join_image_path(parent: &str, name: &str) -> String {
    let trimmed = parent.trim_end_matches('/');
    format!("{trimmed}/{name}")
}

/// Resolves the image entry point inside `root`.
///
/// Only normal components of `entry_point` are kept, so absolute paths land
/// under `root` and `..` never climbs above it.
#[must_use]
pub fn resolve_entry_point(root: &Utf8Path, entry_point: &str) -> Utf8PathBuf {
    let mut parts: Vec<&str> = Vec::new();
    for component in Utf8Path::new(entry_point).components() {
        match component {
            Utf8Component::Normal(part) => parts.push(part),
            Utf8Component::ParentDir => {
                parts.pop();
            }
            Utf8Component::RootDir | Utf8Component::CurDir | Utf8Component::Prefix(_) => {}
        }
    }

    parts
        .into_iter()
        .fold(root.to_path_buf(), |path, part| path.join(part))
}

/// Marks `path` as executable (`0755`).
///
/// # Errors
///
/// Returns the I/O error raised by the permission change.
pub fn mark_executable(path: &Utf8Path) -> io::Result<()> {
    fs::set_permissions(path, fs::Permissions::from_mode(EXECUTABLE_MODE))
}
