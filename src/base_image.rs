//! Read-only access to base image archives.
//!
//! A base image is an uncompressed tar archive holding a `manifest.json`
//! (argument vector and environment) next to a `rootfs/` file tree. The
//! archive is indexed once on open; file contents are streamed from their
//! recorded offsets when copied out.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::os::unix::fs::{PermissionsExt, symlink};
use std::path::{Component, Path};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use thiserror::Error;

const MANIFEST_NAME: &str = "manifest.json";
const ROOTFS_DIR: &str = "rootfs";
const MODE_MASK: u32 = 0o7777;

/// One entry returned by [`BaseImage::read_dir`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DirEntry {
    /// Entry name relative to the listed directory.
    pub name: String,
    /// Whether the entry is a directory.
    pub is_dir: bool,
}

impl DirEntry {
    /// Creates a file entry.
    #[must_use]
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_dir: false,
        }
    }

    /// Creates a directory entry.
    #[must_use]
    pub fn dir(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_dir: true,
        }
    }
}

/// Errors raised while reading a base image.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum BaseImageError {
    /// Raised when the archive cannot be opened or read.
    #[error("failed to read base image {path}: {message}")]
    Open {
        /// Archive path.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when the archive layout or manifest is invalid.
    #[error("malformed base image {path}: {message}")]
    Malformed {
        /// Archive path.
        path: Utf8PathBuf,
        /// Description of the problem.
        message: String,
    },
    /// Raised when a path does not exist inside the image.
    #[error("no such entry in base image: {0}")]
    NotFound(String),
    /// Raised when a directory listing targets a file.
    #[error("not a directory in base image: {0}")]
    NotADirectory(String),
    /// Raised when a copy targets a directory.
    #[error("not a file or symbolic link in base image: {0}")]
    NotAFile(String),
    /// Raised when writing a copied file fails.
    #[error("failed to write {path}: {message}")]
    Write {
        /// Destination path.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
}

/// Read-only view of an opened base image.
///
/// Paths are absolute within the image (`/`, `/bin/worker`); a leading slash
/// is optional.
pub trait BaseImage: Send {
    /// Lists the entries of the directory at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`BaseImageError::NotFound`] or
    /// [`BaseImageError::NotADirectory`] when `path` is not a directory.
    fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>, BaseImageError>;

    /// Argument vector; the first element is the entry point.
    fn args(&self) -> &[String];

    /// Environment variables defined by the image.
    fn env(&self) -> &BTreeMap<String, String>;

    /// Copies the file at `source` to `dest`, optionally applying the mode
    /// recorded in the image. Symbolic links are recreated with their
    /// original target.
    ///
    /// # Errors
    ///
    /// Returns [`BaseImageError`] when the source is missing, is a
    /// directory, or the destination cannot be written.
    fn copy_file(
        &self,
        source: &str,
        dest: &Utf8Path,
        preserve_mode: bool,
    ) -> Result<(), BaseImageError>;
}

/// Opens base images from archive paths.
pub trait BaseImageOpener: Send + Sync {
    /// Concrete image type produced by this opener.
    type Image: BaseImage + 'static;

    /// Opens the archive at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`BaseImageError`] when the archive cannot be read.
    fn open(&self, path: &Utf8Path) -> Result<Self::Image, BaseImageError>;
}

/// Opener for tar base images.
#[derive(Clone, Copy, Debug, Default)]
pub struct TarImageOpener;

impl BaseImageOpener for TarImageOpener {
    type Image = TarBaseImage;

    fn open(&self, path: &Utf8Path) -> Result<Self::Image, BaseImageError> {
        TarBaseImage::open(path)
    }
}

#[derive(Debug, Default, Deserialize)]
struct Manifest {
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    env: BTreeMap<String, String>,
}

#[derive(Clone, Debug)]
enum NodeKind {
    Dir,
    File { offset: u64, size: u64 },
    Symlink { target: String },
}

#[derive(Clone, Debug)]
struct Node {
    kind: NodeKind,
    mode: u32,
}

/// Base image backed by an uncompressed tar archive.
#[derive(Debug)]
pub struct TarBaseImage {
    archive: Utf8PathBuf,
    nodes: BTreeMap<String, Node>,
    manifest: Manifest,
}

impl TarBaseImage {
    /// Opens and indexes the archive at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`BaseImageError::Open`] when the archive cannot be read and
    /// [`BaseImageError::Malformed`] when an entry or the manifest is
    /// invalid.
    pub fn open(path: &Utf8Path) -> Result<Self, BaseImageError> {
        let open_error = |err: io::Error| BaseImageError::Open {
            path: path.to_path_buf(),
            message: err.to_string(),
        };

        let file = File::open(path).map_err(open_error)?;
        let mut archive = tar::Archive::new(file);
        let mut nodes = BTreeMap::new();
        nodes.insert(String::new(), Node {
            kind: NodeKind::Dir,
            mode: 0o755,
        });
        let mut manifest = None;

        for entry_result in archive.entries().map_err(open_error)? {
            let mut entry = entry_result.map_err(open_error)?;
            let entry_path = entry.path().map_err(open_error)?.into_owned();
            let Some(components) = normal_components(&entry_path) else {
                return Err(BaseImageError::Malformed {
                    path: path.to_path_buf(),
                    message: format!("unsupported entry path {}", entry_path.display()),
                });
            };

            let entry_type = entry.header().entry_type();
            match components.split_first() {
                Some((first, [])) if first == MANIFEST_NAME && entry_type.is_file() => {
                    let mut raw = String::new();
                    entry.read_to_string(&mut raw).map_err(open_error)?;
                    let parsed: Manifest =
                        serde_json::from_str(&raw).map_err(|err| BaseImageError::Malformed {
                            path: path.to_path_buf(),
                            message: format!("invalid {MANIFEST_NAME}: {err}"),
                        })?;
                    manifest = Some(parsed);
                }
                Some((first, rest)) if first == ROOTFS_DIR && !rest.is_empty() => {
                    let key = rest.join("/");
                    let mode = entry.header().mode().map_err(open_error)? & MODE_MASK;
                    let malformed = |message: String| BaseImageError::Malformed {
                        path: path.to_path_buf(),
                        message,
                    };
                    let node = if entry_type.is_dir() {
                        Node {
                            kind: NodeKind::Dir,
                            mode,
                        }
                    } else if entry_type.is_file() {
                        Node {
                            kind: NodeKind::File {
                                offset: entry.raw_file_position(),
                                size: entry.size(),
                            },
                            mode,
                        }
                    } else if entry_type.is_symlink() {
                        let target = entry
                            .link_name()
                            .map_err(open_error)?
                            .and_then(|target| target.to_str().map(str::to_owned))
                            .ok_or_else(|| malformed(format!("symbolic link {key} has no target")))?;
                        Node {
                            kind: NodeKind::Symlink { target },
                            mode,
                        }
                    } else if entry_type.is_hard_link() {
                        let target = entry
                            .link_name()
                            .map_err(open_error)?
                            .and_then(|target| rootfs_key(&target))
                            .ok_or_else(|| malformed(format!("hard link {key} has no target in {ROOTFS_DIR}")))?;
                        nodes
                            .get(&target)
                            .filter(|node| !matches!(node.kind, NodeKind::Dir))
                            .cloned()
                            .ok_or_else(|| {
                                malformed(format!("hard link {key} points to missing entry {target}"))
                            })?
                    } else {
                        return Err(malformed(format!("unsupported entry type {entry_type:?} at {key}")));
                    };
                    insert_node(&mut nodes, key, node).map_err(malformed)?;
                }
                _ => {}
            }
        }

        Ok(Self {
            archive: path.to_path_buf(),
            nodes,
            manifest: manifest.unwrap_or_default(),
        })
    }

    fn node(&self, path: &str) -> Result<(String, Node), BaseImageError> {
        let key = normalize(path);
        self.nodes
            .get(&key)
            .cloned()
            .map(|node| (key, node))
            .ok_or_else(|| BaseImageError::NotFound(path.to_owned()))
    }
}

impl BaseImage for TarBaseImage {
    fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>, BaseImageError> {
        let (key, node) = self.node(path)?;
        if !matches!(node.kind, NodeKind::Dir) {
            return Err(BaseImageError::NotADirectory(path.to_owned()));
        }

        Ok(self
            .nodes
            .iter()
            .filter(|(candidate, _)| !candidate.is_empty())
            .filter_map(|(candidate, child)| {
                let (parent, name) = split_parent(candidate);
                (parent == key).then(|| DirEntry {
                    name: name.to_owned(),
                    is_dir: matches!(child.kind, NodeKind::Dir),
                })
            })
            .collect())
    }

    fn args(&self) -> &[String] {
        &self.manifest.args
    }

    fn env(&self) -> &BTreeMap<String, String> {
        &self.manifest.env
    }

    fn copy_file(
        &self,
        source: &str,
        dest: &Utf8Path,
        preserve_mode: bool,
    ) -> Result<(), BaseImageError> {
        let (_, node) = self.node(source)?;
        let write_error = |err: io::Error| BaseImageError::Write {
            path: dest.to_path_buf(),
            message: err.to_string(),
        };
        let (offset, size) = match node.kind {
            NodeKind::File { offset, size } => (offset, size),
            NodeKind::Symlink { target } => return symlink(target, dest).map_err(write_error),
            NodeKind::Dir => return Err(BaseImageError::NotAFile(source.to_owned())),
        };

        let read_error = |err: io::Error| BaseImageError::Open {
            path: self.archive.clone(),
            message: err.to_string(),
        };

        let mut archive = File::open(&self.archive).map_err(read_error)?;
        archive.seek(SeekFrom::Start(offset)).map_err(read_error)?;
        let mut contents = archive.take(size);
        let mut target = File::create(dest).map_err(write_error)?;
        io::copy(&mut contents, &mut target).map_err(write_error)?;

        if preserve_mode {
            fs::set_permissions(dest, fs::Permissions::from_mode(node.mode)).map_err(write_error)?;
        }
        Ok(())
    }
}

fn normal_components(path: &Path) -> Option<Vec<String>> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?.to_owned()),
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(parts)
}

fn normalize(path: &str) -> String {
    path.split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .collect::<Vec<_>>()
        .join("/")
}

fn split_parent(key: &str) -> (&str, &str) {
    key.rsplit_once('/').unwrap_or(("", key))
}

fn rootfs_key(path: &Path) -> Option<String> {
    let components = normal_components(path)?;
    match components.split_first() {
        Some((first, rest)) if first == ROOTFS_DIR && !rest.is_empty() => Some(rest.join("/")),
        _ => None,
    }
}

/// Records `node` at `key`, implying missing parent directories.
///
/// An entry may not sit below a non-directory, and a directory may not be
/// replaced by a non-directory.
fn insert_node(nodes: &mut BTreeMap<String, Node>, key: String, node: Node) -> Result<(), String> {
    let mut current = key.as_str();
    while let Some((parent, _)) = current.rsplit_once('/') {
        let existing = nodes.entry(parent.to_owned()).or_insert(Node {
            kind: NodeKind::Dir,
            mode: 0o755,
        });
        if !matches!(existing.kind, NodeKind::Dir) {
            return Err(format!("{key} is nested under non-directory {parent}"));
        }
        current = parent;
    }

    let replaces_dir = nodes
        .get(&key)
        .is_some_and(|existing| matches!(existing.kind, NodeKind::Dir));
    if replaces_dir && !matches!(node.kind, NodeKind::Dir) {
        return Err(format!("{key} is both a directory and a non-directory"));
    }
    nodes.insert(key, node);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    struct ArchiveFixture {
        tmp: TempDir,
        path: Utf8PathBuf,
    }

    fn append_file(builder: &mut tar::Builder<File>, path: &str, mode: u32, data: &[u8]) {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_mode(mode);
        header.set_size(data.len() as u64);
        header.set_cksum();
        builder
            .append_data(&mut header, path, data)
            .unwrap_or_else(|err| panic!("append {path}: {err}"));
    }

    fn append_dir(builder: &mut tar::Builder<File>, path: &str) {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Directory);
        header.set_mode(0o755);
        header.set_size(0);
        header.set_cksum();
        builder
            .append_data(&mut header, path, io::empty())
            .unwrap_or_else(|err| panic!("append {path}: {err}"));
    }

    fn append_link(
        builder: &mut tar::Builder<File>,
        kind: tar::EntryType,
        path: &str,
        target: &str,
    ) {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(kind);
        header.set_mode(0o777);
        header.set_size(0);
        header
            .set_link_name(target)
            .unwrap_or_else(|err| panic!("link name {target}: {err}"));
        builder
            .append_data(&mut header, path, io::empty())
            .unwrap_or_else(|err| panic!("append {path}: {err}"));
    }

    fn write_archive(tmp: &TempDir, fill: impl FnOnce(&mut tar::Builder<File>)) -> Utf8PathBuf {
        let path = Utf8PathBuf::from_path_buf(tmp.path().join("links.tar"))
            .unwrap_or_else(|path| panic!("utf8 path: {}", path.display()));
        let file = File::create(&path).unwrap_or_else(|err| panic!("create archive: {err}"));
        let mut builder = tar::Builder::new(file);
        fill(&mut builder);
        builder
            .finish()
            .unwrap_or_else(|err| panic!("finish archive: {err}"));
        path
    }

    fn library_archive(tmp: &TempDir) -> Utf8PathBuf {
        write_archive(tmp, |builder| {
            append_file(builder, "rootfs/lib/libc-2.31.so", 0o755, b"libc");
            append_link(builder, tar::EntryType::Symlink, "rootfs/lib/libc.so.6", "libc-2.31.so");
            append_link(
                builder,
                tar::EntryType::Link,
                "rootfs/lib/libc-copy.so",
                "rootfs/lib/libc-2.31.so",
            );
        })
    }

    fn utf8_dir(tmp: &TempDir, name: &str) -> Utf8PathBuf {
        let dir = Utf8PathBuf::from_path_buf(tmp.path().join(name))
            .unwrap_or_else(|path| panic!("utf8 path: {}", path.display()));
        fs::create_dir_all(&dir).unwrap_or_else(|err| panic!("create {dir}: {err}"));
        dir
    }

    #[fixture]
    fn archive() -> ArchiveFixture {
        let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
        let path = Utf8PathBuf::from_path_buf(tmp.path().join("base.tar"))
            .unwrap_or_else(|path| panic!("utf8 path: {}", path.display()));
        let file = File::create(&path).unwrap_or_else(|err| panic!("create archive: {err}"));
        let mut builder = tar::Builder::new(file);
        append_file(
            &mut builder,
            "manifest.json",
            0o644,
            br#"{"args":["/bin/worker","--flag"],"env":{"NANOS_VERSION":"5.2"}}"#,
        );
        append_dir(&mut builder, "rootfs/bin");
        append_file(&mut builder, "rootfs/bin/worker", 0o755, b"#!worker");
        append_file(&mut builder, "rootfs/etc/app/settings.conf", 0o600, b"key=value");
        builder
            .finish()
            .unwrap_or_else(|err| panic!("finish archive: {err}"));
        ArchiveFixture { tmp, path }
    }

    fn open(fixture: &ArchiveFixture) -> TarBaseImage {
        TarBaseImage::open(&fixture.path).unwrap_or_else(|err| panic!("open image: {err}"))
    }

    #[rstest]
    fn reads_manifest(archive: ArchiveFixture) {
        let image = open(&archive);

        assert_eq!(image.args(), ["/bin/worker", "--flag"]);
        assert_eq!(image.env().get("NANOS_VERSION").map(String::as_str), Some("5.2"));
    }

    #[rstest]
    fn lists_root_with_implied_directories(archive: ArchiveFixture) {
        let image = open(&archive);

        let entries = image
            .read_dir("/")
            .unwrap_or_else(|err| panic!("read root: {err}"));
        assert_eq!(entries, vec![DirEntry::dir("bin"), DirEntry::dir("etc")]);
    }

    #[rstest]
    fn lists_nested_directory(archive: ArchiveFixture) {
        let image = open(&archive);

        let entries = image
            .read_dir("/etc/app")
            .unwrap_or_else(|err| panic!("read dir: {err}"));
        assert_eq!(entries, vec![DirEntry::file("settings.conf")]);
    }

    #[rstest]
    fn read_dir_rejects_files_and_missing_paths(archive: ArchiveFixture) {
        let image = open(&archive);

        assert_eq!(
            image.read_dir("/bin/worker"),
            Err(BaseImageError::NotADirectory(String::from("/bin/worker")))
        );
        assert_eq!(
            image.read_dir("/nope"),
            Err(BaseImageError::NotFound(String::from("/nope")))
        );
    }

    #[rstest]
    fn copies_contents_and_mode(archive: ArchiveFixture) {
        let image = open(&archive);
        let dest = Utf8PathBuf::from_path_buf(archive.tmp.path().join("worker"))
            .unwrap_or_else(|path| panic!("utf8 path: {}", path.display()));

        image
            .copy_file("/bin/worker", &dest, true)
            .unwrap_or_else(|err| panic!("copy: {err}"));

        let contents = fs::read(&dest).unwrap_or_else(|err| panic!("read copy: {err}"));
        assert_eq!(contents, b"#!worker");
        let mode = fs::metadata(&dest)
            .unwrap_or_else(|err| panic!("metadata: {err}"))
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[rstest]
    fn copy_rejects_directories(archive: ArchiveFixture) {
        let image = open(&archive);
        let dest = Utf8PathBuf::from_path_buf(archive.tmp.path().join("bin"))
            .unwrap_or_else(|path| panic!("utf8 path: {}", path.display()));

        assert_eq!(
            image.copy_file("/bin", &dest, true),
            Err(BaseImageError::NotAFile(String::from("/bin")))
        );
    }

    #[test]
    fn open_reports_missing_archive() {
        let err = TarBaseImage::open(Utf8Path::new("/nonexistent/base.tar"))
            .expect_err("missing archive should fail");
        assert!(matches!(err, BaseImageError::Open { .. }), "unexpected: {err:?}");
    }

    #[test]
    fn missing_manifest_yields_empty_args() {
        let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
        let path = Utf8PathBuf::from_path_buf(tmp.path().join("bare.tar"))
            .unwrap_or_else(|path| panic!("utf8 path: {}", path.display()));
        let file = File::create(&path).unwrap_or_else(|err| panic!("create archive: {err}"));
        let mut builder = tar::Builder::new(file);
        append_file(&mut builder, "rootfs/app", 0o755, b"app");
        builder
            .finish()
            .unwrap_or_else(|err| panic!("finish archive: {err}"));

        let image = TarBaseImage::open(&path).unwrap_or_else(|err| panic!("open: {err}"));
        assert!(image.args().is_empty());
        assert!(image.env().is_empty());
    }

    #[test]
    fn links_are_listed_alongside_files() {
        let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
        let image = TarBaseImage::open(&library_archive(&tmp))
            .unwrap_or_else(|err| panic!("open: {err}"));

        let entries = image
            .read_dir("/lib")
            .unwrap_or_else(|err| panic!("read dir: {err}"));
        assert_eq!(
            entries,
            vec![
                DirEntry::file("libc-2.31.so"),
                DirEntry::file("libc-copy.so"),
                DirEntry::file("libc.so.6"),
            ]
        );
    }

    #[test]
    fn symlink_is_recreated_with_its_target() {
        let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
        let image = TarBaseImage::open(&library_archive(&tmp))
            .unwrap_or_else(|err| panic!("open: {err}"));
        let dest = utf8_dir(&tmp, "out").join("libc.so.6");

        image
            .copy_file("/lib/libc.so.6", &dest, true)
            .unwrap_or_else(|err| panic!("copy: {err}"));

        let target = fs::read_link(&dest).unwrap_or_else(|err| panic!("read link: {err}"));
        assert_eq!(target, Path::new("libc-2.31.so"));
    }

    #[test]
    fn hard_link_copies_target_contents() {
        let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
        let image = TarBaseImage::open(&library_archive(&tmp))
            .unwrap_or_else(|err| panic!("open: {err}"));
        let dest = utf8_dir(&tmp, "out").join("libc-copy.so");

        image
            .copy_file("/lib/libc-copy.so", &dest, true)
            .unwrap_or_else(|err| panic!("copy: {err}"));

        assert_eq!(fs::read(&dest).unwrap_or_else(|err| panic!("read: {err}")), b"libc");
    }

    #[test]
    fn copied_tree_keeps_library_links() {
        let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
        let image = TarBaseImage::open(&library_archive(&tmp))
            .unwrap_or_else(|err| panic!("open: {err}"));
        let root = utf8_dir(&tmp, "workspace");

        crate::workspace::copy_all(&image, "/", &root)
            .unwrap_or_else(|err| panic!("copy tree: {err}"));

        let linked = root.join("lib/libc.so.6");
        assert!(
            fs::symlink_metadata(&linked)
                .is_ok_and(|meta| meta.file_type().is_symlink()),
            "{linked} should be a symbolic link"
        );
        assert_eq!(fs::read(&linked).unwrap_or_else(|err| panic!("read: {err}")), b"libc");
    }

    #[test]
    fn hard_link_to_missing_entry_is_malformed() {
        let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
        let path = write_archive(&tmp, |builder| {
            append_link(builder, tar::EntryType::Link, "rootfs/bin/app", "rootfs/bin/missing");
        });

        let err = TarBaseImage::open(&path).expect_err("dangling hard link");
        assert!(matches!(err, BaseImageError::Malformed { .. }), "unexpected: {err:?}");
    }

    #[rstest]
    #[case(tar::EntryType::Fifo)]
    #[case(tar::EntryType::Char)]
    #[case(tar::EntryType::Block)]
    fn special_entries_are_malformed(#[case] kind: tar::EntryType) {
        let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
        let path = write_archive(&tmp, |builder| {
            let mut header = tar::Header::new_gnu();
            header.set_entry_type(kind);
            header.set_mode(0o644);
            header.set_size(0);
            builder
                .append_data(&mut header, "rootfs/dev/node", io::empty())
                .unwrap_or_else(|err| panic!("append node: {err}"));
        });

        let err = TarBaseImage::open(&path).expect_err("special file");
        assert!(
            matches!(err, BaseImageError::Malformed { ref message, .. } if message.contains("dev/node")),
            "unexpected: {err:?}"
        );
    }

    #[test]
    fn entry_below_a_file_is_malformed() {
        let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
        let path = write_archive(&tmp, |builder| {
            append_file(builder, "rootfs/a", 0o644, b"file");
            append_file(builder, "rootfs/a/b", 0o644, b"nested");
        });

        let err = TarBaseImage::open(&path).expect_err("file used as directory");
        assert!(
            matches!(err, BaseImageError::Malformed { ref message, .. } if message.contains("non-directory a")),
            "unexpected: {err:?}"
        );
    }

    #[test]
    fn file_replacing_a_directory_is_malformed() {
        let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
        let path = write_archive(&tmp, |builder| {
            append_file(builder, "rootfs/a/b", 0o644, b"nested");
            append_file(builder, "rootfs/a", 0o644, b"file");
        });

        let err = TarBaseImage::open(&path).expect_err("directory replaced by file");
        assert!(matches!(err, BaseImageError::Malformed { .. }), "unexpected: {err:?}");
    }
}
