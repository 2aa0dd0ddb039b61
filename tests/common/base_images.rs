//! Helpers that write real tar base images for integration tests.
//!
//! Include from a test crate with:
//!
//! ```rust
//! #[path = "common/base_images.rs"]
//! mod base_images;
//! ```

use std::fs::File;

use camino::{Utf8Path, Utf8PathBuf};
use serde_json::Value;
use tempfile::TempDir;

/// A file placed under `rootfs/` in the archive.
pub struct RootFile<'a> {
    /// Path inside the image, without the leading slash.
    pub path: &'a str,
    /// File contents.
    pub contents: &'a [u8],
    /// Permission bits recorded in the archive.
    pub mode: u32,
}

/// Scratch directory holding one base image archive.
pub struct BaseImageFixture {
    _dir: TempDir,
    /// Archive path.
    pub path: Utf8PathBuf,
}

/// Writes `base.tar` with the given manifest and root files.
pub fn write_base_image(manifest: Option<&Value>, files: &[RootFile<'_>]) -> BaseImageFixture {
    let dir = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf())
        .unwrap_or_else(|path| panic!("utf8 temp path: {}", path.display()));
    let path = root.join("base.tar");
    write_archive(&path, manifest, files);
    BaseImageFixture { _dir: dir, path }
}

fn append(builder: &mut tar::Builder<File>, path: &str, contents: &[u8], mode: u32) {
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Regular);
    header.set_mode(mode);
    header.set_size(u64::try_from(contents.len()).unwrap_or_else(|err| panic!("size: {err}")));
    header.set_cksum();
    builder
        .append_data(&mut header, path, contents)
        .unwrap_or_else(|err| panic!("append {path}: {err}"));
}

fn write_archive(path: &Utf8Path, manifest: Option<&Value>, files: &[RootFile<'_>]) {
    let file = File::create(path).unwrap_or_else(|err| panic!("create {path}: {err}"));
    let mut builder = tar::Builder::new(file);
    if let Some(value) = manifest {
        append(&mut builder, "manifest.json", value.to_string().as_bytes(), 0o644);
    }
    for root_file in files {
        append(
            &mut builder,
            &format!("rootfs/{}", root_file.path),
            root_file.contents,
            root_file.mode,
        );
    }
    builder
        .finish()
        .unwrap_or_else(|err| panic!("finish {path}: {err}"));
}
