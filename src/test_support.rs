//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::ffi::OsString;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::sync::{Arc, Mutex, MutexGuard};

use camino::{Utf8Path, Utf8PathBuf};

use crate::base_image::{BaseImage, BaseImageError, BaseImageOpener, DirEntry};
use crate::command::{CommandError, CommandOutput, CommandRunner};
use crate::image_config::ImageConfig;
use crate::provider::{Provider, ProviderContext, ProviderError, ProviderFuture};

#[derive(Debug, Default)]
struct ScriptState {
    responses: VecDeque<CommandOutput>,
    invocations: Vec<CommandInvocation>,
}

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic builder outcomes without spawning processes.
/// Clones share the same script, so a clone handed to a provider can be
/// inspected through any clone. Running out of responses behaves like a
/// binary that cannot be started.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    state: Arc<Mutex<ScriptState>>,
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state
            .lock()
            .unwrap_or_else(|err| panic!("scripted runner lock poisoned: {err}"))
    }

    /// Returns a snapshot of all invocations recorded so far.
    ///
    /// # Panics
    ///
    /// Panics if a previous holder of the script lock panicked.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        self.lock().invocations.clone()
    }

    /// Pushes a successful exit status.
    ///
    /// # Panics
    ///
    /// Panics if a previous holder of the script lock panicked.
    pub fn push_success(&self) {
        self.push_output(Some(0), "", "");
    }

    /// Pushes a failing exit code with stderr text.
    ///
    /// # Panics
    ///
    /// Panics if a previous holder of the script lock panicked.
    pub fn push_failure(&self, code: i32) {
        self.push_output(Some(code), "", "simulated failure");
    }

    /// Pushes an explicit command output response.
    ///
    /// # Panics
    ///
    /// Panics if a previous holder of the script lock panicked.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        self.lock().responses.push_back(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        });
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, CommandError> {
        let mut state = self.lock();
        state.invocations.push(CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
        });
        state
            .responses
            .pop_front()
            .ok_or_else(|| CommandError::Spawn {
                program: program.to_owned(),
                message: String::from("no scripted response available"),
            })
    }
}

fn image_key(path: &str) -> String {
    path.split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// In-memory base image assembled with builder methods.
///
/// Paths are written the way they appear inside the image (`/bin/worker`);
/// parent directories are implied.
#[derive(Clone, Debug, Default)]
pub struct MemoryImage {
    dirs: BTreeSet<String>,
    files: BTreeMap<String, (Vec<u8>, u32)>,
    broken: BTreeSet<String>,
    copies: Arc<Mutex<Vec<(String, Utf8PathBuf)>>>,
    args: Vec<String>,
    env: BTreeMap<String, String>,
}

impl MemoryImage {
    /// Creates an empty image with no arguments.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn add_parents(&mut self, key: &str) {
        let mut current = key;
        while let Some((parent, _)) = current.rsplit_once('/') {
            self.dirs.insert(parent.to_owned());
            current = parent;
        }
    }

    /// Adds a directory.
    #[must_use]
    pub fn with_dir(mut self, path: &str) -> Self {
        let key = image_key(path);
        self.add_parents(&key);
        self.dirs.insert(key);
        self
    }

    /// Adds a file with the given contents and mode.
    #[must_use]
    pub fn with_file(mut self, path: &str, contents: &[u8], mode: u32) -> Self {
        let key = image_key(path);
        self.add_parents(&key);
        self.files.insert(key, (contents.to_vec(), mode));
        self
    }

    /// Adds a file that is listed but fails to copy.
    #[must_use]
    pub fn with_broken_file(mut self, path: &str) -> Self {
        let key = image_key(path);
        self.add_parents(&key);
        self.broken.insert(key);
        self
    }

    /// Sets the argument vector.
    #[must_use]
    pub fn with_args(mut self, args: &[&str]) -> Self {
        self.args = args.iter().map(|arg| (*arg).to_owned()).collect();
        self
    }

    /// Adds an environment variable.
    #[must_use]
    pub fn with_env(mut self, name: &str, value: &str) -> Self {
        self.env.insert(name.to_owned(), value.to_owned());
        self
    }

    /// Directories the image was copied into, derived from every
    /// attempted file copy. Clones share the record, so an image handed to
    /// an opener can be inspected through the original.
    ///
    /// # Panics
    ///
    /// Panics if a previous holder of the record lock panicked.
    #[must_use]
    pub fn destination_roots(&self) -> BTreeSet<Utf8PathBuf> {
        self.copies
            .lock()
            .unwrap_or_else(|err| panic!("copy record lock poisoned: {err}"))
            .iter()
            .filter_map(|(key, dest)| {
                dest.as_str()
                    .strip_suffix(key.as_str())
                    .and_then(|root| root.strip_suffix('/'))
                    .map(Utf8PathBuf::from)
            })
            .collect()
    }
}

impl BaseImage for MemoryImage {
    fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>, BaseImageError> {
        let key = image_key(path);
        if !key.is_empty() && !self.dirs.contains(&key) {
            return if self.files.contains_key(&key) || self.broken.contains(&key) {
                Err(BaseImageError::NotADirectory(path.to_owned()))
            } else {
                Err(BaseImageError::NotFound(path.to_owned()))
            };
        }

        let child_of = |candidate: &String| {
            if candidate.is_empty() {
                return None;
            }
            let parent = candidate.rsplit_once('/').map_or("", |(parent, _)| parent);
            let name = candidate.rsplit_once('/').map_or(candidate.as_str(), |(_, name)| name);
            (parent == key).then(|| name.to_owned())
        };
        let mut entries: Vec<DirEntry> = self
            .dirs
            .iter()
            .filter_map(child_of)
            .map(DirEntry::dir)
            .collect();
        entries.extend(
            self.files
                .keys()
                .chain(self.broken.iter())
                .filter_map(child_of)
                .map(DirEntry::file),
        );
        Ok(entries)
    }

    fn args(&self) -> &[String] {
        &self.args
    }

    fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    fn copy_file(
        &self,
        source: &str,
        dest: &Utf8Path,
        preserve_mode: bool,
    ) -> Result<(), BaseImageError> {
        let key = image_key(source);
        self.copies
            .lock()
            .unwrap_or_else(|err| panic!("copy record lock poisoned: {err}"))
            .push((key.clone(), dest.to_path_buf()));
        let (contents, mode) = self
            .files
            .get(&key)
            .ok_or_else(|| BaseImageError::NotFound(source.to_owned()))?;
        let write_error = |err: std::io::Error| BaseImageError::Write {
            path: dest.to_path_buf(),
            message: err.to_string(),
        };
        fs::write(dest, contents).map_err(write_error)?;
        if preserve_mode {
            fs::set_permissions(dest, fs::Permissions::from_mode(*mode)).map_err(write_error)?;
        }
        Ok(())
    }
}

/// Opener serving [`MemoryImage`] values registered by path.
#[derive(Clone, Debug, Default)]
pub struct MemoryImageOpener {
    images: Arc<BTreeMap<Utf8PathBuf, MemoryImage>>,
}

impl MemoryImageOpener {
    /// Serves `image` at `path` only.
    #[must_use]
    pub fn single(path: impl Into<Utf8PathBuf>, image: MemoryImage) -> Self {
        Self::default().with_image(path, image)
    }

    /// Registers another image.
    #[must_use]
    pub fn with_image(self, path: impl Into<Utf8PathBuf>, image: MemoryImage) -> Self {
        let mut images = Arc::unwrap_or_clone(self.images);
        images.insert(path.into(), image);
        Self {
            images: Arc::new(images),
        }
    }
}

impl BaseImageOpener for MemoryImageOpener {
    type Image = MemoryImage;

    fn open(&self, path: &Utf8Path) -> Result<Self::Image, BaseImageError> {
        self.images
            .get(path)
            .cloned()
            .ok_or_else(|| BaseImageError::Open {
                path: path.to_path_buf(),
                message: String::from("No such file or directory"),
            })
    }
}

/// Provider operation recorded by [`RecordingProvider`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProviderStep {
    /// `build_image`.
    Build,
    /// `publish_image`.
    Publish,
    /// `create_instance`.
    CreateInstance,
    /// `delete_instance`.
    DeleteInstance,
}

/// One provider call with the configuration it received.
#[derive(Clone, Debug)]
pub struct ProviderCall {
    /// Operation invoked.
    pub step: ProviderStep,
    /// Configuration carried by the request context.
    pub config: ImageConfig,
    /// Artifact path for publish, instance name for delete.
    pub target: Option<String>,
    /// Permission bits of the configured entry point when the call was made.
    pub program_mode: Option<u32>,
}

#[derive(Debug, Default)]
struct RecordingState {
    calls: Vec<ProviderCall>,
    fail_at: Option<ProviderStep>,
}

/// Provider double that records calls and can fail at one step.
///
/// Builds write a small artifact at the configured output path so cleanup
/// can be observed.
#[derive(Clone, Debug, Default)]
pub struct RecordingProvider {
    state: Arc<Mutex<RecordingState>>,
}

impl RecordingProvider {
    /// Creates a provider where every call succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a provider failing every call to `step`.
    #[must_use]
    pub fn failing_at(step: ProviderStep) -> Self {
        let provider = Self::default();
        provider.lock().fail_at = Some(step);
        provider
    }

    fn lock(&self) -> MutexGuard<'_, RecordingState> {
        self.state
            .lock()
            .unwrap_or_else(|err| panic!("recording provider lock poisoned: {err}"))
    }

    /// Returns all calls recorded so far.
    ///
    /// # Panics
    ///
    /// Panics if a previous holder of the state lock panicked.
    #[must_use]
    pub fn calls(&self) -> Vec<ProviderCall> {
        self.lock().calls.clone()
    }

    /// Returns the steps recorded so far, in call order.
    ///
    /// # Panics
    ///
    /// Panics if a previous holder of the state lock panicked.
    #[must_use]
    pub fn steps(&self) -> Vec<ProviderStep> {
        self.lock().calls.iter().map(|call| call.step).collect()
    }

    fn record(
        &self,
        step: ProviderStep,
        ctx: &ProviderContext,
        target: Option<String>,
    ) -> Result<(), ProviderError> {
        let config = ctx.config().clone();
        let program_mode = fs::metadata(&config.program)
            .ok()
            .map(|meta| meta.permissions().mode() & 0o777);
        let mut state = self.lock();
        state.calls.push(ProviderCall {
            step,
            config,
            target,
            program_mode,
        });
        if state.fail_at == Some(step) {
            return Err(ProviderError::CommandFailed {
                command: format!("{step:?}"),
                status: String::from("1"),
                stderr: String::from("simulated failure"),
            });
        }
        Ok(())
    }
}

impl Provider for RecordingProvider {
    fn build_image<'a>(&'a self, ctx: &'a ProviderContext) -> ProviderFuture<'a, Utf8PathBuf> {
        Box::pin(async move {
            self.record(ProviderStep::Build, ctx, None)?;
            let artifact = Utf8PathBuf::from(&ctx.config().run_config.image_name);
            fs::write(&artifact, b"image").map_err(|err| ProviderError::Config(err.to_string()))?;
            Ok(artifact)
        })
    }

    fn publish_image<'a>(
        &'a self,
        ctx: &'a ProviderContext,
        artifact: &'a Utf8Path,
    ) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            self.record(ProviderStep::Publish, ctx, Some(artifact.to_string()))
        })
    }

    fn create_instance<'a>(&'a self, ctx: &'a ProviderContext) -> ProviderFuture<'a, ()> {
        Box::pin(async move { self.record(ProviderStep::CreateInstance, ctx, None) })
    }

    fn delete_instance<'a>(
        &'a self,
        ctx: &'a ProviderContext,
        name: &'a str,
    ) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            self.record(ProviderStep::DeleteInstance, ctx, Some(name.to_owned()))
        })
    }
}
