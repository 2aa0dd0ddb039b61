//! Provider backed by the external `ops` image builder.

use std::ffi::OsString;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

use super::{Provider, ProviderContext, ProviderError, ProviderFuture};
use crate::command::{CommandOutput, CommandRunner};
use crate::image_config::ImageConfig;

const CONFIG_PREFIX: &str = "orca-config-";
const CONFIG_SUFFIX: &str = ".json";

/// Drives the image builder CLI through a [`CommandRunner`].
///
/// The composed configuration is written to a temporary JSON file for every
/// command and removed once the command returns.
#[derive(Clone, Debug)]
pub struct OpsProvider<R> {
    runner: R,
    builder_bin: String,
}

impl<R> OpsProvider<R>
where
    R: CommandRunner + Clone + 'static,
{
    /// Creates a provider invoking `builder_bin` through `runner`.
    #[must_use]
    pub fn new(runner: R, builder_bin: impl Into<String>) -> Self {
        Self {
            runner,
            builder_bin: builder_bin.into(),
        }
    }

    async fn execute<A>(&self, config: &ImageConfig, args: A) -> Result<CommandOutput, ProviderError>
    where
        A: FnOnce(&Utf8Path) -> Vec<OsString>,
    {
        let config_file = write_config(config)?;
        let config_path = Utf8Path::from_path(config_file.path()).ok_or_else(|| {
            ProviderError::Config(format!(
                "temporary path is not valid UTF-8: {}",
                config_file.path().display()
            ))
        })?;
        let argv = args(config_path);
        let command = render_command(&self.builder_bin, &argv);
        debug!(command = %command, "running image builder");

        let runner = self.runner.clone();
        let program = self.builder_bin.clone();
        let output = tokio::task::spawn_blocking(move || runner.run(&program, &argv))
            .await
            .map_err(|err| ProviderError::Task(err.to_string()))??;
        drop(config_file);

        if output.is_success() {
            Ok(output)
        } else {
            Err(ProviderError::CommandFailed {
                command,
                status: output.status_text(),
                stderr: output.stderr.trim().to_owned(),
            })
        }
    }
}

fn write_config(config: &ImageConfig) -> Result<NamedTempFile, ProviderError> {
    let mut file = tempfile::Builder::new()
        .prefix(CONFIG_PREFIX)
        .suffix(CONFIG_SUFFIX)
        .tempfile()
        .map_err(|err| ProviderError::Config(err.to_string()))?;
    serde_json::to_writer(&mut file, config).map_err(|err| ProviderError::Config(err.to_string()))?;
    file.flush()
        .map_err(|err| ProviderError::Config(err.to_string()))?;
    Ok(file)
}

fn render_command(program: &str, args: &[OsString]) -> String {
    let mut parts = Vec::with_capacity(args.len() + 1);
    parts.push(program.to_owned());
    parts.extend(args.iter().map(|arg| arg.to_string_lossy().into_owned()));
    parts.join(" ")
}

fn os_args<const N: usize>(args: [&str; N]) -> Vec<OsString> {
    args.into_iter().map(OsString::from).collect()
}

impl<R> Provider for OpsProvider<R>
where
    R: CommandRunner + Clone + 'static,
{
    fn build_image<'a>(&'a self, ctx: &'a ProviderContext) -> ProviderFuture<'a, Utf8PathBuf> {
        Box::pin(async move {
            let config = ctx.config();
            let artifact = config.run_config.image_name.as_str();
            self.execute(config, |config_path| {
                os_args([
                    "build",
                    config.program.as_str(),
                    "-c",
                    config_path.as_str(),
                    "-i",
                    artifact,
                ])
            })
            .await?;
            Ok(Utf8PathBuf::from(artifact))
        })
    }

    fn publish_image<'a>(
        &'a self,
        ctx: &'a ProviderContext,
        artifact: &'a Utf8Path,
    ) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            let config = ctx.config();
            self.execute(config, |config_path| {
                os_args([
                    "image",
                    "create",
                    "-c",
                    config_path.as_str(),
                    "-t",
                    ctx.platform(),
                    "-i",
                    config.cloud_config.image_name.as_str(),
                    "--image-path",
                    artifact.as_str(),
                ])
            })
            .await?;
            Ok(())
        })
    }

    fn create_instance<'a>(&'a self, ctx: &'a ProviderContext) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            let config = ctx.config();
            self.execute(config, |config_path| {
                os_args([
                    "instance",
                    "create",
                    config.cloud_config.image_name.as_str(),
                    "-c",
                    config_path.as_str(),
                    "-t",
                    ctx.platform(),
                    "-i",
                    config.run_config.instance_name.as_str(),
                ])
            })
            .await?;
            Ok(())
        })
    }

    fn delete_instance<'a>(
        &'a self,
        ctx: &'a ProviderContext,
        name: &'a str,
    ) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            self.execute(ctx.config(), |config_path| {
                os_args([
                    "instance",
                    "delete",
                    name,
                    "-c",
                    config_path.as_str(),
                    "-t",
                    ctx.platform(),
                ])
            })
            .await?;
            Ok(())
        })
    }
}
