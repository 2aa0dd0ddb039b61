//! Command-line interface definitions for the `orca` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use camino::Utf8PathBuf;
use clap::Parser;

/// Listen address used when none is given: loopback with an ephemeral port.
pub(crate) const DEFAULT_LISTEN_ADDR: &str = "localhost:0";

/// Top-level CLI for the `orca` binary.
#[derive(Debug, Parser)]
#[command(
    name = "orca",
    version,
    about = "Prepare unikernel images for programs and manage their cloud instances"
)]
pub(crate) struct Cli {
    /// Address the service listens on.
    #[arg(
        long,
        env = "ORCA_LISTEN_ADDR",
        value_name = "ADDR",
        default_value = DEFAULT_LISTEN_ADDR
    )]
    pub(crate) listen_addr: String,
    /// Configuration file to load instead of searching the standard
    /// locations (`/etc/orca/config`, `~/.config/orca/config`,
    /// `~/.orca/config`, `./config`).
    #[arg(long, env = "ORCA_CONFIG_PATH", value_name = "PATH")]
    pub(crate) config: Option<Utf8PathBuf>,
}
