//! Command-line definition and translation into a [`LaunchConfig`].

use std::ffi::OsString;
use std::path::PathBuf;

use clap::Parser;
use nsroot_common::constants::{APP_NAME, DEFAULT_SHELL, SHELL_ENV};
use nsroot_common::types::IdMap;
use nsroot_core::config::{LaunchConfig, MountSpec};
use nsroot_core::namespace::NamespaceConfig;

const AFTER_HELP: &str = "\
If no COMMAND is given, runs '${SHELL} -i' (default: '/bin/sh -i').

Any of --volume, --old-root, --read-only or --keep-old-root switches the
root with pivot_root and detaches the old root; otherwise chroot is used.

Examples:
    nsroot ./rootfs
    nsroot -v /home/$USER/private:/mnt:ro ./rootfs /bin/sh -c 'ls /mnt'
    nsroot --uid-map '0 1000 1' --gid-map '0 1000 1' --read-only ./rootfs";

/// nsroot — run a command in a new root inside fresh user and mount namespaces.
#[derive(Parser, Debug)]
#[command(name = APP_NAME, version, about, long_about = None, after_help = AFTER_HELP)]
pub struct Cli {
    /// Bind mount a directory into a path under NEWROOT.
    ///
    /// Syntax: SOURCE:DEST[:ro|rw], DEST relative to NEWROOT. May be repeated.
    #[arg(short = 'v', long = "volume", value_name = "SOURCE:DEST[:ro|rw]")]
    pub volumes: Vec<MountSpec>,

    /// Where pivot_root parks the old root before detaching it.
    /// Absolute path inside NEWROOT (default: /mnt).
    #[arg(short = 'o', long, value_name = "PATH")]
    pub old_root: Option<PathBuf>,

    /// Make the new root read-only.
    #[arg(long)]
    pub read_only: bool,

    /// Leave the old root mounted inside the new root.
    #[arg(long)]
    pub keep_old_root: bool,

    /// Uid map for the new user namespace, e.g. "0 1000 1,1 100000 65536".
    #[arg(long, value_name = "MAP")]
    pub uid_map: Option<IdMap>,

    /// Gid map for the new user namespace, same syntax as --uid-map.
    #[arg(long, value_name = "MAP")]
    pub gid_map: Option<IdMap>,

    /// Create a new network namespace.
    #[arg(long)]
    pub net: bool,

    /// Create a new IPC namespace.
    #[arg(long)]
    pub ipc: bool,

    /// Print the resolved launch plan as JSON and exit.
    #[arg(long)]
    pub dry_run: bool,

    /// Directory that becomes the root of the command.
    #[arg(value_name = "NEWROOT", default_value = ".")]
    pub new_root: PathBuf,

    /// Command to run and its arguments.
    #[arg(
        value_name = "COMMAND",
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub command: Vec<String>,
}

impl Cli {
    /// Validates the arguments into an immutable launch configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, e.g. a relative
    /// `--old-root`.
    pub fn into_config(self) -> anyhow::Result<LaunchConfig> {
        let command = if self.command.is_empty() {
            default_command(std::env::var_os(SHELL_ENV))
        } else {
            self.command
        };

        let mut builder = LaunchConfig::builder(self.new_root)
            .command(command)
            .volumes(self.volumes)
            .read_only(self.read_only)
            .keep_old_root(self.keep_old_root)
            .uid_map(self.uid_map)
            .gid_map(self.gid_map)
            .namespaces(NamespaceConfig {
                network: self.net,
                ipc: self.ipc,
            });
        if let Some(old_root) = self.old_root {
            builder = builder.old_root(old_root);
        }
        Ok(builder.build()?)
    }
}

/// `$SHELL -i`, or `/bin/sh -i` when `SHELL` is unset or empty.
pub fn default_command(shell: Option<OsString>) -> Vec<String> {
    let shell = shell
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_SHELL.to_string());
    vec![shell, "-i".to_string()]
}
