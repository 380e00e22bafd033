//! System-wide constants and default paths.

/// Where `pivot_root` parks the previous root when no `--old-root` is given.
/// Interpreted relative to the new root.
pub const DEFAULT_OLD_ROOT: &str = "/mnt";

/// Shell used when no command is given and `$SHELL` is unset.
pub const DEFAULT_SHELL: &str = "/bin/sh";

/// Environment variable naming the user's login shell.
pub const SHELL_ENV: &str = "SHELL";

/// Mount point of procfs, home of the per-process id-map files.
pub const PROC_ROOT: &str = "/proc";

/// Per-process file receiving the uid mapping.
pub const UID_MAP_FILE: &str = "uid_map";

/// Per-process file receiving the gid mapping.
pub const GID_MAP_FILE: &str = "gid_map";

/// Per-process file controlling `setgroups(2)` inside a user namespace.
pub const SETGROUPS_FILE: &str = "setgroups";

/// Stack size handed to `clone(2)` for the bootstrap child.
pub const CHILD_STACK_SIZE: usize = 1024 * 1024;

/// Exit status reported when the bootstrap fails before `exec`.
pub const SETUP_FAILURE_EXIT_CODE: i32 = 1;

/// Offset added to a signal number when the child dies from a signal,
/// matching the shell convention.
pub const SIGNAL_EXIT_BASE: i32 = 128;

/// Binary name, also used as the clap command name.
pub const APP_NAME: &str = "nsroot";
