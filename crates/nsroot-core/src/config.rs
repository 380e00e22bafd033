//! Launch configuration: the mount descriptor list, the root-switch mode,
//! and the validated [`LaunchConfig`] handed to the launcher.

use std::ffi::CString;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use nix::mount::MsFlags;
use nsroot_common::constants::DEFAULT_OLD_ROOT;
use nsroot_common::error::{NsrootError, Result};
use nsroot_common::types::IdMap;
use serde::Serialize;

use crate::namespace::NamespaceConfig;

/// A single mount to perform inside the new mount namespace.
///
/// `target` is relative to the new root. For bind mounts in pivot mode,
/// `source` is a host path that is reached through the relocated old root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountSpec {
    source: PathBuf,
    target: PathBuf,
    filesystem_type: Option<String>,
    flags: MsFlags,
    data: Option<String>,
}

impl MountSpec {
    /// Creates a mount with explicit filesystem type, flags, and data.
    ///
    /// Non-bind mounts (`tmpfs`, `proc`, ...) are built here. Their source
    /// is passed to `mount(2)` verbatim and is never resolved against the
    /// old root.
    pub fn new(
        source: impl Into<PathBuf>,
        target: impl Into<PathBuf>,
        filesystem_type: Option<String>,
        flags: MsFlags,
        data: Option<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            filesystem_type,
            flags,
            data,
        }
    }

    /// Creates a read-write bind mount of `source` onto `target`.
    pub fn bind(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self::new(source, target, None, MsFlags::MS_BIND, None)
    }

    /// Marks the mount read-only.
    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.flags |= MsFlags::MS_RDONLY;
        self
    }

    /// Path or device mounted.
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Mount point, relative to the new root.
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Filesystem type, `None` for bind mounts.
    pub fn filesystem_type(&self) -> Option<&str> {
        self.filesystem_type.as_deref()
    }

    /// Raw `mount(2)` flags.
    pub const fn flags(&self) -> MsFlags {
        self.flags
    }

    /// Filesystem-specific mount data.
    pub fn data(&self) -> Option<&str> {
        self.data.as_deref()
    }

    /// Whether this is a bind mount.
    pub const fn is_bind(&self) -> bool {
        self.flags.contains(MsFlags::MS_BIND)
    }

    /// Whether writes under the target must be rejected.
    pub const fn is_read_only(&self) -> bool {
        self.flags.contains(MsFlags::MS_RDONLY)
    }
}

impl MountSpec {
    /// Makes a relative bind source absolute against the current directory,
    /// which is still the caller's when the configuration is built.
    fn with_absolute_source(mut self) -> Result<Self> {
        if self.is_bind() && self.source.is_relative() {
            self.source = std::path::absolute(&self.source).map_err(|source| NsrootError::Io {
                path: self.source.clone(),
                source,
            })?;
        }
        Ok(self)
    }
}

/// Parses the `SOURCE:DEST[:ro|rw]` volume syntax into a bind mount.
impl FromStr for MountSpec {
    type Err = NsrootError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let invalid = |why: &str| NsrootError::config(format!("invalid volume '{s}': {why}"));

        let mut fields = s.split(':');
        let source = fields.next().unwrap_or_default();
        let Some(target) = fields.next() else {
            return Err(invalid("expected SOURCE:DEST[:ro|rw]"));
        };
        let option = fields.next();
        if fields.next().is_some() {
            return Err(invalid("too many ':' separated fields"));
        }
        if source.is_empty() || target.is_empty() {
            return Err(invalid("SOURCE and DEST must not be empty"));
        }

        let spec = Self::bind(source, target);
        match option {
            None | Some("rw") => Ok(spec),
            Some("ro") => Ok(spec.read_only()),
            Some(other) => Err(invalid(&format!("unknown option '{other}', expected 'ro' or 'rw'"))),
        }
    }
}

impl fmt::Display for MountSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = if self.is_read_only() { "ro" } else { "rw" };
        write!(
            f,
            "{}:{}:{mode}",
            self.source.display(),
            self.target.display()
        )
    }
}

/// How the child replaces its filesystem root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RootSwitchMode {
    /// `chroot(2)` into the new root. The old tree stays mounted.
    Chroot,
    /// `pivot_root(2)` into a bind mount of the new root, then detach the
    /// old root.
    PivotRoot,
}

impl fmt::Display for RootSwitchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chroot => write!(f, "chroot"),
            Self::PivotRoot => write!(f, "pivot_root"),
        }
    }
}

/// Everything the launcher needs, validated once and immutable afterward.
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    new_root: PathBuf,
    old_root: PathBuf,
    uid_map: Option<IdMap>,
    gid_map: Option<IdMap>,
    namespaces: NamespaceConfig,
    read_only: bool,
    keep_old_root: bool,
    volumes: Vec<MountSpec>,
    command: Vec<CString>,
    mode: RootSwitchMode,
}

impl LaunchConfig {
    /// Starts a builder for a launch into `new_root`.
    pub fn builder(new_root: impl Into<PathBuf>) -> LaunchConfigBuilder {
        LaunchConfigBuilder::new(new_root)
    }

    /// Directory that becomes `/` for the child, as given by the caller.
    pub fn new_root(&self) -> &Path {
        &self.new_root
    }

    /// Absolute path, inside the new root, where `pivot_root` parks the
    /// previous root.
    pub fn old_root(&self) -> &Path {
        &self.old_root
    }

    /// Uid map written for the child, if any.
    pub const fn uid_map(&self) -> Option<&IdMap> {
        self.uid_map.as_ref()
    }

    /// Gid map written for the child, if any.
    pub const fn gid_map(&self) -> Option<&IdMap> {
        self.gid_map.as_ref()
    }

    /// Namespaces created for the child.
    pub const fn namespaces(&self) -> NamespaceConfig {
        self.namespaces
    }

    /// Whether the new root is remounted read-only.
    pub const fn read_only(&self) -> bool {
        self.read_only
    }

    /// Whether the old root stays mounted after `pivot_root`.
    pub const fn keep_old_root(&self) -> bool {
        self.keep_old_root
    }

    /// Volumes mounted into the new root, in order.
    pub fn volumes(&self) -> &[MountSpec] {
        &self.volumes
    }

    /// Command executed once the root is switched. Never empty.
    pub fn command(&self) -> &[CString] {
        &self.command
    }

    /// Root-switch mode derived from the requested features.
    pub const fn mode(&self) -> RootSwitchMode {
        self.mode
    }

    /// Returns a serializable summary of this configuration.
    pub fn plan(&self) -> LaunchPlan {
        LaunchPlan {
            mode: self.mode,
            new_root: self.new_root.clone(),
            old_root: (self.mode == RootSwitchMode::PivotRoot).then(|| self.old_root.clone()),
            read_only: self.read_only,
            keep_old_root: self.keep_old_root,
            namespaces: self.namespaces.names(),
            uid_map: self.uid_map.as_ref().map(ToString::to_string),
            gid_map: self.gid_map.as_ref().map(ToString::to_string),
            volumes: self
                .volumes
                .iter()
                .map(|v| PlannedMount {
                    source: v.source.clone(),
                    target: v.target.clone(),
                    read_only: v.is_read_only(),
                })
                .collect(),
            command: self
                .command
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned())
                .collect(),
        }
    }
}

/// Builder for [`LaunchConfig`].
#[derive(Debug, Clone)]
pub struct LaunchConfigBuilder {
    new_root: PathBuf,
    old_root: Option<PathBuf>,
    uid_map: Option<IdMap>,
    gid_map: Option<IdMap>,
    namespaces: NamespaceConfig,
    read_only: bool,
    keep_old_root: bool,
    volumes: Vec<MountSpec>,
    command: Vec<String>,
}

impl LaunchConfigBuilder {
    fn new(new_root: impl Into<PathBuf>) -> Self {
        Self {
            new_root: new_root.into(),
            old_root: None,
            uid_map: None,
            gid_map: None,
            namespaces: NamespaceConfig::default(),
            read_only: false,
            keep_old_root: false,
            volumes: Vec::new(),
            command: Vec::new(),
        }
    }

    /// Sets the command and its arguments.
    #[must_use]
    pub fn command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = command.into_iter().map(Into::into).collect();
        self
    }

    /// Appends a volume. Volumes are mounted in insertion order.
    #[must_use]
    pub fn volume(mut self, spec: MountSpec) -> Self {
        self.volumes.push(spec);
        self
    }

    /// Appends several volumes.
    #[must_use]
    pub fn volumes(mut self, specs: impl IntoIterator<Item = MountSpec>) -> Self {
        self.volumes.extend(specs);
        self
    }

    /// Sets where `pivot_root` parks the old root. Must be absolute.
    #[must_use]
    pub fn old_root(mut self, old_root: impl Into<PathBuf>) -> Self {
        self.old_root = Some(old_root.into());
        self
    }

    /// Requests a read-only new root.
    #[must_use]
    pub const fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Keeps the old root mounted after `pivot_root`.
    #[must_use]
    pub const fn keep_old_root(mut self, keep: bool) -> Self {
        self.keep_old_root = keep;
        self
    }

    /// Sets the uid map written for the child.
    #[must_use]
    pub fn uid_map(mut self, map: Option<IdMap>) -> Self {
        self.uid_map = map;
        self
    }

    /// Sets the gid map written for the child.
    #[must_use]
    pub fn gid_map(mut self, map: Option<IdMap>) -> Self {
        self.gid_map = map;
        self
    }

    /// Selects the optional namespaces.
    #[must_use]
    pub const fn namespaces(mut self, namespaces: NamespaceConfig) -> Self {
        self.namespaces = namespaces;
        self
    }

    /// Validates the configuration and derives the root-switch mode.
    ///
    /// # Errors
    ///
    /// Returns [`NsrootError::Config`] if the command is empty or contains
    /// a NUL byte, or if the old root is not an absolute path strictly
    /// inside the new root. Returns [`NsrootError::Io`] if a relative
    /// volume source cannot be made absolute.
    pub fn build(self) -> Result<LaunchConfig> {
        if self.command.is_empty() {
            return Err(NsrootError::config("command must not be empty"));
        }
        let command = self
            .command
            .iter()
            .map(|arg| {
                CString::new(arg.as_bytes()).map_err(|_| {
                    NsrootError::config(format!("command argument contains a NUL byte: {arg:?}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let explicit_old_root = self.old_root.is_some();
        let old_root = self
            .old_root
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OLD_ROOT));
        validate_old_root(&old_root)?;

        let mode = if explicit_old_root
            || !self.volumes.is_empty()
            || self.read_only
            || self.keep_old_root
        {
            RootSwitchMode::PivotRoot
        } else {
            RootSwitchMode::Chroot
        };

        let volumes = self
            .volumes
            .into_iter()
            .map(MountSpec::with_absolute_source)
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(
            new_root = %self.new_root.display(),
            %mode,
            volumes = volumes.len(),
            "launch configuration built"
        );

        Ok(LaunchConfig {
            new_root: self.new_root,
            old_root,
            uid_map: self.uid_map,
            gid_map: self.gid_map,
            namespaces: self.namespaces,
            read_only: self.read_only,
            keep_old_root: self.keep_old_root,
            volumes,
            command,
            mode,
        })
    }
}

/// Checks that `old_root` names a directory strictly inside the new root.
///
/// # Errors
///
/// Returns [`NsrootError::Config`] for relative paths, `/` itself, and
/// paths containing `..`.
pub fn validate_old_root(old_root: &Path) -> Result<()> {
    if !old_root.is_absolute() {
        return Err(NsrootError::config(format!(
            "old root must be an absolute path inside the new root: {}",
            old_root.display()
        )));
    }
    if old_root.components().any(|c| c == Component::ParentDir) {
        return Err(NsrootError::config(format!(
            "old root must not contain '..': {}",
            old_root.display()
        )));
    }
    if old_root.parent().is_none() {
        return Err(NsrootError::config("old root must not be '/'"));
    }
    Ok(())
}

/// Serializable summary of a [`LaunchConfig`].
#[derive(Debug, Clone, Serialize)]
pub struct LaunchPlan {
    /// Root-switch mode.
    pub mode: RootSwitchMode,
    /// New root as given.
    pub new_root: PathBuf,
    /// Old-root location, present in pivot mode only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_root: Option<PathBuf>,
    /// Read-only new root.
    pub read_only: bool,
    /// Old root kept mounted.
    pub keep_old_root: bool,
    /// Namespaces created.
    pub namespaces: Vec<&'static str>,
    /// Uid map in caller syntax.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid_map: Option<String>,
    /// Gid map in caller syntax.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gid_map: Option<String>,
    /// Volumes in mount order.
    pub volumes: Vec<PlannedMount>,
    /// Command and arguments.
    pub command: Vec<String>,
}

/// A volume entry of a [`LaunchPlan`].
#[derive(Debug, Clone, Serialize)]
pub struct PlannedMount {
    /// Host path.
    pub source: PathBuf,
    /// Path inside the new root.
    pub target: PathBuf,
    /// Mounted read-only.
    pub read_only: bool,
}
