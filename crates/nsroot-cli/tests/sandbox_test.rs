//! End-to-end tests for the `nsroot` binary.
//!
//! Configuration tests run everywhere. Sandbox tests need unprivileged user
//! namespaces; each one first launches a trivial command and skips itself
//! when the host refuses (containers with a default seccomp profile,
//! `kernel.unprivileged_userns_clone = 0`, ...).
//!
//! The sandbox root is a scratch directory that borrows the host's `/usr`
//! (and `/bin`, `/lib*` when they are real directories) through read-only
//! volumes, so `/bin/sh` works inside it.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::print_stderr)]

use std::fs;
use std::os::unix::fs::{MetadataExt, PermissionsExt, symlink};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

const NSROOT: &str = env!("CARGO_BIN_EXE_nsroot");

/// Top-level host entries needed to run a dynamically linked `/bin/sh`.
const SYSTEM_DIRS: [&str; 7] = ["usr", "bin", "sbin", "lib", "lib32", "lib64", "libx32"];

/// Number of leading arguments holding `--uid-map MAP --gid-map MAP`.
const ID_MAP_ARGS: usize = 4;

/// Maps root inside the namespace to the owner of `dir`.
fn root_id_map_args(dir: &Path) -> Vec<String> {
    let owner = fs::metadata(dir).unwrap();
    vec![
        "--uid-map".to_string(),
        format!("0 {} 1", owner.uid()),
        "--gid-map".to_string(),
        format!("0 {} 1", owner.gid()),
    ]
}

struct Sandbox {
    root: TempDir,
    args: Vec<String>,
}

impl Sandbox {
    fn new() -> Self {
        let root = tempfile::tempdir().expect("create sandbox root");
        fs::create_dir(root.path().join("mnt")).unwrap();

        let mut args = root_id_map_args(root.path());

        for name in SYSTEM_DIRS {
            let host = Path::new("/").join(name);
            let Ok(meta) = fs::symlink_metadata(&host) else {
                continue;
            };
            let inside = root.path().join(name);
            if meta.file_type().is_symlink() {
                symlink(fs::read_link(&host).unwrap(), &inside).unwrap();
            } else if meta.is_dir() {
                fs::create_dir(&inside).unwrap();
                args.push("-v".to_string());
                args.push(format!("/{name}:/{name}:ro"));
            }
        }

        Self { root, args }
    }

    fn path(&self) -> &Path {
        self.root.path()
    }

    /// Creates a directory inside the new root to serve as a mount point.
    fn mount_point(&self, name: &str) -> PathBuf {
        let dir = self.path().join(name);
        fs::create_dir(&dir).unwrap();
        dir
    }

    fn volume(&mut self, source: &Path, target: &str, option: &str) {
        self.args.push("-v".to_string());
        self.args
            .push(format!("{}:{target}:{option}", source.display()));
    }

    fn set_uid_map(&mut self, map: &str) {
        self.args[1] = map.to_string();
    }

    fn drop_id_maps(&mut self) {
        let _ = self.args.drain(..ID_MAP_ARGS);
    }

    fn flag(&mut self, flag: &str) {
        self.args.push(flag.to_string());
    }

    fn sh(&self, script: &str) -> Output {
        Command::new(NSROOT)
            .args(&self.args)
            .arg(self.path())
            .args(["/bin/sh", "-c", script])
            .output()
            .expect("spawn nsroot")
    }

    /// Returns `None`, after logging why, when the host cannot create the
    /// sandbox at all.
    fn probe() -> Option<Self> {
        let sandbox = Self::new();
        let output = sandbox.sh("exit 0");
        if output.status.success() {
            Some(sandbox)
        } else {
            eprintln!(
                "skipping: user namespaces unavailable: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
            None
        }
    }
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

/// Shared libraries `ldd` reports for `binary`. Empty for static binaries.
fn shared_libraries(binary: &Path) -> Vec<PathBuf> {
    let Ok(output) = Command::new("ldd").arg(binary).output() else {
        return Vec::new();
    };
    if !output.status.success() {
        return Vec::new();
    }
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .flat_map(str::split_whitespace)
        .filter(|word| word.starts_with('/'))
        .map(PathBuf::from)
        .collect()
}

/// Copies `file` to the same absolute path under `root`.
fn copy_into(root: &Path, file: &Path) {
    let dest = root.join(file.strip_prefix("/").unwrap());
    fs::create_dir_all(dest.parent().unwrap()).unwrap();
    let _ = fs::copy(file, &dest).unwrap();
}

/// A root holding only `/bin/sh`, its libraries, and a marker file.
fn chroot_root() -> TempDir {
    let root = tempfile::tempdir().unwrap();
    let sh = fs::canonicalize("/bin/sh").unwrap();

    fs::create_dir(root.path().join("bin")).unwrap();
    let _ = fs::copy(&sh, root.path().join("bin/sh")).unwrap();
    for library in shared_libraries(&sh) {
        copy_into(root.path(), &library);
    }
    fs::write(root.path().join("marker"), "chroot\n").unwrap();
    root
}

// ── Configuration ────────────────────────────────────────────────────

#[test]
fn relative_old_root_fails_before_launch() {
    let root = tempfile::tempdir().unwrap();
    let output = Command::new(NSROOT)
        .args(["-o", "relative/path"])
        .arg(root.path())
        .arg("/bin/true")
        .output()
        .unwrap();

    assert!(!output.status.success());
    let err = stderr(&output);
    assert!(err.contains("absolute"), "stderr: {err}");
    assert!(!err.contains("clone"), "stderr: {err}");
}

#[test]
fn malformed_volume_is_rejected() {
    let output = Command::new(NSROOT)
        .args(["-v", "/only-a-source", ".", "/bin/true"])
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(stderr(&output).contains("SOURCE:DEST"));
}

#[test]
fn dry_run_prints_pivot_plan() {
    let output = Command::new(NSROOT)
        .args([
            "--dry-run",
            "-v",
            "/home/user/data:/mnt:ro",
            "-v",
            "/srv:/srv",
            "/sandbox",
            "/bin/sh",
            "-c",
            "true",
        ])
        .output()
        .unwrap();

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let plan: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(plan["mode"], "pivot_root");
    assert_eq!(plan["new_root"], "/sandbox");
    assert_eq!(plan["old_root"], "/mnt");
    assert_eq!(plan["volumes"][0]["source"], "/home/user/data");
    assert_eq!(plan["volumes"][0]["read_only"], true);
    assert_eq!(plan["volumes"][1]["target"], "/srv");
    assert_eq!(plan["command"], serde_json::json!(["/bin/sh", "-c", "true"]));
}

#[test]
fn dry_run_without_pivot_triggers_uses_chroot() {
    let output = Command::new(NSROOT)
        .args(["--dry-run", "/sandbox", "/bin/true"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let plan: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(plan["mode"], "chroot");
    assert!(plan.get("old_root").is_none());
    assert_eq!(plan["namespaces"], serde_json::json!(["user", "mount"]));
}

// ── Sandbox ──────────────────────────────────────────────────────────

#[test]
fn old_root_is_detached_after_pivot() {
    let Some(sandbox) = Sandbox::probe() else {
        return;
    };

    let output = sandbox.sh("test ! -e /mnt/etc && test ! -e /mnt/usr && test -x /bin/sh");

    assert!(output.status.success(), "stderr: {}", stderr(&output));
}

#[test]
fn keep_old_root_leaves_host_reachable() {
    let Some(mut sandbox) = Sandbox::probe() else {
        return;
    };
    sandbox.flag("--keep-old-root");

    let output = sandbox.sh("test -d /mnt/etc");

    assert!(output.status.success(), "stderr: {}", stderr(&output));
}

#[test]
fn read_only_volume_rejects_writes_and_read_write_accepts_them() {
    let Some(mut sandbox) = Sandbox::probe() else {
        return;
    };
    let host = tempfile::tempdir().unwrap();
    let rw = host.path().join("rw");
    let ro = host.path().join("ro");
    fs::create_dir(&rw).unwrap();
    fs::create_dir(&ro).unwrap();
    let _ = sandbox.mount_point("data");
    let _ = sandbox.mount_point("ro");
    sandbox.volume(&rw, "/data", "rw");
    sandbox.volume(&ro, "/ro", "ro");

    let output = sandbox.sh("if echo x > /ro/out; then exit 3; fi; echo ok > /data/out");

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(fs::read_to_string(rw.join("out")).unwrap(), "ok\n");
    assert!(!ro.join("out").exists());
}

#[test]
fn each_volume_mounts_its_own_source() {
    let Some(mut sandbox) = Sandbox::probe() else {
        return;
    };
    let host = tempfile::tempdir().unwrap();
    let first = host.path().join("first");
    let second = host.path().join("second");
    fs::create_dir(&first).unwrap();
    fs::create_dir(&second).unwrap();
    fs::write(first.join("a.txt"), "A\n").unwrap();
    fs::write(second.join("b.txt"), "B\n").unwrap();
    let _ = sandbox.mount_point("a");
    let _ = sandbox.mount_point("b");
    sandbox.volume(&first, "/a", "ro");
    sandbox.volume(&second, "/b", "ro");

    let output = sandbox.sh(
        "read x < /a/a.txt && read y < /b/b.txt && test \"$x$y\" = AB \
         && test ! -e /a/b.txt && test ! -e /b/a.txt",
    );

    assert!(output.status.success(), "stderr: {}", stderr(&output));
}

#[test]
fn read_only_root_rejects_writes() {
    let Some(mut sandbox) = Sandbox::probe() else {
        return;
    };
    sandbox.flag("--read-only");

    let output = sandbox.sh("if echo x > /newfile; then exit 3; fi");

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(!sandbox.path().join("newfile").exists());
}

#[test]
fn uid_map_makes_the_caller_root_inside() {
    let Some(sandbox) = Sandbox::probe() else {
        return;
    };

    let output = sandbox.sh("test \"$(id -u)\" = 0 && test \"$(id -g)\" = 0");

    assert!(output.status.success(), "stderr: {}", stderr(&output));
}

#[test]
fn child_exit_status_is_propagated() {
    let Some(sandbox) = Sandbox::probe() else {
        return;
    };

    let output = sandbox.sh("exit 7");

    assert_eq!(output.status.code(), Some(7));
}

#[test]
fn exec_failure_is_reported_by_the_child() {
    let Some(sandbox) = Sandbox::probe() else {
        return;
    };

    let output = Command::new(NSROOT)
        .args(&sandbox.args)
        .arg(sandbox.path())
        .arg("/no/such/program")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(err.contains("execvp /no/such/program failed"), "stderr: {err}");
}

#[test]
fn missing_old_root_directory_fails_pivot() {
    let Some(mut sandbox) = Sandbox::probe() else {
        return;
    };
    sandbox.args.push("-o".to_string());
    sandbox.args.push("/not-there".to_string());

    let output = sandbox.sh("exit 0");

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("pivot_root failed"));
}

#[test]
fn chroot_mode_enters_the_new_root_at_slash() {
    if Sandbox::probe().is_none() {
        return;
    }
    let root = chroot_root();

    let output = Command::new(NSROOT)
        .args(root_id_map_args(root.path()))
        .arg(root.path())
        .args([
            "/bin/sh",
            "-c",
            "read m < /marker && test \"$m\" = chroot && test ! -e /usr && echo \"inside $(pwd)\"",
        ])
        .output()
        .unwrap();

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "inside /\n");
}

#[test]
fn rejected_id_map_kills_the_child_before_it_runs() {
    let Some(mut sandbox) = Sandbox::probe() else {
        return;
    };
    sandbox.set_uid_map("0 0 1,0 1 1");

    let output = sandbox.sh("echo RAN");

    assert_eq!(output.status.code(), Some(1));
    assert!(!String::from_utf8_lossy(&output.stdout).contains("RAN"));
    let err = stderr(&output);
    assert!(err.contains("uid_map"), "stderr: {err}");
    assert!(err.contains("killing child after setup failure"), "stderr: {err}");
}

#[test]
fn id_maps_are_in_effect_before_the_root_is_mounted() {
    let Some(mut sandbox) = Sandbox::probe() else {
        return;
    };
    // Only a uid mapped to the owner can traverse the new root during
    // pivot_root.
    fs::set_permissions(sandbox.path(), fs::Permissions::from_mode(0o700)).unwrap();
    let host = tempfile::tempdir().unwrap();
    let _ = sandbox.mount_point("data");
    sandbox.volume(host.path(), "/data", "rw");

    let output = sandbox.sh("test \"$(id -u)\" = 0 && echo ok > /data/owned");

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let written = fs::metadata(host.path().join("owned")).unwrap();
    assert_eq!(written.uid(), fs::metadata(host.path()).unwrap().uid());

    sandbox.drop_id_maps();
    let unmapped = sandbox.sh("exit 0");
    assert!(!unmapped.status.success());
}
