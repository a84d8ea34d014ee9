use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DAEMON_BINARY: &str = "hermes-backup";
pub const PID_FILE: &str = "hermes-backup.pid";
pub const PID_FILE_ENV: &str = "HERMES_PID_FILE";
pub const CONFIG_PATH_ENV: &str = "CONFIG_PATH";
pub const DEFAULT_CONFIG: &str = "config.yaml";

pub const STOP_GRACE: Duration = Duration::from_secs(10);
pub const STOP_POLL: Duration = Duration::from_millis(500);

/// `~/.cache/hermes`, used when the executable's directory is unknown.
pub fn cache_dir(home: &Path) -> PathBuf {
    home.join(".cache").join("hermes")
}

/// Directory holding the running executable, if it can be determined.
pub fn exe_dir() -> Option<PathBuf> {
    env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}

/// PID file location shared by the daemon and every supervisor.
///
/// `HERMES_PID_FILE` wins; otherwise `hermes-backup.pid` next to the
/// executable, falling back to the user cache directory.
pub fn pid_file_path() -> PathBuf {
    if let Some(path) = env::var_os(PID_FILE_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(path);
    }
    resolve_pid_file(exe_dir().as_deref(), dirs::home_dir().as_deref())
}

fn resolve_pid_file(exe_dir: Option<&Path>, home: Option<&Path>) -> PathBuf {
    match (exe_dir, home) {
        (Some(dir), _) => dir.join(PID_FILE),
        (None, Some(home)) => cache_dir(home).join(PID_FILE),
        (None, None) => PathBuf::from(PID_FILE),
    }
}

/// Daemon binary expected to sit beside the running executable.
pub fn sibling_binary(name: &str) -> PathBuf {
    exe_dir()
        .map(|dir| dir.join(name))
        .unwrap_or_else(|| PathBuf::from(name))
}
