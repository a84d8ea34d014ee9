use std::fs;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

use assert_cmd::prelude::*;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use predicates::str::contains;
use tempfile::TempDir;

fn backup_cmd(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("hermes-backup"));
    cmd.env("HERMES_PID_FILE", dir.join("hermes-backup.pid"))
        .env_remove("CONFIG_PATH")
        .env_remove("RUST_LOG");
    cmd
}

fn wait_until(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if done() {
            return true;
        }
        sleep(Duration::from_millis(20));
    }
    done()
}

#[test]
fn missing_config_is_fatal() {
    let dir = TempDir::new().expect("tempdir");
    backup_cmd(dir.path())
        .args(["--config", "does-not-exist.yaml"])
        .current_dir(dir.path())
        .assert()
        .failure()
        .stderr(contains("config not found"));
    assert!(!dir.path().join("hermes-backup.pid").exists());
}

#[test]
fn invalid_config_is_fatal() {
    let dir = TempDir::new().expect("tempdir");
    let config = dir.path().join("config.yaml");
    fs::write(&config, "projects:\n  - name: notes\n").expect("write config");
    backup_cmd(dir.path())
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(contains("source_paths is required"));
}

#[test]
fn config_path_env_is_honoured() {
    let dir = TempDir::new().expect("tempdir");
    backup_cmd(dir.path())
        .env("CONFIG_PATH", dir.path().join("from-env.yaml"))
        .assert()
        .failure()
        .stderr(contains("from-env.yaml"));
}

#[cfg(unix)]
#[test]
fn sigterm_stops_daemon_and_removes_pid_file() {
    let dir = TempDir::new().expect("tempdir");
    let config = dir.path().join("config.yaml");
    let log = dir.path().join("logs").join("hermes.log");
    fs::write(
        &config,
        format!(
            "logging:\n  path: {}\nprojects:\n  - name: notes\n    source_paths: [/srv/notes]\n    cron: \"@yearly\"\n",
            log.display()
        ),
    )
    .expect("write config");
    let pid_file = dir.path().join("hermes-backup.pid");

    let mut child = backup_cmd(dir.path())
        .arg("--config")
        .arg(&config)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn hermes-backup");

    assert!(
        wait_until(Duration::from_secs(10), || pid_file.exists()),
        "daemon never wrote its pid file"
    );
    let recorded: u32 = fs::read_to_string(&pid_file)
        .expect("read pid")
        .trim()
        .parse()
        .expect("numeric pid");
    assert_eq!(recorded, child.id());

    kill(Pid::from_raw(child.id() as i32), Signal::SIGTERM).expect("send SIGTERM");
    let status = child.wait().expect("wait");
    assert!(status.success(), "graceful shutdown exits 0, got {status}");
    assert!(!pid_file.exists(), "pid file removed on clean shutdown");

    let logged = fs::read_to_string(&log).expect("read log");
    assert!(logged.contains("Hermes backup server started"));
    assert!(logged.contains("shutdown signal received"));
}

#[cfg(unix)]
#[test]
fn second_sigterm_during_drain_exits_immediately() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().expect("tempdir");
    let bin = dir.path().join("bin");
    fs::create_dir(&bin).expect("mkdir bin");
    let started = dir.path().join("rclone.started");
    let rclone = bin.join("rclone");
    fs::write(
        &rclone,
        format!("#!/bin/sh\necho $$ > '{}'\nexec sleep 120\n", started.display()),
    )
    .expect("write rclone");
    fs::set_permissions(&rclone, fs::Permissions::from_mode(0o755)).expect("chmod");

    let config = dir.path().join("config.yaml");
    fs::write(
        &config,
        "projects:\n  - name: notes\n    source_paths: [/srv/notes]\n    cron: \"* * * * *\"\n    rclone_remotes:\n      - { name: minio, bucket: notes }\n",
    )
    .expect("write config");
    let pid_file = dir.path().join("hermes-backup.pid");
    let path = format!("{}:{}", bin.display(), std::env::var("PATH").unwrap_or_default());

    let mut child = backup_cmd(dir.path())
        .env("PATH", path)
        .arg("--config")
        .arg(&config)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn hermes-backup");
    let daemon = Pid::from_raw(child.id() as i32);

    // The first fire lands on the next minute boundary.
    let running = wait_until(Duration::from_secs(75), || {
        fs::read_to_string(&started).map(|s| !s.trim().is_empty()).unwrap_or(false)
    });
    if !running {
        let _ = child.kill();
        panic!("backup run never started");
    }

    kill(daemon, Signal::SIGTERM).expect("first SIGTERM");
    sleep(Duration::from_millis(300));
    assert!(child.try_wait().expect("try_wait").is_none(), "first signal drains the running backup");
    kill(daemon, Signal::SIGTERM).expect("second SIGTERM");

    let status = child.wait().expect("wait");
    if let Ok(Ok(rclone_pid)) = fs::read_to_string(&started).map(|s| s.trim().parse::<i32>()) {
        let _ = kill(Pid::from_raw(rclone_pid), Signal::SIGKILL);
    }
    assert_eq!(status.code(), Some(1), "forced exit, got {status}");
    assert!(pid_file.exists(), "forced exit skips pid file cleanup");
}
