use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use predicates::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

fn hermes_cmd(dir: &Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::Command::new(assert_cmd::cargo::cargo_bin!("hermes"));
    cmd.current_dir(dir)
        .env("NO_COLOR", "1")
        .env("HERMES_PID_FILE", dir.join("hermes-backup.pid"))
        .env_remove("CONFIG_PATH")
        .env_remove("RUST_LOG");
    cmd
}

fn write_config(dir: &Path, yaml: &str) -> PathBuf {
    let path = dir.join("config.yaml");
    fs::write(&path, yaml).expect("write config");
    path
}

const NOTES_CONFIG: &str = "\
defaults:
  cron: \"0 2 * * *\"
  rclone_remote: minio
  bucket: backups
projects:
  - name: notes
    source_paths: [/data/notes]
  - name: archive
    source_paths: [/data/archive]
    cron: \"30 4 * * 0\"
    mode: sync
    rclone_remotes:
      - name: b2
        bucket: cold
";

#[test]
fn project_add_bootstraps_missing_config() {
    let dir = TempDir::new().expect("tempdir");
    hermes_cmd(dir.path())
        .args([
            "project",
            "add",
            "--name",
            "notes",
            "--source",
            "/data/notes,/data/journal",
            "--cron",
            "0 3 * * *",
            "--remote",
            "minio:notes",
        ])
        .assert()
        .success()
        .stdout(contains("Project 'notes' added"));

    let saved = fs::read_to_string(dir.path().join("config.yaml")).expect("read config");
    assert!(saved.contains("/data/journal"));
    assert!(saved.contains("bucket: notes"));
    assert!(saved.contains("0 3 * * *"));
}

#[test]
fn project_add_with_same_name_replaces() {
    let dir = TempDir::new().expect("tempdir");
    write_config(dir.path(), NOTES_CONFIG);
    hermes_cmd(dir.path())
        .args(["project", "add", "--name", "notes", "--source", "/srv/notes", "--cron", "", "--remote", "s3:n"])
        .assert()
        .success()
        .stdout(contains("Project 'notes' replaced"));

    let saved = fs::read_to_string(dir.path().join("config.yaml")).expect("read config");
    assert!(saved.contains("/srv/notes"));
    assert!(!saved.contains("/data/notes"));
    assert_eq!(saved.matches("name: notes").count(), 1);
}

#[test]
fn project_add_prompts_for_missing_values() {
    let dir = TempDir::new().expect("tempdir");
    hermes_cmd(dir.path())
        .args(["project", "add"])
        .write_stdin("notes\n/data/notes, /data/todo\nminio\nnotes\n\n15 1 * * *\n")
        .assert()
        .success()
        .stdout(contains("Project name: "))
        .stdout(contains("Bucket for minio: "))
        .stdout(contains("Project 'notes' added"));

    let saved = fs::read_to_string(dir.path().join("config.yaml")).expect("read config");
    assert!(saved.contains("/data/todo"));
    assert!(saved.contains("15 1 * * *"));
}

#[test]
fn project_list_shows_effective_settings_sorted() {
    let dir = TempDir::new().expect("tempdir");
    write_config(dir.path(), NOTES_CONFIG);
    let output = hermes_cmd(dir.path())
        .args(["project", "list"])
        .output()
        .expect("run list");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);

    // Inherited from defaults.
    assert!(stdout.contains("0 2 * * *"));
    assert!(stdout.contains("minio:backups"));
    assert!(stdout.contains("b2:cold"));
    let archive = stdout.find("archive").expect("archive row");
    let notes = stdout.find("notes").expect("notes row");
    assert!(archive < notes, "rows sorted by name:\n{stdout}");
}

#[test]
fn project_list_without_projects() {
    let dir = TempDir::new().expect("tempdir");
    write_config(dir.path(), "defaults:\n  cron: \"0 2 * * *\"\n");
    hermes_cmd(dir.path())
        .args(["project", "list"])
        .assert()
        .success()
        .stdout(contains("no projects configured"));
}

#[test]
fn project_list_reports_missing_config() {
    let dir = TempDir::new().expect("tempdir");
    hermes_cmd(dir.path())
        .args(["project", "list"])
        .assert()
        .failure()
        .stderr(contains("config not found"));
}

#[test]
fn project_delete_removes_only_that_project() {
    let dir = TempDir::new().expect("tempdir");
    let config = write_config(dir.path(), NOTES_CONFIG);
    hermes_cmd(dir.path())
        .args(["project", "delete", "archive"])
        .assert()
        .success()
        .stdout(contains("Project 'archive' deleted"));

    let saved = fs::read_to_string(&config).expect("read config");
    assert!(!saved.contains("archive"));
    assert!(saved.contains("name: notes"));
    // Defaults were not baked into the remaining project.
    assert!(!saved.contains("rclone_remotes"));
}

#[test]
fn project_delete_unknown_fails() {
    let dir = TempDir::new().expect("tempdir");
    let config = write_config(dir.path(), NOTES_CONFIG);
    hermes_cmd(dir.path())
        .args(["project", "delete", "ghost"])
        .assert()
        .failure()
        .stderr(contains("project ghost not found"));
    assert_eq!(fs::read_to_string(&config).expect("read config"), NOTES_CONFIG);
}

#[test]
fn project_update_keeps_blank_answers() {
    let dir = TempDir::new().expect("tempdir");
    let config = write_config(dir.path(), NOTES_CONFIG);
    // name, sources, cron, mode, remote #1 name, remote #1 bucket, another?
    hermes_cmd(dir.path())
        .args(["project", "update", "archive"])
        .write_stdin("\n\n45 5 * * *\ncopy\n\nglacier\nn\n")
        .assert()
        .success()
        .stdout(contains("Project name [archive]: "))
        .stdout(contains("Remote #1 name [b2]: "))
        .stdout(contains("Project 'archive' updated"));

    let saved = fs::read_to_string(&config).expect("read config");
    assert!(saved.contains("/data/archive"));
    assert!(saved.contains("45 5 * * *"));
    assert!(saved.contains("bucket: glacier"));
    assert!(!saved.contains("mode: sync"));
}

#[test]
fn config_show_prints_logging_and_defaults() {
    let dir = TempDir::new().expect("tempdir");
    write_config(dir.path(), NOTES_CONFIG);
    hermes_cmd(dir.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(contains("defaults:"))
        .stdout(contains("rclone_remote: minio"))
        .stdout(contains("projects").not());
}

#[test]
fn config_edit_updates_settings_and_keeps_projects() {
    let dir = TempDir::new().expect("tempdir");
    let config = write_config(dir.path(), NOTES_CONFIG);
    // path, debug, rclone_remote, bucket, cron, timezone
    hermes_cmd(dir.path())
        .args(["config", "edit"])
        .write_stdin("/var/log/hermes.log\ntrue\n\narchive-bucket\n\nutc\n")
        .assert()
        .success()
        .stdout(contains("Defaults cron [0 2 * * *]: "));

    let saved = fs::read_to_string(&config).expect("read config");
    assert!(saved.contains("path: /var/log/hermes.log"));
    assert!(saved.contains("debug: true"));
    assert!(saved.contains("rclone_remote: minio"));
    assert!(saved.contains("bucket: archive-bucket"));
    assert!(saved.contains("timezone: utc"));
    assert!(saved.contains("name: archive"));
}

#[test]
fn config_flag_selects_file() {
    let dir = TempDir::new().expect("tempdir");
    let nested = dir.path().join("etc");
    fs::create_dir(&nested).expect("mkdir");
    fs::write(nested.join("hermes.yaml"), NOTES_CONFIG).expect("write config");
    hermes_cmd(dir.path())
        .args(["--config", "etc/hermes.yaml", "project", "list"])
        .assert()
        .success()
        .stdout(contains("archive"));
    hermes_cmd(dir.path())
        .env("CONFIG_PATH", nested.join("hermes.yaml"))
        .args(["project", "list"])
        .assert()
        .success()
        .stdout(contains("notes"));
}

#[test]
fn server_status_when_stopped() {
    let dir = TempDir::new().expect("tempdir");
    hermes_cmd(dir.path())
        .args(["server", "status"])
        .assert()
        .success()
        .stdout(contains("stopped"));
    hermes_cmd(dir.path())
        .args(["server", "status", "--json"])
        .assert()
        .success()
        .stdout(contains("\"status\": \"stopped\""));
}

#[test]
fn server_status_reports_stale_pid_file() {
    let dir = TempDir::new().expect("tempdir");
    let mut child = Command::new("true").spawn().expect("spawn true");
    let pid = child.id();
    child.wait().expect("wait true");
    fs::write(dir.path().join("hermes-backup.pid"), pid.to_string()).expect("write pid");

    hermes_cmd(dir.path())
        .args(["server", "status"])
        .assert()
        .success()
        .stdout(contains(format!("stale pid {pid}")));
}

#[test]
fn server_stop_when_not_running() {
    let dir = TempDir::new().expect("tempdir");
    hermes_cmd(dir.path())
        .args(["server", "stop"])
        .assert()
        .success()
        .stdout(contains("not running"));
}

#[test]
fn server_start_requires_backup_binary() {
    let dir = TempDir::new().expect("tempdir");
    write_config(dir.path(), NOTES_CONFIG);
    hermes_cmd(dir.path())
        .args(["server", "--binary", "/nonexistent/hermes-backup", "start"])
        .assert()
        .failure()
        .stderr(contains("backup binary not found"));
    assert!(!dir.path().join("hermes-backup.pid").exists());
}

#[test]
fn service_restart_requires_running_server() {
    let dir = TempDir::new().expect("tempdir");
    hermes_cmd(dir.path())
        .args(["service", "restart"])
        .assert()
        .failure()
        .stderr(contains("backup server is not running"));
}

#[test]
fn backup_run_rejects_unknown_project() {
    let dir = TempDir::new().expect("tempdir");
    write_config(dir.path(), NOTES_CONFIG);
    hermes_cmd(dir.path())
        .args(["backup", "run", "--projects", "notes,ghost"])
        .assert()
        .failure()
        .stderr(contains("unknown project(s): ghost"));
}

#[cfg(unix)]
mod with_fake_rclone {
    use std::os::unix::fs::PermissionsExt;

    use super::*;

    /// Puts an `rclone` on PATH that appends its arguments to `calls.log`
    /// and exits with `exit_code`.
    fn install_rclone(dir: &Path, exit_code: i32) -> (PathBuf, String) {
        let bin = dir.join("bin");
        fs::create_dir_all(&bin).expect("mkdir bin");
        let log = dir.join("calls.log");
        let script = format!(
            "#!/bin/sh\necho \"$@\" >> '{}'\nexit {exit_code}\n",
            log.display()
        );
        let rclone = bin.join("rclone");
        fs::write(&rclone, script).expect("write rclone");
        fs::set_permissions(&rclone, fs::Permissions::from_mode(0o755)).expect("chmod");
        let path = format!(
            "{}:{}",
            bin.display(),
            std::env::var("PATH").unwrap_or_default()
        );
        (log, path)
    }

    #[test]
    fn server_start_hands_pid_file_to_daemon() {
        let dir = TempDir::new().expect("tempdir");
        write_config(dir.path(), NOTES_CONFIG);
        let argv = dir.path().join("argv.txt");
        let daemon = dir.path().join("fake-hermes-backup");
        fs::write(&daemon, format!("#!/bin/sh\necho \"$@\" > '{}'\n", argv.display()))
            .expect("write daemon");
        fs::set_permissions(&daemon, fs::Permissions::from_mode(0o755)).expect("chmod");
        let pid_file = dir.path().join("custom.pid");

        hermes_cmd(dir.path())
            .env_remove("HERMES_PID_FILE")
            .arg("server")
            .arg("--binary")
            .arg(&daemon)
            .arg("--pid-file")
            .arg(&pid_file)
            .arg("start")
            .assert()
            .success()
            .stdout(contains("server started"));

        let mut recorded = String::new();
        for _ in 0..200 {
            recorded = fs::read_to_string(&argv).unwrap_or_default();
            if !recorded.is_empty() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        assert!(recorded.starts_with("--config /"), "argv: {recorded}");
        assert!(recorded.contains("config.yaml"), "argv: {recorded}");
        assert!(recorded.contains(&format!("--pid-file {}", pid_file.display())), "argv: {recorded}");
    }

    #[test]
    fn backup_run_invokes_rclone_per_source_and_remote() {
        let dir = TempDir::new().expect("tempdir");
        write_config(dir.path(), NOTES_CONFIG);
        let (log, path) = install_rclone(dir.path(), 0);

        hermes_cmd(dir.path())
            .env("PATH", path)
            .args(["backup", "run", "--projects", "archive"])
            .assert()
            .success()
            .stdout(contains("Backup for project 'archive' completed"));

        let calls = fs::read_to_string(log).expect("read calls");
        let lines: Vec<&str> = calls.lines().collect();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("sync /data/archive b2:cold"));
    }

    #[test]
    fn backup_run_all_projects_uses_default_remote() {
        let dir = TempDir::new().expect("tempdir");
        write_config(dir.path(), NOTES_CONFIG);
        let (log, path) = install_rclone(dir.path(), 0);

        hermes_cmd(dir.path())
            .env("PATH", path)
            .args(["backup", "run"])
            .assert()
            .success();

        let calls = fs::read_to_string(log).expect("read calls");
        assert!(calls.contains("copy /data/notes minio:backups"));
        assert!(calls.contains("sync /data/archive b2:cold"));
    }

    #[test]
    fn backup_run_stops_at_first_failure() {
        let dir = TempDir::new().expect("tempdir");
        write_config(dir.path(), NOTES_CONFIG);
        let (log, path) = install_rclone(dir.path(), 3);

        hermes_cmd(dir.path())
            .env("PATH", path)
            .args(["backup", "run"])
            .assert()
            .failure()
            .stderr(contains("backup for project 'notes' failed"));

        let calls = fs::read_to_string(log).expect("read calls");
        assert_eq!(calls.lines().count(), 1, "archive must not run after notes failed");
    }
}
