//! Runs the `gensys` binary the way a user would.
#![cfg(unix)]

use gensys::model::{InstallLocation, InstallScope};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tempfile::TempDir;

const TOOL: &str = "tool.sh";

// Forking while another thread still holds a fresh script open for writing
// makes exec fail with ETXTBSY.
static SPAWN_LOCK: Mutex<()> = Mutex::new(());

fn spawn_lock() -> MutexGuard<'static, ()> {
    SPAWN_LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

fn install_tool(plugins_dir: &Path, body: &str) {
    let loc = InstallLocation::new(InstallScope::Project, plugins_dir, TOOL);
    std::fs::create_dir_all(&loc.working_dir).expect("create tool dir");
    std::fs::write(&loc.executable, format!("#!/bin/sh\n{body}\n")).expect("write tool");
    std::fs::set_permissions(&loc.executable, std::fs::Permissions::from_mode(0o755))
        .expect("chmod tool");
}

/// Run the binary with logging on, killing it if it does not finish in time.
fn gensys(root: &Path, extra: &[&str]) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_gensys"))
        .arg("--project-plugins")
        .arg(root.join("Plugins"))
        .arg("--content-dir")
        .arg(root.join("Content"))
        .args(["--executable", TOOL, "--auto-save", "false"])
        .args(extra)
        .env("RUST_LOG", "info")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn gensys");

    let deadline = Instant::now() + Duration::from_secs(30);
    while child.try_wait().expect("poll gensys").is_none() {
        if Instant::now() > deadline {
            let _ = child.kill();
            let out = child.wait_with_output().expect("collect output");
            panic!(
                "gensys did not finish; stderr:\n{}",
                String::from_utf8_lossy(&out.stderr)
            );
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    child.wait_with_output().expect("collect output")
}

#[test]
fn json_report_stays_clean_while_logging_and_tool_output_go_to_stderr() {
    let _lock = spawn_lock();
    let root = TempDir::new().expect("failed to create temp dir");
    install_tool(
        &root.path().join("Plugins"),
        "echo 'Generating terrain 50%'\nfor n in TerrainMap TerrainLayersMap RiverErosionMap FoliageMap; do\n  printf 'raster' > \"$n.png\"\ndone",
    );

    let out = gensys(root.path(), &["--identifier", "v1", "--json"]);
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(out.status.success(), "stderr:\n{stderr}");

    let report: serde_json::Value =
        serde_json::from_slice(&out.stdout).expect("stdout should be only the JSON report");
    assert_eq!(report["identifier"], "v1");
    assert_eq!(report["outcome"]["status"], "succeeded");
    assert!(stderr.contains("[tool] Generating terrain 50%"), "stderr:\n{stderr}");
    assert!(root.path().join("Content/Gensys/v1/TerrainMap.png").is_file());
}

#[test]
fn invalid_identifier_fails_before_touching_the_content_store() {
    let _lock = spawn_lock();
    let root = TempDir::new().expect("failed to create temp dir");

    let out = gensys(root.path(), &["--identifier", "Materials"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("reserved"));
    assert!(!root.path().join("Content").exists());
}
