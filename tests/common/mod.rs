//! Shared helpers for the end-to-end supervisor tests.
#![allow(dead_code)]

use std::{
    fs,
    path::{Path, PathBuf},
    process::{Child, ExitStatus},
    thread,
    time::{Duration, Instant},
};

/// Path to the compiled `hotswap` binary under test.
pub fn hotswap_bin() -> PathBuf {
    assert_cmd::cargo::cargo_bin!("hotswap").to_path_buf()
}

/// Writes a shell script and marks it executable.
#[cfg(unix)]
pub fn write_script(path: &Path, body: &str) {
    use std::os::unix::fs::PermissionsExt;

    fs::write(path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).expect("chmod script");
}

/// Polls `path` until it holds at least `expected` lines.
pub fn wait_for_lines(path: &Path, expected: usize) -> Vec<String> {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        if let Ok(content) = fs::read_to_string(path) {
            let lines: Vec<_> = content.lines().map(|line| line.to_string()).collect();
            if lines.len() >= expected {
                return lines;
            }
        }

        if Instant::now() >= deadline {
            panic!("Timed out waiting for {expected} lines in {path:?}");
        }

        thread::sleep(Duration::from_millis(100));
    }
}

/// Polls until `child` exits, killing it on timeout.
pub fn wait_for_exit(child: &mut Child, timeout: Duration) -> ExitStatus {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait().expect("try_wait") {
            return status;
        }

        if Instant::now() >= deadline {
            let _ = child.kill();
            panic!("Process did not exit within {timeout:?}");
        }

        thread::sleep(Duration::from_millis(50));
    }
}

/// Sends `SIGINT` to a spawned process.
#[cfg(unix)]
pub fn interrupt(child: &Child) {
    use nix::{sys::signal, unistd::Pid};

    signal::kill(Pid::from_raw(child.id() as i32), signal::Signal::SIGINT)
        .expect("send SIGINT");
}

/// Kills the wrapped process on drop so failed assertions don't leak
/// supervisors (and their children) into the test environment.
pub struct KillOnDrop(pub Child);

impl Drop for KillOnDrop {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}
