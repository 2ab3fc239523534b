//! End-to-end supervision scenarios driven through the real binary.
#![cfg(unix)]

mod common;

use std::{fs, path::PathBuf, process::Command, thread, time::Duration};

use common::{KillOnDrop, interrupt, wait_for_exit, wait_for_lines, write_script};
use tempfile::{TempDir, tempdir};

struct Sandbox {
    temp: TempDir,
    staging: PathBuf,
    child: PathBuf,
    out: PathBuf,
}

impl Sandbox {
    fn new(child_body: &str) -> Self {
        let temp = tempdir().expect("tempdir");
        let staging = temp.path().join("staging");
        fs::create_dir(&staging).expect("create staging");

        let out = temp.path().join("out");
        let child = temp.path().join("app");
        write_script(&child, &child_body.replace("OUT", &out.display().to_string()));

        Self {
            temp,
            staging,
            child,
            out,
        }
    }

    fn spawn_supervisor(&self, extra: &[&str]) -> KillOnDrop {
        let mut command = Command::new(common::hotswap_bin());
        command
            .arg("--interval")
            .arg("1s")
            .arg("--staging")
            .arg(&self.staging)
            .arg("--log")
            .arg(self.temp.path().join("supervisor.log"));
        command.args(extra);
        command.arg(&self.child);
        KillOnDrop(command.spawn().expect("spawn supervisor"))
    }

    fn stage_child(&self, body: &str) {
        let staged = self.staging.join("app");
        fs::write(
            &staged,
            format!("#!/bin/sh\n{}\n", body.replace("OUT", &self.out.display().to_string())),
        )
        .expect("write staged child");
    }
}

#[test]
fn no_update_graceful_interrupt() {
    let sandbox = Sandbox::new("echo v1 >> OUT\nexec sleep 30");
    let mut supervisor = sandbox.spawn_supervisor(&[]);

    wait_for_lines(&sandbox.out, 1);
    // Let a couple of update checks pass with an empty staging directory.
    thread::sleep(Duration::from_millis(2500));
    interrupt(&supervisor.0);

    let status = wait_for_exit(&mut supervisor.0, Duration::from_secs(10));
    assert_eq!(status.code(), Some(0));
    assert_eq!(wait_for_lines(&sandbox.out, 1), ["v1"]);
}

#[test]
fn child_update_detected_on_tick() {
    let sandbox = Sandbox::new("echo v1 >> OUT\nexec sleep 30");
    let mut supervisor = sandbox.spawn_supervisor(&[]);

    wait_for_lines(&sandbox.out, 1);
    sandbox.stage_child("echo v2 >> OUT\nexec sleep 30");

    // Tick terminates the child, the exit handler switches and respawns.
    let lines = wait_for_lines(&sandbox.out, 2);
    assert_eq!(lines, ["v1", "v2"]);

    let swapped = fs::read(&sandbox.child).expect("read child");
    let staged = fs::read(sandbox.staging.join("app")).expect("read staged");
    assert_eq!(swapped, staged);

    interrupt(&supervisor.0);
    let status = wait_for_exit(&mut supervisor.0, Duration::from_secs(10));
    assert_eq!(status.code(), Some(0));
}

#[test]
fn child_update_applied_on_natural_exit() {
    let sandbox = Sandbox::new("echo v1 >> OUT\nexec sleep 2");
    let mut supervisor = sandbox.spawn_supervisor(&[]);

    wait_for_lines(&sandbox.out, 1);
    sandbox.stage_child("echo v2 >> OUT\nexec sleep 30");

    let lines = wait_for_lines(&sandbox.out, 2);
    assert_eq!(lines, ["v1", "v2"]);

    interrupt(&supervisor.0);
    let status = wait_for_exit(&mut supervisor.0, Duration::from_secs(10));
    assert_eq!(status.code(), Some(0));

    // One switch, one respawn: nothing ran after v2 was stopped.
    assert_eq!(wait_for_lines(&sandbox.out, 2), ["v1", "v2"]);
}

#[test]
fn restart_flag_respawns_after_clean_exit() {
    let sandbox = Sandbox::new("echo run >> OUT\nexec sleep 1");
    let mut supervisor = sandbox.spawn_supervisor(&["--restart"]);

    // No update anywhere; the child still comes back after exiting cleanly.
    wait_for_lines(&sandbox.out, 2);

    interrupt(&supervisor.0);
    let status = wait_for_exit(&mut supervisor.0, Duration::from_secs(10));
    assert_eq!(status.code(), Some(0));
}

#[test]
fn clean_exit_without_restart_shuts_down() {
    let sandbox = Sandbox::new("echo once >> OUT");
    let mut supervisor = sandbox.spawn_supervisor(&[]);

    // The child exits on its own; with no update and no --restart the
    // supervisor returns success by itself.
    let status = wait_for_exit(&mut supervisor.0, Duration::from_secs(10));
    assert_eq!(status.code(), Some(0));
    assert_eq!(wait_for_lines(&sandbox.out, 1), ["once"]);
}
