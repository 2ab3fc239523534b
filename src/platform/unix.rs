use std::{
    fs, io,
    os::{fd::IntoRawFd, unix::process::CommandExt},
    path::Path,
    process::Command,
};

use nix::{
    errno::Errno,
    sys::signal::{Signal, kill},
    unistd::{self, ForkResult, Pid},
};

/// Places the spawned child in a fresh process group.
///
/// Keeps terminal signals aimed at the supervisor from propagating to the
/// child and makes group termination possible.
pub fn new_process_group(command: &mut Command) {
    command.process_group(0);
}

/// Sends `SIGTERM` to a single process.
pub fn terminate_process(pid: u32) -> io::Result<()> {
    send_sigterm(Pid::from_raw(pid as i32))
}

/// Sends `SIGTERM` to the whole process group rooted at `pid`.
pub fn terminate_tree(pid: u32) -> io::Result<()> {
    send_sigterm(Pid::from_raw(-(pid as i32)))
}

fn send_sigterm(target: Pid) -> io::Result<()> {
    match kill(target, Signal::SIGTERM) {
        // ESRCH means the child won the race and exited on its own.
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(errno) => Err(io::Error::from_raw_os_error(errno as i32)),
    }
}

/// Marks `path` executable (mode `0751`).
pub fn set_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o751))
}

/// Forks the supervisor into the background and returns in the daemon
/// process.
///
/// The first fork lets the invoking shell get its prompt back and makes the
/// survivor a session leader; the second gives that leadership up again so
/// the daemon can never reacquire a controlling terminal. The working
/// directory moves to `/` (configured paths are absolute by then) and the
/// standard streams end up on `/dev/null`.
pub fn daemonize() -> io::Result<()> {
    continue_in_child()?;
    unistd::setsid().map_err(io::Error::from)?;
    continue_in_child()?;
    unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0)).map_err(io::Error::from)?;

    std::env::set_current_dir("/")?;
    silence_stdio()
}

/// Forks once; the parent half exits immediately, the child half continues.
fn continue_in_child() -> io::Result<()> {
    // SAFETY: the shell daemonizes before any engine thread exists, so the
    // forked child cannot inherit a held lock.
    match unsafe { unistd::fork() }.map_err(io::Error::from)? {
        ForkResult::Parent { .. } => std::process::exit(0),
        ForkResult::Child => Ok(()),
    }
}

fn silence_stdio() -> io::Result<()> {
    let devnull = fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open("/dev/null")?;
    let fd = devnull.into_raw_fd();
    for stream in [libc::STDIN_FILENO, libc::STDOUT_FILENO, libc::STDERR_FILENO] {
        if unsafe { libc::dup2(fd, stream) } == -1 {
            return Err(io::Error::last_os_error());
        }
    }
    unsafe {
        libc::close(fd);
    }
    Ok(())
}

/// Restarts an installed init service by shelling out to `service <name> restart`.
pub fn restart_service(name: &str) -> io::Result<()> {
    let status = Command::new("service").args([name, "restart"]).status()?;
    if !status.success() {
        return Err(io::Error::other(format!(
            "'service {name} restart' exited with {status}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn set_executable_applies_mode_0751() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("prog");
        fs::write(&path, b"#!/bin/sh\n").expect("write file");

        set_executable(&path).expect("set executable");

        let mode = fs::metadata(&path).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o751);
    }

    #[test]
    fn terminate_unknown_pid_is_swallowed() {
        // PID near the default pid_max ceiling; almost certainly unused.
        terminate_process(4_000_000).expect("ESRCH should be swallowed");
    }
}
