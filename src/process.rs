//! Child process lifecycle: spawn, wait, terminate.

use std::{
    io,
    path::{Path, PathBuf},
    process::{Child, Command, ExitStatus, Stdio},
};

use tracing::debug;

use crate::{error::SupervisorError, platform};

/// Owns one spawned child process.
///
/// A controller whose [`ChildProcess::wait`] has returned is inert; the
/// engine replaces it with a fresh spawn rather than reusing it.
pub struct ChildProcess {
    child: Child,
    path: PathBuf,
}

impl ChildProcess {
    /// Spawns `path` with `args`, wiring the given output sinks.
    ///
    /// The child is placed in its own process group so terminal signals
    /// aimed at the supervisor do not reach it implicitly and so the whole
    /// group can be terminated on request.
    pub fn spawn(
        path: &Path,
        args: &[String],
        stdout: Stdio,
        stderr: Stdio,
    ) -> Result<Self, SupervisorError> {
        let mut command = Command::new(path);
        command.args(args).stdout(stdout).stderr(stderr);
        platform::new_process_group(&mut command);

        debug!("Exec {} {:?}", path.display(), args);
        let child = command.spawn().map_err(|source| SupervisorError::Spawn {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(Self {
            child,
            path: path.to_path_buf(),
        })
    }

    /// OS process id of the child.
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Path the child was spawned from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Blocks until the child exits and returns its status.
    ///
    /// Must be called at most once; the engine discards the controller after
    /// the first return.
    pub fn wait(&mut self) -> io::Result<ExitStatus> {
        self.child.wait()
    }
}

/// Sends the graceful termination signal to `pid`, or to its whole process
/// group when `tree` is set.
///
/// "Process not found" races with natural exit are swallowed by the platform
/// adapter; the child may already be gone when the signal is sent.
pub fn terminate(pid: u32, tree: bool) -> io::Result<()> {
    if tree {
        platform::terminate_tree(pid)
    } else {
        platform::terminate_process(pid)
    }
}
