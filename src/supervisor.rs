//! Supervision engine: event loop, update detection, swap and restart.

use std::{
    path::Path,
    sync::mpsc::{self, Receiver, Sender},
    thread,
};

use tracing::{debug, error, info};

use crate::{
    binary::Binary,
    cancel::CancelToken,
    config::Config,
    error::SupervisorError,
    platform,
    process::{self, ChildProcess},
};

/// One occurrence the engine loop reacts to.
///
/// Every producer pushes into a single channel and the loop handles exactly
/// one event per iteration, so each handler runs to completion before the
/// next event is serviced.
enum Event {
    /// The engine token was cancelled. Terminal.
    Shutdown,
    /// A console interrupt arrived.
    Interrupted,
    /// The current child exited; its status was logged by the waiter.
    ChildExited,
    /// The update-check ticker fired.
    Tick,
}

/// Handle to the currently supervised child.
///
/// Cancelling the token asks the terminator thread to signal the child; the
/// waiter thread reports the eventual exit through the event channel.
struct LiveChild {
    token: CancelToken,
}

impl LiveChild {
    /// Placeholder installed after a terminal decision, when no child is
    /// supervised anymore. Cancelling it is a no-op for the process tree.
    fn inert() -> Self {
        Self {
            token: CancelToken::new(),
        }
    }
}

/// Long-running supervisor that keeps one child executable alive and swaps
/// in updated binaries dropped into the staging directory.
pub struct Supervisor {
    config: Config,
    token: CancelToken,
}

impl Supervisor {
    /// Creates an engine around a fully populated configuration.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            token: CancelToken::new(),
        }
    }

    /// Clonable handle that shuts the engine down when cancelled.
    ///
    /// Used by the Windows service stop callback and by tests; cancelling it
    /// twice is indistinguishable from cancelling it once.
    pub fn cancel_handle(&self) -> CancelToken {
        self.token.clone()
    }

    /// Read access to the engine configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs the supervised loop until shutdown.
    ///
    /// Snapshots the supervisor's own binary and the child binary, starts the
    /// child, and then reacts to interrupts, child exits, and ticker fires
    /// until the engine token is cancelled. Returns `Ok` on clean shutdown
    /// (interrupt, child exit without restart, or self-update handoff).
    pub fn run(&mut self) -> Result<(), SupervisorError> {
        info!("Running hotswap {}", self.config.version());

        let self_exe = std::env::current_exe().map_err(SupervisorError::SelfLocate)?;
        let self_bin = Binary::snapshot(&self_exe)?;

        let (tx, rx) = mpsc::channel();

        // Wake the loop when the engine token is cancelled from outside the
        // loop (service stop callback, embedding tests).
        {
            let token = self.token.clone();
            let tx = tx.clone();
            thread::spawn(move || {
                token.wait();
                let _ = tx.send(Event::Shutdown);
            });
        }

        // One event per console signal.
        {
            let tx = tx.clone();
            ctrlc::set_handler(move || {
                let _ = tx.send(Event::Interrupted);
            })?;
        }

        let (child_bin, child) = self.start_child(&tx)?;

        // Update-check ticker; exits with the engine token.
        {
            let token = self.token.clone();
            let tx = tx.clone();
            let interval = self.config.interval();
            thread::spawn(move || {
                loop {
                    if token.wait_timeout(interval) {
                        break;
                    }
                    if tx.send(Event::Tick).is_err() {
                        break;
                    }
                }
            });
        }

        let result = self.event_loop(&tx, &rx, &self_bin, child_bin, child);
        // Releases the ticker and any terminator still parked on its token
        // when the loop bails out on an error path.
        self.token.cancel();
        result
    }

    fn event_loop(
        &self,
        tx: &Sender<Event>,
        rx: &Receiver<Event>,
        self_bin: &Binary,
        mut child_bin: Binary,
        mut child: LiveChild,
    ) -> Result<(), SupervisorError> {
        let staging = self.config.staging().to_path_buf();
        let mut running = true;

        loop {
            match rx.recv().map_err(|_| SupervisorError::EventChannelClosed)? {
                Event::Shutdown => {
                    info!("Exit");
                    return Ok(());
                }
                Event::Interrupted => {
                    info!("Received interrupt signal");
                    running = false;
                    child.token.cancel();
                }
                Event::ChildExited => {
                    info!("Child exited");
                    let mut updated = false;

                    if !child_bin.is_latest(&staging)? {
                        info!("Switching {}", child_bin.path().display());
                        child_bin.switch(&staging)?;
                        updated = true;
                    }

                    if !self_bin.is_latest(&staging)? {
                        info!("Supervisor binary updated, handing off");
                        self.start_self_update(self_bin)?;
                        self.token.cancel();
                    }

                    // A cancelled engine token means shutdown is already
                    // under way (handoff above, or an external cancel); the
                    // exiting process must not bring up another child.
                    if !self.token.is_cancelled()
                        && running
                        && (self.config.restart() || updated)
                    {
                        let (bin, handle) = self.start_child(tx)?;
                        child_bin = bin;
                        child = handle;
                    } else {
                        info!("Terminating");
                        child = LiveChild::inert();
                        self.token.cancel();
                    }
                }
                Event::Tick => {
                    debug!("Checking {}", child_bin.path().display());
                    if !child_bin.is_latest(&staging)? {
                        info!("Child binary updated, stopping child");
                        child.token.cancel();
                    }
                    debug!("Checking {}", self_bin.path().display());
                    if !self_bin.is_latest(&staging)? {
                        info!("Supervisor binary updated, stopping child");
                        child.token.cancel();
                    }
                }
            }
        }
    }

    /// Snapshots the child binary afresh, spawns it, and wires up the waiter
    /// and terminator threads.
    ///
    /// The fresh snapshot guarantees the engine's descriptor matches the file
    /// just spawned, including right after a switch.
    fn start_child(
        &self,
        events: &Sender<Event>,
    ) -> Result<(Binary, LiveChild), SupervisorError> {
        info!("Starting child");
        let bin = Binary::snapshot(self.config.child())?;
        let stdout = self.config.stdout().to_stdio()?;
        let stderr = self.config.stderr().to_stdio()?;
        let mut spawned = ChildProcess::spawn(bin.path(), self.config.args(), stdout, stderr)?;
        let pid = spawned.id();
        info!("Child started (pid {pid})");

        let token = self.token.child();

        // Waiter: owns the handle, publishes exactly one exit event.
        {
            let events = events.clone();
            thread::spawn(move || {
                debug!("Waiting for child exit");
                match spawned.wait() {
                    Ok(status) => info!("Child exited with {status}"),
                    Err(err) => error!("Child wait failed: {err}"),
                }
                let _ = events.send(Event::ChildExited);
            });
        }

        // Terminator: signals the child once its token is cancelled. It does
        // not wait for the child to die; observing exit is the waiter's job.
        {
            let token = token.clone();
            let tree = self.config.terminate_tree();
            thread::spawn(move || {
                token.wait();
                debug!("Terminating child (pid {pid})");
                if let Err(err) = process::terminate(pid, tree) {
                    error!("Terminate child: {err}");
                }
            });
        }

        Ok((bin, LiveChild { token }))
    }

    /// Spawns the staging copy of the supervisor so it can switch our binary
    /// after we exit.
    ///
    /// The copy receives this supervisor's argv with `--update <own-path>`
    /// prepended; running `update` from the new code sidesteps overwriting a
    /// live executable image. The spawn shares the child output sinks and
    /// lives in its own process group, so it survives this process's exit.
    fn start_self_update(&self, self_bin: &Binary) -> Result<(), SupervisorError> {
        let updater = self.config.staging().join(self_bin.name());

        let mut args: Vec<String> =
            vec!["--update".into(), self_bin.path().display().to_string()];
        args.extend(std::env::args().skip(1));

        info!("Running {} {:?}", updater.display(), args);
        let detached = ChildProcess::spawn(
            &updater,
            &args,
            self.config.stdout().to_stdio()?,
            self.config.stderr().to_stdio()?,
        )?;
        drop(detached);
        Ok(())
    }

    /// One-shot update mode: switch `target` from staging, then optionally
    /// restart it detached.
    ///
    /// This is the receiving end of the self-update handoff; no supervisory
    /// loop runs here.
    pub fn update(&self, target: &Path, restart: bool) -> Result<(), SupervisorError> {
        info!("Updating {} ({})", target.display(), self.config.version());
        let bin = Binary::snapshot(target)?;

        info!("Switching from {}", self.config.staging().display());
        bin.switch(self.config.staging())?;

        if !restart {
            return Ok(());
        }

        info!("Restarting {}", bin.path().display());
        let args = strip_update_args(std::env::args().skip(1));
        let detached = ChildProcess::spawn(
            bin.path(),
            &args,
            self.config.stdout().to_stdio()?,
            self.config.stderr().to_stdio()?,
        )?;
        drop(detached);
        Ok(())
    }

    /// Runs the engine detached from the console.
    ///
    /// POSIX: double-fork into the background, then run the loop in the
    /// daemon process. Windows: register with the service control manager
    /// under `service`; the SCM callbacks drive `run` and the engine token.
    #[cfg(unix)]
    pub fn daemonize(mut self, _service: &str) -> Result<(), SupervisorError> {
        platform::daemonize()?;
        self.run()
    }

    /// Runs the engine as a Windows service named `service`.
    #[cfg(windows)]
    pub fn daemonize(self, service: &str) -> Result<(), SupervisorError> {
        platform::run_service(service, self)
    }

    /// Restarts the installed service `name` through the platform's service
    /// manager, after a one-shot update scoped to it.
    pub fn restart_daemon(&self, name: &str) -> Result<(), SupervisorError> {
        info!("Restarting daemon {name}");
        platform::restart_service(name).map_err(|source| SupervisorError::ServiceRestart {
            name: name.to_string(),
            source,
        })
    }
}

/// This process's argument vector with the `--update <path>` pair removed,
/// so a binary respawned after an update enters supervise mode instead of
/// updating again.
fn strip_update_args(mut args: impl Iterator<Item = String>) -> Vec<String> {
    let mut stripped = Vec::new();
    while let Some(arg) = args.next() {
        if arg == "--update" {
            args.next();
            continue;
        }
        if arg.starts_with("--update=") {
            continue;
        }
        stripped.push(arg);
    }
    stripped
}
