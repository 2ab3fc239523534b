use std::{
    error::Error,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::info;
use tracing_subscriber::EnvFilter;

use hotswap::{
    cli::{Cli, parse_args},
    config::{Config, OutputSink},
    platform,
    supervisor::Supervisor,
};

fn main() -> Result<(), Box<dyn Error>> {
    let args = parse_args();
    init_logging(&args);

    let mut config = Config::new(env!("CARGO_PKG_VERSION"))?;
    config.set_interval(args.interval);
    config.set_staging(&args.staging)?;
    config.set_terminate_tree(args.tree);
    config.set_restart(args.restart);
    if let Some(path) = &args.stdout {
        config.set_stdout(OutputSink::Append(path.clone()));
    }
    if let Some(path) = &args.stderr {
        config.set_stderr(OutputSink::Append(path.clone()));
    }

    // One-shot update mode: switch the target from staging and exit. With
    // --service the installed service is bounced instead of respawning the
    // target directly.
    if let Some(target) = &args.update {
        let supervisor = Supervisor::new(config);
        match &args.service {
            Some(name) => {
                supervisor.update(target, false)?;
                supervisor.restart_daemon(name)?;
            }
            None => supervisor.update(target, true)?,
        }
        return Ok(());
    }

    let Some((child, child_args)) = args.command.split_first() else {
        return Err("no child executable passed".into());
    };
    let mut child_path = PathBuf::from(child);

    // Keeps the temp dir alive until the supervisor exits.
    let mut _tmp_guard = None;
    if args.tmp {
        let (guard, copy) = copy_to_temp(&child_path)?;
        _tmp_guard = Some(guard);
        child_path = copy;
    }

    config.set_child(&child_path, child_args.to_vec())?;

    let mut supervisor = Supervisor::new(config);
    match &args.service {
        Some(name) => supervisor.daemonize(name)?,
        None => supervisor.run()?,
    }
    Ok(())
}

/// Copies the child into a fresh temporary directory, keeping its basename
/// so staging lookups still match, and marks the copy executable.
fn copy_to_temp(child: &Path) -> Result<(tempfile::TempDir, PathBuf), Box<dyn Error>> {
    let dir = tempfile::Builder::new().prefix("hotswap-").tempdir()?;
    let name = child
        .file_name()
        .ok_or("child path has no file name")?;
    let copy = dir.path().join(name);
    fs::copy(child, &copy)?;
    platform::set_executable(&copy)?;
    info!("Supervising temporary copy {}", copy.display());
    Ok((dir, copy))
}

/// Wires tracing to the console, or to the `--log` file in append mode.
/// An unopenable log file demotes to console logging rather than aborting.
fn init_logging(args: &Cli) {
    let filter = match args.log_level {
        Some(level) => EnvFilter::new(level.as_str()),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let log_file = args.log.as_deref().and_then(|path| {
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .inspect_err(|err| {
                eprintln!(
                    "hotswap: logging to console, cannot append to {}: {err}",
                    path.display()
                );
            })
            .ok()
    });

    let _ = match log_file {
        Some(file) => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Arc::new(file))
            .try_init(),
        None => tracing_subscriber::fmt().with_env_filter(filter).try_init(),
    };
}
