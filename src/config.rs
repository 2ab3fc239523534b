use std::{
    fs, io,
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

/// Destination for a child output stream.
#[derive(Debug, Clone, Default)]
pub enum OutputSink {
    /// Inherit the supervisor's own stream.
    #[default]
    Inherit,
    /// Append to the file at this path, creating it if needed.
    Append(PathBuf),
}

impl OutputSink {
    /// Opens the sink as spawn-ready stdio.
    pub(crate) fn to_stdio(&self) -> io::Result<Stdio> {
        match self {
            OutputSink::Inherit => Ok(Stdio::inherit()),
            OutputSink::Append(path) => {
                let file = fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)?;
                Ok(Stdio::from(file))
            }
        }
    }
}

/// Runtime settings for the supervision engine.
///
/// The setters absolutize every stored path so a later working-directory
/// change (the daemon idiom chdirs to `/`) cannot reroute them. Once the
/// engine's `run` starts, the configuration is read-only.
#[derive(Debug, Clone)]
pub struct Config {
    version: String,
    staging: PathBuf,
    interval: Duration,
    tree: bool,
    restart: bool,
    child: PathBuf,
    args: Vec<String>,
    stdout: OutputSink,
    stderr: OutputSink,
}

impl Config {
    /// Creates a configuration with the defaults: `staging` directory next
    /// to the working directory and a one-minute check interval.
    pub fn new(version: impl Into<String>) -> io::Result<Self> {
        Ok(Self {
            version: version.into(),
            staging: std::path::absolute("staging")?,
            interval: Duration::from_secs(60),
            tree: false,
            restart: false,
            child: PathBuf::new(),
            args: Vec::new(),
            stdout: OutputSink::Inherit,
            stderr: OutputSink::Inherit,
        })
    }

    /// Sets the staging directory watched for new binaries.
    pub fn set_staging(&mut self, path: &Path) -> io::Result<()> {
        self.staging = std::path::absolute(path)?;
        Ok(())
    }

    /// Sets the update-check period.
    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    /// Terminate the whole process group instead of the child alone.
    pub fn set_terminate_tree(&mut self, tree: bool) {
        self.tree = tree;
    }

    /// Respawn the child on every exit, not only after an update.
    pub fn set_restart(&mut self, restart: bool) {
        self.restart = restart;
    }

    /// Sets the child executable and its argument vector.
    pub fn set_child(&mut self, path: &Path, args: Vec<String>) -> io::Result<()> {
        self.child = std::path::absolute(path)?;
        self.args = args;
        Ok(())
    }

    /// Redirects child stdout.
    pub fn set_stdout(&mut self, sink: OutputSink) {
        self.stdout = sink;
    }

    /// Redirects child stderr.
    pub fn set_stderr(&mut self, sink: OutputSink) {
        self.stderr = sink;
    }

    /// Supervisor version string, logged at startup.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Absolute staging directory path.
    pub fn staging(&self) -> &Path {
        &self.staging
    }

    /// Update-check period.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether termination targets the whole process group.
    pub fn terminate_tree(&self) -> bool {
        self.tree
    }

    /// Whether the child is respawned on every exit.
    pub fn restart(&self) -> bool {
        self.restart
    }

    /// Absolute child executable path.
    pub fn child(&self) -> &Path {
        &self.child
    }

    /// Child argument vector.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Child stdout sink.
    pub fn stdout(&self) -> &OutputSink {
        &self.stdout
    }

    /// Child stderr sink.
    pub fn stderr(&self) -> &OutputSink {
        &self.stderr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::new("1.2.3").expect("config");
        assert_eq!(config.version(), "1.2.3");
        assert_eq!(config.interval(), Duration::from_secs(60));
        assert!(config.staging().is_absolute());
        assert!(config.staging().ends_with("staging"));
        assert!(!config.terminate_tree());
        assert!(!config.restart());
    }

    #[test]
    fn staging_path_is_absolutized() {
        let mut config = Config::new("test").expect("config");
        config
            .set_staging(Path::new("relative/updates"))
            .expect("set staging");
        assert!(config.staging().is_absolute());
        assert!(config.staging().ends_with("relative/updates"));
    }

    #[test]
    fn child_path_is_absolutized_and_args_kept() {
        let mut config = Config::new("test").expect("config");
        config
            .set_child(Path::new("bin/app"), vec!["--port".into(), "8080".into()])
            .expect("set child");
        assert!(config.child().is_absolute());
        assert_eq!(config.args(), ["--port", "8080"]);
    }
}
