use crate::foundation::error::{MiiError, MiiResult};
use anyhow::Context as _;
use std::fs::OpenOptions;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, TcpStream};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

/// Lifecycle of the supervised engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    /// `start` has not been called yet.
    NotStarted,
    /// Spawned, waiting for the listener to come up.
    Starting,
    /// Accepting connections (possibly an engine owned by someone else).
    Running,
    /// Stopped on request.
    Stopped,
    /// Exited on its own, refused connections, or never became ready.
    Crashed {
        /// Exit code, when the process exited normally.
        exit_code: Option<i32>,
    },
}

/// Where the engine's stdout/stderr go.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum EngineOutput {
    /// Discard both streams. Crashes are reported without diagnostics.
    #[default]
    Discard,
    /// Share the parent's stdout/stderr.
    Inherit,
    /// Append both streams to a file.
    File(PathBuf),
}

/// Executable and working directory handed over by whoever located the engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineLaunch {
    executable: PathBuf,
    working_dir: PathBuf,
    extra_args: Vec<String>,
}

impl EngineLaunch {
    /// Check that `executable` is a file and `working_dir` a directory.
    pub fn new(
        executable: impl Into<PathBuf>,
        working_dir: impl Into<PathBuf>,
    ) -> MiiResult<Self> {
        let executable = executable.into();
        let working_dir = working_dir.into();
        if !executable.is_file() {
            return Err(MiiError::validation(format!(
                "engine executable '{}' does not exist",
                executable.display()
            )));
        }
        if !working_dir.is_dir() {
            return Err(MiiError::validation(format!(
                "engine working directory '{}' does not exist",
                working_dir.display()
            )));
        }
        Ok(Self {
            executable,
            working_dir,
            extra_args: Vec::new(),
        })
    }

    /// Arguments appended after `--server --port <p>`.
    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.extra_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Engine executable.
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Directory the engine runs in; holds its resource files.
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }
}

/// Supervisor tuning.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SupervisorOpts {
    /// Port the engine binds on `127.0.0.1`.
    pub port: u16,
    /// Destination of the engine's output.
    pub output: EngineOutput,
    /// How long `start` waits for the listener.
    pub ready_timeout: Duration,
    /// Delay between readiness probes.
    pub poll_interval: Duration,
    /// How long `stop` waits after a termination request before killing.
    pub grace_period: Duration,
    /// Connect timeout of a liveness probe.
    pub probe_timeout: Duration,
}

impl SupervisorOpts {
    /// Defaults for an engine on `port`.
    pub fn new(port: u16) -> Self {
        Self {
            port,
            output: EngineOutput::Discard,
            ready_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(100),
            grace_period: Duration::from_secs(1),
            probe_timeout: Duration::from_millis(100),
        }
    }
}

/// Owns the engine child process: launch, readiness, crash detection, shutdown.
///
/// Liveness is always judged by connecting to the port, never by in-memory state, so an engine
/// started by another owner counts as running and is left alone by [`EngineSupervisor::stop`].
/// Dropping the supervisor stops any child it spawned.
#[derive(Debug)]
pub struct EngineSupervisor {
    launch: EngineLaunch,
    opts: SupervisorOpts,
    child: Option<Child>,
    state: EngineState,
    span: tracing::Span,
}

impl EngineSupervisor {
    /// Create a supervisor; nothing is spawned until [`EngineSupervisor::start`].
    pub fn new(launch: EngineLaunch, opts: SupervisorOpts, span: tracing::Span) -> Self {
        Self {
            launch,
            opts,
            child: None,
            state: EngineState::NotStarted,
            span,
        }
    }

    /// Last observed state. See [`EngineSupervisor::poll`] for a refreshed one.
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Port the engine listens on.
    pub fn port(&self) -> u16 {
        self.opts.port
    }

    /// OS process id of the child this supervisor spawned, if it is still held.
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    /// `true` when a TCP connect to the engine port succeeds.
    pub fn is_running(&self) -> bool {
        let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, self.opts.port));
        TcpStream::connect_timeout(&addr, self.opts.probe_timeout).is_ok()
    }

    /// Make sure an engine is accepting connections, launching one if needed.
    pub fn start(&mut self) -> MiiResult<()> {
        let span = self.span.clone();
        let _enter = span.enter();

        if self.is_running() {
            if self.state != EngineState::Running {
                tracing::info!(port = self.opts.port, "engine already listening");
            }
            self.state = EngineState::Running;
            return Ok(());
        }

        if let Some(stale) = self.child.take() {
            tracing::warn!(pid = stale.id(), "engine stopped answering; replacing it");
            self.reap(stale)?;
        }

        tracing::info!(
            exe = %self.launch.executable.display(),
            cwd = %self.launch.working_dir.display(),
            port = self.opts.port,
            "starting engine"
        );
        let child = self.spawn()?;
        let pid = child.id();
        self.child = Some(child);
        self.state = EngineState::Starting;

        let deadline = Instant::now() + self.opts.ready_timeout;
        loop {
            if let Some(status) = self.child_exit_status()? {
                self.child = None;
                let exit_code = status.code();
                self.state = EngineState::Crashed { exit_code };
                let hint = match self.opts.output {
                    EngineOutput::Discard => {
                        "; engine output is discarded, enable verbose output to see why"
                    }
                    EngineOutput::Inherit | EngineOutput::File(_) => "",
                };
                tracing::warn!(pid, ?exit_code, "engine exited during startup");
                return Err(MiiError::backend_exit(
                    format!("engine exited before accepting connections ({status}){hint}"),
                    exit_code,
                ));
            }

            if self.is_running() {
                self.state = EngineState::Running;
                tracing::info!(pid, "engine ready");
                return Ok(());
            }

            if Instant::now() >= deadline {
                tracing::warn!(pid, timeout = ?self.opts.ready_timeout, "engine never became ready");
                if let Some(child) = self.child.take() {
                    self.reap(child)?;
                }
                self.state = EngineState::Crashed { exit_code: None };
                return Err(MiiError::backend(format!(
                    "engine did not accept connections on port {} within {:?}",
                    self.opts.port, self.opts.ready_timeout
                )));
            }

            std::thread::sleep(self.opts.poll_interval);
        }
    }

    /// Terminate the child this supervisor spawned. Idempotent.
    ///
    /// An engine owned by someone else is never touched.
    pub fn stop(&mut self) -> MiiResult<()> {
        let span = self.span.clone();
        let _enter = span.enter();

        let Some(child) = self.child.take() else {
            if matches!(self.state, EngineState::Running | EngineState::Starting) {
                self.state = EngineState::Stopped;
            }
            return Ok(());
        };
        let pid = child.id();
        let status = self.reap(child)?;
        self.state = EngineState::Stopped;
        tracing::info!(pid, %status, "engine stopped");
        Ok(())
    }

    /// Refresh the state from the child handle and return it.
    ///
    /// A child that exited since the last check moves the state to [`EngineState::Crashed`].
    pub fn poll(&mut self) -> EngineState {
        if let Some(child) = self.child.as_mut() {
            match child.try_wait() {
                Ok(Some(status)) => {
                    let _enter = self.span.enter();
                    tracing::warn!(pid = child.id(), %status, "engine exited");
                    self.child = None;
                    self.state = EngineState::Crashed {
                        exit_code: status.code(),
                    };
                }
                Ok(None) => {}
                Err(e) => {
                    let _enter = self.span.enter();
                    tracing::warn!(error = %e, "failed to query engine status");
                }
            }
        }
        self.state
    }

    /// Record that a render connection was refused.
    pub fn observe_refused(&mut self) {
        if self.poll() == EngineState::Running {
            let _enter = self.span.enter();
            tracing::warn!(port = self.opts.port, "engine refused a render connection");
            self.state = EngineState::Crashed { exit_code: None };
        }
    }

    fn spawn(&self) -> MiiResult<Child> {
        let mut cmd = Command::new(&self.launch.executable);
        cmd.arg("--server")
            .arg("--port")
            .arg(self.opts.port.to_string())
            .args(&self.launch.extra_args)
            .current_dir(&self.launch.working_dir)
            .stdin(Stdio::null());

        match &self.opts.output {
            EngineOutput::Discard => {
                cmd.stdout(Stdio::null()).stderr(Stdio::null());
            }
            EngineOutput::Inherit => {
                cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
            }
            EngineOutput::File(path) => {
                let out = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .with_context(|| format!("open engine log '{}'", path.display()))?;
                let err = out
                    .try_clone()
                    .with_context(|| format!("duplicate engine log handle '{}'", path.display()))?;
                cmd.stdout(out).stderr(err);
            }
        }

        // The parent's copies of any log handles are dropped with `cmd`.
        cmd.spawn().map_err(|e| {
            MiiError::backend(format!(
                "failed to launch engine '{}': {e}",
                self.launch.executable.display()
            ))
        })
    }

    fn child_exit_status(&mut self) -> MiiResult<Option<ExitStatus>> {
        let Some(child) = self.child.as_mut() else {
            return Ok(None);
        };
        match child.try_wait() {
            Ok(status) => Ok(status),
            Err(e) => {
                if let Some(child) = self.child.take() {
                    let _ = self.reap(child);
                }
                self.state = EngineState::Crashed { exit_code: None };
                Err(MiiError::backend(format!("failed to query engine status: {e}")))
            }
        }
    }

    /// Ask the child to exit, wait out the grace period, then kill it.
    fn reap(&self, mut child: Child) -> MiiResult<ExitStatus> {
        if let Ok(Some(status)) = child.try_wait() {
            return Ok(status);
        }

        request_exit(&mut child);
        let deadline = Instant::now() + self.opts.grace_period;
        while Instant::now() < deadline {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) => std::thread::sleep(REAP_POLL.min(self.opts.grace_period)),
                Err(_) => break,
            }
        }

        tracing::warn!(pid = child.id(), "engine ignored termination request; killing");
        // Fails only when the child already exited, which `wait` then reports.
        let _ = child.kill();
        child
            .wait()
            .map_err(|e| MiiError::backend(format!("failed to reap engine process: {e}")))
    }
}

impl Drop for EngineSupervisor {
    fn drop(&mut self) {
        if self.child.is_some()
            && let Err(e) = self.stop()
        {
            let _enter = self.span.enter();
            tracing::warn!(error = %e, "failed to stop engine on drop");
        }
    }
}

const REAP_POLL: Duration = Duration::from_millis(20);

#[cfg(unix)]
fn request_exit(child: &mut Child) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Ok(pid) = i32::try_from(child.id()) else {
        let _ = child.kill();
        return;
    };
    if let Err(e) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
        tracing::debug!(pid, error = %e, "SIGTERM failed");
    }
}

#[cfg(not(unix))]
fn request_exit(child: &mut Child) {
    let _ = child.kill();
}

#[cfg(test)]
#[path = "../../tests/unit/engine/supervisor.rs"]
mod tests;
