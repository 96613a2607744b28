use crate::engine::supervisor::{EngineOutput, SupervisorOpts};
use crate::foundation::error::{MiiError, MiiResult};
use crate::transport::channel::ChannelTimeouts;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Port the engine listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 12346;

/// Configuration of a [`crate::Renderer`].
///
/// `executable` and `working_dir` are required; everything else has a default. Unknown keys are
/// rejected when deserializing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RendererConfig {
    /// Engine executable.
    pub executable: PathBuf,
    /// Directory containing the engine's resource files; the engine runs there.
    pub working_dir: PathBuf,
    /// TCP port on `127.0.0.1`.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Start the engine on the first render when it is not already listening.
    #[serde(default = "default_auto_start")]
    pub auto_start: bool,
    /// Surface the engine's stdout/stderr.
    #[serde(default)]
    pub verbose: bool,
    /// Append the engine's output to this file instead (takes precedence over `verbose`).
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    /// Arguments appended after `--server --port <p>`.
    #[serde(default)]
    pub extra_args: Vec<String>,
    /// How long startup waits for the listener.
    #[serde(default = "default_ready_timeout_ms")]
    pub ready_timeout_ms: u64,
    /// Delay between readiness probes.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Grace period between a termination request and a kill.
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
    /// Connect timeout of a liveness probe.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// Connect timeout of a render transaction. `None` (or 0) blocks.
    #[serde(default)]
    pub connect_timeout_ms: Option<u64>,
    /// Per read/write deadline of a render transaction. `None` (or 0) blocks.
    #[serde(default)]
    pub io_timeout_ms: Option<u64>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_auto_start() -> bool {
    true
}

fn default_ready_timeout_ms() -> u64 {
    5_000
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_grace_period_ms() -> u64 {
    1_000
}

fn default_probe_timeout_ms() -> u64 {
    100
}

impl RendererConfig {
    /// Defaults for the engine at `executable`, run inside `working_dir`.
    pub fn new(executable: impl Into<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            working_dir: working_dir.into(),
            port: default_port(),
            auto_start: default_auto_start(),
            verbose: false,
            log_file: None,
            extra_args: Vec::new(),
            ready_timeout_ms: default_ready_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            grace_period_ms: default_grace_period_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            connect_timeout_ms: None,
            io_timeout_ms: None,
        }
    }

    /// Parse a configuration from a JSON reader.
    pub fn from_reader<R: std::io::Read>(r: R) -> MiiResult<Self> {
        serde_json::from_reader(r)
            .map_err(|e| MiiError::serde(format!("parse renderer config JSON: {e}")))
    }

    /// Parse a configuration from a JSON string.
    pub fn from_json_str(s: &str) -> MiiResult<Self> {
        Self::from_reader(s.as_bytes())
    }

    /// Parse a configuration from a JSON file on disk.
    pub fn from_path(path: impl AsRef<Path>) -> MiiResult<Self> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| {
            MiiError::validation(format!("open renderer config '{}': {e}", path.display()))
        })?;
        Self::from_reader(BufReader::new(f))
    }

    /// Where the engine's output goes.
    pub fn engine_output(&self) -> EngineOutput {
        match (&self.log_file, self.verbose) {
            (Some(path), _) => EngineOutput::File(path.clone()),
            (None, true) => EngineOutput::Inherit,
            (None, false) => EngineOutput::Discard,
        }
    }

    /// Supervisor options derived from this configuration.
    pub fn supervisor_opts(&self) -> SupervisorOpts {
        SupervisorOpts {
            port: self.port,
            output: self.engine_output(),
            ready_timeout: Duration::from_millis(self.ready_timeout_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            grace_period: Duration::from_millis(self.grace_period_ms),
            probe_timeout: Duration::from_millis(self.probe_timeout_ms.max(1)),
        }
    }

    /// Transaction deadlines derived from this configuration.
    pub fn channel_timeouts(&self) -> ChannelTimeouts {
        ChannelTimeouts {
            connect: nonzero_ms(self.connect_timeout_ms),
            io: nonzero_ms(self.io_timeout_ms),
        }
    }
}

fn nonzero_ms(ms: Option<u64>) -> Option<Duration> {
    ms.filter(|&ms| ms > 0).map(Duration::from_millis)
}

#[cfg(test)]
#[path = "../tests/unit/config.rs"]
mod tests;
