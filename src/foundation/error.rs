/// Result alias used throughout the crate.
pub type MiiResult<T> = Result<T, MiiError>;

/// Errors surfaced by the encoder, channel, supervisor and renderer.
#[derive(thiserror::Error, Debug)]
pub enum MiiError {
    /// Malformed caller input (identity length, output size, unsupported format).
    #[error("validation error: {0}")]
    Validation(String),

    /// The engine failed to launch, crashed, or never became ready.
    #[error("backend error: {message}")]
    Backend {
        /// Human readable description.
        message: String,
        /// Exit code of the engine process, when it exited on its own.
        exit_code: Option<i32>,
    },

    /// A TCP connect to the engine failed: nothing is listening on the port.
    #[error("connection error: {0}")]
    Connection(String),

    /// Mid-transaction I/O failure or a truncated, empty or malformed response.
    #[error("render error: {0}")]
    Render(String),

    /// Configuration or settings could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Context-wrapped failure from an auxiliary path (file reads, image writes).
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MiiError {
    /// Build a [`MiiError::Validation`].
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`MiiError::Backend`] without an exit code.
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend {
            message: msg.into(),
            exit_code: None,
        }
    }

    /// Build a [`MiiError::Backend`] for an engine that exited with `exit_code`.
    pub fn backend_exit(msg: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self::Backend {
            message: msg.into(),
            exit_code,
        }
    }

    /// Build a [`MiiError::Connection`].
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Build a [`MiiError::Render`].
    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    /// Build a [`MiiError::Serde`].
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }

    /// Exit code carried by a backend error, if any.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Backend { exit_code, .. } => *exit_code,
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
