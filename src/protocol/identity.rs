use crate::foundation::error::{MiiError, MiiResult};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Length in bytes of a character identity blob.
pub const IDENTITY_LEN: usize = 96;

/// Opaque 96-byte blob identifying one character.
///
/// The contents are never interpreted; only the length is checked.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct MiiIdentity([u8; IDENTITY_LEN]);

impl MiiIdentity {
    /// Wrap an exactly-96-byte slice.
    pub fn from_slice(bytes: &[u8]) -> MiiResult<Self> {
        let blob: [u8; IDENTITY_LEN] = bytes.try_into().map_err(|_| {
            MiiError::validation(format!(
                "identity must be {IDENTITY_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(blob))
    }

    /// Read the leading 96 bytes of a character file.
    ///
    /// Longer files are accepted (trailing bytes are ignored); shorter files are rejected.
    pub fn from_path(path: impl AsRef<Path>) -> MiiResult<Self> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| {
            MiiError::validation(format!("open identity file '{}': {e}", path.display()))
        })?;
        let mut buf = Vec::with_capacity(IDENTITY_LEN);
        f.take(IDENTITY_LEN as u64)
            .read_to_end(&mut buf)
            .map_err(|e| {
                MiiError::validation(format!("read identity file '{}': {e}", path.display()))
            })?;
        Self::from_slice(&buf)
    }

    /// Borrow the raw blob.
    pub fn as_bytes(&self) -> &[u8; IDENTITY_LEN] {
        &self.0
    }
}

impl From<[u8; IDENTITY_LEN]> for MiiIdentity {
    fn from(blob: [u8; IDENTITY_LEN]) -> Self {
        Self(blob)
    }
}

impl TryFrom<&[u8]> for MiiIdentity {
    type Error = MiiError;

    fn try_from(bytes: &[u8]) -> MiiResult<Self> {
        Self::from_slice(bytes)
    }
}

impl std::fmt::Debug for MiiIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Leading four bytes only.
        write!(
            f,
            "MiiIdentity({:02x}{:02x}{:02x}{:02x}..)",
            self.0[0], self.0[1], self.0[2], self.0[3]
        )
    }
}

#[cfg(test)]
#[path = "../../tests/unit/protocol/identity.rs"]
mod tests;
