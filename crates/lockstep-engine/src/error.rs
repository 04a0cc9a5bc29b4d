//! Error types shared across the engine.
//!
//! Startup failures are surfaced as `anyhow::Error` by the runtime; the typed
//! errors here are what individual subsystems return.

use std::path::PathBuf;

/// Why a capture session could not leave `Idle`.
#[derive(thiserror::Error, Debug)]
pub enum CaptureInitError {
    #[error("capture session is not idle")]
    NotIdle,

    #[error("cannot prepare output path '{path}': {source}")]
    OutputPath {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("pixel buffer pool allocation failed: {0}")]
    Pool(String),

    #[error("texture cache allocation failed: {0}")]
    TextureCache(#[from] GpuError),

    #[error("encoder could not be opened: {0}")]
    Encoder(String),
}

impl CaptureInitError {
    pub fn encoder(msg: impl Into<String>) -> Self {
        Self::Encoder(msg.into())
    }
}

/// Failure inside an open encoder session.
#[derive(thiserror::Error, Debug)]
pub enum EncodeError {
    #[error("encoder input already marked finished")]
    Finished,

    #[error("frame size mismatch: got {got} bytes, expected {expected}")]
    FrameSize { got: usize, expected: usize },

    #[error("encoder i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("encoder failed: {0}")]
    Backend(String),
}

impl EncodeError {
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Whether later appends can be expected to fail the same way. Only a
    /// size mismatch is local to the rejected frame.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::FrameSize { .. })
    }
}

/// GPU-side failure that is local to one frame or one allocation.
#[derive(thiserror::Error, Debug, Clone, Eq, PartialEq)]
pub enum GpuError {
    #[error("image allocation failed: {0}")]
    Allocation(String),

    #[error("readback failed: {0}")]
    Readback(String),

    #[error("unknown program id {0}")]
    UnknownProgram(u32),
}

/// Program library failures.
#[derive(thiserror::Error, Debug, Clone, Eq, PartialEq)]
pub enum ProgramError {
    /// A required built-in program is missing; rendering cannot start.
    #[error("program library unavailable: required program '{0}' is not registered")]
    LibraryUnavailable(String),
}

/// Malformed OBJ geometry.
#[derive(thiserror::Error, Debug, Clone, Eq, PartialEq)]
#[error("obj line {line}: {reason}")]
pub struct ObjError {
    pub line: usize,
    pub reason: String,
}

/// Cached asset acquisition failures.
#[derive(thiserror::Error, Debug)]
pub enum AssetError {
    #[error("asset fetch failed for '{url}': {reason}")]
    Fetch { url: String, reason: String },

    #[error("asset hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("asset cache i/o failed for '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_init_messages_are_descriptive() {
        assert!(CaptureInitError::encoder("ffmpeg missing")
            .to_string()
            .contains("ffmpeg missing"));
        assert!(CaptureInitError::Pool("zero size".into())
            .to_string()
            .contains("pool"));
    }

    #[test]
    fn texture_cache_error_wraps_gpu_error() {
        let err: CaptureInitError = GpuError::Allocation("oom".into()).into();
        assert!(err.to_string().contains("oom"));
    }

    #[test]
    fn frame_size_reports_both_lengths() {
        let msg = EncodeError::FrameSize { got: 3, expected: 4 }.to_string();
        assert!(msg.contains('3') && msg.contains('4'));
    }

    #[test]
    fn only_size_mismatch_is_recoverable() {
        assert!(!EncodeError::FrameSize { got: 3, expected: 4 }.is_terminal());
        assert!(EncodeError::Finished.is_terminal());
        assert!(EncodeError::backend("ffmpeg writer exited").is_terminal());
    }
}
