use std::path::{Path, PathBuf};

use crate::config::Resolution;
use crate::error::{CaptureInitError, EncodeError};

use super::pool::PixelBuffer;

/// Presentation timestamp as a rational `value / timescale` seconds.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Timestamp {
    pub value: u64,
    pub timescale: u32,
}

impl Timestamp {
    /// Timestamp of frame `index` at a fixed `fps`.
    pub fn from_frame(index: u64, fps: u32) -> Self {
        Self {
            value: index,
            timescale: fps.max(1),
        }
    }

    pub fn seconds(&self) -> f64 {
        self.value as f64 / self.timescale as f64
    }
}

/// Pixel layout handed to the encoder.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PixelFormat {
    /// 8-bit BGRA, the layout of the GPU frame target.
    Bgra8,
}

/// Output stream parameters.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct StreamSpec {
    pub resolution: Resolution,
    pub fps: u32,
    pub pixel_format: PixelFormat,
    pub bitrate: u32,
}

impl StreamSpec {
    /// H.264 at 10 Mbit/s.
    pub fn h264(resolution: Resolution, fps: u32) -> Self {
        Self {
            resolution,
            fps,
            pixel_format: PixelFormat::Bgra8,
            bitrate: 10_000_000,
        }
    }
}

/// What the encoder reports once the output file is complete.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FinishReport {
    pub path: PathBuf,
    pub frames: u64,
}

/// Fired exactly once when finalization completes.
pub type FinishCallback = Box<dyn FnOnce(Result<FinishReport, EncodeError>) + Send + 'static>;

/// An open encoding session writing one file.
pub trait VideoEncoder: Send {
    /// Backpressure signal. When `false`, the frame should be dropped.
    fn is_ready(&self) -> bool;

    /// Appends one frame. The buffer is only borrowed; it can be reused
    /// as soon as this returns.
    fn append(&mut self, frame: &PixelBuffer, pts: Timestamp) -> Result<(), EncodeError>;

    /// `true` once the encoder can no longer accept frames, e.g. because its
    /// backend process exited. A failed encoder is never ready again.
    fn has_failed(&self) -> bool {
        false
    }

    /// Declares that no more frames will arrive.
    fn mark_finished(&mut self);

    /// Finalizes the file asynchronously and calls `on_done` when the file is
    /// safe to read. Returns immediately.
    fn finish(self: Box<Self>, on_done: FinishCallback);
}

/// Opens encoder sessions.
pub trait EncoderFactory {
    fn open(&mut self, path: &Path, spec: &StreamSpec)
        -> Result<Box<dyn VideoEncoder>, CaptureInitError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_are_spaced_at_nominal_rate() {
        let a = Timestamp::from_frame(0, 60);
        let b = Timestamp::from_frame(1, 60);
        let c = Timestamp::from_frame(60, 60);
        assert!(a < b && b < c);
        assert!((b.seconds() - 1.0 / 60.0).abs() < 1e-12);
        assert_eq!(c.seconds(), 1.0);
    }

    #[test]
    fn zero_fps_is_clamped() {
        assert_eq!(Timestamp::from_frame(3, 0).timescale, 1);
    }
}
