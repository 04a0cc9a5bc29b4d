//! Frame capture.
//!
//! A [`CaptureSession`] owns a fixed pool of pixel buffers, one GPU image per
//! buffer and an encoder session. Frames are checked out, rendered, read back
//! by the GPU backend and committed to the encoder in acquisition order.

mod encoder;
mod ffmpeg;
mod pool;
mod session;
mod texture_cache;

pub use encoder::{
    EncoderFactory, FinishCallback, FinishReport, PixelFormat, StreamSpec, Timestamp, VideoEncoder,
};
pub use ffmpeg::{DEFAULT_QUEUE_DEPTH, FfmpegEncoder, FfmpegEncoderFactory, is_ffmpeg_on_path};
pub use pool::{BufferPool, PixelBuffer, PoolError, SlotId};
pub use session::{
    CaptureSession, CaptureState, CommitOutcome, DropReason, FinalizeReport, FrameTarget,
};
pub use texture_cache::TextureCache;
