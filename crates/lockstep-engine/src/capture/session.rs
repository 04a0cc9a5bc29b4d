use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::time::Duration;

use crate::config::RenderConfig;
use crate::error::{CaptureInitError, EncodeError};
use crate::gpu::GpuBackend;

use super::encoder::{EncoderFactory, FinishReport, StreamSpec, Timestamp, VideoEncoder};
use super::pool::{BufferPool, PixelBuffer};
use super::texture_cache::TextureCache;

/// Lifecycle of a capture session.
///
/// `Idle → Recording → Finalizing → Closed`. A failed `start` stays in `Idle`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CaptureState {
    Idle,
    Recording,
    Finalizing,
    Closed,
}

/// The image a frame renders into, plus its pooled backing buffer when the
/// frame is being captured.
pub struct FrameTarget<I> {
    pub image: I,
    pub backing: Option<PixelBuffer>,
}

/// Why a frame did not reach the encoder.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DropReason {
    /// Encoder backpressure.
    EncoderNotReady,
    /// The GPU work or readback for the frame failed.
    GpuFailed,
    /// The encoder rejected the frame.
    EncoderError,
}

/// Result of handing a completed frame to the session.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CommitOutcome {
    /// Appended to the encoder at this timestamp.
    Appended(Timestamp),
    /// Held back until earlier frames complete.
    Parked,
    /// Consumed without reaching the encoder.
    Dropped(DropReason),
    /// Session is no longer recording.
    Ignored,
}

/// Summary produced when the session closes.
#[derive(Debug, Clone)]
pub struct FinalizeReport {
    pub output: PathBuf,
    pub frames_committed: u64,
    pub frames_dropped: u64,
    pub result: Result<FinishReport, String>,
}

struct Parked {
    buffer: PixelBuffer,
    rendered: bool,
}

/// Owns the pixel-buffer pool, the texture cache over it and the encoder for
/// one recording.
pub struct CaptureSession<I> {
    config: Arc<RenderConfig>,
    factory: Box<dyn EncoderFactory>,
    state: CaptureState,

    pool: Option<BufferPool>,
    textures: Option<TextureCache<I>>,
    encoder: Option<Box<dyn VideoEncoder>>,
    output: Option<PathBuf>,

    /// Frames appended to the encoder.
    frame_counter: u64,
    frames_dropped: u64,

    /// Ticket handed to the next acquired buffer.
    next_ticket: u64,
    /// Ticket that must be committed next.
    next_commit: u64,
    parked: BTreeMap<u64, Parked>,

    /// Set when the encoder can no longer take frames; ends the recording.
    failure: Option<String>,
    finish_rx: Option<Receiver<Result<FinishReport, EncodeError>>>,
    report: Option<FinalizeReport>,
}

impl<I: Clone> CaptureSession<I> {
    pub fn new(config: Arc<RenderConfig>, factory: Box<dyn EncoderFactory>) -> Self {
        Self {
            config,
            factory,
            state: CaptureState::Idle,
            pool: None,
            textures: None,
            encoder: None,
            output: None,
            frame_counter: 0,
            frames_dropped: 0,
            next_ticket: 0,
            next_commit: 0,
            parked: BTreeMap::new(),
            failure: None,
            finish_rx: None,
            report: None,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == CaptureState::Recording
    }

    pub fn is_closed(&self) -> bool {
        self.state == CaptureState::Closed
    }

    /// Frames submitted to the encoder.
    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped
    }

    /// Buffers handed out and not yet committed.
    pub fn outstanding(&self) -> usize {
        self.pool.as_ref().map_or(0, BufferPool::outstanding)
    }

    pub fn report(&self) -> Option<&FinalizeReport> {
        self.report.as_ref()
    }

    /// `Idle → Recording`.
    ///
    /// Removes any file already at `output`, allocates the pool and texture
    /// cache at the configured resolution and opens the encoder. On failure
    /// nothing is kept and the session stays `Idle`.
    pub fn start<G>(&mut self, output: &Path, gpu: &mut G) -> Result<(), CaptureInitError>
    where
        G: GpuBackend<Image = I>,
    {
        if self.state != CaptureState::Idle {
            return Err(CaptureInitError::NotIdle);
        }

        prepare_output(output)?;

        let resolution = self.config.resolution;
        let pool = BufferPool::new(resolution, self.config.pool_capacity)
            .map_err(|e| CaptureInitError::Pool(e.to_string()))?;
        let textures = TextureCache::allocate(gpu, pool.slots(), resolution)?;

        let spec = StreamSpec::h264(resolution, self.config.fps);
        let encoder = self.factory.open(output, &spec)?;

        self.pool = Some(pool);
        self.textures = Some(textures);
        self.encoder = Some(encoder);
        self.output = Some(output.to_path_buf());
        self.frame_counter = 0;
        self.frames_dropped = 0;
        self.next_ticket = 0;
        self.next_commit = 0;
        self.failure = None;
        self.state = CaptureState::Recording;

        log::info!("recording {resolution} @ {} fps to {}", spec.fps, output.display());
        Ok(())
    }

    /// Checks out a pooled buffer and its paired image.
    ///
    /// `None` unless recording, and `None` when the pool is exhausted.
    pub fn acquire_frame_target(&mut self) -> Option<FrameTarget<I>> {
        if self.state != CaptureState::Recording {
            return None;
        }
        let pool = self.pool.as_mut()?;
        let textures = self.textures.as_ref()?;

        let mut buffer = pool.checkout()?;
        let Some(image) = textures.view(buffer.slot()) else {
            log::error!("capture: no image cached for slot {:?}", buffer.slot());
            if let Err(e) = pool.restore(buffer) {
                log::error!("capture: {e}");
            }
            return None;
        };

        buffer.set_ticket(self.next_ticket);
        self.next_ticket += 1;

        Some(FrameTarget {
            image,
            backing: Some(buffer),
        })
    }

    /// Hands a buffer whose GPU work has finished to the encoder.
    ///
    /// Commits happen in acquisition order; a buffer that completes early is
    /// parked until its predecessors arrive. Outside `Recording` the buffer is
    /// released and the call is otherwise ignored.
    pub fn commit_frame(&mut self, buffer: PixelBuffer) -> CommitOutcome {
        self.complete(buffer, true)
    }

    /// Releases a buffer whose GPU work failed, keeping commit order intact.
    pub fn abandon_frame(&mut self, buffer: PixelBuffer) -> CommitOutcome {
        self.complete(buffer, false)
    }

    fn complete(&mut self, buffer: PixelBuffer, rendered: bool) -> CommitOutcome {
        if self.state != CaptureState::Recording {
            self.release(buffer);
            return CommitOutcome::Ignored;
        }

        let ticket = buffer.ticket();
        if ticket != self.next_commit {
            log::trace!("capture: parking ticket {ticket}, waiting for {}", self.next_commit);
            self.parked.insert(ticket, Parked { buffer, rendered });
            return CommitOutcome::Parked;
        }

        let outcome = self.commit_in_order(buffer, rendered);
        while self.failure.is_none()
            && let Some(next) = self.parked.remove(&self.next_commit)
        {
            self.commit_in_order(next.buffer, next.rendered);
        }

        if self.failure.is_some() {
            log::error!(
                "capture: encoder failed, ending the recording after {} frames",
                self.frame_counter
            );
            self.stop();
        }
        outcome
    }

    fn commit_in_order(&mut self, buffer: PixelBuffer, rendered: bool) -> CommitOutcome {
        self.next_commit += 1;

        let outcome = match self.encoder.as_mut() {
            _ if !rendered => CommitOutcome::Dropped(DropReason::GpuFailed),
            None => CommitOutcome::Ignored,
            Some(encoder) if encoder.has_failed() => {
                self.failure
                    .get_or_insert_with(|| "encoder stopped accepting frames".to_string());
                CommitOutcome::Dropped(DropReason::EncoderError)
            }
            Some(encoder) if !encoder.is_ready() => {
                CommitOutcome::Dropped(DropReason::EncoderNotReady)
            }
            Some(encoder) => {
                let pts = Timestamp::from_frame(self.frame_counter, self.config.fps);
                match encoder.append(&buffer, pts) {
                    Ok(()) => {
                        self.frame_counter += 1;
                        CommitOutcome::Appended(pts)
                    }
                    Err(e) if e.is_terminal() || encoder.has_failed() => {
                        log::error!("capture: append failed: {e}");
                        self.failure.get_or_insert_with(|| e.to_string());
                        CommitOutcome::Dropped(DropReason::EncoderError)
                    }
                    Err(e) => {
                        log::warn!("capture: append failed: {e}");
                        CommitOutcome::Dropped(DropReason::EncoderError)
                    }
                }
            }
        };

        if let CommitOutcome::Dropped(reason) = outcome {
            self.frames_dropped += 1;
            log::debug!("capture: dropped frame (ticket {}): {reason:?}", buffer.ticket());
        }

        self.release(buffer);
        outcome
    }

    fn release(&mut self, buffer: PixelBuffer) {
        if let Some(pool) = self.pool.as_mut()
            && let Err(e) = pool.restore(buffer)
        {
            log::error!("capture: {e}");
        }
    }

    /// `Recording → Finalizing`.
    ///
    /// Marks the encoder input finished and requests an asynchronous finalize.
    /// Returns immediately; the session closes when the encoder reports back
    /// (see [`poll_finalize`](Self::poll_finalize)). Calling this in any other
    /// state does nothing.
    pub fn stop(&mut self) {
        if self.state != CaptureState::Recording {
            log::debug!("capture: stop ignored in state {:?}", self.state);
            return;
        }
        self.state = CaptureState::Finalizing;

        if !self.parked.is_empty() {
            log::warn!("capture: {} completed frames left uncommitted", self.parked.len());
            let parked = std::mem::take(&mut self.parked);
            for (_, p) in parked {
                self.release(p.buffer);
            }
        }

        let (tx, rx) = mpsc::channel();
        self.finish_rx = Some(rx);

        match self.encoder.take() {
            Some(mut encoder) => {
                encoder.mark_finished();
                encoder.finish(Box::new(move |result| {
                    // The session may already be gone at process teardown.
                    let _ = tx.send(result);
                }));
                log::info!("finalizing capture after {} frames", self.frame_counter);
            }
            None => {
                let _ = tx.send(Err(EncodeError::Finished));
            }
        }
    }

    /// Applies the encoder's finish notification if it has arrived.
    ///
    /// Returns `true` once the session is `Closed`.
    pub fn poll_finalize(&mut self) -> bool {
        if self.state == CaptureState::Finalizing
            && let Some(rx) = self.finish_rx.as_ref()
        {
            match rx.try_recv() {
                Ok(result) => self.close(result),
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => {
                    self.close(Err(EncodeError::backend("encoder dropped its finish callback")))
                }
            }
        }
        self.is_closed()
    }

    /// Blocks until the finish notification arrives or `timeout` passes.
    ///
    /// Returns `true` once the session is `Closed`.
    pub fn wait_closed(&mut self, timeout: Duration) -> bool {
        if self.state == CaptureState::Finalizing
            && let Some(rx) = self.finish_rx.as_ref()
        {
            match rx.recv_timeout(timeout) {
                Ok(result) => self.close(result),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    self.close(Err(EncodeError::backend("encoder dropped its finish callback")))
                }
            }
        }
        self.is_closed()
    }

    /// `Finalizing → Closed`. Releases the pool and texture cache.
    fn close(&mut self, result: Result<FinishReport, EncodeError>) {
        self.state = CaptureState::Closed;
        self.finish_rx = None;
        self.parked.clear();
        self.pool = None;
        self.textures = None;

        let output = self.output.take().unwrap_or_default();
        // A file finalized after an encoder failure is still incomplete.
        let result = match (self.failure.take(), result) {
            (None, result) => result.map_err(|e| e.to_string()),
            (Some(failure), Ok(_)) => Err(failure),
            (Some(failure), Err(e)) => Err(format!("{failure}; {e}")),
        };
        match &result {
            Ok(_) => log::info!(
                "video finalized: {} ({} frames, {} dropped)",
                output.display(),
                self.frame_counter,
                self.frames_dropped
            ),
            Err(e) => log::error!("video finalize failed for {}: {e}", output.display()),
        }

        self.report = Some(FinalizeReport {
            output,
            frames_committed: self.frame_counter,
            frames_dropped: self.frames_dropped,
            result,
        });
    }
}

impl<I> Drop for CaptureSession<I> {
    fn drop(&mut self) {
        match self.state {
            CaptureState::Recording | CaptureState::Finalizing => log::warn!(
                "capture session dropped while {:?}; output may be truncated",
                self.state
            ),
            CaptureState::Idle | CaptureState::Closed => {}
        }
    }
}

fn prepare_output(path: &Path) -> Result<(), CaptureInitError> {
    let io_err = |source| CaptureInitError::OutputPath {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    match std::fs::remove_file(path) {
        Ok(()) => log::debug!("removed existing {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(io_err(e)),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("lockstep-session-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    // ── prepare_output ────────────────────────────────────────────────────

    #[test]
    fn prepare_output_creates_parent_directories() {
        let dir = scratch_dir("parent");
        let out = dir.join("nested").join("out.mp4");
        prepare_output(&out).unwrap();
        assert!(out.parent().unwrap().is_dir());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn prepare_output_removes_existing_file() {
        let dir = scratch_dir("existing");
        std::fs::create_dir_all(&dir).unwrap();
        let out = dir.join("out.mp4");
        std::fs::write(&out, b"stale").unwrap();
        prepare_output(&out).unwrap();
        assert!(!out.exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn prepare_output_accepts_bare_file_name() {
        let name = format!("lockstep-bare-{}.mp4", std::process::id());
        assert!(prepare_output(Path::new(&name)).is_ok());
    }
}
