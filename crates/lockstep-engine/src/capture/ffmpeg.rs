use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::thread::JoinHandle;

use crate::error::{CaptureInitError, EncodeError};

use super::encoder::{
    EncoderFactory, FinishCallback, FinishReport, PixelFormat, StreamSpec, Timestamp, VideoEncoder,
};
use super::pool::PixelBuffer;

/// Frames buffered between the control thread and ffmpeg's stdin.
pub const DEFAULT_QUEUE_DEPTH: usize = 8;

pub fn is_ffmpeg_on_path(program: &Path) -> bool {
    Command::new(program)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Opens [`FfmpegEncoder`] sessions using the system `ffmpeg` binary.
#[derive(Debug, Clone)]
pub struct FfmpegEncoderFactory {
    pub program: PathBuf,
    pub queue_depth: usize,
}

impl Default for FfmpegEncoderFactory {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }
}

impl FfmpegEncoderFactory {
    fn validate(spec: &StreamSpec) -> Result<(), CaptureInitError> {
        let res = spec.resolution;
        if res.width == 0 || res.height == 0 {
            return Err(CaptureInitError::encoder("width/height must be non-zero"));
        }
        if spec.fps == 0 {
            return Err(CaptureInitError::encoder("fps must be non-zero"));
        }
        if !res.width.is_multiple_of(2) || !res.height.is_multiple_of(2) {
            // yuv420p output needs even dimensions.
            return Err(CaptureInitError::encoder(format!(
                "{res} is not encodable: width and height must be even"
            )));
        }
        Ok(())
    }

    fn command(&self, path: &Path, spec: &StreamSpec) -> Command {
        let pix_fmt = match spec.pixel_format {
            PixelFormat::Bgra8 => "bgra",
        };

        let mut cmd = Command::new(&self.program);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        cmd.args([
            "-y",
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            pix_fmt,
            "-s",
            &spec.resolution.to_string(),
            "-r",
            &spec.fps.to_string(),
            "-i",
            "pipe:0",
            "-an",
            "-c:v",
            "libx264",
            "-profile:v",
            "high",
            "-b:v",
            &spec.bitrate.to_string(),
            "-pix_fmt",
            "yuv420p",
            "-movflags",
            "+faststart",
        ])
        .arg(path);
        cmd
    }
}

impl EncoderFactory for FfmpegEncoderFactory {
    fn open(
        &mut self,
        path: &Path,
        spec: &StreamSpec,
    ) -> Result<Box<dyn VideoEncoder>, CaptureInitError> {
        Self::validate(spec)?;

        if !is_ffmpeg_on_path(&self.program) {
            return Err(CaptureInitError::encoder(format!(
                "'{}' was not found on PATH",
                self.program.display()
            )));
        }

        let child = self
            .command(path, spec)
            .spawn()
            .map_err(|e| CaptureInitError::encoder(format!("failed to spawn ffmpeg: {e}")))?;

        log::debug!("ffmpeg: encoding {} @ {} fps into {}", spec.resolution, spec.fps, path.display());

        let frame_len = spec.resolution.packed_len().unwrap_or(0);
        let encoder = FfmpegEncoder::attach(path, child, frame_len, self.queue_depth)?;
        Ok(Box::new(encoder))
    }
}

/// Streams raw BGRA frames into an `ffmpeg` child process.
pub struct FfmpegEncoder {
    path: PathBuf,
    frame_len: usize,
    depth: usize,
    tx: Option<SyncSender<Vec<u8>>>,
    queued: Arc<AtomicUsize>,
    /// Set by the writer thread when a write to ffmpeg's stdin fails.
    failed: Arc<AtomicBool>,
    writer: Option<JoinHandle<std::io::Result<()>>>,
    child: Option<Child>,
    frames: u64,
    last_pts: Option<Timestamp>,
}

impl FfmpegEncoder {
    /// Takes over `child`'s stdin and starts the writer thread feeding it.
    fn attach(
        path: &Path,
        mut child: Child,
        frame_len: usize,
        depth: usize,
    ) -> Result<Self, CaptureInitError> {
        let Some(mut stdin) = child.stdin.take() else {
            reap_child(&mut child);
            return Err(CaptureInitError::encoder("failed to open ffmpeg stdin"));
        };

        let depth = depth.max(1);
        let (tx, rx) = mpsc::sync_channel::<Vec<u8>>(depth);
        let queued = Arc::new(AtomicUsize::new(0));
        let failed = Arc::new(AtomicBool::new(false));

        let writer_queued = Arc::clone(&queued);
        let writer_failed = Arc::clone(&failed);
        let spawned = std::thread::Builder::new()
            .name("lockstep-ffmpeg-writer".into())
            .spawn(move || -> std::io::Result<()> {
                for frame in rx {
                    let res = stdin.write_all(&frame);
                    writer_queued.fetch_sub(1, Ordering::AcqRel);
                    if let Err(e) = res {
                        writer_failed.store(true, Ordering::Release);
                        return Err(e);
                    }
                }
                stdin.flush()?;
                // Dropping stdin closes the pipe; ffmpeg then writes the trailer.
                Ok(())
            });
        let writer = match spawned {
            Ok(writer) => writer,
            Err(e) => {
                reap_child(&mut child);
                return Err(CaptureInitError::encoder(format!(
                    "failed to start writer thread: {e}"
                )));
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            frame_len,
            depth,
            tx: Some(tx),
            queued,
            failed,
            writer: Some(writer),
            child: Some(child),
            frames: 0,
            last_pts: None,
        })
    }

    fn wait(&mut self) -> Result<FinishReport, EncodeError> {
        if let Some(writer) = self.writer.take() {
            writer
                .join()
                .map_err(|_| EncodeError::backend("ffmpeg writer thread panicked"))??;
        }

        let child = self
            .child
            .take()
            .ok_or_else(|| EncodeError::backend("ffmpeg already reaped"))?;
        let output = child.wait_with_output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EncodeError::backend(format!(
                "ffmpeg exited with status {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(FinishReport {
            path: std::mem::take(&mut self.path),
            frames: self.frames,
        })
    }
}

impl VideoEncoder for FfmpegEncoder {
    fn is_ready(&self) -> bool {
        self.tx.is_some()
            && !self.has_failed()
            && self.queued.load(Ordering::Acquire) < self.depth
    }

    fn append(&mut self, frame: &PixelBuffer, pts: Timestamp) -> Result<(), EncodeError> {
        let Some(tx) = self.tx.as_ref() else {
            return Err(EncodeError::Finished);
        };
        if self.has_failed() {
            return Err(EncodeError::backend("ffmpeg writer exited"));
        }
        if frame.data().len() != self.frame_len {
            return Err(EncodeError::FrameSize {
                got: frame.data().len(),
                expected: self.frame_len,
            });
        }
        // Raw video has no container timestamps; frames are spaced by -r.
        debug_assert!(self.last_pts.is_none_or(|last| last < pts));

        self.queued.fetch_add(1, Ordering::AcqRel);
        match tx.try_send(frame.data().to_vec()) {
            Ok(()) => {
                self.frames += 1;
                self.last_pts = Some(pts);
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                self.queued.fetch_sub(1, Ordering::AcqRel);
                Err(EncodeError::backend("writer queue full"))
            }
            Err(TrySendError::Disconnected(_)) => {
                self.queued.fetch_sub(1, Ordering::AcqRel);
                self.failed.store(true, Ordering::Release);
                Err(EncodeError::backend("ffmpeg writer exited"))
            }
        }
    }

    /// The writer thread only returns early when ffmpeg stopped reading.
    fn has_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
            || (self.tx.is_some() && self.writer.as_ref().is_some_and(JoinHandle::is_finished))
    }

    fn mark_finished(&mut self) {
        drop(self.tx.take());
    }

    fn finish(mut self: Box<Self>, on_done: FinishCallback) {
        self.mark_finished();
        let spawned = std::thread::Builder::new()
            .name("lockstep-ffmpeg-finish".into())
            .spawn(move || on_done(self.wait()));
        if let Err(e) = spawned {
            log::error!("ffmpeg: failed to start finalize thread: {e}");
        }
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        // Closing the queue ends the writer; a child still running was never
        // finalized and would outlive us.
        drop(self.tx.take());
        if let Some(mut child) = self.child.take() {
            log::warn!("ffmpeg: encoder dropped before finish, stopping pid {}", child.id());
            reap_child(&mut child);
        }
    }
}

/// Kills `child` if it is still running and collects its exit status.
fn reap_child(child: &mut Child) {
    match child.try_wait() {
        Ok(Some(_)) => {}
        Ok(None) => {
            if let Err(e) = child.kill() {
                log::warn!("ffmpeg: kill failed: {e}");
            }
            if let Err(e) = child.wait() {
                log::warn!("ffmpeg: wait failed: {e}");
            }
        }
        Err(e) => log::warn!("ffmpeg: status check failed: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Resolution;

    #[test]
    fn validation_catches_bad_streams() {
        let odd = StreamSpec::h264(Resolution::new(961, 540), 60);
        assert!(FfmpegEncoderFactory::validate(&odd).is_err());

        let no_fps = StreamSpec::h264(Resolution::new(960, 540), 0);
        assert!(FfmpegEncoderFactory::validate(&no_fps).is_err());

        let ok = StreamSpec::h264(Resolution::new(960, 540), 60);
        assert!(FfmpegEncoderFactory::validate(&ok).is_ok());
    }

    #[test]
    fn command_reads_bgra_without_conversion() {
        let factory = FfmpegEncoderFactory::default();
        let spec = StreamSpec::h264(Resolution::new(960, 540), 60);
        let cmd = factory.command(Path::new("out.mp4"), &spec);
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        let input_fmt = args.iter().position(|a| a == "-pix_fmt").unwrap();
        assert_eq!(args[input_fmt + 1], "bgra");
        assert!(args.windows(2).any(|w| w[0] == "-s" && w[1] == "960x540"));
        assert!(args.windows(2).any(|w| w[0] == "-r" && w[1] == "60"));
        assert_eq!(args.last().map(String::as_str), Some("out.mp4"));
    }

    #[test]
    fn missing_binary_is_an_init_error() {
        let mut factory = FfmpegEncoderFactory {
            program: PathBuf::from("lockstep-definitely-not-ffmpeg"),
            ..Default::default()
        };
        let spec = StreamSpec::h264(Resolution::new(16, 16), 60);
        let err = factory.open(Path::new("never.mp4"), &spec).err().unwrap();
        assert!(matches!(err, CaptureInitError::Encoder(_)));
    }

    // ── child lifecycle ───────────────────────────────────────────────────

    #[cfg(target_os = "linux")]
    fn spawn_piped(program: &str, args: &[&str]) -> Child {
        Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .unwrap()
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn dropping_an_unfinished_encoder_kills_the_child() {
        let child = spawn_piped("sleep", &["30"]);
        let proc_dir = PathBuf::from(format!("/proc/{}", child.id()));
        let encoder = FfmpegEncoder::attach(Path::new("never.mp4"), child, 16, 2).unwrap();
        assert!(proc_dir.exists());

        drop(encoder);
        assert!(!proc_dir.exists(), "child still running");
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn encoder_is_not_ready_once_the_reader_is_gone() {
        use crate::capture::pool::BufferPool;
        use std::time::{Duration, Instant};

        let child = spawn_piped("true", &[]);
        let mut encoder = FfmpegEncoder::attach(Path::new("never.mp4"), child, 16, 2).unwrap();
        let mut pool = BufferPool::new(Resolution::new(2, 2), 1).unwrap();
        let frame = pool.checkout().unwrap();
        assert!(!encoder.has_failed());

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut index = 0;
        while !encoder.has_failed() && Instant::now() < deadline {
            if encoder.is_ready() {
                let _ = encoder.append(&frame, Timestamp::from_frame(index, 60));
                index += 1;
            }
            std::thread::sleep(Duration::from_millis(5));
        }

        assert!(encoder.has_failed());
        assert!(!encoder.is_ready());
        let err = encoder.append(&frame, Timestamp::from_frame(index, 60)).unwrap_err();
        assert!(err.is_terminal());
    }
}
