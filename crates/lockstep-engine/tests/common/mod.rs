//! Test doubles for the GPU backend and the encoder.

#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lockstep_engine::capture::{
    EncoderFactory, FinishCallback, FinishReport, PixelBuffer, StreamSpec, Timestamp,
    VideoEncoder,
};
use lockstep_engine::config::{CaptureMode, RenderConfig, Resolution};
use lockstep_engine::error::{CaptureInitError, EncodeError, GpuError, ProgramError};
use lockstep_engine::gpu::{
    CompletedFrame, Completion, FrameCommands, GpuBackend, ImageRole, MeshId, ProgramDesc,
    ProgramId,
};
use lockstep_engine::mesh::Mesh;

pub fn file_config(resolution: Resolution, demo: &str, output: PathBuf) -> RenderConfig {
    RenderConfig {
        resolution,
        mode: CaptureMode::File,
        demo: demo.to_string(),
        output,
        ..RenderConfig::default()
    }
}

pub fn live_config(demo: &str) -> RenderConfig {
    RenderConfig {
        resolution: Resolution::new(64, 36),
        mode: CaptureMode::Live,
        demo: demo.to_string(),
        ..RenderConfig::default()
    }
}

pub fn temp_output(name: &str) -> PathBuf {
    std::env::temp_dir()
        .join(format!("lockstep-it-{}", std::process::id()))
        .join(format!("{name}.mp4"))
}

// ── GPU ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeImage {
    pub id: u32,
    pub role: ImageRole,
}

/// Order in which [`FakeGpu::poll`] delivers finished submissions.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Delivery {
    Fifo,
    /// Each poll delivers everything pending, newest first.
    Reversed,
    /// Nothing completes until `hold` is cleared.
    Held,
}

pub struct SubmittedFrame {
    pub index: u64,
    pub image: FakeImage,
    pub program: ProgramId,
    pub blit: ProgramId,
    pub captured: bool,
}

struct InFlight {
    index: u64,
    image: FakeImage,
    readback: Option<PixelBuffer>,
    on_complete: Completion,
}

/// Backend that completes frames on `poll`, writes the submission index into
/// the first eight bytes of each readback, and fails if a capture image is
/// submitted while an earlier write to it is still in flight.
pub struct FakeGpu {
    pub programs: Vec<ProgramDesc>,
    pub meshes: Vec<u32>,
    pub images: Vec<FakeImage>,
    pub submitted: Vec<SubmittedFrame>,
    pub delivery: Delivery,
    /// Submission indices whose GPU work fails.
    pub fail: HashSet<u64>,
    /// Image allocation fails while set.
    pub fail_images: bool,
    in_flight: VecDeque<InFlight>,
    busy_images: HashSet<u32>,
    next_submission: u64,
}

impl Default for FakeGpu {
    fn default() -> Self {
        Self {
            programs: Vec::new(),
            meshes: Vec::new(),
            images: Vec::new(),
            submitted: Vec::new(),
            delivery: Delivery::Fifo,
            fail: HashSet::new(),
            fail_images: false,
            in_flight: VecDeque::new(),
            busy_images: HashSet::new(),
            next_submission: 0,
        }
    }
}

impl FakeGpu {
    pub fn program(&self, id: ProgramId) -> &ProgramDesc {
        &self.programs[id.0 as usize]
    }

    pub fn program_named(&self, name: &str) -> Option<&ProgramDesc> {
        self.programs.iter().find(|p| p.name == name)
    }

    pub fn pending(&self) -> usize {
        self.in_flight.len()
    }

    fn deliver(&mut self, frame: InFlight) {
        let InFlight {
            index,
            image,
            readback,
            on_complete,
        } = frame;
        self.busy_images.remove(&image.id);

        let status = if self.fail.contains(&index) {
            Err(GpuError::Readback(format!("injected failure {index}")))
        } else {
            Ok(())
        };
        let backing = readback.map(|mut buffer| {
            if status.is_ok() {
                buffer.data_mut()[..8].copy_from_slice(&index.to_le_bytes());
            }
            buffer
        });
        on_complete(CompletedFrame { backing, status });
    }
}

impl GpuBackend for FakeGpu {
    type Image = FakeImage;

    fn load_program(&mut self, desc: &ProgramDesc) -> Result<ProgramId, ProgramError> {
        self.programs.push(desc.clone());
        Ok(ProgramId(self.programs.len() as u32 - 1))
    }

    fn upload_mesh(&mut self, mesh: &Mesh) -> MeshId {
        self.meshes.push(mesh.index_count());
        MeshId(self.meshes.len() as u32 - 1)
    }

    fn create_image(&mut self, resolution: Resolution, role: ImageRole) -> Result<FakeImage, GpuError> {
        if self.fail_images || resolution.width == 0 || resolution.height == 0 {
            return Err(GpuError::Allocation(format!("{resolution}")));
        }
        let image = FakeImage {
            id: self.images.len() as u32,
            role,
        };
        self.images.push(image.clone());
        Ok(image)
    }

    fn submit(&mut self, commands: FrameCommands<'_, FakeImage>, on_complete: Completion) {
        let image = commands.scene.target.clone();
        if image.role == ImageRole::Capture {
            assert!(
                self.busy_images.insert(image.id),
                "capture image {} submitted while still in flight",
                image.id
            );
        }

        let index = self.next_submission;
        self.next_submission += 1;
        self.submitted.push(SubmittedFrame {
            index,
            image: image.clone(),
            program: commands.scene.program,
            blit: commands.blit.program,
            captured: commands.readback.is_some(),
        });
        self.in_flight.push_back(InFlight {
            index,
            image,
            readback: commands.readback,
            on_complete,
        });
    }

    fn poll(&mut self) {
        match self.delivery {
            Delivery::Held => {}
            Delivery::Fifo => {
                while let Some(frame) = self.in_flight.pop_front() {
                    self.deliver(frame);
                }
            }
            Delivery::Reversed => {
                while let Some(frame) = self.in_flight.pop_back() {
                    self.deliver(frame);
                }
            }
        }
    }
}

// ── Encoder ───────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct EncoderLog {
    pub opened: Vec<(PathBuf, StreamSpec)>,
    pub pts: Vec<Timestamp>,
    /// Submission index read from each appended frame.
    pub markers: Vec<u64>,
    pub marked_finished: bool,
    pub finish_calls: usize,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FinishMode {
    /// `on_done` fires inside `finish`.
    Immediate,
    /// `on_done` fires from another thread after a short delay.
    Threaded,
}

/// Factory for [`RecordingEncoder`]s sharing one log and readiness switch.
#[derive(Clone)]
pub struct RecordingFactory {
    pub log: Arc<Mutex<EncoderLog>>,
    pub ready: Arc<AtomicBool>,
    pub finish: FinishMode,
    pub fail_open: bool,
    /// Every append fails once this many frames were accepted.
    pub fail_after: Option<usize>,
}

impl RecordingFactory {
    pub fn new() -> Self {
        Self {
            log: Arc::default(),
            ready: Arc::new(AtomicBool::new(true)),
            finish: FinishMode::Immediate,
            fail_open: false,
            fail_after: None,
        }
    }

    /// Encoder whose backend goes away after `frames` appends.
    pub fn dying_after(frames: usize) -> Self {
        Self {
            fail_after: Some(frames),
            ..Self::new()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_open: true,
            ..Self::new()
        }
    }

    pub fn threaded() -> Self {
        Self {
            finish: FinishMode::Threaded,
            ..Self::new()
        }
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn log(&self) -> std::sync::MutexGuard<'_, EncoderLog> {
        self.log.lock().unwrap()
    }
}

impl EncoderFactory for RecordingFactory {
    fn open(&mut self, path: &Path, spec: &StreamSpec) -> Result<Box<dyn VideoEncoder>, CaptureInitError> {
        if self.fail_open {
            return Err(CaptureInitError::encoder("no encoder in this test"));
        }
        self.log
            .lock()
            .unwrap()
            .opened
            .push((path.to_path_buf(), spec.clone()));
        Ok(Box::new(RecordingEncoder {
            log: Arc::clone(&self.log),
            ready: Arc::clone(&self.ready),
            finish: self.finish,
            path: path.to_path_buf(),
            finished: false,
            fail_after: self.fail_after,
        }))
    }
}

pub struct RecordingEncoder {
    log: Arc<Mutex<EncoderLog>>,
    ready: Arc<AtomicBool>,
    finish: FinishMode,
    path: PathBuf,
    finished: bool,
    fail_after: Option<usize>,
}

impl VideoEncoder for RecordingEncoder {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn append(&mut self, frame: &PixelBuffer, pts: Timestamp) -> Result<(), EncodeError> {
        if self.finished {
            return Err(EncodeError::Finished);
        }
        let mut marker = [0u8; 8];
        marker.copy_from_slice(&frame.data()[..8]);

        let mut log = self.log.lock().unwrap();
        if self.fail_after.is_some_and(|n| log.pts.len() >= n) {
            return Err(EncodeError::backend("writer exited"));
        }
        log.pts.push(pts);
        log.markers.push(u64::from_le_bytes(marker));
        Ok(())
    }

    fn mark_finished(&mut self) {
        self.finished = true;
        self.log.lock().unwrap().marked_finished = true;
    }

    fn finish(self: Box<Self>, on_done: FinishCallback) {
        let frames = {
            let mut log = self.log.lock().unwrap();
            log.finish_calls += 1;
            log.pts.len() as u64
        };
        let report = FinishReport {
            path: self.path.clone(),
            frames,
        };
        match self.finish {
            FinishMode::Immediate => on_done(Ok(report)),
            FinishMode::Threaded => {
                std::thread::spawn(move || {
                    std::thread::sleep(Duration::from_millis(20));
                    on_done(Ok(report));
                });
            }
        }
    }
}
