//! Per-tick frame orchestration.
//!
//! Each tick: apply finished GPU work to the capture session, check the
//! file-mode stop condition, pick a frame target (pooled capture buffer or
//! scratch image), record and submit the render stage's passes, then advance
//! animation.

mod app;

pub use app::DriverApp;

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::{Duration, Instant};

use crate::capture::{
    CaptureSession, CaptureState, CommitOutcome, EncoderFactory, FinalizeReport, FrameTarget,
};
use crate::config::RenderConfig;
use crate::error::ProgramError;
use crate::gpu::{CompletedFrame, GpuBackend, ImageRole};
use crate::input::{InputEvent, InputState};
use crate::mesh::Mesh;
use crate::render::{AnimationState, ProgramTable, RenderStage};
use crate::time::{FrameClock, FrameStep};

/// How long [`FrameDriver::shutdown`] waits for in-flight frames and for the
/// encoder to finalize.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Why a tick produced no frame.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SkipReason {
    /// Every pooled buffer is still in flight.
    PoolExhausted,
    /// Enough frames are in flight to reach the target; waiting for them.
    TargetReached,
    /// A scratch image could not be allocated.
    NoScratchTarget,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TickOutcome {
    Rendered,
    Skipped(SkipReason),
    /// Capture is finalizing; nothing new is rendered.
    Draining,
    /// The run is over; the caller may exit.
    Finished,
}

pub struct FrameDriver<I> {
    config: Arc<RenderConfig>,
    stage: RenderStage,
    capture: Option<CaptureSession<I>>,

    anim: AnimationState,
    input: InputState,
    step: FrameStep,

    completed_tx: Sender<CompletedFrame>,
    completed_rx: Receiver<CompletedFrame>,
    in_flight: usize,

    frames_rendered: u64,
    finished: bool,
}

impl<I: Clone> FrameDriver<I> {
    pub fn new(
        config: Arc<RenderConfig>,
        stage: RenderStage,
        capture: Option<CaptureSession<I>>,
    ) -> Self {
        let step = if config.is_file_mode() {
            FrameStep::fixed_fps(config.fps)
        } else {
            FrameStep::Clock(FrameClock::new())
        };
        let (completed_tx, completed_rx) = mpsc::channel();

        Self {
            config,
            stage,
            capture,
            anim: AnimationState::default(),
            input: InputState::default(),
            step,
            completed_tx,
            completed_rx,
            in_flight: 0,
            frames_rendered: 0,
            finished: false,
        }
    }

    /// Builds the render stage and, in file mode, starts capture.
    ///
    /// A capture that fails to start is logged and the run continues as
    /// preview only. Only a missing program library is fatal.
    pub fn setup<G>(
        config: Arc<RenderConfig>,
        programs: &ProgramTable,
        mesh: &Mesh,
        factory: Box<dyn EncoderFactory>,
        gpu: &mut G,
    ) -> Result<Self, ProgramError>
    where
        G: GpuBackend<Image = I>,
    {
        let stage = RenderStage::new(Arc::clone(&config), programs, mesh, gpu)?;

        let capture = if config.is_file_mode() {
            let mut session = CaptureSession::new(Arc::clone(&config), factory);
            match session.start(&config.output, gpu) {
                Ok(()) => Some(session),
                Err(e) => {
                    log::warn!("capture unavailable, running preview only: {e}");
                    None
                }
            }
        } else {
            None
        };

        Ok(Self::new(config, stage, capture))
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn stage(&self) -> &RenderStage {
        &self.stage
    }

    pub fn animation(&self) -> &AnimationState {
        &self.anim
    }

    pub fn capture(&self) -> Option<&CaptureSession<I>> {
        self.capture.as_ref()
    }

    pub fn capture_state(&self) -> Option<CaptureState> {
        self.capture.as_ref().map(CaptureSession::state)
    }

    /// Ticks that submitted a frame.
    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// Submissions whose completion has not been processed yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn report(&self) -> Option<&FinalizeReport> {
        self.capture.as_ref().and_then(CaptureSession::report)
    }

    /// Feeds one input event to the animation state. Ignored unless input is
    /// enabled.
    pub fn handle_input(&mut self, event: InputEvent) {
        if !self.config.input_enabled {
            return;
        }
        if let Some(pointer) = self.input.apply_event(event) {
            self.anim.apply(pointer);
        }
    }

    /// Runs one tick. Per-frame failures never escape; they show up as
    /// [`TickOutcome::Skipped`] and log lines.
    pub fn tick<G>(&mut self, gpu: &mut G) -> TickOutcome
    where
        G: GpuBackend<Image = I>,
    {
        self.pump(gpu);

        if self.finished {
            return TickOutcome::Finished;
        }
        if let Some(outcome) = self.check_stop() {
            return outcome;
        }

        let target = match self.acquire_target(gpu) {
            Ok(target) => target,
            Err(reason) => {
                log::trace!("tick skipped: {reason:?}");
                return TickOutcome::Skipped(reason);
            }
        };

        let FrameTarget { image, backing } = target;
        let commands = self.stage.record(&image, &self.anim, backing);
        let tx = self.completed_tx.clone();
        gpu.submit(
            commands,
            Box::new(move |done| {
                // The driver may be gone during teardown.
                let _ = tx.send(done);
            }),
        );
        self.in_flight += 1;
        self.frames_rendered += 1;

        // Sampled per rendered frame: the live clock then spans any skipped
        // ticks, and file mode moves exactly one step per frame.
        let dt = self.step.next_dt();
        self.anim.advance(dt);
        TickOutcome::Rendered
    }

    /// Polls the GPU, commits finished frames and checks for finalize.
    fn pump<G>(&mut self, gpu: &mut G)
    where
        G: GpuBackend<Image = I>,
    {
        gpu.poll();

        while let Ok(done) = self.completed_rx.try_recv() {
            self.in_flight = self.in_flight.saturating_sub(1);
            self.complete(done);
        }

        if let Some(capture) = self.capture.as_mut() {
            capture.poll_finalize();
        }
    }

    fn complete(&mut self, done: CompletedFrame) {
        let CompletedFrame { backing, status } = done;
        if let Err(e) = &status {
            log::warn!("frame failed on the GPU: {e}");
        }

        let Some(buffer) = backing else {
            return;
        };
        let Some(capture) = self.capture.as_mut() else {
            log::error!("completed capture buffer with no capture session");
            return;
        };

        let outcome = match status {
            Ok(()) => capture.commit_frame(buffer),
            Err(_) => capture.abandon_frame(buffer),
        };
        if let CommitOutcome::Appended(pts) = outcome {
            log::trace!("committed frame at {:.3}s", pts.seconds());
        }
    }

    /// File-mode stop condition. `Some` ends the tick early.
    fn check_stop(&mut self) -> Option<TickOutcome> {
        if !self.config.is_file_mode() {
            return None;
        }
        let target = self.config.target_frames;

        let Some(capture) = self.capture.as_mut() else {
            // Preview only: stop after the same number of frames.
            if self.frames_rendered >= target && self.in_flight == 0 {
                log::info!("rendered {} frames without capture", self.frames_rendered);
                self.finished = true;
                return Some(TickOutcome::Finished);
            }
            return (self.frames_rendered >= target).then_some(TickOutcome::Draining);
        };

        match capture.state() {
            CaptureState::Recording => {
                let committed = capture.frame_counter();
                let outstanding = capture.outstanding() as u64;
                if committed >= target && outstanding == 0 {
                    capture.stop();
                    return Some(TickOutcome::Draining);
                }
                (committed + outstanding >= target)
                    .then_some(TickOutcome::Skipped(SkipReason::TargetReached))
            }
            CaptureState::Finalizing => Some(TickOutcome::Draining),
            CaptureState::Closed => {
                self.finished = true;
                Some(TickOutcome::Finished)
            }
            CaptureState::Idle => None,
        }
    }

    fn acquire_target<G>(&mut self, gpu: &mut G) -> Result<FrameTarget<I>, SkipReason>
    where
        G: GpuBackend<Image = I>,
    {
        if let Some(capture) = self.capture.as_mut()
            && capture.is_recording()
        {
            return capture
                .acquire_frame_target()
                .ok_or(SkipReason::PoolExhausted);
        }

        match gpu.create_image(self.config.resolution, ImageRole::Scratch) {
            Ok(image) => Ok(FrameTarget {
                image,
                backing: None,
            }),
            Err(e) => {
                log::warn!("no scratch target: {e}");
                Err(SkipReason::NoScratchTarget)
            }
        }
    }

    /// Ends the run: lets in-flight frames commit, stops capture and blocks
    /// until the encoder has finalized the file or `timeout` passes.
    ///
    /// Returns `true` when there is nothing left to wait for.
    pub fn shutdown<G>(&mut self, gpu: &mut G, timeout: Duration) -> bool
    where
        G: GpuBackend<Image = I>,
    {
        let deadline = Instant::now() + timeout;

        while self.in_flight > 0 && Instant::now() < deadline {
            self.pump(gpu);
            if self.in_flight > 0 {
                std::thread::sleep(Duration::from_millis(1));
            }
        }
        if self.in_flight > 0 {
            log::warn!("{} frames still in flight at shutdown", self.in_flight);
        }

        let closed = match self.capture.as_mut() {
            Some(capture) => {
                capture.stop();
                let remaining = deadline.saturating_duration_since(Instant::now());
                let closed = capture.poll_finalize() || capture.wait_closed(remaining);
                if !closed {
                    log::error!("encoder did not finalize within {timeout:?}; output may be truncated");
                }
                closed
            }
            None => true,
        };

        self.finished = closed;
        closed
    }
}
