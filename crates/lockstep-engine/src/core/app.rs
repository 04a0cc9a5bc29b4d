use crate::device::Gpu;
use crate::input::InputEvent;

use super::ctx::FrameCtx;

/// Control directive returned by app callbacks.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AppControl {
    Continue,
    Exit,
}

/// Application contract driven by [`Runtime`](crate::window::Runtime).
pub trait App {
    /// Called once the window and GPU exist, before the first frame.
    /// An error ends the run.
    fn on_start(&mut self, gpu: &mut Gpu<'_>) -> anyhow::Result<()>;

    /// Called for every translated input event.
    fn on_input(&mut self, event: InputEvent) -> AppControl {
        let _ = event;
        AppControl::Continue
    }

    /// Called once per redraw.
    fn on_frame(&mut self, ctx: &mut FrameCtx<'_, '_>) -> AppControl;

    /// Called when the window is about to close. The GPU is still alive.
    fn on_close_requested(&mut self, gpu: &mut Gpu<'_>) {
        let _ = gpu;
    }
}
