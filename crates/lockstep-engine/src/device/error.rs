/// Response to a failed surface acquisition.
///
/// Only the blit into the window is affected; the scene pass and readback of
/// the frame still run.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SurfaceErrorAction {
    /// Surface was reconfigured; presentation resumes next frame.
    Reconfigured,
    /// Transient; nothing presented this frame.
    SkipFrame,
    /// Commonly OOM; the runtime should shut down.
    Fatal,
}
