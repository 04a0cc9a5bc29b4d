use crate::capture::PixelBuffer;
use crate::config::Resolution;
use crate::error::{GpuError, ProgramError};
use crate::mesh::Mesh;

use super::commands::{FrameCommands, MeshId, ProgramDesc, ProgramId};

/// What a newly created image is used for.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ImageRole {
    /// Preview-only target; backends may hand out the same image again.
    Scratch,
    /// Pool-paired target whose contents are read back for encoding.
    Capture,
}

/// Result of one submission, delivered once its GPU work has finished.
#[derive(Debug)]
pub struct CompletedFrame {
    /// The readback buffer moved into the submission, now holding the frame.
    pub backing: Option<PixelBuffer>,
    pub status: Result<(), GpuError>,
}

/// Completion callback for a single submission.
///
/// Each callback owns the buffer of its own frame; nothing is shared between
/// submissions.
pub type Completion = Box<dyn FnOnce(CompletedFrame) + Send + 'static>;

/// GPU contract used by the render stage, capture session and frame driver.
pub trait GpuBackend {
    /// GPU-writable 2-D image. Cloning yields another handle to the same image.
    type Image: Clone;

    /// Builds a pipeline for `desc`.
    fn load_program(&mut self, desc: &ProgramDesc) -> Result<ProgramId, ProgramError>;

    /// Uploads vertex and index data.
    fn upload_mesh(&mut self, mesh: &Mesh) -> MeshId;

    /// Allocates a render target of the given size.
    fn create_image(&mut self, resolution: Resolution, role: ImageRole) -> Result<Self::Image, GpuError>;

    /// Submits one frame. `on_complete` runs after the GPU has finished every
    /// pass of this submission, and completions are delivered in submission
    /// order.
    fn submit(&mut self, commands: FrameCommands<'_, Self::Image>, on_complete: Completion);

    /// Processes finished GPU work and runs any ready completions.
    fn poll(&mut self);
}
