use std::sync::Arc;

use crate::capture::PixelBuffer;
use crate::render::UniformBlock;

/// Handle to a program loaded by a backend.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct ProgramId(pub u32);

/// Handle to mesh geometry uploaded to a backend.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct MeshId(pub u32);

/// Depth comparison used by a pipeline.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DepthCompare {
    Less,
    Always,
}

/// Depth test/write configuration baked into a program's pipeline.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DepthState {
    pub compare: DepthCompare,
    pub write: bool,
}

impl DepthState {
    /// Standard 3-D depth testing.
    pub const LESS_WRITE: Self = Self {
        compare: DepthCompare::Less,
        write: true,
    };

    /// Full-screen passes: never culled, never written.
    pub const ALWAYS_NO_WRITE: Self = Self {
        compare: DepthCompare::Always,
        write: false,
    };
}

/// Pipeline shape a program is compiled for.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ProgramKind {
    /// Interleaved position/normal/uv vertices, mesh uniforms.
    Mesh,
    /// Full-screen quad, procedural uniforms.
    Procedural,
    /// Full-screen quad sampling the frame target into the surface.
    Blit,
}

/// Everything a backend needs to build a pipeline for a named program.
#[derive(Debug, Clone)]
pub struct ProgramDesc {
    pub name: String,
    pub source: Arc<str>,
    pub kind: ProgramKind,
    pub depth: DepthState,
}

/// Geometry issued by the scene pass.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Draw {
    /// One indexed draw of an uploaded mesh.
    Indexed { mesh: MeshId },
    /// Four-vertex triangle strip covering the target.
    FullscreenQuad,
}

/// The single scene pass rendered into the frame target.
pub struct ScenePass<'a, I> {
    pub target: &'a I,
    pub clear: [f64; 4],
    pub program: ProgramId,
    pub uniforms: UniformBlock,
    pub draw: Draw,
}

/// Second pass copying the frame target into the presentable surface.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BlitPass {
    pub program: ProgramId,
}

/// One frame of GPU work.
///
/// `readback` is the pooled buffer the target is copied into once the passes
/// complete. Ownership moves into the submission and comes back through the
/// completion callback.
pub struct FrameCommands<'a, I> {
    pub scene: ScenePass<'a, I>,
    pub blit: BlitPass,
    pub readback: Option<PixelBuffer>,
}
