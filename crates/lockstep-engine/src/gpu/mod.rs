//! GPU backend contract.
//!
//! The render stage and capture session only talk to the GPU through
//! [`GpuBackend`]: programs and meshes are loaded once, then every frame is a
//! single [`FrameCommands`] submission with a completion callback. The wgpu
//! implementation lives in `device`; tests provide their own backends.

mod backend;
mod commands;

pub use backend::{Completion, CompletedFrame, GpuBackend, ImageRole};
pub use commands::{
    BlitPass, DepthCompare, DepthState, Draw, FrameCommands, MeshId, ProgramDesc, ProgramId,
    ProgramKind, ScenePass,
};
