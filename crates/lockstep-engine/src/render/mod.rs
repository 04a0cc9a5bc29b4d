//! Render stage.
//!
//! One scene pass per frame (indexed mesh or full-screen procedural program)
//! into the frame target, then a blit pass into the presentable surface.
//! The stage only records commands; a [`GpuBackend`](crate::gpu::GpuBackend)
//! executes them.

mod animation;
mod programs;
mod stage;
mod uniforms;

pub use animation::AnimationState;
pub use programs::{BLIT_PROGRAM, ERROR_PROGRAM, MESH_PROGRAM, ProgramTable, ResolvedProgram};
pub use stage::{CLEAR_COLOR, RenderStage};
pub use uniforms::{DemoUniforms, MeshUniforms, UniformBlock};
