use std::sync::Arc;

use crate::capture::PixelBuffer;
use crate::config::{DemoKind, RenderConfig};
use crate::error::ProgramError;
use crate::gpu::{
    BlitPass, DepthState, Draw, FrameCommands, GpuBackend, MeshId, ProgramDesc, ProgramId,
    ProgramKind, ScenePass,
};
use crate::mesh::Mesh;

use super::animation::AnimationState;
use super::programs::{BLIT_PROGRAM, MESH_PROGRAM, ProgramTable};
use super::uniforms::{DemoUniforms, MeshUniforms, UniformBlock};

pub const CLEAR_COLOR: [f64; 4] = [0.1, 0.1, 0.1, 1.0];

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum SceneMode {
    Mesh { mesh: MeshId },
    Procedural,
}

/// Records the scene pass and blit pass for each frame.
///
/// The scene mode is fixed when the stage is built and never changes.
pub struct RenderStage {
    config: Arc<RenderConfig>,
    mode: SceneMode,
    scene_program: ProgramId,
    scene_program_name: String,
    fallback: bool,
    blit_program: ProgramId,
}

impl RenderStage {
    /// Loads the programs for the configured demo.
    ///
    /// `mesh` is only used in mesh mode. An unknown procedural program is
    /// replaced by the error program; a table missing the core programs is
    /// fatal.
    pub fn new<G: GpuBackend>(
        config: Arc<RenderConfig>,
        programs: &ProgramTable,
        mesh: &Mesh,
        gpu: &mut G,
    ) -> Result<Self, ProgramError> {
        programs.require_core()?;

        let blit_program = gpu.load_program(&ProgramDesc {
            name: BLIT_PROGRAM.to_string(),
            source: programs.require(BLIT_PROGRAM)?,
            kind: ProgramKind::Blit,
            depth: DepthState::ALWAYS_NO_WRITE,
        })?;

        let (mode, scene_program, scene_program_name, fallback) = match config.demo_kind() {
            DemoKind::Mesh => {
                let id = gpu.load_program(&ProgramDesc {
                    name: MESH_PROGRAM.to_string(),
                    source: programs.require(MESH_PROGRAM)?,
                    kind: ProgramKind::Mesh,
                    depth: DepthState::LESS_WRITE,
                })?;
                let mesh = gpu.upload_mesh(mesh);
                (SceneMode::Mesh { mesh }, id, MESH_PROGRAM.to_string(), false)
            }
            DemoKind::Procedural { program } => {
                let resolved = programs.resolve_demo(&program)?;
                let id = gpu.load_program(&ProgramDesc {
                    name: resolved.name.clone(),
                    source: resolved.source,
                    kind: ProgramKind::Procedural,
                    depth: DepthState::ALWAYS_NO_WRITE,
                })?;
                (SceneMode::Procedural, id, resolved.name, resolved.fallback)
            }
        };

        log::info!("render stage: scene program '{scene_program_name}'");
        Ok(Self {
            config,
            mode,
            scene_program,
            scene_program_name,
            fallback,
            blit_program,
        })
    }

    /// Name of the program bound for the scene pass.
    pub fn scene_program_name(&self) -> &str {
        &self.scene_program_name
    }

    /// `true` when the error program stands in for a missing demo.
    pub fn is_fallback(&self) -> bool {
        self.fallback
    }

    pub fn is_mesh_mode(&self) -> bool {
        matches!(self.mode, SceneMode::Mesh { .. })
    }

    /// Builds this frame's uniform record.
    pub fn uniforms(&self, anim: &AnimationState) -> UniformBlock {
        let res = self.config.resolution;
        match self.mode {
            SceneMode::Mesh { .. } => UniformBlock::Mesh(MeshUniforms::from_animation(anim, res)),
            SceneMode::Procedural => {
                UniformBlock::Procedural(DemoUniforms::from_animation(anim, res))
            }
        }
    }

    /// Records one scene pass into `target` followed by the blit pass.
    pub fn record<'a, I>(
        &self,
        target: &'a I,
        anim: &AnimationState,
        readback: Option<PixelBuffer>,
    ) -> FrameCommands<'a, I> {
        let draw = match self.mode {
            SceneMode::Mesh { mesh } => Draw::Indexed { mesh },
            SceneMode::Procedural => Draw::FullscreenQuad,
        };

        FrameCommands {
            scene: ScenePass {
                target,
                clear: CLEAR_COLOR,
                program: self.scene_program,
                uniforms: self.uniforms(anim),
                draw,
            },
            blit: BlitPass {
                program: self.blit_program,
            },
            readback,
        }
    }
}
