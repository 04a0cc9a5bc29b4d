//! Per-frame uniform records.
//!
//! Layouts match the WGSL structs in `shaders/` (16-byte aligned fields).

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use crate::config::Resolution;

use super::animation::AnimationState;

/// Camera distance at zoom 1.0.
const FIT_DISTANCE: f32 = 4.0;

/// Transforms for mesh mode.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct MeshUniforms {
    pub model: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
}

impl MeshUniforms {
    pub fn new(model: Mat4, view: Mat4, projection: Mat4) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            view: view.to_cols_array_2d(),
            projection: projection.to_cols_array_2d(),
        }
    }

    /// Perspective camera looking at the origin from `FIT_DISTANCE / zoom`.
    pub fn from_animation(anim: &AnimationState, resolution: Resolution) -> Self {
        let distance = FIT_DISTANCE / anim.zoom;
        let projection =
            Mat4::perspective_rh(45f32.to_radians(), resolution.aspect(), 0.1, 100.0);
        let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, distance), Vec3::ZERO, Vec3::Y);
        let model = Mat4::from_rotation_x(anim.rotation_x)
            * Mat4::from_rotation_y(anim.rotation_y)
            * Mat4::from_scale(Vec3::splat(anim.mesh_scale));
        Self::new(model, view, projection)
    }
}

/// Parameters for procedural programs.
///
/// `resolution.xy` is the target size, `time.x` elapsed seconds,
/// `mouse.xy` the pointer and `mouse.zw` the last click, in pixels from the
/// top-left corner.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct DemoUniforms {
    pub resolution: [f32; 4],
    pub time: [f32; 4],
    pub mouse: [f32; 4],
}

impl DemoUniforms {
    pub fn from_animation(anim: &AnimationState, resolution: Resolution) -> Self {
        Self {
            resolution: [resolution.width as f32, resolution.height as f32, 0.0, 0.0],
            time: [anim.elapsed, 0.0, 0.0, 0.0],
            mouse: [anim.pointer[0], anim.pointer[1], anim.click[0], anim.click[1]],
        }
    }
}

/// The one uniform record bound for a frame.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum UniformBlock {
    Mesh(MeshUniforms),
    Procedural(DemoUniforms),
}

impl UniformBlock {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Mesh(u) => bytemuck::bytes_of(u),
            Self::Procedural(u) => bytemuck::bytes_of(u),
        }
    }
}
