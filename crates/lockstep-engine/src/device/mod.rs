//! wgpu device, window surface and the [`GpuBackend`](crate::gpu::GpuBackend)
//! implementation.
//!
//! This module is responsible for:
//! - creating the wgpu Instance/Adapter/Device/Queue
//! - creating & configuring the Surface (swapchain)
//! - building pipelines, frame targets and readback staging buffers
//! - submitting frames and delivering their completions in order

mod backend;
mod context;
mod error;
mod init;
pub mod readback;
mod surface;

pub use backend::{DEPTH_FORMAT, GpuImage, TARGET_FORMAT};
pub use context::Gpu;
pub use error::SurfaceErrorAction;
pub use init::GpuInit;
