//! Lockstep engine crate.
//!
//! GPU frame production with optional lock-step capture to a video file:
//! a render stage records one scene pass and one blit pass per frame, a
//! frame driver paces them, and a capture session reads finished frames back
//! into pooled buffers and hands them to an encoder in order.

pub mod capture;
pub mod config;
pub mod core;
pub mod device;
pub mod driver;
pub mod error;
pub mod gpu;
pub mod input;
pub mod logging;
pub mod mesh;
pub mod render;
pub mod time;
pub mod window;
