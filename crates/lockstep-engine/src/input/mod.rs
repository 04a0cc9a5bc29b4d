//! Input subsystem.
//!
//! Public API is platform-agnostic and does not expose winit types.
//! Runtime code translates platform events into `InputEvent`s (see
//! [`platform`]), and `InputState` turns those into the pointer gestures the
//! animation state consumes.

pub mod platform;
mod state;
mod types;

pub use state::InputState;
pub use types::{ButtonState, InputEvent, Key, MouseButton, MouseWheelDelta, PointerEvent};
