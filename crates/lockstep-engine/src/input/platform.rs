//! winit → [`InputEvent`] translation.

use winit::dpi::{PhysicalPosition, PhysicalSize};
use winit::event::{ElementState, MouseButton as WinitMouseButton, MouseScrollDelta, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

use crate::config::Resolution;

use super::{ButtonState, InputEvent, InputState, Key, MouseButton, MouseWheelDelta};

/// Maps window pixels onto frame-target pixels.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PointerMapping {
    scale_x: f32,
    scale_y: f32,
}

impl PointerMapping {
    pub fn new(window: PhysicalSize<u32>, target: Resolution) -> Self {
        Self {
            scale_x: target.width as f32 / window.width.max(1) as f32,
            scale_y: target.height as f32 / window.height.max(1) as f32,
        }
    }

    pub fn map(&self, pos: PhysicalPosition<f64>) -> (f32, f32) {
        (pos.x as f32 * self.scale_x, pos.y as f32 * self.scale_y)
    }
}

/// Translates a winit `WindowEvent` into an engine `InputEvent`.
///
/// Returns `None` for events not represented by the input subsystem.
pub fn translate_window_event(
    mapping: &PointerMapping,
    state: &InputState,
    event: &WindowEvent,
) -> Option<InputEvent> {
    match event {
        WindowEvent::Focused(f) => Some(InputEvent::Focused(*f)),

        WindowEvent::CursorLeft { .. } => Some(InputEvent::PointerLeft),

        WindowEvent::CursorMoved { position, .. } => {
            let (x, y) = mapping.map(*position);
            Some(InputEvent::PointerMoved { x, y })
        }

        WindowEvent::MouseInput { state: st, button, .. } => {
            // winit 0.30 does not expose cursor query; use tracked pointer position.
            let (x, y) = state.pointer_pos.unwrap_or((0.0, 0.0));
            Some(InputEvent::PointerButton {
                button: map_mouse_button(*button),
                state: map_state(*st),
                x,
                y,
            })
        }

        WindowEvent::MouseWheel { delta, .. } => {
            let delta = match delta {
                MouseScrollDelta::LineDelta(x, y) => MouseWheelDelta::Line { x: *x, y: *y },
                MouseScrollDelta::PixelDelta(p) => MouseWheelDelta::Pixel {
                    x: p.x as f32,
                    y: p.y as f32,
                },
            };
            Some(InputEvent::MouseWheel(delta))
        }

        WindowEvent::KeyboardInput { event, .. } if !event.repeat => {
            let key = match event.physical_key {
                PhysicalKey::Code(KeyCode::Escape) => Key::Escape,
                PhysicalKey::Code(KeyCode::Space) => Key::Space,
                PhysicalKey::Code(other) => Key::Other(other as u32),
                PhysicalKey::Unidentified(_) => Key::Other(0),
            };
            Some(InputEvent::Key {
                key,
                state: map_state(event.state),
            })
        }

        _ => None,
    }
}

fn map_state(s: ElementState) -> ButtonState {
    match s {
        ElementState::Pressed => ButtonState::Pressed,
        ElementState::Released => ButtonState::Released,
    }
}

fn map_mouse_button(b: WinitMouseButton) -> MouseButton {
    match b {
        WinitMouseButton::Left => MouseButton::Left,
        WinitMouseButton::Right => MouseButton::Right,
        WinitMouseButton::Middle => MouseButton::Middle,
        WinitMouseButton::Back => MouseButton::Other(3),
        WinitMouseButton::Forward => MouseButton::Other(4),
        WinitMouseButton::Other(v) => MouseButton::Other(v),
    }
}
