use std::collections::HashSet;

use super::types::{ButtonState, InputEvent, MouseButton, PointerEvent};

/// Current input state for the window.
///
/// Turns raw events into [`PointerEvent`] gestures; only the primary button
/// drags.
#[derive(Debug, Default)]
pub struct InputState {
    pub focused: bool,

    /// Pointer position in frame-target pixels.
    pub pointer_pos: Option<(f32, f32)>,

    pub buttons_down: HashSet<MouseButton>,
}

impl InputState {
    pub fn apply_event(&mut self, ev: InputEvent) -> Option<PointerEvent> {
        match ev {
            InputEvent::Focused(f) => {
                self.focused = f;
                if !f && self.buttons_down.remove(&MouseButton::Left) {
                    // A release lost with focus would leave the drag stuck.
                    let (x, y) = self.pointer_pos.unwrap_or_default();
                    self.buttons_down.clear();
                    return Some(PointerEvent::Released { x, y });
                }
                if !f {
                    self.buttons_down.clear();
                }
                None
            }

            InputEvent::PointerLeft => {
                self.pointer_pos = None;
                None
            }

            InputEvent::PointerMoved { x, y } => {
                let prev = self.pointer_pos.replace((x, y));
                match prev {
                    Some((px, py)) if self.button_down(MouseButton::Left) => {
                        Some(PointerEvent::Dragged {
                            dx: x - px,
                            dy: y - py,
                            x,
                            y,
                        })
                    }
                    _ => Some(PointerEvent::Moved { x, y }),
                }
            }

            InputEvent::PointerButton {
                button,
                state,
                x,
                y,
            } => {
                self.pointer_pos = Some((x, y));
                match state {
                    ButtonState::Pressed => {
                        let inserted = self.buttons_down.insert(button);
                        (inserted && button == MouseButton::Left)
                            .then_some(PointerEvent::Pressed { x, y })
                    }
                    ButtonState::Released => {
                        let removed = self.buttons_down.remove(&button);
                        (removed && button == MouseButton::Left)
                            .then_some(PointerEvent::Released { x, y })
                    }
                }
            }

            InputEvent::MouseWheel(delta) => Some(PointerEvent::Wheel {
                delta: delta.vertical_pixels(),
            }),

            InputEvent::Key { .. } => None,
        }
    }

    pub fn button_down(&self, btn: MouseButton) -> bool {
        self.buttons_down.contains(&btn)
    }
}
