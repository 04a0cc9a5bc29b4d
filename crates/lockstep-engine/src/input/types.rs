/// Mouse button identifier.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Other(u16),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ButtonState {
    Pressed,
    Released,
}

/// Keys the runtime reacts to.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Key {
    Escape,
    Space,
    /// Any other key, by platform code.
    Other(u32),
}

/// Mouse wheel delta.
///
/// `Line` corresponds to "scroll lines" style input; `Pixel` is high precision.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum MouseWheelDelta {
    Line { x: f32, y: f32 },
    Pixel { x: f32, y: f32 },
}

impl MouseWheelDelta {
    /// Pixels scrolled per wheel line.
    pub const LINE_HEIGHT: f32 = 20.0;

    /// Vertical scroll in pixels, positive away from the user.
    pub fn vertical_pixels(&self) -> f32 {
        match *self {
            Self::Line { y, .. } => y * Self::LINE_HEIGHT,
            Self::Pixel { y, .. } => y,
        }
    }
}

/// Platform-agnostic input events emitted by the runtime.
///
/// Positions are in frame-target pixels, origin top-left.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum InputEvent {
    PointerMoved { x: f32, y: f32 },
    PointerButton {
        button: MouseButton,
        state: ButtonState,
        x: f32,
        y: f32,
    },
    MouseWheel(MouseWheelDelta),
    Key { key: Key, state: ButtonState },
    /// Pointer left the window surface.
    PointerLeft,
    /// Window focus change.
    Focused(bool),
}

/// Interaction gesture consumed by the animation state.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum PointerEvent {
    Moved { x: f32, y: f32 },
    /// Pointer moved with the primary button held.
    Dragged { dx: f32, dy: f32, x: f32, y: f32 },
    Pressed { x: f32, y: f32 },
    Released { x: f32, y: f32 },
    /// Vertical wheel movement in pixels.
    Wheel { delta: f32 },
}
