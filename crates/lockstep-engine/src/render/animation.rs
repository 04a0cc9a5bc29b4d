use crate::input::PointerEvent;

/// Radians of rotation per pixel dragged.
const DRAG_SENSITIVITY: f32 = 0.01;
/// Zoom change per wheel line.
const WHEEL_SENSITIVITY: f32 = 0.01;
/// Radians of automatic spin per frame while not dragging.
const AUTO_SPIN: f32 = 0.005;

const ZOOM_MIN: f32 = 0.2;
const ZOOM_MAX: f32 = 5.0;

/// Animation and interaction state read by the render stage.
///
/// Advanced once per tick regardless of whether capture is active.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationState {
    pub rotation_x: f32,
    pub rotation_y: f32,
    pub zoom: f32,
    pub mesh_scale: f32,
    pub dragging: bool,
    /// Seconds of animation time.
    pub elapsed: f32,
    /// Ticks advanced so far.
    pub frame: u64,
    /// Pointer position, pixels from the top-left.
    pub pointer: [f32; 2],
    /// Last click position, pixels from the top-left.
    pub click: [f32; 2],
}

impl Default for AnimationState {
    fn default() -> Self {
        Self {
            rotation_x: 0.0,
            rotation_y: 0.0,
            zoom: 1.0,
            mesh_scale: 1.0,
            dragging: false,
            elapsed: 0.0,
            frame: 0,
            pointer: [0.0; 2],
            click: [0.0; 2],
        }
    }
}

impl AnimationState {
    /// Moves animation time forward by `dt` seconds.
    pub fn advance(&mut self, dt: f32) {
        self.elapsed += dt;
        self.frame += 1;
        if !self.dragging {
            self.rotation_y += AUTO_SPIN;
        }
    }

    /// Applies one pointer interaction.
    pub fn apply(&mut self, event: PointerEvent) {
        match event {
            PointerEvent::Moved { x, y } => {
                self.pointer = [x, y];
            }
            PointerEvent::Dragged { dx, dy, x, y } => {
                self.dragging = true;
                self.rotation_y += dx * DRAG_SENSITIVITY;
                self.rotation_x += dy * DRAG_SENSITIVITY;
                self.pointer = [x, y];
            }
            PointerEvent::Pressed { x, y } => {
                self.click = [x, y];
            }
            PointerEvent::Released { .. } => {
                self.dragging = false;
            }
            PointerEvent::Wheel { delta } => {
                self.zoom = (self.zoom + delta * WHEEL_SENSITIVITY).clamp(ZOOM_MIN, ZOOM_MAX);
            }
        }
    }
}
