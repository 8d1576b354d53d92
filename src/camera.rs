/*
 * Camera Module
 *
 * This module defines the orbit Camera that looks at the simulation volume.
 * Dragging the mouse orbits around the target and the mouse wheel zooms.
 * It produces the view-projection matrix the renderer uploads each frame.
 */

use glam::{Mat4, Vec2, Vec3};

pub struct Camera {
    pub target: Vec3,
    pub distance: f32,
    pub yaw: f32,
    pub pitch: f32,
    pub fov_y: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    pub is_dragging: bool,
    pub last_cursor_pos: Vec2,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new()
    }
}

impl Camera {
    pub fn new() -> Self {
        Self {
            target: Vec3::ZERO,
            distance: 25.0,
            yaw: 0.6,
            pitch: 0.35,
            fov_y: 60f32.to_radians(),
            min_distance: 2.0,
            max_distance: 200.0,
            is_dragging: false,
            last_cursor_pos: Vec2::ZERO,
        }
    }

    pub fn eye(&self) -> Vec3 {
        let (sin_yaw, cos_yaw) = self.yaw.sin_cos();
        let (sin_pitch, cos_pitch) = self.pitch.sin_cos();
        self.target + Vec3::new(cos_pitch * sin_yaw, sin_pitch, cos_pitch * cos_yaw) * self.distance
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye(), self.target, Vec3::Y)
    }

    pub fn projection(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, aspect.max(f32::EPSILON), 0.1, 1000.0)
    }

    pub fn view_projection(&self, aspect: f32) -> Mat4 {
        self.projection(aspect) * self.view()
    }

    // Handle mouse wheel events for zooming
    pub fn zoom(&mut self, scroll_delta: f32) {
        let zoom_factor = 1.0 - scroll_delta * 0.1;
        self.distance = (self.distance * zoom_factor).clamp(self.min_distance, self.max_distance);
    }

    pub fn start_drag(&mut self, position: Vec2) {
        self.last_cursor_pos = position;
        self.is_dragging = true;
    }

    // Orbit by the cursor delta since the last event
    pub fn drag(&mut self, position: Vec2) {
        if !self.is_dragging {
            return;
        }

        let delta = position - self.last_cursor_pos;
        if delta.length_squared() > 0.0 {
            self.yaw -= delta.x * 0.005;
            self.pitch = (self.pitch - delta.y * 0.005).clamp(-1.5, 1.5);
            self.last_cursor_pos = position;
        }
    }

    pub fn end_drag(&mut self) {
        self.is_dragging = false;
    }

    pub fn reset(&mut self) {
        *self = Self {
            target: self.target,
            ..Self::new()
        };
    }
}
