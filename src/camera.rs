use glam::{Mat4, Vec3};

use crate::render::MatrixState;

pub const EYE: Vec3 = Vec3::new(0.0, 1.0, 5.0);
pub const TARGET: Vec3 = Vec3::ZERO;
pub const UP: Vec3 = Vec3::Y;

pub const FOV_Y_DEGREES: f32 = 45.0;
pub const Z_NEAR: f32 = 0.001;
pub const Z_FAR: f32 = 10.0;

/// Fixed camera matrices pushed into the render context once during setup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraState {
    pub model: Mat4,
    pub view: Mat4,
    pub projection: Mat4,
}

impl CameraState {
    /// Builds the static camera for a viewport with the given aspect ratio.
    pub fn new(aspect: f32) -> Self {
        Self {
            model: Mat4::IDENTITY,
            view: view_matrix(EYE, TARGET, UP),
            projection: projection_matrix(aspect),
        }
    }

    /// Pushes projection, view and model into the context, in that order.
    pub fn apply<C: MatrixState + ?Sized>(&self, ctx: &mut C) {
        ctx.set_projection_matrix(self.projection);
        ctx.set_view_matrix(self.view);
        ctx.set_model_matrix(self.model);
    }
}

pub fn view_matrix(eye: Vec3, target: Vec3, up: Vec3) -> Mat4 {
    Mat4::look_at_rh(eye, target, up)
}

/// Right-handed perspective with wgpu's 0..1 depth range.
pub fn projection_matrix(aspect: f32) -> Mat4 {
    Mat4::perspective_rh(FOV_Y_DEGREES.to_radians(), aspect, Z_NEAR, Z_FAR)
}

/// Width over height. Zero dimensions are treated as one pixel.
pub fn aspect_ratio(width: u32, height: u32) -> f32 {
    width.max(1) as f32 / height.max(1) as f32
}
