use bevy::{prelude::*, render::camera::CameraProjection};

/// Camera projection of a portal projector. The matrix is computed by the portal context every
/// frame, the viewport size has no say in it: the frustum is dictated by the portal rectangle.
#[derive(Debug, Component, Clone, Reflect)]
#[reflect(Component)]
pub struct OffAxisProjection {
    #[reflect(ignore)]
    pub projection: Mat4,
    pub far: f32,
}

impl Default for OffAxisProjection {
    fn default() -> Self {
        let frustum = crate::portal::Frustum::default();
        OffAxisProjection {
            projection: frustum.reverse_z_projection_matrix(),
            far: frustum.far,
        }
    }
}

impl CameraProjection for OffAxisProjection {
    fn get_projection_matrix(&self) -> Mat4 {
        self.projection
    }

    fn update(&mut self, _width: f32, _height: f32) {}

    fn far(&self) -> f32 {
        self.far
    }
}
