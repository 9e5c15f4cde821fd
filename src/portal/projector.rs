//! Off-axis projector math.
//!
//! A viewer looking through a source portal should see the space in front of the paired target
//! portal. The projector is a virtual camera placed at the viewer's position mirrored into the
//! target's frame, oriented like the target, whose frustum is cut so that its near plane lies on
//! the target portal and its edges go through the portal rectangle. The image it renders can then
//! be mapped one to one onto the source portal's rectangle.

use std::fmt;

use bevy::prelude::{Mat4, Transform, Vec3, Vec4};

use super::{
    geometry::{closest_point_on_plane, mirror_point},
    PortalId, PortalInstance,
};

/// Lower bound of the projector near distance. Viewers standing on the source plane would
/// otherwise produce a singular projection.
pub const NEAR_EPSILON: f32 = 1.0e-3;

/// Bounds of an asymmetric view frustum, in view space units at the near plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    pub left: f32,
    pub right: f32,
    pub bottom: f32,
    pub top: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Frustum {
    fn default() -> Self {
        Frustum {
            left: -1.,
            right: 1.,
            bottom: -1.,
            top: 1.,
            near: 1.,
            far: 1000.,
        }
    }
}

impl Frustum {
    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.top - self.bottom
    }

    /// Right-handed off-axis perspective matrix, mapping view depth `near..far` to `0..1`.
    pub fn projection_matrix(&self) -> Mat4 {
        let Frustum {
            left: l,
            right: r,
            bottom: b,
            top: t,
            near: n,
            far: f,
        } = *self;
        Mat4::from_cols(
            Vec4::new(2. * n / (r - l), 0., 0., 0.),
            Vec4::new(0., 2. * n / (t - b), 0., 0.),
            Vec4::new((r + l) / (r - l), (t + b) / (t - b), f / (n - f), -1.),
            Vec4::new(0., 0., n * f / (n - f), 0.),
        )
    }

    /// Same frustum with depth reversed (`near..far` to `1..0`), the convention Bevy's 3D
    /// pipeline renders with.
    pub fn reverse_z_projection_matrix(&self) -> Mat4 {
        let mut matrix = self.projection_matrix();
        let (n, f) = (self.near, self.far);
        matrix.z_axis.z = n / (f - n);
        matrix.w_axis.z = n * f / (f - n);
        matrix
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectorView {
    pub transform: Transform,
    pub frustum: Frustum,
    pub projection: Mat4,
}

/// Reasons a projector cannot be computed for the current viewer pose. All of them are
/// transient: the connection keeps its previous view and is retried on the next tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GeometryError {
    NonFiniteViewer,
    InvalidFarDistance { far: f32 },
    DegeneratePortal(PortalId),
    /// The near plane ended up beyond the viewer's far clip distance.
    EmptyFrustum { near: f32, far: f32 },
}

impl fmt::Display for GeometryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonFiniteViewer => write!(f, "viewer position is not finite"),
            Self::InvalidFarDistance { far } => write!(f, "invalid viewer far distance {far}"),
            Self::DegeneratePortal(portal) => {
                write!(f, "{portal} has a degenerate pose or size")
            }
            Self::EmptyFrustum { near, far } => {
                write!(f, "projector near distance {near} is beyond far distance {far}")
            }
        }
    }
}

impl std::error::Error for GeometryError {}

#[derive(Debug)]
pub struct ViewProjector;

impl ViewProjector {
    /// Compute the projector for a viewer at `viewer` with far clip distance `far`, looking
    /// through `source` into the space in front of `target`.
    pub fn project(
        viewer: Vec3,
        far: f32,
        source: &PortalInstance,
        target: &PortalInstance,
    ) -> Result<ProjectorView, GeometryError> {
        if !viewer.is_finite() {
            return Err(GeometryError::NonFiniteViewer);
        }
        if !far.is_finite() || far <= 0. {
            return Err(GeometryError::InvalidFarDistance { far });
        }
        for portal in [source, target] {
            if !portal.is_well_formed() {
                return Err(GeometryError::DegeneratePortal(portal.id()));
            }
        }

        let position = mirror_point(source, target, viewer);

        let closest = closest_point_on_plane(target.position(), target.facing(), position);
        let near = closest.distance(position).max(NEAR_EPSILON);
        if near >= far {
            return Err(GeometryError::EmptyFrustum { near, far });
        }
        let offset = target.world_to_local().transform_point3(closest);

        let half = source.size() / 2.;
        let frustum = Frustum {
            left: -half.x - offset.x,
            right: half.x - offset.x,
            bottom: -half.y - offset.y,
            top: half.y - offset.y,
            near,
            far,
        };

        Ok(ProjectorView {
            transform: Transform::from_translation(position)
                .with_rotation(target.transform().rotation),
            frustum,
            projection: frustum.projection_matrix(),
        })
    }
}

#[cfg(test)]
mod tests {
    use bevy::{
        math::Vec4Swizzles,
        prelude::{Mat4, Quat, Transform, Vec2, Vec3, Vec4},
    };

    use super::{Frustum, GeometryError, ViewProjector, NEAR_EPSILON};
    use crate::portal::{PortalArchetype, PortalId, PortalInstance};

    fn portal(id: u64, transform: Transform) -> PortalInstance {
        PortalInstance::new(
            PortalId(id),
            Some(PortalArchetype::new("a")),
            transform,
            Vec2::new(2., 1.),
        )
        .unwrap()
    }

    fn ndc(view: &super::ProjectorView, world: Vec3) -> Vec3 {
        let view_matrix = view.transform.compute_matrix().inverse();
        let clip = view.projection * view_matrix * world.extend(1.);
        clip.xyz() / clip.w
    }

    #[test]
    fn centered_viewer_gets_an_unshifted_frustum() {
        let source = portal(0, Transform::IDENTITY);
        let target = portal(1, Transform::from_xyz(10., 0., 0.));
        let view = ViewProjector::project(Vec3::new(0., 0., -3.), 100., &source, &target).unwrap();

        assert!(view
            .transform
            .translation
            .abs_diff_eq(Vec3::new(10., 0., 3.), 1e-5));
        assert_eq!(view.transform.rotation, Quat::IDENTITY);
        let f = view.frustum;
        assert!((f.near - 3.).abs() < 1e-5);
        assert!((f.left + 1.).abs() < 1e-5);
        assert!((f.right - 1.).abs() < 1e-5);
        assert!((f.top - 0.5).abs() < 1e-5);
        assert!((f.bottom + 0.5).abs() < 1e-5);
        assert_eq!(f.far, 100.);
    }

    #[test]
    fn frustum_edges_go_through_the_target_corners() {
        let source = portal(
            0,
            Transform::from_xyz(1., 2., 3.).with_rotation(Quat::from_rotation_y(0.4)),
        );
        let target = portal(
            1,
            Transform::from_xyz(-6., 0.5, 9.).with_rotation(Quat::from_rotation_y(-2.1)),
        );
        let viewer = source
            .local_to_world()
            .transform_point3(Vec3::new(0.7, -0.3, -2.5));
        let view = ViewProjector::project(viewer, 50., &source, &target).unwrap();

        assert!(view.frustum.left < -1. && view.frustum.right < 1.);
        let expected = [
            Vec3::new(-1., -1., 0.),
            Vec3::new(1., -1., 0.),
            Vec3::new(1., 1., 0.),
            Vec3::new(-1., 1., 0.),
        ];
        for (corner, expected) in target.world_corners().into_iter().zip(expected) {
            let projected = ndc(&view, corner);
            assert!(projected.abs_diff_eq(expected, 1e-3), "{corner} -> {projected}");
        }
    }

    #[test]
    fn near_distance_stays_positive() {
        let source = portal(0, Transform::IDENTITY);
        let target = portal(
            1,
            Transform::from_xyz(0., 0., 20.).with_rotation(Quat::from_rotation_y(1.)),
        );
        for viewer in [
            Vec3::ZERO,
            Vec3::new(0.3, -0.2, 0.),
            Vec3::new(5., 5., 0.),
            Vec3::new(0., 0., 4.),
            Vec3::new(0., 0., -1e-7),
        ] {
            let view = ViewProjector::project(viewer, 1000., &source, &target).unwrap();
            assert!(view.frustum.near >= NEAR_EPSILON, "{viewer}");
            assert!(view.projection.is_finite(), "{viewer}");
        }
    }

    #[test]
    fn degenerate_inputs_are_transient_errors() {
        let source = portal(0, Transform::IDENTITY);
        let target = portal(1, Transform::from_xyz(10., 0., 0.));
        assert_eq!(
            ViewProjector::project(Vec3::splat(f32::NAN), 100., &source, &target),
            Err(GeometryError::NonFiniteViewer)
        );
        assert_eq!(
            ViewProjector::project(Vec3::Z, 0., &source, &target),
            Err(GeometryError::InvalidFarDistance { far: 0. })
        );
        assert!(matches!(
            ViewProjector::project(Vec3::new(0., 0., -300.), 100., &source, &target),
            Err(GeometryError::EmptyFrustum { .. })
        ));

        let mut broken = portal(2, Transform::IDENTITY);
        broken.relocate(Transform::from_xyz(f32::INFINITY, 0., 0.));
        assert_eq!(
            ViewProjector::project(Vec3::Z, 100., &source, &broken),
            Err(GeometryError::DegeneratePortal(PortalId(2)))
        );
    }

    #[test]
    fn reverse_z_maps_near_to_one_and_far_to_zero() {
        let frustum = Frustum {
            left: -0.5,
            right: 1.5,
            bottom: -1.,
            top: 0.25,
            near: 2.,
            far: 40.,
        };
        let forward = frustum.projection_matrix();
        let reverse = frustum.reverse_z_projection_matrix();
        let depth = |m: Mat4, z: f32| {
            let clip = m * Vec4::new(0., 0., -z, 1.);
            clip.z / clip.w
        };
        assert!((depth(forward, 2.) - 0.).abs() < 1e-5);
        assert!((depth(forward, 40.) - 1.).abs() < 1e-5);
        assert!((depth(reverse, 2.) - 1.).abs() < 1e-5);
        assert!((depth(reverse, 40.) - 0.).abs() < 1e-5);
    }
}
