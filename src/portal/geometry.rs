use bevy::prelude::{Mat4, Transform, Vec3};

use super::PortalInstance;

/// Reflection across the local XY plane, i.e. across the portal surface.
fn mirror_z() -> Mat4 {
    Mat4::from_scale(Vec3::new(1., 1., -1.))
}

/// Matrix taking a world space point seen through `source` to where it lies relative to
/// `target`: express it in the source's local frame, mirror it across the portal plane, then
/// read the local coordinates back in the target's frame.
pub fn portal_to_portal(source: &PortalInstance, target: &PortalInstance) -> Mat4 {
    target.local_to_world() * mirror_z() * source.world_to_local()
}

pub fn mirror_point(source: &PortalInstance, target: &PortalInstance, point: Vec3) -> Vec3 {
    portal_to_portal(source, target).transform_point3(point)
}

/// Inverse of [`mirror_point`]. The mirror is its own inverse, so this is the same mapping
/// taken from the target back to the source.
pub fn unmirror_point(source: &PortalInstance, target: &PortalInstance, point: Vec3) -> Vec3 {
    portal_to_portal(target, source).transform_point3(point)
}

/// Closest point to `point` on the plane going through `origin` with unit `normal`.
pub fn closest_point_on_plane(origin: Vec3, normal: Vec3, point: Vec3) -> Vec3 {
    point - normal * (point - origin).dot(normal)
}

/// Pose of a portal placed on a surface hit at `point` with outward `normal`. The portal's +Z
/// points into the surface so that viewers standing in front of the surface look through it.
pub fn orient_on_surface(point: Vec3, normal: Vec3) -> Transform {
    // Offset along the surface normal to prevent Z fighting with the wall.
    const Z_FIGHTING_OFFSET: f32 = 0.001;

    let normal = normal.normalize_or_zero();
    let up = if normal.y.abs() > 0.99 { Vec3::Z } else { Vec3::Y };
    let mut transform = Transform::from_translation(point + normal * Z_FIGHTING_OFFSET);
    transform.look_at(transform.translation + normal, up);
    transform
}
