use bevy::{math::Vec4Swizzles, prelude::*};
use bevy_prototype_debug_lines::DebugLines;

/// Draw the frustum of a camera at `cam_transform` whose projection maps depth to `0..1`.
pub fn draw_camera_frustum(cam_transform: &Transform, projection: Mat4, lines: &mut DebugLines) {
    const NEAR_COLOR: Color = Color::BLACK;
    const FAR_COLOR: Color = Color::WHITE;

    let inv_viewprojection = (projection * cam_transform.compute_matrix().inverse()).inverse();

    let corners = [
        Vec4::new(-1., -1., 0., 1.),
        Vec4::new(1., -1., 0., 1.),
        Vec4::new(-1., 1., 0., 1.),
        Vec4::new(1., 1., 0., 1.),
        Vec4::new(-1., -1., 1., 1.),
        Vec4::new(1., -1., 1., 1.),
        Vec4::new(-1., 1., 1., 1.),
        Vec4::new(1., 1., 1., 1.),
    ]
    .map(|v| {
        let vh = inv_viewprojection * v;
        vh.xyz() / vh.w
    });

    for i in 0..4 {
        lines.line_gradient(corners[i], corners[i + 4], 0., NEAR_COLOR, FAR_COLOR);
    }
    for (a, b) in [(0, 1), (0, 2), (1, 3), (2, 3)] {
        lines.line_colored(corners[a], corners[b], 0., NEAR_COLOR);
        lines.line_colored(corners[a + 4], corners[b + 4], 0., FAR_COLOR);
    }
}
