//! Development helpers, only built with the `devel` feature.

pub mod draw;

use bevy::prelude::*;
use bevy_prototype_debug_lines::{DebugLines, DebugLinesPlugin};
use leafwing_input_manager::prelude::ActionState;

use super::{input::Actions, portal::PortalContextRes};

#[derive(Debug)]
pub struct DebugPlugin;

/// Whether projector frusta are drawn.
#[derive(Debug, Default, Resource)]
pub struct DrawFrusta(pub bool);

impl Plugin for DebugPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugin(DebugLinesPlugin::default())
            .init_resource::<DrawFrusta>()
            .add_system(toggle_frusta)
            .add_system(draw_projector_frusta.after(toggle_frusta));
    }
}

fn toggle_frusta(actions: Query<&ActionState<Actions>>, mut draw: ResMut<DrawFrusta>) {
    if actions
        .iter()
        .any(|state| state.just_pressed(Actions::ToggleFrusta))
    {
        draw.0 = !draw.0;
        info!("Projector frusta {}", if draw.0 { "shown" } else { "hidden" });
    }
}

fn draw_projector_frusta(
    draw: Res<DrawFrusta>,
    context: Res<PortalContextRes>,
    mut lines: ResMut<DebugLines>,
) {
    if !draw.0 {
        return;
    }
    for connection in context.manager().connections() {
        let projector = connection.projector();
        if projector.is_updated() {
            draw::draw_camera_frustum(&projector.transform, projector.projection, &mut lines);
        }
    }
}
