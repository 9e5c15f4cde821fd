use bevy::{prelude::*, window::CursorGrabMode};
use leafwing_input_manager::prelude::*;

#[derive(Debug)]
pub struct InputPlugin;

/// Everything the viewer can do.
#[derive(Actionlike, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Actions {
    Forward,
    Backwards,
    StrafeLeft,
    StrafeRight,
    Up,
    Down,
    Sprint,
    Aim,
    FirePrimary,
    FireSecondary,
    ToggleFrusta,
}

impl Plugin for InputPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugin(InputManagerPlugin::<Actions>::default())
            .add_startup_system(grab_on_start)
            .add_system(toggle_mouse_capture);
    }
}

pub fn default_input_map() -> InputMap<Actions> {
    let mut map = InputMap::default();
    map.insert(KeyCode::W, Actions::Forward)
        .insert(KeyCode::S, Actions::Backwards)
        .insert(KeyCode::A, Actions::StrafeLeft)
        .insert(KeyCode::D, Actions::StrafeRight)
        .insert(KeyCode::Space, Actions::Up)
        .insert(KeyCode::LControl, Actions::Down)
        .insert(KeyCode::LShift, Actions::Sprint)
        .insert(DualAxis::mouse_motion(), Actions::Aim)
        .insert(MouseButton::Left, Actions::FirePrimary)
        .insert(MouseButton::Right, Actions::FireSecondary)
        .insert(KeyCode::F1, Actions::ToggleFrusta);
    map
}

fn set_cursor_capture(window: &mut Window, captured: bool) {
    let mode = if captured {
        CursorGrabMode::Confined
    } else {
        CursorGrabMode::None
    };
    window.set_cursor_grab_mode(mode);
    window.set_cursor_visibility(!captured);
}

fn grab_on_start(mut windows: ResMut<Windows>) {
    if let Some(window) = windows.get_primary_mut() {
        set_cursor_capture(window, true);
    }
}

fn toggle_mouse_capture(mut windows: ResMut<Windows>, keys: Res<Input<KeyCode>>) {
    if !keys.just_pressed(KeyCode::Tab) {
        return;
    }
    if let Some(window) = windows.get_primary_mut() {
        let captured = window.cursor_grab_mode() != CursorGrabMode::None;
        set_cursor_capture(window, !captured);
    }
}
