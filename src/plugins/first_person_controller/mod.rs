//! Free flying first person camera, used as the portal viewer.

use bevy::{prelude::*, render::camera::Projection};
use euclid::Angle;
use leafwing_input_manager::prelude::*;

use super::{
    input::{default_input_map, Actions},
    portal::PortalViewer,
};

#[derive(Debug)]
/// First person controller plugin, which turns spawners into flying viewer cameras and moves
/// them around.
pub struct FirstPersonControllerPlugin;

impl Plugin for FirstPersonControllerPlugin {
    fn build(&self, app: &mut App) {
        app.add_system(spawn_controller.label(FirstPersonLabels::SpawnControllers))
            .add_system(
                process_controller_inputs
                    .label(FirstPersonLabels::ProcessInputs)
                    .after(FirstPersonLabels::SpawnControllers),
            );
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, SystemLabel)]
/// Labels for the first person controller systems.
pub enum FirstPersonLabels {
    SpawnControllers,
    ProcessInputs,
}

#[derive(Debug, Component)]
pub struct FirstPersonController {
    pub yaw: Angle<f32>,
    pub pitch: Angle<f32>,
}

#[derive(Debug, Default, Component, Reflect)]
#[reflect(Component)]
/// Marker for first person cameras.
pub struct FirstPersonCamera;

#[derive(Debug, Component, Default)]
pub struct FirstPersonControllerSpawner {
    pub far: f32,
}

#[derive(Debug, Bundle, Default)]
pub struct FirstPersonControllerBundle {
    #[bundle]
    pub spatial: SpatialBundle,
    pub spawner: FirstPersonControllerSpawner,
}

impl FirstPersonControllerBundle {
    pub fn new(transform: Transform, far: f32) -> Self {
        FirstPersonControllerBundle {
            spatial: SpatialBundle::from(transform),
            spawner: FirstPersonControllerSpawner { far },
        }
    }
}

fn spawn_controller(
    mut commands: Commands,
    spawners_query: Query<(&FirstPersonControllerSpawner, &Transform, Entity)>,
) {
    for (spawner, transform, id) in &spawners_query {
        let (yaw, pitch, _) = transform.rotation.to_euler(EulerRot::YXZ);
        info!("Spawning first person camera at {}", transform.translation);
        commands
            .entity(id)
            .insert(Camera3dBundle {
                projection: Projection::Perspective(PerspectiveProjection {
                    fov: std::f32::consts::FRAC_PI_3,
                    near: 0.05,
                    far: spawner.far,
                    ..default()
                }),
                transform: *transform,
                ..default()
            })
            .insert(InputManagerBundle {
                action_state: ActionState::<Actions>::default(),
                input_map: default_input_map(),
            })
            .insert((
                Name::from("Viewer"),
                FirstPersonCamera,
                PortalViewer,
                FirstPersonController {
                    yaw: Angle::radians(yaw),
                    pitch: Angle::radians(pitch),
                },
            ))
            .remove::<FirstPersonControllerSpawner>();
    }
}

const SPEED: f32 = 4.;
const SPRINT_MULTIPLIER: f32 = 2.5;
const MOUSE_SENSITIVITY: f32 = 0.003;

fn process_controller_inputs(
    time: Res<Time>,
    mut controller_query: Query<(
        &ActionState<Actions>,
        &mut FirstPersonController,
        &mut Transform,
    )>,
) {
    for (input_state, mut controller, mut transform) in &mut controller_query {
        if let Some(mouse_movement) = input_state.axis_pair(Actions::Aim) {
            controller.yaw -= Angle::radians(mouse_movement.x() * MOUSE_SENSITIVITY);
            controller.pitch -= Angle::radians(mouse_movement.y() * MOUSE_SENSITIVITY);
            // Stop just short of the poles so the view never flips.
            let limit = std::f32::consts::FRAC_PI_2 - 0.01;
            controller.pitch.radians = controller.pitch.radians.clamp(-limit, limit);
            transform.rotation = Quat::from_euler(
                EulerRot::YXZ,
                controller.yaw.radians,
                controller.pitch.radians,
                0.,
            );
        }

        let axis = |positive: Actions, negative: Actions| -> f32 {
            match (input_state.pressed(positive), input_state.pressed(negative)) {
                (true, false) => 1.,
                (false, true) => -1.,
                _ => 0.,
            }
        };
        let direction = transform.forward() * axis(Actions::Forward, Actions::Backwards)
            + transform.right() * axis(Actions::StrafeRight, Actions::StrafeLeft)
            + Vec3::Y * axis(Actions::Up, Actions::Down);
        let speed = if input_state.pressed(Actions::Sprint) {
            SPEED * SPRINT_MULTIPLIER
        } else {
            SPEED
        };
        transform.translation += direction.normalize_or_zero() * speed * time.delta_seconds();
    }
}
