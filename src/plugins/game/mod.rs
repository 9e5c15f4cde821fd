use std::f32::consts::*;

use crate::{
    plugins::*,
    portal::geometry::orient_on_surface,
    util::scenes::{spawn_arena, ArenaLayout},
};

use bevy::prelude::*;

const ARENA: ArenaLayout = ArenaLayout {
    length: 20.,
    height: 4.,
};

#[derive(Debug)]
/// Main plugin of the demo, responsible for loading the other plugins and setting up the scene.
pub struct GamePlugin;

impl Plugin for GamePlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(DefaultPlugins.set(WindowPlugin {
            window: WindowDescriptor {
                title: "Portal view".to_string(),
                width: 1280.,
                height: 720.,
                ..default()
            },
            ..default()
        }));

        #[cfg(feature = "devel")]
        {
            app.add_plugin(debug::DebugPlugin);
        }

        app.add_plugin(physics::PhysicsPlugin)
            .add_plugin(input::InputPlugin)
            .add_plugin(first_person_controller::FirstPersonControllerPlugin)
            .add_plugin(portal::PortalPlugin)
            .add_plugin(portal_gun::PortalGunPlugin)
            .add_startup_system(setup)
            // Portal meshes are loaded during startup.
            .add_startup_system_to_stage(StartupStage::PostStartup, spawn_initial_portals);
    }
}

/// Perform scene initialization
fn setup(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    spawn_arena(&mut commands, &mut meshes, &mut materials, ARENA);

    commands.spawn(DirectionalLightBundle {
        directional_light: DirectionalLight {
            color: Color::ANTIQUE_WHITE,
            illuminance: 20_000.,
            shadows_enabled: true,
            ..default()
        },
        transform: Transform {
            translation: Vec3::Y * 5.,
            rotation: Quat::from_euler(EulerRot::YXZ, FRAC_PI_4, -FRAC_PI_4, 0.),
            scale: Vec3::ONE,
        },
        ..default()
    });

    commands.spawn(first_person_controller::FirstPersonControllerBundle::new(
        Transform::from_xyz(0., 1.6, 6.),
        1000.,
    ));
}

/// One portal of each gun on two adjacent walls, so the scene opens connected.
fn spawn_initial_portals(
    mut commands: Commands,
    guns: Res<portal_gun::PortalGuns>,
    assets: Res<portal::PortalAssets>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    let half = ARENA.length / 2.;
    let spots = [
        orient_on_surface(Vec3::new(-4., 1.5, -half), Vec3::Z),
        orient_on_surface(Vec3::new(-half, 1.5, 3.), Vec3::X),
    ];
    for (gun, transform) in guns.0.iter().zip(spots) {
        let Some(mesh) = assets.mesh(&gun.archetype) else {
            warn!("Portal archetype {} is not configured", gun.archetype);
            continue;
        };
        commands
            .spawn(portal::PortalBundle::new(
                gun.portal(),
                transform,
                mesh,
                &mut materials,
            ))
            .insert(Name::from(format!("Portal {}", gun.archetype)));
    }
}
