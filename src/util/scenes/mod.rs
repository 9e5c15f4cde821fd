use std::f32::consts::FRAC_PI_2;

use bevy::prelude::*;
use bevy_rapier3d::prelude::*;

use crate::plugins::physics::*;

const WALL_THICKNESS: f32 = 1.;

#[derive(Debug, Clone, Copy)]
pub struct ArenaLayout {
    /// Inner side length of the square room.
    pub length: f32,
    pub height: f32,
}

/// Spawn a closed square room with colored walls and a few pillars, every surface carrying a
/// fixed collider so portals can be shot at it.
pub fn spawn_arena(
    commands: &mut Commands,
    meshes: &mut Assets<Mesh>,
    materials: &mut Assets<StandardMaterial>,
    layout: ArenaLayout,
) {
    let ArenaLayout { length, height } = layout;
    let half_len = length / 2.;

    let walls_materials = [
        materials.add(StandardMaterial::from(Color::CRIMSON)),
        materials.add(StandardMaterial::from(Color::SEA_GREEN)),
        materials.add(StandardMaterial::from(Color::MIDNIGHT_BLUE)),
        materials.add(StandardMaterial::from(Color::ANTIQUE_WHITE)),
    ];
    let slab_material = materials.add(StandardMaterial::from(Color::DARK_GRAY));
    let pillar_material = materials.add(StandardMaterial::from(Color::GOLD));

    let wall_mesh = meshes.add(
        shape::Box::new(length + 2. * WALL_THICKNESS, height, WALL_THICKNESS).into(),
    );
    let slab_mesh = meshes.add(
        shape::Box::new(
            length + 2. * WALL_THICKNESS,
            WALL_THICKNESS,
            length + 2. * WALL_THICKNESS,
        )
        .into(),
    );
    let slab_collider = || {
        Collider::cuboid(
            half_len + WALL_THICKNESS,
            WALL_THICKNESS / 2.,
            half_len + WALL_THICKNESS,
        )
    };

    commands
        .spawn(PbrBundle {
            mesh: slab_mesh.clone(),
            material: slab_material.clone(),
            transform: Transform::from_xyz(0., -WALL_THICKNESS / 2., 0.),
            ..default()
        })
        .insert((
            Name::from("Ground"),
            RigidBody::Fixed,
            slab_collider(),
            CollisionGroups::new(GROUND_GROUP, ALL_GROUPS),
        ));
    commands
        .spawn(PbrBundle {
            mesh: slab_mesh,
            material: slab_material,
            transform: Transform::from_xyz(0., height + WALL_THICKNESS / 2., 0.),
            ..default()
        })
        .insert((
            Name::from("Ceiling"),
            RigidBody::Fixed,
            slab_collider(),
            CollisionGroups::new(GROUND_GROUP, ALL_GROUPS),
        ));

    for (i, material) in walls_materials.into_iter().enumerate() {
        let mut transform =
            Transform::from_xyz(0., height / 2., -(half_len + WALL_THICKNESS / 2.));
        transform.rotate_around(
            Vec3::new(0., height / 2., 0.),
            Quat::from_axis_angle(Vec3::Y, i as f32 * FRAC_PI_2),
        );
        commands
            .spawn(PbrBundle {
                mesh: wall_mesh.clone(),
                material,
                transform,
                ..default()
            })
            .insert((
                Name::from(format!("Wall_{}", i)),
                RigidBody::Fixed,
                Collider::cuboid(
                    half_len + WALL_THICKNESS,
                    height / 2.,
                    WALL_THICKNESS / 2.,
                ),
                CollisionGroups::new(WALLS_GROUP, ALL_GROUPS),
            ));
    }

    // Pillars give the portal views something to show.
    const PILLAR_SIZE: f32 = 0.8;
    let pillar_mesh = meshes.add(shape::Box::new(PILLAR_SIZE, height, PILLAR_SIZE).into());
    for (i, (x, z)) in [(-0.3, -0.3), (0.25, -0.2), (0.3, 0.3), (-0.2, 0.25)]
        .into_iter()
        .enumerate()
    {
        commands
            .spawn(PbrBundle {
                mesh: pillar_mesh.clone(),
                material: pillar_material.clone(),
                transform: Transform::from_xyz(x * length, height / 2., z * length),
                ..default()
            })
            .insert((
                Name::from(format!("Pillar_{}", i)),
                RigidBody::Fixed,
                Collider::cuboid(PILLAR_SIZE / 2., height / 2., PILLAR_SIZE / 2.),
                CollisionGroups::new(WALLS_GROUP, ALL_GROUPS),
            ));
    }
}
