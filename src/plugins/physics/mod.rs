use bevy::prelude::*;
use bevy_rapier3d::prelude::{Group, NoUserData, RapierConfiguration, RapierPhysicsPlugin};

pub const WALLS_GROUP: Group = Group::GROUP_1;
pub const GROUND_GROUP: Group = Group::GROUP_2;
pub const ALL_GROUPS: Group = Group::ALL;

/// Colliders only serve portal placement ray casts, nothing is simulated.
pub struct PhysicsPlugin;

impl Plugin for PhysicsPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugin(RapierPhysicsPlugin::<NoUserData>::default())
            .add_startup_system(configure_rapier);
    }
}

fn configure_rapier(mut config: ResMut<RapierConfiguration>) {
    config.physics_pipeline_active = false;
    config.query_pipeline_active = true;
}
