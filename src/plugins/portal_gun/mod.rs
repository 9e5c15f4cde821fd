use bevy::prelude::*;
use bevy_rapier3d::prelude::RapierContext;
use leafwing_input_manager::prelude::*;

use super::{
    first_person_controller::FirstPersonCamera,
    input::Actions,
    portal::{Portal, PortalAssets, PortalBundle, RapierPlacement},
};
use crate::portal::{PlacementOracle, PortalArchetype};

#[derive(Debug)]
pub struct PortalGunPlugin;

impl Plugin for PortalGunPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<PortalGuns>().add_system(fire_portals);
    }
}

#[derive(Debug, Clone)]
pub struct PortalGun {
    pub action: Actions,
    pub archetype: PortalArchetype,
    pub color: Color,
}

impl PortalGun {
    pub fn portal(&self) -> Portal {
        Portal {
            archetype: self.archetype.clone(),
            closed_color: self.color,
        }
    }
}

/// One gun per archetype. Firing a gun places its portal, or moves it if it already exists.
#[derive(Debug, Clone, Resource)]
pub struct PortalGuns(pub Vec<PortalGun>);

impl Default for PortalGuns {
    fn default() -> Self {
        PortalGuns(vec![
            PortalGun {
                action: Actions::FirePrimary,
                archetype: PortalArchetype::new("orange"),
                color: Color::ORANGE,
            },
            PortalGun {
                action: Actions::FireSecondary,
                archetype: PortalArchetype::new("blue"),
                color: Color::rgb(0.1, 0.4, 1.),
            },
        ])
    }
}

fn fire_portals(
    mut commands: Commands,
    guns: Res<PortalGuns>,
    shooters: Query<(&ActionState<Actions>, &GlobalTransform), With<FirstPersonCamera>>,
    mut portals: Query<(&Portal, &mut Transform)>,
    rapier: Res<RapierContext>,
    assets: Option<Res<PortalAssets>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    let placement = RapierPlacement::new(&rapier);
    for (actions, shooter) in &shooters {
        for gun in &guns.0 {
            if !actions.just_pressed(gun.action) {
                continue;
            }
            let Some(transform) = placement.place(shooter.translation(), shooter.forward()) else {
                info!("The {} portal hit nothing", gun.archetype);
                continue;
            };

            let existing = portals
                .iter_mut()
                .find(|(portal, _)| portal.archetype == gun.archetype);
            if let Some((_, mut portal_transform)) = existing {
                info!("Moving the {} portal to {}", gun.archetype, transform.translation);
                *portal_transform = transform;
            } else if let Some(mesh) = assets.as_ref().and_then(|a| a.mesh(&gun.archetype)) {
                info!("Spawning the {} portal at {}", gun.archetype, transform.translation);
                commands
                    .spawn(PortalBundle::new(gun.portal(), transform, mesh, &mut materials))
                    .insert(Name::from(format!("Portal {}", gun.archetype)));
            } else {
                warn!("No mesh for portal archetype {}", gun.archetype);
            }
        }
    }
}
