use bevy::prelude::*;
use bevy_rapier3d::prelude::*;

use crate::portal::{geometry::orient_on_surface, PlacementOracle};

/// Places portals on the first fixed collider hit by a ray.
pub struct RapierPlacement<'a> {
    rapier: &'a RapierContext,
}

impl<'a> RapierPlacement<'a> {
    pub fn new(rapier: &'a RapierContext) -> Self {
        RapierPlacement { rapier }
    }
}

impl PlacementOracle for RapierPlacement<'_> {
    fn place(&self, origin: Vec3, direction: Vec3) -> Option<Transform> {
        let (entity, impact) = self.rapier.cast_ray_and_get_normal(
            origin,
            direction,
            Real::MAX,
            true,
            QueryFilter::only_fixed(),
        )?;
        debug!("Portal ray hit {:?} at {}", entity, impact.point);
        Some(orient_on_surface(impact.point, impact.normal))
    }
}
