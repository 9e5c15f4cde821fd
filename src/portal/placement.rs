use bevy::prelude::{Transform, Vec3};

/// Finds where a portal aimed from `origin` along `direction` lands, if anywhere.
pub trait PlacementOracle {
    fn place(&self, origin: Vec3, direction: Vec3) -> Option<Transform>;
}

impl<F> PlacementOracle for F
where
    F: Fn(Vec3, Vec3) -> Option<Transform>,
{
    fn place(&self, origin: Vec3, direction: Vec3) -> Option<Transform> {
        self(origin, direction)
    }
}
