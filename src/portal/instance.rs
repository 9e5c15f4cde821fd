use std::fmt;

use bevy::prelude::{Mat4, Transform, Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Identity of a kind of portal. Two instances may only be paired when the connection graph
/// pairs their archetypes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortalArchetype(String);

impl PortalArchetype {
    pub fn new(name: impl Into<String>) -> Self {
        PortalArchetype(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PortalArchetype {
    fn from(name: &str) -> Self {
        PortalArchetype::new(name)
    }
}

impl From<String> for PortalArchetype {
    fn from(name: String) -> Self {
        PortalArchetype(name)
    }
}

impl fmt::Display for PortalArchetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handle of a portal instance inside a lifecycle manager. Ids are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortalId(pub(crate) u64);

impl PortalId {
    pub fn index(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PortalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "portal#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// `connect` was called without a target. Use `disconnect` to clear a connection.
    MissingTarget { portal: PortalId },
    SelfConnection { portal: PortalId },
    UnknownPortal(PortalId),
    UnknownArchetype(PortalArchetype),
    /// Template instances carry no archetype and can never be placed.
    TemplateInstance(PortalId),
    AlreadyActive(PortalId),
    InvalidSize { width: f32, height: f32 },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingTarget { portal } => {
                write!(f, "{portal} cannot connect to nothing, use disconnect instead")
            }
            Self::SelfConnection { portal } => write!(f, "{portal} cannot connect to itself"),
            Self::UnknownPortal(portal) => write!(f, "unknown portal {portal}"),
            Self::UnknownArchetype(archetype) => {
                write!(f, "unknown portal archetype '{archetype}'")
            }
            Self::TemplateInstance(portal) => {
                write!(f, "{portal} is a template instance and cannot be activated")
            }
            Self::AlreadyActive(portal) => write!(f, "{portal} is already active"),
            Self::InvalidSize { width, height } => {
                write!(f, "invalid portal size {width}x{height}")
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// A placed portal: a rectangle of `size` centered on the origin of `transform`, lying in the
/// local XY plane and facing local +Z.
#[derive(Debug, Clone, PartialEq)]
pub struct PortalInstance {
    id: PortalId,
    archetype: Option<PortalArchetype>,
    transform: Transform,
    size: Vec2,
    /// Weak back-reference to the portal this one currently shows.
    connected: Option<PortalId>,
    active: bool,
}

impl PortalInstance {
    pub fn new(
        id: PortalId,
        archetype: Option<PortalArchetype>,
        transform: Transform,
        size: Vec2,
    ) -> Result<Self, ValidationError> {
        validate_size(size)?;
        Ok(PortalInstance {
            id,
            archetype,
            transform: rigid(transform),
            size,
            connected: None,
            active: false,
        })
    }

    pub fn id(&self) -> PortalId {
        self.id
    }

    pub fn archetype(&self) -> Option<&PortalArchetype> {
        self.archetype.as_ref()
    }

    pub fn is_template(&self) -> bool {
        self.archetype.is_none()
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn position(&self) -> Vec3 {
        self.transform.translation
    }

    pub fn size(&self) -> Vec2 {
        self.size
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.size.x / self.size.y
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub(crate) fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Move the portal. Scale is discarded, a portal pose is a position and an orientation.
    pub fn relocate(&mut self, transform: Transform) {
        self.transform = rigid(transform);
    }

    /// World space direction the portal faces (local +Z).
    pub fn facing(&self) -> Vec3 {
        (self.transform.rotation * Vec3::Z).normalize_or_zero()
    }

    pub fn local_to_world(&self) -> Mat4 {
        self.transform.compute_matrix()
    }

    pub fn world_to_local(&self) -> Mat4 {
        self.local_to_world().inverse()
    }

    /// Corners in local space: bottom-left, bottom-right, top-right, top-left.
    pub fn local_corners(&self) -> [Vec3; 4] {
        let half = self.size / 2.;
        [
            Vec3::new(-half.x, -half.y, 0.),
            Vec3::new(half.x, -half.y, 0.),
            Vec3::new(half.x, half.y, 0.),
            Vec3::new(-half.x, half.y, 0.),
        ]
    }

    pub fn world_corners(&self) -> [Vec3; 4] {
        let local_to_world = self.local_to_world();
        self.local_corners()
            .map(|corner| local_to_world.transform_point3(corner))
    }

    /// Whether a local space point projects inside the portal rectangle.
    pub fn contains_local(&self, point: Vec3) -> bool {
        let half = self.size / 2.;
        point.x.abs() <= half.x && point.y.abs() <= half.y
    }

    pub fn connected(&self) -> Option<PortalId> {
        self.connected
    }

    /// Whether the portal currently shows another one. Presentation layers use this to switch
    /// the display mesh between its open and closed look.
    pub fn is_open(&self) -> bool {
        self.connected.is_some()
    }

    pub fn connect(&mut self, target: Option<PortalId>) -> Result<(), ValidationError> {
        match target {
            None => Err(ValidationError::MissingTarget { portal: self.id }),
            Some(target) if target == self.id => {
                Err(ValidationError::SelfConnection { portal: self.id })
            }
            Some(target) => {
                self.connected = Some(target);
                Ok(())
            }
        }
    }

    pub fn disconnect(&mut self) -> Option<PortalId> {
        self.connected.take()
    }

    /// Whether the pose and size can produce a usable projection.
    pub fn is_well_formed(&self) -> bool {
        self.transform.translation.is_finite()
            && self.transform.rotation.is_finite()
            && self.size.is_finite()
            && self.size.x > 0.
            && self.size.y > 0.
            && self.facing() != Vec3::ZERO
    }
}

pub(crate) fn validate_size(size: Vec2) -> Result<(), ValidationError> {
    if size.is_finite() && size.x > 0. && size.y > 0. {
        Ok(())
    } else {
        Err(ValidationError::InvalidSize {
            width: size.x,
            height: size.y,
        })
    }
}

fn rigid(transform: Transform) -> Transform {
    Transform {
        scale: Vec3::ONE,
        ..transform
    }
}
