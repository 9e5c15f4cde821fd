//! Portal view projection.
//!
//! Portals are planar rectangles. Each one belongs to an archetype and the [`ConnectionGraph`]
//! decides which archetypes show each other. The [`ConnectionLifecycleManager`] turns active
//! instances into [`ActiveConnection`]s, each owning an offscreen render target, and the
//! [`FrameUpdater`] recomputes every connection's projector camera once per tick.
//!
//! Nothing in here needs a running `App`. The ECS side lives in `plugins::portal`.

pub mod context;
pub mod frame;
pub mod geometry;
pub mod graph;
pub mod instance;
pub mod lifecycle;
pub mod placement;
pub mod projector;

pub use context::{PendingChange, PendingChanges, PortalContext};
pub use frame::{FrameStats, FrameUpdater, ProjectorCameraState, ViewerCamera};
pub use graph::{ConfigError, ConnectionGraph, ConnectionRule, PortalLink};
pub use instance::{PortalArchetype, PortalId, PortalInstance, ValidationError};
pub use lifecycle::{
    ActivationReport, ActiveConnection, AllocationError, ConnectionId,
    ConnectionLifecycleManager, PortalEvent, RenderTargetAllocator, RenderTargetExtent,
    SubscriptionId,
};
pub use placement::PlacementOracle;
pub use projector::{Frustum, GeometryError, ProjectorView, ViewProjector, NEAR_EPSILON};
