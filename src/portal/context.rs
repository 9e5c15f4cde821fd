use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, PoisonError},
};

use bevy::{log::warn, prelude::Transform};

use super::{
    frame::{FrameStats, FrameUpdater, ViewerCamera},
    lifecycle::{ActivationReport, ConnectionLifecycleManager, RenderTargetAllocator},
    ConfigError, PortalArchetype, PortalId, ValidationError,
};
use crate::config::PortalConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PendingChange {
    Activate(PortalId),
    Deactivate(PortalId),
    Relocate(PortalId, Transform),
    Despawn(PortalId),
}

/// Changes requested while the context is borrowed, for example from an event subscriber.
/// Clones share the same queue.
#[derive(Debug, Clone, Default)]
pub struct PendingChanges(Arc<Mutex<VecDeque<PendingChange>>>);

impl PendingChanges {
    fn push(&self, change: PendingChange) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(change);
    }

    pub fn activate(&self, portal: PortalId) {
        self.push(PendingChange::Activate(portal));
    }

    pub fn deactivate(&self, portal: PortalId) {
        self.push(PendingChange::Deactivate(portal));
    }

    pub fn relocate(&self, portal: PortalId, transform: Transform) {
        self.push(PendingChange::Relocate(portal, transform));
    }

    pub fn despawn(&self, portal: PortalId) {
        self.push(PendingChange::Despawn(portal));
    }

    pub fn is_empty(&self) -> bool {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    /// Take every queued change, oldest first.
    pub fn drain(&self) -> Vec<PendingChange> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect()
    }
}

/// Everything the portal system needs at runtime, built from a validated configuration.
#[derive(Debug)]
pub struct PortalContext<T> {
    config: PortalConfig,
    manager: ConnectionLifecycleManager<T>,
    updater: FrameUpdater,
    pending: PendingChanges,
}

impl<T> PortalContext<T> {
    pub fn new(config: PortalConfig) -> Result<Self, ConfigError> {
        let graph = config.build_graph()?;
        let manager = ConnectionLifecycleManager::new(graph, config.render_targets);
        Ok(PortalContext {
            config,
            manager,
            updater: FrameUpdater::default(),
            pending: PendingChanges::default(),
        })
    }

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    pub fn manager(&self) -> &ConnectionLifecycleManager<T> {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut ConnectionLifecycleManager<T> {
        &mut self.manager
    }

    /// A handle to the deferred change queue.
    pub fn pending(&self) -> PendingChanges {
        self.pending.clone()
    }

    /// Create an inactive instance of a configured archetype, sized as configured.
    pub fn spawn_from_config(
        &mut self,
        archetype: &PortalArchetype,
        transform: Transform,
    ) -> Result<PortalId, ValidationError> {
        let size = self
            .config
            .archetype(archetype)
            .ok_or_else(|| ValidationError::UnknownArchetype(archetype.clone()))?
            .size();
        self.manager
            .spawn(Some(archetype.clone()), transform, size)
    }

    pub fn activate<A>(
        &mut self,
        portal: PortalId,
        allocator: &mut A,
    ) -> Result<ActivationReport, ValidationError>
    where
        A: RenderTargetAllocator<Target = T>,
    {
        self.manager.activate(portal, allocator)
    }

    pub fn deactivate<A>(&mut self, portal: PortalId, allocator: &mut A) -> Result<(), ValidationError>
    where
        A: RenderTargetAllocator<Target = T>,
    {
        self.manager.deactivate(portal, allocator).map(|_| ())
    }

    /// Apply the changes queued since the last call. Failures are logged and do not stop the
    /// remaining changes. Returns how many changes were applied.
    pub fn apply_pending<A>(&mut self, allocator: &mut A) -> usize
    where
        A: RenderTargetAllocator<Target = T>,
    {
        let mut applied = 0;
        for change in self.pending.drain() {
            let result = match change {
                PendingChange::Activate(portal) => {
                    self.manager.activate(portal, allocator).map(|_| ())
                }
                PendingChange::Deactivate(portal) => {
                    self.manager.deactivate(portal, allocator).map(|_| ())
                }
                PendingChange::Relocate(portal, transform) => {
                    self.manager.relocate(portal, transform)
                }
                PendingChange::Despawn(portal) => {
                    self.manager.despawn(portal, allocator).map(|_| ())
                }
            };
            match result {
                Ok(()) => applied += 1,
                Err(err) => warn!("Dropping queued {:?}: {}", change, err),
            }
        }
        applied
    }

    /// Recompute every projector for this tick.
    pub fn update(&mut self, viewer: &ViewerCamera) -> FrameStats {
        self.updater.update(&mut self.manager, viewer)
    }

    pub fn tick(&self) -> u64 {
        self.updater.tick()
    }

    pub fn clear<A>(&mut self, allocator: &mut A)
    where
        A: RenderTargetAllocator<Target = T>,
    {
        self.pending.drain();
        self.manager.clear(allocator);
    }
}
