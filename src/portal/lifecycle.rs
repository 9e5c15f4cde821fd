use std::{collections::HashMap, fmt};

use bevy::{
    log::{debug, info, warn},
    prelude::{Transform, Vec2},
};

use super::{
    frame::ProjectorCameraState, ConnectionGraph, PortalArchetype, PortalId, PortalInstance,
    ValidationError,
};
use crate::config::RenderTargetPolicy;

/// Size in pixels of an offscreen render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderTargetExtent {
    pub width: u32,
    pub height: u32,
}

impl fmt::Display for RenderTargetExtent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationError {
    pub extent: RenderTargetExtent,
    pub reason: String,
}

impl fmt::Display for AllocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed to allocate a {} render target: {}",
            self.extent, self.reason
        )
    }
}

impl std::error::Error for AllocationError {}

/// Creates and releases the offscreen targets projectors render into.
pub trait RenderTargetAllocator {
    type Target;

    fn create(&mut self, extent: RenderTargetExtent) -> Result<Self::Target, AllocationError>;

    fn destroy(&mut self, target: Self::Target);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn index(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "connection#{}", self.0)
    }
}

/// A live, directional pairing: `source` shows what lies in front of `target`. The connection
/// is the only owner of its render target and projector state.
#[derive(Debug)]
pub struct ActiveConnection<T> {
    id: ConnectionId,
    source: PortalId,
    target: PortalId,
    render_target: T,
    extent: RenderTargetExtent,
    projector: ProjectorCameraState,
}

impl<T> ActiveConnection<T> {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn source(&self) -> PortalId {
        self.source
    }

    pub fn target(&self) -> PortalId {
        self.target
    }

    pub fn render_target(&self) -> &T {
        &self.render_target
    }

    pub fn extent(&self) -> RenderTargetExtent {
        self.extent
    }

    pub fn projector(&self) -> &ProjectorCameraState {
        &self.projector
    }

    pub(crate) fn projector_mut(&mut self) -> &mut ProjectorCameraState {
        &mut self.projector
    }

    pub fn involves(&self, portal: PortalId) -> bool {
        self.source == portal || self.target == portal
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortalEvent {
    Activated(PortalId),
    Deactivated(PortalId),
    ConnectionEstablished {
        connection: ConnectionId,
        source: PortalId,
        target: PortalId,
    },
    ConnectionTornDown {
        connection: ConnectionId,
        source: PortalId,
        target: PortalId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscriber = Box<dyn FnMut(&PortalEvent) + Send + Sync>;

/// Outcome of an activation. Connections whose render target could not be allocated are not
/// created at all.
#[derive(Debug, Default, PartialEq)]
pub struct ActivationReport {
    pub established: Vec<ConnectionId>,
    pub failed: Vec<(PortalId, PortalId, AllocationError)>,
}

/// Owns portal instances and the connections between the active ones.
pub struct ConnectionLifecycleManager<T> {
    graph: ConnectionGraph,
    policy: RenderTargetPolicy,
    instances: HashMap<PortalId, PortalInstance>,
    /// Active instances per archetype, in activation order.
    active: HashMap<PortalArchetype, Vec<PortalId>>,
    /// Every active instance, in activation order.
    activation_order: Vec<PortalId>,
    /// Connections in creation order.
    connections: Vec<ActiveConnection<T>>,
    /// Position in `connections` of each (source, target) pair.
    by_pair: HashMap<(PortalId, PortalId), usize>,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    next_portal: u64,
    next_connection: u64,
    next_subscription: u64,
}

impl<T> fmt::Debug for ConnectionLifecycleManager<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionLifecycleManager")
            .field("graph", &self.graph)
            .field("policy", &self.policy)
            .field("instances", &self.instances.len())
            .field("connections", &self.connections.len())
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl<T> ConnectionLifecycleManager<T> {
    pub fn new(graph: ConnectionGraph, policy: RenderTargetPolicy) -> Self {
        ConnectionLifecycleManager {
            graph,
            policy,
            instances: HashMap::new(),
            active: HashMap::new(),
            activation_order: Vec::new(),
            connections: Vec::new(),
            by_pair: HashMap::new(),
            subscribers: Vec::new(),
            next_portal: 0,
            next_connection: 0,
            next_subscription: 0,
        }
    }

    pub fn graph(&self) -> &ConnectionGraph {
        &self.graph
    }

    pub fn policy(&self) -> &RenderTargetPolicy {
        &self.policy
    }

    pub fn subscribe(
        &mut self,
        callback: impl FnMut(&PortalEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscribers.push((id, Box::new(callback)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(subscription, _)| *subscription != id);
        self.subscribers.len() != before
    }

    fn emit(&mut self, event: PortalEvent) {
        for (_, subscriber) in &mut self.subscribers {
            subscriber(&event);
        }
    }

    /// Create an inactive instance. `None` creates a template, which can be queried but never
    /// activated.
    pub fn spawn(
        &mut self,
        archetype: Option<PortalArchetype>,
        transform: Transform,
        size: Vec2,
    ) -> Result<PortalId, ValidationError> {
        let id = PortalId(self.next_portal);
        let instance = PortalInstance::new(id, archetype, transform, size)?;
        self.next_portal += 1;
        self.instances.insert(id, instance);
        Ok(id)
    }

    pub fn instance(&self, id: PortalId) -> Option<&PortalInstance> {
        self.instances.get(&id)
    }

    pub fn instances(&self) -> impl Iterator<Item = &PortalInstance> {
        self.instances.values()
    }

    pub fn is_active(&self, id: PortalId) -> bool {
        self.instances.get(&id).map_or(false, PortalInstance::is_active)
    }

    /// Active instances of `archetype`, first activated first.
    pub fn active_instances(&self, archetype: &PortalArchetype) -> &[PortalId] {
        self.active.get(archetype).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn connections(&self) -> &[ActiveConnection<T>] {
        &self.connections
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&ActiveConnection<T>> {
        self.connections.iter().find(|connection| connection.id == id)
    }

    pub fn connection_between(
        &self,
        source: PortalId,
        target: PortalId,
    ) -> Option<&ActiveConnection<T>> {
        self.by_pair
            .get(&(source, target))
            .and_then(|index| self.connections.get(*index))
    }

    /// Every connection along with its two endpoints, for per-frame updates.
    pub(crate) fn connection_views_mut(
        &mut self,
    ) -> impl Iterator<Item = (&PortalInstance, &PortalInstance, &mut ActiveConnection<T>)> + '_
    {
        let instances = &self.instances;
        self.connections.iter_mut().filter_map(move |connection| {
            let source = instances.get(&connection.source)?;
            let target = instances.get(&connection.target)?;
            Some((source, target, connection))
        })
    }

    /// Move an instance. Connections survive relocation, projectors pick up the new pose on the
    /// next tick.
    pub fn relocate(&mut self, id: PortalId, transform: Transform) -> Result<(), ValidationError> {
        let instance = self
            .instances
            .get_mut(&id)
            .ok_or(ValidationError::UnknownPortal(id))?;
        instance.relocate(transform);
        debug!("Relocated {} to {}", id, instance.position());
        Ok(())
    }

    /// Mark an instance active and connect it to every active instance its archetype pairs
    /// with.
    pub fn activate<A>(
        &mut self,
        id: PortalId,
        allocator: &mut A,
    ) -> Result<ActivationReport, ValidationError>
    where
        A: RenderTargetAllocator<Target = T>,
    {
        let instance = self
            .instances
            .get_mut(&id)
            .ok_or(ValidationError::UnknownPortal(id))?;
        let archetype = instance
            .archetype()
            .cloned()
            .ok_or(ValidationError::TemplateInstance(id))?;
        if instance.is_active() {
            return Err(ValidationError::AlreadyActive(id));
        }
        instance.set_active(true);
        self.active.entry(archetype.clone()).or_default().push(id);
        self.activation_order.push(id);
        info!("Activated {} ({})", id, archetype);
        self.emit(PortalEvent::Activated(id));

        let mut report = ActivationReport::default();
        let Some(link) = self.graph.lookup(&archetype).cloned() else {
            return Ok(report);
        };
        let candidates: Vec<PortalId> = self
            .active_instances(&link.paired)
            .iter()
            .copied()
            .filter(|other| *other != id)
            .collect();

        for other in candidates {
            let mut pairs = Vec::with_capacity(2);
            if link.outgoing {
                pairs.push((id, other));
            }
            if link.incoming {
                pairs.push((other, id));
            }
            for (source, target) in pairs {
                if self.connection_between(source, target).is_some() {
                    continue;
                }
                match self.establish(source, target, allocator) {
                    Ok(connection) => report.established.push(connection),
                    Err(err) => {
                        warn!("Could not connect {} to {}: {}", source, target, err);
                        report.failed.push((source, target, err));
                    }
                }
            }
        }

        self.refresh_links();
        Ok(report)
    }

    fn establish<A>(
        &mut self,
        source: PortalId,
        target: PortalId,
        allocator: &mut A,
    ) -> Result<ConnectionId, AllocationError>
    where
        A: RenderTargetAllocator<Target = T>,
    {
        let extent = self
            .policy
            .extent_for(self.instances[&source].aspect_ratio());
        let render_target = allocator.create(extent)?;

        let id = ConnectionId(self.next_connection);
        self.next_connection += 1;
        self.by_pair.insert((source, target), self.connections.len());
        self.connections.push(ActiveConnection {
            id,
            source,
            target,
            render_target,
            extent,
            projector: ProjectorCameraState::default(),
        });
        info!("Connected {} to {} ({}, {})", source, target, id, extent);
        self.emit(PortalEvent::ConnectionEstablished {
            connection: id,
            source,
            target,
        });
        Ok(id)
    }

    /// Mark an instance inactive and tear down every connection it takes part in. Returns the
    /// torn down connections. Deactivating an inactive instance does nothing.
    pub fn deactivate<A>(
        &mut self,
        id: PortalId,
        allocator: &mut A,
    ) -> Result<Vec<ConnectionId>, ValidationError>
    where
        A: RenderTargetAllocator<Target = T>,
    {
        let instance = self
            .instances
            .get_mut(&id)
            .ok_or(ValidationError::UnknownPortal(id))?;
        if !instance.is_active() {
            return Ok(Vec::new());
        }
        instance.set_active(false);
        self.activation_order.retain(|other| *other != id);
        if let Some(archetype) = instance.archetype().cloned() {
            if let Some(active) = self.active.get_mut(&archetype) {
                active.retain(|other| *other != id);
                if active.is_empty() {
                    self.active.remove(&archetype);
                }
            }
        }

        let (torn_down, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.connections)
            .into_iter()
            .partition(|connection| connection.involves(id));
        self.connections = kept;
        self.by_pair = self
            .connections
            .iter()
            .enumerate()
            .map(|(index, connection)| ((connection.source, connection.target), index))
            .collect();

        let mut removed = Vec::with_capacity(torn_down.len());
        for connection in torn_down {
            let ActiveConnection {
                id: connection_id,
                source,
                target,
                render_target,
                ..
            } = connection;
            allocator.destroy(render_target);
            info!("Disconnected {} from {} ({})", source, target, connection_id);
            self.emit(PortalEvent::ConnectionTornDown {
                connection: connection_id,
                source,
                target,
            });
            removed.push(connection_id);
        }

        self.refresh_links();
        info!("Deactivated {}", id);
        self.emit(PortalEvent::Deactivated(id));
        Ok(removed)
    }

    /// Deactivate and forget an instance.
    pub fn despawn<A>(
        &mut self,
        id: PortalId,
        allocator: &mut A,
    ) -> Result<PortalInstance, ValidationError>
    where
        A: RenderTargetAllocator<Target = T>,
    {
        self.deactivate(id, allocator)?;
        self.instances
            .remove(&id)
            .ok_or(ValidationError::UnknownPortal(id))
    }

    /// Deactivate every instance, first activated first. Instances are kept.
    pub fn clear<A>(&mut self, allocator: &mut A)
    where
        A: RenderTargetAllocator<Target = T>,
    {
        for id in self.activation_order.clone() {
            if let Err(err) = self.deactivate(id, allocator) {
                warn!("Failed to deactivate {}: {}", id, err);
            }
        }
    }

    /// Point every instance at the target of its oldest outgoing connection.
    fn refresh_links(&mut self) {
        let mut shows: HashMap<PortalId, PortalId> = HashMap::new();
        for connection in &self.connections {
            shows.entry(connection.source).or_insert(connection.target);
        }
        for (id, instance) in &mut self.instances {
            match shows.get(id) {
                Some(target) => {
                    if instance.connected() != Some(*target) {
                        if let Err(err) = instance.connect(Some(*target)) {
                            warn!("Invalid link for {}: {}", id, err);
                        }
                    }
                }
                None => {
                    instance.disconnect();
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{
        collections::HashSet,
        sync::{Arc, Mutex},
    };

    use bevy::prelude::{Transform, Vec2};

    use super::*;
    use crate::portal::ConnectionRule;

    /// Hands out numbered targets and remembers which ones are alive.
    #[derive(Debug, Default)]
    pub(crate) struct CountingAllocator {
        pub next: u32,
        pub alive: HashSet<u32>,
        pub freed: Vec<u32>,
        pub fail_next: bool,
    }

    impl RenderTargetAllocator for CountingAllocator {
        type Target = u32;

        fn create(&mut self, extent: RenderTargetExtent) -> Result<u32, AllocationError> {
            if self.fail_next {
                self.fail_next = false;
                return Err(AllocationError {
                    extent,
                    reason: "out of memory".to_string(),
                });
            }
            let target = self.next;
            self.next += 1;
            self.alive.insert(target);
            Ok(target)
        }

        fn destroy(&mut self, target: u32) {
            assert!(self.alive.remove(&target), "target {target} freed twice");
            self.freed.push(target);
        }
    }

    fn manager(rules: &[ConnectionRule]) -> ConnectionLifecycleManager<u32> {
        ConnectionLifecycleManager::new(
            ConnectionGraph::build(rules).unwrap(),
            RenderTargetPolicy::default(),
        )
    }

    fn spawn(manager: &mut ConnectionLifecycleManager<u32>, archetype: &str) -> PortalId {
        manager
            .spawn(
                Some(PortalArchetype::new(archetype)),
                Transform::IDENTITY,
                Vec2::new(2., 1.),
            )
            .unwrap()
    }

    fn pairs(manager: &ConnectionLifecycleManager<u32>) -> Vec<(PortalId, PortalId)> {
        manager
            .connections()
            .iter()
            .map(|c| (c.source(), c.target()))
            .collect()
    }

    #[test]
    fn two_way_rule_yields_one_connection_per_direction() {
        let mut manager = manager(&[ConnectionRule::two_way("a", "b")]);
        let mut allocator = CountingAllocator::default();
        let a1 = spawn(&mut manager, "a");
        let b1 = spawn(&mut manager, "b");

        let report = manager.activate(a1, &mut allocator).unwrap();
        assert!(report.established.is_empty());
        let report = manager.activate(b1, &mut allocator).unwrap();
        assert_eq!(report.established.len(), 2);

        assert_eq!(pairs(&manager), vec![(b1, a1), (a1, b1)]);
        assert!(manager
            .connections()
            .iter()
            .all(|c| c.extent()
                == RenderTargetExtent {
                    width: 1024,
                    height: 512
                }));
        let targets: HashSet<u32> = manager
            .connections()
            .iter()
            .map(|c| *c.render_target())
            .collect();
        assert_eq!(targets.len(), 2);
        assert_eq!(manager.instance(a1).unwrap().connected(), Some(b1));
        assert_eq!(manager.instance(b1).unwrap().connected(), Some(a1));
    }

    #[test]
    fn one_way_rule_connects_regardless_of_activation_order() {
        let mut manager = manager(&[ConnectionRule::one_way("camera", "screen")]);
        let mut allocator = CountingAllocator::default();
        let screen = spawn(&mut manager, "screen");
        let camera = spawn(&mut manager, "camera");

        manager.activate(screen, &mut allocator).unwrap();
        manager.activate(camera, &mut allocator).unwrap();
        assert_eq!(pairs(&manager), vec![(camera, screen)]);
        assert!(manager.instance(camera).unwrap().is_open());
        assert!(!manager.instance(screen).unwrap().is_open());
    }

    #[test]
    fn many_to_many_matching_follows_activation_order() {
        let mut manager = manager(&[ConnectionRule::two_way("a", "b")]);
        let mut allocator = CountingAllocator::default();
        let a1 = spawn(&mut manager, "a");
        let a2 = spawn(&mut manager, "a");
        let b1 = spawn(&mut manager, "b");
        manager.activate(a2, &mut allocator).unwrap();
        manager.activate(a1, &mut allocator).unwrap();
        manager.activate(b1, &mut allocator).unwrap();

        assert_eq!(
            pairs(&manager),
            vec![(b1, a2), (a2, b1), (b1, a1), (a1, b1)]
        );
        // b1 shows the first portal it was connected to.
        assert_eq!(manager.instance(b1).unwrap().connected(), Some(a2));
    }

    #[test]
    fn deactivation_frees_exactly_the_affected_targets() {
        let mut manager = manager(&[ConnectionRule::two_way("a", "b")]);
        let mut allocator = CountingAllocator::default();
        let a1 = spawn(&mut manager, "a");
        let a2 = spawn(&mut manager, "a");
        let b1 = spawn(&mut manager, "b");
        for id in [a1, a2, b1] {
            manager.activate(id, &mut allocator).unwrap();
        }
        let a1_targets: HashSet<u32> = manager
            .connections()
            .iter()
            .filter(|c| c.involves(a1))
            .map(|c| *c.render_target())
            .collect();

        let removed = manager.deactivate(a1, &mut allocator).unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(allocator.freed.iter().copied().collect::<HashSet<_>>(), a1_targets);
        assert_eq!(pairs(&manager), vec![(b1, a2), (a2, b1)]);
        assert!(manager.connection_between(a1, b1).is_none());
        for (source, target) in [(b1, a2), (a2, b1)] {
            let connection = manager.connection_between(source, target).unwrap();
            assert_eq!((connection.source(), connection.target()), (source, target));
        }
        assert_eq!(allocator.alive.len(), 2);
        assert!(!manager.instance(a1).unwrap().is_open());

        // Deactivating twice is a no-op.
        assert!(manager.deactivate(a1, &mut allocator).unwrap().is_empty());
        assert_eq!(allocator.freed.len(), 2);
    }

    #[test]
    fn reactivation_allocates_fresh_targets() {
        let mut manager = manager(&[ConnectionRule::two_way("a", "b")]);
        let mut allocator = CountingAllocator::default();
        let a1 = spawn(&mut manager, "a");
        let b1 = spawn(&mut manager, "b");
        manager.activate(a1, &mut allocator).unwrap();
        manager.activate(b1, &mut allocator).unwrap();
        manager.despawn(a1, &mut allocator).unwrap();
        assert!(manager.instance(a1).is_none());

        let fresh = spawn(&mut manager, "a");
        assert_ne!(fresh, a1);
        manager.activate(fresh, &mut allocator).unwrap();
        let targets: Vec<u32> = manager
            .connections()
            .iter()
            .map(|c| *c.render_target())
            .collect();
        assert_eq!(targets, vec![2, 3]);
        assert_eq!(allocator.alive.len(), 2);
    }

    #[test]
    fn allocation_failure_only_drops_that_connection() {
        let mut manager = manager(&[ConnectionRule::two_way("a", "b")]);
        let mut allocator = CountingAllocator::default();
        let a1 = spawn(&mut manager, "a");
        let b1 = spawn(&mut manager, "b");
        manager.activate(a1, &mut allocator).unwrap();

        allocator.fail_next = true;
        let report = manager.activate(b1, &mut allocator).unwrap();
        assert_eq!(report.established.len(), 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!((report.failed[0].0, report.failed[0].1), (b1, a1));
        assert_eq!(pairs(&manager), vec![(a1, b1)]);
        assert_eq!(allocator.alive.len(), 1);
    }

    #[test]
    fn invalid_activations_are_rejected() {
        let mut manager = manager(&[ConnectionRule::two_way("a", "b")]);
        let mut allocator = CountingAllocator::default();
        let template = manager
            .spawn(None, Transform::IDENTITY, Vec2::ONE)
            .unwrap();
        assert!(manager.instance(template).unwrap().is_template());
        assert_eq!(
            manager.activate(template, &mut allocator),
            Err(ValidationError::TemplateInstance(template))
        );

        let a1 = spawn(&mut manager, "a");
        manager.activate(a1, &mut allocator).unwrap();
        assert_eq!(
            manager.activate(a1, &mut allocator),
            Err(ValidationError::AlreadyActive(a1))
        );
        assert_eq!(
            manager.activate(PortalId(99), &mut allocator),
            Err(ValidationError::UnknownPortal(PortalId(99)))
        );
    }

    #[test]
    fn self_paired_archetype_never_connects_an_instance_to_itself() {
        let mut manager = manager(&[ConnectionRule::two_way("gate", "gate")]);
        let mut allocator = CountingAllocator::default();
        let g1 = spawn(&mut manager, "gate");
        let g2 = spawn(&mut manager, "gate");
        manager.activate(g1, &mut allocator).unwrap();
        assert!(manager.connections().is_empty());
        manager.activate(g2, &mut allocator).unwrap();
        assert_eq!(pairs(&manager), vec![(g2, g1), (g1, g2)]);
    }

    #[test]
    fn subscribers_see_events_in_order() {
        let mut manager = manager(&[ConnectionRule::two_way("a", "b")]);
        let mut allocator = CountingAllocator::default();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let subscription = manager.subscribe(move |event| sink.lock().unwrap().push(*event));

        let a1 = spawn(&mut manager, "a");
        let b1 = spawn(&mut manager, "b");
        manager.activate(a1, &mut allocator).unwrap();
        manager.activate(b1, &mut allocator).unwrap();
        manager.deactivate(a1, &mut allocator).unwrap();

        let kinds: Vec<&str> = events
            .lock()
            .unwrap()
            .iter()
            .map(|event| match event {
                PortalEvent::Activated(_) => "activated",
                PortalEvent::Deactivated(_) => "deactivated",
                PortalEvent::ConnectionEstablished { .. } => "established",
                PortalEvent::ConnectionTornDown { .. } => "torn down",
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                "activated",
                "activated",
                "established",
                "established",
                "torn down",
                "torn down",
                "deactivated"
            ]
        );

        assert!(manager.unsubscribe(subscription));
        manager.activate(a1, &mut allocator).unwrap();
        assert_eq!(events.lock().unwrap().len(), 7);
    }

    #[test]
    fn clear_tears_down_in_activation_order() {
        let mut manager = manager(&[ConnectionRule::two_way("a", "b")]);
        let mut allocator = CountingAllocator::default();
        let a = spawn(&mut manager, "a");
        let b = spawn(&mut manager, "b");
        manager.activate(b, &mut allocator).unwrap();
        manager.activate(a, &mut allocator).unwrap();
        let connections: HashSet<ConnectionId> =
            manager.connections().iter().map(|c| c.id()).collect();
        assert_eq!(connections.len(), 2);

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        manager.subscribe(move |event| sink.lock().unwrap().push(*event));
        manager.clear(&mut allocator);

        let recorded: Vec<PortalEvent> = events.lock().unwrap().drain(..).collect();
        let deactivated: Vec<PortalId> = recorded
            .iter()
            .filter_map(|event| match event {
                PortalEvent::Deactivated(id) => Some(*id),
                _ => None,
            })
            .collect();
        assert_eq!(deactivated, vec![b, a]);
        let torn_down: Vec<ConnectionId> = recorded
            .iter()
            .filter_map(|event| match event {
                PortalEvent::ConnectionTornDown { connection, .. } => Some(*connection),
                _ => None,
            })
            .collect();
        assert_eq!(torn_down.len(), 2);
        assert_eq!(torn_down.into_iter().collect::<HashSet<_>>(), connections);

        assert!(manager.connections().is_empty());
        assert!(allocator.alive.is_empty());
        assert!(!manager.is_active(a) && !manager.is_active(b));
        assert!(manager.active_instances(&PortalArchetype::new("a")).is_empty());
        // Instances survive and can be activated again.
        assert_eq!(manager.instances().count(), 2);
        manager.activate(a, &mut allocator).unwrap();
        manager.activate(b, &mut allocator).unwrap();
        assert_eq!(pairs(&manager), vec![(b, a), (a, b)]);
    }
}
