use bevy::{
    log::debug,
    prelude::{Mat4, Transform},
};

use super::{
    projector::{Frustum, ProjectorView, ViewProjector},
    ConnectionLifecycleManager,
};

/// The camera looking at the portals, sampled once per tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewerCamera {
    pub transform: Transform,
    pub far: f32,
}

impl ViewerCamera {
    pub fn new(transform: Transform, far: f32) -> Self {
        ViewerCamera { transform, far }
    }
}

/// Where the projector of one connection sits and how it projects. Stays at its defaults until
/// the first successful update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectorCameraState {
    pub transform: Transform,
    pub frustum: Frustum,
    pub projection: Mat4,
    last_update: Option<u64>,
}

impl Default for ProjectorCameraState {
    fn default() -> Self {
        let frustum = Frustum::default();
        ProjectorCameraState {
            transform: Transform::IDENTITY,
            frustum,
            projection: frustum.projection_matrix(),
            last_update: None,
        }
    }
}

impl ProjectorCameraState {
    /// Whether the projector has been computed at least once and is worth rendering.
    pub fn is_updated(&self) -> bool {
        self.last_update.is_some()
    }

    pub fn last_update(&self) -> Option<u64> {
        self.last_update
    }

    fn apply(&mut self, view: ProjectorView, tick: u64) {
        self.transform = view.transform;
        self.frustum = view.frustum;
        self.projection = view.projection;
        self.last_update = Some(tick);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub updated: usize,
    pub skipped: usize,
}

/// Recomputes every projector from the current viewer pose.
#[derive(Debug, Default)]
pub struct FrameUpdater {
    tick: u64,
}

impl FrameUpdater {
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn update<T>(
        &mut self,
        manager: &mut ConnectionLifecycleManager<T>,
        viewer: &ViewerCamera,
    ) -> FrameStats {
        self.tick += 1;
        let tick = self.tick;
        let mut stats = FrameStats::default();
        let position = viewer.transform.translation;

        for (source, target, connection) in manager.connection_views_mut() {
            match ViewProjector::project(position, viewer.far, source, target) {
                Ok(view) => {
                    connection.projector_mut().apply(view, tick);
                    stats.updated += 1;
                }
                Err(err) => {
                    debug!("Skipping {} this tick: {}", connection.id(), err);
                    stats.skipped += 1;
                }
            }
        }
        stats
    }
}
