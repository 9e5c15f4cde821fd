//! ECS side of the portal system.
//!
//! Entities carrying a [`Portal`] component are mirrored into the [`PortalContextRes`] resource:
//! spawning one activates a portal instance, moving it relocates the instance and despawning it
//! tears its connections down. Every connection gets a projector camera rendering into the
//! connection's image, which the source portal's material then displays.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use bevy::{
    prelude::*,
    render::{
        camera::{CameraProjection, CameraUpdateSystem, RenderTarget},
        render_resource::{
            Extent3d, TextureDescriptor, TextureDimension, TextureFormat, TextureUsages,
        },
        view::{update_frusta, RenderLayers, VisibilitySystems},
    },
    transform::TransformSystem,
};

mod camera_projection;
pub mod placement;

pub use camera_projection::OffAxisProjection;
pub use placement::RapierPlacement;

use crate::{
    config::PortalConfig,
    portal::{
        AllocationError, ConfigError, ConnectionId, PortalArchetype, PortalContext, PortalEvent,
        PortalId, RenderTargetAllocator, RenderTargetExtent, ViewerCamera,
    },
};

/// Render layer of the portal display meshes. Projector cameras do not see it, so portals never
/// show other portals.
pub const PORTAL_LAYER: u8 = 1;

/// Largest image a projector may render to.
const MAX_TEXTURE_DIMENSION: u32 = 8192;

#[derive(Debug)]
pub struct PortalPlugin;

#[derive(Debug, Clone, PartialEq, Eq, Hash, SystemLabel)]
pub enum PortalLabels {
    ApplyChanges,
    ForwardEvents,
    SyncProjectors,
    UpdateDisplays,
}

/// The portal context, shared with the ECS. Lifecycle events are buffered here until they are
/// forwarded as Bevy events.
#[derive(Resource)]
pub struct PortalContextRes {
    context: PortalContext<Handle<Image>>,
    inbox: Arc<Mutex<Vec<PortalEvent>>>,
}

impl PortalContextRes {
    pub fn new(config: PortalConfig) -> Result<Self, ConfigError> {
        let mut context = PortalContext::new(config)?;
        let inbox: Arc<Mutex<Vec<PortalEvent>>> = default();
        let sink = inbox.clone();
        context.manager_mut().subscribe(move |event| {
            sink.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(*event)
        });
        Ok(PortalContextRes { context, inbox })
    }

    fn take_events(&self) -> Vec<PortalEvent> {
        std::mem::take(&mut *self.inbox.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl std::ops::Deref for PortalContextRes {
    type Target = PortalContext<Handle<Image>>;

    fn deref(&self) -> &Self::Target {
        &self.context
    }
}

impl std::ops::DerefMut for PortalContextRes {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.context
    }
}

/// A portal in the world. Its pose is the entity's `Transform`, its size comes from the
/// archetype configuration.
#[derive(Debug, Clone, Component)]
pub struct Portal {
    pub archetype: PortalArchetype,
    /// Color shown while the portal has nothing to display.
    pub closed_color: Color,
}

/// Instance backing a portal entity, inserted once the portal is registered.
#[derive(Debug, Clone, Copy, Component)]
pub struct PortalHandle(pub PortalId);

/// Marks the camera portals are seen from. There should be only one.
#[derive(Debug, Default, Clone, Copy, Component, Reflect)]
#[reflect(Component)]
pub struct PortalViewer;

#[derive(Debug, Clone, Copy, Component)]
pub struct ProjectorCamera {
    pub connection: ConnectionId,
}

#[derive(Debug, Default, Resource)]
pub struct PortalEntities {
    portals: HashMap<Entity, PortalId>,
    projectors: HashMap<ConnectionId, Entity>,
}

impl PortalEntities {
    pub fn portal(&self, entity: Entity) -> Option<PortalId> {
        self.portals.get(&entity).copied()
    }

    pub fn projector(&self, connection: ConnectionId) -> Option<Entity> {
        self.projectors.get(&connection).copied()
    }
}

/// Display meshes, one quad per configured archetype.
#[derive(Debug, Default, Resource)]
pub struct PortalAssets {
    meshes: HashMap<PortalArchetype, Handle<Mesh>>,
}

impl PortalAssets {
    pub fn mesh(&self, archetype: &PortalArchetype) -> Option<Handle<Mesh>> {
        self.meshes.get(archetype).cloned()
    }
}

#[derive(Bundle)]
pub struct PortalBundle {
    #[bundle]
    pub mesh_bundle: PbrBundle,
    pub portal: Portal,
    pub render_layers: RenderLayers,
}

impl PortalBundle {
    pub fn new(
        portal: Portal,
        transform: Transform,
        mesh: Handle<Mesh>,
        materials: &mut Assets<StandardMaterial>,
    ) -> Self {
        PortalBundle {
            mesh_bundle: PbrBundle {
                mesh,
                material: materials.add(portal_material(portal.closed_color)),
                transform,
                ..default()
            },
            portal,
            render_layers: RenderLayers::layer(PORTAL_LAYER),
        }
    }
}

/// Material of a closed portal. Both faces are drawn since viewers stand on the back side of
/// the quad.
pub fn portal_material(color: Color) -> StandardMaterial {
    StandardMaterial {
        base_color: color,
        unlit: true,
        cull_mode: None,
        ..default()
    }
}

/// Allocates projector render targets as image assets.
pub struct ImageAllocator<'a> {
    images: &'a mut Assets<Image>,
}

impl<'a> ImageAllocator<'a> {
    pub fn new(images: &'a mut Assets<Image>) -> Self {
        ImageAllocator { images }
    }
}

impl RenderTargetAllocator for ImageAllocator<'_> {
    type Target = Handle<Image>;

    fn create(&mut self, extent: RenderTargetExtent) -> Result<Handle<Image>, AllocationError> {
        if extent.width == 0
            || extent.height == 0
            || extent.width > MAX_TEXTURE_DIMENSION
            || extent.height > MAX_TEXTURE_DIMENSION
        {
            return Err(AllocationError {
                extent,
                reason: format!("dimensions must be within 1..={MAX_TEXTURE_DIMENSION}"),
            });
        }
        let size = Extent3d {
            width: extent.width,
            height: extent.height,
            ..default()
        };
        let mut image = Image {
            texture_descriptor: TextureDescriptor {
                label: Some("portal_render_target"),
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: TextureDimension::D2,
                format: TextureFormat::Bgra8UnormSrgb,
                usage: TextureUsages::TEXTURE_BINDING
                    | TextureUsages::COPY_DST
                    | TextureUsages::RENDER_ATTACHMENT,
            },
            ..default()
        };
        // Fill the image data with zeroes.
        image.resize(size);
        Ok(self.images.add(image))
    }

    fn destroy(&mut self, target: Handle<Image>) {
        self.images.remove(&target);
    }
}

impl Plugin for PortalPlugin {
    fn build(&self, app: &mut App) {
        app.add_event::<PortalEvent>()
            .init_resource::<PortalEntities>()
            .register_type::<PortalViewer>()
            .register_type::<OffAxisProjection>()
            .add_plugin(bevy::render::camera::CameraProjectionPlugin::<OffAxisProjection>::default())
            .add_startup_system(load_portal_assets)
            .add_system(prepare_viewer)
            .add_system_to_stage(
                CoreStage::PostUpdate,
                apply_portal_changes
                    .label(PortalLabels::ApplyChanges)
                    .before(TransformSystem::TransformPropagate),
            )
            .add_system_to_stage(
                CoreStage::PostUpdate,
                forward_portal_events
                    .label(PortalLabels::ForwardEvents)
                    .after(PortalLabels::ApplyChanges),
            )
            .add_system_to_stage(
                CoreStage::PostUpdate,
                sync_projectors
                    .label(PortalLabels::SyncProjectors)
                    .after(PortalLabels::ForwardEvents)
                    .after(TransformSystem::TransformPropagate)
                    .before(CameraUpdateSystem),
            )
            .add_system_to_stage(
                CoreStage::PostUpdate,
                update_portal_displays
                    .label(PortalLabels::UpdateDisplays)
                    .after(PortalLabels::SyncProjectors),
            )
            .add_system_to_stage(
                CoreStage::PostUpdate,
                update_frusta::<OffAxisProjection>
                    .after(PortalLabels::SyncProjectors)
                    .before(VisibilitySystems::CheckVisibility),
            );
    }
}

fn load_portal_assets(
    mut commands: Commands,
    context: Res<PortalContextRes>,
    mut meshes: ResMut<Assets<Mesh>>,
) {
    let meshes = context
        .config()
        .archetypes
        .iter()
        .map(|archetype| {
            let mesh = meshes.add(
                shape::Quad {
                    size: archetype.size(),
                    flip: false,
                }
                .into(),
            );
            (archetype.name.clone(), mesh)
        })
        .collect();
    commands.insert_resource(PortalAssets { meshes });
}

/// Let the viewer camera see the portal layer.
fn prepare_viewer(mut commands: Commands, viewers: Query<Entity, Added<PortalViewer>>) {
    for entity in &viewers {
        info!("Using {:?} as the portal viewer", entity);
        commands
            .entity(entity)
            .insert(RenderLayers::default().with(PORTAL_LAYER));
    }
}

/// Mirror portal entity changes into the context, then apply the changes queued since the last
/// frame.
fn apply_portal_changes(
    mut commands: Commands,
    mut context: ResMut<PortalContextRes>,
    mut entities: ResMut<PortalEntities>,
    mut images: ResMut<Assets<Image>>,
    added: Query<(Entity, &Portal, &Transform), Added<Portal>>,
    moved: Query<(&PortalHandle, &Transform), (With<Portal>, Changed<Transform>)>,
    removed: RemovedComponents<Portal>,
) {
    let mut allocator = ImageAllocator::new(&mut images);

    for entity in removed.iter() {
        let Some(portal) = entities.portals.remove(&entity) else {
            continue;
        };
        if let Err(err) = context.manager_mut().despawn(portal, &mut allocator) {
            warn!("Failed to remove {}: {}", portal, err);
        }
        // Only the component was removed, the entity lives on.
        if let Some(mut entity) = commands.get_entity(entity) {
            entity.remove::<PortalHandle>();
        }
    }

    for (handle, transform) in &moved {
        if let Err(err) = context.manager_mut().relocate(handle.0, *transform) {
            warn!("Failed to move {}: {}", handle.0, err);
        }
    }

    for (entity, portal, transform) in &added {
        let id = match context.spawn_from_config(&portal.archetype, *transform) {
            Ok(id) => id,
            Err(err) => {
                warn!("Ignoring portal {:?}: {}", entity, err);
                continue;
            }
        };
        entities.portals.insert(entity, id);
        commands.entity(entity).insert(PortalHandle(id));
        if let Err(err) = context.activate(id, &mut allocator) {
            warn!("Failed to activate {}: {}", id, err);
        }
    }

    context.apply_pending(&mut allocator);
}

/// Spawn and despawn projector cameras, and re-send lifecycle events to the ECS.
fn forward_portal_events(
    mut commands: Commands,
    context: Res<PortalContextRes>,
    mut entities: ResMut<PortalEntities>,
    mut events: EventWriter<PortalEvent>,
) {
    for event in context.take_events() {
        match event {
            PortalEvent::ConnectionEstablished { connection, .. } => {
                // Connections torn down in the same frame have nothing to display.
                let Some(active) = context.manager().connection(connection) else {
                    events.send(event);
                    continue;
                };
                let camera = commands
                    .spawn(Camera3dBundle {
                        camera: Camera {
                            // Render before the viewer.
                            priority: -1 - connection.index() as isize,
                            target: RenderTarget::Image(active.render_target().clone()),
                            is_active: false,
                            ..default()
                        },
                        ..default()
                    })
                    .insert((
                        OffAxisProjection::default(),
                        ProjectorCamera { connection },
                        Name::from(format!("Projector {}", connection)),
                    ))
                    .remove::<Projection>()
                    .id();
                entities.projectors.insert(connection, camera);
            }
            PortalEvent::ConnectionTornDown { connection, .. } => {
                if let Some(camera) = entities.projectors.remove(&connection) {
                    commands.entity(camera).despawn_recursive();
                }
            }
            PortalEvent::Activated(_) | PortalEvent::Deactivated(_) => {}
        }
        events.send(event);
    }
}

/// Move every projector camera to where its connection wants it.
fn sync_projectors(
    mut context: ResMut<PortalContextRes>,
    entities: Res<PortalEntities>,
    viewer_query: Query<(&GlobalTransform, &Projection), With<PortalViewer>>,
    mut projector_query: Query<
        (
            &mut Transform,
            &mut GlobalTransform,
            &mut OffAxisProjection,
            &mut Camera,
        ),
        (With<ProjectorCamera>, Without<PortalViewer>),
    >,
) {
    let Ok((viewer_transform, projection)) = viewer_query.get_single() else {
        return;
    };
    let viewer = ViewerCamera::new(viewer_transform.compute_transform(), projection.far());
    let stats = context.update(&viewer);
    trace!(
        "Updated {} projectors, skipped {}",
        stats.updated,
        stats.skipped
    );

    for connection in context.manager().connections() {
        let Some(entity) = entities.projector(connection.id()) else {
            continue;
        };
        let Ok((mut transform, mut global_transform, mut off_axis, mut camera)) =
            projector_query.get_mut(entity)
        else {
            continue;
        };
        let state = connection.projector();
        if camera.is_active != state.is_updated() {
            camera.is_active = state.is_updated();
        }
        if !state.is_updated() {
            continue;
        }
        *transform = state.transform;
        // Transforms were already propagated this frame.
        *global_transform = GlobalTransform::from(state.transform);
        off_axis.projection = state.frustum.reverse_z_projection_matrix();
        off_axis.far = state.frustum.far;
    }
}

/// Show the projector image on open portals and the closed color on the others.
fn update_portal_displays(
    context: Res<PortalContextRes>,
    portals: Query<(&Portal, &PortalHandle, &Handle<StandardMaterial>)>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    let manager = context.manager();
    for (portal, handle, material_handle) in &portals {
        let texture = manager
            .instance(handle.0)
            .and_then(|instance| instance.connected())
            .and_then(|target| manager.connection_between(handle.0, target))
            .filter(|connection| connection.projector().is_updated())
            .map(|connection| connection.render_target().clone());
        let color = if texture.is_some() {
            Color::WHITE
        } else {
            portal.closed_color
        };

        let Some(material) = materials.get(material_handle) else {
            continue;
        };
        if material.base_color_texture == texture && material.base_color == color {
            continue;
        }
        if let Some(material) = materials.get_mut(material_handle) {
            material.base_color_texture = texture;
            material.base_color = color;
        }
    }
}
