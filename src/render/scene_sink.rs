use crate::{
    debug::debug_color,
    error::TerrainError,
    math::{NodeBounds, NodeCoordinate},
    terrain_data::{GridMesh, Placement, ResourceKind, ResourceSink, TerrainResource},
};
use bevy::{
    color::ColorToComponents,
    math::DVec2,
    prelude::*,
    render::{mesh::PrimitiveTopology, render_asset::RenderAssetUsages},
};

/// The mesh and material shared by all instances of one kind of vegetation.
#[derive(Clone, Debug)]
pub struct InstanceAssets {
    pub mesh: Handle<Mesh>,
    pub material: Handle<StandardMaterial>,
}

/// The render assets used for all terrains.
///
/// Vegetation without instance assets is still tracked, but nothing is drawn for it.
#[derive(Resource, Clone, Debug)]
pub struct TerrainRenderAssets {
    pub terrain_material: Handle<StandardMaterial>,
    pub grass: Option<InstanceAssets>,
    pub trees: Option<InstanceAssets>,
    /// An unlit material, which displays the vertex colors of the node outlines.
    pub debug_material: Handle<StandardMaterial>,
}

impl FromWorld for TerrainRenderAssets {
    fn from_world(world: &mut World) -> Self {
        let mut meshes = world.resource_mut::<Assets<Mesh>>();
        let grass_mesh = meshes.add(Cuboid::new(0.15, 0.8, 0.15));
        let tree_mesh = meshes.add(Cone {
            radius: 1.2,
            height: 5.0,
        });

        let mut materials = world.resource_mut::<Assets<StandardMaterial>>();

        Self {
            terrain_material: materials.add(StandardMaterial {
                base_color: Color::srgb(0.36, 0.42, 0.27),
                perceptual_roughness: 0.95,
                ..default()
            }),
            grass: Some(InstanceAssets {
                mesh: grass_mesh,
                material: materials.add(Color::srgb(0.32, 0.58, 0.2)),
            }),
            trees: Some(InstanceAssets {
                mesh: tree_mesh,
                material: materials.add(Color::srgb(0.13, 0.33, 0.15)),
            }),
            debug_material: materials.add(StandardMaterial {
                unlit: true,
                ..default()
            }),
        }
    }
}

/// Marks an entity spawned for a resource of a quadtree leaf.
#[derive(Component, Clone, Copy, Debug, PartialEq, Eq)]
pub struct TerrainNodeResource {
    pub coordinate: NodeCoordinate,
    pub kind: ResourceKind,
}

/// A [`ResourceSink`], which spawns the resources as children of the terrain entity.
///
/// The sink only queues commands, it is created anew for every system run.
pub struct BevySceneSink<'a, 'w, 's> {
    commands: &'a mut Commands<'w, 's>,
    meshes: &'a mut Assets<Mesh>,
    assets: &'a TerrainRenderAssets,
    terrain: Entity,
    outline_height: f32,
}

impl<'a, 'w, 's> BevySceneSink<'a, 'w, 's> {
    pub fn new(
        commands: &'a mut Commands<'w, 's>,
        meshes: &'a mut Assets<Mesh>,
        assets: &'a TerrainRenderAssets,
        terrain: Entity,
        outline_height: f32,
    ) -> Self {
        Self {
            commands,
            meshes,
            assets,
            terrain,
            outline_height,
        }
    }

    fn spawn_terrain_mesh(
        &mut self,
        coordinate: NodeCoordinate,
        center: DVec2,
        mesh: GridMesh,
    ) -> Result<Entity, TerrainError> {
        if mesh.vertex_count() == 0 || mesh.indices.is_empty() {
            return Err(TerrainError::ResourceRealizationFailure {
                coordinate,
                kind: ResourceKind::TerrainMesh,
                reason: "the terrain mesh is empty".into(),
            });
        }

        let entity = self
            .commands
            .spawn((
                Name::new(format!("Terrain Mesh {coordinate}")),
                TerrainNodeResource {
                    coordinate,
                    kind: ResourceKind::TerrainMesh,
                },
                Mesh3d(self.meshes.add(mesh)),
                MeshMaterial3d(self.assets.terrain_material.clone()),
                Transform::from_translation(render_position(center, 0.0)),
                Visibility::Inherited,
            ))
            .id();

        Ok(entity)
    }

    fn spawn_vegetation(
        &mut self,
        coordinate: NodeCoordinate,
        kind: ResourceKind,
        placements: Vec<Placement>,
    ) -> Entity {
        let instance_assets = match kind {
            ResourceKind::Grass => self.assets.grass.clone(),
            _ => self.assets.trees.clone(),
        };

        let mut batch = self.commands.spawn((
            Name::new(format!("{kind:?} {coordinate}")),
            TerrainNodeResource { coordinate, kind },
            Transform::IDENTITY,
            Visibility::Inherited,
        ));

        if let Some(InstanceAssets { mesh, material }) = instance_assets {
            batch.with_children(|parent| {
                for placement in placements {
                    parent.spawn((
                        Mesh3d(mesh.clone()),
                        MeshMaterial3d(material.clone()),
                        Transform::from_translation(render_position(
                            placement.position,
                            placement.height,
                        ))
                        .with_rotation(Quat::from_rotation_y(placement.rotation))
                        .with_scale(Vec3::splat(placement.scale)),
                    ));
                }
            });
        }

        batch.id()
    }

    fn spawn_outline(&mut self, coordinate: NodeCoordinate, bounds: NodeBounds) -> Entity {
        let mesh = outline_mesh(&bounds, self.outline_height, debug_color(coordinate.level));

        self.commands
            .spawn((
                Name::new(format!("Node Outline {coordinate}")),
                TerrainNodeResource {
                    coordinate,
                    kind: ResourceKind::DebugVisual,
                },
                Mesh3d(self.meshes.add(mesh)),
                MeshMaterial3d(self.assets.debug_material.clone()),
                Transform::from_translation(render_position(bounds.center(), 0.0)),
                Visibility::Inherited,
            ))
            .id()
    }
}

impl ResourceSink for BevySceneSink<'_, '_, '_> {
    fn add(&mut self, resource: TerrainResource) -> Result<Entity, TerrainError> {
        let kind = resource.kind();

        let entity = match resource {
            TerrainResource::TerrainMesh {
                coordinate,
                center,
                mesh,
            } => self.spawn_terrain_mesh(coordinate, center, mesh)?,
            TerrainResource::Grass {
                coordinate,
                placements,
            }
            | TerrainResource::Trees {
                coordinate,
                placements,
            } => self.spawn_vegetation(coordinate, kind, placements),
            TerrainResource::DebugVisual { coordinate, bounds } => {
                self.spawn_outline(coordinate, bounds)
            }
        };

        self.commands.entity(self.terrain).add_child(entity);

        Ok(entity)
    }

    fn remove(&mut self, handle: Entity) {
        self.commands.entity(handle).despawn_recursive();
    }

    fn set_visible(&mut self, handle: Entity, visible: bool) {
        let visibility = if visible {
            Visibility::Inherited
        } else {
            Visibility::Hidden
        };

        self.commands.entity(handle).insert(visibility);
    }
}

/// Maps a point of the terrain plane at the given height into the render frame.
#[inline]
fn render_position(position: DVec2, height: f32) -> Vec3 {
    Vec3::new(position.x as f32, height, -position.y as f32)
}

/// A closed line loop around the bounds, relative to their center.
fn outline_mesh(bounds: &NodeBounds, height: f32, color: Color) -> Mesh {
    let half = DVec2::new(bounds.size(), bounds.height()) * 0.5;

    let positions: Vec<[f32; 3]> = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0), (-1.0, -1.0)]
        .into_iter()
        .map(|(x, y)| render_position(DVec2::new(x, y) * half, height).to_array())
        .collect();
    let colors = vec![color.to_linear().to_f32_array(); positions.len()];

    Mesh::new(PrimitiveTopology::LineStrip, RenderAssetUsages::default())
        .with_inserted_attribute(Mesh::ATTRIBUTE_POSITION, positions)
        .with_inserted_attribute(Mesh::ATTRIBUTE_COLOR, colors)
}
