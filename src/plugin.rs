use crate::{
    config::LodTerrainConfig,
    debug::{log_terrain_stats, DebugTerrain},
    render::{BevySceneSink, TerrainRenderAssets},
    terrain_data::{QuadTree, QuadTreeStats},
};
use bevy::{math::DVec2, prelude::*};
use bevy_common_assets::ron::RonAssetPlugin;

/// Marks the entity, whose position drives the level of detail of all terrains.
#[derive(Component, Default)]
#[require(Transform)]
pub struct TerrainViewer;

/// The configuration asset, from which a [`LodTerrain`] is created once it is loaded.
#[derive(Component, Clone, Debug)]
#[require(Transform, Visibility)]
pub struct LodTerrainSource(pub Handle<LodTerrainConfig>);

/// A terrain entity, whose leaves are spawned as its children.
#[derive(Component)]
pub struct LodTerrain {
    pub quadtree: QuadTree,
    /// The render height of the node outlines, which is the maximum terrain elevation.
    pub outline_height: f32,
    pub(crate) last_logged_stats: Option<QuadTreeStats>,
}

impl LodTerrain {
    pub fn new(quadtree: QuadTree) -> Self {
        let outline_height =
            quadtree.height_field().params().height as f32 * quadtree.config().height_factor;

        Self {
            quadtree,
            outline_height,
            last_logged_stats: None,
        }
    }
}

/// The plugin for the level of detail terrain.
pub struct LodTerrainPlugin;

impl Plugin for LodTerrainPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(RonAssetPlugin::<LodTerrainConfig>::new(&["terrain.ron"]))
            .init_resource::<DebugTerrain>()
            .add_systems(
                Update,
                (
                    spawn_lod_terrains,
                    update_lod_terrains,
                    apply_debug_terrain,
                    log_terrain_stats,
                )
                    .chain(),
            );
    }

    fn finish(&self, app: &mut App) {
        app.init_resource::<TerrainRenderAssets>();
    }
}

fn spawn_lod_terrains(
    mut commands: Commands,
    configs: Res<Assets<LodTerrainConfig>>,
    mut debug: ResMut<DebugTerrain>,
    sources: Query<(Entity, &LodTerrainSource), Without<LodTerrain>>,
) {
    for (entity, source) in &sources {
        let Some(config) = configs.get(&source.0) else {
            continue;
        };

        match config.build_quadtree() {
            Ok(quadtree) => {
                info!(
                    "Spawned terrain {entity} of size {} with up to {} levels.",
                    config.world_size,
                    quadtree.config().max_level()
                );

                if config.debug_bounds {
                    debug.show_bounds = true;
                }

                commands.entity(entity).insert(LodTerrain::new(quadtree));
            }
            Err(error) => {
                error!("Invalid configuration of terrain {entity}: {error}");
                commands.entity(entity).remove::<LodTerrainSource>();
            }
        }
    }
}

/// Inserts the viewer position into every quadtree and realizes the leaves.
fn update_lod_terrains(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    assets: Res<TerrainRenderAssets>,
    debug: Res<DebugTerrain>,
    viewers: Query<&GlobalTransform, With<TerrainViewer>>,
    mut terrains: Query<(Entity, &GlobalTransform, &mut LodTerrain)>,
) {
    let Some(viewer) = viewers.iter().next() else {
        return;
    };

    for (entity, transform, mut terrain) in &mut terrains {
        let terrain = &mut *terrain;
        let local_position = transform
            .affine()
            .inverse()
            .transform_point3(viewer.translation());
        let viewer_position = DVec2::new(local_position.x as f64, -local_position.z as f64);

        let mut sink = BevySceneSink::new(
            &mut commands,
            &mut meshes,
            &assets,
            entity,
            terrain.outline_height,
        );

        if let Err(error) = terrain.quadtree.poll_pending(&mut sink) {
            debug!("Some leaves of terrain {entity} could not be attached: {error}");
        }

        if !debug.freeze {
            if let Err(error) = terrain.quadtree.insert(viewer_position, &mut sink) {
                error!("Failed to update the quadtree of terrain {entity}: {error}");
                continue;
            }
        }

        if !debug.hide_terrain {
            if let Err(error) = terrain.quadtree.update_meshes(&mut sink) {
                debug!("Some leaves of terrain {entity} could not be realized: {error}");
            }
        }
    }
}

fn apply_debug_terrain(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    assets: Res<TerrainRenderAssets>,
    debug: Res<DebugTerrain>,
    mut terrains: Query<(Entity, &mut LodTerrain)>,
) {
    for (entity, mut terrain) in &mut terrains {
        let show_bounds = terrain.quadtree.debug_visible() != debug.show_bounds;
        let hide = debug.hide_terrain && !terrain.quadtree.is_hidden();

        if !show_bounds && !hide {
            continue;
        }

        let terrain = &mut *terrain;
        let mut sink = BevySceneSink::new(
            &mut commands,
            &mut meshes,
            &assets,
            entity,
            terrain.outline_height,
        );

        if show_bounds {
            terrain
                .quadtree
                .set_debug_visible(debug.show_bounds, &mut sink);
        }
        if hide {
            terrain.quadtree.hide(&mut sink);
        }
    }
}
