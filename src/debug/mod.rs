//! Contains a debug resource and systems controlling it to visualize the internal state of the
//! quadtrees.
use crate::plugin::LodTerrain;
use bevy::{color::palettes::basic, prelude::*};

/// Adds the terrain debug config and the systems controlling it.
pub struct TerrainDebugPlugin;

impl Plugin for TerrainDebugPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Update, toggle_debug);
    }
}

#[derive(Clone, Resource)]
pub struct DebugTerrain {
    /// Shows the outline of every leaf, colored by its level.
    pub show_bounds: bool,
    /// Hides the whole terrain, while keeping all resources alive.
    pub hide_terrain: bool,
    /// Stops the quadtrees from adapting to the viewer.
    pub freeze: bool,
    /// Logs the statistics of each quadtree, whenever they change.
    pub log_stats: bool,
}

impl Default for DebugTerrain {
    fn default() -> Self {
        Self {
            show_bounds: false,
            hide_terrain: false,
            freeze: false,
            log_stats: true,
        }
    }
}

/// The color of the debug outline of a node at the given level.
pub fn debug_color(level: u32) -> Color {
    match level % 4 {
        0 => basic::YELLOW.into(),
        1 => basic::RED.into(),
        2 => basic::GREEN.into(),
        _ => basic::BLUE.into(),
    }
}

pub fn toggle_debug(input: Res<ButtonInput<KeyCode>>, mut debug_terrain: ResMut<DebugTerrain>) {
    if input.just_pressed(KeyCode::KeyB) {
        debug_terrain.show_bounds = !debug_terrain.show_bounds;
        info!(
            "Toggled the node bounds {}.",
            if debug_terrain.show_bounds { "on" } else { "off" }
        )
    }
    if input.just_pressed(KeyCode::KeyH) {
        debug_terrain.hide_terrain = !debug_terrain.hide_terrain;
        info!(
            "Toggled the terrain {}.",
            if debug_terrain.hide_terrain { "off" } else { "on" }
        )
    }
    if input.just_pressed(KeyCode::KeyF) {
        debug_terrain.freeze = !debug_terrain.freeze;
        info!(
            "{} the quadtrees.",
            if debug_terrain.freeze { "Froze" } else { "Unfroze" }
        )
    }
    if input.just_pressed(KeyCode::KeyI) {
        debug_terrain.log_stats = !debug_terrain.log_stats;
        info!(
            "Toggled the quadtree statistics {}.",
            if debug_terrain.log_stats { "on" } else { "off" }
        )
    }
}

pub(crate) fn log_terrain_stats(
    debug: Res<DebugTerrain>,
    mut terrains: Query<(Entity, &mut LodTerrain)>,
) {
    if !debug.log_stats {
        return;
    }

    for (entity, mut terrain) in &mut terrains {
        let stats = terrain.quadtree.stats();

        if terrain.last_logged_stats == Some(stats) {
            continue;
        }

        // only the structure is compared, counters alone do not warrant a new line
        let structure_changed = terrain.last_logged_stats.map_or(true, |last| {
            (last.node_count, last.leaf_count, last.realized_leaves, last.max_level)
                != (
                    stats.node_count,
                    stats.leaf_count,
                    stats.realized_leaves,
                    stats.max_level,
                )
        });

        if structure_changed {
            info!(
                "Terrain {entity}: {} nodes, {} leaves ({} realized, {} pending), depth {}, {} splits, {} merges, {} failures.",
                stats.node_count,
                stats.leaf_count,
                stats.realized_leaves,
                stats.pending_realizations,
                stats.max_level,
                stats.splits,
                stats.merges,
                stats.realization_failures,
            );
        }

        terrain.last_logged_stats = Some(stats);
    }
}
