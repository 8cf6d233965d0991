use crate::{
    error::TerrainError,
    math::{NodeBounds, TerrainParameters},
    terrain_data::{QuadTree, QuadTreeConfig, RealizeMode, VegetationLayer, VegetationPlacer},
};
use anyhow::{Context, Result};
use bevy::{asset::Asset, math::DVec2, reflect::TypePath};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

/// The configuration of a [`LodTerrain`](crate::plugin::LodTerrain).
///
/// It can be loaded from a `*.terrain.ron` file, either directly or as a Bevy asset.
/// Missing fields fall back to their default value.
#[derive(Asset, TypePath, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct LodTerrainConfig {
    /// The center of the world on the terrain plane.
    pub world_center: [f64; 2],
    /// The side length of the square world.
    pub world_size: f64,
    pub min_node_size: f64,
    pub vertices_per_side: u32,
    pub height_factor: f32,
    pub merge_hysteresis: f64,
    pub realize_mode: RealizeMode,
    pub debug_bounds: bool,
    pub terrain: TerrainParameters,
    pub grass: VegetationLayer,
    pub trees: VegetationLayer,
    /// The seed mixed into all vegetation placements.
    pub vegetation_seed: u64,
}

impl Default for LodTerrainConfig {
    fn default() -> Self {
        let quadtree = QuadTreeConfig::default();
        let placer = VegetationPlacer::default();

        Self {
            world_center: quadtree.bounds.center().to_array(),
            world_size: quadtree.bounds.size(),
            min_node_size: quadtree.min_node_size,
            vertices_per_side: quadtree.vertices_per_side,
            height_factor: quadtree.height_factor,
            merge_hysteresis: quadtree.merge_hysteresis,
            realize_mode: quadtree.realize_mode,
            debug_bounds: quadtree.debug_bounds,
            terrain: TerrainParameters::default(),
            grass: placer.grass,
            trees: placer.trees,
            vegetation_seed: placer.seed,
        }
    }
}

impl LodTerrainConfig {
    pub fn from_ron(source: &str) -> Result<Self> {
        ron::from_str(source).context("Failed to parse the terrain config.")
    }

    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let source = fs::read_to_string(path)
            .with_context(|| format!("Failed to read the terrain config {}.", path.display()))?;

        Self::from_ron(&source)
            .with_context(|| format!("Invalid terrain config {}.", path.display()))
    }

    pub fn to_ron(&self) -> Result<String> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .context("Failed to serialize the terrain config.")
    }

    pub fn quadtree_config(&self) -> QuadTreeConfig {
        QuadTreeConfig {
            bounds: NodeBounds::from_center_size(
                DVec2::from_array(self.world_center),
                self.world_size,
            ),
            min_node_size: self.min_node_size,
            vertices_per_side: self.vertices_per_side,
            height_factor: self.height_factor,
            merge_hysteresis: self.merge_hysteresis,
            realize_mode: self.realize_mode,
            debug_bounds: self.debug_bounds,
        }
    }

    pub fn vegetation_placer(&self) -> VegetationPlacer {
        VegetationPlacer {
            grass: self.grass,
            trees: self.trees,
            seed: self.vegetation_seed,
        }
    }

    /// Validates the configuration and creates the quadtree described by it.
    pub fn build_quadtree(&self) -> Result<QuadTree, TerrainError> {
        QuadTree::new(
            self.quadtree_config(),
            self.terrain,
            self.vegetation_placer(),
        )
    }
}
