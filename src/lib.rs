//! This crate renders explorable terrains of effectively unbounded extent with Bevy.
//! The terrain is generated procedurally from fractal noise and its level of detail
//! adapts to the position of the viewer.
//!
//! # Background
//! The world is covered by a single square quadtree.
//! Nodes close to the viewer are split into four children, while nodes far away are merged again,
//! so the resolution of the terrain is high near the viewer and low in the distance.
//! Each leaf of the tree owns the render resources of the area it covers:
//! a grid mesh sampled from the [`HeightField`](math::HeightField), a debug outline and, for the most
//! detailed leaves, grass and trees scattered by the [`VegetationPlacer`](terrain_data::VegetationPlacer).
//! See the [`terrain_data`] module for more information.
//!
//! The quadtree itself does not depend on the Bevy scene. All resources are created and destroyed
//! through a [`ResourceSink`](terrain_data::ResourceSink), which is either the
//! [`BevySceneSink`](render::BevySceneSink) used by the [`LodTerrainPlugin`](plugin::LodTerrainPlugin)
//! or the headless [`MemorySink`](terrain_data::MemorySink).

pub mod config;
pub mod debug;
pub mod error;
pub mod math;
pub mod plugin;
pub mod render;
pub mod terrain_data;
pub mod util;

pub mod prelude {
    pub use crate::{
        config::LodTerrainConfig,
        debug::{DebugTerrain, TerrainDebugPlugin},
        error::TerrainError,
        math::{HeightField, NodeBounds, NodeCoordinate, Quadrant, TerrainParameters},
        plugin::{LodTerrain, LodTerrainPlugin, LodTerrainSource, TerrainViewer},
        render::{BevySceneSink, InstanceAssets, TerrainRenderAssets},
        terrain_data::{
            Disposable, MemorySink, QuadTree, QuadTreeConfig, QuadTreeStats, RealizeMode,
            ResourceSink, VegetationLayer, VegetationPlacer,
        },
    };
}
