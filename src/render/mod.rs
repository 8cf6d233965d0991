//! Turns the resources of the quadtree leaves into entities of the Bevy scene.
//!
//! Every resource handed to the [`BevySceneSink`] is spawned as a child of its terrain entity.
//! The terrain is drawn with the materials and instance meshes of the [`TerrainRenderAssets`],
//! which the host application may replace before the first terrain is spawned.

mod scene_sink;

pub use scene_sink::{BevySceneSink, InstanceAssets, TerrainNodeResource, TerrainRenderAssets};
