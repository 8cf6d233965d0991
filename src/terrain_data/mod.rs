//! This module contains the quadtree, which decides at which level of detail each part of the
//! terrain is rendered, and the builders for the resources of its leaves.
//!
//! # Explanation
//! The [`QuadTree`] covers the square world with a single root node.
//! Every tick the viewer position is inserted into the tree, which splits nodes close to the
//! viewer into four children and merges nodes far away from it.
//! Only leaves own render resources: a terrain mesh built by a [`MeshBuilder`], vegetation
//! scattered by the [`VegetationPlacer`] (for the most detailed leaves) and a debug outline.
//!
//! Resources are never created or destroyed behind the back of the caller. Every operation that
//! does so receives a [`ResourceSink`], which is either the Bevy scene or a [`MemorySink`].

mod mesh_builder;
mod quadtree;
mod quadtree_node;
mod realize;
mod resources;
mod vegetation;

pub use mesh_builder::{GridMesh, GridMeshBuilder, MeshBuilder};
pub use quadtree::{QuadTree, QuadTreeConfig, QuadTreeStats, RealizeMode};
pub use quadtree_node::{NodeChildren, NodeId, NodeState, Nodes, QuadNode};
pub use realize::{LeafPayload, RealizeContext};
pub use resources::{
    Disposable, MemoryResource, MemorySink, NodeResources, RealizedResource, ResourceKind,
    ResourceSink, TerrainResource,
};
pub use vegetation::{NoiseMask, Placement, VegetationLayer, VegetationPlacer};

pub(crate) use realize::can_split;
