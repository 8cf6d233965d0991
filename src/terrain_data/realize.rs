use crate::{
    error::TerrainError,
    math::{HeightField, NodeBounds, NodeCoordinate},
    terrain_data::{
        Disposable, GridMesh, MeshBuilder, NodeResources, Placement, RealizedResource,
        ResourceKind, ResourceSink, TerrainResource, VegetationPlacer,
    },
};
use std::sync::Arc;

/// Whether a node of the given size may still be split.
///
/// A node is only split if its children are at least `min_node_size` wide,
/// so no leaf ever ends up below the subdivision floor.
#[inline]
pub(crate) fn can_split(size: f64, min_node_size: f64) -> bool {
    size * 0.5 >= min_node_size
}

/// Everything required to build the resources of a leaf.
///
/// The context is cheap to clone and can be moved to worker threads.
#[derive(Clone)]
pub struct RealizeContext {
    pub field: Arc<HeightField>,
    pub mesh_builder: Arc<dyn MeshBuilder>,
    pub placer: Arc<VegetationPlacer>,
    pub vertices_per_side: u32,
    pub height_factor: f32,
    pub min_node_size: f64,
    /// Whether newly realized debug visuals are shown.
    pub debug_visible: bool,
}

impl RealizeContext {
    /// Leaves at the subdivision floor are detailed and receive vegetation.
    #[inline]
    pub fn is_detailed(&self, bounds: &NodeBounds) -> bool {
        !can_split(bounds.size(), self.min_node_size)
    }

    /// Builds the CPU side resources of a leaf.
    ///
    /// This does not touch the tree or the scene, so it may run on any thread.
    pub fn build(
        &self,
        coordinate: NodeCoordinate,
        bounds: NodeBounds,
    ) -> Result<LeafPayload, TerrainError> {
        let mesh = self
            .mesh_builder
            .build_grid(&bounds, self.vertices_per_side, &self.field)
            .map_err(|error| error.into_realization_failure(coordinate, ResourceKind::TerrainMesh))?;

        let (grass, trees) = if self.is_detailed(&bounds) {
            (
                Some(self.placer.place_grass(
                    coordinate,
                    bounds,
                    &self.field,
                    self.height_factor,
                )),
                Some(self.placer.place_trees(
                    coordinate,
                    bounds,
                    &self.field,
                    self.height_factor,
                )),
            )
        } else {
            (None, None)
        };

        Ok(LeafPayload {
            coordinate,
            bounds,
            mesh,
            grass,
            trees,
        })
    }
}

/// The built, but not yet attached, resources of a leaf.
#[derive(Clone, Debug)]
pub struct LeafPayload {
    pub coordinate: NodeCoordinate,
    pub bounds: NodeBounds,
    pub mesh: GridMesh,
    pub grass: Option<Vec<Placement>>,
    pub trees: Option<Vec<Placement>>,
}

impl LeafPayload {
    /// Adds all resources to the sink.
    ///
    /// Either every resource is added or none: if one of them is rejected, those already
    /// added are removed again before the error is returned.
    pub fn attach(
        self,
        sink: &mut dyn ResourceSink,
        debug_visible: bool,
    ) -> Result<NodeResources, TerrainError> {
        let LeafPayload {
            coordinate,
            bounds,
            mesh,
            grass,
            trees,
        } = self;

        let mut added = Vec::with_capacity(4);

        let terrain_mesh = add_or_rollback(
            sink,
            &mut added,
            TerrainResource::TerrainMesh {
                coordinate,
                center: bounds.center(),
                mesh,
            },
        )?;
        let grass = grass
            .map(|placements| {
                add_or_rollback(
                    sink,
                    &mut added,
                    TerrainResource::Grass {
                        coordinate,
                        placements,
                    },
                )
            })
            .transpose()?;
        let trees = trees
            .map(|placements| {
                add_or_rollback(
                    sink,
                    &mut added,
                    TerrainResource::Trees {
                        coordinate,
                        placements,
                    },
                )
            })
            .transpose()?;
        let debug_visual = add_or_rollback(
            sink,
            &mut added,
            TerrainResource::DebugVisual { coordinate, bounds },
        )?;

        let mut node_resources = NodeResources {
            terrain_mesh,
            grass,
            trees,
            debug_visual,
            visible: true,
            debug_visible: true,
        };
        node_resources.set_debug_visible(debug_visible, sink);

        Ok(node_resources)
    }
}

fn add_or_rollback(
    sink: &mut dyn ResourceSink,
    added: &mut Vec<RealizedResource>,
    resource: TerrainResource,
) -> Result<RealizedResource, TerrainError> {
    let kind = resource.kind();
    let coordinate = resource.coordinate();

    match sink.add(resource) {
        Ok(handle) => {
            let resource = RealizedResource { handle, kind };
            added.push(resource);
            Ok(resource)
        }
        Err(error) => {
            for resource in added.drain(..) {
                resource.dispose(sink);
            }
            Err(error.into_realization_failure(coordinate, kind))
        }
    }
}
