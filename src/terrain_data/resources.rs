use crate::{
    error::TerrainError,
    math::{NodeBounds, NodeCoordinate},
    terrain_data::{GridMesh, Placement},
};
use bevy::{math::DVec2, prelude::Entity, utils::HashMap};

/// The kinds of render resources a leaf node can own.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    TerrainMesh,
    Grass,
    Trees,
    DebugVisual,
}

/// A render resource handed to a [`ResourceSink`].
///
/// Only CPU side data is contained, uploading it to the render backend is up to the sink.
#[derive(Clone, Debug)]
pub enum TerrainResource {
    TerrainMesh {
        coordinate: NodeCoordinate,
        /// The world position of the grid center.
        center: DVec2,
        mesh: GridMesh,
    },
    Grass {
        coordinate: NodeCoordinate,
        placements: Vec<Placement>,
    },
    Trees {
        coordinate: NodeCoordinate,
        placements: Vec<Placement>,
    },
    DebugVisual {
        coordinate: NodeCoordinate,
        bounds: NodeBounds,
    },
}

impl TerrainResource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            TerrainResource::TerrainMesh { .. } => ResourceKind::TerrainMesh,
            TerrainResource::Grass { .. } => ResourceKind::Grass,
            TerrainResource::Trees { .. } => ResourceKind::Trees,
            TerrainResource::DebugVisual { .. } => ResourceKind::DebugVisual,
        }
    }

    pub fn coordinate(&self) -> NodeCoordinate {
        match self {
            TerrainResource::TerrainMesh { coordinate, .. }
            | TerrainResource::Grass { coordinate, .. }
            | TerrainResource::Trees { coordinate, .. }
            | TerrainResource::DebugVisual { coordinate, .. } => *coordinate,
        }
    }
}

/// The scene, into which realized resources are added and from which disposed resources are removed.
///
/// The quadtree never holds on to a scene itself, every operation that creates or destroys
/// resources receives the sink explicitly.
pub trait ResourceSink {
    /// Adds the resource to the scene and returns the handle identifying it.
    fn add(&mut self, resource: TerrainResource) -> Result<Entity, TerrainError>;
    /// Removes a previously added resource from the scene.
    fn remove(&mut self, handle: Entity);
    fn set_visible(&mut self, handle: Entity, visible: bool);
}

/// Types owning scene resources, which have to be released explicitly.
pub trait Disposable {
    fn dispose(self, sink: &mut dyn ResourceSink);
}

/// A handle to a resource, that has been added to a [`ResourceSink`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RealizedResource {
    pub handle: Entity,
    pub kind: ResourceKind,
}

impl Disposable for RealizedResource {
    fn dispose(self, sink: &mut dyn ResourceSink) {
        sink.remove(self.handle);
    }
}

/// The resources owned by a realized leaf node.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeResources {
    pub terrain_mesh: RealizedResource,
    pub grass: Option<RealizedResource>,
    pub trees: Option<RealizedResource>,
    pub debug_visual: RealizedResource,
    /// Whether the resources are currently shown.
    pub visible: bool,
    /// Whether the debug visual is currently shown, independent of `visible`.
    pub debug_visible: bool,
}

impl NodeResources {
    pub fn iter(&self) -> impl Iterator<Item = RealizedResource> + '_ {
        std::iter::once(self.terrain_mesh)
            .chain(self.grass)
            .chain(self.trees)
            .chain(std::iter::once(self.debug_visual))
    }

    pub fn has_vegetation(&self) -> bool {
        self.grass.is_some() || self.trees.is_some()
    }

    pub(crate) fn set_visible(&mut self, visible: bool, sink: &mut dyn ResourceSink) {
        if self.visible == visible {
            return;
        }

        self.visible = visible;

        for resource in self.iter() {
            let shown = match resource.kind {
                ResourceKind::DebugVisual => visible && self.debug_visible,
                _ => visible,
            };
            sink.set_visible(resource.handle, shown);
        }
    }

    pub(crate) fn set_debug_visible(&mut self, debug_visible: bool, sink: &mut dyn ResourceSink) {
        self.debug_visible = debug_visible;

        sink.set_visible(self.debug_visual.handle, self.visible && debug_visible);
    }
}

impl Disposable for NodeResources {
    fn dispose(self, sink: &mut dyn ResourceSink) {
        for resource in self.iter() {
            resource.dispose(sink);
        }
    }
}

/// A live entry of a [`MemorySink`].
#[derive(Clone, Debug)]
pub struct MemoryResource {
    pub kind: ResourceKind,
    pub coordinate: NodeCoordinate,
    pub visible: bool,
    /// The number of vertices or instances of the resource.
    pub element_count: usize,
    /// The instances of a vegetation batch, empty for every other kind.
    pub placements: Vec<Placement>,
}

/// A [`ResourceSink`], which keeps the resources in memory.
///
/// Useful for headless simulations of the quadtree and for inspecting which resources
/// are alive at any point in time.
#[derive(Default, Debug)]
pub struct MemorySink {
    pub(crate) live: HashMap<Entity, MemoryResource>,
    pub(crate) next_index: u32,
    pub added: usize,
    pub removed: usize,
    /// When set, adding a resource of this kind fails.
    pub fail_on: Option<ResourceKind>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn live_of_kind(&self, kind: ResourceKind) -> usize {
        self.live.values().filter(|resource| resource.kind == kind).count()
    }

    pub fn visible_count(&self) -> usize {
        self.live.values().filter(|resource| resource.visible).count()
    }

    pub fn get(&self, handle: Entity) -> Option<&MemoryResource> {
        self.live.get(&handle)
    }

    pub fn contains(&self, handle: Entity) -> bool {
        self.live.contains_key(&handle)
    }

    pub fn resources(&self) -> impl Iterator<Item = (&Entity, &MemoryResource)> {
        self.live.iter()
    }
}

impl ResourceSink for MemorySink {
    fn add(&mut self, resource: TerrainResource) -> Result<Entity, TerrainError> {
        let kind = resource.kind();
        let coordinate = resource.coordinate();

        if self.fail_on == Some(kind) {
            return Err(TerrainError::ResourceRealizationFailure {
                coordinate,
                kind,
                reason: "the sink rejected the resource".into(),
            });
        }

        let (element_count, placements) = match resource {
            TerrainResource::TerrainMesh { mesh, .. } => (mesh.vertex_count(), Vec::new()),
            TerrainResource::Grass { placements, .. }
            | TerrainResource::Trees { placements, .. } => (placements.len(), placements),
            TerrainResource::DebugVisual { .. } => (5, Vec::new()),
        };

        let handle = Entity::from_raw(self.next_index);
        self.next_index = self.next_index.wrapping_add(1);
        self.added += 1;
        self.live.insert(
            handle,
            MemoryResource {
                kind,
                coordinate,
                visible: true,
                element_count,
                placements,
            },
        );

        Ok(handle)
    }

    fn remove(&mut self, handle: Entity) {
        if self.live.remove(&handle).is_some() {
            self.removed += 1;
        }
    }

    fn set_visible(&mut self, handle: Entity, visible: bool) {
        if let Some(resource) = self.live.get_mut(&handle) {
            resource.visible = visible;
        }
    }
}
