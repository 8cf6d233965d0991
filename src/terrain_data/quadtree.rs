use crate::{
    error::TerrainError,
    math::{HeightField, NodeBounds, NodeCoordinate, TerrainParameters},
    terrain_data::{
        can_split, Disposable, GridMeshBuilder, LeafPayload, MeshBuilder, NodeId, NodeState,
        QuadNode, RealizeContext, ResourceSink, VegetationPlacer,
    },
};
use bevy::{
    log::{debug, warn},
    math::DVec2,
    tasks::{futures_lite::future, AsyncComputeTaskPool, Task},
    utils::HashMap,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Where the resources of unrealized leaves are built.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RealizeMode {
    /// Leaves are realized synchronously during [`QuadTree::update_meshes`].
    #[default]
    Immediate,
    /// Leaves are built on the [`AsyncComputeTaskPool`] and attached by [`QuadTree::poll_pending`].
    Background,
}

/// The configuration of a [`QuadTree`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QuadTreeConfig {
    /// The square world area covered by the root.
    pub bounds: NodeBounds,
    /// The subdivision floor, no leaf is ever smaller than this.
    pub min_node_size: f64,
    /// The tessellation density of each leaf mesh.
    pub vertices_per_side: u32,
    /// The vertical scale applied to the height field.
    pub height_factor: f32,
    /// The relative distance beyond the split threshold a viewer has to move, before a node is merged.
    pub merge_hysteresis: f64,
    pub realize_mode: RealizeMode,
    /// Whether the node outlines are shown initially.
    pub debug_bounds: bool,
}

impl Default for QuadTreeConfig {
    fn default() -> Self {
        Self {
            bounds: NodeBounds::from_center_size(DVec2::ZERO, 100_000.0),
            min_node_size: 500.0,
            vertices_per_side: 64,
            height_factor: 1.0,
            merge_hysteresis: 0.0,
            realize_mode: RealizeMode::Immediate,
            debug_bounds: false,
        }
    }
}

impl QuadTreeConfig {
    pub fn validate(&self) -> Result<(), TerrainError> {
        let size = self.bounds.size();

        if !(size > 0.0 && size.is_finite()) {
            return Err(TerrainError::invalid_parameter(
                "bounds",
                format!("the world bounds are empty, got a width of {size}"),
            ));
        }
        if (size - self.bounds.height()).abs() > size * 1e-9 {
            return Err(TerrainError::invalid_parameter(
                "bounds",
                format!(
                    "the world bounds have to be square, got {size} x {}",
                    self.bounds.height()
                ),
            ));
        }
        if !(self.min_node_size > 0.0 && self.min_node_size <= size) {
            return Err(TerrainError::invalid_parameter(
                "min_node_size",
                format!(
                    "expected a value in (0, {size}], got {}",
                    self.min_node_size
                ),
            ));
        }
        if self.max_level() > NodeCoordinate::MAX_LEVEL {
            return Err(TerrainError::invalid_parameter(
                "min_node_size",
                format!(
                    "a floor of {} subdivides the world into {} levels, at most {} are supported",
                    self.min_node_size,
                    self.max_level(),
                    NodeCoordinate::MAX_LEVEL
                ),
            ));
        }
        if self.vertices_per_side < 2 {
            return Err(TerrainError::invalid_parameter(
                "vertices_per_side",
                format!("expected at least 2, got {}", self.vertices_per_side),
            ));
        }
        if !self.height_factor.is_finite() {
            return Err(TerrainError::invalid_parameter(
                "height_factor",
                "the height factor has to be finite",
            ));
        }
        if !(self.merge_hysteresis >= 0.0 && self.merge_hysteresis.is_finite()) {
            return Err(TerrainError::invalid_parameter(
                "merge_hysteresis",
                format!("expected a non negative value, got {}", self.merge_hysteresis),
            ));
        }

        Ok(())
    }

    /// The deepest level a leaf can reach.
    pub fn max_level(&self) -> u32 {
        let mut size = self.bounds.size();
        let mut level = 0;

        while can_split(size, self.min_node_size) {
            size *= 0.5;
            level += 1;
        }

        level
    }
}

/// A snapshot of the tree and its lifetime counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QuadTreeStats {
    pub node_count: usize,
    pub leaf_count: usize,
    pub realized_leaves: usize,
    pub hidden_leaves: usize,
    pub max_level: u32,
    pub pending_realizations: usize,
    pub splits: usize,
    pub merges: usize,
    pub realization_failures: usize,
    /// Background results dropped, because their node was merged away in the meantime.
    pub discarded_realizations: usize,
}

#[derive(Clone, Copy, Debug, Default)]
struct Counters {
    splits: usize,
    merges: usize,
    realization_failures: usize,
    discarded_realizations: usize,
}

struct PendingRealization {
    coordinate: NodeCoordinate,
    task: Task<Result<LeafPayload, TerrainError>>,
}

/// The level of detail controller.
///
/// Each tick the viewer position is [inserted](Self::insert), which splits nodes near the viewer
/// and merges nodes far away from it. Afterwards [`Self::update_meshes`] realizes the resources
/// of all leaves, that do not have any yet.
pub struct QuadTree {
    root: QuadNode,
    config: QuadTreeConfig,
    context: RealizeContext,
    pending: HashMap<NodeId, PendingRealization>,
    counters: Counters,
    hidden: bool,
}

impl QuadTree {
    pub fn new(
        config: QuadTreeConfig,
        parameters: TerrainParameters,
        placer: VegetationPlacer,
    ) -> Result<Self, TerrainError> {
        config.validate()?;

        let context = RealizeContext {
            field: Arc::new(HeightField::new(parameters)?),
            mesh_builder: Arc::new(GridMeshBuilder {
                height_factor: config.height_factor,
            }),
            placer: Arc::new(placer),
            vertices_per_side: config.vertices_per_side,
            height_factor: config.height_factor,
            min_node_size: config.min_node_size,
            debug_visible: config.debug_bounds,
        };

        Ok(Self {
            root: QuadNode::root(config.bounds),
            config,
            context,
            pending: HashMap::default(),
            counters: Counters::default(),
            hidden: false,
        })
    }

    /// Replaces the mesh builder used for all leaves realized from now on.
    pub fn with_mesh_builder(mut self, mesh_builder: Arc<dyn MeshBuilder>) -> Self {
        self.context.mesh_builder = mesh_builder;
        self
    }

    #[inline]
    pub fn root(&self) -> &QuadNode {
        &self.root
    }

    #[inline]
    pub fn bounds(&self) -> &NodeBounds {
        &self.config.bounds
    }

    #[inline]
    pub fn config(&self) -> &QuadTreeConfig {
        &self.config
    }

    #[inline]
    pub fn height_field(&self) -> &HeightField {
        &self.context.field
    }

    /// Adapts the tree structure to the viewer position.
    ///
    /// Nodes closer to the viewer than their own size are split, as long as their children would not
    /// be smaller than the subdivision floor. Nodes further away are merged. No resources are realized.
    pub fn insert(
        &mut self,
        viewer: DVec2,
        sink: &mut dyn ResourceSink,
    ) -> Result<(), TerrainError> {
        insert_node(
            &mut self.root,
            viewer,
            &self.config,
            sink,
            &mut self.counters,
        )
    }

    /// Realizes all unrealized leaves and shows previously hidden ones.
    ///
    /// A leaf that fails to realize stays unrealized and is retried on the next call.
    /// The walk always visits every leaf, the first failure is returned afterwards.
    pub fn update_meshes(&mut self, sink: &mut dyn ResourceSink) -> Result<(), TerrainError> {
        let Self {
            root,
            config,
            context,
            pending,
            counters,
            hidden,
        } = self;

        let mut first_error = None;

        root.for_each_mut(&mut |node| {
            match node.state() {
                NodeState::Split | NodeState::LeafRealized => {}
                NodeState::LeafHidden => node.show(sink),
                NodeState::LeafUnrealized => match config.realize_mode {
                    RealizeMode::Immediate => {
                        if let Err(error) = node.realize(context, sink) {
                            warn!("Failed to realize node {}: {error}", node.coordinate());
                            counters.realization_failures += 1;
                            first_error.get_or_insert(error);
                        }
                    }
                    RealizeMode::Background => {
                        pending
                            .entry(node.id())
                            .or_insert_with(|| spawn_realization(context, node));
                    }
                },
            };
        });

        *hidden = false;

        first_error.map_or(Ok(()), Err)
    }

    /// Attaches the results of finished background realizations.
    ///
    /// Results of nodes, which have been merged or split since the realization started, are discarded.
    /// Returns the number of attached leaves.
    pub fn poll_pending(&mut self, sink: &mut dyn ResourceSink) -> Result<usize, TerrainError> {
        let mut finished = Vec::new();

        self.pending.retain(|&id, pending| {
            match future::block_on(future::poll_once(&mut pending.task)) {
                Some(result) => {
                    finished.push((id, pending.coordinate, result));
                    false
                }
                None => true,
            }
        });

        let mut attached = 0;
        let mut first_error = None;

        for (id, coordinate, result) in finished {
            let node = self
                .root
                .find_mut(coordinate)
                .filter(|node| node.id() == id && node.state() == NodeState::LeafUnrealized);

            let Some(node) = node else {
                debug!("Discarding the stale realization of node {coordinate}.");
                self.counters.discarded_realizations += 1;
                continue;
            };

            let result = result.and_then(|payload| {
                node.attach(payload, sink, self.context.debug_visible)
            });

            match result {
                Ok(()) => {
                    if self.hidden {
                        node.hide(sink);
                    }
                    attached += 1;
                }
                Err(error) => {
                    warn!("Failed to realize node {coordinate}: {error}");
                    self.counters.realization_failures += 1;
                    first_error.get_or_insert(error);
                }
            }
        }

        first_error.map_or(Ok(attached), Err)
    }

    /// Hides all realized leaves, until the next [`Self::update_meshes`] shows them again.
    pub fn hide(&mut self, sink: &mut dyn ResourceSink) {
        self.root.for_each_mut(&mut |node| node.hide(sink));
        self.hidden = true;
    }

    #[inline]
    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub fn set_debug_visible(&mut self, visible: bool, sink: &mut dyn ResourceSink) {
        self.context.debug_visible = visible;
        self.root
            .for_each_mut(&mut |node| node.set_debug_visible(visible, sink));
    }

    #[inline]
    pub fn debug_visible(&self) -> bool {
        self.context.debug_visible
    }

    pub fn total_node_count(&self) -> usize {
        self.root.node_count()
    }

    pub fn leaf_count(&self) -> usize {
        self.root.leaves().count()
    }

    pub fn leaves(&self) -> impl Iterator<Item = &QuadNode> {
        self.root.leaves()
    }

    /// The leaf covering the point, if it lies inside the world bounds.
    pub fn leaf_at(&self, point: DVec2) -> Option<&QuadNode> {
        self.root.leaf_at(point)
    }

    pub fn stats(&self) -> QuadTreeStats {
        let mut stats = QuadTreeStats {
            pending_realizations: self.pending.len(),
            splits: self.counters.splits,
            merges: self.counters.merges,
            realization_failures: self.counters.realization_failures,
            discarded_realizations: self.counters.discarded_realizations,
            ..Default::default()
        };

        for node in self.root.nodes() {
            stats.node_count += 1;
            stats.max_level = stats.max_level.max(node.level());

            match node.state() {
                NodeState::Split => {}
                NodeState::LeafUnrealized => stats.leaf_count += 1,
                NodeState::LeafRealized => {
                    stats.leaf_count += 1;
                    stats.realized_leaves += 1;
                }
                NodeState::LeafHidden => {
                    stats.leaf_count += 1;
                    stats.hidden_leaves += 1;
                }
            }
        }

        stats
    }
}

impl Disposable for QuadTree {
    /// Releases all resources, in flight realizations are cancelled.
    fn dispose(self, sink: &mut dyn ResourceSink) {
        self.root.dispose(sink);
    }
}

fn insert_node(
    node: &mut QuadNode,
    viewer: DVec2,
    config: &QuadTreeConfig,
    sink: &mut dyn ResourceSink,
    counters: &mut Counters,
) -> Result<(), TerrainError> {
    let size = node.bounds().size();
    let distance = node.bounds().distance_to_center(viewer);
    let splittable = can_split(size, config.min_node_size);

    if splittable && distance < size {
        if node.is_leaf() {
            node.split(sink)?;
            counters.splits += 1;
        }
    } else if !splittable || distance >= size * (1.0 + config.merge_hysteresis) {
        if !node.is_leaf() {
            node.merge(sink)?;
            counters.merges += 1;
        }
        return Ok(());
    }

    if let Some(children) = node.children_mut() {
        for child in children {
            insert_node(child, viewer, config, sink, counters)?;
        }
    }

    Ok(())
}

fn spawn_realization(context: &RealizeContext, node: &QuadNode) -> PendingRealization {
    let context = context.clone();
    let coordinate = node.coordinate();
    let bounds = *node.bounds();

    let task = AsyncComputeTaskPool::get().spawn(async move { context.build(coordinate, bounds) });

    PendingRealization { coordinate, task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        math::Quadrant,
        terrain_data::{GridMesh, MemorySink, Placement, ResourceKind, VegetationLayer},
    };
    use bevy::tasks::TaskPool;

    fn example_world() -> QuadTreeConfig {
        QuadTreeConfig {
            vertices_per_side: 5,
            ..Default::default()
        }
    }

    fn small_world() -> QuadTreeConfig {
        QuadTreeConfig {
            bounds: NodeBounds::from_center_size(DVec2::ZERO, 1024.0),
            min_node_size: 64.0,
            vertices_per_side: 5,
            ..Default::default()
        }
    }

    fn tree(config: QuadTreeConfig) -> QuadTree {
        QuadTree::new(
            config,
            TerrainParameters::default(),
            VegetationPlacer::default(),
        )
        .unwrap()
    }

    fn wait_for_pending(tree: &mut QuadTree, sink: &mut MemorySink) {
        while tree.stats().pending_realizations > 0 {
            tree.poll_pending(sink).unwrap();
            std::thread::yield_now();
        }
    }

    fn assert_tree_invariants(tree: &QuadTree, sink: &MemorySink) {
        let min_node_size = tree.config().min_node_size;
        let mut live_resources = 0;

        for node in tree.root().nodes() {
            match node.children() {
                Some(children) => {
                    assert!(node.resources().is_none());

                    let area: f64 = children.iter().map(|child| child.bounds().area()).sum();
                    assert_eq!(area, node.bounds().area());

                    for (i, a) in children.iter().enumerate() {
                        assert_eq!(a.level(), node.level() + 1);
                        assert_eq!(a.bounds().intersection_area(node.bounds()), a.bounds().area());

                        for b in &children[i + 1..] {
                            assert_eq!(a.bounds().intersection_area(b.bounds()), 0.0);
                        }
                    }
                }
                None => {
                    assert!(node.bounds().size() >= min_node_size);
                    live_resources += node.resources().map_or(0, |resources| resources.iter().count());
                }
            }
        }

        assert_eq!(live_resources, sink.live_count());
    }

    #[test]
    fn example_world_subdivides_around_viewer() {
        let mut sink = MemorySink::new();
        let mut tree = tree(example_world());

        tree.insert(DVec2::ZERO, &mut sink).unwrap();

        assert_eq!(tree.config().max_level(), 7);

        let far = tree.leaf_at(DVec2::new(49_000.0, 49_000.0)).unwrap();
        assert_eq!(far.level(), 2);
        assert_eq!(far.bounds().size(), 25_000.0);
        assert_eq!(far.bounds().center(), DVec2::splat(37_500.0));

        for quadrant in Quadrant::ALL {
            let offset = NodeBounds::from_center_size(DVec2::ZERO, 2.0).quadrant(quadrant).center();
            let near = tree.leaf_at(offset).unwrap();

            assert_eq!(near.level(), 7);
            assert_eq!(near.bounds().size(), 781.25);
        }

        for leaf in tree.leaves() {
            let size = leaf.bounds().size();

            assert!(size >= 500.0);
            if leaf.bounds().distance_to_center(DVec2::ZERO) < size {
                assert!(leaf.level() > 0);
                assert!(!can_split(size, 500.0));
            }
        }

        // nothing is realized by insert
        assert_eq!(sink.live_count(), 0);
        assert_eq!(tree.stats().splits, tree.total_node_count() / 4);
    }

    #[test]
    fn update_meshes_realizes_every_leaf() {
        let mut sink = MemorySink::new();
        let mut tree = tree(example_world());

        tree.insert(DVec2::new(1_200.0, -300.0), &mut sink).unwrap();
        tree.update_meshes(&mut sink).unwrap();

        let stats = tree.stats();
        assert_eq!(stats.realized_leaves, stats.leaf_count);
        assert_eq!(stats.node_count, tree.total_node_count());
        assert_eq!(stats.max_level, 7);
        assert_tree_invariants(&tree, &sink);

        for leaf in tree.leaves() {
            let detailed = !can_split(leaf.bounds().size(), 500.0);
            assert_eq!(leaf.resources().unwrap().has_vegetation(), detailed);
        }

        // realized leaves are not rebuilt
        let added = sink.added;
        tree.update_meshes(&mut sink).unwrap();
        assert_eq!(sink.added, added);
    }

    #[test]
    fn moving_away_merges_everything() {
        let mut sink = MemorySink::new();
        let mut tree = tree(example_world());

        tree.insert(DVec2::ZERO, &mut sink).unwrap();
        tree.update_meshes(&mut sink).unwrap();
        let mut node_count = tree.total_node_count();
        assert!(node_count > 1);

        for step in 0..6 {
            let viewer = DVec2::new(60_000.0 + step as f64 * 20_000.0, 0.0);
            tree.insert(viewer, &mut sink).unwrap();
            tree.update_meshes(&mut sink).unwrap();
            assert_tree_invariants(&tree, &sink);

            let next = tree.total_node_count();
            assert!(next <= node_count);
            node_count = next;
        }

        assert_eq!(node_count, 1);
        assert_eq!(tree.root().state(), NodeState::LeafRealized);
        assert_eq!(sink.live_count(), 2);
        assert_eq!(sink.added - sink.removed, 2);
    }

    fn vegetation(tree: &QuadTree, sink: &MemorySink) -> Vec<(NodeCoordinate, Vec<Placement>)> {
        tree.leaves()
            .filter_map(QuadNode::resources)
            .flat_map(|resources| resources.grass.into_iter().chain(resources.trees))
            .map(|resource| {
                let entry = sink.get(resource.handle).unwrap();
                (entry.coordinate, entry.placements.clone())
            })
            .collect()
    }

    #[test]
    fn returning_viewer_reproduces_the_tree() {
        let mut sink = MemorySink::new();
        let grass = VegetationLayer {
            max_candidates: 32,
            min_height: 0.0,
            max_height: f64::MAX,
            ..VegetationLayer::grass()
        };
        let mut tree = QuadTree::new(
            small_world(),
            TerrainParameters::default(),
            VegetationPlacer {
                grass,
                seed: 42,
                ..Default::default()
            },
        )
        .unwrap();
        let viewer = DVec2::new(100.0, 180.0);

        tree.insert(viewer, &mut sink).unwrap();
        tree.update_meshes(&mut sink).unwrap();
        let coordinates: Vec<_> = tree.leaves().map(QuadNode::coordinate).collect();
        let placements = vegetation(&tree, &sink);

        assert!(!placements.is_empty());
        assert!(placements
            .iter()
            .any(|(_, placements)| placements.len() == 32));

        tree.insert(DVec2::splat(10_000.0), &mut sink).unwrap();
        tree.update_meshes(&mut sink).unwrap();
        assert_eq!(tree.total_node_count(), 1);
        assert!(vegetation(&tree, &sink).is_empty());

        tree.insert(viewer, &mut sink).unwrap();
        tree.update_meshes(&mut sink).unwrap();

        assert_eq!(
            tree.leaves().map(QuadNode::coordinate).collect::<Vec<_>>(),
            coordinates
        );
        // the vegetation is rebuilt from scratch, but grows exactly as before
        assert_eq!(vegetation(&tree, &sink), placements);
        assert_tree_invariants(&tree, &sink);
    }

    #[test]
    fn hysteresis_delays_merging() {
        let mut sink = MemorySink::new();
        let mut strict = tree(small_world());
        let mut lenient = tree(QuadTreeConfig {
            merge_hysteresis: 0.5,
            ..small_world()
        });

        for tree in [&mut strict, &mut lenient] {
            tree.insert(DVec2::ZERO, &mut sink).unwrap();
            tree.insert(DVec2::new(1_200.0, 0.0), &mut sink).unwrap();
        }

        assert_eq!(strict.total_node_count(), 1);
        // the root stays split, but its children are far enough to merge
        assert_eq!(lenient.total_node_count(), 5);

        lenient.insert(DVec2::new(1_600.0, 0.0), &mut sink).unwrap();
        assert_eq!(lenient.total_node_count(), 1);
    }

    #[test]
    fn viewer_on_threshold_does_not_split() {
        let mut sink = MemorySink::new();
        let mut tree = tree(small_world());

        tree.insert(DVec2::new(1_024.0, 0.0), &mut sink).unwrap();
        assert_eq!(tree.total_node_count(), 1);

        tree.insert(DVec2::new(1_023.0, 0.0), &mut sink).unwrap();
        assert_eq!(tree.total_node_count(), 5);
    }

    struct WesternOutage;

    impl MeshBuilder for WesternOutage {
        fn build_grid(
            &self,
            bounds: &NodeBounds,
            resolution: u32,
            field: &HeightField,
        ) -> Result<GridMesh, TerrainError> {
            if bounds.center().x < 0.0 {
                return Err(TerrainError::invalid_parameter(
                    "center",
                    "the western half is unavailable",
                ));
            }

            GridMeshBuilder::default().build_grid(bounds, resolution, field)
        }
    }

    #[test]
    fn failures_are_isolated_per_leaf() {
        let mut sink = MemorySink::new();
        let mut tree = tree(small_world()).with_mesh_builder(Arc::new(WesternOutage));

        tree.insert(DVec2::new(10.0, 10.0), &mut sink).unwrap();
        let error = tree.update_meshes(&mut sink).unwrap_err();

        assert!(matches!(
            error,
            TerrainError::ResourceRealizationFailure {
                kind: ResourceKind::TerrainMesh,
                ..
            }
        ));

        let western = tree
            .leaves()
            .filter(|leaf| leaf.bounds().center().x < 0.0)
            .count();
        let stats = tree.stats();

        assert!(western > 0);
        assert_eq!(stats.realization_failures, western);
        assert_eq!(stats.realized_leaves, stats.leaf_count - western);
        assert_tree_invariants(&tree, &sink);

        for leaf in tree.leaves() {
            let expected = if leaf.bounds().center().x < 0.0 {
                NodeState::LeafUnrealized
            } else {
                NodeState::LeafRealized
            };
            assert_eq!(leaf.state(), expected);
        }

        // failed leaves are retried
        assert!(tree.update_meshes(&mut sink).is_err());
        assert_eq!(tree.stats().realization_failures, 2 * western);
    }

    #[test]
    fn hide_keeps_resources_until_next_update() {
        let mut sink = MemorySink::new();
        let mut tree = tree(QuadTreeConfig {
            debug_bounds: true,
            ..small_world()
        });

        tree.insert(DVec2::ZERO, &mut sink).unwrap();
        tree.update_meshes(&mut sink).unwrap();
        let live = sink.live_count();
        assert_eq!(sink.visible_count(), live);

        tree.hide(&mut sink);
        assert!(tree.is_hidden());
        assert_eq!(sink.visible_count(), 0);
        assert_eq!(sink.live_count(), live);
        assert_eq!(tree.stats().hidden_leaves, tree.leaf_count());

        let added = sink.added;
        tree.update_meshes(&mut sink).unwrap();
        assert_eq!(sink.visible_count(), live);
        assert_eq!(sink.added, added);
        assert_eq!(tree.stats().hidden_leaves, 0);
    }

    #[test]
    fn debug_visuals_toggle() {
        let mut sink = MemorySink::new();
        let mut tree = tree(small_world());

        tree.insert(DVec2::ZERO, &mut sink).unwrap();
        tree.update_meshes(&mut sink).unwrap();

        let debug_visuals = sink.live_of_kind(ResourceKind::DebugVisual);
        assert_eq!(debug_visuals, tree.leaf_count());
        assert_eq!(sink.visible_count(), sink.live_count() - debug_visuals);

        tree.set_debug_visible(true, &mut sink);
        assert_eq!(sink.visible_count(), sink.live_count());

        tree.set_debug_visible(false, &mut sink);
        assert_eq!(sink.visible_count(), sink.live_count() - debug_visuals);
    }

    #[test]
    fn dispose_releases_everything() {
        let mut sink = MemorySink::new();
        let mut tree = tree(example_world());

        tree.insert(DVec2::new(-7_000.0, 3_000.0), &mut sink).unwrap();
        tree.update_meshes(&mut sink).unwrap();
        assert!(sink.live_count() > 0);

        tree.dispose(&mut sink);
        assert_eq!(sink.live_count(), 0);
        assert_eq!(sink.added, sink.removed);
    }

    #[test]
    fn background_realization_attaches_results() {
        AsyncComputeTaskPool::get_or_init(TaskPool::new);

        let mut sink = MemorySink::new();
        let mut tree = tree(QuadTreeConfig {
            realize_mode: RealizeMode::Background,
            ..small_world()
        });

        tree.insert(DVec2::new(200.0, -40.0), &mut sink).unwrap();
        tree.update_meshes(&mut sink).unwrap();
        assert_eq!(tree.stats().pending_realizations, tree.leaf_count());
        assert_eq!(sink.live_count(), 0);

        // spawning twice for the same leaf is avoided
        tree.update_meshes(&mut sink).unwrap();
        assert_eq!(tree.stats().pending_realizations, tree.leaf_count());

        wait_for_pending(&mut tree, &mut sink);

        let stats = tree.stats();
        assert_eq!(stats.realized_leaves, stats.leaf_count);
        assert_eq!(stats.discarded_realizations, 0);
        assert_tree_invariants(&tree, &sink);
    }

    #[test]
    fn background_results_of_merged_nodes_are_discarded() {
        AsyncComputeTaskPool::get_or_init(TaskPool::new);

        let mut sink = MemorySink::new();
        let mut tree = tree(QuadTreeConfig {
            realize_mode: RealizeMode::Background,
            ..small_world()
        });

        tree.insert(DVec2::ZERO, &mut sink).unwrap();
        tree.update_meshes(&mut sink).unwrap();
        let spawned = tree.stats().pending_realizations;

        tree.insert(DVec2::splat(5_000.0), &mut sink).unwrap();
        wait_for_pending(&mut tree, &mut sink);

        assert_eq!(tree.stats().discarded_realizations, spawned);
        assert_eq!(tree.root().state(), NodeState::LeafUnrealized);
        assert_eq!(sink.live_count(), 0);

        tree.update_meshes(&mut sink).unwrap();
        wait_for_pending(&mut tree, &mut sink);
        assert_eq!(tree.root().state(), NodeState::LeafRealized);
    }

    #[test]
    fn deepest_supported_tree_keeps_unique_coordinates() {
        let size = 2.0_f64.powi(NodeCoordinate::MAX_LEVEL as i32);
        let mut sink = MemorySink::new();
        let mut tree = tree(QuadTreeConfig {
            bounds: NodeBounds::new(DVec2::ZERO, DVec2::splat(size)),
            min_node_size: 1.0,
            ..small_world()
        });
        assert_eq!(tree.config().max_level(), NodeCoordinate::MAX_LEVEL);

        let corner = DVec2::splat(size - 0.5);
        tree.insert(corner, &mut sink).unwrap();

        let leaf = tree.leaf_at(corner).unwrap();
        let last = (1 << NodeCoordinate::MAX_LEVEL) - 1;
        assert_eq!(
            leaf.coordinate(),
            NodeCoordinate::new(NodeCoordinate::MAX_LEVEL, last, last)
        );
        assert_eq!(
            tree.root().find(leaf.coordinate()).map(QuadNode::id),
            Some(leaf.id())
        );
    }

    #[test]
    fn invalid_configurations_are_rejected() {
        let invalid = [
            (
                QuadTreeConfig {
                    bounds: NodeBounds::new(DVec2::ZERO, DVec2::new(100.0, 50.0)),
                    ..small_world()
                },
                "bounds",
            ),
            (
                QuadTreeConfig {
                    bounds: NodeBounds::new(DVec2::ZERO, DVec2::ZERO),
                    ..small_world()
                },
                "bounds",
            ),
            (
                QuadTreeConfig {
                    min_node_size: 0.0,
                    ..small_world()
                },
                "min_node_size",
            ),
            (
                QuadTreeConfig {
                    min_node_size: 2048.0,
                    ..small_world()
                },
                "min_node_size",
            ),
            (
                QuadTreeConfig {
                    bounds: NodeBounds::new(DVec2::ZERO, DVec2::splat(2.0_f64.powi(40))),
                    min_node_size: 1.0,
                    ..small_world()
                },
                "min_node_size",
            ),
            (
                QuadTreeConfig {
                    vertices_per_side: 1,
                    ..small_world()
                },
                "vertices_per_side",
            ),
            (
                QuadTreeConfig {
                    merge_hysteresis: -0.1,
                    ..small_world()
                },
                "merge_hysteresis",
            ),
        ];

        for (config, parameter) in invalid {
            let result = QuadTree::new(
                config,
                TerrainParameters::default(),
                VegetationPlacer::default(),
            );

            assert!(matches!(
                result,
                Err(TerrainError::InvalidParameter { name, .. }) if name == parameter
            ));
        }

        let result = QuadTree::new(
            small_world(),
            TerrainParameters {
                octaves: 0,
                ..Default::default()
            },
            VegetationPlacer::default(),
        );
        assert!(matches!(
            result,
            Err(TerrainError::InvalidParameter { name: "octaves", .. })
        ));
    }
}
