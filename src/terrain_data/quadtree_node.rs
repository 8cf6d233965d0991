use crate::{
    error::TerrainError,
    math::{NodeBounds, NodeCoordinate, Quadrant},
    terrain_data::{Disposable, LeafPayload, NodeResources, RealizeContext, ResourceSink},
};
use bevy::math::DVec2;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(0);

/// A process wide unique identifier of a node.
///
/// Unlike the [`NodeCoordinate`], the id of a node re-created by a later split differs from the
/// one it replaced, which allows to detect results computed for nodes that no longer exist.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    fn next() -> Self {
        Self(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// The lifecycle state of a [`QuadNode`].
///
/// A node removed from the tree is disposed and dropped, so there is no disposed state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeState {
    /// A leaf, whose resources have not been built yet.
    LeafUnrealized,
    /// A leaf with visible resources.
    LeafRealized,
    /// A leaf, whose resources are retained but currently invisible.
    LeafHidden,
    /// An internal node with four children.
    Split,
}

/// The children of a node: either none or exactly four.
pub enum NodeChildren {
    Leaf,
    /// The children ordered like [`Quadrant::ALL`].
    Internal(Box<[QuadNode; 4]>),
}

/// A cell of the quadtree.
///
/// Leaves own the render resources of the area they cover, internal nodes only own their children.
pub struct QuadNode {
    id: NodeId,
    coordinate: NodeCoordinate,
    bounds: NodeBounds,
    children: NodeChildren,
    resources: Option<NodeResources>,
}

impl QuadNode {
    pub fn new(coordinate: NodeCoordinate, bounds: NodeBounds) -> Self {
        Self {
            id: NodeId::next(),
            coordinate,
            bounds,
            children: NodeChildren::Leaf,
            resources: None,
        }
    }

    pub fn root(bounds: NodeBounds) -> Self {
        Self::new(NodeCoordinate::ROOT, bounds)
    }

    #[inline]
    pub fn id(&self) -> NodeId {
        self.id
    }

    #[inline]
    pub fn coordinate(&self) -> NodeCoordinate {
        self.coordinate
    }

    #[inline]
    pub fn level(&self) -> u32 {
        self.coordinate.level
    }

    #[inline]
    pub fn bounds(&self) -> &NodeBounds {
        &self.bounds
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        matches!(self.children, NodeChildren::Leaf)
    }

    pub fn children(&self) -> Option<&[QuadNode; 4]> {
        match &self.children {
            NodeChildren::Leaf => None,
            NodeChildren::Internal(children) => Some(children),
        }
    }

    pub(crate) fn children_mut(&mut self) -> Option<&mut [QuadNode; 4]> {
        match &mut self.children {
            NodeChildren::Leaf => None,
            NodeChildren::Internal(children) => Some(children),
        }
    }

    pub fn resources(&self) -> Option<&NodeResources> {
        self.resources.as_ref()
    }

    pub fn state(&self) -> NodeState {
        match (&self.children, &self.resources) {
            (NodeChildren::Internal(_), _) => NodeState::Split,
            (NodeChildren::Leaf, None) => NodeState::LeafUnrealized,
            (NodeChildren::Leaf, Some(resources)) if resources.visible => NodeState::LeafRealized,
            (NodeChildren::Leaf, Some(_)) => NodeState::LeafHidden,
        }
    }

    fn invalid_state(&self, operation: &'static str) -> TerrainError {
        TerrainError::InvalidState {
            coordinate: self.coordinate,
            operation,
            state: self.state(),
        }
    }

    /// Subdivides the leaf into four children, which quarter its bounds.
    ///
    /// The resources of this node are disposed, since an internal node renders nothing itself.
    /// The children start unrealized and are not split further.
    pub fn split(&mut self, sink: &mut dyn ResourceSink) -> Result<(), TerrainError> {
        if !self.is_leaf() {
            return Err(self.invalid_state("split"));
        }

        self.dispose_resources(sink);

        let coordinate = self.coordinate;
        let children = Quadrant::ALL
            .map(|quadrant| QuadNode::new(coordinate.child(quadrant), self.bounds.quadrant(quadrant)));

        self.children = NodeChildren::Internal(Box::new(children));

        Ok(())
    }

    /// Collapses the subtree of an internal node, which turns it back into an unrealized leaf.
    ///
    /// The children are disposed depth first, releasing all resources of the subtree.
    pub fn merge(&mut self, sink: &mut dyn ResourceSink) -> Result<(), TerrainError> {
        let NodeChildren::Internal(children) =
            std::mem::replace(&mut self.children, NodeChildren::Leaf)
        else {
            return Err(self.invalid_state("merge"));
        };

        for child in *children {
            child.dispose(sink);
        }

        self.dispose_resources(sink);

        Ok(())
    }

    /// Builds and attaches the resources of an unrealized leaf.
    ///
    /// Returns whether anything was realized, realizing an already realized leaf is a no-op.
    /// On failure the leaf stays unrealized.
    pub fn realize(
        &mut self,
        context: &RealizeContext,
        sink: &mut dyn ResourceSink,
    ) -> Result<bool, TerrainError> {
        match self.state() {
            NodeState::Split => Err(self.invalid_state("realize")),
            NodeState::LeafRealized | NodeState::LeafHidden => Ok(false),
            NodeState::LeafUnrealized => {
                let payload = context.build(self.coordinate, self.bounds)?;
                self.attach(payload, sink, context.debug_visible)?;

                Ok(true)
            }
        }
    }

    /// Attaches resources built for this node, e.g. on a worker thread.
    pub(crate) fn attach(
        &mut self,
        payload: LeafPayload,
        sink: &mut dyn ResourceSink,
        debug_visible: bool,
    ) -> Result<(), TerrainError> {
        if self.state() != NodeState::LeafUnrealized || payload.coordinate != self.coordinate {
            return Err(self.invalid_state("attach resources to"));
        }

        self.resources = Some(payload.attach(sink, debug_visible)?);

        Ok(())
    }

    /// Hides the resources of this node without disposing them.
    pub fn hide(&mut self, sink: &mut dyn ResourceSink) {
        if let Some(resources) = &mut self.resources {
            resources.set_visible(false, sink);
        }
    }

    /// Shows previously hidden resources again.
    pub fn show(&mut self, sink: &mut dyn ResourceSink) {
        if let Some(resources) = &mut self.resources {
            resources.set_visible(true, sink);
        }
    }

    pub(crate) fn set_debug_visible(&mut self, visible: bool, sink: &mut dyn ResourceSink) {
        if let Some(resources) = &mut self.resources {
            resources.set_debug_visible(visible, sink);
        }
    }

    fn dispose_resources(&mut self, sink: &mut dyn ResourceSink) {
        if let Some(resources) = self.resources.take() {
            resources.dispose(sink);
        }
    }

    /// The number of nodes in this subtree, including this node.
    pub fn node_count(&self) -> usize {
        1 + self
            .children()
            .map_or(0, |children| children.iter().map(QuadNode::node_count).sum())
    }

    /// Iterates over all nodes of this subtree in depth first order.
    pub fn nodes(&self) -> Nodes<'_> {
        Nodes { stack: vec![self] }
    }

    pub fn leaves(&self) -> impl Iterator<Item = &QuadNode> {
        self.nodes().filter(|node| node.is_leaf())
    }

    /// Calls `f` for every node of this subtree in depth first order.
    pub(crate) fn for_each_mut(&mut self, f: &mut impl FnMut(&mut QuadNode)) {
        f(self);

        if let Some(children) = self.children_mut() {
            for child in children {
                child.for_each_mut(f);
            }
        }
    }

    /// Finds the node with the coordinate, if it is part of this subtree.
    pub fn find(&self, coordinate: NodeCoordinate) -> Option<&QuadNode> {
        coordinate.level.checked_sub(self.level())?;
        let mut node = self;

        for quadrant in coordinate.path().into_iter().skip(self.level() as usize) {
            node = &node.children()?[quadrant_index(quadrant)];
        }

        (node.coordinate == coordinate).then_some(node)
    }

    pub(crate) fn find_mut(&mut self, coordinate: NodeCoordinate) -> Option<&mut QuadNode> {
        coordinate.level.checked_sub(self.level())?;
        let mut node = self;

        for quadrant in coordinate.path().into_iter().skip(node.level() as usize) {
            node = &mut node.children_mut()?[quadrant_index(quadrant)];
        }

        (node.coordinate == coordinate).then_some(node)
    }

    /// Finds the leaf covering the point.
    pub fn leaf_at(&self, point: DVec2) -> Option<&QuadNode> {
        if !self.bounds.contains_inclusive(point) {
            return None;
        }

        let mut node = self;

        while let Some(children) = node.children() {
            node = children
                .iter()
                .find(|child| child.bounds.contains(point))
                .or_else(|| {
                    children
                        .iter()
                        .find(|child| child.bounds.contains_inclusive(point))
                })?;
        }

        Some(node)
    }
}

impl Disposable for QuadNode {
    /// Releases the resources of the whole subtree.
    fn dispose(mut self, sink: &mut dyn ResourceSink) {
        if let NodeChildren::Internal(children) =
            std::mem::replace(&mut self.children, NodeChildren::Leaf)
        {
            for child in *children {
                child.dispose(sink);
            }
        }

        self.dispose_resources(sink);
    }
}

#[inline]
fn quadrant_index(quadrant: Quadrant) -> usize {
    match quadrant {
        Quadrant::UpperLeft => 0,
        Quadrant::LowerLeft => 1,
        Quadrant::UpperRight => 2,
        Quadrant::LowerRight => 3,
    }
}

/// A depth first iterator over the nodes of a subtree.
pub struct Nodes<'a> {
    stack: Vec<&'a QuadNode>,
}

impl<'a> Iterator for Nodes<'a> {
    type Item = &'a QuadNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;

        if let Some(children) = node.children() {
            self.stack.extend(children.iter().rev());
        }

        Some(node)
    }
}
