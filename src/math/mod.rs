//! Contains the world space primitives of the quadtree: the [`NodeBounds`] of a node,
//! its [`NodeCoordinate`] inside the tree and the [`HeightField`] all meshes are sampled from.

mod height_field;

pub use height_field::{HeightField, TerrainParameters};

use bevy::math::DVec2;
use std::fmt;

/// One of the four children of a split node.
///
/// "Upper" refers to the larger `y` coordinate of the world plane.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Quadrant {
    UpperLeft,
    LowerLeft,
    UpperRight,
    LowerRight,
}

impl Quadrant {
    /// The child order of every split node.
    pub const ALL: [Quadrant; 4] = [
        Quadrant::UpperLeft,
        Quadrant::LowerLeft,
        Quadrant::UpperRight,
        Quadrant::LowerRight,
    ];

    #[inline]
    fn offset(self) -> (u32, u32) {
        match self {
            Quadrant::UpperLeft => (0, 1),
            Quadrant::LowerLeft => (0, 0),
            Quadrant::UpperRight => (1, 1),
            Quadrant::LowerRight => (1, 0),
        }
    }
}

/// The axis aligned, world space rectangle covered by a node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NodeBounds {
    pub min: DVec2,
    pub max: DVec2,
}

impl NodeBounds {
    pub fn new(min: DVec2, max: DVec2) -> Self {
        Self { min, max }
    }

    pub fn from_center_size(center: DVec2, size: f64) -> Self {
        let half = DVec2::splat(0.5 * size);

        Self {
            min: center - half,
            max: center + half,
        }
    }

    #[inline]
    pub fn center(&self) -> DVec2 {
        (self.min + self.max) * 0.5
    }

    /// The width of the bounds, which is the node size used by the split policy.
    #[inline]
    pub fn size(&self) -> f64 {
        self.max.x - self.min.x
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    #[inline]
    pub fn area(&self) -> f64 {
        self.size() * self.height()
    }

    /// Whether the point lies inside the bounds.
    /// The maximum edges are exclusive, so that sibling nodes never both contain a point.
    #[inline]
    pub fn contains(&self, point: DVec2) -> bool {
        point.x >= self.min.x && point.x < self.max.x && point.y >= self.min.y && point.y < self.max.y
    }

    /// Like [`Self::contains`], but with inclusive maximum edges.
    #[inline]
    pub fn contains_inclusive(&self, point: DVec2) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
    }

    #[inline]
    pub fn distance_to_center(&self, point: DVec2) -> f64 {
        self.center().distance(point)
    }

    pub fn intersection_area(&self, other: &NodeBounds) -> f64 {
        let min = self.min.max(other.min);
        let max = self.max.min(other.max);
        let extent = (max - min).max(DVec2::ZERO);

        extent.x * extent.y
    }

    /// Splits the bounds at their center.
    /// The result is ordered like [`Quadrant::ALL`].
    pub fn quadrants(&self) -> [NodeBounds; 4] {
        Quadrant::ALL.map(|quadrant| self.quadrant(quadrant))
    }

    pub fn quadrant(&self, quadrant: Quadrant) -> NodeBounds {
        let center = self.center();

        match quadrant {
            Quadrant::UpperLeft => NodeBounds::new(
                DVec2::new(self.min.x, center.y),
                DVec2::new(center.x, self.max.y),
            ),
            Quadrant::LowerLeft => NodeBounds::new(self.min, center),
            Quadrant::UpperRight => NodeBounds::new(center, self.max),
            Quadrant::LowerRight => NodeBounds::new(
                DVec2::new(center.x, self.min.y),
                DVec2::new(self.max.x, center.y),
            ),
        }
    }
}

/// The address of a node inside the quadtree.
///
/// The root is `(0, 0, 0)`, each split doubles the grid resolution of the next level.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeCoordinate {
    /// The depth of the node, where the root is level 0.
    pub level: u32,
    /// The x position of the node in node sizes of its level.
    pub x: u32,
    /// The y position of the node in node sizes of its level.
    pub y: u32,
}

impl NodeCoordinate {
    pub const ROOT: Self = Self {
        level: 0,
        x: 0,
        y: 0,
    };

    /// The deepest level, whose `x` and `y` positions still fit into a `u32`.
    pub const MAX_LEVEL: u32 = 31;

    pub fn new(level: u32, x: u32, y: u32) -> Self {
        Self { level, x, y }
    }

    pub fn child(self, quadrant: Quadrant) -> Self {
        let (dx, dy) = quadrant.offset();

        Self {
            level: self.level + 1,
            x: (self.x << 1) + dx,
            y: (self.y << 1) + dy,
        }
    }

    pub fn parent(self) -> Option<Self> {
        (self.level > 0).then(|| Self {
            level: self.level - 1,
            x: self.x >> 1,
            y: self.y >> 1,
        })
    }

    /// The quadrant this node occupies inside its parent.
    pub fn quadrant(self) -> Option<Quadrant> {
        if self.level == 0 {
            return None;
        }

        Some(match (self.x & 1, self.y & 1) {
            (0, 1) => Quadrant::UpperLeft,
            (0, _) => Quadrant::LowerLeft,
            (_, 1) => Quadrant::UpperRight,
            (_, _) => Quadrant::LowerRight,
        })
    }

    /// The path of quadrants leading from the root to this node.
    pub fn path(self) -> Vec<Quadrant> {
        let mut path = Vec::with_capacity(self.level as usize);
        let mut coordinate = self;

        while let (Some(quadrant), Some(parent)) = (coordinate.quadrant(), coordinate.parent()) {
            path.push(quadrant);
            coordinate = parent;
        }

        path.reverse();
        path
    }
}

impl fmt::Display for NodeCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{}_{}_{}", self.level, self.x, self.y)
    }
}
