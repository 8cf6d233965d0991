use crate::{
    math::NodeCoordinate,
    terrain_data::{NodeState, ResourceKind},
};
use thiserror::Error;

/// The errors produced by the terrain core.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TerrainError {
    /// A terrain or quadtree parameter is malformed.
    /// Raised at configuration time, before any tree operation runs.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    /// A node operation was requested in a state that does not allow it.
    /// This always indicates a bug in the caller.
    #[error("cannot {operation} node {coordinate} in state {state:?}")]
    InvalidState {
        coordinate: NodeCoordinate,
        operation: &'static str,
        state: NodeState,
    },
    /// Building or attaching a resource of a single node failed.
    /// The node stays unrealized and is retried on the next update.
    #[error("failed to realize the {kind:?} of node {coordinate}: {reason}")]
    ResourceRealizationFailure {
        coordinate: NodeCoordinate,
        kind: ResourceKind,
        reason: String,
    },
}

impl TerrainError {
    pub(crate) fn invalid_parameter(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }

    /// Attributes a build error to the node and resource it occurred for.
    /// Parameter errors raised deep inside a builder are reported as realization failures,
    /// because they only surface once a node is realized.
    pub(crate) fn into_realization_failure(
        self,
        coordinate: NodeCoordinate,
        kind: ResourceKind,
    ) -> Self {
        match self {
            Self::ResourceRealizationFailure { .. } => self,
            other => Self::ResourceRealizationFailure {
                coordinate,
                kind,
                reason: other.to_string(),
            },
        }
    }
}
