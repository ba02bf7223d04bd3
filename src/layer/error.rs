//! Error types for layer operations.

use thiserror::Error;

use crate::binding::UnknownFeature;
use crate::surface::UnsupportedGeometry;

/// Result alias for layer operations.
pub type LayerResult<T> = Result<T, LayerError>;

/// Errors surfaced by layer operations.
///
/// Every failure is scoped to a single feature and operation; the layer
/// itself stays internally consistent and usable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayerError {
    /// Operation on a feature that was never added to this layer.
    #[error(transparent)]
    UnknownFeature(#[from] UnknownFeature),

    /// The overlay factory could not render the feature's geometry. The
    /// feature stays a member with its binding absent.
    #[error(transparent)]
    UnsupportedGeometry(#[from] UnsupportedGeometry),
}
