//! Collaborator contracts: the map surface and the overlay factory.
//!
//! The layer treats overlays as opaque handles. [`MapSurface`] owns the
//! primitives and can destroy one given its handle; [`OverlayFactory`] builds
//! the overlay(s) for a feature onto a surface. A composite overlay (one
//! feature rendered as several primitives) is whatever the implementor makes
//! the handle type, e.g. a `Vec` of primitive ids.

use std::fmt;

use thiserror::Error;

/// Identity of a map surface, used to detect surface switches on attach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceId(u64);

impl SurfaceId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "surface-{}", self.0)
    }
}

/// A rendering surface that owns overlay primitives.
///
/// Overlay creation goes through the [`OverlayFactory`], which receives the
/// surface mutably; the layer itself only ever removes overlays.
pub trait MapSurface {
    /// Opaque handle to one feature's rendered overlay(s).
    type Handle;

    /// Stable identity for switch detection.
    fn id(&self) -> SurfaceId;

    /// Destroy a rendered overlay.
    fn remove_overlay(&mut self, overlay: Self::Handle);
}

/// The factory cannot render the given geometry kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported geometry kind: {kind}")]
pub struct UnsupportedGeometry {
    kind: String,
}

impl UnsupportedGeometry {
    pub fn new(kind: impl Into<String>) -> Self {
        Self { kind: kind.into() }
    }

    /// The geometry kind that could not be rendered.
    pub fn kind(&self) -> &str {
        &self.kind
    }
}

/// Builds the overlay(s) for a feature's current geometry and style.
///
/// Implementors hold the per-geometry-kind drawing strategies (markers,
/// lines, polygons, ground overlays); the layer only sees the resulting
/// handle. The layer calls `build` strictly after removing any previous
/// overlay for the feature, so a failure never leaves a partial render.
pub trait OverlayFactory<F, S: MapSurface> {
    /// Render `feature` onto `surface`, returning the overlay handle.
    fn build(&mut self, feature: &F, surface: &mut S) -> Result<S::Handle, UnsupportedGeometry>;
}
