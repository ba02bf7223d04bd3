//! GeoLayer - declarative feature-to-overlay reconciliation for map surfaces
//!
//! This library keeps a mutable collection of geometry+style "feature" objects
//! synchronized with their rendered counterparts ("overlays") on an external
//! map surface. Callers mutate features out of band and fire a payload-free
//! change notification; the layer reacts incrementally by adding, removing, or
//! rebuilding the affected overlay.
//!
//! # High-Level API
//!
//! The [`layer`] module provides the orchestrating [`FeatureLayer`](layer::FeatureLayer):
//!
//! ```ignore
//! use geolayer::feature::SharedFeature;
//! use geolayer::layer::FeatureLayer;
//!
//! let layer = FeatureLayer::new(MarkerFactory::new());
//!
//! // Membership is independent of visibility; the feature renders once the
//! // layer is attached to a surface.
//! let station = SharedFeature::new(Station::at(53.55, 9.99));
//! layer.add_feature(station.clone())?;
//! layer.attach_to_surface(map);
//!
//! // Later edits re-render through the change notification the layer
//! // installed on the feature.
//! station.borrow_mut().set_position(53.63, 10.00);
//! station.borrow().notify();
//! ```
//!
//! # Architecture
//!
//! - [`feature`] - feature identity handles and the change-notification
//!   protocol between caller-owned features and the layer.
//! - [`binding`] - the authoritative table mapping each member feature to its
//!   current overlay state.
//! - [`surface`] - collaborator contracts: the map surface that owns overlay
//!   primitives and the factory that builds them.
//! - [`layer`] - the layer controller and its reconciliation state machine.
//!
//! Everything runs on one logical thread; notifications are delivered
//! synchronously and reconciliation completes before the mutating call
//! returns.

pub mod binding;
pub mod feature;
pub mod layer;
pub mod surface;

/// Version of the GeoLayer library.
///
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
