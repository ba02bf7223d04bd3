//! The layer controller: collection-level lifecycle and reconciliation.
//!
//! A [`FeatureLayer`] manages a set of features together with one
//! attach/detach lifecycle. It is the single writer of the binding table and
//! the only component that talks to the map surface and the overlay factory.
//!
//! # Overview
//!
//! The controller handles:
//! - Attaching the layer to a surface (including switching surfaces)
//! - Showing and hiding the whole layer
//! - Adding and removing individual features
//! - Rebuilding overlays when a subscribed feature reports a change
//!
//! # Lifecycle
//!
//! A layer starts off-surface with no surface attached. Features can be
//! added at any time; rendering happens once the layer is both visible and
//! attached. Hiding is reversible (entries stay, overlays go); removing a
//! feature is permanent (its entry is deleted).
//!
//! # Example
//!
//! ```ignore
//! use geolayer::layer::FeatureLayer;
//!
//! let layer = FeatureLayer::new(factory);
//! layer.add_feature(feature.clone())?;
//! layer.attach_to_surface(map);
//!
//! layer.hide();   // overlays removed, membership kept
//! layer.show();   // overlays rebuilt in insertion order
//! ```

mod controller;
mod error;

pub use controller::FeatureLayer;
pub use error::{LayerError, LayerResult};
