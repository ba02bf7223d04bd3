//! Layer controller and reconciliation state machine.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{debug, trace, warn};

use crate::binding::{Binding, BindingTable};
use crate::feature::{ChangeListener, Feature, SharedFeature};
use crate::surface::{MapSurface, OverlayFactory, SurfaceId, UnsupportedGeometry};

use super::error::LayerResult;

/// Whether the layer is currently shown on a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attachment {
    OnSurface,
    OffSurface,
}

/// Controller state behind the [`FeatureLayer`] handle.
///
/// Single writer of the binding table. Change listeners reach it through a
/// weak reference, so a listener held by a feature after every layer handle
/// is dropped fires into nothing.
struct LayerState<F, S: MapSurface, B> {
    table: BindingTable<F, S::Handle>,
    surface: Option<S>,
    attachment: Attachment,
    factory: B,
}

impl<F, S, B> LayerState<F, S, B>
where
    F: Feature,
    S: MapSurface,
    B: OverlayFactory<F, S>,
{
    /// Decide what a change notification means for one feature.
    ///
    /// "Drawn" is the feature's binding state, "has geometry" is re-read from
    /// the feature itself; the notification carries no payload.
    fn reconcile(&mut self, feature: &SharedFeature<F>) -> Result<(), UnsupportedGeometry> {
        let drawn = match self.table.get(feature) {
            Ok(binding) => binding.is_bound(),
            Err(_) => {
                trace!("change notification for a feature no longer in the layer");
                return Ok(());
            }
        };
        let has_geometry = feature.borrow().has_geometry();
        trace!(drawn, has_geometry, "reconciling feature after change");
        match (drawn, has_geometry) {
            // Geometry or style may have changed; there is no cheap way to
            // know which, so always rebuild.
            (true, true) => self.redraw(feature),
            (true, false) => {
                self.undraw(feature);
                Ok(())
            }
            (false, true) => self.draw(feature),
            (false, false) => Ok(()),
        }
    }

    /// Remove any existing overlay for the feature, then render it afresh.
    ///
    /// Removal happens strictly before the factory runs, so a build failure
    /// leaves the binding absent and no orphaned overlay behind.
    fn redraw(&mut self, feature: &SharedFeature<F>) -> Result<(), UnsupportedGeometry> {
        self.undraw(feature);
        self.draw(feature)
    }

    /// Remove the feature's overlay from the surface and bind it absent.
    /// No-op when the binding is already absent.
    fn undraw(&mut self, feature: &SharedFeature<F>) {
        let Ok(Binding::Bound(overlay)) = self.table.take(feature) else {
            return;
        };
        if let Some(surface) = self.surface.as_mut() {
            surface.remove_overlay(overlay);
        }
    }

    /// Build overlay(s) for the feature and bind the result. Renders only
    /// when a surface is attached and the feature has geometry; otherwise the
    /// binding stays absent until a later attach or notification.
    fn draw(&mut self, feature: &SharedFeature<F>) -> Result<(), UnsupportedGeometry> {
        if !feature.borrow().has_geometry() {
            return Ok(());
        }
        let Some(surface) = self.surface.as_mut() else {
            return Ok(());
        };
        let overlay = {
            let guard = feature.borrow();
            self.factory.build(&guard, surface)?
        };
        self.table.set(feature, Binding::Bound(overlay));
        Ok(())
    }

    /// Redraw every member in insertion order. One feature's factory failure
    /// must not stop the rest of the layer from rendering.
    fn render_all(&mut self) {
        let features: Vec<_> = self.table.features().cloned().collect();
        for feature in features {
            if let Err(err) = self.redraw(&feature) {
                warn!(error = %err, "failed to render feature during bulk redraw");
            }
        }
    }

    /// Remove every bound overlay from the surface, leaving all entries
    /// absent. Membership is untouched.
    fn clear_surface_overlays(&mut self) {
        let drained = self.table.drain_bound();
        if let Some(surface) = self.surface.as_mut() {
            for (_, overlay) in drained {
                surface.remove_overlay(overlay);
            }
        }
    }
}

/// A collection of features managed together with one attach/detach
/// lifecycle.
///
/// The layer reacts to out-of-band feature mutations through the change
/// listeners it installs: while the layer is shown, every member feature
/// carries a listener whose `notify` re-renders exactly that feature.
/// Hiding the layer removes overlays but keeps membership; removing a
/// feature is permanent.
///
/// Clones share the same underlying layer. Everything runs on one logical
/// thread; collaborators (surface, factory) must not call back into the
/// layer.
pub struct FeatureLayer<F, S: MapSurface, B> {
    state: Rc<RefCell<LayerState<F, S, B>>>,
}

impl<F, S: MapSurface, B> Clone for FeatureLayer<F, S, B> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<F, S, B> FeatureLayer<F, S, B>
where
    F: Feature + 'static,
    S: MapSurface + 'static,
    B: OverlayFactory<F, S> + 'static,
{
    /// Create a layer with the factory that will build its overlays. The
    /// layer starts hidden with no surface attached.
    pub fn new(factory: B) -> Self {
        Self {
            state: Rc::new(RefCell::new(LayerState {
                table: BindingTable::new(),
                surface: None,
                attachment: Attachment::OffSurface,
                factory,
            })),
        }
    }

    /// Put the layer on a surface, rendering every member in insertion
    /// order, and show it.
    ///
    /// When the layer is already on a different surface, every overlay is
    /// removed from the old surface first. Re-attaching the same surface is
    /// not a no-op: everything is re-rendered, mirroring "switch map"
    /// semantics.
    pub fn attach_to_surface(&self, surface: S) {
        let features = {
            let mut state = self.state.borrow_mut();
            let new_id = surface.id();
            let old_id = state.surface.as_ref().map(MapSurface::id);
            if old_id.is_some_and(|id| id != new_id) {
                state.clear_surface_overlays();
            }
            debug!(surface = %new_id, features = state.table.len(), "attaching layer to surface");
            state.surface = Some(surface);
            let was_hidden = state.attachment == Attachment::OffSurface;
            state.attachment = Attachment::OnSurface;
            state.render_all();
            if was_hidden {
                state.table.features().cloned().collect::<Vec<_>>()
            } else {
                Vec::new()
            }
        };
        for feature in &features {
            feature.borrow_mut().subscribe(self.listener_for(feature));
        }
    }

    /// Drop the current surface after removing every bound overlay from it.
    ///
    /// Subscriptions and visibility are untouched; members render again on
    /// the next attach. No-op when no surface is attached.
    pub fn detach_surface(&self) {
        let mut state = self.state.borrow_mut();
        if state.surface.is_none() {
            return;
        }
        debug!(features = state.table.len(), "detaching layer from surface");
        state.clear_surface_overlays();
        state.surface = None;
    }

    /// Show the layer, rendering every member onto the current surface in
    /// insertion order and subscribing it. No-op when already shown.
    pub fn show(&self) {
        let features = {
            let mut state = self.state.borrow_mut();
            if state.attachment == Attachment::OnSurface {
                trace!("show requested while layer already shown");
                return;
            }
            debug!(features = state.table.len(), "showing layer");
            state.attachment = Attachment::OnSurface;
            state.render_all();
            state.table.features().cloned().collect::<Vec<_>>()
        };
        for feature in &features {
            feature.borrow_mut().subscribe(self.listener_for(feature));
        }
    }

    /// Hide the layer: remove every overlay from the surface, leave every
    /// binding absent, and unsubscribe every member. Membership is kept, so
    /// [`show`](Self::show) restores the layer. No-op when already hidden.
    pub fn hide(&self) {
        let features = {
            let mut state = self.state.borrow_mut();
            if state.attachment == Attachment::OffSurface {
                trace!("hide requested while layer already hidden");
                return;
            }
            debug!(features = state.table.len(), "hiding layer");
            state.clear_surface_overlays();
            state.attachment = Attachment::OffSurface;
            state.table.features().cloned().collect::<Vec<_>>()
        };
        for feature in &features {
            feature.borrow_mut().unsubscribe();
        }
    }

    /// Add a feature to the layer.
    ///
    /// While the layer is shown the feature is rendered immediately and
    /// subscribed; otherwise rendering waits for the next show or attach.
    /// A factory failure propagates after the feature has become a member
    /// (binding absent, subscription installed), so the layer stays
    /// consistent and a later edit can still render it.
    ///
    /// Returns whether the feature was newly added; adding a member again
    /// just re-renders it.
    pub fn add_feature(&self, feature: SharedFeature<F>) -> LayerResult<bool> {
        let (newly_added, shown, rendered) = {
            let mut state = self.state.borrow_mut();
            let newly_added = state.table.insert(feature.clone());
            let shown = state.attachment == Attachment::OnSurface;
            let rendered = if shown {
                state.redraw(&feature)
            } else {
                Ok(())
            };
            (newly_added, shown, rendered)
        };
        if shown {
            feature.borrow_mut().subscribe(self.listener_for(&feature));
        }
        debug!(newly_added, shown, "feature added to layer");
        rendered?;
        Ok(newly_added)
    }

    /// Remove a feature from the layer for good: its overlay is removed from
    /// the surface, its subscription dropped, and its entry deleted.
    ///
    /// Returns whether the feature was a member. Idempotent.
    pub fn remove_feature(&self, feature: &SharedFeature<F>) -> bool {
        {
            let mut state = self.state.borrow_mut();
            let Some(binding) = state.table.remove(feature) else {
                trace!("remove requested for a feature that is not a member");
                return false;
            };
            if let Binding::Bound(overlay) = binding {
                if let Some(surface) = state.surface.as_mut() {
                    surface.remove_overlay(overlay);
                }
            }
        }
        feature.borrow_mut().unsubscribe();
        debug!("feature removed from layer");
        true
    }

    /// The feature's current overlay state.
    ///
    /// Fails with [`UnknownFeature`](crate::binding::UnknownFeature) for a
    /// feature that is not a member - absent and unknown are different
    /// states.
    pub fn overlay(&self, feature: &SharedFeature<F>) -> LayerResult<Binding<S::Handle>>
    where
        S::Handle: Clone,
    {
        let state = self.state.borrow();
        Ok(state.table.get(feature)?.clone())
    }

    /// Member features in insertion order.
    pub fn features(&self) -> Vec<SharedFeature<F>> {
        self.state.borrow().table.features().cloned().collect()
    }

    /// Whether the feature is a member of this layer.
    pub fn contains(&self, feature: &SharedFeature<F>) -> bool {
        self.state.borrow().table.contains(feature)
    }

    /// Number of member features.
    pub fn len(&self) -> usize {
        self.state.borrow().table.len()
    }

    /// Whether the layer has no members.
    pub fn is_empty(&self) -> bool {
        self.state.borrow().table.is_empty()
    }

    /// Whether the layer is currently shown.
    pub fn is_on_surface(&self) -> bool {
        self.state.borrow().attachment == Attachment::OnSurface
    }

    /// Identity of the attached surface, if any.
    pub fn surface_id(&self) -> Option<SurfaceId> {
        self.state.borrow().surface.as_ref().map(MapSurface::id)
    }

    /// Build the change listener for one feature: a weak hook into this
    /// layer's reconciliation entry point.
    fn listener_for(&self, feature: &SharedFeature<F>) -> ChangeListener {
        let state = Rc::downgrade(&self.state);
        let feature = feature.downgrade();
        ChangeListener::new(Rc::new(move || {
            let Some(state) = state.upgrade() else {
                return;
            };
            let Some(feature) = feature.upgrade() else {
                return;
            };
            // The notification protocol has no return channel; a failed
            // rebuild leaves the binding absent and is reported here once.
            let outcome = state.borrow_mut().reconcile(&feature);
            if let Err(err) = outcome {
                warn!(error = %err, "failed to rebuild overlay after feature change");
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::Subscription;
    use crate::layer::LayerError;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum SurfaceEvent {
        Added(u64),
        Removed(u64),
    }

    type EventLog = Rc<RefCell<Vec<SurfaceEvent>>>;

    struct TestSurface {
        id: SurfaceId,
        next_overlay: u64,
        events: EventLog,
    }

    impl TestSurface {
        fn new(id: u64) -> (Self, EventLog) {
            let events = EventLog::default();
            let surface = Self {
                id: SurfaceId::new(id),
                next_overlay: id * 100,
                events: Rc::clone(&events),
            };
            (surface, events)
        }

        fn place(&mut self) -> u64 {
            self.next_overlay += 1;
            self.events
                .borrow_mut()
                .push(SurfaceEvent::Added(self.next_overlay));
            self.next_overlay
        }
    }

    impl MapSurface for TestSurface {
        type Handle = u64;

        fn id(&self) -> SurfaceId {
            self.id
        }

        fn remove_overlay(&mut self, overlay: u64) {
            self.events.borrow_mut().push(SurfaceEvent::Removed(overlay));
        }
    }

    struct Marker {
        kind: &'static str,
        position: Option<(f64, f64)>,
        subscription: Subscription,
    }

    impl Marker {
        fn new(position: Option<(f64, f64)>) -> SharedFeature<Self> {
            SharedFeature::new(Self {
                kind: "point",
                position,
                subscription: Subscription::new(),
            })
        }

        /// A geometry kind the marker factory refuses to draw.
        fn exotic() -> SharedFeature<Self> {
            SharedFeature::new(Self {
                kind: "polyhedron",
                position: Some((0.0, 0.0)),
                subscription: Subscription::new(),
            })
        }

        fn notify(&self) {
            self.subscription.notify();
        }

        fn is_subscribed(&self) -> bool {
            self.subscription.is_active()
        }
    }

    impl Feature for Marker {
        fn has_geometry(&self) -> bool {
            self.position.is_some()
        }

        fn subscribe(&mut self, listener: ChangeListener) {
            self.subscription.set(listener);
        }

        fn unsubscribe(&mut self) {
            self.subscription.clear();
        }
    }

    struct MarkerFactory;

    impl OverlayFactory<Marker, TestSurface> for MarkerFactory {
        fn build(
            &mut self,
            feature: &Marker,
            surface: &mut TestSurface,
        ) -> Result<u64, UnsupportedGeometry> {
            if feature.kind != "point" {
                return Err(UnsupportedGeometry::new(feature.kind));
            }
            Ok(surface.place())
        }
    }

    fn shown_layer(surface_id: u64) -> (FeatureLayer<Marker, TestSurface, MarkerFactory>, EventLog) {
        let (surface, events) = TestSurface::new(surface_id);
        let layer = FeatureLayer::new(MarkerFactory);
        layer.attach_to_surface(surface);
        (layer, events)
    }

    #[test]
    fn test_notification_rebuilds_drawn_feature() {
        let (layer, events) = shown_layer(1);
        let marker = Marker::new(Some((53.5, 10.0)));
        layer.add_feature(marker.clone()).unwrap();
        events.borrow_mut().clear();

        marker.borrow_mut().position = Some((53.6, 10.1));
        marker.borrow().notify();

        assert_eq!(
            *events.borrow(),
            vec![SurfaceEvent::Removed(101), SurfaceEvent::Added(102)]
        );
        assert_eq!(layer.overlay(&marker), Ok(Binding::Bound(102)));
    }

    #[test]
    fn test_notification_undraws_when_geometry_cleared() {
        let (layer, events) = shown_layer(1);
        let marker = Marker::new(Some((53.5, 10.0)));
        layer.add_feature(marker.clone()).unwrap();
        events.borrow_mut().clear();

        marker.borrow_mut().position = None;
        marker.borrow().notify();

        assert_eq!(*events.borrow(), vec![SurfaceEvent::Removed(101)]);
        assert_eq!(layer.overlay(&marker), Ok(Binding::Absent));
        // Still a member, still subscribed.
        assert!(layer.contains(&marker));
        assert!(marker.borrow().is_subscribed());
    }

    #[test]
    fn test_notification_draws_when_geometry_appears() {
        let (layer, events) = shown_layer(1);
        let marker = Marker::new(None);
        layer.add_feature(marker.clone()).unwrap();
        assert_eq!(layer.overlay(&marker), Ok(Binding::Absent));
        assert!(events.borrow().is_empty());

        marker.borrow_mut().position = Some((53.5, 10.0));
        marker.borrow().notify();

        assert_eq!(*events.borrow(), vec![SurfaceEvent::Added(101)]);
        assert_eq!(layer.overlay(&marker), Ok(Binding::Bound(101)));
    }

    #[test]
    fn test_notification_without_geometry_is_noop() {
        let (layer, events) = shown_layer(1);
        let marker = Marker::new(None);
        layer.add_feature(marker.clone()).unwrap();

        marker.borrow().notify();

        assert!(events.borrow().is_empty());
        assert_eq!(layer.overlay(&marker), Ok(Binding::Absent));
    }

    #[test]
    fn test_attach_from_hidden_subscribes_members() {
        let layer = FeatureLayer::new(MarkerFactory);
        let marker = Marker::new(Some((53.5, 10.0)));
        layer.add_feature(marker.clone()).unwrap();
        assert!(!marker.borrow().is_subscribed());

        let (surface, _events) = TestSurface::new(1);
        layer.attach_to_surface(surface);

        assert!(marker.borrow().is_subscribed());
        assert!(layer.is_on_surface());
    }

    #[test]
    fn test_bulk_render_continues_past_factory_failure() {
        let layer = FeatureLayer::new(MarkerFactory);
        let bad = Marker::exotic();
        let good = Marker::new(Some((53.5, 10.0)));
        layer.add_feature(bad.clone()).unwrap();
        layer.add_feature(good.clone()).unwrap();

        let (surface, events) = TestSurface::new(1);
        layer.attach_to_surface(surface);

        assert_eq!(*events.borrow(), vec![SurfaceEvent::Added(101)]);
        assert_eq!(layer.overlay(&bad), Ok(Binding::Absent));
        assert_eq!(layer.overlay(&good), Ok(Binding::Bound(101)));
    }

    #[test]
    fn test_add_failure_leaves_member_absent_and_subscribed() {
        let (layer, events) = shown_layer(1);
        let bad = Marker::exotic();

        let err = layer.add_feature(bad.clone()).unwrap_err();

        assert_eq!(
            err,
            LayerError::UnsupportedGeometry(UnsupportedGeometry::new("polyhedron"))
        );
        assert!(events.borrow().is_empty());
        assert!(layer.contains(&bad));
        assert_eq!(layer.overlay(&bad), Ok(Binding::Absent));
        assert!(bad.borrow().is_subscribed());
    }

    #[test]
    fn test_listener_outliving_layer_is_inert() {
        let (layer, events) = shown_layer(1);
        let marker = Marker::new(Some((53.5, 10.0)));
        layer.add_feature(marker.clone()).unwrap();
        events.borrow_mut().clear();

        drop(layer);
        marker.borrow().notify();

        assert!(events.borrow().is_empty());
    }
}
