//! The binding table: authoritative feature-to-overlay state.
//!
//! Every feature the layer knows has exactly one entry here; presence in the
//! table, not map-surface state, is the authority on "known to this layer".
//! An entry is either [`Binding::Bound`] with the handle of a live overlay,
//! or [`Binding::Absent`] when the feature has no geometry, the layer is
//! hidden or detached, or the feature was added while hidden and never
//! rendered. A feature with no entry at all was never added (or was removed),
//! and lookups reject it with [`UnknownFeature`] - the three states are
//! distinct on purpose.
//!
//! Iteration follows insertion order, so bulk redraws after a surface swap
//! recreate overlays in a deterministic, reproducible order.

use std::collections::HashMap;

use thiserror::Error;

use crate::feature::SharedFeature;

/// Lookup of a feature that was never added to the layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("feature was never added to this layer")]
pub struct UnknownFeature;

/// Overlay state of one member feature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding<H> {
    /// The feature is a member but has no overlay on the surface.
    Absent,
    /// The feature is rendered; the handle is live on the current surface.
    Bound(H),
}

impl<H> Binding<H> {
    /// Whether the feature currently has an overlay on the surface.
    pub fn is_bound(&self) -> bool {
        matches!(self, Binding::Bound(_))
    }

    /// The bound overlay handle, if any.
    pub fn handle(&self) -> Option<&H> {
        match self {
            Binding::Bound(handle) => Some(handle),
            Binding::Absent => None,
        }
    }

    /// Consume the binding, yielding the bound overlay handle if any.
    pub fn into_handle(self) -> Option<H> {
        match self {
            Binding::Bound(handle) => Some(handle),
            Binding::Absent => None,
        }
    }
}

/// Ordered mapping from feature identity to overlay state.
///
/// The layer controller is the single writer. Lookup is by feature identity;
/// iteration is in insertion order.
pub struct BindingTable<F, H> {
    entries: HashMap<SharedFeature<F>, Binding<H>>,
    order: Vec<SharedFeature<F>>,
}

impl<F, H> Default for BindingTable<F, H> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            order: Vec::new(),
        }
    }
}

impl<F, H> BindingTable<F, H> {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a feature as a member with an [`Binding::Absent`] entry.
    ///
    /// Returns `false` without touching the existing entry when the feature
    /// is already a member.
    pub fn insert(&mut self, feature: SharedFeature<F>) -> bool {
        if self.entries.contains_key(&feature) {
            return false;
        }
        self.entries.insert(feature.clone(), Binding::Absent);
        self.order.push(feature);
        true
    }

    /// Set a feature's binding, inserting the feature if it is not a member.
    ///
    /// Returns the previous binding, or `None` when the feature was newly
    /// inserted.
    pub fn set(&mut self, feature: &SharedFeature<F>, binding: Binding<H>) -> Option<Binding<H>> {
        match self.entries.insert(feature.clone(), binding) {
            Some(previous) => Some(previous),
            None => {
                self.order.push(feature.clone());
                None
            }
        }
    }

    /// Look up a feature's binding.
    pub fn get(&self, feature: &SharedFeature<F>) -> Result<&Binding<H>, UnknownFeature> {
        self.entries.get(feature).ok_or(UnknownFeature)
    }

    /// Take a feature's binding, leaving [`Binding::Absent`] in its place.
    pub fn take(&mut self, feature: &SharedFeature<F>) -> Result<Binding<H>, UnknownFeature> {
        let entry = self.entries.get_mut(feature).ok_or(UnknownFeature)?;
        Ok(std::mem::replace(entry, Binding::Absent))
    }

    /// Delete a feature's entry entirely, ending its membership.
    ///
    /// Idempotent: removing a feature that is not a member returns `None`.
    pub fn remove(&mut self, feature: &SharedFeature<F>) -> Option<Binding<H>> {
        let previous = self.entries.remove(feature)?;
        self.order.retain(|member| member != feature);
        Some(previous)
    }

    /// Whether a feature is a member.
    pub fn contains(&self, feature: &SharedFeature<F>) -> bool {
        self.entries.contains_key(feature)
    }

    /// Number of member features.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the table has no members.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Member features in insertion order.
    pub fn features(&self) -> impl Iterator<Item = &SharedFeature<F>> {
        self.order.iter()
    }

    /// Set every entry to [`Binding::Absent`], returning the previously
    /// bound handles with their features, in insertion order.
    pub fn drain_bound(&mut self) -> Vec<(SharedFeature<F>, H)> {
        let mut drained = Vec::new();
        for feature in &self.order {
            if let Some(entry) = self.entries.get_mut(feature) {
                if let Binding::Bound(handle) = std::mem::replace(entry, Binding::Absent) {
                    drained.push((feature.clone(), handle));
                }
            }
        }
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The table only needs feature identity, not the full feature contract.
    #[derive(Debug)]
    struct Stub;

    fn stub() -> SharedFeature<Stub> {
        SharedFeature::new(Stub)
    }

    #[test]
    fn test_binding_handle_accessors() {
        let bound: Binding<u64> = Binding::Bound(5);
        assert!(bound.is_bound());
        assert_eq!(bound.handle(), Some(&5));
        assert_eq!(bound.into_handle(), Some(5));

        let absent: Binding<u64> = Binding::Absent;
        assert!(!absent.is_bound());
        assert_eq!(absent.handle(), None);
        assert_eq!(absent.into_handle(), None);
    }

    #[test]
    fn test_unknown_feature_lookup_is_rejected() {
        let table: BindingTable<Stub, u64> = BindingTable::new();
        assert_eq!(table.get(&stub()), Err(UnknownFeature));
    }

    #[test]
    fn test_insert_starts_absent_and_dedupes() {
        let mut table: BindingTable<Stub, u64> = BindingTable::new();
        let feature = stub();

        assert!(table.insert(feature.clone()));
        table.set(&feature, Binding::Bound(7));

        // A second insert must not clobber the live binding.
        assert!(!table.insert(feature.clone()));
        assert_eq!(table.get(&feature), Ok(&Binding::Bound(7)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_set_overwrites_and_reports_previous() {
        let mut table: BindingTable<Stub, u64> = BindingTable::new();
        let feature = stub();

        assert_eq!(table.set(&feature, Binding::Bound(1)), None);
        assert_eq!(
            table.set(&feature, Binding::Bound(2)),
            Some(Binding::Bound(1))
        );
        assert_eq!(table.get(&feature), Ok(&Binding::Bound(2)));
    }

    #[test]
    fn test_take_leaves_absent() {
        let mut table: BindingTable<Stub, u64> = BindingTable::new();
        let feature = stub();
        table.set(&feature, Binding::Bound(9));

        assert_eq!(table.take(&feature), Ok(Binding::Bound(9)));
        assert_eq!(table.get(&feature), Ok(&Binding::Absent));
        assert_eq!(table.take(&stub()), Err(UnknownFeature));
    }

    #[test]
    fn test_remove_is_idempotent_and_ends_membership() {
        let mut table: BindingTable<Stub, u64> = BindingTable::new();
        let feature = stub();
        table.insert(feature.clone());

        assert_eq!(table.remove(&feature), Some(Binding::Absent));
        assert_eq!(table.get(&feature), Err(UnknownFeature));
        assert_eq!(table.remove(&feature), None);
        assert!(table.is_empty());
    }

    #[test]
    fn test_iteration_follows_insertion_order() {
        let mut table: BindingTable<Stub, u64> = BindingTable::new();
        let features: Vec<_> = (0..4).map(|_| stub()).collect();
        for feature in &features {
            table.insert(feature.clone());
        }

        let order: Vec<_> = table.features().cloned().collect();
        assert_eq!(order, features);

        // Order survives removal of a middle member and later re-binding.
        table.remove(&features[1]);
        table.set(&features[0], Binding::Bound(1));
        let order: Vec<_> = table.features().cloned().collect();
        assert_eq!(order, vec![features[0].clone(), features[2].clone(), features[3].clone()]);
    }

    #[test]
    fn test_drain_bound_clears_handles_in_order() {
        let mut table: BindingTable<Stub, u64> = BindingTable::new();
        let features: Vec<_> = (0..3).map(|_| stub()).collect();
        for feature in &features {
            table.insert(feature.clone());
        }
        table.set(&features[0], Binding::Bound(10));
        table.set(&features[2], Binding::Bound(30));

        let drained = table.drain_bound();
        let handles: Vec<_> = drained.iter().map(|(_, handle)| *handle).collect();
        assert_eq!(handles, vec![10, 30]);

        for feature in &features {
            assert_eq!(table.get(feature), Ok(&Binding::Absent));
        }
        assert!(table.drain_bound().is_empty());
    }
}
