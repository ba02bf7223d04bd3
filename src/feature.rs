//! Feature identity and change notification.
//!
//! Features are caller-owned geometry+style records. The layer never
//! constructs or mutates them; it only needs to know whether a feature
//! currently has geometry, and to be told when one changed. Both concerns
//! are expressed here:
//!
//! - [`Feature`] is the trait feature types implement.
//! - [`SharedFeature`] is the shared-ownership handle the layer keys its
//!   state by. Equality and hashing are by pointer, so two features with
//!   identical content remain distinct entries.
//! - [`ChangeListener`] is the notification handle the layer installs on a
//!   feature while it is subscribed; [`Subscription`] is the storage helper
//!   feature types embed to hold it.
//!
//! Notifications carry no payload. A listener re-reads feature state rather
//! than trusting notification arguments, so callers are free to batch any
//! number of edits before firing a single `notify`.

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

/// A geometry+style record the layer can observe.
///
/// Implementors typically embed a [`Subscription`] and delegate
/// [`subscribe`](Feature::subscribe) / [`unsubscribe`](Feature::unsubscribe)
/// to it. The layer installs and removes listeners as the feature's
/// membership and the layer's visibility change; implementors only store the
/// handle and fire it after edits.
pub trait Feature {
    /// Whether the feature currently has geometry to render.
    fn has_geometry(&self) -> bool;

    /// Store the layer's notification handle, replacing any previous one.
    fn subscribe(&mut self, listener: ChangeListener);

    /// Drop the stored notification handle, if any.
    fn unsubscribe(&mut self);
}

/// Shared-ownership handle to a feature with reference-identity semantics.
///
/// The caller keeps one clone to mutate the feature through; the layer keeps
/// another as the key for its binding state. Two handles compare equal only
/// when they point at the same feature cell.
pub struct SharedFeature<F>(Rc<RefCell<F>>);

impl<F> SharedFeature<F> {
    /// Wrap a feature in a new shared cell.
    pub fn new(feature: F) -> Self {
        Self(Rc::new(RefCell::new(feature)))
    }

    /// Immutably borrow the feature.
    pub fn borrow(&self) -> Ref<'_, F> {
        self.0.borrow()
    }

    /// Mutably borrow the feature.
    ///
    /// # Panics
    ///
    /// Panics if the feature is already borrowed, which happens when the
    /// caller mutates from inside a notification it fired itself.
    pub fn borrow_mut(&self) -> RefMut<'_, F> {
        self.0.borrow_mut()
    }

    pub(crate) fn downgrade(&self) -> WeakFeature<F> {
        WeakFeature(Rc::downgrade(&self.0))
    }
}

impl<F> Clone for SharedFeature<F> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<F> PartialEq for SharedFeature<F> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl<F> Eq for SharedFeature<F> {}

impl<F> Hash for SharedFeature<F> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(Rc::as_ptr(&self.0), state);
    }
}

impl<F: fmt::Debug> fmt::Debug for SharedFeature<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SharedFeature").field(&self.0.borrow()).finish()
    }
}

/// Non-owning counterpart of [`SharedFeature`], held by listeners so a
/// subscription does not keep a removed feature alive.
pub(crate) struct WeakFeature<F>(Weak<RefCell<F>>);

impl<F> WeakFeature<F> {
    pub(crate) fn upgrade(&self) -> Option<SharedFeature<F>> {
        self.0.upgrade().map(SharedFeature)
    }
}

impl<F> Clone for WeakFeature<F> {
    fn clone(&self) -> Self {
        Self(Weak::clone(&self.0))
    }
}

/// Handle to a layer's reconciliation entry point for one feature.
///
/// Created by the layer when it subscribes a feature. Firing
/// [`notify`](ChangeListener::notify) runs the reconciliation synchronously;
/// it completes before the call returns. A listener outliving its layer is
/// inert.
#[derive(Clone)]
pub struct ChangeListener {
    hook: Rc<dyn Fn()>,
}

impl ChangeListener {
    pub(crate) fn new(hook: Rc<dyn Fn()>) -> Self {
        Self { hook }
    }

    /// Report that the feature's geometry or style changed.
    pub fn notify(&self) {
        (self.hook)();
    }
}

impl fmt::Debug for ChangeListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ChangeListener")
    }
}

/// Listener storage for feature types.
///
/// Embed one per feature and delegate the [`Feature`] subscription methods to
/// it; call [`notify`](Subscription::notify) after edits. Firing while no
/// listener is stored is a no-op, so callers do not need to track whether
/// their feature is currently on a visible layer.
#[derive(Default)]
pub struct Subscription {
    listener: Option<ChangeListener>,
}

impl Subscription {
    /// An empty subscription.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a listener, replacing any previous one.
    pub fn set(&mut self, listener: ChangeListener) {
        self.listener = Some(listener);
    }

    /// Drop the stored listener.
    pub fn clear(&mut self) {
        self.listener = None;
    }

    /// Whether a listener is currently stored.
    pub fn is_active(&self) -> bool {
        self.listener.is_some()
    }

    /// Fire the stored listener, if any.
    pub fn notify(&self) {
        if let Some(listener) = &self.listener {
            listener.notify();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}
