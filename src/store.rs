//! Current-license slot and change listeners.
//!
//! [`LicenseStore`] holds at most one [`License`]. Readers take a cheap
//! snapshot (`Arc` clone) and never wait on validation, which happens before a
//! swap is attempted. Swaps are serialized: the slot is replaced and every
//! listener is notified before the next swap can start, so the `(old, new)`
//! pairs observed by listeners form a single chain.
//!
//! Listeners run synchronously on the thread performing the swap, in
//! registration order. A listener must not register or remove listeners, or
//! swap the license, from inside its callback.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::debug;
use uuid::Uuid;

use crate::license::License;

/// Receives license change notifications.
pub trait LicenseListener: Send + Sync {
    /// Called after the slot changed from `old` to `new`. `None` means no license.
    fn on_license_changed(&self, old: Option<&License>, new: Option<&License>);
}

impl<F> LicenseListener for F
where
    F: Fn(Option<&License>, Option<&License>) + Send + Sync,
{
    fn on_license_changed(&self, old: Option<&License>, new: Option<&License>) {
        self(old, new)
    }
}

/// Opaque handle returned by [`LicenseStore::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

impl ListenerId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

type Registry = Vec<(ListenerId, Arc<dyn LicenseListener>)>;

/// Lock-protected single license slot plus its listener registry.
#[derive(Default)]
pub struct LicenseStore {
    current: RwLock<Option<Arc<License>>>,
    listeners: RwLock<Registry>,
    // Held across replace + notify so notifications are totally ordered.
    swap_lock: Mutex<()>,
}

impl LicenseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current license, or `None` when unlicensed.
    pub fn current(&self) -> Option<Arc<License>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the current license and notify listeners. Returns the previous value.
    pub fn swap(&self, new: Option<License>) -> Option<Arc<License>> {
        let new = new.map(Arc::new);

        // A panicking listener poisons the locks; the slot itself is always
        // left in a consistent state, so recover and carry on.
        let _serial = self.swap_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let old = {
            let mut slot = self.current.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *slot, new.clone())
        };

        debug!(
            old = old.as_ref().map(|l| l.id.as_str()).unwrap_or("none"),
            new = new.as_ref().map(|l| l.id.as_str()).unwrap_or("none"),
            "license slot swapped"
        );

        self.notify(old.as_deref(), new.as_deref());
        old
    }

    /// Install a license. Equivalent to `swap(Some(license))`.
    pub fn install(&self, license: License) -> Option<Arc<License>> {
        self.swap(Some(license))
    }

    /// Clear the slot. Equivalent to `swap(None)`.
    pub fn remove(&self) -> Option<Arc<License>> {
        self.swap(None)
    }

    /// Register a listener and return its handle.
    pub fn add_listener<L>(&self, listener: L) -> ListenerId
    where
        L: LicenseListener + 'static,
    {
        let id = ListenerId::new();
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener. Unknown ids are ignored.
    ///
    /// Waits for any in-flight notification to finish, so the listener is
    /// never invoked after this returns.
    pub fn remove_listener(&self, id: ListenerId) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(existing, _)| *existing != id);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Client-safe projection of the current license; empty when unlicensed.
    pub fn sanitized(&self) -> BTreeMap<String, String> {
        self.current()
            .map(|license| license.sanitized())
            .unwrap_or_default()
    }

    /// Full client projection of the current license; empty when unlicensed.
    pub fn client_license(&self) -> BTreeMap<String, String> {
        self.current()
            .map(|license| license.client_license())
            .unwrap_or_default()
    }

    fn notify(&self, old: Option<&License>, new: Option<&License>) {
        let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
        for (_, listener) in listeners.iter() {
            listener.on_license_changed(old, new);
        }
    }
}

impl fmt::Debug for LicenseStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LicenseStore")
            .field("current", &self.current().map(|l| l.id.clone()))
            .field("listeners", &self.listener_count())
            .finish()
    }
}
