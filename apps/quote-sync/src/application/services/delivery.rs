//! Callback Delivery
//!
//! Registry of consumer handles and their update callbacks. The ingest
//! worker hands it the views that changed during one batching tick and
//! each interested handle gets at most one invocation carrying the final
//! state of its symbols.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};

use super::hub::SubscriptionHandle;
use crate::domain::quote::{QuoteView, Symbol};
use crate::domain::subscription::HandleId;

/// Callback invoked with coalesced updates.
pub type UpdateCallback = Arc<dyn Fn(&QuoteUpdate) + Send + Sync>;

/// One coalesced notification for a handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteUpdate {
    /// Handle being notified.
    pub handle: SubscriptionHandle,
    /// Final views of the handle's symbols that changed this tick, in
    /// symbol order.
    pub quotes: Vec<QuoteView>,
}

struct HandleEntry {
    symbols: BTreeSet<Symbol>,
    callback: Mutex<Option<UpdateCallback>>,
    cancelled: AtomicBool,
}

impl fmt::Debug for HandleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleEntry")
            .field("symbols", &self.symbols)
            .field("has_callback", &self.callback.lock().is_some())
            .field("cancelled", &self.cancelled.load(Ordering::Relaxed))
            .finish()
    }
}

/// Live consumer handles.
#[derive(Debug, Default)]
pub struct HandleRegistry {
    entries: RwLock<HashMap<HandleId, Arc<HandleEntry>>>,
}

impl HandleRegistry {
    /// Register a handle with the symbols it owns.
    pub(crate) fn register(&self, id: HandleId, symbols: BTreeSet<Symbol>) {
        let entry = Arc::new(HandleEntry {
            symbols,
            callback: Mutex::new(None),
            cancelled: AtomicBool::new(false),
        });
        self.entries.write().insert(id, entry);
    }

    /// Remove a handle. Once this returns, no new batch is built for it.
    ///
    /// Returns `false` if the handle was not registered.
    pub(crate) fn remove(&self, id: HandleId) -> bool {
        let Some(entry) = self.entries.write().remove(&id) else {
            return false;
        };
        entry.cancelled.store(true, Ordering::Release);
        true
    }

    /// Attach or replace a handle's callback.
    ///
    /// Returns `false` if the handle is not registered.
    pub(crate) fn set_callback(&self, id: HandleId, callback: UpdateCallback) -> bool {
        let Some(entry) = self.entries.read().get(&id).cloned() else {
            return false;
        };
        *entry.callback.lock() = Some(callback);
        true
    }

    /// Whether a handle is registered.
    #[must_use]
    pub fn contains(&self, id: HandleId) -> bool {
        self.entries.read().contains_key(&id)
    }

    /// Number of registered handles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether no handle is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Invoke callbacks for the handles owning any changed symbol.
    ///
    /// Callbacks run on the caller's task with no lock held. Returns the
    /// number of callbacks invoked.
    pub fn deliver(&self, changed: &HashMap<Symbol, QuoteView>) -> usize {
        if changed.is_empty() {
            return 0;
        }

        let entries: Vec<(HandleId, Arc<HandleEntry>)> = self
            .entries
            .read()
            .iter()
            .map(|(id, entry)| (*id, Arc::clone(entry)))
            .collect();

        let mut delivered = 0;
        for (id, entry) in entries {
            let quotes: Vec<QuoteView> = entry
                .symbols
                .iter()
                .filter_map(|symbol| changed.get(symbol).cloned())
                .collect();
            if quotes.is_empty() {
                continue;
            }

            let Some(callback) = entry.callback.lock().clone() else {
                continue;
            };
            if entry.cancelled.load(Ordering::Acquire) {
                continue;
            }

            callback(&QuoteUpdate {
                handle: SubscriptionHandle::from_id(id),
                quotes,
            });
            delivered += 1;
        }

        delivered
    }
}
