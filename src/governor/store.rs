//! Endpoint Store
//!
//! Lazily created per-endpoint slots. Each slot pairs an async admission
//! gate, held by one admitting caller at a time (including while it waits),
//! with a short-lived lock around the endpoint's window state. Reports and
//! status queries only touch the state lock, so they never queue behind a
//! waiting admission.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use super::catalog::Endpoint;
use super::window::EndpointState;

/// State slot for a single endpoint
#[derive(Debug, Default)]
pub struct EndpointSlot {
    /// FIFO gate serialising admissions to this endpoint
    pub(crate) gate: tokio::sync::Mutex<()>,

    state: Mutex<EndpointState>,
}

impl EndpointSlot {
    /// Lock the endpoint's window state
    ///
    /// Critical sections never panic, so a poisoned lock still holds
    /// consistent state.
    pub fn state(&self) -> MutexGuard<'_, EndpointState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// In-memory endpoint store
#[derive(Debug, Clone, Default)]
pub struct EndpointStore {
    slots: Arc<RwLock<HashMap<Endpoint, Arc<EndpointSlot>>>>,
}

impl EndpointStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the slot for an endpoint
    pub fn get_or_create(&self, endpoint: &Endpoint) -> Arc<EndpointSlot> {
        if let Some(slot) = self.get(endpoint) {
            return slot;
        }

        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        slots
            .entry(endpoint.clone())
            .or_insert_with(|| {
                tracing::debug!(endpoint = %endpoint, "Tracking new endpoint");
                Arc::new(EndpointSlot::default())
            })
            .clone()
    }

    /// Get a slot if the endpoint has been seen
    pub fn get(&self, endpoint: &Endpoint) -> Option<Arc<EndpointSlot>> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots.get(endpoint).cloned()
    }

    /// All tracked endpoints with their slots, sorted by name
    pub fn entries(&self) -> Vec<(Endpoint, Arc<EndpointSlot>)> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        let mut entries: Vec<_> = slots
            .iter()
            .map(|(endpoint, slot)| (endpoint.clone(), slot.clone()))
            .collect();
        entries.sort_by(|(a, _), (b, _)| a.name().cmp(b.name()));
        entries
    }

    /// Number of tracked endpoints
    pub fn count(&self) -> usize {
        self.slots.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}
