// crates/acstore-core/src/memory_store.rs
// ============================================================================
// Module: In-Memory Attribute Container Store
// Description: Volatile attribute container store for tests and tools.
// Purpose: Provide a deterministic store implementation without a database.
// Dependencies: tracing, crate::{containers, interfaces, profiler}
// ============================================================================

//! ## Overview
//! [`InMemoryAttributeContainerStore`] keeps containers per type in sequence
//! order. Callers must [`open`](InMemoryAttributeContainerStore::open) it
//! before use; an open store is always writable. Reads hand out copies so
//! callers cannot mutate stored containers in place. Unlike the `SQLite`
//! backend it accepts containers of any type without a registered schema.
//! Container types are matched case-insensitively, as in the registry.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Instant;

use tracing::debug;

use crate::containers::AttributeContainer;
use crate::containers::AttributeContainerIdentifier;
use crate::interfaces::AttributeContainerStore;
use crate::interfaces::SequenceNumbers;
use crate::interfaces::StoreError;
use crate::interfaces::identifier_index;
use crate::interfaces::parse_filter_expression;
use crate::profiler::PROFILE_GET_CONTAINER_BY_INDEX;
use crate::profiler::PROFILE_GET_CONTAINERS;
use crate::profiler::PROFILE_WRITE_EXISTING;
use crate::profiler::PROFILE_WRITE_NEW;
use crate::profiler::StorageProfiler;

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// Mutable state of the in-memory store.
#[derive(Debug, Default)]
struct MemoryState {
    /// Whether the store is open.
    is_open: bool,
    /// Containers per type in sequence order.
    containers: BTreeMap<String, Vec<AttributeContainer>>,
    /// Last issued sequence numbers.
    sequence_numbers: SequenceNumbers,
    /// Optional storage profiler.
    profiler: Option<Arc<StorageProfiler>>,
}

/// In-memory attribute container store for tests and tools.
#[derive(Debug, Default, Clone)]
pub struct InMemoryAttributeContainerStore {
    /// Store state protected by a mutex.
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryAttributeContainerStore {
    /// Creates a closed, empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the store for reading and writing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlreadyOpen`] when the store is open.
    pub fn open(&self) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if state.is_open {
            return Err(StoreError::AlreadyOpen);
        }
        state.is_open = true;
        debug!("opened in-memory store");
        Ok(())
    }

    /// Returns true when the store is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.lock().is_ok_and(|state| state.is_open)
    }

    /// Locks the store state.
    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Store("in-memory store mutex poisoned".to_string()))
    }

    /// Locks the store state, requiring it to be open.
    fn lock_open(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        let state = self.lock()?;
        if !state.is_open {
            return Err(StoreError::Closed);
        }
        Ok(state)
    }
}

/// Records a timing when a profiler is attached.
fn record_timing(profiler: Option<&Arc<StorageProfiler>>, name: &str, started: Instant) {
    if let Some(profiler) = profiler {
        profiler.record(name, started.elapsed());
    }
}

impl AttributeContainerStore for InMemoryAttributeContainerStore {
    fn add_attribute_container(
        &self,
        container: &mut AttributeContainer,
    ) -> Result<(), StoreError> {
        let started = Instant::now();
        let mut state = self.lock_open()?;
        let container_type = container.container_type().to_lowercase();
        let sequence_number = state.sequence_numbers.advance(&container_type);
        container.set_identifier(AttributeContainerIdentifier::new(
            container_type.clone(),
            sequence_number,
        ));
        state.containers.entry(container_type).or_default().push(container.clone());
        record_timing(state.profiler.as_ref(), PROFILE_WRITE_NEW, started);
        Ok(())
    }

    fn update_attribute_container(&self, container: &AttributeContainer) -> Result<(), StoreError> {
        let started = Instant::now();
        let mut state = self.lock_open()?;
        let identifier = container.identifier();
        let missing = || {
            StoreError::MissingContainer(format!(
                "unable to update non-existing attribute container: {identifier}"
            ))
        };
        let index = identifier_index(identifier).map_err(|_| missing())?;
        let slot = state
            .containers
            .get_mut(&container.container_type().to_lowercase())
            .and_then(|containers| usize::try_from(index).ok().and_then(|i| containers.get_mut(i)))
            .ok_or_else(missing)?;
        *slot = container.clone();
        record_timing(state.profiler.as_ref(), PROFILE_WRITE_EXISTING, started);
        Ok(())
    }

    fn get_attribute_container_by_index(
        &self,
        container_type: &str,
        index: u64,
    ) -> Result<Option<AttributeContainer>, StoreError> {
        let started = Instant::now();
        let state = self.lock_open()?;
        let container = state
            .containers
            .get(&container_type.to_lowercase())
            .and_then(|containers| usize::try_from(index).ok().and_then(|i| containers.get(i)))
            .cloned();
        record_timing(state.profiler.as_ref(), PROFILE_GET_CONTAINER_BY_INDEX, started);
        Ok(container)
    }

    fn get_attribute_containers(
        &self,
        container_type: &str,
        filter_expression: Option<&str>,
    ) -> Result<Vec<AttributeContainer>, StoreError> {
        let started = Instant::now();
        let expression = parse_filter_expression(filter_expression)?;
        let state = self.lock_open()?;
        let containers = state
            .containers
            .get(&container_type.to_lowercase())
            .map(|containers| {
                containers
                    .iter()
                    .filter(|container| container.matches_expression(expression.as_ref()))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        record_timing(state.profiler.as_ref(), PROFILE_GET_CONTAINERS, started);
        Ok(containers)
    }

    fn get_number_of_attribute_containers(&self, container_type: &str) -> Result<u64, StoreError> {
        let state = self.lock_open()?;
        let count = state.containers.get(&container_type.to_lowercase()).map_or(0, Vec::len);
        u64::try_from(count).map_err(|_| StoreError::Store("container count overflow".to_string()))
    }

    fn close(&self) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if !state.is_open {
            return Err(StoreError::AlreadyClosed);
        }
        state.is_open = false;
        debug!(container_types = state.containers.len(), "closed in-memory store");
        Ok(())
    }

    fn set_storage_profiler(&self, profiler: Option<Arc<StorageProfiler>>) {
        if let Ok(mut state) = self.lock() {
            state.profiler = profiler;
        }
    }
}
