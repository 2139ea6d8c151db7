//! Locks shared by the flow registry and the execution engine
//!
//! The registry lock keeps flow deletion from interleaving with writes that
//! need their flow to exist. Execution slots serialize work on one execution
//! and carry its cancel signal.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock};

use crate::domain::ids::ExecutionId;

/// Lock and cancel signal of one execution
pub(crate) struct ExecutionSlot {
    pub(crate) lock: Mutex<()>,
    pub(crate) cancel: watch::Sender<bool>,
    pub(crate) depth: usize,
}

impl ExecutionSlot {
    fn new(depth: usize) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            lock: Mutex::new(()),
            cancel,
            depth,
        }
    }
}

/// Per-execution slots, created on first use
#[derive(Default)]
pub(crate) struct SlotTable {
    slots: DashMap<ExecutionId, Arc<ExecutionSlot>>,
}

impl SlotTable {
    pub(crate) fn register(&self, id: &ExecutionId, depth: usize) {
        self.slots
            .insert(id.clone(), Arc::new(ExecutionSlot::new(depth)));
    }

    pub(crate) fn get(&self, id: &ExecutionId) -> Arc<ExecutionSlot> {
        self.slots
            .entry(id.clone())
            .or_insert_with(|| Arc::new(ExecutionSlot::new(0)))
            .clone()
    }

    /// Drop a slot nobody else holds
    pub(crate) fn release_if_idle(&self, id: &ExecutionId) {
        self.slots
            .remove_if(id, |_, slot| Arc::strong_count(slot) == 1);
    }

    /// Drop the slots of deleted executions and abort their in-flight calls
    pub(crate) fn forget(&self, ids: &[ExecutionId]) {
        for id in ids {
            if let Some((_, slot)) = self.slots.remove(id) {
                slot.cancel.send_replace(true);
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }
}

/// Registry lock and execution slots, cloned into every service that needs them
#[derive(Clone, Default)]
pub(crate) struct SharedLocks {
    /// Write side: flow deletion and status transitions. Read side: writes whose flow must exist.
    pub(crate) registry: Arc<RwLock<()>>,
    pub(crate) slots: Arc<SlotTable>,
}
