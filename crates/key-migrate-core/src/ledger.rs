//! Record of entities created during one insert, for compensation.
//!
//! Every successful create is appended. If the insert fails, [`Ledger::rollback`]
//! destroys the recorded entities in reverse creation order.

use std::sync::Mutex;

use tracing::{info, warn};

use crate::store::{EntityRef, EntityStore};

#[derive(Debug, Default)]
pub struct Ledger {
    created: Mutex<Vec<EntityRef>>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entity: EntityRef) {
        match self.created.lock() {
            Ok(mut created) => created.push(entity),
            Err(poisoned) => poisoned.into_inner().push(entity),
        }
    }

    pub fn len(&self) -> usize {
        match self.created.lock() {
            Ok(created) => created.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn take(&self) -> Vec<EntityRef> {
        match self.created.lock() {
            Ok(mut created) => std::mem::take(&mut *created),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }

    /// Destroy everything recorded so far, newest first.
    ///
    /// Individual failures are logged and skipped. Returns the number of
    /// entities that could not be destroyed.
    pub async fn rollback(&self, store: &dyn EntityStore) -> usize {
        let entities = self.take();
        let total = entities.len();
        let mut failed = 0;
        for entity in entities.iter().rev() {
            if let Err(e) = store.destroy(entity).await {
                failed += 1;
                warn!(stage = "rollback", ?entity, error = %e, "could not destroy entity");
            }
        }
        info!(stage = "rollback", destroyed = total - failed, failed, "rollback finished");
        failed
    }
}
