//! Backing stores for evicted bricks
//!
//! Every populated octree node flushes its brick into one [`BackingStore`]
//! right after it is built. Stores are created through a [`StoreProvider`],
//! which is where the storage budget is enforced.

pub mod store;
pub mod budget;

pub use store::{BackingStore, CompressedStore, MemoryStore, TempFileStore};
pub use budget::StorageBudget;

use crate::core::config::BackingStoreKind;
use crate::core::types::Result;
use crate::octree::NodePath;

/// Creates and fills the backing store of one node
pub trait StoreProvider {
    /// Create a store for the node at `path` holding `bytes`
    fn store(&mut self, path: &NodePath, bytes: &[u8]) -> Result<Box<dyn BackingStore>>;

    /// Bytes handed out so far
    fn stored_bytes(&self) -> usize;
}

/// Provider creating one store of a fixed kind per node, under a budget
pub struct BackingStores {
    kind: BackingStoreKind,
    budget: StorageBudget,
}

impl BackingStores {
    pub fn new(kind: BackingStoreKind, budget: StorageBudget) -> Self {
        Self { kind, budget }
    }

    pub fn kind(&self) -> BackingStoreKind {
        self.kind
    }

    pub fn budget(&self) -> &StorageBudget {
        &self.budget
    }

    fn create(&self) -> Result<Box<dyn BackingStore>> {
        Ok(match self.kind {
            BackingStoreKind::TempFile => Box::new(TempFileStore::new()?),
            BackingStoreKind::Memory => Box::new(MemoryStore::new()),
            BackingStoreKind::Compressed => Box::new(CompressedStore::new()),
        })
    }
}

impl StoreProvider for BackingStores {
    fn store(&mut self, path: &NodePath, bytes: &[u8]) -> Result<Box<dyn BackingStore>> {
        self.budget.reserve(bytes.len())?;
        let mut store = self.create()?;
        if let Err(e) = store.write(bytes) {
            self.budget.release(bytes.len());
            return Err(e);
        }
        log::trace!("Stored {} bytes for node {}", bytes.len(), path);
        Ok(store)
    }

    fn stored_bytes(&self) -> usize {
        self.budget.used()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::Error;

    #[test]
    fn test_provider_creates_each_kind() {
        for kind in [BackingStoreKind::TempFile, BackingStoreKind::Memory, BackingStoreKind::Compressed] {
            let mut stores = BackingStores::new(kind, StorageBudget::unbounded());
            let mut store = stores.store(&NodePath::root(), &[1, 2, 3, 4]).unwrap();
            assert_eq!(store.size(), 4);
            assert_eq!(store.read().unwrap(), vec![1, 2, 3, 4]);
            assert_eq!(stores.stored_bytes(), 4);
        }
    }

    #[test]
    fn test_provider_enforces_budget() {
        let mut stores = BackingStores::new(BackingStoreKind::Memory, StorageBudget::new(Some(6)));
        stores.store(&NodePath::root(), &[0; 4]).unwrap();
        let result = stores.store(&NodePath::root().child(3), &[0; 4]);
        assert!(matches!(result, Err(Error::BudgetExceeded { requested: 4, available: 2 })));
        assert_eq!(stores.stored_bytes(), 4);
    }
}
