use std::collections::HashSet;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::trace;

use clustore_types::{ItemId, TransactionKey};

use crate::error::{ManagerError, ManagerResult};

/// Item write locks, keyed both ways.
///
/// `owners` maps each locked item to its transaction; `held` maps each
/// registered transaction to the items it has locked. An item is owned by
/// at most one transaction. Locking never waits: a conflict fails at once.
///
/// Lock order is always `held` shard, then `owners` shard.
#[derive(Debug, Default)]
pub struct LockTable {
    owners: DashMap<ItemId, TransactionKey>,
    held: DashMap<TransactionKey, HashSet<ItemId>>,
}

impl LockTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transaction with an empty lock set.
    pub fn register(&self, tx: &TransactionKey) -> ManagerResult<()> {
        match self.held.entry(*tx) {
            Entry::Occupied(_) => Err(ManagerError::DuplicateTransaction(*tx)),
            Entry::Vacant(slot) => {
                slot.insert(HashSet::new());
                Ok(())
            }
        }
    }

    /// Whether `tx` has begun and not yet finished.
    pub fn is_registered(&self, tx: &TransactionKey) -> bool {
        self.held.contains_key(tx)
    }

    /// Lock `item` for `tx`.
    ///
    /// With no transaction, succeeds only if nobody holds the item, and
    /// records nothing. Re-locking by the owner is a no-op.
    pub fn lock(&self, item: &ItemId, tx: Option<&TransactionKey>) -> ManagerResult<()> {
        let Some(tx) = tx else {
            return match self.owners.get(item) {
                Some(owner) => Err(ManagerError::LockConflict {
                    item: *item,
                    owner: *owner,
                    requester: None,
                }),
                None => Ok(()),
            };
        };

        let mut held = self
            .held
            .get_mut(tx)
            .ok_or(ManagerError::UnknownTransaction(*tx))?;

        match self.owners.entry(*item) {
            Entry::Occupied(owner) if owner.get() == tx => {
                held.insert(*item);
                Ok(())
            }
            Entry::Occupied(owner) => Err(ManagerError::LockConflict {
                item: *item,
                owner: *owner.get(),
                requester: Some(*tx),
            }),
            Entry::Vacant(slot) => {
                slot.insert(*tx);
                held.insert(*item);
                trace!(item = %item, tx = %tx, "item locked");
                Ok(())
            }
        }
    }

    /// Forget `tx` and release every item it holds. Returns the number of
    /// items released.
    pub fn release(&self, tx: &TransactionKey) -> ManagerResult<usize> {
        let (_, items) = self
            .held
            .remove(tx)
            .ok_or(ManagerError::UnknownTransaction(*tx))?;
        for item in &items {
            self.owners.remove_if(item, |_, owner| owner == tx);
        }
        Ok(items.len())
    }

    /// Transaction holding `item`, if any.
    pub fn owner(&self, item: &ItemId) -> Option<TransactionKey> {
        self.owners.get(item).map(|owner| *owner)
    }

    /// Items currently held by `tx`.
    pub fn locked_items(&self, tx: &TransactionKey) -> Vec<ItemId> {
        self.held
            .get(tx)
            .map(|items| items.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of open transactions.
    pub fn active_transactions(&self) -> usize {
        self.held.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn register_twice_is_duplicate() {
        let locks = LockTable::new();
        let tx = TransactionKey::new();
        locks.register(&tx).unwrap();
        assert!(matches!(
            locks.register(&tx),
            Err(ManagerError::DuplicateTransaction(_))
        ));
    }

    #[test]
    fn lock_requires_registered_transaction() {
        let locks = LockTable::new();
        let tx = TransactionKey::new();
        assert!(matches!(
            locks.lock(&ItemId::new(), Some(&tx)),
            Err(ManagerError::UnknownTransaction(_))
        ));
    }

    #[test]
    fn auto_commit_takes_no_lock() {
        let locks = LockTable::new();
        let item = ItemId::new();
        locks.lock(&item, None).unwrap();
        assert_eq!(locks.owner(&item), None);
    }

    #[test]
    fn second_transaction_conflicts() {
        let locks = LockTable::new();
        let (tx1, tx2) = (TransactionKey::new(), TransactionKey::new());
        locks.register(&tx1).unwrap();
        locks.register(&tx2).unwrap();
        let item = ItemId::new();

        locks.lock(&item, Some(&tx1)).unwrap();
        let err = locks.lock(&item, Some(&tx2)).unwrap_err();
        assert!(err.is_lock_conflict());
        assert!(locks.lock(&item, None).unwrap_err().is_lock_conflict());

        locks.release(&tx1).unwrap();
        locks.lock(&item, Some(&tx2)).unwrap();
        assert_eq!(locks.owner(&item), Some(tx2));
    }

    #[test]
    fn relock_is_idempotent() {
        let locks = LockTable::new();
        let tx = TransactionKey::new();
        locks.register(&tx).unwrap();
        let item = ItemId::new();
        locks.lock(&item, Some(&tx)).unwrap();
        locks.lock(&item, Some(&tx)).unwrap();
        assert_eq!(locks.locked_items(&tx), vec![item]);
        assert_eq!(locks.release(&tx).unwrap(), 1);
    }

    #[test]
    fn release_unknown_is_error() {
        let locks = LockTable::new();
        assert!(matches!(
            locks.release(&TransactionKey::new()),
            Err(ManagerError::UnknownTransaction(_))
        ));
    }

    #[test]
    fn release_frees_every_item() {
        let locks = LockTable::new();
        let tx = TransactionKey::new();
        locks.register(&tx).unwrap();
        let items: Vec<ItemId> = (0..5).map(|_| ItemId::new()).collect();
        for item in &items {
            locks.lock(item, Some(&tx)).unwrap();
        }
        assert_eq!(locks.release(&tx).unwrap(), 5);
        assert!(items.iter().all(|item| locks.owner(item).is_none()));
        assert_eq!(locks.active_transactions(), 0);
    }

    #[test]
    fn concurrent_lockers_have_one_winner() {
        let locks = Arc::new(LockTable::new());
        let item = ItemId::new();
        let txs: Vec<TransactionKey> = (0..8).map(|_| TransactionKey::new()).collect();
        for tx in &txs {
            locks.register(tx).unwrap();
        }

        let handles: Vec<_> = txs
            .iter()
            .map(|tx| {
                let locks = Arc::clone(&locks);
                let tx = *tx;
                std::thread::spawn(move || locks.lock(&item, Some(&tx)).is_ok())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
