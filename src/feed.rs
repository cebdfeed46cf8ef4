//! Activity feed: most recent ledger entries across a user's accounts

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::core_types::{AccountNumber, UserId};
use crate::error::LedgerError;
use crate::ledger::Transaction;
use crate::persistence::LedgerStore;

pub struct ActivityFeed {
    store: Arc<dyn LedgerStore>,
    limit: usize,
}

impl ActivityFeed {
    pub fn new(store: Arc<dyn LedgerStore>, limit: usize) -> Self {
        Self { store, limit }
    }

    /// Up to `limit` entries, newest first. A user without accounts gets an
    /// empty feed.
    pub async fn feed(&self, user: UserId) -> Result<Vec<Transaction>, LedgerError> {
        let numbers: Vec<AccountNumber> = self
            .store
            .accounts_by_owner(user)
            .await?
            .into_iter()
            .map(|a| a.account_number)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        if numbers.is_empty() || self.limit == 0 {
            return Ok(Vec::new());
        }

        let entries = self.store.recent_transactions(&numbers, self.limit).await?;
        tracing::debug!(
            user,
            accounts = numbers.len(),
            entries = entries.len(),
            "Feed assembled"
        );
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;
    use crate::settlement::SettlementCoordinator;

    #[tokio::test]
    async fn test_empty_for_user_without_accounts() {
        let store: Arc<dyn LedgerStore> = Arc::new(MemoryStore::new());
        let feed = ActivityFeed::new(store, 10);
        assert!(feed.feed(42).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_only_own_accounts_newest_first() {
        let store: Arc<dyn LedgerStore> = Arc::new(MemoryStore::new());
        let coordinator = SettlementCoordinator::with_defaults(store.clone());
        let mine = coordinator.create_account(1).await.unwrap();
        let theirs = coordinator.create_account(2).await.unwrap();

        coordinator.deposit(&mine.account_number, 100, 1).await.unwrap();
        coordinator.deposit(&theirs.account_number, 50, 2).await.unwrap();
        coordinator.withdraw(&mine.account_number, 30, 1).await.unwrap();

        let entries = ActivityFeed::new(store, 10).feed(1).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].amount, 30);
        assert_eq!(entries[1].amount, 100);
        assert!(entries.iter().all(|e| e.account_number == mine.account_number));
    }
}
