//! In-process ledger with the same transactional guarantees as the PostgreSQL store.
//!
//! Each user row sits behind its own async mutex. A transaction takes the row
//! lock on first touch and keeps it until commit or drop, so completions for one
//! user serialize while other users proceed untouched. Writes are staged and
//! only applied in `commit`; a dropped transaction leaves no trace.
//!
//! Committed user rows are mirrored outside the row mutex and only updated
//! under the completions write lock, so history reads see a consistent
//! snapshot without waiting on open transactions.

use crate::errors::{QuestEngineError, Result};
use crate::models::{CompletedQuest, DebitOutcome, Quest, QuestId, User, UserHistory, UserId};
use crate::store::{LedgerStore, LedgerTransaction};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug)]
struct UserRow {
    name: String,
    balance: i64,
}

#[derive(Default)]
struct Tables {
    users: DashMap<UserId, Arc<Mutex<UserRow>>>,
    committed: DashMap<UserId, User>,
    quests: DashMap<QuestId, Quest>,
    completions: RwLock<Vec<CompletedQuest>>,
    next_user_id: AtomicI64,
    next_quest_id: AtomicI64,
}

#[derive(Clone, Default)]
pub struct MemoryLedger {
    tables: Arc<Tables>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed completion records, oldest first.
    pub fn completions(&self) -> Vec<CompletedQuest> {
        self.tables.completions.read().clone()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn create_user(&self, name: &str, balance: i64) -> Result<User> {
        if balance < 0 {
            return Err(QuestEngineError::Storage(
                "check constraint violated: balance >= 0".to_string(),
            ));
        }

        let id = self.tables.next_user_id.fetch_add(1, Ordering::SeqCst) + 1;
        let row = UserRow {
            name: name.to_string(),
            balance,
        };
        let user = User {
            id,
            name: name.to_string(),
            balance,
        };
        self.tables.committed.insert(id, user.clone());
        self.tables.users.insert(id, Arc::new(Mutex::new(row)));

        Ok(user)
    }

    async fn create_quest(&self, name: &str, cost: i64) -> Result<Quest> {
        if cost < 0 {
            return Err(QuestEngineError::Storage(
                "check constraint violated: cost >= 0".to_string(),
            ));
        }

        let id = self.tables.next_quest_id.fetch_add(1, Ordering::SeqCst) + 1;
        let quest = Quest {
            id,
            name: name.to_string(),
            cost,
        };
        self.tables.quests.insert(id, quest.clone());

        Ok(quest)
    }

    async fn get_user_with_completed_quests(&self, user_id: UserId) -> Result<Option<UserHistory>> {
        let (user, quest_ids) = {
            let completions = self.tables.completions.read();
            let Some(user) = self.tables.committed.get(&user_id).map(|u| u.value().clone())
            else {
                return Ok(None);
            };
            let quest_ids: Vec<QuestId> = completions
                .iter()
                .filter(|c| c.user_id == user_id)
                .map(|c| c.quest_id)
                .collect();
            (user, quest_ids)
        };

        let completed_quests = quest_ids
            .into_iter()
            .filter_map(|id| self.tables.quests.get(&id).map(|q| q.value().clone()))
            .collect();

        Ok(Some(UserHistory {
            user,
            completed_quests,
        }))
    }

    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>> {
        Ok(Box::new(MemoryTransaction {
            tables: Arc::clone(&self.tables),
            locked: HashMap::new(),
            staged: Vec::new(),
        }))
    }

    async fn close(&self) {}
}

#[derive(Debug, Clone, Copy)]
struct StagedDebit {
    user_id: UserId,
    quest_id: QuestId,
    cost: i64,
}

pub struct MemoryTransaction {
    tables: Arc<Tables>,
    locked: HashMap<UserId, OwnedMutexGuard<UserRow>>,
    staged: Vec<StagedDebit>,
}

impl MemoryTransaction {
    /// Takes the row lock for `user_id`, returning false if the user does not exist.
    async fn lock_user(&mut self, user_id: UserId) -> bool {
        if self.locked.contains_key(&user_id) {
            return true;
        }

        let Some(row) = self.tables.users.get(&user_id).map(|r| Arc::clone(r.value())) else {
            return false;
        };

        let guard = row.lock_owned().await;
        self.locked.insert(user_id, guard);
        true
    }

    /// Balance as this transaction sees it, staged debits included.
    fn staged_balance(&self, user_id: UserId) -> Option<i64> {
        let row = self.locked.get(&user_id)?;
        let pending: i64 = self
            .staged
            .iter()
            .filter(|d| d.user_id == user_id)
            .map(|d| d.cost)
            .sum();
        Some(row.balance - pending)
    }
}

#[async_trait]
impl LedgerTransaction for MemoryTransaction {
    async fn get_quest_cost(&mut self, quest_id: QuestId) -> Result<Option<i64>> {
        Ok(self.tables.quests.get(&quest_id).map(|q| q.cost))
    }

    async fn get_user_balance(&mut self, user_id: UserId) -> Result<Option<i64>> {
        if !self.lock_user(user_id).await {
            return Ok(None);
        }
        Ok(self.staged_balance(user_id))
    }

    async fn has_completed(&mut self, user_id: UserId, quest_id: QuestId) -> Result<bool> {
        if self
            .staged
            .iter()
            .any(|d| d.user_id == user_id && d.quest_id == quest_id)
        {
            return Ok(true);
        }

        let committed = self
            .tables
            .completions
            .read()
            .iter()
            .any(|c| c.user_id == user_id && c.quest_id == quest_id);
        Ok(committed)
    }

    async fn debit_and_record(
        &mut self,
        user_id: UserId,
        quest_id: QuestId,
        cost: i64,
    ) -> Result<DebitOutcome> {
        if !self.lock_user(user_id).await {
            return Ok(DebitOutcome::UserNotFound);
        }

        if !self.tables.quests.contains_key(&quest_id) {
            return Err(QuestEngineError::Storage(format!(
                "foreign key violation: quest {} does not exist",
                quest_id
            )));
        }

        let available = self.staged_balance(user_id).unwrap_or_default();
        if available < cost {
            return Ok(DebitOutcome::InsufficientBalance { available });
        }

        self.staged.push(StagedDebit {
            user_id,
            quest_id,
            cost,
        });

        Ok(DebitOutcome::Debited {
            remaining_balance: available - cost,
        })
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryTransaction {
            tables,
            mut locked,
            staged,
        } = *self;

        if staged.iter().any(|d| !locked.contains_key(&d.user_id)) {
            return Err(QuestEngineError::Storage(
                "staged debit without a row lock".to_string(),
            ));
        }

        let mut completions = tables.completions.write();
        for debit in staged {
            if let Some(row) = locked.get_mut(&debit.user_id) {
                row.balance -= debit.cost;
                if let Some(mut user) = tables.committed.get_mut(&debit.user_id) {
                    user.balance = row.balance;
                }
            }

            let id = completions.len() as i64 + 1;
            completions.push(CompletedQuest {
                id,
                user_id: debit.user_id,
                quest_id: debit.quest_id,
                cost: debit.cost,
                completed_at: Utc::now(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn balance_of(ledger: &MemoryLedger, user_id: UserId) -> i64 {
        ledger
            .get_user_with_completed_quests(user_id)
            .await
            .unwrap()
            .unwrap()
            .user
            .balance
    }

    #[tokio::test]
    async fn test_ids_start_at_one() {
        let ledger = MemoryLedger::new();
        let alice = ledger.create_user("Alice", 100).await.unwrap();
        let quest = ledger.create_quest("Fetch Water", 30).await.unwrap();
        let bob = ledger.create_user("Bob", 5).await.unwrap();

        assert_eq!(alice.id, 1);
        assert_eq!(quest.id, 1);
        assert_eq!(bob.id, 2);
    }

    #[tokio::test]
    async fn test_rejects_negative_balance() {
        let ledger = MemoryLedger::new();
        assert!(ledger.create_user("Mallory", -1).await.is_err());
    }

    #[tokio::test]
    async fn test_commit_applies_debit_and_record() {
        let ledger = MemoryLedger::new();
        let user = ledger.create_user("Alice", 100).await.unwrap();
        let quest = ledger.create_quest("Fetch Water", 30).await.unwrap();

        let mut tx = ledger.begin().await.unwrap();
        assert_eq!(tx.get_user_balance(user.id).await.unwrap(), Some(100));
        let outcome = tx.debit_and_record(user.id, quest.id, 30).await.unwrap();
        assert_eq!(outcome, DebitOutcome::Debited { remaining_balance: 70 });
        tx.commit().await.unwrap();

        assert_eq!(balance_of(&ledger, user.id).await, 70);
        let completions = ledger.completions();
        assert_eq!(completions.len(), 1);
        assert_eq!(completions[0].user_id, user.id);
        assert_eq!(completions[0].quest_id, quest.id);
        assert_eq!(completions[0].cost, 30);
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let ledger = MemoryLedger::new();
        let user = ledger.create_user("Alice", 100).await.unwrap();
        let quest = ledger.create_quest("Fetch Water", 30).await.unwrap();

        {
            let mut tx = ledger.begin().await.unwrap();
            tx.debit_and_record(user.id, quest.id, 30).await.unwrap();
        }

        assert_eq!(balance_of(&ledger, user.id).await, 100);
        assert!(ledger.completions().is_empty());
    }

    #[tokio::test]
    async fn test_debit_rechecks_staged_balance() {
        let ledger = MemoryLedger::new();
        let user = ledger.create_user("Alice", 10).await.unwrap();
        let quest = ledger.create_quest("Climb Hill", 6).await.unwrap();

        let mut tx = ledger.begin().await.unwrap();
        tx.debit_and_record(user.id, quest.id, 6).await.unwrap();
        let second = tx.debit_and_record(user.id, quest.id, 6).await.unwrap();

        assert_eq!(second, DebitOutcome::InsufficientBalance { available: 4 });
    }

    #[tokio::test]
    async fn test_debit_unknown_user() {
        let ledger = MemoryLedger::new();
        let quest = ledger.create_quest("Climb Hill", 6).await.unwrap();

        let mut tx = ledger.begin().await.unwrap();
        let outcome = tx.debit_and_record(42, quest.id, 6).await.unwrap();
        assert_eq!(outcome, DebitOutcome::UserNotFound);
    }

    #[tokio::test]
    async fn test_row_lock_blocks_same_user_only() {
        let ledger = MemoryLedger::new();
        let alice = ledger.create_user("Alice", 10).await.unwrap();
        let bob = ledger.create_user("Bob", 10).await.unwrap();

        let mut holder = ledger.begin().await.unwrap();
        holder.get_user_balance(alice.id).await.unwrap();

        let mut contender = ledger.begin().await.unwrap();
        let blocked =
            tokio::time::timeout(Duration::from_millis(50), contender.get_user_balance(alice.id))
                .await;
        assert!(blocked.is_err());

        let mut other = ledger.begin().await.unwrap();
        let free = tokio::time::timeout(Duration::from_millis(50), other.get_user_balance(bob.id))
            .await
            .expect("unrelated user must not block");
        assert_eq!(free.unwrap(), Some(10));

        drop(holder);
        let mut next = ledger.begin().await.unwrap();
        assert_eq!(next.get_user_balance(alice.id).await.unwrap(), Some(10));
    }

    #[tokio::test]
    async fn test_history_reads_past_open_transaction() {
        let ledger = MemoryLedger::new();
        let user = ledger.create_user("Alice", 100).await.unwrap();
        let quest = ledger.create_quest("Fetch Water", 30).await.unwrap();

        let mut tx = ledger.begin().await.unwrap();
        assert_eq!(tx.get_user_balance(user.id).await.unwrap(), Some(100));
        tx.debit_and_record(user.id, quest.id, 30).await.unwrap();

        let history = tokio::time::timeout(
            Duration::from_millis(200),
            ledger.get_user_with_completed_quests(user.id),
        )
        .await
        .expect("history must not wait on the row lock")
        .unwrap()
        .unwrap();
        assert_eq!(history.user.balance, 100);
        assert!(history.completed_quests.is_empty());

        tx.commit().await.unwrap();
        let history = ledger.get_user_with_completed_quests(user.id).await.unwrap().unwrap();
        assert_eq!(history.user.balance, 70);
        assert_eq!(history.completed_quests, vec![quest]);
    }
}
