//! Ledger store seam shared by the PostgreSQL and in-process backends.
//!
//! Completion logic only ever touches balances through a [`LedgerTransaction`].
//! A transaction holds the user's row lock from the first balance read until it
//! is committed or dropped; dropping it without `commit` rolls everything back.

use crate::errors::Result;
use crate::models::{DebitOutcome, Quest, QuestId, User, UserHistory, UserId};
use async_trait::async_trait;

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn create_user(&self, name: &str, balance: i64) -> Result<User>;

    async fn create_quest(&self, name: &str, cost: i64) -> Result<Quest>;

    /// Read-only history view; `None` when the user does not exist.
    async fn get_user_with_completed_quests(&self, user_id: UserId) -> Result<Option<UserHistory>>;

    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>>;

    /// Release backend resources at shutdown.
    async fn close(&self);
}

#[async_trait]
pub trait LedgerTransaction: Send {
    async fn get_quest_cost(&mut self, quest_id: QuestId) -> Result<Option<i64>>;

    /// Reads the balance and locks the user's row for the rest of the transaction.
    async fn get_user_balance(&mut self, user_id: UserId) -> Result<Option<i64>>;

    async fn has_completed(&mut self, user_id: UserId, quest_id: QuestId) -> Result<bool>;

    /// Debits `cost` only if the balance still covers it, then records the completion.
    async fn debit_and_record(
        &mut self,
        user_id: UserId,
        quest_id: QuestId,
        cost: i64,
    ) -> Result<DebitOutcome>;

    async fn commit(self: Box<Self>) -> Result<()>;
}
