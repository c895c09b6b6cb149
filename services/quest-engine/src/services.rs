use crate::errors::{QuestEngineError, Result};
use crate::metrics;
use crate::models::{
    CompleteQuestRequest, CompletionReceipt, CompletionState, CreateQuestRequest,
    CreateUserRequest, DebitOutcome, Quest, QuestId, RepeatPolicy, User, UserHistory, UserId,
};
use crate::store::{LedgerStore, LedgerTransaction};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use validator::Validate;

pub struct QuestService {
    store: Arc<dyn LedgerStore>,
    repeat_policy: RepeatPolicy,
    completion_timeout: Duration,
}

impl QuestService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        repeat_policy: RepeatPolicy,
        completion_timeout: Duration,
    ) -> Self {
        QuestService {
            store,
            repeat_policy,
            completion_timeout,
        }
    }

    /// Register a new user
    pub async fn create_user(&self, request: CreateUserRequest) -> Result<User> {
        request.validate()?;

        let user = self.store.create_user(&request.name, request.balance).await?;
        metrics::USERS_CREATED.inc();

        info!("Created user {} ({}) with balance {}", user.id, user.name, user.balance);

        Ok(user)
    }

    /// Define a new quest
    pub async fn create_quest(&self, request: CreateQuestRequest) -> Result<Quest> {
        request.validate()?;

        let quest = self.store.create_quest(&request.name, request.cost).await?;
        metrics::QUESTS_CREATED.inc();

        info!("Created quest {} ({}) with cost {}", quest.id, quest.name, quest.cost);

        Ok(quest)
    }

    /// User details plus every completed quest
    pub async fn get_user_history(&self, user_id: UserId) -> Result<UserHistory> {
        self.store
            .get_user_with_completed_quests(user_id)
            .await?
            .ok_or(QuestEngineError::UserNotFound(user_id))
    }

    /// Spend the quest's cost from the user's balance and record the completion.
    ///
    /// Runs as a single ledger transaction. The configured timeout bounds every
    /// step up to the staged debit; the commit itself is never cut short, so a
    /// `Timeout` always means nothing was written. On any error, or if the
    /// returned future is dropped before commit, the transaction is rolled back
    /// and no balance change is visible.
    pub async fn complete_quest(&self, request: CompleteQuestRequest) -> Result<CompletionReceipt> {
        let started = Instant::now();

        let result = match tokio::time::timeout(
            self.completion_timeout,
            self.prepare_completion(request.user_id, request.quest_id),
        )
        .await
        {
            Ok(Ok((tx, receipt))) => tx.commit().await.map(|_| receipt),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(QuestEngineError::Timeout(
                self.completion_timeout.as_millis() as u64,
            )),
        };

        let state = completion_state(&result);
        metrics::QUEST_COMPLETIONS
            .with_label_values(&[state.as_str()])
            .inc();
        metrics::COMPLETION_DURATION.observe(started.elapsed().as_secs_f64());

        match &result {
            Ok(receipt) => {
                metrics::POINTS_SPENT.inc_by(receipt.cost as u64);
                info!(
                    "User {} completed quest {} for {} points (remaining {})",
                    receipt.user_id, receipt.quest_id, receipt.cost, receipt.remaining_balance
                );
            }
            Err(e) if e.is_storage_error() => {
                error!(
                    "Completion of quest {} by user {} aborted: {}",
                    request.quest_id, request.user_id, e
                );
            }
            Err(e) => {
                warn!(
                    "Completion of quest {} by user {} {}: {}",
                    request.quest_id,
                    request.user_id,
                    state.as_str(),
                    e
                );
            }
        }

        result
    }

    /// Checks and stages the debit, handing back the still-open transaction.
    async fn prepare_completion(
        &self,
        user_id: UserId,
        quest_id: QuestId,
    ) -> Result<(Box<dyn LedgerTransaction>, CompletionReceipt)> {
        let mut tx = self.store.begin().await?;

        let cost = tx
            .get_quest_cost(quest_id)
            .await?
            .ok_or(QuestEngineError::QuestNotFound(quest_id))?;

        let balance = tx
            .get_user_balance(user_id)
            .await?
            .ok_or(QuestEngineError::UserNotFound(user_id))?;

        if self.repeat_policy == RepeatPolicy::Once && tx.has_completed(user_id, quest_id).await? {
            return Err(QuestEngineError::AlreadyCompleted { user_id, quest_id });
        }

        if balance < cost {
            return Err(QuestEngineError::InsufficientBalance {
                required: cost,
                available: balance,
            });
        }

        let remaining_balance = match tx.debit_and_record(user_id, quest_id, cost).await? {
            DebitOutcome::Debited { remaining_balance } => remaining_balance,
            DebitOutcome::InsufficientBalance { available } => {
                warn!(
                    "Balance of user {} dropped to {} before debit of {}",
                    user_id, available, cost
                );
                return Err(QuestEngineError::InsufficientBalance {
                    required: cost,
                    available,
                });
            }
            DebitOutcome::UserNotFound => return Err(QuestEngineError::UserNotFound(user_id)),
        };

        Ok((
            tx,
            CompletionReceipt {
                user_id,
                quest_id,
                cost,
                remaining_balance,
            },
        ))
    }
}

/// Storage-class failures abort the transaction; business outcomes reject it.
fn completion_state(result: &Result<CompletionReceipt>) -> CompletionState {
    match result {
        Ok(_) => CompletionState::Committed,
        Err(e) if e.is_storage_error() => CompletionState::Aborted,
        Err(_) => CompletionState::Rejected,
    }
}
