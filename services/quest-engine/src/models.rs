use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub type UserId = i64;
pub type QuestId = i64;

/// A registered user and their spendable point balance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub balance: i64,
}

/// A named unit of work with a fixed point cost
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Quest {
    pub id: QuestId,
    pub name: String,
    pub cost: i64,
}

/// Durable record that a user paid a quest's cost
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CompletedQuest {
    pub id: i64,
    pub user_id: UserId,
    pub quest_id: QuestId,
    pub cost: i64,
    pub completed_at: DateTime<Utc>,
}

/// User registration request
#[derive(Debug, Deserialize, Serialize, validator::Validate)]
pub struct CreateUserRequest {
    pub name: String,
    #[validate(range(min = 0))]
    pub balance: i64,
}

/// Quest definition request
#[derive(Debug, Deserialize, Serialize, validator::Validate)]
pub struct CreateQuestRequest {
    pub name: String,
    #[validate(range(min = 0))]
    pub cost: i64,
}

/// Quest completion request
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct CompleteQuestRequest {
    pub user_id: UserId,
    pub quest_id: QuestId,
}

/// Result of a committed completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionReceipt {
    pub user_id: UserId,
    pub quest_id: QuestId,
    pub cost: i64,
    pub remaining_balance: i64,
}

/// A user together with every quest they completed, in completion order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserHistory {
    pub user: User,
    pub completed_quests: Vec<Quest>,
}

/// Whether the same quest may be completed more than once by one user
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatPolicy {
    #[default]
    Repeatable,
    Once,
}

/// Outcome of the conditional debit inside a ledger transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebitOutcome {
    Debited { remaining_balance: i64 },
    InsufficientBalance { available: i64 },
    UserNotFound,
}

/// Terminal state of a single completion request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionState {
    Committed,
    Rejected,
    Aborted,
}

impl CompletionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionState::Committed => "committed",
            CompletionState::Rejected => "rejected",
            CompletionState::Aborted => "aborted",
        }
    }
}
