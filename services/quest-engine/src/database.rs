use crate::config::DatabaseConfig;
use crate::errors::Result;
use crate::models::{DebitOutcome, Quest, QuestId, User, UserHistory, UserId};
use crate::store::{LedgerStore, LedgerTransaction};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::time::Duration;
use tracing::info;

/// PostgreSQL-backed ledger
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to database...");

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.url)
            .await?;

        sqlx::query("SELECT 1").fetch_one(&pool).await?;

        info!("Database connection verified");

        Ok(PgLedger { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        PgLedger { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LedgerStore for PgLedger {
    async fn create_user(&self, name: &str, balance: i64) -> Result<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (name, balance)
            VALUES ($1, $2)
            RETURNING id, name, balance
            "#,
        )
        .bind(name)
        .bind(balance)
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }

    async fn create_quest(&self, name: &str, cost: i64) -> Result<Quest> {
        let quest = sqlx::query_as::<_, Quest>(
            r#"
            INSERT INTO quests (name, cost)
            VALUES ($1, $2)
            RETURNING id, name, cost
            "#,
        )
        .bind(name)
        .bind(cost)
        .fetch_one(&self.pool)
        .await?;

        Ok(quest)
    }

    async fn get_user_with_completed_quests(&self, user_id: UserId) -> Result<Option<UserHistory>> {
        // Both reads come from one snapshot so the balance matches the listed completions.
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await?;

        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, balance FROM users WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(user) = user else {
            return Ok(None);
        };

        let completed_quests = sqlx::query_as::<_, Quest>(
            r#"
            SELECT q.id, q.name, q.cost
            FROM completed_quests c
            JOIN quests q ON c.quest_id = q.id
            WHERE c.user_id = $1
            ORDER BY c.id
            "#,
        )
        .bind(user_id)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(UserHistory {
            user,
            completed_quests,
        }))
    }

    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgLedgerTransaction { tx }))
    }

    async fn close(&self) {
        info!("Closing database pool");
        self.pool.close().await;
    }
}

/// One completion transaction; sqlx rolls it back if dropped uncommitted.
pub struct PgLedgerTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTransaction for PgLedgerTransaction {
    async fn get_quest_cost(&mut self, quest_id: QuestId) -> Result<Option<i64>> {
        let cost = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT cost FROM quests WHERE id = $1
            "#,
        )
        .bind(quest_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(cost)
    }

    async fn get_user_balance(&mut self, user_id: UserId) -> Result<Option<i64>> {
        let balance = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT balance FROM users WHERE id = $1 FOR UPDATE
            "#,
        )
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(balance)
    }

    async fn has_completed(&mut self, user_id: UserId, quest_id: QuestId) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM completed_quests WHERE user_id = $1 AND quest_id = $2
            )
            "#,
        )
        .bind(user_id)
        .bind(quest_id)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(exists)
    }

    async fn debit_and_record(
        &mut self,
        user_id: UserId,
        quest_id: QuestId,
        cost: i64,
    ) -> Result<DebitOutcome> {
        let remaining = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE users
            SET balance = balance - $1
            WHERE id = $2 AND balance >= $1
            RETURNING balance
            "#,
        )
        .bind(cost)
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        let Some(remaining_balance) = remaining else {
            let available = sqlx::query_scalar::<_, i64>(
                r#"
                SELECT balance FROM users WHERE id = $1
                "#,
            )
            .bind(user_id)
            .fetch_optional(&mut *self.tx)
            .await?;

            return Ok(match available {
                Some(available) => DebitOutcome::InsufficientBalance { available },
                None => DebitOutcome::UserNotFound,
            });
        };

        sqlx::query(
            r#"
            INSERT INTO completed_quests (user_id, quest_id, cost, completed_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(user_id)
        .bind(quest_id)
        .bind(cost)
        .bind(Utc::now())
        .execute(&mut *self.tx)
        .await?;

        Ok(DebitOutcome::Debited { remaining_balance })
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
