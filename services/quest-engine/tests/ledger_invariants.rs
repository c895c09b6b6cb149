//! Property-based tests for the balance invariant
//!
//! For any sequence of completion attempts against one user:
//! - final balance == initial balance - Σ(cost of committed attempts)
//! - balance never drops below zero
//! - exactly one completion record exists per committed attempt

use futures_util::future::join_all;
use proptest::prelude::*;
use quest_engine::memory::MemoryLedger;
use quest_engine::models::{CompleteQuestRequest, RepeatPolicy};
use quest_engine::{LedgerStore, QuestEngineError, QuestService};
use std::sync::Arc;
use std::time::Duration;

/// Strategy for quest costs, zero included
fn cost_strategy() -> impl Strategy<Value = i64> {
    0i64..60
}

/// Strategy for attempt sequences as indices into the quest list
fn attempts_strategy() -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(0usize..8, 1..40)
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .expect("runtime")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_sequential_attempts_conserve_balance(
        initial in 0i64..500,
        costs in prop::collection::vec(cost_strategy(), 1..8),
        attempts in attempts_strategy(),
    ) {
        let rt = runtime();
        let (final_balance, spent, committed, records) = rt.block_on(async {
            let ledger = MemoryLedger::new();
            let service = QuestService::new(
                Arc::new(ledger.clone()),
                RepeatPolicy::Repeatable,
                Duration::from_secs(5),
            );
            let user = ledger.create_user("Prop", initial).await.unwrap();
            let mut quests = Vec::new();
            for (i, cost) in costs.iter().enumerate() {
                quests.push(ledger.create_quest(&format!("quest-{}", i), *cost).await.unwrap());
            }

            let mut spent = 0i64;
            let mut committed = 0usize;
            for index in &attempts {
                let quest = &quests[index % quests.len()];
                let result = service
                    .complete_quest(CompleteQuestRequest { user_id: user.id, quest_id: quest.id })
                    .await;
                match result {
                    Ok(receipt) => {
                        spent += receipt.cost;
                        committed += 1;
                        assert!(receipt.remaining_balance >= 0);
                    }
                    Err(QuestEngineError::InsufficientBalance { .. }) => {}
                    Err(e) => panic!("unexpected error: {}", e),
                }
            }

            let history = ledger.get_user_with_completed_quests(user.id).await.unwrap().unwrap();
            (history.user.balance, spent, committed, history.completed_quests.len())
        });

        prop_assert!(final_balance >= 0);
        prop_assert_eq!(final_balance, initial - spent);
        prop_assert_eq!(records, committed);
    }

    #[test]
    fn prop_concurrent_attempts_never_overdraw(
        initial in 0i64..200,
        cost in 1i64..40,
        attempts in 1usize..24,
    ) {
        let rt = runtime();
        let (final_balance, committed, records) = rt.block_on(async {
            let ledger = MemoryLedger::new();
            let service = Arc::new(QuestService::new(
                Arc::new(ledger.clone()),
                RepeatPolicy::Repeatable,
                Duration::from_secs(5),
            ));
            let user = ledger.create_user("Prop", initial).await.unwrap();
            let quest = ledger.create_quest("contested", cost).await.unwrap();
            let request = CompleteQuestRequest { user_id: user.id, quest_id: quest.id };

            let handles = (0..attempts).map(|_| {
                let service = Arc::clone(&service);
                tokio::spawn(async move { service.complete_quest(request).await })
            });
            let committed = join_all(handles)
                .await
                .into_iter()
                .filter(|joined| matches!(joined, Ok(Ok(_))))
                .count();

            let balance = ledger
                .get_user_with_completed_quests(user.id)
                .await
                .unwrap()
                .unwrap()
                .user
                .balance;
            (balance, committed, ledger.completions().len())
        });

        let affordable = std::cmp::min(attempts as i64, initial / cost);
        prop_assert_eq!(committed as i64, affordable);
        prop_assert_eq!(final_balance, initial - affordable * cost);
        prop_assert_eq!(records, committed);
    }
}
