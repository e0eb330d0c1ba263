//! Integration tests for the reward accounting engine

mod common;

use common::{now, FailingStore, FixedPriceSource};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

use stocky::error::{PriceError, RewardError, StoreError};
use stocky::services::{
    fixed_clock, is_balanced, MemoryRewardStore, RewardService, RewardStore, SqliteRewardStore,
};
use stocky::types::{CreateRewardInput, EntryDirection, FeeBreakdown, LedgerAccount};

fn stores() -> Vec<(&'static str, Arc<dyn RewardStore>)> {
    let memory: Arc<dyn RewardStore> = Arc::new(MemoryRewardStore::new());
    let sqlite: Arc<dyn RewardStore> = Arc::new(SqliteRewardStore::new_in_memory().unwrap());
    vec![("memory", memory), ("sqlite", sqlite)]
}

fn prices() -> Arc<FixedPriceSource> {
    Arc::new(
        FixedPriceSource::new()
            .with_latest("AAPL", dec!(100.00))
            .with_latest("TCS", dec!(3456.78))
            .with_latest("BIG", Decimal::MAX)
            .failing("DOWN"),
    )
}

fn service(store: Arc<dyn RewardStore>, prices: Arc<FixedPriceSource>) -> RewardService {
    RewardService::new(store, prices).with_clock(fixed_clock(now()))
}

fn request(symbol: &str, quantity: Decimal) -> CreateRewardInput {
    CreateRewardInput {
        user_id: "u1".to_string(),
        symbol: symbol.to_string(),
        quantity,
        ..Default::default()
    }
}

// =============================================================================
// Pricing and ledger
// =============================================================================

#[tokio::test]
async fn test_reward_priced_with_fees_and_balanced_ledger() {
    for (name, store) in stores() {
        let service = service(store.clone(), prices());

        let reward = service
            .create_reward(CreateRewardInput {
                fees: FeeBreakdown::new(dec!(5.25), dec!(1.1), dec!(0.9), dec!(0)),
                ..request("aapl", dec!(5.5))
            })
            .await
            .unwrap();

        assert_eq!(reward.symbol, "AAPL", "{name}");
        assert_eq!(reward.unit_price, dec!(100.00), "{name}");
        assert_eq!(reward.total_cost, dec!(557.25), "{name}");
        assert_eq!(reward.rewarded_at, now(), "{name}");
        assert_eq!(reward.priced_at, now(), "{name}");

        let entries = store.ledger_for_reward(&reward.id).await.unwrap();
        assert_eq!(entries.len(), 3, "{name}");
        assert!(is_balanced(&entries), "{name}");

        let line = |account| entries.iter().find(|e| e.account == account).unwrap();
        let inventory = line(LedgerAccount::StockInventory);
        assert_eq!(inventory.amount, dec!(550.00));
        assert_eq!(inventory.units, dec!(5.5));
        assert_eq!(inventory.direction, EntryDirection::Debit);

        let fees = line(LedgerAccount::FeesExpense);
        assert_eq!(fees.amount, dec!(7.25));
        assert_eq!(fees.direction, EntryDirection::Debit);

        let cash = line(LedgerAccount::Cash);
        assert_eq!(cash.amount, dec!(557.25));
        assert_eq!(cash.direction, EntryDirection::Credit);
    }
}

#[tokio::test]
async fn test_total_cost_matches_price_times_quantity() {
    for (name, store) in stores() {
        let service = service(store, prices());

        let reward = service.create_reward(request("TCS", dec!(0.125))).await.unwrap();

        assert_eq!(
            reward.total_cost,
            (reward.unit_price * reward.quantity + reward.fees.total()).round_dp(4),
            "{name}"
        );
        assert_eq!(reward.total_cost, dec!(432.0975), "{name}");
    }
}

#[tokio::test]
async fn test_explicit_rewarded_at_is_kept() {
    let store: Arc<dyn RewardStore> = Arc::new(MemoryRewardStore::new());
    let service = service(store, prices());
    let earlier = now() - chrono::Duration::days(3);

    let reward = service
        .create_reward(CreateRewardInput {
            rewarded_at: Some(earlier),
            ..request("AAPL", dec!(1))
        })
        .await
        .unwrap();

    assert_eq!(reward.rewarded_at, earlier);
    assert_eq!(reward.priced_at, now());
}

// =============================================================================
// Adjustments
// =============================================================================

#[tokio::test]
async fn test_negative_quantity_requires_adjustment() {
    for (name, store) in stores() {
        let service = service(store.clone(), prices());

        let rejected = service.create_reward(request("AAPL", dec!(-2))).await;
        assert!(matches!(rejected, Err(RewardError::Validation(_))), "{name}");
        assert!(store.list_all("u1").await.unwrap().is_empty(), "{name}");

        let clawback = service
            .create_reward(CreateRewardInput {
                is_adjustment: true,
                fees: FeeBreakdown::new(dec!(1), dec!(0), dec!(0), dec!(0)),
                ..request("AAPL", dec!(-2))
            })
            .await
            .unwrap();

        assert_eq!(clawback.total_cost, dec!(-199.00), "{name}");
        let entries = store.ledger_for_reward(&clawback.id).await.unwrap();
        assert!(is_balanced(&entries), "{name}");
        assert!(entries.iter().all(|e| e.amount >= Decimal::ZERO), "{name}");
        let cash = entries
            .iter()
            .find(|e| e.account == LedgerAccount::Cash)
            .unwrap();
        assert_eq!(cash.direction, EntryDirection::Debit, "{name}");
        assert_eq!(cash.amount, dec!(199.00), "{name}");
    }
}

// =============================================================================
// Idempotency
// =============================================================================

#[tokio::test]
async fn test_duplicate_key_returns_existing_reward() {
    for (name, store) in stores() {
        let prices = prices();
        let service = service(store.clone(), prices.clone());
        let keyed = || CreateRewardInput {
            idempotency_key: Some("evt-1".to_string()),
            ..request("AAPL", dec!(2))
        };

        let first = service.create_reward(keyed()).await.unwrap();
        let second = service.create_reward(keyed()).await;

        match second {
            Err(RewardError::Duplicate(existing)) => assert_eq!(existing.id, first.id, "{name}"),
            other => panic!("{name}: expected duplicate, got {other:?}"),
        }

        // Duplicate short-circuits before pricing
        assert_eq!(prices.latest_calls(), 1, "{name}");
        assert_eq!(store.list_all("u1").await.unwrap().len(), 1, "{name}");
        assert_eq!(store.ledger_for_reward(&first.id).await.unwrap().len(), 3, "{name}");
    }
}

#[tokio::test]
async fn test_same_key_for_different_users_is_allowed() {
    for (name, store) in stores() {
        let service = service(store.clone(), prices());

        for user in ["u1", "u2"] {
            service
                .create_reward(CreateRewardInput {
                    user_id: user.to_string(),
                    idempotency_key: Some("evt-1".to_string()),
                    ..request("AAPL", dec!(1))
                })
                .await
                .unwrap();
        }

        assert_eq!(store.list_all("u1").await.unwrap().len(), 1, "{name}");
        assert_eq!(store.list_all("u2").await.unwrap().len(), 1, "{name}");
    }
}

#[tokio::test]
async fn test_requests_without_key_are_never_duplicates() {
    for (name, store) in stores() {
        let service = service(store.clone(), prices());

        service.create_reward(request("AAPL", dec!(1))).await.unwrap();
        service
            .create_reward(CreateRewardInput {
                idempotency_key: Some(String::new()),
                ..request("AAPL", dec!(1))
            })
            .await
            .unwrap();

        assert_eq!(store.list_all("u1").await.unwrap().len(), 2, "{name}");
    }
}

#[tokio::test]
async fn test_concurrent_duplicates_record_once() {
    for (name, store) in stores() {
        let service = service(store.clone(), prices());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = service.clone();
                tokio::spawn(async move {
                    service
                        .create_reward(CreateRewardInput {
                            idempotency_key: Some("race".to_string()),
                            ..request("AAPL", dec!(1))
                        })
                        .await
                })
            })
            .collect();

        let mut created = Vec::new();
        let mut duplicates = Vec::new();
        for handle in handles {
            match handle.await.unwrap() {
                Ok(reward) => created.push(reward),
                Err(RewardError::Duplicate(existing)) => duplicates.push(existing),
                Err(e) => panic!("{name}: unexpected error {e}"),
            }
        }

        assert_eq!(created.len(), 1, "{name}");
        assert_eq!(duplicates.len(), 7, "{name}");
        assert!(duplicates.iter().all(|d| d.id == created[0].id), "{name}");

        let rewards = store.list_all("u1").await.unwrap();
        assert_eq!(rewards.len(), 1, "{name}");
        assert_eq!(store.ledger_for_reward(&rewards[0].id).await.unwrap().len(), 3, "{name}");
    }
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_price_failure_records_nothing() {
    for (name, store) in stores() {
        let service = service(store.clone(), prices());

        let result = service.create_reward(request("DOWN", dec!(1))).await;
        assert!(
            matches!(result, Err(RewardError::Pricing(PriceError::Unavailable { .. }))),
            "{name}"
        );
        assert!(store.list_all("u1").await.unwrap().is_empty(), "{name}");
    }
}

#[tokio::test]
async fn test_validation_rejects_bad_input() {
    let store: Arc<dyn RewardStore> = Arc::new(MemoryRewardStore::new());
    let service = service(store, prices());

    for input in [
        request("AAPL", dec!(0)),
        request("   ", dec!(1)),
        CreateRewardInput {
            user_id: String::new(),
            ..request("AAPL", dec!(1))
        },
        CreateRewardInput {
            fees: FeeBreakdown::new(dec!(-1), dec!(0), dec!(0), dec!(0)),
            ..request("AAPL", dec!(1))
        },
    ] {
        assert!(matches!(
            service.create_reward(input).await,
            Err(RewardError::Validation(_))
        ));
    }
}

#[tokio::test]
async fn test_oversized_quantity_rejected_before_recording() {
    for (name, store) in stores() {
        let service = service(store.clone(), prices());

        for quantity in [dec!(50000000000000000000000000000), dec!(1000000000.000001)] {
            assert!(
                matches!(
                    service.create_reward(request("AAPL", quantity)).await,
                    Err(RewardError::Validation(_))
                ),
                "{name}"
            );
        }
        let clawback = CreateRewardInput {
            is_adjustment: true,
            ..request("AAPL", dec!(-50000000000000000000000000000))
        };
        assert!(
            matches!(service.create_reward(clawback).await, Err(RewardError::Validation(_))),
            "{name}"
        );

        assert!(store.list_all("u1").await.unwrap().is_empty(), "{name}");
    }
}

#[tokio::test]
async fn test_unrepresentable_cost_is_an_error() {
    for (name, store) in stores() {
        let service = service(store.clone(), prices());

        let result = service.create_reward(request("BIG", dec!(2))).await;
        assert!(matches!(result, Err(RewardError::Overflow(_))), "{name}");
        assert!(store.list_all("u1").await.unwrap().is_empty(), "{name}");
    }
}

#[tokio::test]
async fn test_store_write_failure_surfaces_and_records_nothing() {
    let store = Arc::new(FailingStore::failing_writes());
    let service = service(store.clone(), prices());

    let result = service
        .create_reward(CreateRewardInput {
            idempotency_key: Some("evt-1".to_string()),
            ..request("AAPL", dec!(1))
        })
        .await;

    assert!(matches!(result, Err(RewardError::Store(StoreError::Database(_)))));
    assert!(store.list_all("u1").await.unwrap().is_empty());
    assert!(store
        .find_by_idempotency_key("u1", "evt-1")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_store_read_failure_aborts_before_pricing() {
    let prices = prices();
    let service = service(Arc::new(FailingStore::failing_reads()), prices.clone());

    let result = service
        .create_reward(CreateRewardInput {
            idempotency_key: Some("evt-1".to_string()),
            ..request("AAPL", dec!(1))
        })
        .await;

    assert!(matches!(result, Err(RewardError::Store(StoreError::Database(_)))));
    assert_eq!(prices.latest_calls(), 0);
}
