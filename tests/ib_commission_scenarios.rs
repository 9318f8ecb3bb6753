//! Public-API scenarios: replay the bundled demo event stream and drive a
//! service by hand, the way an embedding application would.

use rust_decimal::Decimal;
use std::sync::Arc;

use ib_engine::config::AppConfig;
use ib_engine::{
    ClosedTrade, EventOutcome, IbEvent, IbService, InMemoryMainWallet, LedgerStore, MemoryStore,
    ReferralDirectory, ServiceStores,
};

fn service() -> (IbService, Arc<MemoryStore>, Arc<InMemoryMainWallet>) {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/dev.yaml");
    let config = AppConfig::from_file(path).expect("dev config should load");
    let store = Arc::new(MemoryStore::new());
    let main_wallet = Arc::new(InMemoryMainWallet::new());
    let service = IbService::new(
        &config,
        ServiceStores::memory(store.clone(), main_wallet.clone()),
    );
    (service, store, main_wallet)
}

fn demo_events() -> Vec<IbEvent> {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/demos/three_level_chain.jsonl");
    std::fs::read_to_string(path)
        .expect("demo file should exist")
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(|l| serde_json::from_str(l).expect("demo event should parse"))
        .collect()
}

#[tokio::test]
async fn test_demo_replay() {
    let (service, store, main_wallet) = service();

    for event in demo_events() {
        service.handle(event).await.expect("demo events all succeed");
    }

    // trade 9001 (2 lots): 10 / 6 / 2, redelivery pays nothing
    // trade 9002 after IB 2 is blocked: only IB 3, 1 lot → 5
    let w3 = store.get_wallet(3).await.unwrap().unwrap();
    assert_eq!(w3.total_earned, Decimal::from(15));
    assert_eq!(w3.total_withdrawn, Decimal::from(4));
    assert_eq!(w3.balance, Decimal::from(11));
    assert_eq!(main_wallet.balance(3), Decimal::from(4));

    let w2 = store.get_wallet(2).await.unwrap().unwrap();
    assert_eq!(w2.balance, Decimal::from(6));
    let w1 = store.get_wallet(1).await.unwrap().unwrap();
    assert_eq!(w1.balance, Decimal::from(2));

    assert_eq!(store.commission_count(), 4);
}

#[tokio::test]
async fn test_percent_plan_for_gold() {
    let (service, store, _) = service();

    let plan = ib_engine::CommissionPlan::from_rates(
        "Metals",
        ib_engine::CommissionType::Percent,
        &[Decimal::new(1, 2)],
    );
    let EventOutcome::PlanSaved(plan) = service.handle(IbEvent::SavePlan(plan)).await.unwrap()
    else {
        panic!("expected saved plan");
    };
    assert_ne!(plan.plan_id, 0);

    for event in [
        IbEvent::UserRegistered {
            user_id: 1,
            referred_by: None,
        },
        IbEvent::ApplyForIb {
            user_id: 1,
            referral_code: Some("METAL1".to_string()),
        },
        IbEvent::ApproveIb {
            user_id: 1,
            plan_id: Some(plan.plan_id),
        },
        IbEvent::UserRegistered {
            user_id: 2,
            referred_by: Some("metal1".to_string()),
        },
    ] {
        service.handle(event).await.unwrap();
    }
    assert_eq!(
        store.get_user(2).await.unwrap().unwrap().parent_ib_id,
        Some(1)
    );

    // 0.5 lot XAUUSD @ 2000, contract 100, 0.01% → 0.5 * 100 * 2000 * 0.0001 = 10
    let outcome = service
        .handle(IbEvent::TradeClosed(ClosedTrade {
            trade_id: 1,
            user_id: 2,
            symbol: "XAU/USD".to_string(),
            quantity: Decimal::new(5, 1),
            open_price: Decimal::from(2000),
        }))
        .await
        .unwrap();
    let EventOutcome::TradeProcessed(summary) = outcome else {
        panic!("expected trade summary");
    };
    assert_eq!(summary.results.len(), 1);
    assert_eq!(summary.total_paid(), Decimal::from(10));
}

#[tokio::test]
async fn test_malformed_admin_input_is_rejected() {
    let (service, _, _) = service();
    service
        .handle(IbEvent::UserRegistered {
            user_id: 1,
            referred_by: None,
        })
        .await
        .unwrap();

    let err = service
        .handle(IbEvent::BlockIb {
            user_id: 1,
            reason: "not an ib".to_string(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_STATE");
    assert!(!err.is_retryable());

    let err = service
        .handle(IbEvent::WithdrawToMainWallet {
            ib_user_id: 99,
            amount: Decimal::ONE,
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
}
