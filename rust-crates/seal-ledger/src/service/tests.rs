#![allow(non_snake_case)]

use super::*;
use crate::test_helpers::{
    Confirmation,
    FakeLedger,
    LedgerCall,
};
use serde_json::json;
use std::sync::{
    Arc,
    Mutex,
    atomic::{
        AtomicBool,
        Ordering,
    },
};

async fn synced_service(ledger: &FakeLedger) -> SealService<FakeLedger> {
    let service =
        SealService::connected(ledger.clone(), SealStore::new(), AssetType::default());
    assert!(service.refresh().await.is_published());
    ledger.clear_calls();
    service
}

fn unlocked(service: &SealService<FakeLedger>, seal_id: u64) -> bool {
    service.store().get(seal_id).unwrap().is_unlocked
}

/// Records the seal's `is_unlocked` flag while the confirmation is pending.
fn observe_during_wait(
    ledger: &FakeLedger,
    store: &SealStore,
    seal_id: u64,
) -> Arc<Mutex<Option<bool>>> {
    let seen = Arc::new(Mutex::new(None));
    let store = store.clone();
    let sink = seen.clone();
    ledger.on_wait(move || {
        *sink.lock().unwrap() = store.get(seal_id).map(|s| s.is_unlocked);
    });
    seen
}

#[tokio::test]
async fn open_seal__confirmation_fails__state_matches_ledger_truth() {
    // given
    let ledger = FakeLedger::new();
    ledger.push_seal(100, false, &[("AlphaBot", 200_000_000_000)]);
    let service = synced_service(&ledger).await;
    let seen = observe_during_wait(&ledger, service.store(), 1);
    ledger.confirm_with(Confirmation::Fail(LedgerError::Timeout));

    // when
    let result = service.open_seal(1).await;

    // then
    assert!(matches!(
        result,
        Err(OpenSealError::Confirmation {
            source: LedgerError::Timeout,
            ..
        })
    ));
    assert_eq!(*seen.lock().unwrap(), Some(true));
    assert!(!ledger.is_revealed(1));
    assert!(!unlocked(&service, 1));
}

#[tokio::test]
async fn open_seal__reverted__resyncs_and_reports_reason() {
    // given
    let ledger = FakeLedger::new();
    ledger.push_seal(100, false, &[]);
    let service = synced_service(&ledger).await;
    ledger.confirm_with(Confirmation::Revert(Some("too early".to_string())));

    // when
    let err = service.open_seal(1).await.unwrap_err();

    // then
    match err {
        OpenSealError::Confirmation { source, .. } => assert_eq!(
            source,
            LedgerError::Reverted {
                reason: Some("too early".to_string())
            }
        ),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!unlocked(&service, 1));
    assert!(ledger.calls().contains(&LedgerCall::SealCount));
}

#[tokio::test]
async fn open_seal__confirmation_and_resync_fail__rolls_back_patch() {
    // given
    let ledger = FakeLedger::new();
    ledger.push_seal(100, false, &[]);
    let service = synced_service(&ledger).await;
    ledger.confirm_with(Confirmation::Fail(LedgerError::transport("connection reset")));
    ledger.fail_seal_count(LedgerError::transport("connection reset"));

    // when
    let result = service.open_seal(1).await;

    // then
    assert!(result.is_err());
    assert!(!unlocked(&service, 1));
}

#[tokio::test]
async fn open_seal__success__returns_tx_and_shows_unlocked() {
    // given
    let ledger = FakeLedger::new();
    ledger.push_seal(100, false, &[]);
    ledger.push_seal(200, false, &[]);
    let service = synced_service(&ledger).await;

    // when
    let tx = service.open_seal(2).await.unwrap();

    // then
    assert!(tx.0.starts_with("0x"));
    assert!(ledger.is_revealed(2));
    assert!(unlocked(&service, 2));
    assert!(!unlocked(&service, 1));
    assert_eq!(
        ledger.calls()[..2],
        [
            LedgerCall::RevealSeal {
                seal_id: 2,
                asset_selector: 1,
            },
            LedgerCall::WaitForConfirmation(tx.clone()),
        ]
    );
}

#[tokio::test]
async fn open_seal__btc_asset__sends_btc_selector() {
    // given
    let ledger = FakeLedger::new();
    ledger.push_seal(100, false, &[]);
    let mut service = synced_service(&ledger).await;
    service.set_asset(AssetType::Btc);

    // when
    service.open_seal(1).await.unwrap();

    // then
    assert_eq!(
        ledger.calls()[0],
        LedgerCall::RevealSeal {
            seal_id: 1,
            asset_selector: 0,
        }
    );
}

#[tokio::test]
async fn open_seal__submission_fails__store_untouched_and_no_resync() {
    // given
    let ledger = FakeLedger::new();
    ledger.push_seal(100, false, &[]);
    let service = synced_service(&ledger).await;
    let generation = service.store().generation();
    ledger.reject_submissions(LedgerError::Rpc {
        code: -32000,
        message: "insufficient funds".to_string(),
    });

    // when
    let result = service.open_seal(1).await;

    // then
    assert!(matches!(result, Err(OpenSealError::Submission(_))));
    assert!(!unlocked(&service, 1));
    assert_eq!(service.store().generation(), generation);
    assert_eq!(ledger.calls().len(), 1);
}

#[tokio::test]
async fn open_seal__no_client__fails_fast() {
    let service: SealService<FakeLedger> =
        SealService::new(SealStore::new(), AssetType::Eth);

    let result = service.open_seal(1).await;

    assert!(matches!(result, Err(OpenSealError::NoClient)));
}

fn loaded_store(is_unlocked: bool) -> SealStore {
    let store = SealStore::new();
    let ticket = store.begin_sync();
    store.publish(
        ticket,
        vec![crate::Seal {
            id: 1,
            unlock_time: 100,
            creator: crate::ZERO_ADDRESS.to_string(),
            is_unlocked,
            agent_ids: Vec::new(),
            predictions: Vec::new(),
        }],
    );
    store
}

#[test]
fn optimistic_unlock__dropped_unsettled__restores_previous_flag() {
    // given
    let store = loaded_store(false);

    // when
    {
        let _patch = OptimisticUnlock::apply(&store, 1);
        assert!(store.get(1).unwrap().is_unlocked);
    }

    // then
    assert!(!store.get(1).unwrap().is_unlocked);
}

#[test]
fn optimistic_unlock__settled_with_keep__survives_drop() {
    let store = loaded_store(false);

    OptimisticUnlock::apply(&store, 1).settle(true);

    assert!(store.get(1).unwrap().is_unlocked);
}

#[test]
fn optimistic_unlock__already_unlocked__rollback_keeps_it_unlocked() {
    let store = loaded_store(true);

    OptimisticUnlock::apply(&store, 1).settle(false);

    assert!(store.get(1).unwrap().is_unlocked);
}

#[tokio::test]
async fn refresh__no_client__is_unavailable_and_keeps_store() {
    // given
    let store = SealStore::new();
    let ticket = store.begin_sync();
    store.publish(ticket, Vec::new());
    let service: SealService<FakeLedger> = SealService::new(store.clone(), AssetType::Eth);

    // when
    let outcome = service.refresh().await;

    // then
    assert_eq!(outcome, SyncOutcome::Unavailable);
    assert_eq!(store.generation(), 1);
}

#[tokio::test]
async fn disconnect__clears_seals() {
    // given
    let ledger = FakeLedger::new();
    ledger.push_seal(100, false, &[]);
    let mut service = synced_service(&ledger).await;

    // when
    service.disconnect();

    // then
    assert!(!service.is_connected());
    assert!(service.store().is_empty());
}

fn prediction(agent_id: u32, name: &str, price: f64) -> AgentPrediction {
    AgentPrediction {
        agent_id,
        name: name.to_string(),
        price,
    }
}

#[tokio::test]
async fn create_seal__encodes_prices_and_resyncs() {
    // given
    let ledger = FakeLedger::new();
    let service = synced_service(&ledger).await;
    let predictions = vec![
        prediction(1, "AlphaBot", 1234.56),
        prediction(5, "MoonWatcher", 2999.99),
    ];

    // when
    let tx = service.create_seal(5_000, &predictions, 4_000).await.unwrap();

    // then
    assert_eq!(
        ledger.calls()[..2],
        [
            LedgerCall::CreateSeal {
                target_timestamp: 5_000,
                agent_names: vec!["AlphaBot".to_string(), "MoonWatcher".to_string()],
                prices: vec![123_456_000_000, 299_999_000_000],
            },
            LedgerCall::WaitForConfirmation(tx),
        ]
    );
    let seals = service.store().snapshot();
    assert_eq!(seals.len(), 1);
    assert_eq!(seals[0].agent_ids, vec![1, 5]);
    assert_eq!(seals[0].predictions, vec![1234.56, 2999.99]);
    assert_eq!(seals[0].unlock_time, 5_000);
}

#[tokio::test]
async fn create_seal__no_predictions__issues_no_writes() {
    let ledger = FakeLedger::new();
    let service = synced_service(&ledger).await;

    let result = service.create_seal(5_000, &[], 4_000).await;

    assert!(matches!(result, Err(CreateSealError::NoPredictions)));
    assert!(ledger.calls().is_empty());
}

#[tokio::test]
async fn create_seal__target_not_in_future__issues_no_writes() {
    let ledger = FakeLedger::new();
    let service = synced_service(&ledger).await;
    let predictions = vec![prediction(1, "AlphaBot", 1000.0)];

    let result = service.create_seal(4_000, &predictions, 4_000).await;

    assert!(matches!(
        result,
        Err(CreateSealError::TargetInPast {
            target: 4_000,
            now: 4_000
        })
    ));
    assert!(ledger.calls().is_empty());
}

#[tokio::test]
async fn create_seal__reverted__still_resyncs() {
    // given
    let ledger = FakeLedger::new();
    let service = synced_service(&ledger).await;
    ledger.confirm_with(Confirmation::Revert(None));
    let predictions = vec![prediction(2, "CryptoEye", 1500.0)];

    // when
    let result = service.create_seal(5_000, &predictions, 4_000).await;

    // then
    assert!(matches!(result, Err(CreateSealError::Confirmation { .. })));
    assert!(ledger.calls().contains(&LedgerCall::SealCount));
    assert!(service.store().is_empty());
}

#[tokio::test]
async fn leaderboard__decodes_named_arrays() {
    // given
    let ledger = FakeLedger::new();
    ledger.set_leaderboard(json!({
        "names": ["AlphaBot", "DataPred"],
        "accuracies": [87, 0],
        "totalPredictions": [12, 0],
        "winCounts": [5, 0],
        "lastPrices": [312_345_000_000u64, 0]
    }));
    let service = synced_service(&ledger).await;

    // when
    let entries = service.leaderboard().await.unwrap();

    // then
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "AlphaBot");
    assert_eq!(entries[0].last_price, 3123.45);
}

#[tokio::test]
async fn seal_count__connected_and_disconnected() {
    let ledger = FakeLedger::new();
    ledger.push_seal(100, false, &[]);
    ledger.push_seal(200, false, &[]);
    let mut service = synced_service(&ledger).await;

    assert_eq!(service.seal_count().await.unwrap(), Some(2));
    service.disconnect();
    assert_eq!(service.seal_count().await.unwrap(), None);
}

/// Publishes a list with seal 1 unlocked from a competing run once the
/// resync has read `sealCount`, so the resync itself is superseded.
struct CompetingPublisher {
    inner: FakeLedger,
    store: SealStore,
    armed: Arc<AtomicBool>,
}

impl LedgerReader for CompetingPublisher {
    async fn seal_count(&self) -> Result<serde_json::Value, LedgerError> {
        let count = self.inner.seal_count().await;
        if self.armed.swap(false, Ordering::SeqCst) {
            let ticket = self.store.begin_sync();
            let mut seals = self.store.snapshot().to_vec();
            for seal in &mut seals {
                seal.is_unlocked = seal.id == 1;
            }
            assert!(self.store.publish(ticket, seals));
        }
        count
    }

    async fn seal(&self, seal_id: u64) -> Result<crate::RawRecord, LedgerError> {
        self.inner.seal(seal_id).await
    }

    async fn prediction_count(&self, seal_id: u64) -> Result<serde_json::Value, LedgerError> {
        self.inner.prediction_count(seal_id).await
    }

    async fn prediction(
        &self,
        seal_id: u64,
        index: u64,
    ) -> Result<crate::RawRecord, LedgerError> {
        self.inner.prediction(seal_id, index).await
    }

    async fn global_leaderboard(&self) -> Result<crate::RawRecord, LedgerError> {
        self.inner.global_leaderboard().await
    }
}

impl LedgerWriter for CompetingPublisher {
    async fn create_seal(
        &self,
        target_timestamp: u64,
        agent_names: Vec<String>,
        prices: Vec<u64>,
    ) -> Result<TxHash, LedgerError> {
        self.inner
            .create_seal(target_timestamp, agent_names, prices)
            .await
    }

    async fn reveal_seal(&self, seal_id: u64, asset_selector: u64) -> Result<TxHash, LedgerError> {
        self.inner.reveal_seal(seal_id, asset_selector).await
    }

    async fn wait_for_confirmation(&self, tx: &TxHash) -> Result<Receipt, LedgerError> {
        self.inner.wait_for_confirmation(tx).await
    }
}

#[tokio::test]
async fn open_seal__confirmation_fails_and_newer_list_published__keeps_newer_list() {
    // given
    let ledger = FakeLedger::new();
    ledger.push_seal(100, false, &[]);
    ledger.push_seal(200, false, &[]);
    let store = SealStore::new();
    let armed = Arc::new(AtomicBool::new(false));
    let competing = CompetingPublisher {
        inner: ledger.clone(),
        store: store.clone(),
        armed: armed.clone(),
    };
    let service = SealService::connected(competing, store.clone(), AssetType::Eth);
    assert!(service.refresh().await.is_published());
    ledger.confirm_with(Confirmation::Fail(LedgerError::Timeout));
    let published_before = store.published_generation();

    // when
    armed.store(true, Ordering::SeqCst);
    let result = service.open_seal(1).await;

    // then
    assert!(matches!(result, Err(OpenSealError::Confirmation { .. })));
    assert!(store.published_generation() > published_before);
    assert!(store.get(1).unwrap().is_unlocked);
    assert!(!store.get(2).unwrap().is_unlocked);
}

#[tokio::test]
async fn synced_count__follows_published_runs_only() {
    // given
    let ledger = FakeLedger::new();
    ledger.push_seal(100, false, &[]);
    let service = synced_service(&ledger).await;
    assert_eq!(service.synced_count(), Some(1));
    ledger.push_seal(200, false, &[]);
    ledger.fail_seal_count(LedgerError::Timeout);

    // when
    let outcome = service.refresh().await;

    // then
    assert_eq!(outcome, SyncOutcome::CountUnreadable);
    assert_eq!(service.synced_count(), Some(1));
}

#[tokio::test]
async fn create_seal__resync_records_new_count() {
    // given
    let ledger = FakeLedger::new();
    ledger.push_seal(100, false, &[]);
    let mut service = synced_service(&ledger).await;
    let predictions = vec![prediction(1, "AlphaBot", 1000.0)];

    // when
    service.create_seal(5_000, &predictions, 4_000).await.unwrap();

    // then
    assert_eq!(service.synced_count(), Some(2));
    service.disconnect();
    assert_eq!(service.synced_count(), None);
}
