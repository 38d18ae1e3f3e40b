use crate::{
    aggregate::{
        SyncOutcome,
        sync_store,
    },
    agents::{
        AgentPrediction,
        AgentRegistry,
        AssetType,
    },
    decode::decode_count,
    error::{
        CreateSealError,
        LedgerError,
        OpenSealError,
    },
    leaderboard::{
        LeaderboardEntry,
        decode_leaderboard,
    },
    ledger::{
        LedgerReader,
        LedgerWriter,
        Receipt,
        TxHash,
    },
    price::price_to_fixed,
    store::SealStore,
};
use std::sync::{
    Mutex,
    PoisonError,
};
use tracing::{
    debug,
    error,
    info,
};

#[cfg(test)]
mod tests;

/// Owns the ledger connection for one wallet session and every operation
/// that goes through it.
pub struct SealService<L> {
    ledger: Option<L>,
    store: SealStore,
    registry: AgentRegistry,
    asset: AssetType,
    synced_count: Mutex<Option<u64>>,
}

impl<L> SealService<L> {
    /// A service with no ledger; reads are no-ops and writes fail with
    /// `NoClient` until [`SealService::connect`] is called.
    pub fn new(store: SealStore, asset: AssetType) -> Self {
        Self {
            ledger: None,
            store,
            registry: AgentRegistry::default(),
            asset,
            synced_count: Mutex::new(None),
        }
    }

    pub fn connected(ledger: L, store: SealStore, asset: AssetType) -> Self {
        let mut service = Self::new(store, asset);
        service.connect(ledger);
        service
    }

    pub fn connect(&mut self, ledger: L) {
        self.ledger = Some(ledger);
    }

    /// Drops the ledger and empties the store.
    pub fn disconnect(&mut self) {
        self.ledger = None;
        self.store.clear();
        self.set_synced_count(None);
        info!("ledger disconnected; seal list cleared");
    }

    pub fn is_connected(&self) -> bool {
        self.ledger.is_some()
    }

    pub fn store(&self) -> &SealStore {
        &self.store
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn asset(&self) -> AssetType {
        self.asset
    }

    pub fn set_asset(&mut self, asset: AssetType) {
        self.asset = asset;
    }

    /// `sealCount` behind the last list this service published, whether the
    /// run came from a refresh or from the resync after a write.
    pub fn synced_count(&self) -> Option<u64> {
        *self
            .synced_count
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn set_synced_count(&self, count: Option<u64>) {
        *self
            .synced_count
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = count;
    }
}

impl<L: LedgerReader> SealService<L> {
    pub async fn refresh(&self) -> SyncOutcome {
        match &self.ledger {
            Some(ledger) => self.resync(ledger).await,
            None => {
                debug!("refresh skipped; no ledger connected");
                SyncOutcome::Unavailable
            }
        }
    }

    /// Current `sealCount`, or `None` when no ledger is connected.
    pub async fn seal_count(&self) -> Result<Option<u64>, LedgerError> {
        let Some(ledger) = &self.ledger else {
            return Ok(None);
        };
        let raw = ledger.seal_count().await?;
        Ok(Some(decode_count(&raw)))
    }

    /// Agents with at least one scored prediction, in ledger order. Empty when
    /// no ledger is connected.
    pub async fn leaderboard(&self) -> Result<Vec<LeaderboardEntry>, LedgerError> {
        let Some(ledger) = &self.ledger else {
            return Ok(Vec::new());
        };
        let raw = ledger.global_leaderboard().await?;
        Ok(decode_leaderboard(&raw, &self.registry))
    }

    async fn resync(&self, ledger: &L) -> SyncOutcome {
        let outcome = sync_store(ledger, &self.registry, &self.store).await;
        if let SyncOutcome::Published { count, .. } = outcome {
            self.set_synced_count(Some(count));
        }
        outcome
    }
}

impl<L: LedgerReader + LedgerWriter> SealService<L> {
    /// Reveals a seal.
    ///
    /// Once `revealSeal` has been accepted the seal is shown as unlocked right
    /// away, and the seal list is resynchronized whatever the confirmation
    /// outcome, before this returns. If the confirmation fails and no list has
    /// been published since the patch, the optimistic flag is rolled back.
    pub async fn open_seal(&self, seal_id: u64) -> Result<TxHash, OpenSealError> {
        let ledger = self.ledger.as_ref().ok_or(OpenSealError::NoClient)?;

        let tx = ledger
            .reveal_seal(seal_id, self.asset.selector())
            .await
            .map_err(|err| {
                error!(seal_id, %err, "revealSeal submission failed");
                OpenSealError::Submission(err)
            })?;
        info!(seal_id, %tx, asset = %self.asset, "revealSeal submitted");

        let patch = OptimisticUnlock::apply(&self.store, seal_id);
        let confirmed = ledger
            .wait_for_confirmation(&tx)
            .await
            .and_then(Receipt::into_confirmed);

        let outcome = self.resync(ledger).await;
        patch.settle(confirmed.is_ok() || outcome.is_published());

        match confirmed {
            Ok(receipt) => {
                info!(seal_id, %tx, block = ?receipt.block_height, "seal revealed");
                Ok(tx)
            }
            Err(source) => {
                error!(seal_id, %tx, err = %source, "revealSeal was not confirmed");
                Err(OpenSealError::Confirmation { tx, source })
            }
        }
    }

    /// Seals `predictions` until `target_timestamp`. Nothing is submitted
    /// unless there is at least one prediction and the target lies after
    /// `now`.
    pub async fn create_seal(
        &self,
        target_timestamp: u64,
        predictions: &[AgentPrediction],
        now: u64,
    ) -> Result<TxHash, CreateSealError> {
        let ledger = self.ledger.as_ref().ok_or(CreateSealError::NoClient)?;
        if predictions.is_empty() {
            return Err(CreateSealError::NoPredictions);
        }
        if target_timestamp <= now {
            return Err(CreateSealError::TargetInPast {
                target: target_timestamp,
                now,
            });
        }

        let (names, prices): (Vec<String>, Vec<u64>) = predictions
            .iter()
            .map(|p| (p.name.clone(), price_to_fixed(p.price)))
            .unzip();
        let tx = ledger
            .create_seal(target_timestamp, names, prices)
            .await
            .map_err(|err| {
                error!(%err, "createSeal submission failed");
                CreateSealError::Submission(err)
            })?;
        info!(%tx, target_timestamp, agents = predictions.len(), "createSeal submitted");

        let confirmed = ledger
            .wait_for_confirmation(&tx)
            .await
            .and_then(Receipt::into_confirmed);
        self.resync(ledger).await;

        match confirmed {
            Ok(_) => Ok(tx),
            Err(source) => {
                error!(%tx, err = %source, "createSeal was not confirmed");
                Err(CreateSealError::Confirmation { tx, source })
            }
        }
    }
}

/// The local `is_unlocked = true` patch made while a reveal is in flight.
///
/// Rolled back on drop unless settled with `keep = true`, so a cancelled
/// reveal does not leave the flag behind. A rollback never overwrites a list
/// published by a run that started after the patch.
struct OptimisticUnlock<'a> {
    store: &'a SealStore,
    seal_id: u64,
    previous: Option<bool>,
    patched_at: u64,
    settled: bool,
}

impl<'a> OptimisticUnlock<'a> {
    fn apply(store: &'a SealStore, seal_id: u64) -> Self {
        let previous = store.mark_unlocked(seal_id);
        if previous.is_none() {
            debug!(seal_id, "seal not loaded; nothing to patch");
        }
        Self {
            store,
            seal_id,
            previous,
            patched_at: store.generation(),
            settled: false,
        }
    }

    fn settle(mut self, keep: bool) {
        if !keep {
            self.roll_back();
        }
        self.settled = true;
    }

    fn roll_back(&self) {
        if self.store.published_generation() > self.patched_at {
            debug!(seal_id = self.seal_id, "newer seal list published; keeping it");
            return;
        }
        if let Some(previous) = self.previous {
            self.store.set_unlocked(self.seal_id, previous);
        }
    }
}

impl Drop for OptimisticUnlock<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.roll_back();
        }
    }
}
