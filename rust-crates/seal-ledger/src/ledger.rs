use crate::{
    decode::RawRecord,
    error::LedgerError,
};
use serde_json::Value;
use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TxHash(pub String);

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxStatus {
    Success,
    Reverted,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    pub tx: TxHash,
    pub status: TxStatus,
    pub block_height: Option<u64>,
    pub reason: Option<String>,
}

impl Receipt {
    /// A reverted receipt becomes [`LedgerError::Reverted`].
    pub fn into_confirmed(self) -> Result<Receipt, LedgerError> {
        match self.status {
            TxStatus::Success => Ok(self),
            TxStatus::Reverted => Err(LedgerError::Reverted {
                reason: self.reason,
            }),
        }
    }
}

/// Single-item reads against the seal contract.
///
/// Aggregation is written only against these calls, so an implementation
/// backed by batched queries can be dropped in without changing it.
pub trait LedgerReader {
    /// `sealCount()`, as the raw value the ledger returned.
    fn seal_count(&self) -> impl Future<Output = Result<Value, LedgerError>> + Send;

    /// `seals(sealId)`
    fn seal(
        &self,
        seal_id: u64,
    ) -> impl Future<Output = Result<RawRecord, LedgerError>> + Send;

    /// `getPredictionCount(sealId)`
    fn prediction_count(
        &self,
        seal_id: u64,
    ) -> impl Future<Output = Result<Value, LedgerError>> + Send;

    /// `predictions(sealId, index)`
    fn prediction(
        &self,
        seal_id: u64,
        index: u64,
    ) -> impl Future<Output = Result<RawRecord, LedgerError>> + Send;

    /// `getGlobalLeaderboard()`
    fn global_leaderboard(
        &self,
    ) -> impl Future<Output = Result<RawRecord, LedgerError>> + Send;
}

/// State-changing calls. Each returns as soon as the ledger accepted the
/// transaction; confirmation is awaited separately.
pub trait LedgerWriter {
    /// `createSeal(targetTimestamp, agentNames, prices)`, prices in 1e8 fixed
    /// point.
    fn create_seal(
        &self,
        target_timestamp: u64,
        agent_names: Vec<String>,
        prices: Vec<u64>,
    ) -> impl Future<Output = Result<TxHash, LedgerError>> + Send;

    /// `revealSeal(sealId, assetTypeSelector)`
    fn reveal_seal(
        &self,
        seal_id: u64,
        asset_selector: u64,
    ) -> impl Future<Output = Result<TxHash, LedgerError>> + Send;

    fn wait_for_confirmation(
        &self,
        tx: &TxHash,
    ) -> impl Future<Output = Result<Receipt, LedgerError>> + Send;
}
