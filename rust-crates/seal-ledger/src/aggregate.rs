//! Reconstruction of every seal from single-item ledger reads.
//!
//! Reads are issued one after another: seal ids ascending from 1, and within a
//! seal prediction indexes ascending. A failed seal read drops that seal; a
//! failed prediction read leaves an empty placeholder in its slot so agent ids
//! and prices stay aligned.

use crate::{
    agents::AgentRegistry,
    decode::{
        PredictionRecord,
        decode_count,
        decode_prediction,
        decode_seal,
    },
    error::LedgerError,
    ledger::LedgerReader,
    seal::Seal,
    store::SealStore,
};
use tracing::{
    debug,
    info,
    warn,
};


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    /// A complete list of `seals` entries, read against a `sealCount` of
    /// `count`, was swapped into the store.
    Published { seals: usize, count: u64 },
    /// A newer run started before this one finished; its result was dropped.
    Superseded,
    /// No ledger connected; the store was left untouched.
    Unavailable,
    /// `sealCount` could not be read; the store was left untouched.
    CountUnreadable,
}

impl SyncOutcome {
    pub fn is_published(&self) -> bool {
        matches!(self, SyncOutcome::Published { .. })
    }
}

/// Reads every seal. Only an unreadable `sealCount` is an error; every other
/// read failure is logged and absorbed.
pub async fn collect_seals<R: LedgerReader>(
    reader: &R,
    registry: &AgentRegistry,
) -> Result<Vec<Seal>, LedgerError> {
    let (_, seals) = collect_counted(reader, registry).await?;
    Ok(seals)
}

async fn collect_counted<R: LedgerReader>(
    reader: &R,
    registry: &AgentRegistry,
) -> Result<(u64, Vec<Seal>), LedgerError> {
    let raw_count = reader.seal_count().await?;
    let count = decode_count(&raw_count);
    if count == 0 {
        debug!(%raw_count, "no seals on ledger");
        return Ok((0, Vec::new()));
    }

    let mut assembled = Vec::new();
    for id in 1..=count {
        match read_seal(reader, registry, id).await {
            Ok(seal) => assembled.push(seal),
            Err(err) => warn!(seal_id = id, %err, "failed to read seal; skipping"),
        }
    }
    Ok((count, assembled))
}

async fn read_seal<R: LedgerReader>(
    reader: &R,
    registry: &AgentRegistry,
    id: u64,
) -> Result<Seal, LedgerError> {
    let record = decode_seal(&reader.seal(id).await?);
    let prediction_count = decode_count(&reader.prediction_count(id).await?);

    let mut predictions = Vec::new();
    for index in 0..prediction_count {
        predictions.push(read_prediction(reader, id, index).await);
    }
    Ok(Seal::assemble(id, &record, &predictions, registry))
}

async fn read_prediction<R: LedgerReader>(
    reader: &R,
    seal_id: u64,
    index: u64,
) -> PredictionRecord {
    match reader.prediction(seal_id, index).await {
        Ok(raw) => decode_prediction(&raw),
        Err(err) => {
            warn!(seal_id, index, %err, "failed to read prediction; using placeholder");
            PredictionRecord::default()
        }
    }
}

/// Runs a full aggregation and publishes the result into `store` in one swap.
pub async fn sync_store<R: LedgerReader>(
    reader: &R,
    registry: &AgentRegistry,
    store: &SealStore,
) -> SyncOutcome {
    let ticket = store.begin_sync();
    let (count, seals) = match collect_counted(reader, registry).await {
        Ok(counted) => counted,
        Err(err) => {
            warn!(%err, "failed to read seal count; keeping current seals");
            return SyncOutcome::CountUnreadable;
        }
    };
    let total = seals.len();
    if store.publish(ticket, seals) {
        info!(seals = total, generation = ticket.generation(), "seal list synced");
        SyncOutcome::Published {
            seals: total,
            count,
        }
    } else {
        SyncOutcome::Superseded
    }
}
