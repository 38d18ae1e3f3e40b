//! Client-side view of the prediction-seal ledger.
//!
//! Seals are read one item at a time through [`LedgerReader`], decoded by the
//! total functions in [`decode`], and published into a [`SealStore`] as a
//! single swap. Writes go through [`SealService`], which patches the store
//! optimistically and always resynchronizes with the ledger afterwards.

pub use aggregate::{
    SyncOutcome,
    collect_seals,
    sync_store,
};
pub use agents::{
    AGENTS,
    Agent,
    AgentPrediction,
    AgentRegistry,
    AssetType,
};
pub use decode::{
    PredictionRecord,
    RawRecord,
    SealRecord,
    ZERO_ADDRESS,
};
pub use error::{
    CreateSealError,
    LedgerError,
    OpenSealError,
};
pub use leaderboard::LeaderboardEntry;
pub use ledger::{
    LedgerReader,
    LedgerWriter,
    Receipt,
    TxHash,
    TxStatus,
};
pub use seal::Seal;
pub use service::SealService;
pub use store::{
    SealStore,
    SyncTicket,
};

pub mod aggregate;
pub mod agents;
pub mod decode;
pub mod error;
pub mod leaderboard;
pub mod ledger;
pub mod price;
pub mod rng;
pub mod rpc;
pub mod seal;
pub mod service;
pub mod store;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;
