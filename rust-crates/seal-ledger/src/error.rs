use crate::ledger::TxHash;
use thiserror::Error;

/// Failure of a single ledger interaction.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum LedgerError {
    #[error("ledger transport failed: {0}")]
    Transport(String),

    #[error("ledger gateway responded with HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("ledger rejected the request ({code}): {message}")]
    Rpc { code: i64, message: String },

    #[error("unexpected ledger payload: {0}")]
    Decode(String),

    #[error("transaction reverted{}", .reason.as_deref().map(|r| format!(": {r}")).unwrap_or_default())]
    Reverted { reason: Option<String> },

    #[error("ledger call timed out")]
    Timeout,
}

impl LedgerError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }
}

#[derive(Debug, Error)]
pub enum OpenSealError {
    #[error("no ledger client connected")]
    NoClient,

    #[error("submitting revealSeal failed")]
    Submission(#[source] LedgerError),

    #[error("revealSeal transaction {tx} was not confirmed")]
    Confirmation {
        tx: TxHash,
        #[source]
        source: LedgerError,
    },
}

#[derive(Debug, Error)]
pub enum CreateSealError {
    #[error("no ledger client connected")]
    NoClient,

    #[error("select at least one agent prediction before sealing")]
    NoPredictions,

    #[error("target time {target} is not after the current time {now}")]
    TargetInPast { target: u64, now: u64 },

    #[error("submitting createSeal failed")]
    Submission(#[source] LedgerError),

    #[error("createSeal transaction {tx} was not confirmed")]
    Confirmation {
        tx: TxHash,
        #[source]
        source: LedgerError,
    },
}
