//! In-memory ledger for exercising aggregation and reconciliation without a
//! gateway.

use crate::{
    decode::RawRecord,
    error::LedgerError,
    ledger::{
        LedgerReader,
        LedgerWriter,
        Receipt,
        TxHash,
        TxStatus,
    },
};
use serde_json::{
    Value,
    json,
};
use std::{
    collections::{
        BTreeMap,
        HashMap,
        HashSet,
        VecDeque,
    },
    sync::{
        Arc,
        Mutex,
    },
};

/// Every call the fake served, in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LedgerCall {
    SealCount,
    Seal(u64),
    PredictionCount(u64),
    Prediction(u64, u64),
    Leaderboard,
    CreateSeal {
        target_timestamp: u64,
        agent_names: Vec<String>,
        prices: Vec<u64>,
    },
    RevealSeal {
        seal_id: u64,
        asset_selector: u64,
    },
    WaitForConfirmation(TxHash),
}

/// What `wait_for_confirmation` does with the next transaction.
#[derive(Clone, Debug, PartialEq)]
pub enum Confirmation {
    /// Mined successfully; the write takes effect on the ledger.
    Confirm,
    /// Mined but reverted; the ledger is unchanged.
    Revert(Option<String>),
    /// The wait itself fails; the ledger is unchanged.
    Fail(LedgerError),
    /// The wait never completes.
    Hang,
}

#[derive(Clone, Debug)]
struct FakeSeal {
    record: Value,
    predictions: Vec<Value>,
}

#[derive(Clone, Debug)]
enum PendingWrite {
    Reveal(u64),
    Create {
        target_timestamp: u64,
        agent_names: Vec<String>,
        prices: Vec<u64>,
    },
}

struct FakeState {
    seal_count: Option<Value>,
    seals: BTreeMap<u64, FakeSeal>,
    failing_seals: HashSet<u64>,
    failing_predictions: HashSet<(u64, u64)>,
    count_error: Option<LedgerError>,
    scripted_counts: VecDeque<Option<LedgerError>>,
    leaderboard: Value,
    submit_error: Option<LedgerError>,
    confirmation: Confirmation,
    pending: HashMap<TxHash, PendingWrite>,
    calls: Vec<LedgerCall>,
    next_tx: u64,
    creator: String,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            seal_count: None,
            seals: BTreeMap::new(),
            failing_seals: HashSet::new(),
            failing_predictions: HashSet::new(),
            count_error: None,
            scripted_counts: VecDeque::new(),
            leaderboard: json!([[], [], [], [], []]),
            submit_error: None,
            confirmation: Confirmation::Confirm,
            pending: HashMap::new(),
            calls: Vec::new(),
            next_tx: 1,
            creator: format!("0x{}", "c0".repeat(32)),
        }
    }
}

type WaitHook = Arc<dyn Fn() + Send + Sync>;

#[derive(Clone, Default)]
pub struct FakeLedger {
    state: Arc<Mutex<FakeState>>,
    wait_hook: Arc<Mutex<Option<WaitHook>>>,
}

impl FakeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a positional seal record and returns its id.
    pub fn push_seal(
        &self,
        target_time: u64,
        revealed: bool,
        predictions: &[(&str, u64)],
    ) -> u64 {
        let mut state = self.state.lock().unwrap();
        let id = state.seals.len() as u64 + 1;
        let record = json!([id, state.creator.clone(), target_time, 0, revealed, 0]);
        let predictions = predictions
            .iter()
            .map(|(name, price)| json!([name, price, 0, 0]))
            .collect();
        state.seals.insert(
            id,
            FakeSeal {
                record,
                predictions,
            },
        );
        id
    }

    /// Appends a seal whose records are returned verbatim.
    pub fn push_raw_seal(&self, record: Value, predictions: Vec<Value>) -> u64 {
        let mut state = self.state.lock().unwrap();
        let id = state.seals.len() as u64 + 1;
        state.seals.insert(
            id,
            FakeSeal {
                record,
                predictions,
            },
        );
        id
    }

    /// Overrides the `sealCount` answer; by default it is the number of seals.
    pub fn set_seal_count(&self, count: Value) {
        self.state.lock().unwrap().seal_count = Some(count);
    }

    pub fn fail_seal_count(&self, err: LedgerError) {
        self.state.lock().unwrap().count_error = Some(err);
    }

    /// Answers the next `sealCount` calls in order: `None` answers normally,
    /// `Some(err)` fails that call. Once the script runs out calls answer
    /// normally again.
    pub fn script_seal_count(&self, script: impl IntoIterator<Item = Option<LedgerError>>) {
        self.state.lock().unwrap().scripted_counts.extend(script);
    }

    pub fn fail_seal(&self, seal_id: u64) {
        self.state.lock().unwrap().failing_seals.insert(seal_id);
    }

    pub fn fail_prediction(&self, seal_id: u64, index: u64) {
        self.state
            .lock()
            .unwrap()
            .failing_predictions
            .insert((seal_id, index));
    }

    pub fn set_leaderboard(&self, leaderboard: Value) {
        self.state.lock().unwrap().leaderboard = leaderboard;
    }

    pub fn reject_submissions(&self, err: LedgerError) {
        self.state.lock().unwrap().submit_error = Some(err);
    }

    pub fn confirm_with(&self, confirmation: Confirmation) {
        self.state.lock().unwrap().confirmation = confirmation;
    }

    /// Runs `hook` when a confirmation wait starts, before it resolves.
    pub fn on_wait(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.wait_hook.lock().unwrap() = Some(Arc::new(hook));
    }

    pub fn calls(&self) -> Vec<LedgerCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn is_revealed(&self, seal_id: u64) -> bool {
        let state = self.state.lock().unwrap();
        state
            .seals
            .get(&seal_id)
            .map(|seal| {
                crate::decode::decode_seal(&RawRecord::from(seal.record.clone())).revealed
            })
            .unwrap_or(false)
    }

    fn record(&self, call: LedgerCall) {
        self.state.lock().unwrap().calls.push(call);
    }

    fn submit(&self, call: LedgerCall, write: PendingWrite) -> Result<TxHash, LedgerError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        if let Some(err) = state.submit_error.clone() {
            return Err(err);
        }
        let tx = TxHash(format!("0x{:064x}", state.next_tx));
        state.next_tx += 1;
        state.pending.insert(tx.clone(), write);
        Ok(tx)
    }
}

fn set_revealed(record: &mut Value) {
    match record {
        Value::Array(items) if items.len() > 4 => items[4] = Value::Bool(true),
        Value::Object(fields) => {
            fields.insert("revealed".to_string(), Value::Bool(true));
        }
        _ => {}
    }
}

impl LedgerReader for FakeLedger {
    async fn seal_count(&self) -> Result<Value, LedgerError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(LedgerCall::SealCount);
        if let Some(Some(err)) = state.scripted_counts.pop_front() {
            return Err(err);
        }
        if let Some(err) = state.count_error.clone() {
            return Err(err);
        }
        Ok(state
            .seal_count
            .clone()
            .unwrap_or_else(|| json!(state.seals.len())))
    }

    async fn seal(&self, seal_id: u64) -> Result<RawRecord, LedgerError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(LedgerCall::Seal(seal_id));
        if state.failing_seals.contains(&seal_id) {
            return Err(LedgerError::transport(format!("seal {seal_id} unavailable")));
        }
        Ok(state
            .seals
            .get(&seal_id)
            .map(|seal| RawRecord::from(seal.record.clone()))
            .unwrap_or(RawRecord::Malformed(Value::Null)))
    }

    async fn prediction_count(&self, seal_id: u64) -> Result<Value, LedgerError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(LedgerCall::PredictionCount(seal_id));
        Ok(json!(
            state
                .seals
                .get(&seal_id)
                .map(|seal| seal.predictions.len())
                .unwrap_or(0)
        ))
    }

    async fn prediction(&self, seal_id: u64, index: u64) -> Result<RawRecord, LedgerError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(LedgerCall::Prediction(seal_id, index));
        if state.failing_predictions.contains(&(seal_id, index)) {
            return Err(LedgerError::Timeout);
        }
        state
            .seals
            .get(&seal_id)
            .and_then(|seal| seal.predictions.get(index as usize))
            .map(|p| RawRecord::from(p.clone()))
            .ok_or_else(|| LedgerError::Rpc {
                code: 3,
                message: "execution reverted: index out of bounds".to_string(),
            })
    }

    async fn global_leaderboard(&self) -> Result<RawRecord, LedgerError> {
        self.record(LedgerCall::Leaderboard);
        Ok(RawRecord::from(self.state.lock().unwrap().leaderboard.clone()))
    }
}

impl LedgerWriter for FakeLedger {
    async fn create_seal(
        &self,
        target_timestamp: u64,
        agent_names: Vec<String>,
        prices: Vec<u64>,
    ) -> Result<TxHash, LedgerError> {
        self.submit(
            LedgerCall::CreateSeal {
                target_timestamp,
                agent_names: agent_names.clone(),
                prices: prices.clone(),
            },
            PendingWrite::Create {
                target_timestamp,
                agent_names,
                prices,
            },
        )
    }

    async fn reveal_seal(
        &self,
        seal_id: u64,
        asset_selector: u64,
    ) -> Result<TxHash, LedgerError> {
        self.submit(
            LedgerCall::RevealSeal {
                seal_id,
                asset_selector,
            },
            PendingWrite::Reveal(seal_id),
        )
    }

    async fn wait_for_confirmation(&self, tx: &TxHash) -> Result<Receipt, LedgerError> {
        self.record(LedgerCall::WaitForConfirmation(tx.clone()));
        let hook = self.wait_hook.lock().unwrap().clone();
        if let Some(hook) = hook {
            hook();
        }
        let hang = matches!(self.state.lock().unwrap().confirmation, Confirmation::Hang);
        if hang {
            return std::future::pending().await;
        }

        let mut state = self.state.lock().unwrap();
        let write = state.pending.remove(tx);
        match state.confirmation.clone() {
            Confirmation::Confirm => {
                match write {
                    Some(PendingWrite::Reveal(seal_id)) => {
                        if let Some(seal) = state.seals.get_mut(&seal_id) {
                            set_revealed(&mut seal.record);
                        }
                    }
                    Some(PendingWrite::Create {
                        target_timestamp,
                        agent_names,
                        prices,
                    }) => {
                        let id = state.seals.len() as u64 + 1;
                        let record = json!([
                            id,
                            state.creator.clone(),
                            target_timestamp,
                            0,
                            false,
                            0
                        ]);
                        let predictions = agent_names
                            .iter()
                            .zip(&prices)
                            .map(|(name, price)| json!([name, price, 0, 0]))
                            .collect();
                        state.seals.insert(
                            id,
                            FakeSeal {
                                record,
                                predictions,
                            },
                        );
                    }
                    None => {}
                }
                Ok(Receipt {
                    tx: tx.clone(),
                    status: TxStatus::Success,
                    block_height: Some(state.next_tx),
                    reason: None,
                })
            }
            Confirmation::Revert(reason) => Ok(Receipt {
                tx: tx.clone(),
                status: TxStatus::Reverted,
                block_height: Some(state.next_tx),
                reason,
            }),
            Confirmation::Fail(err) => Err(err),
            Confirmation::Hang => unreachable!("hanging confirmations return above"),
        }
    }
}
