//! JSON-RPC gateway in front of the seal contract.
//!
//! Reads go through `ledger_call`; writes are signed by a
//! [`TransactionSigner`] and sent with `ledger_sendTransaction`; receipts are
//! polled with `ledger_getTransactionReceipt` until they are mined or the
//! confirmation timeout runs out.

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
use serde::{
    Deserialize,
    Serialize,
    de::DeserializeOwned,
};
use serde_json::{
    Value,
    json,
};
use sha2::{
    Digest,
    Sha256,
};
use std::{
    fmt,
    sync::atomic::{
        AtomicU64,
        Ordering,
    },
    time::Duration,
};
use tracing::{
    debug,
    trace,
};


pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(120);

const METHOD_CALL: &str = "ledger_call";
const METHOD_SEND: &str = "ledger_sendTransaction";
const METHOD_RECEIPT: &str = "ledger_getTransactionReceipt";

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub rpc_url: String,
    pub contract_id: String,
    pub request_timeout: Duration,
    pub poll_interval: Duration,
    pub confirmation_timeout: Duration,
}

impl GatewayConfig {
    pub fn new(rpc_url: impl Into<String>, contract_id: impl Into<String>) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            contract_id: contract_id.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
        }
    }
}

/// Wallet side of a write: who sends it and a signature over its digest.
pub trait TransactionSigner: Send + Sync {
    /// Hex address, `0x`-prefixed.
    fn address(&self) -> String;

    /// Hex signature over a 32-byte call digest.
    fn sign_digest(&self, digest: &[u8; 32]) -> Result<String, LedgerError>;
}

pub struct RpcLedger<S> {
    config: GatewayConfig,
    http: reqwest::Client,
    signer: S,
    next_id: AtomicU64,
}

impl<S> fmt::Display for RpcLedger<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.config.rpc_url, self.config.contract_id)
    }
}

impl<S: TransactionSigner> RpcLedger<S> {
    pub fn new(config: GatewayConfig, signer: S) -> Result<Self, LedgerError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| {
                LedgerError::transport(format!("failed to build HTTP client: {err}"))
            })?;
        Ok(Self {
            config,
            http,
            signer,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn sender(&self) -> String {
        self.signer.address()
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, LedgerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let envelope = RpcRequest::new(id, method, params);
        trace!(id, method, "gateway request");
        let res = self
            .http
            .post(&self.config.rpc_url)
            .json(&envelope)
            .send()
            .await
            .map_err(from_reqwest)?;
        let status = res.status();
        let bytes = res.bytes().await.map_err(from_reqwest)?;
        if !status.is_success() {
            return Err(LedgerError::Http {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        parse_response(&bytes)
    }

    async fn call(&self, function: &str, args: Value) -> Result<Value, LedgerError> {
        let params = json!({
            "contract": self.config.contract_id,
            "function": function,
            "args": args,
        });
        self.request(METHOD_CALL, params).await
    }

    async fn call_record(&self, function: &str, args: Value) -> Result<RawRecord, LedgerError> {
        self.call(function, args).await.map(RawRecord::from)
    }

    async fn send_transaction(&self, function: &str, args: Value) -> Result<TxHash, LedgerError> {
        let from = self.signer.address();
        let digest = call_digest(&self.config.contract_id, function, &args, &from);
        let signature = self.signer.sign_digest(&digest)?;
        let params = json!({
            "contract": self.config.contract_id,
            "function": function,
            "args": args,
            "from": from,
            "digest": hex::encode(digest),
            "signature": signature,
        });
        let hash: String = self.request(METHOD_SEND, params).await?;
        debug!(function, tx = %hash, "transaction accepted by gateway");
        Ok(TxHash(hash))
    }

    /// `None` while the transaction is still pending.
    pub async fn receipt(&self, tx: &TxHash) -> Result<Option<Receipt>, LedgerError> {
        let dto: Option<ReceiptDto> = self.request(METHOD_RECEIPT, json!([tx.0])).await?;
        Ok(dto.map(|dto| dto.into_receipt(tx.clone())))
    }
}

impl<S: TransactionSigner> LedgerReader for RpcLedger<S> {
    async fn seal_count(&self) -> Result<Value, LedgerError> {
        self.call("sealCount", json!([])).await
    }

    async fn seal(&self, seal_id: u64) -> Result<RawRecord, LedgerError> {
        self.call_record("seals", json!([seal_id])).await
    }

    async fn prediction_count(&self, seal_id: u64) -> Result<Value, LedgerError> {
        self.call("getPredictionCount", json!([seal_id])).await
    }

    async fn prediction(&self, seal_id: u64, index: u64) -> Result<RawRecord, LedgerError> {
        self.call_record("predictions", json!([seal_id, index])).await
    }

    async fn global_leaderboard(&self) -> Result<RawRecord, LedgerError> {
        self.call_record("getGlobalLeaderboard", json!([])).await
    }
}

impl<S: TransactionSigner> LedgerWriter for RpcLedger<S> {
    async fn create_seal(
        &self,
        target_timestamp: u64,
        agent_names: Vec<String>,
        prices: Vec<u64>,
    ) -> Result<TxHash, LedgerError> {
        self.send_transaction("createSeal", json!([target_timestamp, agent_names, prices]))
            .await
    }

    async fn reveal_seal(&self, seal_id: u64, asset_selector: u64) -> Result<TxHash, LedgerError> {
        self.send_transaction("revealSeal", json!([seal_id, asset_selector]))
            .await
    }

    async fn wait_for_confirmation(&self, tx: &TxHash) -> Result<Receipt, LedgerError> {
        let poll = async {
            loop {
                if let Some(receipt) = self.receipt(tx).await? {
                    return Ok::<_, LedgerError>(receipt);
                }
                tokio::time::sleep(self.config.poll_interval).await;
            }
        };
        tokio::time::timeout(self.config.confirmation_timeout, poll)
            .await
            .map_err(|_| LedgerError::Timeout)?
    }
}

/// SHA-256 over the canonical JSON `{"contract","function","args","from"}`.
pub fn call_digest(contract: &str, function: &str, args: &Value, from: &str) -> [u8; 32] {
    let payload = SignedCall {
        contract,
        function,
        args,
        from,
    };
    // Serializing borrowed strings and a `Value` into a Vec cannot fail.
    let bytes = serde_json::to_vec(&payload).unwrap_or_default();
    Sha256::digest(&bytes).into()
}

fn from_reqwest(err: reqwest::Error) -> LedgerError {
    if err.is_timeout() {
        LedgerError::Timeout
    } else {
        LedgerError::transport(err.to_string())
    }
}

fn parse_response<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, LedgerError> {
    let response: RpcResponse = serde_json::from_slice(bytes)
        .map_err(|err| LedgerError::decode(format!("invalid JSON-RPC envelope: {err}")))?;
    if let Some(error) = response.error {
        return Err(LedgerError::Rpc {
            code: error.code,
            message: error.message,
        });
    }
    serde_json::from_value(response.result.unwrap_or(Value::Null))
        .map_err(|err| LedgerError::decode(format!("unexpected result: {err}")))
}

#[derive(Serialize)]
struct SignedCall<'a> {
    contract: &'a str,
    function: &'a str,
    args: &'a Value,
    from: &'a str,
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

impl<'a> RpcRequest<'a> {
    fn new(id: u64, method: &'a str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorDto>,
}

#[derive(Deserialize)]
struct RpcErrorDto {
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceiptDto {
    status: ReceiptStatusDto,
    #[serde(default)]
    block_height: Option<u64>,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ReceiptStatusDto {
    Success,
    Reverted,
}

impl ReceiptDto {
    fn into_receipt(self, tx: TxHash) -> Receipt {
        Receipt {
            tx,
            status: match self.status {
                ReceiptStatusDto::Success => TxStatus::Success,
                ReceiptStatusDto::Reverted => TxStatus::Reverted,
            },
            block_height: self.block_height,
            reason: self.reason,
        }
    }
}
