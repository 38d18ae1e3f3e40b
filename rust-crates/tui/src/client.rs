use crate::{
    ui,
    wallets,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use deployments::{
    DeploymentEnv,
    DeploymentRecord,
    DeploymentStore,
};
use seal_ledger::{
    AgentPrediction,
    AgentRegistry,
    AssetType,
    CreateSealError,
    LeaderboardEntry,
    LedgerError,
    LedgerReader,
    LedgerWriter,
    OpenSealError,
    Seal,
    SealService,
    SealStore,
    SyncOutcome,
    TxHash,
    rpc::{
        GatewayConfig,
        RpcLedger,
        TransactionSigner,
    },
    seal::{
        format_time_remaining,
        short_address,
    },
};
use std::{
    collections::BTreeSet,
    path::PathBuf,
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{
        self,
        MissedTickBehavior,
    },
};
use tracing::{
    debug,
    error,
    info,
    warn,
};

pub const DEFAULT_TESTNET_RPC_URL: &str = "https://testnet.fuel.network";
pub const DEFAULT_DEVNET_RPC_URL: &str = "https://devnet.fuel.network";
pub const DEFAULT_LOCAL_RPC_URL: &str = "http://localhost:4000/";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const PARTICLE_SEED: u32 = 20_250_816 + 1;
const ERROR_HISTORY: usize = 50;
const REDRAW_INTERVAL: Duration = Duration::from_secs(1);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Clone, Debug)]
pub enum NetworkTarget {
    Testnet { url: String },
    Devnet { url: String },
    LocalNode { url: String },
}

impl NetworkTarget {
    pub fn url(&self) -> &str {
        match self {
            NetworkTarget::Testnet { url }
            | NetworkTarget::Devnet { url }
            | NetworkTarget::LocalNode { url } => url,
        }
    }

    pub fn env(&self) -> DeploymentEnv {
        match self {
            NetworkTarget::Testnet { .. } => DeploymentEnv::Test,
            NetworkTarget::Devnet { .. } => DeploymentEnv::Dev,
            NetworkTarget::LocalNode { .. } => DeploymentEnv::Local,
        }
    }
}

#[derive(Clone, Debug)]
pub enum WalletConfig {
    ForcKeystore { owner: String, dir: PathBuf },
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub network: NetworkTarget,
    pub wallets: WalletConfig,
    pub contract_id: Option<String>,
    pub save_deployment: bool,
    pub asset: Option<AssetType>,
    pub poll_interval: Duration,
}

/// Picks the seal contract for the configured network: `--contract-id` wins,
/// otherwise the recorded deployment is used.
pub fn resolve_deployment(
    config: &AppConfig,
    store: &DeploymentStore,
) -> Result<DeploymentRecord> {
    let env = config.network.env();
    let url = config.network.url();

    if let Some(contract_id) = &config.contract_id {
        let record = DeploymentRecord::new(
            contract_id.as_str(),
            url,
            config.asset.map(AssetType::selector),
        );
        if config.save_deployment {
            store
                .save(&record)
                .map_err(|err| eyre!("{err:#}"))
                .wrap_err_with(|| format!("Failed to record deployment for {env}"))?;
            info!(%env, contract_id = %record.contract_id, "deployment recorded");
        }
        return Ok(record);
    }

    let record = store
        .load()
        .map_err(|err| eyre!("{err:#}"))?
        .ok_or_else(|| {
            eyre!("No seal contract recorded for {env}; pass --contract-id to choose one")
        })?;
    if !record.matches_network(url) {
        warn!(
            %env,
            recorded = %record.network_url,
            configured = %url,
            "deployment was recorded against a different RPC URL"
        );
    }
    Ok(record)
}

pub fn asset_from_selector(selector: u64) -> Option<AssetType> {
    match selector {
        0 => Some(AssetType::Btc),
        1 => Some(AssetType::Eth),
        _ => None,
    }
}

#[derive(Clone, Debug)]
pub struct AppSnapshot {
    pub network: String,
    pub contract_id: String,
    pub wallet_address: String,
    pub asset: AssetType,
    pub now: u64,
    pub seals: Arc<[Seal]>,
    pub selected: usize,
    pub pending_reveals: BTreeSet<u64>,
    pub creating: bool,
    pub draft: Vec<AgentPrediction>,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub status: String,
    pub errors: Vec<String>,
}

impl AppSnapshot {
    pub fn selected_seal(&self) -> Option<&Seal> {
        self.seals.get(self.selected)
    }
}

pub struct AppController {
    store: SealStore,
    registry: AgentRegistry,
    asset: AssetType,
    network: String,
    contract_id: String,
    wallet_address: String,
    selected: usize,
    pending_reveals: BTreeSet<u64>,
    creating: bool,
    draft: Vec<AgentPrediction>,
    leaderboard: Vec<LeaderboardEntry>,
    status: String,
    errors: Vec<String>,
}

impl AppController {
    pub fn new(
        store: SealStore,
        asset: AssetType,
        network: impl Into<String>,
        contract_id: impl Into<String>,
        wallet_address: impl Into<String>,
    ) -> Self {
        Self {
            store,
            registry: AgentRegistry::default(),
            asset,
            network: network.into(),
            contract_id: contract_id.into(),
            wallet_address: wallet_address.into(),
            selected: 0,
            pending_reveals: BTreeSet::new(),
            creating: false,
            draft: Vec::new(),
            leaderboard: Vec::new(),
            status: String::from("Loading seals..."),
            errors: Vec::new(),
        }
    }

    pub fn snapshot(&self, now: u64) -> AppSnapshot {
        let seals = self.store.snapshot();
        let selected = self.selected.min(seals.len().saturating_sub(1));
        AppSnapshot {
            network: self.network.clone(),
            contract_id: self.contract_id.clone(),
            wallet_address: self.wallet_address.clone(),
            asset: self.asset,
            now,
            seals,
            selected,
            pending_reveals: self.pending_reveals.clone(),
            creating: self.creating,
            draft: self.draft.clone(),
            leaderboard: self.leaderboard.clone(),
            status: self.status.clone(),
            errors: self.errors.clone(),
        }
    }

    pub fn asset(&self) -> AssetType {
        self.asset
    }

    pub fn toggle_asset(&mut self) {
        self.asset = match self.asset {
            AssetType::Eth => AssetType::Btc,
            AssetType::Btc => AssetType::Eth,
        };
        self.draft.clear();
        self.set_status(format!("Asset switched to {}", self.asset));
    }

    pub fn select_next_seal(&mut self) {
        let len = self.store.len();
        if len > 0 {
            self.selected = (self.selected.min(len - 1) + 1) % len;
        }
    }

    pub fn select_prev_seal(&mut self) {
        let len = self.store.len();
        if len > 0 {
            let current = self.selected.min(len - 1);
            self.selected = if current == 0 { len - 1 } else { current - 1 };
        }
    }

    /// Validates the selected seal for a reveal and marks it in flight.
    pub fn begin_reveal(&mut self, now: u64) -> Result<u64, String> {
        let seals = self.store.snapshot();
        let index = self.selected.min(seals.len().saturating_sub(1));
        let seal = seals
            .get(index)
            .ok_or_else(|| String::from("No seal selected"))?;
        if self.pending_reveals.contains(&seal.id) {
            return Err(format!("Seal #{} is already being revealed", seal.id));
        }
        if seal.is_unlocked {
            return Err(format!("Seal #{} is already revealed", seal.id));
        }
        if !seal.can_unlock(now) {
            return Err(format!(
                "Seal #{} unlocks in {}",
                seal.id,
                format_time_remaining(seal.unlock_time, now)
            ));
        }
        self.pending_reveals.insert(seal.id);
        self.set_status(format!("Revealing seal #{} against {}...", seal.id, self.asset));
        Ok(seal.id)
    }

    pub fn generate_predictions(&mut self, agent_ids: &[u32]) {
        let mut rng = rand::rng();
        self.draft = self.registry.predict(&mut rng, self.asset, agent_ids);
        self.set_status(format!(
            "{} agents made {} predictions",
            self.draft.len(),
            self.asset
        ));
    }

    pub fn discard_draft(&mut self) {
        self.draft.clear();
    }

    /// Takes the drafted predictions for submission. `None` while another
    /// seal is still being created.
    pub fn begin_create(&mut self, lock_secs: u64) -> Option<(u64, Vec<AgentPrediction>)> {
        if self.creating {
            self.set_status("A seal is already being created");
            return None;
        }
        self.creating = true;
        let target = unix_now().saturating_add(lock_secs);
        self.set_status(format!("Sealing {} predictions...", self.draft.len()));
        Some((target, self.draft.clone()))
    }

    pub fn apply_event(&mut self, event: LedgerEvent) {
        match event {
            LedgerEvent::Synced(outcome) => match outcome {
                SyncOutcome::Published { seals, .. } => {
                    debug!(seals, "seal list refreshed");
                    if self.status.starts_with("Loading") {
                        self.set_status(format!("Loaded {seals} seals"));
                    }
                }
                SyncOutcome::CountUnreadable => warn!("seal list refresh failed"),
                SyncOutcome::Superseded | SyncOutcome::Unavailable => {}
            },
            LedgerEvent::SealOpened { seal_id, result } => {
                self.pending_reveals.remove(&seal_id);
                match result {
                    Ok(tx) => self.set_status(format!(
                        "Seal #{seal_id} revealed (tx {})",
                        short_address(&tx.0)
                    )),
                    Err(err) => self.push_errors(vec![format!(
                        "Reveal of seal #{seal_id} failed: {}",
                        error_chain(&err)
                    )]),
                }
            }
            LedgerEvent::SealCreated(result) => {
                self.creating = false;
                match result {
                    Ok(tx) => {
                        self.draft.clear();
                        self.set_status(format!("Seal created (tx {})", short_address(&tx.0)));
                    }
                    Err(err) => self.push_errors(vec![format!(
                        "Creating seal failed: {}",
                        error_chain(&err)
                    )]),
                }
            }
            LedgerEvent::Leaderboard(result) => match result {
                Ok(entries) => self.leaderboard = entries,
                Err(err) => warn!(%err, "leaderboard read failed"),
            },
        }
    }

    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status = message.into();
    }

    fn push_errors(&mut self, mut items: Vec<String>) {
        if items.is_empty() {
            return;
        }
        for item in &items {
            error!("{}", item);
        }
        self.errors.append(&mut items);
        if self.errors.len() > ERROR_HISTORY {
            let drain = self.errors.len() - ERROR_HISTORY;
            self.errors.drain(0..drain);
        }
    }
}

fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

pub fn unix_now() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default()
}

pub enum LedgerCommand {
    Refresh,
    OpenSeal {
        seal_id: u64,
        asset: AssetType,
    },
    CreateSeal {
        target_timestamp: u64,
        predictions: Vec<AgentPrediction>,
    },
    Leaderboard,
    Shutdown,
}

#[derive(Debug)]
pub enum LedgerEvent {
    Synced(SyncOutcome),
    SealOpened {
        seal_id: u64,
        result: Result<TxHash, OpenSealError>,
    },
    SealCreated(Result<TxHash, CreateSealError>),
    Leaderboard(Result<Vec<LeaderboardEntry>, LedgerError>),
}

/// Owns the ledger connection. Commands run one at a time; between them the
/// worker polls `sealCount` and resynchronizes when it moves.
pub async fn ledger_worker<L>(
    mut service: SealService<L>,
    poll_interval: Duration,
    mut cmd_rx: mpsc::UnboundedReceiver<LedgerCommand>,
    event_tx: mpsc::UnboundedSender<LedgerEvent>,
) -> Result<()>
where
    L: LedgerReader + LedgerWriter + Send + Sync + 'static,
{
    fn send(tx: &mpsc::UnboundedSender<LedgerEvent>, event: LedgerEvent) -> Result<()> {
        tx.send(event)
            .map_err(|_| eyre!("ledger event receiver dropped"))
    }

    let mut ticker = time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // Only a published run moves `synced_count`, so a failed or
                // superseded refresh is retried on the next tick.
                match service.seal_count().await {
                    Ok(Some(count)) if service.synced_count() != Some(count) => {
                        debug!(count, synced = ?service.synced_count(), "sealCount changed");
                        send(&event_tx, LedgerEvent::Synced(service.refresh().await))?;
                    }
                    Ok(_) => {}
                    Err(err) => warn!(%err, "sealCount poll failed"),
                }
            }
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else {
                    break;
                };
                match cmd {
                    LedgerCommand::Refresh => {
                        send(&event_tx, LedgerEvent::Synced(service.refresh().await))?;
                    }
                    LedgerCommand::OpenSeal { seal_id, asset } => {
                        service.set_asset(asset);
                        let result = service.open_seal(seal_id).await;
                        send(&event_tx, LedgerEvent::SealOpened { seal_id, result })?;
                    }
                    LedgerCommand::CreateSeal { target_timestamp, predictions } => {
                        let result = service
                            .create_seal(target_timestamp, &predictions, unix_now())
                            .await;
                        send(&event_tx, LedgerEvent::SealCreated(result))?;
                    }
                    LedgerCommand::Leaderboard => {
                        let result = service.leaderboard().await;
                        send(&event_tx, LedgerEvent::Leaderboard(result))?;
                    }
                    LedgerCommand::Shutdown => break,
                }
            }
        }
    }
    service.disconnect();
    info!("ledger worker stopped");
    Ok(())
}

pub async fn run_app(config: AppConfig) -> Result<()> {
    let deployments = DeploymentStore::new(config.network.env())
        .map_err(|err| eyre!("{err:#}"))?;
    let record = resolve_deployment(&config, &deployments)?;
    let asset = config
        .asset
        .or_else(|| record.asset_selector.and_then(asset_from_selector))
        .unwrap_or_default();

    let WalletConfig::ForcKeystore { owner, dir } = &config.wallets;
    let descriptor = wallets::find_wallet(dir, owner)?;
    let signer = wallets::unlock_wallet(&descriptor)?;
    let wallet_address = signer.address();
    info!(wallet = %signer.name(), address = %wallet_address, "wallet unlocked");

    let gateway = GatewayConfig::new(config.network.url(), record.contract_id.as_str());
    let ledger = RpcLedger::new(gateway, signer).wrap_err("Failed to build gateway client")?;
    info!(ledger = %ledger, %asset, "connecting to seal contract");

    let store = SealStore::new();
    let service = SealService::connected(ledger, store.clone(), asset);
    let controller = AppController::new(
        store,
        asset,
        config.network.env().to_string(),
        record.contract_id,
        wallet_address,
    );

    let mut ui_state = ui::UiState::default();
    let mut input_events = ui::input_event_stream();

    tracing::info!("Starting UI");
    ui::terminal_enter(&mut ui_state)?;
    let res = run_loop(
        controller,
        service,
        config.poll_interval,
        &mut ui_state,
        &mut input_events,
    )
    .await;
    ui::terminal_exit()?;
    stop_worker(res?, SHUTDOWN_GRACE).await
}

/// Waits up to `grace` for the worker to finish, then aborts it. Aborting
/// drops any reveal in flight, which rolls back its optimistic unlock.
async fn stop_worker(mut worker: JoinHandle<Result<()>>, grace: Duration) -> Result<()> {
    match time::timeout(grace, &mut worker).await {
        Ok(Ok(res)) => res,
        Ok(Err(err)) => Err(eyre!("ledger worker panicked: {err}")),
        Err(_) => {
            warn!("ledger worker still busy at shutdown; aborting it");
            worker.abort();
            let _ = worker.await;
            Ok(())
        }
    }
}

async fn run_loop<L>(
    mut controller: AppController,
    service: SealService<L>,
    poll_interval: Duration,
    ui_state: &mut ui::UiState,
    input_events: &mut ui::InputEventReceiver,
) -> Result<JoinHandle<Result<()>>>
where
    L: LedgerReader + LedgerWriter + Send + Sync + 'static,
{
    tracing::info!("Running app loop");
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let worker = tokio::spawn(ledger_worker(service, poll_interval, cmd_rx, event_tx));
    let _ = cmd_tx.send(LedgerCommand::Leaderboard);

    let mut redraw = time::interval(REDRAW_INTERVAL);
    redraw.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            maybe_event = event_rx.recv() => {
                let Some(event) = maybe_event else {
                    tracing::warn!("ledger worker channel closed");
                    break;
                };
                let refresh_leaderboard = matches!(
                    event,
                    LedgerEvent::SealOpened { result: Ok(_), .. }
                );
                controller.apply_event(event);
                if refresh_leaderboard {
                    let _ = cmd_tx.send(LedgerCommand::Leaderboard);
                }
                ui::draw(ui_state, &controller.snapshot(unix_now()))
                    .wrap_err("draw after ledger event failed")?;
            }
            _ = redraw.tick() => {
                ui::draw(ui_state, &controller.snapshot(unix_now()))
                    .wrap_err("periodic draw failed")?;
            }
            _ = tokio::signal::ctrl_c() => {
                let _ = cmd_tx.send(LedgerCommand::Shutdown);
                break;
            }
            raw_ev = ui::next_raw_event(input_events) => {
                let event = raw_ev?;
                let Some(ev) = ui::interpret_event(ui_state, event) else {
                    continue;
                };
                match ev {
                    ui::UserEvent::Quit => {
                        let _ = cmd_tx.send(LedgerCommand::Shutdown);
                        break;
                    }
                    ui::UserEvent::Redraw => {}
                    ui::UserEvent::NextSeal => controller.select_next_seal(),
                    ui::UserEvent::PrevSeal => controller.select_prev_seal(),
                    ui::UserEvent::Refresh => {
                        controller.set_status("Refreshing seals...");
                        let _ = cmd_tx.send(LedgerCommand::Refresh);
                        let _ = cmd_tx.send(LedgerCommand::Leaderboard);
                    }
                    ui::UserEvent::ShowLeaderboard => {
                        let _ = cmd_tx.send(LedgerCommand::Leaderboard);
                    }
                    ui::UserEvent::ToggleAsset => controller.toggle_asset(),
                    ui::UserEvent::OpenSelected => match controller.begin_reveal(unix_now()) {
                        Ok(seal_id) => {
                            let _ = cmd_tx.send(LedgerCommand::OpenSeal {
                                seal_id,
                                asset: controller.asset(),
                            });
                        }
                        Err(reason) => controller.set_status(reason),
                    },
                    ui::UserEvent::GeneratePredictions(agent_ids) => {
                        controller.generate_predictions(&agent_ids);
                    }
                    ui::UserEvent::DiscardPredictions => controller.discard_draft(),
                    ui::UserEvent::SealPredictions { lock_secs } => {
                        if let Some((target_timestamp, predictions)) =
                            controller.begin_create(lock_secs)
                        {
                            let _ = cmd_tx.send(LedgerCommand::CreateSeal {
                                target_timestamp,
                                predictions,
                            });
                        }
                    }
                }
                ui::draw(ui_state, &controller.snapshot(unix_now()))
                    .wrap_err("draw after input failed")?;
            }
        }
    }

    Ok(worker)
}
