use clap::{
    ArgGroup,
    Parser,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use prophecy_seals::{
    client,
    wallets,
};
use seal_ledger::AssetType;
use std::time::Duration;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling,
};
use tracing_subscriber::{
    EnvFilter,
    fmt,
};

#[derive(Parser, Debug)]
#[command(
    name = "prophecy-seals",
    about = "Seal AI agent price predictions on-chain and reveal them when they unlock",
    group(
        ArgGroup::new("network")
            .args(["devnet", "testnet", "local"])
            .required(true)
    )
)]
struct Args {
    /// Connect to Fuel devnet
    #[arg(long)]
    devnet: bool,

    /// Connect to Fuel testnet
    #[arg(long)]
    testnet: bool,

    /// Connect to a local node
    #[arg(long)]
    local: bool,

    /// Override the RPC URL for the selected network
    #[arg(long)]
    rpc_url: Option<String>,

    /// forc-wallet profile used to sign transactions
    #[arg(long)]
    wallet: String,

    /// Override forc-wallet directory (defaults to ~/.fuel/wallets)
    #[arg(long)]
    wallet_dir: Option<String>,

    /// Seal contract id; defaults to the recorded deployment for the network
    #[arg(long)]
    contract_id: Option<String>,

    /// Record --contract-id as the deployment for the selected network
    #[arg(long, requires = "contract_id")]
    save_deployment: bool,

    /// Asset seals are revealed against (eth or btc)
    #[arg(long)]
    asset: Option<AssetType>,

    /// Seconds between sealCount polls
    #[arg(long, default_value_t = client::DEFAULT_POLL_INTERVAL.as_secs())]
    poll_secs: u64,

    /// Directory for log files
    #[arg(long, default_value = "logs")]
    log_dir: String,
}

impl Args {
    fn into_config(self) -> Result<client::AppConfig> {
        let Args {
            devnet,
            testnet,
            local,
            rpc_url,
            wallet,
            wallet_dir,
            contract_id,
            save_deployment,
            asset,
            poll_secs,
            log_dir: _,
        } = self;

        let network = match (devnet, testnet, local) {
            (true, _, _) => client::NetworkTarget::Devnet {
                url: rpc_url.unwrap_or_else(|| client::DEFAULT_DEVNET_RPC_URL.to_string()),
            },
            (_, true, _) => client::NetworkTarget::Testnet {
                url: rpc_url.unwrap_or_else(|| client::DEFAULT_TESTNET_RPC_URL.to_string()),
            },
            (_, _, true) => client::NetworkTarget::LocalNode {
                url: rpc_url.unwrap_or_else(|| client::DEFAULT_LOCAL_RPC_URL.to_string()),
            },
            _ => return Err(eyre!("Select a network with --devnet, --testnet, or --local")),
        };

        let dir = wallets::resolve_wallet_dir(wallet_dir.as_deref())?;
        Ok(client::AppConfig {
            network,
            wallets: client::WalletConfig::ForcKeystore { owner: wallet, dir },
            contract_id,
            save_deployment,
            asset,
            poll_interval: Duration::from_secs(poll_secs.max(1)),
        })
    }
}

/// The terminal belongs to the UI, so logs go to a daily file instead.
fn init_tracing(log_dir: &str) -> Result<WorkerGuard> {
    let appender = rolling::daily(log_dir, "prophecy-seals.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|err| eyre!("failed to install tracing subscriber: {err}"))?;
    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    let _log_guard = init_tracing(&args.log_dir)?;
    tracing::info!("starting prophecy-seals client");
    deployments::ensure_structure()
        .map_err(|e| eyre!(e))
        .wrap_err("initializing deployment directories")?;
    let app_config = args.into_config()?;
    client::run_app(app_config).await
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    #[test]
    fn args__network_is_required() {
        let res = Args::try_parse_from(["prophecy-seals", "--wallet", "alice"]);

        assert!(res.is_err());
    }

    #[test]
    fn args__two_networks__are_rejected() {
        let res = Args::try_parse_from([
            "prophecy-seals",
            "--devnet",
            "--local",
            "--wallet",
            "alice",
        ]);

        assert!(res.is_err());
    }

    #[test]
    fn args__save_deployment_without_contract_id__is_rejected() {
        let res = Args::try_parse_from([
            "prophecy-seals",
            "--local",
            "--wallet",
            "alice",
            "--save-deployment",
        ]);

        assert!(res.is_err());
    }

    #[test]
    fn into_config__local_defaults() {
        // given
        let args = Args::try_parse_from([
            "prophecy-seals",
            "--local",
            "--wallet",
            "alice",
            "--wallet-dir",
            "/tmp/wallets",
            "--asset",
            "BTC",
        ])
        .unwrap();

        // when
        let config = args.into_config().unwrap();

        // then
        let client::NetworkTarget::LocalNode { url } = &config.network else {
            panic!("expected local network, got {:?}", config.network);
        };
        assert_eq!(url, client::DEFAULT_LOCAL_RPC_URL);
        assert_eq!(config.asset, Some(AssetType::Btc));
        assert_eq!(config.poll_interval, client::DEFAULT_POLL_INTERVAL);
        let client::WalletConfig::ForcKeystore { owner, dir } = &config.wallets;
        assert_eq!(owner, "alice");
        assert_eq!(dir, &std::path::PathBuf::from("/tmp/wallets"));
    }

    #[test]
    fn into_config__rpc_url_overrides_network_default() {
        let args = Args::try_parse_from([
            "prophecy-seals",
            "--testnet",
            "--rpc-url",
            "http://10.0.0.2:4000",
            "--wallet",
            "alice",
            "--wallet-dir",
            "/tmp/wallets",
        ])
        .unwrap();

        let config = args.into_config().unwrap();

        assert_eq!(config.network.url(), "http://10.0.0.2:4000");
    }
}
