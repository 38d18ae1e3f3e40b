use anyhow::{
    Context,
    Result,
    anyhow,
};
use chrono::Utc;
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fmt,
    fs,
    path::{
        Path,
        PathBuf,
    },
};

pub const DEPLOYMENTS_ROOT: &str = ".deployments";
const DEPLOYMENTS_FILE: &str = "deployments.json";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeploymentEnv {
    Dev,
    Test,
    Local,
}

impl DeploymentEnv {
    pub const ALL: [DeploymentEnv; 3] =
        [DeploymentEnv::Dev, DeploymentEnv::Test, DeploymentEnv::Local];

    pub fn dir_name(self) -> &'static str {
        match self {
            DeploymentEnv::Dev => "dev",
            DeploymentEnv::Test => "test",
            DeploymentEnv::Local => "local",
        }
    }
}

impl fmt::Display for DeploymentEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeploymentEnv::Dev => "Devnet",
            DeploymentEnv::Test => "Testnet",
            DeploymentEnv::Local => "Local",
        };
        write!(f, "{name}")
    }
}

/// Where the seal contract lives on one network.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub deployed_at: String,
    pub contract_id: String,
    pub network_url: String,
    /// Asset the reveal call settles against (`0` BTC, `1` ETH).
    #[serde(default)]
    pub asset_selector: Option<u64>,
}

impl DeploymentRecord {
    pub fn new(
        contract_id: impl Into<String>,
        network_url: impl Into<String>,
        asset_selector: Option<u64>,
    ) -> Self {
        Self {
            deployed_at: Utc::now().to_rfc3339(),
            contract_id: contract_id.into(),
            network_url: network_url.into(),
            asset_selector,
        }
    }

    /// A record made for one gateway is not reused against another.
    pub fn matches_network(&self, network_url: &str) -> bool {
        self.network_url.trim_end_matches('/') == network_url.trim_end_matches('/')
    }
}

#[derive(Debug)]
pub struct DeploymentStore {
    path: PathBuf,
}

impl DeploymentStore {
    pub fn new(env: DeploymentEnv) -> Result<Self> {
        Self::in_root(DEPLOYMENTS_ROOT, env)
    }

    /// Same layout as [`DeploymentStore::new`], rooted somewhere other than
    /// the working directory.
    pub fn in_root(root: impl AsRef<Path>, env: DeploymentEnv) -> Result<Self> {
        let path = ensure_store(root.as_ref(), env)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<DeploymentRecord>> {
        read_record(&self.path)
    }

    pub fn save(&self, record: &DeploymentRecord) -> Result<()> {
        write_record(&self.path, record)
    }
}

pub fn ensure_structure() -> Result<()> {
    for env in DeploymentEnv::ALL {
        let _ = ensure_store(Path::new(DEPLOYMENTS_ROOT), env)?;
    }
    Ok(())
}

fn ensure_store(root: &Path, env: DeploymentEnv) -> Result<PathBuf> {
    let env_dir = root.join(env.dir_name());
    if !env_dir.exists() {
        fs::create_dir_all(&env_dir).with_context(|| {
            format!(
                "Failed to create deployment directory for {env} at {}",
                env_dir.display()
            )
        })?;
    }

    let file_path = env_dir.join(DEPLOYMENTS_FILE);
    if !file_path.exists() {
        fs::File::create(&file_path).with_context(|| {
            format!(
                "Failed to create deployment record file for {env} at {}",
                file_path.display()
            )
        })?;
    }

    Ok(file_path)
}

fn read_record(path: &Path) -> Result<Option<DeploymentRecord>> {
    let data = fs::read(path).context("Failed to read deployment records")?;
    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    if let Ok(record) = serde_json::from_slice::<DeploymentRecord>(&data) {
        return Ok(Some(record));
    }
    if let Ok(mut records) = serde_json::from_slice::<Vec<DeploymentRecord>>(&data) {
        return Ok(records.pop());
    }
    Err(anyhow!(
        "Failed to parse deployment record JSON in {}; expected a single deployment object",
        path.display()
    ))
}

fn write_record(path: &Path, record: &DeploymentRecord) -> Result<()> {
    let json = serde_json::to_vec_pretty(record)
        .context("Failed to serialize deployment record")?;
    fs::write(path, json).context("Failed to write deployment record")?;
    Ok(())
}

/// Records `contract_id` as the seal contract for `env`, replacing any
/// earlier record.
pub fn record_deployment(
    env: DeploymentEnv,
    contract_id: impl AsRef<str>,
    network_url: impl AsRef<str>,
    asset_selector: Option<u64>,
) -> Result<DeploymentRecord> {
    let store = DeploymentStore::new(env)?;
    let record = DeploymentRecord::new(
        contract_id.as_ref(),
        network_url.as_ref(),
        asset_selector,
    );
    store.save(&record)?;
    Ok(record)
}
