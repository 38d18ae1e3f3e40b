use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use eth_keystore::decrypt_key;
use fuels::{
    crypto::{
        Message,
        PublicKey,
        SecretKey,
        Signature,
    },
    prelude::derivation::DEFAULT_DERIVATION_PATH,
    types::Address,
};
use rpassword::prompt_password;
use seal_ledger::{
    LedgerError,
    rpc::TransactionSigner,
};
use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
};

#[derive(Clone, Debug)]
pub struct WalletDescriptor {
    pub name: String,
    pub path: PathBuf,
}

impl WalletDescriptor {
    pub fn new(name: impl Into<String>, path: PathBuf) -> Self {
        Self {
            name: name.into(),
            path,
        }
    }
}

pub fn default_wallet_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").wrap_err("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".fuel").join("wallets"))
}

pub fn resolve_wallet_dir(dir: Option<&str>) -> Result<PathBuf> {
    match dir {
        Some(raw) => {
            let expanded = shellexpand::tilde(raw);
            Ok(PathBuf::from(expanded.into_owned()))
        }
        None => default_wallet_dir(),
    }
}

pub fn list_wallets(dir: &Path) -> Result<Vec<WalletDescriptor>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut wallets = Vec::new();
    for entry in fs::read_dir(dir).wrap_err("Failed to read wallet directory")? {
        let entry = entry.wrap_err("Failed to read wallet entry")?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if path.extension().and_then(|ext| ext.to_str()) != Some("wallet") {
            continue;
        }
        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| eyre!("Invalid wallet filename {:?}", path))?
            .to_owned();
        wallets.push(WalletDescriptor::new(name, path));
    }
    wallets.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(wallets)
}

pub fn find_wallet(dir: &Path, name: &str) -> Result<WalletDescriptor> {
    let wallets = list_wallets(dir)?;
    wallets
        .into_iter()
        .find(|w| w.name == name)
        .ok_or_else(|| eyre!("Wallet '{name}' not found in {}", dir.to_string_lossy()))
}

/// An unlocked keystore key, used to sign seal transactions.
#[derive(Clone)]
pub struct KeystoreSigner {
    name: String,
    secret: SecretKey,
    address: Address,
}

impl KeystoreSigner {
    pub fn new(name: impl Into<String>, secret: SecretKey) -> Self {
        let public = PublicKey::from(&secret);
        let address = Address::from(*public.hash());
        Self {
            name: name.into(),
            secret,
            address,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for KeystoreSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeystoreSigner")
            .field("name", &self.name)
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

impl TransactionSigner for KeystoreSigner {
    fn address(&self) -> String {
        format!("0x{}", hex::encode(*self.address))
    }

    fn sign_digest(&self, digest: &[u8; 32]) -> Result<String, LedgerError> {
        let message = Message::from_bytes(*digest);
        let signature = Signature::sign(&self.secret, &message);
        Ok(format!("0x{}", hex::encode(*signature)))
    }
}

pub fn unlock_wallet(descriptor: &WalletDescriptor) -> Result<KeystoreSigner> {
    let prompt = format!("Enter password for wallet '{}': ", descriptor.name);
    let password = prompt_password(prompt).wrap_err("Failed to read wallet password")?;
    unlock_with_password(descriptor, &password)
}

pub fn unlock_with_password(
    descriptor: &WalletDescriptor,
    password: &str,
) -> Result<KeystoreSigner> {
    let secret = decrypt_key(&descriptor.path, password.as_bytes())
        .map_err(|_| eyre!("Invalid password for wallet '{}'", descriptor.name))?;
    signer_from_key_material(&descriptor.name, &secret)
}

/// Keystores hold either a raw 32-byte key or a mnemonic phrase.
fn signer_from_key_material(name: &str, secret: &[u8]) -> Result<KeystoreSigner> {
    if let Ok(secret_key) = SecretKey::try_from(secret) {
        return Ok(KeystoreSigner::new(name, secret_key));
    }

    if let Ok(mnemonic) = std::str::from_utf8(secret) {
        let word_count = mnemonic.split_whitespace().count();
        if word_count >= 12 {
            let private_key = SecretKey::new_from_mnemonic_phrase_with_path(
                mnemonic,
                DEFAULT_DERIVATION_PATH,
            )?;
            return Ok(KeystoreSigner::new(name, private_key));
        }
    }

    Err(eyre!("Wallet '{name}' contained unsupported key material"))
}
