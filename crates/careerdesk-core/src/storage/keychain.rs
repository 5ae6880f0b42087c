use anyhow::{bail, Context, Result};
use keyring::Entry;
use tracing::info;

use super::StoreCipher;

const SERVICE_NAME: &str = "careerdesk";

/// Keychain account holding the store encryption secret
const STORE_SECRET_ACCOUNT: &str = "store-secret";

/// OS keychain access for the secret that encrypts the durable store.
pub struct Keychain {
    service: String,
    entry: Entry,
}

impl Keychain {
    pub fn open() -> Result<Self> {
        Self::for_service(SERVICE_NAME)
    }

    pub fn for_service(service: &str) -> Result<Self> {
        let entry =
            Entry::new(service, STORE_SECRET_ACCOUNT).context("Failed to create keyring entry")?;
        Ok(Self {
            service: service.to_string(),
            entry,
        })
    }

    /// Retrieve the store secret, generating and saving one on first use
    pub fn store_secret(&self) -> Result<String> {
        match self.entry.get_password() {
            Ok(secret) => Ok(secret),
            Err(keyring::Error::NoEntry) => {
                let secret = StoreCipher::generate_secret();
                self.entry
                    .set_password(&secret)
                    .context("Failed to store secret in keychain")?;
                info!("Generated new store secret");
                Ok(secret)
            }
            Err(e) => Err(e).context("Failed to retrieve store secret from keychain"),
        }
    }

    /// Whether a freshly opened entry sees `secret`, i.e. the next run will too
    pub fn is_persistent(&self, secret: &str) -> bool {
        Entry::new(&self.service, STORE_SECRET_ACCOUNT)
            .and_then(|entry| entry.get_password())
            .map(|stored| stored == secret)
            .unwrap_or(false)
    }

    /// Build the store cipher from the keychain secret.
    ///
    /// Fails when the backend does not keep secrets between entries, since
    /// anything sealed now could not be opened by the next run.
    pub fn store_cipher(&self) -> Result<StoreCipher> {
        let secret = self.store_secret()?;
        if !self.is_persistent(&secret) {
            bail!("Keychain backend does not persist secrets");
        }
        StoreCipher::from_secret(secret.as_bytes()).context("Failed to derive store key")
    }
}
