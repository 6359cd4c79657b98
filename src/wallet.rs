//! Keypair-backed signer

use crate::tx_builder::{SignerError, TransactionSigner};
use anyhow::{Context, Result};
use async_trait::async_trait;
use solana_sdk::{
    message::VersionedMessage,
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
};
use std::path::Path;
use std::sync::Arc;

/// Signs every message with a local keypair, no approval step
#[derive(Clone)]
pub struct WalletManager {
    keypair: Arc<Keypair>,
}

impl WalletManager {
    /// Load a keypair file: the Solana CLI JSON array or 64 raw bytes
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;

        let bytes = match raw.len() {
            64 => raw,
            _ => serde_json::from_slice::<Vec<u8>>(&raw)
                .with_context(|| format!("{} is neither 64 raw bytes nor a JSON array", path.display()))?,
        };
        anyhow::ensure!(bytes.len() == 64, "keypair must be 64 bytes, found {}", bytes.len());
        anyhow::ensure!(bytes.iter().any(|&b| b != 0), "all-zero keypair");
        let keypair = Keypair::try_from(bytes.as_slice()).context("malformed ed25519 keypair")?;
        Ok(Self::from_keypair(keypair))
    }

    pub fn from_keypair(keypair: Keypair) -> Self {
        Self {
            keypair: Arc::new(keypair),
        }
    }

    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }
}

impl std::fmt::Debug for WalletManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletManager")
            .field("pubkey", &self.pubkey())
            .finish()
    }
}

#[async_trait]
impl TransactionSigner for WalletManager {
    fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    async fn sign_message(&self, message: &VersionedMessage) -> Result<Signature, SignerError> {
        self.keypair
            .try_sign_message(&message.serialize())
            .map_err(|e| SignerError::Failed(e.to_string()))
    }
}
