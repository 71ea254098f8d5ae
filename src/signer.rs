// src/signer.rs
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use ethers::providers::Middleware;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Bytes, Signature, H256};
use tracing::debug;

use crate::error::SignerError;

/// Capability bound to the account's controlling key. It signs a 32-byte
/// operation hash as an EIP-191 message over the raw bytes (not their hex text)
/// and never hands out key material.
#[async_trait]
pub trait OperationSigner: Send + Sync {
    /// Owner address the smart account is derived from.
    fn address(&self) -> Address;

    async fn sign_hash(&self, hash: H256) -> Result<Bytes, SignerError>;
}

/// Signs with a private key held in memory.
pub struct LocalKeySigner {
    wallet: LocalWallet,
}

impl LocalKeySigner {
    /// Accepts 64 hex characters, with or without a `0x` prefix.
    pub fn from_private_key(key: &str) -> Result<Self, SignerError> {
        let trimmed = key.trim();
        let stripped = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        if stripped.len() != 64 {
            return Err(SignerError::InvalidKey(
                "expected 64 hex characters".to_string(),
            ));
        }
        let raw = hex::decode(stripped).map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        let wallet = LocalWallet::from_bytes(&raw).map_err(|e| SignerError::InvalidKey(e.to_string()))?;

        Ok(Self { wallet })
    }
}

impl fmt::Debug for LocalKeySigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalKeySigner")
            .field("address", &self.wallet.address())
            .finish()
    }
}

#[async_trait]
impl OperationSigner for LocalKeySigner {
    fn address(&self) -> Address {
        self.wallet.address()
    }

    async fn sign_hash(&self, hash: H256) -> Result<Bytes, SignerError> {
        let signature = self
            .wallet
            .sign_message(hash.as_bytes())
            .await
            .map_err(|e| SignerError::Rejected(e.to_string()))?;

        Ok(Bytes::from(signature.to_vec()))
    }
}

/// Delegates to a connected wallet (the "admin account") reachable through the
/// node's `eth_sign`, e.g. an unlocked account or a wallet bridge.
pub struct DelegatedSigner<M> {
    client: Arc<M>,
    admin: Address,
}

impl<M> DelegatedSigner<M> {
    pub fn new(client: Arc<M>, admin: Address) -> Self {
        Self { client, admin }
    }
}

impl<M> fmt::Debug for DelegatedSigner<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegatedSigner")
            .field("admin", &self.admin)
            .finish()
    }
}

#[async_trait]
impl<M: Middleware + 'static> OperationSigner for DelegatedSigner<M> {
    fn address(&self) -> Address {
        self.admin
    }

    async fn sign_hash(&self, hash: H256) -> Result<Bytes, SignerError> {
        debug!("Requesting signature from connected wallet {:?}", self.admin);

        let mut signature: Signature = self
            .client
            .sign(hash.as_bytes().to_vec(), &self.admin)
            .await
            .map_err(|e| SignerError::Rejected(e.to_string()))?;

        // Some wallets return the bare recovery id.
        if signature.v < 27 {
            signature.v += 27;
        }

        Ok(Bytes::from(signature.to_vec()))
    }
}
