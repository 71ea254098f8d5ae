// src/network.rs
use std::collections::HashMap;
use std::fmt;

use clap::ValueEnum;
use ethers::types::Address;
use serde::{Deserialize, Serialize};

use crate::error::UserOpError;

/// ERC-4337 EntryPoint v0.6, deployed at the same address on every supported chain.
pub const ENTRY_POINT_V06: &str = "0x5ff137d4b0fdcd49dca30c7cf57e578a026d2789";

/// Smart account factory shared by all supported chains.
pub const ACCOUNT_FACTORY: &str = "0xdE320c2E2b4953883f61774c006f9057A55B97D1";

pub const PIMLICO_GAS_PRICE_METHOD: &str = "pimlico_getUserOperationGasPrice";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkKey {
    Monad,
    Bnb,
    Avax,
    Polygon,
    Optimism,
}

impl NetworkKey {
    pub const ALL: [NetworkKey; 5] = [
        NetworkKey::Monad,
        NetworkKey::Bnb,
        NetworkKey::Avax,
        NetworkKey::Polygon,
        NetworkKey::Optimism,
    ];
}

impl fmt::Display for NetworkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NetworkKey::Monad => "monad",
            NetworkKey::Bnb => "bnb",
            NetworkKey::Avax => "avax",
            NetworkKey::Polygon => "polygon",
            NetworkKey::Optimism => "optimism",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub symbol: String,
    pub decimals: u8,
}

/// The ERC-20 the application exists to move out of smart accounts (USDC).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoverableAsset {
    pub symbol: String,
    pub address: Address,
    pub decimals: u8,
}

/// Static per-chain configuration. Built once and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkProfile {
    pub name: String,
    pub chain_id: u64,
    pub native_currency: NativeCurrency,
    pub rpc_url: String,
    pub explorer_url: String,
    pub entry_point: Address,
    pub factory: Address,
    pub bundler_url: String,
    pub fee_oracle_method: String,
    pub recoverable_asset: RecoverableAsset,
}

impl NetworkProfile {
    pub fn explorer_tx_url(&self, tx_hash: impl fmt::LowerHex) -> String {
        format!("{}/tx/{:#x}", self.explorer_url.trim_end_matches('/'), tx_hash)
    }
}

struct BuiltinNetwork {
    key: NetworkKey,
    name: &'static str,
    chain_id: u64,
    native_symbol: &'static str,
    rpc_url: &'static str,
    explorer_url: &'static str,
    usdc: &'static str,
    usdc_decimals: u8,
}

const BUILTIN_NETWORKS: [BuiltinNetwork; 5] = [
    BuiltinNetwork {
        key: NetworkKey::Monad,
        name: "Monad Mainnet",
        chain_id: 143,
        native_symbol: "MON",
        rpc_url: "https://rpc3.monad.xyz",
        explorer_url: "https://mainnet-beta.monvision.io",
        usdc: "0x754704Bc059F8C67012fEd69BC8A327a5aafb603",
        usdc_decimals: 6,
    },
    BuiltinNetwork {
        key: NetworkKey::Bnb,
        name: "BNB Smart Chain",
        chain_id: 56,
        native_symbol: "BNB",
        rpc_url: "https://bsc-dataseed1.binance.org",
        explorer_url: "https://bscscan.com",
        usdc: "0x8AC76a51cc950d9822D68b83fE1Ad97B32Cd580d",
        usdc_decimals: 18,
    },
    BuiltinNetwork {
        key: NetworkKey::Avax,
        name: "Avalanche C-Chain",
        chain_id: 43114,
        native_symbol: "AVAX",
        rpc_url: "https://avax.api.pocket.network",
        explorer_url: "https://snowtrace.io",
        usdc: "0xB97EF9Ef8734C71904D8002F8b6Bc66Dd9c48a6E",
        usdc_decimals: 6,
    },
    BuiltinNetwork {
        key: NetworkKey::Polygon,
        name: "Polygon",
        chain_id: 137,
        native_symbol: "MATIC",
        rpc_url: "https://polygon-rpc.com",
        explorer_url: "https://polygonscan.com",
        usdc: "0x3c499c542cEF5E3811e1192ce70d8cC03d5c3359",
        usdc_decimals: 6,
    },
    BuiltinNetwork {
        key: NetworkKey::Optimism,
        name: "Optimism",
        chain_id: 10,
        native_symbol: "ETH",
        rpc_url: "https://optimism-public.nodies.app",
        explorer_url: "https://optimistic.etherscan.io",
        usdc: "0x0b2C639c533813f4Aa9D7837CAf62653d097Ff85",
        usdc_decimals: 6,
    },
];

fn parse_address(value: &str) -> Result<Address, UserOpError> {
    value
        .parse::<Address>()
        .map_err(|e| UserOpError::InvalidParameters(format!("bad address {value}: {e}")))
}

/// Pimlico serves bundler, fee oracle and paymaster methods from one endpoint per chain.
pub fn pimlico_url(chain_id: u64, api_key: Option<&str>) -> String {
    match api_key {
        Some(key) if !key.is_empty() => {
            format!("https://api.pimlico.io/v2/{chain_id}/rpc?apikey={key}")
        }
        _ => format!("https://api.pimlico.io/v2/{chain_id}/rpc"),
    }
}

/// Profiles keyed by network, loaded once at startup.
#[derive(Debug, Clone)]
pub struct NetworkRegistry {
    profiles: HashMap<NetworkKey, NetworkProfile>,
}

impl NetworkRegistry {
    pub fn builtin(bundler_api_key: Option<&str>) -> Result<Self, UserOpError> {
        let entry_point = parse_address(ENTRY_POINT_V06)?;
        let factory = parse_address(ACCOUNT_FACTORY)?;

        let mut profiles = HashMap::with_capacity(BUILTIN_NETWORKS.len());
        for network in BUILTIN_NETWORKS.iter() {
            let profile = NetworkProfile {
                name: network.name.to_string(),
                chain_id: network.chain_id,
                native_currency: NativeCurrency {
                    symbol: network.native_symbol.to_string(),
                    decimals: 18,
                },
                rpc_url: network.rpc_url.to_string(),
                explorer_url: network.explorer_url.to_string(),
                entry_point,
                factory,
                bundler_url: pimlico_url(network.chain_id, bundler_api_key),
                fee_oracle_method: PIMLICO_GAS_PRICE_METHOD.to_string(),
                recoverable_asset: RecoverableAsset {
                    symbol: "USDC".to_string(),
                    address: parse_address(network.usdc)?,
                    decimals: network.usdc_decimals,
                },
            };
            profiles.insert(network.key, profile);
        }

        Ok(Self { profiles })
    }

    pub fn get(&self, key: NetworkKey) -> Option<&NetworkProfile> {
        self.profiles.get(&key)
    }

    pub fn by_chain_id(&self, chain_id: u64) -> Option<(NetworkKey, &NetworkProfile)> {
        self.profiles
            .iter()
            .find(|(_, profile)| profile.chain_id == chain_id)
            .map(|(key, profile)| (*key, profile))
    }
}
