// src/config.rs
use std::time::Duration;

use ethers::types::{Bytes, U256};

use crate::fees::FEE_FLOOR_WEI;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 30;
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// Tunables for one pipeline instance.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub poll_interval: Duration,
    pub max_poll_attempts: u32,
    pub fee_floor: U256,
    /// Extra data passed to the factory's `getAddress`/`createAccount`.
    pub factory_data: Bytes,
    pub rpc_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_poll_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
            fee_floor: U256::from(FEE_FLOOR_WEI),
            factory_data: Bytes::new(),
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
        }
    }
}
