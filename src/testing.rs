// src/testing.rs
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use ethers::types::{Address, Bytes, H256, U256};

use crate::bundler::BundlerApi;
use crate::error::BundlerError;
use crate::network::{NativeCurrency, NetworkProfile, RecoverableAsset, PIMLICO_GAS_PRICE_METHOD};
use crate::sponsor::PaymasterApi;
use crate::types::{
    FeeQuote, GasEstimate, GasPriceTiers, PaymasterResponse, UserOperation, UserOperationReceipt,
};

pub(crate) fn transport_down() -> BundlerError {
    BundlerError::Transport("connection refused".to_string())
}

/// Small custom network, factory `0xffff…`, USDC-like token `0x7575…`.
pub(crate) fn chain7_profile() -> NetworkProfile {
    NetworkProfile {
        name: "chain-7".to_string(),
        chain_id: 7,
        native_currency: NativeCurrency {
            symbol: "ETH".to_string(),
            decimals: 18,
        },
        rpc_url: "http://127.0.0.1:8545".to_string(),
        explorer_url: "https://explorer.chain7.test".to_string(),
        entry_point: Address::repeat_byte(0x5f),
        factory: Address::repeat_byte(0xff),
        bundler_url: "http://127.0.0.1:4337".to_string(),
        fee_oracle_method: PIMLICO_GAS_PRICE_METHOD.to_string(),
        recoverable_asset: RecoverableAsset {
            symbol: "USDC".to_string(),
            address: Address::repeat_byte(0x75),
            decimals: 6,
        },
    }
}

pub(crate) fn receipt(user_op_hash: H256, success: bool) -> UserOperationReceipt {
    UserOperationReceipt {
        user_op_hash,
        success,
        transaction_hash: success.then(|| H256::repeat_byte(0xee)),
        reason: None,
        raw: serde_json::Value::Null,
    }
}

/// Scripted bundler that records what it was asked.
pub(crate) struct FakeBundler {
    pub gas_price: Result<GasPriceTiers, BundlerError>,
    pub estimate: Result<GasEstimate, BundlerError>,
    pub send: Result<H256, BundlerError>,
    pub receipts: Mutex<VecDeque<Result<Option<UserOperationReceipt>, BundlerError>>>,
    pub receipt_calls: AtomicUsize,
    pub estimated: Mutex<Vec<UserOperation>>,
    pub sent: Mutex<Vec<UserOperation>>,
}

impl Default for FakeBundler {
    fn default() -> Self {
        Self {
            gas_price: Ok(GasPriceTiers {
                slow: None,
                standard: FeeQuote {
                    max_fee_per_gas: U256::from(3_000_000_000u64),
                    max_priority_fee_per_gas: U256::from(2_000_000_000u64),
                },
                fast: None,
            }),
            estimate: Ok(GasEstimate {
                pre_verification_gas: Some(U256::from(48_000)),
                verification_gas_limit: Some(U256::from(110_000)),
                call_gas_limit: Some(U256::from(35_000)),
            }),
            send: Ok(H256::repeat_byte(0xab)),
            receipts: Mutex::new(VecDeque::new()),
            receipt_calls: AtomicUsize::new(0),
            estimated: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
        }
    }
}

impl FakeBundler {
    pub fn with_receipts(self, receipts: Vec<Option<UserOperationReceipt>>) -> Self {
        self.with_receipt_lookups(receipts.into_iter().map(Ok).collect())
    }

    /// Scripts each receipt lookup, including failed ones.
    pub fn with_receipt_lookups(
        self,
        lookups: Vec<Result<Option<UserOperationReceipt>, BundlerError>>,
    ) -> Self {
        *self.receipts.lock().unwrap() = lookups.into();
        self
    }

    pub fn receipt_calls(&self) -> usize {
        self.receipt_calls.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<UserOperation> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl BundlerApi for FakeBundler {
    async fn estimate_user_operation_gas(
        &self,
        op: &UserOperation,
        _entry_point: Address,
    ) -> Result<GasEstimate, BundlerError> {
        self.estimated.lock().unwrap().push(op.clone());
        self.estimate.clone()
    }

    async fn send_user_operation(
        &self,
        op: &UserOperation,
        _entry_point: Address,
    ) -> Result<H256, BundlerError> {
        self.sent.lock().unwrap().push(op.clone());
        self.send.clone()
    }

    async fn get_user_operation_receipt(
        &self,
        _user_op_hash: H256,
    ) -> Result<Option<UserOperationReceipt>, BundlerError> {
        self.receipt_calls.fetch_add(1, Ordering::SeqCst);
        self.receipts.lock().unwrap().pop_front().unwrap_or(Ok(None))
    }

    async fn get_user_operation_gas_price(&self) -> Result<GasPriceTiers, BundlerError> {
        self.gas_price.clone()
    }
}

pub(crate) struct FakePaymaster {
    pub response: Result<PaymasterResponse, BundlerError>,
}

impl FakePaymaster {
    pub fn approving() -> Self {
        Self {
            response: Ok(PaymasterResponse {
                paymaster_and_data: Bytes::from(vec![0x99; 84]),
                pre_verification_gas: None,
                verification_gas_limit: None,
                call_gas_limit: None,
            }),
        }
    }
}

#[async_trait]
impl PaymasterApi for FakePaymaster {
    async fn sponsor_user_operation(
        &self,
        _op: &UserOperation,
        _entry_point: Address,
    ) -> Result<PaymasterResponse, BundlerError> {
        self.response.clone()
    }
}
