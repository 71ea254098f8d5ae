// src/types.rs
use ethers::types::{Address, Bytes, H256, U256};
use serde::{Deserialize, Serialize};

use crate::error::BundlerError;

/// ERC-4337 v0.6 UserOperation, serialized the way bundlers expect it:
/// camelCase keys, integers as hex quantities, bytes as 0x-prefixed hex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperation {
    pub sender: Address,
    pub nonce: U256,
    pub init_code: Bytes,
    pub call_data: Bytes,
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub paymaster_and_data: Bytes,
    pub signature: Bytes,
}

impl UserOperation {
    /// Upper bound of what the EntryPoint may charge: every gas limit priced at `maxFeePerGas`.
    pub fn max_gas_cost(&self) -> Option<U256> {
        self.call_gas_limit
            .checked_add(self.verification_gas_limit)
            .and_then(|sum| sum.checked_add(self.pre_verification_gas))
            .and_then(|total| total.checked_mul(self.max_fee_per_gas))
    }
}

/// Result of `eth_estimateUserOperationGas`. Bundlers may omit any field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasEstimate {
    #[serde(default)]
    pub pre_verification_gas: Option<U256>,
    #[serde(default)]
    pub verification_gas_limit: Option<U256>,
    #[serde(default)]
    pub call_gas_limit: Option<U256>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeQuote {
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
}

impl FeeQuote {
    pub fn uniform(price: U256) -> Self {
        Self {
            max_fee_per_gas: price,
            max_priority_fee_per_gas: price,
        }
    }

    /// A zero priority fee is a valid tip; only a zero `max_fee_per_gas` leaves
    /// the operation unpriced.
    pub fn is_unpriced(&self) -> bool {
        self.max_fee_per_gas.is_zero()
    }
}

/// Tiered recommendation from the fee oracle; only `standard` is used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasPriceTiers {
    #[serde(default)]
    pub slow: Option<FeeQuote>,
    pub standard: FeeQuote,
    #[serde(default)]
    pub fast: Option<FeeQuote>,
}

/// Response of `pm_sponsorUserOperation`. Accepts the snake_case shape the arka
/// paymaster emits as well as the camelCase one hosted paymasters use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymasterResponse {
    #[serde(alias = "paymaster_and_data")]
    pub paymaster_and_data: Bytes,
    #[serde(default, alias = "pre_verification_gas")]
    pub pre_verification_gas: Option<U256>,
    #[serde(default, alias = "verification_gas_limit")]
    pub verification_gas_limit: Option<U256>,
    #[serde(default, alias = "call_gas_limit")]
    pub call_gas_limit: Option<U256>,
}

/// What to move out of the smart account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Asset {
    Native,
    Token(Address),
}

/// Address conventionally used to mean "the chain's native currency".
pub const NATIVE_ASSET_SENTINEL: &str = "0xEeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE";

impl Asset {
    pub fn from_address(address: Address) -> Self {
        if Some(address) == NATIVE_ASSET_SENTINEL.parse::<Address>().ok() {
            Asset::Native
        } else {
            Asset::Token(address)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferIntent {
    pub asset: Asset,
    pub recipient: Address,
    /// In the asset's smallest unit.
    pub amount: U256,
}

/// Terminal record for a submitted operation.
#[derive(Debug, Clone, PartialEq)]
pub struct UserOperationReceipt {
    pub user_op_hash: H256,
    pub success: bool,
    /// Only present when the operation succeeded.
    pub transaction_hash: Option<H256>,
    pub reason: Option<String>,
    pub raw: serde_json::Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceiptWire {
    user_op_hash: H256,
    success: bool,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    receipt: Option<TransactionRef>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionRef {
    transaction_hash: H256,
}

impl UserOperationReceipt {
    pub fn from_raw(raw: serde_json::Value) -> Result<Self, BundlerError> {
        let wire: ReceiptWire = serde_json::from_value(raw.clone())
            .map_err(|e| BundlerError::InvalidResponse(format!("receipt: {e}")))?;

        let transaction_hash = if wire.success {
            wire.receipt.map(|r| r.transaction_hash)
        } else {
            None
        };

        Ok(Self {
            user_op_hash: wire.user_op_hash,
            success: wire.success,
            transaction_hash,
            reason: wire.reason.filter(|r| !r.is_empty()),
            raw,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_operation_wire_format() {
        let op = UserOperation {
            sender: Address::repeat_byte(0x11),
            nonce: U256::from(7),
            init_code: Bytes::new(),
            call_data: Bytes::from(vec![0xde, 0xad]),
            call_gas_limit: U256::from(300_000),
            verification_gas_limit: U256::from(300_000),
            pre_verification_gas: U256::from(500_000),
            max_fee_per_gas: U256::from(1_500_000_000u64),
            max_priority_fee_per_gas: U256::from(1_500_000_000u64),
            paymaster_and_data: Bytes::new(),
            signature: Bytes::new(),
        };

        let value = serde_json::to_value(&op).unwrap();
        assert_eq!(value["nonce"], json!("0x7"));
        assert_eq!(value["callGasLimit"], json!("0x493e0"));
        assert_eq!(value["preVerificationGas"], json!("0x7a120"));
        assert_eq!(value["initCode"], json!("0x"));
        assert_eq!(value["callData"], json!("0xdead"));
        assert_eq!(value["paymasterAndData"], json!("0x"));
    }

    #[test]
    fn max_gas_cost_sums_limits() {
        let op = UserOperation {
            sender: Address::zero(),
            nonce: U256::zero(),
            init_code: Bytes::new(),
            call_data: Bytes::new(),
            call_gas_limit: U256::from(1),
            verification_gas_limit: U256::from(2),
            pre_verification_gas: U256::from(3),
            max_fee_per_gas: U256::from(10),
            max_priority_fee_per_gas: U256::from(1),
            paymaster_and_data: Bytes::new(),
            signature: Bytes::new(),
        };
        assert_eq!(op.max_gas_cost(), Some(U256::from(60)));
    }

    #[test]
    fn gas_estimate_tolerates_missing_fields() {
        let estimate: GasEstimate =
            serde_json::from_value(json!({ "callGasLimit": "0x1d4c0" })).unwrap();
        assert_eq!(estimate.call_gas_limit, Some(U256::from(120_000)));
        assert_eq!(estimate.verification_gas_limit, None);
        assert_eq!(estimate.pre_verification_gas, None);
    }

    #[test]
    fn paymaster_response_accepts_both_casings() {
        let camel: PaymasterResponse =
            serde_json::from_value(json!({ "paymasterAndData": "0xabcd" })).unwrap();
        let snake: PaymasterResponse =
            serde_json::from_value(json!({ "paymaster_and_data": "0xabcd" })).unwrap();
        assert_eq!(camel, snake);
        assert_eq!(camel.paymaster_and_data, Bytes::from(vec![0xab, 0xcd]));
    }

    #[test]
    fn native_sentinel_maps_to_native_asset() {
        let sentinel = NATIVE_ASSET_SENTINEL.parse::<Address>().unwrap();
        assert_eq!(Asset::from_address(sentinel), Asset::Native);
        let usdc = Address::repeat_byte(0x75);
        assert_eq!(Asset::from_address(usdc), Asset::Token(usdc));
    }

    #[test]
    fn failed_receipt_drops_transaction_hash() {
        let raw = json!({
            "userOpHash": format!("{:#x}", H256::repeat_byte(0x01)),
            "success": false,
            "reason": "AA23 reverted",
            "receipt": { "transactionHash": format!("{:#x}", H256::repeat_byte(0x02)) }
        });
        let receipt = UserOperationReceipt::from_raw(raw).unwrap();
        assert!(!receipt.success);
        assert_eq!(receipt.transaction_hash, None);
        assert_eq!(receipt.reason.as_deref(), Some("AA23 reverted"));
    }

    #[test]
    fn successful_receipt_keeps_transaction_hash() {
        let raw = json!({
            "userOpHash": format!("{:#x}", H256::repeat_byte(0x01)),
            "success": true,
            "receipt": { "transactionHash": format!("{:#x}", H256::repeat_byte(0x02)) }
        });
        let receipt = UserOperationReceipt::from_raw(raw.clone()).unwrap();
        assert_eq!(receipt.transaction_hash, Some(H256::repeat_byte(0x02)));
        assert_eq!(receipt.raw, raw);
    }
}
