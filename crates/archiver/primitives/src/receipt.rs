//! Transaction receipts as returned by `eth_getTransactionReceipt`.

use alloy_primitives::{B256, U64};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Post-execution metadata for one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcReceipt {
    /// Hash of the transaction this receipt belongs to.
    pub transaction_hash: B256,
    /// Execution status, absent on pre-byzantium receipts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<U64>,
    /// Remaining receipt fields (logs, gas used, bloom, ...).
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl RpcReceipt {
    /// Returns whether the transaction succeeded, if the receipt carries a status.
    pub fn succeeded(&self) -> Option<bool> {
        self.status.map(|status| status == U64::from(1))
    }

    /// Returns the number of logs emitted, or zero if the receipt carries none.
    pub fn log_count(&self) -> usize {
        self.other.get("logs").and_then(Value::as_array).map_or(0, Vec::len)
    }
}
