//! Typed views of daemon RPC replies.
//!
//! Only the fields the wallet core reads are modelled; unknown fields are
//! ignored so newer daemons keep working.

use serde::{Deserialize, Deserializer};
use shared_types::Amount;

/// Verification progress at or above which the node counts as caught up.
pub const SYNCED_PROGRESS: f64 = 0.9999;

fn de_coins<'de, D>(deserializer: D) -> Result<Amount, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    Amount::from_coins_f64(value).map_err(serde::de::Error::custom)
}

/// `getinfo`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeInfo {
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub blocks: u64,
    #[serde(default)]
    pub connections: u32,
    #[serde(default)]
    pub testnet: bool,
}

/// `getblockchaininfo`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BlockchainInfo {
    #[serde(default)]
    pub chain: String,
    #[serde(default)]
    pub blocks: u64,
    #[serde(default)]
    pub headers: u64,
    #[serde(default, rename = "verificationprogress")]
    pub verification_progress: f64,
    #[serde(default, rename = "estimatedheight")]
    pub estimated_height: Option<u64>,
}

impl BlockchainInfo {
    /// Blocks behind the best known height.
    ///
    /// A node that still reports incomplete verification is at least one
    /// block behind even if its height estimate says otherwise.
    #[must_use]
    pub fn lag(&self) -> u64 {
        let target = self.estimated_height.unwrap_or(self.headers).max(self.headers);
        let lag = target.saturating_sub(self.blocks);
        if lag == 0 && self.verification_progress < SYNCED_PROGRESS {
            1
        } else {
            lag
        }
    }

    #[must_use]
    pub fn is_syncing(&self) -> bool {
        self.lag() > 0
    }
}

/// Combined liveness snapshot: peers from `getinfo`, lag from
/// `getblockchaininfo`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncInfo {
    pub blocks: u64,
    pub peers: u32,
    pub lag: u64,
}

/// `z_listunspent` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ShieldedNote {
    pub txid: String,
    pub address: String,
    #[serde(deserialize_with = "de_coins")]
    pub amount: Amount,
    #[serde(default)]
    pub confirmations: u32,
}

/// `listunspent` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct TransparentUtxo {
    pub txid: String,
    #[serde(default)]
    pub vout: u32,
    #[serde(default)]
    pub address: String,
    #[serde(deserialize_with = "de_coins")]
    pub amount: Amount,
    #[serde(default)]
    pub confirmations: u32,
}

/// Async operation lifecycle as reported by `z_getoperationstatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationState {
    Queued,
    Executing,
    Success,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OperationResult {
    pub txid: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OperationError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// `z_getoperationstatus` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct OperationStatus {
    pub id: String,
    pub status: OperationState,
    #[serde(default)]
    pub result: Option<OperationResult>,
    #[serde(default)]
    pub error: Option<OperationError>,
}

impl OperationStatus {
    #[must_use]
    pub fn txid(&self) -> Option<&str> {
        self.result.as_ref().map(|r| r.txid.as_str())
    }

    #[must_use]
    pub fn error_message(&self) -> String {
        self.error
            .as_ref()
            .map(|e| e.message.clone())
            .unwrap_or_else(|| format!("operation {} ended as {:?}", self.id, self.status))
    }
}

/// `gettransaction` (only confirmations are needed).
#[derive(Debug, Clone, Deserialize)]
pub struct WalletTransaction {
    #[serde(default)]
    pub txid: String,
    /// Negative when the transaction conflicts with the best chain.
    #[serde(default)]
    pub confirmations: i64,
}

/// One `z_sendmany` recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub address: String,
    pub amount: Amount,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lag_uses_estimated_height() {
        let info: BlockchainInfo = serde_json::from_value(json!({
            "chain": "main",
            "blocks": 100,
            "headers": 100,
            "verificationprogress": 0.5,
            "estimatedheight": 150
        }))
        .unwrap();
        assert_eq!(info.lag(), 50);
        assert!(info.is_syncing());
    }

    #[test]
    fn test_lag_from_verification_progress() {
        let info = BlockchainInfo {
            blocks: 10,
            headers: 10,
            verification_progress: 0.99,
            ..Default::default()
        };
        assert_eq!(info.lag(), 1);

        let synced = BlockchainInfo {
            blocks: 10,
            headers: 10,
            verification_progress: 1.0,
            ..Default::default()
        };
        assert_eq!(synced.lag(), 0);
    }

    #[test]
    fn test_note_amount_from_float() {
        let note: ShieldedNote = serde_json::from_value(json!({
            "txid": "ab",
            "address": "zcabc",
            "amount": 1.5,
            "confirmations": 3
        }))
        .unwrap();
        assert_eq!(note.amount.zat(), 150_000_000);
    }

    #[test]
    fn test_operation_status() {
        let ok: OperationStatus = serde_json::from_value(json!({
            "id": "opid-1",
            "status": "success",
            "result": {"txid": "deadbeef"}
        }))
        .unwrap();
        assert_eq!(ok.txid(), Some("deadbeef"));

        let failed: OperationStatus = serde_json::from_value(json!({
            "id": "opid-2",
            "status": "failed",
            "error": {"code": -6, "message": "Insufficient funds"}
        }))
        .unwrap();
        assert_eq!(failed.status, OperationState::Failed);
        assert_eq!(failed.error_message(), "Insufficient funds");
    }
}
