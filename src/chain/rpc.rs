//! JSON-RPC receipt lookup and `Transfer` log decoding

use super::{ChainVerifier, TokenTransfer, TransferOutcome};
use crate::config::ChainConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;

/// keccak256("Transfer(address,address,uint256)")
pub const TRANSFER_TOPIC: &str =
    "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";

const TOKEN_DECIMALS: u32 = 18;

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Receipt {
    pub status: Option<String>,
    #[serde(default)]
    pub logs: Vec<Log>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Log {
    pub address: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub data: String,
}

/// Verifier backed by an EVM JSON-RPC endpoint
pub struct RpcVerifier {
    client: reqwest::Client,
    rpc_url: String,
    token_address: String,
    treasury_address: String,
}

impl RpcVerifier {
    pub fn new(config: &ChainConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            rpc_url: config.rpc_url.clone(),
            token_address: config.token_address.to_lowercase(),
            treasury_address: config.treasury_address.to_lowercase(),
        })
    }

    async fn fetch_receipt(&self, tx_hash: &str) -> Result<Option<Receipt>> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_getTransactionReceipt",
            "params": [tx_hash],
        });

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;

        let body: RpcResponse<Receipt> = response.json().await?;
        if let Some(err) = body.error {
            return Err(Error::Network(format!("rpc error {}: {}", err.code, err.message)));
        }
        Ok(body.result)
    }
}

#[async_trait]
impl ChainVerifier for RpcVerifier {
    async fn verify_transfer(
        &self,
        tx_hash: &str,
        expected: Decimal,
        sender: &str,
    ) -> Result<TransferOutcome> {
        let receipt = match self.fetch_receipt(tx_hash).await? {
            Some(receipt) => receipt,
            // not mined yet, or unknown to this node; the caller may retry
            None => return Err(Error::Verification("Transaction not found".to_string())),
        };

        let outcome = check_receipt(
            &receipt,
            &self.token_address,
            &self.treasury_address,
            sender,
            expected,
        );
        tracing::debug!(tx_hash, ?outcome, "payment receipt checked");
        Ok(outcome)
    }
}

/// Apply the payment rules to a receipt
pub fn check_receipt(
    receipt: &Receipt,
    token_address: &str,
    treasury_address: &str,
    sender: &str,
    expected: Decimal,
) -> TransferOutcome {
    if receipt.status.as_deref() != Some("0x1") {
        return TransferOutcome::Rejected("Transaction failed on-chain".to_string());
    }

    let transfer = receipt
        .logs
        .iter()
        .filter(|log| log.address.eq_ignore_ascii_case(token_address))
        .filter_map(decode_transfer)
        .find(|t| t.to.eq_ignore_ascii_case(treasury_address));

    let transfer = match transfer {
        Some(t) => t,
        None => {
            return TransferOutcome::Rejected(
                "No valid cUSD transfer to treasury found in transaction".to_string(),
            )
        }
    };

    if !transfer.from.eq_ignore_ascii_case(sender) {
        return TransferOutcome::Rejected("Transaction sender mismatch".to_string());
    }

    if transfer.value < to_base_units(expected) {
        return TransferOutcome::Rejected(format!(
            "Insufficient amount: sent {}, expected {}",
            format_units(transfer.value),
            expected.normalize()
        ));
    }

    TransferOutcome::Verified(transfer)
}

/// Decode a `Transfer(address indexed, address indexed, uint256)` log
pub fn decode_transfer(log: &Log) -> Option<TokenTransfer> {
    if log.topics.len() != 3 || !log.topics[0].eq_ignore_ascii_case(TRANSFER_TOPIC) {
        return None;
    }

    Some(TokenTransfer {
        from: topic_to_address(&log.topics[1])?,
        to: topic_to_address(&log.topics[2])?,
        value: parse_uint256(&log.data)?,
    })
}

fn topic_to_address(topic: &str) -> Option<String> {
    let hex_part = topic.strip_prefix("0x").unwrap_or(topic);
    if hex_part.len() != 64 || hex::decode(hex_part).is_err() {
        return None;
    }
    Some(format!("0x{}", hex_part[24..].to_lowercase()))
}

/// Values beyond u128 saturate; no real payment comes close
fn parse_uint256(data: &str) -> Option<u128> {
    let bytes = hex::decode(data.strip_prefix("0x").unwrap_or(data)).ok()?;
    if bytes.len() != 32 {
        return None;
    }
    if bytes[..16].iter().any(|b| *b != 0) {
        return Some(u128::MAX);
    }
    let mut low = [0u8; 16];
    low.copy_from_slice(&bytes[16..]);
    Some(u128::from_be_bytes(low))
}

/// Convert a token amount to 18-decimal base units
pub fn to_base_units(amount: Decimal) -> u128 {
    let scale = Decimal::from(10u64.pow(TOKEN_DECIMALS));
    amount
        .checked_mul(scale)
        .and_then(|v| v.trunc().to_u128())
        .unwrap_or(u128::MAX)
}

fn format_units(value: u128) -> String {
    i128::try_from(value)
        .ok()
        .and_then(|v| Decimal::try_from_i128_with_scale(v, TOKEN_DECIMALS).ok())
        .map(|d| d.normalize().to_string())
        .unwrap_or_else(|| format!("{} wei", value))
}
