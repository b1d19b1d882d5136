//! On-chain payment verification
//!
//! Purchases are paid with a stable token transfer to the treasury. The
//! server never signs anything; it only reads the transaction receipt and
//! checks the emitted `Transfer` log.

pub mod rpc;

pub use rpc::RpcVerifier;

use crate::config::{ChainConfig, VerifierMode};
use crate::error::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;

/// A decoded ERC-20 transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenTransfer {
    pub from: String,
    pub to: String,
    /// Base units (18 decimals)
    pub value: u128,
}

/// Result of checking a payment transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Verified(TokenTransfer),
    /// The transaction exists but does not pay for the purchase
    Rejected(String),
}

#[async_trait]
pub trait ChainVerifier: Send + Sync {
    /// Check that `tx_hash` transferred at least `expected` tokens from
    /// `sender` to the treasury. Transport failures and receipts that do not
    /// exist yet are returned as errors, not as rejections.
    async fn verify_transfer(
        &self,
        tx_hash: &str,
        expected: Decimal,
        sender: &str,
    ) -> Result<TransferOutcome>;
}

/// Accepts every transaction. Development and tests only.
#[derive(Debug, Default, Clone)]
pub struct AcceptAllVerifier;

#[async_trait]
impl ChainVerifier for AcceptAllVerifier {
    async fn verify_transfer(
        &self,
        _tx_hash: &str,
        expected: Decimal,
        sender: &str,
    ) -> Result<TransferOutcome> {
        Ok(TransferOutcome::Verified(TokenTransfer {
            from: sender.to_lowercase(),
            to: String::new(),
            value: rpc::to_base_units(expected),
        }))
    }
}

pub fn build_verifier(config: &ChainConfig) -> Result<Arc<dyn ChainVerifier>> {
    match config.verifier {
        VerifierMode::Rpc => Ok(Arc::new(RpcVerifier::new(config)?)),
        VerifierMode::AcceptAll => {
            tracing::warn!("payment verification disabled: every transaction is accepted");
            Ok(Arc::new(AcceptAllVerifier))
        }
    }
}
