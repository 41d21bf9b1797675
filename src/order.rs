// ============================================================================
// Order Primitive
// ============================================================================
//
// A signed limit order as submitted by a client. Immutable after signing:
// the id is the hash of the canonical body bytes, and every node must
// derive the same bytes for the same order.
//
// ============================================================================

use crate::account::{Proof, PublicKey};
use crate::assets::{AssetId, AssetPair};
use crate::fixedpoint::{self, MAX_AMOUNT};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Minimum remaining lifetime a placement must carry.
pub const MIN_EXPIRATION_MARGIN_MS: u64 = 60_000;

/// Order versions this matcher accepts.
pub const SUPPORTED_VERSIONS: std::ops::RangeInclusive<u8> = 1..=2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(&self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

/// Content hash of an order's canonical body bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderId(pub [u8; 32]);

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", bs58::encode(self.0).into_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub sender_public_key: PublicKey,
    pub matcher_public_key: PublicKey,
    pub asset_pair: AssetPair,
    pub side: OrderSide,
    /// Price-asset units per amount-asset unit, scaled by the price constant.
    pub price: u64,
    /// Amount-asset units.
    pub amount: u64,
    /// Matcher fee in native-asset units.
    pub matcher_fee: u64,
    pub timestamp: u64,
    pub expiration: u64,
    pub version: u8,
    pub proofs: Vec<Proof>,
}

impl Order {
    /// Canonical body bytes. Field order and widths are fixed; proofs are
    /// not part of the body.
    pub fn body_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(160);
        bytes.push(self.version);
        bytes.extend_from_slice(&self.sender_public_key.0);
        bytes.extend_from_slice(&self.matcher_public_key.0);
        push_asset(&mut bytes, &self.asset_pair.amount_asset);
        push_asset(&mut bytes, &self.asset_pair.price_asset);
        bytes.push(match self.side {
            OrderSide::Buy => 0,
            OrderSide::Sell => 1,
        });
        bytes.extend_from_slice(&self.price.to_be_bytes());
        bytes.extend_from_slice(&self.amount.to_be_bytes());
        bytes.extend_from_slice(&self.matcher_fee.to_be_bytes());
        bytes.extend_from_slice(&self.timestamp.to_be_bytes());
        bytes.extend_from_slice(&self.expiration.to_be_bytes());
        bytes
    }

    pub fn id(&self) -> OrderId {
        let digest = Sha256::digest(self.body_bytes());
        OrderId(digest.into())
    }

    /// Asset leaving the trader on a fill.
    pub fn spend_asset(&self) -> Option<AssetId> {
        match self.side {
            OrderSide::Buy => self.asset_pair.price_asset,
            OrderSide::Sell => self.asset_pair.amount_asset,
        }
    }

    /// Asset arriving at the trader on a fill.
    pub fn receive_asset(&self) -> Option<AssetId> {
        match self.side {
            OrderSide::Buy => self.asset_pair.amount_asset,
            OrderSide::Sell => self.asset_pair.price_asset,
        }
    }

    /// The matcher fee is always paid in the native asset.
    pub fn fee_asset(&self) -> Option<AssetId> {
        None
    }

    /// Total receive-asset units if the order fills completely.
    pub fn total_receive_amount(&self) -> u64 {
        match self.side {
            OrderSide::Buy => self.amount,
            OrderSide::Sell => fixedpoint::amount_of_price_asset(self.amount, self.price),
        }
    }

    /// Upper bound of spend-asset units this order can consume. Sell
    /// orders earmark the full amount-asset quantity.
    pub fn raw_spend_amount(&self) -> u64 {
        match self.side {
            OrderSide::Buy => fixedpoint::amount_of_price_asset(self.amount, self.price),
            OrderSide::Sell => self.amount,
        }
    }

    /// Structural validity at `now`. Checked before the order reaches a
    /// book; the book itself re-checks on every touch.
    pub fn is_valid_at(&self, now: u64) -> Result<(), String> {
        if !SUPPORTED_VERSIONS.contains(&self.version) {
            return Err(format!("Unsupported order version {}", self.version));
        }
        if self.price == 0 {
            return Err("price should be > 0".to_string());
        }
        if self.amount == 0 {
            return Err("amount should be > 0".to_string());
        }
        if self.amount >= MAX_AMOUNT {
            return Err("amount too large".to_string());
        }
        if self.matcher_fee == 0 {
            return Err("matcherFee should be > 0".to_string());
        }
        if self.expiration <= now {
            return Err("order has expired".to_string());
        }
        Ok(())
    }
}

fn push_asset(bytes: &mut Vec<u8>, asset: &Option<AssetId>) {
    match asset {
        Some(id) => {
            bytes.push(1);
            bytes.extend_from_slice(&id.0);
        }
        None => bytes.push(0),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn test_order(side: OrderSide, price: u64, amount: u64) -> Order {
        Order {
            sender_public_key: PublicKey([1; 32]),
            matcher_public_key: PublicKey([2; 32]),
            asset_pair: AssetPair::new(Some(AssetId([3; 32])), None),
            side,
            price,
            amount,
            matcher_fee: 300_000,
            timestamp: 1_000,
            expiration: 100_000,
            version: 1,
            proofs: vec![],
        }
    }

    #[test]
    fn test_id_is_stable_and_proof_independent() {
        let mut a = test_order(OrderSide::Buy, 100, 10);
        let b = a.clone();
        assert_eq!(a.id(), b.id());

        a.proofs.push(Proof(vec![9; 64]));
        assert_eq!(a.id(), b.id());

        let c = test_order(OrderSide::Buy, 100, 11);
        assert_ne!(a.id(), c.id());
    }

    #[test]
    fn test_spend_and_receive_assets_by_side() {
        let buy = test_order(OrderSide::Buy, 100, 10);
        assert_eq!(buy.spend_asset(), None); // price asset is native
        assert_eq!(buy.receive_asset(), Some(AssetId([3; 32])));

        let sell = test_order(OrderSide::Sell, 100, 10);
        assert_eq!(sell.spend_asset(), Some(AssetId([3; 32])));
        assert_eq!(sell.receive_asset(), None);
    }

    #[test]
    fn test_validity_window() {
        let order = test_order(OrderSide::Buy, 100, 10);
        assert!(order.is_valid_at(1_000).is_ok());
        assert!(order.is_valid_at(100_000).is_err());

        let zero_price = test_order(OrderSide::Sell, 0, 10);
        assert!(zero_price.is_valid_at(1_000).is_err());
    }
}
