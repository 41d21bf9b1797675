// ============================================================================
// Exchange Transaction
// ============================================================================
//
// The on-chain settlement record for one fill. Consensus-critical: the
// body bytes are canonical and every node must produce the same bytes for
// the same fill, so the fields are serialized in a fixed order with fixed
// widths and the id is the hash of the body.
//
// ============================================================================

use crate::account::{KeyPair, PublicKey};
use crate::errors::MatcherError;
use crate::events::OrderExecuted;
use crate::order::{Order, OrderSide};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeTransaction {
    pub buy_order: Order,
    pub sell_order: Order,
    /// Fill price: the resting order's price at match time.
    pub price: u64,
    pub amount: u64,
    pub buy_matcher_fee: u64,
    pub sell_matcher_fee: u64,
    /// Fee this transaction itself pays, from the matcher settings.
    pub fee: u64,
    pub timestamp: u64,
    /// Matcher signature over the canonical body bytes.
    pub signature: Vec<u8>,
}

impl ExchangeTransaction {
    /// Build and sign the settlement for one executed event.
    pub fn from_execution(
        event: &OrderExecuted,
        tx_fee: u64,
        timestamp: u64,
        matcher: &KeyPair,
    ) -> Result<ExchangeTransaction, MatcherError> {
        let (buy, sell) = match event.submitted.side() {
            OrderSide::Buy => (&event.submitted, &event.counter),
            OrderSide::Sell => (&event.counter, &event.submitted),
        };
        let (buy_fee, sell_fee) = match event.submitted.side() {
            OrderSide::Buy => (event.submitted_executed_fee(), event.counter_executed_fee()),
            OrderSide::Sell => (event.counter_executed_fee(), event.submitted_executed_fee()),
        };
        if buy.order().asset_pair != sell.order().asset_pair {
            return Err(MatcherError::Internal(
                "executed orders belong to different pairs".to_string(),
            ));
        }
        let mut tx = ExchangeTransaction {
            buy_order: buy.order().clone(),
            sell_order: sell.order().clone(),
            price: event.counter.price(),
            amount: event.executed_amount(),
            buy_matcher_fee: buy_fee,
            sell_matcher_fee: sell_fee,
            fee: tx_fee,
            timestamp,
            signature: Vec::new(),
        };
        tx.signature = matcher.sign(&tx.body_bytes());
        Ok(tx)
    }

    pub fn body_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(512);
        bytes.extend_from_slice(&self.buy_order.body_bytes());
        bytes.extend_from_slice(&self.sell_order.body_bytes());
        bytes.extend_from_slice(&self.price.to_be_bytes());
        bytes.extend_from_slice(&self.amount.to_be_bytes());
        bytes.extend_from_slice(&self.buy_matcher_fee.to_be_bytes());
        bytes.extend_from_slice(&self.sell_matcher_fee.to_be_bytes());
        bytes.extend_from_slice(&self.fee.to_be_bytes());
        bytes.extend_from_slice(&self.timestamp.to_be_bytes());
        bytes
    }

    pub fn id(&self) -> [u8; 32] {
        Sha256::digest(self.body_bytes()).into()
    }

    pub fn id_base58(&self) -> String {
        bs58::encode(self.id()).into_string()
    }

    pub fn verify_signature(&self, matcher: &PublicKey) -> bool {
        matcher.verify(&self.body_bytes(), &self.signature)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{AssetId, AssetPair};
    use crate::fixedpoint::PRICE_CONSTANT;
    use crate::limit_order::LimitOrder;

    const P: u64 = PRICE_CONSTANT as u64;

    fn limit(sender: u8, side: OrderSide, price: u64, amount: u64) -> LimitOrder {
        LimitOrder::new(Order {
            sender_public_key: PublicKey([sender; 32]),
            matcher_public_key: PublicKey([2; 32]),
            asset_pair: AssetPair::new(Some(AssetId([3; 32])), None),
            side,
            price,
            amount,
            matcher_fee: 300_000,
            timestamp: u64::from(sender),
            expiration: u64::MAX,
            version: 1,
            proofs: vec![],
        })
    }

    #[test]
    fn test_fill_price_is_counter_price() {
        let matcher = KeyPair::from_seed([9; 32]);
        let event = OrderExecuted {
            submitted: limit(1, OrderSide::Buy, 12 * P, 50),
            counter: limit(4, OrderSide::Sell, 10 * P, 50),
        };
        let tx = ExchangeTransaction::from_execution(&event, 300_000, 777, &matcher).unwrap();
        assert_eq!(tx.price, 10 * P);
        assert_eq!(tx.amount, 50);
        assert_eq!(tx.buy_order.side, OrderSide::Buy);
        assert_eq!(tx.sell_order.side, OrderSide::Sell);
        assert!(tx.verify_signature(&matcher.public_key()));
    }

    #[test]
    fn test_body_bytes_are_deterministic() {
        let matcher = KeyPair::from_seed([9; 32]);
        let event = OrderExecuted {
            submitted: limit(1, OrderSide::Sell, 10 * P, 50),
            counter: limit(4, OrderSide::Buy, 10 * P, 80),
        };
        let a = ExchangeTransaction::from_execution(&event, 300_000, 777, &matcher).unwrap();
        let b = ExchangeTransaction::from_execution(&event, 300_000, 777, &matcher).unwrap();
        assert_eq!(a.body_bytes(), b.body_bytes());
        assert_eq!(a.id(), b.id());
        assert_eq!(a.signature, b.signature);
    }
}
