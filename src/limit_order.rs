// ============================================================================
// Limit Order: the mutable matching view of a signed Order
// ============================================================================
//
// A LimitOrder carries the remaining amount and remaining fee of an order
// while it sits on a book, plus a back-reference to the immutable Order it
// was cut from. Derived quantities follow the fixed-point rules exactly;
// reservations use the uncorrected raw spend bound.
//
// ============================================================================

use crate::assets::AssetId;
use crate::fixedpoint::{self, MAX_AMOUNT};
use crate::order::{Order, OrderId, OrderSide};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LimitOrder {
    Buy { order: Order, amount: u64, fee: u64 },
    Sell { order: Order, amount: u64, fee: u64 },
}

impl LimitOrder {
    /// Full-size matching view of a fresh order.
    pub fn new(order: Order) -> Self {
        let (amount, fee) = (order.amount, order.matcher_fee);
        match order.side {
            OrderSide::Buy => LimitOrder::Buy { order, amount, fee },
            OrderSide::Sell => LimitOrder::Sell { order, amount, fee },
        }
    }

    pub fn order(&self) -> &Order {
        match self {
            LimitOrder::Buy { order, .. } | LimitOrder::Sell { order, .. } => order,
        }
    }

    pub fn id(&self) -> OrderId {
        self.order().id()
    }

    pub fn side(&self) -> OrderSide {
        match self {
            LimitOrder::Buy { .. } => OrderSide::Buy,
            LimitOrder::Sell { .. } => OrderSide::Sell,
        }
    }

    pub fn price(&self) -> u64 {
        self.order().price
    }

    /// Remaining amount-asset units.
    pub fn amount(&self) -> u64 {
        match self {
            LimitOrder::Buy { amount, .. } | LimitOrder::Sell { amount, .. } => *amount,
        }
    }

    /// Remaining matcher fee.
    pub fn fee(&self) -> u64 {
        match self {
            LimitOrder::Buy { fee, .. } | LimitOrder::Sell { fee, .. } => *fee,
        }
    }

    /// A copy with the given remaining amount and fee.
    pub fn partial(&self, amount: u64, fee: u64) -> Self {
        match self {
            LimitOrder::Buy { order, .. } => LimitOrder::Buy {
                order: order.clone(),
                amount,
                fee,
            },
            LimitOrder::Sell { order, .. } => LimitOrder::Sell {
                order: order.clone(),
                amount,
                fee,
            },
        }
    }

    /// Price-asset value of the remaining amount, rounded down.
    pub fn amount_of_price_asset(&self) -> u64 {
        fixedpoint::amount_of_price_asset(self.amount(), self.price())
    }

    /// Remaining amount corrected to the quantity that settles cleanly at
    /// this order's own price.
    pub fn amount_of_amount_asset(&self) -> u64 {
        fixedpoint::corrected_amount_of_amount_asset(self.price(), self.amount())
    }

    /// Smallest amount that still maps to one price-asset unit here.
    pub fn min_amount_of_amount_asset(&self) -> u64 {
        fixedpoint::min_amount_of_amount_asset_by_price(self.price())
    }

    /// How much of this order can execute against `counter`, corrected at
    /// the counter's price (the price the fill settles at).
    pub fn execution_amount(&self, counter: &LimitOrder) -> u64 {
        fixedpoint::corrected_amount_of_amount_asset(counter.price(), self.amount())
    }

    /// Units leaving the trader if the remainder fills: price asset for a
    /// buy, amount asset for a sell.
    pub fn spend_amount(&self) -> u64 {
        match self {
            LimitOrder::Buy { .. } => self.amount_of_price_asset(),
            LimitOrder::Sell { .. } => self.amount_of_amount_asset(),
        }
    }

    /// Units arriving at the trader if the remainder fills.
    pub fn receive_amount(&self) -> u64 {
        match self {
            LimitOrder::Buy { .. } => self.amount_of_amount_asset(),
            LimitOrder::Sell { .. } => self.amount_of_price_asset(),
        }
    }

    /// Uncorrected upper bound used for reservations. A sell earmarks its
    /// full remaining amount-asset quantity.
    pub fn raw_spend_amount(&self) -> u64 {
        match self {
            LimitOrder::Buy { .. } => self.amount_of_price_asset(),
            LimitOrder::Sell { amount, .. } => *amount,
        }
    }

    pub fn spend_asset(&self) -> Option<AssetId> {
        self.order().spend_asset()
    }

    pub fn receive_asset(&self) -> Option<AssetId> {
        self.order().receive_asset()
    }

    pub fn fee_asset(&self) -> Option<AssetId> {
        self.order().fee_asset()
    }

    /// Whether the remainder is still matchable at all.
    pub fn is_valid(&self) -> bool {
        let amount = self.amount();
        amount > 0
            && amount >= self.min_amount_of_amount_asset()
            && amount < MAX_AMOUNT
            && self.spend_amount() > 0
            && self.receive_amount() > 0
    }

    pub fn is_expired(&self, now: u64) -> bool {
        self.order().expiration <= now
    }

    /// Whether `self` (the inbound order) crosses `counter` (the resting
    /// head of the opposite side).
    pub fn crosses(&self, counter: &LimitOrder) -> bool {
        match self {
            LimitOrder::Buy { .. } => self.price() >= counter.price(),
            LimitOrder::Sell { .. } => self.price() <= counter.price(),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::PublicKey;
    use crate::assets::AssetPair;
    use crate::fixedpoint::PRICE_CONSTANT;

    const P: u64 = PRICE_CONSTANT as u64;

    fn order(side: OrderSide, price: u64, amount: u64) -> Order {
        Order {
            sender_public_key: PublicKey([1; 32]),
            matcher_public_key: PublicKey([2; 32]),
            asset_pair: AssetPair::new(Some(AssetId([3; 32])), None),
            side,
            price,
            amount,
            matcher_fee: 300_000,
            timestamp: 1,
            expiration: u64::MAX,
            version: 1,
            proofs: vec![],
        }
    }

    #[test]
    fn test_buy_spends_price_asset() {
        let lo = LimitOrder::new(order(OrderSide::Buy, 2 * P, 15));
        assert_eq!(lo.spend_amount(), 30);
        assert_eq!(lo.receive_amount(), 15);
        assert_eq!(lo.raw_spend_amount(), 30);
        assert_eq!(lo.spend_asset(), None);
    }

    #[test]
    fn test_sell_earmarks_full_amount() {
        // price 0.5: 15 amount units are worth 7.5 -> corrected spend is 14
        let lo = LimitOrder::new(order(OrderSide::Sell, P / 2, 15));
        assert_eq!(lo.amount_of_price_asset(), 7);
        assert_eq!(lo.spend_amount(), 14);
        assert_eq!(lo.raw_spend_amount(), 15);
        assert_eq!(lo.receive_amount(), 7);
    }

    #[test]
    fn test_partial_keeps_order_reference() {
        let lo = LimitOrder::new(order(OrderSide::Buy, P, 100));
        let rest = lo.partial(40, 120_000);
        assert_eq!(rest.amount(), 40);
        assert_eq!(rest.fee(), 120_000);
        assert_eq!(rest.id(), lo.id());
        assert_eq!(rest.order().amount, 100);
    }

    #[test]
    fn test_crossing() {
        let bid = LimitOrder::new(order(OrderSide::Buy, 100, 10));
        let ask_low = LimitOrder::new(order(OrderSide::Sell, 90, 10));
        let ask_high = LimitOrder::new(order(OrderSide::Sell, 110, 10));
        assert!(bid.crosses(&ask_low));
        assert!(!bid.crosses(&ask_high));
        assert!(ask_low.crosses(&bid));
        assert!(!ask_high.crosses(&bid));
    }

    #[test]
    fn test_unmatchable_remainder_is_invalid() {
        // at price 0.01 the minimum matchable amount is 100
        let lo = LimitOrder::new(order(OrderSide::Sell, P / 100, 150));
        assert!(lo.is_valid());
        assert!(!lo.partial(99, 100).is_valid());
    }
}
