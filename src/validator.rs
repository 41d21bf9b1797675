// ============================================================================
// Order Validator
// ============================================================================
//
// Stateless-per-call validation of placements and cancels. Checks run in a
// fixed order and the first failure wins; every rejection reason is a
// short, stable string the API edge maps to a 400.
//
// The balance check is the reservation-aware one: an order is only
// accepted if, for every asset it would lock, the trader's spendable
// balance minus what their other live orders already reserve covers the
// new reservation.
//
// ============================================================================

use crate::errors::MatcherError;
use crate::history::diff::{reservation, OrderInfoDiff};
use crate::history::{OrderHistory, OrderInfo, OrderStatus};
use crate::limit_order::LimitOrder;
use crate::node::{Clock, UtxPool};
use crate::order::{Order, OrderId, MIN_EXPIRATION_MARGIN_MS};
use crate::script::ScriptVerifier;
use crate::settings::MatcherSettings;
use crate::account::PublicKey;
use crate::assets::asset_name;
use std::sync::Arc;

pub struct OrderValidator {
    matcher_public_key: PublicKey,
    min_order_fee: u64,
    history: Arc<OrderHistory>,
    utx: Arc<dyn UtxPool>,
    scripts: Arc<ScriptVerifier>,
    clock: Arc<dyn Clock>,
}

impl OrderValidator {
    pub fn new(
        settings: &MatcherSettings,
        matcher_public_key: PublicKey,
        history: Arc<OrderHistory>,
        utx: Arc<dyn UtxPool>,
        scripts: Arc<ScriptVerifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        OrderValidator {
            matcher_public_key,
            min_order_fee: settings.min_order_fee,
            history,
            utx,
            scripts,
            clock,
        }
    }

    /// Full placement pipeline. First failure wins.
    pub fn validate_place(&self, order: &Order) -> Result<(), MatcherError> {
        let now = self.clock.millis();

        if order.matcher_public_key != self.matcher_public_key {
            return reject("Incorrect matcher public key");
        }
        if order.expiration <= now + MIN_EXPIRATION_MARGIN_MS {
            return reject("Order expiration should be > 1 min");
        }
        self.scripts.verify_order(order)?;
        order
            .is_valid_at(now)
            .map_err(MatcherError::ValidationFailure)?;
        if !LimitOrder::new(order.clone()).is_valid() {
            return reject("Order amount is too small for the given price");
        }
        if order.matcher_fee < self.min_order_fee {
            return reject(&format!(
                "Order matcherFee should be >= {}",
                self.min_order_fee
            ));
        }
        if self.history.order_status(&order.id())? != OrderStatus::NotFound {
            return reject("Order is already accepted");
        }
        self.validate_balance(order)
    }

    /// The reservation this order would add if accepted, checked against
    /// tradable balance asset by asset.
    fn validate_balance(&self, order: &Order) -> Result<(), MatcherError> {
        let address = order.sender_public_key.address();
        let accepted = OrderInfoDiff {
            is_new: true,
            ..Default::default()
        }
        .fold_into(order, &OrderInfo::empty());
        let projected = reservation(order, &accepted);

        for (asset, required) in projected.iter() {
            let spendable = self.utx.spendable_balance(&address, asset);
            let reserved = self.history.open_volume(&address, asset)?;
            // pool balances are not bounded by MAX_AMOUNT; compare in i128
            let tradable = spendable.saturating_sub(reserved);
            if (tradable as i128) < (*required as i128) {
                return reject(&format!(
                    "Not enough tradable balance: {} tradable {} of {}, order requires {}",
                    address,
                    tradable,
                    asset_name(asset),
                    required
                ));
            }
        }
        Ok(())
    }

    /// Cancel pipeline: the order must exist, must not be terminal-by-fill,
    /// and only its owner may cancel it.
    pub fn validate_cancel(
        &self,
        sender: &PublicKey,
        order_id: &OrderId,
    ) -> Result<Order, MatcherError> {
        let Some(order) = self.history.order(order_id)? else {
            return Err(MatcherError::CancelRejected("Order not found".to_string()));
        };
        match self.history.order_status(order_id)? {
            OrderStatus::NotFound => {
                return Err(MatcherError::CancelRejected("Order not found".to_string()))
            }
            OrderStatus::Filled(_) => {
                return Err(MatcherError::CancelRejected(
                    "Order is already filled".to_string(),
                ))
            }
            _ => {}
        }
        if order.sender_public_key != *sender {
            return Err(MatcherError::CancelRejected(
                "Order can be canceled only by its owner".to_string(),
            ));
        }
        Ok(order)
    }
}

fn reject(reason: &str) -> Result<(), MatcherError> {
    Err(MatcherError::ValidationFailure(reason.to_string()))
}

// ============================================================================
// TESTS
// ============================================================================
