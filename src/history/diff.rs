// ============================================================================
// Order-info diffs and reservation deltas
// ============================================================================
//
// Each book event folds into the stored OrderInfo through a small diff
// value, and moves the trader's open volume by the pointwise difference
// between the order's reservation before and after the fold. A live order
// reserves:
//
//   spend asset:  rawSpend(original) - totalSpend
//   fee asset:    remainingFee, or max(remainingFee - totalReceive, 0)
//                 when the fee asset is also the receive asset (the fill
//                 proceeds can cover what is still owed)
//
// A terminal order reserves nothing, so the event that finalizes it also
// releases any floor-rounding residue. Cancellation releases the whole
// reservation whether or not the canceled flag is recorded (a remainder
// removed as unmatchable keeps its last non-final status).
//
// ============================================================================

use super::portfolio::OpenPortfolio;
use super::{OrderInfo, OrderStatus};
use crate::events::{OrderAdded, OrderCanceled, OrderExecuted};
use crate::order::Order;

/// Per-order change extracted from one event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderInfoDiff {
    pub is_new: bool,
    pub add_executed_amount: Option<u64>,
    pub executed_fee: Option<u64>,
    pub new_min_amount: Option<u64>,
    pub now_canceled: bool,
    pub last_spend: Option<u64>,
}

impl OrderInfoDiff {
    /// Fold this diff into `info`. Associative along a single order's
    /// event stream.
    pub fn fold_into(&self, order: &Order, info: &OrderInfo) -> OrderInfo {
        let mut next = info.clone();
        if self.is_new && info.status() == OrderStatus::NotFound {
            next.amount = order.amount;
            next.remaining_fee = order.matcher_fee;
        }
        if let Some(executed) = self.add_executed_amount {
            next.filled = (next.filled + executed).min(next.amount);
        }
        if let Some(fee) = self.executed_fee {
            next.remaining_fee = next.remaining_fee.saturating_sub(fee);
        }
        if let Some(min_amount) = self.new_min_amount {
            next.min_amount = Some(min_amount);
        }
        if self.now_canceled {
            next.canceled = true;
        }
        if let Some(spend) = self.last_spend {
            next.total_spend += spend;
        }
        next
    }
}

/// What a single order currently reserves, given its stored info.
pub fn reservation(order: &Order, info: &OrderInfo) -> OpenPortfolio {
    let mut portfolio = OpenPortfolio::new();
    let status = info.status();
    if status == OrderStatus::NotFound || status.is_final() {
        return portfolio;
    }
    portfolio.add(
        order.spend_asset(),
        order.raw_spend_amount().saturating_sub(info.total_spend) as i64,
    );
    portfolio.add(order.fee_asset(), reserved_fee(order, info.remaining_fee) as i64);
    portfolio
}

/// Fee still reserved at `remaining_fee`. When the fee asset coincides
/// with the receive asset, the expected proceeds offset the obligation.
fn reserved_fee(order: &Order, remaining_fee: u64) -> u64 {
    if order.fee_asset() == order.receive_asset() {
        remaining_fee.saturating_sub(order.total_receive_amount())
    } else {
        remaining_fee
    }
}

/// Fee released by moving an order's remaining fee from `prev_remaining`
/// to `updated_remaining`. Equals the straight difference unless the fee
/// asset doubles as the receive asset.
pub fn release_fee(order: &Order, prev_remaining: u64, updated_remaining: u64) -> u64 {
    let executed = prev_remaining - updated_remaining;
    if order.fee_asset() == order.receive_asset() {
        let already_executed = order.matcher_fee - prev_remaining;
        let rest_reserved = order
            .matcher_fee
            .saturating_sub(order.total_receive_amount())
            .saturating_sub(already_executed);
        executed.min(rest_reserved)
    } else {
        executed
    }
}

/// Diffs produced by one event: (order, info diff, full-release flag).
/// The full-release flag marks cancellations, which empty the order's
/// reservation even when the resulting status is not final.
pub struct EventDiffs {
    pub updates: Vec<(Order, OrderInfoDiff, bool)>,
}

pub fn diff_accepted(event: &OrderAdded) -> EventDiffs {
    let lo = &event.order;
    EventDiffs {
        updates: vec![(
            lo.order().clone(),
            OrderInfoDiff {
                is_new: true,
                new_min_amount: Some(lo.min_amount_of_amount_asset()),
                ..Default::default()
            },
            false,
        )],
    }
}

pub fn diff_executed(event: &OrderExecuted) -> EventDiffs {
    let executed_amount = event.executed_amount();
    let submitted = (
        event.submitted.order().clone(),
        OrderInfoDiff {
            is_new: true,
            add_executed_amount: Some(executed_amount),
            executed_fee: Some(event.submitted_executed_fee()),
            new_min_amount: Some(event.submitted_remaining().min_amount_of_amount_asset()),
            last_spend: Some(event.submitted_executed().spend_amount()),
            ..Default::default()
        },
        false,
    );
    let counter = (
        event.counter.order().clone(),
        OrderInfoDiff {
            add_executed_amount: Some(executed_amount),
            executed_fee: Some(event.counter_executed_fee()),
            new_min_amount: Some(event.counter_remaining().min_amount_of_amount_asset()),
            last_spend: Some(event.counter_executed().spend_amount()),
            ..Default::default()
        },
        false,
    );
    EventDiffs {
        updates: vec![submitted, counter],
    }
}

pub fn diff_canceled(event: &OrderCanceled) -> EventDiffs {
    EventDiffs {
        updates: vec![(
            event.order.order().clone(),
            OrderInfoDiff {
                now_canceled: !event.unmatchable,
                ..Default::default()
            },
            true,
        )],
    }
}

// ============================================================================
// TESTS
// ============================================================================
