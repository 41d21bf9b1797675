// Book events. Everything that changes a book or the history flows through
// one of these three shapes; the journal persists them verbatim.

use crate::fixedpoint::partial_fee;
use crate::limit_order::LimitOrder;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAdded {
    pub order: LimitOrder,
}

/// A fill between the inbound `submitted` order and the resting `counter`
/// order, both captured in their pre-execution state. The executed amount
/// and fees are derived, never stored, so replay cannot disagree with the
/// live computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderExecuted {
    pub submitted: LimitOrder,
    pub counter: LimitOrder,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCanceled {
    pub order: LimitOrder,
    /// True when the remainder dropped below the minimal matchable amount
    /// and was removed by the matcher rather than the trader.
    pub unmatchable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    Added(OrderAdded),
    Executed(OrderExecuted),
    Canceled(OrderCanceled),
}

impl OrderExecuted {
    /// Amount-asset units settled by this fill.
    pub fn executed_amount(&self) -> u64 {
        self.submitted
            .execution_amount(&self.counter)
            .min(self.counter.amount_of_amount_asset())
    }

    /// Fee prorated over the submitted order's original amount.
    pub fn submitted_executed_fee(&self) -> u64 {
        let order = self.submitted.order();
        partial_fee(order.matcher_fee, order.amount, self.executed_amount())
    }

    pub fn counter_executed_fee(&self) -> u64 {
        let order = self.counter.order();
        partial_fee(order.matcher_fee, order.amount, self.executed_amount())
    }

    /// The executed slice of the submitted order.
    pub fn submitted_executed(&self) -> LimitOrder {
        self.submitted
            .partial(self.executed_amount(), self.submitted_executed_fee())
    }

    pub fn counter_executed(&self) -> LimitOrder {
        self.counter
            .partial(self.executed_amount(), self.counter_executed_fee())
    }

    /// What is left of the submitted order after this fill.
    pub fn submitted_remaining(&self) -> LimitOrder {
        self.submitted.partial(
            self.submitted.amount() - self.executed_amount(),
            self.submitted.fee().saturating_sub(self.submitted_executed_fee()),
        )
    }

    pub fn counter_remaining(&self) -> LimitOrder {
        self.counter.partial(
            self.counter.amount() - self.executed_amount(),
            self.counter.fee().saturating_sub(self.counter_executed_fee()),
        )
    }
}
