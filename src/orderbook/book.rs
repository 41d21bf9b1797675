// ============================================================================
// Order Book: bid/ask ladders and the matching algorithm
// ============================================================================
//
// Two price-indexed sides; within a price level, strict FIFO. Matching an
// inbound order walks the opposite side head by head: dust heads that can
// no longer settle an integer price-asset quantity are swept out as
// unmatchable, crossing heads execute at the resting order's price, and
// whatever remains of the inbound order either rests or is itself removed
// as unmatchable.
//
// Every mutation is expressed as an Event so that the journal can replay
// the book byte for byte: `apply` performs the same state transition the
// live matching path performs, with all decisions re-derived from the
// event payload.
//
// ============================================================================

use crate::events::{Event, OrderAdded, OrderCanceled, OrderExecuted};
use crate::limit_order::LimitOrder;
use crate::order::{OrderId, OrderSide};
use std::collections::{BTreeMap, VecDeque};

// ============================================================================
// BOOK SIDE
// ============================================================================

#[derive(Debug, Clone)]
pub struct BookSide {
    side: OrderSide,
    levels: BTreeMap<u64, VecDeque<LimitOrder>>,
}

impl BookSide {
    fn new(side: OrderSide) -> Self {
        BookSide {
            side,
            levels: BTreeMap::new(),
        }
    }

    /// Best price: highest bid, lowest ask.
    pub fn best_price(&self) -> Option<u64> {
        match self.side {
            OrderSide::Buy => self.levels.keys().next_back().copied(),
            OrderSide::Sell => self.levels.keys().next().copied(),
        }
    }

    pub fn best(&self) -> Option<&LimitOrder> {
        let price = self.best_price()?;
        self.levels.get(&price).and_then(|level| level.front())
    }

    fn push_back(&mut self, order: LimitOrder) {
        self.levels
            .entry(order.price())
            .or_insert_with(VecDeque::new)
            .push_back(order);
    }

    /// Reinsert at the head of its price level. Used for partially
    /// executed resting orders, which keep their time priority.
    fn push_front(&mut self, order: LimitOrder) {
        self.levels
            .entry(order.price())
            .or_insert_with(VecDeque::new)
            .push_front(order);
    }

    fn pop_best(&mut self) -> Option<LimitOrder> {
        let price = self.best_price()?;
        let level = self.levels.get_mut(&price)?;
        let order = level.pop_front();
        if level.is_empty() {
            self.levels.remove(&price);
        }
        order
    }

    fn remove(&mut self, id: &OrderId) -> Option<LimitOrder> {
        let mut removed = None;
        let mut empty_price = None;
        for (price, level) in self.levels.iter_mut() {
            if let Some(position) = level.iter().position(|o| o.id() == *id) {
                removed = level.remove(position);
                if level.is_empty() {
                    empty_price = Some(*price);
                }
                break;
            }
        }
        if let Some(price) = empty_price {
            self.levels.remove(&price);
        }
        removed
    }

    /// All orders in priority order: best price first, FIFO within a level.
    pub fn orders(&self) -> Vec<LimitOrder> {
        let mut all = Vec::new();
        match self.side {
            OrderSide::Buy => {
                for level in self.levels.values().rev() {
                    all.extend(level.iter().cloned());
                }
            }
            OrderSide::Sell => {
                for level in self.levels.values() {
                    all.extend(level.iter().cloned());
                }
            }
        }
        all
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn len(&self) -> usize {
        self.levels.values().map(|level| level.len()).sum()
    }
}

// ============================================================================
// ORDER BOOK
// ============================================================================

#[derive(Debug, Clone)]
pub struct OrderBook {
    bids: BookSide,
    asks: BookSide,
}

impl OrderBook {
    pub fn new() -> Self {
        OrderBook {
            bids: BookSide::new(OrderSide::Buy),
            asks: BookSide::new(OrderSide::Sell),
        }
    }

    /// Rebuild from a snapshot: orders are already in priority order.
    pub fn restore(bids: Vec<LimitOrder>, asks: Vec<LimitOrder>) -> Self {
        let mut book = OrderBook::new();
        for order in bids {
            book.bids.push_back(order);
        }
        for order in asks {
            book.asks.push_back(order);
        }
        book
    }

    pub fn bid_orders(&self) -> Vec<LimitOrder> {
        self.bids.orders()
    }

    pub fn ask_orders(&self) -> Vec<LimitOrder> {
        self.asks.orders()
    }

    pub fn best_bid(&self) -> Option<&LimitOrder> {
        self.bids.best()
    }

    pub fn best_ask(&self) -> Option<&LimitOrder> {
        self.asks.best()
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.bids.len() + self.asks.len()
    }

    fn own_side_mut(&mut self, side: OrderSide) -> &mut BookSide {
        match side {
            OrderSide::Buy => &mut self.bids,
            OrderSide::Sell => &mut self.asks,
        }
    }

    fn counter_side(&self, side: OrderSide) -> &BookSide {
        match side {
            OrderSide::Buy => &self.asks,
            OrderSide::Sell => &self.bids,
        }
    }

    fn counter_side_mut(&mut self, side: OrderSide) -> &mut BookSide {
        match side {
            OrderSide::Buy => &mut self.asks,
            OrderSide::Sell => &mut self.bids,
        }
    }

    // ------------------------------------------------------------------
    // Matching
    // ------------------------------------------------------------------

    /// Find the resting order `submitted` would execute against next,
    /// sweeping out unmatchable heads on the way. Returns a clone of the
    /// head; the head itself stays on the book until `commit_execution`.
    pub fn next_counter(
        &mut self,
        submitted: &LimitOrder,
        events: &mut Vec<Event>,
    ) -> Option<LimitOrder> {
        loop {
            let head = self.counter_side(submitted.side()).best()?.clone();
            if !submitted.crosses(&head) {
                return None;
            }
            if head.amount_of_amount_asset() == 0 || !head.is_valid() {
                self.counter_side_mut(submitted.side()).pop_best();
                events.push(Event::Canceled(OrderCanceled {
                    order: head,
                    unmatchable: true,
                }));
                continue;
            }
            return Some(head);
        }
    }

    /// Apply one accepted execution to the resting side: the counter head
    /// comes off, and its remainder is reinserted with its time priority,
    /// removed as filled, or removed as unmatchable dust.
    pub fn commit_execution(&mut self, event: &OrderExecuted, events: &mut Vec<Event>) {
        let side = self.counter_side_mut(event.submitted.side());
        side.pop_best();
        let remaining = event.counter_remaining();
        if remaining.amount() == 0 {
            return;
        }
        if remaining.amount() < remaining.min_amount_of_amount_asset() || !remaining.is_valid() {
            events.push(Event::Canceled(OrderCanceled {
                order: remaining,
                unmatchable: true,
            }));
        } else {
            side.push_front(remaining);
        }
    }

    /// Rest `submitted` on its own side.
    pub fn add(&mut self, submitted: LimitOrder) -> Event {
        self.own_side_mut(submitted.side()).push_back(submitted.clone());
        Event::Added(OrderAdded { order: submitted })
    }

    /// The complete matching algorithm for one inbound order. Used where
    /// nothing can veto an execution; the pair actor drives the same
    /// steps itself so it can gate each fill on UTX acceptance.
    pub fn match_order(&mut self, submitted: LimitOrder) -> Vec<Event> {
        let mut events = Vec::new();
        let mut submitted = submitted;
        loop {
            let Some(counter) = self.next_counter(&submitted, &mut events) else {
                events.push(self.add(submitted));
                break;
            };
            if submitted.execution_amount(&counter) == 0 {
                events.push(Event::Canceled(OrderCanceled {
                    order: submitted,
                    unmatchable: true,
                }));
                break;
            }
            let executed = OrderExecuted {
                submitted: submitted.clone(),
                counter,
            };
            events.push(Event::Executed(executed.clone()));
            self.commit_execution(&executed, &mut events);

            let remaining = executed.submitted_remaining();
            if remaining.amount() == 0 {
                break;
            }
            if remaining.amount() < remaining.min_amount_of_amount_asset()
                || !remaining.is_valid()
            {
                events.push(Event::Canceled(OrderCanceled {
                    order: remaining,
                    unmatchable: true,
                }));
                break;
            }
            submitted = remaining;
        }
        events
    }

    // ------------------------------------------------------------------
    // Cancellation and expiry
    // ------------------------------------------------------------------

    /// Remove an order by id from either side.
    pub fn cancel(&mut self, id: &OrderId) -> Option<Event> {
        let order = self.bids.remove(id).or_else(|| self.asks.remove(id))?;
        Some(Event::Canceled(OrderCanceled {
            order,
            unmatchable: false,
        }))
    }

    /// Sweep both sides for orders whose expiration has passed.
    pub fn expire(&mut self, now: u64) -> Vec<Event> {
        let expired: Vec<OrderId> = self
            .bid_orders()
            .into_iter()
            .chain(self.ask_orders())
            .filter(|order| order.is_expired(now))
            .map(|order| order.id())
            .collect();
        expired.iter().filter_map(|id| self.cancel(id)).collect()
    }

    // ------------------------------------------------------------------
    // Replay
    // ------------------------------------------------------------------

    /// Re-apply a journaled event. Performs exactly the state transition
    /// the live path performed, deriving every decision from the payload.
    pub fn apply(&mut self, event: &Event) {
        match event {
            Event::Added(added) => {
                self.own_side_mut(added.order.side())
                    .push_back(added.order.clone());
            }
            Event::Executed(executed) => {
                let side = self.counter_side_mut(executed.submitted.side());
                side.pop_best();
                let remaining = executed.counter_remaining();
                if remaining.amount() > 0
                    && remaining.amount() >= remaining.min_amount_of_amount_asset()
                    && remaining.is_valid()
                {
                    side.push_front(remaining);
                }
                // a dust remainder was journaled as a follow-up
                // OrderCanceled and needs no reinsertion here
            }
            Event::Canceled(canceled) => {
                let id = canceled.order.id();
                self.bids.remove(&id).or_else(|| self.asks.remove(&id));
            }
        }
    }
}

impl Default for OrderBook {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
