// ============================================================================
// Pair Actor: single writer for one asset pair
// ============================================================================
//
// All placements, cancels and sweeps for one pair are serialized through
// this actor's mailbox; the order in which it dequeues requests is the
// total order of all book effects. A placement is validated (with a
// deadline), then matched step by step: each fill is turned into a signed
// exchange transaction, checked against script policy and offered to the
// UTX pool *before* the fill is journaled, applied to history and
// committed to the book. A refused transaction therefore rolls nothing
// back: the resting counter order was never touched, and the submitted
// order is simply recorded as removed.
//
// The actor is event-sourced: recovery loads the latest book snapshot and
// replays strictly newer journal events; history application is keyed by
// a per-pair watermark, so replay is idempotent.
//
// ============================================================================

use crate::account::PublicKey;
use crate::assets::AssetPair;
use crate::errors::MatcherError;
use crate::events::{Event, OrderCanceled, OrderExecuted};
use crate::journal::PairJournal;
use crate::limit_order::LimitOrder;
use crate::node::MatcherContext;
use crate::order::{Order, OrderId, OrderSide};
use crate::orderbook::{OrderBook, OrderBookSnapshot};
use crate::transaction::ExchangeTransaction;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

pub type SharedSnapshots = Arc<RwLock<HashMap<String, OrderBookSnapshot>>>;

// ============================================================================
// PROTOCOL
// ============================================================================

#[derive(Debug)]
pub enum PairMessage {
    Place {
        order: Order,
        reply: oneshot::Sender<PlacementResponse>,
    },
    Cancel {
        sender: PublicKey,
        order_id: OrderId,
        reply: oneshot::Sender<CancelResponse>,
    },
    Cleanup,
    GetOrders {
        side: Option<OrderSide>,
        reply: oneshot::Sender<Vec<LimitOrder>>,
    },
    Restart,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlacementResponse {
    OrderAccepted(Order),
    OrderRejected(MatcherError),
    OperationTimedOut,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CancelResponse {
    OrderCanceled(String),
    OrderCancelRejected(String),
}

// ============================================================================
// ACTOR
// ============================================================================

pub struct PairActor {
    pair: AssetPair,
    pair_key: String,
    ctx: Arc<MatcherContext>,
    book: OrderBook,
    journal: PairJournal,
    snapshots: SharedSnapshots,
    events_since_snapshot: u64,
}

impl PairActor {
    /// Spawn the actor task for one pair, recovering its book first.
    pub fn spawn(
        ctx: Arc<MatcherContext>,
        pair: AssetPair,
        snapshots: SharedSnapshots,
    ) -> mpsc::Sender<PairMessage> {
        let (tx, rx) = mpsc::channel(128);
        tokio::spawn(async move {
            match PairActor::recover(ctx, pair, snapshots) {
                Ok(actor) => actor.run(rx).await,
                Err(err) => error!(pair = %pair, error = %err, "pair actor failed to start"),
            }
        });
        tx
    }

    fn recover(
        ctx: Arc<MatcherContext>,
        pair: AssetPair,
        snapshots: SharedSnapshots,
    ) -> Result<Self, MatcherError> {
        let pair_key = pair.key();
        let journal = PairJournal::open(&ctx.db, &pair_key)?;
        let book = Self::replay(&ctx, &pair_key, &journal)?;
        info!(pair = %pair, orders = book.len(), "pair actor recovered");
        Ok(PairActor {
            pair,
            pair_key,
            ctx,
            book,
            journal,
            snapshots,
            events_since_snapshot: 0,
        })
    }

    fn replay(
        ctx: &MatcherContext,
        pair_key: &str,
        journal: &PairJournal,
    ) -> Result<OrderBook, MatcherError> {
        let (mut book, offset) = match journal.load_snapshot()? {
            Some(snapshot) => (
                OrderBook::restore(snapshot.bids, snapshot.asks),
                snapshot.offset,
            ),
            None => (OrderBook::new(), 0),
        };
        for (seq, event) in journal.replay_after(offset)? {
            book.apply(&event);
            ctx.history.process(pair_key, seq, &event)?;
        }
        Ok(book)
    }

    async fn run(mut self, mut mailbox: mpsc::Receiver<PairMessage>) {
        self.publish_snapshot();
        while let Some(message) = mailbox.recv().await {
            let result = match message {
                PairMessage::Place { order, reply } => self.handle_place(order, reply).await,
                PairMessage::Cancel {
                    sender,
                    order_id,
                    reply,
                } => self.handle_cancel(sender, order_id, reply),
                PairMessage::Cleanup => self.handle_cleanup(),
                PairMessage::GetOrders { side, reply } => {
                    let orders = match side {
                        Some(OrderSide::Buy) => self.book.bid_orders(),
                        Some(OrderSide::Sell) => self.book.ask_orders(),
                        None => {
                            let mut all = self.book.bid_orders();
                            all.extend(self.book.ask_orders());
                            all
                        }
                    };
                    reply.send(orders).ok();
                    Ok(())
                }
                PairMessage::Restart => self.handle_restart(),
            };
            match result {
                Ok(()) => {
                    if let Err(err) = self.maybe_snapshot() {
                        error!(pair = %self.pair, error = %err, "snapshot failed, stopping");
                        break;
                    }
                    self.publish_snapshot();
                }
                Err(err) => {
                    // persistence failures are fatal; the supervisor respawns
                    // us and recovery restores the pre-crash state
                    error!(pair = %self.pair, error = %err, "pair actor crashed");
                    break;
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Placement
    // ------------------------------------------------------------------

    async fn handle_place(
        &mut self,
        order: Order,
        reply: oneshot::Sender<PlacementResponse>,
    ) -> Result<(), MatcherError> {
        let verdict = self.validate_with_deadline(&order).await;
        let verdict = match verdict {
            None => {
                debug!(order = %order.id(), "validation timed out");
                reply.send(PlacementResponse::OperationTimedOut).ok();
                return Ok(());
            }
            Some(v) => v,
        };
        if let Err(err) = verdict {
            reply.send(PlacementResponse::OrderRejected(err)).ok();
            return Ok(());
        }

        let response = self.match_and_settle(&order)?;
        reply.send(response).ok();
        Ok(())
    }

    /// Ship the order to the shared validator and wait at most the
    /// configured deadline. A late verdict finds its channel closed and is
    /// dropped; the single oneshot per request is what matches replies to
    /// the awaited order.
    async fn validate_with_deadline(&self, order: &Order) -> Option<Result<(), MatcherError>> {
        let (tx, rx) = oneshot::channel();
        let validator = self.ctx.validator.clone();
        let subject = order.clone();
        tokio::task::spawn_blocking(move || {
            tx.send(validator.validate_place(&subject)).ok();
        });
        match timeout(self.ctx.settings.validation_timeout, rx).await {
            Ok(Ok(verdict)) => Some(verdict),
            Ok(Err(_)) | Err(_) => None,
        }
    }

    /// The matching loop of one accepted placement. Each candidate fill is
    /// settled against script policy and the UTX pool before anything is
    /// journaled for it; the book commits last.
    fn match_and_settle(&mut self, order: &Order) -> Result<PlacementResponse, MatcherError> {
        let mut submitted = LimitOrder::new(order.clone());
        let mut any_executed = false;
        loop {
            let mut swept = Vec::new();
            let counter = self.book.next_counter(&submitted, &mut swept);
            for event in &swept {
                self.commit_event(event)?;
            }
            let Some(counter) = counter else {
                let added = self.book.add(submitted);
                self.commit_event(&added)?;
                debug!(order = %order.id(), pair = %self.pair, "order rested on book");
                return Ok(PlacementResponse::OrderAccepted(order.clone()));
            };

            if submitted.execution_amount(&counter) == 0 {
                let canceled = Event::Canceled(OrderCanceled {
                    order: submitted,
                    unmatchable: true,
                });
                self.commit_event(&canceled)?;
                return Ok(if any_executed {
                    PlacementResponse::OrderAccepted(order.clone())
                } else {
                    PlacementResponse::OrderRejected(MatcherError::ValidationFailure(
                        "Order amount cannot settle at the counter price".to_string(),
                    ))
                });
            }

            let executed = OrderExecuted {
                submitted: submitted.clone(),
                counter,
            };
            let tx = ExchangeTransaction::from_execution(
                &executed,
                self.ctx.settings.order_match_tx_fee,
                self.ctx.clock.millis(),
                &self.ctx.wallet,
            )?;

            let matcher_address = self.ctx.wallet.public_key().address();
            if let Err(script_err) = self.ctx.scripts.verify_transaction(&matcher_address, &tx) {
                return self.reject_submitted(order, submitted, script_err);
            }
            if let Err(rejection) = self.ctx.utx.put_if_new(&tx) {
                warn!(
                    order = %order.id(),
                    cause = %rejection.reason,
                    "UTX refused exchange transaction"
                );
                if rejection.order_id == Some(executed.counter.id()) {
                    // the resting order is the invalid one: sweep it and
                    // keep matching the submitted order against the rest
                    // of the book
                    if let Some(Event::Canceled(removed)) =
                        self.book.cancel(&executed.counter.id())
                    {
                        self.commit_event(&Event::Canceled(OrderCanceled {
                            order: removed.order,
                            unmatchable: true,
                        }))?;
                    }
                    continue;
                }
                return self.reject_submitted(
                    order,
                    submitted,
                    MatcherError::rolled_back(&order.id(), rejection.reason),
                );
            }

            any_executed = true;
            self.commit_event(&Event::Executed(executed.clone()))?;
            let mut follow_ups = Vec::new();
            self.book.commit_execution(&executed, &mut follow_ups);
            for event in &follow_ups {
                self.commit_event(event)?;
            }
            self.ctx.transactions.send(tx).ok();

            let remaining = executed.submitted_remaining();
            if remaining.amount() == 0 {
                return Ok(PlacementResponse::OrderAccepted(order.clone()));
            }
            if remaining.amount() < remaining.min_amount_of_amount_asset() || !remaining.is_valid()
            {
                let canceled = Event::Canceled(OrderCanceled {
                    order: remaining,
                    unmatchable: true,
                });
                self.commit_event(&canceled)?;
                return Ok(PlacementResponse::OrderAccepted(order.clone()));
            }
            submitted = remaining;
        }
    }

    /// The submitted order is treated as invalid going forward: it never
    /// entered the book, the counter head was never popped, and history
    /// records the removal.
    fn reject_submitted(
        &mut self,
        order: &Order,
        submitted: LimitOrder,
        err: MatcherError,
    ) -> Result<PlacementResponse, MatcherError> {
        let canceled = Event::Canceled(OrderCanceled {
            order: submitted,
            unmatchable: true,
        });
        self.commit_event(&canceled)?;
        Ok(PlacementResponse::OrderRejected(err))
    }

    // ------------------------------------------------------------------
    // Cancel, cleanup, restart
    // ------------------------------------------------------------------

    fn handle_cancel(
        &mut self,
        sender: PublicKey,
        order_id: OrderId,
        reply: oneshot::Sender<CancelResponse>,
    ) -> Result<(), MatcherError> {
        let verdict = self.ctx.validator.validate_cancel(&sender, &order_id);
        let response = match verdict {
            Err(err) => CancelResponse::OrderCancelRejected(err.to_string()),
            Ok(order) if order.asset_pair != self.pair => {
                CancelResponse::OrderCancelRejected("Order not found".to_string())
            }
            Ok(_) => match self.book.cancel(&order_id) {
                Some(event) => {
                    self.commit_event(&event)?;
                    info!(order = %order_id, pair = %self.pair, "order canceled");
                    CancelResponse::OrderCanceled(order_id.to_string())
                }
                None => CancelResponse::OrderCancelRejected("Order not found".to_string()),
            },
        };
        reply.send(response).ok();
        Ok(())
    }

    fn handle_cleanup(&mut self) -> Result<(), MatcherError> {
        let now = self.ctx.clock.millis();
        let expired = self.book.expire(now);
        if !expired.is_empty() {
            info!(pair = %self.pair, count = expired.len(), "expired orders removed");
        }
        for event in &expired {
            self.commit_event(event)?;
        }
        Ok(())
    }

    fn handle_restart(&mut self) -> Result<(), MatcherError> {
        self.book = Self::replay(&self.ctx, &self.pair_key, &self.journal)?;
        self.events_since_snapshot = 0;
        info!(pair = %self.pair, orders = self.book.len(), "pair actor restarted");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    fn commit_event(&mut self, event: &Event) -> Result<(), MatcherError> {
        let seq = self.journal.append(event)?;
        self.ctx.history.process(&self.pair_key, seq, event)?;
        self.events_since_snapshot += 1;
        Ok(())
    }

    /// Checkpoint between requests, never mid-event, so the snapshot
    /// offset always points at a fully applied prefix.
    fn maybe_snapshot(&mut self) -> Result<(), MatcherError> {
        if self.events_since_snapshot >= self.ctx.settings.snapshot_interval {
            self.journal
                .save_snapshot(self.book.bid_orders(), self.book.ask_orders())?;
            self.events_since_snapshot = 0;
            debug!(pair = %self.pair, offset = self.journal.last_seq(), "book snapshot written");
        }
        Ok(())
    }

    fn publish_snapshot(&self) {
        let snapshot = OrderBookSnapshot::of(self.pair, &self.book);
        self.snapshots
            .write()
            .unwrap()
            .insert(self.pair_key.clone(), snapshot);
    }
}
