// ============================================================================
// Matcher Supervisor
// ============================================================================
//
// Routes every request to the pair actor owning its asset pair, spawning
// actors on first use and respawning them after a crash (recovery rebuilds
// their books from snapshot + journal). Owns the expiry-sweep timer and
// the shared map of read-only book snapshots that serves query traffic
// without touching the actors.
//
// ============================================================================

use crate::account::PublicKey;
use crate::assets::AssetPair;
use crate::errors::MatcherError;
use crate::limit_order::LimitOrder;
use crate::node::MatcherContext;
use crate::order::{Order, OrderId, OrderSide};
use crate::orderbook::OrderBookSnapshot;
use crate::pair_actor::{
    CancelResponse, PairActor, PairMessage, PlacementResponse, SharedSnapshots,
};
use crate::transaction::ExchangeTransaction;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::warn;

pub struct Matcher {
    ctx: Arc<MatcherContext>,
    pairs: tokio::sync::Mutex<HashMap<String, mpsc::Sender<PairMessage>>>,
    snapshots: SharedSnapshots,
}

impl Matcher {
    pub fn new(ctx: Arc<MatcherContext>) -> Arc<Self> {
        Arc::new(Matcher {
            ctx,
            pairs: tokio::sync::Mutex::new(HashMap::new()),
            snapshots: SharedSnapshots::default(),
        })
    }

    /// The mailbox for a pair, spawning or respawning its actor on demand.
    async fn sender_for(&self, pair: AssetPair) -> mpsc::Sender<PairMessage> {
        let key = pair.key();
        let mut pairs = self.pairs.lock().await;
        if let Some(sender) = pairs.get(&key) {
            if !sender.is_closed() {
                return sender.clone();
            }
            warn!(pair = %pair, "pair actor is gone, respawning");
        }
        let sender = PairActor::spawn(self.ctx.clone(), pair, self.snapshots.clone());
        pairs.insert(key, sender.clone());
        sender
    }

    async fn dispatch(&self, pair: AssetPair, mut message: PairMessage) -> Result<(), MatcherError> {
        // one respawn attempt if the actor died between lookup and send
        for _ in 0..2 {
            let sender = self.sender_for(pair).await;
            match sender.send(message).await {
                Ok(()) => return Ok(()),
                Err(failed) => message = failed.0,
            }
        }
        Err(MatcherError::Internal(format!(
            "pair actor {} is unavailable",
            pair
        )))
    }

    pub async fn place(&self, order: Order) -> PlacementResponse {
        let pair = order.asset_pair;
        let (reply, response) = oneshot::channel();
        if let Err(err) = self.dispatch(pair, PairMessage::Place { order, reply }).await {
            return PlacementResponse::OrderRejected(err);
        }
        match response.await {
            Ok(outcome) => outcome,
            Err(_) => PlacementResponse::OrderRejected(MatcherError::Internal(
                "pair actor dropped the request".to_string(),
            )),
        }
    }

    pub async fn cancel(
        &self,
        pair: AssetPair,
        sender: PublicKey,
        order_id: OrderId,
    ) -> CancelResponse {
        let (reply, response) = oneshot::channel();
        let message = PairMessage::Cancel {
            sender,
            order_id,
            reply,
        };
        if let Err(err) = self.dispatch(pair, message).await {
            return CancelResponse::OrderCancelRejected(err.to_string());
        }
        match response.await {
            Ok(outcome) => outcome,
            Err(_) => CancelResponse::OrderCancelRejected(
                "pair actor dropped the request".to_string(),
            ),
        }
    }

    pub async fn orders(&self, pair: AssetPair, side: Option<OrderSide>) -> Vec<LimitOrder> {
        let (reply, response) = oneshot::channel();
        if self
            .dispatch(pair, PairMessage::GetOrders { side, reply })
            .await
            .is_err()
        {
            return Vec::new();
        }
        response.await.unwrap_or_default()
    }

    /// Fan the expiry sweep out to every live actor.
    pub async fn cleanup(&self) {
        let senders: Vec<mpsc::Sender<PairMessage>> =
            self.pairs.lock().await.values().cloned().collect();
        for sender in senders {
            sender.send(PairMessage::Cleanup).await.ok();
        }
    }

    /// Drop a pair's in-memory state and reload it from persistence.
    pub async fn restart_pair(&self, pair: AssetPair) {
        self.dispatch(pair, PairMessage::Restart).await.ok();
    }

    /// Read-only book view from the shared snapshot map.
    pub fn order_book(&self, pair: &AssetPair) -> Option<OrderBookSnapshot> {
        self.snapshots.read().unwrap().get(&pair.key()).cloned()
    }

    pub fn subscribe_transactions(&self) -> broadcast::Receiver<ExchangeTransaction> {
        self.ctx.transactions.subscribe()
    }

    /// Periodic expiry sweep driven by the configured interval.
    pub fn spawn_cleanup_timer(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let supervisor = self.clone();
        let period = supervisor.ctx.settings.order_cleanup_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                supervisor.cleanup().await;
            }
        })
    }
}
