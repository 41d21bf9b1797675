// ============================================================================
// Order Book Module
// ============================================================================
//
// One book per asset pair: two price-indexed FIFO ladders and the
// price-time priority matching algorithm. The book is private to its pair
// actor; read traffic goes through aggregated snapshots published by the
// supervisor.
//
// ============================================================================

pub mod book;

pub use book::OrderBook;

use crate::assets::AssetPair;
use crate::limit_order::LimitOrder;
use serde::{Deserialize, Serialize};

/// One aggregated price level of a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub price: u64,
    pub amount: u64,
    pub order_count: usize,
}

/// Read-only view of a book, published for query endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    pub pair: AssetPair,
    pub bids: Vec<Level>,
    pub asks: Vec<Level>,
    pub best_bid: Option<u64>,
    pub best_ask: Option<u64>,
}

impl OrderBookSnapshot {
    /// Aggregate a book into the JSON payload served to market-data
    /// queries.
    pub fn of(pair: AssetPair, book: &OrderBook) -> Self {
        let aggregate = |orders: Vec<LimitOrder>| {
            let mut levels: Vec<Level> = Vec::new();
            for order in orders {
                match levels.last_mut() {
                    Some(level) if level.price == order.price() => {
                        level.amount += order.amount();
                        level.order_count += 1;
                    }
                    _ => levels.push(Level {
                        price: order.price(),
                        amount: order.amount(),
                        order_count: 1,
                    }),
                }
            }
            levels
        };
        let bids = aggregate(book.bid_orders());
        let asks = aggregate(book.ask_orders());
        OrderBookSnapshot {
            pair,
            best_bid: bids.first().map(|l| l.price),
            best_ask: asks.first().map(|l| l.price),
            bids,
            asks,
        }
    }
}
