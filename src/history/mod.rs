// ============================================================================
// Order History Store
// ============================================================================
//
// Durable, per-order accounting and the authoritative open-volume ledger.
// Everything lives in one sled tree under short key prefixes:
//
//   ord: <id>                stored Order
//   oi:  <id>                OrderInfo
//   ov:  <addr> <asset>      open volume slot (i64)
//   ovs: <addr>              open-volume asset index sequence number
//   ova: <addr> <n>          n-th reserved asset of a trader
//   ovm: <addr> <asset>      marker: asset already indexed
//   aos: <addr>              trader order index sequence number
//   ao:  <addr> <n>          n-th order id of a trader
//   wm:  <pair>              last applied journal sequence per pair
//
// Writes for one event are batched and applied atomically, behind a single
// lock so that the validator's reservation reads never observe a half
// applied event.
//
// ============================================================================

pub mod diff;
pub mod portfolio;

pub use portfolio::OpenPortfolio;

use crate::account::Address;
use crate::assets::{asset_name, AssetId};
use crate::errors::MatcherError;
use crate::events::Event;
use crate::order::{Order, OrderId};
use diff::{diff_accepted, diff_canceled, diff_executed, reservation, EventDiffs};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::warn;

// ============================================================================
// ORDER INFO
// ============================================================================

/// Stored per-order record. The status is always derived, never stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderInfo {
    pub amount: u64,
    pub filled: u64,
    pub canceled: bool,
    pub min_amount: Option<u64>,
    pub remaining_fee: u64,
    /// Cumulative spend released by executions. Consumed only by the
    /// reservation math; not exposed outside the store.
    pub(in crate::history) total_spend: u64,
}

impl OrderInfo {
    pub fn empty() -> Self {
        OrderInfo::default()
    }

    pub fn status(&self) -> OrderStatus {
        if self.amount == 0 {
            OrderStatus::NotFound
        } else if self.filled == self.amount {
            OrderStatus::Filled(self.filled)
        } else if self.canceled {
            OrderStatus::Cancelled(self.filled)
        } else if self.filled > 0 {
            OrderStatus::PartiallyFilled(self.filled)
        } else {
            OrderStatus::Accepted
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    NotFound,
    Accepted,
    PartiallyFilled(u64),
    Filled(u64),
    Cancelled(u64),
}

impl OrderStatus {
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled(_) | OrderStatus::Cancelled(_) | OrderStatus::NotFound
        )
    }
}

// ============================================================================
// STORE
// ============================================================================

pub struct OrderHistory {
    tree: sled::Tree,
    lock: Mutex<()>,
}

impl OrderHistory {
    pub fn open(db: &sled::Db) -> Result<Self, MatcherError> {
        Ok(OrderHistory {
            tree: db.open_tree("order-history")?,
            lock: Mutex::new(()),
        })
    }

    /// Apply one journaled event. Events at or below the pair's watermark
    /// were already applied and are skipped, which makes journal replay
    /// idempotent. Returns whether the event was applied.
    pub fn process(&self, pair_key: &str, seq: u64, event: &Event) -> Result<bool, MatcherError> {
        let _guard = self.lock.lock().unwrap();
        if seq <= self.read_u64(&watermark_key(pair_key))? {
            return Ok(false);
        }

        let diffs = match event {
            Event::Added(added) => diff_accepted(added),
            Event::Executed(executed) => diff_executed(executed),
            Event::Canceled(canceled) => diff_canceled(canceled),
        };

        let mut batch = sled::Batch::default();
        let mut volume = Vec::new();
        self.stage(&diffs, &mut batch, &mut volume)?;
        // both sides of an execution may touch the same (trader, asset)
        // slot; merge before the read-modify-write
        let mut merged: HashMap<Address, OpenPortfolio> = HashMap::new();
        for (address, portfolio) in volume {
            let slot = merged.entry(address).or_insert_with(OpenPortfolio::new);
            for (asset, delta) in portfolio.iter() {
                slot.add(*asset, *delta);
            }
        }
        for (address, portfolio) in &merged {
            self.stage_open_volume(address, portfolio, &mut batch)?;
        }
        batch.insert(watermark_key(pair_key), encode(&seq)?);
        self.tree.apply_batch(batch)?;
        self.tree.flush()?;
        Ok(true)
    }

    fn stage(
        &self,
        diffs: &EventDiffs,
        batch: &mut sled::Batch,
        volume: &mut Vec<(Address, OpenPortfolio)>,
    ) -> Result<(), MatcherError> {
        for (order, info_diff, full_release) in &diffs.updates {
            let id = order.id();
            let address = order.sender_public_key.address();
            let previous = self.order_info(&id)?;
            let updated = info_diff.fold_into(order, &previous);

            let before = reservation(order, &previous);
            let delta = if *full_release {
                before.negate()
            } else {
                reservation(order, &updated).combine(before.negate())
            };
            if !delta.is_empty() {
                volume.push((address, delta));
            }

            if info_diff.is_new && previous.status() == OrderStatus::NotFound {
                batch.insert(order_key(&id), encode(order)?);
                self.stage_order_index(&address, &id, batch)?;
            }
            // a record whose derived status is NotFound is never stored
            if updated.status() != OrderStatus::NotFound {
                batch.insert(info_key(&id), encode(&updated)?);
            }
        }
        Ok(())
    }

    fn stage_open_volume(
        &self,
        address: &Address,
        portfolio: &OpenPortfolio,
        batch: &mut sled::Batch,
    ) -> Result<(), MatcherError> {
        let mut next_index = self.read_u64(&ov_seq_key(address))?;
        let mut indexed_any = false;
        for (asset, delta) in portfolio.iter() {
            let key = open_volume_key(address, asset);
            let current: i64 = self.read_i64(&key)?;
            let updated = current + delta;
            if updated < 0 {
                warn!(
                    address = %address,
                    asset = %asset_name(asset),
                    volume = updated,
                    "open volume went negative"
                );
            }
            batch.insert(key, encode(&updated)?);

            let mark = open_volume_mark_key(address, asset);
            if self.tree.get(&mark)?.is_none() {
                next_index += 1;
                indexed_any = true;
                batch.insert(ov_asset_key(address, next_index), encode(asset)?);
                batch.insert(mark, encode(&next_index)?);
            }
        }
        if indexed_any {
            batch.insert(ov_seq_key(address), encode(&next_index)?);
        }
        Ok(())
    }

    fn stage_order_index(
        &self,
        address: &Address,
        id: &OrderId,
        batch: &mut sled::Batch,
    ) -> Result<(), MatcherError> {
        let seq = self.read_u64(&orders_seq_key(address))? + 1;
        batch.insert(orders_seq_key(address), encode(&seq)?);
        batch.insert(orders_key(address, seq), encode(id)?);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn order(&self, id: &OrderId) -> Result<Option<Order>, MatcherError> {
        match self.tree.get(order_key(id))? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn order_info(&self, id: &OrderId) -> Result<OrderInfo, MatcherError> {
        match self.tree.get(info_key(id))? {
            Some(bytes) => Ok(decode(&bytes)?),
            None => Ok(OrderInfo::empty()),
        }
    }

    pub fn order_status(&self, id: &OrderId) -> Result<OrderStatus, MatcherError> {
        Ok(self.order_info(id)?.status())
    }

    /// Current reservation of one (trader, asset) slot, clamped at zero.
    pub fn open_volume(
        &self,
        address: &Address,
        asset: &Option<AssetId>,
    ) -> Result<u64, MatcherError> {
        let volume = self.read_i64(&open_volume_key(address, asset))?;
        Ok(volume.max(0) as u64)
    }

    /// Every asset a trader has ever reserved, with the current volumes.
    pub fn open_portfolio(&self, address: &Address) -> Result<OpenPortfolio, MatcherError> {
        let mut portfolio = OpenPortfolio::new();
        let last = self.read_u64(&ov_seq_key(address))?;
        for n in 1..=last {
            if let Some(bytes) = self.tree.get(ov_asset_key(address, n))? {
                let asset: Option<AssetId> = decode(&bytes)?;
                let volume = self.open_volume(address, &asset)?;
                portfolio.add(asset, volume as i64);
            }
        }
        Ok(portfolio)
    }

    /// Order ids of a trader, oldest first.
    pub fn address_orders(&self, address: &Address) -> Result<Vec<OrderId>, MatcherError> {
        let mut ids = Vec::new();
        let last = self.read_u64(&orders_seq_key(address))?;
        for n in 1..=last {
            if let Some(bytes) = self.tree.get(orders_key(address, n))? {
                ids.push(decode(&bytes)?);
            }
        }
        Ok(ids)
    }

    pub fn last_applied(&self, pair_key: &str) -> Result<u64, MatcherError> {
        self.read_u64(&watermark_key(pair_key))
    }

    /// Remove a terminal order's storage. Open volume is untouched: a
    /// terminal order reserves nothing.
    pub fn delete_order(&self, address: &Address, id: &OrderId) -> Result<(), MatcherError> {
        let _guard = self.lock.lock().unwrap();
        let status = self.order_info(id)?.status();
        if !matches!(status, OrderStatus::Filled(_) | OrderStatus::Cancelled(_)) {
            return Err(MatcherError::Internal(format!(
                "cannot delete order {} with status {:?}",
                id, status
            )));
        }
        let mut batch = sled::Batch::default();
        batch.remove(order_key(id));
        batch.remove(info_key(id));
        let last = self.read_u64(&orders_seq_key(address))?;
        for n in 1..=last {
            if let Some(bytes) = self.tree.get(orders_key(address, n))? {
                let stored: OrderId = decode(&bytes)?;
                if stored == *id {
                    batch.remove(orders_key(address, n));
                }
            }
        }
        self.tree.apply_batch(batch)?;
        Ok(())
    }

    fn read_u64(&self, key: &[u8]) -> Result<u64, MatcherError> {
        match self.tree.get(key)? {
            Some(bytes) => Ok(decode(&bytes)?),
            None => Ok(0),
        }
    }

    fn read_i64(&self, key: &[u8]) -> Result<i64, MatcherError> {
        match self.tree.get(key)? {
            Some(bytes) => Ok(decode(&bytes)?),
            None => Ok(0),
        }
    }
}

// ============================================================================
// KEYS
// ============================================================================

fn order_key(id: &OrderId) -> Vec<u8> {
    [b"ord:".as_slice(), &id.0].concat()
}

fn info_key(id: &OrderId) -> Vec<u8> {
    [b"oi:".as_slice(), &id.0].concat()
}

fn asset_bytes(asset: &Option<AssetId>) -> Vec<u8> {
    match asset {
        Some(id) => [&[1u8][..], &id.0].concat(),
        None => vec![0u8],
    }
}

fn open_volume_key(address: &Address, asset: &Option<AssetId>) -> Vec<u8> {
    [b"ov:".as_slice(), &address.0, &asset_bytes(asset)].concat()
}

fn open_volume_mark_key(address: &Address, asset: &Option<AssetId>) -> Vec<u8> {
    [b"ovm:".as_slice(), &address.0, &asset_bytes(asset)].concat()
}

fn ov_seq_key(address: &Address) -> Vec<u8> {
    [b"ovs:".as_slice(), &address.0].concat()
}

fn ov_asset_key(address: &Address, n: u64) -> Vec<u8> {
    [b"ova:".as_slice(), &address.0, &n.to_be_bytes()].concat()
}

fn orders_seq_key(address: &Address) -> Vec<u8> {
    [b"aos:".as_slice(), &address.0].concat()
}

fn orders_key(address: &Address, n: u64) -> Vec<u8> {
    [b"ao:".as_slice(), &address.0, &n.to_be_bytes()].concat()
}

fn watermark_key(pair_key: &str) -> Vec<u8> {
    [b"wm:".as_slice(), pair_key.as_bytes()].concat()
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, MatcherError> {
    Ok(bincode::serialize(value)?)
}

fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, MatcherError> {
    Ok(bincode::deserialize(bytes)?)
}

// ============================================================================
// TESTS
// ============================================================================
