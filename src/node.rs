// ============================================================================
// Node Wiring: external collaborators and the matcher context
// ============================================================================
//
// The matcher core consumes four capabilities it does not own: a clock, a
// UTX pool, a read-only blockchain view, and a script runner. They are
// passed explicitly through one context value rather than reached through
// globals. This module defines the capability traits, in-memory reference
// implementations (used by the standalone binary and the test suites),
// and the context assembly.
//
// ============================================================================

use crate::account::{Address, KeyPair};
use crate::assets::AssetId;
use crate::errors::MatcherError;
use crate::fixedpoint;
use crate::history::OrderHistory;
use crate::order::OrderId;
use crate::script::{Script, ScriptRunner, ScriptSubject, ScriptVerifier};
use crate::settings::MatcherSettings;
use crate::transaction::ExchangeTransaction;
use crate::validator::OrderValidator;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;

// ============================================================================
// CAPABILITIES
// ============================================================================

/// Millisecond time source. NTP-corrected in production; manual in tests.
pub trait Clock: Send + Sync {
    fn millis(&self) -> u64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn millis(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// A clock advanced by hand.
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(now: u64) -> Self {
        ManualClock {
            now: AtomicU64::new(now),
        }
    }

    pub fn set(&self, now: u64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, by: u64) {
        self.now.fetch_add(by, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Why the UTX pool refused a transaction. When the pool can tell which
/// of the two orders is at fault (stale balance, script denial) it names
/// it, and the matcher removes that order instead of aborting the match.
#[derive(Debug, Clone, PartialEq)]
pub struct UtxRejection {
    pub order_id: Option<OrderId>,
    pub reason: String,
}

impl UtxRejection {
    pub fn other(reason: impl Into<String>) -> Self {
        UtxRejection {
            order_id: None,
            reason: reason.into(),
        }
    }
}

/// The unconfirmed-transaction pool: reports spendable balances and
/// accepts or refuses emitted exchange transactions.
pub trait UtxPool: Send + Sync {
    fn spendable_balance(&self, address: &Address, asset: &Option<AssetId>) -> u64;
    fn put_if_new(&self, tx: &ExchangeTransaction) -> Result<(), UtxRejection>;
}

/// Read-only chain state the matcher consults for script policy.
pub trait BlockchainView: Send + Sync {
    fn height(&self) -> u64;
    fn account_script(&self, address: &Address) -> Option<Script>;
    fn asset_script(&self, asset: &AssetId) -> Option<Script>;
    fn activation_height(&self, feature: u16) -> Option<u64>;
}

// ============================================================================
// REFERENCE IMPLEMENTATIONS
// ============================================================================

/// In-memory UTX pool. Tracks balances, applies accepted fills to them,
/// and can be told to refuse transactions touching specific orders, which
/// stands in for an on-chain script denial.
pub struct MemoryUtxPool {
    balances: RwLock<HashMap<(Address, Option<AssetId>), u64>>,
    accepted: RwLock<Vec<ExchangeTransaction>>,
    seen: RwLock<HashSet<[u8; 32]>>,
    denied_orders: RwLock<HashSet<OrderId>>,
}

impl MemoryUtxPool {
    pub fn new() -> Self {
        MemoryUtxPool {
            balances: RwLock::new(HashMap::new()),
            accepted: RwLock::new(Vec::new()),
            seen: RwLock::new(HashSet::new()),
            denied_orders: RwLock::new(HashSet::new()),
        }
    }

    pub fn credit(&self, address: &Address, asset: &Option<AssetId>, amount: u64) {
        let mut balances = self.balances.write().unwrap();
        *balances.entry((*address, *asset)).or_insert(0) += amount;
    }

    /// Refuse any future transaction involving this order.
    pub fn deny_order(&self, id: OrderId) {
        self.denied_orders.write().unwrap().insert(id);
    }

    pub fn accepted(&self) -> Vec<ExchangeTransaction> {
        self.accepted.read().unwrap().clone()
    }

    fn apply_fill(&self, tx: &ExchangeTransaction) {
        let mut balances = self.balances.write().unwrap();
        let mut touch = |address: Address, asset: Option<AssetId>, delta: i64| {
            let slot = balances.entry((address, asset)).or_insert(0);
            *slot = if delta < 0 {
                slot.saturating_sub((-delta) as u64)
            } else {
                *slot + delta as u64
            };
        };
        let buyer = tx.buy_order.sender_public_key.address();
        let seller = tx.sell_order.sender_public_key.address();
        let pair = tx.buy_order.asset_pair;
        let price_value = fixedpoint::amount_of_price_asset(tx.amount, tx.price);

        touch(buyer, pair.price_asset, -(price_value as i64));
        touch(buyer, pair.amount_asset, tx.amount as i64);
        touch(buyer, None, -(tx.buy_matcher_fee as i64));
        touch(seller, pair.amount_asset, -(tx.amount as i64));
        touch(seller, pair.price_asset, price_value as i64);
        touch(seller, None, -(tx.sell_matcher_fee as i64));
    }
}

impl Default for MemoryUtxPool {
    fn default() -> Self {
        Self::new()
    }
}

impl UtxPool for MemoryUtxPool {
    fn spendable_balance(&self, address: &Address, asset: &Option<AssetId>) -> u64 {
        self.balances
            .read()
            .unwrap()
            .get(&(*address, *asset))
            .copied()
            .unwrap_or(0)
    }

    fn put_if_new(&self, tx: &ExchangeTransaction) -> Result<(), UtxRejection> {
        let denied = self.denied_orders.read().unwrap();
        for order in [&tx.buy_order, &tx.sell_order] {
            if denied.contains(&order.id()) {
                return Err(UtxRejection {
                    order_id: Some(order.id()),
                    reason: "Script denied the transaction".to_string(),
                });
            }
        }
        drop(denied);
        if !self.seen.write().unwrap().insert(tx.id()) {
            return Err(UtxRejection::other("Transaction is already in the pool"));
        }
        self.apply_fill(tx);
        self.accepted.write().unwrap().push(tx.clone());
        Ok(())
    }
}

/// In-memory blockchain view with settable height, scripts and features.
pub struct MemoryBlockchain {
    height: AtomicU64,
    account_scripts: RwLock<HashMap<Address, Script>>,
    asset_scripts: RwLock<HashMap<AssetId, Script>>,
    features: RwLock<HashMap<u16, u64>>,
}

impl MemoryBlockchain {
    pub fn new(height: u64) -> Self {
        MemoryBlockchain {
            height: AtomicU64::new(height),
            account_scripts: RwLock::new(HashMap::new()),
            asset_scripts: RwLock::new(HashMap::new()),
            features: RwLock::new(HashMap::new()),
        }
    }

    pub fn set_height(&self, height: u64) {
        self.height.store(height, Ordering::SeqCst);
    }

    pub fn set_account_script(&self, address: Address, script: Script) {
        self.account_scripts.write().unwrap().insert(address, script);
    }

    pub fn clear_account_script(&self, address: &Address) {
        self.account_scripts.write().unwrap().remove(address);
    }

    pub fn set_asset_script(&self, asset: AssetId, script: Script) {
        self.asset_scripts.write().unwrap().insert(asset, script);
    }

    pub fn activate_feature(&self, feature: u16, height: u64) {
        self.features.write().unwrap().insert(feature, height);
    }
}

impl BlockchainView for MemoryBlockchain {
    fn height(&self) -> u64 {
        self.height.load(Ordering::SeqCst)
    }

    fn account_script(&self, address: &Address) -> Option<Script> {
        self.account_scripts.read().unwrap().get(address).cloned()
    }

    fn asset_script(&self, asset: &AssetId) -> Option<Script> {
        self.asset_scripts.read().unwrap().get(asset).cloned()
    }

    fn activation_height(&self, feature: u16) -> Option<u64> {
        self.features.read().unwrap().get(&feature).copied()
    }
}

/// Runner used when no script engine is wired in. Scripted accounts and
/// assets cannot be evaluated, so evaluation reports an execution error.
pub struct NoScriptRunner;

impl ScriptRunner for NoScriptRunner {
    fn run(&self, _: u64, _: ScriptSubject<'_>, _: &Script) -> Result<bool, String> {
        Err("no script engine is configured".to_string())
    }
}

// ============================================================================
// CONTEXT
// ============================================================================

/// Everything a pair actor needs, assembled once at startup.
pub struct MatcherContext {
    pub settings: MatcherSettings,
    pub clock: Arc<dyn Clock>,
    pub wallet: KeyPair,
    pub db: sled::Db,
    pub history: Arc<OrderHistory>,
    pub utx: Arc<dyn UtxPool>,
    pub blockchain: Arc<dyn BlockchainView>,
    pub scripts: Arc<ScriptVerifier>,
    pub validator: Arc<OrderValidator>,
    pub transactions: broadcast::Sender<ExchangeTransaction>,
}

impl MatcherContext {
    pub fn new(
        settings: MatcherSettings,
        clock: Arc<dyn Clock>,
        wallet: KeyPair,
        db: sled::Db,
        utx: Arc<dyn UtxPool>,
        blockchain: Arc<dyn BlockchainView>,
        runner: Arc<dyn ScriptRunner>,
    ) -> Result<Arc<Self>, MatcherError> {
        if let Some(expected) = &settings.account {
            let derived = wallet.public_key().address().to_string();
            if *expected != derived {
                return Err(MatcherError::Internal(format!(
                    "configured matcher account {} does not match wallet address {}",
                    expected, derived
                )));
            }
        }
        let history = Arc::new(OrderHistory::open(&db)?);
        let scripts = Arc::new(ScriptVerifier::new(blockchain.clone(), runner));
        let validator = Arc::new(OrderValidator::new(
            &settings,
            wallet.public_key(),
            history.clone(),
            utx.clone(),
            scripts.clone(),
            clock.clone(),
        ));
        let (transactions, _) = broadcast::channel(1024);
        Ok(Arc::new(MatcherContext {
            settings,
            clock,
            wallet,
            db,
            history,
            utx,
            blockchain,
            scripts,
            validator,
            transactions,
        }))
    }
}
