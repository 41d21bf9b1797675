/// End-to-end matching scenarios through the full actor stack:
/// supervisor -> pair actor -> validator -> book -> history -> UTX.
///
/// The pair under test is BTC/NATIVE: BTC is the amount asset, the price
/// asset is the native one, and every order pays the default 300_000
/// native-unit matcher fee unless stated otherwise.

use dex_matcher::fixedpoint::{self, PRICE_CONSTANT};
use dex_matcher::node::{Clock, ManualClock, MatcherContext, MemoryBlockchain, MemoryUtxPool};
use dex_matcher::pair_actor::{CancelResponse, PlacementResponse};
use dex_matcher::script::{Script, ScriptRunner, ScriptSubject, SMART_ACCOUNT_TRADING_FEATURE};
use dex_matcher::{
    AssetId, AssetPair, KeyPair, Matcher, MatcherError, MatcherSettings, Order, OrderSide,
    OrderStatus, Proof,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const P: u64 = PRICE_CONSTANT as u64;
const FEE: u64 = 300_000;
const START_TIME: u64 = 1_700_000_000_000;

static ORDER_SEQ: AtomicU64 = AtomicU64::new(0);

fn btc() -> AssetId {
    AssetId([0xB7; 32])
}

fn pair() -> AssetPair {
    AssetPair::new(Some(btc()), None)
}

/// Script runner that approves everything; scenario 6 needs scripted
/// accounts to actually trade once the feature activates.
struct ApproveAll;
impl ScriptRunner for ApproveAll {
    fn run(&self, _: u64, _: ScriptSubject<'_>, _: &Script) -> Result<bool, String> {
        Ok(true)
    }
}

struct TestNode {
    matcher: Arc<Matcher>,
    ctx: Arc<MatcherContext>,
    utx: Arc<MemoryUtxPool>,
    blockchain: Arc<MemoryBlockchain>,
    clock: Arc<ManualClock>,
    wallet: KeyPair,
}

fn test_node() -> TestNode {
    let db = sled::Config::new().temporary(true).open().unwrap();
    let clock = Arc::new(ManualClock::new(START_TIME));
    let utx = Arc::new(MemoryUtxPool::new());
    let blockchain = Arc::new(MemoryBlockchain::new(100));
    let wallet = KeyPair::from_seed([0xAA; 32]);
    let ctx = MatcherContext::new(
        MatcherSettings::default(),
        clock.clone(),
        KeyPair::from_seed([0xAA; 32]),
        db,
        utx.clone(),
        blockchain.clone(),
        Arc::new(ApproveAll),
    )
    .unwrap();
    TestNode {
        matcher: Matcher::new(ctx.clone()),
        ctx,
        utx,
        blockchain,
        clock,
        wallet,
    }
}

fn trader(seed: u8) -> KeyPair {
    KeyPair::from_seed([seed; 32])
}

/// A signed, well-funded order. Timestamps are bumped per order so that
/// otherwise identical orders get distinct ids.
fn signed_order(node: &TestNode, keys: &KeyPair, side: OrderSide, price: u64, amount: u64) -> Order {
    let now = node.clock.millis() + ORDER_SEQ.fetch_add(1, Ordering::SeqCst);
    let mut order = Order {
        sender_public_key: keys.public_key(),
        matcher_public_key: node.wallet.public_key(),
        asset_pair: pair(),
        side,
        price,
        amount,
        matcher_fee: FEE,
        timestamp: now,
        expiration: now + 86_400_000,
        version: 1,
        proofs: vec![],
    };
    order.proofs = vec![Proof(keys.sign(&order.body_bytes()))];
    order
}

fn fund(node: &TestNode, keys: &KeyPair, native: u64, asset: u64) {
    let address = keys.public_key().address();
    node.utx.credit(&address, &None, native);
    node.utx.credit(&address, &Some(btc()), asset);
}

async fn place_ok(node: &TestNode, order: Order) -> Order {
    match node.matcher.place(order.clone()).await {
        PlacementResponse::OrderAccepted(accepted) => accepted,
        other => panic!("placement of {} failed: {:?}", order.id(), other),
    }
}

// ============================================================================
// SCENARIO 1: price-time priority
// ============================================================================

#[tokio::test]
async fn test_three_buys_price_time_priority() {
    let node = test_node();
    let alice = trader(1);
    fund(&node, &alice, u64::MAX / 4, 0);

    place_ok(
        &node,
        signed_order(&node, &alice, OrderSide::Buy, 34_118, 1_583_290_045_643),
    )
    .await;
    place_ok(
        &node,
        signed_order(&node, &alice, OrderSide::Buy, 34_120, 170_484_969),
    )
    .await;
    place_ok(
        &node,
        signed_order(&node, &alice, OrderSide::Buy, 34_000, 44_521_418_496),
    )
    .await;

    let bids = node.matcher.orders(pair(), Some(OrderSide::Buy)).await;
    let prices: Vec<u64> = bids.iter().map(|o| o.price()).collect();
    assert_eq!(prices, vec![34_120, 34_118, 34_000]);

    let snapshot = node.matcher.order_book(&pair()).unwrap();
    assert_eq!(snapshot.best_bid, Some(34_120));
    assert_eq!(snapshot.best_ask, None);
}

// ============================================================================
// SCENARIO 2: partial fill survives a restart
// ============================================================================

#[tokio::test]
async fn test_partial_fill_and_restart() {
    let node = test_node();
    let alice = trader(1);
    let bob = trader(2);
    fund(&node, &alice, 10 * P, 0);
    fund(&node, &bob, P, 20 * P);

    let buy = signed_order(&node, &alice, OrderSide::Buy, 100, 10 * P);
    let sell = signed_order(&node, &bob, OrderSide::Sell, 100, 15 * P);
    place_ok(&node, buy.clone()).await;
    let sell = place_ok(&node, sell).await;

    let check_book = |bids: Vec<dex_matcher::LimitOrder>, asks: Vec<dex_matcher::LimitOrder>| {
        assert!(bids.is_empty());
        assert_eq!(asks.len(), 1);
        assert_eq!(asks[0].amount(), 5 * P);
        assert_eq!(asks[0].fee(), fixedpoint::partial_fee(FEE, 15 * P, 5 * P));
        assert_eq!(asks[0].fee(), 100_000);
        assert_eq!(asks[0].order(), &sell);
    };
    check_book(
        node.matcher.orders(pair(), Some(OrderSide::Buy)).await,
        node.matcher.orders(pair(), Some(OrderSide::Sell)).await,
    );

    // the buy is fully filled, the sell partially
    assert_eq!(
        node.ctx.history.order_status(&buy.id()).unwrap(),
        OrderStatus::Filled(10 * P)
    );
    assert_eq!(
        node.ctx.history.order_status(&sell.id()).unwrap(),
        OrderStatus::PartiallyFilled(10 * P)
    );

    // drop in-memory state and recover from snapshot + journal
    node.matcher.restart_pair(pair()).await;
    check_book(
        node.matcher.orders(pair(), Some(OrderSide::Buy)).await,
        node.matcher.orders(pair(), Some(OrderSide::Sell)).await,
    );
}

// ============================================================================
// SCENARIO 3: dust remainders are swept, fees prorate exactly
// ============================================================================

#[tokio::test]
async fn test_dust_cancel_after_deep_match() {
    let node = test_node();
    let alice = trader(1);
    let bob = trader(2);
    let carol = trader(3);
    fund(&node, &alice, P, 200_000_000_000);
    fund(&node, &bob, P, 4_000_000_000);
    fund(&node, &carol, 10 * P, 0);

    // prices in native units per BTC unit, scaled by the price constant
    let sell_high = signed_order(&node, &alice, OrderSide::Sell, 69_990, 150_000_000_000);
    let sell_low = signed_order(&node, &bob, OrderSide::Sell, 67_634, 3_075_248_828);
    let buy = signed_order(&node, &carol, OrderSide::Buy, 73_697, 3_075_363_900);
    place_ok(&node, sell_high.clone()).await;
    place_ok(&node, sell_low.clone()).await;
    place_ok(&node, buy.clone()).await;

    // first fill consumes the low ask up to its corrected amount; the
    // remainder is below the minimal matchable amount and is swept
    let executed_low = fixedpoint::corrected_amount_of_amount_asset(67_634, 3_075_248_828);
    assert!(
        3_075_248_828 - executed_low
            < fixedpoint::min_amount_of_amount_asset_by_price(67_634)
    );

    // second fill consumes what is left of the buy, corrected at the
    // high ask's price
    let leftover = 3_075_363_900 - executed_low;
    let executed_high = fixedpoint::corrected_amount_of_amount_asset(69_990, leftover);
    assert!(
        leftover - executed_high < fixedpoint::min_amount_of_amount_asset_by_price(69_990)
    );

    let asks = node.matcher.orders(pair(), Some(OrderSide::Sell)).await;
    assert_eq!(asks.len(), 1);
    assert_eq!(asks[0].id(), sell_high.id());
    assert_eq!(asks[0].amount(), 150_000_000_000 - executed_high);
    assert_eq!(
        asks[0].fee(),
        FEE - fixedpoint::partial_fee(FEE, 150_000_000_000, executed_high)
    );

    // bid side is empty: the buy's own remainder was unmatchable
    assert!(node.matcher.orders(pair(), Some(OrderSide::Buy)).await.is_empty());

    // the low ask was removed without being marked canceled
    assert_eq!(
        node.ctx.history.order_status(&sell_low.id()).unwrap(),
        OrderStatus::PartiallyFilled(executed_low)
    );

    // two settlements were emitted
    let accepted = node.utx.accepted();
    assert_eq!(accepted.len(), 2);
    assert_eq!(accepted[0].price, 67_634);
    assert_eq!(accepted[0].amount, executed_low);
    assert_eq!(accepted[1].price, 69_990);
    assert_eq!(accepted[1].amount, executed_high);
}

// ============================================================================
// SCENARIO 4: invalid resting order removed, matching continues
// ============================================================================

#[tokio::test]
async fn test_invalid_counterparty_removed() {
    let node = test_node();
    let alice = trader(1);
    let mallory = trader(2);
    let bob = trader(3);
    fund(&node, &alice, 100 * P, 0);
    fund(&node, &mallory, 10_000 * P, 0);
    fund(&node, &bob, P, 100 * P);

    let good_buy = place_ok(
        &node,
        signed_order(&node, &alice, OrderSide::Buy, 100, 20 * P),
    )
    .await;
    let invalid = signed_order(&node, &mallory, OrderSide::Buy, 5_000, 1_000 * P);
    node.utx.deny_order(invalid.id());
    let invalid = place_ok(&node, invalid).await;

    let sell = place_ok(
        &node,
        signed_order(&node, &bob, OrderSide::Sell, 100, 10 * P),
    )
    .await;

    // the denied bid is gone, the sell filled against the good buy
    let bids = node.matcher.orders(pair(), Some(OrderSide::Buy)).await;
    assert_eq!(bids.len(), 1);
    assert_eq!(bids[0].id(), good_buy.id());
    assert_eq!(bids[0].amount(), 10 * P);
    assert_eq!(
        bids[0].fee(),
        FEE - fixedpoint::partial_fee(FEE, 20 * P, 10 * P)
    );

    assert_eq!(
        node.ctx.history.order_status(&sell.id()).unwrap(),
        OrderStatus::Filled(10 * P)
    );
    let accepted = node.utx.accepted();
    assert_eq!(accepted.len(), 1);
    assert_eq!(accepted[0].price, 100);
    assert_eq!(accepted[0].amount, 10 * P);
    assert!(accepted
        .iter()
        .all(|tx| tx.buy_order.id() != invalid.id() && tx.sell_order.id() != invalid.id()));
}

// ============================================================================
// Rolled-back submitted order: counter must not advance
// ============================================================================

#[tokio::test]
async fn test_rolled_back_submitted_order() {
    let node = test_node();
    let alice = trader(1);
    let bob = trader(2);
    fund(&node, &alice, 100 * P, 0);
    fund(&node, &bob, P, 100 * P);

    let buy = place_ok(
        &node,
        signed_order(&node, &alice, OrderSide::Buy, 100, 20 * P),
    )
    .await;

    let sell = signed_order(&node, &bob, OrderSide::Sell, 100, 10 * P);
    node.utx.deny_order(sell.id());
    match node.matcher.place(sell.clone()).await {
        PlacementResponse::OrderRejected(MatcherError::MatchingRolledBack { order_id, .. }) => {
            assert_eq!(order_id, sell.id().to_string());
        }
        other => panic!("expected rollback, got {:?}", other),
    }

    // the resting buy is untouched and nothing settled
    let bids = node.matcher.orders(pair(), Some(OrderSide::Buy)).await;
    assert_eq!(bids.len(), 1);
    assert_eq!(bids[0].id(), buy.id());
    assert_eq!(bids[0].amount(), 20 * P);
    assert_eq!(bids[0].fee(), FEE);
    assert!(node.utx.accepted().is_empty());
    assert_eq!(
        node.ctx.history.order_status(&buy.id()).unwrap(),
        OrderStatus::Accepted
    );
    // the rolled-back order was never accepted, so it may be resubmitted
    assert_eq!(
        node.ctx.history.order_status(&sell.id()).unwrap(),
        OrderStatus::NotFound
    );
}

// ============================================================================
// SCENARIO 5: expiry sweep
// ============================================================================

#[tokio::test]
async fn test_expiry_sweep_removes_due_orders() {
    let node = test_node();
    let alice = trader(1);
    fund(&node, &alice, 100 * P, 0);

    // expires just after the validator's one-minute margin
    let now = node.clock.millis();
    let mut order = Order {
        sender_public_key: alice.public_key(),
        matcher_public_key: node.wallet.public_key(),
        asset_pair: pair(),
        side: OrderSide::Buy,
        price: 34_118,
        amount: 10_000,
        matcher_fee: FEE,
        timestamp: now,
        expiration: now + 61_000,
        version: 1,
        proofs: vec![],
    };
    order.proofs = vec![Proof(alice.sign(&order.body_bytes()))];
    let order = place_ok(&node, order).await;
    assert_eq!(node.matcher.orders(pair(), Some(OrderSide::Buy)).await.len(), 1);

    // sweep before expiry: nothing happens
    node.matcher.cleanup().await;
    assert_eq!(node.matcher.orders(pair(), Some(OrderSide::Buy)).await.len(), 1);

    // sweep at expiry: removed and recorded as a user-style cancel
    node.clock.advance(61_000);
    node.matcher.cleanup().await;
    assert!(node.matcher.orders(pair(), Some(OrderSide::Buy)).await.is_empty());
    assert_eq!(
        node.ctx.history.order_status(&order.id()).unwrap(),
        OrderStatus::Cancelled(0)
    );
    assert_eq!(
        node.ctx
            .history
            .open_volume(&alice.public_key().address(), &None)
            .unwrap(),
        0
    );
}

// ============================================================================
// SCENARIO 6: smart-account trading gate
// ============================================================================

#[tokio::test]
async fn test_smart_account_trading_gate() {
    let node = test_node();
    let bob = trader(2);
    fund(&node, &bob, 100 * P, 0);

    node.blockchain.set_account_script(
        bob.public_key().address(),
        Script {
            text: "sigVerify(tx.bodyBytes, tx.proofs[0], tx.senderPublicKey)".to_string(),
        },
    );
    node.blockchain
        .activate_feature(SMART_ACCOUNT_TRADING_FEATURE, 200);

    let order = signed_order(&node, &bob, OrderSide::Buy, 34_118, 10_000);
    match node.matcher.place(order.clone()).await {
        PlacementResponse::OrderRejected(MatcherError::ValidationFailure(reason)) => {
            assert_eq!(reason, "Trading on scripted account isn't allowed yet.");
        }
        other => panic!("expected gating rejection, got {:?}", other),
    }

    // the chain reaches the activation height; the same placement passes
    node.blockchain.set_height(200);
    place_ok(&node, order).await;
    assert_eq!(node.matcher.orders(pair(), Some(OrderSide::Buy)).await.len(), 1);
}

// ============================================================================
// Cancellation path
// ============================================================================

#[tokio::test]
async fn test_cancel_flow() {
    let node = test_node();
    let alice = trader(1);
    let eve = trader(5);
    fund(&node, &alice, 100 * P, 0);

    let order = place_ok(
        &node,
        signed_order(&node, &alice, OrderSide::Buy, 34_118, 10_000),
    )
    .await;

    // only the owner may cancel
    match node
        .matcher
        .cancel(pair(), eve.public_key(), order.id())
        .await
    {
        CancelResponse::OrderCancelRejected(reason) => {
            assert_eq!(reason, "Order can be canceled only by its owner");
        }
        other => panic!("expected rejection, got {:?}", other),
    }

    match node
        .matcher
        .cancel(pair(), alice.public_key(), order.id())
        .await
    {
        CancelResponse::OrderCanceled(id) => assert_eq!(id, order.id().to_string()),
        other => panic!("expected cancel, got {:?}", other),
    }
    assert!(node.matcher.orders(pair(), Some(OrderSide::Buy)).await.is_empty());

    // a second cancel is rejected: the order is already terminal
    match node
        .matcher
        .cancel(pair(), alice.public_key(), order.id())
        .await
    {
        CancelResponse::OrderCancelRejected(_) => {}
        other => panic!("expected rejection, got {:?}", other),
    }
}

// ============================================================================
// Reservations gate placements (P2)
// ============================================================================

#[tokio::test]
async fn test_open_volume_blocks_second_order() {
    let node = test_node();
    let alice = trader(1);
    // exactly enough for one buy: spend 3_411 + fee 300_000
    let spend = fixedpoint::amount_of_price_asset(10_000_000, 34_118);
    fund(&node, &alice, spend + FEE, 0);

    place_ok(
        &node,
        signed_order(&node, &alice, OrderSide::Buy, 34_118, 10_000_000),
    )
    .await;

    let second = signed_order(&node, &alice, OrderSide::Buy, 34_118, 10_000_000);
    match node.matcher.place(second).await {
        PlacementResponse::OrderRejected(MatcherError::ValidationFailure(reason)) => {
            assert!(reason.starts_with("Not enough tradable balance:"), "{}", reason);
        }
        other => panic!("expected balance rejection, got {:?}", other),
    }
}
