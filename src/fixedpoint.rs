// ============================================================================
// Fixed-Point Price Arithmetic
// ============================================================================
//
// All price-scaled operations use a single global constant: prices are
// expressed in price-asset units per amount-asset unit, scaled by 10^8.
// Every node must round identically, so intermediate products are carried
// in u128 and results truncate or round exactly as specified here. No
// floating point is permitted anywhere on this path.
//
// ============================================================================

/// Price scaling constant: 10^8 price units per amount unit.
pub const PRICE_CONSTANT: u128 = 100_000_000;

/// Upper bound on order amounts (10^8 units of 10^8 subunits).
pub const MAX_AMOUNT: u64 = 10_000_000_000_000_000;

/// Price-asset value of `amount` at `price`, rounded down.
pub fn amount_of_price_asset(amount: u64, price: u64) -> u64 {
    (amount as u128 * price as u128 / PRICE_CONSTANT) as u64
}

/// The smallest amount-asset quantity that maps to at least one price-asset
/// unit at `price`: ceil(PRICE_CONSTANT / price).
pub fn min_amount_of_amount_asset_by_price(price: u64) -> u64 {
    let p = price as u128;
    ((PRICE_CONSTANT + p - 1) / p) as u64
}

/// The smallest amount that settles the same integer price-asset quantity
/// as `amount` at `price`: ceil(floor(amount * price / P) * P / price).
/// Executing this corrected amount instead of the raw one keeps residual
/// dust that cannot settle an integer quantity off the book.
pub fn corrected_amount_of_amount_asset(price: u64, amount: u64) -> u64 {
    let p = price as u128;
    let price_asset_units = amount as u128 * p / PRICE_CONSTANT;
    let scaled = price_asset_units * PRICE_CONSTANT;
    ((scaled + p - 1) / p) as u64
}

/// Fee owed for a partial execution, prorated over the original order
/// amount. Truncates.
pub fn partial_fee(total_fee: u64, total_amount: u64, partial_amount: u64) -> u64 {
    (total_fee as u128 * partial_amount as u128 / total_amount as u128) as u64
}

// ============================================================================
// TESTS
// ============================================================================
