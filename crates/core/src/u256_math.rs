//! U256 fixed-point arithmetic for liquidation calculations.
//!
//! Chain quantities are `u128` mantissas, but products such as
//! `voucher * exchange_rate * price` overflow 128 bits long before the
//! final division. Every helper here widens to U256, multiplies first and
//! divides last. All divisions truncate toward zero.

use alloy_primitives::U256;

/// Scale of `Rate` values (`FixedU128`): 10^18.
pub const RATE_SCALE: U256 = U256::from_limbs([1_000_000_000_000_000_000u64, 0, 0, 0]);

/// Scale of `Ratio` values (`Permill`): 10^6.
pub const PERMILL_SCALE: U256 = U256::from_limbs([1_000_000u64, 0, 0, 0]);

/// Pre-computed powers of 10 for fast decimal conversion
const POW10: [u128; 39] = [
    1,
    10,
    100,
    1_000,
    10_000,
    100_000,
    1_000_000,
    10_000_000,
    100_000_000,
    1_000_000_000,
    10_000_000_000,
    100_000_000_000,
    1_000_000_000_000,
    10_000_000_000_000,
    100_000_000_000_000,
    1_000_000_000_000_000,
    10_000_000_000_000_000,
    100_000_000_000_000_000,
    1_000_000_000_000_000_000,
    10_000_000_000_000_000_000,
    100_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000_000_000_000_000,
];

/// Fast power of 10 lookup (up to 10^38)
#[inline(always)]
pub fn pow10(exp: u8) -> U256 {
    if exp < 39 {
        U256::from(POW10[exp as usize])
    } else {
        U256::from(10u64).pow(U256::from(exp))
    }
}

/// Price of one smallest unit of an asset: `price / 10^decimal`.
///
/// `price` is the oracle mantissa for one whole token (18 decimals).
#[inline(always)]
pub fn unit_price(price: u128, decimal: u8) -> U256 {
    U256::from(price) / pow10(decimal)
}

/// Value of a deposit: `voucher * exchange_rate * unit_price / 10^18`.
#[inline(always)]
pub fn supply_value(voucher_balance: u128, exchange_rate: u128, unit_price: U256) -> U256 {
    if voucher_balance == 0 || unit_price.is_zero() {
        return U256::ZERO;
    }
    U256::from(voucher_balance) * U256::from(exchange_rate) * unit_price / RATE_SCALE
}

/// Value of a borrow: `principal * current_index / snapshot_index * unit_price`.
///
/// Returns zero when there is no snapshot (`snapshot_index == 0`).
#[inline(always)]
pub fn debt_value(
    principal: u128,
    current_index: u128,
    snapshot_index: u128,
    unit_price: U256,
) -> U256 {
    if snapshot_index == 0 || principal == 0 {
        return U256::ZERO;
    }
    U256::from(principal) * U256::from(current_index) * unit_price / U256::from(snapshot_index)
}

/// Collateral value that can be seized after the incentive premium:
/// `value * 10^18 / incentive`.
///
/// A zero incentive is malformed market data and caps at zero.
#[inline(always)]
pub fn cap_by_incentive(collateral_value: U256, liquidate_incentive: u128) -> U256 {
    if liquidate_incentive == 0 {
        return U256::ZERO;
    }
    collateral_value * RATE_SCALE / U256::from(liquidate_incentive)
}

/// Close-factor-limited share of a debt: `value * close_factor / 10^6`.
#[inline(always)]
pub fn cap_by_close_factor(debt_value: U256, close_factor: u32) -> U256 {
    debt_value * U256::from(close_factor) / PERMILL_SCALE
}

/// Convert a value back into smallest units of the asset priced at `unit_price`.
#[inline(always)]
pub fn to_native_units(value: U256, unit_price: U256) -> U256 {
    if unit_price.is_zero() {
        return U256::ZERO;
    }
    value / unit_price
}

/// Whole tokens in `amount` smallest units.
#[inline(always)]
pub fn whole_units(amount: u128, decimal: u8) -> U256 {
    U256::from(amount) / pow10(decimal)
}

/// Narrow to `u128`, saturating at `u128::MAX`.
#[inline(always)]
pub fn saturating_u128(value: U256) -> u128 {
    value.saturating_to::<u128>()
}

/// Safe minimum of two U256 values
#[inline(always)]
pub fn min(a: U256, b: U256) -> U256 {
    if a < b {
        a
    } else {
        b
    }
}
