//! On-chain data types for the loans and oracle pallets.
//!
//! Storage values are SCALE-decoded into these types; RPC results are
//! deserialized from JSON. Fixed-point quantities are kept as raw integer
//! mantissas (`Rate` is scaled by 10^18, `Ratio` by 10^6).

use codec::Decode;
use serde::{de, Deserialize, Deserializer};
use std::fmt;

/// Asset identifier used by the loans and assets pallets.
pub type CurrencyId = u32;

/// Token amount in the asset's smallest unit.
pub type Balance = u128;

/// Fixed-point rate, 18 decimals (`FixedU128` inner value).
pub type Rate = u128;

/// Fraction in parts per million (`Permill` inner value).
pub type Ratio = u32;

/// 32-byte SS58 account.
pub type AccountId = subxt::utils::AccountId32;

/// Market activation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Decode)]
pub enum MarketState {
    Active,
    Pending,
    Supervision,
}

/// Jump interest rate model parameters.
#[derive(Debug, Clone, PartialEq, Eq, Decode)]
pub struct JumpModel {
    pub base_rate: Rate,
    pub jump_rate: Rate,
    pub full_rate: Rate,
    pub jump_utilization: Ratio,
}

/// Curve interest rate model parameters.
#[derive(Debug, Clone, PartialEq, Eq, Decode)]
pub struct CurveModel {
    pub base_rate: Rate,
}

#[derive(Debug, Clone, PartialEq, Eq, Decode)]
pub enum InterestRateModel {
    Jump(JumpModel),
    Curve(CurveModel),
}

/// Lending market configuration as stored in `Loans.Markets`.
///
/// This is the loans pallet layout that carries liquidation thresholds,
/// liquidate-incentive reserves, supply/borrow caps and the ptoken id: the
/// runtime that also serves `loans_getLiquidationThresholdLiquidity`. The
/// earlier six-field layout (no threshold, caps or ptoken) does not decode.
#[derive(Debug, Clone, PartialEq, Eq, Decode)]
pub struct Market {
    pub collateral_factor: Ratio,
    pub liquidation_threshold: Ratio,
    pub reserve_factor: Ratio,
    /// Max fraction of a borrow repayable in one liquidation.
    pub close_factor: Ratio,
    /// Premium paid to the liquidator (>= 1.0).
    pub liquidate_incentive: Rate,
    pub liquidate_incentive_reserved_factor: Ratio,
    pub rate_model: InterestRateModel,
    pub state: MarketState,
    pub supply_cap: Balance,
    pub borrow_cap: Balance,
    pub ptoken_id: CurrencyId,
}

impl Market {
    pub fn is_active(&self) -> bool {
        self.state == MarketState::Active
    }
}

/// Supplied position of an account in one market.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Decode)]
pub struct Deposits {
    pub voucher_balance: Balance,
    pub is_collateral: bool,
}

/// Borrowed position of an account in one market.
///
/// `borrow_index == 0` means the account never borrowed this asset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Decode)]
pub struct BorrowSnapshot {
    pub principal: Balance,
    pub borrow_index: Rate,
}

/// `Assets.Metadata` entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Decode)]
pub struct AssetMetadata {
    pub deposit: Balance,
    pub name: Vec<u8>,
    pub symbol: Vec<u8>,
    pub decimals: u8,
    pub is_frozen: bool,
}

/// Result of `loans_getLiquidationThresholdLiquidity`.
///
/// All four values are in common price units (18 decimals). The `lf_*`
/// pair accounts for the liquidation-free reserve asset, which is kept out
/// of ordinary collateral accounting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "RawThresholdLiquidity")]
pub struct ThresholdLiquidity {
    pub liquidity: u128,
    pub shortfall: u128,
    pub lf_liquidity: u128,
    pub lf_shortfall: u128,
}

impl ThresholdLiquidity {
    /// Shortfall corrected for the liquidation-free reserve asset.
    pub fn effective_shortfall(&self) -> u128 {
        if self.shortfall > 0 {
            self.shortfall.saturating_add(self.lf_liquidity)
        } else {
            self.lf_liquidity.saturating_sub(self.liquidity)
        }
    }

    pub fn is_liquidatable(&self) -> bool {
        self.effective_shortfall() > 0
    }
}

#[derive(Deserialize)]
struct RawThresholdLiquidity(
    #[serde(deserialize_with = "de_u128")] u128,
    #[serde(deserialize_with = "de_u128")] u128,
    #[serde(deserialize_with = "de_u128")] u128,
    #[serde(deserialize_with = "de_u128")] u128,
);

impl From<RawThresholdLiquidity> for ThresholdLiquidity {
    fn from(raw: RawThresholdLiquidity) -> Self {
        Self {
            liquidity: raw.0,
            shortfall: raw.1,
            lf_liquidity: raw.2,
            lf_shortfall: raw.3,
        }
    }
}

/// Oracle value returned by `oracle_getValue`.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TimestampedValue {
    #[serde(deserialize_with = "de_u128")]
    pub value: u128,
    #[serde(default)]
    pub timestamp: u64,
}

/// Accepts a JSON integer, a decimal string or a `0x` hex string.
///
/// Node RPCs serialize fixed-point values as strings, so large mantissas
/// never go through `f64`.
pub fn de_u128<'de, D>(deserializer: D) -> Result<u128, D::Error>
where
    D: Deserializer<'de>,
{
    struct U128Visitor;

    impl<'de> de::Visitor<'de> for U128Visitor {
        type Value = u128;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("an unsigned integer, decimal string or hex string")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<u128, E> {
            Ok(v as u128)
        }

        fn visit_u128<E: de::Error>(self, v: u128) -> Result<u128, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<u128, E> {
            u128::try_from(v).map_err(|_| E::custom(format!("negative value {v}")))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<u128, E> {
            let v = v.trim();
            if let Some(hex) = v.strip_prefix("0x") {
                u128::from_str_radix(hex, 16).map_err(E::custom)
            } else {
                v.replace(',', "").parse::<u128>().map_err(E::custom)
            }
        }
    }

    deserializer.deserialize_any(U128Visitor)
}
