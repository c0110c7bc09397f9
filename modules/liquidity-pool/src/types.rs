use chain_primitives::{Amount, Asset, AssetSymbol, Price};
use std::collections::VecDeque;

/// Number of ten-minute samples retained in `price_history`.
pub const PRICE_HISTORY_LEN: usize = 144;
/// Samples per rolling hour, for `hour_median_price`.
pub const SAMPLES_PER_HOUR: usize = 6;

/// A constant-product liquidity pool between `symbol_a` and `symbol_b`,
/// backed by an LP share asset `symbol_liquid`.
///
/// `symbol_a`/`symbol_b` are in canonical order: the core asset first if
/// either side is the core asset, lower symbol first otherwise — so the
/// pair `(symbol_a, symbol_b)` uniquely identifies the pool regardless of
/// the order callers name the two assets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LiquidityPool {
	pub symbol_a: AssetSymbol,
	pub symbol_b: AssetSymbol,
	pub symbol_liquid: AssetSymbol,
	pub balance_a: Amount,
	pub balance_b: Amount,
	pub hour_median_price: Price,
	pub day_median_price: Price,
	pub price_history: VecDeque<Price>,
}

impl LiquidityPool {
	/// The current spot price, `balance_a` in terms of `balance_b`.
	pub fn current_price(&self) -> Price {
		Price::new(Asset::new(self.balance_a.0, self.symbol_a), Asset::new(self.balance_b.0, self.symbol_b))
	}

	pub fn balance_of(&self, symbol: AssetSymbol) -> Option<Amount> {
		if symbol == self.symbol_a {
			Some(self.balance_a)
		} else if symbol == self.symbol_b {
			Some(self.balance_b)
		} else {
			None
		}
	}

	pub fn other_symbol(&self, symbol: AssetSymbol) -> Option<AssetSymbol> {
		if symbol == self.symbol_a {
			Some(self.symbol_b)
		} else if symbol == self.symbol_b {
			Some(self.symbol_a)
		} else {
			None
		}
	}
}

/// Result of a completed exchange against one or more pools.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExchangeReceipt {
	pub sold: Asset,
	pub received: Asset,
	pub fee: Asset,
	pub hops: Vec<AssetSymbol>,
}
