use crate::types::{LimitOrder, MarginOrder};
use chain_primitives::{AssetSymbol, Price, UNIT};
use object_store::Id;
use std::collections::BTreeMap;

const PRECISION: i128 = UNIT as i128;

/// A sortable approximation of `price` (buy-per-sell rate scaled by `UNIT`),
/// used purely as a `BTreeMap` ordering key — matching decisions still use
/// `Price::cross_compare` for exactness.
pub fn price_key(price: Price) -> i128 {
	if price.base.amount.is_zero() {
		return i128::MAX;
	}
	(price.quote.amount.0 as i128).saturating_mul(PRECISION) / price.base.amount.0 as i128
}

/// Either a resting limit order or a margin order's standing sell leg — the
/// two kinds of orders that occupy the shared book.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BookRef {
	Limit(Id<LimitOrder>),
	Margin(Id<MarginOrder>),
}

/// One side of the book for a `(sell_symbol, buy_symbol)` pair, ordered by
/// `(price_key, order_id)` ascending — cheapest sell first, ties broken by
/// earlier order id.
#[derive(Clone, Debug, Default)]
pub struct OrderBook {
	sides: BTreeMap<(AssetSymbol, AssetSymbol), BTreeMap<(i128, u64), BookRef>>,
}

impl OrderBook {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert(&mut self, sell: AssetSymbol, buy: AssetSymbol, order_id: u64, price: Price, order: BookRef) {
		self.sides.entry((sell, buy)).or_default().insert((price_key(price), order_id), order);
	}

	pub fn remove(&mut self, sell: AssetSymbol, buy: AssetSymbol, order_id: u64, price: Price) {
		if let Some(side) = self.sides.get_mut(&(sell, buy)) {
			side.remove(&(price_key(price), order_id));
			if side.is_empty() {
				self.sides.remove(&(sell, buy));
			}
		}
	}

	/// The best (cheapest) resting sell of `sell` for `buy`, if any.
	pub fn best(&self, sell: AssetSymbol, buy: AssetSymbol) -> Option<BookRef> {
		self.sides.get(&(sell, buy)).and_then(|side| side.values().next().copied())
	}

	/// All resting orders on one side, best-first.
	pub fn iter_side(&self, sell: AssetSymbol, buy: AssetSymbol) -> impl Iterator<Item = BookRef> + '_ {
		self.sides.get(&(sell, buy)).into_iter().flat_map(|side| side.values().copied())
	}
}
