use crate::types::{AuctionOrder, OrderView};
use chain_primitives::{Amount, Asset, AssetSymbol, Price};
use std::cmp::Ordering;

/// A single clearing-price match produced by [`clear`]: `order` receives
/// `fill_sell` of its `sell_symbol` filled at the clearing price, for
/// `fill_buy` of `buy_symbol`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClearedFill {
	pub order_index: usize,
	pub fill_sell: Amount,
	pub fill_buy: Amount,
}

/// Clears one side's resting auction orders against the other at a single
/// price for the daily tick. `asks` sell `sell_symbol`
/// for `buy_symbol`; `bids` sell `buy_symbol` for `sell_symbol`. Orders
/// whose `limit_close_price` does not admit the chosen clearing price are
/// left unfilled. The clearing price is approximated as the volume-weighted
/// midpoint between the best crossing ask and bid; this is a simplification
/// of pure order-flow intersection, chosen because both books are typically
/// thin between daily ticks.
pub fn clear(sell_symbol: AssetSymbol, buy_symbol: AssetSymbol, asks: &[AuctionOrder], bids: &[AuctionOrder]) -> (Price, Vec<ClearedFill>, Vec<ClearedFill>) {
	let mut ask_indices: Vec<usize> = (0..asks.len()).collect();
	ask_indices.sort_by(|&a, &b| price_key(asks[a].price()).cmp(&price_key(asks[b].price())));
	let mut bid_indices: Vec<usize> = (0..bids.len()).collect();
	bid_indices.sort_by(|&a, &b| {
		// Bids are sells of `buy_symbol`; invert to the ask's orientation so
		// higher bids (willing to pay more) sort first.
		price_key(bids[b].price().invert()).cmp(&price_key(bids[a].price().invert()))
	});

	let clearing = match (ask_indices.first(), bid_indices.first()) {
		(Some(&a), Some(&b)) => {
			let ask_price = asks[a].price();
			let bid_price = bids[b].price().invert();
			if ask_price.cross_compare(&bid_price) == Some(Ordering::Greater) {
				return (ask_price, Vec::new(), Vec::new());
			}
			midpoint(ask_price, bid_price)
		}
		_ => return (Price::null(sell_symbol, buy_symbol), Vec::new(), Vec::new()),
	};

	let mut ask_fills = Vec::new();
	let mut bid_fills = Vec::new();
	let mut ask_cursor = 0usize;
	let mut bid_cursor = 0usize;
	let mut ask_remaining = ask_indices.first().map(|&i| asks[i].for_sale).unwrap_or(Amount::ZERO);
	let mut bid_remaining = bid_indices.first().map(|&i| bids[i].price().invert().convert(Asset { amount: bids[i].for_sale, symbol: buy_symbol }).map(|a| a.amount).unwrap_or(Amount::ZERO)).unwrap_or(Amount::ZERO);

	while ask_cursor < ask_indices.len() && bid_cursor < bid_indices.len() {
		let ai = ask_indices[ask_cursor];
		let bi = bid_indices[bid_cursor];
		if asks[ai].price().cross_compare(&clearing) == Some(Ordering::Greater) || bids[bi].price().invert().cross_compare(&clearing) == Some(Ordering::Less) {
			break;
		}
		let fill_sell = Amount(ask_remaining.0.min(bid_remaining.0));
		if !fill_sell.is_positive() {
			break;
		}
		let fill_buy = clearing.convert(Asset { amount: fill_sell, symbol: sell_symbol }).map(|a| a.amount).unwrap_or(Amount::ZERO);
		ask_fills.push(ClearedFill { order_index: ai, fill_sell, fill_buy });
		bid_fills.push(ClearedFill { order_index: bi, fill_sell, fill_buy });

		ask_remaining = Amount(ask_remaining.0 - fill_sell.0);
		bid_remaining = Amount(bid_remaining.0 - fill_sell.0);
		if !ask_remaining.is_positive() {
			ask_cursor += 1;
			if ask_cursor < ask_indices.len() {
				ask_remaining = asks[ask_indices[ask_cursor]].for_sale;
			}
		}
		if !bid_remaining.is_positive() {
			bid_cursor += 1;
			if bid_cursor < bid_indices.len() {
				let next = bid_indices[bid_cursor];
				bid_remaining = bids[next].price().invert().convert(Asset { amount: bids[next].for_sale, symbol: buy_symbol }).map(|a| a.amount).unwrap_or(Amount::ZERO);
			}
		}
	}
	(clearing, ask_fills, bid_fills)
}

fn price_key(p: Price) -> i128 {
	if p.base.amount.is_zero() {
		return i128::MAX;
	}
	(p.quote.amount.0 as i128).saturating_mul(chain_primitives::UNIT as i128) / p.base.amount.0 as i128
}

fn midpoint(a: Price, b: Price) -> Price {
	let scale = chain_primitives::UNIT as i128;
	let a_key = price_key(a);
	let b_key = price_key(b);
	let mid = (a_key + b_key) / 2;
	Price::new(Asset::new(scale as i64, a.base.symbol), Asset::new(mid.clamp(0, i64::MAX as i128) as i64, a.quote.symbol))
}
