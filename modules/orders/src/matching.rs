use crate::book::{BookRef, OrderBook};
use crate::types::{LimitOrder, MarginOrder, OrderView};
use chain_primitives::{AccountName, Amount, Asset, AssetSymbol, Price};
use object_store::Table;
use std::cmp::Ordering;

/// One resting order consumed by an incoming order. `gave`/`took` are from the
/// taker's perspective: it gave `gave` and received `took`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fill {
	pub maker: BookRef,
	pub maker_owner: AccountName,
	pub gave: Asset,
	pub took: Asset,
}

/// Matches an incoming sell of `sell_symbol` for `buy_symbol` at `limit`
/// against the resting book of sells of `buy_symbol` for `sell_symbol`,
/// best price first, until the incoming order is filled, the book is
/// exhausted, or the best remaining maker price no longer crosses `limit`
///. Settles each fill at the maker's fixed price.
/// Mutates `remaining` down as it fills and returns the list of fills;
/// callers apply the resulting deltas to account balances and asset
/// supply compartments.
#[allow(clippy::too_many_arguments)]
pub fn match_against_book(
	book: &OrderBook,
	limit_orders: &Table<LimitOrder>,
	margin_orders: &Table<MarginOrder>,
	sell_symbol: AssetSymbol,
	buy_symbol: AssetSymbol,
	limit: Price,
	remaining: &mut Amount,
) -> Vec<Fill> {
	let mut fills = Vec::new();
	for maker_ref in book.iter_side(buy_symbol, sell_symbol) {
		if !remaining.is_positive() {
			break;
		}
		let (maker_owner, maker_price, maker_for_sale) = match maker_ref {
			BookRef::Limit(id) => match limit_orders.find(id) {
				Some(o) => (o.owner, o.price(), o.for_sale_amount()),
				None => continue,
			},
			BookRef::Margin(id) => match margin_orders.find(id) {
				Some(o) => (o.owner, o.price(), o.for_sale_amount()),
				None => continue,
			},
		};
		// `maker_price`: base = buy_symbol, quote = sell_symbol. Invert to
		// the taker's orientation (base = sell_symbol, quote = buy_symbol)
		// to compare against `limit` and to convert remaining sell-side
		// amounts into the maker's asset.
		let inv = maker_price.invert();
		if inv.cross_compare(&limit) == Some(Ordering::Less) {
			break;
		}

		let max_buy_from_remaining = match inv.convert(Asset { amount: *remaining, symbol: sell_symbol }) {
			Some(a) => a.amount,
			None => break,
		};
		let fill_buy = if max_buy_from_remaining.0 < maker_for_sale.0 { max_buy_from_remaining } else { maker_for_sale };
		if !fill_buy.is_positive() {
			continue;
		}
		let fill_sell = match maker_price.convert(Asset { amount: fill_buy, symbol: buy_symbol }) {
			Some(a) => a.amount,
			None => continue,
		};
		if !fill_sell.is_positive() {
			continue;
		}

		*remaining = Amount(remaining.0 - fill_sell.0);
		fills.push(Fill {
			maker: maker_ref,
			maker_owner,
			gave: Asset { amount: fill_sell, symbol: sell_symbol },
			took: Asset { amount: fill_buy, symbol: buy_symbol },
		});
	}
	fills
}
