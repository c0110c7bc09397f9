use crate::auction;
use crate::book::{BookRef, OrderBook};
use crate::call;
use crate::margin;
use crate::matching::{self, Fill};
use crate::option;
use crate::types::{AuctionOrder, CallOrder, LimitOrder, MarginOrder, OptionOrder, OrderView, StrikeDescriptor};
use chain_primitives::{AccountName, Amount, AssetSymbol, Price, Time};
use chain_support::{ChainError, ChainResult, Parameters};
use module_assets::AssetRegistryState;
use module_credit_pool::{CreditPool, CreditPoolState};
use module_liquidity_pool::LiquidityPoolState;
use object_store::{Id, Table};
use std::collections::BTreeMap;

/// One filled leg of a [`OrdersState::clear_auctions`] tick, in the filled
/// order's own orientation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AuctionSettlement {
	pub id: Id<AuctionOrder>,
	pub owner: AccountName,
	pub sell_symbol: AssetSymbol,
	pub buy_symbol: AssetSymbol,
	/// Amount of `sell_symbol` that left the owner's balance.
	pub gave: Amount,
	/// Amount of `buy_symbol` owed back to the owner.
	pub received: Amount,
}

/// The order book and matching engine's tables and indices. Limit orders and margin orders' standing sell legs share
/// one [`OrderBook`]; auction, call, and option orders are matched by their
/// own scheduled mechanisms rather than resting continuously in the book.
#[derive(Clone, Debug, Default)]
pub struct OrdersState {
	book: OrderBook,
	limit_orders: Table<LimitOrder>,
	margin_orders: Table<MarginOrder>,
	auction_orders: Table<AuctionOrder>,
	call_orders: Table<CallOrder>,
	option_orders: Table<OptionOrder>,
	/// Rolling strike sheet per underlying/strike asset pair.
	option_chains: BTreeMap<(AssetSymbol, AssetSymbol), Vec<StrikeDescriptor>>,
	/// Per debt-asset pot accumulated during global settlement.
	settlement_funds: BTreeMap<AssetSymbol, Amount>,
}

impl OrdersState {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn limit_order(&self, id: Id<LimitOrder>) -> ChainResult<&LimitOrder> {
		self.limit_orders.get(id)
	}

	pub fn margin_order(&self, id: Id<MarginOrder>) -> ChainResult<&MarginOrder> {
		self.margin_orders.get(id)
	}

	pub fn call_order(&self, id: Id<CallOrder>) -> ChainResult<&CallOrder> {
		self.call_orders.get(id)
	}

	pub fn option_order(&self, id: Id<OptionOrder>) -> ChainResult<&OptionOrder> {
		self.option_orders.get(id)
	}

	/// Zeroes a liquidated call order's remaining collateral and returns the
	/// prior value, so the maintenance sweep can credit it back to the
	/// borrower exactly once.
	pub fn drain_call_order_collateral(&mut self, id: Id<CallOrder>) -> ChainResult<Amount> {
		let (before, _) = self.call_orders.modify(id, |o| o.collateral = Amount::ZERO)?;
		Ok(before.collateral)
	}

	/// Zeroes a force-closed margin order's final collateral balance and
	/// returns the prior value, so the maintenance sweep can credit it back
	/// to the owner exactly once.
	pub fn drain_margin_order_collateral(&mut self, id: Id<MarginOrder>) -> ChainResult<Amount> {
		let (before, _) = self.margin_orders.modify(id, |o| o.collateral = Amount::ZERO)?;
		Ok(before.collateral)
	}

	/// Submits a limit order, matching it against the resting book
	/// best-first before inserting any remainder.
	/// `fill_or_kill` orders that do not fully fill are rejected rather than
	/// rested.
	pub fn submit_limit_order(
		&mut self,
		owner: AccountName,
		sell_symbol: AssetSymbol,
		buy_symbol: AssetSymbol,
		price: Price,
		for_sale: Amount,
		fill_or_kill: bool,
		expiration: Time,
	) -> ChainResult<(Option<Id<LimitOrder>>, Vec<Fill>)> {
		if !for_sale.is_positive() {
			return Err(ChainError::InvariantViolation("limit order for_sale must be positive".into()));
		}
		let mut remaining = for_sale;
		let fills = matching::match_against_book(&self.book, &self.limit_orders, &self.margin_orders, sell_symbol, buy_symbol, price, &mut remaining);
		for fill in &fills {
			self.shrink_maker(fill)?;
		}

		if remaining.is_positive() {
			if fill_or_kill {
				return Err(ChainError::InvariantViolation("fill-or-kill limit order did not fully fill".into()));
			}
			let order = LimitOrder { owner, sell_symbol, buy_symbol, price, for_sale: remaining, fill_or_kill, expiration };
			let (id, inserted) = self.limit_orders.create(|_| order);
			self.book.insert(sell_symbol, buy_symbol, id.value(), inserted.price, BookRef::Limit(id));
			Ok((Some(id), fills))
		} else {
			Ok((None, fills))
		}
	}

	/// Cancels a resting limit order, removing it from the book.
	pub fn cancel_limit_order(&mut self, id: Id<LimitOrder>) -> ChainResult<LimitOrder> {
		let order = self.limit_orders.remove(id)?;
		self.book.remove(order.sell_symbol, order.buy_symbol, id.value(), order.price);
		Ok(order)
	}

	fn shrink_maker(&mut self, fill: &matching::Fill) -> ChainResult<()> {
		// `fill.took` is denominated in the maker's own sell_symbol (what the
		// maker gave up); `fill.gave` is denominated in the maker's own
		// buy_symbol (what the maker received in return).
		match fill.maker {
			BookRef::Limit(id) => {
				let (_, after) = self.limit_orders.modify(id, |o| o.for_sale = Amount(o.for_sale.0 - fill.took.amount.0))?;
				if !after.for_sale.is_positive() {
					self.limit_orders.remove(id)?;
					self.book.remove(after.sell_symbol, after.buy_symbol, id.value(), after.price);
				}
			}
			BookRef::Margin(id) => {
				let (_, after) = self.margin_orders.modify(id, |o| {
					o.debt = Amount(o.debt.0 - fill.took.amount.0);
					o.position = Amount(o.position.0.saturating_add(fill.gave.amount.0));
				})?;
				if !after.debt.is_positive() {
					self.book.remove(after.debt_symbol, after.position_symbol, id.value(), after.price);
				}
			}
		}
		Ok(())
	}

	/// Opens a margin order, borrowing debt from the credit pool and
	/// resting the standing sell leg in the shared book.
	#[allow(clippy::too_many_arguments)]
	pub fn submit_margin_order(
		&mut self,
		credit_pools: &mut CreditPoolState,
		params: &Parameters,
		credit_pool_id: Id<CreditPool>,
		owner: AccountName,
		debt_symbol: AssetSymbol,
		position_symbol: AssetSymbol,
		collateral_symbol: AssetSymbol,
		collateral: Amount,
		debt: Amount,
		exchange_rate: Price,
		collateral_price: Price,
		now: Time,
	) -> ChainResult<Id<MarginOrder>> {
		let order = margin::open(
			credit_pools,
			params,
			credit_pool_id,
			owner,
			debt_symbol,
			position_symbol,
			collateral_symbol,
			collateral,
			debt,
			exchange_rate,
			collateral_price,
			now,
		)?;
		let price = order.price;
		let (id, _) = self.margin_orders.create(|_| order);
		self.book.insert(debt_symbol, position_symbol, id.value(), price, BookRef::Margin(id));
		Ok(id)
	}

	/// Accrues interest on every open margin order and force-closes any
	/// that fall below maintenance collateralization.
	pub fn sweep_margin_liquidations(
		&mut self,
		credit_pools: &mut CreditPoolState,
		pools: &mut LiquidityPoolState,
		registry: &mut AssetRegistryState,
		params: &Parameters,
		collateral_price_of: impl Fn(AssetSymbol, AssetSymbol) -> Option<Price>,
		now: Time,
	) -> ChainResult<Vec<Id<MarginOrder>>> {
		let ids: Vec<Id<MarginOrder>> = self.margin_orders.iter().filter(|(_, o)| !o.closed).map(|(id, _)| id).collect();
		let mut closed = Vec::new();
		for id in ids {
			let mut order = self.margin_orders.get(id)?.clone();
			let collateral_price = match collateral_price_of(order.collateral_symbol, order.debt_symbol) {
				Some(p) => p,
				None => continue,
			};
			let below_maintenance = margin::accrue_and_check(&mut order, credit_pools, params, order.credit_pool_id, collateral_price, now)?;
			self.margin_orders.modify(id, |o| *o = order.clone())?;
			if below_maintenance {
				self.book.remove(order.debt_symbol, order.position_symbol, id.value(), order.price);
				let mut closing = order.clone();
				margin::force_close(&mut closing, pools, registry, credit_pools, order.credit_pool_id, params, now)?;
				self.margin_orders.modify(id, |o| *o = closing)?;
				closed.push(id);
			}
		}
		Ok(closed)
	}

	/// Submits a standing auction order for the next daily clearing tick.
	pub fn submit_auction_order(&mut self, order: AuctionOrder) -> ChainResult<Id<AuctionOrder>> {
		if !order.for_sale.is_positive() {
			return Err(ChainError::InvariantViolation("auction order for_sale must be positive".into()));
		}
		let (id, _) = self.auction_orders.create(|_| order);
		Ok(id)
	}

	/// Runs the daily auction clearing tick for one asset pair, matching
	/// resting orders at a single clearing price and removing fully filled
	/// orders.
	///
	/// Each [`AuctionSettlement`] is in the filled order's own orientation:
	/// `gave` is what left the owner's balance (in the order's own
	/// `sell_symbol`) and `received` is what it is owed back (in the order's
	/// own `buy_symbol`), so the caller can apply both legs the same way for
	/// asks and bids without needing to know which side of the book each
	/// settlement came from.
	pub fn clear_auctions(&mut self, sell_symbol: AssetSymbol, buy_symbol: AssetSymbol) -> (Price, Vec<AuctionSettlement>) {
		let ask_ids: Vec<Id<AuctionOrder>> = self
			.auction_orders
			.iter()
			.filter(|(_, o)| o.sell_symbol == sell_symbol && o.buy_symbol == buy_symbol)
			.map(|(id, _)| id)
			.collect();
		let bid_ids: Vec<Id<AuctionOrder>> = self
			.auction_orders
			.iter()
			.filter(|(_, o)| o.sell_symbol == buy_symbol && o.buy_symbol == sell_symbol)
			.map(|(id, _)| id)
			.collect();
		let asks: Vec<AuctionOrder> = ask_ids.iter().filter_map(|id| self.auction_orders.find(*id).cloned()).collect();
		let bids: Vec<AuctionOrder> = bid_ids.iter().filter_map(|id| self.auction_orders.find(*id).cloned()).collect();

		let (clearing, ask_fills, bid_fills) = auction::clear(sell_symbol, buy_symbol, &asks, &bids);
		let mut results = Vec::new();
		for fill in ask_fills {
			let id = ask_ids[fill.order_index];
			let order = &asks[fill.order_index];
			self.apply_auction_fill(id, fill.fill_sell);
			results.push(AuctionSettlement {
				id,
				owner: order.owner,
				sell_symbol: order.sell_symbol,
				buy_symbol: order.buy_symbol,
				gave: fill.fill_sell,
				received: fill.fill_buy,
			});
		}
		for fill in bid_fills {
			let id = bid_ids[fill.order_index];
			let order = &bids[fill.order_index];
			self.apply_auction_fill(id, fill.fill_sell);
			results.push(AuctionSettlement {
				id,
				owner: order.owner,
				sell_symbol: order.sell_symbol,
				buy_symbol: order.buy_symbol,
				gave: fill.fill_buy,
				received: fill.fill_sell,
			});
		}
		(clearing, results)
	}

	fn apply_auction_fill(&mut self, id: Id<AuctionOrder>, fill_sell: Amount) {
		if let Ok((_, after)) = self.auction_orders.modify(id, |o| o.for_sale = Amount(o.for_sale.0 - fill_sell.0)) {
			if !after.for_sale.is_positive() {
				let _ = self.auction_orders.remove(id);
			}
		}
	}

	/// Registers a new collateralized debt position.
	pub fn submit_call_order(&mut self, order: CallOrder) -> ChainResult<Id<CallOrder>> {
		if !order.debt.is_positive() || !order.collateral.is_positive() {
			return Err(ChainError::InvariantViolation("call order debt/collateral must be positive".into()));
		}
		Ok(self.call_orders.create(|_| order).0)
	}

	/// Sweeps every call order for a debt asset, liquidating any that are
	/// margin-called at the feed price.
	pub fn sweep_call_liquidations(&mut self, registry: &mut AssetRegistryState, params: &Parameters, debt_symbol: AssetSymbol, feed_price: Price, now: Time) -> ChainResult<Vec<Id<CallOrder>>> {
		let ids: Vec<Id<CallOrder>> = self.call_orders.iter().filter(|(_, o)| o.debt_symbol == debt_symbol && o.debt.is_positive()).map(|(id, _)| id).collect();
		let mut liquidated = Vec::new();
		for id in ids {
			let mut order = self.call_orders.get(id)?.clone();
			if call::is_margin_called(&order, params, feed_price)? {
				call::liquidate(&mut order, registry, feed_price, now)?;
				self.call_orders.modify(id, |o| *o = order.clone())?;
				liquidated.push(id);
			}
		}
		Ok(liquidated)
	}

	/// Settles every outstanding call order for a debt asset into a shared
	/// settlement fund at a single global settlement price. Returns each settled order's id paired with its
	/// borrower and any collateral surplus owed back, so the caller can
	/// credit every borrower individually rather than just the aggregate.
	pub fn global_settle(&mut self, debt_symbol: AssetSymbol, settlement_price: Price) -> ChainResult<Vec<(Id<CallOrder>, AccountName, Amount)>> {
		let ids: Vec<Id<CallOrder>> = self.call_orders.iter().filter(|(_, o)| o.debt_symbol == debt_symbol && o.debt.is_positive()).map(|(id, _)| id).collect();
		let mut settled = Vec::new();
		for id in ids {
			let mut order = self.call_orders.get(id)?.clone();
			let fund = self.settlement_funds.entry(debt_symbol).or_insert(Amount::ZERO);
			let surplus = call::settle_into_fund(&mut order, fund, settlement_price)?;
			let borrower = order.borrower;
			self.call_orders.modify(id, |o| *o = order.clone())?;
			settled.push((id, borrower, surplus));
		}
		Ok(settled)
	}

	/// Redeems settled debt for a share of its settlement fund.
	pub fn force_settlement_withdraw(&mut self, registry: &mut AssetRegistryState, debt_symbol: AssetSymbol, collateral_symbol: AssetSymbol, debt_held: Amount, settlement_price: Price, now: Time) -> ChainResult<Amount> {
		let fund = self.settlement_funds.entry(debt_symbol).or_insert(Amount::ZERO);
		call::force_settlement_withdraw(fund, debt_symbol, collateral_symbol, registry, debt_held, settlement_price, now)
	}

	/// Issues a new option position backed by locked underlying.
	pub fn submit_option_order(&mut self, owner: AccountName, underlying_symbol: AssetSymbol, strike_symbol: AssetSymbol, strike: StrikeDescriptor, units: Amount) -> ChainResult<Id<OptionOrder>> {
		let order = option::issue(owner, underlying_symbol, strike_symbol, strike, units)?;
		Ok(self.option_orders.create(|_| order).0)
	}

	/// Exercises an option before expiry.
	pub fn exercise_option(&mut self, id: Id<OptionOrder>, now: Time) -> ChainResult<chain_primitives::Asset> {
		let mut order = self.option_orders.get(id)?.clone();
		let delivered = option::exercise(&mut order, now)?;
		self.option_orders.modify(id, |o| *o = order.clone())?;
		Ok(delivered)
	}

	/// The current strike chain sheet for an underlying/strike pair, if any
	/// has been established.
	pub fn option_chain(&self, underlying_symbol: AssetSymbol, strike_symbol: AssetSymbol) -> &[StrikeDescriptor] {
		self.option_chains.get(&(underlying_symbol, strike_symbol)).map(|v| v.as_slice()).unwrap_or(&[])
	}

	/// Rolls every tracked option chain sheet at the monthly boundary. The
	/// caller supplies the current mid-price for each tracked pair.
	pub fn roll_option_chains(&mut self, params: &Parameters, mid_price_of: impl Fn(AssetSymbol, AssetSymbol) -> Option<i64>, now: Time) {
		let pairs: Vec<(AssetSymbol, AssetSymbol)> = self.option_chains.keys().copied().collect();
		for pair in pairs {
			let Some(mid) = mid_price_of(pair.0, pair.1) else { continue };
			if let Some(sheet) = self.option_chains.get_mut(&pair) {
				option::roll(sheet, mid, params, now);
			}
		}
	}

	/// Establishes a fresh twelve-month chain sheet for a pair that has
	/// none yet.
	pub fn seed_option_chain(&mut self, underlying_symbol: AssetSymbol, strike_symbol: AssetSymbol, mid_price_micros: i64, params: &Parameters, now: Time) {
		let sheet = self.option_chains.entry((underlying_symbol, strike_symbol)).or_default();
		if !sheet.is_empty() {
			return;
		}
		for month in 0..12u64 {
			let expiration = Time::from_micros(now.0.saturating_add(month.saturating_add(1) * 30 * 24 * 3600 * 1_000_000));
			sheet.extend(option::month_strikes(mid_price_micros, params, expiration, 1));
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chain_primitives::Asset;

	fn sym(s: &str) -> AssetSymbol {
		AssetSymbol::new(s).unwrap()
	}

	fn acct(s: &str) -> AccountName {
		AccountName::new(s).unwrap()
	}

	#[test]
	fn limit_orders_cross_and_partially_fill() {
		let mut state = OrdersState::new();
		let t0 = Time::from_secs(0);
		let price = Price::new(Asset::new(1 * chain_primitives::UNIT, sym("CORE")), Asset::new(10 * chain_primitives::UNIT, sym("USD")));
		let (maker_id, fills) = state
			.submit_limit_order(acct("maker"), sym("CORE"), sym("USD"), price, Amount(10 * chain_primitives::UNIT), false, t0)
			.unwrap();
		assert!(maker_id.is_some());
		assert!(fills.is_empty());

		let taker_price = price.invert();
		let (taker_id, fills) = state
			.submit_limit_order(acct("taker"), sym("USD"), sym("CORE"), taker_price, Amount(40 * chain_primitives::UNIT), false, t0)
			.unwrap();
		assert_eq!(fills.len(), 1);
		assert_eq!(fills[0].took, Asset::new(4 * chain_primitives::UNIT, sym("CORE")));
		assert!(taker_id.is_none());

		let remaining = state.limit_order(maker_id.unwrap()).unwrap();
		assert_eq!(remaining.for_sale, Amount(6 * chain_primitives::UNIT));
	}

	#[test]
	fn fill_or_kill_rejects_partial_match() {
		let mut state = OrdersState::new();
		let t0 = Time::from_secs(0);
		let price = Price::new(Asset::new(1 * chain_primitives::UNIT, sym("CORE")), Asset::new(10 * chain_primitives::UNIT, sym("USD")));
		state
			.submit_limit_order(acct("maker"), sym("CORE"), sym("USD"), price, Amount(1 * chain_primitives::UNIT), false, t0)
			.unwrap();

		let taker_price = price.invert();
		let err = state
			.submit_limit_order(acct("taker"), sym("USD"), sym("CORE"), taker_price, Amount(100 * chain_primitives::UNIT), true, t0)
			.unwrap_err();
		assert!(matches!(err, ChainError::InvariantViolation(_)));
	}

	#[test]
	fn option_exercise_consumes_the_order() {
		let mut state = OrdersState::new();
		let t0 = Time::from_secs(0);
		let strike = StrikeDescriptor { strike_price_micros: 10 * chain_primitives::UNIT, is_call: true, multiple: 1, expiration: Time::from_secs(3600) };
		let id = state.submit_option_order(acct("holder"), sym("CORE"), sym("USD"), strike, Amount(2 * chain_primitives::UNIT)).unwrap();
		let delivered = state.exercise_option(id, t0).unwrap();
		assert_eq!(delivered.symbol, sym("USD"));
		let err = state.exercise_option(id, t0).unwrap_err();
		assert!(matches!(err, ChainError::InvariantViolation(_)));
	}
}
