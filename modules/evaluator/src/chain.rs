// This file is part of this chain core.
// SPDX-License-Identifier: GPL-3.0-or-later WITH Classpath-exception-2.0

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! The `Chain` aggregate: one struct holding every
//! module's state plus the network `Parameters`, threaded whole through
//! `object_store::with_session` so a failed operation rolls every module back
//! together. Also home to the two small components every other module
//! depends on by trait but that none of them implement themselves:
//! [`Authorities`] and [`PriceFeeds`].

use crate::loan::LoanBook;
use chain_primitives::{AccountName, AssetSymbol, Price, Time};
use chain_support::{AuthorityProvider, ChainResult, Parameters, PriceSource};
use module_assets::AssetRegistryState;
use module_balances::BalancesState;
use module_confidential::ConfidentialState;
use module_credit_pool::CreditPoolState;
use module_escrow::EscrowState;
use module_liquidity_pool::LiquidityPoolState;
use module_orders::OrdersState;
use module_transfers::TransfersState;
use std::collections::{BTreeMap, BTreeSet};

/// Active-account and transfer-delegate policy. Kept
/// separate from `BalancesState`/asset ownership: an account can be active
/// (able to sign for itself) independent of holding any balance, and a
/// transfer delegate is a standing grant rather than a per-call signature.
#[derive(Clone, Debug, Default)]
pub struct Authorities {
	active: BTreeSet<AccountName>,
	/// `owner -> signatories additionally authorized to move owner's funds`,
	/// e.g. a recurring-transfer executor or an escrow mediator acting on the
	/// chain's behalf. The owner is always implicitly authorized for itself.
	transfer_delegates: BTreeMap<AccountName, BTreeSet<AccountName>>,
}

impl Authorities {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn activate(&mut self, account: AccountName) {
		self.active.insert(account);
	}

	pub fn deactivate(&mut self, account: AccountName) {
		self.active.remove(&account);
	}

	pub fn authorize_transfer(&mut self, owner: AccountName, signatory: AccountName) {
		self.transfer_delegates.entry(owner).or_default().insert(signatory);
	}

	pub fn revoke_transfer(&mut self, owner: AccountName, signatory: AccountName) {
		if let Some(set) = self.transfer_delegates.get_mut(&owner) {
			set.remove(&signatory);
		}
	}
}

impl AuthorityProvider for Authorities {
	fn is_active(&self, account: AccountName) -> bool {
		self.active.contains(&account)
	}

	fn is_authorized_transfer(&self, owner: AccountName, signatory: AccountName) -> bool {
		owner == signatory || self.transfer_delegates.get(&owner).is_some_or(|set| set.contains(&signatory))
	}
}

/// One producer's submitted price for a `(base, quote)` pair, timestamped so
/// stale feeds can be excluded from the median.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct FeedEntry {
	price: Price,
	submitted: Time,
}

/// Multi-producer price feed store, keyed by `(base, quote)`. `median_price` excludes entries
/// older than `Parameters::feed_lifetime_secs` and otherwise sorts by
/// `Price::cross_compare` the same way `module_liquidity_pool::sample_price`
/// derives its rolling median, since `Price` has no total order of its own.
#[derive(Clone, Debug, Default)]
pub struct PriceFeeds {
	feeds: BTreeMap<(AssetSymbol, AssetSymbol), BTreeMap<AccountName, FeedEntry>>,
}

impl PriceFeeds {
	pub fn new() -> Self {
		Self::default()
	}

	/// Records `producer`'s price for `(base, quote)`, replacing any prior
	/// submission from the same producer.
	pub fn submit(&mut self, producer: AccountName, base: AssetSymbol, quote: AssetSymbol, price: Price, now: Time) {
		self.feeds.entry((base, quote)).or_default().insert(producer, FeedEntry { price, submitted: now });
	}

	/// Drops every feed entry older than `feed_lifetime_secs`.
	pub fn prune_stale(&mut self, params: &Parameters, now: Time) {
		for entries in self.feeds.values_mut() {
			entries.retain(|_, entry| now.saturating_sub(entry.submitted).as_secs() <= params.feed_lifetime_secs);
		}
		self.feeds.retain(|_, entries| !entries.is_empty());
	}

	fn median_of(&self, base: AssetSymbol, quote: AssetSymbol, now: Time, max_age_secs: u64) -> Option<Price> {
		let entries = self.feeds.get(&(base, quote))?;
		let mut prices: Vec<Price> = entries
			.values()
			.filter(|entry| now.saturating_sub(entry.submitted).as_secs() <= max_age_secs)
			.map(|entry| entry.price)
			.collect();
		if prices.is_empty() {
			return None;
		}
		prices.sort_by(|a, b| a.cross_compare(b).unwrap_or(core::cmp::Ordering::Equal));
		Some(prices[prices.len() / 2])
	}

	/// The median of every fresh feed for `(base, quote)` as of `now`, with
	/// no freshness parameter available through the `PriceSource` trait
	/// itself; `Chain::median_price_now` is the freshness-aware entry point
	/// operations should call instead of going through the trait directly.
	pub fn median_price_at(&self, base: AssetSymbol, quote: AssetSymbol, now: Time, params: &Parameters) -> Option<Price> {
		if let Some(p) = self.median_of(base, quote, now, params.feed_lifetime_secs) {
			return Some(p);
		}
		self.median_of(quote, base, now, params.feed_lifetime_secs).map(|p| p.invert())
	}
}

impl PriceSource for PriceFeeds {
	/// Trait-level lookup with no notion of "now": returns the median over
	/// every feed ever submitted, regardless of age. Operations that need
	/// freshness call `Chain::median_price_now` instead, which threads the
	/// current block time and `Parameters::feed_lifetime_secs` through
	/// `median_price_at`.
	fn median_price(&self, base: AssetSymbol, quote: AssetSymbol) -> Option<Price> {
		let entries = self.feeds.get(&(base, quote))?;
		let mut prices: Vec<Price> = entries.values().map(|entry| entry.price).collect();
		if !prices.is_empty() {
			prices.sort_by(|a, b| a.cross_compare(b).unwrap_or(core::cmp::Ordering::Equal));
			return Some(prices[prices.len() / 2]);
		}
		let inverted = self.feeds.get(&(quote, base))?;
		let mut prices: Vec<Price> = inverted.values().map(|entry| entry.price).collect();
		if prices.is_empty() {
			return None;
		}
		prices.sort_by(|a, b| a.cross_compare(b).unwrap_or(core::cmp::Ordering::Equal));
		Some(prices[prices.len() / 2].invert())
	}
}

/// The whole chain's state: every domain module's
/// table set plus the network parameters, in one `Clone`-able struct so
/// `object_store::with_session` can snapshot and restore it as a unit around
/// every operation and every block's maintenance pass.
#[derive(Clone, Debug, Default)]
pub struct Chain {
	pub registry: AssetRegistryState,
	pub balances: BalancesState,
	pub confidential: ConfidentialState,
	pub transfers: TransfersState,
	pub liquidity_pools: LiquidityPoolState,
	pub credit_pools: CreditPoolState,
	pub orders: OrdersState,
	pub escrow: EscrowState,
	pub loans: LoanBook,
	pub authorities: Authorities,
	pub price_feeds: PriceFeeds,
	pub params: Parameters,
	/// `debt_symbol -> collateral_symbol` for every call order pair opened so
	/// far. `OrdersState` does not itself index which debt
	/// assets currently have open call orders, so the evaluator — the only
	/// caller of `submit_call_order` — tracks it here to know which feed
	/// price the liquidation sweep needs each maintenance pass.
	pub call_order_pairs: BTreeMap<AssetSymbol, AssetSymbol>,
	/// Every distinct asset pair with at least one auction order submitted so
	/// far, keyed in the same `(sell_symbol, buy_symbol)`
	/// orientation `submit_auction_order` first saw it in. `OrdersState`
	/// indexes auction orders by id only, so the evaluator tracks which pairs
	/// need a daily `clear_auctions` call.
	pub auction_pairs: BTreeSet<(AssetSymbol, AssetSymbol)>,
}

impl Chain {
	pub fn new(params: Parameters) -> Self {
		Self {
			registry: AssetRegistryState::new(),
			balances: BalancesState::new(),
			confidential: ConfidentialState::default(),
			transfers: TransfersState::new(),
			liquidity_pools: LiquidityPoolState::new(),
			credit_pools: CreditPoolState::new(),
			orders: OrdersState::new(),
			escrow: EscrowState::new(),
			loans: LoanBook::new(),
			authorities: Authorities::new(),
			price_feeds: PriceFeeds::new(),
			params,
			call_order_pairs: BTreeMap::new(),
			auction_pairs: BTreeSet::new(),
		}
	}

	/// Freshness-aware median price lookup for `(base, quote)` as of `now`
	///. Prefer this over `PriceSource::median_price`
	/// everywhere a block time is available; the trait method exists only so
	/// `PriceFeeds` satisfies code written generically against
	/// `dyn PriceSource`.
	pub fn median_price_now(&self, base: AssetSymbol, quote: AssetSymbol, now: Time) -> Option<Price> {
		self.price_feeds.median_price_at(base, quote, now, &self.params)
	}

	/// Runs the fixed-order block maintenance pass: expired savings withdrawals, then expired
	/// delegations, then recurring transfers due, then credit interest
	/// accrual, then the liquidation sweep, then escrow dispute resolutions,
	/// then pool price sampling, then the option strike roll. Each step is
	/// independent of the others' outcome within the same pass; the fixed
	/// order only matters for determinism across nodes, not for any data
	/// dependency between steps.
	pub fn run_maintenance(&mut self, now: Time) -> ChainResult<()> {
		self.balances.process_due_savings_withdrawals(&mut self.registry, now)?;
		self.balances.process_expired_delegations(&mut self.registry, now)?;
		self.balances.process_matured_vesting(&mut self.registry, now)?;
		self.balances.tick_all_stakes(&mut self.registry, &self.params, now)?;
		self.transfers.process_due_recurring_transfers(
			&mut self.balances,
			&mut self.registry,
			&self.authorities,
			now,
			&mut module_transfers::NoopPaymentHook,
		)?;
		for pool_id in self.credit_pools.pool_ids() {
			let borrowed_before = self.credit_pools.get(pool_id)?.borrowed_balance;
			let growth = self.credit_pools.accrue_interest(&self.params, pool_id, now)?;
			let rate_bps = self.credit_pools.get(pool_id)?.last_interest_rate_bps;
			self.loans.apportion_interest(pool_id, borrowed_before, growth, rate_bps, now)?;
		}

		let call_pairs: Vec<(AssetSymbol, AssetSymbol)> = self.call_order_pairs.iter().map(|(d, c)| (*d, *c)).collect();
		for (debt_symbol, collateral_symbol) in call_pairs {
			if let Some(feed_price) = self.median_price_now(collateral_symbol, debt_symbol, now) {
				let liquidated =
					self.orders.sweep_call_liquidations(&mut self.registry, &self.params, debt_symbol, feed_price, now)?;
				for id in liquidated {
					let order = self.orders.call_order(id)?.clone();
					let surplus = self.orders.drain_call_order_collateral(id)?;
					if surplus.is_positive() {
						self.registry.move_supply(order.collateral_symbol, module_assets::SupplyCompartment::Pending, module_assets::SupplyCompartment::Liquid, surplus, now)?;
						self.balances.adjust_local(order.borrower, order.collateral_symbol, module_balances::Compartment::Liquid, surplus)?;
					}
				}
			}
		}
		{
			let credit_pools = &mut self.credit_pools;
			let liquidity_pools = &mut self.liquidity_pools;
			let registry = &mut self.registry;
			let params = &self.params;
			let price_feeds = &self.price_feeds;
			let closed = self.orders.sweep_margin_liquidations(
				credit_pools,
				liquidity_pools,
				registry,
				params,
				|collateral_symbol, debt_symbol| price_feeds.median_price_at(collateral_symbol, debt_symbol, now, params),
				now,
			)?;
			for id in closed {
				let order = self.orders.margin_order(id)?.clone();
				let residual = self.orders.drain_margin_order_collateral(id)?;
				if residual.is_positive() {
					self.registry.move_supply(
						order.collateral_symbol,
						module_assets::SupplyCompartment::Pending,
						module_assets::SupplyCompartment::Liquid,
						residual,
						now,
					)?;
					self.balances.adjust_local(order.owner, order.collateral_symbol, module_balances::Compartment::Liquid, residual)?;
				}
			}
		}

		let auction_pairs: Vec<(AssetSymbol, AssetSymbol)> = self.auction_pairs.iter().copied().collect();
		for (sell_symbol, buy_symbol) in auction_pairs {
			let (_clearing, settlements) = self.orders.clear_auctions(sell_symbol, buy_symbol);
			for settlement in settlements {
				self.registry.adjust_pending_supply(settlement.sell_symbol, -settlement.gave, now)?;
				self.balances.adjust(&mut self.registry, settlement.owner, settlement.buy_symbol, module_balances::Compartment::Liquid, settlement.received, now)?;
			}
		}

		self.escrow.process_lapsed_acceptances(&mut self.balances, &mut self.registry, &self.params, now)?;
		self.escrow.process_due_disputes(&mut self.balances, &mut self.registry, &self.params, now)?;

		self.liquidity_pools.sample_all()?;

		{
			let price_feeds = &self.price_feeds;
			let params = &self.params;
			self.orders.roll_option_chains(
				&self.params,
				|underlying, strike| {
					price_feeds
						.median_price_at(underlying, strike, now, params)
						.and_then(|p| p.convert(chain_primitives::Asset::new(chain_primitives::UNIT, underlying)))
						.map(|a| a.amount.0)
				},
				now,
			);
		}
		Ok(())
	}
}
