use crate::types::{
	AccountBalance, AssetDelegation, DelegationExpiration, SavingsWithdraw, UnstakeRoute, VestingBalance,
};
use chain_primitives::{AccountName, Amount, AssetSymbol, Time};
use chain_support::{ChainError, ChainResult, Parameters};
use module_assets::{AssetRegistryState, SupplyCompartment};
use object_store::{Id, Table};
use std::collections::{BTreeMap, BTreeSet};

const MAX_PROXY_DEPTH: u32 = 10;

/// One of the four transferable/earning balance compartments an `adjust`
/// call can target directly. `delegated`/`receiving` move only
/// in the lockstep enforced by `delegate`; they are not exposed here.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Compartment {
	Liquid,
	Staked,
	Reward,
	Savings,
}

impl AccountBalance {
	fn compartment_mut(&mut self, compartment: Compartment) -> &mut Amount {
		match compartment {
			Compartment::Liquid => &mut self.liquid,
			Compartment::Staked => &mut self.staked,
			Compartment::Reward => &mut self.reward,
			Compartment::Savings => &mut self.savings,
		}
	}
}

fn supply_compartment_for(compartment: Compartment) -> SupplyCompartment {
	match compartment {
		Compartment::Liquid => SupplyCompartment::Liquid,
		Compartment::Staked => SupplyCompartment::Staked,
		Compartment::Reward => SupplyCompartment::Reward,
		Compartment::Savings => SupplyCompartment::Savings,
	}
}

/// The balance engine's tables and secondary indices.
#[derive(Clone, Debug, Default)]
pub struct BalancesState {
	balances: Table<AccountBalance>,
	by_owner_symbol: BTreeMap<(AccountName, AssetSymbol), Id<AccountBalance>>,

	vesting: Table<VestingBalance>,

	savings: Table<SavingsWithdraw>,
	savings_by_from_request: BTreeMap<(AccountName, u64), Id<SavingsWithdraw>>,
	/// `(complete, id)`, ordered so due withdrawals can be scanned in
	/// maturity order.
	savings_by_complete: BTreeMap<(Time, Id<SavingsWithdraw>), ()>,

	delegations: Table<AssetDelegation>,
	delegation_by_key: BTreeMap<(AccountName, AccountName, AssetSymbol), Id<AssetDelegation>>,

	delegation_expirations: Table<DelegationExpiration>,
	expirations_by_time: BTreeMap<(Time, Id<DelegationExpiration>), ()>,

	unstake_routes: Table<UnstakeRoute>,
	routes_by_from: BTreeMap<AccountName, BTreeSet<Id<UnstakeRoute>>>,
	/// `by_destination` index: lets a destination
	/// discover incoming routes without scanning every route.
	routes_by_to: BTreeMap<AccountName, BTreeSet<Id<UnstakeRoute>>>,

	proxy_of: BTreeMap<AccountName, AccountName>,
}

impl BalancesState {
	pub fn new() -> Self {
		Self::default()
	}

	fn id_of(&mut self, owner: AccountName, symbol: AssetSymbol) -> Id<AccountBalance> {
		if let Some(id) = self.by_owner_symbol.get(&(owner, symbol)) {
			return *id;
		}
		let (id, _) = self.balances.create(|_| AccountBalance::new(owner, symbol));
		self.by_owner_symbol.insert((owner, symbol), id);
		id
	}

	/// Every account balance recorded for `symbol`, for the evaluator's
	/// global supply-conservation check — the one place in the
	/// engine that sums every account's compartments directly instead of
	/// relying on the registry's running `*_supply` counters.
	pub fn iter_by_symbol(&self, symbol: AssetSymbol) -> impl Iterator<Item = &AccountBalance> + '_ {
		self.by_owner_symbol.iter().filter(move |((_, s), _)| *s == symbol).filter_map(move |(_, id)| self.balances.find(*id))
	}

	pub fn get(&self, owner: AccountName, symbol: AssetSymbol) -> AccountBalance {
		self.by_owner_symbol
			.get(&(owner, symbol))
			.and_then(|id| self.balances.find(*id).copied())
			.unwrap_or_else(|| AccountBalance::new(owner, symbol))
	}

	/// Every `(owner, symbol)` pair with an account balance record at all,
	/// for maintenance passes that need to scan for due stake/unstake
	/// tranches without a registry of "which pairs
	/// have an active schedule" kept separately.
	pub fn account_symbol_pairs(&self) -> Vec<(AccountName, AssetSymbol)> {
		self.by_owner_symbol.keys().copied().collect()
	}

	/// Advances every account's due stake and unstake tranches.
	pub fn tick_all_stakes(&mut self, registry: &mut AssetRegistryState, params: &Parameters, now: Time) -> ChainResult<()> {
		for (owner, symbol) in self.account_symbol_pairs() {
			self.tick_stake(registry, params, owner, symbol, now)?;
			self.tick_unstake(registry, params, owner, symbol, now)?;
		}
		Ok(())
	}

	fn modify(
		&mut self,
		owner: AccountName,
		symbol: AssetSymbol,
		mutate: impl FnOnce(&mut AccountBalance) -> ChainResult<()>,
	) -> ChainResult<()> {
		let id = self.id_of(owner, symbol);
		let mut error = None;
		self.balances.modify(id, |balance| {
			if let Err(e) = mutate(balance) {
				error = Some(e);
			}
		})?;
		match error {
			Some(e) => Err(e),
			None => Ok(()),
		}
	}

	/// The compartment adjustment primitive. `delta` may be
	/// negative. A delta against the null account is only legal when
	/// positive, and is routed to `AccountName::network_revenue()` instead
	///; callers that
	/// need the core-asset restriction enforce it before calling this.
	pub fn adjust(
		&mut self,
		registry: &mut AssetRegistryState,
		owner: AccountName,
		symbol: AssetSymbol,
		compartment: Compartment,
		delta: Amount,
		now: Time,
	) -> ChainResult<()> {
		if delta.is_zero() {
			return Ok(());
		}
		let owner = if owner.is_null() {
			if !delta.is_positive() {
				return Err(ChainError::Unauthorized("negative delta against the null account".into()));
			}
			AccountName::network_revenue()
		} else {
			owner
		};
		self.modify(owner, symbol, |balance| {
			let slot = balance.compartment_mut(compartment);
			let next = slot
				.checked_add(delta)
				.ok_or_else(|| ChainError::InvariantViolation("balance overflow".into()))?;
			if next.is_negative() {
				return Err(ChainError::InsufficientBalance(format!(
					"{owner} {symbol} {compartment:?} would go negative"
				)));
			}
			*slot = next;
			Ok(())
		})?;
		registry.adjust_compartment(symbol, supply_compartment_for(compartment), delta, now)
	}

	/// Adjusts one account's own compartment without touching the registry's
	/// running supply counters (contrast with `adjust`, which always moves
	/// both in lockstep). For the narrow case where a paired engine call has
	/// already moved the registry side directly — `AssetRegistryState::mint`/
	/// `burn` against a market-issued asset such as an LP share, a credit
	/// share, or call-order debt — so that crediting the same delta again
	/// through `adjust` would double-count it against `total_supply`. See
	/// DESIGN.md for the full accounting of every call site that needs this
	/// instead of `adjust`.
	pub fn adjust_local(&mut self, owner: AccountName, symbol: AssetSymbol, compartment: Compartment, delta: Amount) -> ChainResult<()> {
		if delta.is_zero() {
			return Ok(());
		}
		let owner = if owner.is_null() {
			if !delta.is_positive() {
				return Err(ChainError::Unauthorized("negative delta against the null account".into()));
			}
			AccountName::network_revenue()
		} else {
			owner
		};
		self.modify(owner, symbol, |balance| {
			let slot = balance.compartment_mut(compartment);
			let next = slot
				.checked_add(delta)
				.ok_or_else(|| ChainError::InvariantViolation("balance overflow".into()))?;
			if next.is_negative() {
				return Err(ChainError::InsufficientBalance(format!(
					"{owner} {symbol} {compartment:?} would go negative"
				)));
			}
			*slot = next;
			Ok(())
		})
	}

	/// Begins a stake schedule moving `amount` from `from`'s liquid balance
	/// to `to`'s staked balance over `N_INTERVALS` tranches.
	pub fn stake_asset(
		&mut self,
		registry: &mut AssetRegistryState,
		params: &Parameters,
		from: AccountName,
		to: AccountName,
		symbol: AssetSymbol,
		amount: Amount,
		now: Time,
	) -> ChainResult<()> {
		if !amount.is_positive() {
			return Err(ChainError::InvariantViolation("stake amount must be positive".into()));
		}
		// `adjust` already synced the registry's liquid-supply counter for
		// `from`'s debit; only the pending side needs its own counter move.
		self.adjust(registry, from, symbol, Compartment::Liquid, -amount, now)?;
		registry.adjust_compartment(symbol, SupplyCompartment::Pending, amount, now)?;
		self.modify(to, symbol, |balance| {
			let to_stake = balance
				.to_stake
				.checked_add(amount)
				.ok_or_else(|| ChainError::InvariantViolation("to_stake overflow".into()))?;
			balance.to_stake = to_stake;
			balance.stake_rate = to_stake
				.scale_rational(1, chain_support::N_INTERVALS as i128)
				.ok_or_else(|| ChainError::InvariantViolation("stake rate overflow".into()))?;
			balance.next_stake_time = now.saturating_add_secs(params.stake_interval_secs);
			Ok(())
		})
	}

	/// Advances `owner`'s stake schedule by one tranche if due. Returns whether a tranche fired.
	pub fn tick_stake(
		&mut self,
		registry: &mut AssetRegistryState,
		params: &Parameters,
		owner: AccountName,
		symbol: AssetSymbol,
		now: Time,
	) -> ChainResult<bool> {
		let balance = self.get(owner, symbol);
		if !balance.has_active_stake_schedule() || now < balance.next_stake_time {
			return Ok(false);
		}
		let remaining = balance
			.stake_remaining()
			.ok_or_else(|| ChainError::InvariantViolation("stake remaining underflow".into()))?;
		let tranche = if balance.stake_rate.checked_sub(remaining).map(|d| d.is_positive()).unwrap_or(false) {
			remaining
		} else {
			balance.stake_rate
		};
		registry.move_supply(symbol, SupplyCompartment::Pending, SupplyCompartment::Staked, tranche, now)?;
		self.modify(owner, symbol, |balance| {
			balance.staked = balance
				.staked
				.checked_add(tranche)
				.ok_or_else(|| ChainError::InvariantViolation("staked overflow".into()))?;
			balance.total_staked = balance
				.total_staked
				.checked_add(tranche)
				.ok_or_else(|| ChainError::InvariantViolation("total_staked overflow".into()))?;
			if balance.total_staked >= balance.to_stake {
				balance.stake_rate = Amount::ZERO;
				balance.to_stake = Amount::ZERO;
				balance.total_staked = Amount::ZERO;
				balance.next_stake_time = Time::MAX;
			} else {
				balance.next_stake_time = now.saturating_add_secs(params.stake_interval_secs);
			}
			Ok(())
		})?;
		Ok(true)
	}

	/// Begins an unstake schedule moving `amount` from `owner`'s staked
	/// balance back to liquid (or routed destinations) over `N_INTERVALS`
	/// tranches. Fails if it would drive `staked` below
	/// `delegated`.
	pub fn unstake_asset(
		&mut self,
		params: &Parameters,
		owner: AccountName,
		symbol: AssetSymbol,
		amount: Amount,
		now: Time,
	) -> ChainResult<()> {
		if !amount.is_positive() {
			return Err(ChainError::InvariantViolation("unstake amount must be positive".into()));
		}
		self.modify(owner, symbol, |balance| {
			let remaining_after = balance
				.staked
				.checked_sub(amount)
				.ok_or_else(|| ChainError::InsufficientBalance("unstake exceeds staked".into()))?;
			if remaining_after < balance.delegated {
				return Err(ChainError::InvariantViolation(
					"unstake would reduce staked below delegated".into(),
				));
			}
			let to_unstake = balance
				.to_unstake
				.checked_add(amount)
				.ok_or_else(|| ChainError::InvariantViolation("to_unstake overflow".into()))?;
			balance.to_unstake = to_unstake;
			balance.unstake_rate = to_unstake
				.scale_rational(1, chain_support::N_INTERVALS as i128)
				.ok_or_else(|| ChainError::InvariantViolation("unstake rate overflow".into()))?;
			balance.next_unstake_time = now.saturating_add_secs(params.stake_interval_secs);
			Ok(())
		})
	}

	/// Advances `owner`'s unstake schedule by one tranche if due, splitting
	/// the tranche across `owner`'s unstake routes by percent, with any
	/// unrouted remainder flowing to `owner.liquid`.
	pub fn tick_unstake(
		&mut self,
		registry: &mut AssetRegistryState,
		params: &Parameters,
		owner: AccountName,
		symbol: AssetSymbol,
		now: Time,
	) -> ChainResult<bool> {
		let balance = self.get(owner, symbol);
		if !balance.has_active_unstake_schedule() || now < balance.next_unstake_time {
			return Ok(false);
		}
		let remaining = balance
			.unstake_remaining()
			.ok_or_else(|| ChainError::InvariantViolation("unstake remaining underflow".into()))?;
		let tranche = if balance.unstake_rate.checked_sub(remaining).map(|d| d.is_positive()).unwrap_or(false) {
			remaining
		} else {
			balance.unstake_rate
		};

		self.modify(owner, symbol, |balance| {
			balance.staked = balance
				.staked
				.checked_sub(tranche)
				.ok_or_else(|| ChainError::InsufficientBalance("unstake tick exceeds staked".into()))?;
			balance.total_unstaked = balance
				.total_unstaked
				.checked_add(tranche)
				.ok_or_else(|| ChainError::InvariantViolation("total_unstaked overflow".into()))?;
			if balance.total_unstaked >= balance.to_unstake {
				balance.unstake_rate = Amount::ZERO;
				balance.to_unstake = Amount::ZERO;
				balance.total_unstaked = Amount::ZERO;
				balance.next_unstake_time = Time::MAX;
			} else {
				balance.next_unstake_time = now.saturating_add_secs(params.stake_interval_secs);
			}
			Ok(())
		})?;
		// `owner.staked` just dropped by `tranche` outside of `adjust`
		// (the tranche isn't moving to a single destination compartment),
		// so the registry's staked-supply counter is synced here in one
		// step; each destination below syncs its own compartment as the
		// tranche lands.
		registry.adjust_compartment(symbol, SupplyCompartment::Staked, -tranche, now)?;

		let routes: Vec<UnstakeRoute> = self
			.routes_by_from
			.get(&owner)
			.cloned()
			.unwrap_or_default()
			.into_iter()
			.filter_map(|id| self.unstake_routes.find(id).copied())
			.filter(|r| r.symbol == symbol)
			.collect();

		let mut distributed = Amount::ZERO;
		for route in &routes {
			let share = tranche
				.scale_rational(route.percent_bps as i128, 10_000)
				.ok_or_else(|| ChainError::InvariantViolation("route share overflow".into()))?;
			if share.is_zero() {
				continue;
			}
			distributed = distributed
				.checked_add(share)
				.ok_or_else(|| ChainError::InvariantViolation("route distribution overflow".into()))?;
			if route.auto_stake {
				// The unstaked share starts a fresh stake schedule on
				// `route.to` directly out of the pending bucket, bypassing
				// liquid entirely.
				registry.adjust_compartment(symbol, SupplyCompartment::Pending, share, now)?;
				self.modify(route.to, symbol, |balance| {
					let to_stake = balance
						.to_stake
						.checked_add(share)
						.ok_or_else(|| ChainError::InvariantViolation("to_stake overflow".into()))?;
					balance.to_stake = to_stake;
					balance.stake_rate = to_stake
						.scale_rational(1, chain_support::N_INTERVALS as i128)
						.ok_or_else(|| ChainError::InvariantViolation("stake rate overflow".into()))?;
					if balance.next_stake_time == Time::MAX {
						balance.next_stake_time = now.saturating_add_secs(params.stake_interval_secs);
					}
					Ok(())
				})?;
			} else {
				self.adjust(registry, route.to, symbol, Compartment::Liquid, share, now)?;
			}
		}

		let remainder = tranche
			.checked_sub(distributed)
			.ok_or_else(|| ChainError::InvariantViolation("route remainder underflow".into()))?;
		if remainder.is_positive() {
			self.adjust(registry, owner, symbol, Compartment::Liquid, remainder, now)?;
		}
		Ok(true)
	}

	/// Registers or updates an unstake route. Enforces `percent >
	/// 0` and `Σ percent ≤ 100%`
	/// across all of `from`'s routes on `symbol`.
	pub fn unstake_asset_route(
		&mut self,
		from: AccountName,
		to: AccountName,
		symbol: AssetSymbol,
		percent_bps: u32,
		auto_stake: bool,
	) -> ChainResult<()> {
		if percent_bps == 0 {
			return Err(ChainError::InvariantViolation("route percent must be positive".into()));
		}
		let existing_id = self
			.routes_by_from
			.get(&from)
			.into_iter()
			.flatten()
			.find(|id| self.unstake_routes.find(**id).map(|r| r.to == to && r.symbol == symbol).unwrap_or(false))
			.copied();

		let total_other: u32 = self
			.routes_by_from
			.get(&from)
			.into_iter()
			.flatten()
			.filter(|id| Some(**id) != existing_id)
			.filter_map(|id| self.unstake_routes.find(*id))
			.filter(|r| r.symbol == symbol)
			.map(|r| r.percent_bps)
			.sum();
		if total_other + percent_bps > 10_000 {
			return Err(ChainError::InvariantViolation("sum of route percents exceeds 100%".into()));
		}

		if let Some(id) = existing_id {
			self.unstake_routes.modify(id, |r| {
				r.percent_bps = percent_bps;
				r.auto_stake = auto_stake;
			})?;
		} else {
			let (id, _) = self.unstake_routes.create(|_| UnstakeRoute {
				from,
				to,
				symbol,
				percent_bps,
				auto_stake,
			});
			self.routes_by_from.entry(from).or_default().insert(id);
			self.routes_by_to.entry(to).or_default().insert(id);
		}
		Ok(())
	}

	/// Immediately moves `amount` from `owner`'s liquid to savings.
	pub fn transfer_to_savings(
		&mut self,
		registry: &mut AssetRegistryState,
		owner: AccountName,
		symbol: AssetSymbol,
		amount: Amount,
		now: Time,
	) -> ChainResult<()> {
		self.adjust(registry, owner, symbol, Compartment::Liquid, -amount, now)?;
		self.adjust(registry, owner, symbol, Compartment::Savings, amount, now)
	}

	/// Immediately debits `from`'s savings and creates a completion record
	/// maturing after `SAVINGS_DELAY`. `request_id` must be
	/// unique per `from`.
	pub fn transfer_from_savings(
		&mut self,
		registry: &mut AssetRegistryState,
		params: &Parameters,
		from: AccountName,
		to: AccountName,
		symbol: AssetSymbol,
		amount: Amount,
		request_id: u64,
		now: Time,
	) -> ChainResult<Id<SavingsWithdraw>> {
		if self.savings_by_from_request.contains_key(&(from, request_id)) {
			return Err(ChainError::AlreadyExists(format!("savings withdraw request {request_id} already exists")));
		}
		self.adjust(registry, from, symbol, Compartment::Savings, -amount, now)?;
		let complete_time = now.saturating_add_secs(params.savings_delay_secs);
		let (id, _) = self.savings.create(|_| SavingsWithdraw {
			from,
			to,
			amount,
			request_id,
			complete_time,
		});
		self.savings_by_from_request.insert((from, request_id), id);
		self.savings_by_complete.insert((complete_time, id), ());
		Ok(id)
	}

	/// Completes every savings withdrawal due at or before `now`.
	pub fn process_due_savings_withdrawals(
		&mut self,
		registry: &mut AssetRegistryState,
		now: Time,
	) -> ChainResult<u32> {
		let due: Vec<(Time, Id<SavingsWithdraw>)> = self
			.savings_by_complete
			.range(..=(now, Id::new(u64::MAX)))
			.map(|(k, _)| *k)
			.collect();
		let mut completed = 0;
		for (complete_time, id) in due {
			let record = *self.savings.get(id)?;
			self.adjust(registry, record.to, record.symbol, Compartment::Liquid, record.amount, now)?;
			self.savings.remove(id)?;
			self.savings_by_from_request.remove(&(record.from, record.request_id));
			self.savings_by_complete.remove(&(complete_time, id));
			completed += 1;
		}
		Ok(completed)
	}

	/// Sets the active delegation from `delegator` to `delegatee` on `symbol`
	/// to `amount_new`.
	pub fn delegate(
		&mut self,
		registry: &mut AssetRegistryState,
		params: &Parameters,
		delegator: AccountName,
		delegatee: AccountName,
		symbol: AssetSymbol,
		amount_new: Amount,
		now: Time,
	) -> ChainResult<()> {
		let key = (delegator, delegatee, symbol);
		let current = self
			.delegation_by_key
			.get(&key)
			.and_then(|id| self.delegations.find(*id))
			.map(|d| d.amount)
			.unwrap_or(Amount::ZERO);

		if amount_new == current {
			return Ok(());
		}

		if amount_new > current {
			let delta = amount_new
				.checked_sub(current)
				.ok_or_else(|| ChainError::InvariantViolation("delegation delta overflow".into()))?;
			let delegator_balance = self.get(delegator, symbol);
			if delegator_balance.has_active_unstake_schedule() {
				return Err(ChainError::InvariantViolation(
					"cannot increase delegation while an unstake schedule is active".into(),
				));
			}
			let free = delegator_balance
				.staked
				.checked_sub(delegator_balance.delegated)
				.ok_or_else(|| ChainError::InvariantViolation("free stake underflow".into()))?;
			if free < delta {
				return Err(ChainError::InsufficientBalance("insufficient free staked balance to delegate".into()));
			}
			self.modify(delegator, symbol, |b| {
				b.delegated = b
					.delegated
					.checked_add(delta)
					.ok_or_else(|| ChainError::InvariantViolation("delegated overflow".into()))?;
				Ok(())
			})?;
			self.modify(delegatee, symbol, |b| {
				b.receiving = b
					.receiving
					.checked_add(delta)
					.ok_or_else(|| ChainError::InvariantViolation("receiving overflow".into()))?;
				Ok(())
			})?;
			registry.adjust_delegated_receiving(symbol, delta, now)?;
			self.set_delegation_amount(key, amount_new);
		} else {
			let delta = current
				.checked_sub(amount_new)
				.ok_or_else(|| ChainError::InvariantViolation("delegation delta underflow".into()))?;
			let expiration = now.saturating_add_secs(params.delegation_return_delay_secs);
			let (id, _) = self.delegation_expirations.create(|_| DelegationExpiration {
				delegator,
				delegatee,
				symbol,
				amount: delta,
				expiration,
			});
			self.expirations_by_time.insert((expiration, id), ());
			self.set_delegation_amount(key, amount_new);
		}
		Ok(())
	}

	fn set_delegation_amount(&mut self, key: (AccountName, AccountName, AssetSymbol), amount_new: Amount) {
		if let Some(id) = self.delegation_by_key.get(&key) {
			let _ = self.delegations.modify(*id, |d| d.amount = amount_new);
		} else {
			let (id, _) = self.delegations.create(|_| AssetDelegation {
				delegator: key.0,
				delegatee: key.1,
				symbol: key.2,
				amount: amount_new,
			});
			self.delegation_by_key.insert(key, id);
		}
	}

	/// Applies every delegation expiration due at or before `now`.
	pub fn process_expired_delegations(&mut self, registry: &mut AssetRegistryState, now: Time) -> ChainResult<u32> {
		let due: Vec<(Time, Id<DelegationExpiration>)> = self
			.expirations_by_time
			.range(..=(now, Id::new(u64::MAX)))
			.map(|(k, _)| *k)
			.collect();
		let mut processed = 0;
		for (expiration, id) in due {
			let record = *self.delegation_expirations.get(id)?;
			self.modify(record.delegator, record.symbol, |b| {
				b.delegated = b.delegated.checked_sub(record.amount).unwrap_or(Amount::ZERO);
				Ok(())
			})?;
			self.modify(record.delegatee, record.symbol, |b| {
				b.receiving = b.receiving.checked_sub(record.amount).unwrap_or(Amount::ZERO);
				Ok(())
			})?;
			registry.adjust_delegated_receiving(record.symbol, -record.amount, now)?;
			self.delegation_expirations.remove(id)?;
			self.expirations_by_time.remove(&(expiration, id));
			processed += 1;
		}
		Ok(processed)
	}

	/// Claims `amount` out of `owner`'s reward compartment into either
	/// liquid or staked.
	pub fn claim_reward_balance(
		&mut self,
		registry: &mut AssetRegistryState,
		params: &Parameters,
		owner: AccountName,
		symbol: AssetSymbol,
		amount: Amount,
		into_staked: bool,
		now: Time,
	) -> ChainResult<()> {
		self.adjust(registry, owner, symbol, Compartment::Reward, -amount, now)?;
		if into_staked {
			self.adjust(registry, owner, symbol, Compartment::Liquid, amount, now)?;
			self.stake_asset(registry, params, owner, owner, symbol, amount, now)
		} else {
			self.adjust(registry, owner, symbol, Compartment::Liquid, amount, now)
		}
	}

	/// Locks `amount` until `vesting_time`.
	pub fn create_vesting_balance(
		&mut self,
		registry: &mut AssetRegistryState,
		owner: AccountName,
		symbol: AssetSymbol,
		amount: Amount,
		vesting_time: Time,
		now: Time,
	) -> ChainResult<Id<VestingBalance>> {
		self.adjust(registry, owner, symbol, Compartment::Liquid, -amount, now)?;
		registry.adjust_compartment(symbol, SupplyCompartment::Pending, amount, now)?;
		let (id, _) = self.vesting.create(|_| VestingBalance {
			owner,
			symbol,
			amount,
			vesting_time,
		});
		Ok(id)
	}

	/// Releases every matured vesting balance to its owner's liquid
	/// compartment.
	pub fn process_matured_vesting(&mut self, registry: &mut AssetRegistryState, now: Time) -> ChainResult<u32> {
		let matured: Vec<Id<VestingBalance>> =
			self.vesting.iter().filter(|(_, v)| v.vesting_time <= now).map(|(id, _)| id).collect();
		let mut released = 0;
		for id in matured {
			let record = *self.vesting.get(id)?;
			registry.adjust_compartment(record.symbol, SupplyCompartment::Pending, -record.amount, now)?;
			self.adjust(registry, record.owner, record.symbol, Compartment::Liquid, record.amount, now)?;
			self.vesting.remove(id)?;
			released += 1;
		}
		Ok(released)
	}

	/// Assigns `delegator`'s voting proxy to `proxy`, or clears it when
	/// `proxy` equals `delegator`. Rejects an assignment that would create a
	/// cycle reachable within `MAX_PROXY_DEPTH`.
	pub fn set_voting_proxy(&mut self, account: AccountName, proxy: AccountName) -> ChainResult<()> {
		if account == proxy {
			self.proxy_of.remove(&account);
			return Ok(());
		}
		let mut cursor = proxy;
		let mut visited = BTreeSet::new();
		visited.insert(account);
		for _ in 0..MAX_PROXY_DEPTH {
			if !visited.insert(cursor) {
				return Err(ChainError::InvariantViolation("voting proxy assignment would create a cycle".into()));
			}
			match self.proxy_of.get(&cursor) {
				Some(next) => cursor = *next,
				None => break,
			}
		}
		self.proxy_of.insert(account, proxy);
		Ok(())
	}

	/// `staked + receiving - delegated` for `owner` on `symbol`.
	pub fn voting_power(&self, owner: AccountName, symbol: AssetSymbol) -> Option<Amount> {
		self.get(owner, symbol).voting_power()
	}

	/// Sums `owner`'s own voting power and that of every account proxying to
	/// it, transitively, stopping after `MAX_PROXY_DEPTH` hops per chain.
	pub fn voting_power_with_proxies(&self, owner: AccountName, symbol: AssetSymbol) -> Option<Amount> {
		let mut total = self.voting_power(owner, symbol)?;
		let mut frontier = vec![owner];
		let mut visited = BTreeSet::new();
		visited.insert(owner);
		for _ in 0..MAX_PROXY_DEPTH {
			let mut next_frontier = Vec::new();
			for (account, proxy) in &self.proxy_of {
				if frontier.contains(proxy) && visited.insert(*account) {
					total = total.checked_add(self.voting_power(*account, symbol)?)?;
					next_frontier.push(*account);
				}
			}
			if next_frontier.is_empty() {
				break;
			}
			frontier = next_frontier;
		}
		Some(total)
	}
}
