use crate::types::CreditPool;
use chain_primitives::{Amount, AssetSymbol, AssetType, Time};
use chain_support::{ChainError, ChainResult, Parameters};
use module_assets::{AssetFlags, AssetRegistryState, SupplyCompartment};
use object_store::{Id, Table};
use std::collections::BTreeMap;

const SECS_PER_YEAR: i128 = 365 * 24 * 3600;
const PRECISION: i128 = chain_primitives::UNIT as i128;

/// `rate = min(FIXED_CAP, min_rate + var_rate * (borrowed+eps)/(base+eps))`
///, all rates in basis points, `eps` the precision unit.
pub fn interest_rate_bps(params: &Parameters, base_balance: Amount, borrowed_balance: Amount) -> u32 {
	let eps = PRECISION;
	let numerator = borrowed_balance.0 as i128 + eps;
	let denominator = base_balance.0 as i128 + eps;
	let utilization_scaled = numerator.checked_mul(PRECISION).unwrap_or(i128::MAX) / denominator.max(1);
	let variable = (params.credit_var_rate_bps as i128 * utilization_scaled / PRECISION).max(0);
	let uncapped = params.credit_min_rate_bps as i128 + variable;
	uncapped.min(params.credit_fixed_cap_bps as i128) as u32
}

/// The credit pool engine's table and indices.
#[derive(Clone, Debug, Default)]
pub struct CreditPoolState {
	pools: Table<CreditPool>,
	by_base_symbol: BTreeMap<AssetSymbol, Id<CreditPool>>,
	by_credit_symbol: BTreeMap<AssetSymbol, Id<CreditPool>>,
}

impl CreditPoolState {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn get(&self, id: Id<CreditPool>) -> ChainResult<&CreditPool> {
		self.pools.get(id)
	}

	pub fn find_by_base(&self, base_symbol: AssetSymbol) -> Option<Id<CreditPool>> {
		self.by_base_symbol.get(&base_symbol).copied()
	}

	/// Registers a credit pool for `base_symbol`, minting its credit asset.
	pub fn create_pool(
		&mut self,
		registry: &mut AssetRegistryState,
		issuer: chain_primitives::AccountName,
		base_symbol: AssetSymbol,
		credit_symbol: AssetSymbol,
		now: Time,
	) -> ChainResult<Id<CreditPool>> {
		if self.by_base_symbol.contains_key(&base_symbol) {
			return Err(ChainError::AlreadyExists(format!("credit pool for {base_symbol} already exists")));
		}
		registry.create_asset(credit_symbol, AssetType::CreditPoolShare, issuer, AssetFlags::default(), now)?;
		let (id, _) = self.pools.create(|_| CreditPool {
			base_symbol,
			credit_symbol,
			base_balance: Amount::ZERO,
			borrowed_balance: Amount::ZERO,
			last_interest_rate_bps: 0,
			last_accrued: now,
		});
		self.by_base_symbol.insert(base_symbol, id);
		self.by_credit_symbol.insert(credit_symbol, id);
		Ok(id)
	}

	/// `shares = deposit / current_price`, `base_balance += deposit`. Bootstraps 1:1 when the pool is empty.
	pub fn lend(&mut self, registry: &mut AssetRegistryState, id: Id<CreditPool>, deposit: Amount, now: Time) -> ChainResult<Amount> {
		if !deposit.is_positive() {
			return Err(ChainError::InvariantViolation("lend deposit must be positive".into()));
		}
		let pool = self.pools.get(id)?.clone();
		let outstanding = registry.get_by_symbol(pool.credit_symbol)?.dynamic.total_supply;
		let backing = pool.base_balance.0 as i128 + pool.borrowed_balance.0 as i128;
		let shares = if outstanding.0 == 0 || backing == 0 {
			deposit.0
		} else {
			i64::try_from((deposit.0 as i128 * outstanding.0 as i128) / backing)
				.map_err(|_| ChainError::InvariantViolation("lend share math overflowed".into()))?
		};
		if shares <= 0 {
			return Err(ChainError::InvariantViolation("deposit too small to issue a credit share".into()));
		}

		self.pools.modify(id, |p| p.base_balance = Amount(p.base_balance.0.saturating_add(deposit.0)))?;
		registry.adjust_compartment(pool.base_symbol, SupplyCompartment::Pending, deposit, now)?;
		registry.mint(pool.credit_symbol, SupplyCompartment::Liquid, Amount(shares), now)?;
		log::debug!(target: "credit-pool", "lend {deposit} {} -> {shares} {}", pool.base_symbol, pool.credit_symbol);
		Ok(Amount(shares))
	}

	/// Symmetric to `lend`; rejects a withdrawal that would pull from
	/// `borrowed_balance`.
	pub fn withdraw(&mut self, registry: &mut AssetRegistryState, id: Id<CreditPool>, shares: Amount, now: Time) -> ChainResult<Amount> {
		if !shares.is_positive() {
			return Err(ChainError::InvariantViolation("withdraw shares must be positive".into()));
		}
		let pool = self.pools.get(id)?.clone();
		let outstanding = registry.get_by_symbol(pool.credit_symbol)?.dynamic.total_supply;
		if shares.0 > outstanding.0 {
			return Err(ChainError::InsufficientBalance("withdraw exceeds outstanding credit shares".into()));
		}
		let backing = pool.base_balance.0 as i128 + pool.borrowed_balance.0 as i128;
		let base_out = i64::try_from((shares.0 as i128 * backing) / outstanding.0.max(1) as i128)
			.map_err(|_| ChainError::InvariantViolation("withdraw math overflowed".into()))?;
		if base_out > pool.base_balance.0 {
			return Err(ChainError::InsufficientBalance(
				"withdrawal cannot pull from the pool's borrowed balance".into(),
			));
		}

		self.pools.modify(id, |p| p.base_balance = Amount(p.base_balance.0.saturating_sub(base_out)))?;
		registry.adjust_compartment(pool.base_symbol, SupplyCompartment::Pending, Amount(-base_out), now)?;
		registry.burn(pool.credit_symbol, SupplyCompartment::Liquid, shares, now)?;
		Ok(Amount(base_out))
	}

	/// Moves `amount` from idle `base_balance` into `borrowed_balance`.
	pub fn borrow(&mut self, id: Id<CreditPool>, amount: Amount) -> ChainResult<()> {
		if !amount.is_positive() {
			return Err(ChainError::InvariantViolation("borrow amount must be positive".into()));
		}
		let pool = self.pools.get(id)?;
		if amount.0 > pool.base_balance.0 {
			return Err(ChainError::InsufficientBalance("credit pool has insufficient idle base balance".into()));
		}
		self.pools.modify(id, |p| {
			p.base_balance = Amount(p.base_balance.0 - amount.0);
			p.borrowed_balance = Amount(p.borrowed_balance.0 + amount.0);
		})?;
		Ok(())
	}

	/// Repays `amount` of outstanding debt back into idle `base_balance`.
	pub fn repay(&mut self, id: Id<CreditPool>, amount: Amount) -> ChainResult<()> {
		if !amount.is_positive() {
			return Err(ChainError::InvariantViolation("repay amount must be positive".into()));
		}
		self.pools.modify(id, |p| {
			let applied = amount.0.min(p.borrowed_balance.0);
			p.borrowed_balance = Amount(p.borrowed_balance.0 - applied);
			p.base_balance = Amount(p.base_balance.0 + amount.0);
		})?;
		Ok(())
	}

	/// Compounds outstanding debt at the pool's current interest rate over
	/// the elapsed time since `last_accrued`.
	pub fn accrue_interest(&mut self, params: &Parameters, id: Id<CreditPool>, now: Time) -> ChainResult<Amount> {
		let pool = self.pools.get(id)?.clone();
		if now <= pool.last_accrued {
			return Ok(Amount::ZERO);
		}
		let rate_bps = interest_rate_bps(params, pool.base_balance, pool.borrowed_balance);
		let elapsed_secs = now.saturating_sub(pool.last_accrued).as_secs() as i128;
		let growth = (pool.borrowed_balance.0 as i128 * rate_bps as i128 * elapsed_secs) / (10_000 * SECS_PER_YEAR);
		let growth = i64::try_from(growth.max(0)).unwrap_or(i64::MAX);
		self.pools.modify(id, |p| {
			p.borrowed_balance = Amount(p.borrowed_balance.0.saturating_add(growth));
			p.last_interest_rate_bps = rate_bps;
			p.last_accrued = now;
		})?;
		Ok(Amount(growth))
	}

	/// Ticks every pool's interest accrual.
	pub fn accrue_all(&mut self, params: &Parameters, now: Time) -> ChainResult<()> {
		let ids: Vec<Id<CreditPool>> = self.pools.iter().map(|(id, _)| id).collect();
		for id in ids {
			self.accrue_interest(params, id, now)?;
		}
		Ok(())
	}

	/// Every pool id currently in the book, for callers that need to accrue
	/// a pool and then apportion the resulting growth elsewhere (e.g. across
	/// open loans) rather than just calling `accrue_all`.
	pub fn pool_ids(&self) -> Vec<Id<CreditPool>> {
		self.pools.iter().map(|(id, _)| id).collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chain_primitives::AccountName;

	fn sym(s: &str) -> AssetSymbol {
		AssetSymbol::new(s).unwrap()
	}

	fn acct(s: &str) -> AccountName {
		AccountName::new(s).unwrap()
	}

	fn setup() -> (AssetRegistryState, CreditPoolState, Parameters, Id<CreditPool>) {
		let params = Parameters::default();
		let mut registry = AssetRegistryState::new();
		let t0 = Time::from_secs(0);
		registry.create_asset(sym("USD"), AssetType::Currency, acct("issuer"), AssetFlags::default(), t0).unwrap();
		let mut pools = CreditPoolState::new();
		let id = pools.create_pool(&mut registry, acct("issuer"), sym("USD"), sym("USDCREDIT"), t0).unwrap();
		(registry, pools, params, id)
	}

	#[test]
	fn first_lend_is_one_to_one() {
		let (mut registry, mut pools, _params, id) = setup();
		let t0 = Time::from_secs(0);
		let shares = pools.lend(&mut registry, id, Amount(1_000 * chain_primitives::UNIT), t0).unwrap();
		assert_eq!(shares, Amount(1_000 * chain_primitives::UNIT));
	}

	#[test]
	fn withdraw_cannot_pull_from_borrowed_balance() {
		let (mut registry, mut pools, _params, id) = setup();
		let t0 = Time::from_secs(0);
		let shares = pools.lend(&mut registry, id, Amount(1_000 * chain_primitives::UNIT), t0).unwrap();
		pools.borrow(id, Amount(900 * chain_primitives::UNIT)).unwrap();
		let err = pools.withdraw(&mut registry, id, shares, t0).unwrap_err();
		assert!(matches!(err, ChainError::InsufficientBalance(_)));
	}

	#[test]
	fn interest_accrual_grows_borrowed_balance_and_share_price() {
		let (mut registry, mut pools, params, id) = setup();
		let t0 = Time::from_secs(0);
		pools.lend(&mut registry, id, Amount(1_000 * chain_primitives::UNIT), t0).unwrap();
		pools.borrow(id, Amount(800 * chain_primitives::UNIT)).unwrap();
		let one_year = t0.saturating_add_secs(SECS_PER_YEAR as u64);
		let growth = pools.accrue_interest(&params, id, one_year).unwrap();
		assert!(growth.is_positive());
		let pool = pools.get(id).unwrap();
		assert!(pool.borrowed_balance.0 > 800 * chain_primitives::UNIT);
	}

	#[test]
	fn interest_rate_is_capped_at_fixed_cap() {
		let params = Parameters::default();
		let rate = interest_rate_bps(&params, Amount::ZERO, Amount(1_000_000 * chain_primitives::UNIT));
		assert_eq!(rate, params.credit_fixed_cap_bps);
	}
}
