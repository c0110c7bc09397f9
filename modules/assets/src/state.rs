use crate::types::{AssetDynamicData, AssetFlags, AssetRecord};
use chain_primitives::{AccountName, Amount, AssetSymbol, AssetType, Time};
use chain_support::{AssetRegistry, ChainError, ChainResult};
use object_store::{Id, Table};
use std::collections::{BTreeMap, BTreeSet};

/// The six liquid/staked/reward/savings compartments plus the two ledger
/// totals that round out `AssetDynamicData`. `Delegated` and
/// `Receiving` are never routed through `move_supply` — delegation moves
/// balance between accounts, not between compartments of one account — so
/// they get their own adjustment entry point (`adjust_delegated_receiving`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SupplyCompartment {
	Liquid,
	Staked,
	Reward,
	Savings,
	Pending,
	Confidential,
}

impl AssetDynamicData {
	fn compartment_mut(&mut self, compartment: SupplyCompartment) -> &mut Amount {
		match compartment {
			SupplyCompartment::Liquid => &mut self.liquid_supply,
			SupplyCompartment::Staked => &mut self.staked_supply,
			SupplyCompartment::Reward => &mut self.reward_supply,
			SupplyCompartment::Savings => &mut self.savings_supply,
			SupplyCompartment::Pending => &mut self.pending_supply,
			SupplyCompartment::Confidential => &mut self.confidential_supply,
		}
	}

	/// Adds `delta` (may be negative) to a single compartment, rejecting any
	/// move that would drive it negative.
	pub fn adjust_compartment(&mut self, compartment: SupplyCompartment, delta: Amount) -> ChainResult<()> {
		let slot = self.compartment_mut(compartment);
		let next = slot
			.checked_add(delta)
			.ok_or_else(|| ChainError::InvariantViolation("supply compartment overflow".into()))?;
		if next.is_negative() {
			return Err(ChainError::InsufficientBalance(format!(
				"compartment {compartment:?} would go negative"
			)));
		}
		*slot = next;
		Ok(())
	}

	/// Mints `amount` into `compartment` and into `total_supply` together
	///. Rejected for market-issued asset types at the
	/// evaluator layer, which knows the asset's `AssetType`; this method only
	/// enforces the arithmetic.
	pub fn mint(&mut self, compartment: SupplyCompartment, amount: Amount) -> ChainResult<()> {
		if !amount.is_positive() {
			return Err(ChainError::InvariantViolation("mint amount must be positive".into()));
		}
		let total = self
			.total_supply
			.checked_add(amount)
			.ok_or_else(|| ChainError::InvariantViolation("total supply overflow".into()))?;
		self.adjust_compartment(compartment, amount)?;
		self.total_supply = total;
		Ok(())
	}

	/// Burns `amount` out of `compartment` and `total_supply` together.
	pub fn burn(&mut self, compartment: SupplyCompartment, amount: Amount) -> ChainResult<()> {
		if !amount.is_positive() {
			return Err(ChainError::InvariantViolation("burn amount must be positive".into()));
		}
		let total = self
			.total_supply
			.checked_sub(amount)
			.ok_or_else(|| ChainError::InsufficientBalance("burn exceeds total supply".into()))?;
		self.adjust_compartment(compartment, -amount)?;
		self.total_supply = total;
		Ok(())
	}

	/// Moves `amount` between two compartments, leaving `total_supply`
	/// untouched.
	pub fn move_supply(&mut self, from: SupplyCompartment, to: SupplyCompartment, amount: Amount) -> ChainResult<()> {
		if !amount.is_positive() {
			return Err(ChainError::InvariantViolation("move amount must be positive".into()));
		}
		self.adjust_compartment(from, -amount)?;
		self.adjust_compartment(to, amount)?;
		Ok(())
	}

	/// Adjusts `pending_supply` in isolation, used while a confidential
	/// mint/burn or cross-chain deposit is awaiting finality. A single entry
	/// point rather than separate `increase_pending`/`decrease_pending`
	/// calls: the sign of `delta` already distinguishes the two.
	pub fn adjust_pending_supply(&mut self, delta: Amount) -> ChainResult<()> {
		self.adjust_compartment(SupplyCompartment::Pending, delta)
	}

	/// `delegated_supply` and `receiving_supply` move in lockstep: a
	/// delegation increases both by the same amount (the delegator's
	/// committed total and the delegatee's received total), and its
	/// expiry/return decreases both. They never touch `total_supply`.
	pub fn adjust_delegated_receiving(&mut self, delta: Amount) -> ChainResult<()> {
		let next_delegated = self
			.delegated_supply
			.checked_add(delta)
			.ok_or_else(|| ChainError::InvariantViolation("delegated supply overflow".into()))?;
		let next_receiving = self
			.receiving_supply
			.checked_add(delta)
			.ok_or_else(|| ChainError::InvariantViolation("receiving supply overflow".into()))?;
		if next_delegated.is_negative() || next_receiving.is_negative() {
			return Err(ChainError::InsufficientBalance("delegated/receiving supply would go negative".into()));
		}
		self.delegated_supply = next_delegated;
		self.receiving_supply = next_receiving;
		Ok(())
	}

	/// Moves `amount` out of `liquid_supply` and into `accumulated_fees`
	///. `total_supply` is untouched: the
	/// fee stays inside the asset, owed to the issuer or fee pool.
	pub fn adjust_accumulated_fees(&mut self, amount: Amount) -> ChainResult<()> {
		let next = self
			.accumulated_fees
			.checked_add(amount)
			.ok_or_else(|| ChainError::InvariantViolation("accumulated fees overflow".into()))?;
		if next.is_negative() {
			return Err(ChainError::InsufficientBalance("accumulated fees would go negative".into()));
		}
		self.accumulated_fees = next;
		Ok(())
	}

	/// Moves collected fees from `accumulated_fees` into the redistributable
	/// `fee_pool`, or pays out of the pool when
	/// `amount` is negative.
	pub fn adjust_fee_pool(&mut self, amount: Amount) -> ChainResult<()> {
		let next = self
			.fee_pool
			.checked_add(amount)
			.ok_or_else(|| ChainError::InvariantViolation("fee pool overflow".into()))?;
		if next.is_negative() {
			return Err(ChainError::InsufficientBalance("fee pool would go negative".into()));
		}
		self.fee_pool = next;
		Ok(())
	}
}

/// The asset registry table plus its secondary indices: a symbol-keyed lookup over the primary `Table<AssetRecord>`, and a
/// per-asset whitelist of accounts permitted to hold a balance when
/// `require_balance_whitelist` is set.
#[derive(Clone, Debug, Default)]
pub struct AssetRegistryState {
	assets: Table<AssetRecord>,
	by_symbol: BTreeMap<AssetSymbol, Id<AssetRecord>>,
	whitelist: BTreeMap<AssetSymbol, BTreeSet<AccountName>>,
}

impl AssetRegistryState {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn get_by_symbol(&self, symbol: AssetSymbol) -> ChainResult<&AssetRecord> {
		let id = self
			.by_symbol
			.get(&symbol)
			.ok_or_else(|| ChainError::NotFound(format!("asset {symbol} not found")))?;
		self.assets.get(*id)
	}

	fn id_of(&self, symbol: AssetSymbol) -> ChainResult<Id<AssetRecord>> {
		self.by_symbol
			.get(&symbol)
			.copied()
			.ok_or_else(|| ChainError::NotFound(format!("asset {symbol} not found")))
	}

	/// Registers a new asset. Rejects a symbol that
	/// is already registered.
	pub fn create_asset(
		&mut self,
		symbol: AssetSymbol,
		asset_type: AssetType,
		issuer: AccountName,
		flags: AssetFlags,
		now: Time,
	) -> ChainResult<Id<AssetRecord>> {
		if self.by_symbol.contains_key(&symbol) {
			return Err(ChainError::AlreadyExists(format!("asset {symbol} already registered")));
		}
		let (id, _) = self.assets.create(|_| AssetRecord {
			symbol,
			asset_type,
			issuer,
			flags,
			dynamic: AssetDynamicData::default(),
			created: now,
			last_updated: now,
		});
		self.by_symbol.insert(symbol, id);
		Ok(id)
	}

	/// Applies `mutate` to the asset's dynamic data and bumps `last_updated`,
	/// the single choke point every supply-changing evaluator in this crate
	/// passes through.
	fn mutate_dynamic(
		&mut self,
		symbol: AssetSymbol,
		now: Time,
		mutate: impl FnOnce(&mut AssetDynamicData) -> ChainResult<()>,
	) -> ChainResult<()> {
		let id = self.id_of(symbol)?;
		let mut error = None;
		self.assets.modify(id, |record| {
			if let Err(e) = mutate(&mut record.dynamic) {
				error = Some(e);
				return;
			}
			record.last_updated = now;
		})?;
		match error {
			Some(e) => Err(e),
			None => {
				log::trace!(target: "assets", "asset {symbol} supply updated");
				Ok(())
			}
		}
	}

	pub fn mint(&mut self, symbol: AssetSymbol, compartment: SupplyCompartment, amount: Amount, now: Time) -> ChainResult<()> {
		self.mutate_dynamic(symbol, now, |d| d.mint(compartment, amount))
	}

	/// Adjusts a single supply compartment counter by `delta` without
	/// touching `total_supply`. Used by
	/// `modules/balances` to keep the registry's per-compartment counters in
	/// lockstep with every account balance compartment delta; transfers
	/// between two accounts net to zero here since each side calls this
	/// once with opposite signs.
	pub fn adjust_compartment(
		&mut self,
		symbol: AssetSymbol,
		compartment: SupplyCompartment,
		delta: Amount,
		now: Time,
	) -> ChainResult<()> {
		self.mutate_dynamic(symbol, now, |d| d.adjust_compartment(compartment, delta))
	}

	pub fn burn(&mut self, symbol: AssetSymbol, compartment: SupplyCompartment, amount: Amount, now: Time) -> ChainResult<()> {
		self.mutate_dynamic(symbol, now, |d| d.burn(compartment, amount))
	}

	pub fn move_supply(
		&mut self,
		symbol: AssetSymbol,
		from: SupplyCompartment,
		to: SupplyCompartment,
		amount: Amount,
		now: Time,
	) -> ChainResult<()> {
		self.mutate_dynamic(symbol, now, |d| d.move_supply(from, to, amount))
	}

	pub fn adjust_pending_supply(&mut self, symbol: AssetSymbol, delta: Amount, now: Time) -> ChainResult<()> {
		self.mutate_dynamic(symbol, now, |d| d.adjust_pending_supply(delta))
	}

	pub fn adjust_delegated_receiving(&mut self, symbol: AssetSymbol, delta: Amount, now: Time) -> ChainResult<()> {
		self.mutate_dynamic(symbol, now, |d| d.adjust_delegated_receiving(delta))
	}

	pub fn adjust_accumulated_fees(&mut self, symbol: AssetSymbol, amount: Amount, now: Time) -> ChainResult<()> {
		self.mutate_dynamic(symbol, now, |d| d.adjust_accumulated_fees(amount))
	}

	pub fn adjust_fee_pool(&mut self, symbol: AssetSymbol, amount: Amount, now: Time) -> ChainResult<()> {
		self.mutate_dynamic(symbol, now, |d| d.adjust_fee_pool(amount))
	}

	/// Sets an issuer policy flag.
	pub fn set_flags(&mut self, symbol: AssetSymbol, flags: AssetFlags, now: Time) -> ChainResult<()> {
		let id = self.id_of(symbol)?;
		self.assets.modify(id, |record| {
			record.flags = flags;
			record.last_updated = now;
		})?;
		Ok(())
	}

	/// Adds `account` to `symbol`'s balance whitelist. A no-op if
	/// already present.
	pub fn whitelist_add(&mut self, symbol: AssetSymbol, account: AccountName) -> ChainResult<()> {
		if !self.by_symbol.contains_key(&symbol) {
			return Err(ChainError::NotFound(format!("asset {symbol} not found")));
		}
		self.whitelist.entry(symbol).or_default().insert(account);
		Ok(())
	}

	pub fn whitelist_remove(&mut self, symbol: AssetSymbol, account: AccountName) -> ChainResult<()> {
		if let Some(set) = self.whitelist.get_mut(&symbol) {
			set.remove(&account);
		}
		Ok(())
	}
}

impl AssetRegistry for AssetRegistryState {
	fn exists(&self, symbol: AssetSymbol) -> bool {
		self.by_symbol.contains_key(&symbol)
	}

	fn asset_type(&self, symbol: AssetSymbol) -> Option<AssetType> {
		self.get_by_symbol(symbol).ok().map(|r| r.asset_type)
	}

	fn is_transfer_restricted(&self, symbol: AssetSymbol) -> bool {
		self.get_by_symbol(symbol).map(|r| r.flags.transfer_restricted).unwrap_or(false)
	}

	fn is_confidential_enabled(&self, symbol: AssetSymbol) -> bool {
		self.get_by_symbol(symbol).map(|r| r.flags.confidential_enabled).unwrap_or(false)
	}

	fn requires_balance_whitelist(&self, symbol: AssetSymbol) -> bool {
		self.get_by_symbol(symbol).map(|r| r.flags.require_balance_whitelist).unwrap_or(false)
	}

	fn is_whitelisted(&self, symbol: AssetSymbol, account: AccountName) -> bool {
		self.whitelist.get(&symbol).map(|set| set.contains(&account)).unwrap_or(false)
	}

	fn charges_market_fee(&self, symbol: AssetSymbol) -> bool {
		self.get_by_symbol(symbol).map(|r| r.flags.charge_market_fee).unwrap_or(false)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sym(s: &str) -> AssetSymbol {
		AssetSymbol::new(s).unwrap()
	}

	fn acct(s: &str) -> AccountName {
		AccountName::new(s).unwrap()
	}

	fn registry_with_usd() -> AssetRegistryState {
		let mut reg = AssetRegistryState::new();
		reg.create_asset(sym("USD"), AssetType::Currency, acct("issuer"), AssetFlags::default(), Time::from_secs(1))
			.unwrap();
		reg
	}

	#[test]
	fn mint_increases_compartment_and_total() {
		let mut reg = registry_with_usd();
		reg.mint(sym("USD"), SupplyCompartment::Liquid, Amount(500), Time::from_secs(2)).unwrap();
		let record = reg.get_by_symbol(sym("USD")).unwrap();
		assert_eq!(record.dynamic.liquid_supply, Amount(500));
		assert_eq!(record.dynamic.total_supply, Amount(500));
		assert!(record.dynamic.satisfies_supply_conservation());
	}

	#[test]
	fn burn_rejects_exceeding_total_supply() {
		let mut reg = registry_with_usd();
		let err = reg.burn(sym("USD"), SupplyCompartment::Liquid, Amount(1), Time::from_secs(2)).unwrap_err();
		assert!(matches!(err, ChainError::InsufficientBalance(_)));
	}

	#[test]
	fn move_supply_preserves_total() {
		let mut reg = registry_with_usd();
		reg.mint(sym("USD"), SupplyCompartment::Liquid, Amount(1_000), Time::from_secs(2)).unwrap();
		reg.move_supply(sym("USD"), SupplyCompartment::Liquid, SupplyCompartment::Staked, Amount(400), Time::from_secs(3))
			.unwrap();
		let record = reg.get_by_symbol(sym("USD")).unwrap();
		assert_eq!(record.dynamic.liquid_supply, Amount(600));
		assert_eq!(record.dynamic.staked_supply, Amount(400));
		assert_eq!(record.dynamic.total_supply, Amount(1_000));
		assert!(record.dynamic.satisfies_supply_conservation());
	}

	#[test]
	fn move_supply_rejects_insufficient_source() {
		let mut reg = registry_with_usd();
		let err = reg
			.move_supply(sym("USD"), SupplyCompartment::Liquid, SupplyCompartment::Staked, Amount(1), Time::from_secs(2))
			.unwrap_err();
		assert!(matches!(err, ChainError::InsufficientBalance(_)));
	}

	#[test]
	fn delegated_and_receiving_move_in_lockstep() {
		let mut reg = registry_with_usd();
		reg.adjust_delegated_receiving(sym("USD"), Amount(250), Time::from_secs(2)).unwrap();
		let record = reg.get_by_symbol(sym("USD")).unwrap();
		assert_eq!(record.dynamic.delegated_supply, Amount(250));
		assert_eq!(record.dynamic.receiving_supply, Amount(250));
		// total_supply is untouched by delegation bookkeeping.
		assert_eq!(record.dynamic.total_supply, Amount::ZERO);
	}

	#[test]
	fn whitelist_round_trip() {
		let mut reg = registry_with_usd();
		let alice = acct("alice");
		assert!(!AssetRegistry::is_whitelisted(&reg, sym("USD"), alice));
		reg.whitelist_add(sym("USD"), alice).unwrap();
		assert!(AssetRegistry::is_whitelisted(&reg, sym("USD"), alice));
		reg.whitelist_remove(sym("USD"), alice).unwrap();
		assert!(!AssetRegistry::is_whitelisted(&reg, sym("USD"), alice));
	}

	#[test]
	fn create_asset_rejects_duplicate_symbol() {
		let mut reg = registry_with_usd();
		let err = reg
			.create_asset(sym("USD"), AssetType::Currency, acct("issuer"), AssetFlags::default(), Time::from_secs(2))
			.unwrap_err();
		assert!(matches!(err, ChainError::AlreadyExists(_)));
	}

	#[test]
	fn asset_registry_trait_reflects_flags() {
		let mut reg = AssetRegistryState::new();
		let flags = AssetFlags {
			transfer_restricted: true,
			confidential_enabled: true,
			require_balance_whitelist: true,
			..Default::default()
		};
		reg.create_asset(sym("GOLD"), AssetType::Standard, acct("issuer"), flags, Time::from_secs(1))
			.unwrap();
		assert!(AssetRegistry::exists(&reg, sym("GOLD")));
		assert_eq!(AssetRegistry::asset_type(&reg, sym("GOLD")), Some(AssetType::Standard));
		assert!(AssetRegistry::is_transfer_restricted(&reg, sym("GOLD")));
		assert!(AssetRegistry::is_confidential_enabled(&reg, sym("GOLD")));
		assert!(AssetRegistry::requires_balance_whitelist(&reg, sym("GOLD")));
		assert!(!AssetRegistry::exists(&reg, sym("SILVER")));
	}
}
