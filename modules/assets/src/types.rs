use chain_primitives::{AccountName, Amount, AssetSymbol, AssetType, Time};

/// Issuer policy flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AssetFlags {
	pub transfer_restricted: bool,
	pub confidential_enabled: bool,
	pub force_settle_disabled: bool,
	pub require_balance_whitelist: bool,
	pub override_authority: bool,
	pub charge_market_fee: bool,
}

/// Per-asset dynamic supply counters.
///
/// Invariant: for every asset,
/// `Σ_accounts(liquid+staked+reward+savings) + pending_supply +
/// confidential_supply + accumulated_fees = total_supply`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AssetDynamicData {
	pub total_supply: Amount,
	pub liquid_supply: Amount,
	pub staked_supply: Amount,
	pub reward_supply: Amount,
	pub savings_supply: Amount,
	pub pending_supply: Amount,
	pub confidential_supply: Amount,
	pub accumulated_fees: Amount,
	pub fee_pool: Amount,
	/// Tracked separately; does not add to `total_supply`. Must
	/// equal `receiving_supply` at block boundaries.
	pub delegated_supply: Amount,
	pub receiving_supply: Amount,
}

impl AssetDynamicData {
	/// `Σ over accounts of (liquid+staked+reward+savings) + pending_supply +
	/// confidential_supply + accumulated_fees`, reconstructed from the
	/// counters this struct tracks rather than by summing every account
	/// balance (that cross-module sum lives in `modules/evaluator`'s
	/// invariant checker, which has both tables in view).
	pub fn accounted_total(&self) -> Option<Amount> {
		self.liquid_supply
			.checked_add(self.staked_supply)?
			.checked_add(self.reward_supply)?
			.checked_add(self.savings_supply)?
			.checked_add(self.pending_supply)?
			.checked_add(self.confidential_supply)?
			.checked_add(self.accumulated_fees)
	}

	pub fn satisfies_supply_conservation(&self) -> bool {
		self.accounted_total() == Some(self.total_supply)
	}
}

/// An asset definition plus its dynamic supply counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AssetRecord {
	pub symbol: AssetSymbol,
	pub asset_type: AssetType,
	pub issuer: AccountName,
	pub flags: AssetFlags,
	pub dynamic: AssetDynamicData,
	pub created: Time,
	pub last_updated: Time,
}
