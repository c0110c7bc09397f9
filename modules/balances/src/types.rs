use chain_primitives::{AccountName, Amount, AssetSymbol, Time};

/// Per-`(owner, symbol)` account balance: six non-negative
/// compartments plus the stake/unstake schedule state that drives the
/// maintenance ticks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccountBalance {
	pub owner: AccountName,
	pub symbol: AssetSymbol,

	pub liquid: Amount,
	pub staked: Amount,
	pub reward: Amount,
	pub savings: Amount,
	pub delegated: Amount,
	pub receiving: Amount,

	pub stake_rate: Amount,
	pub to_stake: Amount,
	pub total_staked: Amount,
	pub next_stake_time: Time,

	pub unstake_rate: Amount,
	pub to_unstake: Amount,
	pub total_unstaked: Amount,
	pub next_unstake_time: Time,

	pub last_interest_time: Time,
}

impl AccountBalance {
	pub fn new(owner: AccountName, symbol: AssetSymbol) -> Self {
		Self {
			owner,
			symbol,
			liquid: Amount::ZERO,
			staked: Amount::ZERO,
			reward: Amount::ZERO,
			savings: Amount::ZERO,
			delegated: Amount::ZERO,
			receiving: Amount::ZERO,
			stake_rate: Amount::ZERO,
			to_stake: Amount::ZERO,
			total_staked: Amount::ZERO,
			next_stake_time: Time::MAX,
			unstake_rate: Amount::ZERO,
			to_unstake: Amount::ZERO,
			total_unstaked: Amount::ZERO,
			next_unstake_time: Time::MAX,
			last_interest_time: Time::default(),
		}
	}

	/// Sum of every compartment except `delegated`/`receiving`, which move
	/// balance already counted in `staked`.
	pub fn total_balance(&self) -> Option<Amount> {
		self.liquid.checked_add(self.staked)?.checked_add(self.reward)?.checked_add(self.savings)
	}

	/// Staked balance net of what is delegated away, plus what is received
	/// from others' delegations.
	pub fn voting_power(&self) -> Option<Amount> {
		self.staked.checked_sub(self.delegated)?.checked_add(self.receiving)
	}

	/// Stake amount still owed to `total_staked`, i.e. `to_stake -
	/// total_staked`.
	pub fn stake_remaining(&self) -> Option<Amount> {
		self.to_stake.checked_sub(self.total_staked)
	}

	pub fn unstake_remaining(&self) -> Option<Amount> {
		self.to_unstake.checked_sub(self.total_unstaked)
	}

	pub fn has_active_stake_schedule(&self) -> bool {
		self.next_stake_time != Time::MAX
	}

	pub fn has_active_unstake_schedule(&self) -> bool {
		self.next_unstake_time != Time::MAX
	}
}

/// A locked balance released in full at `vesting_time`.
/// Distinct from staking: no voting power, and not withdrawable early.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VestingBalance {
	pub owner: AccountName,
	pub symbol: AssetSymbol,
	pub amount: Amount,
	pub vesting_time: Time,
}

/// A savings withdrawal in flight. Unique per `(from,
/// request_id)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SavingsWithdraw {
	pub from: AccountName,
	pub to: AccountName,
	pub amount: Amount,
	pub request_id: u64,
	pub complete_time: Time,
}

/// An active delegation of staked balance for voting, keyed by
/// `(delegator, delegatee, symbol)` so the same pair can hold simultaneous
/// delegations in different assets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AssetDelegation {
	pub delegator: AccountName,
	pub delegatee: AccountName,
	pub symbol: AssetSymbol,
	pub amount: Amount,
}

/// A scheduled reduction of a delegation, maturing at `expiration`. Until maturity the released amount still counts against the
/// delegator's free staked balance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DelegationExpiration {
	pub delegator: AccountName,
	pub delegatee: AccountName,
	pub symbol: AssetSymbol,
	pub amount: Amount,
	pub expiration: Time,
}

/// An unstake route destination: `from` routes `percent` of each
/// unstake tranche to `to`, optionally re-staking it immediately.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UnstakeRoute {
	pub from: AccountName,
	pub to: AccountName,
	pub symbol: AssetSymbol,
	pub percent_bps: u32,
	pub auto_stake: bool,
}
