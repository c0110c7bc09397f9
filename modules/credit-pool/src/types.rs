use chain_primitives::{AssetSymbol, Time};

/// A lending pool with an implicit, non-decreasing share price. `base_balance` is idle and redeemable; `borrowed_balance`
/// is lent out and accrues interest, growing the implicit price of the
/// credit asset (`(base_balance + borrowed_balance) / credit_outstanding`)
/// without ever minting new credit shares for interest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreditPool {
	pub base_symbol: AssetSymbol,
	pub credit_symbol: AssetSymbol,
	pub base_balance: chain_primitives::Amount,
	pub borrowed_balance: chain_primitives::Amount,
	pub last_interest_rate_bps: u32,
	pub last_accrued: Time,
}
