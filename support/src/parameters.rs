//! Network parameters. Grouped into one struct with a `Default` impl,
//! passed around as plain values since there is no `Config`-trait-style
//! constant-injection layer in this design (see DESIGN.md).

use chain_primitives::AssetSymbol;

/// Number of equal tranches per stake/unstake cycle.
pub const N_INTERVALS: u32 = 4;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Parameters {
	/// Time between stake/unstake tranches.
	pub stake_interval_secs: u64,
	/// Delay between a savings-withdraw request and completion.
	pub savings_delay_secs: u64,
	/// Delay between un-delegation and reuse of the freed stake.
	pub delegation_return_delay_secs: u64,
	/// Percent of payment posted as bond by each escrow approver, in basis
	/// points (e.g. `500` = 5%).
	pub escrow_bond_percent_bps: u32,
	/// Extra mediators allocated on an escrow dispute.
	pub escrow_dispute_mediator_amount: u32,
	/// Voting window before an escrow dispute's median release applies.
	pub escrow_dispute_duration_secs: u64,
	/// Default validity window of a transfer request.
	pub transfer_request_duration_secs: u64,
	/// Option strike sheet spacing, in basis points.
	pub strike_width_percent_bps: u32,
	/// Number of strikes above and below the mid-price per expiration month.
	pub num_strikes: u32,
	/// Credit pool minimum interest rate, in basis points.
	pub credit_min_rate_bps: u32,
	/// Credit pool variable interest rate coefficient, in basis points.
	pub credit_var_rate_bps: u32,
	/// Credit pool interest rate cap, in basis points.
	pub credit_fixed_cap_bps: u32,
	/// Minimum collateralization ratio (collateral/debt) to open a margin
	/// order, in basis points.
	pub margin_initial_collateral_ratio_bps: u32,
	/// Below this collateralization ratio a margin order is force-closed.
	pub margin_maintenance_collateral_ratio_bps: u32,
	/// Below this collateralization ratio a call order is margin-called.
	pub call_maintenance_collateral_ratio_bps: u32,
	/// Protocol swap fee charged by the liquidity pool, in basis points.
	pub liquidity_pool_fee_bps: u32,
	/// Tolerance (in basis points of the 0-10000 percent scale) within which
	/// an escrow dispute participant's submission is considered to agree
	/// with the median, and so keeps their bond.
	pub escrow_dispute_tolerance_bps: u32,
	/// The network's core asset, first in liquidity-pool canonical ordering and first in
	/// multi-pool routing preference.
	pub core_asset_symbol: AssetSymbol,
	/// Second preference for multi-pool routing when two assets share no
	/// direct pool.
	pub usd_asset_symbol: AssetSymbol,
	/// A submitted price feed older than this is ignored by median price
	/// computation.
	pub feed_lifetime_secs: u64,
}

impl Default for Parameters {
	fn default() -> Self {
		Self {
			stake_interval_secs: 7 * 24 * 3600,
			savings_delay_secs: 3 * 24 * 3600,
			delegation_return_delay_secs: 5 * 24 * 3600,
			escrow_bond_percent_bps: 500,
			escrow_dispute_mediator_amount: 5,
			escrow_dispute_duration_secs: 7 * 24 * 3600,
			transfer_request_duration_secs: 7 * 24 * 3600,
			strike_width_percent_bps: 500,
			num_strikes: 10,
			credit_min_rate_bps: 200,
			credit_var_rate_bps: 2000,
			credit_fixed_cap_bps: 5000,
			margin_initial_collateral_ratio_bps: 12_000,
			margin_maintenance_collateral_ratio_bps: 11_000,
			call_maintenance_collateral_ratio_bps: 17_500,
			liquidity_pool_fee_bps: 30,
			escrow_dispute_tolerance_bps: 1000,
			core_asset_symbol: AssetSymbol::new("CORE").expect("fits in capacity"),
			usd_asset_symbol: AssetSymbol::new("USD").expect("fits in capacity"),
			feed_lifetime_secs: 3600,
		}
	}
}
