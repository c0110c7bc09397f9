use crate::types::MarginOrder;
use chain_primitives::{AccountName, Amount, Asset, AssetSymbol, Price, Time};
use chain_support::{ChainError, ChainResult, Parameters};
use module_credit_pool::{CreditPool, CreditPoolState};
use module_liquidity_pool::LiquidityPoolState;
use object_store::Id;

/// Borrows `debt` from the credit pool and constructs the margin order
/// record, enforcing the minimum opening collateralization. The caller inserts the returned record into the book as a sell
/// of `debt_symbol` for `position_symbol`.
#[allow(clippy::too_many_arguments)]
pub fn open(
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
) -> ChainResult<MarginOrder> {
	if !debt.is_positive() || !collateral.is_positive() {
		return Err(ChainError::InvariantViolation("margin order debt/collateral must be positive".into()));
	}
	let collateral_in_debt = collateral_price
		.convert(Asset { amount: collateral, symbol: collateral_symbol })
		.ok_or_else(|| ChainError::PriceFeedMissing(format!("no price for {collateral_symbol}/{debt_symbol}")))?;
	let order = MarginOrder {
		owner,
		credit_pool_id,
		debt_symbol,
		position_symbol,
		collateral_symbol,
		debt,
		position: Amount::ZERO,
		collateral,
		price: exchange_rate,
		last_accrued: now,
		closed: false,
	};
	let collateralization = order.collateralization_bps(collateral_in_debt.amount);
	if collateralization < params.margin_initial_collateral_ratio_bps {
		return Err(ChainError::InsufficientCollateral(format!(
			"margin order collateralization {collateralization}bps below minimum {}bps",
			params.margin_initial_collateral_ratio_bps
		)));
	}
	credit_pools.borrow(credit_pool_id, debt)?;
	Ok(order)
}

/// Accrues interest on outstanding debt for the elapsed time since
/// `last_accrued`, returning whether the order is now below the maintenance
/// collateralization and must be force-closed.
pub fn accrue_and_check(
	order: &mut MarginOrder,
	credit_pools: &CreditPoolState,
	params: &Parameters,
	credit_pool_id: Id<CreditPool>,
	collateral_price: Price,
	now: Time,
) -> ChainResult<bool> {
	if order.closed || now <= order.last_accrued {
		return Ok(false);
	}
	let rate_bps = credit_pools.get(credit_pool_id)?.last_interest_rate_bps;
	let elapsed_secs = now.saturating_sub(order.last_accrued).as_secs() as i128;
	const SECS_PER_YEAR: i128 = 365 * 24 * 3600;
	let growth = (order.debt.0 as i128 * rate_bps as i128 * elapsed_secs) / (10_000 * SECS_PER_YEAR);
	order.debt = Amount(order.debt.0.saturating_add(i64::try_from(growth.max(0)).unwrap_or(i64::MAX)));
	order.last_accrued = now;

	let collateral_in_debt = collateral_price
		.convert(Asset { amount: order.collateral, symbol: order.collateral_symbol })
		.ok_or_else(|| ChainError::PriceFeedMissing(format!("no price for {}/{}", order.collateral_symbol, order.debt_symbol)))?;
	let collateralization = order.collateralization_bps(collateral_in_debt.amount);
	Ok(collateralization < params.margin_maintenance_collateral_ratio_bps)
}

/// Liquidates the accumulated position back through the pool at current
/// market, repays outstanding debt and interest, and returns net
/// profit/loss to collateral. Returns
/// the final collateral balance to be credited to the owner.
pub fn force_close(
	order: &mut MarginOrder,
	pools: &mut LiquidityPoolState,
	registry: &mut module_assets::AssetRegistryState,
	credit_pools: &mut CreditPoolState,
	credit_pool_id: Id<CreditPool>,
	params: &Parameters,
	now: Time,
) -> ChainResult<Amount> {
	if order.closed {
		return Err(ChainError::InvariantViolation("margin order already closed".into()));
	}
	let proceeds = if order.position.is_positive() {
		pools
			.sell_exact_input_routed(registry, params, order.position_symbol, order.debt_symbol, order.position, Amount::ZERO, now)
			.map(|receipt| receipt.received.amount)
			.unwrap_or(Amount::ZERO)
	} else {
		Amount::ZERO
	};

	let owed = order.debt;
	let repay_amount = Amount(proceeds.0.min(owed.0));
	if repay_amount.is_positive() {
		credit_pools.repay(credit_pool_id, repay_amount)?;
	}

	let net = Amount(proceeds.0 - owed.0);
	// `net` is expressed in `debt_symbol`; approximate its value in
	// `collateral_symbol` at the order's fixed opening rate rather than
	// re-querying a feed, since force-close is a terminal operation.
	let collateral_delta = order
		.price
		.invert()
		.convert(Asset { amount: Amount(net.0.abs()), symbol: order.debt_symbol })
		.map(|a| a.amount)
		.unwrap_or(Amount::ZERO);

	order.collateral = if net.is_negative() {
		Amount(order.collateral.0.saturating_sub(collateral_delta.0))
	} else {
		Amount(order.collateral.0.saturating_add(collateral_delta.0))
	};
	if order.collateral.is_negative() {
		log::warn!(target: "orders", "margin order for {} left with negative collateral after force close", order.owner);
		order.collateral = Amount::ZERO;
	}
	order.debt = Amount::ZERO;
	order.position = Amount::ZERO;
	order.closed = true;
	Ok(order.collateral)
}
