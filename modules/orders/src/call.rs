use crate::types::CallOrder;
use chain_primitives::{Amount, Asset, AssetSymbol, Price};
use chain_support::{ChainError, ChainResult, Parameters};
use module_assets::{AssetRegistryState, SupplyCompartment};

/// Whether `order` is below its maintenance collateralization and must be
/// margin-called.
pub fn is_margin_called(order: &CallOrder, params: &Parameters, feed_price: Price) -> ChainResult<bool> {
	let ratio = order
		.collateralization_bps(feed_price)
		.ok_or_else(|| ChainError::PriceFeedMissing(format!("no price for {}/{}", order.collateral_symbol, order.debt_symbol)))?;
	Ok(ratio <= params.call_maintenance_collateral_ratio_bps)
}

/// Liquidates a margin-called order by selling its collateral at the feed
/// price to retire its debt. Burns the retired debt and any surplus collateral is returned
/// to the borrower; a shortfall is logged as unsocialized bad debt.
pub fn liquidate(order: &mut CallOrder, registry: &mut AssetRegistryState, feed_price: Price, now: chain_primitives::Time) -> ChainResult<Amount> {
	let collateral_value = feed_price
		.convert(Asset { amount: order.collateral, symbol: order.collateral_symbol })
		.ok_or_else(|| ChainError::PriceFeedMissing(format!("no price for {}/{}", order.collateral_symbol, order.debt_symbol)))?
		.amount;

	let retired_debt = Amount(collateral_value.0.min(order.debt.0));
	let sold_collateral = if collateral_value.is_positive() {
		Amount(((retired_debt.0 as i128 * order.collateral.0 as i128) / collateral_value.0.max(1) as i128) as i64)
	} else {
		Amount::ZERO
	};

	if retired_debt.is_positive() {
		registry.burn(order.debt_symbol, SupplyCompartment::Liquid, retired_debt, now)?;
	}
	let surplus_collateral = Amount(order.collateral.0 - sold_collateral.0);
	if retired_debt.0 < order.debt.0 {
		log::warn!(
			target: "orders",
			"call order for {} liquidated with shortfall: {} of {} debt unretired",
			order.borrower,
			order.debt.0 - retired_debt.0,
			order.debt
		);
	}

	order.debt = Amount(order.debt.0 - retired_debt.0);
	order.collateral = surplus_collateral;
	Ok(surplus_collateral)
}

/// Settles a single call order into a shared settlement fund at a global
/// settlement price. Returns
/// any collateral surplus owed back to the borrower.
pub fn settle_into_fund(order: &mut CallOrder, settlement_fund: &mut Amount, settlement_price: Price) -> ChainResult<Amount> {
	let collateral_value = settlement_price
		.convert(Asset { amount: order.collateral, symbol: order.collateral_symbol })
		.ok_or_else(|| ChainError::PriceFeedMissing("settlement price missing a conversion".into()))?
		.amount;
	let owed = Amount(collateral_value.0.min(order.debt.0));
	*settlement_fund = Amount(settlement_fund.0.saturating_add(owed.0));
	let surplus_value = Amount(collateral_value.0 - owed.0);
	let surplus_collateral = settlement_price
		.invert()
		.convert(Asset { amount: surplus_value, symbol: order.debt_symbol })
		.map(|a| a.amount)
		.unwrap_or(Amount::ZERO);
	order.debt = Amount::ZERO;
	order.collateral = Amount::ZERO;
	Ok(surplus_collateral)
}

/// Redeems `debt_held` of the settled debt asset for a proportional share
/// of `settlement_fund` at `settlement_price`, draining the fund until
/// exhausted.
pub fn force_settlement_withdraw(
	settlement_fund: &mut Amount,
	debt_symbol: AssetSymbol,
	collateral_symbol: AssetSymbol,
	registry: &mut AssetRegistryState,
	debt_held: Amount,
	settlement_price: Price,
	now: chain_primitives::Time,
) -> ChainResult<Amount> {
	if !debt_held.is_positive() {
		return Err(ChainError::InvariantViolation("force settlement amount must be positive".into()));
	}
	let requested = settlement_price
		.invert()
		.convert(Asset { amount: debt_held, symbol: debt_symbol })
		.ok_or_else(|| ChainError::PriceFeedMissing("settlement price missing a conversion".into()))?
		.amount;
	let paid = Amount(requested.0.min(settlement_fund.0));
	if !paid.is_positive() {
		return Err(ChainError::InsufficientBalance("settlement fund is exhausted".into()));
	}
	*settlement_fund = Amount(settlement_fund.0 - paid.0);
	let redeemed_debt = if requested.0 == paid.0 {
		debt_held
	} else {
		Amount(((paid.0 as i128 * debt_held.0 as i128) / requested.0.max(1) as i128) as i64)
	};
	registry.burn(debt_symbol, SupplyCompartment::Liquid, redeemed_debt, now)?;
	let _ = collateral_symbol;
	Ok(paid)
}
