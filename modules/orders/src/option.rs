use crate::types::{OptionOrder, StrikeDescriptor};
use chain_primitives::{Amount, Asset, AssetSymbol, Time, UNIT};
use chain_support::{ChainError, ChainResult, Parameters};

const SECS_PER_MONTH: u64 = 30 * 24 * 3600;

/// Builds the `2*num_strikes+1` strikes for one forward month around
/// `mid_price_micros`, spaced by `strike_width_percent_bps`. `multiple` scales the quantity delivered per
/// unit; callers typically pass `1`.
pub fn month_strikes(mid_price_micros: i64, params: &Parameters, expiration: Time, multiple: u32) -> Vec<StrikeDescriptor> {
	let mut strikes = Vec::with_capacity(2 * params.num_strikes as usize + 1);
	let step_bps = params.strike_width_percent_bps as i128;
	for offset in -(params.num_strikes as i128)..=(params.num_strikes as i128) {
		let factor = 10_000i128 + offset * step_bps;
		let strike_price = ((mid_price_micros as i128 * factor) / 10_000).clamp(1, i64::MAX as i128) as i64;
		strikes.push(StrikeDescriptor { strike_price_micros: strike_price, is_call: true, multiple, expiration });
		strikes.push(StrikeDescriptor { strike_price_micros: strike_price, is_call: false, multiple, expiration });
	}
	strikes
}

/// Rolls a pair's chain sheet: drops strikes that have expired and appends
/// a new far-month twelve months out, keeping the rolling window full.
pub fn roll(sheet: &mut Vec<StrikeDescriptor>, mid_price_micros: i64, params: &Parameters, now: Time) {
	sheet.retain(|s| s.expiration > now);
	let farthest = sheet.iter().map(|s| s.expiration).max().unwrap_or(now);
	let new_month = Time::from_micros(farthest.0.saturating_add(SECS_PER_MONTH * 1_000_000));
	sheet.extend(month_strikes(mid_price_micros, params, new_month, 1));
}

/// Issues `units` of an option position backed by locking
/// `units * multiple` of the underlying.
pub fn issue(owner: chain_primitives::AccountName, underlying_symbol: AssetSymbol, strike_symbol: AssetSymbol, strike: StrikeDescriptor, units: Amount) -> ChainResult<OptionOrder> {
	if !units.is_positive() {
		return Err(ChainError::InvariantViolation("option units must be positive".into()));
	}
	let locked = Amount(units.0.saturating_mul(strike.multiple as i64));
	Ok(OptionOrder { owner, underlying_symbol, strike_symbol, strike, units, locked_underlying: locked, exercised: false })
}

/// Exercises an outstanding option before expiry, delivering the exercise
/// amount at the strike price and consuming the option asset.
pub fn exercise(order: &mut OptionOrder, now: Time) -> ChainResult<Asset> {
	if order.exercised {
		return Err(ChainError::InvariantViolation("option already exercised".into()));
	}
	if now >= order.strike.expiration {
		return Err(ChainError::Expired("option has expired".into()));
	}
	let exercise_amount = (order.units.0 as i128 * order.strike.strike_price_micros as i128) / UNIT as i128;
	order.exercised = true;
	Ok(Asset {
		amount: Amount(exercise_amount.clamp(0, i64::MAX as i128) as i64),
		symbol: order.strike_symbol,
	})
}
