//! Constant-product AMM math. All computations stay in `i128`
//! fixed-point arithmetic at the native `Amount` scale; no floating point
//! anywhere on this path.

use chain_primitives::UNIT;

const PRECISION: i128 = UNIT as i128;

/// Integer square root via Newton's method (floor of the real square root).
/// Used everywhere the pool math calls for a `sqrt` (LP issuance,
/// withdrawal, max-input-to-price).
pub fn isqrt(value: i128) -> i128 {
	if value < 2 {
		return value.max(0);
	}
	let mut x = value;
	let mut y = (x + 1) / 2;
	while y < x {
		x = y;
		y = (x + value / x) / 2;
	}
	x
}

/// `R = Br * I / (I + Bi)`: amount received for input `i` against reserves
/// `(balance_return, balance_input)`.
pub fn return_for_input(balance_return: i64, balance_input: i64, input: i64) -> Option<i64> {
	let denom = (balance_input as i128).checked_add(input as i128)?;
	if denom <= 0 {
		return None;
	}
	let out = (balance_return as i128).checked_mul(input as i128)?.checked_div(denom)?;
	i64::try_from(out).ok()
}

/// `I = Bi * (1 - R/Br) ... ` rearranged: input required for a given return
/// amount, `I = Bi * R / (Br - R)`.
pub fn input_for_return(balance_return: i64, balance_input: i64, ret: i64) -> Option<i64> {
	let denom = (balance_return as i128).checked_sub(ret as i128)?;
	if denom <= 0 {
		return None;
	}
	let out = (balance_input as i128).checked_mul(ret as i128)?.checked_div(denom)?;
	i64::try_from(out).ok()
}

/// Maximum input to move the final price of `balance_input` (in terms of
/// `balance_return`) to at most `target_num/target_den`:
/// `I(max) = sqrt(Br*Bi/Pf) - Bi`. The scale `UNIT` cancels
/// algebraically, so this operates directly on raw reserves.
pub fn max_input_to_price(balance_return: i64, balance_input: i64, target_num: i64, target_den: i64) -> Option<i64> {
	if target_num <= 0 {
		return None;
	}
	let value = (balance_return as i128)
		.checked_mul(balance_input as i128)?
		.checked_mul(target_den as i128)?
		.checked_div(target_num as i128)?;
	let sqrt_value = isqrt(value);
	let max_input = sqrt_value.checked_sub(balance_input as i128)?;
	i64::try_from(max_input.max(0)).ok()
}

/// LP share issuance for a single-sided deposit of `input` against reserve
/// `balance_input`, given `outstanding` LP shares already in circulation:
/// `Sr = Bs * (sqrt(1 + I/Bi) - 1)`.
pub fn issuance_for_deposit(outstanding: i64, balance_input: i64, input: i64) -> Option<i64> {
	if balance_input <= 0 || input < 0 {
		return None;
	}
	let ratio_scaled = isqrt(
		(balance_input as i128 + input as i128)
			.checked_mul(PRECISION)?
			.checked_mul(PRECISION)?
			.checked_div(balance_input as i128)?,
	);
	let delta = ratio_scaled.checked_sub(PRECISION)?;
	let shares = (outstanding as i128).checked_mul(delta)?.checked_div(PRECISION)?;
	i64::try_from(shares.max(0)).ok()
}

/// Amount returned for withdrawing `shares` of `outstanding` LP shares from
/// reserve `balance_return`: `R = Br * (1 - (1 - Si/Bs)^2)`.
pub fn withdrawal_return(outstanding: i64, balance_return: i64, shares: i64) -> Option<i64> {
	if outstanding <= 0 || shares < 0 || shares > outstanding {
		return None;
	}
	let share_scaled = (shares as i128).checked_mul(PRECISION)?.checked_div(outstanding as i128)?;
	let term = (2 * share_scaled * PRECISION - share_scaled * share_scaled).max(0);
	let out = (balance_return as i128).checked_mul(term)?.checked_div(PRECISION * PRECISION)?;
	i64::try_from(out.max(0)).ok()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn isqrt_matches_known_squares() {
		assert_eq!(isqrt(0), 0);
		assert_eq!(isqrt(1), 1);
		assert_eq!(isqrt(4), 2);
		assert_eq!(isqrt(99), 9);
		assert_eq!(isqrt(100), 10);
	}

	#[test]
	fn return_for_input_reduces_reserve_return() {
		let r = return_for_input(1_000 * UNIT, 1_000 * UNIT, 100 * UNIT).unwrap();
		assert!(r > 0 && r < 100 * UNIT);
	}

	#[test]
	fn input_for_return_is_consistent_with_return_for_input() {
		let br = 1_000 * UNIT;
		let bi = 1_000 * UNIT;
		let i = 100 * UNIT;
		let r = return_for_input(br, bi, i).unwrap();
		let recovered = input_for_return(br, bi, r).unwrap();
		// Integer rounding means this is within a small epsilon, not exact.
		assert!((recovered - i).abs() < UNIT / 100);
	}

	#[test]
	fn issuance_for_deposit_is_proportional_for_small_inputs() {
		let shares = issuance_for_deposit(1_000 * UNIT, 1_000 * UNIT, 10 * UNIT).unwrap();
		// Roughly 1% of outstanding supply for a 1% single-sided deposit.
		assert!(shares > 4 * UNIT && shares < 6 * UNIT);
	}

	#[test]
	fn withdrawal_return_of_all_shares_drains_reserve() {
		let out = withdrawal_return(1_000 * UNIT, 1_000 * UNIT, 1_000 * UNIT).unwrap();
		assert_eq!(out, 1_000 * UNIT);
	}

	#[test]
	fn withdrawal_return_of_no_shares_is_zero() {
		let out = withdrawal_return(1_000 * UNIT, 1_000 * UNIT, 0).unwrap();
		assert_eq!(out, 0);
	}
}
