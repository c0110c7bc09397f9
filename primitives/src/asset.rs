//! Fixed-point `Amount`/`Asset` arithmetic. No floating point anywhere on a
//! consensus path.

use crate::account::AssetSymbol;
use codec::{Decode, Encode, MaxEncodedLen};
use scale_info::TypeInfo;
use sp_runtime::RuntimeDebug;

#[cfg(feature = "std")]
use serde::{Deserialize, Serialize};

/// Fixed 8-decimal precision.
pub const PRECISION: u32 = 8;
pub const UNIT: i64 = 100_000_000;

/// A signed, 8-decimal fixed-point amount.
#[derive(Encode, Decode, MaxEncodedLen, TypeInfo, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, RuntimeDebug)]
#[cfg_attr(feature = "std", derive(Serialize, Deserialize))]
pub struct Amount(pub i64);

impl Amount {
	pub const ZERO: Amount = Amount(0);

	pub fn checked_add(self, rhs: Amount) -> Option<Amount> {
		self.0.checked_add(rhs.0).map(Amount)
	}

	pub fn checked_sub(self, rhs: Amount) -> Option<Amount> {
		self.0.checked_sub(rhs.0).map(Amount)
	}

	pub fn is_positive(self) -> bool {
		self.0 > 0
	}

	pub fn is_zero(self) -> bool {
		self.0 == 0
	}

	pub fn is_negative(self) -> bool {
		self.0 < 0
	}

	/// Scales by a rational `numerator/denominator`, rounding toward zero
	/// (floor for positive amounts). Used for price conversion and
	/// proportional splits (unstake routes, escrow release percentages).
	pub fn scale_rational(self, numerator: i128, denominator: i128) -> Option<Amount> {
		if denominator == 0 {
			return None;
		}
		let scaled = (self.0 as i128).checked_mul(numerator)?.checked_div(denominator)?;
		i64::try_from(scaled).ok().map(Amount)
	}
}

impl core::ops::Neg for Amount {
	type Output = Amount;
	fn neg(self) -> Amount {
		Amount(-self.0)
	}
}

impl core::fmt::Display for Amount {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		let sign = if self.0 < 0 { "-" } else { "" };
		let abs = (self.0 as i128).unsigned_abs();
		let whole = abs / UNIT as u128;
		let frac = abs % UNIT as u128;
		write!(f, "{}{}.{:08}", sign, whole, frac)
	}
}

/// `Asset = (Amount, AssetSymbol)`.
#[derive(Encode, Decode, MaxEncodedLen, TypeInfo, Clone, Copy, PartialEq, Eq, RuntimeDebug)]
#[cfg_attr(feature = "std", derive(Serialize, Deserialize))]
pub struct Asset {
	pub amount: Amount,
	pub symbol: AssetSymbol,
}

impl Asset {
	pub fn new(amount: i64, symbol: AssetSymbol) -> Self {
		Self {
			amount: Amount(amount),
			symbol,
		}
	}

	pub fn zero(symbol: AssetSymbol) -> Self {
		Self {
			amount: Amount::ZERO,
			symbol,
		}
	}

	/// Addition requires matching symbols.
	pub fn checked_add(self, rhs: Asset) -> Option<Asset> {
		if self.symbol != rhs.symbol {
			return None;
		}
		Some(Asset {
			amount: self.amount.checked_add(rhs.amount)?,
			symbol: self.symbol,
		})
	}

	pub fn checked_sub(self, rhs: Asset) -> Option<Asset> {
		if self.symbol != rhs.symbol {
			return None;
		}
		Some(Asset {
			amount: self.amount.checked_sub(rhs.amount)?,
			symbol: self.symbol,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sym(s: &str) -> AssetSymbol {
		AssetSymbol::new(s).unwrap()
	}

	#[test]
	fn mismatched_symbols_reject_addition() {
		let a = Asset::new(100, sym("USD"));
		let b = Asset::new(100, sym("EUR"));
		assert!(a.checked_add(b).is_none());
	}

	#[test]
	fn display_formats_fixed_point() {
		assert_eq!(Amount(123_450_000).to_string(), "1.23450000");
		assert_eq!(Amount(-5_00_000_000).to_string(), "-5.00000000");
	}

	#[test]
	fn scale_rational_floors_toward_zero() {
		let a = Amount(10);
		assert_eq!(a.scale_rational(1, 3), Some(Amount(3)));
	}
}
