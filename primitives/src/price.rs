//! `Price = (Asset base, Asset quote)`: a rational exchange rate compared by
//! cross-multiplication rather than floating division.

use crate::asset::Asset;
use codec::{Decode, Encode};
use scale_info::TypeInfo;
use sp_runtime::RuntimeDebug;

#[cfg(feature = "std")]
use serde::{Deserialize, Serialize};

#[derive(Encode, Decode, TypeInfo, Clone, Copy, PartialEq, Eq, RuntimeDebug)]
#[cfg_attr(feature = "std", derive(Serialize, Deserialize))]
pub struct Price {
	pub base: Asset,
	pub quote: Asset,
}

impl Price {
	pub fn new(base: Asset, quote: Asset) -> Self {
		Self { base, quote }
	}

	/// The sentinel null price: zero on both sides. Any operation that reads
	/// a null price must treat it as "no price available" (`PriceFeedMissing`).
	pub fn null(base_symbol: crate::account::AssetSymbol, quote_symbol: crate::account::AssetSymbol) -> Self {
		Self {
			base: Asset::zero(base_symbol),
			quote: Asset::zero(quote_symbol),
		}
	}

	pub fn is_null(&self) -> bool {
		self.base.amount.is_zero() || self.quote.amount.is_zero()
	}

	pub fn invert(self) -> Self {
		Self {
			base: self.quote,
			quote: self.base,
		}
	}

	/// Converts a `base`-denominated asset into `quote` using this price.
	/// `amount_in_quote = amount * quote.amount / base.amount`.
	pub fn convert(&self, amount: Asset) -> Option<Asset> {
		if amount.symbol != self.base.symbol || self.is_null() {
			return None;
		}
		let converted = amount
			.amount
			.scale_rational(self.quote.amount.0 as i128, self.base.amount.0 as i128)?;
		Some(Asset {
			amount: converted,
			symbol: self.quote.symbol,
		})
	}

	/// Cross-multiplication comparison: `self < other` iff
	/// `self.base * other.quote < other.base * self.quote` (after verifying
	/// the two prices quote the same asset pair, in either order).
	pub fn cross_compare(&self, other: &Price) -> Option<core::cmp::Ordering> {
		let (self_base, self_quote, other_base, other_quote) = if self.base.symbol == other.base.symbol
			&& self.quote.symbol == other.quote.symbol
		{
			(self.base.amount.0, self.quote.amount.0, other.base.amount.0, other.quote.amount.0)
		} else if self.base.symbol == other.quote.symbol && self.quote.symbol == other.base.symbol {
			let other = other.invert();
			(self.base.amount.0, self.quote.amount.0, other.base.amount.0, other.quote.amount.0)
		} else {
			return None;
		};

		let lhs = (self_base as i128) * (other_quote as i128);
		let rhs = (other_base as i128) * (self_quote as i128);
		Some(lhs.cmp(&rhs))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::account::AssetSymbol;

	fn sym(s: &str) -> AssetSymbol {
		AssetSymbol::new(s).unwrap()
	}

	#[test]
	fn convert_scales_by_ratio() {
		let p = Price::new(Asset::new(1, sym("CORE")), Asset::new(10, sym("USD")));
		let out = p.convert(Asset::new(5, sym("CORE"))).unwrap();
		assert_eq!(out.amount.0, 50);
		assert_eq!(out.symbol, sym("USD"));
	}

	#[test]
	fn invert_swaps_sides() {
		let p = Price::new(Asset::new(1, sym("CORE")), Asset::new(10, sym("USD")));
		let inv = p.invert();
		assert_eq!(inv.base.symbol, sym("USD"));
		assert_eq!(inv.quote.symbol, sym("CORE"));
	}

	#[test]
	fn cross_compare_equal_prices() {
		let a = Price::new(Asset::new(1, sym("CORE")), Asset::new(10, sym("USD")));
		let b = Price::new(Asset::new(2, sym("CORE")), Asset::new(20, sym("USD")));
		assert_eq!(a.cross_compare(&b), Some(core::cmp::Ordering::Equal));
	}
}
