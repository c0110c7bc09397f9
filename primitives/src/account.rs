//! Short, printable account and asset symbol identifiers.
//!
//! Unlike a pubkey-hash chain, this ledger names accounts and assets with
//! short human strings (`alice`, `USD`), so both are fixed-capacity byte
//! arrays rather than hashes — cheap to copy, cheap to use as map keys.

use codec::{Decode, Encode, MaxEncodedLen};
use scale_info::TypeInfo;
use sp_runtime::RuntimeDebug;

#[cfg(feature = "std")]
use serde::{Deserialize, Serialize};

const ACCOUNT_NAME_CAPACITY: usize = 32;
const ASSET_SYMBOL_CAPACITY: usize = 12;

/// A short printable account identifier, e.g. `alice`.
///
/// Stored as a null-padded fixed byte array so it derives `Copy` and is cheap
/// to use as a composite-index key in a `BTreeMap`.
#[derive(Encode, Decode, MaxEncodedLen, TypeInfo, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, RuntimeDebug)]
#[cfg_attr(feature = "std", derive(Serialize, Deserialize))]
pub struct AccountName([u8; ACCOUNT_NAME_CAPACITY]);

impl AccountName {
	/// Builds an account name from a short ASCII string. Returns `None` if
	/// the string is empty, not ASCII, or longer than the fixed capacity.
	pub fn new(name: &str) -> Option<Self> {
		if name.is_empty() || name.len() > ACCOUNT_NAME_CAPACITY || !name.is_ascii() {
			return None;
		}
		let mut buf = [0u8; ACCOUNT_NAME_CAPACITY];
		buf[..name.len()].copy_from_slice(name.as_bytes());
		Some(Self(buf))
	}

	pub fn as_str(&self) -> &str {
		let end = self.0.iter().position(|&b| b == 0).unwrap_or(ACCOUNT_NAME_CAPACITY);
		core::str::from_utf8(&self.0[..end]).unwrap_or_default()
	}

	/// The network revenue account: the sentinel destination for positive
	/// deltas routed against the null account.
	pub fn network_revenue() -> Self {
		Self::new("network-revenue").expect("fits in capacity")
	}

	pub fn is_null(&self) -> bool {
		self.0 == [0u8; ACCOUNT_NAME_CAPACITY]
	}
}

impl core::fmt::Display for AccountName {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// A short uppercase asset ticker, e.g. `USD`, `ALICECOIN`.
#[derive(Encode, Decode, MaxEncodedLen, TypeInfo, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, RuntimeDebug)]
#[cfg_attr(feature = "std", derive(Serialize, Deserialize))]
pub struct AssetSymbol([u8; ASSET_SYMBOL_CAPACITY]);

impl AssetSymbol {
	pub fn new(symbol: &str) -> Option<Self> {
		if symbol.is_empty()
			|| symbol.len() > ASSET_SYMBOL_CAPACITY
			|| !symbol.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
		{
			return None;
		}
		let mut buf = [0u8; ASSET_SYMBOL_CAPACITY];
		buf[..symbol.len()].copy_from_slice(symbol.as_bytes());
		Some(Self(buf))
	}

	pub fn as_str(&self) -> &str {
		let end = self.0.iter().position(|&b| b == 0).unwrap_or(ASSET_SYMBOL_CAPACITY);
		core::str::from_utf8(&self.0[..end]).unwrap_or_default()
	}
}

impl core::fmt::Display for AssetSymbol {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		f.write_str(self.as_str())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn account_name_round_trips() {
		let a = AccountName::new("alice").unwrap();
		assert_eq!(a.as_str(), "alice");
	}

	#[test]
	fn account_name_rejects_oversize() {
		assert!(AccountName::new(&"x".repeat(ACCOUNT_NAME_CAPACITY + 1)).is_none());
	}

	#[test]
	fn asset_symbol_rejects_lowercase() {
		assert!(AssetSymbol::new("usd").is_none());
		assert!(AssetSymbol::new("USD").is_some());
	}
}
