//! Cross-module service traits so modules can depend on each other through
//! a narrow interface instead of a concrete type.

use chain_primitives::{AccountName, AssetSymbol, AssetType, Price};

/// Looks up the current median price for a symbol pair. Implemented by
/// whatever holds the price-feed table; consumed by the credit pool, CDP
/// call orders, and voting-power calculations.
pub trait PriceSource {
	/// Returns `None` if there is no feed, or the freshest feed is older than
	/// the configured `feed_lifetime`.
	fn median_price(&self, base: AssetSymbol, quote: AssetSymbol) -> Option<Price>;
}

/// Asset metadata and issuer policy flags.
pub trait AssetRegistry {
	fn exists(&self, symbol: AssetSymbol) -> bool;
	fn asset_type(&self, symbol: AssetSymbol) -> Option<AssetType>;
	fn is_transfer_restricted(&self, symbol: AssetSymbol) -> bool;
	fn is_confidential_enabled(&self, symbol: AssetSymbol) -> bool;
	fn requires_balance_whitelist(&self, symbol: AssetSymbol) -> bool;
	fn is_whitelisted(&self, symbol: AssetSymbol, account: AccountName) -> bool;
	fn charges_market_fee(&self, symbol: AssetSymbol) -> bool;
}

/// Account activity and transfer-authorization policy.
pub trait AuthorityProvider {
	/// Active accounts only may initiate or receive operations.
	fn is_active(&self, account: AccountName) -> bool;

	/// A delegate is transfer-authorized if `owner`'s permission policy
	/// includes `signatory`. An owner always authorizes itself.
	fn is_authorized_transfer(&self, owner: AccountName, signatory: AccountName) -> bool;
}
