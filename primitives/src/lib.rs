// This file is part of this chain core.
// SPDX-License-Identifier: GPL-3.0-or-later WITH Classpath-exception-2.0

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Shared scalar types for the chain core: account/asset identifiers,
//! fixed-point amounts, rational prices and microsecond instants.
//!
//! Trimmed to the scalar vocabulary this engine actually needs (no
//! `AccountId32`/EVM address machinery: this ledger's accounts are short
//! printable names, not public-key hashes).

mod account;
mod asset;
mod commitment;
mod price;
mod time;

pub use account::{AccountName, AssetSymbol};
pub use asset::{Amount, Asset, PRECISION, UNIT};
pub use commitment::{BlindingFactor, Commitment};
pub use price::Price;
pub use time::Time;

use codec::{Decode, Encode, MaxEncodedLen};
use scale_info::TypeInfo;
use sp_runtime::RuntimeDebug;

#[cfg(feature = "std")]
use serde::{Deserialize, Serialize};

/// Asset type classification. Market-issued asset types
/// (`Bitasset`, `Prediction`, `LiquidityPoolShare`, `CreditPoolShare`,
/// `Option`) cannot be freely minted by an issuer.
#[derive(Encode, Decode, MaxEncodedLen, TypeInfo, Clone, Copy, PartialEq, Eq, RuntimeDebug)]
#[cfg_attr(feature = "std", derive(Serialize, Deserialize))]
pub enum AssetType {
	Currency,
	Standard,
	Equity,
	Credit,
	Bitasset,
	LiquidityPoolShare,
	CreditPoolShare,
	Option,
	Prediction,
	Gateway,
	Unique,
}

impl AssetType {
	/// Market-issued assets are minted/burned only by their owning module
	/// (dex, credit pool, CDP engine, option pool) rather than an issuer
	/// extrinsic.
	pub fn is_market_issued(self) -> bool {
		matches!(
			self,
			AssetType::Bitasset
				| AssetType::Prediction
				| AssetType::LiquidityPoolShare
				| AssetType::CreditPoolShare
				| AssetType::Option
		)
	}
}

/// A single weighted entry in a threshold authority: either an
/// account name or an opaque public key, each with a vote weight.
#[derive(Encode, Decode, TypeInfo, Clone, PartialEq, Eq, RuntimeDebug)]
#[cfg_attr(feature = "std", derive(Serialize, Deserialize))]
pub enum AuthorityEntry {
	Account(AccountName, u16),
	Key([u8; 33], u16),
}

/// A threshold set of weighted accounts/keys, as used to own a confidential
/// balance output.
#[derive(Encode, Decode, TypeInfo, Clone, PartialEq, Eq, RuntimeDebug, Default)]
#[cfg_attr(feature = "std", derive(Serialize, Deserialize))]
pub struct Authority {
	pub weight_threshold: u16,
	pub entries: Vec<AuthorityEntry>,
}

impl Authority {
	pub fn single_account(account: AccountName) -> Self {
		Self {
			weight_threshold: 1,
			entries: vec![AuthorityEntry::Account(account, 1)],
		}
	}

	/// The first account referenced by this authority, if any — used as a
	/// denormalized lookup key for a `by_account_auth` index.
	pub fn account_auth(&self) -> Option<AccountName> {
		self.entries.iter().find_map(|e| match e {
			AuthorityEntry::Account(a, _) => Some(*a),
			AuthorityEntry::Key(_, _) => None,
		})
	}

	pub fn is_well_formed(&self) -> bool {
		!self.entries.is_empty() && self.weight_threshold > 0
	}
}
