use chain_primitives::{Authority, AssetSymbol, AuthorityEntry, Commitment, Time};
use sha2::{Digest, Sha512};

/// A confidential balance: an unspent Pedersen-commitment output
/// owned by a threshold authority. `prev_txid`/`op_index`/`output_index`
/// trace the operation that created it, the way a UTXO chain's
/// `(txid, vout)` would, but unlike a plain UTXO the amount itself is never
/// stored in the clear.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConfidentialBalance {
	pub owner_authority: Authority,
	pub commitment: Commitment,
	pub symbol: AssetSymbol,
	pub prev_txid: [u8; 32],
	pub op_index: u16,
	pub output_index: u16,
	pub created: Time,
}

impl ConfidentialBalance {
	/// Digest of `(owner_authority, prev_txid, op_index, output_index,
	/// commitment, symbol, created)`, in that order. Used as the record's
	/// externally-visible identity; the in-process `Id<ConfidentialBalance>`
	/// remains the primary index key since it is cheaper to use inside
	/// `object-store`.
	pub fn hash(&self) -> [u8; 64] {
		let mut hasher = Sha512::new();
		for entry in &self.owner_authority.entries {
			match entry {
				AuthorityEntry::Account(a, w) => {
					hasher.update(a.as_str().as_bytes());
					hasher.update(w.to_le_bytes());
				}
				AuthorityEntry::Key(k, w) => {
					hasher.update(k);
					hasher.update(w.to_le_bytes());
				}
			}
		}
		hasher.update(self.owner_authority.weight_threshold.to_le_bytes());
		hasher.update(self.prev_txid);
		hasher.update(self.op_index.to_le_bytes());
		hasher.update(self.output_index.to_le_bytes());
		hasher.update(self.symbol.as_str().as_bytes());
		hasher.update(self.created.0.to_le_bytes());
		hasher.finalize().into()
	}
}

/// A new output to create, as supplied by the caller of a
/// transfer-to/from-confidential or fully-confidential operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConfidentialOutput {
	pub authority: Authority,
	pub commitment: Commitment,
}
