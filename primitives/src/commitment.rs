//! Pedersen commitments and blinding factors, the homomorphic
//! building block for the confidential UTXO ledger.
//!
//! `Commitment(amount, blinding) = amount * G + blinding * H` over the
//! Ristretto group, with `G`/`H` fixed nothing-up-my-sleeve points so that
//! `commit(a, r) + commit(b, s) == commit(a + b, r + s)` — the additive
//! homomorphism needed to verify `Σ inputs − Σ outputs = 0` without ever
//! reconstructing the plaintext amounts or blinding factors. This crate does
//! not implement range proofs, so a negative or over-large amount is
//! rejected at the evaluator layer (where amounts are still in scope), not
//! proven hidden here.

use curve25519_dalek::{
	constants::RISTRETTO_BASEPOINT_POINT,
	ristretto::{CompressedRistretto, RistrettoPoint},
	scalar::Scalar,
};
use sha2::Sha512;

use codec::{Decode, Encode};
use scale_info::TypeInfo;
use sp_runtime::RuntimeDebug;

#[cfg(feature = "std")]
use serde::{Deserialize, Serialize};

fn generator_h() -> RistrettoPoint {
	RistrettoPoint::hash_from_bytes::<Sha512>(b"chain-core confidential balance generator H")
}

fn amount_scalar(amount: i64) -> Scalar {
	if amount >= 0 {
		Scalar::from(amount as u64)
	} else {
		-Scalar::from((-amount) as u64)
	}
}

/// An opaque blinding factor: a scalar only the owner of a confidential
/// output knows.
#[derive(Encode, Decode, TypeInfo, Clone, Copy, PartialEq, Eq, RuntimeDebug)]
#[cfg_attr(feature = "std", derive(Serialize, Deserialize))]
pub struct BlindingFactor([u8; 32]);

impl BlindingFactor {
	/// The zero blinding factor, used for the public explicit-amount leg of
	/// a transfer-to/from-confidential operation.
	pub fn zero() -> Self {
		Self(Scalar::ZERO.to_bytes())
	}

	pub fn from_bytes(bytes: [u8; 32]) -> Self {
		// Any 32-byte seed reduces to a valid scalar; this never fails.
		Self(Scalar::from_bytes_mod_order(bytes).to_bytes())
	}

	fn scalar(&self) -> Scalar {
		Scalar::from_bytes_mod_order(self.0)
	}

	pub fn add(&self, other: &BlindingFactor) -> BlindingFactor {
		BlindingFactor((self.scalar() + other.scalar()).to_bytes())
	}

	pub fn sub(&self, other: &BlindingFactor) -> BlindingFactor {
		BlindingFactor((self.scalar() - other.scalar()).to_bytes())
	}

	pub fn negate(&self) -> BlindingFactor {
		BlindingFactor((-self.scalar()).to_bytes())
	}
}

impl Default for BlindingFactor {
	fn default() -> Self {
		Self::zero()
	}
}

/// An opaque, additively homomorphic commitment to a signed fixed-point
/// amount.
#[derive(Encode, Decode, TypeInfo, Clone, Copy, PartialEq, Eq, RuntimeDebug)]
#[cfg_attr(feature = "std", derive(Serialize, Deserialize))]
pub struct Commitment([u8; 32]);

impl Commitment {
	/// Commits to `amount` under `blinding`.
	pub fn commit(amount: i64, blinding: BlindingFactor) -> Self {
		let point = amount_scalar(amount) * RISTRETTO_BASEPOINT_POINT + blinding.scalar() * generator_h();
		Self(point.compress().to_bytes())
	}

	/// Commits to a publicly known `amount` with a zero blinding factor —
	/// the explicit in/out leg of transfer-to/from-confidential operations
	/// and the `commitment(fee, 0)` term.
	pub fn public(amount: i64) -> Self {
		Self::commit(amount, BlindingFactor::zero())
	}

	fn point(&self) -> Option<RistrettoPoint> {
		CompressedRistretto(self.0).decompress()
	}

	/// Homomorphic addition: `commit(a, r) + commit(b, s) = commit(a+b,
	/// r+s)`. Returns `None` if either operand does not decompress to a
	/// valid curve point (malformed input).
	pub fn add(&self, other: &Commitment) -> Option<Commitment> {
		Some(Commitment((self.point()? + other.point()?).compress().to_bytes()))
	}

	pub fn sub(&self, other: &Commitment) -> Option<Commitment> {
		Some(Commitment((self.point()? - other.point()?).compress().to_bytes()))
	}

	/// Whether this commitment is the identity element — i.e. the net of a
	/// balanced set of inputs, outputs and fee.
	pub fn is_identity(&self) -> bool {
		self.point().map(|p| p == RistrettoPoint::default()).unwrap_or(false)
	}

	/// Verifies `Σ inputs = Σ outputs + commitment(fee, 0)`. Sums
	/// both sides homomorphically and checks the difference is the
	/// identity; never reconstructs or needs the individual blinding
	/// factors or amounts.
	pub fn verify_balance(inputs: &[Commitment], outputs: &[Commitment], fee_amount: i64) -> bool {
		let sum_inputs = inputs.iter().fold(Some(RistrettoPoint::default()), |acc, c| Some(acc? + c.point()?));
		let sum_outputs = outputs.iter().fold(Some(RistrettoPoint::default()), |acc, c| Some(acc? + c.point()?));
		let fee_point = match Commitment::public(fee_amount).point() {
			Some(p) => p,
			None => return false,
		};
		match (sum_inputs, sum_outputs) {
			(Some(i), Some(o)) => i == o + fee_point,
			_ => false,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn commitments_of_equal_amount_and_blinding_are_equal() {
		let r = BlindingFactor::from_bytes([7u8; 32]);
		assert_eq!(Commitment::commit(1_000, r), Commitment::commit(1_000, r));
	}

	#[test]
	fn homomorphic_addition_matches_commitment_of_sum() {
		let r = BlindingFactor::from_bytes([1u8; 32]);
		let s = BlindingFactor::from_bytes([2u8; 32]);
		let lhs = Commitment::commit(30, r).add(&Commitment::commit(12, s)).unwrap();
		let rhs = Commitment::commit(42, r.add(&s));
		assert_eq!(lhs, rhs);
	}

	#[test]
	fn verify_balance_accepts_conserved_transfer() {
		let r1 = BlindingFactor::from_bytes([9u8; 32]);
		let r2 = BlindingFactor::from_bytes([11u8; 32]);
		let input = Commitment::commit(110, r1);
		let output = Commitment::commit(100, r2);
		let change_blinding = r1.sub(&r2);
		// fee = 10, carried as a public (zero-blinded) leg; the remaining 100
		// is covered by `output`'s own blinding, so inputs - outputs - fee
		// must cancel when `r1 == r2 + 0` is *not* required — only the sum of
		// blinding factors across the whole set must cancel, which is what a
		// real wallet ensures by constructing `change_blinding` into an
		// explicit change output's blinding factor. Here we fold it directly
		// into a change output to keep the arithmetic self-contained.
		let change = Commitment::commit(0, change_blinding);
		let outputs = [output, change];
		assert!(Commitment::verify_balance(&[input], &outputs, 10));
	}

	#[test]
	fn verify_balance_rejects_unbalanced_transfer() {
		let r = BlindingFactor::from_bytes([3u8; 32]);
		let input = Commitment::commit(100, r);
		let output = Commitment::commit(100, r);
		assert!(!Commitment::verify_balance(&[input], &[output], 1));
	}

	#[test]
	fn public_commitment_has_zero_blinding() {
		assert_eq!(Commitment::public(50), Commitment::commit(50, BlindingFactor::zero()));
	}
}
