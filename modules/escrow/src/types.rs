use chain_primitives::{AccountName, Amount, AssetSymbol, Time};
use chain_support::Parameters;
use std::collections::{BTreeMap, BTreeSet};

/// An escrow record's position in the state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EscrowStatus {
	/// Created, terms still editable, no approver has posted a deposit yet.
	Proposed,
	/// At least one of the four approvers has deposited but not all four.
	Approving,
	/// All four of `from`/`to`/`from_mediator`/`to_mediator` have approved;
	/// `balance = payment + 4*bond`.
	Active,
	/// `from` or `to` disputed before `escrow_expiration`; an expanded
	/// mediator pool is voting towards a median release at
	/// `dispute_release_time`.
	Disputed,
}

/// A two-party conditional transfer mediated by a pair of approvers chosen
/// by each side.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Escrow {
	pub from: AccountName,
	pub to: AccountName,
	pub symbol: AssetSymbol,
	pub payment: Amount,
	/// Sum of everything currently deposited against this record: `payment`
	/// once `from` has approved, plus one bond per approval posted so far.
	pub balance: Amount,
	pub status: EscrowStatus,
	pub from_mediator: Option<AccountName>,
	pub to_mediator: Option<AccountName>,
	pub from_approved: bool,
	pub to_approved: bool,
	pub from_mediator_approved: bool,
	pub to_mediator_approved: bool,
	/// Additional mediators allocated on dispute, disjoint from the four
	/// initial participants.
	pub dispute_mediators: BTreeSet<AccountName>,
	/// Subset of `dispute_mediators` that has posted its bond.
	pub dispute_approved: BTreeSet<AccountName>,
	/// Release percentages (basis points of 100%) submitted so far by any
	/// participant, used only once the record is `Disputed`.
	pub release_submissions: BTreeMap<AccountName, u32>,
	/// Deadline by which all four initial approvals must be in, or the
	/// record auto-refunds.
	pub acceptance_time: Time,
	/// Before this time, only `from` at 100% or `to` at 0% may release
	/// unilaterally; a dispute may also only be opened before this time.
	pub escrow_expiration: Time,
	/// Set once disputed; the median of `release_submissions` applies at
	/// this instant.
	pub dispute_release_time: Option<Time>,
}

impl Escrow {
	/// `payment * escrow_bond_percent`, the deposit owed
	/// by every approver including dispute mediators.
	pub fn bond(&self, params: &Parameters) -> Amount {
		self.payment
			.scale_rational(params.escrow_bond_percent_bps as i128, 10_000)
			.unwrap_or(Amount::ZERO)
	}

	/// `payment·[from_approved] + bond·count(approvals=true)`.
	pub fn expected_balance(&self, params: &Parameters) -> Amount {
		let bond = self.bond(params);
		let mut total = Amount::ZERO;
		if self.from_approved {
			total = Amount(total.0 + self.payment.0 + bond.0);
		}
		for approved in [self.to_approved, self.from_mediator_approved, self.to_mediator_approved] {
			if approved {
				total = Amount(total.0 + bond.0);
			}
		}
		total = Amount(total.0 + bond.0 * self.dispute_approved.len() as i64);
		total
	}

	/// Whether every one of the four initial approvers has posted.
	pub fn all_four_approved(&self) -> bool {
		self.from_approved && self.to_approved && self.from_mediator_approved && self.to_mediator_approved
	}

	/// Every account with a live bond deposit at stake: a candidate set for
	/// "who may submit a release percentage".
	pub fn eligible_voters(&self) -> Vec<AccountName> {
		let mut voters = vec![self.from, self.to];
		if let Some(m) = self.from_mediator {
			voters.push(m);
		}
		if let Some(m) = self.to_mediator {
			voters.push(m);
		}
		voters.extend(self.dispute_approved.iter().copied());
		voters
	}
}
