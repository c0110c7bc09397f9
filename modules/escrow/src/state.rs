use crate::types::{Escrow, EscrowStatus};
use chain_primitives::{AccountName, Amount, AssetSymbol, Time};
use chain_support::{ChainError, ChainResult, Parameters};
use module_assets::AssetRegistryState;
use module_balances::{BalancesState, Compartment};
use object_store::{Id, Table};
use std::collections::{BTreeMap, BTreeSet};

/// The escrow engine's table and mediator pool.
/// Deposits are held by moving the depositor's liquid balance into the
/// asset's pending-supply compartment, the same escrowing mechanism the
/// order book uses for auction orders — there is no separate
/// escrow-owned account.
#[derive(Clone, Debug, Default)]
pub struct EscrowState {
	escrows: Table<Escrow>,
	/// Accounts willing to be drawn as dispute mediators. Selection is
	/// deterministic (lowest account name first, excluding the record's
	/// four participants) rather than stake-weighted or random, consistent
	/// with the core's single-threaded deterministic execution model; see DESIGN.md.
	eligible_mediators: BTreeSet<AccountName>,
}

impl EscrowState {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn get(&self, id: Id<Escrow>) -> ChainResult<&Escrow> {
		self.escrows.get(id)
	}

	pub fn register_mediator(&mut self, account: AccountName) {
		self.eligible_mediators.insert(account);
	}

	pub fn unregister_mediator(&mut self, account: AccountName) {
		self.eligible_mediators.remove(&account);
	}

	/// Creates a new escrow in the `Proposed` state; no funds move until the
	/// first approval.
	pub fn propose(
		&mut self,
		from: AccountName,
		to: AccountName,
		symbol: AssetSymbol,
		payment: Amount,
		acceptance_time: Time,
		escrow_expiration: Time,
	) -> ChainResult<Id<Escrow>> {
		if !payment.is_positive() {
			return Err(ChainError::InvariantViolation("escrow payment must be positive".into()));
		}
		if from == to {
			return Err(ChainError::InvariantViolation("escrow from and to must differ".into()));
		}
		if escrow_expiration <= acceptance_time {
			return Err(ChainError::InvariantViolation("escrow_expiration must be after acceptance_time".into()));
		}
		let escrow = Escrow {
			from,
			to,
			symbol,
			payment,
			balance: Amount::ZERO,
			status: EscrowStatus::Proposed,
			from_mediator: None,
			to_mediator: None,
			from_approved: false,
			to_approved: false,
			from_mediator_approved: false,
			to_mediator_approved: false,
			dispute_mediators: BTreeSet::new(),
			dispute_approved: BTreeSet::new(),
			release_submissions: BTreeMap::new(),
			acceptance_time,
			escrow_expiration,
		};
		Ok(self.escrows.create(|_| escrow).0)
	}

	/// Edits the payment amount of a still-`Proposed` record.
	pub fn edit_payment(&mut self, id: Id<Escrow>, payment: Amount) -> ChainResult<()> {
		if !payment.is_positive() {
			return Err(ChainError::InvariantViolation("escrow payment must be positive".into()));
		}
		let (_, after) = self.escrows.modify(id, |e| e.payment = payment)?;
		if !matches!(after.status, EscrowStatus::Proposed) {
			return Err(ChainError::InvariantViolation("escrow terms are frozen once any party has approved".into()));
		}
		Ok(())
	}

	/// Posts the caller's approval and deposit. `from`
	/// additionally deposits the full `payment`; `from`/`to` choose their
	/// mediator on approval. Returns whether the record just became
	/// `Active`.
	pub fn approve(
		&mut self,
		balances: &mut BalancesState,
		registry: &mut AssetRegistryState,
		id: Id<Escrow>,
		approver: AccountName,
		mediator_choice: Option<AccountName>,
		params: &Parameters,
		now: Time,
	) -> ChainResult<bool> {
		let escrow = self.escrows.get(id)?.clone();
		if matches!(escrow.status, EscrowStatus::Active | EscrowStatus::Disputed) {
			return Err(ChainError::InvariantViolation("escrow is no longer accepting approvals".into()));
		}
		if now > escrow.acceptance_time {
			return Err(ChainError::Expired("escrow acceptance window has lapsed".into()));
		}
		let bond = escrow.bond(params);
		let symbol = escrow.symbol;

		let deposit = if approver == escrow.from {
			if escrow.from_approved {
				return Err(ChainError::InvariantViolation("from has already approved".into()));
			}
			let mediator = mediator_choice.ok_or_else(|| ChainError::InvariantViolation("from must choose a mediator on approval".into()))?;
			if mediator == escrow.from || mediator == escrow.to {
				return Err(ChainError::InvariantViolation("mediator must be distinct from from/to".into()));
			}
			Amount(escrow.payment.0 + bond.0)
		} else if approver == escrow.to {
			if escrow.to_approved {
				return Err(ChainError::InvariantViolation("to has already approved".into()));
			}
			let mediator = mediator_choice.ok_or_else(|| ChainError::InvariantViolation("to must choose a mediator on approval".into()))?;
			if mediator == escrow.from || mediator == escrow.to || Some(mediator) == escrow.from_mediator {
				return Err(ChainError::InvariantViolation("mediator must be distinct from the other three participants".into()));
			}
			bond
		} else if Some(approver) == escrow.from_mediator {
			if escrow.from_mediator_approved {
				return Err(ChainError::InvariantViolation("from_mediator has already approved".into()));
			}
			bond
		} else if Some(approver) == escrow.to_mediator {
			if escrow.to_mediator_approved {
				return Err(ChainError::InvariantViolation("to_mediator has already approved".into()));
			}
			bond
		} else {
			return Err(ChainError::Unauthorized(format!("{approver} is not a party to this escrow")));
		};

		balances.adjust(registry, approver, symbol, Compartment::Liquid, -deposit, now)?;
		registry.adjust_pending_supply(symbol, deposit, now)?;

		let (_, after) = self.escrows.modify(id, |e| {
			e.balance = Amount(e.balance.0 + deposit.0);
			if approver == e.from {
				e.from_approved = true;
				e.from_mediator = mediator_choice;
			} else if approver == e.to {
				e.to_approved = true;
				e.to_mediator = mediator_choice;
			} else if Some(approver) == e.from_mediator {
				e.from_mediator_approved = true;
			} else if Some(approver) == e.to_mediator {
				e.to_mediator_approved = true;
			}
			e.status = if e.all_four_approved() { EscrowStatus::Active } else { EscrowStatus::Approving };
		})?;
		Ok(matches!(after.status, EscrowStatus::Active))
	}

	/// Cancels a record that has not yet gone `Active`, refunding every
	/// deposit posted so far.
	pub fn cancel(&mut self, balances: &mut BalancesState, registry: &mut AssetRegistryState, id: Id<Escrow>, caller: AccountName, params: &Parameters, now: Time) -> ChainResult<()> {
		let escrow = self.escrows.get(id)?.clone();
		if matches!(escrow.status, EscrowStatus::Active | EscrowStatus::Disputed) {
			return Err(ChainError::InvariantViolation("an active or disputed escrow cannot be cancelled".into()));
		}
		if caller != escrow.from && caller != escrow.to {
			return Err(ChainError::Unauthorized(format!("{caller} is not a party to this escrow")));
		}
		self.refund_core_bonds(balances, registry, &escrow, params, now)?;
		self.escrows.remove(id)?;
		Ok(())
	}

	/// Opens a dispute on an `Active` record before its expiration,
	/// allocating `escrow_dispute_mediator_amount` additional mediators from
	/// the pool.
	pub fn dispute(&mut self, id: Id<Escrow>, caller: AccountName, params: &Parameters, now: Time) -> ChainResult<BTreeSet<AccountName>> {
		let escrow = self.escrows.get(id)?.clone();
		if !matches!(escrow.status, EscrowStatus::Active) {
			return Err(ChainError::InvariantViolation("only an active escrow can be disputed".into()));
		}
		if caller != escrow.from && caller != escrow.to {
			return Err(ChainError::Unauthorized(format!("{caller} is not a party to this escrow")));
		}
		if now >= escrow.escrow_expiration {
			return Err(ChainError::Expired("escrow has already expired".into()));
		}
		let excluded: BTreeSet<AccountName> = [Some(escrow.from), Some(escrow.to), escrow.from_mediator, escrow.to_mediator]
			.into_iter()
			.flatten()
			.collect();
		let selected: BTreeSet<AccountName> = self
			.eligible_mediators
			.iter()
			.filter(|m| !excluded.contains(m))
			.take(params.escrow_dispute_mediator_amount as usize)
			.copied()
			.collect();
		if selected.len() < params.escrow_dispute_mediator_amount as usize {
			log::warn!(target: "escrow", "dispute mediator pool exhausted: wanted {} got {}", params.escrow_dispute_mediator_amount, selected.len());
		}
		let release_time = now.saturating_add_secs(params.escrow_dispute_duration_secs);
		self.escrows.modify(id, |e| {
			e.status = EscrowStatus::Disputed;
			e.dispute_mediators = selected.clone();
			e.dispute_release_time = Some(release_time);
		})?;
		Ok(selected)
	}

	/// Posts a selected dispute mediator's bond.
	pub fn approve_dispute_mediator(&mut self, balances: &mut BalancesState, registry: &mut AssetRegistryState, id: Id<Escrow>, mediator: AccountName, params: &Parameters, now: Time) -> ChainResult<()> {
		let escrow = self.escrows.get(id)?.clone();
		if !matches!(escrow.status, EscrowStatus::Disputed) {
			return Err(ChainError::InvariantViolation("escrow is not in dispute".into()));
		}
		if !escrow.dispute_mediators.contains(&mediator) {
			return Err(ChainError::Unauthorized(format!("{mediator} was not selected as a dispute mediator")));
		}
		if escrow.dispute_approved.contains(&mediator) {
			return Err(ChainError::InvariantViolation("mediator has already approved".into()));
		}
		let bond = escrow.bond(params);
		balances.adjust(registry, mediator, escrow.symbol, Compartment::Liquid, -bond, now)?;
		registry.adjust_pending_supply(escrow.symbol, bond, now)?;
		self.escrows.modify(id, |e| {
			e.dispute_approved.insert(mediator);
			e.balance = Amount(e.balance.0 + bond.0);
		})?;
		Ok(())
	}

	/// Records `participant`'s release percentage, in basis points of 100%
	///. Valid for any
	/// bonded participant of an `Active` or `Disputed` record.
	pub fn submit_release_percent(&mut self, id: Id<Escrow>, participant: AccountName, percent_bps: u32) -> ChainResult<()> {
		if percent_bps > 10_000 {
			return Err(ChainError::InvariantViolation("release percent must be within 0..=10000bps".into()));
		}
		let escrow = self.escrows.get(id)?.clone();
		if !escrow.eligible_voters().contains(&participant) {
			return Err(ChainError::Unauthorized(format!("{participant} has no standing deposit in this escrow")));
		}
		self.escrows.modify(id, |e| {
			e.release_submissions.insert(participant, percent_bps);
		})?;
		Ok(())
	}

	/// Releases a non-disputed, `Active` escrow. Before `escrow_expiration` only `from` at 100% or
	/// `to` at 0% may call unilaterally; afterwards either may release at
	/// any percentage.
	pub fn release(&mut self, balances: &mut BalancesState, registry: &mut AssetRegistryState, id: Id<Escrow>, caller: AccountName, percent_bps: u32, params: &Parameters, now: Time) -> ChainResult<()> {
		if percent_bps > 10_000 {
			return Err(ChainError::InvariantViolation("release percent must be within 0..=10000bps".into()));
		}
		let escrow = self.escrows.get(id)?.clone();
		if !matches!(escrow.status, EscrowStatus::Active) {
			return Err(ChainError::InvariantViolation("only an active escrow can be released directly".into()));
		}
		if now < escrow.escrow_expiration {
			let allowed = (caller == escrow.from && percent_bps == 10_000) || (caller == escrow.to && percent_bps == 0);
			if !allowed {
				return Err(ChainError::Unauthorized(
					"before expiration only from releasing 100% or to releasing 0% may finalize unilaterally".into(),
				));
			}
		} else if caller != escrow.from && caller != escrow.to {
			return Err(ChainError::Unauthorized(format!("{caller} is not a party to this escrow")));
		}

		self.distribute_payment(balances, registry, &escrow, percent_bps, now)?;
		self.refund_core_bonds(balances, registry, &escrow, params, now)?;
		self.escrows.remove(id)?;
		Ok(())
	}

	/// Settles a `Disputed` escrow at `dispute_release_time`, splitting the
	/// payment at the median of all submitted release percentages and
	/// returning or forfeiting each dispute mediator's bond depending on
	/// whether its submission falls within tolerance of that median.
	pub fn resolve_dispute(&mut self, balances: &mut BalancesState, registry: &mut AssetRegistryState, id: Id<Escrow>, params: &Parameters, now: Time) -> ChainResult<()> {
		let escrow = self.escrows.get(id)?.clone();
		if !matches!(escrow.status, EscrowStatus::Disputed) {
			return Err(ChainError::InvariantViolation("escrow is not in dispute".into()));
		}
		let release_time = escrow
			.dispute_release_time
			.ok_or_else(|| ChainError::InvariantViolation("disputed escrow missing a release time".into()))?;
		if now < release_time {
			return Err(ChainError::InvariantViolation("dispute voting window has not yet closed".into()));
		}

		let mut submitted: Vec<u32> = escrow.release_submissions.values().copied().collect();
		submitted.sort_unstable();
		let median_bps = median(&submitted).unwrap_or(5_000);

		self.distribute_payment(balances, registry, &escrow, median_bps, now)?;
		self.refund_core_bonds(balances, registry, &escrow, params, now)?;

		let bond = escrow.bond(params);
		for mediator in &escrow.dispute_approved {
			let submission = escrow.release_submissions.get(mediator).copied();
			let within_tolerance = submission.map(|s| diff(s, median_bps) <= params.escrow_dispute_tolerance_bps).unwrap_or(true);
			if within_tolerance {
				balances.adjust(registry, *mediator, escrow.symbol, Compartment::Liquid, bond, now)?;
			} else {
				let beneficiary = if submission.unwrap() < median_bps { escrow.to } else { escrow.from };
				balances.adjust(registry, beneficiary, escrow.symbol, Compartment::Liquid, bond, now)?;
			}
			registry.adjust_pending_supply(escrow.symbol, -bond, now)?;
		}
		self.escrows.remove(id)?;
		Ok(())
	}

	/// Sweeps every record whose acceptance window lapsed without reaching
	/// `Active`, auto-refunding its deposits.
	pub fn process_lapsed_acceptances(&mut self, balances: &mut BalancesState, registry: &mut AssetRegistryState, params: &Parameters, now: Time) -> ChainResult<u32> {
		let ids: Vec<Id<Escrow>> = self
			.escrows
			.iter()
			.filter(|(_, e)| !matches!(e.status, EscrowStatus::Active | EscrowStatus::Disputed) && now > e.acceptance_time)
			.map(|(id, _)| id)
			.collect();
		let mut count = 0u32;
		for id in ids {
			let escrow = self.escrows.get(id)?.clone();
			self.refund_core_bonds(balances, registry, &escrow, params, now)?;
			self.escrows.remove(id)?;
			count += 1;
		}
		Ok(count)
	}

	/// Sweeps every `Disputed` record whose voting window has closed.
	pub fn process_due_disputes(&mut self, balances: &mut BalancesState, registry: &mut AssetRegistryState, params: &Parameters, now: Time) -> ChainResult<u32> {
		let ids: Vec<Id<Escrow>> = self
			.escrows
			.iter()
			.filter(|(_, e)| matches!(e.status, EscrowStatus::Disputed) && e.dispute_release_time.map(|t| now >= t).unwrap_or(false))
			.map(|(id, _)| id)
			.collect();
		let mut count = 0u32;
		for id in ids {
			self.resolve_dispute(balances, registry, id, params, now)?;
			count += 1;
		}
		Ok(count)
	}

	fn distribute_payment(&self, balances: &mut BalancesState, registry: &mut AssetRegistryState, escrow: &Escrow, percent_bps: u32, now: Time) -> ChainResult<()> {
		let to_amount = escrow.payment.scale_rational(percent_bps as i128, 10_000).unwrap_or(Amount::ZERO);
		let from_amount = Amount(escrow.payment.0 - to_amount.0);
		if to_amount.is_positive() {
			balances.adjust(registry, escrow.to, escrow.symbol, Compartment::Liquid, to_amount, now)?;
			registry.adjust_pending_supply(escrow.symbol, -to_amount, now)?;
		}
		if from_amount.is_positive() {
			balances.adjust(registry, escrow.from, escrow.symbol, Compartment::Liquid, from_amount, now)?;
			registry.adjust_pending_supply(escrow.symbol, -from_amount, now)?;
		}
		Ok(())
	}

	/// Refunds every deposit the four initial approvers have posted so far:
	/// `from`'s bond plus its payment, and a bare bond for the other three.
	fn refund_core_bonds(&self, balances: &mut BalancesState, registry: &mut AssetRegistryState, escrow: &Escrow, params: &Parameters, now: Time) -> ChainResult<()> {
		let bond = escrow.bond(params);
		for (approved, account, deposit) in [
			(escrow.from_approved, Some(escrow.from), Amount(bond.0 + escrow.payment.0)),
			(escrow.to_approved, Some(escrow.to), bond),
			(escrow.from_mediator_approved, escrow.from_mediator, bond),
			(escrow.to_mediator_approved, escrow.to_mediator, bond),
		] {
			if !approved {
				continue;
			}
			let Some(account) = account else { continue };
			if deposit.is_positive() {
				balances.adjust(registry, account, escrow.symbol, Compartment::Liquid, deposit, now)?;
				registry.adjust_pending_supply(escrow.symbol, -deposit, now)?;
			}
		}
		Ok(())
	}
}

fn diff(a: u32, b: u32) -> u32 {
	if a > b {
		a - b
	} else {
		b - a
	}
}

fn median(sorted: &[u32]) -> Option<u32> {
	if sorted.is_empty() {
		return None;
	}
	let mid = sorted.len() / 2;
	if sorted.len() % 2 == 1 {
		Some(sorted[mid])
	} else {
		Some(((sorted[mid - 1] as u64 + sorted[mid] as u64) / 2) as u32)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chain_primitives::{AssetType, UNIT};
	use module_assets::AssetFlags;

	fn acct(s: &str) -> AccountName {
		AccountName::new(s).unwrap()
	}

	fn sym(s: &str) -> AssetSymbol {
		AssetSymbol::new(s).unwrap()
	}

	struct World {
		registry: AssetRegistryState,
		balances: BalancesState,
		escrow: EscrowState,
		params: Parameters,
		symbol: AssetSymbol,
	}

	impl World {
		fn new() -> Self {
			let mut registry = AssetRegistryState::new();
			let symbol = sym("P");
			registry.create_asset(symbol, AssetType::Standard, acct("issuer"), AssetFlags::default(), Time::from_secs(0)).unwrap();
			let mut balances = BalancesState::new();
			for name in ["alice", "bob", "fm", "tm", "med1", "med2", "med3", "med4", "med5"] {
				balances.adjust(&mut registry, acct(name), symbol, Compartment::Liquid, Amount(1_000 * UNIT), Time::from_secs(0)).unwrap();
			}
			let mut escrow = EscrowState::new();
			for name in ["fm", "tm", "med1", "med2", "med3", "med4", "med5"] {
				escrow.register_mediator(acct(name));
			}
			Self { registry, balances, escrow, params: Parameters::default(), symbol }
		}

		fn liquid(&self, who: &str) -> Amount {
			self.balances.get(acct(who), self.symbol).liquid
		}
	}

	#[test]
	fn happy_path_release_pays_seller_and_refunds_bonds() {
		let mut w = World::new();
		let payment = Amount(1_000 * UNIT);
		let t0 = Time::from_secs(0);
		let id = w.escrow.propose(acct("alice"), acct("bob"), w.symbol, payment, Time::from_secs(1_000), Time::from_secs(10_000)).unwrap();

		w.escrow.approve(&mut w.balances, &mut w.registry, id, acct("alice"), Some(acct("fm")), &w.params, t0).unwrap();
		w.escrow.approve(&mut w.balances, &mut w.registry, id, acct("bob"), Some(acct("tm")), &w.params, t0).unwrap();
		w.escrow.approve(&mut w.balances, &mut w.registry, id, acct("fm"), None, &w.params, t0).unwrap();
		let became_active = w.escrow.approve(&mut w.balances, &mut w.registry, id, acct("tm"), None, &w.params, t0).unwrap();
		assert!(became_active);

		let bond = Amount(50 * UNIT);
		let escrow = w.escrow.get(id).unwrap();
		assert_eq!(escrow.balance, Amount(1_000 * UNIT + 4 * bond.0));

		w.escrow.release(&mut w.balances, &mut w.registry, id, acct("alice"), 10_000, &w.params, t0).unwrap();
		assert_eq!(w.liquid("bob"), Amount(1_000 * UNIT + 1_000 * UNIT));
		assert_eq!(w.liquid("alice"), Amount(1_000 * UNIT - 1_000 * UNIT - bond.0 + bond.0));
		assert_eq!(w.liquid("fm"), Amount(1_000 * UNIT));
		assert_eq!(w.liquid("tm"), Amount(1_000 * UNIT));
		assert!(w.escrow.get(id).is_err());
	}

	#[test]
	fn to_cannot_release_before_expiration_with_nonzero_percent() {
		let mut w = World::new();
		let payment = Amount(1_000 * UNIT);
		let t0 = Time::from_secs(0);
		let id = w.escrow.propose(acct("alice"), acct("bob"), w.symbol, payment, Time::from_secs(1_000), Time::from_secs(10_000)).unwrap();
		w.escrow.approve(&mut w.balances, &mut w.registry, id, acct("alice"), Some(acct("fm")), &w.params, t0).unwrap();
		w.escrow.approve(&mut w.balances, &mut w.registry, id, acct("bob"), Some(acct("tm")), &w.params, t0).unwrap();
		w.escrow.approve(&mut w.balances, &mut w.registry, id, acct("fm"), None, &w.params, t0).unwrap();
		w.escrow.approve(&mut w.balances, &mut w.registry, id, acct("tm"), None, &w.params, t0).unwrap();

		let err = w.escrow.release(&mut w.balances, &mut w.registry, id, acct("bob"), 5_000, &w.params, t0).unwrap_err();
		assert!(matches!(err, ChainError::Unauthorized(_)));
	}

	#[test]
	fn dispute_resolves_at_median_release_percent() {
		let mut w = World::new();
		let payment = Amount(1_000 * UNIT);
		let t0 = Time::from_secs(0);
		let id = w.escrow.propose(acct("alice"), acct("bob"), w.symbol, payment, Time::from_secs(1_000), Time::from_secs(10_000)).unwrap();
		w.escrow.approve(&mut w.balances, &mut w.registry, id, acct("alice"), Some(acct("fm")), &w.params, t0).unwrap();
		w.escrow.approve(&mut w.balances, &mut w.registry, id, acct("bob"), Some(acct("tm")), &w.params, t0).unwrap();
		w.escrow.approve(&mut w.balances, &mut w.registry, id, acct("fm"), None, &w.params, t0).unwrap();
		w.escrow.approve(&mut w.balances, &mut w.registry, id, acct("tm"), None, &w.params, t0).unwrap();

		let selected = w.escrow.dispute(id, acct("alice"), &w.params, t0).unwrap();
		assert_eq!(selected.len(), 5);
		assert!(!selected.contains(&acct("fm")));
		for mediator in &selected {
			w.escrow.approve_dispute_mediator(&mut w.balances, &mut w.registry, id, *mediator, &w.params, t0).unwrap();
		}

		w.escrow.submit_release_percent(id, acct("alice"), 0).unwrap();
		w.escrow.submit_release_percent(id, acct("bob"), 10_000).unwrap();
		w.escrow.submit_release_percent(id, acct("fm"), 2_500).unwrap();
		w.escrow.submit_release_percent(id, acct("tm"), 7_500).unwrap();
		let submissions = [2_000u32, 4_000, 5_000, 6_000, 8_000];
		for (mediator, submission) in selected.iter().zip(submissions) {
			w.escrow.submit_release_percent(id, *mediator, submission).unwrap();
		}

		let release_time = w.escrow.get(id).unwrap().dispute_release_time.unwrap();
		w.escrow.resolve_dispute(&mut w.balances, &mut w.registry, id, &w.params, release_time).unwrap();

		assert_eq!(w.liquid("bob"), Amount(1_000 * UNIT + 500 * UNIT));
		assert_eq!(w.liquid("alice"), Amount(1_000 * UNIT - 500 * UNIT));

		let mediators_in_order: Vec<AccountName> = selected.into_iter().collect();
		for (mediator, submission) in mediators_in_order.iter().zip(submissions) {
			let bond = Amount(50 * UNIT);
			let final_liquid = w.liquid(mediator.as_str());
			if diff(submission, 5_000) <= w.params.escrow_dispute_tolerance_bps {
				assert_eq!(final_liquid, Amount(1_000 * UNIT));
			} else {
				assert_eq!(final_liquid, Amount(1_000 * UNIT - bond.0));
			}
		}
		assert!(w.escrow.get(id).is_err());
	}

	#[test]
	fn cancellation_while_approving_refunds_every_posted_deposit() {
		let mut w = World::new();
		let payment = Amount(1_000 * UNIT);
		let t0 = Time::from_secs(0);
		let id = w.escrow.propose(acct("alice"), acct("bob"), w.symbol, payment, Time::from_secs(1_000), Time::from_secs(10_000)).unwrap();
		w.escrow.approve(&mut w.balances, &mut w.registry, id, acct("alice"), Some(acct("fm")), &w.params, t0).unwrap();

		w.escrow.cancel(&mut w.balances, &mut w.registry, id, acct("bob"), &w.params, t0).unwrap();
		assert_eq!(w.liquid("alice"), Amount(1_000 * UNIT));
		assert!(w.escrow.get(id).is_err());
	}

	#[test]
	fn lapsed_acceptance_window_auto_refunds() {
		let mut w = World::new();
		let payment = Amount(1_000 * UNIT);
		let t0 = Time::from_secs(0);
		let id = w.escrow.propose(acct("alice"), acct("bob"), w.symbol, payment, Time::from_secs(100), Time::from_secs(10_000)).unwrap();
		w.escrow.approve(&mut w.balances, &mut w.registry, id, acct("alice"), Some(acct("fm")), &w.params, t0).unwrap();

		let later = Time::from_secs(200);
		let count = w.escrow.process_lapsed_acceptances(&mut w.balances, &mut w.registry, &w.params, later).unwrap();
		assert_eq!(count, 1);
		assert_eq!(w.liquid("alice"), Amount(1_000 * UNIT));
	}

	#[test]
	fn pending_supply_returns_to_zero_after_a_full_lifecycle() {
		let mut w = World::new();
		let payment = Amount(1_000 * UNIT);
		let t0 = Time::from_secs(0);
		let id = w.escrow.propose(acct("alice"), acct("bob"), w.symbol, payment, Time::from_secs(1_000), Time::from_secs(10_000)).unwrap();
		w.escrow.approve(&mut w.balances, &mut w.registry, id, acct("alice"), Some(acct("fm")), &w.params, t0).unwrap();
		w.escrow.approve(&mut w.balances, &mut w.registry, id, acct("bob"), Some(acct("tm")), &w.params, t0).unwrap();
		w.escrow.approve(&mut w.balances, &mut w.registry, id, acct("fm"), None, &w.params, t0).unwrap();
		w.escrow.approve(&mut w.balances, &mut w.registry, id, acct("tm"), None, &w.params, t0).unwrap();
		let pending = w.registry.get_by_symbol(w.symbol).unwrap().dynamic.pending_supply;
		assert_eq!(pending, Amount(1_000 * UNIT + 4 * 50 * UNIT));

		w.escrow.release(&mut w.balances, &mut w.registry, id, acct("alice"), 10_000, &w.params, t0).unwrap();
		let pending_after = w.registry.get_by_symbol(w.symbol).unwrap().dynamic.pending_supply;
		assert_eq!(pending_after, Amount::ZERO);
	}
}
