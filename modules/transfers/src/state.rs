use crate::types::{RecurringTransfer, TransferRequest};
use chain_primitives::{AccountName, Amount, Asset, AssetSymbol, Time};
use chain_support::{AssetRegistry, AuthorityProvider, ChainError, ChainResult, Parameters};
use module_assets::AssetRegistryState;
use module_balances::{BalancesState, Compartment};
use object_store::{Id, Table};
use std::collections::BTreeMap;

/// Opportunistic hook for memo-tagged payments. Content/social records are out of scope
///; this trait is the seam a future content module would implement
/// without `module-transfers` needing to know about posts or communities.
pub trait ContentPaymentHook {
	fn record_payment(&mut self, memo: &str, from: AccountName, to: AccountName, asset: Asset);
}

/// The default hook: absence of a content module is not an error.
#[derive(Default)]
pub struct NoopPaymentHook;

impl ContentPaymentHook for NoopPaymentHook {
	fn record_payment(&mut self, _memo: &str, _from: AccountName, _to: AccountName, _asset: Asset) {}
}

fn validate_transfer_permissions(
	registry: &AssetRegistryState,
	authorities: &dyn AuthorityProvider,
	from: AccountName,
	to: AccountName,
	symbol: AssetSymbol,
) -> ChainResult<()> {
	if !authorities.is_active(from) {
		return Err(ChainError::InactiveAccount(format!("{from} is not active")));
	}
	if !authorities.is_active(to) {
		return Err(ChainError::InactiveAccount(format!("{to} is not active")));
	}
	if !AssetRegistry::exists(registry, symbol) {
		return Err(ChainError::NotFound(format!("asset {symbol} not found")));
	}
	if AssetRegistry::is_transfer_restricted(registry, symbol) {
		return Err(ChainError::AssetRestricted(format!("{symbol} is transfer restricted")));
	}
	if AssetRegistry::requires_balance_whitelist(registry, symbol) {
		if !AssetRegistry::is_whitelisted(registry, symbol, from) || !AssetRegistry::is_whitelisted(registry, symbol, to) {
			return Err(ChainError::AssetRestricted(format!("{symbol} requires balance whitelisting")));
		}
	}
	Ok(())
}

/// The transfer services' tables and secondary indices.
#[derive(Clone, Debug, Default)]
pub struct TransfersState {
	requests: Table<TransferRequest>,
	requests_by_key: BTreeMap<(AccountName, u64), Id<TransferRequest>>,
	requests_by_expiration: BTreeMap<(Time, Id<TransferRequest>), ()>,

	recurring: Table<RecurringTransfer>,
	recurring_by_next_time: BTreeMap<(Time, Id<RecurringTransfer>), ()>,

	recurring_requests: Table<RecurringTransfer>,
	recurring_requests_by_key: BTreeMap<(AccountName, u64), Id<RecurringTransfer>>,
}

impl TransfersState {
	pub fn new() -> Self {
		Self::default()
	}

	/// Immediate transfer. Rejects a
	/// zero-amount transfer and routes the memo through `hook`.
	pub fn transfer(
		&mut self,
		balances: &mut BalancesState,
		registry: &mut AssetRegistryState,
		authorities: &dyn AuthorityProvider,
		from: AccountName,
		to: AccountName,
		symbol: AssetSymbol,
		amount: Amount,
		memo: &str,
		now: Time,
		hook: &mut dyn ContentPaymentHook,
	) -> ChainResult<()> {
		if !amount.is_positive() {
			return Err(ChainError::InvariantViolation("transfer amount must be positive".into()));
		}
		validate_transfer_permissions(registry, authorities, from, to, symbol)?;
		balances.adjust(registry, from, symbol, Compartment::Liquid, -amount, now)?;
		balances.adjust(registry, to, symbol, Compartment::Liquid, amount, now)?;
		hook.record_payment(memo, from, to, Asset { amount, symbol });
		log::debug!(target: "transfers", "transfer {from} -> {to}: {amount} {symbol}");
		Ok(())
	}

	/// `to` proposes a transfer of `amount` from `from`.
	pub fn create_transfer_request(
		&mut self,
		params: &Parameters,
		from: AccountName,
		to: AccountName,
		symbol: AssetSymbol,
		amount: Amount,
		memo: String,
		request_id: u64,
		now: Time,
	) -> ChainResult<Id<TransferRequest>> {
		if !amount.is_positive() {
			return Err(ChainError::InvariantViolation("transfer request amount must be positive".into()));
		}
		if self.requests_by_key.contains_key(&(from, request_id)) {
			return Err(ChainError::AlreadyExists(format!("transfer request {request_id} already exists for {from}")));
		}
		let expiration = now.saturating_add_secs(params.transfer_request_duration_secs);
		let (id, _) = self.requests.create(|_| TransferRequest {
			from,
			to,
			symbol,
			amount,
			memo,
			request_id,
			expiration,
		});
		self.requests_by_key.insert((from, request_id), id);
		self.requests_by_expiration.insert((expiration, id), ());
		Ok(id)
	}

	/// `from` accepts (or declines) a pending request.
	pub fn accept_transfer_request(
		&mut self,
		balances: &mut BalancesState,
		registry: &mut AssetRegistryState,
		authorities: &dyn AuthorityProvider,
		from: AccountName,
		request_id: u64,
		accept: bool,
		now: Time,
		hook: &mut dyn ContentPaymentHook,
	) -> ChainResult<()> {
		let id = self
			.requests_by_key
			.get(&(from, request_id))
			.copied()
			.ok_or_else(|| ChainError::NotFound(format!("transfer request {request_id} not found for {from}")))?;
		let request = self.requests.get(id)?.clone();
		if now > request.expiration {
			self.remove_request(id, &request);
			return Err(ChainError::Expired(format!("transfer request {request_id} has expired")));
		}
		if accept {
			self.transfer(
				balances,
				registry,
				authorities,
				request.from,
				request.to,
				request.symbol,
				request.amount,
				&request.memo,
				now,
				hook,
			)?;
		}
		self.remove_request(id, &request);
		Ok(())
	}

	fn remove_request(&mut self, id: Id<TransferRequest>, request: &TransferRequest) {
		let _ = self.requests.remove(id);
		self.requests_by_key.remove(&(request.from, request.request_id));
		self.requests_by_expiration.remove(&(request.expiration, id));
	}

	/// Removes every transfer request past its expiration without side
	/// effects on balances.
	pub fn process_expired_transfer_requests(&mut self, now: Time) -> ChainResult<u32> {
		let due: Vec<(Time, Id<TransferRequest>)> =
			self.requests_by_expiration.range(..=(now, Id::new(u64::MAX))).map(|(k, _)| *k).collect();
		let mut expired = 0;
		for (expiration, id) in due {
			if let Some(request) = self.requests.find(id).cloned() {
				self.remove_request(id, &request);
				let _ = expiration;
				expired += 1;
			}
		}
		Ok(expired)
	}

	/// Authors a recurring transfer schedule directly.
	pub fn create_recurring_transfer(
		&mut self,
		from: AccountName,
		to: AccountName,
		symbol: AssetSymbol,
		amount: Amount,
		memo: String,
		begin: Time,
		interval_secs: u64,
		payments: u32,
		extensible: bool,
		fill_or_kill: bool,
	) -> ChainResult<Id<RecurringTransfer>> {
		if !amount.is_positive() || payments == 0 || interval_secs == 0 {
			return Err(ChainError::InvariantViolation("invalid recurring transfer parameters".into()));
		}
		let (id, record) = self.recurring.create(|_| RecurringTransfer {
			from,
			to,
			symbol,
			amount,
			memo,
			begin,
			interval_secs,
			payments_remaining: payments,
			extensible,
			fill_or_kill,
			next_time: begin,
		});
		self.recurring_by_next_time.insert((record.next_time, id), ());
		Ok(id)
	}

	/// `to` proposes a recurring schedule; `from` must accept it.
	pub fn request_recurring_transfer(
		&mut self,
		from: AccountName,
		to: AccountName,
		symbol: AssetSymbol,
		amount: Amount,
		memo: String,
		begin: Time,
		interval_secs: u64,
		payments: u32,
		extensible: bool,
		fill_or_kill: bool,
		request_id: u64,
	) -> ChainResult<Id<RecurringTransfer>> {
		if !amount.is_positive() || payments == 0 || interval_secs == 0 {
			return Err(ChainError::InvariantViolation("invalid recurring transfer request parameters".into()));
		}
		if self.recurring_requests_by_key.contains_key(&(from, request_id)) {
			return Err(ChainError::AlreadyExists(format!(
				"recurring transfer request {request_id} already exists for {from}"
			)));
		}
		let (id, _) = self.recurring_requests.create(|_| RecurringTransfer {
			from,
			to,
			symbol,
			amount,
			memo,
			begin,
			interval_secs,
			payments_remaining: payments,
			extensible,
			fill_or_kill,
			next_time: begin,
		});
		self.recurring_requests_by_key.insert((from, request_id), id);
		Ok(id)
	}

	pub fn accept_recurring_transfer_request(
		&mut self,
		from: AccountName,
		request_id: u64,
		accept: bool,
	) -> ChainResult<Option<Id<RecurringTransfer>>> {
		let id = self
			.recurring_requests_by_key
			.remove(&(from, request_id))
			.ok_or_else(|| ChainError::NotFound(format!("recurring transfer request {request_id} not found for {from}")))?;
		let record = self.recurring_requests.remove(id)?;
		if !accept {
			return Ok(None);
		}
		let (new_id, created) = self.recurring.create(|_| record);
		self.recurring_by_next_time.insert((created.next_time, new_id), ());
		Ok(Some(new_id))
	}

	/// Cancels a recurring transfer.
	pub fn cancel_recurring_transfer(&mut self, id: Id<RecurringTransfer>) -> ChainResult<()> {
		let record = self.recurring.remove(id)?;
		self.recurring_by_next_time.remove(&(record.next_time, id));
		Ok(())
	}

	/// Ticks every recurring transfer due at or before `now`.
	pub fn process_due_recurring_transfers(
		&mut self,
		balances: &mut BalancesState,
		registry: &mut AssetRegistryState,
		authorities: &dyn AuthorityProvider,
		now: Time,
		hook: &mut dyn ContentPaymentHook,
	) -> ChainResult<u32> {
		let due: Vec<(Time, Id<RecurringTransfer>)> =
			self.recurring_by_next_time.range(..=(now, Id::new(u64::MAX))).map(|(k, _)| *k).collect();
		let mut ticked = 0;
		for (next_time, id) in due {
			let mut record = match self.recurring.find(id).cloned() {
				Some(r) => r,
				None => continue,
			};
			self.recurring_by_next_time.remove(&(next_time, id));

			let available = balances.get(record.from, record.symbol).liquid;
			let funded = available >= record.amount;

			if funded {
				self.transfer(
					balances,
					registry,
					authorities,
					record.from,
					record.to,
					record.symbol,
					record.amount,
					&record.memo,
					now,
					hook,
				)?;
				record.payments_remaining = record.payments_remaining.saturating_sub(1);
				record.next_time = now.saturating_add_secs(record.interval_secs);
			} else if record.fill_or_kill {
				self.recurring.remove(id)?;
				ticked += 1;
				continue;
			} else if record.extensible {
				// Skip the tick; the schedule's horizon slides forward by one
				// interval instead of consuming a payment.
				record.next_time = now.saturating_add_secs(record.interval_secs);
			} else {
				// Skip the tick but still consume it.
				record.payments_remaining = record.payments_remaining.saturating_sub(1);
				record.next_time = now.saturating_add_secs(record.interval_secs);
			}

			if record.payments_remaining == 0 {
				self.recurring.remove(id)?;
			} else {
				self.recurring.modify(id, |r| *r = record.clone())?;
				self.recurring_by_next_time.insert((record.next_time, id), ());
			}
			ticked += 1;
		}
		Ok(ticked)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chain_primitives::{AccountName, AssetType, Time};
	use module_assets::{AssetFlags, SupplyCompartment};

	struct AllActive;
	impl AuthorityProvider for AllActive {
		fn is_active(&self, _account: AccountName) -> bool {
			true
		}
		fn is_authorized_transfer(&self, _owner: AccountName, _signatory: AccountName) -> bool {
			true
		}
	}

	fn sym(s: &str) -> AssetSymbol {
		AssetSymbol::new(s).unwrap()
	}

	fn acct(s: &str) -> AccountName {
		AccountName::new(s).unwrap()
	}

	struct World {
		registry: AssetRegistryState,
		balances: BalancesState,
		transfers: TransfersState,
		params: Parameters,
	}

	impl World {
		fn new() -> Self {
			let mut registry = AssetRegistryState::new();
			registry
				.create_asset(sym("X"), AssetType::Currency, acct("issuer"), AssetFlags::default(), Time::from_secs(0))
				.unwrap();
			Self {
				registry,
				balances: BalancesState::new(),
				transfers: TransfersState::new(),
				params: Parameters::default(),
			}
		}

		fn fund(&mut self, who: AccountName, amount: Amount, now: Time) {
			self.registry.mint(sym("X"), SupplyCompartment::Liquid, amount, now).unwrap();
			self.balances.adjust(&mut self.registry, who, sym("X"), Compartment::Liquid, amount, now).unwrap();
		}
	}

	#[test]
	fn zero_amount_transfer_is_rejected() {
		let mut w = World::new();
		let alice = acct("alice");
		let bob = acct("bob");
		let t0 = Time::from_secs(0);
		w.fund(alice, Amount(100), t0);
		let err = w
			.transfers
			.transfer(&mut w.balances, &mut w.registry, &AllActive, alice, bob, sym("X"), Amount::ZERO, "", t0, &mut NoopPaymentHook)
			.unwrap_err();
		assert!(matches!(err, ChainError::InvariantViolation(_)));
	}

	#[test]
	fn transfer_request_accept_moves_balance_and_removes_record() {
		let mut w = World::new();
		let alice = acct("alice");
		let bob = acct("bob");
		let t0 = Time::from_secs(0);
		w.fund(alice, Amount(1_000), t0);

		w.transfers
			.create_transfer_request(&w.params, alice, bob, sym("X"), Amount(500), "pay me".into(), 1, t0)
			.unwrap();
		w.transfers
			.accept_transfer_request(&mut w.balances, &mut w.registry, &AllActive, alice, 1, true, t0, &mut NoopPaymentHook)
			.unwrap();

		assert_eq!(w.balances.get(alice, sym("X")).liquid, Amount(500));
		assert_eq!(w.balances.get(bob, sym("X")).liquid, Amount(500));
		let err = w
			.transfers
			.accept_transfer_request(&mut w.balances, &mut w.registry, &AllActive, alice, 1, true, t0, &mut NoopPaymentHook)
			.unwrap_err();
		assert!(matches!(err, ChainError::NotFound(_)));
	}

	#[test]
	fn declined_request_has_no_balance_side_effect() {
		let mut w = World::new();
		let alice = acct("alice");
		let bob = acct("bob");
		let t0 = Time::from_secs(0);
		w.fund(alice, Amount(1_000), t0);
		w.transfers
			.create_transfer_request(&w.params, alice, bob, sym("X"), Amount(500), String::new(), 1, t0)
			.unwrap();
		w.transfers
			.accept_transfer_request(&mut w.balances, &mut w.registry, &AllActive, alice, 1, false, t0, &mut NoopPaymentHook)
			.unwrap();
		assert_eq!(w.balances.get(alice, sym("X")).liquid, Amount(1_000));
	}

	#[test]
	fn fill_or_kill_recurring_transfer_cancels_on_first_shortfall() {
		let mut w = World::new();
		let alice = acct("alice");
		let bob = acct("bob");
		let t0 = Time::from_secs(0);
		w.fund(alice, Amount(100), t0);
		w.transfers
			.create_recurring_transfer(alice, bob, sym("X"), Amount(60), String::new(), t0, 3600, 5, false, true)
			.unwrap();

		let ticked = w
			.transfers
			.process_due_recurring_transfers(&mut w.balances, &mut w.registry, &AllActive, t0, &mut NoopPaymentHook)
			.unwrap();
		assert_eq!(ticked, 1);
		assert_eq!(w.balances.get(bob, sym("X")).liquid, Amount(60));

		// Second tick cannot be funded (40 left, needs 60): fill_or_kill cancels.
		let t1 = t0.saturating_add_secs(3600);
		let ticked = w
			.transfers
			.process_due_recurring_transfers(&mut w.balances, &mut w.registry, &AllActive, t1, &mut NoopPaymentHook)
			.unwrap();
		assert_eq!(ticked, 1);
		assert_eq!(w.balances.get(bob, sym("X")).liquid, Amount(60));
	}

	#[test]
	fn extensible_recurring_transfer_slides_on_shortfall() {
		let mut w = World::new();
		let alice = acct("alice");
		let bob = acct("bob");
		let t0 = Time::from_secs(0);
		w.fund(alice, Amount(50), t0);
		w.transfers
			.create_recurring_transfer(alice, bob, sym("X"), Amount(100), String::new(), t0, 3600, 2, true, false)
			.unwrap();
		w.transfers
			.process_due_recurring_transfers(&mut w.balances, &mut w.registry, &AllActive, t0, &mut NoopPaymentHook)
			.unwrap();
		// Underfunded: skipped without consuming a payment.
		assert_eq!(w.balances.get(bob, sym("X")).liquid, Amount::ZERO);
		w.fund(alice, Amount(100), t0);
		let t1 = t0.saturating_add_secs(3600);
		w.transfers
			.process_due_recurring_transfers(&mut w.balances, &mut w.registry, &AllActive, t1, &mut NoopPaymentHook)
			.unwrap();
		assert_eq!(w.balances.get(bob, sym("X")).liquid, Amount(100));
	}
}
