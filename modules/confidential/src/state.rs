use crate::types::{ConfidentialBalance, ConfidentialOutput};
use chain_primitives::{AccountName, Amount, AssetSymbol, Commitment, Time};
use chain_support::{AssetRegistry, AuthorityProvider, ChainError, ChainResult};
use module_assets::{AssetRegistryState, SupplyCompartment};
use object_store::{Id, Table};
use std::collections::{BTreeMap, BTreeSet};

/// The confidential ledger's table and secondary indices. `by_account_auth`/
/// `by_key_auth` are denormalized lookup indices: a wallet holding a
/// single-entry authority can find its spendable outputs without scanning
/// the whole table.
#[derive(Clone, Debug, Default)]
pub struct ConfidentialState {
	balances: Table<ConfidentialBalance>,
	by_account_auth: BTreeMap<AccountName, BTreeSet<Id<ConfidentialBalance>>>,
	by_key_auth: BTreeMap<[u8; 33], BTreeSet<Id<ConfidentialBalance>>>,
}

fn validate_asset_usable(registry: &AssetRegistryState, symbol: AssetSymbol) -> ChainResult<()> {
	if !AssetRegistry::exists(registry, symbol) {
		return Err(ChainError::NotFound(format!("asset {symbol} not found")));
	}
	if !AssetRegistry::is_confidential_enabled(registry, symbol) {
		return Err(ChainError::AssetRestricted(format!("{symbol} does not allow confidential use")));
	}
	if AssetRegistry::is_transfer_restricted(registry, symbol) {
		return Err(ChainError::AssetRestricted(format!("{symbol} is transfer restricted")));
	}
	Ok(())
}

impl ConfidentialState {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn get(&self, id: Id<ConfidentialBalance>) -> ChainResult<&ConfidentialBalance> {
		self.balances.get(id)
	}

	/// Outputs whose authority's first account entry is `account`.
	pub fn find_by_account(&self, account: AccountName) -> Vec<Id<ConfidentialBalance>> {
		self.by_account_auth.get(&account).cloned().unwrap_or_default().into_iter().collect()
	}

	fn index_output(&mut self, id: Id<ConfidentialBalance>, balance: &ConfidentialBalance) {
		if let Some(account) = balance.owner_authority.account_auth() {
			self.by_account_auth.entry(account).or_default().insert(id);
		}
		for entry in &balance.owner_authority.entries {
			if let chain_primitives::AuthorityEntry::Key(k, _) = entry {
				self.by_key_auth.entry(*k).or_default().insert(id);
			}
		}
	}

	fn deindex_output(&mut self, id: Id<ConfidentialBalance>, balance: &ConfidentialBalance) {
		if let Some(account) = balance.owner_authority.account_auth() {
			if let Some(set) = self.by_account_auth.get_mut(&account) {
				set.remove(&id);
			}
		}
		for entry in &balance.owner_authority.entries {
			if let chain_primitives::AuthorityEntry::Key(k, _) = entry {
				if let Some(set) = self.by_key_auth.get_mut(k) {
					set.remove(&id);
				}
			}
		}
	}

	fn validate_output_authority(authorities: &dyn AuthorityProvider, output: &ConfidentialOutput) -> ChainResult<()> {
		if !output.authority.is_well_formed() {
			return Err(ChainError::InvariantViolation("confidential output authority is malformed".into()));
		}
		for entry in &output.authority.entries {
			if let chain_primitives::AuthorityEntry::Account(account, _) = entry {
				if !authorities.is_active(*account) {
					return Err(ChainError::InactiveAccount(format!("{account} is not active")));
				}
			}
		}
		Ok(())
	}

	fn consume_inputs(
		&mut self,
		symbol: AssetSymbol,
		input_ids: &[Id<ConfidentialBalance>],
	) -> ChainResult<Vec<ConfidentialBalance>> {
		if input_ids.is_empty() {
			return Err(ChainError::InvariantViolation("confidential operation requires at least one input".into()));
		}
		let mut consumed = Vec::with_capacity(input_ids.len());
		for id in input_ids {
			let record = *self.balances.get(*id)?;
			if record.symbol != symbol {
				return Err(ChainError::InvariantViolation(
					"all commitments in a confidential operation must share one asset".into(),
				));
			}
			consumed.push(record);
		}
		for id in input_ids {
			let record = self.balances.remove(*id)?;
			self.deindex_output(*id, &record);
		}
		Ok(consumed)
	}

	fn create_outputs(
		&mut self,
		symbol: AssetSymbol,
		outputs: &[ConfidentialOutput],
		prev_txid: [u8; 32],
		op_index: u16,
		now: Time,
	) -> Vec<Id<ConfidentialBalance>> {
		let mut ids = Vec::with_capacity(outputs.len());
		for (output_index, output) in outputs.iter().enumerate() {
			let balance = ConfidentialBalance {
				owner_authority: output.authority.clone(),
				commitment: output.commitment,
				symbol,
				prev_txid,
				op_index,
				output_index: output_index as u16,
				created: now,
			};
			let (id, record) = self.balances.create(|_| balance);
			self.index_output(id, &record);
			ids.push(id);
		}
		ids
	}

	/// `transfer_to_confidential`: moves
	/// `public_amount` out of the public ledger (the caller is responsible
	/// for the matching `balances` liquid debit) into newly created
	/// confidential outputs, net of `fee`.
	pub fn transfer_to_confidential(
		&mut self,
		registry: &mut AssetRegistryState,
		authorities: &dyn AuthorityProvider,
		symbol: AssetSymbol,
		public_amount: Amount,
		fee: Amount,
		outputs: Vec<ConfidentialOutput>,
		prev_txid: [u8; 32],
		op_index: u16,
		now: Time,
	) -> ChainResult<Vec<Id<ConfidentialBalance>>> {
		validate_asset_usable(registry, symbol)?;
		if !public_amount.is_positive() || fee.is_negative() {
			return Err(ChainError::InvariantViolation("invalid transfer-to-confidential amount/fee".into()));
		}
		if public_amount.checked_sub(fee).map(|d| d.is_negative()).unwrap_or(true) {
			return Err(ChainError::InvariantViolation("fee exceeds transferred amount".into()));
		}
		for output in &outputs {
			Self::validate_output_authority(authorities, output)?;
			if AssetRegistry::requires_balance_whitelist(registry, symbol) {
				let account = output
					.authority
					.account_auth()
					.ok_or_else(|| ChainError::AssetRestricted("whitelisted asset requires an account authority".into()))?;
				if !AssetRegistry::is_whitelisted(registry, symbol, account) {
					return Err(ChainError::AssetRestricted(format!("{account} is not whitelisted for {symbol}")));
				}
			}
		}
		let commitments: Vec<Commitment> = outputs.iter().map(|o| o.commitment).collect();
		if !Commitment::verify_balance(&[Commitment::public(public_amount.0)], &commitments, fee.0) {
			return Err(ChainError::InvariantViolation("confidential commitment balance check failed".into()));
		}
		let ids = self.create_outputs(symbol, &outputs, prev_txid, op_index, now);
		let net = public_amount
			.checked_sub(fee)
			.ok_or_else(|| ChainError::InvariantViolation("transfer-to-confidential net underflow".into()))?;
		registry.adjust_compartment(symbol, SupplyCompartment::Confidential, net, now)?;
		log::debug!(target: "confidential", "transfer_to_confidential: {symbol} {public_amount} -> {} outputs", ids.len());
		Ok(ids)
	}

	/// `transfer_from_confidential`: consumes `input_ids` in full and pays
	/// `public_amount` (plus `fee`) back out to the public ledger (the
	/// caller performs the matching `balances` liquid credit).
	pub fn transfer_from_confidential(
		&mut self,
		registry: &mut AssetRegistryState,
		symbol: AssetSymbol,
		input_ids: &[Id<ConfidentialBalance>],
		public_amount: Amount,
		fee: Amount,
		now: Time,
	) -> ChainResult<()> {
		validate_asset_usable(registry, symbol)?;
		if !public_amount.is_positive() || fee.is_negative() {
			return Err(ChainError::InvariantViolation("invalid transfer-from-confidential amount/fee".into()));
		}
		let consumed = self.consume_inputs(symbol, input_ids)?;
		let input_commitments: Vec<Commitment> = consumed.iter().map(|c| c.commitment).collect();
		if !Commitment::verify_balance(&input_commitments, &[Commitment::public(public_amount.0)], fee.0) {
			return Err(ChainError::InvariantViolation("confidential commitment balance check failed".into()));
		}
		let gross = public_amount
			.checked_add(fee)
			.ok_or_else(|| ChainError::InvariantViolation("transfer-from-confidential gross overflow".into()))?;
		registry.adjust_compartment(symbol, SupplyCompartment::Confidential, -gross, now)?;
		log::debug!(target: "confidential", "transfer_from_confidential: {symbol} {public_amount} from {} inputs", input_ids.len());
		Ok(())
	}

	/// `transfer_confidential`: fully confidential-to-confidential transfer.
	/// Only `fee` is publicly known and leaves the confidential pool (the
	/// caller pays it out of `accumulated_fees`/network revenue via
	/// `balances`).
	pub fn transfer_confidential(
		&mut self,
		registry: &mut AssetRegistryState,
		authorities: &dyn AuthorityProvider,
		symbol: AssetSymbol,
		input_ids: &[Id<ConfidentialBalance>],
		outputs: Vec<ConfidentialOutput>,
		fee: Amount,
		prev_txid: [u8; 32],
		op_index: u16,
		now: Time,
	) -> ChainResult<Vec<Id<ConfidentialBalance>>> {
		validate_asset_usable(registry, symbol)?;
		if fee.is_negative() {
			return Err(ChainError::InvariantViolation("fee must be non-negative".into()));
		}
		for output in &outputs {
			Self::validate_output_authority(authorities, output)?;
			if AssetRegistry::requires_balance_whitelist(registry, symbol) {
				let account = output
					.authority
					.account_auth()
					.ok_or_else(|| ChainError::AssetRestricted("whitelisted asset requires an account authority".into()))?;
				if !AssetRegistry::is_whitelisted(registry, symbol, account) {
					return Err(ChainError::AssetRestricted(format!("{account} is not whitelisted for {symbol}")));
				}
			}
		}
		let consumed = self.consume_inputs(symbol, input_ids)?;
		let input_commitments: Vec<Commitment> = consumed.iter().map(|c| c.commitment).collect();
		let output_commitments: Vec<Commitment> = outputs.iter().map(|o| o.commitment).collect();
		if !Commitment::verify_balance(&input_commitments, &output_commitments, fee.0) {
			return Err(ChainError::InvariantViolation("confidential commitment balance check failed".into()));
		}
		let ids = self.create_outputs(symbol, &outputs, prev_txid, op_index, now);
		if fee.is_positive() {
			registry.adjust_compartment(symbol, SupplyCompartment::Confidential, -fee, now)?;
		}
		log::debug!(target: "confidential", "transfer_confidential: {} inputs -> {} outputs", input_ids.len(), ids.len());
		Ok(ids)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chain_primitives::{AccountName, Authority, AssetType, BlindingFactor, Time};
	use module_assets::AssetFlags;

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

	fn registry_with_confidential_asset() -> AssetRegistryState {
		let mut reg = AssetRegistryState::new();
		let flags = AssetFlags { confidential_enabled: true, ..Default::default() };
		reg.create_asset(sym("X"), AssetType::Currency, acct("issuer"), flags, Time::from_secs(0)).unwrap();
		reg
	}

	#[test]
	fn transfer_to_confidential_then_from_confidential_round_trips_supply() {
		let mut state = ConfidentialState::new();
		let mut registry = registry_with_confidential_asset();
		let authorities = AllActive;

		let r = BlindingFactor::from_bytes([5u8; 32]);
		let output = ConfidentialOutput {
			authority: Authority::single_account(acct("alice")),
			commitment: Commitment::commit(990, r),
		};
		let ids = state
			.transfer_to_confidential(&mut registry, &authorities, sym("X"), Amount(1_000), Amount(10), vec![output], [0u8; 32], 0, Time::from_secs(1))
			.unwrap();
		assert_eq!(ids.len(), 1);
		assert_eq!(registry.get_by_symbol(sym("X")).unwrap().dynamic.confidential_supply, Amount(990));

		state
			.transfer_from_confidential(&mut registry, sym("X"), &ids, Amount(980), Amount(10), Time::from_secs(2))
			.unwrap();
		assert_eq!(registry.get_by_symbol(sym("X")).unwrap().dynamic.confidential_supply, Amount::ZERO);
	}

	#[test]
	fn transfer_to_confidential_rejects_unbalanced_commitments() {
		let mut state = ConfidentialState::new();
		let mut registry = registry_with_confidential_asset();
		let authorities = AllActive;
		let output = ConfidentialOutput {
			authority: Authority::single_account(acct("alice")),
			commitment: Commitment::commit(500, BlindingFactor::zero()),
		};
		let err = state
			.transfer_to_confidential(&mut registry, &authorities, sym("X"), Amount(1_000), Amount(10), vec![output], [0u8; 32], 0, Time::from_secs(1))
			.unwrap_err();
		assert!(matches!(err, ChainError::InvariantViolation(_)));
	}

	#[test]
	fn transfer_to_confidential_rejects_disabled_asset() {
		let mut state = ConfidentialState::new();
		let mut registry = AssetRegistryState::new();
		registry
			.create_asset(sym("Y"), AssetType::Currency, acct("issuer"), AssetFlags::default(), Time::from_secs(0))
			.unwrap();
		let authorities = AllActive;
		let output = ConfidentialOutput {
			authority: Authority::single_account(acct("alice")),
			commitment: Commitment::public(990),
		};
		let err = state
			.transfer_to_confidential(&mut registry, &authorities, sym("Y"), Amount(1_000), Amount(10), vec![output], [0u8; 32], 0, Time::from_secs(1))
			.unwrap_err();
		assert!(matches!(err, ChainError::AssetRestricted(_)));
	}

	#[test]
	fn transfer_confidential_consumes_inputs_and_pays_fee_from_confidential_supply() {
		let mut state = ConfidentialState::new();
		let mut registry = registry_with_confidential_asset();
		let authorities = AllActive;
		let r = BlindingFactor::from_bytes([1u8; 32]);
		let seed_output = ConfidentialOutput {
			authority: Authority::single_account(acct("alice")),
			commitment: Commitment::commit(1_000, r),
		};
		let ids = state
			.transfer_to_confidential(&mut registry, &authorities, sym("X"), Amount(1_010), Amount(10), vec![seed_output], [0u8; 32], 0, Time::from_secs(1))
			.unwrap();

		let s = BlindingFactor::from_bytes([2u8; 32]);
		let next_output = ConfidentialOutput {
			authority: Authority::single_account(acct("bob")),
			commitment: Commitment::commit(995, s),
		};
		let fee_leftover = r.sub(&s);
		let change = ConfidentialOutput {
			authority: Authority::single_account(acct("alice")),
			commitment: Commitment::commit(0, fee_leftover),
		};
		let new_ids = state
			.transfer_confidential(&mut registry, &authorities, sym("X"), &ids, vec![next_output, change], Amount(5), [1u8; 32], 0, Time::from_secs(2))
			.unwrap();
		assert_eq!(new_ids.len(), 2);
		assert_eq!(registry.get_by_symbol(sym("X")).unwrap().dynamic.confidential_supply, Amount(995));
	}
}
