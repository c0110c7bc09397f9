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

//! The `Operation` sum type and its evaluator. One call to [`apply`]
//! runs exactly one operation inside [`object_store::with_session`]: every
//! module it touches commits together on success or rolls back together on
//! the first error, so a caller never observes a half-applied multi-module
//! effect such as a transfer that debited but did not credit.
//!
//! Each match arm below follows the same shape: check the caller is
//! authorized to act for the account the operation names, then hand the
//! already-validated inputs to the module that owns the mutation — the
//! modules themselves hold the remaining domain validation (insufficient
//! balance, malformed collateral, and so on).

use crate::chain::Chain;
use chain_primitives::{AccountName, Amount, AssetSymbol, AssetType, Price, Time};
use chain_support::{AuthorityProvider, ChainError, ChainResult};
use module_assets::SupplyCompartment;
use module_balances::Compartment;
use module_confidential::ConfidentialOutput;
use module_credit_pool::CreditPool;
use module_liquidity_pool::LiquidityPool;
use module_orders::{AuctionOrder, CallOrder, StrikeDescriptor};
use module_transfers::NoopPaymentHook;
use object_store::Id;

fn require_active(chain: &Chain, account: AccountName) -> ChainResult<()> {
	if !chain.authorities.is_active(account) {
		return Err(ChainError::InactiveAccount(format!("{account} is not active")));
	}
	Ok(())
}

/// `caller` must be `owner` or one of `owner`'s standing transfer delegates.
fn require_authorized_for(chain: &Chain, owner: AccountName, caller: AccountName) -> ChainResult<()> {
	require_active(chain, caller)?;
	if !chain.authorities.is_authorized_transfer(owner, caller) {
		return Err(ChainError::Unauthorized(format!("{caller} is not authorized to act for {owner}")));
	}
	Ok(())
}

/// Only a registered asset's issuer may mint/burn/reflag it.
fn require_issuer(chain: &Chain, symbol: AssetSymbol, caller: AccountName) -> ChainResult<()> {
	let record = chain.registry.get_by_symbol(symbol)?;
	if record.issuer != caller {
		return Err(ChainError::Unauthorized(format!("{caller} is not the issuer of {symbol}")));
	}
	Ok(())
}

/// Every user-initiated mutation the core exposes. Grouped by the
/// module that owns the mutation, with account/authority administration
/// and price feed submission last since neither owns a ledger of its own.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operation {
	// --- asset registry ---
	CreateAsset {
		symbol: AssetSymbol,
		asset_type: AssetType,
		issuer: AccountName,
		flags: module_assets::AssetFlags,
	},
	MintAsset {
		symbol: AssetSymbol,
		to: AccountName,
		amount: Amount,
	},
	BurnAsset {
		symbol: AssetSymbol,
		from: AccountName,
		amount: Amount,
	},
	SetAssetFlags {
		symbol: AssetSymbol,
		flags: module_assets::AssetFlags,
	},
	WhitelistAdd {
		symbol: AssetSymbol,
		account: AccountName,
	},
	WhitelistRemove {
		symbol: AssetSymbol,
		account: AccountName,
	},

	// --- balances ---
	StakeAsset {
		from: AccountName,
		to: AccountName,
		symbol: AssetSymbol,
		amount: Amount,
		signatory: AccountName,
	},
	UnstakeAsset {
		owner: AccountName,
		symbol: AssetSymbol,
		amount: Amount,
	},
	SetUnstakeRoute {
		from: AccountName,
		to: AccountName,
		symbol: AssetSymbol,
		percent_bps: u32,
		auto_stake: bool,
	},
	TransferToSavings {
		owner: AccountName,
		symbol: AssetSymbol,
		amount: Amount,
	},
	TransferFromSavings {
		from: AccountName,
		to: AccountName,
		symbol: AssetSymbol,
		amount: Amount,
		request_id: u64,
	},
	Delegate {
		delegator: AccountName,
		delegatee: AccountName,
		symbol: AssetSymbol,
		amount_new: Amount,
	},
	ClaimReward {
		owner: AccountName,
		symbol: AssetSymbol,
		amount: Amount,
		into_staked: bool,
	},
	CreateVestingBalance {
		owner: AccountName,
		symbol: AssetSymbol,
		amount: Amount,
		vesting_time: Time,
	},
	SetVotingProxy {
		account: AccountName,
		proxy: AccountName,
	},

	// --- transfers ---
	Transfer {
		from: AccountName,
		to: AccountName,
		symbol: AssetSymbol,
		amount: Amount,
		memo: String,
		signatory: AccountName,
	},
	CreateTransferRequest {
		from: AccountName,
		to: AccountName,
		symbol: AssetSymbol,
		amount: Amount,
		memo: String,
		request_id: u64,
	},
	AcceptTransferRequest {
		from: AccountName,
		request_id: u64,
		accept: bool,
	},
	CreateRecurringTransfer {
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
	},
	RequestRecurringTransfer {
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
	},
	AcceptRecurringTransferRequest {
		from: AccountName,
		request_id: u64,
		accept: bool,
	},
	CancelRecurringTransfer {
		owner: AccountName,
		id: Id<module_transfers::RecurringTransfer>,
	},

	// --- confidential ledger ---
	TransferToConfidential {
		caller: AccountName,
		symbol: AssetSymbol,
		public_amount: Amount,
		fee: Amount,
		outputs: Vec<ConfidentialOutput>,
		prev_txid: [u8; 32],
		op_index: u16,
	},
	TransferFromConfidential {
		caller: AccountName,
		symbol: AssetSymbol,
		input_ids: Vec<Id<module_confidential::ConfidentialBalance>>,
		public_amount: Amount,
		fee: Amount,
	},
	TransferConfidential {
		caller: AccountName,
		symbol: AssetSymbol,
		input_ids: Vec<Id<module_confidential::ConfidentialBalance>>,
		outputs: Vec<ConfidentialOutput>,
		fee: Amount,
		prev_txid: [u8; 32],
		op_index: u16,
	},

	// --- liquidity pools ---
	CreatePool {
		issuer: AccountName,
		a: AssetSymbol,
		b: AssetSymbol,
		symbol_liquid: AssetSymbol,
		initial_a: Amount,
		initial_b: Amount,
	},
	SellExactInput {
		caller: AccountName,
		id: Id<LiquidityPool>,
		sell_symbol: AssetSymbol,
		sell_amount: Amount,
		min_receive: Amount,
	},
	AcquireExactOutput {
		caller: AccountName,
		id: Id<LiquidityPool>,
		buy_symbol: AssetSymbol,
		buy_amount: Amount,
		max_sell: Amount,
	},
	SellExactInputRouted {
		caller: AccountName,
		sell_symbol: AssetSymbol,
		buy_symbol: AssetSymbol,
		sell_amount: Amount,
		min_receive: Amount,
	},
	FundPool {
		caller: AccountName,
		id: Id<LiquidityPool>,
		input_symbol: AssetSymbol,
		input_amount: Amount,
	},
	WithdrawPool {
		caller: AccountName,
		id: Id<LiquidityPool>,
		shares: Amount,
	},

	// --- credit pools ---
	CreateCreditPool {
		issuer: AccountName,
		base_symbol: AssetSymbol,
		credit_symbol: AssetSymbol,
	},
	Lend {
		caller: AccountName,
		id: Id<CreditPool>,
		deposit: Amount,
	},
	WithdrawCredit {
		caller: AccountName,
		id: Id<CreditPool>,
		shares: Amount,
	},
	OpenLoan {
		owner: AccountName,
		credit_pool_id: Id<CreditPool>,
		debt_symbol: AssetSymbol,
		collateral_symbol: AssetSymbol,
		target_collateral_ratio_bps: u32,
	},
	AdjustLoanCollateral {
		owner: AccountName,
		loan_id: Id<crate::loan::Loan>,
		delta: Amount,
		collateral_price: Option<Price>,
	},
	BorrowLoan {
		owner: AccountName,
		loan_id: Id<crate::loan::Loan>,
		amount: Amount,
		collateral_price: Price,
	},
	RepayLoan {
		owner: AccountName,
		loan_id: Id<crate::loan::Loan>,
		amount: Amount,
	},

	// --- orders and matching ---
	SubmitLimitOrder {
		owner: AccountName,
		sell_symbol: AssetSymbol,
		buy_symbol: AssetSymbol,
		price: Price,
		for_sale: Amount,
		fill_or_kill: bool,
		expiration: Time,
	},
	CancelLimitOrder {
		owner: AccountName,
		id: Id<module_orders::LimitOrder>,
	},
	SubmitMarginOrder {
		owner: AccountName,
		credit_pool_id: Id<CreditPool>,
		debt_symbol: AssetSymbol,
		position_symbol: AssetSymbol,
		collateral_symbol: AssetSymbol,
		collateral: Amount,
		debt: Amount,
		exchange_rate: Price,
		collateral_price: Price,
	},
	SubmitAuctionOrder {
		owner: AccountName,
		sell_symbol: AssetSymbol,
		buy_symbol: AssetSymbol,
		for_sale: Amount,
		min_to_receive: Amount,
		limit_close_price: Price,
		expiration: Time,
	},
	SubmitCallOrder {
		borrower: AccountName,
		debt_symbol: AssetSymbol,
		collateral_symbol: AssetSymbol,
		debt: Amount,
		collateral: Amount,
		target_collateral_ratio_bps: u32,
	},
	GlobalSettle {
		debt_symbol: AssetSymbol,
		settlement_price: Price,
	},
	ForceSettlementWithdraw {
		caller: AccountName,
		debt_symbol: AssetSymbol,
		collateral_symbol: AssetSymbol,
		debt_held: Amount,
		settlement_price: Price,
	},
	SubmitOptionOrder {
		owner: AccountName,
		underlying_symbol: AssetSymbol,
		strike_symbol: AssetSymbol,
		strike: StrikeDescriptor,
		units: Amount,
	},
	ExerciseOption {
		owner: AccountName,
		id: Id<module_orders::OptionOrder>,
	},
	SeedOptionChain {
		underlying_symbol: AssetSymbol,
		strike_symbol: AssetSymbol,
		mid_price_micros: i64,
	},

	// --- escrow ---
	ProposeEscrow {
		from: AccountName,
		to: AccountName,
		symbol: AssetSymbol,
		payment: Amount,
		acceptance_time: Time,
		escrow_expiration: Time,
	},
	EditEscrowPayment {
		caller: AccountName,
		id: Id<module_escrow::Escrow>,
		payment: Amount,
	},
	ApproveEscrow {
		id: Id<module_escrow::Escrow>,
		approver: AccountName,
		mediator_choice: Option<AccountName>,
	},
	CancelEscrow {
		id: Id<module_escrow::Escrow>,
		caller: AccountName,
	},
	DisputeEscrow {
		id: Id<module_escrow::Escrow>,
		caller: AccountName,
	},
	ApproveDisputeMediator {
		id: Id<module_escrow::Escrow>,
		mediator: AccountName,
	},
	SubmitReleasePercent {
		id: Id<module_escrow::Escrow>,
		participant: AccountName,
		percent_bps: u32,
	},
	ReleaseEscrow {
		id: Id<module_escrow::Escrow>,
		caller: AccountName,
		percent_bps: u32,
	},
	ResolveDispute {
		id: Id<module_escrow::Escrow>,
	},
	RegisterMediator {
		account: AccountName,
	},
	UnregisterMediator {
		account: AccountName,
	},

	// --- account/authority administration and price feeds ---
	ActivateAccount {
		account: AccountName,
	},
	DeactivateAccount {
		account: AccountName,
	},
	AuthorizeTransferDelegate {
		owner: AccountName,
		signatory: AccountName,
	},
	RevokeTransferDelegate {
		owner: AccountName,
		signatory: AccountName,
	},
	SubmitPriceFeed {
		producer: AccountName,
		base: AssetSymbol,
		quote: AssetSymbol,
		price: Price,
	},
}

/// Applies one [`Operation`] to `chain` at `now`, inside its own undo
/// session. A rejected
/// operation leaves `chain` exactly as it was before this call.
pub fn apply(chain: &mut Chain, now: Time, op: Operation) -> ChainResult<()> {
	object_store::with_session(chain, |chain| mutate(chain, now, op))
}

#[allow(clippy::too_many_lines)]
fn mutate(chain: &mut Chain, now: Time, op: Operation) -> ChainResult<()> {
	match op {
		Operation::CreateAsset { symbol, asset_type, issuer, flags } => {
			require_active(chain, issuer)?;
			chain.registry.create_asset(symbol, asset_type, issuer, flags, now)?;
			Ok(())
		}
		Operation::MintAsset { symbol, to, amount } => {
			require_issuer(chain, symbol, to)?;
			let asset_type = chain.registry.get_by_symbol(symbol)?.asset_type;
			if asset_type.is_market_issued() {
				return Err(ChainError::AssetRestricted(format!("{symbol} is market-issued and cannot be minted directly")));
			}
			chain.registry.mint(symbol, SupplyCompartment::Liquid, amount, now)?;
			chain.balances.adjust_local(to, symbol, Compartment::Liquid, amount)?;
			Ok(())
		}
		Operation::BurnAsset { symbol, from, amount } => {
			require_issuer(chain, symbol, from)?;
			let asset_type = chain.registry.get_by_symbol(symbol)?.asset_type;
			if asset_type.is_market_issued() {
				return Err(ChainError::AssetRestricted(format!("{symbol} is market-issued and cannot be burned directly")));
			}
			chain.balances.adjust_local(from, symbol, Compartment::Liquid, -amount)?;
			chain.registry.burn(symbol, SupplyCompartment::Liquid, amount, now)?;
			Ok(())
		}
		Operation::SetAssetFlags { symbol, flags } => {
			let issuer = chain.registry.get_by_symbol(symbol)?.issuer;
			require_active(chain, issuer)?;
			chain.registry.set_flags(symbol, flags, now)
		}
		Operation::WhitelistAdd { symbol, account } => {
			let issuer = chain.registry.get_by_symbol(symbol)?.issuer;
			require_active(chain, issuer)?;
			chain.registry.whitelist_add(symbol, account)
		}
		Operation::WhitelistRemove { symbol, account } => {
			let issuer = chain.registry.get_by_symbol(symbol)?.issuer;
			require_active(chain, issuer)?;
			chain.registry.whitelist_remove(symbol, account)
		}

		Operation::StakeAsset { from, to, symbol, amount, signatory } => {
			require_authorized_for(chain, from, signatory)?;
			require_active(chain, to)?;
			chain.balances.stake_asset(&mut chain.registry, &chain.params, from, to, symbol, amount, now)
		}
		Operation::UnstakeAsset { owner, symbol, amount } => {
			require_active(chain, owner)?;
			chain.balances.unstake_asset(&chain.params, owner, symbol, amount, now)
		}
		Operation::SetUnstakeRoute { from, to, symbol, percent_bps, auto_stake } => {
			require_active(chain, from)?;
			chain.balances.unstake_asset_route(from, to, symbol, percent_bps, auto_stake)
		}
		Operation::TransferToSavings { owner, symbol, amount } => {
			require_active(chain, owner)?;
			chain.balances.transfer_to_savings(&mut chain.registry, owner, symbol, amount, now)
		}
		Operation::TransferFromSavings { from, to, symbol, amount, request_id } => {
			require_active(chain, from)?;
			chain
				.balances
				.transfer_from_savings(&mut chain.registry, &chain.params, from, to, symbol, amount, request_id, now)
				.map(|_| ())
		}
		Operation::Delegate { delegator, delegatee, symbol, amount_new } => {
			require_active(chain, delegator)?;
			require_active(chain, delegatee)?;
			chain
				.balances
				.delegate(&mut chain.registry, &chain.params, delegator, delegatee, symbol, amount_new, now)
		}
		Operation::ClaimReward { owner, symbol, amount, into_staked } => {
			require_active(chain, owner)?;
			chain.balances.claim_reward_balance(&mut chain.registry, &chain.params, owner, symbol, amount, into_staked, now)
		}
		Operation::CreateVestingBalance { owner, symbol, amount, vesting_time } => {
			require_active(chain, owner)?;
			chain.balances.create_vesting_balance(&mut chain.registry, owner, symbol, amount, vesting_time, now).map(|_| ())
		}
		Operation::SetVotingProxy { account, proxy } => {
			require_active(chain, account)?;
			chain.balances.set_voting_proxy(account, proxy)
		}

		Operation::Transfer { from, to, symbol, amount, memo, signatory } => {
			require_authorized_for(chain, from, signatory)?;
			require_active(chain, to)?;
			chain.transfers.transfer(
				&mut chain.balances,
				&mut chain.registry,
				&chain.authorities,
				from,
				to,
				symbol,
				amount,
				&memo,
				now,
				&mut NoopPaymentHook,
			)
		}
		Operation::CreateTransferRequest { from, to, symbol, amount, memo, request_id } => {
			require_active(chain, to)?;
			chain.transfers.create_transfer_request(&chain.params, from, to, symbol, amount, memo, request_id, now).map(|_| ())
		}
		Operation::AcceptTransferRequest { from, request_id, accept } => {
			require_active(chain, from)?;
			chain.transfers.accept_transfer_request(
				&mut chain.balances,
				&mut chain.registry,
				&chain.authorities,
				from,
				request_id,
				accept,
				now,
				&mut NoopPaymentHook,
			)
		}
		Operation::CreateRecurringTransfer {
			from,
			to,
			symbol,
			amount,
			memo,
			begin,
			interval_secs,
			payments,
			extensible,
			fill_or_kill,
		} => {
			require_active(chain, from)?;
			chain
				.transfers
				.create_recurring_transfer(from, to, symbol, amount, memo, begin, interval_secs, payments, extensible, fill_or_kill)
				.map(|_| ())
		}
		Operation::RequestRecurringTransfer {
			from,
			to,
			symbol,
			amount,
			memo,
			begin,
			interval_secs,
			payments,
			extensible,
			fill_or_kill,
			request_id,
		} => {
			require_active(chain, to)?;
			chain
				.transfers
				.request_recurring_transfer(
					from,
					to,
					symbol,
					amount,
					memo,
					begin,
					interval_secs,
					payments,
					extensible,
					fill_or_kill,
					request_id,
				)
				.map(|_| ())
		}
		Operation::AcceptRecurringTransferRequest { from, request_id, accept } => {
			require_active(chain, from)?;
			chain.transfers.accept_recurring_transfer_request(from, request_id, accept).map(|_| ())
		}
		Operation::CancelRecurringTransfer { owner, id } => {
			require_active(chain, owner)?;
			chain.transfers.cancel_recurring_transfer(id)
		}

		Operation::TransferToConfidential { caller, symbol, public_amount, fee, outputs, prev_txid, op_index } => {
			require_active(chain, caller)?;
			chain.balances.adjust(&mut chain.registry, caller, symbol, Compartment::Liquid, -public_amount, now)?;
			chain
				.confidential
				.transfer_to_confidential(&mut chain.registry, &chain.authorities, symbol, public_amount, fee, outputs, prev_txid, op_index, now)
				.map(|_| ())
		}
		Operation::TransferFromConfidential { caller, symbol, input_ids, public_amount, fee } => {
			require_active(chain, caller)?;
			chain.confidential.transfer_from_confidential(&mut chain.registry, symbol, &input_ids, public_amount, fee, now)?;
			chain.balances.adjust(&mut chain.registry, caller, symbol, Compartment::Liquid, public_amount, now)
		}
		Operation::TransferConfidential { caller, symbol, input_ids, outputs, fee, prev_txid, op_index } => {
			require_active(chain, caller)?;
			if fee.is_positive() {
				chain.registry.adjust_accumulated_fees(symbol, fee, now)?;
			}
			chain
				.confidential
				.transfer_confidential(&mut chain.registry, &chain.authorities, symbol, &input_ids, outputs, fee, prev_txid, op_index, now)
				.map(|_| ())
		}

		Operation::CreatePool { issuer, a, b, symbol_liquid, initial_a, initial_b } => {
			require_active(chain, issuer)?;
			chain.balances.adjust(&mut chain.registry, issuer, a, Compartment::Liquid, -initial_a, now)?;
			chain.balances.adjust(&mut chain.registry, issuer, b, Compartment::Liquid, -initial_b, now)?;
			let id = chain
				.liquidity_pools
				.create_pool(&mut chain.registry, &chain.params, issuer, a, b, symbol_liquid, initial_a, initial_b, now)?;
			chain.balances.adjust_local(issuer, symbol_liquid, Compartment::Liquid, chain.registry.get_by_symbol(symbol_liquid)?.dynamic.total_supply)?;
			let _ = id;
			Ok(())
		}
		Operation::SellExactInput { caller, id, sell_symbol, sell_amount, min_receive } => {
			require_active(chain, caller)?;
			chain.balances.adjust(&mut chain.registry, caller, sell_symbol, Compartment::Liquid, -sell_amount, now)?;
			let receipt = chain.liquidity_pools.sell_exact_input(&mut chain.registry, &chain.params, id, sell_symbol, sell_amount, min_receive, now)?;
			chain.balances.adjust(&mut chain.registry, caller, receipt.received.symbol, Compartment::Liquid, receipt.received.amount, now)
		}
		Operation::AcquireExactOutput { caller, id, buy_symbol, buy_amount, max_sell } => {
			require_active(chain, caller)?;
			let receipt = chain.liquidity_pools.acquire_exact_output(&mut chain.registry, &chain.params, id, buy_symbol, buy_amount, max_sell, now)?;
			chain.balances.adjust(&mut chain.registry, caller, receipt.sold.symbol, Compartment::Liquid, -receipt.sold.amount, now)?;
			chain.balances.adjust(&mut chain.registry, caller, receipt.received.symbol, Compartment::Liquid, receipt.received.amount, now)
		}
		Operation::SellExactInputRouted { caller, sell_symbol, buy_symbol, sell_amount, min_receive } => {
			require_active(chain, caller)?;
			chain.balances.adjust(&mut chain.registry, caller, sell_symbol, Compartment::Liquid, -sell_amount, now)?;
			let receipt =
				chain.liquidity_pools.sell_exact_input_routed(&mut chain.registry, &chain.params, sell_symbol, buy_symbol, sell_amount, min_receive, now)?;
			chain.balances.adjust(&mut chain.registry, caller, receipt.received.symbol, Compartment::Liquid, receipt.received.amount, now)
		}
		Operation::FundPool { caller, id, input_symbol, input_amount } => {
			require_active(chain, caller)?;
			chain.balances.adjust(&mut chain.registry, caller, input_symbol, Compartment::Liquid, -input_amount, now)?;
			let pool = chain.liquidity_pools.get(id)?.clone();
			let shares = chain.liquidity_pools.fund(&mut chain.registry, id, input_symbol, input_amount, now)?;
			chain.balances.adjust_local(caller, pool.symbol_liquid, Compartment::Liquid, shares)
		}
		Operation::WithdrawPool { caller, id, shares } => {
			require_active(chain, caller)?;
			let pool = chain.liquidity_pools.get(id)?.clone();
			chain.balances.adjust_local(caller, pool.symbol_liquid, Compartment::Liquid, -shares)?;
			let (out_a, out_b) = chain.liquidity_pools.withdraw(&mut chain.registry, id, shares, now)?;
			chain.balances.adjust(&mut chain.registry, caller, out_a.symbol, Compartment::Liquid, out_a.amount, now)?;
			chain.balances.adjust(&mut chain.registry, caller, out_b.symbol, Compartment::Liquid, out_b.amount, now)
		}

		Operation::CreateCreditPool { issuer, base_symbol, credit_symbol } => {
			require_active(chain, issuer)?;
			chain.credit_pools.create_pool(&mut chain.registry, issuer, base_symbol, credit_symbol, now).map(|_| ())
		}
		Operation::Lend { caller, id, deposit } => {
			require_active(chain, caller)?;
			let pool = chain.credit_pools.get(id)?.clone();
			chain.balances.adjust(&mut chain.registry, caller, pool.base_symbol, Compartment::Liquid, -deposit, now)?;
			let shares = chain.credit_pools.lend(&mut chain.registry, id, deposit, now)?;
			chain.balances.adjust_local(caller, pool.credit_symbol, Compartment::Liquid, shares)
		}
		Operation::WithdrawCredit { caller, id, shares } => {
			require_active(chain, caller)?;
			let pool = chain.credit_pools.get(id)?.clone();
			chain.balances.adjust_local(caller, pool.credit_symbol, Compartment::Liquid, -shares)?;
			let base_out = chain.credit_pools.withdraw(&mut chain.registry, id, shares, now)?;
			chain.balances.adjust(&mut chain.registry, caller, pool.base_symbol, Compartment::Liquid, base_out, now)
		}
		Operation::OpenLoan { owner, credit_pool_id, debt_symbol, collateral_symbol, target_collateral_ratio_bps } => {
			require_active(chain, owner)?;
			chain.loans.open(owner, credit_pool_id, debt_symbol, collateral_symbol, target_collateral_ratio_bps, now);
			Ok(())
		}
		Operation::AdjustLoanCollateral { owner, loan_id, delta, collateral_price } => {
			require_active(chain, owner)?;
			let loan = chain.loans.get(loan_id)?.clone();
			if loan.owner != owner {
				return Err(ChainError::Unauthorized(format!("{owner} does not own loan")));
			}
			if delta.is_negative() {
				chain.loans.adjust_collateral(loan_id, delta, collateral_price)?;
				chain.balances.adjust(&mut chain.registry, owner, loan.collateral_symbol, Compartment::Liquid, -delta, now)
			} else {
				chain.balances.adjust(&mut chain.registry, owner, loan.collateral_symbol, Compartment::Liquid, -delta, now)?;
				chain.loans.adjust_collateral(loan_id, delta, collateral_price)
			}
		}
		Operation::BorrowLoan { owner, loan_id, amount, collateral_price } => {
			require_active(chain, owner)?;
			let loan = chain.loans.get(loan_id)?.clone();
			if loan.owner != owner {
				return Err(ChainError::Unauthorized(format!("{owner} does not own loan")));
			}
			chain.credit_pools.borrow(loan.credit_pool_id, amount)?;
			chain.loans.increase_debt(loan_id, amount, collateral_price, &chain.params)?;
			chain.balances.adjust(&mut chain.registry, owner, loan.debt_symbol, Compartment::Liquid, amount, now)
		}
		Operation::RepayLoan { owner, loan_id, amount } => {
			require_active(chain, owner)?;
			let loan = chain.loans.get(loan_id)?.clone();
			if loan.owner != owner {
				return Err(ChainError::Unauthorized(format!("{owner} does not own loan")));
			}
			chain.balances.adjust(&mut chain.registry, owner, loan.debt_symbol, Compartment::Liquid, -amount, now)?;
			chain.credit_pools.repay(loan.credit_pool_id, amount)?;
			chain.loans.decrease_debt(loan_id, amount)
		}

		Operation::SubmitLimitOrder { owner, sell_symbol, buy_symbol, price, for_sale, fill_or_kill, expiration } => {
			require_active(chain, owner)?;
			chain.balances.adjust(&mut chain.registry, owner, sell_symbol, Compartment::Liquid, -for_sale, now)?;
			registry_pending(chain, sell_symbol, for_sale, now)?;
			let (_, fills) = chain.orders.submit_limit_order(owner, sell_symbol, buy_symbol, price, for_sale, fill_or_kill, expiration)?;
			settle_fills(chain, owner, sell_symbol, buy_symbol, &fills, now)
		}
		Operation::CancelLimitOrder { owner, id } => {
			require_active(chain, owner)?;
			let order = chain.orders.limit_order(id)?.clone();
			if order.owner != owner {
				return Err(ChainError::Unauthorized(format!("{owner} does not own this order")));
			}
			let cancelled = chain.orders.cancel_limit_order(id)?;
			registry_pending(chain, cancelled.sell_symbol, -cancelled.for_sale, now)?;
			chain.balances.adjust(&mut chain.registry, owner, cancelled.sell_symbol, Compartment::Liquid, cancelled.for_sale, now)
		}
		Operation::SubmitMarginOrder {
			owner,
			credit_pool_id,
			debt_symbol,
			position_symbol,
			collateral_symbol,
			collateral,
			debt,
			exchange_rate,
			collateral_price,
		} => {
			require_active(chain, owner)?;
			chain.balances.adjust(&mut chain.registry, owner, collateral_symbol, Compartment::Liquid, -collateral, now)?;
			registry_pending(chain, collateral_symbol, collateral, now)?;
			chain.orders.submit_margin_order(
				&mut chain.credit_pools,
				&chain.params,
				credit_pool_id,
				owner,
				debt_symbol,
				position_symbol,
				collateral_symbol,
				collateral,
				debt,
				exchange_rate,
				collateral_price,
				now,
			)?;
			Ok(())
		}
		Operation::SubmitAuctionOrder { owner, sell_symbol, buy_symbol, for_sale, min_to_receive, limit_close_price, expiration } => {
			require_active(chain, owner)?;
			chain.balances.adjust(&mut chain.registry, owner, sell_symbol, Compartment::Liquid, -for_sale, now)?;
			registry_pending(chain, sell_symbol, for_sale, now)?;
			chain.orders.submit_auction_order(AuctionOrder { owner, sell_symbol, buy_symbol, for_sale, min_to_receive, limit_close_price, expiration })?;
			chain.auction_pairs.insert((sell_symbol, buy_symbol));
			Ok(())
		}
		Operation::SubmitCallOrder { borrower, debt_symbol, collateral_symbol, debt, collateral, target_collateral_ratio_bps } => {
			require_active(chain, borrower)?;
			chain.balances.adjust(&mut chain.registry, borrower, collateral_symbol, Compartment::Liquid, -collateral, now)?;
			registry_pending(chain, collateral_symbol, collateral, now)?;
			let asset_type = chain.registry.get_by_symbol(debt_symbol)?.asset_type;
			if !matches!(asset_type, AssetType::Bitasset) {
				return Err(ChainError::AssetRestricted(format!("{debt_symbol} is not a bitasset debt symbol")));
			}
			chain.registry.mint(debt_symbol, SupplyCompartment::Liquid, debt, now)?;
			chain.balances.adjust_local(borrower, debt_symbol, Compartment::Liquid, debt)?;
			chain.orders.submit_call_order(CallOrder { borrower, debt_symbol, collateral_symbol, debt, collateral, target_collateral_ratio_bps })?;
			chain.call_order_pairs.insert(debt_symbol, collateral_symbol);
			Ok(())
		}
		Operation::GlobalSettle { debt_symbol, settlement_price } => {
			let settled = chain.orders.global_settle(debt_symbol, settlement_price)?;
			for (id, borrower, surplus) in settled {
				let order = chain.orders.call_order(id)?.clone();
				if surplus.is_positive() {
					registry_pending(chain, order.collateral_symbol, -surplus, now)?;
					chain.balances.adjust_local(borrower, order.collateral_symbol, Compartment::Liquid, surplus)?;
				}
			}
			Ok(())
		}
		Operation::ForceSettlementWithdraw { caller, debt_symbol, collateral_symbol, debt_held, settlement_price } => {
			require_active(chain, caller)?;
			// The settlement fund this draws down was backed, order by
			// order, by collateral left in `Pending` when `GlobalSettle` ran
			// (it released only each order's surplus back to `Liquid` at
			// that time); this payout is the fund's `Pending` balance
			// finally reaching a caller's `Liquid` balance.
			chain.balances.adjust_local(caller, debt_symbol, Compartment::Liquid, -debt_held)?;
			let paid = chain
				.orders
				.force_settlement_withdraw(&mut chain.registry, debt_symbol, collateral_symbol, debt_held, settlement_price, now)?;
			registry_pending(chain, collateral_symbol, -paid, now)?;
			chain.balances.adjust_local(caller, collateral_symbol, Compartment::Liquid, paid)
		}
		Operation::SubmitOptionOrder { owner, underlying_symbol, strike_symbol, strike, units } => {
			require_active(chain, owner)?;
			let locked = Amount(units.0.saturating_mul(strike.multiple as i64));
			chain.balances.adjust(&mut chain.registry, owner, underlying_symbol, Compartment::Liquid, -locked, now)?;
			registry_pending(chain, underlying_symbol, locked, now)?;
			chain.orders.submit_option_order(owner, underlying_symbol, strike_symbol, strike, units)?;
			Ok(())
		}
		Operation::ExerciseOption { owner, id } => {
			require_active(chain, owner)?;
			let order = chain.orders.option_order(id)?.clone();
			if order.owner != owner {
				return Err(ChainError::Unauthorized(format!("{owner} does not own this option")));
			}
			let delivered = chain.orders.exercise_option(id, now)?;
			// The locked underlying backed the exercise in full; it is consumed
			// by settlement rather than returned, so it leaves `Pending` and
			// `total_supply` together via `burn` instead of a bare
			// `adjust_pending_supply` (which would strand it out of supply
			// conservation).
			chain.registry.burn(order.underlying_symbol, SupplyCompartment::Pending, order.locked_underlying, now)?;
			chain.balances.adjust(&mut chain.registry, owner, delivered.symbol, Compartment::Liquid, delivered.amount, now)
		}
		Operation::SeedOptionChain { underlying_symbol, strike_symbol, mid_price_micros } => {
			chain.orders.seed_option_chain(underlying_symbol, strike_symbol, mid_price_micros, &chain.params, now);
			Ok(())
		}

		Operation::ProposeEscrow { from, to, symbol, payment, acceptance_time, escrow_expiration } => {
			require_active(chain, from)?;
			require_active(chain, to)?;
			chain.escrow.propose(from, to, symbol, payment, acceptance_time, escrow_expiration).map(|_| ())
		}
		Operation::EditEscrowPayment { caller, id, payment } => {
			let escrow = chain.escrow.get(id)?.clone();
			if caller != escrow.from && caller != escrow.to {
				return Err(ChainError::Unauthorized(format!("{caller} is not a party to this escrow")));
			}
			chain.escrow.edit_payment(id, payment)
		}
		Operation::ApproveEscrow { id, approver, mediator_choice } => {
			require_active(chain, approver)?;
			chain.escrow.approve(&mut chain.balances, &mut chain.registry, id, approver, mediator_choice, &chain.params, now).map(|_| ())
		}
		Operation::CancelEscrow { id, caller } => {
			require_active(chain, caller)?;
			chain.escrow.cancel(&mut chain.balances, &mut chain.registry, id, caller, &chain.params, now)
		}
		Operation::DisputeEscrow { id, caller } => {
			require_active(chain, caller)?;
			chain.escrow.dispute(id, caller, &chain.params, now).map(|_| ())
		}
		Operation::ApproveDisputeMediator { id, mediator } => {
			require_active(chain, mediator)?;
			chain.escrow.approve_dispute_mediator(&mut chain.balances, &mut chain.registry, id, mediator, &chain.params, now)
		}
		Operation::SubmitReleasePercent { id, participant, percent_bps } => {
			require_active(chain, participant)?;
			chain.escrow.submit_release_percent(id, participant, percent_bps)
		}
		Operation::ReleaseEscrow { id, caller, percent_bps } => {
			require_active(chain, caller)?;
			chain.escrow.release(&mut chain.balances, &mut chain.registry, id, caller, percent_bps, &chain.params, now)
		}
		Operation::ResolveDispute { id } => chain.escrow.resolve_dispute(&mut chain.balances, &mut chain.registry, id, &chain.params, now),
		Operation::RegisterMediator { account } => {
			chain.escrow.register_mediator(account);
			Ok(())
		}
		Operation::UnregisterMediator { account } => {
			chain.escrow.unregister_mediator(account);
			Ok(())
		}

		Operation::ActivateAccount { account } => {
			chain.authorities.activate(account);
			Ok(())
		}
		Operation::DeactivateAccount { account } => {
			chain.authorities.deactivate(account);
			Ok(())
		}
		Operation::AuthorizeTransferDelegate { owner, signatory } => {
			require_active(chain, owner)?;
			chain.authorities.authorize_transfer(owner, signatory);
			Ok(())
		}
		Operation::RevokeTransferDelegate { owner, signatory } => {
			require_active(chain, owner)?;
			chain.authorities.revoke_transfer(owner, signatory);
			Ok(())
		}
		Operation::SubmitPriceFeed { producer, base, quote, price } => {
			require_active(chain, producer)?;
			chain.price_feeds.submit(producer, base, quote, price, now);
			Ok(())
		}
	}
}

/// `registry.adjust_pending_supply` under the uniform sign convention every
/// order-book escrow call site here uses: positive while an order holds
/// funds in reserve, negative once they are released back out.
fn registry_pending(chain: &mut Chain, symbol: AssetSymbol, delta: Amount, now: Time) -> ChainResult<()> {
	if delta.is_zero() {
		return Ok(());
	}
	chain.registry.adjust_pending_supply(symbol, delta, now)
}

/// Pays out every fill a freshly submitted limit order produced. `taker` already had `for_sale` escrowed into
/// `sell_symbol`'s pending compartment before matching ran; each fill
/// releases both sides of the trade out of pending into the two parties'
/// liquid balances.
fn settle_fills(
	chain: &mut Chain,
	taker: AccountName,
	sell_symbol: AssetSymbol,
	buy_symbol: AssetSymbol,
	fills: &[module_orders::Fill],
	now: Time,
) -> ChainResult<()> {
	for fill in fills {
		registry_pending(chain, buy_symbol, -fill.took.amount, now)?;
		chain.balances.adjust_local(taker, buy_symbol, Compartment::Liquid, fill.took.amount)?;
		registry_pending(chain, sell_symbol, -fill.gave.amount, now)?;
		chain.balances.adjust_local(fill.maker_owner, sell_symbol, Compartment::Liquid, fill.gave.amount)?;
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use chain_primitives::UNIT;
	use chain_support::Parameters;
	use module_assets::AssetFlags;

	fn acct(s: &str) -> AccountName {
		AccountName::new(s).unwrap()
	}

	fn sym(s: &str) -> AssetSymbol {
		AssetSymbol::new(s).unwrap()
	}

	fn new_chain() -> Chain {
		Chain::new(Parameters::default())
	}

	fn create_currency(chain: &mut Chain, symbol: AssetSymbol, issuer: AccountName, now: Time) {
		chain.registry.create_asset(symbol, AssetType::Currency, issuer, AssetFlags::default(), now).unwrap();
	}

	fn fund(chain: &mut Chain, owner: AccountName, symbol: AssetSymbol, amount: Amount, now: Time) {
		chain.registry.mint(symbol, SupplyCompartment::Liquid, amount, now).unwrap();
		chain.balances.adjust(&mut chain.registry, owner, symbol, Compartment::Liquid, amount, now).unwrap();
	}

	// A call order opened against a non-bitasset debt symbol fails after the
	// collateral has already been moved into the pending compartment; the
	// surrounding `with_session` in `apply` must undo both the balance debit
	// and the registry's pending-supply bump together.
	#[test]
	fn submit_call_order_with_non_bitasset_debt_rolls_back_every_module() {
		let mut chain = new_chain();
		let now = Time::from_secs(0);
		let issuer = acct("issuer");
		let borrower = acct("borrower");
		chain.authorities.activate(borrower);
		create_currency(&mut chain, sym("BTC"), issuer, now);
		create_currency(&mut chain, sym("USD"), issuer, now);
		fund(&mut chain, borrower, sym("BTC"), Amount(10 * UNIT), now);

		let before_liquid = chain.balances.get(borrower, sym("BTC")).liquid;
		let before_pending = chain.registry.get_by_symbol(sym("BTC")).unwrap().dynamic.pending_supply;

		let result = apply(
			&mut chain,
			now,
			Operation::SubmitCallOrder {
				borrower,
				debt_symbol: sym("USD"),
				collateral_symbol: sym("BTC"),
				debt: Amount(5 * UNIT),
				collateral: Amount(2 * UNIT),
				target_collateral_ratio_bps: 15_000,
			},
		);

		assert!(matches!(result, Err(ChainError::AssetRestricted(_))));
		assert_eq!(chain.balances.get(borrower, sym("BTC")).liquid, before_liquid);
		assert_eq!(chain.registry.get_by_symbol(sym("BTC")).unwrap().dynamic.pending_supply, before_pending);
	}

	#[test]
	fn transfer_rejects_unregistered_signatory_and_accepts_registered_delegate() {
		let mut chain = new_chain();
		let now = Time::from_secs(0);
		let issuer = acct("issuer");
		let alice = acct("alice");
		let bob = acct("bob");
		let carol = acct("carol");
		chain.authorities.activate(alice);
		chain.authorities.activate(bob);
		chain.authorities.activate(carol);
		create_currency(&mut chain, sym("X"), issuer, now);
		fund(&mut chain, alice, sym("X"), Amount(100 * UNIT), now);

		let transfer = |signatory: AccountName| Operation::Transfer {
			from: alice,
			to: bob,
			symbol: sym("X"),
			amount: Amount(10 * UNIT),
			memo: String::new(),
			signatory,
		};

		let result = apply(&mut chain, now, transfer(carol));
		assert!(matches!(result, Err(ChainError::Unauthorized(_))));
		assert_eq!(chain.balances.get(bob, sym("X")).liquid, Amount::ZERO);

		apply(&mut chain, now, Operation::AuthorizeTransferDelegate { owner: alice, signatory: carol }).unwrap();
		apply(&mut chain, now, transfer(carol)).unwrap();
		assert_eq!(chain.balances.get(bob, sym("X")).liquid, Amount(10 * UNIT));

		apply(&mut chain, now, Operation::RevokeTransferDelegate { owner: alice, signatory: carol }).unwrap();
		let result = apply(&mut chain, now, transfer(carol));
		assert!(matches!(result, Err(ChainError::Unauthorized(_))));
	}

	#[test]
	fn stake_asset_honors_authorized_delegate_signatory() {
		let mut chain = new_chain();
		let now = Time::from_secs(0);
		let issuer = acct("issuer");
		let alice = acct("alice");
		let carol = acct("carol");
		chain.authorities.activate(alice);
		chain.authorities.activate(carol);
		create_currency(&mut chain, sym("X"), issuer, now);
		fund(&mut chain, alice, sym("X"), Amount(100 * UNIT), now);

		let stake = Operation::StakeAsset { from: alice, to: alice, symbol: sym("X"), amount: Amount(40 * UNIT), signatory: carol };
		let result = apply(&mut chain, now, stake.clone());
		assert!(matches!(result, Err(ChainError::Unauthorized(_))));

		apply(&mut chain, now, Operation::AuthorizeTransferDelegate { owner: alice, signatory: carol }).unwrap();
		apply(&mut chain, now, stake).unwrap();
		assert_eq!(chain.balances.get(alice, sym("X")).to_stake, Amount(40 * UNIT));
	}

	#[test]
	fn transfer_to_inactive_recipient_is_rejected() {
		let mut chain = new_chain();
		let now = Time::from_secs(0);
		let issuer = acct("issuer");
		let alice = acct("alice");
		let bob = acct("bob");
		chain.authorities.activate(alice);
		create_currency(&mut chain, sym("X"), issuer, now);
		fund(&mut chain, alice, sym("X"), Amount(100 * UNIT), now);

		let result = apply(
			&mut chain,
			now,
			Operation::Transfer { from: alice, to: bob, symbol: sym("X"), amount: Amount(10 * UNIT), memo: String::new(), signatory: alice },
		);
		assert!(matches!(result, Err(ChainError::InactiveAccount(_))));
	}

	#[test]
	fn stake_asset_via_operations_ticks_through_maintenance_like_direct_calls() {
		let mut chain = new_chain();
		let t0 = Time::from_secs(0);
		let issuer = acct("issuer");
		let alice = acct("alice");
		chain.authorities.activate(alice);
		create_currency(&mut chain, sym("X"), issuer, t0);
		fund(&mut chain, alice, sym("X"), Amount(100_000 * UNIT), t0);

		apply(
			&mut chain,
			t0,
			Operation::StakeAsset { from: alice, to: alice, symbol: sym("X"), amount: Amount(100_000 * UNIT), signatory: alice },
		)
		.unwrap();

		let balance = chain.balances.get(alice, sym("X"));
		assert_eq!(balance.to_stake, Amount(100_000 * UNIT));
		assert_eq!(balance.total_staked, Amount::ZERO);

		let mut now = t0;
		let interval = chain.params.stake_interval_secs;
		for _ in 1..=4 {
			now = now.saturating_add_secs(interval);
			chain.run_maintenance(now).unwrap();
		}

		let balance = chain.balances.get(alice, sym("X"));
		assert_eq!(balance.to_stake, Amount::ZERO);
		assert_eq!(balance.total_staked, Amount(100_000 * UNIT));
	}
}
