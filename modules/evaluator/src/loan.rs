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

//! Collateralized credit-pool borrowing:
//! `credit_pool_borrow` and `credit_pool_collateral` post collateral against
//! and draw debt from a [`module_credit_pool::CreditPoolState`] pool. This
//! is a distinct mechanism from `modules/orders`' [`module_orders`]-style
//! call order: a call order mints stablecoin debt directly
//! against a price feed and settles globally, while a loan borrows already
//!-deposited liquidity out of a credit pool's idle balance and is repaid
//! bilaterally, never settled. See DESIGN.md for the full writeup of this
//! choice.

use chain_primitives::{AccountName, Amount, AssetSymbol, Price, Time};
use chain_support::{ChainError, ChainResult, Parameters};
use module_credit_pool::CreditPool;
use object_store::{Id, Table};

/// `(owner, loan_id, debt, interest, collateral, liquidation_price,
/// last_interest_rate, last_interest_time, flash_loan)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Loan {
	pub owner: AccountName,
	pub credit_pool_id: Id<CreditPool>,
	pub debt_symbol: AssetSymbol,
	pub collateral_symbol: AssetSymbol,
	pub debt: Amount,
	/// Cumulative interest charged against this loan since it opened,
	/// apportioned out of the pool's aggregate accrual by this loan's share
	/// of the pool's `borrowed_balance` at each maintenance tick.
	pub interest: Amount,
	pub collateral: Amount,
	pub target_collateral_ratio_bps: u32,
	/// The boundary price of `collateral_symbol` in `debt_symbol` terms
	/// below which this loan is liquidated: `collateral * liquidation_price
	/// < debt * target_collateral_ratio_bps / 10000`.
	pub liquidation_price: Price,
	pub last_interest_rate_bps: u32,
	pub last_interest_time: Time,
	/// Same-transaction borrow-then-repay is already possible because
	/// operations within a transaction run in declared order under one undo
	/// session; this flag only records that a loan was opened and closed
	/// that way, it does not change evaluator behavior.
	pub flash_loan: bool,
}

impl Loan {
	fn recompute_liquidation_price(&mut self) {
		let debt_needed = self
			.debt
			.scale_rational(self.target_collateral_ratio_bps as i128, 10_000)
			.unwrap_or(Amount::ZERO);
		self.liquidation_price = Price::new(
			chain_primitives::Asset::new(self.collateral.0.max(1), self.collateral_symbol),
			chain_primitives::Asset::new(debt_needed.0, self.debt_symbol),
		);
	}

	/// Whether `collateral_price` (collateral in debt terms) has fallen
	/// through `liquidation_price`.
	pub fn is_below_liquidation(&self, collateral_price: Price) -> bool {
		if self.debt.is_zero() {
			return false;
		}
		collateral_price.cross_compare(&self.liquidation_price) == Some(core::cmp::Ordering::Less)
	}
}

/// The collateralized-loan book: one [`Table`] keyed by [`Id<Loan>`].
#[derive(Clone, Debug, Default)]
pub struct LoanBook {
	loans: Table<Loan>,
}

impl LoanBook {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn get(&self, id: Id<Loan>) -> ChainResult<&Loan> {
		self.loans.get(id)
	}

	pub fn iter(&self) -> impl Iterator<Item = (Id<Loan>, &Loan)> {
		self.loans.iter()
	}

	/// Opens an empty loan against `credit_pool_id` with no debt or
	/// collateral yet; `credit_pool_collateral`/`credit_pool_borrow` build
	/// it up from there.
	pub fn open(
		&mut self,
		owner: AccountName,
		credit_pool_id: Id<CreditPool>,
		debt_symbol: AssetSymbol,
		collateral_symbol: AssetSymbol,
		target_collateral_ratio_bps: u32,
		now: Time,
	) -> Id<Loan> {
		let (id, _) = self.loans.create(|_| Loan {
			owner,
			credit_pool_id,
			debt_symbol,
			collateral_symbol,
			debt: Amount::ZERO,
			interest: Amount::ZERO,
			collateral: Amount::ZERO,
			target_collateral_ratio_bps,
			liquidation_price: Price::null(collateral_symbol, debt_symbol),
			last_interest_rate_bps: 0,
			last_interest_time: now,
			flash_loan: false,
		});
		id
	}

	/// Adjusts posted collateral by `delta` (may be negative for a
	/// withdrawal); rejects a withdrawal that would leave the loan
	/// immediately liquidatable under `collateral_price`.
	pub fn adjust_collateral(&mut self, id: Id<Loan>, delta: Amount, collateral_price: Option<Price>) -> ChainResult<()> {
		let (_, after) = self.loans.modify(id, |loan| {
			loan.collateral = Amount(loan.collateral.0 + delta.0);
			loan.recompute_liquidation_price();
		})?;
		if after.collateral.is_negative() {
			self.loans.modify(id, |loan| loan.collateral = Amount(loan.collateral.0 - delta.0))?;
			return Err(ChainError::InsufficientBalance("loan collateral would go negative".into()));
		}
		if let Some(price) = collateral_price {
			if after.is_below_liquidation(price) {
				self.loans.modify(id, |loan| loan.collateral = Amount(loan.collateral.0 - delta.0))?;
				return Err(ChainError::InsufficientCollateral(format!(
					"loan for {} would fall below its liquidation price",
					after.owner
				)));
			}
		}
		Ok(())
	}

	/// Increases a loan's outstanding debt by `amount`, rejecting a draw
	/// that opens below the minimum collateralization.
	pub fn increase_debt(&mut self, id: Id<Loan>, amount: Amount, collateral_price: Price, params: &Parameters) -> ChainResult<()> {
		if !amount.is_positive() {
			return Err(ChainError::InvariantViolation("borrow amount must be positive".into()));
		}
		let (_, after) = self.loans.modify(id, |loan| {
			loan.debt = Amount(loan.debt.0 + amount.0);
			loan.recompute_liquidation_price();
		})?;
		let collateral_in_debt = collateral_price
			.convert(chain_primitives::Asset { amount: after.collateral, symbol: after.collateral_symbol })
			.ok_or_else(|| ChainError::PriceFeedMissing(format!("no price for {}/{}", after.collateral_symbol, after.debt_symbol)))?;
		let ratio = if after.debt.is_zero() {
			u32::MAX
		} else {
			((collateral_in_debt.amount.0 as i128 * 10_000) / after.debt.0.max(1) as i128).clamp(0, u32::MAX as i128) as u32
		};
		if ratio < params.margin_initial_collateral_ratio_bps {
			self.loans.modify(id, |loan| {
				loan.debt = Amount(loan.debt.0 - amount.0);
				loan.recompute_liquidation_price();
			})?;
			return Err(ChainError::InsufficientCollateral(format!(
				"loan collateralization {ratio}bps below minimum {}bps",
				params.margin_initial_collateral_ratio_bps
			)));
		}
		Ok(())
	}

	pub fn decrease_debt(&mut self, id: Id<Loan>, amount: Amount) -> ChainResult<()> {
		if !amount.is_positive() {
			return Err(ChainError::InvariantViolation("repay amount must be positive".into()));
		}
		let loan = self.loans.get(id)?;
		if amount.0 > loan.debt.0 {
			return Err(ChainError::InsufficientBalance("repay exceeds outstanding loan debt".into()));
		}
		self.loans.modify(id, |loan| {
			loan.debt = Amount(loan.debt.0 - amount.0);
			loan.recompute_liquidation_price();
		})?;
		Ok(())
	}

	/// Apportions `pool_growth` (the pool-wide interest accrued this tick)
	/// across every open loan on `credit_pool_id` by its share of
	/// `pool_borrowed_before`, the pool's `borrowed_balance` before accrual.
	pub fn apportion_interest(
		&mut self,
		credit_pool_id: Id<CreditPool>,
		pool_borrowed_before: Amount,
		pool_growth: Amount,
		rate_bps: u32,
		now: Time,
	) -> ChainResult<()> {
		if !pool_growth.is_positive() || pool_borrowed_before.is_zero() {
			return Ok(());
		}
		let ids: Vec<Id<Loan>> = self.loans.iter().filter(|(_, l)| l.credit_pool_id == credit_pool_id && l.debt.is_positive()).map(|(id, _)| id).collect();
		for id in ids {
			let loan = self.loans.get(id)?.clone();
			let share = ((loan.debt.0 as i128 * pool_growth.0 as i128) / pool_borrowed_before.0.max(1) as i128) as i64;
			if share <= 0 {
				continue;
			}
			self.loans.modify(id, |l| {
				l.debt = Amount(l.debt.0 + share);
				l.interest = Amount(l.interest.0 + share);
				l.last_interest_rate_bps = rate_bps;
				l.last_interest_time = now;
				l.recompute_liquidation_price();
			})?;
		}
		Ok(())
	}

	pub fn remove(&mut self, id: Id<Loan>) -> ChainResult<Loan> {
		self.loans.remove(id)
	}
}
