use chain_primitives::{AccountName, Amount, AssetSymbol, Price, Time};
use module_credit_pool::CreditPool;
use object_store::Id;

/// Shared read-only view every order kind exposes to the matching pipeline
///: what it is selling, what it wants, and how
/// much is left.
pub trait OrderView {
	fn sell_symbol(&self) -> AssetSymbol;
	fn buy_symbol(&self) -> AssetSymbol;
	/// Limit rate: units of `buy_symbol` received per unit of `sell_symbol`
	/// sold, fixed at order creation.
	fn price(&self) -> Price;
	fn for_sale_amount(&self) -> Amount;

	/// `for_sale_amount * price`.
	fn receive_amount(&self) -> Amount {
		self.price().convert(chain_primitives::Asset {
			amount: self.for_sale_amount(),
			symbol: self.sell_symbol(),
		})
		.map(|a| a.amount)
		.unwrap_or(Amount::ZERO)
	}
}

/// A standing limit order. Indexed by `(price, order_id)`;
/// `fill_or_kill` rejects creation outright if not fully consumed on
/// insertion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LimitOrder {
	pub owner: AccountName,
	pub sell_symbol: AssetSymbol,
	pub buy_symbol: AssetSymbol,
	pub price: Price,
	pub for_sale: Amount,
	pub fill_or_kill: bool,
	pub expiration: Time,
}

impl OrderView for LimitOrder {
	fn sell_symbol(&self) -> AssetSymbol {
		self.sell_symbol
	}
	fn buy_symbol(&self) -> AssetSymbol {
		self.buy_symbol
	}
	fn price(&self) -> Price {
		self.price
	}
	fn for_sale_amount(&self) -> Amount {
		self.for_sale
	}
}

/// A leveraged position funded by borrowing from the credit pool. Inserted into the order book as a standing sell of `debt_symbol`
/// for `position_symbol` until filled or closed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MarginOrder {
	pub owner: AccountName,
	pub credit_pool_id: Id<CreditPool>,
	pub debt_symbol: AssetSymbol,
	pub position_symbol: AssetSymbol,
	pub collateral_symbol: AssetSymbol,
	pub debt: Amount,
	pub position: Amount,
	pub collateral: Amount,
	/// The limit rate at which the remaining debt is offered (position per
	/// unit debt).
	pub price: Price,
	pub last_accrued: Time,
	pub closed: bool,
}

impl OrderView for MarginOrder {
	fn sell_symbol(&self) -> AssetSymbol {
		self.debt_symbol
	}
	fn buy_symbol(&self) -> AssetSymbol {
		self.position_symbol
	}
	fn price(&self) -> Price {
		self.price
	}
	fn for_sale_amount(&self) -> Amount {
		self.debt
	}
}

impl MarginOrder {
	/// `collateral * median_price / debt`, expressed in basis points of the ratio.
	pub fn collateralization_bps(&self, collateral_in_debt_terms: Amount) -> u32 {
		if self.debt.is_zero() {
			return u32::MAX;
		}
		let ratio = (collateral_in_debt_terms.0 as i128 * 10_000) / self.debt.0.max(1) as i128;
		ratio.clamp(0, u32::MAX as i128) as u32
	}
}

/// An escrowed sell that matches once per daily auction tick at a single
/// clearing price.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuctionOrder {
	pub owner: AccountName,
	pub sell_symbol: AssetSymbol,
	pub buy_symbol: AssetSymbol,
	pub for_sale: Amount,
	pub min_to_receive: Amount,
	/// Bounds the acceptable clearing price.
	pub limit_close_price: Price,
	pub expiration: Time,
}

impl OrderView for AuctionOrder {
	fn sell_symbol(&self) -> AssetSymbol {
		self.sell_symbol
	}
	fn buy_symbol(&self) -> AssetSymbol {
		self.buy_symbol
	}
	fn price(&self) -> Price {
		Price::new(
			chain_primitives::Asset::new(self.for_sale.0, self.sell_symbol),
			chain_primitives::Asset::new(self.min_to_receive.0, self.buy_symbol),
		)
	}
	fn for_sale_amount(&self) -> Amount {
		self.for_sale
	}
}

/// Collateralized stablecoin debt, margin-called against the limit book
/// when undercollateralized.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallOrder {
	pub borrower: AccountName,
	pub debt_symbol: AssetSymbol,
	pub collateral_symbol: AssetSymbol,
	pub debt: Amount,
	pub collateral: Amount,
	pub target_collateral_ratio_bps: u32,
}

impl CallOrder {
	/// `collateral/debt`, in basis points.
	pub fn collateralization_bps(&self, feed_price: Price) -> Option<u32> {
		if self.debt.is_zero() {
			return Some(u32::MAX);
		}
		let collateral_in_debt = feed_price.convert(chain_primitives::Asset {
			amount: self.collateral,
			symbol: self.collateral_symbol,
		})?;
		let ratio = (collateral_in_debt.amount.0 as i128 * 10_000) / self.debt.0.max(1) as i128;
		Some(ratio.clamp(0, u32::MAX as i128) as u32)
	}
}

/// `(strike_price, call|put, multiple, expiration_date)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct StrikeDescriptor {
	pub strike_price_micros: i64,
	pub is_call: bool,
	pub multiple: u32,
	pub expiration: Time,
}

/// A position backed by locked underlying, exercisable before expiry at the
/// strike.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OptionOrder {
	pub owner: AccountName,
	pub underlying_symbol: AssetSymbol,
	pub strike_symbol: AssetSymbol,
	pub strike: StrikeDescriptor,
	pub units: Amount,
	pub locked_underlying: Amount,
	pub exercised: bool,
}
