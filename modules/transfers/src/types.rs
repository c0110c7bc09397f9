use chain_primitives::{AccountName, Amount, AssetSymbol, Time};

/// A receiver-proposed transfer awaiting the sender's acceptance. Expires after `TRANSFER_REQUEST_DURATION` if unaccepted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferRequest {
	pub from: AccountName,
	pub to: AccountName,
	pub symbol: AssetSymbol,
	pub amount: Amount,
	pub memo: String,
	pub request_id: u64,
	pub expiration: Time,
}

/// A cancellable, ticking recurring transfer authored by `from`. `extensible` slides `end_time`/`payments_remaining` forward
/// by one interval on an underfunded tick instead of skipping it outright;
/// `fill_or_kill` cancels the whole schedule on the first underfunded tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecurringTransfer {
	pub from: AccountName,
	pub to: AccountName,
	pub symbol: AssetSymbol,
	pub amount: Amount,
	pub memo: String,
	pub begin: Time,
	pub interval_secs: u64,
	pub payments_remaining: u32,
	pub extensible: bool,
	pub fill_or_kill: bool,
	pub next_time: Time,
}
