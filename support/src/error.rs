//! The unified error type emitted by every evaluator.
//!
//! Every public mutating call in this workspace returns `Result<T,
//! ChainError>`; propagation is always "abort the operation and the
//! enclosing transaction" — there is no partial application, so callers
//! never need to distinguish "which half of this call succeeded".

/// Error kinds emitted by the core. Each variant's message bundles
/// the offending parameters.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
	#[error("insufficient balance: {0}")]
	InsufficientBalance(String),

	#[error("unauthorized: {0}")]
	Unauthorized(String),

	#[error("inactive account: {0}")]
	InactiveAccount(String),

	#[error("asset restricted: {0}")]
	AssetRestricted(String),

	#[error("invariant violation: {0}")]
	InvariantViolation(String),

	#[error("not found: {0}")]
	NotFound(String),

	#[error("already exists: {0}")]
	AlreadyExists(String),

	#[error("expired: {0}")]
	Expired(String),

	#[error("price feed missing: {0}")]
	PriceFeedMissing(String),

	#[error("insufficient collateral: {0}")]
	InsufficientCollateral(String),

	#[error("pool exhausted: {0}")]
	PoolExhausted(String),
}

pub type ChainResult<T> = Result<T, ChainError>;
