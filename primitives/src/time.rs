//! Microsecond-resolution instants.

use codec::{Decode, Encode, MaxEncodedLen};
use scale_info::TypeInfo;
use sp_runtime::RuntimeDebug;

#[cfg(feature = "std")]
use serde::{Deserialize, Serialize};

#[derive(Encode, Decode, MaxEncodedLen, TypeInfo, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, RuntimeDebug)]
#[cfg_attr(feature = "std", derive(Serialize, Deserialize))]
pub struct Time(pub u64);

impl Time {
	pub const MAX: Time = Time(u64::MAX);

	pub fn from_micros(micros: u64) -> Self {
		Self(micros)
	}

	pub fn from_secs(secs: u64) -> Self {
		Self(secs.saturating_mul(1_000_000))
	}

	pub fn saturating_add_secs(self, secs: u64) -> Self {
		Self(self.0.saturating_add(secs.saturating_mul(1_000_000)))
	}

	pub fn saturating_sub(self, rhs: Time) -> core::time::Duration {
		core::time::Duration::from_micros(self.0.saturating_sub(rhs.0))
	}
}

impl core::ops::Add<core::time::Duration> for Time {
	type Output = Time;
	fn add(self, rhs: core::time::Duration) -> Time {
		Time(self.0.saturating_add(rhs.as_micros() as u64))
	}
}
