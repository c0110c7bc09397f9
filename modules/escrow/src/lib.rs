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

//! The mediated escrow protocol: a two-party
//! conditional transfer backed by dual mediators and a bond posted by every
//! approver, with a dispute path that expands the mediator set and settles
//! at the median of all submitted release percentages.

mod state;
mod types;

pub use state::EscrowState;
pub use types::{Escrow, EscrowStatus};
