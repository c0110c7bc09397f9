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

//! The typed object store: multi-indexed in-memory
//! tables (`Table<T>`) plus atomic, nestable undo sessions (`Session`).
//!
//! This crate has no notion of "accounts" or "assets" — it is the generic
//! storage substrate every economic module in `modules/*` builds its own
//! state on top of, without itself knowing what a balance or an order is.

mod id;
mod session;
mod table;

pub use id::Id;
pub use session::{with_session, Session};
pub use table::Table;
