/// A nestable, reversible scope over a `Clone`-able piece of world state.
///
/// Implemented by snapshotting the state at `begin` and restoring that
/// snapshot on `undo` or on drop without a prior `commit`: a whole-state
/// clone trades per-operation undo-log bookkeeping for a single `Clone`
/// call, which is cheap enough here and much simpler to get right. Because
/// `Session` holds the only `&mut` borrow of the state for its lifetime, the
/// borrow checker enforces "no mutation outside an open session" for free:
/// there is no other path to a `&mut S` while a session is open.
pub struct Session<'s, S: Clone> {
	state: &'s mut S,
	snapshot: S,
	committed: bool,
}

impl<'s, S: Clone> Session<'s, S> {
	pub fn begin(state: &'s mut S) -> Self {
		let snapshot = state.clone();
		Self {
			state,
			snapshot,
			committed: false,
		}
	}

	pub fn state(&self) -> &S {
		self.state
	}

	pub fn state_mut(&mut self) -> &mut S {
		self.state
	}

	/// Keeps whatever mutations happened inside this session.
	pub fn commit(mut self) {
		self.committed = true;
	}

	/// Restores the state to how it was at `begin`.
	pub fn undo(mut self) {
		*self.state = self.snapshot.clone();
		self.committed = true; // drop must not also restore this snapshot
	}

	/// Merges this session into its parent. Because the parent's own
	/// snapshot already predates everything this session did, "squashing"
	/// and plain `commit` are observationally identical here: if the parent
	/// later undoes, it restores past this session's work regardless of
	/// whether this session committed or was squashed. Exposed separately so
	/// call sites can say what they mean.
	pub fn squash_into_parent(self) {
		self.commit();
	}

	/// Opens a nested session sharing this session's live state.
	pub fn nested(&mut self) -> Session<'_, S> {
		Session::begin(self.state)
	}
}

impl<'s, S: Clone> Drop for Session<'s, S> {
	fn drop(&mut self) {
		if !self.committed {
			*self.state = self.snapshot.clone();
		}
	}
}

/// Runs `f` inside a session over `state`, committing on `Ok` and undoing on
/// `Err` — the shape every evaluator in `modules/evaluator` uses.
pub fn with_session<S: Clone, E>(state: &mut S, f: impl FnOnce(&mut S) -> Result<(), E>) -> Result<(), E> {
	let mut session = Session::begin(state);
	match f(session.state_mut()) {
		Ok(()) => {
			session.commit();
			Ok(())
		}
		Err(e) => {
			session.undo();
			Err(e)
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[derive(Clone, Debug, PartialEq)]
	struct Counter(i64);

	#[test]
	fn commit_keeps_mutation() {
		let mut c = Counter(0);
		{
			let mut s = Session::begin(&mut c);
			s.state_mut().0 = 5;
			s.commit();
		}
		assert_eq!(c.0, 5);
	}

	#[test]
	fn undo_restores_snapshot() {
		let mut c = Counter(0);
		{
			let mut s = Session::begin(&mut c);
			s.state_mut().0 = 5;
			s.undo();
		}
		assert_eq!(c.0, 0);
	}

	#[test]
	fn drop_without_commit_rolls_back() {
		let mut c = Counter(0);
		{
			let mut s = Session::begin(&mut c);
			s.state_mut().0 = 5;
			// dropped without commit/undo
		}
		assert_eq!(c.0, 0);
	}

	#[test]
	fn nested_session_rollback_is_contained_by_outer_commit() {
		let mut c = Counter(0);
		{
			let mut outer = Session::begin(&mut c);
			outer.state_mut().0 = 1;
			{
				let mut inner = outer.nested();
				inner.state_mut().0 = 2;
				inner.undo();
			}
			assert_eq!(outer.state().0, 1);
			outer.commit();
		}
		assert_eq!(c.0, 1);
	}

	#[test]
	fn outer_undo_discards_inner_commit() {
		let mut c = Counter(0);
		{
			let mut outer = Session::begin(&mut c);
			{
				let mut inner = outer.nested();
				inner.state_mut().0 = 99;
				inner.commit();
			}
			outer.undo();
		}
		assert_eq!(c.0, 0);
	}

	#[test]
	fn with_session_helper_rolls_back_on_err() {
		let mut c = Counter(0);
		let result: Result<(), &'static str> = with_session(&mut c, |s| {
			s.0 = 7;
			Err("boom")
		});
		assert!(result.is_err());
		assert_eq!(c.0, 0);
	}
}
