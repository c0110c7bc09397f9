use crate::id::Id;
use chain_support::ChainError;
use std::collections::BTreeMap;

/// A typed table of records keyed by a monotonically assigned `Id<T>`. Each
/// domain module owns one `Table<T>` per record type inside its own `State`
/// struct, plus any number of its own secondary-index maps
/// (`BTreeMap<IndexKey, Id<T>>` or `BTreeMap<IndexKey, BTreeSet<Id<T>>>`)
/// maintained alongside calls to `create`/`modify`/`remove`.
///
/// `Table` itself only owns the primary index; it does not know about a
/// module's secondary indices, so every mutation method hands back enough
/// information (the id, and on `remove`/`replace` the prior value) for the
/// caller to keep its secondary indices in sync in the same step: all
/// mutation passes through a single choke point that can relocate a record
/// in every index it participates in.
#[derive(Clone, Debug, Default)]
pub struct Table<T> {
	next_id: u64,
	rows: BTreeMap<u64, T>,
}

impl<T: Clone> Table<T> {
	pub fn new() -> Self {
		Self {
			next_id: 0,
			rows: BTreeMap::new(),
		}
	}

	pub fn get(&self, id: Id<T>) -> Result<&T, ChainError> {
		self.rows
			.get(&id.value())
			.ok_or_else(|| ChainError::NotFound(format!("record {id} not found")))
	}

	pub fn find(&self, id: Id<T>) -> Option<&T> {
		self.rows.get(&id.value())
	}

	/// Allocates a new id and inserts the record built from it.
	pub fn create(&mut self, ctor: impl FnOnce(Id<T>) -> T) -> (Id<T>, T) {
		let id = Id::new(self.next_id);
		self.next_id += 1;
		let record = ctor(id);
		self.rows.insert(id.value(), record.clone());
		(id, record)
	}

	/// Replaces the record at `id`, returning the prior value so the caller
	/// can relocate any secondary indices keyed on fields that changed.
	pub fn modify(&mut self, id: Id<T>, mutate: impl FnOnce(&mut T)) -> Result<(T, T), ChainError> {
		let before = self.get(id)?.clone();
		let mut after = before.clone();
		mutate(&mut after);
		self.rows.insert(id.value(), after.clone());
		Ok((before, after))
	}

	pub fn remove(&mut self, id: Id<T>) -> Result<T, ChainError> {
		self.rows
			.remove(&id.value())
			.ok_or_else(|| ChainError::NotFound(format!("record {id} not found")))
	}

	pub fn len(&self) -> usize {
		self.rows.len()
	}

	pub fn is_empty(&self) -> bool {
		self.rows.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = (Id<T>, &T)> {
		self.rows.iter().map(|(k, v)| (Id::new(*k), v))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[derive(Clone, Debug, PartialEq)]
	struct Row {
		value: u64,
	}

	#[test]
	fn create_get_modify_remove_round_trip() {
		let mut t: Table<Row> = Table::new();
		let (id, row) = t.create(|_| Row { value: 1 });
		assert_eq!(row.value, 1);
		assert_eq!(t.get(id).unwrap().value, 1);

		let (before, after) = t.modify(id, |r| r.value += 41).unwrap();
		assert_eq!(before.value, 1);
		assert_eq!(after.value, 42);
		assert_eq!(t.get(id).unwrap().value, 42);

		let removed = t.remove(id).unwrap();
		assert_eq!(removed.value, 42);
		assert!(t.find(id).is_none());
	}

	#[test]
	fn get_on_missing_id_is_not_found() {
		let t: Table<Row> = Table::new();
		let id: Id<Row> = Id::new(7);
		assert!(matches!(t.get(id), Err(ChainError::NotFound(_))));
	}

	#[test]
	fn ids_are_monotonic_and_not_reused() {
		let mut t: Table<Row> = Table::new();
		let (id_a, _) = t.create(|_| Row { value: 1 });
		t.remove(id_a).unwrap();
		let (id_b, _) = t.create(|_| Row { value: 2 });
		assert!(id_b.value() > id_a.value());
	}
}
