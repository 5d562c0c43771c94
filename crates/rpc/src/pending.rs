use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;

use tokio::sync::oneshot;

/// Table of outbound requests awaiting a correlated response.
///
/// Entries are created when a caller issues an outbound request and removed
/// when a response arrives, the request is cancelled, or the connection
/// closes. The table itself does not know what "cancelled" or "closed"
/// means to the protocol in use; it only carries whatever `Ok`/`Err` type
/// the protocol's responses resolve to.
pub struct PendingTable<Id, Ok, Err> {
	inner: Mutex<HashMap<Id, oneshot::Sender<Result<Ok, Err>>>>,
}

impl<Id, Ok, Err> Default for PendingTable<Id, Ok, Err>
where
	Id: Eq + Hash,
{
	fn default() -> Self {
		Self {
			inner: Mutex::new(HashMap::new()),
		}
	}
}

impl<Id, Ok, Err> PendingTable<Id, Ok, Err>
where
	Id: Eq + Hash + Clone,
{
	/// Creates an empty table.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers a new pending request, returning the receiver half the
	/// caller should await.
	pub fn insert(&self, id: Id) -> oneshot::Receiver<Result<Ok, Err>> {
		let (tx, rx) = oneshot::channel();
		self.inner
			.lock()
			.unwrap_or_else(std::sync::PoisonError::into_inner)
			.insert(id, tx);
		rx
	}

	/// Resolves and removes the pending entry for `id`, if any.
	///
	/// Returns `false` if no entry was found (a late or duplicate response;
	/// the caller should drop the message rather than treat this as an
	/// error).
	pub fn resolve(&self, id: &Id, result: Result<Ok, Err>) -> bool {
		let sender = self
			.inner
			.lock()
			.unwrap_or_else(std::sync::PoisonError::into_inner)
			.remove(id);
		match sender {
			Some(tx) => {
				// A dropped receiver means the caller stopped waiting (e.g. it
				// timed out locally); that is not our problem to report.
				let _ = tx.send(result);
				true
			}
			None => false,
		}
	}

	/// Removes and returns whether an entry existed, without resolving it.
	///
	/// Used for best-effort cancellation bookkeeping where the resolution
	/// itself happens elsewhere.
	pub fn remove(&self, id: &Id) -> bool {
		self.inner
			.lock()
			.unwrap_or_else(std::sync::PoisonError::into_inner)
			.remove(id)
			.is_some()
	}

	/// Drains all pending entries, resolving each with `err`.
	///
	/// Called when the connection closes so that every outstanding caller
	/// wakes up instead of hanging forever.
	pub fn fail_all(&self, err: impl Fn() -> Err) {
		let drained: Vec<_> = self
			.inner
			.lock()
			.unwrap_or_else(std::sync::PoisonError::into_inner)
			.drain()
			.collect();
		for (_, tx) in drained {
			let _ = tx.send(Err(err()));
		}
	}

	/// Number of requests currently awaiting a response.
	pub fn len(&self) -> usize {
		self.inner
			.lock()
			.unwrap_or_else(std::sync::PoisonError::into_inner)
			.len()
	}

	/// Whether the table is empty.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn resolve_delivers_to_receiver() {
		let table: PendingTable<u64, i32, String> = PendingTable::new();
		let rx = table.insert(1);
		assert!(table.resolve(&1, Ok(42)));
		assert_eq!(rx.await.unwrap(), Ok(42));
	}

	#[tokio::test]
	async fn resolve_unknown_id_is_noop() {
		let table: PendingTable<u64, i32, String> = PendingTable::new();
		assert!(!table.resolve(&99, Ok(0)));
	}

	#[tokio::test]
	async fn fail_all_wakes_every_waiter() {
		let table: PendingTable<u64, i32, String> = PendingTable::new();
		let rx1 = table.insert(1);
		let rx2 = table.insert(2);
		table.fail_all(|| "closed".to_string());
		assert_eq!(rx1.await.unwrap(), Err("closed".to_string()));
		assert_eq!(rx2.await.unwrap(), Err("closed".to_string()));
		assert!(table.is_empty());
	}
}
