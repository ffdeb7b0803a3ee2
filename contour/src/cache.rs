//! Keyed single-flight async cache with LRU eviction (§4.5).

use std::{
	future::Future,
	hash::Hash,
	sync::{
		atomic::{AtomicU64, AtomicUsize, Ordering},
		Arc,
	},
};

use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use futures_lite::future::race;

use crate::cancel::CancelSignal;

/// An error value representing cooperative cancellation (§5).
pub trait Cancelable {
	fn canceled() -> Self;
}

type SharedResult<V, E> = Shared<BoxFuture<'static, Result<V, E>>>;

struct CacheEntry<V, E> {
	id: u64,
	last_used: u64,
	waiters: Arc<AtomicUsize>,
	cancel: CancelSignal,
	future: SharedResult<V, E>,
}

/// A keyed, single-flight, LRU-bounded async cache. At most one production
/// is in flight per key across all concurrent callers; failures are not
/// cached; capacity is enforced by evicting the least-recently-touched
/// entry.
pub struct Cache<K, V, E> {
	entries: DashMap<K, CacheEntry<V, E>>,
	max_size: usize,
	tick: AtomicU64,
}

impl<K, V, E> Cache<K, V, E>
where
	K: Hash + Eq + Clone + Send + Sync + 'static,
	V: Clone + Send + Sync + 'static,
	E: Cancelable + Clone + Send + Sync + 'static,
{
	pub fn new(max_size: usize) -> Self {
		Self { entries: DashMap::new(), max_size, tick: AtomicU64::new(0) }
	}

	pub fn len(&self) -> usize { self.entries.len() }

	fn next_tick(&self) -> u64 { self.tick.fetch_add(1, Ordering::Relaxed) }

	/// Get the value for `key`, producing it via `producer` if absent.
	/// `producer` runs at most once per outstanding production. If
	/// `caller_cancel` fires before the value is ready, this caller's wait
	/// is abandoned; if it was the last waiter, the production itself is
	/// canceled and the entry evicted.
	pub async fn get<F, Fut>(&self, key: K, producer: F, caller_cancel: CancelSignal) -> Result<V, E>
	where
		F: FnOnce(K, CancelSignal) -> Fut,
		Fut: Future<Output = Result<V, E>> + Send + 'static,
	{
		let (id, shared, waiters) = self.join_or_start(key.clone(), producer);

		enum Outcome<V, E> {
			Resolved(Result<V, E>),
			Canceled,
		}

		let resolved = shared.clone().map(Outcome::Resolved);
		let canceled = caller_cancel.cancelled().map(|()| Outcome::<V, E>::Canceled);

		match race(resolved, canceled).await {
			Outcome::Resolved(result) => {
				if result.is_err() {
					self.remove_if_same(&key, id);
				}
				result
			},
			Outcome::Canceled => {
				if waiters.fetch_sub(1, Ordering::AcqRel) == 1 {
					// Last waiter: fire the entry's cancel signal and evict it.
					if let Some(entry) = self.entries.get(&key) {
						if entry.id == id {
							entry.cancel.cancel();
						}
					}
					self.remove_if_same(&key, id);
				}
				Err(E::canceled())
			},
		}
	}

	fn join_or_start<F, Fut>(&self, key: K, producer: F) -> (u64, SharedResult<V, E>, Arc<AtomicUsize>)
	where
		F: FnOnce(K, CancelSignal) -> Fut,
		Fut: Future<Output = Result<V, E>> + Send + 'static,
	{
		// Entry API holds the shard lock across the vacant check and insert.
		use dashmap::mapref::entry::Entry as DEntry;

		let (id, shared, waiters, inserted) = match self.entries.entry(key.clone()) {
			DEntry::Occupied(mut occ) => {
				let entry = occ.get_mut();
				entry.last_used = self.next_tick();
				entry.waiters.fetch_add(1, Ordering::AcqRel);
				(entry.id, entry.future.clone(), entry.waiters.clone(), false)
			},
			DEntry::Vacant(vac) => {
				let id = self.next_tick();
				let cancel = CancelSignal::new();
				let waiters = Arc::new(AtomicUsize::new(1));
				let boxed: BoxFuture<'static, Result<V, E>> = producer(key.clone(), cancel.clone()).boxed();
				let shared = boxed.shared();

				vac.insert(CacheEntry { id, last_used: id, waiters: waiters.clone(), cancel, future: shared.clone() });
				(id, shared, waiters, true)
			},
		};

		if inserted {
			self.evict_if_over_capacity(&key);
		}

		(id, shared, waiters)
	}

	fn remove_if_same(&self, key: &K, id: u64) {
		self.entries.remove_if(key, |_, entry| entry.id == id);
	}

	fn evict_if_over_capacity(&self, just_inserted: &K) {
		if self.entries.len() <= self.max_size {
			return;
		}

		let lru = self
			.entries
			.iter()
			.filter(|e| e.key() != just_inserted)
			.min_by_key(|e| e.value().last_used)
			.map(|e| e.key().clone());

		if let Some(key) = lru {
			log::debug!("cache over capacity ({}/{}), evicting least-recently-used entry", self.entries.len(), self.max_size);
			self.entries.remove(&key);
		}
	}
}
