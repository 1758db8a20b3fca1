//! Contains the bounded caches backing index and metadata lookups.

use std::collections::{HashMap, VecDeque};

/// Number of parsed index snapshots kept in memory.
///
/// Index snapshots are keyed by the SHA-256 of the index file bytes, so a
/// rewritten index can never serve a stale snapshot.
pub const INDEX_CACHE_CAP: usize = 20;

/// Number of package metadata descriptors kept in memory, keyed by the
/// artifact's md5.
pub const SHOW_CACHE_CAP: usize = 100;

/// An insertion-ordered map with a hard entry cap.
///
/// Overflow evicts the oldest inserted entry. Re-inserting an existing key
/// replaces the value but keeps the original slot in the eviction order.
/// Lookups never fail over to an error; a miss is a plain recomputation
/// for the caller.
#[derive(Debug)]
pub struct BoundedCache<V> {
	cap: usize,
	order: VecDeque<String>,
	entries: HashMap<String, V>,
}

impl<V> BoundedCache<V> {
	pub fn new(cap: usize) -> BoundedCache<V> {
		BoundedCache {
			cap: cap.max(1),
			order: VecDeque::new(),
			entries: HashMap::new(),
		}
	}

	pub fn get(&self, key: &str) -> Option<&V> { self.entries.get(key) }

	pub fn insert(&mut self, key: impl Into<String>, value: V) {
		let key = key.into();
		if self.entries.insert(key.clone(), value).is_some() {
			return;
		}
		self.order.push_back(key);
		if self.order.len() > self.cap {
			if let Some(oldest) = self.order.pop_front() {
				self.entries.remove(&oldest);
			}
		}
	}

	pub fn len(&self) -> usize { self.entries.len() }

	pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}
