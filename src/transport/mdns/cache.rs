use crate::service::InstanceKey;
use std::{
	collections::{BTreeMap, BTreeSet},
	time::Duration,
};
use tokio::time::Instant;

/// The instances a browse session has heard of, each living until its PTR record's TTL runs out.
#[derive(Debug, Default)]
pub(super) struct InstanceCache(BTreeMap<InstanceKey, Instant>);
impl InstanceCache {
	/// Records a PTR answer. A TTL of zero is a goodbye and removes the instance at once.
	///
	/// Returns whether the set of instances changed.
	pub(super) fn observe(&mut self, key: InstanceKey, ttl: u32, now: Instant) -> bool {
		if ttl == 0 {
			return self.0.remove(&key).is_some();
		}

		let expiry = now + Duration::from_secs(u64::from(ttl));
		self.0.insert(key, expiry).is_none()
	}

	/// Forgets every instance whose TTL ran out. Returns whether any did.
	pub(super) fn sweep(&mut self, now: Instant) -> bool {
		let before = self.0.len();
		self.0.retain(|key, expiry| {
			if *expiry > now {
				true
			} else {
				trace!("{key} expired");
				false
			}
		});
		self.0.len() != before
	}

	#[inline(always)]
	pub(super) fn next_expiry(&self) -> Option<Instant> {
		self.0.values().min().copied()
	}

	pub(super) fn snapshot(&self) -> BTreeSet<InstanceKey> {
		self.0.keys().cloned().collect()
	}
}
