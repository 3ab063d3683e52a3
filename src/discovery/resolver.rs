use super::{event::SessionId, Context, Message};
use crate::{
	errors::ResolveError,
	service::{InstanceKey, Resolution},
	transport::{RawResolution, Worker},
	txt,
};
use std::{collections::BTreeMap, time::Duration};

struct Attempt {
	id: SessionId,
	_worker: Worker,
}

/// Resolves instances to host, port and TXT data, with at most one attempt in flight per instance.
pub(crate) struct ServiceResolver {
	in_flight: BTreeMap<InstanceKey, Attempt>,
	timeout: Duration,
}
impl ServiceResolver {
	pub(crate) fn new(timeout: Duration) -> Self {
		Self {
			in_flight: BTreeMap::new(),
			timeout,
		}
	}

	/// Starts resolving `key` unless an attempt is already in flight.
	///
	/// If the transport refuses to start the resolution, the instance is marked failed straight away.
	/// Returns whether the tree changed.
	pub(crate) fn resolve(&mut self, cx: &mut Context, key: InstanceKey) -> bool {
		if self.in_flight.contains_key(&key) {
			trace!("Already resolving {key}");
			return false;
		}

		let request = match cx.transport.resolve_instance(&key, self.timeout) {
			Ok(request) => request,
			Err(err) => {
				warn!("Failed to start resolving {key}: {err}");
				return cx.mutate(|tree| tree.settle(&key, None));
			}
		};

		let id = cx.session_id();
		let timeout = self.timeout;
		let attempt_key = key.clone();
		let worker = cx.spawn(move |mailbox| async move {
			let result = match tokio::time::timeout(timeout, request.wait()).await {
				Ok(Ok(resolution)) => Ok(resolution),
				Ok(Err(err)) => Err(ResolveError::Transport(err)),
				Err(_) => Err(ResolveError::Timeout(timeout)),
			};

			mailbox
				.send(Message::Resolved {
					attempt: id,
					key: attempt_key,
					result,
				})
				.ok();
		});

		self.in_flight.insert(key, Attempt { id, _worker: worker });
		false
	}

	/// Records the outcome of attempt `attempt`. Outcomes of cancelled attempts are dropped.
	///
	/// Returns whether the tree changed.
	pub(crate) fn on_result(&mut self, cx: &mut Context, attempt: SessionId, key: InstanceKey, result: Result<RawResolution, ResolveError>) -> bool {
		match self.in_flight.get(&key) {
			Some(current) if current.id == attempt => {
				self.in_flight.remove(&key);
			}
			_ => {
				trace!("Dropping resolution of {key} from cancelled attempt {attempt}");
				return false;
			}
		}

		let outcome = match result {
			Ok(RawResolution { hosts, port, txt }) => {
				debug!("Resolved {key} to {hosts:?} port {port}");
				Some(Resolution {
					addresses: hosts,
					port,
					txt: txt::decode(txt),
				})
			}

			Err(err) => {
				warn!("Failed to resolve {key}: {err}");
				None
			}
		};

		cx.mutate(|tree| tree.settle(&key, outcome))
	}

	pub(crate) fn cancel(&mut self, key: &InstanceKey) {
		if self.in_flight.remove(key).is_some() {
			trace!("Cancelled resolution of {key}");
		}
	}

	/// Cancels every resolution of an instance of `service_type`.
	pub(crate) fn cancel_type(&mut self, service_type: &str) {
		self.in_flight.retain(|key, _| !key.belongs_to(service_type));
	}

	pub(crate) fn cancel_all(&mut self) {
		self.in_flight.clear();
	}
}
