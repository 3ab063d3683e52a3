//! A transport driven by hand.
//!
//! [`ChannelTransport`] never touches the network. Whatever owns a clone of it decides which types are
//! announced, which instances each browse session sees and how resolutions end. Useful for tests, for
//! replaying captured sessions and for feeding discoveries from some other source into the tree.

use super::{RawResolution, Request, Subscription, Transport};
use crate::{errors::TransportError, service::InstanceKey};
use std::{
	collections::{BTreeMap, BTreeSet},
	sync::{Arc, Mutex, MutexGuard, PoisonError},
	time::Duration,
};
use tokio::sync::{mpsc, oneshot};

type ResolveReply = oneshot::Sender<Result<RawResolution, TransportError>>;

#[derive(Default)]
struct ChannelState {
	types: Vec<mpsc::UnboundedSender<String>>,
	browsers: BTreeMap<String, Vec<mpsc::UnboundedSender<BTreeSet<InstanceKey>>>>,
	resolutions: BTreeMap<InstanceKey, Vec<ResolveReply>>,
	resolve_requests: BTreeMap<InstanceKey, usize>,
	refuse_sessions: bool,
}
impl ChannelState {
	fn sweep(&mut self) {
		self.types.retain(|tx| !tx.is_closed());

		self.browsers.retain(|_, sessions| {
			sessions.retain(|tx| !tx.is_closed());
			!sessions.is_empty()
		});

		self.resolutions.retain(|_, replies| {
			replies.retain(|tx| !tx.is_closed());
			!replies.is_empty()
		});
	}
}

fn canonical(service_type: &str) -> String {
	service_type.trim_end_matches('.').to_ascii_lowercase()
}

#[derive(Clone, Default)]
/// A [`Transport`] whose sessions are fed through method calls. Clones share state.
pub struct ChannelTransport {
	state: Arc<Mutex<ChannelState>>,
}
impl ChannelTransport {
	pub fn new() -> Self {
		Self::default()
	}

	fn state(&self) -> MutexGuard<'_, ChannelState> {
		let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
		state.sweep();
		state
	}

	/// Reports a service type to every live type enumeration session. Returns how many sessions got it.
	pub fn announce_type(&self, service_type: &str) -> usize {
		let state = self.state();
		state.types.iter().filter(|tx| tx.send(service_type.to_owned()).is_ok()).count()
	}

	/// Publishes the full instance set of `service_type` to every live browse session of that type.
	/// Returns how many sessions got it.
	pub fn publish<I>(&self, service_type: &str, instances: I) -> usize
	where
		I: IntoIterator<Item = InstanceKey>,
	{
		let snapshot = instances.into_iter().collect::<BTreeSet<_>>();
		let state = self.state();
		match state.browsers.get(&canonical(service_type)) {
			Some(sessions) => sessions.iter().filter(|tx| tx.send(snapshot.clone()).is_ok()).count(),
			None => 0,
		}
	}

	/// Answers the oldest outstanding resolution of `key`. Returns `false` if none was waiting.
	pub fn answer(&self, key: &InstanceKey, result: Result<RawResolution, TransportError>) -> bool {
		let mut state = self.state();
		let Some(replies) = state.resolutions.get_mut(key) else {
			return false;
		};

		let reply = replies.remove(0);
		if replies.is_empty() {
			state.resolutions.remove(key);
		}

		reply.send(result).is_ok()
	}

	/// While set, every new session fails to open with [`TransportError::Unsupported`].
	pub fn refuse_sessions(&self, refuse: bool) {
		self.state().refuse_sessions = refuse;
	}

	/// How many times resolution of `key` has been requested so far.
	///
	/// The count covers the transport's whole life and keeps one entry per key ever resolved. Long-lived
	/// transports should call [`clear_resolve_requests`](Self::clear_resolve_requests) now and then.
	pub fn resolve_requests(&self, key: &InstanceKey) -> usize {
		self.state().resolve_requests.get(key).copied().unwrap_or(0)
	}

	/// Forgets the request counts of every key with no resolution waiting for an answer. Returns how many
	/// keys were forgotten.
	pub fn clear_resolve_requests(&self) -> usize {
		let mut state = self.state();
		let ChannelState {
			resolutions,
			resolve_requests,
			..
		} = &mut *state;

		let before = resolve_requests.len();
		resolve_requests.retain(|key, _| resolutions.contains_key(key));
		before - resolve_requests.len()
	}

	/// Whether any type enumeration session is still open.
	pub fn is_browsing_types(&self) -> bool {
		!self.state().types.is_empty()
	}

	/// How many browse sessions of `service_type` are still open.
	pub fn browse_sessions(&self, service_type: &str) -> usize {
		self.state().browsers.get(&canonical(service_type)).map(Vec::len).unwrap_or(0)
	}

	/// How many resolutions are still waiting for an answer.
	pub fn pending_resolutions(&self) -> usize {
		self.state().resolutions.values().map(Vec::len).sum()
	}

	fn check_refused(state: &ChannelState) -> Result<(), TransportError> {
		if state.refuse_sessions {
			Err(TransportError::Unsupported("sessions are refused".into()))
		} else {
			Ok(())
		}
	}
}
impl Transport for ChannelTransport {
	fn browse_types(&self) -> Result<Subscription<String>, TransportError> {
		let mut state = self.state();
		Self::check_refused(&state)?;

		let (tx, rx) = mpsc::unbounded_channel();
		state.types.push(tx);
		Ok(Subscription::new(rx))
	}

	fn browse_instances(&self, service_type: &str) -> Result<Subscription<BTreeSet<InstanceKey>>, TransportError> {
		let mut state = self.state();
		Self::check_refused(&state)?;

		let (tx, rx) = mpsc::unbounded_channel();
		state.browsers.entry(canonical(service_type)).or_default().push(tx);
		Ok(Subscription::new(rx))
	}

	fn resolve_instance(&self, key: &InstanceKey, _timeout: Duration) -> Result<Request<RawResolution>, TransportError> {
		let mut state = self.state();
		Self::check_refused(&state)?;

		*state.resolve_requests.entry(key.clone()).or_default() += 1;

		let (tx, rx) = oneshot::channel();
		state.resolutions.entry(key.clone()).or_default().push(tx);
		Ok(Request::new(rx))
	}
}
