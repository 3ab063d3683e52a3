use super::{event::SessionId, resolver::ServiceResolver, Context, Message};
use crate::{service::InstanceKey, transport::Worker};
use std::collections::{BTreeMap, BTreeSet};

struct BrowseSession {
	id: SessionId,
	service_type: String,
	_forwarder: Worker,
}

fn session_key(service_type: &str) -> String {
	service_type.trim_end_matches('.').to_ascii_lowercase()
}

/// Keeps one browse session per fully-qualified service type and mirrors each session's latest snapshot
/// into the tree.
#[derive(Default)]
pub(crate) struct ServiceInstanceBrowser {
	sessions: BTreeMap<String, BrowseSession>,
}
impl ServiceInstanceBrowser {
	pub(crate) fn new() -> Self {
		Self::default()
	}

	/// Opens a browse session for `service_type`, cancelling any session already open for it.
	///
	/// Returns whether the tree changed (a previous session's instances were discarded).
	pub(crate) fn start_browsing(&mut self, cx: &mut Context, resolver: &mut ServiceResolver, service_type: &str) -> bool {
		let changed = self.stop_browsing(cx, resolver, service_type);
		let service_type = service_type.trim_end_matches('.').to_owned();

		let subscription = match cx.transport.browse_instances(&service_type) {
			Ok(subscription) => subscription,
			Err(err) => {
				error!("Failed to browse {service_type}: {err}");
				return changed;
			}
		};

		let id = cx.session_id();
		let forwarded_type = service_type.clone();
		let forwarder = cx.forward(subscription, move |event| match event {
			Some(instances) => Message::Snapshot {
				session: id,
				service_type: forwarded_type.clone(),
				instances,
			},
			None => Message::BrowseEnded {
				session: id,
				service_type: forwarded_type.clone(),
			},
		});

		debug!("Browsing {service_type}");
		self.sessions.insert(
			session_key(&service_type),
			BrowseSession {
				id,
				service_type,
				_forwarder: forwarder,
			},
		);

		changed
	}

	/// Cancels the session for `service_type`, drops its node and any resolutions scoped to it.
	///
	/// Returns whether the tree changed.
	pub(crate) fn stop_browsing(&mut self, cx: &mut Context, resolver: &mut ServiceResolver, service_type: &str) -> bool {
		if let Some(session) = self.sessions.remove(&session_key(service_type)) {
			debug!("Stopped browsing {}", session.service_type);
		}

		resolver.cancel_type(service_type);
		cx.mutate(|tree| tree.remove_node(service_type)).is_some()
	}

	/// Cancels every browse session and drops every node.
	pub(crate) fn stop_all(&mut self, cx: &mut Context, resolver: &mut ServiceResolver) -> bool {
		let mut service_types = self.sessions.values().map(|session| session.service_type.clone()).collect::<Vec<_>>();
		service_types.extend(cx.read(|tree| tree.nodes().iter().map(|node| node.service_type().to_owned()).collect::<Vec<_>>()));

		let mut changed = false;
		for service_type in service_types {
			changed |= self.stop_browsing(cx, resolver, &service_type);
		}

		resolver.cancel_all();
		changed
	}

	/// Replaces the node of `service_type` with the snapshot from session `session`.
	///
	/// Newly seen instances are handed to the resolver; vanished ones have their resolution cancelled.
	/// Returns `true` for every snapshot of a live session, even one identical to the current children,
	/// and `false` for snapshots of cancelled sessions.
	pub(crate) fn on_snapshot(
		&mut self,
		cx: &mut Context,
		resolver: &mut ServiceResolver,
		session: SessionId,
		service_type: &str,
		instances: BTreeSet<InstanceKey>,
	) -> bool {
		if !matches!(self.sessions.get(&session_key(service_type)), Some(current) if current.id == session) {
			trace!("Dropping snapshot of {service_type} from cancelled session {session}");
			return false;
		}

		let (instances, foreign): (BTreeSet<_>, BTreeSet<_>) = instances.into_iter().partition(|key| key.belongs_to(service_type));
		for key in foreign {
			warn!("Ignoring {key} reported while browsing {service_type}");
		}

		let diff = cx.mutate(|tree| tree.replace_instances(service_type, instances));
		if diff.created {
			debug!("First snapshot of {service_type}");
		}
		trace!("{service_type}: {} added, {} removed", diff.added.len(), diff.removed.len());

		for key in &diff.removed {
			resolver.cancel(key);
		}

		for key in diff.added {
			resolver.resolve(cx, key);
		}

		true
	}

	pub(crate) fn on_ended(&mut self, session: SessionId, service_type: &str) {
		let key = session_key(service_type);
		if matches!(self.sessions.get(&key), Some(current) if current.id == session) {
			warn!("Browsing {service_type} was ended by the transport");
			self.sessions.remove(&key);
		}
	}
}
