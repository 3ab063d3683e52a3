use super::{event::SessionId, Context, Message};
use crate::{service::ServiceTypeRecord, transport::Worker};
use std::collections::BTreeSet;

struct TypeSession {
	id: SessionId,
	_forwarder: Worker,
}

/// Enumerates the service types advertised on the network and reports each new base type once.
pub(crate) struct ServiceTypeDiscovery {
	session: Option<TypeSession>,
	seen: BTreeSet<String>,
	domain: String,
}
impl ServiceTypeDiscovery {
	pub(crate) fn new(domain: String) -> Self {
		Self {
			session: None,
			seen: BTreeSet::new(),
			domain,
		}
	}

	/// Opens the type enumeration session, replacing any previous one.
	///
	/// If the transport refuses, the error is logged and discovery stays idle until the next `start`.
	pub(crate) fn start(&mut self, cx: &mut Context) {
		if self.session.take().is_some() {
			debug!("Restarting service type discovery");
		}

		let subscription = match cx.transport.browse_types() {
			Ok(subscription) => subscription,
			Err(err) => {
				error!("Failed to start service type discovery: {err}");
				return;
			}
		};

		let id = cx.session_id();
		let forwarder = cx.forward(subscription, move |event| match event {
			Some(service_type) => Message::TypeFound { session: id, service_type },
			None => Message::TypesEnded { session: id },
		});

		self.session = Some(TypeSession { id, _forwarder: forwarder });
		info!("Service type discovery started");
	}

	/// Cancels type enumeration and forgets every type seen so far. Safe to call at any time.
	///
	/// Returns whether the tree changed.
	pub(crate) fn stop(&mut self, cx: &mut Context) -> bool {
		if self.session.take().is_some() {
			info!("Service type discovery stopped");
		}
		self.seen.clear();
		cx.mutate(|tree| tree.clear_types())
	}

	/// Handles a type reported by the session `session`.
	///
	/// Returns the normalised base type the first time a full type string is seen. `_http._tcp` and
	/// `_http._udp` are distinct strings and both report `_http`.
	pub(crate) fn on_type(&mut self, session: SessionId, service_type: String) -> Option<ServiceTypeRecord> {
		if !matches!(&self.session, Some(current) if current.id == session) {
			trace!("Dropping service type {service_type:?} from cancelled session {session}");
			return None;
		}

		let full_type = service_type.trim_end_matches('.').to_ascii_lowercase();
		if !self.seen.insert(full_type) {
			return None;
		}

		let Some(record) = ServiceTypeRecord::parse(&service_type, &self.domain) else {
			debug!("Ignoring service type {service_type:?}");
			return None;
		};

		debug!("Discovered service type {service_type}");
		Some(record)
	}

	pub(crate) fn on_ended(&mut self, session: SessionId) {
		if matches!(&self.session, Some(current) if current.id == session) {
			warn!("Service type discovery was ended by the transport");
			self.session = None;
		}
	}
}
