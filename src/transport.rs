//! The DNS-SD transport that discovery runs on top of.
//!
//! A [`Transport`] hands out cancellable sessions: two long-lived [`Subscription`]s (type enumeration and
//! per-type instance browsing) and a one-shot [`Request`] for resolution. Dropping a session cancels it
//! and releases everything the transport allocated for it.
//!
//! Transports are always called from within the discovery runtime, so implementations may spawn tokio
//! tasks.

use crate::{
	errors::TransportError,
	service::InstanceKey,
};
use std::{collections::BTreeSet, time::Duration};
use tokio::{
	sync::{mpsc, oneshot},
	task::JoinHandle,
};

pub mod channel;

#[cfg(feature = "mdns")]
#[cfg_attr(docsrs, doc(cfg(feature = "mdns")))]
pub mod mdns;

/// Everything a transport learned about one instance.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawResolution {
	/// Host names the instance is reachable at.
	pub hosts: Vec<String>,
	pub port: u16,
	/// Raw TXT strings, typically `key=value`.
	pub txt: Vec<Vec<u8>>,
}

pub trait Transport: Send + Sync + 'static {
	/// Enumerates the service types advertised on the network (`_http._tcp`, `_ssh._tcp`, ...).
	///
	/// A type may be reported more than once.
	fn browse_types(&self) -> Result<Subscription<String>, TransportError>;

	/// Browses the instances of one fully-qualified service type.
	///
	/// Every event carries the complete current set of instances, not a delta.
	fn browse_instances(&self, service_type: &str) -> Result<Subscription<BTreeSet<InstanceKey>>, TransportError>;

	/// Resolves one instance. The transport should give up after `timeout`.
	fn resolve_instance(&self, key: &InstanceKey, timeout: Duration) -> Result<Request<RawResolution>, TransportError>;
}
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
	fn browse_types(&self) -> Result<Subscription<String>, TransportError> {
		(**self).browse_types()
	}

	fn browse_instances(&self, service_type: &str) -> Result<Subscription<BTreeSet<InstanceKey>>, TransportError> {
		(**self).browse_instances(service_type)
	}

	fn resolve_instance(&self, key: &InstanceKey, timeout: Duration) -> Result<Request<RawResolution>, TransportError> {
		(**self).resolve_instance(key, timeout)
	}
}

/// Aborts a background task when dropped.
#[derive(Debug, Default)]
pub(crate) struct Worker(pub(crate) Option<JoinHandle<()>>);
impl Worker {
	#[cfg(feature = "mdns")]
	pub(crate) fn is_finished(&self) -> bool {
		self.0.as_ref().map_or(true, JoinHandle::is_finished)
	}
}
impl Drop for Worker {
	fn drop(&mut self) {
		if let Some(worker) = self.0.take() {
			worker.abort();
		}
	}
}

/// A stream of events from a long-lived transport session.
#[derive(Debug)]
pub struct Subscription<T> {
	events: mpsc::UnboundedReceiver<T>,
	_worker: Worker,
}
impl<T> Subscription<T> {
	pub fn new(events: mpsc::UnboundedReceiver<T>) -> Self {
		Self {
			events,
			_worker: Worker(None),
		}
	}

	/// Ties the lifetime of `worker` to this subscription.
	pub fn with_worker(events: mpsc::UnboundedReceiver<T>, worker: JoinHandle<()>) -> Self {
		Self {
			events,
			_worker: Worker(Some(worker)),
		}
	}

	/// Waits for the next event. `None` means the transport ended the session.
	pub async fn next(&mut self) -> Option<T> {
		self.events.recv().await
	}
}

/// A pending one-shot transport request.
#[derive(Debug)]
pub struct Request<T> {
	reply: oneshot::Receiver<Result<T, TransportError>>,
	_worker: Worker,
}
impl<T> Request<T> {
	pub fn new(reply: oneshot::Receiver<Result<T, TransportError>>) -> Self {
		Self {
			reply,
			_worker: Worker(None),
		}
	}

	pub fn with_worker(reply: oneshot::Receiver<Result<T, TransportError>>, worker: JoinHandle<()>) -> Self {
		Self {
			reply,
			_worker: Worker(Some(worker)),
		}
	}

	/// Waits for the reply. A transport that drops its sender without answering yields [`TransportError::Closed`].
	pub async fn wait(self) -> Result<T, TransportError> {
		let Request { reply, _worker } = self;
		reply.await.unwrap_or(Err(TransportError::Closed))
	}
}
