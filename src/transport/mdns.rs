//! A multicast DNS transport that speaks DNS-SD directly on the local link.
//!
//! All sessions share one socket and one receive loop, started by the first session that opens. Every
//! response received is handed to every live session, which picks out the records it cares about.

use super::{RawResolution, Request, Subscription, Transport, Worker};
use crate::{
	errors::TransportError,
	service::InstanceKey,
	socket::{AsyncMdnsSocket, MdnsSocket},
	util::service_fqdn,
};
use std::{
	collections::BTreeSet,
	future::Future,
	pin::Pin,
	sync::{Arc, Mutex, PoisonError},
	time::Duration,
};
use tokio::{
	sync::{
		broadcast::{self, error::RecvError},
		mpsc, oneshot,
	},
	time::{Instant, MissedTickBehavior},
};
use trust_dns_client::{
	op::{Message as DnsMessage, MessageType as DnsMessageType},
	proto::error::ProtoError,
	rr::{Name as DnsName, RecordType as DnsRecordType},
	serialize::binary::BinDecodable,
};

mod builder;
pub use builder::MdnsTransportBuilder;

mod cache;
use cache::InstanceCache;

mod packet;
use packet::ResolutionRecords;

/// Responses buffered per session before it starts missing some.
const RESPONSE_BACKLOG: usize = 64;

/// How often an unanswered resolution query is repeated.
const RESOLVE_RETRY: Duration = Duration::from_secs(1);

type QueryFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

pub(crate) struct MdnsConfig {
	pub(crate) interval: Duration,
	pub(crate) resolve_grace: Duration,
	pub(crate) domain: String,
}

/// The running half of the transport: the registered socket and the stream of responses read from it.
#[derive(Clone)]
struct Link {
	socket: Arc<AsyncMdnsSocket>,
	responses: broadcast::Sender<Arc<DnsMessage>>,
	receiver: Arc<Worker>,
}
impl Link {
	fn start(socket: MdnsSocket) -> Result<Self, std::io::Error> {
		let socket = Arc::new(socket.into_async()?);
		let (responses, _) = broadcast::channel(RESPONSE_BACKLOG);
		let receiver = tokio::spawn(receive_loop(socket.clone(), responses.clone()));

		Ok(Self {
			socket,
			responses,
			receiver: Arc::new(Worker(Some(receiver))),
		})
	}

	#[inline(always)]
	fn is_closed(&self) -> bool {
		self.receiver.is_finished()
	}

	async fn query(&self, packet: &[u8]) {
		if let Err(err) = self.socket.send_multicast(packet).await {
			warn!("Failed to send mDNS query: {err}");
		}
	}

	/// Each call multicasts `packet` once. The callback holds a clone of the link, keeping the receive loop alive.
	fn querier(&self, packet: Vec<u8>) -> impl FnMut() -> QueryFuture + Send + 'static {
		let link = self.clone();
		let packet: Arc<[u8]> = packet.into();
		move || {
			let link = link.clone();
			let packet = packet.clone();
			Box::pin(async move { link.query(&packet).await }) as QueryFuture
		}
	}
}

enum SocketState {
	Bound(MdnsSocket),
	Running(Link),
	Closed,
}

/// Browses and resolves over multicast DNS. Create one with [`MdnsTransportBuilder`].
///
/// The socket is registered with the runtime of the first [`Discovery`](crate::discovery::Discovery) that
/// uses the transport, so a transport serves one discovery run only.
pub struct MdnsTransport {
	config: MdnsConfig,
	state: Mutex<SocketState>,
}
impl MdnsTransport {
	pub(crate) fn new(socket: MdnsSocket, config: MdnsConfig) -> Self {
		Self {
			config,
			state: Mutex::new(SocketState::Bound(socket)),
		}
	}

	fn link(&self) -> Result<Link, TransportError> {
		let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

		if let SocketState::Running(link) = &*state {
			if !link.is_closed() {
				return Ok(link.clone());
			}
		}

		match std::mem::replace(&mut *state, SocketState::Closed) {
			SocketState::Bound(socket) => {
				let link = Link::start(socket)?;
				*state = SocketState::Running(link.clone());
				Ok(link)
			}

			SocketState::Running(_) => {
				warn!("The mDNS receive loop has stopped");
				Err(TransportError::Closed)
			}

			SocketState::Closed => Err(TransportError::Closed),
		}
	}
}
impl Transport for MdnsTransport {
	fn browse_types(&self) -> Result<Subscription<String>, TransportError> {
		let services = packet::services_name(&self.config.domain).map_err(bad_name)?;
		let query = packet::query_packet(&services, &[DnsRecordType::PTR])?;
		let link = self.link()?;

		let (tx, rx) = mpsc::unbounded_channel();
		let worker = tokio::spawn(browse_types(
			link.responses.subscribe(),
			link.querier(query),
			services,
			self.config.interval,
			tx,
		));
		Ok(Subscription::with_worker(rx, worker))
	}

	fn browse_instances(&self, service_type: &str) -> Result<Subscription<BTreeSet<InstanceKey>>, TransportError> {
		let service = service_fqdn(service_type, &self.config.domain).map_err(bad_name)?;
		let query = packet::query_packet(&service, &[DnsRecordType::PTR])?;
		let link = self.link()?;

		let session = InstanceSession {
			service,
			service_type: service_type.to_owned(),
			domain: self.config.domain.clone(),
		};

		let (tx, rx) = mpsc::unbounded_channel();
		let worker = tokio::spawn(browse_instances(
			link.responses.subscribe(),
			link.querier(query),
			session,
			self.config.interval,
			tx,
		));
		Ok(Subscription::with_worker(rx, worker))
	}

	fn resolve_instance(&self, key: &InstanceKey, timeout: Duration) -> Result<Request<RawResolution>, TransportError> {
		let name = packet::instance_name(key).map_err(bad_name)?;
		let query = packet::query_packet(&name, &[DnsRecordType::SRV, DnsRecordType::TXT])?;
		let link = self.link()?;

		let (tx, rx) = oneshot::channel();
		let worker = tokio::spawn(resolve(
			link.responses.subscribe(),
			link.querier(query),
			name,
			timeout,
			self.config.resolve_grace,
			tx,
		));
		Ok(Request::with_worker(rx, worker))
	}
}

fn bad_name(err: ProtoError) -> TransportError {
	TransportError::Unsupported(format!("Bad DNS name: {err}"))
}

async fn receive_loop(socket: Arc<AsyncMdnsSocket>, responses: broadcast::Sender<Arc<DnsMessage>>) {
	let mut recv = socket.recv(vec![0; 4096]);

	loop {
		let ((count, addr), packet) = match recv.recv_multicast().await {
			Ok(recv) => recv,
			Err(err) => {
				error!("mDNS receive loop failed: {err}");
				return;
			}
		};

		if count == 0 {
			continue;
		}

		match DnsMessage::from_bytes(&packet[..count]) {
			Ok(message) if message.message_type() == DnsMessageType::Response => {
				// No receivers just means no session is open right now
				responses.send(Arc::new(message)).ok();
			}
			Ok(_) => {}
			Err(err) => trace!("Ignoring malformed packet from {addr}: {err}"),
		}
	}
}

fn ticker(interval: Duration) -> tokio::time::Interval {
	let mut ticker = tokio::time::interval(interval);
	ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
	ticker
}

async fn until(deadline: Option<Instant>) {
	match deadline {
		Some(deadline) => tokio::time::sleep_until(deadline).await,
		None => std::future::pending().await,
	}
}

async fn browse_types<Q, F>(
	mut responses: broadcast::Receiver<Arc<DnsMessage>>,
	mut query: Q,
	services: DnsName,
	interval: Duration,
	tx: mpsc::UnboundedSender<String>,
) where
	Q: FnMut() -> F,
	F: Future<Output = ()>,
{
	let mut ticker = ticker(interval);

	loop {
		tokio::select! {
			biased; // Prefer handling packets
			response = responses.recv() => {
				let message = match response {
					Ok(message) => message,
					Err(RecvError::Lagged(missed)) => {
						debug!("Type enumeration missed {missed} responses");
						continue;
					}
					Err(RecvError::Closed) => return,
				};

				for (target, _) in packet::pointers(&message, &services) {
					if tx.send(target.to_utf8()).is_err() {
						return;
					}
				}
			}

			_ = ticker.tick() => query().await,
		}
	}
}

struct InstanceSession {
	service: DnsName,
	service_type: String,
	domain: String,
}

async fn browse_instances<Q, F>(
	mut responses: broadcast::Receiver<Arc<DnsMessage>>,
	mut query: Q,
	session: InstanceSession,
	interval: Duration,
	tx: mpsc::UnboundedSender<BTreeSet<InstanceKey>>,
) where
	Q: FnMut() -> F,
	F: Future<Output = ()>,
{
	let InstanceSession {
		service,
		service_type,
		domain,
	} = session;

	let mut ticker = ticker(interval);
	let mut cache = InstanceCache::default();

	loop {
		let expiry = cache.next_expiry();

		let changed = tokio::select! {
			biased; // Prefer handling packets
			response = responses.recv() => {
				let message = match response {
					Ok(message) => message,
					Err(RecvError::Lagged(missed)) => {
						debug!("Browsing {service_type} missed {missed} responses");
						continue;
					}
					Err(RecvError::Closed) => return,
				};

				let now = Instant::now();
				let mut changed = false;
				for (target, ttl) in packet::pointers(&message, &service) {
					if let Some(key) = packet::instance_key(target, &service, &service_type, &domain) {
						changed |= cache.observe(key, ttl, now);
					}
				}
				cache.sweep(now) | changed
			}

			_ = until(expiry) => cache.sweep(Instant::now()),

			_ = ticker.tick() => {
				query().await;
				false
			}
		};

		if changed && tx.send(cache.snapshot()).is_err() {
			return;
		}
	}
}

async fn resolve<Q, F>(
	mut responses: broadcast::Receiver<Arc<DnsMessage>>,
	mut query: Q,
	name: DnsName,
	timeout: Duration,
	grace: Duration,
	reply: oneshot::Sender<Result<RawResolution, TransportError>>,
) where
	Q: FnMut() -> F,
	F: Future<Output = ()>,
{
	let mut records = ResolutionRecords::default();
	let mut retry = ticker(RESOLVE_RETRY);
	let mut settle_by = Instant::now() + timeout;

	loop {
		tokio::select! {
			biased; // Prefer handling packets
			response = responses.recv() => {
				let message = match response {
					Ok(message) => message,
					Err(RecvError::Lagged(missed)) => {
						debug!("Resolving {name} missed {missed} responses");
						continue;
					}
					Err(RecvError::Closed) => break,
				};

				if records.absorb(&message, &name) {
					if records.is_complete() {
						break;
					}
					if records.has_srv() {
						// Give the TXT record a moment to catch up
						settle_by = settle_by.min(Instant::now() + grace);
					}
				}
			}

			_ = tokio::time::sleep_until(settle_by) => break,

			_ = retry.tick(), if !records.has_srv() => query().await,
		}
	}

	let result = records
		.finish()
		.ok_or_else(|| TransportError::IoError(std::io::Error::new(std::io::ErrorKind::TimedOut, format!("No SRV record for {name}"))));

	reply.send(result).ok();
}
