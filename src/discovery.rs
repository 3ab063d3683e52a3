//! Service discovery: type enumeration, instance browsing and resolution, aggregated into a [`DiscoveryTree`].
//!
//! All state lives on one processing thread. Transport events are tagged with the session they came from
//! and posted to that thread's mailbox, so events from a session that has since been cancelled are
//! recognised and dropped.

use crate::{
	service::Protocol,
	transport::{Subscription, Transport, Worker},
	tree::DiscoveryTree,
};
use std::{
	future::Future,
	sync::{Arc, PoisonError, RwLock},
};
use tokio::sync::{mpsc, oneshot};

mod builder;
pub use builder::DiscoveryBuilder;

mod event;
pub use event::UpdateHandler;
pub(crate) use event::*;

mod handle;
pub use handle::DiscoveryHandle;
use handle::*;

mod instances;
mod resolver;
mod types;

use instances::ServiceInstanceBrowser;
use resolver::ServiceResolver;
use types::ServiceTypeDiscovery;

pub(crate) struct DiscoveryConfig {
	pub(crate) resolve_timeout: std::time::Duration,
	pub(crate) protocols: Vec<Protocol>,
	pub(crate) domain: String,
	pub(crate) autostart: bool,
}

/// Shared by the components on the processing thread: the transport, the mailbox and the tree.
pub(crate) struct Context {
	transport: Arc<dyn Transport>,
	mailbox: mpsc::UnboundedSender<Message>,
	tree: Arc<RwLock<DiscoveryTree>>,
	handler: UpdateHandler,
	next_session: SessionId,
}
impl Context {
	fn session_id(&mut self) -> SessionId {
		self.next_session += 1;
		self.next_session
	}

	/// Pumps a transport subscription into the mailbox. `None` is passed to `wrap` once when the
	/// transport ends the session.
	fn forward<T, F>(&self, mut subscription: Subscription<T>, wrap: F) -> Worker
	where
		T: Send + 'static,
		F: Fn(Option<T>) -> Message + Send + 'static,
	{
		self.spawn(move |mailbox| async move {
			while let Some(event) = subscription.next().await {
				if mailbox.send(wrap(Some(event))).is_err() {
					return;
				}
			}
			mailbox.send(wrap(None)).ok();
		})
	}

	fn spawn<F, Fut>(&self, task: F) -> Worker
	where
		F: FnOnce(mpsc::UnboundedSender<Message>) -> Fut,
		Fut: Future<Output = ()> + Send + 'static,
	{
		Worker(Some(tokio::spawn(task(self.mailbox.clone()))))
	}

	fn mutate<R>(&self, f: impl FnOnce(&mut DiscoveryTree) -> R) -> R {
		f(&mut self.tree.write().unwrap_or_else(PoisonError::into_inner))
	}

	fn read<R>(&self, f: impl FnOnce(&DiscoveryTree) -> R) -> R {
		f(&self.tree.read().unwrap_or_else(PoisonError::into_inner))
	}

	fn notify(&self) {
		let tree = self.tree.read().unwrap_or_else(PoisonError::into_inner);
		(self.handler)(&tree);
	}
}

/// The processing loop's state. Every [`Message`] is one mutation round and yields at most one notification.
pub(crate) struct Engine {
	cx: Context,
	types: ServiceTypeDiscovery,
	browser: ServiceInstanceBrowser,
	resolver: ServiceResolver,
	protocols: Vec<Protocol>,
}
impl Engine {
	pub(crate) fn new(
		transport: Arc<dyn Transport>,
		config: &DiscoveryConfig,
		tree: Arc<RwLock<DiscoveryTree>>,
		handler: UpdateHandler,
	) -> (Self, mpsc::UnboundedSender<Message>, mpsc::UnboundedReceiver<Message>) {
		let (mailbox_tx, mailbox_rx) = mpsc::unbounded_channel();

		let engine = Engine {
			cx: Context {
				transport,
				mailbox: mailbox_tx.clone(),
				tree,
				handler,
				next_session: 0,
			},
			types: ServiceTypeDiscovery::new(config.domain.clone()),
			browser: ServiceInstanceBrowser::new(),
			resolver: ServiceResolver::new(config.resolve_timeout),
			protocols: config.protocols.clone(),
		};

		(engine, mailbox_tx, mailbox_rx)
	}

	pub(crate) fn handle(&mut self, message: Message) {
		let Engine {
			cx,
			types,
			browser,
			resolver,
			protocols,
		} = self;

		let changed = match message {
			Message::Command(Command::Start) => {
				types.start(cx);
				false
			}

			Message::Command(Command::Stop) => {
				let changed = types.stop(cx);
				browser.stop_all(cx, resolver) | changed
			}

			Message::Command(Command::StartBrowsing(service_type)) => browser.start_browsing(cx, resolver, &service_type),

			Message::Command(Command::StopBrowsing(service_type)) => browser.stop_browsing(cx, resolver, &service_type),

			Message::Command(Command::StopAll) => browser.stop_all(cx, resolver),

			Message::TypeFound { session, service_type } => match types.on_type(session, service_type) {
				Some(record) => {
					// `_http._tcp` and `_http._udp` both report `_http`; browse its variants once
					let is_new = cx.mutate(|tree| tree.add_type(record.clone()));
					if is_new {
						for protocol in protocols.iter() {
							browser.start_browsing(cx, resolver, &protocol.qualify(record.base_type()));
						}
					}
					is_new
				}
				None => false,
			},

			Message::TypesEnded { session } => {
				types.on_ended(session);
				false
			}

			Message::Snapshot {
				session,
				service_type,
				instances,
			} => browser.on_snapshot(cx, resolver, session, &service_type, instances),

			Message::BrowseEnded { session, service_type } => {
				browser.on_ended(session, &service_type);
				false
			}

			Message::Resolved { attempt, key, result } => resolver.on_result(cx, attempt, key, result),
		};

		if changed {
			cx.notify();
		}
	}

	async fn run(mut self, mut mailbox: mpsc::UnboundedReceiver<Message>, autostart: bool) {
		if autostart {
			self.handle(Message::Command(Command::Start));
		}

		while let Some(message) = mailbox.recv().await {
			self.handle(message);
		}
	}
}

/// A configured discovery session. Create one with [`DiscoveryBuilder`].
pub struct Discovery {
	transport: Arc<dyn Transport>,
	config: DiscoveryConfig,
}
impl Discovery {
	fn runtime() -> Result<tokio::runtime::Runtime, std::io::Error> {
		tokio::runtime::Builder::new_current_thread()
			.thread_name("servicetree discovery (Tokio)")
			.enable_all()
			.build()
	}

	/// Runs discovery on a background thread, calling `handler` after every change to the tree.
	///
	/// `handler` runs on the processing thread while the tree is read-locked; it must not block for long
	/// and must not call [`DiscoveryHandle::snapshot`].
	pub fn run_in_background<F>(self, handler: F) -> DiscoveryHandle
	where
		F: Fn(&DiscoveryTree) + Send + Sync + 'static,
	{
		let Discovery { transport, config } = self;

		let tree = Arc::new(RwLock::new(DiscoveryTree::new()));
		let (engine, mailbox_tx, mailbox_rx) = Engine::new(transport, &config, tree.clone(), Arc::new(handler));
		let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

		let autostart = config.autostart;
		let thread = std::thread::spawn(move || {
			Self::runtime()?.block_on(async move {
				tokio::select! {
					biased;
					_ = shutdown_rx => {},
					_ = engine.run(mailbox_rx, autostart) => {},
				}
			});
			Ok::<(), std::io::Error>(())
		});

		DiscoveryHandle(DiscoveryHandleDrop(Some(DiscoveryHandleInner {
			mailbox: mailbox_tx,
			tree,
			thread,
			shutdown_tx,
		})))
	}

	/// Runs discovery on the current thread, forever.
	pub fn run<F>(self, handler: F) -> Result<(), std::io::Error>
	where
		F: Fn(&DiscoveryTree) + Send + Sync + 'static,
	{
		let Discovery { transport, config } = self;

		let tree = Arc::new(RwLock::new(DiscoveryTree::new()));
		let (engine, _, mailbox_rx) = Engine::new(transport, &config, tree, Arc::new(handler));

		Self::runtime()?.block_on(engine.run(mailbox_rx, config.autostart));
		Ok(())
	}
}
