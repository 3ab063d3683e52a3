use crate::{
	discovery::{Command, DiscoveryConfig, Engine, Message},
	errors::TransportError,
	service::{InstanceKey, Protocol, ResolutionState},
	transport::{channel::ChannelTransport, RawResolution},
	tree::DiscoveryTree,
};
use std::{
	collections::BTreeSet,
	sync::{
		atomic::{AtomicUsize, Ordering},
		Arc, RwLock,
	},
	time::Duration,
};
use tokio::sync::mpsc;

struct Harness {
	engine: Engine,
	mailbox_tx: mpsc::UnboundedSender<Message>,
	mailbox: mpsc::UnboundedReceiver<Message>,
	tree: Arc<RwLock<DiscoveryTree>>,
	notifications: Arc<AtomicUsize>,
	transport: ChannelTransport,
}
impl Harness {
	fn new() -> Self {
		let transport = ChannelTransport::new();
		let tree = Arc::new(RwLock::new(DiscoveryTree::new()));
		let notifications = Arc::new(AtomicUsize::new(0));

		let config = DiscoveryConfig {
			resolve_timeout: Duration::from_secs(5),
			protocols: vec![Protocol::Tcp, Protocol::Udp],
			domain: "local.".to_owned(),
			autostart: false,
		};

		let counter = notifications.clone();
		let (engine, mailbox_tx, mailbox) = Engine::new(
			Arc::new(transport.clone()),
			&config,
			tree.clone(),
			Arc::new(move |_: &DiscoveryTree| {
				counter.fetch_add(1, Ordering::SeqCst);
			}),
		);

		Self {
			engine,
			mailbox_tx,
			mailbox,
			tree,
			notifications,
			transport,
		}
	}

	fn command(&mut self, command: Command) {
		self.engine.handle(Message::Command(command));
	}

	/// Posts a command behind whatever is already in the mailbox, as the handle does.
	fn queue(&self, command: Command) {
		self.mailbox_tx.send(Message::Command(command)).unwrap();
	}

	/// Lets forwarders and resolution tasks run, then handles everything they posted until nothing is left.
	async fn settle(&mut self) {
		loop {
			for _ in 0..16 {
				tokio::task::yield_now().await;
			}

			match self.mailbox.try_recv() {
				Ok(message) => self.engine.handle(message),
				Err(_) => break,
			}
		}
	}

	fn tree(&self) -> DiscoveryTree {
		self.tree.read().unwrap().clone()
	}

	fn notifications(&self) -> usize {
		self.notifications.load(Ordering::SeqCst)
	}

	fn state(&self, key: &InstanceKey) -> Option<ResolutionState> {
		self.tree().instance(key).map(|instance| instance.state())
	}

	/// Starts browsing `_http._tcp` directly, without type enumeration.
	async fn browse_http(&mut self) {
		self.command(Command::StartBrowsing("_http._tcp".to_owned()));
		self.settle().await;
		assert_eq!(self.transport.browse_sessions("_http._tcp"), 1);
	}

	async fn publish(&mut self, names: &[&str]) {
		self.transport.publish("_http._tcp", names.iter().map(|name| http(name)));
		self.settle().await;
	}
}

fn http(name: &str) -> InstanceKey {
	InstanceKey::new("local.", "_http._tcp.", name)
}

fn resolution(host: &str, port: u16) -> RawResolution {
	RawResolution {
		hosts: vec![host.to_owned()],
		port,
		txt: Vec::new(),
	}
}

#[tokio::test(start_paused = true)]
async fn printer_is_discovered_and_resolved() {
	let mut harness = Harness::new();
	harness.command(Command::Start);
	harness.settle().await;
	assert!(harness.transport.is_browsing_types());

	harness.transport.announce_type("_http._tcp.local.");
	harness.settle().await;

	let tree = harness.tree();
	assert_eq!(tree.types().len(), 1);
	assert_eq!(tree.types()[0].base_type(), "_http");
	assert_eq!(harness.transport.browse_sessions("_http._tcp"), 1);
	assert_eq!(harness.transport.browse_sessions("_http._udp"), 1);

	let printer = http("MyPrinter");
	harness.publish(&["MyPrinter"]).await;
	assert_eq!(harness.state(&printer), Some(ResolutionState::Pending));
	assert_eq!(harness.transport.resolve_requests(&printer), 1);

	assert!(harness.transport.answer(&printer, Ok(resolution("printer.local", 631))));
	harness.settle().await;

	let tree = harness.tree();
	assert_eq!(tree.nodes().len(), 1);

	let node = tree.node("_http._tcp").unwrap();
	assert_eq!(node.len(), 1);

	let instance = node.instance(&printer).unwrap();
	assert_eq!(instance.state(), ResolutionState::Resolved);
	assert_eq!(instance.addresses(), ["printer.local".to_owned()]);
	assert_eq!(instance.port(), Some(631));
	assert!(instance.txt().is_empty());
	assert_eq!(harness.transport.pending_resolutions(), 0);
}

#[tokio::test(start_paused = true)]
async fn resolution_timeout_fails_instance() {
	let mut harness = Harness::new();
	harness.browse_http().await;
	harness.publish(&["Silent"]).await;

	tokio::time::sleep(Duration::from_secs(6)).await;
	harness.settle().await;

	let tree = harness.tree();
	let instance = tree.instance(&http("Silent")).unwrap();
	assert_eq!(instance.state(), ResolutionState::Failed);
	assert!(instance.addresses().is_empty());
	assert_eq!(instance.port(), None);
	assert!(instance.txt().is_empty());
	assert_eq!(harness.transport.pending_resolutions(), 0);
}

#[tokio::test(start_paused = true)]
async fn transport_failure_fails_only_that_instance() {
	let mut harness = Harness::new();
	harness.browse_http().await;
	harness.publish(&["a", "b"]).await;

	harness.transport.answer(&http("a"), Err(TransportError::Closed));
	harness.transport.answer(&http("b"), Ok(resolution("b.local", 80)));
	harness.settle().await;

	assert_eq!(harness.state(&http("a")), Some(ResolutionState::Failed));
	assert_eq!(harness.state(&http("b")), Some(ResolutionState::Resolved));
	assert_eq!(harness.transport.browse_sessions("_http._tcp"), 1);
}

#[tokio::test(start_paused = true)]
async fn snapshot_replaces_children() {
	let mut harness = Harness::new();
	harness.browse_http().await;

	harness.publish(&["a", "b"]).await;
	harness.publish(&["b", "c"]).await;

	let tree = harness.tree();
	let keys = tree.node("_http._tcp").unwrap().instances().map(|instance| instance.key().clone()).collect::<BTreeSet<_>>();
	assert_eq!(keys, BTreeSet::from([http("b"), http("c")]));

	// `a` vanished before resolving, so its resolution was cancelled
	assert_eq!(harness.transport.pending_resolutions(), 2);
	assert!(!harness.transport.answer(&http("a"), Ok(resolution("a.local", 80))));
}

#[tokio::test(start_paused = true)]
async fn one_notification_per_snapshot() {
	let mut harness = Harness::new();
	harness.browse_http().await;
	let before = harness.notifications();

	harness.publish(&["a", "b", "c"]).await;
	assert_eq!(harness.notifications(), before + 1);

	// An identical snapshot is still a replacement
	harness.publish(&["a", "b", "c"]).await;
	assert_eq!(harness.notifications(), before + 2);
	assert_eq!(harness.transport.resolve_requests(&http("a")), 1);

	harness.transport.answer(&http("a"), Ok(resolution("a.local", 80)));
	harness.settle().await;
	assert_eq!(harness.notifications(), before + 3);

	// Even an empty one
	harness.publish(&[]).await;
	harness.publish(&[]).await;
	assert_eq!(harness.notifications(), before + 5);
	assert!(harness.tree().node("_http._tcp").unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn stale_snapshots_do_not_notify() {
	let mut harness = Harness::new();
	harness.browse_http().await;
	harness.publish(&["a"]).await;
	let before = harness.notifications();

	harness.engine.handle(Message::Snapshot {
		session: u64::MAX,
		service_type: "_http._tcp".to_owned(),
		instances: BTreeSet::from([http("a")]),
	});
	assert_eq!(harness.notifications(), before);
}

#[tokio::test(start_paused = true)]
async fn queued_stop_applies_after_earlier_snapshots() {
	let mut harness = Harness::new();
	harness.browse_http().await;
	let before = harness.notifications();

	// Let the snapshot reach the mailbox, then queue the stop behind it
	harness.transport.publish("_http._tcp", [http("a")]);
	for _ in 0..16 {
		tokio::task::yield_now().await;
	}
	harness.queue(Command::StopBrowsing("_http._tcp".to_owned()));
	harness.settle().await;

	// The snapshot landed and notified, then the stop removed the node
	assert_eq!(harness.notifications(), before + 2);
	assert!(harness.tree().node("_http._tcp").is_none());
	assert_eq!(harness.transport.browse_sessions("_http._tcp"), 0);
	assert_eq!(harness.transport.pending_resolutions(), 0);
}

#[tokio::test(start_paused = true)]
async fn one_resolution_in_flight_per_instance() {
	let mut harness = Harness::new();
	harness.browse_http().await;

	harness.publish(&["a"]).await;
	harness.publish(&["a"]).await;
	harness.publish(&["a", "b"]).await;

	assert_eq!(harness.transport.resolve_requests(&http("a")), 1);
	assert_eq!(harness.transport.resolve_requests(&http("b")), 1);
}

#[tokio::test(start_paused = true)]
async fn settled_state_is_kept_until_removed() {
	let mut harness = Harness::new();
	harness.browse_http().await;

	harness.publish(&["a"]).await;
	harness.transport.answer(&http("a"), Ok(resolution("a.local", 80)));
	harness.settle().await;
	assert_eq!(harness.state(&http("a")), Some(ResolutionState::Resolved));

	harness.publish(&["a", "b"]).await;
	assert_eq!(harness.state(&http("a")), Some(ResolutionState::Resolved));
	assert_eq!(harness.transport.resolve_requests(&http("a")), 1);

	// Removal then re-addition is a fresh arrival
	harness.publish(&["b"]).await;
	assert_eq!(harness.state(&http("a")), None);
	harness.publish(&["a", "b"]).await;
	assert_eq!(harness.state(&http("a")), Some(ResolutionState::Pending));
	assert_eq!(harness.transport.resolve_requests(&http("a")), 2);
}

#[tokio::test(start_paused = true)]
async fn stop_before_start() {
	let mut harness = Harness::new();
	harness.command(Command::Stop);
	harness.command(Command::StopAll);
	harness.command(Command::StopBrowsing("_http._tcp".to_owned()));
	harness.settle().await;

	assert_eq!(harness.notifications(), 0);
	assert_eq!(harness.tree(), DiscoveryTree::new());
}

#[tokio::test(start_paused = true)]
async fn restarted_browse_starts_clean() {
	let mut harness = Harness::new();
	harness.browse_http().await;
	harness.publish(&["a"]).await;

	harness.command(Command::StopBrowsing("_http._tcp".to_owned()));
	harness.command(Command::StartBrowsing("_http._tcp".to_owned()));
	harness.settle().await;

	assert!(harness.tree().node("_http._tcp").is_none());
	assert_eq!(harness.transport.browse_sessions("_http._tcp"), 1);
	assert_eq!(harness.transport.pending_resolutions(), 0);

	harness.publish(&["b"]).await;
	let tree = harness.tree();
	let node = tree.node("_http._tcp").unwrap();
	assert_eq!(node.len(), 1);
	assert!(node.instance(&http("b")).is_some());
}

#[tokio::test(start_paused = true)]
async fn rebrowsing_replaces_the_session() {
	let mut harness = Harness::new();
	harness.browse_http().await;
	harness.publish(&["a"]).await;

	harness.command(Command::StartBrowsing("_http._tcp.".to_owned()));
	harness.settle().await;

	assert_eq!(harness.transport.browse_sessions("_http._tcp"), 1);
	assert!(harness.tree().node("_http._tcp").is_none());
}

#[tokio::test(start_paused = true)]
async fn late_events_are_dropped() {
	let mut harness = Harness::new();
	harness.browse_http().await;
	harness.publish(&["a"]).await;
	let before = harness.notifications();

	harness.engine.handle(Message::Snapshot {
		session: u64::MAX,
		service_type: "_http._tcp".to_owned(),
		instances: BTreeSet::from([http("ghost")]),
	});
	harness.engine.handle(Message::Resolved {
		attempt: u64::MAX,
		key: http("a"),
		result: Ok(resolution("ghost.local", 1)),
	});
	harness.engine.handle(Message::TypeFound {
		session: u64::MAX,
		service_type: "_ghost._tcp".to_owned(),
	});

	assert_eq!(harness.notifications(), before);
	assert_eq!(harness.state(&http("ghost")), None);
	assert_eq!(harness.state(&http("a")), Some(ResolutionState::Pending));
	assert!(harness.tree().types().is_empty());
}

#[tokio::test(start_paused = true)]
async fn stop_clears_everything() {
	let mut harness = Harness::new();
	harness.command(Command::Start);
	harness.settle().await;
	harness.transport.announce_type("_http._tcp");
	harness.settle().await;
	harness.publish(&["a"]).await;

	let before = harness.notifications();
	harness.command(Command::Stop);
	harness.settle().await;

	assert_eq!(harness.notifications(), before + 1);
	assert_eq!(harness.tree(), DiscoveryTree::new());
	assert!(!harness.transport.is_browsing_types());
	assert_eq!(harness.transport.browse_sessions("_http._tcp"), 0);
	assert_eq!(harness.transport.browse_sessions("_http._udp"), 0);
	assert_eq!(harness.transport.pending_resolutions(), 0);

	// Types are forgotten, so a restart reports them again
	harness.command(Command::Start);
	harness.settle().await;
	harness.transport.announce_type("_http._tcp");
	harness.settle().await;
	assert_eq!(harness.tree().types().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn types_are_deduplicated() {
	let mut harness = Harness::new();
	harness.command(Command::Start);
	harness.settle().await;

	harness.transport.announce_type("_http._tcp");
	harness.settle().await;
	harness.publish(&["a"]).await;

	harness.transport.announce_type("_http._tcp.");
	harness.transport.announce_type("_http._udp");
	harness.transport.announce_type("printer");
	harness.settle().await;

	let tree = harness.tree();
	assert_eq!(tree.types().len(), 1);

	// The `_tcp` session was not restarted by the `_udp` report
	assert!(tree.instance(&http("a")).is_some());
	assert_eq!(harness.transport.browse_sessions("_http._tcp"), 1);
}

#[tokio::test(start_paused = true)]
async fn foreign_instances_are_ignored() {
	let mut harness = Harness::new();
	harness.browse_http().await;

	let foreign = InstanceKey::new("local.", "_ipp._tcp.", "Elsewhere");
	harness.transport.publish("_http._tcp", [http("a"), foreign.clone()]);
	harness.settle().await;

	assert!(harness.tree().instance(&foreign).is_none());
	assert_eq!(harness.transport.resolve_requests(&foreign), 0);
}

#[tokio::test(start_paused = true)]
async fn tcp_and_udp_are_separate_nodes() {
	let mut harness = Harness::new();
	harness.command(Command::Start);
	harness.settle().await;
	harness.transport.announce_type("_http._tcp");
	harness.settle().await;

	harness.publish(&["a"]).await;
	harness.transport.publish("_http._udp", [InstanceKey::new("local.", "_http._udp.", "a")]);
	harness.settle().await;

	let tree = harness.tree();
	assert_eq!(tree.nodes().len(), 2);
	assert_eq!(tree.node("_http._tcp").unwrap().len(), 1);
	assert_eq!(tree.node("_http._udp").unwrap().len(), 1);
	assert_eq!(tree.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn refused_sessions_stay_idle() {
	let mut harness = Harness::new();
	harness.transport.refuse_sessions(true);

	harness.command(Command::Start);
	harness.command(Command::StartBrowsing("_http._tcp".to_owned()));
	harness.settle().await;

	assert!(!harness.transport.is_browsing_types());
	assert_eq!(harness.transport.browse_sessions("_http._tcp"), 0);
	assert_eq!(harness.notifications(), 0);

	// No retry, but a later start works
	harness.transport.refuse_sessions(false);
	harness.command(Command::Start);
	harness.settle().await;
	assert!(harness.transport.is_browsing_types());
}

#[tokio::test(start_paused = true)]
async fn refused_resolution_fails_at_once() {
	let mut harness = Harness::new();
	harness.browse_http().await;

	harness.transport.refuse_sessions(true);
	let before = harness.notifications();
	harness.publish(&["a"]).await;

	assert_eq!(harness.state(&http("a")), Some(ResolutionState::Failed));
	assert_eq!(harness.notifications(), before + 1);
}

#[tokio::test(start_paused = true)]
async fn txt_is_decoded() {
	let mut harness = Harness::new();
	harness.browse_http().await;
	harness.publish(&["a"]).await;

	harness.transport.answer(
		&http("a"),
		Ok(RawResolution {
			hosts: Vec::new(),
			port: 80,
			txt: vec![b"path=/".to_vec(), b"bad=\xff".to_vec(), b"flag".to_vec()],
		}),
	);
	harness.settle().await;

	let tree = harness.tree();
	let instance = tree.instance(&http("a")).unwrap();
	assert_eq!(instance.state(), ResolutionState::Resolved);
	assert!(instance.addresses().is_empty());
	assert_eq!(instance.txt().get("path").map(String::as_str), Some("/"));
	assert_eq!(instance.txt().get("flag").map(String::as_str), Some(""));
	assert!(!instance.txt().contains_key("bad"));
}
