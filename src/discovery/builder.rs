use super::{Discovery, DiscoveryConfig};
use crate::{service::Protocol, transport::Transport};
use std::{sync::Arc, time::Duration};

pub struct DiscoveryBuilder {
	transport: Arc<dyn Transport>,
	resolve_timeout: Duration,
	protocols: Vec<Protocol>,
	domain: String,
	autostart: bool,
}
impl DiscoveryBuilder {
	pub fn new(transport: impl Transport) -> Self {
		Self {
			transport: Arc::new(transport),
			resolve_timeout: Duration::from_secs(5),
			protocols: vec![Protocol::Tcp, Protocol::Udp],
			domain: "local.".to_owned(),
			autostart: true,
		}
	}

	/// How long a single instance may take to resolve before it is marked as failed. Defaults to 5 seconds.
	pub fn resolve_timeout(mut self, timeout: Duration) -> Self {
		self.resolve_timeout = timeout;
		self
	}

	/// The protocol variants to browse for every discovered base type. Defaults to `_tcp` then `_udp`.
	///
	/// Each variant gets its own browse session and its own node in the tree.
	pub fn protocols(mut self, protocols: impl IntoIterator<Item = Protocol>) -> Self {
		self.protocols.clear();
		for protocol in protocols {
			if !self.protocols.contains(&protocol) {
				self.protocols.push(protocol);
			}
		}
		self
	}

	/// The browse domain, used to normalise reported type names. Defaults to `local.`
	pub fn domain(mut self, domain: impl Into<String>) -> Self {
		self.domain = domain.into();
		self
	}

	/// Don't enumerate service types until [`DiscoveryHandle::start`](super::DiscoveryHandle::start) is called.
	///
	/// Useful for browsing a handful of known types only.
	pub fn manual_start(mut self) -> Self {
		self.autostart = false;
		self
	}

	pub fn build(self) -> Discovery {
		let DiscoveryBuilder {
			transport,
			resolve_timeout,
			protocols,
			domain,
			autostart,
		} = self;

		Discovery {
			transport,
			config: DiscoveryConfig {
				resolve_timeout,
				protocols,
				domain,
				autostart,
			},
		}
	}
}
