use super::{MdnsConfig, MdnsTransport};
use crate::{
	net::{IpVersion, TargetInterfaceV4, TargetInterfaceV6},
	socket::MdnsSocket,
};
use std::time::Duration;

pub struct MdnsTransportBuilder {
	interval: Duration,
	resolve_grace: Duration,
	loopback: bool,
	interface_v4: TargetInterfaceV4,
	interface_v6: TargetInterfaceV6,
	domain: String,
}
impl MdnsTransportBuilder {
	pub fn new() -> Self {
		Self {
			interval: Duration::from_secs(10),
			resolve_grace: Duration::from_millis(500),
			loopback: false,
			interface_v4: TargetInterfaceV4::All,
			interface_v6: TargetInterfaceV6::All,
			domain: "local.".to_owned(),
		}
	}

	/// How often browse queries are repeated. Defaults to 10 seconds.
	pub fn interval(mut self, interval: Duration) -> Self {
		self.interval = interval;
		self
	}

	/// How long a resolution waits for TXT data once the SRV record is known. Defaults to 500 milliseconds.
	pub fn resolve_grace(mut self, grace: Duration) -> Self {
		self.resolve_grace = grace;
		self
	}

	/// Receive our own multicast packets.
	pub fn loopback(mut self) -> Self {
		self.loopback = true;
		self
	}

	pub fn interface_v4(mut self, interface: TargetInterfaceV4) -> Self {
		self.interface_v4 = interface;
		self
	}

	pub fn interface_v6(mut self, interface: TargetInterfaceV6) -> Self {
		self.interface_v6 = interface;
		self
	}

	/// The domain queries are made in. Defaults to `local.`
	pub fn domain(mut self, domain: impl Into<String>) -> Self {
		self.domain = domain.into();
		self
	}

	/// Binds the multicast socket(s). Nothing is sent until the first session opens.
	pub fn build(self, ip_version: IpVersion) -> Result<MdnsTransport, std::io::Error> {
		let MdnsTransportBuilder {
			interval,
			resolve_grace,
			loopback,
			interface_v4,
			interface_v6,
			domain,
		} = self;

		let socket = match ip_version {
			IpVersion::V4 => MdnsSocket::new_v4(loopback, interface_v4)?,
			IpVersion::V6 => MdnsSocket::new_v6(loopback, interface_v6)?,
			IpVersion::Both => MdnsSocket::new(loopback, interface_v4, interface_v6)?,
		};

		Ok(MdnsTransport::new(
			socket,
			MdnsConfig {
				interval,
				resolve_grace,
				domain,
			},
		))
	}
}
impl Default for MdnsTransportBuilder {
	fn default() -> Self {
		Self::new()
	}
}
