use crate::{
	net::{ipv4_interfaces, Ipv6Interface, MulticastSocketEx, TargetInterface, TargetInterfaceV4, TargetInterfaceV6},
	MDNS_PORT, MDNS_V4_IP, MDNS_V6_IP,
};
use std::{
	collections::BTreeSet,
	net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4},
};
use tokio::net::UdpSocket as AsyncUdpSocket;

pub(crate) type AsyncMdnsSocket = MdnsSocket<AsyncUdpSocket>;
pub(crate) enum MdnsSocket<S = std::net::UdpSocket> {
	V4(S),
	V6(Ipv6MdnsSocket<S>),
	Multicol { v4: S, v6: Ipv6MdnsSocket<S> },
}
impl MdnsSocket<std::net::UdpSocket> {
	pub fn new(loopback: bool, interface_v4: TargetInterfaceV4, interface_v6: TargetInterfaceV6) -> Result<Self, std::io::Error> {
		Ok(Self::Multicol {
			v4: Self::bind_v4(loopback, interface_v4)?,
			v6: Self::bind_v6(loopback, interface_v6)?,
		})
	}

	pub fn new_v4(loopback: bool, interface: TargetInterfaceV4) -> Result<Self, std::io::Error> {
		Self::bind_v4(loopback, interface).map(Self::V4)
	}

	pub fn new_v6(loopback: bool, interface: TargetInterfaceV6) -> Result<Self, std::io::Error> {
		Self::bind_v6(loopback, interface).map(Self::V6)
	}

	fn bind_v4(loopback: bool, interface: TargetInterfaceV4) -> Result<std::net::UdpSocket, std::io::Error> {
		let socket = socket2::Socket::new(socket2::Domain::IPV4, socket2::Type::DGRAM, Some(socket2::Protocol::UDP))?;
		socket.set_reuse_address(true)?;
		socket.set_multicast_loop_v4(loopback)?;

		#[cfg(unix)]
		{
			socket.set_reuse_port(true)?;
		}

		let ifaces = match interface {
			TargetInterface::Default => BTreeSet::new(),
			TargetInterface::Specific(iface) => BTreeSet::from([iface]),
			TargetInterface::Multi(ifaces) => ifaces,
			TargetInterface::All => ipv4_interfaces(),
		};

		let mut did_join = false;
		for iface in ifaces.iter() {
			match socket.join_multicast_v4(&MDNS_V4_IP, iface) {
				Ok(()) => did_join = true,
				Err(err) => debug!("Failed to join mDNS group on {iface}: {err}"),
			}
		}
		if !did_join {
			// Fallback to default
			socket.join_multicast_v4(&MDNS_V4_IP, &Ipv4Addr::UNSPECIFIED)?;
		}

		if let Some(iface) = ifaces.iter().next() {
			socket.set_multicast_if_v4(iface)?;
		}

		// Multicast is delivered to sockets bound to the wildcard address only
		socket.bind(&socket2::SockAddr::from(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), MDNS_PORT)))?;
		socket.set_nonblocking(true)?;

		Ok(socket.into())
	}

	fn bind_v6(loopback: bool, interface: TargetInterfaceV6) -> Result<Ipv6MdnsSocket, std::io::Error> {
		let socket = socket2::Socket::new(socket2::Domain::IPV6, socket2::Type::DGRAM, Some(socket2::Protocol::UDP))?;
		socket.set_reuse_address(true)?;
		socket.set_only_v6(true)?;
		socket.set_multicast_loop_v6(loopback)?;

		#[cfg(unix)]
		{
			socket.set_reuse_port(true)?;
		}

		let ifaces = match interface {
			TargetInterface::Default => BTreeSet::new(),
			TargetInterface::Specific(iface) => BTreeSet::from([iface]),
			TargetInterface::Multi(ifaces) => ifaces,
			TargetInterface::All => Ipv6Interface::all().unwrap_or_default(),
		};

		let mut joined = BTreeSet::new();
		for iface in ifaces {
			match socket.join_multicast_v6(&MDNS_V6_IP, iface.as_u32()) {
				Ok(()) => {
					joined.insert(iface);
				}
				Err(err) => debug!("Failed to join mDNS group on interface {}: {err}", iface.as_u32()),
			}
		}
		if joined.is_empty() {
			// Fallback to default
			socket.join_multicast_v6(&MDNS_V6_IP, 0)?;
		}

		socket.bind(&socket2::SockAddr::from(SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), MDNS_PORT)))?;
		socket.set_nonblocking(true)?;

		Ipv6MdnsSocket::new(socket, joined)
	}

	/// Registers the sockets with the tokio reactor. Must be called from within a runtime.
	pub fn into_async(self) -> Result<AsyncMdnsSocket, std::io::Error> {
		Ok(match self {
			Self::V4(v4) => AsyncMdnsSocket::V4(AsyncUdpSocket::from_std(v4)?),
			Self::V6(v6) => AsyncMdnsSocket::V6(v6.into_async()?),
			Self::Multicol { v4, v6 } => AsyncMdnsSocket::Multicol {
				v4: AsyncUdpSocket::from_std(v4)?,
				v6: v6.into_async()?,
			},
		})
	}
}
impl AsyncMdnsSocket {
	pub async fn send_multicast(&self, packet: &[u8]) -> Result<(), std::io::Error> {
		let v4_group = SocketAddrV4::new(MDNS_V4_IP, MDNS_PORT);
		let v6_group = SocketAddr::new(IpAddr::V6(MDNS_V6_IP), MDNS_PORT);

		match self {
			Self::V4(v4) => v4.send_to(packet, v4_group).await.map(|_| ()),

			Self::V6(v6) => v6.send_to_multicast(packet, v6_group).await,

			Self::Multicol { v4, v6 } => {
				let v4 = v4.send_to(packet, v4_group);
				let v6 = v6.send_to_multicast(packet, v6_group);
				tokio::try_join!(v4, v6).map(|_| ())
			}
		}
	}

	pub fn recv(&self, buffer: Vec<u8>) -> MdnsSocketRecv {
		match self {
			Self::V4(socket) => MdnsSocketRecv::Unicol(socket, buffer),

			Self::V6(v6) => MdnsSocketRecv::Unicol(v6.socket(), buffer),

			Self::Multicol { v4, v6 } => MdnsSocketRecv::Multicol {
				v4: (v4, buffer.clone()),
				v6: (v6.socket(), buffer),
			},
		}
	}
}

pub enum MdnsSocketRecv<'a> {
	Unicol(&'a AsyncUdpSocket, Vec<u8>),
	Multicol {
		v4: (&'a AsyncUdpSocket, Vec<u8>),
		v6: (&'a AsyncUdpSocket, Vec<u8>),
	},
}
impl MdnsSocketRecv<'_> {
	pub async fn recv_multicast(&mut self) -> Result<((usize, SocketAddr), &[u8]), std::io::Error> {
		Ok(match self {
			Self::Unicol(socket, buf) => (socket.recv_from(buf).await?, buf),
			Self::Multicol {
				v4: (v4, buf_v4),
				v6: (v6, buf_v6),
			} => {
				let v4 = v4.recv_from(buf_v4);
				let v6 = v6.recv_from(buf_v6);
				tokio::select! {
					v4 = v4 => (v4?, buf_v4),
					v6 = v6 => (v6?, buf_v6),
				}
			}
		})
	}
}

/// An IPv6 socket that sends multicast on every joined interface in turn
pub(crate) enum Ipv6MdnsSocket<S = std::net::UdpSocket> {
	Single(S),
	Multi { socket: S, ifaces: BTreeSet<Ipv6Interface> },
}
impl Ipv6MdnsSocket {
	fn new(socket: socket2::Socket, ifaces: BTreeSet<Ipv6Interface>) -> Result<Self, std::io::Error> {
		if ifaces.len() > 1 {
			return Ok(Self::Multi {
				socket: socket.into(),
				ifaces,
			});
		}

		socket.set_multicast_if_v6(ifaces.first().map(Ipv6Interface::as_u32).unwrap_or(0))?;
		Ok(Self::Single(socket.into()))
	}

	fn into_async(self) -> Result<Ipv6MdnsSocket<AsyncUdpSocket>, std::io::Error> {
		Ok(match self {
			Self::Single(socket) => Ipv6MdnsSocket::Single(AsyncUdpSocket::from_std(socket)?),
			Self::Multi { socket, ifaces } => Ipv6MdnsSocket::Multi {
				socket: AsyncUdpSocket::from_std(socket)?,
				ifaces,
			},
		})
	}
}
impl Ipv6MdnsSocket<AsyncUdpSocket> {
	async fn send_to_multicast(&self, packet: &[u8], addr: SocketAddr) -> Result<(), std::io::Error> {
		match self {
			Self::Single(socket) => {
				socket.send_to(packet, addr).await?;
			}

			Self::Multi { socket, ifaces } => {
				for iface in ifaces.iter().copied() {
					socket.set_multicast_if(iface)?;
					socket.send_to(packet, addr).await?;
				}
			}
		}

		Ok(())
	}

	fn socket(&self) -> &AsyncUdpSocket {
		match self {
			Self::Single(socket) => socket,
			Self::Multi { socket, .. } => socket,
		}
	}
}
