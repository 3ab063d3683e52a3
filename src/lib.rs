//! Browse DNS-SD (Bonjour / mDNS) services on the local network and keep them
//! in a live two-level tree: service type → service instance.
//!
//! A [`Discovery`](discovery::Discovery) enumerates the advertised service types, browses every
//! type it finds, resolves each instance it sees and calls your handler with the
//! [`DiscoveryTree`](tree::DiscoveryTree) every time something changes.
//!
//! ```no_run
//! use servicetree::{discovery::DiscoveryBuilder, transport::mdns::MdnsTransportBuilder, net::IpVersion};
//!
//! let transport = MdnsTransportBuilder::new().build(IpVersion::V4).unwrap();
//!
//! let discovery = DiscoveryBuilder::new(transport)
//! 	.build()
//! 	.run_in_background(|tree| {
//! 		for node in tree.nodes() {
//! 			println!("{} ({} instances)", node.service_type(), node.len());
//! 		}
//! 	});
//!
//! std::thread::sleep(std::time::Duration::from_secs(10));
//! discovery.shutdown().unwrap();
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

#[macro_use]
extern crate thiserror;

#[macro_use]
extern crate log;

#[cfg(feature = "mdns")]
mod socket;
#[cfg(feature = "mdns")]
mod util;

pub mod discovery;
pub mod errors;
pub mod service;
pub mod transport;
pub mod tree;
pub mod txt;

#[cfg(feature = "mdns")]
#[cfg_attr(docsrs, doc(cfg(feature = "mdns")))]
pub mod net;

#[cfg(feature = "mdns")]
mod consts {
	use std::net::{Ipv4Addr, Ipv6Addr};

	pub const MDNS_PORT: u16 = 5353;
	pub const MDNS_V4_IP: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 251);
	pub const MDNS_V6_IP: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 0xfb);
}
#[cfg(feature = "mdns")]
pub use consts::*;

#[cfg(feature = "mdns")]
#[cfg_attr(docsrs, doc(cfg(feature = "mdns")))]
pub use trust_dns_client as dns;

pub use discovery::{Discovery, DiscoveryBuilder, DiscoveryHandle};
pub use service::{InstanceKey, ResolutionState, ServiceInstance, ServiceTypeRecord};
pub use tree::DiscoveryTree;

#[cfg(test)]
mod tests;
