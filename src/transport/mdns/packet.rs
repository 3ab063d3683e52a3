use crate::{service::InstanceKey, transport::RawResolution, util::display_name};
use trust_dns_client::{
	op::{Message as DnsMessage, Query as DnsQuery},
	proto::error::ProtoResult,
	rr::{DNSClass as DnsClass, Name as DnsName, RData, Record, RecordType as DnsRecordType},
	serialize::binary::BinEncodable,
};

/// The DNS-SD meta-query name that enumerates every advertised service type.
pub(super) fn services_name(domain: &str) -> ProtoResult<DnsName> {
	crate::util::service_fqdn("_services._dns-sd._udp", domain)
}

/// The full name of an instance: `<name>.<type>.<domain>`. The instance name is a single raw label and may
/// contain spaces or dots.
pub(super) fn instance_name(key: &InstanceKey) -> ProtoResult<DnsName> {
	let service = crate::util::service_fqdn(&key.service_type, &key.domain)?;
	DnsName::from_labels(std::iter::once(key.name.as_bytes()))?.append_domain(&service)
}

pub(super) fn query_packet(name: &DnsName, record_types: &[DnsRecordType]) -> Result<Vec<u8>, std::io::Error> {
	let mut message = DnsMessage::new();
	for record_type in record_types {
		let mut query = DnsQuery::new();
		query
			.set_name(name.clone())
			.set_query_type(*record_type)
			.set_query_class(DnsClass::IN)
			.set_mdns_unicast_response(false);
		message.add_query(query);
	}

	message
		.to_bytes()
		.map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, format!("Query packet failed to serialize: {err}")))
}

fn records(message: &DnsMessage) -> impl Iterator<Item = &Record> {
	message.answers().iter().chain(message.additionals().iter())
}

/// Every PTR record for `name` in a response, as `(target, ttl)`.
pub(super) fn pointers<'a>(message: &'a DnsMessage, name: &'a DnsName) -> impl Iterator<Item = (&'a DnsName, u32)> + 'a {
	records(message).filter(move |record| record.name() == name).filter_map(|record| match record.data() {
		Some(RData::PTR(target)) => Some((target, record.ttl())),
		_ => None,
	})
}

/// Turns the target of a PTR record for `service` into an instance key. The target must be exactly one label
/// below the service name.
pub(super) fn instance_key(target: &DnsName, service: &DnsName, service_type: &str, domain: &str) -> Option<InstanceKey> {
	if target.num_labels() != service.num_labels() + 1 || !service.zone_of(target) {
		return None;
	}

	let label = target.iter().next()?;
	let name = match std::str::from_utf8(label) {
		Ok(name) => name,
		Err(_) => {
			debug!("Ignoring instance with a non UTF-8 name under {service}");
			return None;
		}
	};

	Some(InstanceKey::new(domain, format!("{}.", service_type.trim_end_matches('.')), name))
}

/// Collects the SRV and TXT records of one instance across however many responses they arrive in.
#[derive(Debug, Default)]
pub(super) struct ResolutionRecords {
	hosts: Vec<String>,
	port: Option<u16>,
	txt: Option<Vec<Vec<u8>>>,
}
impl ResolutionRecords {
	/// Returns whether anything new was learned.
	pub(super) fn absorb(&mut self, message: &DnsMessage, name: &DnsName) -> bool {
		let mut learned = false;

		for record in records(message).filter(|record| record.name() == name) {
			match record.data() {
				Some(RData::SRV(srv)) => {
					let host = display_name(srv.target());
					if !self.hosts.contains(&host) {
						self.hosts.push(host);
						learned = true;
					}
					if self.port.is_none() {
						self.port = Some(srv.port());
						learned = true;
					}
				}

				Some(RData::TXT(txt)) if self.txt.is_none() => {
					self.txt = Some(txt.txt_data().iter().map(|entry| entry.to_vec()).collect());
					learned = true;
				}

				_ => {}
			}
		}

		learned
	}

	#[inline(always)]
	pub(super) fn has_srv(&self) -> bool {
		self.port.is_some()
	}

	#[inline(always)]
	pub(super) fn is_complete(&self) -> bool {
		self.port.is_some() && self.txt.is_some()
	}

	/// `None` until an SRV record has been seen. Missing TXT data resolves to no metadata.
	pub(super) fn finish(self) -> Option<RawResolution> {
		let ResolutionRecords { hosts, port, txt } = self;
		Some(RawResolution {
			hosts,
			port: port?,
			txt: txt.unwrap_or_default(),
		})
	}
}
