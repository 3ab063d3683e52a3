//! Service types, instance identities and the per-instance resolution state.

use crate::errors::BadServiceTypeError;
use std::{collections::BTreeMap, fmt};

/// The transport protocol label of a DNS-SD service type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Protocol {
	/// `_tcp`
	Tcp,

	/// `_udp`
	Udp,
}
impl Protocol {
	#[inline(always)]
	pub fn label(&self) -> &'static str {
		match self {
			Protocol::Tcp => "_tcp",
			Protocol::Udp => "_udp",
		}
	}

	/// Builds the fully-qualified service type, e.g. `_http` + `Tcp` = `_http._tcp`.
	pub fn qualify(&self, base_type: &str) -> String {
		format!("{base_type}.{}", self.label())
	}
}

/// Strips a trailing root dot and, if present, the trailing `domain` from a type string.
pub(crate) fn trim_domain<'a>(service_type: &'a str, domain: &str) -> &'a str {
	let service_type = service_type.trim_end_matches('.');
	let domain = domain.trim_end_matches('.');
	if domain.is_empty() {
		return service_type;
	}
	match service_type.len().checked_sub(domain.len() + 1) {
		Some(split) if service_type.is_char_boundary(split) => {
			let (head, tail) = service_type.split_at(split);
			if tail.starts_with('.') && tail[1..].eq_ignore_ascii_case(domain) {
				head
			} else {
				service_type
			}
		}
		_ => service_type,
	}
}

/// Two type strings name the same service type if they only differ by a trailing dot and ASCII case.
pub(crate) fn same_type(a: &str, b: &str) -> bool {
	a.trim_end_matches('.').eq_ignore_ascii_case(b.trim_end_matches('.'))
}

/// Checks that a fully-qualified service type (`_name._proto`) is usable for browsing.
pub(crate) fn validate_service_type(service_type: &str) -> Result<String, BadServiceTypeError> {
	let trimmed = service_type.trim_end_matches('.');
	let mut labels = trimmed.split('.');
	match (labels.next(), labels.next()) {
		(Some(name), Some(proto)) if name.len() > 1 && name.starts_with('_') && proto.starts_with('_') => Ok(trimmed.to_owned()),
		_ => Err(BadServiceTypeError(service_type.to_owned())),
	}
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// A discovered base service type, such as `_http`.
pub struct ServiceTypeRecord {
	base_type: String,
}
impl ServiceTypeRecord {
	/// Normalises a type string reported by type enumeration.
	///
	/// `_http._tcp`, `_http._udp.` and `_http._tcp.local.` all become `_http`. Returns `None` for anything
	/// that does not start with the `_` service sigil.
	pub fn parse(service_type: &str, domain: &str) -> Option<Self> {
		let trimmed = trim_domain(service_type, domain);
		let base_type = trimmed
			.strip_suffix("._tcp")
			.or_else(|| trimmed.strip_suffix("._udp"))
			.unwrap_or(trimmed);

		if base_type.len() > 1 && base_type.starts_with('_') {
			Some(Self {
				base_type: base_type.to_owned(),
			})
		} else {
			None
		}
	}

	#[inline(always)]
	pub fn base_type(&self) -> &str {
		&self.base_type
	}
}
impl fmt::Display for ServiceTypeRecord {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.base_type)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// Identity of a service instance: `(domain, type, name)`.
pub struct InstanceKey {
	pub domain: String,
	pub service_type: String,
	pub name: String,
}
impl InstanceKey {
	pub fn new(domain: impl Into<String>, service_type: impl Into<String>, name: impl Into<String>) -> Self {
		Self {
			domain: domain.into(),
			service_type: service_type.into(),
			name: name.into(),
		}
	}

	/// Whether this instance was reported for the given fully-qualified service type.
	pub fn belongs_to(&self, service_type: &str) -> bool {
		same_type(trim_domain(&self.service_type, &self.domain), trim_domain(service_type, &self.domain))
	}
}
impl fmt::Display for InstanceKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}.{}.{}", self.name, self.service_type.trim_end_matches('.'), self.domain)
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResolutionState {
	/// Resolution is in flight (or has not been attempted yet).
	Pending,

	/// Host, port and TXT metadata are known.
	Resolved,

	/// Resolution failed or timed out. Details stay empty.
	Failed,
}
impl ResolutionState {
	#[inline(always)]
	pub fn is_terminal(&self) -> bool {
		!matches!(self, ResolutionState::Pending)
	}
}

/// The outcome of a successful resolution, after TXT decoding.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Resolution {
	pub addresses: Vec<String>,
	pub port: u16,
	pub txt: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A discovered service instance.
pub struct ServiceInstance {
	key: InstanceKey,
	addresses: Vec<String>,
	port: Option<u16>,
	txt: BTreeMap<String, String>,
	state: ResolutionState,
}
impl ServiceInstance {
	pub(crate) fn pending(key: InstanceKey) -> Self {
		Self {
			key,
			addresses: Vec::new(),
			port: None,
			txt: BTreeMap::new(),
			state: ResolutionState::Pending,
		}
	}

	/// Applies a resolution outcome. Only a `Pending` instance accepts one; returns whether it changed.
	pub(crate) fn settle(&mut self, outcome: Option<Resolution>) -> bool {
		if self.state.is_terminal() {
			return false;
		}

		match outcome {
			Some(Resolution { addresses, port, txt }) => {
				self.addresses = addresses;
				self.port = Some(port);
				self.txt = txt;
				self.state = ResolutionState::Resolved;
			}

			None => {
				self.addresses.clear();
				self.port = None;
				self.txt.clear();
				self.state = ResolutionState::Failed;
			}
		}

		true
	}

	#[inline(always)]
	pub fn key(&self) -> &InstanceKey {
		&self.key
	}

	#[inline(always)]
	pub fn name(&self) -> &str {
		&self.key.name
	}

	#[inline(always)]
	pub fn service_type(&self) -> &str {
		&self.key.service_type
	}

	#[inline(always)]
	pub fn domain(&self) -> &str {
		&self.key.domain
	}

	#[inline(always)]
	/// Host names the instance is reachable at. Empty until resolved, and possibly empty after.
	pub fn addresses(&self) -> &[String] {
		&self.addresses
	}

	#[inline(always)]
	pub fn port(&self) -> Option<u16> {
		self.port
	}

	#[inline(always)]
	pub fn txt(&self) -> &BTreeMap<String, String> {
		&self.txt
	}

	#[inline(always)]
	pub fn state(&self) -> ResolutionState {
		self.state
	}
}
