use crate::{
	errors::ResolveError,
	service::InstanceKey,
	transport::RawResolution,
	tree::DiscoveryTree,
};
use std::{collections::BTreeSet, sync::Arc};

/// Called on the processing thread after every change to the tree.
pub type UpdateHandler = Arc<dyn Fn(&DiscoveryTree) + Send + Sync + 'static>;

/// Identifies one transport session (type enumeration, a browse, or a resolution attempt).
///
/// Ids are never reused, so an event tagged with the id of a cancelled session can be recognised and dropped.
pub(crate) type SessionId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Command {
	Start,
	Stop,
	StartBrowsing(String),
	StopBrowsing(String),
	StopAll,
}

/// Everything the processing loop reacts to.
#[derive(Debug)]
pub(crate) enum Message {
	Command(Command),

	TypeFound {
		session: SessionId,
		service_type: String,
	},
	TypesEnded {
		session: SessionId,
	},

	Snapshot {
		session: SessionId,
		service_type: String,
		instances: BTreeSet<InstanceKey>,
	},
	BrowseEnded {
		session: SessionId,
		service_type: String,
	},

	Resolved {
		attempt: SessionId,
		key: InstanceKey,
		result: Result<RawResolution, ResolveError>,
	},
}
