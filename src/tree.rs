//! The aggregated discovery model: service types, and the instances browsed under each of them.

use crate::service::{same_type, InstanceKey, Resolution, ServiceInstance, ServiceTypeRecord};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq)]
/// One browsed, fully-qualified service type (e.g. `_http._tcp`) and its current instances.
pub struct ServiceTypeNode {
	service_type: String,
	instances: BTreeMap<InstanceKey, ServiceInstance>,
}
impl ServiceTypeNode {
	fn new(service_type: String) -> Self {
		Self {
			service_type,
			instances: BTreeMap::new(),
		}
	}

	#[inline(always)]
	pub fn service_type(&self) -> &str {
		&self.service_type
	}

	#[inline(always)]
	pub fn instances(&self) -> impl Iterator<Item = &ServiceInstance> + '_ {
		self.instances.values()
	}

	#[inline(always)]
	pub fn instance(&self, key: &InstanceKey) -> Option<&ServiceInstance> {
		self.instances.get(key)
	}

	#[inline(always)]
	pub fn len(&self) -> usize {
		self.instances.len()
	}

	#[inline(always)]
	pub fn is_empty(&self) -> bool {
		self.instances.is_empty()
	}
}

/// The result of replacing a node's children with a fresh browse snapshot.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct SnapshotDiff {
	pub added: Vec<InstanceKey>,
	pub removed: Vec<InstanceKey>,
	/// The node did not exist before this snapshot.
	pub created: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Service type → service instance tree.
///
/// Nodes are kept in the order their types were first browsed. Instances within a node are ordered by
/// key; consumers apply whatever display order they like.
pub struct DiscoveryTree {
	types: Vec<ServiceTypeRecord>,
	nodes: Vec<ServiceTypeNode>,
}
impl DiscoveryTree {
	pub fn new() -> Self {
		Self::default()
	}

	#[inline(always)]
	/// Base types found by type enumeration, in discovery order.
	pub fn types(&self) -> &[ServiceTypeRecord] {
		&self.types
	}

	#[inline(always)]
	pub fn nodes(&self) -> &[ServiceTypeNode] {
		&self.nodes
	}

	pub fn node(&self, service_type: &str) -> Option<&ServiceTypeNode> {
		self.position(service_type).map(|index| &self.nodes[index])
	}

	pub fn instance(&self, key: &InstanceKey) -> Option<&ServiceInstance> {
		self.nodes.iter().find_map(|node| node.instances.get(key))
	}

	pub fn instances(&self) -> impl Iterator<Item = &ServiceInstance> + '_ {
		self.nodes.iter().flat_map(|node| node.instances.values())
	}

	/// Total number of instances across all nodes.
	pub fn len(&self) -> usize {
		self.nodes.iter().map(ServiceTypeNode::len).sum()
	}

	pub fn is_empty(&self) -> bool {
		self.nodes.iter().all(ServiceTypeNode::is_empty)
	}

	fn position(&self, service_type: &str) -> Option<usize> {
		self.nodes.iter().position(|node| same_type(&node.service_type, service_type))
	}

	pub(crate) fn add_type(&mut self, record: ServiceTypeRecord) -> bool {
		if self.types.contains(&record) {
			false
		} else {
			self.types.push(record);
			true
		}
	}

	pub(crate) fn clear_types(&mut self) -> bool {
		let changed = !self.types.is_empty();
		self.types.clear();
		changed
	}

	/// Replaces the children of `service_type` with `snapshot`, creating the node if needed.
	///
	/// Instances present before and after keep their state. Keys that do not belong to `service_type`
	/// must be filtered out by the caller.
	pub(crate) fn replace_instances(&mut self, service_type: &str, snapshot: BTreeSet<InstanceKey>) -> SnapshotDiff {
		let mut diff = SnapshotDiff::default();

		let index = match self.position(service_type) {
			Some(index) => index,
			None => {
				diff.created = true;
				self.nodes.push(ServiceTypeNode::new(service_type.to_owned()));
				self.nodes.len() - 1
			}
		};
		let node = &mut self.nodes[index];

		node.instances.retain(|key, _| {
			if snapshot.contains(key) {
				true
			} else {
				diff.removed.push(key.clone());
				false
			}
		});

		for key in snapshot {
			if !node.instances.contains_key(&key) {
				node.instances.insert(key.clone(), ServiceInstance::pending(key.clone()));
				diff.added.push(key);
			}
		}

		diff
	}

	/// Drops a node and all of its instances, returning the removed instance keys.
	pub(crate) fn remove_node(&mut self, service_type: &str) -> Option<Vec<InstanceKey>> {
		let index = self.position(service_type)?;
		Some(self.nodes.remove(index).instances.into_keys().collect())
	}

	/// Records a resolution outcome for a `Pending` instance. Returns whether anything changed.
	pub(crate) fn settle(&mut self, key: &InstanceKey, outcome: Option<Resolution>) -> bool {
		self.nodes
			.iter_mut()
			.find_map(|node| node.instances.get_mut(key))
			.map(|instance| instance.settle(outcome))
			.unwrap_or(false)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::service::ResolutionState;

	fn key(name: &str) -> InstanceKey {
		InstanceKey::new("local.", "_http._tcp.", name)
	}

	fn snapshot(names: &[&str]) -> BTreeSet<InstanceKey> {
		names.iter().map(|name| key(name)).collect()
	}

	#[test]
	fn snapshot_replaces_children() {
		let mut tree = DiscoveryTree::new();

		let diff = tree.replace_instances("_http._tcp", snapshot(&["a", "b"]));
		assert!(diff.created);
		assert_eq!(diff.added, vec![key("a"), key("b")]);

		let diff = tree.replace_instances("_http._tcp", snapshot(&["b", "c"]));
		assert!(!diff.created);
		assert_eq!(diff.added, vec![key("c")]);
		assert_eq!(diff.removed, vec![key("a")]);

		let node = tree.node("_http._tcp").unwrap();
		assert_eq!(node.instances().map(|i| i.name()).collect::<Vec<_>>(), vec!["b", "c"]);
	}

	#[test]
	fn retained_instances_keep_their_state() {
		let mut tree = DiscoveryTree::new();
		tree.replace_instances("_http._tcp", snapshot(&["a"]));
		assert!(tree.settle(&key("a"), None));

		let diff = tree.replace_instances("_http._tcp", snapshot(&["a"]));
		assert_eq!(diff, SnapshotDiff::default());
		assert_eq!(tree.instance(&key("a")).unwrap().state(), ResolutionState::Failed);
	}

	#[test]
	fn readded_instance_starts_pending() {
		let mut tree = DiscoveryTree::new();
		tree.replace_instances("_http._tcp", snapshot(&["a"]));
		tree.settle(&key("a"), None);

		tree.replace_instances("_http._tcp", BTreeSet::new());
		assert!(tree.instance(&key("a")).is_none());

		tree.replace_instances("_http._tcp", snapshot(&["a"]));
		assert_eq!(tree.instance(&key("a")).unwrap().state(), ResolutionState::Pending);
	}

	#[test]
	fn nodes_keep_insertion_order() {
		let mut tree = DiscoveryTree::new();
		tree.replace_instances("_ssh._tcp", BTreeSet::new());
		tree.replace_instances("_http._tcp", BTreeSet::new());
		tree.replace_instances("_afp._tcp", BTreeSet::new());

		let order = tree.nodes().iter().map(|node| node.service_type()).collect::<Vec<_>>();
		assert_eq!(order, vec!["_ssh._tcp", "_http._tcp", "_afp._tcp"]);

		assert_eq!(tree.remove_node("_http._tcp"), Some(vec![]));
		assert!(tree.node("_http._tcp").is_none());
		assert_eq!(tree.remove_node("_http._tcp"), None);
	}

	#[test]
	fn settle_unknown_instance_is_ignored() {
		let mut tree = DiscoveryTree::new();
		assert!(!tree.settle(&key("ghost"), None));
	}

	#[test]
	fn types_are_unique() {
		let mut tree = DiscoveryTree::new();
		let http = ServiceTypeRecord::parse("_http._tcp", "local.").unwrap();
		assert!(tree.add_type(http.clone()));
		assert!(!tree.add_type(http));
		assert!(tree.clear_types());
		assert!(!tree.clear_types());
	}
}
