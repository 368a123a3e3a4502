use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::future::Future;
use std::rc::{Rc, Weak};

use futures::FutureExt;
use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;

use crate::schedule::{Defer, LocalSpawner};
use crate::trace::trace_edge;
use crate::wave::{Wave, WaveCounter};
use crate::Dependent;

new_key_type! {
	/// Stable arena index of a node inside its [`Graph`].
	pub struct NodeKey;
}

/// Shared owner of the node arena, the edge sets and the wave counter.
///
/// Cloning a `Graph` is cheap and yields another handle to the same graph.
#[derive(Clone)]
pub struct Graph {
	inner: Rc<GraphInner>,
}

struct GraphInner {
	waves: WaveCounter,
	topology: RefCell<Topology>,
	defer: Box<dyn Defer>,
}

#[derive(Default)]
struct Topology {
	nodes: SlotMap<NodeKey, Links>,
	/// Live identities, with the number of nodes sharing each.
	ids: BTreeMap<String, usize>,
}

struct Links {
	id: String,
	node: Weak<dyn Dependent>,
	parents: BTreeSet<NodeKey>,
	children: BTreeSet<NodeKey>,
}

impl Default for Graph {
	fn default() -> Self {
		Graph::new()
	}
}

impl Graph {
	/// A graph whose recomputations are spawned onto the current tokio
	/// `LocalSet`.
	pub fn new() -> Self {
		Graph::with_defer(LocalSpawner)
	}

	pub fn with_defer(defer: impl Defer + 'static) -> Self {
		Graph {
			inner: Rc::new(GraphInner {
				waves: WaveCounter::new(),
				topology: RefCell::new(Topology::default()),
				defer: Box::new(defer),
			}),
		}
	}

	/// Number of live nodes.
	pub fn len(&self) -> usize {
		self.inner.topology.borrow().nodes.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn contains(&self, key: NodeKey) -> bool {
		self.inner.topology.borrow().nodes.contains_key(key)
	}

	/// Nodes `key` read from during its last (or in-flight) recomputation.
	pub fn parents_of(&self, key: NodeKey) -> Vec<NodeKey> {
		let topology = self.inner.topology.borrow();
		topology
			.nodes
			.get(key)
			.map(|links| links.parents.iter().copied().collect())
			.unwrap_or_default()
	}

	/// Nodes currently reading from `key`.
	pub fn children_of(&self, key: NodeKey) -> Vec<NodeKey> {
		let topology = self.inner.topology.borrow();
		topology
			.nodes
			.get(key)
			.map(|links| links.children.iter().copied().collect())
			.unwrap_or_default()
	}

	/// The most recently started wave.
	pub fn last_wave(&self) -> Option<Wave> {
		self.inner.waves.last()
	}

	/// Whether both handles refer to the same graph.
	pub fn same(&self, other: &Graph) -> bool {
		Rc::ptr_eq(&self.inner, &other.inner)
	}

	pub(crate) fn next_wave(&self) -> Wave {
		self.inner.waves.next()
	}

	/// Whether a live node goes by `id`.
	pub fn has_id(&self, id: &str) -> bool {
		self.inner.topology.borrow().ids.contains_key(id)
	}

	/// An identity no live node of this graph uses.
	pub(crate) fn fresh_id(&self, mut generate: impl FnMut() -> String) -> String {
		loop {
			let id = generate();
			if !self.has_id(&id) {
				return id;
			}
		}
	}

	pub(crate) fn insert(&self, id: &str, node: Weak<dyn Dependent>) -> NodeKey {
		let mut topology = self.inner.topology.borrow_mut();
		*topology.ids.entry(id.to_owned()).or_default() += 1;
		topology.nodes.insert(Links {
			id: id.to_owned(),
			node,
			parents: BTreeSet::new(),
			children: BTreeSet::new(),
		})
	}

	/// Severs every edge of `key` in both directions and frees its slot.
	pub(crate) fn remove(&self, key: NodeKey) {
		let Ok(mut topology) = self.inner.topology.try_borrow_mut() else {
			tracing::warn!(target: crate::trace::EDGE, ?key, "topology busy; node left in arena");
			return;
		};

		let Some(links) = topology.nodes.remove(key) else {
			return;
		};

		if let Some(count) = topology.ids.get_mut(&links.id) {
			*count -= 1;
			if *count == 0 {
				topology.ids.remove(&links.id);
			}
		}

		for parent in &links.parents {
			if let Some(parent) = topology.nodes.get_mut(*parent) {
				parent.children.remove(&key);
			}
		}

		for child in &links.children {
			if let Some(child) = topology.nodes.get_mut(*child) {
				child.parents.remove(&key);
			}
		}

		trace_edge!(
			?key,
			parents = links.parents.len(),
			children = links.children.len(),
			"detached"
		);
	}

	/// Records that `child` reads from `parent`. Returns `false` when either
	/// side is no longer part of the graph.
	pub(crate) fn link(&self, parent: NodeKey, child: NodeKey) -> bool {
		let mut topology = self.inner.topology.borrow_mut();
		let nodes = &mut topology.nodes;

		if !nodes.contains_key(parent) || !nodes.contains_key(child) {
			trace_edge!(?parent, ?child, "link refused; node gone");
			return false;
		}

		if let Some(links) = nodes.get_mut(parent) {
			links.children.insert(child);
		}
		if let Some(links) = nodes.get_mut(child) {
			links.parents.insert(parent);
		}

		trace_edge!(?parent, ?child, "linked");
		true
	}

	/// Forgets every parent of `child`, on both sides of each edge.
	pub(crate) fn unlink_parents(&self, child: NodeKey) {
		let mut topology = self.inner.topology.borrow_mut();
		let nodes = &mut topology.nodes;

		let parents = match nodes.get_mut(child) {
			Some(links) => std::mem::take(&mut links.parents),
			None => return,
		};

		for parent in &parents {
			if let Some(links) = nodes.get_mut(*parent) {
				links.children.remove(&child);
			}
		}

		trace_edge!(?child, count = parents.len(), "parents cleared");
	}

	/// Snapshot of the live children of `key`, safe to iterate while the
	/// graph is being mutated.
	pub(crate) fn children(&self, key: NodeKey) -> SmallVec<[Rc<dyn Dependent>; 4]> {
		let topology = self.inner.topology.borrow();
		let Some(links) = topology.nodes.get(key) else {
			return SmallVec::new();
		};

		links
			.children
			.iter()
			.filter_map(|child| topology.nodes.get(*child))
			.filter_map(|links| links.node.upgrade())
			.collect()
	}

	pub(crate) fn defer(&self, task: impl Future<Output = ()> + 'static) {
		self.inner.defer.defer(task.boxed_local());
	}
}

impl fmt::Debug for Graph {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Graph")
			.field("nodes", &self.len())
			.field("last_wave", &self.last_wave())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use std::cell::Cell;

	use futures::future::LocalBoxFuture;

	use super::*;

	struct Counter {
		hits: Cell<usize>,
	}

	impl Dependent for Counter {
		fn wave_hits(self: Rc<Self>, _: Wave) {
			self.hits.set(self.hits.get() + 1);
		}

		fn is_current(&self, _: Wave) -> bool {
			true
		}
	}

	struct Inline;

	impl Defer for Inline {
		fn defer(&self, _: LocalBoxFuture<'static, ()>) {}
	}

	fn counter(graph: &Graph) -> (Rc<Counter>, NodeKey) {
		let counter = Rc::new(Counter { hits: Cell::new(0) });
		let weak = Rc::downgrade(&counter) as Weak<dyn Dependent>;
		let key = graph.insert("counter", weak);
		(counter, key)
	}

	fn mirrored(graph: &Graph, keys: &[NodeKey]) -> bool {
		keys.iter().all(|key| {
			graph
				.parents_of(*key)
				.iter()
				.all(|parent| graph.children_of(*parent).contains(key))
				&& graph
					.children_of(*key)
					.iter()
					.all(|child| graph.parents_of(*child).contains(key))
		})
	}

	#[test]
	fn link_is_mirrored() {
		let graph = Graph::with_defer(Inline);
		let (_a, a) = counter(&graph);
		let (_b, b) = counter(&graph);
		let (_c, c) = counter(&graph);

		assert!(graph.link(a, c));
		assert!(graph.link(b, c));

		assert_eq!(graph.children_of(a), vec![c]);
		assert_eq!(graph.parents_of(c).len(), 2);
		assert!(mirrored(&graph, &[a, b, c]));

		graph.unlink_parents(c);
		assert!(graph.children_of(a).is_empty());
		assert!(graph.children_of(b).is_empty());
		assert!(graph.parents_of(c).is_empty());
	}

	#[test]
	fn removed_nodes_lose_every_edge() {
		let graph = Graph::with_defer(Inline);
		let (_a, a) = counter(&graph);
		let (_b, b) = counter(&graph);
		let (_c, c) = counter(&graph);

		graph.link(a, b);
		graph.link(b, c);
		graph.remove(b);

		assert!(!graph.contains(b));
		assert_eq!(graph.len(), 2);
		assert!(graph.children_of(a).is_empty());
		assert!(graph.parents_of(c).is_empty());

		assert!(!graph.link(b, c), "removed node must not regain edges");
		assert!(!graph.link(a, b));
		assert!(mirrored(&graph, &[a, c]));
	}

	#[test]
	fn children_snapshot_skips_dropped_nodes() {
		let graph = Graph::with_defer(Inline);
		let (_a, a) = counter(&graph);
		let (b_counter, b) = counter(&graph);
		let (c_counter, c) = counter(&graph);

		graph.link(a, b);
		graph.link(a, c);
		drop(c_counter);

		let children = graph.children(a);
		assert_eq!(children.len(), 1);
		for child in children {
			child.wave_hits(graph.next_wave());
		}
		assert_eq!(b_counter.hits.get(), 1);
	}

	#[test]
	fn identities_are_released_with_their_last_node() {
		let graph = Graph::with_defer(Inline);
		let (_a, a) = counter(&graph);
		let (_b, b) = counter(&graph);
		assert!(graph.has_id("counter"));

		graph.remove(a);
		assert!(graph.has_id("counter"));
		graph.remove(b);
		assert!(!graph.has_id("counter"));

		let mut candidates = ["counter", "counter", "fresh"].into_iter();
		let (_c, _) = counter(&graph);
		let id = graph.fresh_id(|| candidates.next().unwrap_or_default().to_owned());
		assert_eq!(id, "fresh");
	}
}
