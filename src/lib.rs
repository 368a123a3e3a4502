pub mod macros;
pub mod trace;

mod error;
mod graph;
mod node;
mod observers;
mod reader;
mod rule;
mod schedule;
mod wave;

use std::rc::Rc;

pub use error::CellError;
pub use graph::{Graph, NodeKey};
pub use node::Node;
pub use observers::{ObserverKind, Subscription};
pub use reader::{ReadError, Reader};
pub use rule::{Derivation, Rule};
pub use schedule::{Defer, LocalSpawner};
pub use wave::{Wave, WaveCounter};

/// Type-erased view of a node that other nodes can reach through the graph.
pub(crate) trait Dependent: 'static {
	/// A wave reached this node, either from its own `set` or from a parent.
	fn wave_hits(self: Rc<Self>, wave: Wave);

	/// Whether a recomputation started for `wave` may still commit.
	fn is_current(&self, wave: Wave) -> bool;
}
