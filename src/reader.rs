use std::rc::Weak;

use thiserror::Error;

use crate::error::CellError;
use crate::graph::{Graph, NodeKey};
use crate::node::Node;
use crate::trace::trace_update;
use crate::wave::Wave;
use crate::Dependent;

/// Read capability handed to a derivation for one wave.
///
/// Every read records the parent as a dependency of the deriving node and
/// waits for the parent to settle.
pub struct Reader {
	node: Weak<dyn Dependent>,
	id: String,
	key: NodeKey,
	wave: Wave,
	graph: Graph,
}

impl Reader {
	pub(crate) fn new(
		node: Weak<dyn Dependent>,
		id: String,
		key: NodeKey,
		wave: Wave,
		graph: Graph,
	) -> Self {
		Reader {
			node,
			id,
			key,
			wave,
			graph,
		}
	}

	/// The wave this recomputation runs for.
	pub fn wave(&self) -> Wave {
		self.wave
	}

	/// Reads `parent` once it has settled.
	///
	/// Fails with the parent's stored error, with
	/// [`CellError::NodeDestroyed`] if the parent goes away first, with
	/// [`CellError::ForeignNode`] if it lives in another graph, or with a
	/// supersession signal that quietly ends the recomputation when a newer
	/// wave has reached the deriving node.
	pub async fn get<U>(&self, parent: &Node<U>) -> Result<U, ReadError>
	where
		U: Clone + 'static,
	{
		self.ensure_current("before read")?;
		if !self.graph.same(parent.graph()) {
			trace_update!(self.id, self.wave, parent = parent.id(), "read from another graph");
			return Err(CellError::ForeignNode(parent.id().to_owned()).into());
		}
		self.graph.link(parent.key(), self.key);

		let outcome = parent.get_when_ready().await;

		self.ensure_current("after read")?;
		Ok(outcome?)
	}

	fn ensure_current(&self, at: &'static str) -> Result<(), ReadError> {
		let current = self
			.node
			.upgrade()
			.map_or(false, |node| node.is_current(self.wave));

		if current {
			Ok(())
		} else {
			trace_update!(self.id, self.wave, at, "became stale");
			Err(ReadError(Reason::Superseded))
		}
	}
}

/// Failure of a derivation.
///
/// Wraps the [`CellError`] to store on the node. A recomputation abandoned
/// because a newer wave superseded it also unwinds through this type; that
/// case is never stored or reported.
#[derive(Debug, Clone, Error)]
#[error(transparent)]
pub struct ReadError(Reason);

#[derive(Debug, Clone, Error)]
enum Reason {
	#[error("recomputation superseded by a newer wave")]
	Superseded,
	#[error(transparent)]
	Cell(CellError),
}

impl ReadError {
	pub fn is_superseded(&self) -> bool {
		matches!(self.0, Reason::Superseded)
	}

	/// The error to store, or `None` for a superseded recomputation.
	pub fn into_cell_error(self) -> Option<CellError> {
		match self.0 {
			Reason::Superseded => None,
			Reason::Cell(err) => Some(err),
		}
	}
}

impl From<CellError> for ReadError {
	fn from(err: CellError) -> Self {
		ReadError(Reason::Cell(err))
	}
}

impl From<anyhow::Error> for ReadError {
	fn from(err: anyhow::Error) -> Self {
		ReadError(Reason::Cell(err.into()))
	}
}
