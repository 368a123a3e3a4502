use std::fmt::{Debug, Display};
use std::rc::Rc;

use thiserror::Error;

/// Failure reported by a node operation or stored as a node's settled state.
#[derive(Debug, Clone, Error)]
pub enum CellError {
	/// A public operation was invoked on a destroyed node.
	#[error("node `{0}` was used after being destroyed")]
	UseAfterDestroy(String),

	/// The awaited node was destroyed before it settled.
	#[error("node `{0}` was destroyed before it settled")]
	NodeDestroyed(String),

	/// A derivation read a node that belongs to a different [`Graph`](crate::Graph).
	#[error("node `{0}` belongs to a different graph")]
	ForeignNode(String),

	/// A derivation failed. Shared so that one failure can reach every
	/// waiter, observer and dependent.
	#[error("{0}")]
	Failed(Rc<anyhow::Error>),
}

impl CellError {
	pub fn failed(err: impl Into<anyhow::Error>) -> Self {
		CellError::Failed(Rc::new(err.into()))
	}

	pub fn msg<M>(message: M) -> Self
	where
		M: Display + Debug + Send + Sync + 'static,
	{
		CellError::Failed(Rc::new(anyhow::Error::msg(message)))
	}

	pub fn is_destroyed(&self) -> bool {
		matches!(
			self,
			CellError::UseAfterDestroy(_) | CellError::NodeDestroyed(_)
		)
	}
}

impl From<anyhow::Error> for CellError {
	fn from(err: anyhow::Error) -> Self {
		CellError::Failed(Rc::new(err))
	}
}
