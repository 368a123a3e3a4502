use std::cell::Cell;
use std::fmt;

/// Identifier of one propagation event and the recomputations it causes.
///
/// Waves are totally ordered: a wave issued later by the same counter
/// compares greater, which is what lets an in-flight recomputation notice
/// it has been superseded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Wave(u64);

impl Wave {
	pub fn get(self) -> u64 {
		self.0
	}
}

impl fmt::Display for Wave {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "w{}", self.0)
	}
}

/// Monotonic source of [`Wave`] ids, owned by a [`Graph`](crate::Graph).
#[derive(Debug, Default)]
pub struct WaveCounter {
	last: Cell<u64>,
}

impl WaveCounter {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn next(&self) -> Wave {
		let next = self.last.get() + 1;
		self.last.set(next);
		Wave(next)
	}

	/// The most recently issued wave, if any.
	pub fn last(&self) -> Option<Wave> {
		match self.last.get() {
			0 => None,
			last => Some(Wave(last)),
		}
	}
}
