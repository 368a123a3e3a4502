use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use crate::error::CellError;

pub(crate) type ChangeFn<T> = Rc<dyn Fn(&T)>;
pub(crate) type ErrorFn = Rc<dyn Fn(&CellError)>;
pub(crate) type StaleFn = Rc<dyn Fn()>;
pub(crate) type DestroyFn = Box<dyn FnOnce()>;

/// Which registry a [`Subscription`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverKind {
	Change,
	Error,
	Stale,
	Destroy,
}

/// Callbacks keyed by the token handed out on registration, in
/// registration order.
pub(crate) struct Registry<E> {
	next: u64,
	entries: BTreeMap<u64, E>,
}

impl<E> Default for Registry<E> {
	fn default() -> Self {
		Registry {
			next: 0,
			entries: BTreeMap::new(),
		}
	}
}

impl<E> Registry<E> {
	pub fn insert(&mut self, entry: E) -> u64 {
		let token = self.next;
		self.next += 1;
		self.entries.insert(token, entry);
		token
	}

	pub fn remove(&mut self, token: u64) -> bool {
		self.entries.remove(&token).is_some()
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn drain(&mut self) -> impl Iterator<Item = E> {
		std::mem::take(&mut self.entries).into_values()
	}
}

impl<E: Clone> Registry<E> {
	/// Copies the current callbacks out so they can run without the
	/// registry borrowed.
	pub fn snapshot(&self) -> SmallVec<[E; 4]> {
		self.entries.values().cloned().collect()
	}
}

pub(crate) struct Observers<T> {
	pub change: Registry<ChangeFn<T>>,
	pub error: Registry<ErrorFn>,
	pub stale: Registry<StaleFn>,
	pub destroy: Registry<DestroyFn>,
}

impl<T> Default for Observers<T> {
	fn default() -> Self {
		Observers {
			change: Registry::default(),
			error: Registry::default(),
			stale: Registry::default(),
			destroy: Registry::default(),
		}
	}
}

impl<T> Observers<T> {
	pub fn remove(&mut self, kind: ObserverKind, token: u64) -> bool {
		match kind {
			ObserverKind::Change => self.change.remove(token),
			ObserverKind::Error => self.error.remove(token),
			ObserverKind::Stale => self.stale.remove(token),
			ObserverKind::Destroy => self.destroy.remove(token),
		}
	}

	pub fn len(&self) -> usize {
		self.change.len() + self.error.len() + self.stale.len() + self.destroy.len()
	}

	/// Empties every registry, handing back the destroy callbacks.
	pub fn clear(&mut self) -> Vec<DestroyFn> {
		self.change.drain().for_each(drop);
		self.error.drain().for_each(drop);
		self.stale.drain().for_each(drop);
		self.destroy.drain().collect()
	}
}

pub(crate) trait Unsubscribe {
	fn unsubscribe(&self, kind: ObserverKind, token: u64);
}

/// Registration handle returned by the `on_*` methods of a node.
///
/// Dropping it keeps the callback registered; call
/// [`unsubscribe`](Subscription::unsubscribe) to remove it.
pub struct Subscription {
	target: Option<Weak<dyn Unsubscribe>>,
	kind: ObserverKind,
	token: u64,
}

impl Subscription {
	pub(crate) fn new(target: Weak<dyn Unsubscribe>, kind: ObserverKind, token: u64) -> Self {
		Subscription {
			target: Some(target),
			kind,
			token,
		}
	}

	/// A handle whose `unsubscribe` does nothing.
	pub(crate) fn detached(kind: ObserverKind) -> Self {
		Subscription {
			target: None,
			kind,
			token: 0,
		}
	}

	pub fn kind(&self) -> ObserverKind {
		self.kind
	}

	/// Removes the callback. Calling it again, or after the node is gone,
	/// has no effect.
	pub fn unsubscribe(&self) {
		if let Some(target) = self.target.as_ref().and_then(Weak::upgrade) {
			target.unsubscribe(self.kind, self.token);
		}
	}
}

impl fmt::Debug for Subscription {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Subscription")
			.field("kind", &self.kind)
			.field("token", &self.token)
			.finish()
	}
}
