use std::cell::RefCell;
use std::fmt;
use std::mem;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;
use tokio::sync::oneshot;

use crate::error::CellError;
use crate::graph::{Graph, NodeKey};
use crate::observers::{ObserverKind, Observers, Subscription, Unsubscribe};
use crate::reader::Reader;
use crate::rule::Rule;
use crate::trace::{trace_api, trace_update, trace_wave};
use crate::wave::Wave;
use crate::Dependent;

type Outcome<T> = Result<T, CellError>;

/// A cell of the graph: either a constant or an async derivation of other
/// nodes.
///
/// Every node starts stale and settles once its first wave has run, which
/// happens after the constructing code yields. Handles are cheap to clone
/// and all clones refer to the same node.
pub struct Node<T>
where
	T: Clone + 'static,
{
	body: Rc<NodeBody<T>>,
}

pub(crate) struct NodeBody<T>
where
	T: Clone + 'static,
{
	id: String,
	key: NodeKey,
	graph: Graph,
	inner: RefCell<NodeInner<T>>,
}

struct NodeInner<T>
where
	T: Clone + 'static,
{
	rule: Rule<T>,
	/// Last committed value or error. Kept while stale.
	outcome: Option<Outcome<T>>,
	/// `Some` while stale.
	generation: Option<Wave>,
	waiters: SmallVec<[oneshot::Sender<Outcome<T>>; 2]>,
	observers: Observers<T>,
	destroyed: bool,
}

fn generate_id() -> String {
	static NEXT_ID: AtomicU64 = AtomicU64::new(0);
	format!("node:{}", NEXT_ID.fetch_add(1, Ordering::Relaxed))
}

impl<T> Clone for Node<T>
where
	T: Clone + 'static,
{
	fn clone(&self) -> Self {
		Self {
			body: self.body.clone(),
		}
	}
}

impl<T> Node<T>
where
	T: Clone + 'static,
{
	/// Creates a node with a generated identity and starts its first wave.
	///
	/// Generated identities skip any identity a live node of `graph`
	/// already has.
	pub fn new(graph: &Graph, rule: impl Into<Rule<T>>) -> Self {
		Self::named(graph, graph.fresh_id(generate_id), rule)
	}

	/// Creates a node with a caller-chosen identity and starts its first wave.
	pub fn named(graph: &Graph, id: impl Into<String>, rule: impl Into<Rule<T>>) -> Self {
		let id = id.into();
		let rule = rule.into();
		trace_api!(id, constant = rule.is_constant(), "construct");

		let body = Rc::new_cyclic(|this: &Weak<NodeBody<T>>| NodeBody {
			key: graph.insert(&id, this.clone() as Weak<dyn Dependent>),
			id,
			graph: graph.clone(),
			inner: RefCell::new(NodeInner::new(rule)),
		});

		body.start_wave();
		Node { body }
	}

	pub fn id(&self) -> &str {
		&self.body.id
	}

	pub fn key(&self) -> NodeKey {
		self.body.key
	}

	pub fn graph(&self) -> &Graph {
		&self.body.graph
	}

	/// Replaces the value or derivation and starts a new wave.
	pub fn set(&self, rule: impl Into<Rule<T>>) -> Result<(), CellError> {
		let rule = rule.into();
		trace_api!(self.body.id, constant = rule.is_constant(), "set");

		{
			let mut inner = self.body.inner.borrow_mut();
			if inner.destroyed {
				return Err(self.body.used_after_destroy());
			}
			inner.assign(rule);
		}

		self.body.start_wave();
		Ok(())
	}

	/// The last committed value, without waiting.
	///
	/// Returns `Ok(None)` while a derived node has not committed anything
	/// yet, and the stored error if the last wave failed. A stale node
	/// keeps answering with its previous outcome.
	pub fn get_now(&self) -> Result<Option<T>, CellError> {
		trace_api!(self.body.id, "get_now");
		let inner = self.body.inner.borrow();
		if inner.destroyed {
			return Err(self.body.used_after_destroy());
		}

		match &inner.outcome {
			None => Ok(None),
			Some(Ok(value)) => Ok(Some(value.clone())),
			Some(Err(err)) => Err(err.clone()),
		}
	}

	/// The value of the next settlement, or the current one if settled.
	///
	/// Waits across superseded waves until one commits. Fails with
	/// [`CellError::NodeDestroyed`] if the node is destroyed meanwhile.
	pub async fn get_when_ready(&self) -> Result<T, CellError> {
		let receiver = {
			let mut inner = self.body.inner.borrow_mut();
			if inner.destroyed {
				trace_api!(self.body.id, "get_when_ready on destroyed node");
				return Err(self.body.used_after_destroy());
			}

			if let (None, Some(outcome)) = (inner.generation, &inner.outcome) {
				trace_api!(self.body.id, "get_when_ready: ready");
				return outcome.clone();
			}

			trace_api!(self.body.id, "get_when_ready: queueing waiter");
			let (sender, receiver) = oneshot::channel();
			inner.waiters.push(sender);
			receiver
		};

		match receiver.await {
			Ok(outcome) => outcome,
			Err(_) => Err(CellError::NodeDestroyed(self.body.id.clone())),
		}
	}

	pub fn is_ready(&self) -> Result<bool, CellError> {
		let inner = self.body.inner.borrow();
		if inner.destroyed {
			return Err(self.body.used_after_destroy());
		}
		Ok(inner.generation.is_none())
	}

	pub fn is_destroyed(&self) -> bool {
		self.body.inner.borrow().destroyed
	}

	/// Calls `callback` with every committed value.
	pub fn on_change(&self, callback: impl Fn(&T) + 'static) -> Result<Subscription, CellError> {
		trace_api!(self.body.id, "on_change");
		let mut inner = self.body.inner.borrow_mut();
		if inner.destroyed {
			return Err(self.body.used_after_destroy());
		}
		let token = inner.observers.change.insert(Rc::new(callback));
		Ok(self.subscription(ObserverKind::Change, token))
	}

	/// Calls `callback` with every committed error.
	pub fn on_error(
		&self,
		callback: impl Fn(&CellError) + 'static,
	) -> Result<Subscription, CellError> {
		trace_api!(self.body.id, "on_error");
		let mut inner = self.body.inner.borrow_mut();
		if inner.destroyed {
			return Err(self.body.used_after_destroy());
		}
		let token = inner.observers.error.insert(Rc::new(callback));
		Ok(self.subscription(ObserverKind::Error, token))
	}

	/// Calls `callback` each time the node goes from settled to stale.
	pub fn on_stale(&self, callback: impl Fn() + 'static) -> Result<Subscription, CellError> {
		trace_api!(self.body.id, "on_stale");
		let mut inner = self.body.inner.borrow_mut();
		if inner.destroyed {
			return Err(self.body.used_after_destroy());
		}
		let token = inner.observers.stale.insert(Rc::new(callback));
		Ok(self.subscription(ObserverKind::Stale, token))
	}

	/// Calls `callback` once when the node is destroyed. On an already
	/// destroyed node the callback is deferred and runs once.
	pub fn on_destroy(&self, callback: impl FnOnce() + 'static) -> Subscription {
		trace_api!(self.body.id, "on_destroy");
		let mut inner = self.body.inner.borrow_mut();
		if inner.destroyed {
			drop(inner);
			self.body.graph.defer(async move { callback() });
			return Subscription::detached(ObserverKind::Destroy);
		}
		let token = inner.observers.destroy.insert(Box::new(callback));
		self.subscription(ObserverKind::Destroy, token)
	}

	/// Tears the node down. Idempotent.
	pub fn destroy(&self) {
		trace_api!(self.body.id, "destroy");
		self.body.destroy();
	}

	fn subscription(&self, kind: ObserverKind, token: u64) -> Subscription {
		let target = Rc::downgrade(&self.body) as Weak<dyn Unsubscribe>;
		Subscription::new(target, kind, token)
	}
}

impl<T> NodeInner<T>
where
	T: Clone + 'static,
{
	fn new(rule: Rule<T>) -> Self {
		NodeInner {
			outcome: Self::outcome_of(&rule),
			rule,
			generation: None,
			waiters: SmallVec::new(),
			observers: Observers::default(),
			destroyed: false,
		}
	}

	/// A constant is visible to `get_now` right away; a derivation drops the
	/// previous outcome until it commits.
	fn assign(&mut self, rule: Rule<T>) {
		self.outcome = Self::outcome_of(&rule);
		self.rule = rule;
	}

	fn outcome_of(rule: &Rule<T>) -> Option<Outcome<T>> {
		match rule {
			Rule::Constant(value) => Some(Ok(value.clone())),
			Rule::Derive(_) => None,
		}
	}

	fn is_current(&self, wave: Wave) -> bool {
		!self.destroyed && self.generation == Some(wave)
	}
}

impl<T> NodeBody<T>
where
	T: Clone + 'static,
{
	fn used_after_destroy(&self) -> CellError {
		CellError::UseAfterDestroy(self.id.clone())
	}

	fn start_wave(self: &Rc<Self>) {
		let wave = self.graph.next_wave();
		trace_wave!(self.id, wave, "starting wave");
		self.hit(wave);
	}

	/// Marks this node and everything downstream stale under `wave`, then
	/// defers the recomputation. Runs to completion without yielding.
	fn hit(self: &Rc<Self>, wave: Wave) {
		let was_ready = {
			let mut inner = self.inner.borrow_mut();
			if inner.destroyed {
				return;
			}
			// Reached twice in one wave, or a newer wave got here first.
			if inner.generation.is_some_and(|current| current >= wave) {
				trace_wave!(self.id, wave, "already processing this wave");
				return;
			}

			let was_ready = inner.generation.is_none();
			inner.generation = Some(wave);
			was_ready
		};

		if was_ready {
			let callbacks = self.inner.borrow().observers.stale.snapshot();
			trace_wave!(self.id, wave, count = callbacks.len(), "became stale");
			for callback in callbacks {
				callback();
			}
		}

		for child in self.graph.children(self.key) {
			child.wave_hits(wave);
		}

		trace_wave!(self.id, wave, "queueing recomputation");
		self.graph.defer(self.clone().update(wave));
	}

	async fn update(self: Rc<Self>, wave: Wave) {
		let rule = {
			let inner = self.inner.borrow();
			if !inner.is_current(wave) {
				trace_update!(self.id, wave, "obsolete wave; quitting");
				return;
			}
			inner.rule.clone()
		};

		// Dependencies are rediscovered by every run.
		self.graph.unlink_parents(self.key);

		let outcome = match rule {
			Rule::Constant(value) => {
				trace_update!(self.id, wave, "constant; finishing right away");
				Ok(value)
			}
			Rule::Derive(derivation) => {
				trace_update!(self.id, wave, "running derivation");
				let reader = Reader::new(
					Rc::downgrade(&self) as Weak<dyn Dependent>,
					self.id.clone(),
					self.key,
					wave,
					self.graph.clone(),
				);

				match derivation.call(reader).await {
					Ok(value) => Ok(value),
					Err(err) => match err.into_cell_error() {
						Some(err) => {
							trace_update!(self.id, wave, error = %err, "derivation failed");
							Err(err)
						}
						None => {
							trace_update!(self.id, wave, "superseded; quitting");
							return;
						}
					},
				}
			}
		};

		self.finish_wave(wave, outcome);
	}

	/// The single place where a settled outcome becomes visible.
	fn finish_wave(&self, wave: Wave, outcome: Outcome<T>) {
		let (waiters, changed, failed) = {
			let mut inner = self.inner.borrow_mut();
			if !inner.is_current(wave) {
				trace_wave!(self.id, wave, "obsolete wave; discarding outcome");
				return;
			}

			inner.outcome = Some(outcome.clone());
			inner.generation = None;

			let waiters = mem::take(&mut inner.waiters);
			let (changed, failed) = match outcome {
				Ok(_) => (inner.observers.change.snapshot(), SmallVec::new()),
				Err(_) => (SmallVec::new(), inner.observers.error.snapshot()),
			};
			(waiters, changed, failed)
		};

		trace_wave!(
			self.id,
			wave,
			ok = outcome.is_ok(),
			waiters = waiters.len(),
			"settled"
		);

		for waiter in waiters {
			let _ = waiter.send(outcome.clone());
		}

		match &outcome {
			Ok(value) => changed.iter().for_each(|callback| callback(value)),
			Err(err) => failed.iter().for_each(|callback| callback(err)),
		}
	}

	fn destroy(&self) {
		let (waiters, on_destroy) = {
			let mut inner = self.inner.borrow_mut();
			if inner.destroyed {
				return;
			}

			inner.destroyed = true;
			inner.outcome = None;
			inner.generation = None;
			(mem::take(&mut inner.waiters), inner.observers.clear())
		};

		self.graph.remove(self.key);

		for waiter in waiters {
			let _ = waiter.send(Err(CellError::NodeDestroyed(self.id.clone())));
		}

		for callback in on_destroy {
			callback();
		}
	}
}

impl<T> Dependent for NodeBody<T>
where
	T: Clone + 'static,
{
	fn wave_hits(self: Rc<Self>, wave: Wave) {
		self.hit(wave);
	}

	fn is_current(&self, wave: Wave) -> bool {
		self.inner.borrow().is_current(wave)
	}
}

impl<T> Unsubscribe for NodeBody<T>
where
	T: Clone + 'static,
{
	fn unsubscribe(&self, kind: ObserverKind, token: u64) {
		if self.inner.borrow_mut().observers.remove(kind, token) {
			trace_api!(self.id, ?kind, "unsubscribed");
		}
	}
}

impl<T> Drop for NodeBody<T>
where
	T: Clone + 'static,
{
	fn drop(&mut self) {
		self.graph.remove(self.key);
	}
}

impl<T> fmt::Debug for Node<T>
where
	T: Clone + fmt::Debug + 'static,
{
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let inner = self.body.inner.borrow();
		f.debug_struct("Node")
			.field("id", &self.body.id)
			.field("generation", &inner.generation)
			.field("outcome", &inner.outcome)
			.field("destroyed", &inner.destroyed)
			.field("waiters", &inner.waiters.len())
			.field("observers", &inner.observers.len())
			.finish()
	}
}
