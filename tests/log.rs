use std::cell::RefCell;
use std::fmt::Display;
use std::rc::Rc;
use std::time::Duration;

use cellwave::{CellError, Node};

/// Ordered record of everything the callbacks under test observed, checked
/// against the expected sequence built up alongside it.
#[derive(Clone, Default)]
pub struct EventLog(Rc<RefCell<Entries>>);

#[derive(Default)]
struct Entries {
	actual: Vec<String>,
	expected: Vec<String>,
}

impl EventLog {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn log(&self, event: impl Into<String>) {
		let event = event.into();
		tracing::debug!(target: "cellwave::test", %event, "observed");
		self.0.borrow_mut().actual.push(event);
	}

	pub fn expect(&self, event: impl Into<String>) {
		self.0.borrow_mut().expected.push(event.into());
	}

	/// Logged on both sides, so a mismatch shows where in the test it
	/// happened.
	pub fn marker(&self, label: impl Display) {
		let marker = format!("-- {label} --");
		self.expect(marker.clone());
		self.log(marker);
	}

	/// Lets the clock run `ms` forward. Pending recomputations get to run.
	pub async fn sleep(&self, ms: u64) {
		tokio::time::sleep(Duration::from_millis(ms)).await;
		self.marker(format_args!("slept {ms}ms"));
	}

	pub fn verify(&self) {
		let entries = self.0.borrow();
		assert_eq!(entries.actual, entries.expected);
	}

	pub fn changes<T>(&self, node: &Node<T>) -> impl Fn(&T) + 'static
	where
		T: Clone + Display + 'static,
	{
		self.changes_as(node, node.id())
	}

	/// Like [`changes`](Self::changes), for a second observer on the same
	/// node.
	pub fn changes_as<T>(&self, _: &Node<T>, label: &str) -> impl Fn(&T) + 'static
	where
		T: Clone + Display + 'static,
	{
		let log = self.clone();
		let label = label.to_string();
		move |value| log.log(format!("{label} -> {value}"))
	}

	pub fn failures<T: Clone + 'static>(&self, node: &Node<T>) -> impl Fn(&CellError) + 'static {
		let log = self.clone();
		let label = node.id().to_string();
		move |err| log.log(format!("{label} !! {err}"))
	}

	pub fn stales<T: Clone + 'static>(&self, node: &Node<T>) -> impl Fn() + 'static {
		let log = self.clone();
		let label = node.id().to_string();
		move || log.log(format!("{label} stale"))
	}
}
