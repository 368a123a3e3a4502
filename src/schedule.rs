use futures::future::LocalBoxFuture;

/// Runs a task after the current synchronous region has yielded.
///
/// Implementations must start deferred tasks in the order they were
/// handed in.
pub trait Defer {
	fn defer(&self, task: LocalBoxFuture<'static, ()>);
}

/// Defers onto the tokio [`LocalSet`](tokio::task::LocalSet) the caller is
/// running inside.
///
/// # Panics
///
/// Deferring outside of a `LocalSet` panics, as `spawn_local` does.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalSpawner;

impl Defer for LocalSpawner {
	fn defer(&self, task: LocalBoxFuture<'static, ()>) {
		tokio::task::spawn_local(task);
	}
}

#[cfg(test)]
mod tests {
	use std::cell::RefCell;
	use std::rc::Rc;

	use futures::FutureExt;
	use tokio::task::LocalSet;

	use super::*;

	#[tokio::test]
	async fn local_spawner_runs_after_yield_in_order() {
		LocalSet::new()
			.run_until(async {
				let seen = Rc::new(RefCell::new(Vec::new()));

				for n in 0..3 {
					let seen = seen.clone();
					LocalSpawner.defer(async move { seen.borrow_mut().push(n) }.boxed_local());
				}

				assert!(seen.borrow().is_empty());
				tokio::task::yield_now().await;
				tokio::task::yield_now().await;

				assert_eq!(*seen.borrow(), vec![0, 1, 2]);
			})
			.await;
	}
}
