//! Wires a few name cells together and rewires one of them while running.
//!
//! Run with `RUST_LOG=cellwave=trace` to follow every wave.

use cellwave::{derived, CellError, Graph, Node};
use tokio::task::LocalSet;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), CellError> {
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::from_default_env())
		.init();

	LocalSet::new().run_until(run()).await
}

async fn run() -> Result<(), CellError> {
	let graph = Graph::new();

	let first = Node::<String>::named(&graph, "firstName", "Ada");
	let last = Node::<String>::named(&graph, "lastName", "Lovelace");
	let full = Node::named(
		&graph,
		"fullName",
		derived!((first, last) r => Ok(format!("{} {}", r.get(&first).await?, r.get(&last).await?))),
	);

	full.on_stale(|| println!("fullName is stale"))?;
	full.on_change(|name| println!("fullName changed: {name}"))?;

	println!("fullName: {}", full.get_when_ready().await?);

	first.set("Augusta Ada")?;
	println!("ready right after set: {}", full.is_ready()?);
	println!("fullName: {}", full.get_when_ready().await?);

	let middle = Node::<String>::named(&graph, "middleName", "King");
	full.set(derived!((first, middle, last) r => {
		Ok(format!(
			"{} {} {}",
			r.get(&first).await?,
			r.get(&middle).await?,
			r.get(&last).await?
		))
	}))?;
	println!("fullName: {}", full.get_when_ready().await?);

	middle.set("Byron King")?;
	println!("fullName: {}", full.get_when_ready().await?);

	full.on_destroy(|| println!("fullName destroyed"));
	full.destroy();
	println!("{:?}", graph);

	Ok(())
}
