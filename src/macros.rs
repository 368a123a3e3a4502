pub use enclose::*;

/// Builds a [`Rule::Derive`](crate::Rule::Derive), cloning the listed node
/// handles into every run of the derivation.
///
/// ```rust,ignore
/// let full = Node::new(&graph, derived!((first, last) r => {
/// 	Ok(format!("{} {}", r.get(&first).await?, r.get(&last).await?))
/// }));
/// ```
#[macro_export]
macro_rules! derived {
	(( $($capture:ident),* $(,)? ) $reader:ident => $($b:tt)*) => {
		$crate::Rule::derive($crate::macros::enclose!(($( $capture ),*) move |$reader: $crate::Reader| {
			$crate::macros::enclose!(($( $capture ),*) async move { $($b)* })
		}))
	};
	($reader:ident => $($b:tt)*) => {
		$crate::Rule::derive(move |$reader: $crate::Reader| async move { $($b)* })
	};
}
