use std::fmt;
use std::future::Future;
use std::rc::Rc;

use futures::future::LocalBoxFuture;
use futures::FutureExt;

use crate::reader::{ReadError, Reader};

type DeriveFn<T> = dyn Fn(Reader) -> LocalBoxFuture<'static, Result<T, ReadError>>;

/// How a node obtains its value.
pub enum Rule<T> {
	/// A fixed value, committed as soon as the node's wave runs.
	Constant(T),
	/// An asynchronous function of other nodes.
	Derive(Derivation<T>),
}

/// Shared derivation function of a [`Rule::Derive`] node.
pub struct Derivation<T> {
	func: Rc<DeriveFn<T>>,
}

impl<T: 'static> Rule<T> {
	/// Wraps an async function that reads its inputs through the [`Reader`].
	///
	/// ```rust,ignore
	/// let full = Node::new(&graph, Rule::derive({
	/// 	let (first, last) = (first.clone(), last.clone());
	/// 	move |r| {
	/// 		let (first, last) = (first.clone(), last.clone());
	/// 		async move { Ok(format!("{} {}", r.get(&first).await?, r.get(&last).await?)) }
	/// 	}
	/// }));
	/// ```
	pub fn derive<F, Fut>(func: F) -> Self
	where
		F: Fn(Reader) -> Fut + 'static,
		Fut: Future<Output = Result<T, ReadError>> + 'static,
	{
		let func: Rc<DeriveFn<T>> = Rc::new(move |reader| func(reader).boxed_local());
		Rule::Derive(Derivation { func })
	}

	pub fn is_constant(&self) -> bool {
		matches!(self, Rule::Constant(_))
	}
}

impl<T> Derivation<T> {
	pub(crate) fn call(&self, reader: Reader) -> LocalBoxFuture<'static, Result<T, ReadError>> {
		(self.func)(reader)
	}
}

impl<T> Clone for Derivation<T> {
	fn clone(&self) -> Self {
		Self {
			func: self.func.clone(),
		}
	}
}

impl<T: Clone> Clone for Rule<T> {
	fn clone(&self) -> Self {
		match self {
			Rule::Constant(value) => Rule::Constant(value.clone()),
			Rule::Derive(derivation) => Rule::Derive(derivation.clone()),
		}
	}
}

// Concrete types only. A blanket `From<T>` leaves `impl Into<Rule<T>>`
// arguments that already are rules ambiguous. Anything else goes through
// `Rule::Constant`.
macro_rules! constant_from {
	($($ty:ty),* $(,)?) => {
		$(
			impl From<$ty> for Rule<$ty> {
				fn from(value: $ty) -> Self {
					Rule::Constant(value)
				}
			}
		)*
	};
}

constant_from!(
	bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64,
	String, (),
);

impl From<&str> for Rule<String> {
	fn from(value: &str) -> Self {
		Rule::Constant(value.to_owned())
	}
}

impl<T: fmt::Debug> fmt::Debug for Rule<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Rule::Constant(value) => f.debug_tuple("Constant").field(value).finish(),
			Rule::Derive(_) => f.write_str("Derive(..)"),
		}
	}
}
