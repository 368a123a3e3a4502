//! Diagnostic sinks.
//!
//! Every sink is a `tracing` target, so each one can be switched on by
//! itself through the subscriber filter, e.g.
//! `RUST_LOG=cellwave::wave=trace,cellwave::update=trace`. With no
//! subscriber installed they cost a level check and nothing else.

/// Construction and every public call.
pub const API: &str = "cellwave::api";

/// Edge creation and removal.
pub const EDGE: &str = "cellwave::edge";

/// Wave start, propagation, commit and discard.
pub const WAVE: &str = "cellwave::wave";

/// Recomputation tasks.
pub const UPDATE: &str = "cellwave::update";

macro_rules! trace_api {
	($node:expr, $($arg:tt)+) => {
		::tracing::trace!(target: $crate::trace::API, node = %$node, $($arg)+)
	};
}

macro_rules! trace_edge {
	($($arg:tt)+) => {
		::tracing::trace!(target: $crate::trace::EDGE, $($arg)+)
	};
}

macro_rules! trace_wave {
	($node:expr, $wave:expr, $($arg:tt)+) => {
		::tracing::trace!(target: $crate::trace::WAVE, node = %$node, wave = %$wave, $($arg)+)
	};
}

macro_rules! trace_update {
	($node:expr, $wave:expr, $($arg:tt)+) => {
		::tracing::trace!(target: $crate::trace::UPDATE, node = %$node, wave = %$wave, $($arg)+)
	};
}

pub(crate) use {trace_api, trace_edge, trace_update, trace_wave};
