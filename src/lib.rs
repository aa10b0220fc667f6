//! Wengert-list recording and replay engine for reverse-mode automatic
//! differentiation.
//!
//! A [`tape::Tape`] is an append-only log of heterogeneous, variable-sized
//! operation records, bump-allocated backward into chained arena segments
//! and replayed in exact reverse push order. The tape never interprets
//! record contents; differentiation operators construct record types and
//! push them, then drive the backward pass through [`tape::Tape::propagate`]
//! or plain iteration.

#![no_std]
#[cfg(feature = "std")]
extern crate std;

extern crate alloc;

pub(crate) mod compat;
pub mod error;
pub mod prelude;
pub mod tape;
