//! The tape: an append-only Wengert list replayed in reverse.
//!
//! Pushing places records contiguously and backward into the current arena
//! segment; when a segment fills up, a larger one is chained in front of it
//! through a link record, so one forward walk from the newest record visits
//! every record in exact reverse push order across all segments.

mod iter;
pub mod record;
pub(crate) mod segment;

use crate::compat::*;
use crate::error::{WengertError, WengertResult};
use core::cmp;
use core::mem;

pub use iter::Records;
pub use record::{Propagate, RecordKind, RecordRef, RECORD_ALIGNMENT};

use record::{seed_slot, LeafRecord};
use segment::Segment;

/// Default lower bound on the size of a freshly grown segment, in bytes.
pub const MINIMUM_SEGMENT_SIZE: usize = 65536;

/// Per-tape tuning. Carried by value so differently tuned tapes coexist in
/// one process.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TapeConfig {
    /// Every grown segment is at least this many bytes, so this trades
    /// memory slack against growth frequency.
    pub min_segment_size: usize,
}

impl TapeConfig {
    pub fn new(min_segment_size: usize) -> Self {
        Self { min_segment_size }
    }
}

impl Default for TapeConfig {
    fn default() -> Self {
        Self {
            min_segment_size: MINIMUM_SEGMENT_SIZE,
        }
    }
}

/// Append-only log of operation records, replayed most-recent-first.
///
/// `A` is the activation context threaded through every record's replay
/// callback; the tape itself never touches it. A tape is single-writer and
/// single-replayer by design: it holds raw pointers into its own segments
/// and is deliberately neither `Send` nor `Sync`.
pub struct Tape<A: 'static> {
    segment: Segment<A>,
    activations: usize,
    config: TapeConfig,
}

impl<A: 'static> Tape<A> {
    /// An empty tape with the default configuration. No memory is
    /// allocated until the first push.
    pub fn new() -> Self {
        Self {
            segment: Segment::empty(),
            activations: 0,
            config: TapeConfig::default(),
        }
    }

    pub fn with_config(config: TapeConfig) -> WengertResult<Self> {
        if config.min_segment_size == 0 {
            return Err(WengertError::InvalidMinimumSegmentSize(0));
        }
        Ok(Self {
            segment: Segment::empty(),
            activations: 0,
            config,
        })
    }

    pub fn config(&self) -> TapeConfig {
        self.config
    }

    /// Total adjoint slots declared by every record pushed so far.
    /// Advisory bookkeeping: callers size their external adjoint buffer
    /// with it, the tape never reads or writes that buffer.
    pub fn activations(&self) -> usize {
        self.activations
    }

    /// True until the first push.
    pub fn is_empty(&self) -> bool {
        self.segment.is_unallocated()
    }

    /// Append a record. If the current segment is exhausted, a larger one
    /// sized to guarantee room is chained in front and the placement is
    /// retried; that retry cannot fail. Returns the record in place so the
    /// caller can finish wiring it up.
    pub fn push<U: Propagate<A>>(&mut self, record: U) -> &mut U {
        let vtable = <U as LeafRecord<A>>::VTABLE;
        let record = match self.segment.place(vtable, record) {
            Ok(placed) => placed,
            Err(record) => {
                self.grow(vtable.slot_size);
                match self.segment.place(vtable, record) {
                    Ok(placed) => placed,
                    Err(_) => {
                        unreachable!("freshly grown segment always fits the record that forced it")
                    },
                }
            },
        };
        // SAFETY: just constructed in the slot, exclusively ours until the
        // next call that takes &mut self.
        let record = unsafe { &mut *record.as_ptr() };
        self.activations += record.activation_records();
        record
    }

    fn grow(&mut self, record_slot: usize) {
        let bytes = cmp::max(self.config.min_segment_size, record_slot + seed_slot::<A>());
        let previous = mem::replace(&mut self.segment, Segment::empty());
        self.segment = Segment::new_linking(bytes, previous);
    }

    /// Walk every record, most recent push first, ending after the
    /// terminator. Growth never changes what this yields, only how many
    /// link records appear along the way.
    pub fn iter(&self) -> Records<'_, A> {
        Records::new(self.segment.current_record())
    }

    /// Replay the whole tape: seed the cursor with the declared activation
    /// total and invoke every record's callback in reverse push order.
    /// Fails if the records did not consume exactly the slots they
    /// declared.
    pub fn propagate(&self, act: &mut A) -> WengertResult<()> {
        let mut cursor = self.activations;
        for record in self.iter() {
            record.propagate(act, &mut cursor);
        }
        if cursor != 0 {
            return Err(WengertError::ActivationCursorMismatch {
                declared: self.activations,
                remaining: cursor,
            });
        }
        Ok(())
    }
}

impl<A: 'static> Default for Tape<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'t, A: 'static> IntoIterator for &'t Tape<A> {
    type Item = RecordRef<'t, A>;
    type IntoIter = Records<'t, A>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<A: 'static> fmt::Debug for Tape<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tape")
            .field("activations", &self.activations)
            .field("records", &RecordNames(self))
            .finish()
    }
}

struct RecordNames<'t, A: 'static>(&'t Tape<A>);

impl<A: 'static> fmt::Debug for RecordNames<'_, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.0.iter().map(|record| record.name()))
            .finish()
    }
}
