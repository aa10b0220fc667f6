//! Arena segments.
//!
//! A segment owns one aligned block and fills it from its high address
//! toward its low address, so the newest record always sits at the bump
//! cursor and the oldest at the top of the block. A full segment is never
//! reallocated; growth chains a fresh segment in front of it through a
//! [`Link`](super::record::Link) record.

use super::record::{
    header_span, pad_to_alignment, seed_slot, Link, RecordHeader, RecordKind, RecordVTable,
    Terminator, RECORD_ALIGNMENT,
};
use alloc::alloc::{alloc, dealloc, handle_alloc_error, Layout};
use core::marker::PhantomData;
use core::mem::ManuallyDrop;
use core::ptr::NonNull;

fn block_layout(capacity: usize) -> Layout {
    Layout::from_size_align(capacity, RECORD_ALIGNMENT).expect("segment block layout")
}

/// One arena block plus its bump cursor. `current` points at the header of
/// the most recently placed record and is always a valid record once the
/// block exists; an unallocated segment holds null in both pointers.
pub(crate) struct Segment<A: 'static> {
    current: *mut u8,
    memory: *mut u8,
    capacity: usize,
    _marker: PhantomData<fn(&mut A)>,
}

impl<A: 'static> Segment<A> {
    /// A segment that owns no memory. The first push through a tape grows
    /// it into a real one.
    pub(crate) const fn empty() -> Self {
        Self {
            current: core::ptr::null_mut(),
            memory: core::ptr::null_mut(),
            capacity: 0,
            _marker: PhantomData,
        }
    }

    fn with_block(capacity: usize) -> Self {
        debug_assert!(capacity > 0 && capacity % RECORD_ALIGNMENT == 0);
        let layout = block_layout(capacity);
        // SAFETY: layout has non-zero size.
        let memory = unsafe { alloc(layout) };
        if memory.is_null() {
            // Fatal: the tape cannot proceed without storage.
            handle_alloc_error(layout);
        }
        Self {
            // SAFETY: one past the end of the fresh block.
            current: unsafe { memory.add(capacity) },
            memory,
            capacity,
            _marker: PhantomData,
        }
    }

    /// Allocate a block of at least `min_bytes` (padded, clamped so the
    /// seed record always fits) and place a terminator as its oldest
    /// record.
    pub(crate) fn new(min_bytes: usize) -> Self {
        let capacity = pad_to_alignment(min_bytes).max(seed_slot::<A>());
        let mut segment = Self::with_block(capacity);
        match segment.place(RecordVTable::<A>::TERMINATOR, Terminator) {
            Ok(_) => segment,
            Err(_) => unreachable!("fresh segment cannot fit its terminator"),
        }
    }

    /// As [`Segment::new`], but seed with a link that takes ownership of
    /// `previous`. An unallocated `previous` owns nothing to chain to, so a
    /// plain terminator is placed instead.
    pub(crate) fn new_linking(min_bytes: usize, previous: Segment<A>) -> Self {
        if previous.is_unallocated() {
            return Self::new(min_bytes);
        }
        let capacity = pad_to_alignment(min_bytes).max(seed_slot::<A>());
        let mut segment = Self::with_block(capacity);
        match segment.place(RecordVTable::<A>::LINK, Link { segment: previous }) {
            Ok(_) => segment,
            Err(_) => unreachable!("fresh segment cannot fit its link"),
        }
    }

    pub(crate) fn is_unallocated(&self) -> bool {
        self.memory.is_null()
    }

    /// Header of the newest record, or null for an unallocated segment.
    pub(crate) fn current_record(&self) -> *const u8 {
        self.current
    }

    /// Bump-decrement the cursor by `size` bytes rounded up to the record
    /// alignment. The sole allocation primitive; never moves existing
    /// records.
    ///
    /// Every successful call must be followed immediately by header and
    /// payload construction, as [`Segment::place`] does: `current` now
    /// designates the returned slot, and drop and traversal both read a
    /// record header there.
    pub(crate) fn allocate(&mut self, size: usize) -> Option<NonNull<u8>> {
        if self.memory.is_null() {
            return None;
        }
        let padded = pad_to_alignment(size);
        let available = self.current as usize - self.memory as usize;
        if available < padded {
            return None;
        }
        // SAFETY: stays within the block, checked above.
        let record = unsafe { self.current.sub(padded) };
        self.current = record;
        NonNull::new(record)
    }

    /// Allocate one slot and construct header and payload in place. On
    /// exhaustion the value is handed back untouched, so commitment is
    /// all-or-nothing from the caller's point of view.
    pub(crate) fn place<U>(
        &mut self,
        vtable: &'static RecordVTable<A>,
        value: U,
    ) -> Result<NonNull<U>, U> {
        let Some(slot) = self.allocate(vtable.slot_size) else {
            return Err(value);
        };
        // SAFETY: the slot spans `vtable.slot_size` bytes: a padded header
        // followed by the padded payload, both 16-aligned.
        unsafe {
            slot.as_ptr()
                .cast::<RecordHeader<A>>()
                .write(RecordHeader { vtable });
            let payload = slot.as_ptr().add(header_span::<A>()).cast::<U>();
            payload.write(value);
            Ok(NonNull::new_unchecked(payload))
        }
    }

    fn into_raw_parts(self) -> (*mut u8, *mut u8, usize) {
        let this = ManuallyDrop::new(self);
        (this.current, this.memory, this.capacity)
    }
}

impl<A: 'static> Drop for Segment<A> {
    fn drop(&mut self) {
        // Iterative teardown: a link hands us the older segment it owns,
        // and we free the present block before walking on into it. Keeps
        // the stack O(1) for arbitrarily long chains.
        let mut memory = self.memory;
        let mut capacity = self.capacity;
        let mut p = self.current as *const u8;
        self.current = core::ptr::null_mut();
        self.memory = core::ptr::null_mut();
        self.capacity = 0;
        // SAFETY: every non-null traversal pointer designates a live record
        // inside the block currently tracked by `memory`/`capacity`.
        unsafe {
            while !p.is_null() {
                let vtable = (*p.cast::<RecordHeader<A>>()).vtable;
                match vtable.kind {
                    RecordKind::Link => {
                        let link = p.add(header_span::<A>()).cast::<Link<A>>() as *mut Link<A>;
                        let inner = core::ptr::read(link);
                        let (inner_current, inner_memory, inner_capacity) =
                            inner.segment.into_raw_parts();
                        if !memory.is_null() {
                            dealloc(memory, block_layout(capacity));
                        }
                        memory = inner_memory;
                        capacity = inner_capacity;
                        p = inner_current as *const u8;
                    },
                    RecordKind::Terminator => {
                        (vtable.drop_in_place)(p.add(header_span::<A>()) as *mut u8);
                        p = core::ptr::null();
                    },
                    RecordKind::Leaf => {
                        let next = p.add(vtable.slot_size);
                        (vtable.drop_in_place)(p.add(header_span::<A>()) as *mut u8);
                        p = next;
                    },
                }
            }
            if !memory.is_null() {
                dealloc(memory, block_layout(capacity));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::record::{next_of, LeafRecord, Propagate};
    use super::*;

    struct Filler;

    impl Propagate<()> for Filler {
        fn prop(&self, _act: &mut (), _cursor: &mut usize) {}
    }

    #[test]
    fn test_empty_segment_allocates_nothing() {
        let mut segment: Segment<()> = Segment::empty();
        assert!(segment.is_unallocated());
        assert!(segment.current_record().is_null());
        assert!(segment.allocate(16).is_none());
    }

    #[test]
    fn test_new_segment_is_seeded_with_terminator() {
        let segment: Segment<()> = Segment::new(64);
        let current = segment.current_record();
        assert!(!current.is_null());
        // SAFETY: current designates the seeded terminator.
        unsafe {
            let vtable = (*current.cast::<RecordHeader<()>>()).vtable;
            assert_eq!(vtable.kind, RecordKind::Terminator);
            assert!(next_of::<()>(current).is_null());
        }
    }

    #[test]
    fn test_place_until_exhaustion() {
        // 64-byte block: the terminator takes 16, leaving room for three
        // 16-byte filler slots. The fourth placement hands the value back.
        let mut segment: Segment<()> = Segment::new(64);
        let vtable = <Filler as LeafRecord<()>>::VTABLE;
        for _ in 0..3 {
            assert!(segment.place(vtable, Filler).is_ok());
        }
        assert!(segment.place(vtable, Filler).is_err());
    }

    #[test]
    fn test_undersized_request_is_clamped_to_seed() {
        // Even a pathologically small request must fit the seed record.
        let segment: Segment<()> = Segment::new(1);
        assert!(!segment.current_record().is_null());
    }

    #[test]
    fn test_linking_an_unallocated_segment_places_terminator() {
        let segment: Segment<()> = Segment::new_linking(64, Segment::empty());
        let current = segment.current_record();
        // SAFETY: current designates the seeded record.
        unsafe {
            let vtable = (*current.cast::<RecordHeader<()>>()).vtable;
            assert_eq!(vtable.kind, RecordKind::Terminator);
        }
    }

    #[test]
    fn test_linking_chains_to_previous_current() {
        let previous: Segment<()> = Segment::new(64);
        let previous_current = previous.current_record();
        let segment = Segment::new_linking(64, previous);
        let current = segment.current_record();
        // SAFETY: current designates the seeded link.
        unsafe {
            let vtable = (*current.cast::<RecordHeader<()>>()).vtable;
            assert_eq!(vtable.kind, RecordKind::Link);
            assert_eq!(next_of::<()>(current), previous_current);
        }
    }
}
