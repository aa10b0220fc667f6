//! Front-to-back tape traversal.

use super::record::RecordRef;
use super::segment::Segment;
use core::iter::FusedIterator;
use core::marker::PhantomData;
use core::ptr::NonNull;

/// Iterator over every live record, most recent push first, crossing
/// segment boundaries transparently and ending after the terminator.
pub struct Records<'t, A: 'static> {
    next: *const u8,
    _tape: PhantomData<&'t Segment<A>>,
}

impl<'t, A: 'static> Records<'t, A> {
    pub(crate) fn new(start: *const u8) -> Self {
        Self {
            next: start,
            _tape: PhantomData,
        }
    }
}

impl<'t, A: 'static> Iterator for Records<'t, A> {
    type Item = RecordRef<'t, A>;

    fn next(&mut self) -> Option<Self::Item> {
        let header = NonNull::new(self.next as *mut u8)?;
        // SAFETY: non-null traversal pointers always designate live records
        // owned by the tape borrowed for 't.
        let record = unsafe { RecordRef::from_header(header) };
        self.next = record.next_record();
        Some(record)
    }
}

impl<A: 'static> FusedIterator for Records<'_, A> {}
