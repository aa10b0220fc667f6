//! Record layout and dispatch.
//!
//! Every record on the tape occupies one slot: a padded header holding a
//! pointer to the concrete type's static vtable, followed by the padded
//! payload. Records store neither their size nor a next pointer; both fall
//! out of the slot size baked into the vtable at compile time, so traversal
//! is pure pointer arithmetic.

use super::segment::Segment;
use crate::compat::*;
use core::any;
use core::marker::PhantomData;
use core::mem;
use core::ptr;
use core::ptr::NonNull;

/// Alignment of every record placed on a tape, in bytes.
pub const RECORD_ALIGNMENT: usize = 16;

/// Payloads at or beyond this size are rejected when their vtable is built.
pub(crate) const MAX_RECORD_SIZE: usize = (isize::MAX as usize) >> 1;

/// Round `n` up to the next multiple of [`RECORD_ALIGNMENT`].
pub(crate) const fn pad_to_alignment(n: usize) -> usize {
    (n + RECORD_ALIGNMENT - 1) & !(RECORD_ALIGNMENT - 1)
}

/// Bytes a record header occupies inside its slot, padding included.
pub(crate) const fn header_span<A: 'static>() -> usize {
    pad_to_alignment(mem::size_of::<RecordHeader<A>>())
}

/// Capability set for leaf records pushed onto a [`Tape`](super::Tape).
///
/// `A` is the opaque activation context the replay caller threads through
/// every record, typically a view over an external adjoint buffer. The tape
/// never reads it.
pub trait Propagate<A> {
    /// Adjoint slots this record type consumes during replay, when the
    /// count is known statically. Types with a per-instance count override
    /// [`Propagate::activation_records`] instead.
    const ACTIVATIONS: usize = 0;

    /// Adjoint slots this record will consume during replay.
    fn activation_records(&self) -> usize {
        Self::ACTIVATIONS
    }

    /// Replay callback. Invoked once per record, most-recent-push first.
    /// Implementations decrement `cursor` by their consumed slot count.
    fn prop(&self, act: &mut A, cursor: &mut usize);
}

/// Discriminates the three record shapes traversal has to know about.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RecordKind {
    /// An externally-defined record satisfying [`Propagate`].
    Leaf,
    /// Bridges into the previous, older segment.
    Link,
    /// Oldest record of an unchained segment; traversal ends here.
    Terminator,
}

/// Per-concrete-type dispatch table, one `'static` instance per type.
pub(crate) struct RecordVTable<A> {
    pub(crate) kind: RecordKind,
    /// Padded header + padded payload, i.e. the full slot span.
    pub(crate) slot_size: usize,
    pub(crate) name: fn() -> &'static str,
    pub(crate) activation_records: unsafe fn(*const u8) -> usize,
    pub(crate) propagate: unsafe fn(*const u8, &mut A, &mut usize),
    pub(crate) drop_in_place: unsafe fn(*mut u8),
}

/// The in-slot header; the record's address is this header's address.
/// Vtables are promoted constants, so `A: 'static` holds everywhere a
/// header type appears.
#[repr(transparent)]
pub(crate) struct RecordHeader<A: 'static> {
    pub(crate) vtable: &'static RecordVTable<A>,
}

/// Sentinel seeded into every segment that has no older segment to chain to.
pub(crate) struct Terminator;

/// Bridges a newer segment to the previous one, which it owns.
pub(crate) struct Link<A: 'static> {
    pub(crate) segment: Segment<A>,
}

unsafe fn activation_records_leaf<A, U: Propagate<A>>(payload: *const u8) -> usize {
    (*payload.cast::<U>()).activation_records()
}

unsafe fn propagate_leaf<A, U: Propagate<A>>(payload: *const u8, act: &mut A, cursor: &mut usize) {
    (*payload.cast::<U>()).prop(act, cursor)
}

unsafe fn drop_leaf<U>(payload: *mut u8) {
    ptr::drop_in_place(payload.cast::<U>())
}

unsafe fn activation_records_none(_: *const u8) -> usize {
    0
}

unsafe fn propagate_none<A>(_: *const u8, _: &mut A, _: &mut usize) {}

unsafe fn drop_none(_: *mut u8) {}

fn terminator_name() -> &'static str {
    "terminator"
}

fn link_name() -> &'static str {
    "link"
}

impl<A: 'static> RecordVTable<A> {
    pub(crate) const TERMINATOR: &'static RecordVTable<A> = &RecordVTable {
        kind: RecordKind::Terminator,
        slot_size: header_span::<A>(),
        name: terminator_name,
        activation_records: activation_records_none,
        propagate: propagate_none::<A>,
        drop_in_place: drop_none,
    };

    // Segment teardown moves the owned segment out of a link by hand, so
    // the drop thunk stays a no-op.
    pub(crate) const LINK: &'static RecordVTable<A> = &RecordVTable {
        kind: RecordKind::Link,
        slot_size: header_span::<A>() + pad_to_alignment(mem::size_of::<Link<A>>()),
        name: link_name,
        activation_records: activation_records_none,
        propagate: propagate_none::<A>,
        drop_in_place: drop_none,
    };
}

/// Supplies the static vtable for every [`Propagate`] type. `Link` and
/// `Terminator` deliberately do not implement [`Propagate`], which keeps
/// them out of `push` at compile time.
pub(crate) trait LeafRecord<A: 'static>: Propagate<A> + Sized {
    const VTABLE: &'static RecordVTable<A>;
}

impl<A: 'static, U: Propagate<A>> LeafRecord<A> for U {
    const VTABLE: &'static RecordVTable<A> = &RecordVTable {
        kind: RecordKind::Leaf,
        slot_size: {
            assert!(
                mem::align_of::<U>() <= RECORD_ALIGNMENT,
                "record type alignment exceeds RECORD_ALIGNMENT"
            );
            assert!(
                mem::size_of::<U>() <= MAX_RECORD_SIZE,
                "record type is too large for a tape slot"
            );
            header_span::<A>() + pad_to_alignment(mem::size_of::<U>())
        },
        name: any::type_name::<U>,
        activation_records: activation_records_leaf::<A, U>,
        propagate: propagate_leaf::<A, U>,
        drop_in_place: drop_leaf::<U>,
    };
}

/// Slot span needed to seed a fresh segment with its `Link` or
/// `Terminator`, whichever is larger. Part of the growth sizing math.
pub(crate) const fn seed_slot<A: 'static>() -> usize {
    let link = header_span::<A>() + pad_to_alignment(mem::size_of::<Link<A>>());
    let terminator = header_span::<A>();
    if link > terminator {
        link
    } else {
        terminator
    }
}

/// Address of the record following `header` in traversal order, or null
/// past the final terminator. Crosses segment boundaries through links.
///
/// # Safety
///
/// `header` must point at a live, fully constructed record header.
pub(crate) unsafe fn next_of<A: 'static>(header: *const u8) -> *const u8 {
    let vtable = (*header.cast::<RecordHeader<A>>()).vtable;
    match vtable.kind {
        RecordKind::Terminator => ptr::null(),
        RecordKind::Link => {
            let link = header.add(header_span::<A>()).cast::<Link<A>>();
            (*link).segment.current_record()
        },
        RecordKind::Leaf => header.add(vtable.slot_size),
    }
}

/// Borrowed view of one record reached by traversal.
pub struct RecordRef<'t, A: 'static> {
    header: NonNull<u8>,
    _tape: PhantomData<&'t Segment<A>>,
}

impl<'t, A: 'static> RecordRef<'t, A> {
    /// # Safety
    ///
    /// `header` must point at a live record header that outlives `'t`.
    pub(crate) unsafe fn from_header(header: NonNull<u8>) -> Self {
        Self {
            header,
            _tape: PhantomData,
        }
    }

    fn vtable(&self) -> &'static RecordVTable<A> {
        // SAFETY: guaranteed live by the from_header contract.
        unsafe { (*self.header.as_ptr().cast::<RecordHeader<A>>()).vtable }
    }

    fn payload(&self) -> *const u8 {
        // SAFETY: the payload sits one padded header past the record address.
        unsafe { (self.header.as_ptr() as *const u8).add(header_span::<A>()) }
    }

    pub fn kind(&self) -> RecordKind {
        self.vtable().kind
    }

    pub fn is_leaf(&self) -> bool {
        self.kind() == RecordKind::Leaf
    }

    pub fn is_link(&self) -> bool {
        self.kind() == RecordKind::Link
    }

    pub fn is_terminator(&self) -> bool {
        self.kind() == RecordKind::Terminator
    }

    /// Adjoint slots this record consumes during replay; 0 for links and
    /// terminators.
    pub fn activation_records(&self) -> usize {
        // SAFETY: payload points at a live value of the vtable's type.
        unsafe { (self.vtable().activation_records)(self.payload()) }
    }

    /// Invoke this record's replay callback. Links and terminators do no
    /// work.
    pub fn propagate(&self, act: &mut A, cursor: &mut usize) {
        // SAFETY: payload points at a live value of the vtable's type.
        unsafe { (self.vtable().propagate)(self.payload(), act, cursor) }
    }

    /// Diagnostic label: the concrete record type's name.
    pub fn name(&self) -> &'static str {
        (self.vtable().name)()
    }

    /// Write the diagnostic label to `out`.
    pub fn describe(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        out.write_str(self.name())
    }

    pub(crate) fn next_record(&self) -> *const u8 {
        // SAFETY: guaranteed live by the from_header contract.
        unsafe { next_of::<A>(self.header.as_ptr()) }
    }

    #[cfg(test)]
    pub(crate) fn addr(&self) -> usize {
        self.header.as_ptr() as usize
    }
}

impl<A: 'static> Clone for RecordRef<'_, A> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A: 'static> Copy for RecordRef<'_, A> {}

impl<A: 'static> fmt::Display for RecordRef<'_, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Probe {
        _bytes: [u8; 5],
    }

    impl Propagate<()> for Probe {
        fn prop(&self, _act: &mut (), _cursor: &mut usize) {}
    }

    struct FixedActs;

    impl Propagate<()> for FixedActs {
        const ACTIVATIONS: usize = 9;

        fn prop(&self, _act: &mut (), _cursor: &mut usize) {}
    }

    #[test]
    fn test_pad_to_alignment_law() {
        assert_eq!(pad_to_alignment(0), 0);
        assert_eq!(pad_to_alignment(1), 16);
        assert_eq!(pad_to_alignment(16), 16);
        assert_eq!(pad_to_alignment(17), 32);
        assert_eq!(pad_to_alignment(5000), 5008);
    }

    #[test]
    fn test_leaf_slot_size() {
        let vtable = <Probe as LeafRecord<()>>::VTABLE;
        assert_eq!(vtable.kind, RecordKind::Leaf);
        assert_eq!(vtable.slot_size, header_span::<()>() + 16);
        assert!((vtable.name)().contains("Probe"));
    }

    #[test]
    fn test_sentinel_slot_sizes() {
        assert_eq!(RecordVTable::<()>::TERMINATOR.slot_size, header_span::<()>());
        assert_eq!(seed_slot::<()>(), RecordVTable::<()>::LINK.slot_size);
    }

    #[test]
    fn test_static_activation_count() {
        assert_eq!(FixedActs.activation_records(), 9);
        assert_eq!(
            Probe { _bytes: [0; 5] }.activation_records(),
            0,
            "default declares no activation slots"
        );
    }
}
