//! Block geometry.
//!
//! Every block begins with a header: one machine word holding the block's
//! total size (header + payload, or header + two link words, whichever the
//! block currently is) with its allocation flag stolen from the low bit.
//! Free blocks additionally carry a forward link and a backward link
//! immediately after the header. There is no footer.
//!
//! [`BlockHeader`] is a narrow, raw-pointer cursor onto a block's header; it
//! translates between header/payload/forward-link/backward-link positions
//! by fixed offsets and never does anything else. Everything that actually
//! walks or mutates the free list lives in [`crate::freelist`].

use std::mem;

/// Size of the header word (and of every link word — both are one machine
/// word wide).
pub(crate) const HEADER_SIZE: usize = mem::size_of::<usize>();

/// Size of a single forward or backward link.
pub(crate) const POINTER_SIZE: usize = mem::size_of::<usize>();

/// Smallest legal block size: large enough that a freed block can still
/// host its two link words.
pub(crate) const MIN_BLOCK_SIZE: usize = crate::align_up!(HEADER_SIZE + 2 * POINTER_SIZE);

const ALLOCATED_FLAG: usize = 1;

/// A cursor onto a block's header.
///
/// All of its methods are `unsafe` because they assume `self.0` points at
/// the header of a live block in some heap; `BlockHeader` carries no
/// lifetime or bounds information of its own, so that the unsafety of
/// walking block geometry stays confined to this one narrow type instead
/// of leaking into every caller.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) struct BlockHeader(pub(crate) *mut u8);

impl BlockHeader {
  /// The header address of the block whose payload pointer is `payload`.
  pub(crate) unsafe fn from_payload(payload: *mut u8) -> Self {
    Self(unsafe { payload.sub(HEADER_SIZE) })
  }

  /// Total block size (header + contents), with the allocation flag
  /// stripped off.
  pub(crate) unsafe fn size(self) -> usize {
    unsafe { *(self.0 as *mut usize) & !ALLOCATED_FLAG }
  }

  pub(crate) unsafe fn is_allocated(self) -> bool {
    unsafe { *(self.0 as *mut usize) & ALLOCATED_FLAG != 0 }
  }

  /// Overwrites the header with `size` (which must already be a multiple
  /// of [`crate::align::ALIGNMENT`]) and the given allocation flag.
  pub(crate) unsafe fn write(self, size: usize, allocated: bool) {
    debug_assert_eq!(size & ALLOCATED_FLAG, 0, "block size must be even");
    let word = size | if allocated { ALLOCATED_FLAG } else { 0 };
    unsafe { *(self.0 as *mut usize) = word };
  }

  /// First byte past the end of this block, i.e. the next block's header.
  pub(crate) unsafe fn end(self) -> *mut u8 {
    unsafe { self.0.add(self.size()) }
  }

  /// Payload pointer returned to callers. For a free block this address
  /// coincides with the forward-link slot, which is what lets the free
  /// list reuse a block's own payload bytes as its node storage.
  pub(crate) unsafe fn payload(self) -> *mut u8 {
    unsafe { self.0.add(HEADER_SIZE) }
  }
}
