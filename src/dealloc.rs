//! Freeing, with bidirectional coalescing.
//!
//! There is no boundary tag (footer) on any block, so a freed block
//! cannot look backward through memory on its own to find its physical
//! predecessor. It doesn't need to: the free list is kept in strictly
//! increasing address order with no two members ever left physically
//! adjacent, so the nearest free blocks *in address order* — found with
//! [`freelist::locate`] — are exactly the only candidates that could be
//! physically touching the block being freed. Comparing addresses against
//! those two neighbours is enough to decide all four coalescing cases.

use crate::block::BlockHeader;
use crate::freelist::{self, ListHead};

unsafe fn physically_adjacent(lower: BlockHeader, higher: *mut u8) -> bool {
  unsafe { lower.end() == higher }
}

/// Returns `payload`'s block to the free list, merging with whichever of
/// its immediate free-list neighbours happen to sit right next to it in
/// memory.
pub(crate) unsafe fn free(list_head: ListHead, payload: *mut u8) {
  let header = unsafe { BlockHeader::from_payload(payload) };
  let (before, after) = unsafe { freelist::locate(list_head, payload) };

  let before_header = before.map(|b| unsafe { BlockHeader::from_payload(b) });
  let after_header = after.map(|a| unsafe { BlockHeader::from_payload(a) });

  // Pair each neighbour's node with its header only when it is also
  // physically adjacent, so the branches below can match on "is there an
  // adjacent neighbour" structurally instead of asserting it via a separate
  // `.unwrap()` on an `Option` whose invariant lives elsewhere.
  let before_adjacent = match (before, before_header) {
    (Some(node), Some(h)) if unsafe { physically_adjacent(h, header.0) } => Some((node, h)),
    _ => None,
  };
  let after_adjacent = match (after, after_header) {
    (Some(node), Some(h)) if unsafe { physically_adjacent(header, h.0) } => Some((node, h)),
    _ => None,
  };

  match (before_adjacent, after_adjacent) {
    (None, None) => unsafe {
      header.write(header.size(), false);
      freelist::link_between(list_head, before, payload, after);
    },
    (None, Some((after_node, after_header))) => unsafe {
      let next = freelist::forward_of(after_node);
      let combined = header.size() + after_header.size();
      freelist::excise(list_head, after_node);
      header.write(combined, false);
      let next = if next.is_null() { None } else { Some(next) };
      freelist::link_between(list_head, before, payload, next);
    },
    (Some((_, before_header)), None) => unsafe {
      let combined = before_header.size() + header.size();
      before_header.write(combined, false);
    },
    (Some((_, before_header)), Some((after_node, after_header))) => unsafe {
      freelist::excise(list_head, after_node);
      let combined = before_header.size() + header.size() + after_header.size();
      before_header.write(combined, false);
    },
  }
}
