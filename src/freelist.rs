//! Free list maintenance.
//!
//! A single doubly linked list threads every free block, kept in strictly
//! increasing address order with no two members physically adjacent. List
//! "nodes" are identified by a free block's forward-link address, which
//! coincides with its payload pointer — so the same `*mut u8` value that
//! `BlockHeader::payload` returns doubles as this block's identity in the
//! list.
//!
//! The list head itself lives in the heap's reserved prefix at `heap.low()`
//! and may not be 8-aligned, so it is the one slot in this module read and
//! written with unaligned accesses; every in-block link slot is always
//! 8-aligned because block sizes and the header are themselves multiples
//! of 8.

use crate::block::{BlockHeader, POINTER_SIZE};
use crate::heap::{read_unaligned_ptr, write_unaligned_ptr};
use std::ptr;

/// The heap-resident list-head cell at `heap.low()`.
#[derive(Clone, Copy)]
pub(crate) struct ListHead(pub(crate) *mut u8);

impl ListHead {
  /// Forward-link address of the first free block, or null if the list is
  /// empty.
  pub(crate) unsafe fn get(self) -> *mut u8 {
    unsafe { read_unaligned_ptr(self.0) }
  }

  pub(crate) unsafe fn set(self, value: *mut u8) {
    unsafe { write_unaligned_ptr(self.0, value) };
  }
}

/// Address of `node`'s own forward-link slot. `node` is itself a
/// forward-link address (see module docs), so this is just `node`.
#[inline]
fn fwd_slot(node: *mut u8) -> *mut *mut u8 {
  node as *mut *mut u8
}

/// Address of `node`'s own backward-link slot.
#[inline]
pub(crate) fn bwd_slot(node: *mut u8) -> *mut *mut u8 {
  unsafe { node.add(POINTER_SIZE) as *mut *mut u8 }
}

/// Reads the forward link stored at `node`: the next free block's address,
/// or null.
pub(crate) unsafe fn forward_of(node: *mut u8) -> *mut u8 {
  unsafe { *fwd_slot(node) }
}

/// Reads the backward link stored at `node`: the address of the preceding
/// free block's own backward-link slot, or null if `node` is first.
unsafe fn backward_of(node: *mut u8) -> *mut u8 {
  unsafe { *bwd_slot(node) }
}

/// Walks the list from `list_head` and returns `(before, after)`: `before`
/// is the last free block with an address below `addr` (if any) and
/// `after` is the first free block with an address at or above `addr` (if
/// any). Used by `free` to find where a newly-freed block belongs.
pub(crate) unsafe fn locate(
  list_head: ListHead,
  addr: *mut u8,
) -> (Option<*mut u8>, Option<*mut u8>) {
  let mut before = None;
  let mut cursor = unsafe { list_head.get() };
  while !cursor.is_null() && (cursor as usize) < (addr as usize) {
    before = Some(cursor);
    cursor = unsafe { forward_of(cursor) };
  }
  let after = if cursor.is_null() { None } else { Some(cursor) };
  (before, after)
}

/// Links `node` into the list between `before` and `after`, updating the
/// list head if `before` is `None`. Does not coalesce; callers that need
/// coalescing do it as a follow-up step (see `crate::dealloc`).
pub(crate) unsafe fn link_between(
  list_head: ListHead,
  before: Option<*mut u8>,
  node: *mut u8,
  after: Option<*mut u8>,
) {
  let after_ptr = after.unwrap_or(ptr::null_mut());
  unsafe { *fwd_slot(node) = after_ptr };

  let backward_value = match before {
    Some(b) => bwd_slot(b) as *mut u8,
    None => ptr::null_mut(),
  };
  unsafe { *bwd_slot(node) = backward_value };

  match before {
    Some(b) => unsafe { *fwd_slot(b) = node },
    None => unsafe { list_head.set(node) },
  }

  if let Some(a) = after {
    unsafe { *bwd_slot(a) = bwd_slot(node) as *mut u8 };
  }
}

/// Removes `node` from the list, repairing its neighbours' links (and the
/// list head, if `node` was first).
pub(crate) unsafe fn excise(list_head: ListHead, node: *mut u8) {
  let backward = unsafe { backward_of(node) };
  let forward = unsafe { forward_of(node) };

  match backward.is_null() {
    true => unsafe { list_head.set(forward) },
    false => {
      let predecessor_fwd_slot = unsafe { backward.sub(POINTER_SIZE) } as *mut *mut u8;
      unsafe { *predecessor_fwd_slot = forward };
    }
  }

  if !forward.is_null() {
    unsafe { *bwd_slot(forward) = backward };
  }
}

/// Snapshots `node`'s own `(forward, backward)` link values. Useful when a
/// caller must read a block's links before overwriting bytes that may
/// physically overlap them — e.g. when the block is about to shrink from
/// the front and its new, smaller header could land on top of its own
/// link words.
pub(crate) unsafe fn links_of(node: *mut u8) -> (*mut u8, *mut u8) {
  unsafe { (forward_of(node), backward_of(node)) }
}

/// Gives `new_node` the list position described by `(forward, backward)`
/// — normally a pair captured from some other node via [`links_of`] —
/// updating the list head and both neighbours' links accordingly.
pub(crate) unsafe fn relink(list_head: ListHead, new_node: *mut u8, forward: *mut u8, backward: *mut u8) {
  unsafe {
    *fwd_slot(new_node) = forward;
    *bwd_slot(new_node) = backward;
  }

  match backward.is_null() {
    true => unsafe { list_head.set(new_node) },
    false => {
      let predecessor = unsafe { backward.sub(POINTER_SIZE) };
      unsafe { *fwd_slot(predecessor) = new_node };
    }
  }

  if !forward.is_null() {
    unsafe { *bwd_slot(forward) = bwd_slot(new_node) as *mut u8 };
  }
}

/// Replaces `old_node` with `new_node` at exactly the same position in
/// the list. Only safe to call before any byte of `old_node`'s links has
/// been overwritten; callers where the replacement's header write could
/// clobber those links first must call [`links_of`] before writing and
/// [`relink`] after, instead.
pub(crate) unsafe fn replace(list_head: ListHead, old_node: *mut u8, new_node: *mut u8) {
  let (forward, backward) = unsafe { links_of(old_node) };
  unsafe { relink(list_head, new_node, forward, backward) };
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::block::BlockHeader;

  /// A small arena of fixed-size blocks for exercising list operations in
  /// isolation, without a full `Heap`.
  struct Arena {
    buf: Vec<u8>,
    head: *mut u8,
  }

  impl Arena {
    fn new(block_count: usize, block_size: usize) -> Self {
      let mut buf = vec![0u8; POINTER_SIZE + block_count * block_size];
      let head = buf.as_mut_ptr();
      Arena { buf, head }
    }

    fn list_head(&mut self) -> ListHead {
      ListHead(self.head)
    }

    fn block(&mut self, index: usize, block_size: usize) -> BlockHeader {
      let addr = unsafe { self.head.add(POINTER_SIZE + index * block_size) };
      BlockHeader(addr)
    }

    fn node(&mut self, index: usize, block_size: usize) -> *mut u8 {
      unsafe { self.block(index, block_size).payload() }
    }
  }

  #[test]
  fn insert_into_empty_list() {
    let mut arena = Arena::new(1, 32);
    unsafe { arena.list_head().set(ptr::null_mut()) };
    let node = arena.node(0, 32);
    unsafe {
      arena.block(0, 32).write(32, false);
      link_between(arena.list_head(), None, node, None);
      assert_eq!(arena.list_head().get(), node);
      assert!(forward_of(node).is_null());
      assert!(backward_of(node).is_null());
    }
  }

  #[test]
  fn insert_maintains_order_and_links() {
    let mut arena = Arena::new(3, 32);
    unsafe { arena.list_head().set(ptr::null_mut()) };

    let n0 = arena.node(0, 32);
    let n1 = arena.node(1, 32);
    let n2 = arena.node(2, 32);
    unsafe {
      arena.block(0, 32).write(32, false);
      arena.block(1, 32).write(32, false);
      arena.block(2, 32).write(32, false);

      link_between(arena.list_head(), None, n0, None);
      link_between(arena.list_head(), Some(n0), n2, None);
      link_between(arena.list_head(), Some(n0), n1, Some(n2));

      assert_eq!(arena.list_head().get(), n0);
      assert_eq!(forward_of(n0), n1);
      assert_eq!(forward_of(n1), n2);
      assert!(forward_of(n2).is_null());
      assert!(backward_of(n0).is_null());
      assert_eq!(backward_of(n1), bwd_slot(n0) as *mut u8);
      assert_eq!(backward_of(n2), bwd_slot(n1) as *mut u8);
    }
  }

  #[test]
  fn excise_first_updates_head() {
    let mut arena = Arena::new(2, 32);
    unsafe { arena.list_head().set(ptr::null_mut()) };
    let n0 = arena.node(0, 32);
    let n1 = arena.node(1, 32);
    unsafe {
      arena.block(0, 32).write(32, false);
      arena.block(1, 32).write(32, false);
      link_between(arena.list_head(), None, n0, None);
      link_between(arena.list_head(), Some(n0), n1, None);

      excise(arena.list_head(), n0);
      assert_eq!(arena.list_head().get(), n1);
      assert!(backward_of(n1).is_null());
    }
  }

  #[test]
  fn replace_keeps_neighbours_but_moves_address() {
    let mut arena = Arena::new(3, 32);
    unsafe { arena.list_head().set(ptr::null_mut()) };
    let n0 = arena.node(0, 32);
    let n1 = arena.node(1, 32);
    let n2 = arena.node(2, 32);
    unsafe {
      for i in 0..3 {
        arena.block(i, 32).write(32, false);
      }
      link_between(arena.list_head(), None, n0, None);
      link_between(arena.list_head(), Some(n0), n1, None);
      link_between(arena.list_head(), Some(n1), n2, None);

      let moved = n1.add(4);
      replace(arena.list_head(), n1, moved);

      assert_eq!(forward_of(n0), moved);
      assert_eq!(forward_of(moved), n2);
      assert_eq!(backward_of(moved), bwd_slot(n0) as *mut u8);
      assert_eq!(backward_of(n2), bwd_slot(moved) as *mut u8);
    }
  }

  #[test]
  fn replace_at_head_updates_list_head() {
    let mut arena = Arena::new(2, 32);
    unsafe { arena.list_head().set(ptr::null_mut()) };
    let n0 = arena.node(0, 32);
    let n1 = arena.node(1, 32);
    unsafe {
      arena.block(0, 32).write(32, false);
      arena.block(1, 32).write(32, false);
      link_between(arena.list_head(), None, n0, None);
      link_between(arena.list_head(), Some(n0), n1, None);

      let moved = n0.add(4);
      replace(arena.list_head(), n0, moved);

      assert_eq!(arena.list_head().get(), moved);
      assert_eq!(forward_of(moved), n1);
      assert_eq!(backward_of(n1), bwd_slot(moved) as *mut u8);
    }
  }

  #[test]
  fn excise_middle_reconnects_neighbours() {
    let mut arena = Arena::new(3, 32);
    unsafe { arena.list_head().set(ptr::null_mut()) };
    let n0 = arena.node(0, 32);
    let n1 = arena.node(1, 32);
    let n2 = arena.node(2, 32);
    unsafe {
      for i in 0..3 {
        arena.block(i, 32).write(32, false);
      }
      link_between(arena.list_head(), None, n0, None);
      link_between(arena.list_head(), Some(n0), n1, None);
      link_between(arena.list_head(), Some(n1), n2, None);

      excise(arena.list_head(), n1);
      assert_eq!(forward_of(n0), n2);
      assert_eq!(backward_of(n2), bwd_slot(n0) as *mut u8);
    }
  }
}
