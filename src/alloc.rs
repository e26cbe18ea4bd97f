//! Allocation.
//!
//! `allocate` turns a requested byte count into a block size, searches the
//! free list for the smallest block that still fits (best-fit), and splits
//! off any leftover that is itself big enough to be useful. A search that
//! comes up empty does not always mean growing the heap by a full block:
//! if the physically last block is free but merely too small, only the
//! shortfall is requested from the backing heap and that block is
//! extended in place, the same way a bump-pointer heap naturally avoids
//! re-growing space it already owns.

use crate::align::align_up;
use crate::block::{BlockHeader, HEADER_SIZE, MIN_BLOCK_SIZE, POINTER_SIZE};
use crate::freelist::{self, ListHead};
use crate::heap::{Heap, OutOfMemory};
use std::ptr;

/// Address of the first block header, once the heap has been primed: the
/// list-head slot plus whatever padding is needed to land on an
/// 8-aligned address.
pub(crate) fn first_block_header(heap: &Heap) -> *mut u8 {
  crate::align::align_up_ptr(unsafe { heap.low().add(POINTER_SIZE) })
}

/// Lazily reserves the list-head slot and the alignment padding in front
/// of the first block. A no-op once the heap has already grown past
/// zero — callers call this unconditionally at the top of every public
/// operation.
pub(crate) fn ensure_primed(heap: &mut Heap, list_head: ListHead) -> Result<(), OutOfMemory> {
  if heap.size() != 0 {
    return Ok(());
  }
  heap.sbrk(POINTER_SIZE)?;
  unsafe { list_head.set(ptr::null_mut()) };

  let target = first_block_header(heap);
  let padding = target as usize - heap.end() as usize;
  if padding > 0 {
    heap.sbrk(padding)?;
  }
  Ok(())
}

/// Smallest block size that can host `requested` payload bytes and, once
/// freed again, the two link words the free list needs.
pub(crate) fn required_block_size(requested: usize) -> usize {
  let payload = requested.max(2 * POINTER_SIZE);
  align_up(HEADER_SIZE + payload).max(MIN_BLOCK_SIZE)
}

/// Walks the physical heap from the first block to find the last one.
/// Returns `None` if the heap has been primed but no block has been
/// carved out of it yet.
fn last_block(heap: &Heap) -> Option<BlockHeader> {
  let mut cursor = first_block_header(heap);
  if cursor as usize >= heap.end() as usize {
    return None;
  }
  loop {
    let header = BlockHeader(cursor);
    let end = unsafe { header.end() };
    if end as usize >= heap.end() as usize {
      return Some(header);
    }
    cursor = end;
  }
}

/// Scans the free list for the smallest block whose size is at least
/// `block_size`.
fn find_best_fit(list_head: ListHead, block_size: usize) -> Option<BlockHeader> {
  let mut best: Option<BlockHeader> = None;
  let mut cursor = unsafe { list_head.get() };
  while !cursor.is_null() {
    let header = unsafe { BlockHeader::from_payload(cursor) };
    let size = unsafe { header.size() };
    if size >= block_size {
      let improves = match best {
        Some(current) => size < unsafe { current.size() },
        None => true,
      };
      if improves {
        best = Some(header);
      }
    }
    cursor = unsafe { freelist::forward_of(cursor) };
  }
  best
}

/// Carves `block_size` bytes out of `candidate`. When the leftover is
/// itself usable, `candidate`'s header stays put and shrinks to become
/// the free remainder, and the allocated block is written at its high
/// end — the free list does not need touching at all, since the
/// remaining free block keeps `candidate`'s own list identity. Only when
/// the leftover is too small to be worth keeping does `candidate` get
/// excised and handed over whole.
fn place(list_head: ListHead, candidate: BlockHeader, block_size: usize) -> *mut u8 {
  unsafe {
    let candidate_size = candidate.size();
    let remainder = candidate_size - block_size;

    if remainder >= MIN_BLOCK_SIZE {
      candidate.write(remainder, false);
      let allocated_header = BlockHeader(candidate.end());
      allocated_header.write(block_size, true);
      allocated_header.payload()
    } else {
      freelist::excise(list_head, candidate.payload());
      candidate.write(candidate_size, true);
      candidate.payload()
    }
  }
}

/// Grows the backing heap and satisfies a request that the free list
/// could not. Extends the last block in place if it happens to be free,
/// otherwise appends a brand new allocated block.
fn extend_and_place(
  heap: &mut Heap,
  list_head: ListHead,
  block_size: usize,
) -> Result<*mut u8, OutOfMemory> {
  match last_block(heap) {
    Some(tail) if !unsafe { tail.is_allocated() } => {
      let tail_size = unsafe { tail.size() };
      let grow_by = block_size - tail_size;
      heap.sbrk(grow_by)?;
      unsafe {
        freelist::excise(list_head, tail.payload());
        tail.write(block_size, true);
        Ok(tail.payload())
      }
    }
    _ => {
      let base = heap.sbrk(block_size)?;
      let header = BlockHeader(base);
      unsafe {
        header.write(block_size, true);
        Ok(header.payload())
      }
    }
  }
}

/// Returns a payload pointer for at least `max(requested, 2 * POINTER_SIZE)`
/// usable bytes, or `Err` if the backing heap cannot grow to satisfy the
/// request. A `requested` of zero is floored the same as any other small
/// request and still yields a real, usable block — it is not special-cased
/// to a null return.
pub(crate) fn allocate(
  heap: &mut Heap,
  list_head: ListHead,
  requested: usize,
) -> Result<*mut u8, OutOfMemory> {
  ensure_primed(heap, list_head)?;

  let block_size = required_block_size(requested);
  match find_best_fit(list_head, block_size) {
    Some(candidate) => Ok(place(list_head, candidate, block_size)),
    None => extend_and_place(heap, list_head, block_size),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn fresh() -> (Heap, ListHead) {
    let heap = Heap::with_capacity(4096);
    let list_head = ListHead(heap.low());
    (heap, list_head)
  }

  #[test]
  fn first_allocation_carves_from_bare_heap() {
    let (mut heap, list_head) = fresh();
    let p = allocate(&mut heap, list_head, 24).unwrap();
    assert!(!p.is_null());
    let header = unsafe { BlockHeader::from_payload(p) };
    assert!(unsafe { header.is_allocated() });
    assert!(unsafe { header.size() } >= 24 + HEADER_SIZE);
  }

  #[test]
  fn zero_size_request_is_floored_to_a_real_usable_block() {
    let (mut heap, list_head) = fresh();
    let p = allocate(&mut heap, list_head, 0).unwrap();
    assert!(!p.is_null());
    let header = unsafe { BlockHeader::from_payload(p) };
    assert!(unsafe { header.is_allocated() });
    assert!(unsafe { header.size() } >= MIN_BLOCK_SIZE);
    assert!(heap.size() > 0, "a zero-size request must still carve out a block");
  }

  #[test]
  fn reuses_freed_block_of_matching_size() {
    let (mut heap, list_head) = fresh();
    let a = allocate(&mut heap, list_head, 64).unwrap();
    let header = unsafe { BlockHeader::from_payload(a) };
    let size = unsafe { header.size() };
    unsafe {
      header.write(size, false);
      let (before, after) = freelist::locate(list_head, a);
      freelist::link_between(list_head, before, a, after);
    }
    let size_before = heap.size();
    let b = allocate(&mut heap, list_head, 64).unwrap();
    assert_eq!(b, a);
    assert_eq!(heap.size(), size_before, "reuse must not grow the heap");
  }

  #[test]
  fn splits_a_large_free_block_on_reuse() {
    let (mut heap, list_head) = fresh();
    let big = allocate(&mut heap, list_head, 256).unwrap();
    let header = unsafe { BlockHeader::from_payload(big) };
    let size = unsafe { header.size() };
    unsafe {
      header.write(size, false);
      let (before, after) = freelist::locate(list_head, big);
      freelist::link_between(list_head, before, big, after);
    }

    let small = allocate(&mut heap, list_head, 16).unwrap();
    assert_ne!(small, big, "the allocated half lands at the high end of the split block");
    assert_eq!(
      small as usize,
      big as usize + unsafe { BlockHeader::from_payload(big).size() },
      "remainder keeps the original header; the new block follows it"
    );
    let remainder_node = unsafe { list_head.get() };
    assert_eq!(remainder_node, big, "the free remainder keeps the original block's list identity");
    assert!(unsafe { BlockHeader::from_payload(big).size() } < size, "remainder must shrink");
  }

  #[test]
  fn extends_free_tail_block_instead_of_appending_a_new_one() {
    let (mut heap, list_head) = fresh();
    let first = allocate(&mut heap, list_head, 16).unwrap();
    let second = allocate(&mut heap, list_head, 16).unwrap();
    let second_header = unsafe { BlockHeader::from_payload(second) };
    let second_size = unsafe { second_header.size() };
    unsafe {
      second_header.write(second_size, false);
      let (before, after) = freelist::locate(list_head, second);
      freelist::link_between(list_head, before, second, after);
    }

    let size_before = heap.size();
    let third = allocate(&mut heap, list_head, 512).unwrap();
    assert_eq!(third, second, "the free tail block is reused and grown");
    assert!(heap.size() > size_before, "heap still grows by the shortfall");
    let _ = first;
  }
}
