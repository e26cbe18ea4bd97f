//! Resizing an existing allocation in place where possible.
//!
//! `reallocate` tries, in order: doing nothing (the current block is
//! already big enough), growing into a free block that physically follows
//! immediately (splitting the leftover back into the free list, or
//! absorbing it whole if the leftover would be too small to be useful),
//! extending the heap if this is the very last block, and only then
//! falling back to a fresh allocation plus a copy and a free of the old
//! block.

use crate::alloc::{self, required_block_size};
use crate::block::{BlockHeader, HEADER_SIZE, MIN_BLOCK_SIZE};
use crate::dealloc;
use crate::freelist::{self, ListHead};
use crate::heap::{Heap, OutOfMemory};
use std::ptr;

/// Resizes the allocation at `payload` to hold `requested` bytes.
///
/// `payload` may be null, in which case this behaves like a plain
/// allocation. `requested` may be zero, in which case the block is freed
/// and the now-dangling `payload` is handed back unchanged rather than a
/// null pointer — callers must not dereference it afterward.
pub(crate) unsafe fn reallocate(
  heap: &mut Heap,
  list_head: ListHead,
  payload: *mut u8,
  requested: usize,
) -> Result<*mut u8, OutOfMemory> {
  if payload.is_null() {
    return alloc::allocate(heap, list_head, requested);
  }
  if requested == 0 {
    unsafe { dealloc::free(list_head, payload) };
    return Ok(payload);
  }

  let header = unsafe { BlockHeader::from_payload(payload) };
  let current_size = unsafe { header.size() };
  let block_size = required_block_size(requested);

  if block_size <= current_size {
    return Ok(payload);
  }

  let shortfall = block_size - current_size;
  let next_addr = unsafe { header.end() };
  let is_last_block = next_addr as usize >= heap.end() as usize;

  if !is_last_block {
    let next_header = BlockHeader(next_addr);
    let next_free = unsafe { !next_header.is_allocated() };
    let next_size = unsafe { next_header.size() };
    if next_free && shortfall <= next_size {
      return Ok(unsafe {
        grow_into_successor(list_head, header, next_header, current_size, block_size, next_size)
      });
    }
  }

  if is_last_block {
    heap.sbrk(shortfall)?;
    unsafe { header.write(block_size, true) };
    return Ok(payload);
  }

  let new_payload = alloc::allocate(heap, list_head, requested)?;
  let copy_size = (current_size - HEADER_SIZE).min(requested);
  unsafe {
    ptr::copy_nonoverlapping(payload, new_payload, copy_size);
    dealloc::free(list_head, payload);
  }
  Ok(new_payload)
}

/// Grows `header` by absorbing some or all of `next`, which must be the
/// free block immediately following it in memory and large enough to
/// cover the shortfall.
unsafe fn grow_into_successor(
  list_head: ListHead,
  header: BlockHeader,
  next: BlockHeader,
  current_size: usize,
  block_size: usize,
  next_size: usize,
) -> *mut u8 {
  let shortfall = block_size - current_size;
  let remainder = next_size - shortfall;
  let next_payload = next.payload();

  if remainder >= MIN_BLOCK_SIZE {
    // `next` shrinks and slides forward rather than disappearing: its
    // list slot — same predecessor, same successor — is inherited by the
    // smaller block left behind at the shifted address. The shortfall is
    // always a multiple of the alignment, so it can be as small as one
    // header word — enough to land the remainder's header directly on
    // top of `next`'s own link words, which is why those links are
    // captured before anything gets overwritten.
    unsafe {
      let (forward, backward) = freelist::links_of(next_payload);
      header.write(block_size, true);
      let remainder_header = BlockHeader(header.end());
      remainder_header.write(remainder, false);
      freelist::relink(list_head, remainder_header.payload(), forward, backward);
    }
  } else {
    unsafe {
      freelist::excise(list_head, next_payload);
      header.write(current_size + next_size, true);
    }
  }
  header.payload()
}
