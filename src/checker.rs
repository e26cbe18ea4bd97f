//! Heap consistency checking.
//!
//! Walks the heap two ways — once along the free list, once block by
//! block through memory — and cross-checks them against each other and
//! against the block headers themselves. An empty, unprimed heap reports
//! consistent: there is nothing in it to be inconsistent about.

use crate::align::ALIGNMENT;
use crate::alloc::first_block_header;
use crate::block::BlockHeader;
use crate::freelist::{self, ListHead};
use crate::heap::Heap;
use std::collections::HashSet;

/// Result of [`crate::Allocator::check`]. `ok()` is what most callers
/// want; `violations` exists so a caller can print out what went wrong.
#[derive(Debug, Clone, Default)]
pub struct CheckReport {
  violations: Vec<String>,
}

impl CheckReport {
  pub fn ok(&self) -> bool {
    self.violations.is_empty()
  }

  pub fn violations(&self) -> &[String] {
    &self.violations
  }

  fn fail(&mut self, message: impl Into<String>) {
    self.violations.push(message.into());
  }
}

pub(crate) fn check(heap: &Heap, list_head: ListHead) -> CheckReport {
  let mut report = CheckReport::default();
  if heap.size() == 0 {
    return report;
  }

  let mut listed = HashSet::new();
  let mut cursor = unsafe { list_head.get() };
  let mut previous_bwd_slot: Option<*mut u8> = None;
  let mut previous_addr: Option<usize> = None;
  while !cursor.is_null() {
    if (cursor as usize) < heap.low() as usize || (cursor as usize) >= heap.end() as usize {
      report.fail(format!("free list node {:p} lies outside the heap", cursor));
      break;
    }
    if let Some(prev) = previous_addr {
      if cursor as usize <= prev {
        report.fail(format!(
          "free list node {:p} does not strictly increase over its predecessor at {:#x}",
          cursor, prev
        ));
        break;
      }
    }
    let header = unsafe { BlockHeader::from_payload(cursor) };
    if unsafe { header.is_allocated() } {
      report.fail(format!("block {:p} is in the free list but marked allocated", header.0));
    }
    if unsafe { header.size() } % ALIGNMENT != 0 {
      report.fail(format!("block {:p} has a size not a multiple of {ALIGNMENT}", header.0));
    }
    let expected_bwd = previous_bwd_slot.unwrap_or(std::ptr::null_mut());
    let actual_bwd = unsafe { *freelist::bwd_slot(cursor) };
    if actual_bwd != expected_bwd {
      report.fail(format!("block {:p} has a backward link inconsistent with its predecessor", header.0));
    }
    if !listed.insert(cursor as usize) {
      report.fail(format!("free list node {:p} appears twice (cycle)", cursor));
      break;
    }
    previous_addr = Some(cursor as usize);
    previous_bwd_slot = Some(freelist::bwd_slot(cursor) as *mut u8);
    cursor = unsafe { freelist::forward_of(cursor) };
  }

  let mut physically_free = HashSet::new();
  let mut walk = first_block_header(heap);
  let mut previous_free: Option<BlockHeader> = None;
  while (walk as usize) < heap.end() as usize {
    let header = BlockHeader(walk);
    let size = unsafe { header.size() };
    if size == 0 {
      report.fail(format!("block {:p} has size zero; header walk cannot proceed", walk));
      break;
    }
    let end = unsafe { header.end() };
    if end as usize > heap.end() as usize {
      report.fail(format!("block {:p} of size {size} runs past the end of the heap", walk));
      break;
    }
    let is_free = !unsafe { header.is_allocated() };
    if is_free {
      physically_free.insert(unsafe { header.payload() } as usize);
      if let Some(prev) = previous_free {
        report.fail(format!(
          "blocks {:p} and {:p} are both free and physically adjacent; they should have been coalesced",
          prev.0, header.0
        ));
      }
    }
    previous_free = if is_free { Some(header) } else { None };
    walk = end;
  }
  if walk as usize != heap.end() as usize {
    report.fail("block headers do not exactly tile the heap".to_string());
  }

  if listed != physically_free {
    report.fail("the free list and the physical set of free blocks disagree".to_string());
  }

  report
}
