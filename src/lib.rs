//! # fitalloc - A Best-Fit Free List Allocator
//!
//! This crate provides a **best-fit, address-ordered explicit free list**
//! allocator: a step up from a bump allocator that actually reuses freed
//! memory instead of only ever handing out fresh space.
//!
//! ## Overview
//!
//! Every block, free or allocated, starts with a single header word that
//! packs its size and an allocation flag:
//!
//! ```text
//!   Allocated block:                    Free block:
//!   ┌──────────┬──────────────┐         ┌──────────┬──────┬──────┬──────┐
//!   │ header   │  payload...  │         │ header   │ fwd  │ bwd  │ ...  │
//!   │ size|1   │              │         │ size|0   │      │      │      │
//!   └──────────┴──────────────┘         └──────────┴──────┴──────┴──────┘
//!      8 bytes                             8 bytes   8 B    8 B
//! ```
//!
//! Free blocks additionally carry a forward and a backward link, which
//! thread every free block — wherever it sits in memory — into a single
//! doubly linked list kept in increasing address order:
//!
//! ```text
//!   heap:  [A: free]  [B: allocated]  [C: free]  [D: allocated]  [E: free]
//!            │                          │                          │
//!            └──────────────────────────┴──────────────────────────┘
//!                         one address-ordered free list
//! ```
//!
//! No two free blocks are ever left physically touching: freeing a block
//! immediately coalesces it with whichever of its physical neighbours are
//! also free, so the list above can never actually show two adjacent free
//! entries — `A` and `C` above are separated by the allocated `B`.
//!
//! ## Crate Structure
//!
//! ```text
//!   fitalloc
//!   ├── align      - fixed 8-byte alignment helpers
//!   ├── heap       - the simulated sbrk-like backing region
//!   ├── block      - block header geometry (size | alloc flag)
//!   ├── freelist   - the address-ordered doubly linked free list
//!   ├── alloc      - best-fit search, splitting, tail extension
//!   ├── dealloc    - freeing with bidirectional coalescing
//!   ├── realloc    - in-place growth, with a copying fallback
//!   └── checker    - heap consistency checking
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use fitalloc::Allocator;
//!
//! let mut heap = Allocator::new();
//! let a = heap.allocate(24);
//! assert!(!a.is_null());
//!
//! unsafe {
//!     *(a as *mut u64) = 42;
//!     heap.free(a);
//! }
//!
//! assert!(heap.check().ok());
//! ```
//!
//! ## How It Works
//!
//! `allocate` walks the free list for the *smallest* block that still
//! fits the request (best fit), splitting off any leftover that is big
//! enough to be worth keeping as its own free block. If nothing fits, and
//! the physically last block in the heap happens to be free but merely
//! too small, only the shortfall is requested from the backing heap and
//! that block is grown in place — the heap only grows by exactly what is
//! missing, not by a whole new block's worth.
//!
//! `free` walks the free list to find the freed block's would-be
//! neighbours by address, checks whether either of them is also its
//! physical neighbour, and merges accordingly — there is no per-block
//! footer, so backward coalescing relies entirely on the free list
//! already being kept in address order.
//!
//! `reallocate` tries, in order, to avoid moving the payload at all: doing
//! nothing if the block is already big enough, growing into a free
//! physical successor, or extending the heap if the block is the last one
//! in it. Only when none of those apply does it fall back to a fresh
//! allocation, a copy, and a free of the old block.
//!
//! ## Features
//!
//! - **Best-fit placement**: minimizes the leftover fragment on each
//!   allocation, at the cost of a full free-list scan.
//! - **Bidirectional coalescing**: adjacent free blocks never accumulate.
//! - **In-place realloc**: grows without moving whenever the surrounding
//!   memory allows it.
//! - **Consistency checking**: [`Allocator::check`] walks both the free
//!   list and the physical heap and reports where they disagree.
//!
//! ## Limitations
//!
//! - **Single-threaded core**: [`Allocator`] itself holds no lock; the
//!   [`GlobalHeap`] adapter wraps one in a `Mutex` precisely because nothing
//!   about the allocator's own data structures is safe to touch from two
//!   threads at once.
//! - **8-byte alignment only**: requests for a coarser alignment than the
//!   allocator's own block alignment are rejected by [`GlobalHeap`].
//! - **Simulated heap**: the backing region is a fixed-capacity
//!   reservation made once at construction, not a real growing `brk`.
//!
//! ## Safety
//!
//! This crate is inherently unsafe, as it deals with raw memory
//! management: block headers and free-list links are read and written
//! through raw pointers, and [`Allocator::free`] and
//! [`Allocator::reallocate`] both trust the caller to pass a pointer this
//! same allocator actually handed out.

pub mod align;
mod alloc;
mod block;
mod checker;
mod dealloc;
mod freelist;
mod heap;
mod realloc;

pub use checker::CheckReport;
pub use heap::OutOfMemory;

use freelist::ListHead;
use heap::Heap;
use std::alloc::{GlobalAlloc, Layout};
use std::fmt::Write as _;
use std::ptr;
use std::sync::Mutex;

/// Default capacity used by [`Allocator::new`].
const DEFAULT_CAPACITY: usize = 16 * 1024 * 1024;

/// A best-fit, address-ordered free list allocator over its own private
/// heap.
///
/// Every method that takes a pointer as an argument — [`free`](Allocator::free)
/// and [`reallocate`](Allocator::reallocate) — requires that pointer to
/// have come from this same `Allocator`, still live. Passing a foreign
/// pointer, a double-freed pointer, or one from a different `Allocator`
/// instance is undefined behaviour, same as it would be for the C
/// standard library's `malloc`/`free`/`realloc`.
pub struct Allocator {
  heap: Heap,
  list_head: ListHead,
}

impl Default for Allocator {
  fn default() -> Self {
    Self::new()
  }
}

impl Allocator {
  /// Creates an allocator with a generous default capacity.
  pub fn new() -> Self {
    Self::with_capacity(DEFAULT_CAPACITY)
  }

  /// Creates an allocator whose backing heap can never grow past
  /// `capacity` bytes.
  pub fn with_capacity(capacity: usize) -> Self {
    let heap = Heap::with_capacity(capacity);
    let list_head = ListHead(heap.low());
    Allocator { heap, list_head }
  }

  /// Reserves the list-head slot and initial alignment padding up front.
  /// Calling this is optional: every other method primes the heap itself
  /// on first use. It exists for callers that want heap priming to happen
  /// at a predictable point rather than on the first allocation. Returns
  /// `false` only if the backing heap could not be grown enough to prime
  /// itself.
  pub fn init(&mut self) -> bool {
    alloc::ensure_primed(&mut self.heap, self.list_head).is_ok()
  }

  /// Returns a pointer to at least `max(size, 2 * size_of::<usize>())`
  /// usable bytes, or null if the backing heap cannot grow to satisfy the
  /// request. A `size` of zero is floored the same as any other small
  /// request and still returns a real, freeable block.
  pub fn allocate(&mut self, size: usize) -> *mut u8 {
    alloc::allocate(&mut self.heap, self.list_head, size).unwrap_or(ptr::null_mut())
  }

  /// Returns `payload` to the free list, merging it with any physically
  /// adjacent free blocks. A null `payload` is a no-op.
  ///
  /// # Safety
  ///
  /// `payload` must either be null or a pointer previously returned by
  /// [`Allocator::allocate`] or [`Allocator::reallocate`] on this same
  /// instance, not already freed.
  pub unsafe fn free(&mut self, payload: *mut u8) {
    if payload.is_null() {
      return;
    }
    unsafe { dealloc::free(self.list_head, payload) };
  }

  /// Resizes the block at `payload`, preserving its contents up to the
  /// smaller of the old and new sizes. Returns null only if growing the
  /// backing heap was necessary and failed; `payload` remains valid in
  /// that case. A null `payload` behaves like [`Allocator::allocate`]. A
  /// `size` of zero frees `payload` and returns it unchanged — the
  /// returned pointer must not be dereferenced afterward.
  ///
  /// # Safety
  ///
  /// `payload` must either be null or a live pointer previously returned
  /// by this same instance.
  pub unsafe fn reallocate(&mut self, payload: *mut u8, size: usize) -> *mut u8 {
    unsafe { realloc::reallocate(&mut self.heap, self.list_head, payload, size) }
      .unwrap_or(ptr::null_mut())
  }

  /// Walks the free list and the physical heap and cross-checks them.
  pub fn check(&self) -> CheckReport {
    checker::check(&self.heap, self.list_head)
  }

  /// Renders a line per block, in address order, for debugging. Intended
  /// for humans reading test failures, not for parsing.
  pub fn describe(&self) -> String {
    let mut out = String::new();
    if self.heap.size() == 0 {
      out.push_str("(heap not yet primed)\n");
      return out;
    }
    let mut cursor = alloc::first_block_header(&self.heap);
    while (cursor as usize) < self.heap.end() as usize {
      let header = block::BlockHeader(cursor);
      let size = unsafe { header.size() };
      let allocated = unsafe { header.is_allocated() };
      let _ = writeln!(
        out,
        "{:p}: {size} bytes, {}",
        cursor,
        if allocated { "allocated" } else { "free" }
      );
      cursor = unsafe { header.end() };
    }
    out
  }
}

/// A [`GlobalAlloc`] adapter around an [`Allocator`].
///
/// `Allocator` itself is not `Sync` — none of its methods take `&self`
/// where concurrent callers could race on the free list — so this wraps
/// one in a `Mutex`. Declare it as:
///
/// ```rust
/// use fitalloc::GlobalHeap;
///
/// #[global_allocator]
/// static ALLOCATOR: GlobalHeap = GlobalHeap::new();
/// ```
pub struct GlobalHeap {
  inner: Mutex<Option<Allocator>>,
}

impl GlobalHeap {
  pub const fn new() -> Self {
    GlobalHeap { inner: Mutex::new(None) }
  }
}

impl Default for GlobalHeap {
  fn default() -> Self {
    Self::new()
  }
}

// SAFETY: all access to the inner `Allocator` goes through the `Mutex`;
// there is no other shared state.
unsafe impl Sync for GlobalHeap {}

unsafe impl GlobalAlloc for GlobalHeap {
  unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
    if layout.align() > align::ALIGNMENT {
      return ptr::null_mut();
    }
    let mut guard = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let allocator = guard.get_or_insert_with(Allocator::new);
    allocator.allocate(layout.size())
  }

  unsafe fn dealloc(&self, payload: *mut u8, _layout: Layout) {
    let mut guard = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(allocator) = guard.as_mut() {
      unsafe { allocator.free(payload) };
    }
  }

  unsafe fn realloc(&self, payload: *mut u8, _layout: Layout, new_size: usize) -> *mut u8 {
    let mut guard = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let allocator = guard.get_or_insert_with(Allocator::new);
    unsafe { allocator.reallocate(payload, new_size) }
  }
}
