use std::alloc::Layout;
use std::io::Read;

use fitalloc::Allocator;

/// Waits until the user presses ENTER. Useful when you want to inspect the
/// process's own memory state with tools like `pmap` or `htop` between
/// steps, the same way you would watch a real `brk`-backed heap grow.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

fn print_state(label: &str, heap: &Allocator) {
  println!("\n[{label}]");
  print!("{}", heap.describe());
}

fn main() {
  let mut heap = Allocator::new();

  // --------------------------------------------------------------------
  // 1) Allocate space for a u32 and write through the returned pointer.
  // --------------------------------------------------------------------
  let layout_u32 = Layout::new::<u32>();
  let first = heap.allocate(layout_u32.size());
  println!("\n[1] Allocate u32");
  print_state("after first allocation", &heap);

  let first_ptr = first as *mut u32;
  unsafe { first_ptr.write(0xDEAD_BEEF) };
  println!("[1] value written = 0x{:X}", unsafe { first_ptr.read() });
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 2) Allocate 12 bytes, then free the first block and watch it
  //    rejoin the free list instead of vanishing.
  // --------------------------------------------------------------------
  let second = heap.allocate(12);
  println!("\n[2] Allocate [u8; 12]");
  print_state("after second allocation", &heap);

  unsafe { heap.free(first as *mut u8) };
  println!("\n[3] Free the first allocation");
  print_state("after freeing the first block", &heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 3) Grow the second allocation past its current block; since nothing
  //    free sits beside it yet, this falls back to copy + free.
  // --------------------------------------------------------------------
  let grown = unsafe { heap.reallocate(second as *mut u8, 256) };
  println!("\n[4] Reallocate the second block up to 256 bytes");
  print_state("after reallocating", &heap);

  println!("\n[5] Consistency check: {}", heap.check().ok());

  unsafe { heap.free(grown) };
}
