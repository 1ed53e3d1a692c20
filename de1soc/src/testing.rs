//! Helpers for host tests.

use std::boxed::Box;

/// Heap memory standing in for a block of device registers.
pub struct RegBlock {
    ptr: *mut u32,
    words: usize,
}

impl RegBlock {
    /// Allocates a zeroed block of `words` 32-bit registers.
    pub fn new(words: usize) -> RegBlock {
        let mem = vec![0u32; words].into_boxed_slice();
        let ptr = Box::into_raw(mem) as *mut u32;
        RegBlock { ptr, words }
    }

    /// Base address to hand over to a driver.
    pub fn base(&self) -> usize {
        self.ptr as usize
    }

    /// Size of the block in bytes.
    pub fn size(&self) -> usize {
        self.words * 4
    }

    /// Reads the register at byte offset `reg`.
    pub fn read(&self, reg: usize) -> u32 {
        assert!(reg / 4 < self.words);
        unsafe { self.ptr.add(reg / 4).read_volatile() }
    }

    /// Writes the register at byte offset `reg`.
    pub fn write(&self, reg: usize, val: u32) {
        assert!(reg / 4 < self.words);
        unsafe { self.ptr.add(reg / 4).write_volatile(val) }
    }
}

impl Drop for RegBlock {
    fn drop(&mut self) {
        let slice = core::ptr::slice_from_raw_parts_mut(self.ptr, self.words);
        drop(unsafe { Box::from_raw(slice) });
    }
}
