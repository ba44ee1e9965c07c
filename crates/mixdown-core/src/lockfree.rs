//! Lock-free primitives shared between the audio thread and pollers.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};

/// Cache-line aligned atomic bool.
#[derive(Debug)]
#[repr(align(64))]
pub struct AtomicFlag {
    value: AtomicBool,
}

impl AtomicFlag {
    pub fn new(value: bool) -> Self {
        Self {
            value: AtomicBool::new(value),
        }
    }

    #[inline]
    pub fn get(&self) -> bool {
        self.value.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set(&self, value: bool) {
        self.value.store(value, Ordering::Release);
    }

    #[inline]
    pub fn swap(&self, value: bool) -> bool {
        self.value.swap(value, Ordering::AcqRel)
    }
}

impl Default for AtomicFlag {
    fn default() -> Self {
        Self::new(false)
    }
}

/// Cache-line aligned sample/cycle counter.
///
/// Written by one thread, read lossily by any number of pollers.
#[derive(Debug)]
#[repr(align(64))]
pub struct AtomicCounter {
    value: AtomicU64,
}

impl AtomicCounter {
    pub fn new(value: u64) -> Self {
        Self {
            value: AtomicU64::new(value),
        }
    }

    #[inline]
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set(&self, value: u64) {
        self.value.store(value, Ordering::Relaxed);
    }

    #[inline]
    pub fn add(&self, delta: u64) -> u64 {
        self.value.fetch_add(delta, Ordering::Relaxed) + delta
    }

    #[inline]
    pub fn increment(&self) -> u64 {
        self.add(1)
    }
}

impl Default for AtomicCounter {
    fn default() -> Self {
        Self::new(0)
    }
}

/// Atomic storage for a small `Copy` enum encoded as `u8`.
#[derive(Debug, Default)]
pub struct AtomicTag {
    value: AtomicU8,
}

impl AtomicTag {
    pub fn new(value: u8) -> Self {
        Self {
            value: AtomicU8::new(value),
        }
    }

    #[inline]
    pub fn get(&self) -> u8 {
        self.value.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set(&self, value: u8) {
        self.value.store(value, Ordering::Release);
    }
}
