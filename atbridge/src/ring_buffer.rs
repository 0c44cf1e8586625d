//! Fixed-capacity single-producer/single-consumer byte queue.
//!
//! The producer suspends while the buffer is full and the consumer suspends
//! while it is empty, so no byte is ever dropped or overwritten. Bytes are
//! popped in exactly the order their pushes completed.
//!
//! Only one task may push and only one task may pop. Nothing protects against
//! several producers racing for the `not_full` wakeup.

use core::cell::RefCell;
use embassy_sync::{
    blocking_mutex::{raw::CriticalSectionRawMutex, Mutex},
    signal::Signal,
};

struct Ring<const N: usize> {
    storage: [u8; N],
    write_index: usize,
    read_index: usize,
    count: usize,
}

impl<const N: usize> Ring<N> {
    const fn new() -> Self {
        Self {
            storage: [0; N],
            write_index: 0,
            read_index: 0,
            count: 0,
        }
    }

    fn push(&mut self, byte: u8) -> Result<(), u8> {
        if self.count == N {
            return Err(byte);
        }
        self.storage[self.write_index] = byte;
        self.write_index = (self.write_index + 1) % N;
        self.count += 1;
        Ok(())
    }

    fn pop(&mut self) -> Option<u8> {
        if self.count == 0 {
            return None;
        }
        let byte = self.storage[self.read_index];
        self.read_index = (self.read_index + 1) % N;
        self.count -= 1;
        Some(byte)
    }
}

pub struct RingBuffer<const N: usize> {
    ring: Mutex<CriticalSectionRawMutex, RefCell<Ring<N>>>,
    not_empty: Signal<CriticalSectionRawMutex, ()>,
    not_full: Signal<CriticalSectionRawMutex, ()>,
}

impl<const N: usize> Default for RingBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> RingBuffer<N> {
    pub const fn new() -> Self {
        Self {
            ring: Mutex::new(RefCell::new(Ring::new())),
            not_empty: Signal::new(),
            not_full: Signal::new(),
        }
    }

    /// Store `byte`, waiting for a free slot if the buffer is full.
    pub async fn push(&self, mut byte: u8) {
        loop {
            match self.try_push(byte) {
                Ok(()) => return,
                Err(rejected) => {
                    byte = rejected;
                    self.not_full.wait().await;
                }
            }
        }
    }

    /// Take the oldest byte, waiting for one to arrive if the buffer is empty.
    pub async fn pop(&self) -> u8 {
        loop {
            if let Some(byte) = self.try_pop() {
                return byte;
            }
            self.not_empty.wait().await;
        }
    }

    /// Store `byte` without waiting. Hands the byte back if the buffer is full.
    pub fn try_push(&self, byte: u8) -> Result<(), u8> {
        self.ring.lock(|ring| ring.borrow_mut().push(byte))?;
        self.not_empty.signal(());
        Ok(())
    }

    /// Take the oldest byte without waiting.
    pub fn try_pop(&self) -> Option<u8> {
        let byte = self.ring.lock(|ring| ring.borrow_mut().pop())?;
        self.not_full.signal(());
        Some(byte)
    }

    /// Number of bytes available to read
    pub fn len(&self) -> usize {
        self.ring.lock(|ring| ring.borrow().count)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == N
    }

    pub const fn capacity(&self) -> usize {
        N
    }
}
