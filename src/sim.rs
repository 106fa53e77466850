//! A RAM-backed register block and a recording delay for unit tests
//!
//! Registers never self-clear. Reset and flush bits stay set, flags written
//! as one stay set, and the FIFO windows hold the last word written.

extern crate std;

use crate::{ral::RegisterBlock, Peripherals};
use embedded_hal::blocking::delay::{DelayMs, DelayUs};
use std::{boxed::Box, vec, vec::Vec};

const BYTES: usize = 0x9000;

/// A simulated controller
///
/// Copies share the same registers. The memory is leaked, so that it
/// outlives any driver that points at it.
#[derive(Clone, Copy)]
pub struct Sim {
    base: *mut u32,
}

impl Sim {
    pub fn new() -> Self {
        let ram: &'static mut [u32] = Box::leak(vec![0u32; BYTES / 4].into_boxed_slice());
        Sim {
            base: ram.as_mut_ptr(),
        }
    }

    pub fn regs(&self) -> &'static RegisterBlock {
        // Safety: the RAM is leaked, word aligned, and large enough.
        unsafe { &*self.base.cast::<RegisterBlock>() }
    }

    /// Read the word at byte `offset`
    pub fn word(&self, offset: usize) -> u32 {
        assert!(offset % 4 == 0 && offset < BYTES);
        // Safety: checked above.
        unsafe { self.base.add(offset / 4).read_volatile() }
    }

    /// Write the word at byte `offset`, as the hardware would
    pub fn set_word(&self, offset: usize, value: u32) {
        assert!(offset % 4 == 0 && offset < BYTES);
        // Safety: checked above.
        unsafe { self.base.add(offset / 4).write_volatile(value) }
    }
}

unsafe impl Peripherals for Sim {
    fn core(&self) -> *const () {
        self.base.cast_const().cast()
    }
}

/// A delay that only advances simulated time
///
/// When probing, every millisecond delay records its duration and the
/// value of one register at the start of the delay.
pub struct Clock {
    elapsed_us: u64,
    probe: Option<(Sim, usize)>,
    samples: Vec<(u32, u32)>,
}

impl Clock {
    pub fn new() -> Self {
        Clock {
            elapsed_us: 0,
            probe: None,
            samples: Vec::new(),
        }
    }

    /// Sample the register at byte `offset` on every millisecond delay
    pub fn probing(sim: Sim, offset: usize) -> Self {
        Clock {
            probe: Some((sim, offset)),
            ..Clock::new()
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_us / 1_000
    }

    pub fn elapsed_us(&self) -> u64 {
        self.elapsed_us
    }

    /// `(milliseconds, register value)` for each delay, oldest first
    pub fn samples(&self) -> &[(u32, u32)] {
        &self.samples
    }
}

impl DelayMs<u32> for Clock {
    fn delay_ms(&mut self, ms: u32) {
        if let Some((sim, offset)) = self.probe {
            self.samples.push((ms, sim.word(offset)));
        }
        self.elapsed_us += u64::from(ms) * 1_000;
    }
}

impl DelayUs<u32> for Clock {
    fn delay_us(&mut self, us: u32) {
        self.elapsed_us += u64::from(us);
    }
}
