//! Sharing the core between foreground code and the interrupt handler

use crate::UsbCore;
use core::cell::RefCell;
use cortex_m::interrupt::{self, CriticalSection, Mutex};

/// A [`UsbCore`] that both foreground code and the USB interrupt handler
/// may use
///
/// Every access runs in a critical section, so the interrupt handler never
/// observes a half-updated channel or endpoint. Finish role init before
/// wrapping the core.
///
/// ```no_run
/// use usbfs_otg::{shared::Shared, UsbCore};
/// # struct Usb; unsafe impl usbfs_otg::Peripherals for Usb { fn core(&self) -> *const () { 0x5000_0000 as _ } }
/// # struct Delay;
/// # impl embedded_hal::blocking::delay::DelayMs<u32> for Delay { fn delay_ms(&mut self, _: u32) {} }
/// # impl embedded_hal::blocking::delay::DelayUs<u32> for Delay { fn delay_us(&mut self, _: u32) {} }
/// # let core = UsbCore::new(Usb, Delay, Default::default());
/// let shared = Shared::new(core);
///
/// // In the interrupt handler:
/// let pending = shared.with_core_mut(|core| core.poll());
/// ```
pub struct Shared<P, D> {
    core: Mutex<RefCell<UsbCore<P, D>>>,
}

impl<P, D> Shared<P, D> {
    pub fn new(core: UsbCore<P, D>) -> Self {
        Shared {
            core: Mutex::new(RefCell::new(core)),
        }
    }

    /// Interrupt-safe, immutable access to the core
    pub fn with_core<R>(&self, func: impl FnOnce(&UsbCore<P, D>) -> R) -> R {
        interrupt::free(|cs| self.borrow_in(cs, func))
    }

    /// Interrupt-safe, mutable access to the core
    pub fn with_core_mut<R>(&self, func: impl FnOnce(&mut UsbCore<P, D>) -> R) -> R {
        interrupt::free(|cs| self.borrow_mut_in(cs, func))
    }

    fn borrow_in<R>(&self, cs: &CriticalSection, func: impl FnOnce(&UsbCore<P, D>) -> R) -> R {
        let core = self.core.borrow(cs);
        let core = core.borrow();
        func(&*core)
    }

    fn borrow_mut_in<R>(
        &self,
        cs: &CriticalSection,
        func: impl FnOnce(&mut UsbCore<P, D>) -> R,
    ) -> R {
        let core = self.core.borrow(cs);
        let mut core = core.borrow_mut();
        func(&mut *core)
    }
}
