//! A core driver for dual-role USB On-The-Go full-speed controllers
//!
//! `usbfs-otg` configures an OTG full-speed controller, lays out its shared
//! FIFO RAM, and drives host channels and device endpoints. It sits below
//! USB class drivers and host enumeration logic; those layers call into the
//! [`UsbCore`] API exposed here.
//!
//! To interface the library, you must define a safe implementation of
//! [`Peripherals`], and provide a delay source that implements the
//! `embedded-hal` blocking delay traits.
//!
//! # Bring-up
//!
//! ```no_run
//! use usbfs_otg::{Config, CoreId, Role, UsbCore};
//! # struct Usb; unsafe impl usbfs_otg::Peripherals for Usb { fn core(&self) -> *const () { 0x5000_0000 as _ } }
//! # struct Delay;
//! # impl embedded_hal::blocking::delay::DelayMs<u32> for Delay { fn delay_ms(&mut self, _: u32) {} }
//! # impl embedded_hal::blocking::delay::DelayUs<u32> for Delay { fn delay_us(&mut self, _: u32) {} }
//!
//! let mut core = UsbCore::new(Usb, Delay, Config::default());
//! core.core_select(CoreId::FullSpeed);
//! core.core_init().ok(); // Reset timeouts are not fatal
//! core.mode_set(Role::Device);
//! core.device_core_init().unwrap();
//! core.ep0_start_receive().unwrap();
//! ```
//!
//! After role init, the interrupt handler calls [`UsbCore::poll`],
//! [`UsbCore::channel_poll`], and friends. See [`shared::Shared`] for
//! a wrapper that serializes access between the handler and foreground code.

#![no_std]

#[macro_use]
mod log;

mod driver;
mod poll;
mod ral;

pub mod device;
pub mod fifo;
pub mod host;
pub mod interrupt;
pub mod shared;

#[cfg(test)]
mod sim;

pub use device::{InEndpoint, OutEndpoint};
pub use driver::{Config, CoreId, Phy, Profile, Role, RxStatus, Speed, TimeoutPolicy, UsbCore};
pub use host::{Channel, ChannelConfig, ChannelState, DataPid, Transfer};
pub use poll::Budget;

/// Errors reported by the core driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub enum Error {
    /// The core soft reset bit never cleared
    ResetTimeout,
    /// A FIFO flush never completed
    FlushTimeout,
    /// The host channel index is out of range
    InvalidChannel,
    /// The device endpoint index is out of range
    InvalidEndpoint,
    /// The channel or endpoint isn't in a state that allows the operation
    InvalidState,
    /// The FIFO layout doesn't fit in the controller's FIFO RAM
    FifoOverflow,
    /// The operation requires the other role
    WrongRole,
}

/// A type that owns the USB controller register block
///
/// # Safety
///
/// `Peripherals` should only be implemented on a type that owns the
/// controller registers. The pointer returned by [`core()`](Peripherals::core)
/// is assumed to be valid for the life of the driver, and will be cast to a
/// register definition.
///
/// # Example
///
/// ```
/// use usbfs_otg::Peripherals;
///
/// struct UsbFs {
///     _private: (),
/// }
///
/// unsafe impl Peripherals for UsbFs {
///     fn core(&self) -> *const () {
///         0x5000_0000 as *const ()
///     }
/// }
///
/// let usb = UsbFs { _private: () };
/// assert_eq!(usb.core(), 0x5000_0000 as *const ());
/// ```
pub unsafe trait Peripherals {
    /// Returns the address of the controller registers
    fn core(&self) -> *const ();
}
