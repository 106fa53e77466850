//! Interrupt flag sets and the enable policy for each role
//!
//! The driver doesn't own the interrupt vector. It decides which bits to
//! enable, and hands raw flags back to the caller's interrupt handler.

use bitflags::bitflags;
use usb_device::{endpoint::EndpointType, UsbDirection};

bitflags! {
    /// Global interrupt flags and enables
    ///
    /// The same bit positions are used for the flag and enable registers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Global : u32 {
        const MODE_MISMATCH = 1 << 1;
        const OTG = 1 << 2;
        const SOF = 1 << 3;
        const RX_FIFO_NOT_EMPTY = 1 << 4;
        const NON_PERIODIC_TX_FIFO_EMPTY = 1 << 5;
        const GLOBAL_IN_NAK = 1 << 6;
        const GLOBAL_OUT_NAK = 1 << 7;
        const EARLY_SUSPEND = 1 << 10;
        const SUSPEND = 1 << 11;
        const RESET = 1 << 12;
        const ENUMERATION_DONE = 1 << 13;
        const ISO_OUT_DROPPED = 1 << 14;
        const END_OF_PERIODIC_FRAME = 1 << 15;
        const IN_ENDPOINT = 1 << 18;
        const OUT_ENDPOINT = 1 << 19;
        const ISO_IN_INCOMPLETE = 1 << 20;
        const ISO_OUT_INCOMPLETE = 1 << 21;
        const HOST_PORT = 1 << 24;
        const HOST_CHANNEL = 1 << 25;
        const PERIODIC_TX_FIFO_EMPTY = 1 << 26;
        const ID_PIN_CHANGE = 1 << 28;
        const DISCONNECT = 1 << 29;
        const SESSION = 1 << 30;
        const WAKEUP = 1 << 31;
    }
}

bitflags! {
    /// Host channel interrupt flags and enables
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Channel : u32 {
        /// Transfer finished
        const TRANSFER_FINISHED = 1 << 0;
        /// Channel halted
        const HALTED = 1 << 1;
        const STALL = 1 << 3;
        const NAK = 1 << 4;
        const ACK = 1 << 5;
        const NYET = 1 << 6;
        /// USB bus, or transaction, error
        const TRANSACTION_ERROR = 1 << 7;
        const BABBLE = 1 << 8;
        /// Request queue, or frame, overrun
        const FRAME_OVERRUN = 1 << 9;
        const DATA_TOGGLE_ERROR = 1 << 10;
    }
}

bitflags! {
    /// Device endpoint interrupt flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Endpoint : u32 {
        const TRANSFER_FINISHED = 1 << 0;
        const DISABLED = 1 << 1;
        /// IN: timeout. OUT: SETUP phase finished
        const TIMEOUT_OR_SETUP = 1 << 3;
        /// IN: token received while Tx FIFO empty. OUT: token received while disabled
        const TOKEN_RECEIVED = 1 << 4;
        const NAK_EFFECTIVE = 1 << 6;
        const TX_FIFO_EMPTY = 1 << 7;
    }
}

impl Channel {
    /// Errors the hardware reports for a transfer
    pub const ERRORS: Self = Self::STALL
        .union(Self::TRANSACTION_ERROR)
        .union(Self::BABBLE)
        .union(Self::FRAME_OVERRUN)
        .union(Self::DATA_TOGGLE_ERROR);
}

/// Interrupts used by both roles
pub fn common(otg: bool) -> Global {
    let mut mask = Global::WAKEUP | Global::SUSPEND;
    if otg {
        mask |= Global::OTG | Global::SESSION | Global::ID_PIN_CHANGE;
    }
    mask
}

/// Interrupts needed in host mode
pub fn host(otg: bool) -> Global {
    common(otg)
        | Global::RX_FIFO_NOT_EMPTY
        | Global::HOST_PORT
        | Global::HOST_CHANNEL
        | Global::DISCONNECT
        | Global::SOF
        | Global::ISO_OUT_INCOMPLETE
}

/// Interrupts needed in device mode
pub fn device(otg: bool, vbus_sensing: bool) -> Global {
    let mut mask = common(otg)
        | Global::RX_FIFO_NOT_EMPTY
        | Global::SUSPEND
        | Global::RESET
        | Global::ENUMERATION_DONE
        | Global::IN_ENDPOINT
        | Global::OUT_ENDPOINT
        | Global::SOF
        | Global::ISO_OUT_INCOMPLETE
        | Global::ISO_IN_INCOMPLETE;
    if vbus_sensing {
        mask |= Global::SESSION | Global::OTG;
    }
    mask
}

/// Channel interrupts relevant to an endpoint of this type and direction
pub fn channel(kind: EndpointType, direction: UsbDirection) -> Channel {
    let is_in = direction == UsbDirection::In;
    match kind {
        EndpointType::Control | EndpointType::Bulk => {
            let mask = Channel::TRANSFER_FINISHED
                | Channel::STALL
                | Channel::TRANSACTION_ERROR
                | Channel::DATA_TOGGLE_ERROR
                | Channel::NAK;
            if is_in {
                mask | Channel::BABBLE
            } else {
                mask | Channel::NYET
            }
        }
        EndpointType::Interrupt => {
            let mask = Channel::TRANSFER_FINISHED
                | Channel::STALL
                | Channel::TRANSACTION_ERROR
                | Channel::DATA_TOGGLE_ERROR
                | Channel::NAK
                | Channel::FRAME_OVERRUN;
            if is_in {
                mask | Channel::BABBLE
            } else {
                mask
            }
        }
        EndpointType::Isochronous { .. } => {
            let mask = Channel::TRANSFER_FINISHED | Channel::FRAME_OVERRUN | Channel::ACK;
            if is_in {
                mask | Channel::TRANSACTION_ERROR | Channel::BABBLE
            } else {
                mask
            }
        }
    }
}
