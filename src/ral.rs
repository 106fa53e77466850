//! Register access layer for the OTG full-speed controller
//!
//! The layout follows the `ral-registers` conventions: every register is a
//! `RWRegister<u32>` field in a `#[repr(C)]` block, and every register has a
//! same-named module describing its fields. Use the re-exported
//! `read_reg!`, `write_reg!`, and `modify_reg!` macros to access them.
//!
//! Host channels and device endpoints repeat with a 0x20 stride. They're
//! modeled as sub-blocks with their own field modules ([`hc`], [`ep`]).

#![allow(non_snake_case, non_upper_case_globals, clippy::upper_case_acronyms)]

pub use ral_registers::{modify_reg, read_reg, write_reg, RWRegister};

/// Number of host channels implemented by the controller
pub const CHANNEL_COUNT: usize = 8;
/// Number of device endpoints, per direction
pub const ENDPOINT_COUNT: usize = 4;

/// Describes register fields in the shape the RAL macros expect.
///
/// `FIELD[offset, width]` optionally followed by `{ NAME = value, ... }`
/// for enumerated values, which the macros bring into scope.
macro_rules! fields {
    ($($field:ident [$offset:expr, $width:expr] $({ $($name:ident = $val:expr),* $(,)? })?;)*) => {
        $(
            pub mod $field {
                pub const offset: u32 = $offset;
                pub const mask: u32 = ((((1u64) << $width) - 1) as u32) << offset;
                pub mod R {}
                pub mod W {}
                pub mod RW {
                    $($(pub const $name: u32 = $val;)*)?
                }
            }
        )*
    };
}

/// Controller register block, starting at the controller's base address
#[repr(C)]
pub struct RegisterBlock {
    pub GOTGCS: RWRegister<u32>,
    pub GOTGINTF: RWRegister<u32>,
    pub GAHBCS: RWRegister<u32>,
    pub GUSBCS: RWRegister<u32>,
    pub GRSTCTL: RWRegister<u32>,
    pub GINTF: RWRegister<u32>,
    pub GINTEN: RWRegister<u32>,
    pub GRSTATR: RWRegister<u32>,
    pub GRSTATP: RWRegister<u32>,
    pub GRFLEN: RWRegister<u32>,
    /// Device IN endpoint 0 Tx FIFO length, or host non-periodic Tx FIFO length
    pub TX0FLEN: RWRegister<u32>,
    pub HNPTFQSTAT: RWRegister<u32>,
    _reserved0: [u32; 2],
    pub GCCFG: RWRegister<u32>,
    pub CID: RWRegister<u32>,
    _reserved1: [u32; 48],
    pub HPTFLEN: RWRegister<u32>,
    /// Device IN endpoint 1..=3 Tx FIFO lengths
    pub DIEPTFLEN: [RWRegister<u32>; ENDPOINT_COUNT - 1],
    _reserved2: [u32; 188],
    pub HCTL: RWRegister<u32>,
    pub HFT: RWRegister<u32>,
    pub HFINFR: RWRegister<u32>,
    _reserved3: u32,
    pub HPTFQSTAT: RWRegister<u32>,
    pub HACHINT: RWRegister<u32>,
    pub HACHINTEN: RWRegister<u32>,
    _reserved4: [u32; 9],
    pub HPCS: RWRegister<u32>,
    _reserved5: [u32; 47],
    pub HC: [hc::RegisterBlock; CHANNEL_COUNT],
    _reserved6: [u32; 128],
    pub DCFG: RWRegister<u32>,
    pub DCTL: RWRegister<u32>,
    pub DSTAT: RWRegister<u32>,
    _reserved7: u32,
    pub DIEPINTEN: RWRegister<u32>,
    pub DOEPINTEN: RWRegister<u32>,
    pub DAEPINT: RWRegister<u32>,
    pub DAEPINTEN: RWRegister<u32>,
    _reserved8: [u32; 5],
    pub DIEPFEINTEN: RWRegister<u32>,
    _reserved9: [u32; 50],
    pub DIEP: [ep::RegisterBlock; ENDPOINT_COUNT],
    _reserved10: [u32; 96],
    pub DOEP: [ep::RegisterBlock; ENDPOINT_COUNT],
    _reserved11: [u32; 160],
    pub PWRCLKCTL: RWRegister<u32>,
    _reserved12: [u32; 127],
    /// Data FIFO windows, one per channel / endpoint
    pub FIFO: [fifo::RegisterBlock; CHANNEL_COUNT],
}

const _: () = {
    use core::mem::{offset_of, size_of};
    assert!(offset_of!(RegisterBlock, GCCFG) == 0x038);
    assert!(offset_of!(RegisterBlock, HPTFLEN) == 0x100);
    assert!(offset_of!(RegisterBlock, HCTL) == 0x400);
    assert!(offset_of!(RegisterBlock, HPCS) == 0x440);
    assert!(offset_of!(RegisterBlock, HC) == 0x500);
    assert!(offset_of!(RegisterBlock, DCFG) == 0x800);
    assert!(offset_of!(RegisterBlock, DIEPFEINTEN) == 0x834);
    assert!(offset_of!(RegisterBlock, DIEP) == 0x900);
    assert!(offset_of!(RegisterBlock, DOEP) == 0xB00);
    assert!(offset_of!(RegisterBlock, PWRCLKCTL) == 0xE00);
    assert!(offset_of!(RegisterBlock, FIFO) == 0x1000);
    assert!(size_of::<hc::RegisterBlock>() == 0x20);
    assert!(size_of::<ep::RegisterBlock>() == 0x20);
    assert!(size_of::<fifo::RegisterBlock>() == 0x1000);
};

pub mod GOTGCS {
    fields! {
        HHNPEN[10, 1];
    }
}

pub mod GAHBCS {
    fields! {
        GINTEN[0, 1];
        TXFTH[7, 1] { HALF_EMPTY = 0, EMPTY = 1 };
        PTXFTH[8, 1];
    }
}

pub mod GUSBCS {
    fields! {
        SRPCAP[8, 1];
        HNPCAP[9, 1];
        FHM[29, 1];
        FDM[30, 1];
    }
}

pub mod GRSTCTL {
    fields! {
        CSRST[0, 1];
        RXFF[4, 1];
        TXFF[5, 1];
        TXFNUM[6, 5] { ALL = 0x10 };
    }
}

pub mod GINTF {
    fields! {
        COPM[0, 1] { DEVICE = 0, HOST = 1 };
    }
}

pub mod GRSTATP {
    fields! {
        EPNUM[0, 4];
        BCOUNT[4, 11];
        DPID[15, 2];
        RPCKST[17, 4];
    }
}

pub mod GRFLEN {
    fields! {
        RXFD[0, 16];
    }
}

pub mod HNPTFQSTAT {
    fields! {
        NPTXFS[0, 16];
        NPTXRQS[16, 8];
    }
}

pub mod GCCFG {
    fields! {
        PWRON[16, 1];
        VBUSACEN[18, 1];
        VBUSBCEN[19, 1];
        SOFOEN[20, 1];
        VBUSIG[21, 1];
    }
}

pub mod HCTL {
    fields! {
        CLKSEL[0, 2] { CLK_48MHZ = 1, CLK_6MHZ = 2 };
    }
}

pub mod HFINFR {
    fields! {
        FRNUM[0, 16];
    }
}

pub mod HPTFQSTAT {
    fields! {
        PTXFS[0, 16];
        PTXREQS[16, 8];
    }
}

pub mod HPCS {
    fields! {
        PCST[0, 1];
        PCD[1, 1];
        PE[2, 1];
        PEDC[3, 1];
        PREM[6, 1];
        PSP[7, 1];
        PRST[8, 1];
        PP[12, 1];
        PS[17, 2] { FULL = 1, LOW = 2 };
    }

    /// Bits that clear when written as one. Never write these back from a read.
    pub const W1C: u32 = PCD::mask | PE::mask | PEDC::mask;
}

pub mod DCFG {
    fields! {
        DS[0, 2] { FULL_SPEED = 3 };
        DAR[4, 7];
        EOPFT[11, 2] { FRAME_80 = 0, FRAME_85 = 1, FRAME_90 = 2, FRAME_95 = 3 };
    }
}

pub mod DCTL {
    fields! {
        RWKUP[0, 1];
        SD[1, 1];
    }
}

pub mod DSTAT {
    fields! {
        SPST[0, 1];
        FNRSOF[8, 14];
    }
}

pub mod PWRCLKCTL {
    fields! {
        SUCLK[0, 1];
        SHCLK[1, 1];
    }
}

/// One host channel register set
pub mod hc {
    use super::RWRegister;

    #[repr(C)]
    pub struct RegisterBlock {
        pub CTL: RWRegister<u32>,
        _reserved0: u32,
        pub INTF: RWRegister<u32>,
        pub INTEN: RWRegister<u32>,
        pub LEN: RWRegister<u32>,
        _reserved1: [u32; 3],
    }

    pub mod CTL {
        fields! {
            MPL[0, 11];
            EPNUM[11, 4];
            EPDIR[15, 1] { OUT = 0, IN = 1 };
            LSD[17, 1];
            EPTYPE[18, 2] { CONTROL = 0, ISOCHRONOUS = 1, BULK = 2, INTERRUPT = 3 };
            DAR[22, 7];
            ODDFRM[29, 1];
            CDIS[30, 1];
            CEN[31, 1];
        }
    }

    pub mod LEN {
        fields! {
            TLEN[0, 19];
            PCNT[19, 10];
            DPID[29, 2] { DATA0 = 0, DATA2 = 1, DATA1 = 2, SETUP = 3 };
        }
    }
}

/// One device endpoint register set, IN or OUT
pub mod ep {
    use super::RWRegister;

    #[repr(C)]
    pub struct RegisterBlock {
        pub CTL: RWRegister<u32>,
        _reserved0: u32,
        pub INTF: RWRegister<u32>,
        _reserved1: u32,
        pub LEN: RWRegister<u32>,
        _reserved2: u32,
        /// IN endpoints only: Tx FIFO free space
        pub TFSTAT: RWRegister<u32>,
        _reserved3: u32,
    }

    pub mod CTL {
        fields! {
            MPL[0, 11];
            EPACT[15, 1];
            EPTYPE[18, 2];
            STALL[21, 1];
            TXFNUM[22, 4];
            CNAK[26, 1];
            SNAK[27, 1];
            EPD[30, 1];
            EPEN[31, 1];
        }
    }

    pub mod LEN {
        fields! {
            TLEN[0, 19];
            PCNT[19, 10];
            STPCNT[29, 2];
        }
    }

    pub mod TFSTAT {
        fields! {
            IEPTFS[0, 16];
        }
    }
}

/// One data FIFO window
pub mod fifo {
    use super::RWRegister;

    #[repr(C)]
    pub struct RegisterBlock {
        /// Any access within the window pushes or pops one word
        pub DATA: RWRegister<u32>,
        _reserved: [u32; 1023],
    }
}

/// The RAL macros want a named register. Tx FIFO length registers live in
/// three different places, so this wraps whichever one is selected.
pub mod tx_fifo {
    use super::{RWRegister, RegisterBlock};

    pub struct TxFifo<'a> {
        pub FLEN: &'a RWRegister<u32>,
    }

    pub mod FLEN {
        fields! {
            RSAR[0, 16];
            FD[16, 16];
        }
    }

    /// Device Tx FIFO length registers, in IN endpoint order
    pub fn device(usb: &RegisterBlock) -> impl Iterator<Item = TxFifo<'_>> {
        core::iter::once(&usb.TX0FLEN)
            .chain(usb.DIEPTFLEN.iter())
            .map(|flen| TxFifo { FLEN: flen })
    }

    /// Host non-periodic Tx FIFO length register
    pub fn host_non_periodic(usb: &RegisterBlock) -> TxFifo<'_> {
        TxFifo { FLEN: &usb.TX0FLEN }
    }

    /// Host periodic Tx FIFO length register
    pub fn host_periodic(usb: &RegisterBlock) -> TxFifo<'_> {
        TxFifo { FLEN: &usb.HPTFLEN }
    }
}

/// A handle to the controller registers
///
/// Derefs to the [`RegisterBlock`] found at the address supplied by
/// [`Peripherals`](crate::Peripherals).
pub struct Instance {
    addr: *const RegisterBlock,
}

// Safety: the Peripherals contract says the owner of the registers is
// the owner of the instance.
unsafe impl Send for Instance {}

impl core::ops::Deref for Instance {
    type Target = RegisterBlock;
    fn deref(&self) -> &RegisterBlock {
        // Safety: Peripherals implementors guarantee the address is valid
        // for as long as the driver exists.
        unsafe { &*self.addr }
    }
}

/// Acquire the register instance described by `peripherals`
pub fn instance<P: crate::Peripherals>(peripherals: &P) -> Instance {
    Instance {
        addr: peripherals.core().cast(),
    }
}

#[cfg(test)]
mod tests {
    use crate::sim::Sim;

    #[test]
    fn field_masks() {
        assert_eq!(super::hc::CTL::DAR::mask, 0x7F << 22);
        assert_eq!(super::hc::LEN::PCNT::mask, 0x3FF << 19);
        assert_eq!(super::GRSTCTL::TXFNUM::mask, 0x1F << 6);
        assert_eq!(super::hc::CTL::CEN::mask, 1 << 31);
    }

    #[test]
    fn write_and_read_fields() {
        let sim = Sim::new();
        let usb = sim.regs();
        super::write_reg!(super::hc, &usb.HC[3], CTL, DAR: 5, EPNUM: 2, EPDIR: IN, MPL: 64);
        assert_eq!(usb.HC[3].CTL.read(), (5 << 22) | (2 << 11) | (1 << 15) | 64);
        assert_eq!(super::read_reg!(super::hc, &usb.HC[3], CTL, DAR), 5);
        assert!(super::read_reg!(super::hc, &usb.HC[3], CTL, EPDIR == IN));
        assert_eq!(sim.word(0x560), (5 << 22) | (2 << 11) | (1 << 15) | 64);
    }

    #[test]
    fn tx_fifo_selection() {
        let sim = Sim::new();
        let usb = sim.regs();
        let fifos = super::tx_fifo::device(usb);
        for (n, flen) in fifos.enumerate() {
            super::write_reg!(super::tx_fifo, &flen, FLEN, RSAR: 0x100, FD: n as u32);
        }
        assert_eq!(sim.word(0x028), 0x100);
        assert_eq!(sim.word(0x108), (2 << 16) | 0x100);
        assert_eq!(sim.word(0x10C), (3 << 16) | 0x100);
        assert_eq!(super::tx_fifo::device(usb).count(), super::ENDPOINT_COUNT);
    }
}
