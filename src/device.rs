//! Device role: endpoints, suspend, and remote wakeup
//!
//! The FIFO layout and endpoint table are fixed by
//! [`UsbCore::device_core_init`]. Endpoints are then activated one by one as
//! the host configures the device.

use crate::{
    driver::{self, RoleState},
    fifo::{DeviceLayout, Region},
    interrupt, ral, Error, Peripherals, Role, UsbCore,
};
use embedded_hal::blocking::delay::{DelayMs, DelayUs};
use usb_device::{
    endpoint::{EndpointAddress, EndpointType},
    UsbDirection,
};

/// Back to back SETUP packets endpoint 0 accepts before it must be re-armed
pub const SETUP_PACKETS: u32 = 3;
/// Size of one SETUP packet
pub const SETUP_PACKET_BYTES: u32 = 8;

/// How long to drive resume signalling
const REMOTE_WAKEUP_MS: u32 = 5;

/// Every device mode interrupt flag except the OTG flag, which is cleared
/// in its own register
const GINTF_DEVICE_CLEAR: u32 = 0xBFFF_FFFF;

/// An IN endpoint's configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub struct InEndpoint {
    fifo: Region,
    kind: Option<EndpointType>,
    max_packet_size: u16,
}

impl InEndpoint {
    /// The Tx FIFO assigned to this endpoint
    pub fn fifo(&self) -> Region {
        self.fifo
    }

    /// Transfer type, once activated
    pub fn kind(&self) -> Option<EndpointType> {
        self.kind
    }

    pub fn max_packet_size(&self) -> u16 {
        self.max_packet_size
    }
}

/// An OUT endpoint's configuration
///
/// All OUT endpoints share the Rx FIFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub struct OutEndpoint {
    kind: Option<EndpointType>,
    max_packet_size: u16,
}

impl OutEndpoint {
    const INACTIVE: Self = OutEndpoint {
        kind: None,
        max_packet_size: 0,
    };

    /// Transfer type, once activated
    pub fn kind(&self) -> Option<EndpointType> {
        self.kind
    }

    pub fn max_packet_size(&self) -> u16 {
        self.max_packet_size
    }
}

pub(crate) struct DeviceState {
    layout: DeviceLayout,
    ins: [InEndpoint; ral::ENDPOINT_COUNT],
    outs: [OutEndpoint; ral::ENDPOINT_COUNT],
    remote_wakeup: bool,
}

impl DeviceState {
    fn new(layout: DeviceLayout) -> Self {
        let mut ins = [InEndpoint {
            fifo: Region::default(),
            kind: None,
            max_packet_size: 0,
        }; ral::ENDPOINT_COUNT];
        for (ep, fifo) in ins.iter_mut().zip(layout.tx.iter()) {
            ep.fifo = *fifo;
        }
        DeviceState {
            layout,
            ins,
            outs: [OutEndpoint::INACTIVE; ral::ENDPOINT_COUNT],
            remote_wakeup: false,
        }
    }
}

fn device_state(role: &RoleState) -> Result<&DeviceState, Error> {
    match role {
        RoleState::Device(device) => Ok(device),
        _ => Err(Error::WrongRole),
    }
}

fn device_state_mut(role: &mut RoleState) -> Result<&mut DeviceState, Error> {
    match role {
        RoleState::Device(device) => Ok(device),
        _ => Err(Error::WrongRole),
    }
}

/// Endpoint 0 encodes its max packet size
fn ep0_max_packet_size(max_packet_size: u16) -> Result<u32, Error> {
    match max_packet_size {
        64 => Ok(0),
        32 => Ok(1),
        16 => Ok(2),
        8 => Ok(3),
        _ => Err(Error::InvalidState),
    }
}

/// The DAEPINT / DAEPINTEN bit for an endpoint
fn endpoint_bit(address: EndpointAddress) -> u32 {
    match address.direction() {
        UsbDirection::In => 1 << address.index(),
        UsbDirection::Out => 1 << (16 + address.index()),
    }
}

impl<P, D> UsbCore<P, D>
where
    P: Peripherals,
    D: DelayMs<u32> + DelayUs<u32>,
{
    fn endpoint_registers(
        &self,
        address: EndpointAddress,
    ) -> Result<&ral::ep::RegisterBlock, Error> {
        device_state(&self.role)?;
        let eps = match address.direction() {
            UsbDirection::In => &self.usb.DIEP,
            UsbDirection::Out => &self.usb.DOEP,
        };
        eps.get(address.index()).ok_or(Error::InvalidEndpoint)
    }

    /// Initialize device mode
    ///
    /// Lays out the Rx FIFO and one Tx FIFO per IN endpoint, flushes them,
    /// clears endpoint state left from a previous session, and enables
    /// device interrupts. Call after [`mode_set(Role::Device)`](UsbCore::mode_set).
    pub fn device_core_init(&mut self) -> Result<(), Error> {
        let profile = self.selected()?;
        if self.mode != Some(Role::Device) {
            return Err(Error::WrongRole);
        }
        let layout = DeviceLayout::new(
            self.config.rx_fifo_words,
            self.config.device_tx_fifo_words,
            profile.fifo_words,
        )?;

        ral::write_reg!(ral, self.usb, PWRCLKCTL, 0);
        ral::modify_reg!(ral, self.usb, DCFG, EOPFT: FRAME_80, DS: FULL_SPEED);

        ral::write_reg!(ral, self.usb, GRFLEN, RXFD: u32::from(layout.rx.words));
        for (flen, region) in ral::tx_fifo::device(&self.usb).zip(layout.tx.iter()) {
            ral::write_reg!(
                ral::tx_fifo,
                &flen,
                FLEN,
                RSAR: u32::from(region.start),
                FD: u32::from(region.words)
            );
        }

        let flushed = self.flush_all();

        ral::write_reg!(ral, self.usb, DIEPINTEN, 0);
        ral::write_reg!(ral, self.usb, DOEPINTEN, 0);
        ral::write_reg!(ral, self.usb, DAEPINT, u32::MAX);
        ral::write_reg!(ral, self.usb, DAEPINTEN, 0);

        for ep in self.usb.DIEP.iter().chain(self.usb.DOEP.iter()) {
            if ral::read_reg!(ral::ep, ep, CTL, EPEN == 1) {
                ral::modify_reg!(ral::ep, ep, CTL, EPD: 1, STALL: 1);
            } else {
                ral::write_reg!(ral::ep, ep, CTL, 0);
            }
            ral::write_reg!(ral::ep, ep, LEN, 0);
            ral::write_reg!(ral::ep, ep, INTF, 0xFF);
        }

        self.role = RoleState::Device(DeviceState::new(layout));
        self.replace_interrupts(
            GINTF_DEVICE_CLEAR,
            interrupt::device(self.config.otg, self.config.vbus_sensing),
        );
        debug!("DEVICE INIT");
        flushed
    }

    /// Returns the device FIFO layout
    pub fn device_layout(&self) -> Result<&DeviceLayout, Error> {
        device_state(&self.role).map(|device| &device.layout)
    }

    /// Returns IN endpoint `n`
    pub fn in_endpoint(&self, n: usize) -> Result<&InEndpoint, Error> {
        device_state(&self.role)?
            .ins
            .get(n)
            .ok_or(Error::InvalidEndpoint)
    }

    /// Returns OUT endpoint `n`
    pub fn out_endpoint(&self, n: usize) -> Result<&OutEndpoint, Error> {
        device_state(&self.role)?
            .outs
            .get(n)
            .ok_or(Error::InvalidEndpoint)
    }

    /// Arm endpoint 0 to accept up to three SETUP packets
    ///
    /// Some hosts retry SETUP back to back. Re-arm after each SETUP stage.
    pub fn ep0_start_receive(&mut self) -> Result<(), Error> {
        device_state(&self.role)?;
        ral::write_reg!(
            ral::ep,
            &self.usb.DOEP[0],
            LEN,
            STPCNT: SETUP_PACKETS,
            PCNT: 1,
            TLEN: SETUP_PACKETS * SETUP_PACKET_BYTES
        );
        Ok(())
    }

    /// Activate an endpoint
    ///
    /// IN endpoints are bound to the Tx FIFO with their own number.
    /// Endpoint 0 only supports packet sizes of 8, 16, 32 and 64.
    pub fn endpoint_activate(
        &mut self,
        address: EndpointAddress,
        kind: EndpointType,
        max_packet_size: u16,
    ) -> Result<(), Error> {
        let ep = self.endpoint_registers(address)?;
        let index = address.index();
        let mpl = if index == 0 {
            ep0_max_packet_size(max_packet_size)?
        } else {
            u32::from(max_packet_size)
        };
        let eptype = driver::endpoint_type_bits(kind);

        if ral::read_reg!(ral::ep, ep, CTL, EPACT == 0) {
            match address.direction() {
                UsbDirection::In => ral::modify_reg!(
                    ral::ep,
                    ep,
                    CTL,
                    MPL: mpl,
                    EPTYPE: eptype,
                    TXFNUM: index as u32,
                    EPACT: 1
                ),
                UsbDirection::Out => {
                    ral::modify_reg!(ral::ep, ep, CTL, MPL: mpl, EPTYPE: eptype, EPACT: 1)
                }
            }
        }
        ral::modify_reg!(ral, self.usb, DAEPINTEN, |enabled| enabled
            | endpoint_bit(address));

        let device = device_state_mut(&mut self.role)?;
        match address.direction() {
            UsbDirection::In => {
                let ep = &mut device.ins[index];
                ep.kind = Some(kind);
                ep.max_packet_size = max_packet_size;
            }
            UsbDirection::Out => {
                device.outs[index] = OutEndpoint {
                    kind: Some(kind),
                    max_packet_size,
                };
            }
        }
        trace!("ENDPOINT ACTIVATE {=u8:X}", u8::from(address));
        Ok(())
    }

    /// Deactivate an endpoint, disabling any transfer in progress
    pub fn endpoint_deactivate(&mut self, address: EndpointAddress) -> Result<(), Error> {
        let ep = self.endpoint_registers(address)?;
        if ral::read_reg!(ral::ep, ep, CTL, EPEN == 1) {
            ral::modify_reg!(ral::ep, ep, CTL, EPD: 1, SNAK: 1);
        }
        ral::modify_reg!(ral::ep, ep, CTL, EPACT: 0);
        ral::modify_reg!(ral, self.usb, DAEPINTEN, |enabled| enabled
            & !endpoint_bit(address));

        let device = device_state_mut(&mut self.role)?;
        let index = address.index();
        match address.direction() {
            UsbDirection::In => {
                device.ins[index].kind = None;
                device.ins[index].max_packet_size = 0;
            }
            UsbDirection::Out => device.outs[index] = OutEndpoint::INACTIVE,
        }
        Ok(())
    }

    /// Stall, or clear the stall on, an endpoint
    ///
    /// Stalling an enabled IN endpoint also disables it.
    pub fn endpoint_set_stalled(
        &mut self,
        address: EndpointAddress,
        stalled: bool,
    ) -> Result<(), Error> {
        let ep = self.endpoint_registers(address)?;
        if stalled {
            if address.direction() == UsbDirection::In
                && ral::read_reg!(ral::ep, ep, CTL, EPEN == 1)
            {
                ral::modify_reg!(ral::ep, ep, CTL, EPD: 1);
            }
            ral::modify_reg!(ral::ep, ep, CTL, STALL: 1);
        } else {
            ral::modify_reg!(ral::ep, ep, CTL, STALL: 0);
        }
        Ok(())
    }

    /// Indicates if the endpoint is stalled
    pub fn endpoint_is_stalled(&self, address: EndpointAddress) -> Result<bool, Error> {
        let ep = self.endpoint_registers(address)?;
        Ok(ral::read_reg!(ral::ep, ep, CTL, STALL == 1))
    }

    /// Read and clear an endpoint's interrupt flags
    pub fn endpoint_poll(
        &mut self,
        address: EndpointAddress,
    ) -> Result<interrupt::Endpoint, Error> {
        let ep = self.endpoint_registers(address)?;
        let flags = interrupt::Endpoint::from_bits_truncate(ral::read_reg!(ral::ep, ep, INTF));
        ral::write_reg!(ral::ep, ep, INTF, flags.bits());
        Ok(flags)
    }

    /// Endpoints with a pending interrupt: IN in the low half, OUT in the high half
    pub fn pending_endpoints(&self) -> u32 {
        ral::read_reg!(ral, self.usb, DAEPINT) & ral::read_reg!(ral, self.usb, DAEPINTEN)
    }

    /// Enable endpoint interrupts, shared by every IN and every OUT endpoint
    pub fn set_endpoint_interrupts(
        &mut self,
        ins: interrupt::Endpoint,
        outs: interrupt::Endpoint,
    ) -> Result<(), Error> {
        device_state(&self.role)?;
        ral::write_reg!(ral, self.usb, DIEPINTEN, ins.bits());
        ral::write_reg!(ral, self.usb, DOEPINTEN, outs.bits());
        Ok(())
    }

    /// Set the device address assigned by the host
    pub fn set_address(&mut self, address: u8) -> Result<(), Error> {
        device_state(&self.role)?;
        ral::modify_reg!(ral, self.usb, DCFG, DAR: u32::from(address));
        Ok(())
    }

    /// Attach to (`true`) or detach from (`false`) the bus
    pub fn set_connected(&mut self, connected: bool) -> Result<(), Error> {
        device_state(&self.role)?;
        ral::modify_reg!(ral, self.usb, DCTL, SD: (!connected) as u32);
        Ok(())
    }

    /// Indicates if the bus has been suspended
    pub fn is_suspended(&self) -> bool {
        ral::read_reg!(ral, self.usb, DSTAT, SPST == 1)
    }

    /// Frame number of the last SOF received
    pub fn device_frame_number(&self) -> u16 {
        ral::read_reg!(ral, self.usb, DSTAT, FNRSOF) as u16
    }

    /// Record whether the host allowed remote wakeup
    pub fn set_remote_wakeup(&mut self, enabled: bool) -> Result<(), Error> {
        device_state_mut(&mut self.role)?.remote_wakeup = enabled;
        Ok(())
    }

    /// Restore the core clocks after suspend
    ///
    /// Does nothing unless low power mode is configured and the bus is
    /// suspended. Call this before touching endpoint registers after a
    /// suspend.
    pub fn clock_ungate(&mut self) {
        let low_power = self.profile.map_or(false, |profile| profile.low_power);
        if low_power && self.is_suspended() {
            ral::modify_reg!(ral, self.usb, PWRCLKCTL, SHCLK: 0, SUCLK: 0);
        }
    }

    /// Signal remote wakeup to the host
    ///
    /// Returns `Ok(false)` without signalling unless remote wakeup is
    /// enabled and the bus is suspended.
    pub fn remote_wakeup_signal(&mut self) -> Result<bool, Error> {
        let enabled = device_state(&self.role)?.remote_wakeup;
        if !enabled || !self.is_suspended() {
            return Ok(false);
        }
        self.clock_ungate();
        ral::modify_reg!(ral, self.usb, DCTL, RWKUP: 1);
        self.delay.delay_ms(REMOTE_WAKEUP_MS);
        ral::modify_reg!(ral, self.usb, DCTL, RWKUP: 0);
        debug!("REMOTE WAKEUP");
        Ok(true)
    }

    /// Stop the device
    ///
    /// Clears every endpoint interrupt, masks endpoint interrupts, and
    /// flushes every FIFO.
    pub fn device_stop(&mut self) -> Result<(), Error> {
        device_state(&self.role)?;
        for ep in self.usb.DIEP.iter().chain(self.usb.DOEP.iter()) {
            ral::write_reg!(ral::ep, ep, INTF, 0xFF);
        }
        ral::write_reg!(ral, self.usb, DIEPINTEN, 0);
        ral::write_reg!(ral, self.usb, DOEPINTEN, 0);
        ral::write_reg!(ral, self.usb, DAEPINTEN, 0);
        ral::write_reg!(ral, self.usb, DAEPINT, u32::MAX);
        debug!("DEVICE STOP");
        self.flush_all()
    }
}
