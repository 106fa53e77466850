//! Host role: channels, the root port, and VBUS
//!
//! Each hardware channel is a slot with an explicit [`ChannelState`]. A slot
//! is bound to one device endpoint by [`UsbCore::channel_init`], and carries
//! at most one transfer at a time.
//!
//! ```text
//! Idle -> Armed -> Transferring -> Completed
//!                       |
//!                       +-> Halting -> Halted
//! ```

use crate::{
    driver::{self, RoleState, Speed},
    fifo::{self, HostLayout},
    interrupt, ral, Error, Peripherals, Role, UsbCore,
};
use embedded_hal::blocking::delay::{DelayMs, DelayUs};
use usb_device::{
    endpoint::{EndpointAddress, EndpointType},
    UsbDirection,
};

/// The largest packet count a channel can be programmed with
pub const MAX_PACKET_COUNT: u16 = 1023;

/// The largest transfer length a channel accepts, in bytes
pub const MAX_TRANSFER_LEN: u32 = ral::hc::LEN::TLEN::mask;

/// Port power settle time
const VBUS_SETTLE_MS: u32 = 200;
/// Minimum port reset signalling time
const PORT_RESET_MS: u32 = 100;
/// Reset recovery time
const PORT_RECOVERY_MS: u32 = 20;

/// Data PID for the first packet of a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub enum DataPid {
    Data0,
    Data1,
    Data2,
    Setup,
}

impl DataPid {
    fn bits(self) -> u32 {
        use ral::hc::LEN::DPID::RW;
        match self {
            DataPid::Data0 => RW::DATA0,
            DataPid::Data1 => RW::DATA1,
            DataPid::Data2 => RW::DATA2,
            DataPid::Setup => RW::SETUP,
        }
    }
}

/// The endpoint a channel talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub struct ChannelConfig {
    /// The device's bus address
    pub device_address: u8,
    /// Endpoint number and direction
    pub endpoint: EndpointAddress,
    pub kind: EndpointType,
    pub max_packet_size: u16,
    /// Speed of the attached device
    pub speed: Speed,
}

impl ChannelConfig {
    fn is_periodic(&self) -> bool {
        matches!(
            self.kind,
            EndpointType::Interrupt | EndpointType::Isochronous { .. }
        )
    }

    fn is_in(&self) -> bool {
        self.endpoint.direction() == UsbDirection::In
    }

    fn max_packet_size(&self) -> u16 {
        self.max_packet_size.max(1)
    }
}

/// Channel slot state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub enum ChannelState {
    /// Free for [`UsbCore::channel_alloc`]
    Idle,
    /// Bound to an endpoint, no transfer in flight
    Armed,
    Transferring,
    /// Halt requested; waiting for the channel halted interrupt
    Halting,
    Completed,
    Halted,
}

/// One host channel slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub struct Channel {
    state: ChannelState,
    config: Option<ChannelConfig>,
    pid: DataPid,
    length: u32,
    packets: u16,
    pushed: u32,
}

impl Channel {
    const IDLE: Self = Channel {
        state: ChannelState::Idle,
        config: None,
        pid: DataPid::Data0,
        length: 0,
        packets: 0,
        pushed: 0,
    };

    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// The endpoint this channel is bound to
    pub fn config(&self) -> Option<&ChannelConfig> {
        self.config.as_ref()
    }

    /// Length programmed for the current transfer
    ///
    /// For IN transfers this is rounded up to whole packets.
    pub fn transfer_len(&self) -> u32 {
        self.length
    }

    pub fn packet_count(&self) -> u16 {
        self.packets
    }

    pub fn data_pid(&self) -> DataPid {
        self.pid
    }

    /// Returns `true` while OUT data remains to be pushed into the Tx FIFO
    pub fn has_pending_data(&self) -> bool {
        self.state == ChannelState::Transferring
            && self.config.map_or(false, |config| !config.is_in())
            && self.pushed < self.length
    }
}

/// What to move in a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer<'a> {
    /// Receive up to `length` bytes
    In { length: u32 },
    /// Send these bytes
    Out(&'a [u8]),
}

pub(crate) struct HostState {
    layout: HostLayout,
    channels: [Channel; ral::CHANNEL_COUNT],
}

impl HostState {
    fn new(layout: HostLayout) -> Self {
        HostState {
            layout,
            channels: [Channel::IDLE; ral::CHANNEL_COUNT],
        }
    }
}

/// Compute the packet count for a transfer of `length` bytes
///
/// Returns the packet count and the length to program. The count is clamped
/// to [`MAX_PACKET_COUNT`], and to the whole packets that fit in
/// [`MAX_TRANSFER_LEN`]. Clamping truncates the length. IN transfers always
/// request whole packets.
pub fn packet_count(length: u32, max_packet_size: u16, direction: UsbDirection) -> (u16, u32) {
    let mps = u32::from(max_packet_size.max(1));
    let limit = (MAX_TRANSFER_LEN / mps).min(u32::from(MAX_PACKET_COUNT));
    let mut length = length;
    let packets = if length == 0 {
        1
    } else {
        let packets = length / mps + u32::from(length % mps != 0);
        if packets > limit {
            length = limit * mps;
            limit
        } else {
            packets
        }
    };
    if direction == UsbDirection::In {
        length = packets * mps;
    }
    // Bounded by MAX_PACKET_COUNT above.
    (packets as u16, length)
}

fn host_state(role: &RoleState) -> Result<&HostState, Error> {
    match role {
        RoleState::Host(host) => Ok(host),
        _ => Err(Error::WrongRole),
    }
}

fn host_state_mut(role: &mut RoleState) -> Result<&mut HostState, Error> {
    match role {
        RoleState::Host(host) => Ok(host),
        _ => Err(Error::WrongRole),
    }
}

/// Free words in the Tx request queue serving this channel
fn queue_space(usb: &ral::RegisterBlock, periodic: bool) -> u32 {
    if periodic {
        ral::read_reg!(ral, usb, HPTFQSTAT, PTXFS)
    } else {
        ral::read_reg!(ral, usb, HNPTFQSTAT, NPTXFS)
    }
}

fn fifo_empty_interrupt(periodic: bool) -> interrupt::Global {
    if periodic {
        interrupt::Global::PERIODIC_TX_FIFO_EMPTY
    } else {
        interrupt::Global::NON_PERIODIC_TX_FIFO_EMPTY
    }
}

/// Push whole packets of the channel's OUT data while the FIFO has room
///
/// Returns the number of bytes pushed.
fn push_packets(
    usb: &ral::RegisterBlock,
    index: usize,
    channel: &mut Channel,
    data: &[u8],
) -> u32 {
    let Some(config) = channel.config else {
        return 0;
    };
    let end = (channel.length as usize).min(data.len());
    let start = (channel.pushed as usize).min(end);
    let mut free = queue_space(usb, config.is_periodic()) as usize;
    let mut pushed = 0;
    for packet in data[start..end].chunks(usize::from(config.max_packet_size())) {
        let words = fifo::words_for(packet.len());
        if words > free {
            break;
        }
        driver::write_fifo(&usb.FIFO[index], packet);
        free -= words;
        pushed += packet.len() as u32;
    }
    channel.pushed += pushed;
    pushed
}

impl<P, D> UsbCore<P, D>
where
    P: Peripherals,
    D: DelayMs<u32> + DelayUs<u32>,
{
    /// Initialize host mode
    ///
    /// Lays out the host FIFOs, flushes them, resets every channel, powers
    /// the port (unless OTG manages VBUS), and enables host interrupts.
    /// Call after [`mode_set(Role::Host)`](UsbCore::mode_set).
    pub fn host_core_init(&mut self) -> Result<(), Error> {
        let profile = self.selected()?;
        if self.mode != Some(Role::Host) {
            return Err(Error::WrongRole);
        }
        let layout = HostLayout::new(
            self.config.rx_fifo_words,
            self.config.host_non_periodic_words,
            self.config.host_periodic_words,
            profile.fifo_words,
        )?;

        ral::write_reg!(ral, self.usb, PWRCLKCTL, 0);
        match profile.speed {
            Speed::Full => ral::modify_reg!(ral, self.usb, HCTL, CLKSEL: CLK_48MHZ),
            Speed::Low => ral::modify_reg!(ral, self.usb, HCTL, CLKSEL: CLK_6MHZ),
        }

        ral::write_reg!(ral, self.usb, GRFLEN, RXFD: u32::from(layout.rx.words));
        let non_periodic = ral::tx_fifo::host_non_periodic(&self.usb);
        ral::write_reg!(
            ral::tx_fifo,
            &non_periodic,
            FLEN,
            RSAR: u32::from(layout.non_periodic.start),
            FD: u32::from(layout.non_periodic.words)
        );
        let periodic = ral::tx_fifo::host_periodic(&self.usb);
        ral::write_reg!(
            ral::tx_fifo,
            &periodic,
            FLEN,
            RSAR: u32::from(layout.periodic.start),
            FD: u32::from(layout.periodic.words)
        );

        if self.config.otg {
            ral::modify_reg!(ral, self.usb, GOTGCS, HHNPEN: 0);
        }

        let flushed = self.flush_all();

        ral::write_reg!(ral, self.usb, HACHINTEN, 0);
        for hc in self.usb.HC.iter() {
            ral::write_reg!(ral::hc, hc, INTEN, 0);
            ral::write_reg!(ral::hc, hc, INTF, u32::MAX);
        }

        self.role = RoleState::Host(HostState::new(layout));

        if !self.config.otg {
            self.vbus_drive(true)?;
        }

        self.replace_interrupts(u32::MAX, interrupt::host(self.config.otg));
        debug!("HOST INIT");
        flushed
    }

    /// Returns the host FIFO layout
    pub fn host_layout(&self) -> Result<&HostLayout, Error> {
        host_state(&self.role).map(|host| &host.layout)
    }

    /// Returns the channel slot at `index`
    pub fn channel(&self, index: usize) -> Result<&Channel, Error> {
        host_state(&self.role)?
            .channels
            .get(index)
            .ok_or(Error::InvalidChannel)
    }

    /// Find an idle channel
    pub fn channel_alloc(&self) -> Result<Option<usize>, Error> {
        Ok(host_state(&self.role)?
            .channels
            .iter()
            .position(|channel| channel.state == ChannelState::Idle))
    }

    /// Bind channel `index` to an endpoint
    ///
    /// Clears stale channel interrupts, enables the interrupts relevant to
    /// the endpoint type, and programs the channel. Re-running this on a
    /// channel resets it, whatever its state.
    pub fn channel_init(&mut self, index: usize, config: ChannelConfig) -> Result<(), Error> {
        let usb = &self.usb;
        let host = host_state_mut(&mut self.role)?;
        let channel = host.channels.get_mut(index).ok_or(Error::InvalidChannel)?;
        let hc = &usb.HC[index];

        ral::write_reg!(ral::hc, hc, INTF, u32::MAX);
        let mask = interrupt::channel(config.kind, config.endpoint.direction());
        ral::write_reg!(ral::hc, hc, INTEN, mask.bits());
        ral::modify_reg!(ral, usb, HACHINTEN, |enabled| enabled | (1 << index));

        ral::write_reg!(
            ral::hc,
            hc,
            CTL,
            DAR: u32::from(config.device_address),
            EPNUM: config.endpoint.index() as u32,
            EPDIR: config.is_in() as u32,
            LSD: (config.speed == Speed::Low) as u32,
            EPTYPE: driver::endpoint_type_bits(config.kind),
            MPL: u32::from(config.max_packet_size),
            ODDFRM: (config.kind == EndpointType::Interrupt) as u32
        );

        *channel = Channel {
            state: ChannelState::Armed,
            config: Some(config),
            ..Channel::IDLE
        };
        self.enable_interrupts(interrupt::Global::HOST_CHANNEL);
        trace!("CHANNEL INIT {=usize}", index);
        Ok(())
    }

    /// Start a transfer on an armed channel
    ///
    /// OUT data is pushed into the Tx FIFO as far as space allows. If any
    /// remains, the matching FIFO empty interrupt is enabled; respond to it
    /// with [`channel_refill()`](UsbCore::channel_refill). Pass the same
    /// `data` on every refill.
    ///
    /// Returns the programmed transfer length.
    pub fn channel_start_transfer(
        &mut self,
        index: usize,
        pid: DataPid,
        transfer: Transfer<'_>,
    ) -> Result<u32, Error> {
        let usb = &self.usb;
        let host = host_state_mut(&mut self.role)?;
        let channel = host.channels.get_mut(index).ok_or(Error::InvalidChannel)?;
        let config = match channel.state {
            ChannelState::Armed | ChannelState::Completed | ChannelState::Halted => {
                channel.config.ok_or(Error::InvalidState)?
            }
            _ => return Err(Error::InvalidState),
        };
        let (length, data) = match transfer {
            Transfer::In { length } if config.is_in() => (length, &[][..]),
            Transfer::Out(data) if !config.is_in() => {
                (u32::try_from(data.len()).map_err(|_| Error::InvalidState)?, data)
            }
            _ => return Err(Error::InvalidState),
        };
        let (packets, length) =
            packet_count(length, config.max_packet_size(), config.endpoint.direction());

        let hc = &usb.HC[index];
        ral::write_reg!(
            ral::hc,
            hc,
            LEN,
            TLEN: length,
            PCNT: u32::from(packets),
            DPID: pid.bits()
        );
        let even_frame = ral::read_reg!(ral, usb, HFINFR, FRNUM) & 1 == 0;
        ral::modify_reg!(ral::hc, hc, CTL, ODDFRM: even_frame as u32, CDIS: 0, CEN: 1);

        *channel = Channel {
            state: ChannelState::Transferring,
            config: Some(config),
            pid,
            length,
            packets,
            pushed: 0,
        };

        if !config.is_in() && length > 0 {
            push_packets(usb, index, channel, data);
            if channel.pushed < channel.length {
                let pending = fifo_empty_interrupt(config.is_periodic());
                ral::modify_reg!(ral, usb, GINTEN, |ginten| ginten | pending.bits());
            }
        }
        trace!("CHANNEL START {=usize} {=u32}", index, length);
        Ok(length)
    }

    /// Push more OUT data for channel `index`
    ///
    /// Call this when the FIFO empty interrupt fires. Once no channel on the
    /// same queue has data left, the FIFO empty interrupt is disabled.
    /// Returns the number of bytes pushed.
    pub fn channel_refill(&mut self, index: usize, data: &[u8]) -> Result<u32, Error> {
        let usb = &self.usb;
        let host = host_state_mut(&mut self.role)?;
        let channel = host.channels.get_mut(index).ok_or(Error::InvalidChannel)?;
        if !channel.has_pending_data() {
            return Err(Error::InvalidState);
        }
        let periodic = channel.config.map_or(false, |config| config.is_periodic());
        let pushed = push_packets(usb, index, channel, data);

        let waiting = host.channels.iter().any(|channel| {
            channel.has_pending_data()
                && channel.config.map_or(false, |config| config.is_periodic()) == periodic
        });
        if !waiting {
            let pending = fifo_empty_interrupt(periodic);
            ral::modify_reg!(ral, usb, GINTEN, |ginten| ginten & !pending.bits());
        }
        Ok(pushed)
    }

    /// Request that channel `index` stop
    ///
    /// When the channel's request queue is empty, the channel is disabled
    /// right away and the slot is [`Halted`](ChannelState::Halted).
    /// Otherwise the slot is [`Halting`](ChannelState::Halting) until
    /// [`channel_poll()`](UsbCore::channel_poll) sees the halted interrupt.
    pub fn channel_halt(&mut self, index: usize) -> Result<ChannelState, Error> {
        let usb = &self.usb;
        let host = host_state_mut(&mut self.role)?;
        let channel = host.channels.get_mut(index).ok_or(Error::InvalidChannel)?;
        if channel.state == ChannelState::Idle {
            return Err(Error::InvalidState);
        }
        let hc = &usb.HC[index];
        ral::modify_reg!(ral::hc, hc, INTEN, |inten| inten
            | interrupt::Channel::HALTED.bits());

        let periodic = channel.config.map_or(false, |config| config.is_periodic());
        let mut ctl = ral::read_reg!(ral::hc, hc, CTL);
        ctl |= ral::hc::CTL::CEN::mask | ral::hc::CTL::CDIS::mask;
        let immediate = queue_space(usb, periodic) == 0;
        if immediate {
            ctl &= !ral::hc::CTL::CEN::mask;
        }
        ral::write_reg!(ral::hc, hc, CTL, ctl);

        channel.state = if immediate {
            ChannelState::Halted
        } else {
            ChannelState::Halting
        };
        debug!("CHANNEL HALT {=usize} {:?}", index, channel.state);
        Ok(channel.state)
    }

    /// Read and clear the enabled interrupts of channel `index`
    ///
    /// Transfer finished moves the slot to
    /// [`Completed`](ChannelState::Completed); channel halted moves it to
    /// [`Halted`](ChannelState::Halted). Errors are returned as flags and
    /// leave the state alone.
    pub fn channel_poll(&mut self, index: usize) -> Result<interrupt::Channel, Error> {
        use interrupt::Channel as Flags;
        let usb = &self.usb;
        let host = host_state_mut(&mut self.role)?;
        let channel = host.channels.get_mut(index).ok_or(Error::InvalidChannel)?;
        let hc = &usb.HC[index];

        let pending = ral::read_reg!(ral::hc, hc, INTF) & ral::read_reg!(ral::hc, hc, INTEN);
        ral::write_reg!(ral::hc, hc, INTF, pending);
        let flags = Flags::from_bits_truncate(pending);

        if flags.contains(Flags::TRANSFER_FINISHED)
            && channel.state == ChannelState::Transferring
        {
            channel.state = ChannelState::Completed;
        }
        if flags.contains(Flags::HALTED) && channel.state != ChannelState::Completed {
            channel.state = ChannelState::Halted;
        }
        if flags.intersects(Flags::ERRORS) {
            debug!("CHANNEL ERROR {=usize} {=u32:X}", index, flags.bits());
        }
        Ok(flags)
    }

    /// Channels with a pending interrupt, one bit per channel
    pub fn pending_channels(&self) -> u32 {
        ral::read_reg!(ral, self.usb, HACHINT) & ral::read_reg!(ral, self.usb, HACHINTEN)
    }

    /// Return channel `index` to the idle pool
    pub fn channel_release(&mut self, index: usize) -> Result<(), Error> {
        let usb = &self.usb;
        let host = host_state_mut(&mut self.role)?;
        let channel = host.channels.get_mut(index).ok_or(Error::InvalidChannel)?;
        match channel.state {
            ChannelState::Armed | ChannelState::Completed | ChannelState::Halted => {}
            _ => return Err(Error::InvalidState),
        }
        *channel = Channel::IDLE;
        ral::write_reg!(ral::hc, &usb.HC[index], INTEN, 0);
        ral::modify_reg!(ral, usb, HACHINTEN, |enabled| enabled & !(1 << index));
        Ok(())
    }

    /// Stop the host
    ///
    /// Force-halts every channel, and flushes every FIFO. All slots return
    /// to idle.
    pub fn host_stop(&mut self) -> Result<(), Error> {
        host_state(&self.role)?;
        ral::write_reg!(ral, self.usb, HACHINTEN, 0);
        ral::write_reg!(ral, self.usb, HACHINT, u32::MAX);
        for hc in self.usb.HC.iter() {
            ral::modify_reg!(ral::hc, hc, CTL, CEN: 1, CDIS: 1, EPDIR: IN);
        }
        if let RoleState::Host(host) = &mut self.role {
            host.channels = [Channel::IDLE; ral::CHANNEL_COUNT];
        }
        debug!("HOST STOP");
        self.flush_all()
    }

    /// Drive port power
    ///
    /// Calls the configured VBUS switch, sets the port power bit, then
    /// waits for VBUS to settle.
    pub fn vbus_drive(&mut self, on: bool) -> Result<(), Error> {
        if self.mode != Some(Role::Host) {
            return Err(Error::WrongRole);
        }
        if let Some(switch) = self.config.vbus_switch {
            switch(on);
        }
        let port = self.port_status();
        let powered = port & ral::HPCS::PP::mask != 0;
        if on && !powered {
            ral::write_reg!(ral, self.usb, HPCS, port | ral::HPCS::PP::mask);
        } else if !on && powered {
            ral::write_reg!(ral, self.usb, HPCS, port & !ral::HPCS::PP::mask);
        }
        self.delay.delay_ms(VBUS_SETTLE_MS);
        debug!("VBUS {=bool}", on);
        Ok(())
    }

    /// Reset the attached device
    ///
    /// Holds reset for 100 ms, then waits out the 20 ms recovery time.
    pub fn port_reset(&mut self) -> Result<(), Error> {
        if self.mode != Some(Role::Host) {
            return Err(Error::WrongRole);
        }
        let port = self.port_status();
        ral::write_reg!(ral, self.usb, HPCS, port | ral::HPCS::PRST::mask);
        self.delay.delay_ms(PORT_RESET_MS);
        let port = self.port_status();
        ral::write_reg!(ral, self.usb, HPCS, port & !ral::HPCS::PRST::mask);
        self.delay.delay_ms(PORT_RECOVERY_MS);
        debug!("PORT RESET");
        Ok(())
    }

    /// Port control and status, with the write-one-to-clear bits masked
    fn port_status(&self) -> u32 {
        ral::read_reg!(ral, self.usb, HPCS) & !ral::HPCS::W1C
    }

    /// Indicates if a device is attached to the port
    pub fn port_connected(&self) -> bool {
        ral::read_reg!(ral, self.usb, HPCS, PCST == 1)
    }

    /// Speed of the attached device, once the port is enabled
    pub fn port_speed(&self) -> Option<Speed> {
        match ral::read_reg!(ral, self.usb, HPCS, PS) {
            ral::HPCS::PS::RW::FULL => Some(Speed::Full),
            ral::HPCS::PS::RW::LOW => Some(Speed::Low),
            _ => None,
        }
    }

    /// The current host frame number
    pub fn frame_number(&self) -> u16 {
        ral::read_reg!(ral, self.usb, HFINFR, FRNUM) as u16
    }
}
