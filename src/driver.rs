//! The core handle
//!
//! Owns the register instance, the platform delay, and whichever role state
//! is active. Host channel and device endpoint operations are implemented in
//! their own modules, on this same type.

use crate::{
    device::DeviceState,
    fifo::{self, TxFifo},
    host::HostState,
    interrupt,
    poll::{Budget, Exhausted},
    ral, Error, Peripherals,
};
use embedded_hal::blocking::delay::{DelayMs, DelayUs};
use usb_device::endpoint::EndpointType;

/// PHY clocks to wait after a reset or flush completes
const PHY_CLOCK_WAIT_US: u32 = 3;
/// Settle time after powering the transceiver
const POWER_ON_SETTLE_MS: u32 = 20;
/// Settle time after forcing host or device mode
const MODE_SETTLE_MS: u32 = 50;

/// Identifies one of the supported controller cores
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub enum CoreId {
    /// The OTG full-speed core
    FullSpeed,
}

/// Bus speed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub enum Speed {
    Full,
    Low,
}

/// Physical layer interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub enum Phy {
    /// The transceiver built into the controller
    Embedded,
    /// An external ULPI transceiver
    Ulpi,
}

/// Host or device operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub enum Role {
    Host,
    Device,
}

/// What to do when a register poll runs out of budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub enum TimeoutPolicy {
    /// Return [`Error::ResetTimeout`] or [`Error::FlushTimeout`]
    Report,
    /// Log a warning and keep going
    Ignore,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        if cfg!(feature = "permissive-timeouts") {
            TimeoutPolicy::Ignore
        } else {
            TimeoutPolicy::Report
        }
    }
}

/// Driver configuration
///
/// FIFO sizes are in 32-bit words. The defaults fill the 320 word FIFO RAM
/// of the full-speed core in both roles.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Rx FIFO size, in both roles
    pub rx_fifo_words: u16,
    /// Device mode Tx FIFO size, per IN endpoint
    pub device_tx_fifo_words: [u16; ral::ENDPOINT_COUNT],
    /// Host mode non-periodic Tx FIFO size
    pub host_non_periodic_words: u16,
    /// Host mode periodic Tx FIFO size
    pub host_periodic_words: u16,
    /// Poll budget for reset and flush waits
    pub budget: Budget,
    pub timeouts: TimeoutPolicy,
    /// Sense VBUS. When `false`, the controller ignores VBUS
    pub vbus_sensing: bool,
    /// Enable HNP / SRP and the OTG interrupts
    pub otg: bool,
    /// Gate the core clock while suspended
    pub low_power: bool,
    /// Drive the SOF pulse output
    pub sof_output: bool,
    /// External VBUS power switch, called with the requested state
    pub vbus_switch: Option<fn(bool)>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rx_fifo_words: 128,
            device_tx_fifo_words: [64, 128, 0, 0],
            host_non_periodic_words: 96,
            host_periodic_words: 96,
            budget: Budget::DEFAULT,
            timeouts: TimeoutPolicy::default(),
            vbus_sensing: true,
            otg: false,
            low_power: false,
            sof_output: false,
            vbus_switch: None,
        }
    }
}

/// The fixed operating profile of a selected core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub struct Profile {
    pub core: CoreId,
    pub speed: Speed,
    pub max_packet_size: u16,
    pub host_channels: usize,
    pub device_endpoints: usize,
    /// FIFO RAM capacity, in words
    pub fifo_words: u16,
    pub phy: Phy,
    pub low_power: bool,
    pub sof_output: bool,
}

/// One entry popped from the receive status queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub struct RxStatus {
    /// Channel number (host) or endpoint number (device)
    pub number: u8,
    /// Bytes waiting in the Rx FIFO for this entry
    pub bytes: u16,
    /// Data PID of the received packet
    pub pid: u8,
    /// Raw packet status
    pub status: u8,
}

/// Role-specific state. Only one is ever live.
pub(crate) enum RoleState {
    None,
    Host(HostState),
    Device(DeviceState),
}

/// A USB OTG core driver
///
/// After you create a `UsbCore` with [`new()`](UsbCore::new), you must
///
/// - call [`core_select()`](UsbCore::core_select) once
/// - call [`core_init()`](UsbCore::core_init) once
/// - choose a role with [`mode_set()`](UsbCore::mode_set)
/// - call [`host_core_init()`](UsbCore::host_core_init) or
///   [`device_core_init()`](UsbCore::device_core_init)
pub struct UsbCore<P, D> {
    pub(crate) usb: ral::Instance,
    pub(crate) delay: D,
    pub(crate) config: Config,
    pub(crate) profile: Option<Profile>,
    pub(crate) mode: Option<Role>,
    pub(crate) role: RoleState,
    _peripherals: P,
}

impl<P, D> UsbCore<P, D>
where
    P: Peripherals,
    D: DelayMs<u32> + DelayUs<u32>,
{
    /// Create a new `UsbCore`
    ///
    /// Creation doesn't touch the hardware.
    pub fn new(peripherals: P, delay: D, config: Config) -> Self {
        UsbCore {
            usb: ral::instance(&peripherals),
            delay,
            config,
            profile: None,
            mode: None,
            role: RoleState::None,
            _peripherals: peripherals,
        }
    }

    /// Returns the driver configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the profile fixed by [`core_select()`](UsbCore::core_select)
    pub fn profile(&self) -> Option<&Profile> {
        self.profile.as_ref()
    }

    /// Returns the role chosen by the last [`mode_set()`](UsbCore::mode_set)
    pub fn role(&self) -> Option<Role> {
        self.mode
    }

    /// Fix the operating profile for `core`
    ///
    /// This only populates the handle.
    pub fn core_select(&mut self, core: CoreId) -> &Profile {
        let profile = match core {
            CoreId::FullSpeed => Profile {
                core,
                speed: Speed::Full,
                max_packet_size: 64,
                host_channels: ral::CHANNEL_COUNT,
                device_endpoints: ral::ENDPOINT_COUNT,
                fifo_words: 320,
                phy: Phy::Embedded,
                low_power: self.config.low_power,
                sof_output: self.config.sof_output,
            },
        };
        self.profile.insert(profile)
    }

    pub(crate) fn selected(&self) -> Result<Profile, Error> {
        self.profile.ok_or(Error::InvalidState)
    }

    /// Reset the core, power the transceiver, and enable VBUS sensing
    ///
    /// The power-on sequence always runs to completion. If the soft reset
    /// never confirmed, and the policy is [`TimeoutPolicy::Report`], this
    /// then returns [`Error::ResetTimeout`]; the controller is still powered,
    /// and the caller may proceed.
    pub fn core_init(&mut self) -> Result<(), Error> {
        let profile = self.selected()?;
        let reset = self.core_reset();

        ral::modify_reg!(ral, self.usb, GCCFG, PWRON: 1, VBUSACEN: 1, VBUSBCEN: 1);
        ral::modify_reg!(ral, self.usb, GAHBCS, TXFTH: HALF_EMPTY);

        if !self.config.vbus_sensing {
            ral::modify_reg!(ral, self.usb, GCCFG, VBUSIG: 1);
        }
        if profile.sof_output {
            ral::modify_reg!(ral, self.usb, GCCFG, SOFOEN: 1);
        }

        self.delay.delay_ms(POWER_ON_SETTLE_MS);

        if self.config.otg {
            ral::modify_reg!(ral, self.usb, GUSBCS, HNPCAP: 1, SRPCAP: 1);
            self.enable_common_interrupts();
        }

        debug!("CORE INIT");
        reset
    }

    fn core_reset(&mut self) -> Result<(), Error> {
        ral::modify_reg!(ral, self.usb, GRSTCTL, CSRST: 1);
        let done = self.wait_until(|usb| ral::read_reg!(ral, usb, GRSTCTL, CSRST == 0));
        self.delay.delay_us(PHY_CLOCK_WAIT_US);
        match done {
            Ok(_) => Ok(()),
            Err(_) => self.timed_out(Error::ResetTimeout),
        }
    }

    /// Poll `done` within the configured budget, ticking the delay between polls
    fn wait_until(&mut self, done: impl Fn(&ral::Instance) -> bool) -> Result<u32, Exhausted> {
        let usb = &self.usb;
        let delay = &mut self.delay;
        self.config.budget.spin(|| done(usb), |us| delay.delay_us(us))
    }

    /// Apply the timeout policy to `error`
    pub(crate) fn timed_out(&self, error: Error) -> Result<(), Error> {
        match self.config.timeouts {
            TimeoutPolicy::Report => Err(error),
            TimeoutPolicy::Ignore => {
                warn!("TIMEOUT {:?}", error);
                Ok(())
            }
        }
    }

    /// Force the controller into host or device mode
    ///
    /// Blocks for the mode settle time. Any previous role state is dropped;
    /// run the matching role init next.
    pub fn mode_set(&mut self, role: Role) {
        match role {
            Role::Host => ral::modify_reg!(ral, self.usb, GUSBCS, FDM: 0, FHM: 1),
            Role::Device => ral::modify_reg!(ral, self.usb, GUSBCS, FHM: 0, FDM: 1),
        }
        self.delay.delay_ms(MODE_SETTLE_MS);
        self.mode = Some(role);
        self.role = RoleState::None;
        debug!("MODE {:?}", role);
    }

    /// Returns the mode the controller reports it's operating in
    pub fn current_mode(&self) -> Role {
        if ral::read_reg!(ral, self.usb, GINTF, COPM == HOST) {
            Role::Host
        } else {
            Role::Device
        }
    }

    /// Flush one, or all, Tx FIFOs
    ///
    /// Returns within the poll budget even if the hardware never finishes.
    /// A FIFO number the controller doesn't have is an `InvalidEndpoint`
    /// error, and touches no register.
    pub fn tx_fifo_flush(&mut self, fifo: TxFifo) -> Result<(), Error> {
        let number = fifo.bits().ok_or(Error::InvalidEndpoint)?;
        ral::write_reg!(ral, self.usb, GRSTCTL, TXFNUM: number, TXFF: 1);
        let done = self.wait_until(|usb| ral::read_reg!(ral, usb, GRSTCTL, TXFF == 0));
        self.delay.delay_us(PHY_CLOCK_WAIT_US);
        match done {
            Ok(_) => Ok(()),
            Err(_) => self.timed_out(Error::FlushTimeout),
        }
    }

    /// Flush the shared Rx FIFO
    ///
    /// Returns within the poll budget even if the hardware never finishes.
    pub fn rx_fifo_flush(&mut self) -> Result<(), Error> {
        ral::write_reg!(ral, self.usb, GRSTCTL, RXFF: 1);
        let done = self.wait_until(|usb| ral::read_reg!(ral, usb, GRSTCTL, RXFF == 0));
        self.delay.delay_us(PHY_CLOCK_WAIT_US);
        match done {
            Ok(_) => Ok(()),
            Err(_) => self.timed_out(Error::FlushTimeout),
        }
    }

    /// Flush every FIFO, Rx first
    pub(crate) fn flush_all(&mut self) -> Result<(), Error> {
        let rx = self.rx_fifo_flush();
        let tx = self.tx_fifo_flush(TxFifo::All);
        rx.and(tx)
    }

    /// Push `bytes` into the Tx FIFO for channel or endpoint `number`
    ///
    /// The final partial word is zero padded. Callers must check FIFO space.
    pub fn fifo_write(&mut self, number: usize, bytes: &[u8]) -> Result<(), Error> {
        let window = self.usb.FIFO.get(number).ok_or(Error::InvalidChannel)?;
        write_fifo(window, bytes);
        Ok(())
    }

    /// Pop `bytes.len()` bytes from the Rx FIFO
    ///
    /// Pops whole words; bytes beyond `bytes.len()` in the final word are discarded.
    pub fn fifo_read(&mut self, bytes: &mut [u8]) {
        let window = &self.usb.FIFO[0];
        fifo::unpack_words(bytes, || window.DATA.read());
    }

    /// Pop the next receive status entry
    ///
    /// Call this only when [`interrupt::Global::RX_FIFO_NOT_EMPTY`] is set.
    pub fn pop_rx_status(&mut self) -> RxStatus {
        use ral::GRSTATP;
        let grstatp = ral::read_reg!(ral, self.usb, GRSTATP);
        let field = |mask: u32, offset: u32| (grstatp & mask) >> offset;
        RxStatus {
            number: field(GRSTATP::EPNUM::mask, GRSTATP::EPNUM::offset) as u8,
            bytes: field(GRSTATP::BCOUNT::mask, GRSTATP::BCOUNT::offset) as u16,
            pid: field(GRSTATP::DPID::mask, GRSTATP::DPID::offset) as u8,
            status: field(GRSTATP::RPCKST::mask, GRSTATP::RPCKST::offset) as u8,
        }
    }

    /// Enable (`true`) or disable (`false`) the controller's interrupt output
    pub fn set_interrupts(&mut self, interrupts: bool) {
        ral::modify_reg!(ral, self.usb, GAHBCS, GINTEN: interrupts as u32);
    }

    /// Returns the currently enabled global interrupts
    pub fn enabled_interrupts(&self) -> interrupt::Global {
        interrupt::Global::from_bits_truncate(ral::read_reg!(ral, self.usb, GINTEN))
    }

    pub(crate) fn enable_interrupts(&self, mask: interrupt::Global) {
        ral::modify_reg!(ral, self.usb, GINTEN, |ginten| ginten | mask.bits());
    }

    fn enable_common_interrupts(&self) {
        if !self.config.otg {
            ral::write_reg!(ral, self.usb, GOTGINTF, u32::MAX);
        }
        ral::write_reg!(ral, self.usb, GINTEN, interrupt::common(self.config.otg).bits());
    }

    /// Mask everything, clear pending flags, then enable `mask`
    pub(crate) fn replace_interrupts(&self, clear: u32, mask: interrupt::Global) {
        ral::write_reg!(ral, self.usb, GINTEN, 0);
        ral::write_reg!(ral, self.usb, GINTF, clear);
        self.enable_common_interrupts();
        self.enable_interrupts(mask);
    }

    /// Read the pending, enabled global interrupts
    ///
    /// Flags that are cleared by writing one are cleared before returning.
    /// Summary flags (FIFO levels, port, channel and endpoint summaries)
    /// clear when their source is serviced.
    pub fn poll(&mut self) -> interrupt::Global {
        use interrupt::Global;
        const SUMMARY: Global = Global::RX_FIFO_NOT_EMPTY
            .union(Global::NON_PERIODIC_TX_FIFO_EMPTY)
            .union(Global::PERIODIC_TX_FIFO_EMPTY)
            .union(Global::GLOBAL_IN_NAK)
            .union(Global::GLOBAL_OUT_NAK)
            .union(Global::HOST_PORT)
            .union(Global::HOST_CHANNEL)
            .union(Global::IN_ENDPOINT)
            .union(Global::OUT_ENDPOINT)
            .union(Global::OTG);

        let pending = ral::read_reg!(ral, self.usb, GINTF) & ral::read_reg!(ral, self.usb, GINTEN);
        let pending = Global::from_bits_truncate(pending);
        let clear = pending.difference(SUMMARY);
        if !clear.is_empty() {
            ral::write_reg!(ral, self.usb, GINTF, clear.bits());
        }
        trace!("POLL {=u32:X}", pending.bits());
        pending
    }
}

/// Encode a transfer type for channel and endpoint control registers
pub(crate) fn endpoint_type_bits(kind: EndpointType) -> u32 {
    use ral::hc::CTL::EPTYPE::RW;
    match kind {
        EndpointType::Control => RW::CONTROL,
        EndpointType::Isochronous { .. } => RW::ISOCHRONOUS,
        EndpointType::Bulk => RW::BULK,
        EndpointType::Interrupt => RW::INTERRUPT,
    }
}

/// Write bytes as FIFO words
pub(crate) fn write_fifo(window: &ral::fifo::RegisterBlock, bytes: &[u8]) {
    for word in fifo::pack_words(bytes) {
        window.DATA.write(word);
    }
}

#[cfg(test)]
mod tests {
    use super::{Config, CoreId, Role, TimeoutPolicy, UsbCore};
    use crate::{
        fifo::TxFifo,
        interrupt::Global,
        poll::Budget,
        ral,
        sim::{Clock, Sim},
        Error,
    };

    fn setup(config: Config) -> (Sim, UsbCore<Sim, Clock>) {
        let sim = Sim::new();
        let mut core = UsbCore::new(sim, Clock::new(), config);
        core.core_select(CoreId::FullSpeed);
        (sim, core)
    }

    fn strict() -> Config {
        Config {
            timeouts: TimeoutPolicy::Report,
            budget: Budget::iterations(1_000),
            ..Config::default()
        }
    }

    #[test]
    fn select_full_speed() {
        let sim = Sim::new();
        let mut core = UsbCore::new(
            sim,
            Clock::new(),
            Config {
                low_power: true,
                ..Config::default()
            },
        );
        assert!(core.profile().is_none());
        let profile = *core.core_select(CoreId::FullSpeed);
        assert_eq!(profile.max_packet_size, 64);
        assert_eq!(profile.host_channels, 8);
        assert_eq!(profile.device_endpoints, 4);
        assert_eq!(profile.fifo_words, 320);
        assert!(profile.low_power);
        assert!(!profile.sof_output);
        assert_eq!(sim.word(0x010), 0, "select has no hardware side effects");
    }

    #[test]
    fn init_requires_select() {
        let mut core = UsbCore::new(Sim::new(), Clock::new(), Config::default());
        assert_eq!(core.core_init(), Err(Error::InvalidState));
    }

    #[test]
    fn init_powers_up_after_reset_timeout() {
        let (sim, mut core) = setup(strict());
        assert_eq!(core.core_init(), Err(Error::ResetTimeout));
        let gccfg = sim.word(0x038);
        assert_ne!(gccfg & ral::GCCFG::PWRON::mask, 0);
        assert_ne!(gccfg & ral::GCCFG::VBUSACEN::mask, 0);
        assert_ne!(gccfg & ral::GCCFG::VBUSBCEN::mask, 0);
        assert_eq!(gccfg & ral::GCCFG::VBUSIG::mask, 0);
        assert_eq!(sim.word(0x008) & ral::GAHBCS::TXFTH::mask, 0);
        assert!(core.delay.elapsed_ms() >= 20);
    }

    #[test]
    fn init_ignores_reset_timeout_when_permissive() {
        let (sim, mut core) = setup(Config {
            timeouts: TimeoutPolicy::Ignore,
            vbus_sensing: false,
            sof_output: true,
            budget: Budget::iterations(100),
            ..Config::default()
        });
        assert_eq!(core.core_init(), Ok(()));
        let gccfg = sim.word(0x038);
        assert_ne!(gccfg & ral::GCCFG::VBUSIG::mask, 0);
        assert_ne!(gccfg & ral::GCCFG::SOFOEN::mask, 0);
    }

    #[test]
    fn mode_set_forces_role_and_settles() {
        let (sim, mut core) = setup(strict());
        core.mode_set(Role::Host);
        let gusbcs = sim.word(0x00C);
        assert_ne!(gusbcs & ral::GUSBCS::FHM::mask, 0);
        assert_eq!(gusbcs & ral::GUSBCS::FDM::mask, 0);
        assert_eq!(core.delay.elapsed_ms(), 50);
        assert_eq!(core.role(), Some(Role::Host));

        core.mode_set(Role::Device);
        let gusbcs = sim.word(0x00C);
        assert_eq!(gusbcs & ral::GUSBCS::FHM::mask, 0);
        assert_ne!(gusbcs & ral::GUSBCS::FDM::mask, 0);
        assert_eq!(core.delay.elapsed_ms(), 100);
    }

    #[test]
    fn current_mode_from_hardware() {
        let (sim, core) = setup(strict());
        assert_eq!(core.current_mode(), Role::Device);
        sim.set_word(0x014, 1);
        assert_eq!(core.current_mode(), Role::Host);
    }

    #[test]
    fn flush_never_hangs() {
        let (sim, mut core) = setup(strict());
        assert_eq!(core.tx_fifo_flush(TxFifo::All), Err(Error::FlushTimeout));
        let grstctl = sim.word(0x010);
        assert_eq!(grstctl, (0x10 << 6) | ral::GRSTCTL::TXFF::mask);

        assert_eq!(core.rx_fifo_flush(), Err(Error::FlushTimeout));
        assert_eq!(sim.word(0x010), ral::GRSTCTL::RXFF::mask);
    }

    #[test]
    fn flush_timeout_ignored_when_permissive() {
        let (sim, mut core) = setup(Config {
            timeouts: TimeoutPolicy::Ignore,
            budget: Budget::iterations(10),
            ..Config::default()
        });
        assert_eq!(core.tx_fifo_flush(TxFifo::Number(2)), Ok(()));
        assert_eq!(sim.word(0x010), (2 << 6) | ral::GRSTCTL::TXFF::mask);
        assert_eq!(core.rx_fifo_flush(), Ok(()));
        assert_eq!(core.delay.elapsed_us(), 6);
    }

    #[test]
    fn flush_wait_ticks_the_delay() {
        let (_, mut core) = setup(Config {
            timeouts: TimeoutPolicy::Report,
            budget: Budget::iterations(10).ticking(100),
            ..Config::default()
        });
        assert_eq!(core.rx_fifo_flush(), Err(Error::FlushTimeout));
        assert_eq!(core.delay.elapsed_us(), 10 * 100 + 3);
    }

    #[test]
    fn flush_rejects_missing_fifo() {
        let (sim, mut core) = setup(strict());
        assert_eq!(core.tx_fifo_flush(TxFifo::Number(16)), Err(Error::InvalidEndpoint));
        assert_eq!(core.tx_fifo_flush(TxFifo::Number(4)), Err(Error::InvalidEndpoint));
        assert_eq!(sim.word(0x010), 0);
        assert_eq!(core.delay.elapsed_us(), 0);
    }

    #[test]
    fn fifo_write_packs_words() {
        let (sim, mut core) = setup(strict());
        core.fifo_write(2, &[0xAA, 0xBB, 0xCC, 0xDD, 0xEE]).unwrap();
        // RAM never pops, so the window holds the last word written.
        assert_eq!(sim.word(0x3000), 0x0000_00EE);
        assert_eq!(core.fifo_write(8, &[1]), Err(Error::InvalidChannel));
    }

    #[test]
    fn fifo_read_unpacks_words() {
        let (sim, mut core) = setup(strict());
        sim.set_word(0x1000, 0x0403_0201);
        let mut bytes = [0u8; 3];
        core.fifo_read(&mut bytes);
        assert_eq!(bytes, [1, 2, 3]);
    }

    #[test]
    fn rx_status_fields() {
        let (sim, mut core) = setup(strict());
        sim.set_word(0x020, (2 << 17) | (2 << 15) | (64 << 4) | 3);
        let status = core.pop_rx_status();
        assert_eq!(status.number, 3);
        assert_eq!(status.bytes, 64);
        assert_eq!(status.pid, 2);
        assert_eq!(status.status, 2);
    }

    #[test]
    fn poll_reports_enabled_and_clears_latched() {
        let (sim, mut core) = setup(strict());
        sim.set_word(
            0x014,
            (Global::SOF | Global::RX_FIFO_NOT_EMPTY | Global::RESET).bits(),
        );
        sim.set_word(0x018, (Global::SOF | Global::RX_FIFO_NOT_EMPTY).bits());
        let pending = core.poll();
        assert_eq!(pending, Global::SOF | Global::RX_FIFO_NOT_EMPTY);
        // Only the latched SOF flag is written back.
        assert_eq!(sim.word(0x014), Global::SOF.bits());
    }

    #[test]
    fn interrupt_output() {
        let (sim, mut core) = setup(strict());
        core.set_interrupts(true);
        assert_eq!(sim.word(0x008) & 1, 1);
        core.set_interrupts(false);
        assert_eq!(sim.word(0x008) & 1, 0);
    }
}
