//! SD/MMC Memory Card Driver
//!
//! This module brings a removable SD or MMC card on one slot of an SDIO host
//! to the data transfer state and moves 512-byte sectors to and from it.
//!
//! # Usage
//!
//! ```ignore
//! static SIGNAL: TransferSignal = TransferSignal::new();
//! static ROUTER: InterruptRouter<'static> = InterruptRouter::new();
//!
//! let mut slot = SdSlot::setup(SlotConfig::MV0153, &host, &board, &ROUTER, &SIGNAL);
//! slot.card_init()?;
//! slot.read(&mut buffer, 0, 8, Endianness::Little)?;
//! ```
//!
//! The board's interrupt handler for the host calls
//! `ROUTER.dispatch(HostId::Host1, &host, &board)`.

mod card;
pub mod clock;
mod error;
mod io;
mod irq;
pub mod registers;

#[cfg(test)]
pub(crate) mod sim;

pub use crate::drivers::sdhci::{BusWidth, Endianness, HostId, SlotIndex};
pub use crate::platform::PinRange;
pub use clock::{ClockDividers, SetupWarnings};
pub use error::{InitError, IoError};
pub use irq::{InterruptRouter, TransferSignal};

use crate::drivers::sdhci::{
    self, Command, HostError, IntStatus, PresentState, ResetLines, ResponseType, SdHost,
};
use crate::platform::Platform;
use crate::time::{self, Deadline};
use registers::{Cid, Csd, Ocr, Scr};

/// Sector size (always 512 bytes)
pub const SECTOR_SIZE: u32 = 512;

/// Card detect debounce window (milliseconds)
const DEBOUNCE_MS: u64 = 1;

/// 3.2-3.3 V and 3.3-3.4 V
pub const VOLTAGE_WINDOW_3V3: u32 = (1 << 20) | (1 << 21);

/// Status bits that raise the host interrupt line
const SIGNALLED: IntStatus = IntStatus::CMD_COMPLETE
    .union(IntStatus::TRANSFER_COMPLETE)
    .union(IntStatus::DMA);

// ============================================================================
// Slot Configuration
// ============================================================================

/// Physical slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotId {
    Host1Slot1,
    Host1Slot2,
    Host2Slot1,
}

impl SlotId {
    pub const fn host(self) -> HostId {
        match self {
            SlotId::Host1Slot1 | SlotId::Host1Slot2 => HostId::Host1,
            SlotId::Host2Slot1 => HostId::Host2,
        }
    }

    pub const fn index(self) -> SlotIndex {
        match self {
            SlotId::Host1Slot1 | SlotId::Host2Slot1 => SlotIndex::Slot1,
            SlotId::Host1Slot2 => SlotIndex::Slot2,
        }
    }
}

/// Static description of a slot, supplied by the board
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotConfig {
    pub slot: SlotId,
    /// Data lines wired to the socket
    pub bus_width: BusWidth,
    /// The socket has a card detect switch
    pub card_detect: bool,
    /// The socket has a write protect switch
    pub write_protect: bool,
    /// Highest SD clock the slot's wiring supports (kHz)
    pub max_clock_khz: u32,
    /// Current the slot can supply (mA)
    pub max_current_ma: u16,
    /// High speed timing is electrically permitted
    pub allow_high_speed: bool,
    /// Supply voltages the card must support (OCR bits)
    pub voltage_window: u32,
    /// Pins switched to the SDIO function
    pub pins: &'static [PinRange],
}

impl SlotConfig {
    /// MV0153 board: host 1 slot 1, 4-bit socket with card detect
    pub const MV0153: SlotConfig = SlotConfig {
        slot: SlotId::Host1Slot1,
        bus_width: BusWidth::Four,
        card_detect: true,
        write_protect: false,
        max_clock_khz: 25_000,
        max_current_ma: 1000,
        allow_high_speed: false,
        voltage_window: VOLTAGE_WINDOW_3V3,
        pins: &[PinRange::new(85, 90, 2), PinRange::new(92, 92, 2)],
    };

    /// MV0117 board: host 1 slot 2, 4-bit socket with card detect and write protect
    pub const MV0117: SlotConfig = SlotConfig {
        slot: SlotId::Host1Slot2,
        bus_width: BusWidth::Four,
        card_detect: true,
        write_protect: true,
        max_clock_khz: 25_000,
        max_current_ma: 1000,
        allow_high_speed: false,
        voltage_window: VOLTAGE_WINDOW_3V3,
        pins: &[PinRange::new(129, 136, 2)],
    };
}

// ============================================================================
// Card State
// ============================================================================

/// Card family found during negotiation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardKind {
    /// SD card that did not answer the interface condition probe
    SdV1,
    /// SD physical layer 2.00 or later
    SdV2,
    Mmc,
}

/// How command arguments address the card
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Addressing {
    /// Byte offsets (standard capacity)
    Byte,
    /// 512-byte sector numbers (high capacity)
    Sector,
}

/// Negotiated card
#[derive(Debug, Clone, Copy)]
pub struct Card {
    pub kind: CardKind,
    pub ocr: Ocr,
    pub cid: Cid,
    pub csd: Csd,
    /// SD configuration register (SD cards only)
    pub scr: Option<Scr>,
    /// Relative card address, already in argument position (bits 31:16)
    pub rca: u32,
    pub addressing: Addressing,
    pub bus_width: BusWidth,
    /// High speed timing is active
    pub high_speed: bool,
    /// Access mode functions reported by CMD6 (function group 1)
    pub access_modes: u16,
    /// Capacity in sectors, 0 if unknown (MMC)
    pub sector_count: u32,
}

/// One slot of an SDIO host with the card inserted in it
pub struct SdSlot<'a, H: SdHost + ?Sized, P: Platform + ?Sized> {
    config: SlotConfig,
    host: &'a H,
    platform: &'a P,
    signal: &'a TransferSignal,
    host_clock_khz: u32,
    dividers: ClockDividers,
    current_divider: u16,
    write_protected: bool,
    warnings: SetupWarnings,
    card: Option<Card>,
}

impl<'a, H: SdHost + ?Sized, P: Platform + ?Sized> SdSlot<'a, H, P> {
    /// Configure the slot for card identification
    ///
    /// Resets the slot, derives the clock dividers, switches the bus to 1-bit
    /// mode at the identification clock, configures the pins and routes the
    /// host interrupt to `signal`. Configuration problems are logged and
    /// reported through [`SdSlot::warnings`]; they never abort the setup.
    pub fn setup(
        config: SlotConfig,
        host: &'a H,
        platform: &'a P,
        router: &InterruptRouter<'a>,
        signal: &'a TransferSignal,
    ) -> Self {
        let host_id = config.slot.host();
        let slot = config.slot.index();
        let mut warnings = SetupWarnings::empty();

        if !platform.host_clock_enabled(host_id) {
            log::error!("SDMEM: {:?} clock is disabled", host_id);
            warnings |= SetupWarnings::HOST_CLOCK_DISABLED;
        }

        let host_clock_khz = platform.host_clock_khz(host_id);
        if host_clock_khz > clock::HOST_CLOCK_MAX_KHZ {
            log::warn!(
                "SDMEM: host clock {} kHz above {} kHz",
                host_clock_khz,
                clock::HOST_CLOCK_MAX_KHZ
            );
            warnings |= SetupWarnings::HOST_CLOCK_TOO_HIGH;
        }
        if host_clock_khz < clock::HOST_CLOCK_MIN_KHZ {
            log::warn!(
                "SDMEM: host clock {} kHz below {} kHz",
                host_clock_khz,
                clock::HOST_CLOCK_MIN_KHZ
            );
            warnings |= SetupWarnings::HOST_CLOCK_TOO_LOW;
        }

        host.reset(slot, ResetLines::ALL);
        host.init(slot);

        let (dividers, divider_warnings) = ClockDividers::new(host_clock_khz, config.max_clock_khz);
        if divider_warnings.contains(SetupWarnings::DIVIDER_CLAMPED) {
            log::warn!("SDMEM: host clock {} kHz too fast for the largest divider", host_clock_khz);
        }
        if divider_warnings.contains(SetupWarnings::IDENT_CLOCK_TOO_LOW) {
            log::warn!(
                "SDMEM: identification clock {} kHz below {} kHz",
                clock::bus_khz(host_clock_khz, dividers.identification),
                clock::IDENTIFICATION_MIN_KHZ
            );
        }
        warnings |= divider_warnings;

        log::debug!(
            "SDMEM: {:?} dividers: ident {} data {} high speed {} mmc {}",
            config.slot,
            dividers.identification,
            dividers.data_transfer,
            dividers.high_speed,
            dividers.mmc
        );

        let mut this = Self {
            config,
            host,
            platform,
            signal,
            host_clock_khz,
            dividers,
            current_divider: dividers.identification,
            write_protected: false,
            warnings,
            card: None,
        };

        host.set_bus_width(slot, BusWidth::One);
        this.apply_divider(dividers.identification);

        for pins in config.pins {
            platform.configure_pins(pins);
        }

        platform.disable_line(host_id);
        platform.clear_line(host_id);
        if router.attach(host_id, slot, signal) {
            platform.install_handler(host_id);
        }
        host.set_signal_enable(slot, SIGNALLED);

        log::info!(
            "SDMEM: {:?} set up, host clock {} kHz, max {} kHz",
            config.slot,
            host_clock_khz,
            config.max_clock_khz
        );

        this
    }

    /// Check whether the card detect switch reports an empty socket
    ///
    /// Always false on sockets without card detect.
    pub fn no_card(&self) -> bool {
        self.config.card_detect
            && !self
                .host
                .present_state(self.config.slot.index())
                .contains(PresentState::CARD_DETECT_LEVEL)
    }

    /// Sector size in bytes (always 512)
    pub fn sector_size(&self) -> u32 {
        SECTOR_SIZE
    }

    /// Card capacity in sectors, 0 if unknown or no card is initialized
    pub fn sector_count(&self) -> u32 {
        self.card.as_ref().map_or(0, |card| card.sector_count)
    }

    /// The initialized card, if any
    pub fn card(&self) -> Option<&Card> {
        self.card.as_ref()
    }

    pub fn config(&self) -> &SlotConfig {
        &self.config
    }

    /// Problems found by [`SdSlot::setup`]
    pub fn warnings(&self) -> SetupWarnings {
        self.warnings
    }

    pub fn dividers(&self) -> ClockDividers {
        self.dividers
    }

    /// Divider currently programmed into the host
    pub fn current_divider(&self) -> u16 {
        self.current_divider
    }

    pub fn host_clock_khz(&self) -> u32 {
        self.host_clock_khz
    }

    /// Write protect switch state sampled by the last [`SdSlot::card_init`]
    pub fn write_protected(&self) -> bool {
        self.write_protected
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn slot(&self) -> SlotIndex {
        self.config.slot.index()
    }

    /// Program a divider, with high speed timing above 25 MHz if allowed
    fn apply_divider(&mut self, divider: u16) {
        let slot = self.slot();
        let bus_khz = clock::bus_khz(self.host_clock_khz, divider);
        let high_speed = self.config.allow_high_speed && bus_khz >= clock::HIGH_SPEED_TIMING_KHZ;

        self.host.set_divider(slot, divider);
        self.host.set_high_speed(slot, high_speed);
        self.current_divider = divider;

        log::debug!("SDMEM: bus clock {} kHz (divider {})", bus_khz, divider);
    }

    /// Wait for `clocks` SD clock periods at the current divider, or `us`
    /// microseconds, whichever is longer
    fn sleep(&self, clocks: u64, us: u64) {
        let bus_khz = u64::from(clock::bus_khz(self.host_clock_khz, self.current_divider));
        let clock_us = if bus_khz == 0 {
            0
        } else {
            (clocks * 1000).div_ceil(bus_khz)
        };
        time::delay_us(self.platform, clock_us.max(us));
    }

    /// Issue a command without data phase
    fn command(
        &self,
        index: u8,
        argument: u32,
        response: ResponseType,
    ) -> Result<[u32; 4], HostError> {
        sdhci::send_command(
            self.host,
            self.slot(),
            self.platform,
            &Command::new(index, argument, response),
        )
    }

    /// Card detect, debounced over [`DEBOUNCE_MS`]: any empty sample counts
    fn card_missing(&self) -> bool {
        if !self.config.card_detect {
            return false;
        }
        let deadline = Deadline::from_ms(self.platform, DEBOUNCE_MS);
        loop {
            if self.no_card() {
                return true;
            }
            if deadline.is_expired(self.platform) {
                return false;
            }
            self.platform.relax();
        }
    }
}
