//! SDIO Host Layer
//!
//! This module describes the host peripheral that moves commands and data
//! between the CPU and an SD/MMC card. [`SdHost`] is the register-level
//! interface a peripheral exposes for each of its slots; [`MmioHost`] is the
//! memory-mapped implementation for the two-slot SDIO host block.
//!
//! On top of the trait sit the command executor helpers ([`send_command`],
//! [`wait_for_status`]) which issue one command frame, wait for it to finish
//! and report the raw response words or the error status.

pub mod mmio;
pub mod regs;

pub use mmio::MmioHost;

use crate::time::{Deadline, Timebase};
use bitflags::bitflags;
use core::fmt;

/// Default timeout for a command to complete (milliseconds)
pub const CMD_TIMEOUT_MS: u64 = 1000;

// ============================================================================
// Host and Slot Identity
// ============================================================================

/// Host peripheral instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostId {
    /// First SDIO host, two slots
    Host1,
    /// Second SDIO host, one slot
    Host2,
}

impl HostId {
    /// Zero-based peripheral index
    pub const fn index(self) -> usize {
        match self {
            HostId::Host1 => 0,
            HostId::Host2 => 1,
        }
    }

    /// Slots wired on this peripheral
    pub const fn slots(self) -> &'static [SlotIndex] {
        match self {
            HostId::Host1 => &[SlotIndex::Slot1, SlotIndex::Slot2],
            HostId::Host2 => &[SlotIndex::Slot1],
        }
    }
}

/// Slot within one host peripheral
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotIndex {
    Slot1,
    Slot2,
}

impl SlotIndex {
    /// Zero-based slot index
    pub const fn index(self) -> usize {
        match self {
            SlotIndex::Slot1 => 0,
            SlotIndex::Slot2 => 1,
        }
    }
}

// ============================================================================
// Status Bits
// ============================================================================

bitflags! {
    /// Normal and error interrupt status bits (status, enable and signal registers)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct IntStatus: u32 {
        /// Command complete
        const CMD_COMPLETE = 1 << 0;
        /// Transfer complete
        const TRANSFER_COMPLETE = 1 << 1;
        /// Block gap event
        const BLOCK_GAP = 1 << 2;
        /// SDMA boundary reached
        const DMA = 1 << 3;
        /// Buffer write ready
        const BUFFER_WRITE_READY = 1 << 4;
        /// Buffer read ready
        const BUFFER_READ_READY = 1 << 5;
        /// Card insertion
        const CARD_INSERTION = 1 << 6;
        /// Card removal
        const CARD_REMOVAL = 1 << 7;
        /// Card interrupt
        const CARD_INTERRUPT = 1 << 8;
        /// Error interrupt summary
        const ERROR = 1 << 15;
        /// Command timeout (no response)
        const CMD_TIMEOUT = 1 << 16;
        /// Command CRC error
        const CMD_CRC = 1 << 17;
        /// Command end bit error
        const CMD_END_BIT = 1 << 18;
        /// Command index error
        const CMD_INDEX = 1 << 19;
        /// Data timeout
        const DATA_TIMEOUT = 1 << 20;
        /// Data CRC error
        const DATA_CRC = 1 << 21;
        /// Data end bit error
        const DATA_END_BIT = 1 << 22;
        /// Current limit error
        const CURRENT_LIMIT = 1 << 23;
        /// Auto CMD12 error
        const AUTO_CMD12 = 1 << 24;
        /// ADMA error
        const ADMA = 1 << 25;

        /// Every error bit including the summary
        const ERRORS = Self::ERROR.bits()
            | Self::CMD_TIMEOUT.bits()
            | Self::CMD_CRC.bits()
            | Self::CMD_END_BIT.bits()
            | Self::CMD_INDEX.bits()
            | Self::DATA_TIMEOUT.bits()
            | Self::DATA_CRC.bits()
            | Self::DATA_END_BIT.bits()
            | Self::CURRENT_LIMIT.bits()
            | Self::AUTO_CMD12.bits()
            | Self::ADMA.bits();
    }
}

bitflags! {
    /// Present state register bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PresentState: u32 {
        /// Command inhibit (CMD)
        const CMD_INHIBIT = 1 << 0;
        /// Command inhibit (DAT)
        const DAT_INHIBIT = 1 << 1;
        /// DAT line active
        const DAT_ACTIVE = 1 << 2;
        /// Write transfer active
        const WRITE_ACTIVE = 1 << 8;
        /// Read transfer active
        const READ_ACTIVE = 1 << 9;
        /// Buffer write enable
        const BUFFER_WRITE_ENABLE = 1 << 10;
        /// Buffer read enable
        const BUFFER_READ_ENABLE = 1 << 11;
        /// Card inserted
        const CARD_INSERTED = 1 << 16;
        /// Card state stable
        const CARD_STABLE = 1 << 17;
        /// Card detect pin level (high = card present)
        const CARD_DETECT_LEVEL = 1 << 18;
        /// Write protect pin level (low = protected)
        const WRITE_PROTECT_LEVEL = 1 << 19;
    }
}

bitflags! {
    /// Software reset lines
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ResetLines: u8 {
        /// Whole slot
        const ALL = 1 << 0;
        /// Command line
        const CMD = 1 << 1;
        /// Data lines
        const DAT = 1 << 2;
    }
}

// ============================================================================
// Command Frames
// ============================================================================

/// Data bus width
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusWidth {
    /// DAT0 only
    One,
    /// DAT0-DAT3
    Four,
}

/// Byte order of a transfer buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Little,
    Big,
}

/// Response format expected for a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
    /// No response
    None,
    /// Normal response
    R1,
    /// Normal response with busy
    R1b,
    /// CID/CSD (136 bits)
    R2,
    /// OCR
    R3,
    /// Published RCA (SD)
    R6,
    /// Card interface condition (SD)
    R7,
}

impl ResponseType {
    /// Whether the host checks the response CRC
    pub const fn crc_checked(self) -> bool {
        matches!(
            self,
            ResponseType::R1
                | ResponseType::R1b
                | ResponseType::R2
                | ResponseType::R6
                | ResponseType::R7
        )
    }

    /// Whether the host checks the echoed command index
    pub const fn index_checked(self) -> bool {
        matches!(
            self,
            ResponseType::R1 | ResponseType::R1b | ResponseType::R6 | ResponseType::R7
        )
    }
}

/// Direction of a data phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Card to host
    Read,
    /// Host to card
    Write,
}

/// Data phase attached to a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataPhase {
    pub direction: Direction,
    /// Bytes per block
    pub block_size: u16,
    /// Number of blocks
    pub block_count: u16,
    /// SDMA system address, or `None` for transfers through the buffer data port
    pub dma_address: Option<usize>,
    /// Issue CMD12 automatically after the last block
    pub auto_stop: bool,
}

/// One command frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    /// Command index (0-63)
    pub index: u8,
    pub argument: u32,
    pub response: ResponseType,
    pub data: Option<DataPhase>,
}

impl Command {
    /// Command without a data phase
    pub const fn new(index: u8, argument: u32, response: ResponseType) -> Self {
        Self {
            index,
            argument,
            response,
            data: None,
        }
    }

    /// Attach a data phase
    pub const fn with_data(mut self, data: DataPhase) -> Self {
        self.data = Some(data);
        self
    }
}

// ============================================================================
// Host Interface
// ============================================================================

/// Register-level access to one SDIO host peripheral
///
/// All methods take `&self`: the interrupt handler reads and acknowledges the
/// status registers of a peripheral while the foreground owns the slots.
pub trait SdHost {
    /// Software reset of the given lines of a slot, waiting for completion
    fn reset(&self, slot: SlotIndex, lines: ResetLines);

    /// Power the bus, start the internal clock, select SDMA, 1-bit bus and
    /// enable status reporting. Interrupt signalling stays off.
    fn init(&self, slot: SlotIndex);

    /// Program the SD clock as peripheral clock / `divider` (power of two, 1-256)
    fn set_divider(&self, slot: SlotIndex, divider: u16);

    /// Enable or disable high speed timing
    fn set_high_speed(&self, slot: SlotIndex, enable: bool);

    fn set_bus_width(&self, slot: SlotIndex, width: BusWidth);

    fn present_state(&self, slot: SlotIndex) -> PresentState;

    fn int_status(&self, slot: SlotIndex) -> IntStatus;

    /// Acknowledge status bits (write-1-to-clear)
    fn clear_int_status(&self, slot: SlotIndex, bits: IntStatus);

    /// Select which status bits raise the peripheral interrupt line
    fn set_signal_enable(&self, slot: SlotIndex, bits: IntStatus);

    /// Program argument, transfer mode and command registers, starting the command
    fn issue(&self, slot: SlotIndex, command: &Command);

    /// Raw response words, least significant first
    fn response(&self, slot: SlotIndex) -> [u32; 4];

    /// Pop one word from the buffer data port
    fn read_buffer(&self, slot: SlotIndex) -> u32;

    /// Push one word to the buffer data port
    fn write_buffer(&self, slot: SlotIndex, word: u32);

    fn dma_address(&self, slot: SlotIndex) -> usize;

    fn set_dma_address(&self, slot: SlotIndex, address: usize);

    /// Byte order in which the DMA engine lays out the card byte stream
    fn dma_byte_order(&self) -> Endianness {
        Endianness::Little
    }
}

// ============================================================================
// Command Executor
// ============================================================================

/// Command execution failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostError {
    /// The card did not answer (command timeout)
    NoResponse,
    /// The host reported error bits
    Status(IntStatus),
    /// Neither completion nor an error within the deadline
    Timeout,
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostError::NoResponse => write!(f, "no response"),
            HostError::Status(status) => write!(f, "error status {:#010x}", status.bits()),
            HostError::Timeout => write!(f, "timeout"),
        }
    }
}

/// Wait for the CMD (and DAT, if `data`) inhibit bits to clear
pub fn wait_inhibit<H, T>(
    host: &H,
    slot: SlotIndex,
    timebase: &T,
    data: bool,
) -> Result<(), HostError>
where
    H: SdHost + ?Sized,
    T: Timebase + ?Sized,
{
    let mask = if data {
        PresentState::CMD_INHIBIT | PresentState::DAT_INHIBIT
    } else {
        PresentState::CMD_INHIBIT
    };

    let deadline = Deadline::from_ms(timebase, CMD_TIMEOUT_MS);
    loop {
        if !host.present_state(slot).intersects(mask) {
            return Ok(());
        }
        if deadline.is_expired(timebase) {
            log::warn!("SDHCI: {:?} inhibit stuck", slot);
            return Err(HostError::Timeout);
        }
        timebase.relax();
    }
}

/// Issue a command and wait for its response
///
/// Returns the raw response words. Error bits are acknowledged before
/// returning; resetting the CMD line is left to the caller.
pub fn send_command<H, T>(
    host: &H,
    slot: SlotIndex,
    timebase: &T,
    command: &Command,
) -> Result<[u32; 4], HostError>
where
    H: SdHost + ?Sized,
    T: Timebase + ?Sized,
{
    wait_inhibit(host, slot, timebase, command.data.is_some())?;

    host.clear_int_status(slot, IntStatus::CMD_COMPLETE | IntStatus::ERRORS);
    host.issue(slot, command);

    let deadline = Deadline::from_ms(timebase, CMD_TIMEOUT_MS);
    loop {
        let status = host.int_status(slot);

        if status.intersects(IntStatus::ERRORS) {
            host.clear_int_status(slot, status & IntStatus::ERRORS);
            if status.contains(IntStatus::CMD_TIMEOUT) {
                log::trace!("SDHCI: CMD{} no response", command.index);
                return Err(HostError::NoResponse);
            }
            log::debug!("SDHCI: CMD{} error: {:#x}", command.index, status.bits());
            return Err(HostError::Status(status & IntStatus::ERRORS));
        }

        if status.contains(IntStatus::CMD_COMPLETE) {
            host.clear_int_status(slot, IntStatus::CMD_COMPLETE);
            return Ok(host.response(slot));
        }

        if deadline.is_expired(timebase) {
            log::debug!("SDHCI: CMD{} timeout", command.index);
            return Err(HostError::Timeout);
        }

        timebase.relax();
    }
}

/// Wait until any of `bits` is set or an error is reported
///
/// The matched bits are returned but not cleared. Error bits are acknowledged
/// and returned as [`HostError::Status`].
pub fn wait_for_status<H, T>(
    host: &H,
    slot: SlotIndex,
    timebase: &T,
    bits: IntStatus,
    timeout_ms: u64,
) -> Result<IntStatus, HostError>
where
    H: SdHost + ?Sized,
    T: Timebase + ?Sized,
{
    let deadline = Deadline::from_ms(timebase, timeout_ms);
    loop {
        let status = host.int_status(slot);

        if status.intersects(IntStatus::ERRORS) {
            host.clear_int_status(slot, status & IntStatus::ERRORS);
            return Err(HostError::Status(status & IntStatus::ERRORS));
        }

        if status.intersects(bits) {
            return Ok(status & bits);
        }

        if deadline.is_expired(timebase) {
            return Err(HostError::Timeout);
        }

        timebase.relax();
    }
}
