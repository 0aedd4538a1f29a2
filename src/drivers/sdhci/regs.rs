//! SDIO Host Register Definitions
//!
//! Register block of one slot of the SDIO host peripheral, using tock-registers.
//! The layout follows the SD Host Controller Simplified Specification with all
//! accesses performed as 32-bit words. A two-slot peripheral maps slot 2 at
//! [`SLOT_STRIDE`] bytes after slot 1.

use tock_registers::register_bitfields;
use tock_registers::registers::{ReadOnly, ReadWrite};

/// Distance between the register blocks of two slots of one peripheral
pub const SLOT_STRIDE: usize = 0x100;

// ============================================================================
// Slot Register Bitfield Definitions
// ============================================================================

register_bitfields! [
    u32,
    /// Block Size / Block Count (0x04)
    pub BLOCK [
        /// Transfer block size in bytes
        SIZE OFFSET(0) NUMBITS(12) [],
        /// SDMA buffer boundary
        SDMA_BOUNDARY OFFSET(12) NUMBITS(3) [
            Boundary4K = 0,
            Boundary512K = 7
        ],
        /// Number of blocks for multi-block transfers
        COUNT OFFSET(16) NUMBITS(16) []
    ],

    /// Transfer Mode / Command (0x0C)
    ///
    /// Writing the upper half starts the command.
    pub COMMAND [
        /// DMA enable
        DMA_ENABLE OFFSET(0) NUMBITS(1) [],
        /// Block count enable
        BLOCK_COUNT_ENABLE OFFSET(1) NUMBITS(1) [],
        /// Auto CMD12 enable
        AUTO_CMD12 OFFSET(2) NUMBITS(1) [],
        /// Data transfer direction (1 = card to host)
        READ OFFSET(4) NUMBITS(1) [],
        /// Multi block select
        MULTI_BLOCK OFFSET(5) NUMBITS(1) [],
        /// Response type
        RESPONSE OFFSET(16) NUMBITS(2) [
            None = 0,
            Long136 = 1,
            Short48 = 2,
            Short48Busy = 3
        ],
        /// Command CRC check enable
        CRC_CHECK OFFSET(19) NUMBITS(1) [],
        /// Command index check enable
        INDEX_CHECK OFFSET(20) NUMBITS(1) [],
        /// Data present select
        DATA_PRESENT OFFSET(21) NUMBITS(1) [],
        /// Command type
        TYPE OFFSET(22) NUMBITS(2) [
            Normal = 0,
            Abort = 3
        ],
        /// Command index
        INDEX OFFSET(24) NUMBITS(6) []
    ],

    /// Host Control / Power Control / Block Gap / Wakeup (0x28)
    pub HOST_CONTROL [
        /// LED control
        LED OFFSET(0) NUMBITS(1) [],
        /// Data transfer width (1 = 4-bit)
        DATA_WIDTH_4BIT OFFSET(1) NUMBITS(1) [],
        /// High speed timing enable
        HIGH_SPEED OFFSET(2) NUMBITS(1) [],
        /// DMA select
        DMA_SELECT OFFSET(3) NUMBITS(2) [
            Sdma = 0,
            Adma1 = 1,
            Adma2 = 2
        ],
        /// SD bus power
        BUS_POWER OFFSET(8) NUMBITS(1) [],
        /// SD bus voltage select
        BUS_VOLTAGE OFFSET(9) NUMBITS(3) [
            V1_8 = 5,
            V3_0 = 6,
            V3_3 = 7
        ]
    ],

    /// Clock Control / Timeout Control / Software Reset (0x2C)
    pub CLOCK_CONTROL [
        /// Internal clock enable
        INTERNAL_CLOCK_ENABLE OFFSET(0) NUMBITS(1) [],
        /// Internal clock stable
        INTERNAL_CLOCK_STABLE OFFSET(1) NUMBITS(1) [],
        /// SD clock enable
        SD_CLOCK_ENABLE OFFSET(2) NUMBITS(1) [],
        /// SDCLK frequency select (base clock divided by 2 * value)
        FREQ_SELECT OFFSET(8) NUMBITS(8) [],
        /// Data timeout counter value (TMCLK * 2^(13 + value))
        DATA_TIMEOUT OFFSET(16) NUMBITS(4) [],
        /// Software reset for all
        RESET_ALL OFFSET(24) NUMBITS(1) [],
        /// Software reset for CMD line
        RESET_CMD OFFSET(25) NUMBITS(1) [],
        /// Software reset for DAT line
        RESET_DAT OFFSET(26) NUMBITS(1) []
    ]
];

// ============================================================================
// Slot Register Memory Map
// ============================================================================

/// Registers of one slot (0x000-0x0FF relative to the slot base)
#[repr(C)]
pub struct SlotRegisters {
    /// SDMA System Address (0x00)
    pub sdma_address: ReadWrite<u32>,
    /// Block Size / Block Count (0x04)
    pub block: ReadWrite<u32, BLOCK::Register>,
    /// Argument (0x08)
    pub argument: ReadWrite<u32>,
    /// Transfer Mode / Command (0x0C)
    pub command: ReadWrite<u32, COMMAND::Register>,
    /// Response words (0x10-0x1F)
    pub response: [ReadOnly<u32>; 4],
    /// Buffer Data Port (0x20)
    pub buffer: ReadWrite<u32>,
    /// Present State (0x24)
    pub present_state: ReadOnly<u32>,
    /// Host Control (0x28)
    pub host_control: ReadWrite<u32, HOST_CONTROL::Register>,
    /// Clock Control (0x2C)
    pub clock_control: ReadWrite<u32, CLOCK_CONTROL::Register>,
    /// Normal and Error Interrupt Status (0x30)
    pub int_status: ReadWrite<u32>,
    /// Normal and Error Interrupt Status Enable (0x34)
    pub int_enable: ReadWrite<u32>,
    /// Normal and Error Interrupt Signal Enable (0x38)
    pub signal_enable: ReadWrite<u32>,
    /// Auto CMD12 Error Status (0x3C)
    pub auto_cmd12_error: ReadOnly<u32>,
    /// Capabilities (0x40)
    pub capabilities: ReadOnly<u32>,
    /// Reserved (0x44)
    _reserved0: u32,
    /// Maximum Current Capabilities (0x48)
    pub max_current: ReadOnly<u32>,
    /// Reserved (0x4C-0xFB)
    _reserved1: [u32; 44],
    /// Slot Interrupt Status / Host Controller Version (0xFC)
    pub slot_int_version: ReadOnly<u32>,
}

const _: () = assert!(core::mem::size_of::<SlotRegisters>() == SLOT_STRIDE);

// ============================================================================
// SD/MMC Commands
// ============================================================================

/// GO_IDLE_STATE - Resets all cards to idle state
pub const CMD_GO_IDLE_STATE: u8 = 0;

/// SEND_OP_COND (MMC) - Negotiates the operating voltage
pub const CMD_SEND_OP_COND: u8 = 1;

/// ALL_SEND_CID - Asks all cards to send their CID
pub const CMD_ALL_SEND_CID: u8 = 2;

/// SEND_RELATIVE_ADDR (SD) / SET_RELATIVE_ADDR (MMC)
pub const CMD_RELATIVE_ADDR: u8 = 3;

/// SWITCH_FUNC - Check/switch card function
pub const CMD_SWITCH_FUNC: u8 = 6;

/// SELECT/DESELECT_CARD - Toggles card between stand-by and transfer states
pub const CMD_SELECT_CARD: u8 = 7;

/// SEND_IF_COND - Sends SD interface condition
pub const CMD_SEND_IF_COND: u8 = 8;

/// SEND_CSD - Asks card to send its CSD
pub const CMD_SEND_CSD: u8 = 9;

/// STOP_TRANSMISSION - Forces card to stop transmission
pub const CMD_STOP_TRANSMISSION: u8 = 12;

/// READ_MULTIPLE_BLOCK - Continuously reads blocks until STOP_TRANSMISSION
pub const CMD_READ_MULTIPLE_BLOCK: u8 = 18;

/// WRITE_MULTIPLE_BLOCK - Continuously writes blocks until STOP_TRANSMISSION
pub const CMD_WRITE_MULTIPLE_BLOCK: u8 = 25;

/// APP_CMD - Indicates next command is application specific
pub const CMD_APP_CMD: u8 = 55;

// SD application commands (sent after CMD55)

/// SET_BUS_WIDTH (ACMD6) - Sets bus width
pub const ACMD_SET_BUS_WIDTH: u8 = 6;

/// SD_SEND_OP_COND (ACMD41) - Sends host capacity support info
pub const ACMD_SD_SEND_OP_COND: u8 = 41;

/// SEND_SCR (ACMD51) - Reads SD Configuration Register
pub const ACMD_SEND_SCR: u8 = 51;
