//! Card register decoding
//!
//! OCR, card status, CSD, CID and SCR are decoded through named bitfields.
//! Bit positions are the ones of the SD Physical Layer specification; 136-bit
//! responses are realigned so that field offsets match the register layout.

use super::error::SwitchError;
use tock_registers::LocalRegisterCopy;
use tock_registers::register_bitfields;
use zerocopy::byteorder::big_endian::U16;
use zerocopy::{FromBytes, Immutable, KnownLayout};

const _: () = assert!(core::mem::size_of::<SwitchStatus>() == SwitchStatus::SIZE);

/// Sector size used for capacity computation
const SECTOR_SHIFT: i32 = 9;

// ============================================================================
// Register Bitfield Definitions
// ============================================================================

register_bitfields! [
    u32,
    /// Operation Conditions Register
    pub OCR [
        /// Supported supply voltages (2.7-3.6 V in 100 mV steps)
        VOLTAGE_WINDOW OFFSET(15) NUMBITS(9) [],
        /// MMC access mode
        ACCESS_MODE OFFSET(29) NUMBITS(2) [
            Byte = 0,
            Sector = 2
        ],
        /// Card capacity status (SD) / host capacity support (request)
        CCS OFFSET(30) NUMBITS(1) [],
        /// Power-up routine finished (card no longer busy)
        POWER_UP OFFSET(31) NUMBITS(1) []
    ],

    /// Card status returned in R1 responses
    pub CARD_STATUS [
        /// The card expects an application command next
        APP_CMD OFFSET(5) NUMBITS(1) [],
        /// Buffer empty on the bus
        READY_FOR_DATA OFFSET(8) NUMBITS(1) [],
        /// Card state machine
        CURRENT_STATE OFFSET(9) NUMBITS(4) [
            Idle = 0,
            Ready = 1,
            Identification = 2,
            Standby = 3,
            Transfer = 4,
            Data = 5,
            Receive = 6,
            Program = 7,
            Disconnect = 8
        ],
        /// Card-internal error
        ERROR OFFSET(19) NUMBITS(1) [],
        /// Address out of range
        OUT_OF_RANGE OFFSET(31) NUMBITS(1) []
    ]
];

register_bitfields! [
    u64,
    /// SD Configuration Register
    pub SCR [
        /// SCR structure version
        SCR_STRUCTURE OFFSET(60) NUMBITS(4) [],
        /// Physical layer specification version
        SD_SPEC OFFSET(56) NUMBITS(4) [
            V1_0 = 0,
            V1_10 = 1,
            V2_0 = 2
        ],
        /// Data state after erase
        DATA_STAT_AFTER_ERASE OFFSET(55) NUMBITS(1) [],
        /// Security support
        SD_SECURITY OFFSET(52) NUMBITS(3) [],
        /// 4-bit data bus supported
        BUS_WIDTH_4 OFFSET(50) NUMBITS(1) [],
        /// 1-bit data bus supported
        BUS_WIDTH_1 OFFSET(48) NUMBITS(1) []
    ]
];

register_bitfields! [
    u128,
    /// Card-Specific Data register
    pub CSD [
        /// Structure version (0 = standard capacity, 1 = high capacity)
        CSD_STRUCTURE OFFSET(126) NUMBITS(2) [
            V1 = 0,
            V2 = 1
        ],
        /// Maximum data transfer rate
        TRAN_SPEED OFFSET(96) NUMBITS(8) [],
        /// Card command classes
        CCC OFFSET(84) NUMBITS(12) [],
        /// log2 of the maximum read block length
        READ_BL_LEN OFFSET(80) NUMBITS(4) [],
        /// Device size (structure version 0)
        C_SIZE_V1 OFFSET(62) NUMBITS(12) [],
        /// Device size (structure version 1)
        C_SIZE_V2 OFFSET(48) NUMBITS(22) [],
        /// Device size multiplier (structure version 0)
        C_SIZE_MULT OFFSET(47) NUMBITS(3) [],
        /// Permanent write protection
        PERM_WRITE_PROTECT OFFSET(13) NUMBITS(1) [],
        /// Temporary write protection
        TMP_WRITE_PROTECT OFFSET(12) NUMBITS(1) []
    ],

    /// Card Identification register
    pub CID [
        /// Manufacturer ID
        MID OFFSET(120) NUMBITS(8) [],
        /// OEM/application ID
        OID OFFSET(104) NUMBITS(16) [],
        /// Product name (5 ASCII characters)
        PNM OFFSET(64) NUMBITS(40) [],
        /// Product revision
        PRV OFFSET(56) NUMBITS(8) [],
        /// Product serial number
        PSN OFFSET(24) NUMBITS(32) [],
        /// Manufacturing date (year offset from 2000, month)
        MDT_YEAR OFFSET(12) NUMBITS(8) [],
        MDT_MONTH OFFSET(8) NUMBITS(4) []
    ]
];

/// Reassemble a 136-bit response whose CRC byte the host has stripped
fn long_response(response: [u32; 4]) -> u128 {
    let raw = (u128::from(response[3]) << 96)
        | (u128::from(response[2]) << 64)
        | (u128::from(response[1]) << 32)
        | u128::from(response[0]);
    raw << 8
}

// ============================================================================
// OCR
// ============================================================================

/// Operation Conditions Register
#[derive(Debug, Clone, Copy)]
pub struct Ocr(LocalRegisterCopy<u32, OCR::Register>);

impl Ocr {
    /// Card capacity / host capacity support bit
    pub const CCS: u32 = 1 << 30;

    pub const fn new(raw: u32) -> Self {
        Self(LocalRegisterCopy::new(raw))
    }

    pub fn raw(&self) -> u32 {
        self.0.get()
    }

    /// Check whether every voltage of `window` is supported
    pub fn supports(&self, window: u32) -> bool {
        window & self.raw() == window
    }

    /// The card finished its power-up routine
    pub fn powered_up(&self) -> bool {
        self.0.is_set(OCR::POWER_UP)
    }

    /// SD card capacity status (sector addressing)
    pub fn high_capacity(&self) -> bool {
        self.0.is_set(OCR::CCS)
    }

    /// MMC access mode field
    pub fn access_mode(&self) -> u32 {
        self.0.read(OCR::ACCESS_MODE)
    }
}

// ============================================================================
// Card status
// ============================================================================

/// Card status from an R1 response
#[derive(Debug, Clone, Copy)]
pub struct CardStatus(LocalRegisterCopy<u32, CARD_STATUS::Register>);

impl CardStatus {
    pub const fn new(raw: u32) -> Self {
        Self(LocalRegisterCopy::new(raw))
    }

    /// The card accepted CMD55 and waits for an application command
    pub fn app_cmd(&self) -> bool {
        self.0.is_set(CARD_STATUS::APP_CMD)
    }

    pub fn current_state(&self) -> u32 {
        self.0.read(CARD_STATUS::CURRENT_STATE)
    }
}

// ============================================================================
// CSD
// ============================================================================

/// Card-Specific Data register
#[derive(Debug, Clone, Copy)]
pub struct Csd(LocalRegisterCopy<u128, CSD::Register>);

impl Csd {
    /// Decode from the words of an R2 response
    pub fn from_response(response: [u32; 4]) -> Self {
        Self::new(long_response(response))
    }

    pub const fn new(raw: u128) -> Self {
        Self(LocalRegisterCopy::new(raw))
    }

    pub fn raw(&self) -> u128 {
        self.0.get()
    }

    /// CSD structure version field
    pub fn structure(&self) -> u8 {
        self.0.read(CSD::CSD_STRUCTURE) as u8
    }

    /// Raw maximum transfer rate code
    pub fn tran_speed(&self) -> u8 {
        self.0.read(CSD::TRAN_SPEED) as u8
    }

    /// Capacity in 512-byte sectors, 0 for unknown structure versions
    pub fn sector_count(&self) -> u32 {
        let sectors: u64 = match self.structure() {
            0 => {
                let c_size = self.0.read(CSD::C_SIZE_V1) as u64;
                let c_size_mult = self.0.read(CSD::C_SIZE_MULT) as i32;
                let read_bl_len = self.0.read(CSD::READ_BL_LEN) as i32;
                let shift = read_bl_len + c_size_mult + 2 - SECTOR_SHIFT;
                if shift >= 0 {
                    (c_size + 1) << shift
                } else {
                    (c_size + 1) >> -shift
                }
            }
            1 => (self.0.read(CSD::C_SIZE_V2) as u64 + 1) << 10,
            _ => 0,
        };
        u32::try_from(sectors).unwrap_or(u32::MAX)
    }
}

// ============================================================================
// CID
// ============================================================================

/// Card Identification register
#[derive(Debug, Clone, Copy)]
pub struct Cid(LocalRegisterCopy<u128, CID::Register>);

impl Cid {
    /// Decode from the words of an R2 response
    pub fn from_response(response: [u32; 4]) -> Self {
        Self::new(long_response(response))
    }

    pub const fn new(raw: u128) -> Self {
        Self(LocalRegisterCopy::new(raw))
    }

    pub fn raw(&self) -> u128 {
        self.0.get()
    }

    pub fn manufacturer_id(&self) -> u8 {
        self.0.read(CID::MID) as u8
    }

    pub fn oem_id(&self) -> u16 {
        self.0.read(CID::OID) as u16
    }

    /// Product name, non-printable characters replaced by '?'
    pub fn product_name(&self) -> heapless::String<5> {
        let pnm = self.0.read(CID::PNM) as u64;
        let mut name = heapless::String::new();
        for byte in pnm.to_be_bytes()[3..].iter() {
            let c = if byte.is_ascii_graphic() || *byte == b' ' {
                *byte as char
            } else {
                '?'
            };
            let _ = name.push(c);
        }
        name
    }

    pub fn revision(&self) -> u8 {
        self.0.read(CID::PRV) as u8
    }

    pub fn serial(&self) -> u32 {
        self.0.read(CID::PSN) as u32
    }

    /// Manufacturing (year, month)
    pub fn manufactured(&self) -> (u16, u8) {
        (
            2000 + self.0.read(CID::MDT_YEAR) as u16,
            self.0.read(CID::MDT_MONTH) as u8,
        )
    }
}

// ============================================================================
// SCR
// ============================================================================

/// SD Configuration Register
#[derive(Debug, Clone, Copy)]
pub struct Scr(LocalRegisterCopy<u64, SCR::Register>);

impl Scr {
    /// Decode from the two data port words of the ACMD51 block
    ///
    /// The register is sent most significant byte first.
    pub fn from_words(words: [u32; 2]) -> Self {
        let mut stream = [0u8; 8];
        stream[..4].copy_from_slice(&words[0].to_le_bytes());
        stream[4..].copy_from_slice(&words[1].to_le_bytes());
        Self::new(u64::from_be_bytes(stream))
    }

    pub const fn new(raw: u64) -> Self {
        Self(LocalRegisterCopy::new(raw))
    }

    pub fn raw(&self) -> u64 {
        self.0.get()
    }

    /// Physical layer specification version field
    pub fn sd_spec(&self) -> u8 {
        self.0.read(SCR::SD_SPEC) as u8
    }

    pub fn supports_4bit(&self) -> bool {
        self.0.is_set(SCR::BUS_WIDTH_4)
    }
}

// ============================================================================
// Switch Function Status
// ============================================================================

/// Switch function status block returned by CMD6 (512 bits, MSB first)
#[derive(FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct SwitchStatus {
    /// Maximum current consumption in mA [511:496]
    max_current: U16,
    /// Supported functions of groups 6..1 [495:400]
    support: [U16; 6],
    /// Selected function of groups 6..1, one nibble each [399:376]
    selection: [u8; 3],
    /// Data structure version [375:368]
    version: u8,
    /// Busy status of groups 6..1 [367:272]
    busy: [U16; 6],
    /// Reserved [271:0]
    _reserved: [u8; 34],
}

impl SwitchStatus {
    /// Size of the status block in bytes
    pub const SIZE: usize = 64;

    /// Parse the block from the card's byte stream
    pub fn parse(stream: &[u8; Self::SIZE]) -> Self {
        zerocopy::transmute!(*stream)
    }

    /// Index of a function group (1-6) in the big-endian arrays
    fn slot(group: u8) -> usize {
        6 - usize::from(group.clamp(1, 6))
    }

    pub fn max_current_ma(&self) -> u16 {
        self.max_current.get()
    }

    /// Bitmap of functions supported in `group`
    pub fn supported(&self, group: u8) -> u16 {
        self.support[Self::slot(group)].get()
    }

    /// Function the card selected (or would select) in `group`
    pub fn selected(&self, group: u8) -> u8 {
        let index = usize::from(group.clamp(1, 6) - 1);
        let byte = self.selection[2 - index / 2];
        if index % 2 == 0 { byte & 0xF } else { byte >> 4 }
    }

    pub fn structure_version(&self) -> u8 {
        self.version
    }

    /// Check whether `function` of `group` is reported busy
    pub fn busy(&self, group: u8, function: u8) -> bool {
        let bitmap = self.busy[Self::slot(group)].get();
        function < 16 && bitmap & (1 << function) != 0
    }

    /// Reject a switch that draws more current than the slot provides
    pub(crate) fn check_current(&self, max_current_ma: u16) -> Result<(), SwitchError> {
        let required_ma = self.max_current_ma();
        if required_ma > max_current_ma {
            return Err(SwitchError::CurrentLimit { required_ma });
        }
        Ok(())
    }

    /// Reject a switch whose function is busy or was not selected
    ///
    /// Busy bits are only defined from data structure version 1 on.
    pub(crate) fn check_function(&self, group: u8, function: u8) -> Result<(), SwitchError> {
        if self.structure_version() == 1 && self.busy(group, function) {
            return Err(SwitchError::Busy);
        }
        let selected = self.selected(group);
        if function != 0xF && selected != function {
            return Err(SwitchError::NotSelected { selected });
        }
        Ok(())
    }
}
