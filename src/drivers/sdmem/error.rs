//! Card driver errors

use crate::drivers::sdhci::{HostError, IntStatus};
use core::fmt;

/// Card initialization failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitError {
    /// Card detect reports no card
    NoCard,
    /// The card did not echo the interface condition check pattern
    InterfaceCondition,
    /// The card does not support the slot's voltage window
    VoltageMismatch,
    /// The card stayed busy for the whole power-up window
    Timeout,
    /// MMC access mode outside byte/sector addressing
    UnsupportedAccessMode,
    /// Bus error on standard command CMDn
    Command(u8),
    /// Bus error on application command ACMDn
    AppCommand(u8),
}

impl InitError {
    /// Integer error code
    ///
    /// Structural failures are small negative numbers, bus errors are
    /// `0x100 + n` for CMDn and `0x200 + n` for ACMDn.
    pub const fn code(self) -> i32 {
        match self {
            InitError::NoCard => -2,
            InitError::InterfaceCondition => -3,
            InitError::VoltageMismatch => -4,
            InitError::Timeout => -5,
            InitError::UnsupportedAccessMode => -300,
            InitError::Command(n) => 0x100 + n as i32,
            InitError::AppCommand(n) => 0x200 + n as i32,
        }
    }
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitError::NoCard => write!(f, "no card"),
            InitError::InterfaceCondition => write!(f, "interface condition mismatch"),
            InitError::VoltageMismatch => write!(f, "voltage window not supported"),
            InitError::Timeout => write!(f, "card stayed busy"),
            InitError::UnsupportedAccessMode => write!(f, "unsupported access mode"),
            InitError::Command(n) => write!(f, "CMD{} failed", n),
            InitError::AppCommand(n) => write!(f, "ACMD{} failed", n),
        }
    }
}

/// Block transfer failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoError {
    /// The socket is empty
    NoCard,
    /// No card has been initialized on this slot
    NotInitialized,
    /// Zero sectors or more than one transfer can carry
    InvalidParameter,
    /// The buffer cannot hold the requested sectors
    BufferTooSmall,
    /// The request extends past the end of the card
    OutOfRange,
    /// The card's write protect switch is set
    WriteProtected,
    /// The operation is not implemented for this card
    Unsupported,
    /// The transfer command failed
    Command {
        /// Command index
        cmd: u8,
        error: HostError,
    },
    /// The host reported error bits during the data phase
    Transfer(IntStatus),
    /// The data phase did not progress within the deadline
    Timeout,
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoError::NoCard => write!(f, "no card"),
            IoError::NotInitialized => write!(f, "card not initialized"),
            IoError::InvalidParameter => write!(f, "invalid parameter"),
            IoError::BufferTooSmall => write!(f, "buffer too small"),
            IoError::OutOfRange => write!(f, "sector out of range"),
            IoError::WriteProtected => write!(f, "card is write protected"),
            IoError::Unsupported => write!(f, "unsupported"),
            IoError::Command { cmd, error } => write!(f, "CMD{}: {}", cmd, error),
            IoError::Transfer(status) => write!(f, "transfer error {:#010x}", status.bits()),
            IoError::Timeout => write!(f, "transfer timeout"),
        }
    }
}

/// Failure of an optional function switch (CMD6)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SwitchError {
    /// The card predates SD 1.10
    Unsupported,
    /// CMD6 failed
    Command(HostError),
    /// Reading the status block failed
    Data(HostError),
    /// The function draws more current than the slot provides
    CurrentLimit { required_ma: u16 },
    /// The function is busy
    Busy,
    /// The card selected another function
    NotSelected { selected: u8 },
}

impl fmt::Display for SwitchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwitchError::Unsupported => write!(f, "switch function not supported"),
            SwitchError::Command(e) => write!(f, "CMD6 {}", e),
            SwitchError::Data(e) => write!(f, "status read {}", e),
            SwitchError::CurrentLimit { required_ma } => {
                write!(f, "requires {} mA", required_ma)
            }
            SwitchError::Busy => write!(f, "function busy"),
            SwitchError::NotSelected { selected } => {
                write!(f, "card selected function {:#x}", selected)
            }
        }
    }
}
