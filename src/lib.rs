//! sdmem - SD/MMC memory card driver for bare-metal targets
//!
//! This library brings a removable SD or MMC card from power-up to the
//! data-transfer state and then moves 512-byte sectors to and from it. It runs
//! without an operating system and without a heap: every piece of state lives
//! in values owned by the board integration layer.
//!
//! The crate is split into the host layer (`drivers::sdhci`), which talks to
//! the SDIO host peripheral registers, and the card layer (`drivers::sdmem`),
//! which implements card negotiation, block I/O and interrupt routing on top of
//! it. Board services (clocks, pins, interrupt controller, timebase) are
//! provided by the integrator through the traits in [`platform`] and [`time`].

#![cfg_attr(not(test), no_std)]

pub mod drivers;
pub mod logger;
pub mod platform;
pub mod time;

pub use drivers::sdhci::{Endianness, MmioHost, SdHost};
pub use drivers::sdmem::{
    BusWidth, Card, CardKind, InitError, InterruptRouter, IoError, PinRange, SdSlot, SetupWarnings,
    SlotConfig, SlotId, TransferSignal,
};
pub use platform::Platform;
pub use time::{Deadline, Timebase};
