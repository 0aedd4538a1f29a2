//! Board services required by the driver
//!
//! The card driver does not know how the SoC gates clocks, multiplexes pins or
//! routes interrupts. The board integration layer implements these traits and
//! hands a [`Platform`] to every slot.

use crate::drivers::sdhci::HostId;
use crate::time::Timebase;

/// Range of GPIO pins switched to one alternate function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinRange {
    /// First pin number
    pub first: u32,
    /// Last pin number (inclusive)
    pub last: u32,
    /// Alternate function mode
    pub mode: u32,
}

impl PinRange {
    pub const fn new(first: u32, last: u32, mode: u32) -> Self {
        Self { first, last, mode }
    }
}

/// Peripheral clock tree
pub trait ClockTree {
    /// Check whether the host peripheral's clock is running
    fn host_clock_enabled(&self, host: HostId) -> bool;

    /// Peripheral clock feeding the host's SD clock divider, in kHz
    fn host_clock_khz(&self, host: HostId) -> u32;
}

/// GPIO pin multiplexer
pub trait PinMux {
    fn configure_pins(&self, pins: &PinRange);
}

/// Interrupt controller line of each host peripheral
pub trait InterruptController {
    /// Route the host's line to the integrator's handler
    ///
    /// The handler must call [`InterruptRouter::dispatch`] for this host.
    ///
    /// [`InterruptRouter::dispatch`]: crate::drivers::sdmem::InterruptRouter::dispatch
    fn install_handler(&self, host: HostId);

    fn enable_line(&self, host: HostId);

    fn disable_line(&self, host: HostId);

    /// Drop a pending request on the line
    fn clear_line(&self, host: HostId);
}

/// Everything a slot needs from the board
pub trait Platform: ClockTree + PinMux + InterruptController + Timebase {
    /// Make CPU caches coherent with memory before the DMA engine writes to it
    fn flush_dcache(&self) {}
}
