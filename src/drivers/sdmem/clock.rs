//! SD clock divider selection

use bitflags::bitflags;

/// Largest divider the host's frequency select field can express
pub const MAX_DIVIDER: u16 = 256;

/// Card identification phase ceiling
pub const IDENTIFICATION_KHZ: u32 = 400;

/// Default speed data transfer ceiling
pub const DEFAULT_SPEED_KHZ: u32 = 25_000;

/// High speed data transfer ceiling
pub const HIGH_SPEED_KHZ: u32 = 50_000;

/// MMC data transfer ceiling
pub const MMC_KHZ: u32 = 20_000;

/// Bus clocks at or above this need high speed timing
pub const HIGH_SPEED_TIMING_KHZ: u32 = 25_000;

/// Sanity bounds for the host peripheral clock
pub const HOST_CLOCK_MIN_KHZ: u32 = 100;
pub const HOST_CLOCK_MAX_KHZ: u32 = 52_000;

/// The identification clock should not be slower than this
pub const IDENTIFICATION_MIN_KHZ: u32 = 100;

bitflags! {
    /// Configuration problems found while setting up a slot
    ///
    /// None of these stop the setup; they are logged and kept on the slot.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SetupWarnings: u8 {
        /// The host peripheral clock is gated
        const HOST_CLOCK_DISABLED = 1 << 0;
        /// The host peripheral clock exceeds 52 MHz
        const HOST_CLOCK_TOO_HIGH = 1 << 1;
        /// The host peripheral clock is below 100 kHz
        const HOST_CLOCK_TOO_LOW = 1 << 2;
        /// The identification clock is below 100 kHz
        const IDENT_CLOCK_TOO_LOW = 1 << 3;
        /// A divider hit the 256 limit and the bus runs above its ceiling
        const DIVIDER_CLAMPED = 1 << 4;
    }
}

/// Smallest power-of-two divider keeping the bus at or below both ceilings
///
/// The result is clamped to [`MAX_DIVIDER`]; [`exceeds_ceiling`] tells whether
/// the clamp left the bus too fast.
pub fn calc_divider(host_khz: u32, card_max_khz: u32, phase_max_khz: u32) -> u16 {
    let desired = card_max_khz.min(phase_max_khz).max(1);
    let preliminary = host_khz.div_ceil(desired).max(1);

    match preliminary.checked_next_power_of_two() {
        Some(divider) if divider <= u32::from(MAX_DIVIDER) => divider as u16,
        _ => MAX_DIVIDER,
    }
}

/// Bus clock produced by `divider`
pub fn bus_khz(host_khz: u32, divider: u16) -> u32 {
    host_khz / u32::from(divider.max(1))
}

/// Check whether `divider` leaves the bus above the ceilings
pub fn exceeds_ceiling(host_khz: u32, divider: u16, card_max_khz: u32, phase_max_khz: u32) -> bool {
    let ceiling = card_max_khz.min(phase_max_khz);
    u64::from(host_khz) > u64::from(ceiling) * u64::from(divider)
}

/// Dividers for each protocol phase of one slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockDividers {
    /// Card identification (400 kHz)
    pub identification: u16,
    /// Default speed data transfer (25 MHz)
    pub data_transfer: u16,
    /// High speed data transfer (50 MHz)
    pub high_speed: u16,
    /// MMC data transfer (20 MHz)
    pub mmc: u16,
}

impl ClockDividers {
    /// Derive all phase dividers for a slot limited to `max_khz`
    pub fn new(host_khz: u32, max_khz: u32) -> (Self, SetupWarnings) {
        let phases = [IDENTIFICATION_KHZ, DEFAULT_SPEED_KHZ, HIGH_SPEED_KHZ, MMC_KHZ];
        let [identification, data_transfer, high_speed, mmc] =
            phases.map(|phase| calc_divider(host_khz, max_khz, phase));

        let mut warnings = SetupWarnings::empty();
        let clamped = phases
            .iter()
            .zip([identification, data_transfer, high_speed, mmc])
            .any(|(&phase, divider)| exceeds_ceiling(host_khz, divider, max_khz, phase));
        if clamped {
            warnings |= SetupWarnings::DIVIDER_CLAMPED;
        }
        if bus_khz(host_khz, identification) < IDENTIFICATION_MIN_KHZ {
            warnings |= SetupWarnings::IDENT_CLOCK_TOO_LOW;
        }

        (
            Self {
                identification,
                data_transfer,
                high_speed,
                mmc,
            },
            warnings,
        )
    }
}
