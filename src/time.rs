//! Timekeeping for busy-wait loops
//!
//! The driver never sleeps through a scheduler; every wait is a polling loop
//! bounded by a [`Deadline`] computed from the integrator's [`Timebase`].

/// Monotonic time source provided by the board
pub trait Timebase {
    /// Microseconds since an arbitrary fixed point. Must never go backwards.
    fn now_us(&self) -> u64;

    /// Called on every iteration of a busy-wait loop
    ///
    /// The default just hints the CPU. Boards may wait for an event here.
    fn relax(&self) {
        core::hint::spin_loop();
    }
}

/// A point in time after which a polling loop gives up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    expires_at_us: u64,
}

impl Deadline {
    /// Deadline `us` microseconds from now
    pub fn from_us<T: Timebase + ?Sized>(timebase: &T, us: u64) -> Self {
        Self {
            expires_at_us: timebase.now_us().saturating_add(us),
        }
    }

    /// Deadline `ms` milliseconds from now
    pub fn from_ms<T: Timebase + ?Sized>(timebase: &T, ms: u64) -> Self {
        Self::from_us(timebase, ms.saturating_mul(1000))
    }

    /// Check whether the deadline has passed
    pub fn is_expired<T: Timebase + ?Sized>(&self, timebase: &T) -> bool {
        timebase.now_us() >= self.expires_at_us
    }

    /// Microseconds left before expiry (0 once expired)
    pub fn remaining_us<T: Timebase + ?Sized>(&self, timebase: &T) -> u64 {
        self.expires_at_us.saturating_sub(timebase.now_us())
    }
}

/// Busy-wait for at least `us` microseconds
pub fn delay_us<T: Timebase + ?Sized>(timebase: &T, us: u64) {
    let deadline = Deadline::from_us(timebase, us);
    while !deadline.is_expired(timebase) {
        timebase.relax();
    }
}
