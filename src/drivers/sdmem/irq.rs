//! Interrupt routing for block transfers
//!
//! Each host peripheral raises one interrupt line shared by its slots. The
//! integrator's handler calls [`InterruptRouter::dispatch`], which snapshots the
//! status of every slot once, acknowledges what it consumed and signals the
//! [`TransferSignal`] of the slot whose transfer finished.

use crate::drivers::sdhci::{HostId, IntStatus, SdHost, SlotIndex};
use crate::platform::InterruptController;
use core::sync::atomic::{AtomicBool, Ordering};
use spin::Mutex;

/// Completion flag of one slot
///
/// Written by the interrupt handler, read by the foreground transfer.
#[derive(Debug)]
pub struct TransferSignal {
    finished: AtomicBool,
}

impl TransferSignal {
    pub const fn new() -> Self {
        Self {
            finished: AtomicBool::new(false),
        }
    }

    /// Mark the transfer finished (interrupt context)
    pub fn set(&self) {
        self.finished.store(true, Ordering::Release);
    }

    /// Forget a previous completion before arming a new transfer
    pub fn clear(&self) {
        self.finished.store(false, Ordering::Relaxed);
    }

    pub fn is_set(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}

impl Default for TransferSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Table from (host, slot) to the completion flag of the slot set up there
pub struct InterruptRouter<'a> {
    slots: Mutex<[[Option<&'a TransferSignal>; 2]; 2]>,
}

impl<'a> InterruptRouter<'a> {
    pub const fn new() -> Self {
        Self {
            slots: Mutex::new([[None; 2]; 2]),
        }
    }

    /// Register the completion flag of a slot
    ///
    /// Returns true if this is the first slot of the host, i.e. the host's
    /// handler still has to be installed. Other slots of the host keep their
    /// entries. Call only while the host's line is disabled.
    pub fn attach(&self, host: HostId, slot: SlotIndex, signal: &'a TransferSignal) -> bool {
        let mut slots = self.slots.lock();
        let entries = &mut slots[host.index()];
        let first = entries.iter().all(Option::is_none);
        entries[slot.index()] = Some(signal);
        first
    }

    /// Check whether a slot has a completion flag registered
    pub fn is_attached(&self, host: HostId, slot: SlotIndex) -> bool {
        self.slots.lock()[host.index()][slot.index()].is_some()
    }

    /// Service the interrupt of `host`
    pub fn dispatch<H, C>(&self, host_id: HostId, host: &H, irq: &C)
    where
        H: SdHost + ?Sized,
        C: InterruptController + ?Sized,
    {
        let mut snapshot = [IntStatus::empty(); 2];
        for &slot in host_id.slots() {
            snapshot[slot.index()] = host.int_status(slot);
        }

        for &slot in host_id.slots() {
            if snapshot[slot.index()].contains(IntStatus::CMD_COMPLETE) {
                host.clear_int_status(slot, IntStatus::CMD_COMPLETE);
            }
        }

        // The foreground may hold the table; leave TRANSFER_COMPLETE pending
        // for its status poll instead of spinning here
        let slots = self.slots.try_lock();
        let mut serviced = false;
        for &slot in host_id.slots() {
            let status = snapshot[slot.index()];
            if status.is_empty() {
                continue;
            }
            serviced = true;

            if status.contains(IntStatus::TRANSFER_COMPLETE) {
                match slots.as_ref().map(|table| table[host_id.index()][slot.index()]) {
                    Some(Some(signal)) => {
                        host.clear_int_status(slot, IntStatus::TRANSFER_COMPLETE);
                        signal.set();
                    }
                    Some(None) => {
                        host.clear_int_status(slot, IntStatus::TRANSFER_COMPLETE);
                        log::warn!(
                            "SDMEM: {:?} {:?} transfer complete without owner",
                            host_id,
                            slot
                        );
                    }
                    None => log::debug!("SDMEM: routing table busy, completion left pending"),
                }
            }

            if status.contains(IntStatus::DMA) {
                // Rewriting the address resumes SDMA past the buffer boundary
                host.clear_int_status(slot, IntStatus::DMA);
                host.set_dma_address(slot, host.dma_address(slot));
            }
        }

        if !serviced {
            log::warn!("SDMEM: spurious interrupt on {:?}", host_id);
        }

        irq.clear_line(host_id);
    }
}

impl Default for InterruptRouter<'_> {
    fn default() -> Self {
        Self::new()
    }
}
