//! Memory-mapped SDIO host
//!
//! [`MmioHost`] drives the register blocks of a two-slot SDIO host peripheral
//! directly. Slot 2 registers sit [`SLOT_STRIDE`] bytes above slot 1.

use super::regs::*;
use super::{
    BusWidth, Command, Direction, IntStatus, PresentState, ResetLines, ResponseType, SdHost,
    SlotIndex,
};
use tock_registers::interfaces::{ReadWriteable, Readable, Writeable};

/// Polls before giving up on a self-clearing bit
const POLL_LIMIT: usize = 100_000;

/// Data timeout counter value (TMCLK * 2^27)
const DATA_TIMEOUT_COUNTER: u32 = 0xE;

/// Status bits reported in the status register (everything but card interrupt)
const STATUS_ENABLE: IntStatus = IntStatus::all().difference(IntStatus::CARD_INTERRUPT);

/// SDIO host peripheral at a fixed MMIO address
pub struct MmioHost {
    base: usize,
}

impl MmioHost {
    /// Create a host for the peripheral mapped at `base`
    ///
    /// # Safety
    ///
    /// `base` must be the address of the peripheral's register window (two
    /// slot blocks), mapped uncached for the lifetime of the returned value, and
    /// no other code may program the same registers concurrently.
    pub const unsafe fn new(base: usize) -> Self {
        Self { base }
    }

    fn regs(&self, slot: SlotIndex) -> &SlotRegisters {
        // Safety: the constructor contract guarantees the window is mapped
        unsafe { &*((self.base + slot.index() * SLOT_STRIDE) as *const SlotRegisters) }
    }

    /// Poll until `done` holds, returning false if it never does
    fn poll(&self, mut done: impl FnMut() -> bool) -> bool {
        for _ in 0..POLL_LIMIT {
            if done() {
                return true;
            }
            core::hint::spin_loop();
        }
        false
    }
}

impl SdHost for MmioHost {
    fn reset(&self, slot: SlotIndex, lines: ResetLines) {
        let regs = self.regs(slot);

        let mut request = CLOCK_CONTROL::RESET_ALL::CLEAR;
        if lines.contains(ResetLines::ALL) {
            request += CLOCK_CONTROL::RESET_ALL::SET;
        }
        if lines.contains(ResetLines::CMD) {
            request += CLOCK_CONTROL::RESET_CMD::SET;
        }
        if lines.contains(ResetLines::DAT) {
            request += CLOCK_CONTROL::RESET_DAT::SET;
        }
        regs.clock_control.modify(request);

        let cleared = self.poll(|| {
            !regs.clock_control.is_set(CLOCK_CONTROL::RESET_ALL)
                && !regs.clock_control.is_set(CLOCK_CONTROL::RESET_CMD)
                && !regs.clock_control.is_set(CLOCK_CONTROL::RESET_DAT)
        });
        if !cleared {
            log::warn!("SDHCI: {:?} reset {:?} did not complete", slot, lines);
        }
    }

    fn init(&self, slot: SlotIndex) {
        let regs = self.regs(slot);

        regs.host_control.write(
            HOST_CONTROL::BUS_VOLTAGE::V3_3
                + HOST_CONTROL::BUS_POWER::SET
                + HOST_CONTROL::DMA_SELECT::Sdma
                + HOST_CONTROL::DATA_WIDTH_4BIT::CLEAR
                + HOST_CONTROL::HIGH_SPEED::CLEAR,
        );

        regs.clock_control.write(
            CLOCK_CONTROL::INTERNAL_CLOCK_ENABLE::SET
                + CLOCK_CONTROL::DATA_TIMEOUT.val(DATA_TIMEOUT_COUNTER),
        );
        if !self.poll(|| regs.clock_control.is_set(CLOCK_CONTROL::INTERNAL_CLOCK_STABLE)) {
            log::warn!("SDHCI: {:?} internal clock not stable", slot);
        }

        regs.int_enable.set(STATUS_ENABLE.bits());
        regs.signal_enable.set(0);
        regs.int_status.set(IntStatus::all().bits());
    }

    fn set_divider(&self, slot: SlotIndex, divider: u16) {
        let regs = self.regs(slot);

        // The frequency select field holds half the divider; 0 selects the base clock
        let select = u32::from(divider / 2).min(0x80);

        regs.clock_control.modify(CLOCK_CONTROL::SD_CLOCK_ENABLE::CLEAR);
        regs.clock_control.modify(
            CLOCK_CONTROL::FREQ_SELECT.val(select) + CLOCK_CONTROL::INTERNAL_CLOCK_ENABLE::SET,
        );

        if !self.poll(|| regs.clock_control.is_set(CLOCK_CONTROL::INTERNAL_CLOCK_STABLE)) {
            log::warn!("SDHCI: {:?} clock not stable after divider change", slot);
        }

        regs.clock_control.modify(CLOCK_CONTROL::SD_CLOCK_ENABLE::SET);
        log::trace!("SDHCI: {:?} divider {} (select {:#x})", slot, divider, select);
    }

    fn set_high_speed(&self, slot: SlotIndex, enable: bool) {
        let field = if enable {
            HOST_CONTROL::HIGH_SPEED::SET
        } else {
            HOST_CONTROL::HIGH_SPEED::CLEAR
        };
        self.regs(slot).host_control.modify(field);
    }

    fn set_bus_width(&self, slot: SlotIndex, width: BusWidth) {
        let field = match width {
            BusWidth::One => HOST_CONTROL::DATA_WIDTH_4BIT::CLEAR,
            BusWidth::Four => HOST_CONTROL::DATA_WIDTH_4BIT::SET,
        };
        self.regs(slot).host_control.modify(field);
    }

    fn present_state(&self, slot: SlotIndex) -> PresentState {
        PresentState::from_bits_retain(self.regs(slot).present_state.get())
    }

    fn int_status(&self, slot: SlotIndex) -> IntStatus {
        IntStatus::from_bits_retain(self.regs(slot).int_status.get())
    }

    fn clear_int_status(&self, slot: SlotIndex, bits: IntStatus) {
        self.regs(slot).int_status.set(bits.bits());
    }

    fn set_signal_enable(&self, slot: SlotIndex, bits: IntStatus) {
        self.regs(slot).signal_enable.set(bits.bits());
    }

    fn issue(&self, slot: SlotIndex, command: &Command) {
        let regs = self.regs(slot);

        let mut frame = COMMAND::INDEX.val(u32::from(command.index))
            + COMMAND::TYPE::Normal
            + match command.response {
                ResponseType::None => COMMAND::RESPONSE::None,
                ResponseType::R2 => COMMAND::RESPONSE::Long136,
                ResponseType::R1b => COMMAND::RESPONSE::Short48Busy,
                ResponseType::R1 | ResponseType::R3 | ResponseType::R6 | ResponseType::R7 => {
                    COMMAND::RESPONSE::Short48
                }
            };
        if command.response.crc_checked() {
            frame += COMMAND::CRC_CHECK::SET;
        }
        if command.response.index_checked() {
            frame += COMMAND::INDEX_CHECK::SET;
        }

        if let Some(data) = command.data {
            if let Some(address) = data.dma_address {
                // The SDMA address register is 32 bits wide
                regs.sdma_address.set(address as u32);
                frame += COMMAND::DMA_ENABLE::SET;
            }

            regs.block.write(
                BLOCK::SIZE.val(u32::from(data.block_size))
                    + BLOCK::SDMA_BOUNDARY::Boundary512K
                    + BLOCK::COUNT.val(u32::from(data.block_count)),
            );

            frame += COMMAND::DATA_PRESENT::SET + COMMAND::BLOCK_COUNT_ENABLE::SET;
            if data.direction == Direction::Read {
                frame += COMMAND::READ::SET;
            }
            if data.block_count > 1 || data.auto_stop {
                frame += COMMAND::MULTI_BLOCK::SET;
            }
            if data.auto_stop {
                frame += COMMAND::AUTO_CMD12::SET;
            }
        }

        regs.argument.set(command.argument);
        regs.command.write(frame);
    }

    fn response(&self, slot: SlotIndex) -> [u32; 4] {
        let regs = self.regs(slot);
        [
            regs.response[0].get(),
            regs.response[1].get(),
            regs.response[2].get(),
            regs.response[3].get(),
        ]
    }

    fn read_buffer(&self, slot: SlotIndex) -> u32 {
        self.regs(slot).buffer.get()
    }

    fn write_buffer(&self, slot: SlotIndex, word: u32) {
        self.regs(slot).buffer.set(word);
    }

    fn dma_address(&self, slot: SlotIndex) -> usize {
        self.regs(slot).sdma_address.get() as usize
    }

    fn set_dma_address(&self, slot: SlotIndex, address: usize) {
        self.regs(slot).sdma_address.set(address as u32);
    }
}
