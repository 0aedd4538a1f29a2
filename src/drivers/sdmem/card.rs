//! Card negotiation
//!
//! Drives a freshly inserted card from power-up to the transfer state: reset,
//! interface condition, SD/MMC discovery, voltage and capacity negotiation,
//! identification, selection, bus width and speed upgrades.

use super::error::SwitchError;
use super::registers::{CardStatus, Cid, Csd, Ocr, Scr, SwitchStatus};
use super::{Addressing, Card, CardKind, InitError, SdSlot};
use crate::drivers::sdhci::regs::*;
use crate::drivers::sdhci::{
    self, BusWidth, Command, DataPhase, Direction, HostError, IntStatus, PresentState, ResetLines,
    ResponseType, SdHost,
};
use crate::drivers::sdmem::clock;
use crate::platform::Platform;
use crate::time::Deadline;

/// Interface condition argument: 2.7-3.6 V, check pattern 0xAA
const IF_COND_ARG: u32 = 0x1AA;

/// Bits of the R7 response echoing the interface condition
const IF_COND_ECHO_MASK: u32 = 0xFFF;

/// Time allowed for the power-up routine (milliseconds)
const POWER_UP_TIMEOUT_MS: u64 = 1000;

/// Timeout for the data phase of register reads (milliseconds)
const DATA_TIMEOUT_MS: u64 = 1000;

/// Fixed relative address given to MMC cards
const MMC_RCA: u32 = 0x0001_0000;

/// ACMD6 argument selecting the 4-bit bus
const BUS_WIDTH_4_ARG: u32 = 0x2;

/// Function group 1 (access mode), function 1 (high speed)
const ACCESS_MODE_GROUP: u8 = 1;
const HIGH_SPEED_FUNCTION: u8 = 1;

/// CMD6 mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SwitchMode {
    /// Query without changing anything
    Check = 0,
    /// Commit the function
    Switch = 1,
}

impl<'a, H: SdHost + ?Sized, P: Platform + ?Sized> SdSlot<'a, H, P> {
    /// Negotiate with the card in the slot
    ///
    /// On success the card is selected, running at its fastest supported bus
    /// width and speed, and ready for [`SdSlot::read`]/[`SdSlot::write`]. On
    /// failure the slot is left without an initialized card.
    pub fn card_init(&mut self) -> Result<(), InitError> {
        self.card = None;

        if self.card_missing() {
            log::info!("SDMEM: {:?} no card", self.config.slot);
            return Err(InitError::NoCard);
        }

        let slot = self.slot();
        self.write_protected = self.config.write_protect
            && !self
                .host
                .present_state(slot)
                .contains(PresentState::WRITE_PROTECT_LEVEL);

        self.host.set_bus_width(slot, BusWidth::One);
        self.apply_divider(self.dividers.identification);
        // Card power-up: 74 clocks and at least 1 ms
        self.sleep(74, 1000);
        self.host.clear_int_status(slot, IntStatus::all());

        self.command(CMD_GO_IDLE_STATE, 0, ResponseType::None)
            .map_err(|_| InitError::Command(CMD_GO_IDLE_STATE))?;
        self.sleep(8, 0);

        let card = self.negotiate()?;

        log::info!(
            "SDMEM: {:?} card {:?} '{}' {} sectors, {:?} bus{}",
            self.config.slot,
            card.kind,
            card.cid.product_name(),
            card.sector_count,
            card.bus_width,
            if card.high_speed { ", high speed" } else { "" }
        );
        self.card = Some(card);
        Ok(())
    }

    fn negotiate(&mut self) -> Result<Card, InitError> {
        let slot = self.slot();

        // Interface condition: no answer means SD 1.x or MMC
        let if_cond = match self.command(CMD_SEND_IF_COND, IF_COND_ARG, ResponseType::R7) {
            Ok(response) => {
                if response[0] & IF_COND_ECHO_MASK != IF_COND_ARG {
                    log::warn!("SDMEM: CMD8 echo {:#x} does not match", response[0]);
                    return Err(InitError::InterfaceCondition);
                }
                true
            }
            Err(HostError::NoResponse) => {
                self.host.reset(slot, ResetLines::CMD);
                false
            }
            Err(_) => return Err(InitError::Command(CMD_SEND_IF_COND)),
        };

        // An SD card acknowledges CMD55 and answers ACMD41
        match self.command(CMD_APP_CMD, 0, ResponseType::R1) {
            Ok(response) if CardStatus::new(response[0]).app_cmd() => {}
            Ok(_) => return self.init_mmc(),
            Err(HostError::NoResponse) => {
                self.host.reset(slot, ResetLines::CMD);
                return self.init_mmc();
            }
            Err(_) => return Err(InitError::Command(CMD_APP_CMD)),
        }

        let ocr = match self.command(ACMD_SD_SEND_OP_COND, 0, ResponseType::R3) {
            Ok(response) => Ocr::new(response[0]),
            Err(HostError::NoResponse) => {
                self.host.reset(slot, ResetLines::CMD);
                return self.init_mmc();
            }
            Err(_) => return Err(InitError::AppCommand(ACMD_SD_SEND_OP_COND)),
        };

        self.init_sd(if_cond, ocr)
    }

    fn init_sd(&mut self, if_cond: bool, ocr: Ocr) -> Result<Card, InitError> {
        let slot = self.slot();
        let window = self.config.voltage_window;

        if !ocr.supports(window) {
            log::warn!("SDMEM: card OCR {:#010x} lacks window {:#010x}", ocr.raw(), window);
            return Err(InitError::VoltageMismatch);
        }

        let argument = if if_cond { window | Ocr::CCS } else { window };
        let deadline = Deadline::from_ms(self.platform, POWER_UP_TIMEOUT_MS);
        let ocr = loop {
            self.app_command_prefix(0)?;
            let ocr = self
                .command(ACMD_SD_SEND_OP_COND, argument, ResponseType::R3)
                .map(|response| Ocr::new(response[0]))
                .map_err(|_| InitError::AppCommand(ACMD_SD_SEND_OP_COND))?;
            if ocr.powered_up() {
                break ocr;
            }
            if deadline.is_expired(self.platform) {
                log::warn!("SDMEM: card still busy after {} ms", POWER_UP_TIMEOUT_MS);
                return Err(InitError::Timeout);
            }
            self.platform.relax();
        };

        let addressing = if if_cond && ocr.high_capacity() {
            Addressing::Sector
        } else {
            Addressing::Byte
        };

        let cid = self
            .command(CMD_ALL_SEND_CID, 0, ResponseType::R2)
            .map(Cid::from_response)
            .map_err(|_| InitError::Command(CMD_ALL_SEND_CID))?;

        let rca = self
            .command(CMD_RELATIVE_ADDR, 0, ResponseType::R6)
            .map(|response| response[0] & 0xFFFF_0000)
            .map_err(|_| InitError::Command(CMD_RELATIVE_ADDR))?;

        let csd = self
            .command(CMD_SEND_CSD, rca, ResponseType::R2)
            .map(Csd::from_response)
            .map_err(|_| InitError::Command(CMD_SEND_CSD))?;

        // Standby state: the card accepts the data transfer clock now
        self.sleep(8, 0);
        self.apply_divider(self.dividers.data_transfer);

        self.command(CMD_SELECT_CARD, rca, ResponseType::R1b)
            .map_err(|_| InitError::Command(CMD_SELECT_CARD))?;
        self.host.set_bus_width(slot, BusWidth::One);

        self.app_command_prefix(rca)?;
        let scr = self
            .read_scr()
            .map_err(|_| InitError::AppCommand(ACMD_SEND_SCR))?;
        log::debug!(
            "SDMEM: SCR {:#018x} (spec {}, 4-bit {})",
            scr.raw(),
            scr.sd_spec(),
            scr.supports_4bit()
        );

        let mut bus_width = BusWidth::One;
        if scr.supports_4bit() && self.config.bus_width == BusWidth::Four {
            self.app_command_prefix(rca)?;
            self.command(ACMD_SET_BUS_WIDTH, BUS_WIDTH_4_ARG, ResponseType::R1)
                .map_err(|_| InitError::AppCommand(ACMD_SET_BUS_WIDTH))?;
            self.host.set_bus_width(slot, BusWidth::Four);
            bus_width = BusWidth::Four;
        }

        let mut card = Card {
            kind: if if_cond { CardKind::SdV2 } else { CardKind::SdV1 },
            ocr,
            cid,
            csd,
            scr: Some(scr),
            rca,
            addressing,
            bus_width,
            high_speed: false,
            access_modes: 0,
            sector_count: csd.sector_count(),
        };

        if let Err(e) = self.try_high_speed(&mut card) {
            log::debug!("SDMEM: staying at default speed: {}", e);
        }

        Ok(card)
    }

    fn init_mmc(&mut self) -> Result<Card, InitError> {
        let slot = self.slot();
        let window = self.config.voltage_window;
        log::debug!("SDMEM: {:?} trying MMC", self.config.slot);

        let ocr = self
            .command(CMD_SEND_OP_COND, 0, ResponseType::R3)
            .map(|response| Ocr::new(response[0]))
            .map_err(|_| InitError::Command(CMD_SEND_OP_COND))?;
        if !ocr.supports(window) {
            log::warn!("SDMEM: MMC OCR {:#010x} lacks window {:#010x}", ocr.raw(), window);
            return Err(InitError::VoltageMismatch);
        }

        let deadline = Deadline::from_ms(self.platform, POWER_UP_TIMEOUT_MS);
        let ocr = loop {
            let ocr = self
                .command(CMD_SEND_OP_COND, window | Ocr::CCS, ResponseType::R3)
                .map(|response| Ocr::new(response[0]))
                .map_err(|_| InitError::Command(CMD_SEND_OP_COND))?;
            if ocr.powered_up() {
                break ocr;
            }
            if deadline.is_expired(self.platform) {
                log::warn!("SDMEM: MMC still busy after {} ms", POWER_UP_TIMEOUT_MS);
                return Err(InitError::Timeout);
            }
            self.platform.relax();
        };

        let addressing = match ocr.access_mode() {
            0 | 1 => Addressing::Byte,
            2 => Addressing::Sector,
            mode => {
                log::warn!("SDMEM: MMC access mode {} not supported", mode);
                return Err(InitError::UnsupportedAccessMode);
            }
        };

        let cid = self
            .command(CMD_ALL_SEND_CID, 0, ResponseType::R2)
            .map(Cid::from_response)
            .map_err(|_| InitError::Command(CMD_ALL_SEND_CID))?;

        self.command(CMD_RELATIVE_ADDR, MMC_RCA, ResponseType::R1)
            .map_err(|_| InitError::Command(CMD_RELATIVE_ADDR))?;

        let csd = self
            .command(CMD_SEND_CSD, MMC_RCA, ResponseType::R2)
            .map(Csd::from_response)
            .map_err(|_| InitError::Command(CMD_SEND_CSD))?;

        self.sleep(8, 0);
        self.apply_divider(self.dividers.mmc);

        self.command(CMD_SELECT_CARD, MMC_RCA, ResponseType::R1b)
            .map_err(|_| InitError::Command(CMD_SELECT_CARD))?;
        self.host.set_bus_width(slot, BusWidth::One);

        // MMC capacity needs EXT_CSD for large devices; left unknown
        Ok(Card {
            kind: CardKind::Mmc,
            ocr,
            cid,
            csd,
            scr: None,
            rca: MMC_RCA,
            addressing,
            bus_width: BusWidth::One,
            high_speed: false,
            access_modes: 0,
            sector_count: 0,
        })
    }

    /// CMD55 with the APP_CMD acknowledgement checked
    fn app_command_prefix(&self, rca: u32) -> Result<(), InitError> {
        match self.command(CMD_APP_CMD, rca, ResponseType::R1) {
            Ok(response) if CardStatus::new(response[0]).app_cmd() => Ok(()),
            Ok(response) => {
                log::warn!("SDMEM: CMD55 not acknowledged ({:#x})", response[0]);
                Err(InitError::Command(CMD_APP_CMD))
            }
            Err(_) => Err(InitError::Command(CMD_APP_CMD)),
        }
    }

    /// Data phase of a single-block register read through the data port
    fn read_data_words(&self, words: &mut [u32]) -> Result<(), HostError> {
        let slot = self.slot();
        sdhci::wait_for_status(
            self.host,
            slot,
            self.platform,
            IntStatus::BUFFER_READ_READY,
            DATA_TIMEOUT_MS,
        )?;
        self.host.clear_int_status(slot, IntStatus::BUFFER_READ_READY);
        for word in words.iter_mut() {
            *word = self.host.read_buffer(slot);
        }

        sdhci::wait_for_status(
            self.host,
            slot,
            self.platform,
            IntStatus::TRANSFER_COMPLETE,
            DATA_TIMEOUT_MS,
        )?;
        self.host.clear_int_status(slot, IntStatus::TRANSFER_COMPLETE);
        Ok(())
    }

    /// ACMD51: read the 8-byte SD configuration register
    fn read_scr(&self) -> Result<Scr, HostError> {
        let command = Command::new(ACMD_SEND_SCR, 0, ResponseType::R1).with_data(DataPhase {
            direction: Direction::Read,
            block_size: 8,
            block_count: 1,
            dma_address: None,
            auto_stop: false,
        });
        sdhci::send_command(self.host, self.slot(), self.platform, &command)?;
        let mut words = [0u32; 2];
        self.read_data_words(&mut words)?;
        Ok(Scr::from_words(words))
    }

    /// CMD6: query or switch one function group
    fn switch_function(
        &self,
        card: &Card,
        mode: SwitchMode,
        group: u8,
        function: u8,
    ) -> Result<SwitchStatus, SwitchError> {
        if card.scr.is_none_or(|scr| scr.sd_spec() < 1) {
            return Err(SwitchError::Unsupported);
        }

        // Every other group keeps its current function (0xF)
        let shift = 4 * u32::from(group - 1);
        let argument = (!(0xF << shift) & 0x00FF_FFFF)
            | ((mode as u32) << 31)
            | (u32::from(function & 0xF) << shift);

        let slot = self.slot();
        let command =
            Command::new(CMD_SWITCH_FUNC, argument, ResponseType::R1).with_data(DataPhase {
                direction: Direction::Read,
                block_size: SwitchStatus::SIZE as u16,
                block_count: 1,
                dma_address: None,
                auto_stop: false,
            });
        sdhci::send_command(self.host, slot, self.platform, &command)
            .map_err(SwitchError::Command)?;

        let mut words = [0u32; SwitchStatus::SIZE / 4];
        self.read_data_words(&mut words).map_err(SwitchError::Data)?;

        let mut stream = [0u8; SwitchStatus::SIZE];
        for (chunk, word) in stream.chunks_exact_mut(4).zip(words) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        Ok(SwitchStatus::parse(&stream))
    }

    /// Switch to high speed timing if the slot clock, the card and the
    /// slot's current budget allow it
    fn try_high_speed(&mut self, card: &mut Card) -> Result<(), SwitchError> {
        let high_speed_khz = clock::bus_khz(self.host_clock_khz, self.dividers.high_speed);
        if high_speed_khz < clock::HIGH_SPEED_TIMING_KHZ {
            log::debug!("SDMEM: high speed clock would be {} kHz", high_speed_khz);
            return Ok(());
        }

        let max_current_ma = self.config.max_current_ma;

        let status = self.switch_function(
            card,
            SwitchMode::Check,
            ACCESS_MODE_GROUP,
            HIGH_SPEED_FUNCTION,
        )?;
        status.check_current(max_current_ma)?;
        card.access_modes = status.supported(ACCESS_MODE_GROUP);
        status.check_function(ACCESS_MODE_GROUP, HIGH_SPEED_FUNCTION)?;

        let status = self.switch_function(
            card,
            SwitchMode::Switch,
            ACCESS_MODE_GROUP,
            HIGH_SPEED_FUNCTION,
        )?;
        status.check_current(max_current_ma)?;
        status.check_function(ACCESS_MODE_GROUP, HIGH_SPEED_FUNCTION)?;

        self.sleep(8, 0);
        self.apply_divider(self.dividers.high_speed);
        card.high_speed = true;
        Ok(())
    }
}
