//! Sector transfers
//!
//! Multi-block reads and writes with automatic CMD12. When the caller's buffer
//! has the byte order the host's DMA engine produces, the transfer runs through
//! SDMA and completes from interrupt context. Otherwise every word goes through
//! the buffer data port and is swapped on the way.

use super::{Addressing, IoError, SECTOR_SIZE, SdSlot};
use crate::drivers::sdhci::regs::{CMD_READ_MULTIPLE_BLOCK, CMD_WRITE_MULTIPLE_BLOCK};
use crate::drivers::sdhci::{
    self, Command, DataPhase, Direction, Endianness, HostError, IntStatus, ResetLines,
    ResponseType, SdHost,
};
use crate::platform::Platform;
use crate::time::Deadline;

/// Base timeout of a transfer (milliseconds)
const TRANSFER_TIMEOUT_MS: u64 = 1000;

/// Additional timeout per sector (milliseconds)
const SECTOR_TIMEOUT_MS: u64 = 100;

const SECTOR_BYTES: usize = SECTOR_SIZE as usize;

/// Validated transfer request
#[derive(Debug, Clone, Copy)]
struct Request {
    /// CMD18/CMD25 argument
    argument: u32,
    blocks: u16,
    /// Buffer bytes covered by the transfer
    len: usize,
}

impl Request {
    fn command(&self, index: u8, direction: Direction, dma_address: Option<usize>) -> Command {
        Command::new(index, self.argument, ResponseType::R1).with_data(DataPhase {
            direction,
            block_size: SECTOR_SIZE as u16,
            block_count: self.blocks,
            dma_address,
            auto_stop: true,
        })
    }

    fn timeout_ms(&self) -> u64 {
        TRANSFER_TIMEOUT_MS + SECTOR_TIMEOUT_MS * u64::from(self.blocks)
    }
}

fn word_to_bytes(word: u32, order: Endianness) -> [u8; 4] {
    match order {
        Endianness::Little => word.to_le_bytes(),
        Endianness::Big => word.to_be_bytes(),
    }
}

fn bytes_to_word(bytes: [u8; 4], order: Endianness) -> u32 {
    match order {
        Endianness::Little => u32::from_le_bytes(bytes),
        Endianness::Big => u32::from_be_bytes(bytes),
    }
}

impl<'a, H: SdHost + ?Sized, P: Platform + ?Sized> SdSlot<'a, H, P> {
    /// Read `count` sectors starting at `first_sector` into `buffer`
    ///
    /// `endianness` is the byte order in which each 32-bit word of the card's
    /// data stream lands in `buffer`; `Little` keeps the stream order.
    pub fn read(
        &mut self,
        buffer: &mut [u8],
        first_sector: u32,
        count: u32,
        endianness: Endianness,
    ) -> Result<(), IoError> {
        self.check_present()?;
        let request = self.validate(first_sector, count, buffer.len())?;
        let buffer = &mut buffer[..request.len];

        log::trace!(
            "SDMEM: read {} sectors at {} ({:?})",
            count,
            first_sector,
            endianness
        );

        if endianness == self.host.dma_byte_order() {
            let address = buffer.as_mut_ptr() as usize;
            let command = request.command(CMD_READ_MULTIPLE_BLOCK, Direction::Read, Some(address));
            self.platform.flush_dcache();
            self.dma_transfer(&command, &request)
        } else {
            let command = request.command(CMD_READ_MULTIPLE_BLOCK, Direction::Read, None);
            self.polled_read(&command, buffer, endianness)
        }
    }

    /// Write `count` sectors from `buffer` starting at `first_sector`
    ///
    /// `endianness` has the meaning of [`SdSlot::read`].
    pub fn write(
        &mut self,
        buffer: &[u8],
        first_sector: u32,
        count: u32,
        endianness: Endianness,
    ) -> Result<(), IoError> {
        self.check_present()?;
        if self.card.is_none() {
            return Err(IoError::NotInitialized);
        }
        if self.write_protected {
            return Err(IoError::WriteProtected);
        }
        let request = self.validate(first_sector, count, buffer.len())?;
        let buffer = &buffer[..request.len];

        log::trace!(
            "SDMEM: write {} sectors at {} ({:?})",
            count,
            first_sector,
            endianness
        );

        if endianness == self.host.dma_byte_order() {
            let address = buffer.as_ptr() as usize;
            let command =
                request.command(CMD_WRITE_MULTIPLE_BLOCK, Direction::Write, Some(address));
            self.dma_transfer(&command, &request)
        } else {
            let command = request.command(CMD_WRITE_MULTIPLE_BLOCK, Direction::Write, None);
            self.polled_write(&command, buffer, endianness)
        }
    }

    /// Flush written data to the card
    ///
    /// Writes complete before [`SdSlot::write`] returns, so there is nothing
    /// to flush. Success does not imply the data is durable across power loss.
    pub fn sync(&mut self) -> Result<(), IoError> {
        self.check_present()?;
        if self.card.is_none() {
            return Err(IoError::NotInitialized);
        }
        Ok(())
    }

    /// Erase sectors `first..=last`
    ///
    /// The range is validated, but erasing is not implemented.
    pub fn erase_sectors(&mut self, first: u32, last: u32) -> Result<(), IoError> {
        self.check_present()?;
        let Some(card) = self.card.as_ref() else {
            return Err(IoError::NotInitialized);
        };
        if first > last {
            return Err(IoError::InvalidParameter);
        }
        if card.sector_count > 0 && last >= card.sector_count {
            return Err(IoError::OutOfRange);
        }
        log::debug!("SDMEM: erase {}..={} not supported", first, last);
        Err(IoError::Unsupported)
    }

    /// Erase granularity in bytes
    pub fn erase_block_size(&self) -> u32 {
        SECTOR_SIZE
    }

    /// Forget the card once the socket is empty
    fn check_present(&mut self) -> Result<(), IoError> {
        if !self.no_card() {
            return Ok(());
        }
        if self.card.take().is_some() {
            log::warn!("SDMEM: card removed from {:?}", self.config.slot);
        }
        Err(IoError::NoCard)
    }

    /// Check a request before anything is sent to the card
    fn validate(
        &self,
        first_sector: u32,
        count: u32,
        buffer_len: usize,
    ) -> Result<Request, IoError> {
        let card = self.card.as_ref().ok_or(IoError::NotInitialized)?;

        let blocks = u16::try_from(count).map_err(|_| IoError::InvalidParameter)?;
        if blocks == 0 {
            return Err(IoError::InvalidParameter);
        }

        let len = usize::from(blocks) * SECTOR_BYTES;
        if buffer_len < len {
            return Err(IoError::BufferTooSmall);
        }

        if card.sector_count > 0
            && u64::from(first_sector) + u64::from(count) > u64::from(card.sector_count)
        {
            return Err(IoError::OutOfRange);
        }

        let argument = match card.addressing {
            Addressing::Sector => first_sector,
            Addressing::Byte => first_sector
                .checked_mul(SECTOR_SIZE)
                .ok_or(IoError::OutOfRange)?,
        };

        Ok(Request {
            argument,
            blocks,
            len,
        })
    }

    /// Abort a failed transfer
    fn recover(&self, command: &Command, error: IoError) -> IoError {
        let slot = self.slot();
        self.host.clear_int_status(slot, IntStatus::ERRORS);
        self.host.reset(slot, ResetLines::CMD | ResetLines::DAT);
        log::warn!("SDMEM: CMD{} failed: {}", command.index, error);
        error
    }

    // ========================================================================
    // DMA
    // ========================================================================

    /// Run a transfer through SDMA and wait for the interrupt handler
    fn dma_transfer(&self, command: &Command, request: &Request) -> Result<(), IoError> {
        let host_id = self.config.slot.host();
        let slot = self.slot();

        sdhci::wait_inhibit(self.host, slot, self.platform, true).map_err(|_| IoError::Timeout)?;

        self.platform.disable_line(host_id);
        self.signal.clear();
        self.host.clear_int_status(
            slot,
            IntStatus::CMD_COMPLETE
                | IntStatus::TRANSFER_COMPLETE
                | IntStatus::DMA
                | IntStatus::ERRORS,
        );
        self.platform.clear_line(host_id);
        self.platform.enable_line(host_id);

        self.host.issue(slot, command);

        let deadline = Deadline::from_ms(self.platform, request.timeout_ms());
        let outcome = loop {
            if self.signal.is_set() {
                break Ok(());
            }
            let status = self.host.int_status(slot);
            if status.intersects(IntStatus::ERRORS) {
                break Err(IoError::Transfer(status & IntStatus::ERRORS));
            }
            // Left set when the handler could not reach the routing table
            if status.contains(IntStatus::TRANSFER_COMPLETE) {
                self.host.clear_int_status(slot, IntStatus::TRANSFER_COMPLETE);
                break Ok(());
            }
            if deadline.is_expired(self.platform) {
                break Err(IoError::Timeout);
            }
            self.platform.relax();
        };

        self.platform.disable_line(host_id);
        outcome.map_err(|error| self.recover(command, error))
    }

    // ========================================================================
    // Polled
    // ========================================================================

    /// Issue the transfer command of a polled transfer
    fn start_polled(&self, command: &Command) -> Result<(), IoError> {
        sdhci::send_command(self.host, self.slot(), self.platform, command)
            .map(|_| ())
            .map_err(|error| {
                self.recover(
                    command,
                    IoError::Command {
                        cmd: command.index,
                        error,
                    },
                )
            })
    }

    /// Wait for `bits` during the data phase and acknowledge them
    fn wait_data(
        &self,
        command: &Command,
        bits: IntStatus,
        timeout_ms: u64,
    ) -> Result<(), IoError> {
        let slot = self.slot();
        match sdhci::wait_for_status(self.host, slot, self.platform, bits, timeout_ms) {
            Ok(_) => {
                self.host.clear_int_status(slot, bits);
                Ok(())
            }
            Err(HostError::Status(status)) => Err(self.recover(command, IoError::Transfer(status))),
            Err(HostError::NoResponse | HostError::Timeout) => {
                Err(self.recover(command, IoError::Timeout))
            }
        }
    }

    fn polled_read(
        &self,
        command: &Command,
        buffer: &mut [u8],
        order: Endianness,
    ) -> Result<(), IoError> {
        let slot = self.slot();
        self.start_polled(command)?;

        for block in buffer.chunks_exact_mut(SECTOR_BYTES) {
            self.wait_data(command, IntStatus::BUFFER_READ_READY, TRANSFER_TIMEOUT_MS)?;
            for bytes in block.chunks_exact_mut(4) {
                bytes.copy_from_slice(&word_to_bytes(self.host.read_buffer(slot), order));
            }
        }

        self.wait_data(command, IntStatus::TRANSFER_COMPLETE, TRANSFER_TIMEOUT_MS)
    }

    fn polled_write(
        &self,
        command: &Command,
        buffer: &[u8],
        order: Endianness,
    ) -> Result<(), IoError> {
        let slot = self.slot();
        self.start_polled(command)?;

        for block in buffer.chunks_exact(SECTOR_BYTES) {
            self.wait_data(command, IntStatus::BUFFER_WRITE_READY, TRANSFER_TIMEOUT_MS)?;
            for bytes in block.chunks_exact(4) {
                let word = bytes_to_word([bytes[0], bytes[1], bytes[2], bytes[3]], order);
                self.host.write_buffer(slot, word);
            }
        }

        self.wait_data(command, IntStatus::TRANSFER_COMPLETE, TRANSFER_TIMEOUT_MS)
    }
}
