//! Simulated host, card and board for unit tests
//!
//! `SimHost` answers the `SdHost` register interface from a scripted card model
//! and doubles as the board (`Platform`). Time advances on every clock read and
//! every issued command, so busy-waits terminate. While the host's interrupt
//! line is enabled, `relax()` plays the interrupt controller and calls the
//! router.

use super::{InterruptRouter, SdSlot, SlotConfig, TransferSignal};
use crate::drivers::sdhci::regs::*;
use crate::drivers::sdhci::{
    BusWidth, Command, HostId, IntStatus, PresentState, ResetLines, SdHost, SlotIndex,
};
use crate::platform::{ClockTree, InterruptController, PinMux, PinRange, Platform};
use crate::time::Timebase;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};

pub(crate) type SimSlot = SdSlot<'static, SimHost, SimHost>;

const SECTOR: usize = 512;
const SECTOR_WORDS: usize = SECTOR / 4;

/// Time one command takes on the bus (microseconds)
const COMMAND_US: u64 = 100;

// ============================================================================
// Card Model
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    SdV1,
    SdV2,
    Mmc,
    Silent,
}

/// Behaviour of the simulated card
#[derive(Debug, Clone)]
pub(crate) struct CardModel {
    family: Family,
    /// OCR voltage bits
    window: u32,
    /// Power-up polls until the busy bit clears, `None` for never
    ready_after: Option<u32>,
    high_capacity: bool,
    access_mode: u32,
    bad_echo: bool,
    /// Current reported by CMD6 (mA)
    switch_current_ma: u16,
    /// CMD6 reports high speed busy
    switch_busy: bool,
    cid: u128,
    csd: u128,
    scr: u64,
    /// Capacity in sectors
    pub sectors: u64,
}

/// CID of every simulated card: manufacturer 0x1B, "SM", "SDSIM"
fn sim_cid() -> u128 {
    (0x1Bu128 << 120)
        | (u128::from(u16::from_be_bytes(*b"SM")) << 104)
        | (u128::from(u64::from_be_bytes(*b"\0\0\0SDSIM")) << 64)
        | (0x10u128 << 56)
        | (0x0BAD_F00Du128 << 24)
        | (0x172u128 << 8)
        | 0x01
}

impl CardModel {
    /// SDHC card: physical layer 2.00, high capacity, 4-bit, high speed
    pub fn sdhc() -> Self {
        let c_size = 7_579u128;
        Self {
            family: Family::SdV2,
            window: 0x00FF_8000,
            ready_after: Some(3),
            high_capacity: true,
            access_mode: 0,
            bad_echo: false,
            switch_current_ma: 200,
            switch_busy: false,
            cid: sim_cid(),
            csd: (1 << 126) | (0x32 << 96) | (c_size << 48) | 0x01,
            scr: 0x0235_8000_0000_0000,
            sectors: ((c_size as u64) + 1) << 10,
        }
    }

    /// Standard capacity SD 1.0 card, no CMD8, no CMD6
    pub fn sd_v1() -> Self {
        // 4000 << (9 + 7 + 2 - 9) sectors
        let csd = (0x32u128 << 96) | (9u128 << 80) | (3_999u128 << 62) | (7u128 << 47) | 0x01;
        Self {
            family: Family::SdV1,
            high_capacity: false,
            csd,
            scr: 0x0005_0000_0000_0000,
            sectors: 4_000 << 9,
            ..Self::sdhc()
        }
    }

    /// MMC card in sector access mode
    pub fn mmc() -> Self {
        Self {
            family: Family::Mmc,
            high_capacity: false,
            access_mode: 2,
            csd: (2u128 << 126) | (0x32 << 96) | 0x01,
            sectors: 0x10_0000,
            ..Self::sdhc()
        }
    }

    /// Nothing answers except the reset
    pub fn silent() -> Self {
        Self {
            family: Family::Silent,
            ..Self::sdhc()
        }
    }

    /// The power-up busy bit never clears
    pub fn never_ready(self) -> Self {
        Self {
            ready_after: None,
            ..self
        }
    }

    pub fn switch_current(self, ma: u16) -> Self {
        Self {
            switch_current_ma: ma,
            ..self
        }
    }

    pub fn switch_busy(self) -> Self {
        Self {
            switch_busy: true,
            ..self
        }
    }

    pub fn access_mode(self, mode: u32) -> Self {
        Self {
            access_mode: mode,
            ..self
        }
    }

    /// CMD8 answers with a corrupted check pattern
    pub fn bad_echo(self) -> Self {
        Self {
            bad_echo: true,
            ..self
        }
    }

    pub fn ocr_window(self, window: u32) -> Self {
        Self { window, ..self }
    }

    fn is_sd(&self) -> bool {
        matches!(self.family, Family::SdV1 | Family::SdV2)
    }

    /// 64-byte CMD6 status block
    fn switch_status(&self) -> [u8; 64] {
        let mut block = [0u8; 64];
        block[0..2].copy_from_slice(&self.switch_current_ma.to_be_bytes());
        block[12..14].copy_from_slice(&0x8003u16.to_be_bytes());
        block[16] = 0x01;
        block[17] = 1;
        if self.switch_busy {
            block[28..30].copy_from_slice(&0x0002u16.to_be_bytes());
        }
        block
    }
}

/// Card state that changes with commands
#[derive(Debug, Default)]
struct CardState {
    /// The previous command was CMD55
    app: bool,
    polls: u32,
    high_speed: bool,
}

// ============================================================================
// Simulated Host
// ============================================================================

/// One command seen on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Issued {
    pub slot: SlotIndex,
    pub index: u8,
    pub argument: u32,
    /// Sent as an application command (after CMD55)
    pub app: bool,
    pub dma: bool,
    pub at_us: u64,
}

#[derive(Debug, Clone, Copy)]
enum Transfer {
    /// Words left in the read buffer, words per block
    Read { block_words: usize },
    /// Sectors being written
    Write { first: u32, blocks: usize },
}

struct SlotState {
    int_status: IntStatus,
    signal_enable: IntStatus,
    response: [u32; 4],
    divider: u16,
    bus_width: BusWidth,
    high_speed: bool,
    dma_address: usize,
    words: VecDeque<u32>,
    moved: usize,
    transfer: Option<Transfer>,
    /// Raised once the command phase has been acknowledged
    deferred_error: IntStatus,
}

impl SlotState {
    fn new() -> Self {
        Self {
            int_status: IntStatus::empty(),
            signal_enable: IntStatus::empty(),
            response: [0; 4],
            divider: 0,
            bus_width: BusWidth::One,
            high_speed: false,
            dma_address: 0,
            words: VecDeque::new(),
            moved: 0,
            transfer: None,
            deferred_error: IntStatus::empty(),
        }
    }

    fn abort_data(&mut self) {
        self.words.clear();
        self.moved = 0;
        self.transfer = None;
        self.deferred_error = IntStatus::empty();
    }
}

pub(crate) struct SimHost {
    model: CardModel,
    host_id: HostId,
    card_slot: SlotIndex,
    now: Cell<u64>,
    slots: RefCell<[SlotState; 2]>,
    card: RefCell<CardState>,
    storage: RefCell<HashMap<u32, [u8; SECTOR]>>,
    issued: RefCell<Vec<Issued>>,
    inserted: Cell<bool>,
    write_protect: Cell<bool>,
    fail_next: Cell<Option<IntStatus>>,
    cmd_resets: Cell<usize>,
    data_resets: Cell<usize>,
    // Board
    clock_enabled: Cell<bool>,
    host_clock_khz: Cell<u32>,
    pins: RefCell<Vec<PinRange>>,
    handlers: Cell<usize>,
    line_enabled: Cell<bool>,
    flushes: Cell<usize>,
    router: Cell<Option<&'static InterruptRouter<'static>>>,
}

/// Split a register image into the words of an R2 response
fn r2(register: u128) -> [u32; 4] {
    let shifted = register >> 8;
    [
        shifted as u32,
        (shifted >> 32) as u32,
        (shifted >> 64) as u32,
        (shifted >> 96) as u32,
    ]
}

/// Data port words of a byte stream
fn stream_words(stream: &[u8]) -> impl Iterator<Item = u32> + '_ {
    stream
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
}

impl SimHost {
    fn new(config: &SlotConfig, model: CardModel) -> Self {
        Self {
            model,
            host_id: config.slot.host(),
            card_slot: config.slot.index(),
            now: Cell::new(1),
            slots: RefCell::new([SlotState::new(), SlotState::new()]),
            card: RefCell::new(CardState::default()),
            storage: RefCell::new(HashMap::new()),
            issued: RefCell::new(Vec::new()),
            inserted: Cell::new(true),
            write_protect: Cell::new(false),
            fail_next: Cell::new(None),
            cmd_resets: Cell::new(0),
            data_resets: Cell::new(0),
            clock_enabled: Cell::new(true),
            host_clock_khz: Cell::new(50_000),
            pins: RefCell::new(Vec::new()),
            handlers: Cell::new(0),
            line_enabled: Cell::new(false),
            flushes: Cell::new(0),
            router: Cell::new(None),
        }
    }

    // ------------------------------------------------------------------------
    // Test controls and observations
    // ------------------------------------------------------------------------

    pub fn now(&self) -> u64 {
        self.now.get()
    }

    pub fn remove_card(&self) {
        self.inserted.set(false);
    }

    /// Slide the write protect tab
    pub fn set_write_protect(&self, protected: bool) {
        self.write_protect.set(protected);
    }

    /// Make the next sector transfer fail with `status` after its command
    pub fn fail_next_transfer(&self, status: IntStatus) {
        self.fail_next.set(Some(status));
    }

    pub fn issued(&self) -> Vec<Issued> {
        self.issued.borrow().clone()
    }

    pub fn clear_issued(&self) {
        self.issued.borrow_mut().clear();
    }

    pub fn divider(&self, slot: SlotIndex) -> u16 {
        self.slots.borrow()[slot.index()].divider
    }

    pub fn bus_width(&self, slot: SlotIndex) -> BusWidth {
        self.slots.borrow()[slot.index()].bus_width
    }

    /// High speed timing bit of the host
    pub fn host_high_speed(&self, slot: SlotIndex) -> bool {
        self.slots.borrow()[slot.index()].high_speed
    }

    pub fn signal_enable(&self, slot: SlotIndex) -> IntStatus {
        self.slots.borrow()[slot.index()].signal_enable
    }

    /// The card committed to high speed timing
    pub fn card_high_speed(&self) -> bool {
        self.card.borrow().high_speed
    }

    /// Software resets that included the CMD line
    pub fn cmd_resets(&self) -> usize {
        self.cmd_resets.get()
    }

    /// Software resets that included the DAT lines
    pub fn data_resets(&self) -> usize {
        self.data_resets.get()
    }

    pub fn pins(&self) -> Vec<PinRange> {
        self.pins.borrow().clone()
    }

    pub fn handlers_installed(&self) -> usize {
        self.handlers.get()
    }

    pub fn line_enabled(&self) -> bool {
        self.line_enabled.get()
    }

    pub fn flushes(&self) -> usize {
        self.flushes.get()
    }

    /// Store `data` on the card starting at sector `first`
    pub fn fill(&self, first: u32, data: &[u8]) {
        let mut storage = self.storage.borrow_mut();
        for (sector, chunk) in (first..).zip(data.chunks(SECTOR)) {
            let mut block = [0u8; SECTOR];
            block[..chunk.len()].copy_from_slice(chunk);
            storage.insert(sector, block);
        }
    }

    /// Card contents of `count` sectors starting at `first`
    pub fn stored(&self, first: u32, count: u32) -> Vec<u8> {
        let storage = self.storage.borrow();
        (first..first + count)
            .flat_map(|sector| storage.get(&sector).copied().unwrap_or([0; SECTOR]))
            .collect()
    }

    // ------------------------------------------------------------------------
    // Card behaviour
    // ------------------------------------------------------------------------

    fn tick(&self, us: u64) {
        self.now.set(self.now.get() + us);
    }

    fn sector_of(&self, argument: u32) -> u32 {
        if self.model.high_capacity {
            argument
        } else {
            argument / SECTOR as u32
        }
    }

    /// Operating conditions after one more power-up poll
    fn power_up_poll(&self, request: u32) -> u32 {
        let mut card = self.card.borrow_mut();
        card.polls += 1;
        let ready = self.model.ready_after.is_some_and(|after| card.polls >= after);
        if !ready {
            return self.model.window;
        }
        let mut ocr = self.model.window | (1 << 31);
        match self.model.family {
            Family::Mmc => ocr |= self.model.access_mode << 29,
            _ if self.model.high_capacity && request & (1 << 30) != 0 => ocr |= 1 << 30,
            _ => {}
        }
        ocr
    }

    /// Response of the card, `None` if it stays silent
    fn respond(&self, slot: &mut SlotState, command: &Command, app: bool) -> Option<[u32; 4]> {
        let model = &self.model;
        let r1 = [0x0000_0900, 0, 0, 0];
        if model.family == Family::Silent && command.index != CMD_GO_IDLE_STATE {
            return None;
        }

        match (app, command.index) {
            (_, CMD_GO_IDLE_STATE) => {
                *self.card.borrow_mut() = CardState::default();
                Some([0; 4])
            }
            (false, CMD_SEND_IF_COND) if model.family == Family::SdV2 => {
                let echo = if model.bad_echo {
                    (command.argument & 0xF00) | 0x55
                } else {
                    command.argument & 0xFFF
                };
                Some([echo, 0, 0, 0])
            }
            (_, CMD_APP_CMD) if model.is_sd() => {
                self.card.borrow_mut().app = true;
                Some([0x0000_0920, 0, 0, 0])
            }
            (true, ACMD_SD_SEND_OP_COND) if model.is_sd() => {
                if command.argument == 0 {
                    Some([model.window, 0, 0, 0])
                } else {
                    Some([self.power_up_poll(command.argument), 0, 0, 0])
                }
            }
            (false, CMD_SEND_OP_COND) if model.family == Family::Mmc => {
                if command.argument == 0 {
                    Some([model.window, 0, 0, 0])
                } else {
                    Some([self.power_up_poll(command.argument), 0, 0, 0])
                }
            }
            (false, CMD_ALL_SEND_CID) => Some(r2(model.cid)),
            (false, CMD_RELATIVE_ADDR) if model.is_sd() => Some([0x1234_0500, 0, 0, 0]),
            (false, CMD_RELATIVE_ADDR) => Some(r1),
            (false, CMD_SEND_CSD) => Some(r2(model.csd)),
            (false, CMD_SELECT_CARD) => Some(r1),
            (false, CMD_SWITCH_FUNC) if model.is_sd() => {
                if command.argument & (1 << 31) != 0 {
                    self.card.borrow_mut().high_speed = true;
                }
                self.queue_read(slot, &model.switch_status(), 16);
                Some(r1)
            }
            (true, ACMD_SET_BUS_WIDTH) => Some(r1),
            (true, ACMD_SEND_SCR) => {
                self.queue_read(slot, &model.scr.to_be_bytes(), 2);
                Some(r1)
            }
            (false, CMD_READ_MULTIPLE_BLOCK | CMD_WRITE_MULTIPLE_BLOCK) => {
                self.start_transfer(slot, command);
                Some(r1)
            }
            _ => None,
        }
    }

    fn queue_read(&self, slot: &mut SlotState, stream: &[u8], block_words: usize) {
        slot.abort_data();
        slot.words.extend(stream_words(stream));
        slot.transfer = Some(Transfer::Read { block_words });
        slot.int_status |= IntStatus::BUFFER_READ_READY;
    }

    fn start_transfer(&self, slot: &mut SlotState, command: &Command) {
        let Some(data) = command.data else {
            return;
        };
        let first = self.sector_of(command.argument);
        let blocks = usize::from(data.block_count);

        if let Some(status) = self.fail_next.take() {
            slot.abort_data();
            slot.deferred_error = status;
            return;
        }

        let is_read = command.index == CMD_READ_MULTIPLE_BLOCK;
        match data.dma_address {
            Some(address) => {
                slot.dma_address = address;
                let len = blocks * SECTOR;
                if is_read {
                    let stream = self.stored(first, blocks as u32);
                    // SAFETY: the driver passes a live buffer of at least `len` bytes
                    let target =
                        unsafe { core::slice::from_raw_parts_mut(address as *mut u8, len) };
                    target.copy_from_slice(&stream);
                } else {
                    // SAFETY: as above
                    let source = unsafe { core::slice::from_raw_parts(address as *const u8, len) };
                    self.fill(first, source);
                }
                slot.int_status |= IntStatus::TRANSFER_COMPLETE;
            }
            None if is_read => {
                let stream = self.stored(first, blocks as u32);
                self.queue_read(slot, &stream, SECTOR_WORDS);
            }
            None => {
                slot.abort_data();
                slot.transfer = Some(Transfer::Write { first, blocks });
                slot.int_status |= IntStatus::BUFFER_WRITE_READY;
            }
        }
    }
}

impl SdHost for SimHost {
    fn reset(&self, slot: SlotIndex, lines: ResetLines) {
        let mut slots = self.slots.borrow_mut();
        let state = &mut slots[slot.index()];
        if lines.contains(ResetLines::ALL) {
            *state = SlotState::new();
            return;
        }
        if lines.contains(ResetLines::CMD) {
            self.cmd_resets.set(self.cmd_resets.get() + 1);
            state.int_status.remove(IntStatus::CMD_COMPLETE);
        }
        if lines.contains(ResetLines::DAT) {
            self.data_resets.set(self.data_resets.get() + 1);
            state.abort_data();
            state.int_status.remove(
                IntStatus::TRANSFER_COMPLETE
                    | IntStatus::BUFFER_READ_READY
                    | IntStatus::BUFFER_WRITE_READY
                    | IntStatus::DMA,
            );
        }
    }

    fn init(&self, slot: SlotIndex) {
        let mut slots = self.slots.borrow_mut();
        let state = &mut slots[slot.index()];
        state.bus_width = BusWidth::One;
        state.high_speed = false;
        state.signal_enable = IntStatus::empty();
        state.int_status = IntStatus::empty();
    }

    fn set_divider(&self, slot: SlotIndex, divider: u16) {
        self.slots.borrow_mut()[slot.index()].divider = divider;
    }

    fn set_high_speed(&self, slot: SlotIndex, enable: bool) {
        self.slots.borrow_mut()[slot.index()].high_speed = enable;
    }

    fn set_bus_width(&self, slot: SlotIndex, width: BusWidth) {
        self.slots.borrow_mut()[slot.index()].bus_width = width;
    }

    fn present_state(&self, slot: SlotIndex) -> PresentState {
        let mut state = PresentState::empty();
        if slot == self.card_slot && self.inserted.get() {
            state |= PresentState::CARD_INSERTED
                | PresentState::CARD_STABLE
                | PresentState::CARD_DETECT_LEVEL;
        }
        if !self.write_protect.get() {
            state |= PresentState::WRITE_PROTECT_LEVEL;
        }
        state
    }

    fn int_status(&self, slot: SlotIndex) -> IntStatus {
        self.slots.borrow()[slot.index()].int_status
    }

    fn clear_int_status(&self, slot: SlotIndex, bits: IntStatus) {
        let mut slots = self.slots.borrow_mut();
        let state = &mut slots[slot.index()];
        state.int_status.remove(bits);
        if bits.contains(IntStatus::CMD_COMPLETE) && !state.deferred_error.is_empty() {
            state.int_status |= state.deferred_error;
            state.deferred_error = IntStatus::empty();
        }
    }

    fn set_signal_enable(&self, slot: SlotIndex, bits: IntStatus) {
        self.slots.borrow_mut()[slot.index()].signal_enable = bits;
    }

    fn issue(&self, slot: SlotIndex, command: &Command) {
        let app = std::mem::take(&mut self.card.borrow_mut().app);
        self.issued.borrow_mut().push(Issued {
            slot,
            index: command.index,
            argument: command.argument,
            app,
            dma: command.data.is_some_and(|data| data.dma_address.is_some()),
            at_us: self.now.get(),
        });
        self.tick(COMMAND_US);

        let mut slots = self.slots.borrow_mut();
        let state = &mut slots[slot.index()];
        let present = slot == self.card_slot && self.inserted.get();
        let response = if present {
            self.respond(state, command, app)
        } else {
            None
        };

        match response {
            Some(response) => {
                state.response = response;
                state.int_status |= IntStatus::CMD_COMPLETE;
            }
            None => state.int_status |= IntStatus::ERROR | IntStatus::CMD_TIMEOUT,
        }
    }

    fn response(&self, slot: SlotIndex) -> [u32; 4] {
        self.slots.borrow()[slot.index()].response
    }

    fn read_buffer(&self, slot: SlotIndex) -> u32 {
        let mut slots = self.slots.borrow_mut();
        let state = &mut slots[slot.index()];
        let Some(Transfer::Read { block_words }) = state.transfer else {
            return 0;
        };
        let word = state.words.pop_front().unwrap_or(0);
        state.moved += 1;
        if state.words.is_empty() {
            state.transfer = None;
            state.moved = 0;
            state.int_status |= IntStatus::TRANSFER_COMPLETE;
        } else if state.moved % block_words == 0 {
            state.int_status |= IntStatus::BUFFER_READ_READY;
        }
        word
    }

    fn write_buffer(&self, slot: SlotIndex, word: u32) {
        let mut slots = self.slots.borrow_mut();
        let state = &mut slots[slot.index()];
        let Some(Transfer::Write { first, blocks }) = state.transfer else {
            return;
        };
        state.words.push_back(word);
        if state.words.len() == blocks * SECTOR_WORDS {
            let stream: Vec<u8> = state.words.drain(..).flat_map(u32::to_le_bytes).collect();
            state.transfer = None;
            state.int_status |= IntStatus::TRANSFER_COMPLETE;
            drop(slots);
            self.fill(first, &stream);
        } else if state.words.len() % SECTOR_WORDS == 0 {
            state.int_status |= IntStatus::BUFFER_WRITE_READY;
        }
    }

    fn dma_address(&self, slot: SlotIndex) -> usize {
        self.slots.borrow()[slot.index()].dma_address
    }

    fn set_dma_address(&self, slot: SlotIndex, address: usize) {
        self.slots.borrow_mut()[slot.index()].dma_address = address;
    }
}

// ============================================================================
// Simulated Board
// ============================================================================

impl Timebase for SimHost {
    fn now_us(&self) -> u64 {
        let now = self.now.get();
        self.tick(1);
        now
    }

    fn relax(&self) {
        if !self.line_enabled.get() {
            return;
        }
        let pending = self
            .slots
            .borrow()
            .iter()
            .any(|state| state.int_status.intersects(state.signal_enable));
        if let (true, Some(router)) = (pending, self.router.get()) {
            router.dispatch(self.host_id, self, self);
        }
    }
}

impl ClockTree for SimHost {
    fn host_clock_enabled(&self, _: HostId) -> bool {
        self.clock_enabled.get()
    }

    fn host_clock_khz(&self, _: HostId) -> u32 {
        self.host_clock_khz.get()
    }
}

impl PinMux for SimHost {
    fn configure_pins(&self, pins: &PinRange) {
        self.pins.borrow_mut().push(*pins);
    }
}

impl InterruptController for SimHost {
    fn install_handler(&self, _: HostId) {
        self.handlers.set(self.handlers.get() + 1);
    }

    fn enable_line(&self, _: HostId) {
        self.line_enabled.set(true);
    }

    fn disable_line(&self, _: HostId) {
        self.line_enabled.set(false);
    }

    fn clear_line(&self, _: HostId) {}
}

impl Platform for SimHost {
    fn flush_dcache(&self) {
        self.flushes.set(self.flushes.get() + 1);
    }
}

// ============================================================================
// Test Rig
// ============================================================================

/// A simulated board with one card, ready to set up a slot on
pub(crate) struct Rig {
    pub sim: &'static SimHost,
    pub router: &'static InterruptRouter<'static>,
    pub signal: &'static TransferSignal,
    pub config: SlotConfig,
}

impl Rig {
    pub fn new(config: SlotConfig, model: CardModel) -> Self {
        let router = Self::leak(InterruptRouter::new());
        let sim = Self::leak(SimHost::new(&config, model));
        sim.router.set(Some(router));
        Self {
            sim,
            router,
            signal: Self::leak(TransferSignal::new()),
            config,
        }
    }

    /// Give a test value the lifetime the driver's references need
    pub fn leak<T>(value: T) -> &'static T {
        Box::leak(Box::new(value))
    }

    pub fn host_clock(self, khz: u32) -> Self {
        self.sim.host_clock_khz.set(khz);
        self
    }

    pub fn clock_gated(self) -> Self {
        self.sim.clock_enabled.set(false);
        self
    }

    pub fn setup(&self) -> SimSlot {
        SdSlot::setup(self.config, self.sim, self.sim, self.router, self.signal)
    }
}
