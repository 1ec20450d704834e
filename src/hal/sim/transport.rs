use std::collections::{HashMap, VecDeque};
use std::f64::consts::PI;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::buffers::{read_samples, write_samples, BYTES_PER_SAMPLE};
use crate::engine::metadata::{
    payload_offset, read_header, write_header, MessageHeader, MESSAGE_BYTES, SAMPLES_PER_MESSAGE,
};
use crate::error::{Error, Result};
use crate::hal::boards::{bladerf1, bladerf2, regs};
use crate::hal::devinfo::{BackendKind, DeviceInfo, UsbSpeed};
use crate::hal::traits::Transport;
use crate::hal::types::{Direction, Loopback, RxMux, Version};

const FW_VERSION: Version = Version::new(2, 4, 0);
const TONE_AMPLITUDE: f64 = 2000.0;
const TONE_PERIOD: u64 = 16;

/// Register writes kept for inspection, oldest dropped first
pub const WRITE_LOG_CAPACITY: usize = 4096;
/// TX buffers kept for inspection, oldest dropped first
pub const TX_CAPTURE_CAPACITY: usize = 1024;
/// I/Q values held for RX loopback playback
pub const LOOPBACK_CAPACITY: usize = 1 << 20;

const FLASH_ERASED: u8 = 0xff;

/// One sample buffer observed on the TX side
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRecord {
    /// Header timestamp, `None` for unframed buffers
    pub timestamp: Option<u64>,
    pub flags: u32,
    /// Interleaved I/Q
    pub samples: Vec<i16>,
}

#[derive(Default)]
struct Lane {
    pending: VecDeque<Vec<u8>>,
    clock: u64,
    stalled: bool,
    failing: bool,
    /// Samples to skip before the next RX buffer
    gap: u64,
    /// Free-running sample counter for the counter mux modes
    counter: u64,
}

struct SimState {
    open: bool,
    /// Held by a backend `open`
    claimed: bool,
    defaults: HashMap<u16, u32>,
    registers: HashMap<u16, u32>,
    write_log: VecDeque<(u16, u32)>,
    /// Writes to this address fail
    failing_register: Option<u16>,
    rx: Lane,
    tx: Lane,
    transmitted: VecDeque<TxRecord>,
    loopback: VecDeque<i16>,
    flashed: Option<usize>,
    flash: Flash,
}

/// SPI flash contents, stored per written erase block
struct Flash {
    size: u32,
    erase_block: u32,
    blocks: HashMap<u32, Vec<u8>>,
}

impl Flash {
    fn new(size: u32, erase_block: u32) -> Self {
        Self { size, erase_block, blocks: HashMap::new() }
    }

    fn check(&self, offset: u32, len: usize, aligned: bool) -> Result<()> {
        let end = u64::from(offset) + len as u64;
        if end > u64::from(self.size) {
            return Err(Error::InvalidParameter(format!(
                "flash range {:#x}+{} exceeds {} bytes",
                offset, len, self.size
            )));
        }
        let block = u64::from(self.erase_block);
        if aligned && (u64::from(offset) % block != 0 || len as u64 % block != 0) {
            return Err(Error::InvalidParameter(format!(
                "flash erase {:#x}+{} is not aligned to {} byte blocks",
                offset, len, self.erase_block
            )));
        }
        Ok(())
    }

    fn erase(&mut self, offset: u32, len: usize) -> Result<()> {
        self.check(offset, len, true)?;
        let first = offset / self.erase_block;
        let count = (len / self.erase_block as usize) as u32;
        for block in first..first + count {
            self.blocks.remove(&block);
        }
        Ok(())
    }

    /// Programming only clears bits, like NOR flash
    fn write(&mut self, offset: u32, data: &[u8]) -> Result<()> {
        self.check(offset, data.len(), false)?;
        let block_size = self.erase_block as usize;
        for (index, byte) in data.iter().enumerate() {
            let addr = offset as usize + index;
            let block = self
                .blocks
                .entry((addr / block_size) as u32)
                .or_insert_with(|| vec![FLASH_ERASED; block_size]);
            block[addr % block_size] &= byte;
        }
        Ok(())
    }

    fn read(&self, offset: u32, len: usize) -> Result<Vec<u8>> {
        self.check(offset, len, false)?;
        let block_size = self.erase_block as usize;
        Ok((0..len)
            .map(|index| {
                let addr = offset as usize + index;
                self.blocks
                    .get(&((addr / block_size) as u32))
                    .map_or(FLASH_ERASED, |block| block[addr % block_size])
            })
            .collect())
    }
}

fn push_capped<T>(queue: &mut VecDeque<T>, item: T, capacity: usize) {
    if queue.len() == capacity {
        queue.pop_front();
    }
    queue.push_back(item);
}

impl SimState {
    fn lane(&mut self, direction: Direction) -> &mut Lane {
        match direction {
            Direction::Rx => &mut self.rx,
            Direction::Tx => &mut self.tx,
        }
    }

    fn register(&self, addr: u16) -> u32 {
        self.registers.get(&addr).copied().unwrap_or(0)
    }

    fn enabled_channels(&self, direction: Direction) -> usize {
        let enabled = self.register(regs::MODULE_ENABLE) & regs::direction_mask(direction);
        enabled.count_ones() as usize
    }

    fn framed(&self, direction: Direction) -> bool {
        self.register(regs::TIMESTAMP_CTRL) & regs::framing_bit(direction) != 0
    }

    fn loopback_active(&self) -> bool {
        self.register(regs::LOOPBACK) != Loopback::None.code()
            || self.register(regs::RX_MUX) == RxMux::DigitalLoopback.code()
    }

    fn ready(&self, direction: Direction) -> bool {
        let lane = match direction {
            Direction::Rx => &self.rx,
            Direction::Tx => &self.tx,
        };
        !lane.stalled && !lane.pending.is_empty() && self.enabled_channels(direction) > 0
    }

    fn write(&mut self, addr: u16, value: u32) {
        push_capped(&mut self.write_log, (addr, value), WRITE_LOG_CAPACITY);
        if addr == regs::RESET && value != 0 {
            self.registers = self.defaults.clone();
            return;
        }

        let mut value = value;
        if addr == regs::TRIGGER_RX || addr == regs::TRIGGER_TX {
            let fire = regs::TRIGGER_ARM | regs::TRIGGER_MASTER | regs::TRIGGER_FIRE;
            if value & fire == fire {
                value |= regs::TRIGGER_LINE;
            }
        }
        self.registers.insert(addr, value);
    }

    fn fill_rx(&mut self, buffer: &mut [u8]) {
        let channels = self.enabled_channels(Direction::Rx).max(1) as u64;
        let framed = self.framed(Direction::Rx);
        let mux = RxMux::from_code(self.register(regs::RX_MUX)).unwrap_or_default();
        let looped = self.loopback_active();

        let gap = std::mem::take(&mut self.rx.gap);
        self.rx.clock += gap;
        self.rx.counter += gap * channels;

        if framed {
            let messages = buffer.len() / MESSAGE_BYTES;
            for index in 0..messages {
                let start = index * MESSAGE_BYTES;
                write_header(
                    &mut buffer[start..start + MESSAGE_BYTES],
                    MessageHeader { timestamp: self.rx.clock, flags: 0 },
                );
                let payload = payload_offset(index * SAMPLES_PER_MESSAGE);
                let samples = self.generate(SAMPLES_PER_MESSAGE, mux, looped);
                write_samples(
                    &samples,
                    &mut buffer[payload..payload + SAMPLES_PER_MESSAGE * BYTES_PER_SAMPLE],
                );
                self.rx.clock += SAMPLES_PER_MESSAGE as u64 / channels;
            }
        } else {
            let count = buffer.len() / BYTES_PER_SAMPLE;
            let samples = self.generate(count, mux, looped);
            write_samples(&samples, buffer);
            self.rx.clock += count as u64 / channels;
        }
    }

    fn generate(&mut self, count: usize, mux: RxMux, looped: bool) -> Vec<i16> {
        let mut samples = Vec::with_capacity(count * 2);
        for _ in 0..count {
            let n = self.rx.counter;
            self.rx.counter += 1;
            let (i, q) = if looped {
                (
                    self.loopback.pop_front().unwrap_or(0),
                    self.loopback.pop_front().unwrap_or(0),
                )
            } else {
                match mux {
                    RxMux::Counter32Bit => ((n & 0xffff) as u16 as i16, ((n >> 16) & 0xffff) as u16 as i16),
                    RxMux::Counter12Bit => {
                        let value = (n & 0x7ff) as i16;
                        (value, -value)
                    }
                    RxMux::Baseband | RxMux::DigitalLoopback => {
                        let phase = 2.0 * PI * (n % TONE_PERIOD) as f64 / TONE_PERIOD as f64;
                        (
                            (TONE_AMPLITUDE * phase.cos()).round() as i16,
                            (TONE_AMPLITUDE * phase.sin()).round() as i16,
                        )
                    }
                }
            };
            samples.push(i);
            samples.push(q);
        }
        samples
    }

    fn consume_tx(&mut self, buffer: &[u8]) {
        let looped = self.loopback_active();
        let mut records = Vec::new();

        if self.framed(Direction::Tx) {
            for message in buffer.chunks_exact(MESSAGE_BYTES) {
                let Some(header) = read_header(message) else {
                    continue;
                };
                let mut samples = vec![0i16; SAMPLES_PER_MESSAGE * 2];
                read_samples(&message[payload_offset(0)..], &mut samples);
                records.push(TxRecord {
                    timestamp: Some(header.timestamp),
                    flags: header.flags,
                    samples,
                });
            }
        } else {
            let channels = self.enabled_channels(Direction::Tx).max(1) as u64;
            let mut samples = vec![0i16; buffer.len() / 2];
            read_samples(buffer, &mut samples);
            self.tx.clock += (samples.len() / 2) as u64 / channels;
            records.push(TxRecord { timestamp: None, flags: 0, samples });
        }

        if looped {
            for record in &records {
                for &value in &record.samples {
                    push_capped(&mut self.loopback, value, LOOPBACK_CAPACITY);
                }
            }
        }
        for record in records {
            push_capped(&mut self.transmitted, record, TX_CAPTURE_CAPACITY);
        }
    }
}

/// In-process stand-in for a USB-attached device.
///
/// Registers are a plain map, RX buffers are synthesized from the RX mux
/// setting and TX buffers are recorded for inspection. Transfers complete
/// only while the direction has at least one channel enabled and the lane is
/// not stalled.
pub struct SimTransport {
    info: DeviceInfo,
    speed: UsbSpeed,
    state: Mutex<SimState>,
    progress: Condvar,
}

impl SimTransport {
    pub fn new(info: DeviceInfo, fpga_version: Version) -> Self {
        let flash_size = if info.ids == bladerf2::USB_IDS[0] {
            bladerf2::FLASH_SIZE
        } else {
            bladerf1::FLASH_SIZE
        };
        let defaults: HashMap<u16, u32> = [
            (regs::FPGA_LOADED, 1),
            (regs::FW_VERSION, FW_VERSION.to_register()),
            (regs::FPGA_VERSION, fpga_version.to_register()),
        ]
        .into_iter()
        .collect();

        Self {
            info,
            speed: UsbSpeed::Super,
            state: Mutex::new(SimState {
                open: true,
                claimed: false,
                registers: defaults.clone(),
                defaults,
                write_log: VecDeque::new(),
                failing_register: None,
                rx: Lane::default(),
                tx: Lane::default(),
                transmitted: VecDeque::new(),
                loopback: VecDeque::new(),
                flashed: None,
                flash: Flash::new(flash_size, regs::FLASH_ERASE_BLOCK),
            }),
            progress: Condvar::new(),
        }
    }

    pub fn bladerf1(serial: &str) -> Arc<Self> {
        Arc::new(Self::new(
            Self::sim_info(serial, bladerf1::USB_IDS[0], "bladeRF"),
            Version::new(0, 12, 0),
        ))
    }

    pub fn bladerf2(serial: &str) -> Arc<Self> {
        Arc::new(Self::new(
            Self::sim_info(serial, bladerf2::USB_IDS[0], "bladeRF 2.0"),
            Version::new(0, 15, 0),
        ))
    }

    fn sim_info(serial: &str, ids: crate::hal::devinfo::UsbIds, product: &str) -> DeviceInfo {
        DeviceInfo {
            backend: BackendKind::Sim,
            serial: serial.to_string(),
            usb_bus: 1,
            usb_addr: 1,
            instance: 0,
            ids,
            manufacturer: "Nuand".to_string(),
            product: product.to_string(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_open(state: &SimState) -> Result<()> {
        if !state.open {
            return Err(Error::Io("device has been closed".into()));
        }
        Ok(())
    }

    pub(crate) fn is_claimed(&self) -> bool {
        self.lock().claimed
    }

    /// Hand the device to a new owner, optionally restoring power-on state
    pub(crate) fn claim(&self, reset: bool) {
        let mut state = self.lock();
        state.open = true;
        state.claimed = true;
        if reset {
            state.registers = state.defaults.clone();
            state.loopback.clear();
        }
    }

    /// Hold completions for a direction until released
    pub fn set_stalled(&self, direction: Direction, stalled: bool) {
        self.lock().lane(direction).stalled = stalled;
        self.progress.notify_all();
    }

    /// Make every further transfer on `direction` fail
    pub fn fail_transfers(&self, direction: Direction, failing: bool) {
        self.lock().lane(direction).failing = failing;
        self.progress.notify_all();
    }

    /// Make writes to `addr` fail, or stop failing with `None`
    pub fn fail_register_writes(&self, addr: Option<u16>) {
        self.lock().failing_register = addr;
    }

    pub fn advance_timestamp(&self, direction: Direction, samples: u64) {
        self.lock().lane(direction).clock += samples;
    }

    /// Drop `samples` from the RX timeline before the next buffer
    pub fn inject_rx_gap(&self, samples: u64) {
        self.lock().rx.gap += samples;
    }

    pub fn register(&self, addr: u16) -> u32 {
        self.lock().register(addr)
    }

    pub fn set_register(&self, addr: u16, value: u32) {
        self.lock().registers.insert(addr, value);
    }

    /// The most recent register writes, oldest first
    pub fn write_log(&self) -> Vec<(u16, u32)> {
        self.lock().write_log.iter().copied().collect()
    }

    pub fn clear_write_log(&self) {
        self.lock().write_log.clear();
    }

    /// The most recent TX buffers, oldest first
    pub fn transmitted(&self) -> Vec<TxRecord> {
        self.lock().transmitted.iter().cloned().collect()
    }

    pub fn pending_transfers(&self, direction: Direction) -> usize {
        self.lock().lane(direction).pending.len()
    }

    /// Size of the last image written through `flash_firmware`
    pub fn flashed_image_len(&self) -> Option<usize> {
        self.lock().flashed
    }
}

impl Transport for SimTransport {
    fn info(&self) -> DeviceInfo {
        self.info.clone()
    }

    fn speed(&self) -> UsbSpeed {
        self.speed
    }

    fn is_open(&self) -> bool {
        self.lock().open
    }

    fn close(&self) {
        let mut state = self.lock();
        state.open = false;
        state.claimed = false;
        state.rx.pending.clear();
        state.tx.pending.clear();
        drop(state);
        self.progress.notify_all();
    }

    fn read_register(&self, addr: u16) -> Result<u32> {
        let state = self.lock();
        Self::check_open(&state)?;
        Ok(state.register(addr))
    }

    fn write_register(&self, addr: u16, value: u32) -> Result<()> {
        let mut state = self.lock();
        Self::check_open(&state)?;
        if state.failing_register == Some(addr) {
            return Err(Error::Io(format!("write to register {:#06x} failed", addr)));
        }
        state.write(addr, value);
        drop(state);
        self.progress.notify_all();
        Ok(())
    }

    fn read_timestamp(&self, direction: Direction) -> Result<u64> {
        let mut state = self.lock();
        Self::check_open(&state)?;
        Ok(state.lane(direction).clock)
    }

    fn submit(&self, direction: Direction, buffer: Vec<u8>) -> Result<()> {
        let mut state = self.lock();
        Self::check_open(&state)?;
        if state.lane(direction).failing {
            return Err(Error::Io(format!("{} transfer submission failed", direction)));
        }
        state.lane(direction).pending.push_back(buffer);
        drop(state);
        self.progress.notify_all();
        Ok(())
    }

    fn poll_complete(&self, direction: Direction, timeout: Duration) -> Result<Option<Vec<u8>>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();

        loop {
            Self::check_open(&state)?;
            if state.lane(direction).failing {
                return Err(Error::Io(format!("{} transfer failed", direction)));
            }
            if state.ready(direction) {
                break;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            state = self
                .progress
                .wait_timeout(state, remaining)
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .0;
        }

        let Some(mut buffer) = state.lane(direction).pending.pop_front() else {
            return Ok(None);
        };
        match direction {
            Direction::Rx => state.fill_rx(&mut buffer),
            Direction::Tx => state.consume_tx(&buffer),
        }
        Ok(Some(buffer))
    }

    fn cancel_transfers(&self, direction: Direction) -> Vec<Vec<u8>> {
        self.lock().lane(direction).pending.drain(..).collect()
    }

    fn load_fpga(&self, image: &[u8]) -> Result<()> {
        let mut state = self.lock();
        Self::check_open(&state)?;
        log::debug!("sim: loading {} byte FPGA image", image.len());
        state.registers.insert(regs::FPGA_LOADED, 1);
        Ok(())
    }

    fn flash_firmware(&self, image: &[u8]) -> Result<()> {
        let mut state = self.lock();
        Self::check_open(&state)?;
        state.flashed = Some(image.len());
        Ok(())
    }

    fn erase_flash(&self, offset: u32, len: usize) -> Result<()> {
        let mut state = self.lock();
        Self::check_open(&state)?;
        state.flash.erase(offset, len)
    }

    fn write_flash(&self, offset: u32, data: &[u8]) -> Result<()> {
        let mut state = self.lock();
        Self::check_open(&state)?;
        state.flash.write(offset, data)
    }

    fn read_flash(&self, offset: u32, len: usize) -> Result<Vec<u8>> {
        let state = self.lock();
        Self::check_open(&state)?;
        state.flash.read(offset, len)
    }
}
