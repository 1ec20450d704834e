//! Register-level helpers used by the provided `Board` methods.

use super::regs;
use crate::error::{Error, Result};
use crate::hal::traits::Transport;
use crate::hal::trigger::{Trigger, TriggerRole, TriggerState};
use crate::hal::types::{
    Band, Channel, Correction, Direction, FlashGeometry, GainMode, GainStage, Loopback, QuickTune,
    Range, RxMux, TuningMode, Version,
};

const FRAC_MASK: u128 = (1 << regs::FRAC_BITS) - 1;

/// Disable every module and message framing
pub fn quiesce(transport: &dyn Transport) -> Result<()> {
    transport.write_register(regs::MODULE_ENABLE, 0)?;
    transport.write_register(regs::TIMESTAMP_CTRL, 0)
}

/// Integer and fractional synthesizer words for `frequency`, rounded to the
/// nearest step of `REF_HZ / 2^FRAC_BITS`.
pub fn synth_words(frequency: u64) -> (u32, u32) {
    let reference = regs::REF_HZ as u128;
    let word = (((frequency as u128) << regs::FRAC_BITS) + reference / 2) / reference;
    ((word >> regs::FRAC_BITS) as u32, (word & FRAC_MASK) as u32)
}

pub fn synth_frequency(nint: u32, nfrac: u32) -> u64 {
    let word = ((nint as u128) << regs::FRAC_BITS) | (nfrac as u128 & FRAC_MASK);
    let half = 1u128 << (regs::FRAC_BITS - 1);
    ((word * regs::REF_HZ as u128 + half) >> regs::FRAC_BITS) as u64
}

pub fn tune(transport: &dyn Transport, channel: Channel, frequency: u64) -> Result<()> {
    let (nint, nfrac) = synth_words(frequency);
    transport.write_register(regs::channel(channel, regs::NINT), nint)?;
    transport.write_register(regs::channel(channel, regs::NFRAC), nfrac)
}

pub fn read_frequency(transport: &dyn Transport, channel: Channel) -> Result<u64> {
    let nint = transport.read_register(regs::channel(channel, regs::NINT))?;
    let nfrac = transport.read_register(regs::channel(channel, regs::NFRAC))?;
    Ok(synth_frequency(nint, nfrac))
}

pub fn write_band(transport: &dyn Transport, channel: Channel, band: Band) -> Result<()> {
    let value = match band {
        Band::Low => 0,
        Band::High => 1,
    };
    transport.write_register(regs::channel(channel, regs::BAND), value)
}

pub fn read_band(transport: &dyn Transport, channel: Channel) -> Result<Band> {
    match transport.read_register(regs::channel(channel, regs::BAND))? {
        0 => Ok(Band::Low),
        1 => Ok(Band::High),
        other => Err(Error::Unexpected(format!("band register value {}", other))),
    }
}

pub fn read_quick_tune(transport: &dyn Transport, channel: Channel) -> Result<QuickTune> {
    Ok(QuickTune {
        nint: transport.read_register(regs::channel(channel, regs::NINT))?,
        nfrac: transport.read_register(regs::channel(channel, regs::NFRAC))?,
        band: read_band(transport, channel)?,
    })
}

pub fn write_quick_tune(transport: &dyn Transport, channel: Channel, tune: &QuickTune) -> Result<()> {
    transport.write_register(regs::channel(channel, regs::NINT), tune.nint)?;
    transport.write_register(regs::channel(channel, regs::NFRAC), tune.nfrac)?;
    write_band(transport, channel, tune.band)
}

pub fn overall_gain_range(stages: &[GainStage]) -> Range {
    let (min, max) = stages
        .iter()
        .fold((0, 0), |(min, max), stage| (min + stage.range.min, max + stage.range.max));
    Range::new(min, max, 1)
}

pub fn find_stage<'a>(stages: &'a [GainStage], name: &str) -> Result<(usize, &'a GainStage)> {
    stages
        .iter()
        .enumerate()
        .find(|(_, stage)| stage.name.eq_ignore_ascii_case(name))
        .ok_or_else(|| Error::InvalidParameter(format!("unknown gain stage '{}'", name)))
}

pub fn write_stage(transport: &dyn Transport, channel: Channel, index: usize, gain: i32) -> Result<()> {
    let addr = regs::channel(channel, regs::GAIN_STAGE + index as u16);
    transport.write_register(addr, gain as u32)
}

pub fn read_stage(transport: &dyn Transport, channel: Channel, index: usize) -> Result<i32> {
    let addr = regs::channel(channel, regs::GAIN_STAGE + index as u16);
    Ok(transport.read_register(addr)? as i32)
}

/// Spread an overall gain across the stages, filling each one as far as
/// its step allows before moving to the next.
pub fn distribute_gain(
    transport: &dyn Transport,
    channel: Channel,
    stages: &[GainStage],
    gain: i32,
) -> Result<()> {
    let floor: i64 = stages.iter().map(|stage| stage.range.min).sum();
    let mut remaining = gain as i64 - floor;

    for (index, stage) in stages.iter().enumerate() {
        let span = stage.range.max - stage.range.min;
        let mut add = remaining.clamp(0, span);
        if stage.range.step > 1 {
            add -= add % stage.range.step;
        }
        write_stage(transport, channel, index, (stage.range.min + add) as i32)?;
        remaining -= add;
    }

    if remaining != 0 {
        log::debug!(
            target: "sdrcore::command",
            "{} gain {} dB rounded by {} dB",
            channel,
            gain,
            remaining
        );
    }
    Ok(())
}

pub fn read_overall_gain(transport: &dyn Transport, channel: Channel, stages: &[GainStage]) -> Result<i32> {
    let mut total = 0;
    for index in 0..stages.len() {
        total += read_stage(transport, channel, index)?;
    }
    Ok(total)
}

pub fn write_gain_mode(transport: &dyn Transport, channel: Channel, mode: GainMode) -> Result<()> {
    transport.write_register(regs::channel(channel, regs::GAIN_MODE), mode.code())
}

pub fn read_gain_mode(transport: &dyn Transport, channel: Channel) -> Result<GainMode> {
    GainMode::from_code(transport.read_register(regs::channel(channel, regs::GAIN_MODE))?)
}

pub fn write_rf_port(
    transport: &dyn Transport,
    channel: Channel,
    ports: &[&'static str],
    port: &str,
) -> Result<()> {
    let index = ports
        .iter()
        .position(|name| name.eq_ignore_ascii_case(port))
        .ok_or_else(|| Error::InvalidParameter(format!("unknown RF port '{}' for {}", port, channel)))?;
    transport.write_register(regs::channel(channel, regs::RF_PORT), index as u32)
}

pub fn read_rf_port(
    transport: &dyn Transport,
    channel: Channel,
    ports: &[&'static str],
) -> Result<&'static str> {
    let index = transport.read_register(regs::channel(channel, regs::RF_PORT))?;
    ports
        .get(index as usize)
        .copied()
        .ok_or_else(|| Error::Unexpected(format!("RF port register value {}", index)))
}

pub fn write_loopback(transport: &dyn Transport, mode: Loopback) -> Result<()> {
    transport.write_register(regs::LOOPBACK, mode.code())
}

pub fn read_loopback(transport: &dyn Transport) -> Result<Loopback> {
    Loopback::from_code(transport.read_register(regs::LOOPBACK)?)
}

pub fn write_rx_mux(transport: &dyn Transport, mux: RxMux) -> Result<()> {
    transport.write_register(regs::RX_MUX, mux.code())
}

pub fn read_rx_mux(transport: &dyn Transport) -> Result<RxMux> {
    RxMux::from_code(transport.read_register(regs::RX_MUX)?)
}

pub fn write_tuning_mode(transport: &dyn Transport, mode: TuningMode) -> Result<()> {
    let value = match mode {
        TuningMode::Host => 0,
        TuningMode::Fpga => 1,
    };
    transport.write_register(regs::TUNING_MODE, value)
}

pub fn read_tuning_mode(transport: &dyn Transport) -> Result<TuningMode> {
    match transport.read_register(regs::TUNING_MODE)? {
        0 => Ok(TuningMode::Host),
        1 => Ok(TuningMode::Fpga),
        other => Err(Error::Unexpected(format!("tuning mode register value {}", other))),
    }
}

pub fn write_correction(transport: &dyn Transport, channel: Channel, corr: Correction, value: i16) -> Result<()> {
    let addr = regs::channel(channel, regs::CORRECTION + corr.index());
    transport.write_register(addr, value as u16 as u32)
}

pub fn read_correction(transport: &dyn Transport, channel: Channel, corr: Correction) -> Result<i16> {
    let addr = regs::channel(channel, regs::CORRECTION + corr.index());
    Ok(transport.read_register(addr)? as u16 as i16)
}

pub fn write_module_enable(transport: &dyn Transport, channel: Channel, enable: bool) -> Result<()> {
    let current = transport.read_register(regs::MODULE_ENABLE)?;
    let bit = regs::enable_bit(channel);
    let value = if enable { current | bit } else { current & !bit };
    transport.write_register(regs::MODULE_ENABLE, value)
}

pub fn write_framing(transport: &dyn Transport, direction: Direction, enable: bool) -> Result<()> {
    let current = transport.read_register(regs::TIMESTAMP_CTRL)?;
    let bit = regs::framing_bit(direction);
    let value = if enable { current | bit } else { current & !bit };
    transport.write_register(regs::TIMESTAMP_CTRL, value)
}

pub fn write_trigger_arm(transport: &dyn Transport, trigger: &Trigger, arm: bool) -> Result<()> {
    let mut value = trigger.signal.code() << regs::TRIGGER_SIGNAL_SHIFT;
    match trigger.role {
        TriggerRole::Disabled if arm => {
            return Err(Error::InvalidParameter(
                "cannot arm a trigger whose role is disabled".into(),
            ))
        }
        TriggerRole::Master => value |= regs::TRIGGER_MASTER,
        _ => {}
    }
    if arm {
        value |= regs::TRIGGER_ARM;
    }
    transport.write_register(regs::trigger(trigger.channel.direction), value)
}

pub fn write_trigger_fire(transport: &dyn Transport, trigger: &Trigger) -> Result<()> {
    if trigger.role != TriggerRole::Master {
        return Err(Error::InvalidParameter("only the trigger master may fire".into()));
    }
    let addr = regs::trigger(trigger.channel.direction);
    let current = transport.read_register(addr)?;
    if current & regs::TRIGGER_ARM == 0 {
        return Err(Error::InvalidState("trigger is not armed".into()));
    }
    transport.write_register(addr, current | regs::TRIGGER_FIRE)
}

pub fn read_trigger_state(transport: &dyn Transport, trigger: &Trigger) -> Result<TriggerState> {
    let value = transport.read_register(regs::trigger(trigger.channel.direction))?;
    Ok(TriggerState {
        is_armed: value & regs::TRIGGER_ARM != 0,
        has_fired: value & regs::TRIGGER_LINE != 0,
        fire_requested: value & regs::TRIGGER_FIRE != 0,
    })
}

pub fn read_fpga_loaded(transport: &dyn Transport) -> Result<bool> {
    Ok(transport.read_register(regs::FPGA_LOADED)? != 0)
}

pub fn read_fw_version(transport: &dyn Transport) -> Result<Version> {
    Ok(Version::from_register(transport.read_register(regs::FW_VERSION)?))
}

pub fn read_fpga_version(transport: &dyn Transport) -> Result<Version> {
    if !read_fpga_loaded(transport)? {
        return Err(Error::InvalidState("FPGA is not configured".into()));
    }
    Ok(Version::from_register(transport.read_register(regs::FPGA_VERSION)?))
}

pub fn check_fpga_image(board: &str, sizes: &[usize], image: &[u8]) -> Result<()> {
    if !sizes.contains(&image.len()) {
        return Err(Error::InvalidParameter(format!(
            "{} byte FPGA image does not fit {}",
            image.len(),
            board
        )));
    }
    Ok(())
}

/// Offset and length of the stored FPGA region
fn fpga_region(geometry: &FlashGeometry) -> Result<(u32, usize)> {
    let offset = regs::FLASH_FPGA_OFFSET;
    let block = geometry.erase_block_size;
    if block == 0 || offset % block != 0 || offset >= geometry.size_bytes {
        return Err(Error::Unsupported(format!(
            "stored FPGA region at {:#x} does not fit a {} byte flash with {} byte blocks",
            offset, geometry.size_bytes, block
        )));
    }
    Ok((offset, (geometry.size_bytes - offset) as usize))
}

fn round_to_blocks(len: usize, geometry: &FlashGeometry) -> usize {
    let block = geometry.erase_block_size as usize;
    len.div_ceil(block) * block
}

pub fn write_stored_fpga(transport: &dyn Transport, geometry: &FlashGeometry, image: &[u8]) -> Result<()> {
    let (offset, capacity) = fpga_region(geometry)?;
    let page = geometry.page_size as usize;
    let total = page + image.len();
    if total > capacity {
        return Err(Error::InvalidParameter(format!(
            "{} byte FPGA image exceeds the {} byte flash region",
            image.len(),
            capacity - page
        )));
    }

    transport.erase_flash(offset, round_to_blocks(total, geometry))?;
    transport.write_flash(offset + geometry.page_size, image)?;

    // Header last: an interrupted write leaves no valid image behind
    let mut header = vec![0xff; page];
    header[..4].copy_from_slice(regs::FLASH_FPGA_MAGIC);
    header[4..8].copy_from_slice(&(image.len() as u32).to_le_bytes());
    transport.write_flash(offset, &header)
}

pub fn erase_stored_fpga(transport: &dyn Transport, geometry: &FlashGeometry) -> Result<()> {
    let (offset, capacity) = fpga_region(geometry)?;
    let block = geometry.erase_block_size as usize;
    transport.erase_flash(offset, capacity / block * block)
}

pub fn read_stored_fpga_size(transport: &dyn Transport, geometry: &FlashGeometry) -> Result<Option<usize>> {
    let (offset, capacity) = fpga_region(geometry)?;
    let header = transport.read_flash(offset, 8)?;
    if &header[..4] != regs::FLASH_FPGA_MAGIC {
        return Ok(None);
    }
    let len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;
    if len == 0 || len + geometry.page_size as usize > capacity {
        log::warn!("ignoring stored FPGA header with length {}", len);
        return Ok(None);
    }
    Ok(Some(len))
}

pub fn write_reset(transport: &dyn Transport) -> Result<()> {
    transport.write_register(regs::RESET, 1)
}
