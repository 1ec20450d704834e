use super::Device;
use crate::engine::scheduler::RetuneRequest;
use crate::error::Result;
use crate::hal::trigger::{Trigger, TriggerSignal, TriggerState};
use crate::hal::types::{
    Channel, Correction, Direction, GainMode, Loopback, QuickTune, Range, RationalRate, RxMux,
    TuningMode,
};

impl Device {
    pub fn channel_count(&self, direction: Direction) -> Result<usize> {
        self.command("channel_count", |s| Ok(s.board.channel_count(direction)))
    }

    pub fn set_frequency(&self, channel: Channel, frequency: u64) -> Result<()> {
        self.command("set_frequency", |s| {
            s.check_channel(channel)?;
            s.board.set_frequency(s.transport, channel, frequency)
        })
    }

    pub fn get_frequency(&self, channel: Channel) -> Result<u64> {
        self.command("get_frequency", |s| {
            s.check_channel(channel)?;
            s.board.get_frequency(s.transport, channel)
        })
    }

    pub fn frequency_range(&self, channel: Channel) -> Result<Range> {
        self.command("frequency_range", |s| {
            s.check_channel(channel)?;
            Ok(s.board.frequency_range(channel))
        })
    }

    /// Switch band and RF port ahead of a retune to `frequency`
    pub fn select_band(&self, channel: Channel, frequency: u64) -> Result<()> {
        self.command("select_band", |s| {
            s.check_channel(channel)?;
            s.board.select_band(s.transport, channel, frequency)
        })
    }

    /// Returns the rate actually applied
    pub fn set_sample_rate(&self, channel: Channel, rate: u32) -> Result<u32> {
        self.command("set_sample_rate", |s| {
            s.check_channel(channel)?;
            s.board.set_sample_rate(s.transport, channel, rate)
        })
    }

    pub fn get_sample_rate(&self, channel: Channel) -> Result<u32> {
        self.command("get_sample_rate", |s| {
            s.check_channel(channel)?;
            s.board.get_sample_rate(s.transport, channel)
        })
    }

    /// Returns the exact rate applied, which may differ from `rate` by less
    /// than one step of the board's rate divider
    pub fn set_rational_sample_rate(&self, channel: Channel, rate: RationalRate)
        -> Result<RationalRate> {
        self.command("set_rational_sample_rate", |s| {
            s.check_channel(channel)?;
            s.board.set_rational_sample_rate(s.transport, channel, rate)
        })
    }

    pub fn get_rational_sample_rate(&self, channel: Channel) -> Result<RationalRate> {
        self.command("get_rational_sample_rate", |s| {
            s.check_channel(channel)?;
            s.board.get_rational_sample_rate(s.transport, channel)
        })
    }

    pub fn sample_rate_range(&self, channel: Channel) -> Result<Range> {
        self.command("sample_rate_range", |s| {
            s.check_channel(channel)?;
            Ok(s.board.sample_rate_range(channel))
        })
    }

    /// Returns the bandwidth actually applied
    pub fn set_bandwidth(&self, channel: Channel, bandwidth: u32) -> Result<u32> {
        self.command("set_bandwidth", |s| {
            s.check_channel(channel)?;
            s.board.set_bandwidth(s.transport, channel, bandwidth)
        })
    }

    pub fn get_bandwidth(&self, channel: Channel) -> Result<u32> {
        self.command("get_bandwidth", |s| {
            s.check_channel(channel)?;
            s.board.get_bandwidth(s.transport, channel)
        })
    }

    pub fn bandwidth_range(&self, channel: Channel) -> Result<Range> {
        self.command("bandwidth_range", |s| {
            s.check_channel(channel)?;
            Ok(s.board.bandwidth_range(channel))
        })
    }

    /// Overall gain, distributed across the channel's stages
    pub fn set_gain(&self, channel: Channel, gain: i32) -> Result<()> {
        self.command("set_gain", |s| {
            s.check_channel(channel)?;
            s.board.set_gain(s.transport, channel, gain)
        })
    }

    pub fn get_gain(&self, channel: Channel) -> Result<i32> {
        self.command("get_gain", |s| {
            s.check_channel(channel)?;
            s.board.get_gain(s.transport, channel)
        })
    }

    pub fn gain_range(&self, channel: Channel) -> Result<Range> {
        self.command("gain_range", |s| {
            s.check_channel(channel)?;
            Ok(s.board.gain_range(channel))
        })
    }

    pub fn gain_stages(&self, channel: Channel) -> Result<Vec<&'static str>> {
        self.command("gain_stages", |s| {
            s.check_channel(channel)?;
            Ok(s.board.gain_stages(channel).iter().map(|stage| stage.name).collect())
        })
    }

    pub fn gain_stage_range(&self, channel: Channel, stage: &str) -> Result<Range> {
        self.command("gain_stage_range", |s| {
            s.check_channel(channel)?;
            s.board.gain_stage_range(channel, stage)
        })
    }

    pub fn set_gain_stage(&self, channel: Channel, stage: &str, gain: i32) -> Result<()> {
        self.command("set_gain_stage", |s| {
            s.check_channel(channel)?;
            s.board.set_gain_stage(s.transport, channel, stage, gain)
        })
    }

    pub fn get_gain_stage(&self, channel: Channel, stage: &str) -> Result<i32> {
        self.command("get_gain_stage", |s| {
            s.check_channel(channel)?;
            s.board.get_gain_stage(s.transport, channel, stage)
        })
    }

    pub fn set_gain_mode(&self, channel: Channel, mode: GainMode) -> Result<()> {
        self.command("set_gain_mode", |s| {
            s.check_channel(channel)?;
            s.board.set_gain_mode(s.transport, channel, mode)
        })
    }

    pub fn get_gain_mode(&self, channel: Channel) -> Result<GainMode> {
        self.command("get_gain_mode", |s| {
            s.check_channel(channel)?;
            s.board.get_gain_mode(s.transport, channel)
        })
    }

    pub fn gain_modes(&self, channel: Channel) -> Result<Vec<GainMode>> {
        self.command("gain_modes", |s| {
            s.check_channel(channel)?;
            Ok(s.board.gain_modes(channel).to_vec())
        })
    }

    pub fn set_rf_port(&self, channel: Channel, port: &str) -> Result<()> {
        self.command("set_rf_port", |s| {
            s.check_channel(channel)?;
            s.board.set_rf_port(s.transport, channel, port)
        })
    }

    pub fn get_rf_port(&self, channel: Channel) -> Result<&'static str> {
        self.command("get_rf_port", |s| {
            s.check_channel(channel)?;
            s.board.get_rf_port(s.transport, channel)
        })
    }

    pub fn rf_ports(&self, channel: Channel) -> Result<Vec<&'static str>> {
        self.command("rf_ports", |s| {
            s.check_channel(channel)?;
            Ok(s.board.rf_ports(channel).to_vec())
        })
    }

    pub fn set_loopback(&self, mode: Loopback) -> Result<()> {
        self.command("set_loopback", |s| s.board.set_loopback(s.transport, mode))
    }

    pub fn get_loopback(&self) -> Result<Loopback> {
        self.command("get_loopback", |s| s.board.get_loopback(s.transport))
    }

    pub fn loopback_modes(&self) -> Result<Vec<Loopback>> {
        self.command("loopback_modes", |s| Ok(s.board.loopback_modes().to_vec()))
    }

    pub fn is_loopback_supported(&self, mode: Loopback) -> Result<bool> {
        self.command("is_loopback_supported", |s| Ok(s.board.is_loopback_supported(mode)))
    }

    pub fn set_rx_mux(&self, mux: RxMux) -> Result<()> {
        self.command("set_rx_mux", |s| s.board.set_rx_mux(s.transport, mux))
    }

    pub fn get_rx_mux(&self) -> Result<RxMux> {
        self.command("get_rx_mux", |s| s.board.get_rx_mux(s.transport))
    }

    pub fn set_tuning_mode(&self, mode: TuningMode) -> Result<()> {
        self.command("set_tuning_mode", |s| s.board.set_tuning_mode(s.transport, mode))
    }

    pub fn get_tuning_mode(&self) -> Result<TuningMode> {
        self.command("get_tuning_mode", |s| s.board.get_tuning_mode(s.transport))
    }

    pub fn set_correction(&self, channel: Channel, correction: Correction, value: i16) -> Result<()> {
        self.command("set_correction", |s| {
            s.check_channel(channel)?;
            s.board.set_correction(s.transport, channel, correction, value)
        })
    }

    pub fn get_correction(&self, channel: Channel, correction: Correction) -> Result<i16> {
        self.command("get_correction", |s| {
            s.check_channel(channel)?;
            s.board.get_correction(s.transport, channel, correction)
        })
    }

    /// Current hardware sample counter. Applies any retunes that have become
    /// due.
    pub fn get_timestamp(&self, direction: Direction) -> Result<u64> {
        self.command("get_timestamp", |s| {
            s.service_retunes()?;
            s.transport.read_timestamp(direction)
        })
    }

    /// Queue a retune of `channel` for when its direction's clock reaches
    /// `timestamp`. With `quick_tune` the captured synthesizer words are
    /// applied instead of computing them from `frequency`.
    pub fn schedule_retune(
        &self,
        channel: Channel,
        timestamp: u64,
        frequency: u64,
        quick_tune: Option<QuickTune>,
    ) -> Result<()> {
        self.command("schedule_retune", |s| {
            s.check_channel(channel)?;
            s.board
                .frequency_range(channel)
                .check("frequency", frequency as i64)?;
            s.service_retunes()?;
            let now = s.transport.read_timestamp(channel.direction)?;
            s.retunes.schedule(
                RetuneRequest {
                    channel,
                    timestamp,
                    frequency,
                    quick_tune,
                },
                now,
            )
        })
    }

    /// Apply due retunes now; returns how many were applied
    pub fn service_retunes(&self) -> Result<usize> {
        self.command("service_retunes", |s| s.service_retunes())
    }

    /// Drop every pending retune of `channel`; returns how many were dropped
    pub fn cancel_scheduled_retunes(&self, channel: Channel) -> Result<usize> {
        self.command("cancel_scheduled_retunes", |s| {
            s.check_channel(channel)?;
            Ok(s.retunes.cancel(channel))
        })
    }

    pub fn pending_retunes(&self, channel: Channel) -> Result<usize> {
        self.command("pending_retunes", |s| Ok(s.retunes.pending(channel)))
    }

    /// Capture the current tuning of `channel` for later `schedule_retune`
    pub fn get_quick_tune(&self, channel: Channel) -> Result<QuickTune> {
        self.command("get_quick_tune", |s| {
            s.check_channel(channel)?;
            s.board.get_quick_tune(s.transport, channel)
        })
    }

    pub fn trigger_init(&self, channel: Channel, signal: TriggerSignal) -> Result<Trigger> {
        self.command("trigger_init", |s| {
            s.check_channel(channel)?;
            s.board.trigger_init(channel, signal)
        })
    }

    pub fn trigger_arm(&self, trigger: &Trigger, arm: bool) -> Result<()> {
        self.command("trigger_arm", |s| s.board.trigger_arm(s.transport, trigger, arm))
    }

    pub fn trigger_fire(&self, trigger: &Trigger) -> Result<()> {
        self.command("trigger_fire", |s| s.board.trigger_fire(s.transport, trigger))
    }

    pub fn trigger_state(&self, trigger: &Trigger) -> Result<TriggerState> {
        self.command("trigger_state", |s| s.board.trigger_state(s.transport, trigger))
    }
}
