use log::LevelFilter;
use sdrcore::hal::boards::regs;
use sdrcore::hal::sim::{SimBackend, SimTransport};
use sdrcore::hal::{
    Correction, GainMode, Loopback, Range, RxMux, TriggerRole, TriggerSignal, TuningMode,
};
use sdrcore::{
    Channel, ChannelLayout, Device, DeviceManager, DeviceSelector, Direction, Error, OpenOptions,
    RationalRate, SampleFormat, StreamConfig, StreamState,
};
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

fn open(sim: Arc<SimTransport>) -> Device {
    let mut manager = DeviceManager::new();
    manager.register_backend(Arc::new(SimBackend::new().with_device(sim)));
    manager
        .open(&DeviceSelector::any(), &OpenOptions::new().verbosity(LevelFilter::Off))
        .unwrap()
}

#[test]
fn test_bladerf1_defaults() {
    let device = open(SimTransport::bladerf1("aaaa"));
    assert_eq!(device.get_frequency(Channel::RX0).unwrap(), 2_400_000_000);
    assert_eq!(device.get_sample_rate(Channel::RX0).unwrap(), 1_000_000);
    assert_eq!(device.get_bandwidth(Channel::TX0).unwrap(), 1_500_000);
    assert_eq!(device.get_gain(Channel::RX0).unwrap(), 5);
    assert_eq!(device.get_gain_mode(Channel::RX0).unwrap(), GainMode::Default);
    assert_eq!(device.get_rf_port(Channel::RX0).unwrap(), "lna2");
    assert_eq!(device.get_loopback().unwrap(), Loopback::None);
    assert_eq!(device.get_rx_mux().unwrap(), RxMux::Baseband);
}

#[test]
fn test_bladerf1_gain_is_spread_over_stages() {
    let device = open(SimTransport::bladerf1("aaaa"));
    assert_eq!(device.gain_range(Channel::RX0).unwrap(), Range::new(5, 66, 1));
    assert_eq!(
        device.gain_stages(Channel::RX0).unwrap(),
        vec!["lna", "rxvga2", "rxvga1"]
    );

    device.set_gain(Channel::RX0, 20).unwrap();
    assert_eq!(device.get_gain_stage(Channel::RX0, "lna").unwrap(), 6);
    assert_eq!(device.get_gain_stage(Channel::RX0, "rxvga2").unwrap(), 9);
    assert_eq!(device.get_gain_stage(Channel::RX0, "rxvga1").unwrap(), 5);
    assert_eq!(device.get_gain(Channel::RX0).unwrap(), 20);

    device.set_gain_stage(Channel::RX0, "RXVGA1", 12).unwrap();
    assert_eq!(device.get_gain(Channel::RX0).unwrap(), 27);

    assert!(matches!(device.set_gain(Channel::RX0, 70), Err(Error::Range(_))));
    assert!(matches!(
        device.set_gain_stage(Channel::RX0, "rxvga1", 31),
        Err(Error::Range(_))
    ));
    assert!(matches!(
        device.set_gain_stage(Channel::RX0, "mixer", 3),
        Err(Error::InvalidParameter(_))
    ));
}

#[test]
fn test_bladerf1_bandwidth_snaps_to_filter() {
    let device = open(SimTransport::bladerf1("aaaa"));
    assert_eq!(device.set_bandwidth(Channel::RX0, 2_000_000).unwrap(), 2_500_000);
    assert_eq!(device.get_bandwidth(Channel::RX0).unwrap(), 2_500_000);
    assert_eq!(device.set_bandwidth(Channel::RX0, 28_000_000).unwrap(), 28_000_000);
    assert!(matches!(
        device.set_bandwidth(Channel::RX0, 30_000_000),
        Err(Error::Range(_))
    ));
    assert!(matches!(
        device.set_sample_rate(Channel::RX0, 100_000),
        Err(Error::Range(_))
    ));
}

#[test]
fn test_bladerf1_has_one_channel_per_direction() {
    let device = open(SimTransport::bladerf1("aaaa"));
    assert!(matches!(
        device.set_frequency(Channel::RX1, 900_000_000),
        Err(Error::InvalidParameter(_))
    ));
    assert!(matches!(
        device.enable_module(Channel::TX1, true),
        Err(Error::InvalidParameter(_))
    ));
    assert!(matches!(
        device.sync_config(ChannelLayout::RxX2, SampleFormat::Sc16Q11, 4, 1024, 2, 1000),
        Err(Error::Unsupported(_))
    ));
}

#[test]
fn test_bladerf2_quantizes_rate_and_bandwidth() {
    let device = open(SimTransport::bladerf2("bbbb"));
    assert_eq!(device.get_sample_rate(Channel::RX0).unwrap(), 30_720_000);

    let actual = device.set_sample_rate(Channel::RX1, 1_000_000).unwrap();
    assert!(actual.abs_diff(1_000_000) < 40);
    assert_eq!(device.get_sample_rate(Channel::RX1).unwrap(), actual);

    assert_eq!(device.set_bandwidth(Channel::TX0, 1_500_500).unwrap(), 1_501_000);
    assert!(matches!(
        device.set_sample_rate(Channel::TX0, 100_000_000),
        Err(Error::Range(_))
    ));
}

#[test]
fn test_bladerf2_rational_sample_rate() {
    let device = open(SimTransport::bladerf2("bbbb"));
    let actual = device
        .set_rational_sample_rate(Channel::RX0, RationalRate::new(1_000_000, 1, 3))
        .unwrap();
    assert_eq!(actual, RationalRate::new(1_000_012, 53, 256));
    assert_eq!(device.get_rational_sample_rate(Channel::RX0).unwrap(), actual);
    assert_eq!(device.get_sample_rate(Channel::RX0).unwrap(), 1_000_012);

    // An achievable rate is applied exactly
    assert_eq!(device.set_rational_sample_rate(Channel::RX0, actual).unwrap(), actual);

    assert!(matches!(
        device.set_rational_sample_rate(Channel::TX0, RationalRate::new(61_440_000, 1, 2)),
        Err(Error::Range(_))
    ));
    assert!(matches!(
        device.set_rational_sample_rate(Channel::TX0, RationalRate::new(1_000_000, 1, 0)),
        Err(Error::InvalidParameter(_))
    ));
}

#[test]
fn test_bladerf1_rational_rate_rounds_to_whole() {
    let device = open(SimTransport::bladerf1("aaaa"));
    let actual = device
        .set_rational_sample_rate(Channel::TX0, RationalRate::new(2_000_000, 5, 8))
        .unwrap();
    assert_eq!(actual, RationalRate::whole(2_000_001));
    assert_eq!(device.get_sample_rate(Channel::TX0).unwrap(), 2_000_001);
    assert_eq!(
        device.get_rational_sample_rate(Channel::TX0).unwrap(),
        RationalRate::whole(2_000_001)
    );
}

#[test]
fn test_gain_modes_by_board() {
    let first = open(SimTransport::bladerf1("aaaa"));
    assert!(matches!(
        first.set_gain_mode(Channel::RX0, GainMode::FastAttack),
        Err(Error::Unsupported(_))
    ));
    assert!(matches!(
        first.get_gain_mode(Channel::TX0),
        Err(Error::Unsupported(_))
    ));

    let second = open(SimTransport::bladerf2("bbbb"));
    second.set_gain_mode(Channel::RX1, GainMode::SlowAttack).unwrap();
    assert_eq!(second.get_gain_mode(Channel::RX1).unwrap(), GainMode::SlowAttack);
    assert_eq!(second.gain_modes(Channel::RX0).unwrap().len(), 5);
    assert!(second.gain_modes(Channel::TX0).unwrap().is_empty());
}

#[test]
fn test_loopback_support_by_board() {
    let first = open(SimTransport::bladerf1("aaaa"));
    first.set_loopback(Loopback::Lna1).unwrap();
    assert_eq!(first.get_loopback().unwrap(), Loopback::Lna1);
    assert!(matches!(
        first.set_loopback(Loopback::RficBist),
        Err(Error::Unsupported(_))
    ));

    let second = open(SimTransport::bladerf2("bbbb"));
    assert!(second.is_loopback_supported(Loopback::RficBist).unwrap());
    assert!(!second.is_loopback_supported(Loopback::Lna1).unwrap());
    assert_eq!(second.loopback_modes().unwrap().len(), 3);
}

#[test]
fn test_rf_port_follows_band() {
    let device = open(SimTransport::bladerf2("bbbb"));
    device.set_frequency(Channel::RX0, 900_000_000).unwrap();
    assert_eq!(device.get_rf_port(Channel::RX0).unwrap(), "B_BALANCED");

    device.select_band(Channel::RX0, 4_000_000_000).unwrap();
    assert_eq!(device.get_rf_port(Channel::RX0).unwrap(), "A_BALANCED");
    assert_eq!(device.get_frequency(Channel::RX0).unwrap(), 900_000_000);

    device.set_rf_port(Channel::TX0, "txa").unwrap();
    assert_eq!(device.get_rf_port(Channel::TX0).unwrap(), "TXA");
    assert!(matches!(
        device.set_rf_port(Channel::TX0, "A_BALANCED"),
        Err(Error::InvalidParameter(_))
    ));
    assert_eq!(device.rf_ports(Channel::RX1).unwrap().len(), 3);
}

#[test]
fn test_frequency_ranges_are_enforced() {
    let device = open(SimTransport::bladerf2("bbbb"));
    assert!(matches!(
        device.set_frequency(Channel::RX0, 50_000_000),
        Err(Error::Range(_))
    ));
    device.set_frequency(Channel::TX0, 50_000_000).unwrap();
    assert_eq!(
        device.frequency_range(Channel::RX1).unwrap(),
        Range::new(70_000_000, 6_000_000_000, 1)
    );
}

#[test]
fn test_tuning_mode() {
    let first = open(SimTransport::bladerf1("aaaa"));
    first.set_tuning_mode(TuningMode::Fpga).unwrap();
    assert_eq!(first.get_tuning_mode().unwrap(), TuningMode::Fpga);

    let second = open(SimTransport::bladerf2("bbbb"));
    assert!(matches!(
        second.set_tuning_mode(TuningMode::Fpga),
        Err(Error::Unsupported(_))
    ));
    second.set_tuning_mode(TuningMode::Host).unwrap();
}

#[test]
fn test_corrections_round_trip_signed_values() {
    let device = open(SimTransport::bladerf1("aaaa"));
    device.set_correction(Channel::RX0, Correction::DcOffsetI, -50).unwrap();
    device.set_correction(Channel::RX0, Correction::Phase, 4096).unwrap();
    assert_eq!(device.get_correction(Channel::RX0, Correction::DcOffsetI).unwrap(), -50);
    assert_eq!(device.get_correction(Channel::RX0, Correction::Phase).unwrap(), 4096);
    assert_eq!(device.get_correction(Channel::RX0, Correction::Gain).unwrap(), 0);
    assert!(matches!(
        device.set_correction(Channel::RX0, Correction::DcOffsetQ, 3000),
        Err(Error::Range(_))
    ));
}

#[test]
fn test_trigger_master_fires() {
    let sim = SimTransport::bladerf2("bbbb");
    let device = open(sim.clone());

    let mut trigger = device.trigger_init(Channel::TX0, TriggerSignal::J51_1).unwrap();
    assert_eq!(trigger.role, TriggerRole::Disabled);
    assert!(matches!(
        device.trigger_arm(&trigger, true),
        Err(Error::InvalidParameter(_))
    ));

    trigger.role = TriggerRole::Master;
    assert!(matches!(device.trigger_fire(&trigger), Err(Error::InvalidState(_))));

    device.trigger_arm(&trigger, true).unwrap();
    let state = device.trigger_state(&trigger).unwrap();
    assert!(state.is_armed);
    assert!(!state.has_fired);

    device.trigger_fire(&trigger).unwrap();
    let state = device.trigger_state(&trigger).unwrap();
    assert!(state.fire_requested);
    assert!(state.has_fired);
    assert_eq!(sim.register(regs::TRIGGER_RX), 0);

    device.trigger_arm(&trigger, false).unwrap();
    assert!(!device.trigger_state(&trigger).unwrap().is_armed);
}

#[test]
fn test_trigger_slave_cannot_fire() {
    let device = open(SimTransport::bladerf2("bbbb"));
    assert!(matches!(
        device.trigger_init(Channel::RX1, TriggerSignal::J51_1),
        Err(Error::InvalidParameter(_))
    ));

    let mut trigger = device.trigger_init(Channel::RX0, TriggerSignal::MiniExp1).unwrap();
    trigger.role = TriggerRole::Slave;
    device.trigger_arm(&trigger, true).unwrap();
    assert!(matches!(
        device.trigger_fire(&trigger),
        Err(Error::InvalidParameter(_))
    ));
    assert!(!device.trigger_state(&trigger).unwrap().has_fired);
}

#[test]
fn test_load_fpga_from_file() {
    let sim = SimTransport::bladerf1("aaaa");
    sim.set_register(regs::FPGA_LOADED, 0);
    let device = open(sim);
    assert!(!device.is_fpga_configured().unwrap());

    let mut wrong = NamedTempFile::new().unwrap();
    wrong.write_all(&[0u8; 1024]).unwrap();
    assert!(matches!(
        device.load_fpga(wrong.path()),
        Err(Error::InvalidParameter(_))
    ));

    let mut image = NamedTempFile::new().unwrap();
    image.write_all(&vec![0xa5u8; 1_191_788]).unwrap();
    device.load_fpga(image.path()).unwrap();
    assert!(device.is_fpga_configured().unwrap());

    assert!(matches!(
        device.load_fpga("/nonexistent/hostedx40.rbf"),
        Err(Error::NoFile(_))
    ));
}

#[test]
fn test_stream_config_validation() {
    let sim = SimTransport::bladerf2("bbbb");
    let device = open(sim.clone());
    let invalid = [
        StreamConfig::new(ChannelLayout::RxX1).with_buffers(4, 1000),
        StreamConfig::new(ChannelLayout::RxX1).with_buffers(0, 1024),
        StreamConfig::new(ChannelLayout::RxX1)
            .with_buffers(4, 1024)
            .with_transfers(8),
        StreamConfig::new(ChannelLayout::TxX1).with_timeout(0),
    ];
    for config in invalid {
        assert!(matches!(
            device.apply_stream_config(config),
            Err(Error::InvalidParameter(_))
        ));
    }
    assert!(matches!(
        device.apply_stream_config(StreamConfig::new(ChannelLayout::RxX4)),
        Err(Error::Unsupported(_))
    ));
    assert!(device.stream_config(Direction::Rx).is_none());

    device
        .apply_stream_config(StreamConfig::new(ChannelLayout::RxX2).with_format(SampleFormat::Sc16Q11Meta))
        .unwrap();
    assert_eq!(device.get_stream_timeout(Direction::Rx).unwrap(), 3500);
    device.set_stream_timeout(Direction::Rx, 250).unwrap();
    assert_eq!(device.get_stream_timeout(Direction::Rx).unwrap(), 250);
    assert!(matches!(
        device.get_stream_timeout(Direction::Tx),
        Err(Error::InvalidState(_))
    ));
    assert_eq!(sim.register(regs::TIMESTAMP_CTRL), regs::framing_bit(Direction::Rx));
}

#[test]
fn test_reset_restores_power_on_registers() {
    let sim = SimTransport::bladerf2("bbbb");
    let device = open(sim.clone());
    device.set_rx_mux(RxMux::Counter12Bit).unwrap();
    assert_eq!(sim.register(regs::RX_MUX), RxMux::Counter12Bit.code());

    device.device_reset().unwrap();
    assert_eq!(sim.register(regs::RX_MUX), 0);
    assert!(device.is_fpga_configured().unwrap());
}

#[test]
fn test_failed_framing_write_leaves_stream_unconfigured() {
    let sim = SimTransport::bladerf2("bbbb");
    let device = open(sim.clone());
    sim.fail_register_writes(Some(regs::TIMESTAMP_CTRL));

    let meta = StreamConfig::new(ChannelLayout::RxX1).with_format(SampleFormat::Sc16Q11Meta);
    assert!(matches!(device.apply_stream_config(meta.clone()), Err(Error::Io(_))));
    assert_eq!(device.stream_state(Direction::Rx), StreamState::Unconfigured);
    assert!(device.stream_config(Direction::Rx).is_none());

    sim.fail_register_writes(None);
    device.apply_stream_config(meta).unwrap();
    assert_eq!(sim.register(regs::TIMESTAMP_CTRL), regs::framing_bit(Direction::Rx));
}

#[test]
fn test_failed_config_restores_framing() {
    let sim = SimTransport::bladerf2("bbbb");
    let device = open(sim.clone());
    device
        .sync_config(ChannelLayout::RxX1, SampleFormat::Sc16Q11, 4, 1024, 2, 1000)
        .unwrap();

    // Too large to allocate, after the framing bit has been written
    assert!(matches!(
        device.sync_config(ChannelLayout::RxX1, SampleFormat::Sc16Q11Meta, 1, 1 << 50, 1, 1000),
        Err(Error::OutOfMemory(_))
    ));
    assert_eq!(sim.register(regs::TIMESTAMP_CTRL), 0);
    let config = device.stream_config(Direction::Rx).unwrap();
    assert_eq!(config.format, SampleFormat::Sc16Q11);
    assert_eq!(device.stream_state(Direction::Rx), StreamState::Configured);
}

#[test]
fn test_reset_completes_when_a_step_fails() {
    let sim = SimTransport::bladerf2("bbbb");
    let device = open(sim.clone());
    device
        .sync_config(ChannelLayout::RxX1, SampleFormat::Sc16Q11, 4, 1024, 2, 1000)
        .unwrap();
    device.enable_module(Channel::RX0, true).unwrap();
    device.schedule_retune(Channel::RX0, 1 << 40, 915_000_000, None).unwrap();

    sim.fail_register_writes(Some(regs::RESET));
    assert!(matches!(device.device_reset(), Err(Error::Io(_))));
    assert_eq!(device.stream_state(Direction::Rx), StreamState::Disabled);
    assert_eq!(device.pending_retunes(Channel::RX0).unwrap(), 0);

    sim.fail_register_writes(None);
    device.device_reset().unwrap();
    device.enable_module(Channel::RX0, true).unwrap();
    let mut samples = vec![0i16; 2048];
    device.sync_rx(&mut samples, 1024, None, 1000).unwrap();
}
