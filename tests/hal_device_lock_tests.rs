use log::LevelFilter;
use sdrcore::hal::boards::regs;
use sdrcore::hal::sim::{SimBackend, SimTransport};
use sdrcore::{
    Channel, ChannelLayout, Device, DeviceManager, DeviceSelector, Direction, Error, OpenOptions,
    SampleFormat,
};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn open_sim() -> (Arc<Device>, Arc<SimTransport>) {
    let sim = SimTransport::bladerf2("f00d");
    let mut manager = DeviceManager::new();
    manager.register_backend(Arc::new(SimBackend::new().with_device(sim.clone())));
    let device = manager
        .open(&DeviceSelector::any(), &OpenOptions::new().verbosity(LevelFilter::Off))
        .unwrap();
    (Arc::new(device), sim)
}

fn tuning_block(channel: Channel) -> [u16; 4] {
    [
        regs::channel(channel, regs::NINT),
        regs::channel(channel, regs::NFRAC),
        regs::channel(channel, regs::BAND),
        regs::channel(channel, regs::RF_PORT),
    ]
}

#[test]
fn test_concurrent_tuning_is_not_interleaved() {
    let (device, sim) = open_sim();
    sim.clear_write_log();

    let handles: Vec<_> = [Channel::RX0, Channel::RX1]
        .into_iter()
        .map(|channel| {
            let device = device.clone();
            thread::spawn(move || {
                for round in 0..50u64 {
                    let frequency = 900_000_000 + (round % 4) * 9_375_000;
                    device.set_frequency(channel, frequency).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let log = sim.write_log();
    assert_eq!(log.len(), 2 * 50 * 4);

    let rx0 = tuning_block(Channel::RX0);
    let rx1 = tuning_block(Channel::RX1);
    for group in log.chunks(4) {
        let addrs: Vec<u16> = group.iter().map(|(addr, _)| *addr).collect();
        assert!(
            addrs == rx0 || addrs == rx1,
            "register writes interleaved: {:?}",
            addrs
        );
    }
}

#[test]
fn test_commands_proceed_while_rx_blocks() {
    let (device, sim) = open_sim();
    sim.set_stalled(Direction::Rx, true);
    device
        .sync_config(ChannelLayout::RxX1, SampleFormat::Sc16Q11, 4, 1024, 2, 1000)
        .unwrap();
    device.enable_module(Channel::RX0, true).unwrap();

    let reader = {
        let device = device.clone();
        thread::spawn(move || {
            let mut samples = vec![0i16; 2048];
            device.sync_rx(&mut samples, 1024, None, 1500)
        })
    };

    thread::sleep(Duration::from_millis(100));
    let started = Instant::now();
    device.set_frequency(Channel::RX0, 915_000_000).unwrap();
    assert_eq!(device.get_frequency(Channel::RX0).unwrap(), 915_000_000);
    assert!(device.get_timestamp(Direction::Rx).is_ok());
    assert!(started.elapsed() < Duration::from_millis(500));

    assert!(matches!(reader.join().unwrap(), Err(Error::Timeout(_))));
    sim.set_stalled(Direction::Rx, false);
}

#[test]
fn test_stream_commands_proceed_while_rx_blocks() {
    let (device, sim) = open_sim();
    sim.set_stalled(Direction::Rx, true);
    device
        .sync_config(ChannelLayout::RxX1, SampleFormat::Sc16Q11, 4, 1024, 2, 1000)
        .unwrap();
    device.enable_module(Channel::RX0, true).unwrap();

    let reader = {
        let device = device.clone();
        thread::spawn(move || {
            let mut samples = vec![0i16; 2048];
            let started = Instant::now();
            let result = device.sync_rx(&mut samples, 1024, None, 3000);
            (result, started.elapsed())
        })
    };

    thread::sleep(Duration::from_millis(100));
    let started = Instant::now();
    assert_eq!(device.get_stream_timeout(Direction::Rx).unwrap(), 1000);
    device.set_stream_timeout(Direction::Rx, 800).unwrap();
    device.enable_module(Channel::RX1, true).unwrap();
    assert!(device.get_frequency(Channel::RX0).is_ok());
    assert!(started.elapsed() < Duration::from_millis(500));

    // Disabling the direction stops the stream and ends the blocked call
    device.enable_module(Channel::RX1, false).unwrap();
    device.enable_module(Channel::RX0, false).unwrap();
    let (result, waited) = reader.join().unwrap();
    assert!(matches!(result, Err(Error::InvalidState(_))));
    assert!(waited < Duration::from_millis(2000));
    sim.set_stalled(Direction::Rx, false);

    // The pool is whole again for the next session
    device.enable_module(Channel::RX0, true).unwrap();
    let mut samples = vec![0i16; 2048];
    for _ in 0..6 {
        device.sync_rx(&mut samples, 1024, None, 1000).unwrap();
    }
}

#[test]
fn test_rx_and_tx_stream_independently() {
    let (device, sim) = open_sim();
    sim.set_stalled(Direction::Tx, true);
    device
        .sync_config(ChannelLayout::TxX1, SampleFormat::Sc16Q11, 2, 1024, 1, 1000)
        .unwrap();
    device
        .sync_config(ChannelLayout::RxX1, SampleFormat::Sc16Q11, 4, 1024, 2, 1000)
        .unwrap();
    device.enable_module(Channel::TX0, true).unwrap();
    device.enable_module(Channel::RX0, true).unwrap();

    let writer = {
        let device = device.clone();
        thread::spawn(move || {
            let block = vec![0i16; 2048];
            let mut result = Ok(());
            for _ in 0..3 {
                result = device.sync_tx(&block, 1024, None, 1000);
                if result.is_err() {
                    break;
                }
            }
            result
        })
    };

    let mut samples = vec![0i16; 2048];
    for _ in 0..8 {
        device.sync_rx(&mut samples, 1024, None, 1000).unwrap();
    }

    assert!(matches!(writer.join().unwrap(), Err(Error::Timeout(_))));
    sim.set_stalled(Direction::Tx, false);
}
