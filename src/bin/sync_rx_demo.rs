use anyhow::{Context, Result};
use sdrcore::hal::sim::{SimBackend, SimTransport};
use sdrcore::hal::RxMux;
use sdrcore::{Channel, ChannelLayout, DeviceManager, Direction, Metadata, OpenOptions, SampleFormat};
use std::sync::Arc;

const NUM_SAMPLES: usize = 4096;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("sdrcore - synchronous RX demo");
    println!("=============================\n");

    let mut manager = DeviceManager::new();
    manager.register_backend(Arc::new(
        SimBackend::new().with_device(SimTransport::bladerf2("f00dcafe")),
    ));

    for info in manager.probe()? {
        println!("found {}", info);
    }

    let device = manager
        .open_str("sim:serial=f00d", &OpenOptions::new())
        .context("opening simulated device")?;
    println!(
        "\n{} fw {} fpga {}",
        device.board_name(),
        device.fw_version()?,
        device.fpga_version()?
    );

    device.set_frequency(Channel::RX0, 915_000_000)?;
    let rate = device.set_sample_rate(Channel::RX0, 1_000_000)?;
    let bandwidth = device.set_bandwidth(Channel::RX0, 1_500_000)?;
    println!(
        "RX0 at {} Hz, {} S/s, {} Hz bandwidth",
        device.get_frequency(Channel::RX0)?,
        rate,
        bandwidth
    );

    device.set_rx_mux(RxMux::Counter32Bit)?;
    device.sync_config(ChannelLayout::RxX1, SampleFormat::Sc16Q11Meta, 16, 8192, 8, 3500)?;
    device.enable_module(Channel::RX0, true)?;

    let mut samples = vec![0i16; NUM_SAMPLES * 2];
    let mut metadata = Metadata::rx_now();
    for block in 0..4 {
        device.sync_rx(&mut samples, NUM_SAMPLES, Some(&mut metadata), 1000)?;
        println!(
            "block {}: {} samples at t={} (first I/Q {} {}){}",
            block,
            metadata.actual_count,
            metadata.timestamp,
            samples[0],
            samples[1],
            if metadata.status.overrun { " overrun" } else { "" }
        );
        metadata = Metadata::rx_now();
    }

    device.enable_module(Channel::RX0, false)?;
    let stats = device.stream_metrics(Direction::Rx);
    println!("\n{}", serde_json::to_string_pretty(&stats)?);

    device.close()?;
    Ok(())
}
