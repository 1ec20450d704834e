use log::LevelFilter;
use sdrcore::hal::boards::{regs, Bladerf1};
use sdrcore::hal::sim::{SimBackend, SimTransport};
use sdrcore::hal::{
    Backend, BackendKind, DeviceInfo, GainMode, Transport, UsbIds, Version,
};
use sdrcore::{
    Channel, ChannelSettings, DeviceManager, DeviceProfile, DeviceSelector, Error, OpenOptions,
};
use std::sync::Arc;

fn quiet() -> OpenOptions {
    OpenOptions::new().verbosity(LevelFilter::Off)
}

fn manager_with(devices: &[Arc<SimTransport>]) -> DeviceManager {
    let backend = SimBackend::new();
    for device in devices {
        backend.add(device.clone());
    }
    let mut manager = DeviceManager::new();
    manager.register_backend(Arc::new(backend));
    manager
}

struct BrokenBackend;

impl Backend for BrokenBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::LibUsb
    }

    fn probe(&self) -> sdrcore::Result<Vec<DeviceInfo>> {
        Err(Error::Io("bus enumeration failed".into()))
    }

    fn open(&self, _info: &DeviceInfo, _reset: bool) -> sdrcore::Result<Arc<dyn Transport>> {
        Err(Error::Io("bus enumeration failed".into()))
    }
}

#[test]
fn test_probe_lists_every_device() {
    let manager = manager_with(&[SimTransport::bladerf1("aaaa"), SimTransport::bladerf2("bbbb")]);
    let found = manager.probe().unwrap();
    assert_eq!(found.len(), 2);
    assert_eq!(found[0].serial, "aaaa");
    assert_eq!(found[0].instance, 0);
    assert_eq!(found[1].serial, "bbbb");
    assert_eq!(found[1].instance, 1);
    assert_eq!(found[1].backend, BackendKind::Sim);
}

#[test]
fn test_failing_backend_is_skipped() {
    let mut manager = DeviceManager::new();
    manager.register_backend(Arc::new(BrokenBackend));
    manager.register_backend(Arc::new(
        SimBackend::new().with_device(SimTransport::bladerf2("cafe")),
    ));

    assert_eq!(manager.probe().unwrap().len(), 1);
    let device = manager.open(&DeviceSelector::any(), &quiet()).unwrap();
    assert_eq!(device.serial(), "cafe");
}

#[test]
fn test_open_picks_board_from_usb_ids() {
    let manager = manager_with(&[SimTransport::bladerf1("aaaa"), SimTransport::bladerf2("bbbb")]);

    let first = manager.open(&DeviceSelector::with_serial("aa"), &quiet()).unwrap();
    assert_eq!(first.board_name(), "bladerf1");
    assert_eq!(first.channel_count(sdrcore::Direction::Rx).unwrap(), 1);
    assert_eq!(first.fpga_version().unwrap(), Version::new(0, 12, 0));

    let second = manager.open_str("sim:serial=BB", &quiet()).unwrap();
    assert_eq!(second.board_name(), "bladerf2");
    assert_eq!(second.channel_count(sdrcore::Direction::Tx).unwrap(), 2);
    assert_eq!(second.flash_geometry().size_bytes, 16 * 1024 * 1024);
}

#[test]
fn test_open_without_match() {
    let manager = manager_with(&[SimTransport::bladerf2("bbbb")]);
    assert!(matches!(
        manager.open(&DeviceSelector::with_serial("cc"), &quiet()),
        Err(Error::NoDevice(_))
    ));
    assert!(matches!(
        manager.open_str("libusb:", &quiet()),
        Err(Error::NoDevice(_))
    ));
    assert!(matches!(
        manager.open_str("sim:serial=zz", &quiet()),
        Err(Error::InvalidParameter(_))
    ));
    assert!(matches!(
        DeviceManager::new().open(&DeviceSelector::any(), &quiet()),
        Err(Error::NoDevice(_))
    ));
}

#[test]
fn test_unknown_usb_ids_release_the_transport() {
    let info = DeviceInfo {
        backend: BackendKind::Sim,
        serial: "dead".to_string(),
        usb_bus: 3,
        usb_addr: 9,
        instance: 0,
        ids: UsbIds { vendor: 0x1234, product: 0x5678 },
        manufacturer: "Acme".to_string(),
        product: "Mystery radio".to_string(),
    };
    let sim = Arc::new(SimTransport::new(info, Version::new(1, 0, 0)));
    let mut manager = manager_with(&[sim.clone()]);

    assert!(matches!(
        manager.open(&DeviceSelector::any(), &quiet()),
        Err(Error::NoDevice(_))
    ));
    assert!(!sim.is_open());

    manager.register_board("mystery", &[UsbIds { vendor: 0x1234, product: 0x5678 }], || {
        Box::new(Bladerf1::new())
    });
    let device = manager.open(&DeviceSelector::any(), &quiet()).unwrap();
    assert_eq!(device.board_name(), "bladerf1");
}

#[test]
fn test_device_cannot_be_opened_twice() {
    let manager = manager_with(&[SimTransport::bladerf2("bbbb")]);
    let device = manager.open(&DeviceSelector::any(), &quiet()).unwrap();

    assert!(matches!(
        manager.open(&DeviceSelector::any(), &quiet()),
        Err(Error::Io(_))
    ));

    device.close().unwrap();
    let reopened = manager.open(&DeviceSelector::any(), &quiet()).unwrap();
    assert!(reopened.is_open());
}

#[test]
fn test_bladerf2_requires_configured_fpga() {
    let sim = SimTransport::bladerf2("bbbb");
    sim.set_register(regs::FPGA_LOADED, 0);
    let manager = manager_with(&[sim.clone()]);

    assert!(matches!(
        manager.open(&DeviceSelector::any(), &quiet()),
        Err(Error::InvalidState(_))
    ));
    assert!(!sim.is_open());

    // A reset on open restores the power-on registers, FPGA included
    let device = manager
        .open(&DeviceSelector::any(), &quiet().reset_on_open(true))
        .unwrap();
    assert!(device.is_fpga_configured().unwrap());
}

#[test]
fn test_bladerf1_opens_without_fpga() {
    let sim = SimTransport::bladerf1("aaaa");
    sim.set_register(regs::FPGA_LOADED, 0);
    let manager = manager_with(&[sim]);

    let device = manager.open(&DeviceSelector::any(), &quiet()).unwrap();
    assert!(!device.is_fpga_configured().unwrap());
    assert!(matches!(device.fpga_version(), Err(Error::InvalidState(_))));
    assert_eq!(device.fw_version().unwrap(), Version::new(2, 4, 0));
}

#[test]
fn test_closed_device_rejects_operations() {
    let sim = SimTransport::bladerf2("bbbb");
    let manager = manager_with(&[sim.clone()]);
    let device = manager.open(&DeviceSelector::any(), &quiet()).unwrap();

    device.close().unwrap();
    assert!(!device.is_open());
    assert!(!sim.is_open());
    assert_eq!(sim.register(regs::MODULE_ENABLE), 0);

    assert!(matches!(device.close(), Err(Error::InvalidState(_))));
    assert!(matches!(
        device.get_frequency(Channel::RX0),
        Err(Error::InvalidState(_))
    ));
    assert!(matches!(
        device.enable_module(Channel::RX0, true),
        Err(Error::InvalidState(_))
    ));
    let mut samples = vec![0i16; 2048];
    assert!(matches!(
        device.sync_rx(&mut samples, 1024, None, 100),
        Err(Error::InvalidState(_))
    ));
}

#[test]
fn test_profile_applied_on_open() {
    let mut rx = ChannelSettings::new(Channel::RX0);
    rx.frequency = Some(915_000_000);
    rx.gain_mode = Some(GainMode::Manual);
    rx.gain = Some(30);
    rx.rf_port = Some("C_BALANCED".to_string());
    let mut tx = ChannelSettings::new(Channel::TX1);
    tx.frequency = Some(900_000_000);

    let profile = DeviceProfile {
        channels: vec![rx, tx],
        ..DeviceProfile::default()
    };

    let manager = manager_with(&[SimTransport::bladerf2("bbbb")]);
    let device = manager
        .open(&DeviceSelector::any(), &quiet().profile(profile))
        .unwrap();

    assert_eq!(device.get_frequency(Channel::RX0).unwrap(), 915_000_000);
    assert_eq!(device.get_gain_mode(Channel::RX0).unwrap(), GainMode::Manual);
    assert_eq!(device.get_gain(Channel::RX0).unwrap(), 30);
    assert_eq!(device.get_rf_port(Channel::RX0).unwrap(), "C_BALANCED");
    assert_eq!(device.get_frequency(Channel::TX1).unwrap(), 900_000_000);
}

#[test]
fn test_bad_profile_releases_device() {
    let mut rx = ChannelSettings::new(Channel::RX0);
    rx.frequency = Some(10_000_000);
    let profile = DeviceProfile {
        channels: vec![rx],
        ..DeviceProfile::default()
    };

    let sim = SimTransport::bladerf2("bbbb");
    let manager = manager_with(&[sim.clone()]);
    assert!(matches!(
        manager.open(&DeviceSelector::any(), &quiet().profile(profile)),
        Err(Error::Range(_))
    ));
    assert!(!sim.is_open());
    assert!(manager.open(&DeviceSelector::any(), &quiet()).is_ok());
}

#[test]
fn test_verbosity_is_per_device() {
    let manager = manager_with(&[SimTransport::bladerf1("aaaa"), SimTransport::bladerf2("bbbb")]);
    let first = manager
        .open_str("sim:instance=0", &OpenOptions::new().verbosity(LevelFilter::Debug))
        .unwrap();
    let second = manager.open_str("sim:instance=1", &quiet()).unwrap();

    assert_eq!(first.verbosity(), LevelFilter::Debug);
    assert_eq!(second.verbosity(), LevelFilter::Off);
    second.set_verbosity(LevelFilter::Trace);
    assert_eq!(second.verbosity(), LevelFilter::Trace);
    assert_eq!(first.verbosity(), LevelFilter::Debug);
}
