use log::LevelFilter;
use sdrcore::hal::boards::{bladerf1, bladerf2, Bladerf1};
use sdrcore::hal::sim::{SimBackend, SimTransport};
use sdrcore::hal::{BackendKind, BoardRegistry};
use sdrcore::{DeviceManager, DeviceSelector, Error, OpenOptions};
use std::sync::Arc;

fn quiet() -> OpenOptions {
    OpenOptions::new().verbosity(LevelFilter::Off)
}

fn two_device_backend() -> Arc<SimBackend> {
    Arc::new(
        SimBackend::new()
            .with_device(SimTransport::bladerf1("a1a1"))
            .with_device(SimTransport::bladerf2("b2b2")),
    )
}

#[test]
fn test_registry_register_and_list() {
    let mut registry = BoardRegistry::new();

    // Initially empty
    assert!(registry.list_boards().is_empty());

    registry.register(bladerf1::NAME, bladerf1::USB_IDS, || Box::new(Bladerf1::new()));
    assert_eq!(registry.list_boards(), vec!["bladerf1"]);
    assert!(registry.find(bladerf2::USB_IDS[0]).is_none());
}

#[test]
fn test_probe_lists_every_instance() {
    let mut manager = DeviceManager::new();
    manager.register_backend(two_device_backend());

    let devices = manager.probe().unwrap();
    assert_eq!(devices.len(), 2);
    assert_eq!(devices[0].instance, 0);
    assert_eq!(devices[1].instance, 1);
    assert!(devices.iter().all(|info| info.backend == BackendKind::Sim));
}

#[test]
fn test_open_by_identifier_string() {
    let mut manager = DeviceManager::new();
    manager.register_backend(two_device_backend());

    let device = manager.open_str("sim:serial=B2", &quiet()).unwrap();
    assert_eq!(device.serial(), "b2b2");
    assert_eq!(device.board_name(), bladerf2::NAME);

    let device = manager.open_str("*", &quiet()).unwrap();
    assert_eq!(device.serial(), "a1a1");
    assert_eq!(device.board_name(), bladerf1::NAME);

    assert!(matches!(
        manager.open_str("libusb:", &quiet()),
        Err(Error::NoDevice(_))
    ));
    assert!(matches!(
        manager.open_str("sim:color=red", &quiet()),
        Err(Error::InvalidParameter(_))
    ));
}

#[test]
fn test_open_without_board_drivers() {
    let backend = Arc::new(SimBackend::new().with_device(SimTransport::bladerf2("c3c3")));
    let mut manager = DeviceManager::with_boards(BoardRegistry::new());
    manager.register_backend(backend.clone());

    assert!(matches!(
        manager.open(&DeviceSelector::any(), &quiet()),
        Err(Error::NoDevice(_))
    ));

    // The failed open released the device
    let mut manager = DeviceManager::new();
    manager.register_backend(backend);
    manager.open(&DeviceSelector::any(), &quiet()).unwrap();
}
