//! Device discovery: find the microcontroller and open a transport to it.

use std::time::{Duration, Instant};

use log::{info, warn};
use serialport::SerialPortType;

use crate::config::Config;
use crate::serial::{filter_candidates, find_devices, SerialTransport};
use crate::QbitLinkError;

/// A candidate serial device with whatever USB metadata the OS reports.
#[derive(Debug, Clone, Default)]
pub struct DiscoveredDevice {
    /// Serial port path (e.g. `/dev/ttyACM0`).
    pub port: String,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
}

/// List all candidate devices with their USB descriptors.
pub fn discover_devices() -> Vec<DiscoveredDevice> {
    let ports = serialport::available_ports().unwrap_or_default();
    let names = filter_candidates(ports.iter().map(|p| p.port_name.clone()));

    names
        .into_iter()
        .filter_map(|name| {
            let info = ports.iter().find(|p| p.port_name == name)?;
            let mut dev = DiscoveredDevice {
                port: name,
                ..Default::default()
            };
            if let SerialPortType::UsbPort(usb) = &info.port_type {
                dev.manufacturer = usb.manufacturer.clone();
                dev.product = usb.product.clone();
                dev.serial_number = usb.serial_number.clone();
            }
            Some(dev)
        })
        .collect()
}

/// Wait until a candidate device appears, scanning every `interval`.
///
/// Returns the first candidate, or [`QbitLinkError::DiscoveryTimeout`] once
/// `timeout` has elapsed.
pub fn wait_for_device(timeout: Duration, interval: Duration) -> Result<String, QbitLinkError> {
    wait_for_device_with(find_devices, timeout, interval)
}

/// [`wait_for_device`] with a custom scanner.
pub fn wait_for_device_with<F>(
    mut scan: F,
    timeout: Duration,
    interval: Duration,
) -> Result<String, QbitLinkError>
where
    F: FnMut() -> Vec<String>,
{
    let start = Instant::now();
    loop {
        if let Some(port) = scan().into_iter().next() {
            info!("Found microcontroller at {port}");
            return Ok(port);
        }

        let elapsed = start.elapsed();
        if elapsed >= timeout {
            return Err(QbitLinkError::DiscoveryTimeout(timeout));
        }
        warn!("No microcontroller found, retrying in {interval:?}");
        std::thread::sleep(interval.min(timeout - elapsed));
    }
}

/// Open the configured port, or discover one.
pub fn connect(config: &Config) -> Result<SerialTransport, QbitLinkError> {
    let port = match &config.port {
        Some(p) => p.clone(),
        None => wait_for_device(config.discovery_timeout, config.discovery_interval)?,
    };
    let transport = SerialTransport::open(&port, config.baud_rate, config.settle_delay)?;
    info!("Connected to {port} at {} baud", config.baud_rate);
    Ok(transport)
}
