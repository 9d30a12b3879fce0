// src/transport.rs
//
// Port transport abstraction and the serialport-backed implementation.
// Each open connection has exactly one inbound and one outbound handle;
// acquisition is by construction (the handles are moved to their owners)
// and release happens on drop, on every exit path.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serialport::{DataBits, FlowControl as SpFlowControl, Parity as SpParity, StopBits};
use std::io::Read;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::error::TermError;

// ============================================================================
// Types and Configuration
// ============================================================================

/// Parity setting for serial port configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    None,
    Odd,
    Even,
}

impl Default for Parity {
    fn default() -> Self {
        Parity::None
    }
}

/// Flow control setting for serial port configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowControl {
    None,
    Software,
    Hardware,
}

impl Default for FlowControl {
    fn default() -> Self {
        FlowControl::None
    }
}

/// Serial port configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PortConfig {
    pub port: String,
    pub baud_rate: u32,
    /// 7 or 8
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    /// 1 or 2
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    #[serde(default)]
    pub parity: Parity,
    #[serde(default)]
    pub flow_control: FlowControl,
}

fn default_data_bits() -> u8 {
    8
}

fn default_stop_bits() -> u8 {
    1
}

/// Information about an available serial port
#[derive(Clone, Debug, Serialize)]
pub struct PortInfo {
    pub port_name: String,
    pub port_type: String,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
}

// ============================================================================
// Conversion Functions
// ============================================================================

/// Convert our Parity enum to serialport crate's Parity type
pub(crate) fn to_serialport_parity(p: &Parity) -> SpParity {
    match p {
        Parity::None => SpParity::None,
        Parity::Odd => SpParity::Odd,
        Parity::Even => SpParity::Even,
    }
}

/// Convert data bits count to serialport crate's DataBits type
pub(crate) fn to_serialport_data_bits(bits: u8) -> DataBits {
    match bits {
        7 => DataBits::Seven,
        _ => DataBits::Eight,
    }
}

/// Convert stop bits count to serialport crate's StopBits type
pub(crate) fn to_serialport_stop_bits(bits: u8) -> StopBits {
    match bits {
        2 => StopBits::Two,
        _ => StopBits::One,
    }
}

/// Convert our FlowControl enum to serialport crate's FlowControl type
pub(crate) fn to_serialport_flow_control(f: &FlowControl) -> SpFlowControl {
    match f {
        FlowControl::None => SpFlowControl::None,
        FlowControl::Software => SpFlowControl::Software,
        FlowControl::Hardware => SpFlowControl::Hardware,
    }
}

// ============================================================================
// Transport Traits
// ============================================================================

/// Exclusive handle on the inbound byte stream.
#[async_trait]
pub trait PortReader: Send {
    /// Pull the next inbound chunk. `Ok(None)` means the stream ended.
    /// Must be cancel-safe: dropping the future loses no buffered chunk.
    async fn read_chunk(&mut self) -> Result<Option<Vec<u8>>, TermError>;
}

/// Exclusive handle on the outbound byte stream.
#[async_trait]
pub trait PortWriter: Send {
    async fn write_all(&mut self, bytes: &[u8]) -> Result<(), TermError>;
}

/// A byte-stream port. Opening yields the single-owner inbound and outbound
/// handles; dropping them closes the respective direction.
#[async_trait]
pub trait PortTransport: Send + Sync {
    async fn open(
        &self,
        config: &PortConfig,
    ) -> Result<(Box<dyn PortReader>, Box<dyn PortWriter>), TermError>;
}

// ============================================================================
// Serial Implementation
// ============================================================================

/// `PortTransport` backed by a physical serial port (serialport crate).
pub struct SerialTransport;

#[async_trait]
impl PortTransport for SerialTransport {
    async fn open(
        &self,
        config: &PortConfig,
    ) -> Result<(Box<dyn PortReader>, Box<dyn PortWriter>), TermError> {
        // Short read timeout keeps the poll loop responsive to cancellation.
        let port = serialport::new(&config.port, config.baud_rate)
            .data_bits(to_serialport_data_bits(config.data_bits))
            .stop_bits(to_serialport_stop_bits(config.stop_bits))
            .parity(to_serialport_parity(&config.parity))
            .flow_control(to_serialport_flow_control(&config.flow_control))
            .timeout(Duration::from_millis(10))
            .open()
            .map_err(|e| TermError::TransportOpen(format!("{}: {}", config.port, e)))?;

        tlog!(
            "[serial] Opened {} at {} baud ({}-{}-{})",
            config.port,
            config.baud_rate,
            config.data_bits,
            match config.parity {
                Parity::None => 'N',
                Parity::Odd => 'O',
                Parity::Even => 'E',
            },
            config.stop_bits
        );

        // Shared between the blocking read thread and the writer
        let port = Arc::new(Mutex::new(port));
        let stop_flag = Arc::new(AtomicBool::new(false));
        let (chunk_tx, chunk_rx) = mpsc::channel::<Result<Vec<u8>, TermError>>(32);

        {
            let port = port.clone();
            let stop_flag = stop_flag.clone();
            let port_name = config.port.clone();
            std::thread::spawn(move || {
                let mut buf = [0u8; 256];
                loop {
                    if stop_flag.load(Ordering::Relaxed) {
                        break;
                    }
                    let read_result = match port.lock() {
                        Ok(mut guard) => guard.read(&mut buf),
                        Err(e) => {
                            let _ = chunk_tx.blocking_send(Err(TermError::TransportRead(
                                format!("Port mutex poisoned: {}", e),
                            )));
                            break;
                        }
                    };
                    match read_result {
                        Ok(n) if n > 0 => {
                            if chunk_tx.blocking_send(Ok(buf[..n].to_vec())).is_err() {
                                // Reader handle dropped
                                break;
                            }
                        }
                        Ok(_) => {
                            // EOF - port closed/disconnected
                            tlog!("[serial] {} disconnected", port_name);
                            break;
                        }
                        Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => {
                            // Timeout is expected for serial reads
                        }
                        Err(e) => {
                            let _ = chunk_tx
                                .blocking_send(Err(TermError::TransportRead(e.to_string())));
                            break;
                        }
                    }
                }
                // chunk_tx drops here, which ends the inbound stream
            });
        }

        let reader = SerialReader {
            rx: chunk_rx,
            stop_flag,
        };
        let writer = SerialWriter { port };
        Ok((Box::new(reader), Box::new(writer)))
    }
}

struct SerialReader {
    rx: mpsc::Receiver<Result<Vec<u8>, TermError>>,
    stop_flag: Arc<AtomicBool>,
}

#[async_trait]
impl PortReader for SerialReader {
    async fn read_chunk(&mut self) -> Result<Option<Vec<u8>>, TermError> {
        match self.rx.recv().await {
            Some(Ok(chunk)) => Ok(Some(chunk)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}

impl Drop for SerialReader {
    fn drop(&mut self) {
        // Stops the blocking read thread, which closes the port
        self.stop_flag.store(true, Ordering::Relaxed);
    }
}

struct SerialWriter {
    port: Arc<Mutex<Box<dyn serialport::SerialPort>>>,
}

#[async_trait]
impl PortWriter for SerialWriter {
    async fn write_all(&mut self, bytes: &[u8]) -> Result<(), TermError> {
        // serialport writes are blocking; run them off the async runtime
        let port = self.port.clone();
        let bytes = bytes.to_vec();
        tokio::task::spawn_blocking(move || {
            let mut guard = port
                .lock()
                .map_err(|e| TermError::TransportWrite(format!("Port mutex poisoned: {}", e)))?;
            guard
                .write_all(&bytes)
                .and_then(|_| guard.flush())
                .map_err(|e| TermError::TransportWrite(e.to_string()))
        })
        .await
        .map_err(|e| TermError::TransportWrite(format!("Write task failed: {}", e)))?
    }
}

// ============================================================================
// Port Enumeration
// ============================================================================

/// List available serial ports.
///
/// On macOS, filters out /dev/tty.* devices and only shows /dev/cu.* devices.
/// The cu (calling unit) devices are non-blocking and preferred for outgoing
/// connections; the tty devices block on open waiting for carrier detect.
pub fn list_ports() -> Result<Vec<PortInfo>, TermError> {
    let ports = serialport::available_ports()
        .map_err(|e| TermError::TransportOpen(format!("Failed to enumerate ports: {}", e)))?;

    Ok(ports
        .into_iter()
        .filter(|_p| {
            #[cfg(target_os = "macos")]
            {
                !_p.port_name.starts_with("/dev/tty.")
            }
            #[cfg(not(target_os = "macos"))]
            {
                true
            }
        })
        .map(|p| {
            let (port_type, manufacturer, product, serial_number, vid, pid) = match p.port_type {
                serialport::SerialPortType::UsbPort(info) => (
                    "USB".to_string(),
                    info.manufacturer,
                    info.product,
                    info.serial_number,
                    Some(info.vid),
                    Some(info.pid),
                ),
                serialport::SerialPortType::BluetoothPort => {
                    ("Bluetooth".to_string(), None, None, None, None, None)
                }
                serialport::SerialPortType::PciPort => {
                    ("PCI".to_string(), None, None, None, None, None)
                }
                serialport::SerialPortType::Unknown => {
                    ("Unknown".to_string(), None, None, None, None, None)
                }
            };
            PortInfo {
                port_name: p.port_name,
                port_type,
                manufacturer,
                product,
                serial_number,
                vid,
                pid,
            }
        })
        .collect())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parity_default() {
        assert_eq!(Parity::default(), Parity::None);
    }

    #[test]
    fn test_to_serialport_parity() {
        assert!(matches!(to_serialport_parity(&Parity::None), SpParity::None));
        assert!(matches!(to_serialport_parity(&Parity::Odd), SpParity::Odd));
        assert!(matches!(to_serialport_parity(&Parity::Even), SpParity::Even));
    }

    #[test]
    fn test_to_serialport_data_bits() {
        assert!(matches!(to_serialport_data_bits(7), DataBits::Seven));
        assert!(matches!(to_serialport_data_bits(8), DataBits::Eight));
        assert!(matches!(to_serialport_data_bits(9), DataBits::Eight)); // default
    }

    #[test]
    fn test_to_serialport_stop_bits() {
        assert!(matches!(to_serialport_stop_bits(1), StopBits::One));
        assert!(matches!(to_serialport_stop_bits(2), StopBits::Two));
        assert!(matches!(to_serialport_stop_bits(0), StopBits::One)); // default
    }

    #[test]
    fn test_port_config_defaults() {
        let json = r#"{"port":"/dev/ttyUSB0","baud_rate":115200}"#;
        let config: PortConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.data_bits, 8);
        assert_eq!(config.stop_bits, 1);
        assert_eq!(config.parity, Parity::None);
        assert_eq!(config.flow_control, FlowControl::None);
    }
}
