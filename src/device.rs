//! Device access: the byte channels services run over, the lockdown broker,
//! and how a target identifier is resolved to one device.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::lockdown::{LockdownClient, LockdownError, ServiceDescriptor};
use crate::protocol::{timeouts, LOCKDOWN_PORT};

/// A connected, bidirectional byte stream to one device service.
pub trait Channel: Read + Write + Send {
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()>;
}

impl Channel for TcpStream {
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        TcpStream::set_read_timeout(self, timeout)
    }
}

/// Starts named services on the device.
pub trait ServiceBroker: Send {
    fn start_service(&mut self, name: &str) -> Result<ServiceDescriptor, LockdownError>;
}

impl<C: Read + Write + Send> ServiceBroker for LockdownClient<C> {
    fn start_service(&mut self, name: &str) -> Result<ServiceDescriptor, LockdownError> {
        LockdownClient::start_service(self, name)
    }
}

/// One device the run talks to.
pub trait Device: Send {
    fn udid(&self) -> &str;

    /// Connect to the lockdown broker and complete the client handshake.
    fn lockdown(&mut self, label: &str) -> Result<Box<dyn ServiceBroker>, LockdownError>;

    /// Open a channel to a service port advertised by the broker.
    fn connect(&mut self, port: u16) -> io::Result<Box<dyn Channel>>;
}

/// Resolves a target identifier (or none) to exactly one device.
pub trait DeviceResolver {
    fn resolve(&self, target: Option<&str>) -> Result<Box<dyn Device>, SessionError>;
}

/// A device reachable over TCP.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEntry {
    pub udid: String,
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lockdown_port: Option<u16>,
}

/// Pick the device for `target` from a table.
///
/// With a target, the entry whose UDID matches exactly. Without one, the
/// table must hold exactly one device: an empty table and a table with
/// several devices are both `DeviceNotFound`.
pub fn pick_device<'a>(
    devices: &'a [DeviceEntry],
    target: Option<&str>,
) -> Result<&'a DeviceEntry, SessionError> {
    match target {
        Some(udid) => devices
            .iter()
            .find(|d| d.udid == udid)
            .ok_or_else(|| SessionError::DeviceNotFound(format!("no device with UDID {udid}"))),
        None => match devices {
            [] => Err(SessionError::DeviceNotFound(
                "no devices configured".to_string(),
            )),
            [only] => Ok(only),
            many => Err(SessionError::DeviceNotFound(format!(
                "{} devices configured and none selected; pass -u <udid>",
                many.len()
            ))),
        },
    }
}

/// Resolver over a fixed device table.
pub struct StaticResolver {
    pub devices: Vec<DeviceEntry>,
    pub default_lockdown_port: u16,
    pub connect_timeout: Duration,
}

impl StaticResolver {
    pub fn new(devices: Vec<DeviceEntry>) -> Self {
        Self {
            devices,
            default_lockdown_port: LOCKDOWN_PORT,
            connect_timeout: Duration::from_millis(timeouts::CONNECT_MS),
        }
    }
}

impl DeviceResolver for StaticResolver {
    fn resolve(&self, target: Option<&str>) -> Result<Box<dyn Device>, SessionError> {
        let entry = pick_device(&self.devices, target)?;
        Ok(Box::new(TcpDevice {
            udid: entry.udid.clone(),
            host: entry.host.clone(),
            lockdown_port: entry.lockdown_port.unwrap_or(self.default_lockdown_port),
            connect_timeout: self.connect_timeout,
        }))
    }
}

pub struct TcpDevice {
    udid: String,
    host: String,
    lockdown_port: u16,
    connect_timeout: Duration,
}

impl TcpDevice {
    fn open(&self, port: u16) -> io::Result<TcpStream> {
        let stream = connect_tcp(&self.host, port, self.connect_timeout)?;
        stream.set_nodelay(true).ok();
        let io_timeout = Some(Duration::from_millis(timeouts::IO_MS));
        stream.set_read_timeout(io_timeout)?;
        stream.set_write_timeout(io_timeout)?;
        Ok(stream)
    }
}

impl Device for TcpDevice {
    fn udid(&self) -> &str {
        &self.udid
    }

    fn lockdown(&mut self, label: &str) -> Result<Box<dyn ServiceBroker>, LockdownError> {
        let stream = self.open(self.lockdown_port)?;
        Ok(Box::new(LockdownClient::handshake(stream, label)?))
    }

    fn connect(&mut self, port: u16) -> io::Result<Box<dyn Channel>> {
        Ok(Box::new(self.open(port)?))
    }
}

/// Try every address `host` resolves to, in order.
fn connect_tcp(host: &str, port: u16, timeout: Duration) -> io::Result<TcpStream> {
    let addrs: Vec<SocketAddr> = (host, port).to_socket_addrs()?.collect();
    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(s) => return Ok(s),
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("{host} did not resolve to any address"),
        )
    }))
}
