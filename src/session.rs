//! Session bring-up: lockdown handshake, crash report mover, then the copy
//! service the rest of the run talks AFC to.

use std::io::ErrorKind;
use std::time::{Duration, Instant};

use crate::afc::AfcClient;
use crate::device::{Channel, Device, DeviceResolver, ServiceBroker};
use crate::error::SessionError;
use crate::lockdown::ServiceDescriptor;
use crate::protocol::{services, timeouts};

/// Length of the mover's completion signal.
pub const LIVENESS_LEN: usize = 4;

#[derive(Clone, Debug)]
pub struct SessionOptions {
    /// Client label sent with every lockdown request
    pub label: String,
    pub mover_service: String,
    pub copy_service: String,
    /// How long to wait for the mover to signal completion
    pub mover_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            label: env!("CARGO_PKG_NAME").to_string(),
            mover_service: services::CRASH_REPORT_MOVER.to_string(),
            copy_service: services::CRASH_REPORT_COPY.to_string(),
            mover_timeout: Duration::from_millis(timeouts::MOVER_MS),
        }
    }
}

/// An established session with the copy service bound.
pub struct Session {
    udid: String,
    // Kept open for the lifetime of the session
    _device: Box<dyn Device>,
    _broker: Box<dyn ServiceBroker>,
    copy_service: ServiceDescriptor,
    files: AfcClient<Box<dyn Channel>>,
}

impl Session {
    /// Bring up a session with the device `target` resolves to.
    ///
    /// Every step must succeed; nothing is retried and no partial session is
    /// returned.
    pub fn establish(
        resolver: &dyn DeviceResolver,
        target: Option<&str>,
        options: &SessionOptions,
    ) -> Result<Self, SessionError> {
        let mut device = resolver.resolve(target)?;

        let mut broker = device
            .lockdown(&options.label)
            .map_err(|e| SessionError::HandshakeFailed(e.to_string()))?;

        // The mover consolidates reports into the copy directory and writes a
        // short signal once it is done. The channel is not reused.
        let mover = start(&mut *broker, &options.mover_service)?;
        let mut mover_channel = connect(&mut *device, &mover)?;
        let waited = wait_for_liveness(&mut *mover_channel, LIVENESS_LEN, options.mover_timeout);
        drop(mover_channel);
        waited?;

        let copy_service = start(&mut *broker, &options.copy_service)?;
        let channel = connect(&mut *device, &copy_service)?;

        Ok(Self {
            udid: device.udid().to_string(),
            _device: device,
            _broker: broker,
            copy_service,
            files: AfcClient::new(channel),
        })
    }

    pub fn udid(&self) -> &str {
        &self.udid
    }

    pub fn copy_service(&self) -> &ServiceDescriptor {
        &self.copy_service
    }

    /// The AFC client bound to the copy service.
    pub fn files(&mut self) -> &mut AfcClient<Box<dyn Channel>> {
        &mut self.files
    }
}

fn start(broker: &mut dyn ServiceBroker, name: &str) -> Result<ServiceDescriptor, SessionError> {
    broker
        .start_service(name)
        .map_err(|e| SessionError::ServiceUnavailable {
            service: name.to_string(),
            reason: e.to_string(),
        })
}

fn connect(
    device: &mut dyn Device,
    service: &ServiceDescriptor,
) -> Result<Box<dyn Channel>, SessionError> {
    device
        .connect(service.port)
        .map_err(|e| SessionError::ServiceUnavailable {
            service: service.name.clone(),
            reason: format!("connect to port {} failed: {e}", service.port),
        })
}

/// Block until `expected` bytes arrive on `channel` or `timeout` elapses.
///
/// Anything short of the full signal (a timeout, the peer closing early, a
/// partial read) is `MoverTimeout`.
pub fn wait_for_liveness(
    channel: &mut dyn Channel,
    expected: usize,
    timeout: Duration,
) -> Result<(), SessionError> {
    // No deadline when `timeout` runs past what the clock can represent
    let deadline = Instant::now().checked_add(timeout);
    let mut buf = vec![0u8; expected];
    let mut received = 0;

    while received < expected {
        let remaining = match deadline {
            Some(deadline) => deadline.saturating_duration_since(Instant::now()),
            None => timeout,
        };
        if remaining.is_zero() {
            break;
        }
        channel.set_read_timeout(Some(remaining))?;
        match channel.read(&mut buf[received..]) {
            Ok(0) => break,
            Ok(n) => received += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => break,
            Err(e) => return Err(SessionError::Transport(e)),
        }
    }

    if received < expected {
        return Err(SessionError::MoverTimeout {
            expected,
            received,
            timeout,
        });
    }
    Ok(())
}
