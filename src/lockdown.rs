//! Lockdown client: the device-side broker that starts named services and
//! reports the port each one listens on.
//!
//! Messages are XML property lists framed with a 4-byte big-endian length.
//! Only the two requests a retrieval run needs are implemented.

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::LOCKDOWN_TYPE;
use crate::protocol_core::{build_lockdown_frame, parse_lockdown_length, CodecError};

#[derive(Debug, Error)]
pub enum LockdownError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("malformed property list: {0}")]
    Plist(#[from] plist::Error),

    #[error("device refused {request}: {reason}")]
    Refused { request: String, reason: String },

    #[error("peer is not a lockdown service (type {0:?})")]
    NotLockdown(Option<String>),

    #[error("StartService response for {0} carried no port")]
    MissingPort(String),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Request<'a> {
    pub label: &'a str,
    pub request: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<&'a str>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Response {
    pub request: Option<String>,
    #[serde(rename = "Type")]
    pub kind: Option<String>,
    pub service: Option<String>,
    pub port: Option<u16>,
    pub error: Option<String>,
}

/// A service started by lockdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub name: String,
    pub port: u16,
}

pub struct LockdownClient<C> {
    stream: C,
    label: String,
}

impl<C: Read + Write> LockdownClient<C> {
    /// Perform the `QueryType` handshake and return a client ready to start
    /// services.
    pub fn handshake(stream: C, label: &str) -> Result<Self, LockdownError> {
        let mut client = Self {
            stream,
            label: label.to_string(),
        };
        let response = client.exchange("QueryType", None)?;
        if response.kind.as_deref() != Some(LOCKDOWN_TYPE) {
            return Err(LockdownError::NotLockdown(response.kind));
        }
        Ok(client)
    }

    pub fn start_service(&mut self, name: &str) -> Result<ServiceDescriptor, LockdownError> {
        let response = self.exchange("StartService", Some(name))?;
        let port = response
            .port
            .ok_or_else(|| LockdownError::MissingPort(name.to_string()))?;
        Ok(ServiceDescriptor {
            name: name.to_string(),
            port,
        })
    }

    fn exchange(&mut self, request: &str, service: Option<&str>) -> Result<Response, LockdownError> {
        let message = Request {
            label: &self.label,
            request,
            service,
        };
        let mut body = Vec::new();
        plist::to_writer_xml(&mut body, &message)?;
        self.stream.write_all(&build_lockdown_frame(&body)?)?;
        self.stream.flush()?;

        let mut prefix = [0u8; 4];
        self.stream.read_exact(&mut prefix)?;
        let len = parse_lockdown_length(&prefix)?;
        let mut reply = vec![0u8; len];
        self.stream.read_exact(&mut reply)?;

        let response: Response = plist::from_bytes(&reply)?;
        if let Some(reason) = response.error {
            return Err(LockdownError::Refused {
                request: request.to_string(),
                reason,
            });
        }
        Ok(response)
    }
}
