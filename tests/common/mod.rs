//! In-memory device speaking real lockdown and AFC framing.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crashpull::device::{Channel, Device, DeviceResolver, ServiceBroker};
use crashpull::error::SessionError;
use crashpull::lockdown::{LockdownClient, LockdownError};
use crashpull::protocol::{attr, op, services, status, HEADER_LEN, LOCKDOWN_TYPE};
use crashpull::protocol_core::{
    build_lockdown_frame, build_packet_header, encode_string_list, parse_packet_header,
    read_u64_le, split_string_list,
};

pub const MOVER_PORT: u16 = 49001;
pub const COPY_PORT: u16 = 49002;

struct Report {
    name: String,
    data: Vec<u8>,
    attrs: Vec<(String, String)>,
}

/// The crash report directory as the copy service sees it.
#[derive(Default)]
pub struct ReportStore {
    reports: Vec<Report>,
    handles: HashMap<u64, (String, usize)>,
    next_handle: u64,
    pub fail_remove: HashSet<String>,
    pub removed: Vec<String>,
    /// Largest read the service answers in full
    pub read_cap: Option<usize>,
}

impl ReportStore {
    pub fn add(&mut self, name: &str, data: &[u8], birthtime: u64) {
        let size = data.len().to_string();
        let birth = birthtime.to_string();
        self.add_with_attrs(
            name,
            data,
            &[
                (attr::SIZE, size.as_str()),
                (attr::IFMT, "S_IFREG"),
                (attr::BIRTHTIME, birth.as_str()),
            ],
        );
    }

    pub fn add_with_attrs(&mut self, name: &str, data: &[u8], attrs: &[(&str, &str)]) {
        self.reports.push(Report {
            name: name.to_string(),
            data: data.to_vec(),
            attrs: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        });
    }

    pub fn names(&self) -> Vec<String> {
        self.reports.iter().map(|r| r.name.clone()).collect()
    }

    pub fn open_handles(&self) -> usize {
        self.handles.len()
    }

    fn find(&self, name: &str) -> Option<&Report> {
        self.reports.iter().find(|r| r.name == name)
    }
}

/// Knobs for one fake device.
#[derive(Clone)]
pub struct FakeDevice {
    pub udid: String,
    pub store: Arc<Mutex<ReportStore>>,
    /// Bytes the mover writes before going quiet
    pub mover_signal: Vec<u8>,
    /// Type reported to QueryType
    pub device_type: String,
    /// Services lockdown agrees to start
    pub services: HashMap<String, u16>,
    /// Ports connected to, in order
    pub connections: Arc<Mutex<Vec<u16>>>,
}

impl FakeDevice {
    pub fn new(udid: &str) -> Self {
        let mut services = HashMap::new();
        services.insert(services::CRASH_REPORT_MOVER.to_string(), MOVER_PORT);
        services.insert(services::CRASH_REPORT_COPY.to_string(), COPY_PORT);
        Self {
            udid: udid.to_string(),
            store: Arc::new(Mutex::new(ReportStore::default())),
            mover_signal: b"ping".to_vec(),
            device_type: LOCKDOWN_TYPE.to_string(),
            services,
            connections: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_report(self, name: &str, data: &[u8], birthtime: u64) -> Self {
        self.store.lock().unwrap().add(name, data, birthtime);
        self
    }

    pub fn connected_ports(&self) -> Vec<u16> {
        self.connections.lock().unwrap().clone()
    }
}

impl Device for FakeDevice {
    fn udid(&self) -> &str {
        &self.udid
    }

    fn lockdown(&mut self, label: &str) -> Result<Box<dyn ServiceBroker>, LockdownError> {
        let peer = LockdownPeer {
            device_type: self.device_type.clone(),
            services: self.services.clone(),
            inbound: Vec::new(),
            outbound: VecDeque::new(),
        };
        Ok(Box::new(LockdownClient::handshake(peer, label)?))
    }

    fn connect(&mut self, port: u16) -> io::Result<Box<dyn Channel>> {
        self.connections.lock().unwrap().push(port);
        match port {
            MOVER_PORT => Ok(Box::new(MoverPeer {
                pending: self.mover_signal.clone().into(),
            })),
            COPY_PORT => Ok(Box::new(AfcPeer {
                store: Arc::clone(&self.store),
                inbound: Vec::new(),
                outbound: VecDeque::new(),
                packet_num: 0,
            })),
            _ => Err(io::Error::new(io::ErrorKind::ConnectionRefused, "no listener")),
        }
    }
}

/// Resolves exactly the devices it was given, by UDID.
pub struct FakeResolver {
    pub devices: Vec<FakeDevice>,
}

impl FakeResolver {
    pub fn single(device: &FakeDevice) -> Self {
        Self {
            devices: vec![device.clone()],
        }
    }
}

impl DeviceResolver for FakeResolver {
    fn resolve(&self, target: Option<&str>) -> Result<Box<dyn Device>, SessionError> {
        let found = match target {
            Some(udid) => self.devices.iter().find(|d| d.udid == udid),
            None if self.devices.len() == 1 => self.devices.first(),
            None => None,
        };
        found
            .map(|d| Box::new(d.clone()) as Box<dyn Device>)
            .ok_or_else(|| SessionError::DeviceNotFound(target.unwrap_or("<none>").to_string()))
    }
}

struct MoverPeer {
    pending: VecDeque<u8>,
}

impl Read for MoverPeer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "mover went quiet"));
        }
        let n = buf.len().min(self.pending.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for MoverPeer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Channel for MoverPeer {
    fn set_read_timeout(&mut self, _timeout: Option<Duration>) -> io::Result<()> {
        Ok(())
    }
}

fn drain_into(outbound: &mut VecDeque<u8>, buf: &mut [u8]) -> usize {
    let n = buf.len().min(outbound.len());
    for (slot, byte) in buf.iter_mut().zip(outbound.drain(..n)) {
        *slot = byte;
    }
    n
}

struct LockdownPeer {
    device_type: String,
    services: HashMap<String, u16>,
    inbound: Vec<u8>,
    outbound: VecDeque<u8>,
}

impl LockdownPeer {
    fn answer(&self, request: &plist::Dictionary) -> plist::Dictionary {
        let mut reply = plist::Dictionary::new();
        let kind = request
            .get("Request")
            .and_then(|v| v.as_string())
            .unwrap_or_default()
            .to_string();
        reply.insert("Request".into(), plist::Value::String(kind.clone()));
        match kind.as_str() {
            "QueryType" => {
                reply.insert("Type".into(), plist::Value::String(self.device_type.clone()));
            }
            "StartService" => {
                let service = request
                    .get("Service")
                    .and_then(|v| v.as_string())
                    .unwrap_or_default();
                reply.insert("Service".into(), plist::Value::String(service.to_string()));
                match self.services.get(service) {
                    Some(port) => {
                        reply.insert("Port".into(), plist::Value::Integer((*port as u64).into()));
                    }
                    None => {
                        reply.insert("Error".into(), plist::Value::String("InvalidService".into()));
                    }
                }
            }
            _ => {
                reply.insert("Error".into(), plist::Value::String("InvalidRequest".into()));
            }
        }
        reply
    }
}

impl Read for LockdownPeer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(drain_into(&mut self.outbound, buf))
    }
}

impl Write for LockdownPeer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inbound.extend_from_slice(buf);
        while self.inbound.len() >= 4 {
            let len = u32::from_be_bytes([
                self.inbound[0],
                self.inbound[1],
                self.inbound[2],
                self.inbound[3],
            ]) as usize;
            if self.inbound.len() < 4 + len {
                break;
            }
            let frame: Vec<u8> = self.inbound.drain(..4 + len).skip(4).collect();
            let request: plist::Dictionary = plist::from_bytes(&frame)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
            let mut body = Vec::new();
            plist::to_writer_xml(&mut body, &self.answer(&request))
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
            let reply = build_lockdown_frame(&body)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
            self.outbound.extend(reply);
        }
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct AfcPeer {
    store: Arc<Mutex<ReportStore>>,
    inbound: Vec<u8>,
    outbound: VecDeque<u8>,
    packet_num: u64,
}

impl AfcPeer {
    fn reply(&mut self, operation: u64, header_data: &[u8], payload: &[u8]) {
        let header =
            build_packet_header(operation, self.packet_num, header_data.len(), payload.len());
        self.packet_num += 1;
        self.outbound.extend(header);
        self.outbound.extend(header_data.iter().copied());
        self.outbound.extend(payload.iter().copied());
    }

    fn status(&mut self, code: u64) {
        self.reply(op::STATUS, &code.to_le_bytes(), &[]);
    }

    fn handle(&mut self, operation: u64, args: &[u8]) {
        let store = Arc::clone(&self.store);
        let mut store = store.lock().unwrap();
        let path = || split_string_list(args).into_iter().next().unwrap_or_default();

        match operation {
            op::READ_DIR => {
                if path() != "." {
                    drop(store);
                    return self.status(status::OBJECT_NOT_FOUND);
                }
                let mut names = vec![".".to_string(), "..".to_string()];
                names.extend(store.names());
                drop(store);
                self.reply(op::DATA, &[], &encode_string_list(&names));
            }
            op::GET_FILE_INFO => {
                let found = store.find(&path()).map(|r| {
                    let flat: Vec<&str> = r
                        .attrs
                        .iter()
                        .flat_map(|(k, v)| [k.as_str(), v.as_str()])
                        .collect();
                    encode_string_list(&flat)
                });
                drop(store);
                match found {
                    Some(listing) => self.reply(op::DATA, &[], &listing),
                    None => self.status(status::OBJECT_NOT_FOUND),
                }
            }
            op::FILE_OPEN => {
                let name = split_string_list(&args[8..])
                    .into_iter()
                    .next()
                    .unwrap_or_default();
                if store.find(&name).is_none() {
                    drop(store);
                    return self.status(status::OBJECT_NOT_FOUND);
                }
                store.next_handle += 1;
                let handle = store.next_handle;
                store.handles.insert(handle, (name, 0));
                drop(store);
                self.reply(op::FILE_OPEN_RES, &handle.to_le_bytes(), &[]);
            }
            op::FILE_READ => {
                let handle = read_u64_le(&args[0..8]).unwrap();
                let mut len = read_u64_le(&args[8..16]).unwrap() as usize;
                if let Some(cap) = store.read_cap {
                    len = len.min(cap);
                }
                let Some((name, offset)) = store.handles.get(&handle).cloned() else {
                    drop(store);
                    return self.status(status::INVALID_ARG);
                };
                let data = &store.find(&name).unwrap().data;
                let end = (offset + len).min(data.len());
                let chunk = data[offset.min(end)..end].to_vec();
                store.handles.insert(handle, (name, end));
                drop(store);
                self.reply(op::DATA, &[], &chunk);
            }
            op::FILE_CLOSE => {
                let handle = read_u64_le(&args[0..8]).unwrap();
                let known = store.handles.remove(&handle).is_some();
                drop(store);
                self.status(if known { status::SUCCESS } else { status::INVALID_ARG });
            }
            op::REMOVE_PATH => {
                let name = path();
                let code = if store.fail_remove.contains(&name) {
                    status::PERM_DENIED
                } else {
                    store.reports.retain(|r| r.name != name);
                    store.removed.push(name);
                    status::SUCCESS
                };
                drop(store);
                self.status(code);
            }
            _ => {
                drop(store);
                self.status(status::OP_NOT_SUPPORTED);
            }
        }
    }
}

impl Read for AfcPeer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(drain_into(&mut self.outbound, buf))
    }
}

impl Write for AfcPeer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inbound.extend_from_slice(buf);
        while self.inbound.len() >= HEADER_LEN {
            let raw: [u8; HEADER_LEN] = self.inbound[..HEADER_LEN].try_into().unwrap();
            let header = parse_packet_header(&raw)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
            let total = header.entire_length as usize;
            if self.inbound.len() < total {
                break;
            }
            let packet: Vec<u8> = self.inbound.drain(..total).collect();
            self.handle(header.operation, &packet[HEADER_LEN..]);
        }
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Channel for AfcPeer {
    fn set_read_timeout(&mut self, _timeout: Option<Duration>) -> io::Result<()> {
        Ok(())
    }
}
