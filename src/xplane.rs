//! X-Plane UDP link: RREF subscriptions in, DREF writes and CMND commands out.
//!
//! X-Plane keeps no durable subscription state across aircraft reloads, so the
//! worker re-sends the whole RREF set on a keep-alive timer. Datagrams carry no
//! acknowledgement; lost values are replaced by the next cycle.

use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, info, warn};

use crate::engine::EngineEvent;
use crate::error::LinkError;

const RREF_HEADER: &[u8; 5] = b"RREF\0";
const RREF_REPLY: &[u8; 5] = b"RREF,";
const DREF_HEADER: &[u8; 5] = b"DREF\0";
const CMND_HEADER: &[u8; 5] = b"CMND\0";

const RREF_PATH_LEN: usize = 400;
const DREF_PATH_LEN: usize = 500;

/// Outbound requests the sync engine hands to the link worker.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkCmd {
    WriteDataRef(&'static str, f32),
    Command(&'static str),
    Resubscribe,
}

#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub remote: SocketAddr,
    pub local_port: u16,
    pub poll_timeout: Duration,
    pub keepalive: Duration,
}

// -----------------------------
// Wire format
// -----------------------------

fn encode_rref(freq: i32, index: i32, dataref: &str) -> Vec<u8> {
    let mut pkt = Vec::with_capacity(RREF_HEADER.len() + 8 + RREF_PATH_LEN);
    pkt.extend_from_slice(RREF_HEADER);
    pkt.extend_from_slice(&freq.to_le_bytes());
    pkt.extend_from_slice(&index.to_le_bytes());
    let name = dataref.as_bytes();
    pkt.extend_from_slice(&name[..name.len().min(RREF_PATH_LEN)]);
    pkt.resize(RREF_HEADER.len() + 8 + RREF_PATH_LEN, 0);
    pkt
}

fn encode_dref(value: f32, dataref: &str) -> Vec<u8> {
    let mut pkt = Vec::with_capacity(DREF_HEADER.len() + 4 + DREF_PATH_LEN);
    pkt.extend_from_slice(DREF_HEADER);
    pkt.extend_from_slice(&value.to_le_bytes());
    let name = dataref.as_bytes();
    pkt.extend_from_slice(&name[..name.len().min(DREF_PATH_LEN)]);
    pkt.resize(DREF_HEADER.len() + 4 + DREF_PATH_LEN, 0);
    pkt
}

fn encode_cmnd(path: &str) -> Vec<u8> {
    let mut pkt = Vec::with_capacity(CMND_HEADER.len() + path.len());
    pkt.extend_from_slice(CMND_HEADER);
    pkt.extend_from_slice(path.as_bytes());
    pkt
}

// -----------------------------
// Link
// -----------------------------

/// One UDP socket plus the subscription table that maps X-Plane's reply
/// indices back to dataref names.
pub struct XPlaneLink {
    socket: UdpSocket,
    remote: SocketAddr,
    datarefs: &'static [(&'static str, i32)],
    pub malformed: u64,
    pub unknown_index: u64,
}

impl XPlaneLink {
    pub fn open(
        local_port: u16,
        remote: SocketAddr,
        datarefs: &'static [(&'static str, i32)],
    ) -> Result<Self, LinkError> {
        let socket = UdpSocket::bind(("0.0.0.0", local_port))?;
        Ok(Self {
            socket,
            remote,
            datarefs,
            malformed: 0,
            unknown_index: 0,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, LinkError> {
        Ok(self.socket.local_addr()?)
    }

    /// (Re-)sends every RREF request. Safe to repeat; X-Plane replaces the
    /// subscription at the same index.
    pub fn subscribe_all(&self) -> Result<(), LinkError> {
        for (index, (name, freq)) in self.datarefs.iter().enumerate() {
            self.socket
                .send_to(&encode_rref(*freq, index as i32, name), self.remote)?;
        }
        Ok(())
    }

    /// Frequency zero cancels a subscription; sent once on shutdown.
    pub fn unsubscribe_all(&self) -> Result<(), LinkError> {
        for (index, (name, _)) in self.datarefs.iter().enumerate() {
            self.socket
                .send_to(&encode_rref(0, index as i32, name), self.remote)?;
        }
        Ok(())
    }

    pub fn write_dataref(&self, dataref: &str, value: f32) -> Result<(), LinkError> {
        debug!(dataref, value, "DREF write");
        self.socket
            .send_to(&encode_dref(value, dataref), self.remote)?;
        Ok(())
    }

    pub fn send_command(&self, path: &str) -> Result<(), LinkError> {
        debug!(path, "CMND");
        self.socket.send_to(&encode_cmnd(path), self.remote)?;
        Ok(())
    }

    /// Receives at most one datagram, decoded into dataref updates. A timeout
    /// yields an empty vec; a malformed datagram is counted and skipped.
    pub fn poll(&mut self, timeout: Duration) -> Result<Vec<(&'static str, f32)>, LinkError> {
        self.socket.set_read_timeout(Some(timeout))?;
        let mut buf = [0u8; 2048];
        match self.socket.recv(&mut buf) {
            Ok(n) => Ok(self.decode_reply(&buf[..n])),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn decode_reply(&mut self, datagram: &[u8]) -> Vec<(&'static str, f32)> {
        if datagram.len() < RREF_REPLY.len() || &datagram[..RREF_REPLY.len()] != RREF_REPLY {
            self.malformed += 1;
            return Vec::new();
        }
        let mut out = Vec::new();
        for rec in datagram[RREF_REPLY.len()..].chunks_exact(8) {
            let index = i32::from_le_bytes([rec[0], rec[1], rec[2], rec[3]]);
            let value = f32::from_le_bytes([rec[4], rec[5], rec[6], rec[7]]);
            match usize::try_from(index).ok().and_then(|i| self.datarefs.get(i)) {
                Some((name, _)) => out.push((*name, value)),
                None => self.unknown_index += 1,
            }
        }
        out
    }
}

// -----------------------------
// Link worker
// -----------------------------

/// Owns the receive side of the link on its own thread. Engine-bound updates
/// go out as `EngineEvent::SimData`; a socket failure tears the link down and
/// re-opens it on a backoff, reported once as `EngineEvent::SimDown`.
pub fn link_worker(
    cfg: LinkConfig,
    datarefs: &'static [(&'static str, i32)],
    engine_tx: Sender<EngineEvent>,
    rx_cmds: Receiver<LinkCmd>,
    stop: Arc<AtomicBool>,
) {
    info!(remote = %cfg.remote, "x-plane link worker started");
    let mut link: Option<XPlaneLink> = None;
    let mut last_keepalive = Instant::now();

    while !stop.load(Ordering::Relaxed) {
        if link.is_none() {
            match XPlaneLink::open(cfg.local_port, cfg.remote, datarefs) {
                Ok(l) => match l.subscribe_all() {
                    Ok(()) => {
                        info!(remote = %cfg.remote, "subscribed dataref set");
                        last_keepalive = Instant::now();
                        link = Some(l);
                    }
                    Err(e) => {
                        warn!("subscribe failed: {e}");
                        std::thread::sleep(Duration::from_secs(1));
                        continue;
                    }
                },
                Err(e) => {
                    warn!("udp bind failed: {e}");
                    std::thread::sleep(Duration::from_secs(1));
                    continue;
                }
            }
        }

        let mut failed = false;
        if let Some(l) = link.as_mut() {
            while let Ok(cmd) = rx_cmds.try_recv() {
                let sent = match cmd {
                    LinkCmd::WriteDataRef(dataref, value) => l.write_dataref(dataref, value),
                    LinkCmd::Command(path) => l.send_command(path),
                    LinkCmd::Resubscribe => l.subscribe_all(),
                };
                if let Err(e) = sent {
                    warn!("link send failed: {e}");
                    failed = true;
                    break;
                }
            }

            if !failed && last_keepalive.elapsed() >= cfg.keepalive {
                if let Err(e) = l.subscribe_all() {
                    warn!("keep-alive resubscribe failed: {e}");
                    failed = true;
                }
                last_keepalive = Instant::now();
            }

            if !failed {
                match l.poll(cfg.poll_timeout) {
                    Ok(values) => {
                        if !values.is_empty()
                            && engine_tx.send(EngineEvent::SimData(values)).is_err()
                        {
                            break; // engine gone
                        }
                    }
                    Err(e) => {
                        warn!("link receive failed: {e}");
                        failed = true;
                    }
                }
            }
        }

        if failed {
            link = None;
            if engine_tx.send(EngineEvent::SimDown).is_err() {
                break;
            }
            std::thread::sleep(Duration::from_secs(1));
        }
    }

    if let Some(l) = link {
        let _ = l.unsubscribe_all();
    }
    info!("x-plane link worker stopped");
}
