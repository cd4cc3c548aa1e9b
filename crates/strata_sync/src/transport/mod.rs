//! # Transport Layer
//!
//! Hand-off points between the coordinator and the wire.
//!
//! ## Design
//!
//! - [`RegionSink`] is the only thing the server coordinator knows about
//!   delivery; `Ok` means "handed to the transport", never "delivered"
//! - [`ChannelSink`] feeds an in-process queue (tests, embedding, a
//!   dedicated I/O thread)
//! - [`UdpTransport`] / [`UdpSink`] put packets on a non-blocking UDP socket

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;

use crate::error::SendError;
use crate::protocol::{Packet, PacketHeader, PacketSerializer, RegionPush, MAX_DATAGRAM_SIZE};
use crate::server::{ConnectionId, ConnectionRegistry};

/// Destination for region pushes.
pub trait RegionSink: Send + Sync {
    /// Hands a push for one connection to the transport.
    ///
    /// # Errors
    ///
    /// Any error means the push did not leave; the caller must not record
    /// it as sent.
    fn send_region(&self, to: ConnectionId, push: &RegionPush) -> Result<(), SendError>;
}

/// A push queued for a connection.
#[derive(Clone, Debug, PartialEq)]
pub struct OutboundPush {
    /// Target connection.
    pub to: ConnectionId,
    /// The region copy.
    pub push: RegionPush,
}

/// In-process sink over a bounded channel.
#[derive(Clone, Debug)]
pub struct ChannelSink {
    tx: Sender<OutboundPush>,
}

impl ChannelSink {
    /// Creates a sink and the receiver that drains it.
    #[must_use]
    pub fn bounded(capacity: usize) -> (Self, Receiver<OutboundPush>) {
        let (tx, rx) = bounded(capacity);
        (Self { tx }, rx)
    }
}

impl RegionSink for ChannelSink {
    fn send_region(&self, to: ConnectionId, push: &RegionPush) -> Result<(), SendError> {
        self.tx
            .try_send(OutboundPush {
                to,
                push: push.clone(),
            })
            .map_err(|e| match e {
                TrySendError::Full(_) => SendError::QueueFull,
                TrySendError::Disconnected(_) => SendError::Disconnected(to.0),
            })
    }
}

/// Transport statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransportStats {
    /// Packets sent.
    pub packets_sent: u64,
    /// Packets received.
    pub packets_received: u64,
    /// Bytes sent.
    pub bytes_sent: u64,
    /// Bytes received.
    pub bytes_received: u64,
    /// Send errors.
    pub send_errors: u64,
    /// Receive errors.
    pub recv_errors: u64,
}

/// Non-blocking UDP socket with packet counters.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    local_addr: SocketAddr,
    recv_buffer: Box<[u8]>,
    stats: TransportStats,
}

impl UdpTransport {
    /// Creates a new transport bound to the specified address.
    ///
    /// # Errors
    ///
    /// Fails if the socket cannot be bound or made non-blocking.
    pub fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;
        let local_addr = socket.local_addr()?;

        Ok(Self {
            socket,
            local_addr,
            recv_buffer: vec![0u8; MAX_DATAGRAM_SIZE].into_boxed_slice(),
            stats: TransportStats::default(),
        })
    }

    /// Returns the local address.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Sends a datagram to the specified address.
    ///
    /// # Errors
    ///
    /// Propagates socket errors, including `WouldBlock`.
    pub fn send_to(&mut self, data: &[u8], addr: SocketAddr) -> io::Result<usize> {
        match self.socket.send_to(data, addr) {
            Ok(n) => {
                self.stats.packets_sent += 1;
                self.stats.bytes_sent += n as u64;
                Ok(n)
            }
            Err(e) => {
                self.stats.send_errors += 1;
                Err(e)
            }
        }
    }

    /// Encodes and sends one packet.
    ///
    /// # Errors
    ///
    /// Fails if the packet cannot be encoded or the socket refuses it.
    pub fn send_packet(&mut self, packet: &Packet, addr: SocketAddr) -> Result<usize, SendError> {
        let bytes = crate::protocol::encode(packet)?;
        self.send_to(&bytes, addr).map_err(|e| SendError::Io(e.to_string()))
    }

    /// Receives a datagram, or `None` if nothing is waiting.
    pub fn recv(&mut self) -> Option<(&[u8], SocketAddr)> {
        match self.socket.recv_from(&mut self.recv_buffer) {
            Ok((len, addr)) => {
                self.stats.packets_received += 1;
                self.stats.bytes_received += len as u64;
                Some((&self.recv_buffer[..len], addr))
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => None,
            Err(e) => {
                self.stats.recv_errors += 1;
                tracing::debug!(error = %e, "recv failed");
                None
            }
        }
    }

    /// Creates a sink that sends region pushes from a clone of this socket.
    ///
    /// # Errors
    ///
    /// Fails if the socket cannot be cloned.
    pub fn sink(&self, registry: Arc<ConnectionRegistry>) -> io::Result<UdpSink> {
        Ok(UdpSink {
            socket: self.socket.try_clone()?,
            registry,
            serializer: Mutex::new(PacketSerializer::new()),
            sent: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        })
    }

    /// Returns statistics.
    #[must_use]
    pub const fn stats(&self) -> &TransportStats {
        &self.stats
    }

    /// Resets statistics.
    pub fn reset_stats(&mut self) {
        self.stats = TransportStats::default();
    }
}

/// Sends region pushes to the registered address of each connection.
#[derive(Debug)]
pub struct UdpSink {
    socket: UdpSocket,
    registry: Arc<ConnectionRegistry>,
    serializer: Mutex<PacketSerializer>,
    sent: AtomicU64,
    errors: AtomicU64,
}

impl UdpSink {
    /// Pushes handed to the socket.
    #[must_use]
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Pushes that failed to encode or send.
    #[must_use]
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    fn try_send(&self, to: ConnectionId, push: &RegionPush) -> Result<(), SendError> {
        let addr = self
            .registry
            .addr_of(to)
            .ok_or(SendError::UnknownConnection(to.0))?;
        let header = PacketHeader::new(self.registry.next_sequence(to).unwrap_or(0));

        let mut serializer = self.serializer.lock();
        serializer.serialize_region_push(&header, push)?;
        self.socket
            .send_to(serializer.as_slice(), addr)
            .map_err(|e| SendError::Io(e.to_string()))?;
        Ok(())
    }
}

impl RegionSink for UdpSink {
    fn send_region(&self, to: ConnectionId, push: &RegionPush) -> Result<(), SendError> {
        let result = self.try_send(to, push);
        match &result {
            Ok(()) => self.sent.fetch_add(1, Ordering::Relaxed),
            Err(_) => self.errors.fetch_add(1, Ordering::Relaxed),
        };
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::decode;
    use std::time::{Duration, Instant};

    fn push(stamp: f64) -> RegionPush {
        RegionPush {
            origin_x: 10,
            origin_y: 0,
            block_size: 2,
            max_height: 2,
            voxels: vec![1, 0, 0, 0, 1, 0, 0, 0],
            time_last_changed: stamp,
        }
    }

    #[test]
    fn test_channel_sink_delivers_in_order() {
        let (sink, rx) = ChannelSink::bounded(4);
        sink.send_region(ConnectionId(1), &push(2.0)).unwrap();
        sink.send_region(ConnectionId(2), &push(3.0)).unwrap();

        let first = rx.try_recv().unwrap();
        assert_eq!(first.to, ConnectionId(1));
        assert_eq!(first.push, push(2.0));
        assert_eq!(rx.try_recv().unwrap().to, ConnectionId(2));
    }

    #[test]
    fn test_channel_sink_full_and_closed() {
        let (sink, rx) = ChannelSink::bounded(1);
        sink.send_region(ConnectionId(1), &push(2.0)).unwrap();
        assert_eq!(
            sink.send_region(ConnectionId(1), &push(3.0)),
            Err(SendError::QueueFull)
        );

        drop(rx);
        assert_eq!(
            sink.send_region(ConnectionId(7), &push(3.0)),
            Err(SendError::Disconnected(7))
        );
    }

    fn recv_blocking(transport: &mut UdpTransport) -> Option<(Vec<u8>, SocketAddr)> {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if let Some((data, from)) = transport.recv() {
                return Some((data.to_vec(), from));
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        None
    }

    #[test]
    fn test_udp_sink_over_loopback() {
        let server = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let mut client = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).unwrap();

        let registry = Arc::new(ConnectionRegistry::new(4));
        let id = registry.register(client.local_addr()).unwrap();
        let sink = server.sink(Arc::clone(&registry)).unwrap();

        sink.send_region(id, &push(5.0)).unwrap();
        assert_eq!(sink.sent(), 1);

        let (bytes, from) = recv_blocking(&mut client).expect("datagram over loopback");
        assert_eq!(from, server.local_addr());
        match decode(&bytes).unwrap() {
            Packet::RegionPush(_, received) => assert_eq!(received, push(5.0)),
            other => panic!("expected RegionPush, got {other:?}"),
        }
        assert_eq!(client.stats().packets_received, 1);
    }

    #[test]
    fn test_udp_sink_unknown_connection() {
        let server = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let sink = server.sink(Arc::new(ConnectionRegistry::new(4))).unwrap();
        assert_eq!(
            sink.send_region(ConnectionId(3), &push(1.0)),
            Err(SendError::UnknownConnection(3))
        );
        assert_eq!(sink.errors(), 1);
    }
}
