//! # Packet Serialization
//!
//! Little-endian encoding of every [`Packet`] into a single datagram.
//!
//! ## Design
//!
//! - One reusable buffer per serializer; `reset` keeps the allocation
//! - Fixed records (`Pod`) are copied as raw bytes
//! - Every write is checked against [`MAX_DATAGRAM_SIZE`]
//! - Decoding is total: any byte string yields a packet or an error

use bytemuck::{bytes_of, Pod};

use super::compression::{compress_voxels, decompress_voxels};
use super::packets::{EditRequest, Packet, PacketHeader, PacketType, PositionReport, RegionPush};
use crate::error::ProtocolError;

/// Largest UDP payload over IPv4.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Largest region payload a decoder will accept (16 MiB uncompressed).
const MAX_VOXELS: usize = 1 << 24;

/// Packet serializer - writes packets into a reusable buffer.
#[derive(Debug, Default)]
pub struct PacketSerializer {
    buffer: Vec<u8>,
}

impl PacketSerializer {
    /// Creates a new serializer with an empty buffer.
    #[must_use]
    pub const fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Resets the serializer for reuse.
    #[inline]
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Returns the number of bytes written.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true if no bytes have been written.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Returns a slice of the written data.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        let size = self.buffer.len() + bytes.len();
        if size > MAX_DATAGRAM_SIZE {
            return Err(ProtocolError::Oversized {
                size,
                limit: MAX_DATAGRAM_SIZE,
            });
        }
        self.buffer.extend_from_slice(bytes);
        Ok(())
    }

    /// Writes a single byte.
    #[inline]
    pub fn write_u8(&mut self, value: u8) -> Result<(), ProtocolError> {
        self.write_bytes(&[value])
    }

    /// Writes a u32 in little-endian format.
    #[inline]
    pub fn write_u32(&mut self, value: u32) -> Result<(), ProtocolError> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Writes an i32 in little-endian format.
    #[inline]
    pub fn write_i32(&mut self, value: i32) -> Result<(), ProtocolError> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Writes an f64 in little-endian format.
    #[inline]
    pub fn write_f64(&mut self, value: f64) -> Result<(), ProtocolError> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Writes a Pod type directly.
    #[inline]
    pub fn write_pod<T: Pod>(&mut self, value: &T) -> Result<(), ProtocolError> {
        self.write_bytes(bytes_of(value))
    }

    fn begin(&mut self, packet_type: PacketType, header: &PacketHeader) -> Result<(), ProtocolError> {
        self.reset();
        self.write_u8(packet_type as u8)?;
        self.write_pod(header)
    }

    /// Serializes a position report.
    pub fn serialize_position_report(
        &mut self,
        header: &PacketHeader,
        report: &PositionReport,
    ) -> Result<(), ProtocolError> {
        self.begin(PacketType::PositionReport, header)?;
        self.write_pod(report)
    }

    /// Serializes an edit request.
    pub fn serialize_edit_request(
        &mut self,
        header: &PacketHeader,
        edit: &EditRequest,
    ) -> Result<(), ProtocolError> {
        self.begin(PacketType::EditRequest, header)?;
        self.write_pod(edit)
    }

    /// Serializes a region push, compressing its voxels.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Oversized`] if the compressed region does not
    /// fit in one datagram.
    pub fn serialize_region_push(
        &mut self,
        header: &PacketHeader,
        push: &RegionPush,
    ) -> Result<(), ProtocolError> {
        let packed = compress_voxels(&push.voxels);
        let packed_len = u32::try_from(packed.len()).map_err(|_| ProtocolError::Oversized {
            size: packed.len(),
            limit: MAX_DATAGRAM_SIZE,
        })?;

        self.begin(PacketType::RegionPush, header)?;
        self.write_i32(push.origin_x)?;
        self.write_i32(push.origin_y)?;
        self.write_i32(push.block_size)?;
        self.write_i32(push.max_height)?;
        self.write_f64(push.time_last_changed)?;
        self.write_u32(packed_len)?;
        self.write_bytes(&packed)
    }

    /// Serializes a session request.
    pub fn serialize_connect(&mut self, header: &PacketHeader) -> Result<(), ProtocolError> {
        self.begin(PacketType::Connect, header)
    }

    /// Serializes a session acceptance.
    pub fn serialize_connect_ack(
        &mut self,
        header: &PacketHeader,
        connection_id: u32,
    ) -> Result<(), ProtocolError> {
        self.begin(PacketType::ConnectAck, header)?;
        self.write_u32(connection_id)
    }

    /// Serializes a session end.
    pub fn serialize_disconnect(&mut self, header: &PacketHeader) -> Result<(), ProtocolError> {
        self.begin(PacketType::Disconnect, header)
    }

    /// Serializes any packet.
    pub fn serialize(&mut self, packet: &Packet) -> Result<(), ProtocolError> {
        match packet {
            Packet::PositionReport(h, r) => self.serialize_position_report(h, r),
            Packet::EditRequest(h, e) => self.serialize_edit_request(h, e),
            Packet::RegionPush(h, p) => self.serialize_region_push(h, p),
            Packet::Connect(h) => self.serialize_connect(h),
            Packet::ConnectAck(h, id) => self.serialize_connect_ack(h, *id),
            Packet::Disconnect(h) => self.serialize_disconnect(h),
        }
    }
}

/// Packet deserializer - reads one packet from a datagram.
#[derive(Debug)]
pub struct PacketDeserializer<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> PacketDeserializer<'a> {
    /// Creates a new deserializer from a buffer.
    #[must_use]
    pub const fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, position: 0 }
    }

    /// Returns the number of bytes remaining.
    #[inline]
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.position)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], ProtocolError> {
        let remaining = self.remaining();
        if len > remaining {
            return Err(ProtocolError::Truncated {
                offset: self.position,
                needed: len - remaining,
            });
        }
        let slice = &self.buffer[self.position..self.position + len];
        self.position += len;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], ProtocolError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Reads a single byte.
    #[inline]
    pub fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        self.take_array::<1>().map(|b| b[0])
    }

    /// Reads a u32 in little-endian format.
    #[inline]
    pub fn read_u32(&mut self) -> Result<u32, ProtocolError> {
        self.take_array().map(u32::from_le_bytes)
    }

    /// Reads an i32 in little-endian format.
    #[inline]
    pub fn read_i32(&mut self) -> Result<i32, ProtocolError> {
        self.take_array().map(i32::from_le_bytes)
    }

    /// Reads an f64 in little-endian format.
    #[inline]
    pub fn read_f64(&mut self) -> Result<f64, ProtocolError> {
        self.take_array().map(f64::from_le_bytes)
    }

    /// Reads a Pod type directly.
    #[inline]
    pub fn read_pod<T: Pod>(&mut self) -> Result<T, ProtocolError> {
        let offset = self.position;
        let slice = self.take(std::mem::size_of::<T>())?;
        bytemuck::try_pod_read_unaligned(slice).map_err(|_| ProtocolError::Truncated { offset, needed: 0 })
    }

    fn read_region_push(&mut self) -> Result<RegionPush, ProtocolError> {
        let origin_x = self.read_i32()?;
        let origin_y = self.read_i32()?;
        let block_size = self.read_i32()?;
        let max_height = self.read_i32()?;
        let time_last_changed = self.read_f64()?;

        let expected = region_volume(block_size, max_height)
            .ok_or(ProtocolError::BadDimensions { block_size, max_height })?;

        let packed_len = self.read_u32()? as usize;
        let packed = self.take(packed_len)?;
        let voxels = decompress_voxels(packed, expected)?;

        Ok(RegionPush {
            origin_x,
            origin_y,
            block_size,
            max_height,
            voxels,
            time_last_changed,
        })
    }

    /// Deserializes a packet from the buffer.
    ///
    /// # Errors
    ///
    /// Any malformed input yields a [`ProtocolError`]; this never panics.
    pub fn deserialize(&mut self) -> Result<Packet, ProtocolError> {
        let type_byte = self.read_u8()?;
        let packet_type = PacketType::from_u8(type_byte).ok_or(ProtocolError::UnknownType(type_byte))?;
        let header = self.read_pod::<PacketHeader>()?;

        let packet = match packet_type {
            PacketType::PositionReport => Packet::PositionReport(header, self.read_pod()?),
            PacketType::EditRequest => Packet::EditRequest(header, self.read_pod()?),
            PacketType::RegionPush => Packet::RegionPush(header, self.read_region_push()?),
            PacketType::Connect => Packet::Connect(header),
            PacketType::ConnectAck => Packet::ConnectAck(header, self.read_u32()?),
            PacketType::Disconnect => Packet::Disconnect(header),
        };

        match self.remaining() {
            0 => Ok(packet),
            extra => Err(ProtocolError::TrailingBytes(extra)),
        }
    }
}

/// Encodes one packet into a fresh buffer.
///
/// # Errors
///
/// Fails only when the packet exceeds [`MAX_DATAGRAM_SIZE`].
pub fn encode(packet: &Packet) -> Result<Vec<u8>, ProtocolError> {
    let mut serializer = PacketSerializer::new();
    serializer.serialize(packet)?;
    Ok(serializer.buffer)
}

/// Decodes one datagram.
///
/// # Errors
///
/// See [`PacketDeserializer::deserialize`].
pub fn decode(datagram: &[u8]) -> Result<Packet, ProtocolError> {
    PacketDeserializer::new(datagram).deserialize()
}

/// Voxel count of a region with the given wire dimensions, if plausible.
fn region_volume(block_size: i32, max_height: i32) -> Option<usize> {
    let side = usize::try_from(block_size).ok().filter(|&s| s > 0)?;
    let height = usize::try_from(max_height).ok().filter(|&h| h > 0)?;
    side.checked_mul(side)?
        .checked_mul(height)
        .filter(|&v| v <= MAX_VOXELS)
}
