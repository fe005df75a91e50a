//! Binary framing for the tablet-copy RPC protocol.
//!
//! Every message is a frame: a fixed 24-byte big-endian header followed by
//! the payload.
//!
//! ```text
//! magic:4 | version:1 | flags:1 | opcode:2 | request_id:8 | payload_length:4 | crc32:4
//! ```

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{Result, TransportError};

/// Frame header size in bytes.
pub const FRAME_HEADER_SIZE: usize = 24;

/// Protocol magic number for frame validation.
pub const MAGIC: u32 = 0x5443_5059;

/// Protocol version.
pub const PROTOCOL_VERSION: u8 = 1;

/// Largest accepted payload (64 MiB).
pub const MAX_PAYLOAD_SIZE: u32 = 64 * 1024 * 1024;

/// Operations understood by the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Opcode {
    /// Liveness probe; echoes the payload.
    Ping = 0x0001,
    /// Opens a copy session for a tablet.
    BeginSession = 0x0101,
    /// Fetches one chunk of a data item.
    FetchData = 0x0102,
    /// Closes a copy session.
    EndSession = 0x0103,
}

impl TryFrom<u16> for Opcode {
    type Error = TransportError;

    fn try_from(value: u16) -> Result<Self> {
        match value {
            0x0001 => Ok(Opcode::Ping),
            0x0101 => Ok(Opcode::BeginSession),
            0x0102 => Ok(Opcode::FetchData),
            0x0103 => Ok(Opcode::EndSession),
            other => Err(TransportError::UnknownOpcode(other)),
        }
    }
}

/// Frame control flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameFlags(u8);

impl FrameFlags {
    /// No flags.
    pub const EMPTY: FrameFlags = FrameFlags(0);
    /// The frame answers a request.
    pub const RESPONSE: FrameFlags = FrameFlags(0x01);
    /// The response payload is an encoded `RpcErrorStatus`.
    pub const ERROR: FrameFlags = FrameFlags(0x02);
    /// No response is expected.
    pub const ONE_WAY: FrameFlags = FrameFlags(0x04);

    /// Raw byte.
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Builds flags from a raw byte, rejecting unknown bits.
    pub fn from_bits(bits: u8) -> Result<Self> {
        if bits & !0x07 != 0 {
            return Err(TransportError::InvalidFrame {
                reason: format!("unknown flag bits 0x{:02X}", bits),
            });
        }
        Ok(FrameFlags(bits))
    }

    /// True if every flag in `other` is set.
    pub fn contains(self, other: FrameFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for FrameFlags {
    type Output = FrameFlags;

    fn bitor(self, rhs: FrameFlags) -> FrameFlags {
        FrameFlags(self.0 | rhs.0)
    }
}

/// Frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Protocol magic number.
    pub magic: u32,
    /// Protocol version.
    pub version: u8,
    /// Control flags.
    pub flags: FrameFlags,
    /// Operation code.
    pub opcode: Opcode,
    /// Request id used to match responses to calls.
    pub request_id: u64,
    /// Payload length in bytes.
    pub payload_length: u32,
    /// CRC32 of the payload.
    pub checksum: u32,
}

impl FrameHeader {
    /// Decodes and validates a header.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < FRAME_HEADER_SIZE {
            return Err(TransportError::InvalidFrame {
                reason: format!("header needs {} bytes, got {}", FRAME_HEADER_SIZE, buf.len()),
            });
        }
        let mut buf = &buf[..FRAME_HEADER_SIZE];
        let magic = buf.get_u32();
        if magic != MAGIC {
            return Err(TransportError::InvalidMagic {
                expected: MAGIC,
                got: magic,
            });
        }
        let version = buf.get_u8();
        if version != PROTOCOL_VERSION {
            return Err(TransportError::VersionMismatch {
                expected: PROTOCOL_VERSION,
                got: version,
            });
        }
        let flags = FrameFlags::from_bits(buf.get_u8())?;
        let opcode = Opcode::try_from(buf.get_u16())?;
        let request_id = buf.get_u64();
        let payload_length = buf.get_u32();
        let checksum = buf.get_u32();
        Ok(Self {
            magic,
            version,
            flags,
            opcode,
            request_id,
            payload_length,
            checksum,
        })
    }

    fn encode_into(&self, buf: &mut BytesMut) {
        buf.put_u32(self.magic);
        buf.put_u8(self.version);
        buf.put_u8(self.flags.bits());
        buf.put_u16(self.opcode as u16);
        buf.put_u64(self.request_id);
        buf.put_u32(self.payload_length);
        buf.put_u32(self.checksum);
    }
}

/// A single frame in the RPC protocol.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Frame header.
    pub header: FrameHeader,
    /// Payload data.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Creates a request frame; the header checksum covers `payload`.
    pub fn new(opcode: Opcode, request_id: u64, payload: Vec<u8>) -> Self {
        Self::with_flags(opcode, request_id, payload, FrameFlags::EMPTY)
    }

    /// Creates a frame with explicit flags.
    pub fn with_flags(opcode: Opcode, request_id: u64, payload: Vec<u8>, flags: FrameFlags) -> Self {
        let header = FrameHeader {
            magic: MAGIC,
            version: PROTOCOL_VERSION,
            flags,
            opcode,
            request_id,
            payload_length: payload.len() as u32,
            checksum: crc32fast::hash(&payload),
        };
        Self { header, payload }
    }

    /// Builds the successful response to this request.
    pub fn make_response(&self, payload: Vec<u8>) -> Frame {
        Frame::with_flags(self.header.opcode, self.header.request_id, payload, FrameFlags::RESPONSE)
    }

    /// Builds an error response to this request.
    pub fn make_error_response(&self, payload: Vec<u8>) -> Frame {
        Frame::with_flags(
            self.header.opcode,
            self.header.request_id,
            payload,
            FrameFlags::RESPONSE | FrameFlags::ERROR,
        )
    }

    /// Operation code.
    pub fn opcode(&self) -> Opcode {
        self.header.opcode
    }

    /// Request id.
    pub fn request_id(&self) -> u64 {
        self.header.request_id
    }

    /// True for response frames.
    pub fn is_response(&self) -> bool {
        self.header.flags.contains(FrameFlags::RESPONSE)
    }

    /// True for error responses.
    pub fn is_error(&self) -> bool {
        self.header.flags.contains(FrameFlags::ERROR)
    }

    /// Serializes header and payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + self.payload.len());
        self.header.encode_into(&mut buf);
        buf.put_slice(&self.payload);
        buf.to_vec()
    }

    /// Parses a complete frame from `buf`.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let header = FrameHeader::decode(buf)?;
        if header.payload_length > MAX_PAYLOAD_SIZE {
            return Err(TransportError::PayloadTooLarge {
                size: header.payload_length,
                max_size: MAX_PAYLOAD_SIZE,
            });
        }
        let end = FRAME_HEADER_SIZE + header.payload_length as usize;
        if buf.len() < end {
            return Err(TransportError::InvalidFrame {
                reason: format!("payload truncated: need {} bytes, got {}", end, buf.len()),
            });
        }
        let frame = Frame {
            header,
            payload: buf[FRAME_HEADER_SIZE..end].to_vec(),
        };
        frame.validate()?;
        Ok(frame)
    }

    /// Checks length and CRC of the payload against the header.
    pub fn validate(&self) -> Result<()> {
        if self.payload.len() != self.header.payload_length as usize {
            return Err(TransportError::InvalidFrame {
                reason: format!(
                    "payload length {} does not match header {}",
                    self.payload.len(),
                    self.header.payload_length
                ),
            });
        }
        let computed = crc32fast::hash(&self.payload);
        if computed != self.header.checksum {
            return Err(TransportError::ChecksumMismatch {
                expected: self.header.checksum,
                computed,
            });
        }
        Ok(())
    }
}
