//! Length-prefixed framing for resource streams.
//!
//! Header Format: !BBHI (8 bytes, Network Byte Order / Big Endian)
//! ```text
//! [VER:1][OP:1][RES:2][LEN:4]
//! ```
//!
//! - VER (u8): Protocol version (0x01)
//! - OP (u8): OpCode
//! - RES (u16): Reserved for future use
//! - LEN (u32): Payload length in bytes
//!
//! Payloads are JSON documents (see [`crate::types`]).

use crate::error::{ProtocolError, Result};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Cursor;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Protocol version
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Header size in bytes
pub const HEADER_SIZE: usize = 8;

/// Largest payload accepted from a peer.
pub const MAX_PAYLOAD_SIZE: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    // Sink -> Source (initial request, ACK, NACK)
    RequestResources = 1,

    // Source -> Sink (resource push)
    Resources = 2,
}

impl OpCode {
    /// Convert u8 to OpCode
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            1 => Ok(OpCode::RequestResources),
            2 => Ok(OpCode::Resources),
            _ => Err(ProtocolError::InvalidOpCode(value)),
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub version: u8,
    pub opcode: OpCode,
    pub reserved: u16,
    pub payload_len: u32,
}

impl Header {
    pub fn new(opcode: OpCode, payload_len: u32) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            opcode,
            reserved: 0,
            payload_len,
        }
    }

    pub fn pack(&self) -> Result<[u8; HEADER_SIZE]> {
        let mut buf = [0u8; HEADER_SIZE];
        let mut cursor = Cursor::new(&mut buf[..]);

        WriteBytesExt::write_u8(&mut cursor, self.version)?;
        WriteBytesExt::write_u8(&mut cursor, self.opcode.as_u8())?;
        WriteBytesExt::write_u16::<BigEndian>(&mut cursor, self.reserved)?;
        WriteBytesExt::write_u32::<BigEndian>(&mut cursor, self.payload_len)?;

        Ok(buf)
    }

    pub fn unpack(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(ProtocolError::HeaderTooShort {
                expected: HEADER_SIZE,
                got: data.len(),
            });
        }

        let mut cursor = Cursor::new(&data[..HEADER_SIZE]);

        let version = ReadBytesExt::read_u8(&mut cursor)?;
        let op_raw = ReadBytesExt::read_u8(&mut cursor)?;
        let reserved = ReadBytesExt::read_u16::<BigEndian>(&mut cursor)?;
        let payload_len = ReadBytesExt::read_u32::<BigEndian>(&mut cursor)?;

        if version != PROTOCOL_VERSION {
            return Err(ProtocolError::VersionMismatch {
                expected: PROTOCOL_VERSION,
                got: version,
            });
        }

        let opcode = OpCode::from_u8(op_raw)?;

        Ok(Self {
            version,
            opcode,
            reserved,
            payload_len,
        })
    }
}

/// Protocol message (header + payload)
#[derive(Debug, Clone)]
pub struct Message {
    pub header: Header,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(opcode: OpCode, payload: Vec<u8>) -> Result<Self> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }
        let header = Header::new(opcode, payload.len() as u32);
        Ok(Self { header, payload })
    }

    pub fn json<T: Serialize>(opcode: OpCode, value: &T) -> Result<Self> {
        Self::new(opcode, serde_json::to_vec(value)?)
    }

    /// Decode the payload, checking the opcode first.
    pub fn decode<T: DeserializeOwned>(&self, expected: OpCode) -> Result<T> {
        if self.header.opcode != expected {
            return Err(ProtocolError::UnexpectedOpCode {
                expected: expected.as_u8(),
                got: self.header.opcode.as_u8(),
            });
        }
        Ok(serde_json::from_slice(&self.payload)?)
    }

    /// Header and payload as one contiguous frame.
    pub fn pack(&self) -> Result<Vec<u8>> {
        let mut frame = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        frame.extend_from_slice(&self.header.pack()?);
        frame.extend_from_slice(&self.payload);
        Ok(frame)
    }

    pub fn unpack(frame: &[u8]) -> Result<Self> {
        let header = Header::unpack(frame)?;
        let payload = frame[HEADER_SIZE..].to_vec();

        if payload.len() != header.payload_len as usize {
            return Err(ProtocolError::PayloadLengthMismatch {
                expected: header.payload_len as usize,
                got: payload.len(),
            });
        }

        Ok(Self { header, payload })
    }
}

/// Read one message. `Ok(None)` on a clean close before any header byte.
pub async fn read_message<R>(reader: &mut R) -> Result<Option<Message>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; HEADER_SIZE];
    let mut filled = 0;
    while filled < HEADER_SIZE {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(ProtocolError::Truncated { got: filled });
        }
        filled += n;
    }

    let header = Header::unpack(&buf)?;
    let len = header.payload_len as usize;
    if len > MAX_PAYLOAD_SIZE {
        return Err(ProtocolError::PayloadTooLarge {
            size: len,
            max: MAX_PAYLOAD_SIZE,
        });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            ProtocolError::Truncated { got: HEADER_SIZE }
        } else {
            ProtocolError::IoError(e)
        }
    })?;

    Ok(Some(Message { header, payload }))
}

pub async fn write_message<W>(writer: &mut W, msg: &Message) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&msg.pack()?).await?;
    writer.flush().await?;
    Ok(())
}
