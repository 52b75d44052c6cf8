//! Packet framing: every MySQL frame is a 3-byte little-endian payload
//! length, a 1-byte sequence number, and the payload. Payloads of 16 MB
//! or more span multiple frames and are rejoined on read.

use tokio::io::{AsyncBufRead, AsyncReadExt};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::error::{Error, Result};

/// Largest payload a single frame can carry.
pub const MAX_FRAME_PAYLOAD: usize = 0xFF_FFFF;

/// Frame header (zero-copy).
///
/// Layout matches the wire:
/// - length: 3 bytes (little-endian payload length)
/// - sequence_id: 1 byte
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable, IntoBytes)]
pub struct PacketHeader {
    pub length: [u8; 3],
    pub sequence_id: u8,
}

impl PacketHeader {
    pub fn encode(length: usize, sequence_id: u8) -> Self {
        let len = u32::to_le_bytes(length as u32);
        Self {
            length: [len[0], len[1], len[2]],
            sequence_id,
        }
    }

    pub fn length(&self) -> usize {
        u32::from_le_bytes([self.length[0], self.length[1], self.length[2], 0]) as usize
    }
}

/// Encode one logical payload as wire frames, splitting into 16 MB chunks
/// when necessary. A payload that is an exact multiple of the chunk size
/// gets a trailing empty frame so the receiver can tell it is complete.
pub fn encode_payload(mut sequence_id: u8, payload: &[u8]) -> Vec<u8> {
    let num_chunks = payload.len() / MAX_FRAME_PAYLOAD + 1;
    let mut out = Vec::with_capacity(payload.len() + num_chunks * 4);

    let mut remaining = payload;
    loop {
        let chunk_size = remaining.len().min(MAX_FRAME_PAYLOAD);
        let (chunk, rest) = remaining.split_at(chunk_size);

        let header = PacketHeader::encode(chunk_size, sequence_id);
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(chunk);

        sequence_id = sequence_id.wrapping_add(1);
        remaining = rest;

        // The loop runs once more for the trailing empty frame when the
        // last chunk was exactly MAX_FRAME_PAYLOAD bytes.
        if remaining.is_empty() && chunk_size != MAX_FRAME_PAYLOAD {
            break;
        }
    }

    out
}

/// Read one complete payload, rejoining frames that span 16 MB chunks.
///
/// The payload lands in `buffer` (cleared first); the returned value is
/// the sequence id of the first frame.
pub async fn read_payload<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    buffer: &mut Vec<u8>,
) -> Result<u8> {
    buffer.clear();

    let mut header = [0u8; 4];
    reader.read_exact(&mut header).await.map_err(Error::from)?;

    let mut length = u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize;
    let sequence_id = header[3];

    loop {
        let start = buffer.len();
        buffer.resize(start + length, 0);
        reader
            .read_exact(&mut buffer[start..])
            .await
            .map_err(Error::from)?;

        if length != MAX_FRAME_PAYLOAD {
            break;
        }

        // Continuation frame follows; its sequence id is not verified.
        reader.read_exact(&mut header).await.map_err(Error::from)?;
        length = u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize;
    }

    Ok(sequence_id)
}
