//! Generic server responses: OK, ERR, and EOF payloads.

use zerocopy::byteorder::little_endian::U16 as U16LE;
use zerocopy::{FromBytes, Immutable, KnownLayout};

use crate::constant::ServerStatusFlags;
use crate::error::{Error, Result};
use crate::protocol::primitive::*;

/// Parsed OK payload.
///
/// Layout: `0x00` header followed by
/// - affected_rows: int<lenenc>
/// - last_insert_id: int<lenenc>
/// - status_flags: 2 bytes
/// - warnings: 2 bytes
/// - info: string<EOF>
///
/// Session-state tracking is not negotiated, so `info` is always the
/// plain trailing string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OkPayload {
    pub affected_rows: u64,
    pub last_insert_id: u64,
    pub status_flags: ServerStatusFlags,
    pub warnings: u16,
    pub info: String,
}

pub fn read_ok_payload(payload: &[u8]) -> Result<OkPayload> {
    let (header, data) = read_int_1(payload)?;
    if header != 0x00 {
        return Err(Error::InvalidPacket);
    }

    let (affected_rows, data) = read_int_lenenc(data)?;
    let (last_insert_id, data) = read_int_lenenc(data)?;
    let (status_flags, data) = read_int_2(data)?;
    let (warnings, data) = read_int_2(data)?;

    Ok(OkPayload {
        affected_rows,
        last_insert_id,
        status_flags: ServerStatusFlags::from_bits_truncate(status_flags),
        warnings,
        info: String::from_utf8_lossy(data).into_owned(),
    })
}

/// Parsed ERR payload: the native `(errorCode, sqlState, message)` triple.
#[derive(Debug, Clone, thiserror::Error)]
#[error("ERROR {} ({}): {}", self.error_code, self.sql_state, self.message)]
pub struct ErrPayload {
    pub error_code: u16,
    pub sql_state: String,
    pub message: String,
}

pub fn read_err_payload(payload: &[u8]) -> Result<ErrPayload> {
    let (header, data) = read_int_1(payload)?;
    if header != 0xFF {
        return Err(Error::InvalidPacket);
    }

    let (error_code, data) = read_int_2(data)?;

    // marker is '#'
    let (_sql_state_marker, data) = read_string_fix(data, 1)?;
    let (sql_state, data) = read_string_fix(data, 5)?;

    Ok(ErrPayload {
        error_code,
        sql_state: String::from_utf8_lossy(sql_state).into_owned(),
        message: String::from_utf8_lossy(data).into_owned(), // string<EOF>
    })
}

impl From<ErrPayload> for Error {
    fn from(err: ErrPayload) -> Self {
        Error::ServerError {
            error_code: err.error_code,
            sql_state: err.sql_state,
            message: err.message,
        }
    }
}

/// Fixed tail of a protocol-41 EOF payload (zero-copy).
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
struct EofTail {
    warnings: U16LE,
    status_flags: U16LE,
}

/// Parsed EOF payload (header byte `0xFE`, total length < 9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EofPayload {
    pub warnings: u16,
    pub status_flags: ServerStatusFlags,
}

/// An EOF payload is distinguished from a row or a length-encoded integer
/// by its `0xFE` header plus a short total length.
pub fn is_eof_payload(payload: &[u8]) -> bool {
    payload.first() == Some(&0xFE) && payload.len() < 9
}

pub fn read_eof_payload(payload: &[u8]) -> Result<EofPayload> {
    let (header, data) = read_int_1(payload)?;
    if header != 0xFE || data.len() < 4 {
        return Err(Error::InvalidPacket);
    }

    let tail = EofTail::ref_from_bytes(&data[..4]).map_err(|_| Error::InvalidPacket)?;
    expect_fully_consumed(&data[4..])?;

    Ok(EofPayload {
        warnings: tail.warnings.get(),
        status_flags: ServerStatusFlags::from_bits_truncate(tail.status_flags.get()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_ok_payload() {
        // header, affected=3, insert_id=7, status=AUTOCOMMIT, warnings=1, "done"
        let payload = [
            &[0x00, 0x03, 0x07, 0x02, 0x00, 0x01, 0x00][..],
            b"done",
        ]
        .concat();
        let ok = read_ok_payload(&payload).unwrap();
        assert_eq!(ok.affected_rows, 3);
        assert_eq!(ok.last_insert_id, 7);
        assert_eq!(ok.status_flags, ServerStatusFlags::SERVER_STATUS_AUTOCOMMIT);
        assert_eq!(ok.warnings, 1);
        assert_eq!(ok.info, "done");
    }

    #[test]
    fn ok_payload_requires_zero_header() {
        let payload = [0xFE, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00];
        assert!(matches!(
            read_ok_payload(&payload),
            Err(Error::InvalidPacket)
        ));
    }

    #[test]
    fn parses_err_payload() {
        let payload = [
            &[0xFF, 0x15, 0x04][..], // 1045
            b"#28000Access denied",
        ]
        .concat();
        let err = read_err_payload(&payload).unwrap();
        assert_eq!(err.error_code, 1045);
        assert_eq!(err.sql_state, "28000");
        assert_eq!(err.message, "Access denied");
    }

    #[test]
    fn parses_eof_payload() {
        let payload = [0xFE, 0x01, 0x00, 0x22, 0x00];
        assert!(is_eof_payload(&payload));
        let eof = read_eof_payload(&payload).unwrap();
        assert_eq!(eof.warnings, 1);
        assert_eq!(eof.status_flags.bits(), 0x22);
    }

    #[test]
    fn long_fe_payload_is_not_eof() {
        let payload = [0xFE, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        assert!(!is_eof_payload(&payload));
    }

    #[test]
    fn eof_with_trailing_bytes_is_rejected() {
        let payload = [0xFE, 0x00, 0x00, 0x22, 0x00, 0x99];
        assert!(matches!(
            read_eof_payload(&payload),
            Err(Error::BufferNotFullyConsumed { remaining: 1 })
        ));
    }
}
