//! Client command encoders and the prepare-response decoder.

use zerocopy::byteorder::little_endian::{U16 as U16LE, U32 as U32LE};
use zerocopy::{FromBytes, Immutable, KnownLayout};

use crate::constant::CommandByte;
use crate::error::{Error, Result};
use crate::protocol::primitive::*;
use crate::protocol::row::write_param_null_bitmap;
use crate::value::Value;

/// Write COM_QUERY
pub fn write_query(out: &mut Vec<u8>, sql: &str) {
    write_int_1(out, CommandByte::Query as u8);
    out.extend_from_slice(sql.as_bytes());
}

/// Write COM_QUIT
pub fn write_quit(out: &mut Vec<u8>) {
    write_int_1(out, CommandByte::Quit as u8);
}

/// Write COM_STMT_PREPARE
pub fn write_prepare(out: &mut Vec<u8>, sql: &str) {
    write_int_1(out, CommandByte::StmtPrepare as u8);
    out.extend_from_slice(sql.as_bytes());
}

/// Write COM_STMT_CLOSE
pub fn write_close_statement(out: &mut Vec<u8>, statement_id: u32) {
    write_int_1(out, CommandByte::StmtClose as u8);
    write_int_4(out, statement_id);
}

/// Write COM_STMT_EXECUTE.
///
/// Layout after the command byte: statement id (4), flags (1, no
/// cursor), iteration count (4, always 1), then for a non-empty
/// parameter list the NULL bitmap, the new-params-bound flag, the type
/// block, and the values.
pub fn write_execute(
    out: &mut Vec<u8>,
    statement_id: u32,
    params: &[Value],
    supports_micros: bool,
) {
    write_int_1(out, CommandByte::StmtExecute as u8);
    write_int_4(out, statement_id);
    write_int_1(out, 0x00);
    write_int_4(out, 1);

    if params.is_empty() {
        return;
    }

    write_param_null_bitmap(out, params);

    // new-params-bound flag: types always follow
    write_int_1(out, 0x01);
    for param in params {
        let (column_type, flag) = param.binary_type();
        write_int_1(out, column_type as u8);
        write_int_1(out, flag);
    }

    for param in params {
        param.encode_binary(out, supports_micros);
    }
}

/// COM_STMT_PREPARE response tail (zero-copy).
///
/// Servers send at least 12 bytes here; the warning count is the last
/// field all of them agree on.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
struct PrepareOkTail {
    statement_id: U32LE,
    num_columns: U16LE,
    num_params: U16LE,
    _reserved: u8,
    warning_count: U16LE,
}

/// Parsed COM_STMT_PREPARE response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrepareOk {
    pub statement_id: u32,
    pub num_columns: u16,
    pub num_params: u16,
    pub warning_count: u16,
}

pub fn read_prepare_ok(payload: &[u8]) -> Result<PrepareOk> {
    let (status, data) = read_int_1(payload)?;
    if status != 0x00 || data.len() < 11 {
        return Err(Error::InvalidPacket);
    }

    let tail = PrepareOkTail::ref_from_bytes(&data[..11]).map_err(|_| Error::InvalidPacket)?;
    expect_fully_consumed(&data[11..])?;

    Ok(PrepareOk {
        statement_id: tail.statement_id.get(),
        num_columns: tail.num_columns.get(),
        num_params: tail.num_params.get(),
        warning_count: tail.warning_count.get(),
    })
}

/// Count `?` placeholders in a query.
///
/// Deliberately naive: every `?` byte counts, including those inside
/// string literals and comments. The server-side parameter count is
/// treated as authoritative at prepare time.
pub fn placeholder_count(sql: &str) -> usize {
    sql.bytes().filter(|b| *b == b'?').count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn query_packet() {
        let mut out = Vec::new();
        write_query(&mut out, "SELECT 1");
        assert_eq!(out[0], 0x03);
        assert_eq!(&out[1..], b"SELECT 1");
    }

    #[test]
    fn quit_packet() {
        let mut out = Vec::new();
        write_quit(&mut out);
        assert_eq!(out, vec![0x01]);
    }

    #[test]
    fn prepare_ok_roundtrip() {
        let mut payload = vec![0x00];
        payload.extend_from_slice(&7u32.to_le_bytes());
        payload.extend_from_slice(&2u16.to_le_bytes()); // columns
        payload.extend_from_slice(&3u16.to_le_bytes()); // params
        payload.push(0x00);
        payload.extend_from_slice(&1u16.to_le_bytes()); // warnings

        let ok = read_prepare_ok(&payload).unwrap();
        assert_eq!(ok.statement_id, 7);
        assert_eq!(ok.num_columns, 2);
        assert_eq!(ok.num_params, 3);
        assert_eq!(ok.warning_count, 1);
    }

    #[test]
    fn prepare_ok_rejects_trailing_bytes() {
        let mut payload = vec![0x00];
        payload.extend_from_slice(&[0u8; 11]);
        payload.push(0xEE);
        assert!(matches!(
            read_prepare_ok(&payload),
            Err(Error::BufferNotFullyConsumed { remaining: 1 })
        ));
    }

    #[test]
    fn execute_without_params_is_header_only() {
        let mut out = Vec::new();
        write_execute(&mut out, 9, &[], true);
        assert_eq!(out.len(), 10);
        assert_eq!(out[0], 0x17);
        assert_eq!(&out[1..5], &9u32.to_le_bytes());
    }

    #[test]
    fn execute_with_params_layout() {
        let params = vec![Value::Null, Value::Int(5)];
        let mut out = Vec::new();
        write_execute(&mut out, 1, &params, true);

        // header(10) + bitmap(1) + bound flag(1) + types(4) + value(8)
        assert_eq!(out.len(), 24);
        assert_eq!(out[10], 0b0000_0001); // first param NULL
        assert_eq!(out[11], 0x01); // new-params-bound
        assert_eq!(out[12], 0x06); // MYSQL_TYPE_NULL
        assert_eq!(out[14], 0x08); // MYSQL_TYPE_LONGLONG
        assert_eq!(&out[16..24], &5i64.to_le_bytes());
    }

    #[test]
    fn placeholder_counting_is_naive() {
        assert_eq!(placeholder_count("SELECT 1"), 0);
        assert_eq!(placeholder_count("SELECT ?, ?"), 2);
        // string literals are not parsed; the byte inside counts too
        assert_eq!(placeholder_count("SELECT '?'"), 1);
    }
}
