//! The message codec: turns a raw frame payload into a tagged
//! [`ServerMessage`] according to the decode context the connection core
//! derives from its state.
//!
//! MySQL frames carry no message tag of their own; the same first byte
//! means different things in different phases (`0xFE` is an EOF, an auth
//! switch request, or a length-encoded integer prefix). The context
//! resolves that ambiguity.

use crate::error::{Error, Result};
use crate::protocol::column::{read_column_definition, ColumnDefinition};
use crate::protocol::command::{read_prepare_ok, PrepareOk};
use crate::protocol::handshake::{
    read_auth_switch_request, read_initial_handshake, AuthSwitchRequest, InitialHandshake,
};
use crate::protocol::response::{
    is_eof_payload, read_eof_payload, read_err_payload, read_ok_payload, EofPayload, ErrPayload,
    OkPayload,
};
use crate::protocol::row::{read_binary_row, read_text_row, TextRow};
use crate::value::Value;

/// What the connection expects the next frame to be.
#[derive(Debug, Clone, Copy)]
pub enum DecodeContext<'a> {
    /// The server's opening handshake.
    Handshake,
    /// The verdict on our handshake response: OK, ERR, auth switch, or
    /// auth-more-data.
    HandshakeResult,
    /// First frame after COM_QUERY / COM_STMT_EXECUTE: OK, ERR, or a
    /// result-set header.
    CommandResponse,
    /// Column definition block: definitions terminated by EOF.
    ColumnDefinition,
    /// Text-protocol row block: rows terminated by EOF, ERR on failure.
    TextRow,
    /// Binary-protocol row block; rows decode against the column types.
    BinaryRow { columns: &'a [ColumnDefinition] },
    /// First frame after COM_STMT_PREPARE.
    PrepareResponse,
    /// No request in flight; used to classify spurious frames.
    Idle,
}

/// A decoded server message.
#[derive(Debug)]
pub enum ServerMessage {
    Handshake(InitialHandshake),
    Ok(OkPayload),
    Eof(EofPayload),
    Error(ErrPayload),
    AuthSwitchRequest(AuthSwitchRequest),
    /// `0x01`-framed extra auth data (caching_sha2 status bytes).
    AuthMoreData(Vec<u8>),
    ResultSetHeader { column_count: u64 },
    ColumnDefinition(ColumnDefinition),
    Row(TextRow),
    BinaryRow(Vec<Value>),
    PreparedStatementPrepared(PrepareOk),
}

/// Decode one frame payload in the given context.
pub fn decode(context: DecodeContext<'_>, payload: &[u8]) -> Result<ServerMessage> {
    if payload.is_empty() {
        return Err(Error::InvalidPacket);
    }

    match context {
        DecodeContext::Handshake => match payload[0] {
            0xFF => Ok(ServerMessage::Error(read_err_payload(payload)?)),
            _ => Ok(ServerMessage::Handshake(read_initial_handshake(payload)?)),
        },

        DecodeContext::HandshakeResult => match payload[0] {
            0x00 => Ok(ServerMessage::Ok(read_ok_payload(payload)?)),
            0xFF => Ok(ServerMessage::Error(read_err_payload(payload)?)),
            0x01 => Ok(ServerMessage::AuthMoreData(payload[1..].to_vec())),
            0xFE => Ok(ServerMessage::AuthSwitchRequest(read_auth_switch_request(
                payload,
            )?)),
            _ => Err(Error::InvalidPacket),
        },

        DecodeContext::CommandResponse => match payload[0] {
            0x00 => Ok(ServerMessage::Ok(read_ok_payload(payload)?)),
            0xFF => Ok(ServerMessage::Error(read_err_payload(payload)?)),
            0xFB => Err(Error::Unsupported(
                "LOCAL INFILE queries are not supported".to_string(),
            )),
            _ => {
                let (column_count, rest) = super::primitive::read_int_lenenc(payload)?;
                super::primitive::expect_fully_consumed(rest)?;
                Ok(ServerMessage::ResultSetHeader { column_count })
            }
        },

        DecodeContext::ColumnDefinition => {
            if is_eof_payload(payload) {
                Ok(ServerMessage::Eof(read_eof_payload(payload)?))
            } else {
                Ok(ServerMessage::ColumnDefinition(read_column_definition(
                    payload,
                )?))
            }
        }

        DecodeContext::TextRow => match payload[0] {
            0xFF => Ok(ServerMessage::Error(read_err_payload(payload)?)),
            // A text cell can itself start with 0xFE as a lenenc prefix;
            // only a short payload is an EOF.
            _ if is_eof_payload(payload) => Ok(ServerMessage::Eof(read_eof_payload(payload)?)),
            _ => Ok(ServerMessage::Row(read_text_row(payload)?)),
        },

        DecodeContext::BinaryRow { columns } => match payload[0] {
            0xFF => Ok(ServerMessage::Error(read_err_payload(payload)?)),
            _ if is_eof_payload(payload) => Ok(ServerMessage::Eof(read_eof_payload(payload)?)),
            _ => Ok(ServerMessage::BinaryRow(read_binary_row(payload, columns)?)),
        },

        DecodeContext::PrepareResponse => match payload[0] {
            0xFF => Ok(ServerMessage::Error(read_err_payload(payload)?)),
            0x00 => Ok(ServerMessage::PreparedStatementPrepared(read_prepare_ok(
                payload,
            )?)),
            _ => Err(Error::InvalidPacket),
        },

        DecodeContext::Idle => match payload[0] {
            0x00 => Ok(ServerMessage::Ok(read_ok_payload(payload)?)),
            0xFF => Ok(ServerMessage::Error(read_err_payload(payload)?)),
            _ if is_eof_payload(payload) => Ok(ServerMessage::Eof(read_eof_payload(payload)?)),
            _ => Err(Error::InvalidPacket),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constant::ColumnType;
    use crate::protocol::column::write_column_definition;

    #[test]
    fn command_response_discrimination() {
        let ok = [0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00];
        assert!(matches!(
            decode(DecodeContext::CommandResponse, &ok),
            Ok(ServerMessage::Ok(_))
        ));

        let header = [0x01];
        assert!(matches!(
            decode(DecodeContext::CommandResponse, &header),
            Ok(ServerMessage::ResultSetHeader { column_count: 1 })
        ));

        let local_infile = [0xFB];
        assert!(matches!(
            decode(DecodeContext::CommandResponse, &local_infile),
            Err(Error::Unsupported(_))
        ));
    }

    #[test]
    fn result_set_header_with_trailing_bytes_is_rejected() {
        let payload = [0x01, 0x99];
        assert!(matches!(
            decode(DecodeContext::CommandResponse, &payload),
            Err(Error::BufferNotFullyConsumed { remaining: 1 })
        ));
    }

    #[test]
    fn column_block_ends_with_eof() {
        let mut coldef = Vec::new();
        write_column_definition(
            &mut coldef,
            &ColumnDefinition::named("x", ColumnType::MYSQL_TYPE_LONG),
        );
        assert!(matches!(
            decode(DecodeContext::ColumnDefinition, &coldef),
            Ok(ServerMessage::ColumnDefinition(_))
        ));

        let eof = [0xFE, 0x00, 0x00, 0x02, 0x00];
        assert!(matches!(
            decode(DecodeContext::ColumnDefinition, &eof),
            Ok(ServerMessage::Eof(_))
        ));
    }

    #[test]
    fn text_row_vs_eof() {
        let row = [0x01, b'1'];
        assert!(matches!(
            decode(DecodeContext::TextRow, &row),
            Ok(ServerMessage::Row(_))
        ));

        let eof = [0xFE, 0x00, 0x00, 0x02, 0x00];
        assert!(matches!(
            decode(DecodeContext::TextRow, &eof),
            Ok(ServerMessage::Eof(_))
        ));
    }

    #[test]
    fn auth_switch_in_handshake_result() {
        let mut payload = vec![0xFE];
        payload.extend_from_slice(b"mysql_native_password\0");
        payload.extend_from_slice(&[1, 2, 3, 0]);
        assert!(matches!(
            decode(DecodeContext::HandshakeResult, &payload),
            Ok(ServerMessage::AuthSwitchRequest(_))
        ));
    }

    #[test]
    fn idle_rejects_unclassifiable_frames() {
        assert!(decode(DecodeContext::Idle, &[0x42, 0x42]).is_err());
    }
}
